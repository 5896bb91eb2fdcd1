use binrw::{binrw, BinRead, BinResult, BinWrite};

use super::mutf8::{decode_modified_utf8, encode_modified_utf8};

/// A constant pool entry. Indices into the pool are 1-based; `Long` and
/// `Double` entries are followed by an `Unusable` slot so that vector
/// positions and pool indices stay aligned.
#[binrw]
#[derive(Clone, Debug, PartialEq)]
#[brw(big)]
pub enum ConstantInfo {
    #[brw(magic = 1u8)]
    Utf8(Utf8Constant),
    #[brw(magic = 3u8)]
    Integer(IntegerConstant),
    #[brw(magic = 4u8)]
    Float(FloatConstant),
    #[brw(magic = 5u8)]
    Long(LongConstant),
    #[brw(magic = 6u8)]
    Double(DoubleConstant),
    #[brw(magic = 7u8)]
    Class(ClassConstant),
    #[brw(magic = 8u8)]
    String(StringConstant),
    #[brw(magic = 9u8)]
    FieldRef(FieldRefConstant),
    #[brw(magic = 10u8)]
    MethodRef(MethodRefConstant),
    #[brw(magic = 11u8)]
    InterfaceMethodRef(InterfaceMethodRefConstant),
    #[brw(magic = 12u8)]
    NameAndType(NameAndTypeConstant),
    #[brw(magic = 15u8)]
    MethodHandle(MethodHandleConstant),
    #[brw(magic = 16u8)]
    MethodType(MethodTypeConstant),
    #[brw(magic = 17u8)]
    Dynamic(DynamicConstant),
    #[brw(magic = 18u8)]
    InvokeDynamic(InvokeDynamicConstant),
    #[brw(magic = 19u8)]
    Module(ModuleConstant),
    #[brw(magic = 20u8)]
    Package(PackageConstant),
    // Never written: the pool writer skips it.
    #[brw(magic = 0u8)]
    Unusable,
}

impl ConstantInfo {
    /// Long and double entries occupy two pool slots.
    pub fn is_wide(&self) -> bool {
        matches!(self, ConstantInfo::Long(_) | ConstantInfo::Double(_))
    }

    /// Entry kinds that only exist in class files of version 51 and above.
    pub fn requires_invokedynamic_support(&self) -> bool {
        matches!(
            self,
            ConstantInfo::MethodHandle(_)
                | ConstantInfo::MethodType(_)
                | ConstantInfo::Dynamic(_)
                | ConstantInfo::InvokeDynamic(_)
        )
    }
}

#[binrw]
#[derive(Clone, Debug, PartialEq, Eq)]
#[brw(big)]
pub struct Utf8Constant {
    #[br(temp)]
    #[bw(calc = encode_modified_utf8(utf8_string).len() as u16)]
    length: u16,
    #[br(count = length, map = |bytes: Vec<u8>| decode_modified_utf8(&bytes))]
    #[bw(map = |s: &String| encode_modified_utf8(s))]
    pub utf8_string: String,
}

impl Utf8Constant {
    pub fn new(value: impl Into<String>) -> Self {
        Utf8Constant {
            utf8_string: value.into(),
        }
    }
}

#[binrw]
#[derive(Clone, Debug, PartialEq, Eq)]
#[brw(big)]
pub struct IntegerConstant {
    pub value: i32,
}

#[binrw]
#[derive(Clone, Debug, PartialEq)]
#[brw(big)]
pub struct FloatConstant {
    pub value: f32,
}

#[binrw]
#[derive(Clone, Debug, PartialEq, Eq)]
#[brw(big)]
pub struct LongConstant {
    pub value: i64,
}

#[binrw]
#[derive(Clone, Debug, PartialEq)]
#[brw(big)]
pub struct DoubleConstant {
    pub value: f64,
}

#[binrw]
#[derive(Clone, Debug, PartialEq, Eq)]
#[brw(big)]
pub struct ClassConstant {
    pub name_index: u16,
}

#[binrw]
#[derive(Clone, Debug, PartialEq, Eq)]
#[brw(big)]
pub struct StringConstant {
    pub string_index: u16,
}

#[binrw]
#[derive(Clone, Debug, PartialEq, Eq)]
#[brw(big)]
pub struct FieldRefConstant {
    pub class_index: u16,
    pub name_and_type_index: u16,
}

#[binrw]
#[derive(Clone, Debug, PartialEq, Eq)]
#[brw(big)]
pub struct MethodRefConstant {
    pub class_index: u16,
    pub name_and_type_index: u16,
}

#[binrw]
#[derive(Clone, Debug, PartialEq, Eq)]
#[brw(big)]
pub struct InterfaceMethodRefConstant {
    pub class_index: u16,
    pub name_and_type_index: u16,
}

#[binrw]
#[derive(Clone, Debug, PartialEq, Eq)]
#[brw(big)]
pub struct NameAndTypeConstant {
    pub name_index: u16,
    pub descriptor_index: u16,
}

#[binrw]
#[derive(Clone, Debug, PartialEq, Eq)]
#[brw(big)]
pub struct MethodHandleConstant {
    pub reference_kind: u8,
    pub reference_index: u16,
}

#[binrw]
#[derive(Clone, Debug, PartialEq, Eq)]
#[brw(big)]
pub struct MethodTypeConstant {
    pub descriptor_index: u16,
}

#[binrw]
#[derive(Clone, Debug, PartialEq, Eq)]
#[brw(big)]
pub struct DynamicConstant {
    pub bootstrap_method_attr_index: u16,
    pub name_and_type_index: u16,
}

#[binrw]
#[derive(Clone, Debug, PartialEq, Eq)]
#[brw(big)]
pub struct InvokeDynamicConstant {
    pub bootstrap_method_attr_index: u16,
    pub name_and_type_index: u16,
}

#[binrw]
#[derive(Clone, Debug, PartialEq, Eq)]
#[brw(big)]
pub struct ModuleConstant {
    pub name_index: u16,
}

#[binrw]
#[derive(Clone, Debug, PartialEq, Eq)]
#[brw(big)]
pub struct PackageConstant {
    pub name_index: u16,
}

/// Method handle reference kinds (JVMS §5.4.3.5).
pub mod reference_kind {
    pub const GET_FIELD: u8 = 1;
    pub const GET_STATIC: u8 = 2;
    pub const PUT_FIELD: u8 = 3;
    pub const PUT_STATIC: u8 = 4;
    pub const INVOKE_VIRTUAL: u8 = 5;
    pub const INVOKE_STATIC: u8 = 6;
    pub const INVOKE_SPECIAL: u8 = 7;
    pub const NEW_INVOKE_SPECIAL: u8 = 8;
    pub const INVOKE_INTERFACE: u8 = 9;
}

/// Reads `const_pool_size - 1` pool slots, inserting `Unusable` after wide entries.
#[binrw::parser(reader, endian)]
pub fn parse_const_pool(const_pool_size: u16) -> BinResult<Vec<ConstantInfo>> {
    let mut pool = Vec::with_capacity(const_pool_size as usize);
    let mut index = 1u16;
    while index < const_pool_size {
        let entry = ConstantInfo::read_options(reader, endian, ())?;
        let wide = entry.is_wide();
        pool.push(entry);
        index += 1;
        if wide {
            pool.push(ConstantInfo::Unusable);
            index += 1;
        }
    }
    Ok(pool)
}

#[binrw::writer(writer, endian)]
pub fn write_const_pool(pool: &Vec<ConstantInfo>) -> BinResult<()> {
    for entry in pool {
        if !matches!(entry, ConstantInfo::Unusable) {
            entry.write_options(writer, endian, ())?;
        }
    }
    Ok(())
}
