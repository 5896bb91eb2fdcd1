use std::io::Cursor;

use binrw::{binrw, BinRead, BinWrite};

use crate::attribute_info::AttributeInfo;
use crate::constant_info::{parse_const_pool, write_const_pool, ConstantInfo};
use crate::error::{BackportError, Result};
use crate::field_info::FieldInfo;
use crate::method_info::MethodInfo;

/// Class file major versions the backporter cares about.
pub mod version {
    pub const JAVA_1_1: u16 = 45;
    pub const JAVA_5: u16 = 49;
    pub const JAVA_6: u16 = 50;
    pub const JAVA_7: u16 = 51;
    pub const JAVA_8: u16 = 52;
    pub const JAVA_9: u16 = 53;
    pub const JAVA_11: u16 = 55;
    pub const JAVA_17: u16 = 61;
}

#[binrw]
#[derive(Clone, Debug)]
#[brw(big, magic = b"\xca\xfe\xba\xbe")]
pub struct ClassFile {
    pub minor_version: u16,
    pub major_version: u16,
    #[br(temp)]
    #[bw(calc = (const_pool.len() + 1) as u16)]
    const_pool_size: u16,
    #[br(parse_with = parse_const_pool, args(const_pool_size))]
    #[bw(write_with = write_const_pool)]
    pub const_pool: Vec<ConstantInfo>,
    pub access_flags: ClassAccessFlags,
    pub this_class: u16,
    pub super_class: u16,
    #[br(temp)]
    #[bw(calc = interfaces.len() as u16)]
    interfaces_count: u16,
    #[br(count = interfaces_count)]
    pub interfaces: Vec<u16>,
    #[br(temp)]
    #[bw(calc = fields.len() as u16)]
    fields_count: u16,
    #[br(count = fields_count)]
    pub fields: Vec<FieldInfo>,
    #[br(temp)]
    #[bw(calc = methods.len() as u16)]
    methods_count: u16,
    #[br(count = methods_count)]
    pub methods: Vec<MethodInfo>,
    #[br(temp)]
    #[bw(calc = attributes.len() as u16)]
    attributes_count: u16,
    #[br(count = attributes_count)]
    pub attributes: Vec<AttributeInfo>,
}

#[binrw]
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default)]
#[brw(big)]
pub struct ClassAccessFlags(u16);

bitflags! {
    impl ClassAccessFlags: u16 {
        const PUBLIC = 0x0001;     //	Declared public; may be accessed from outside its package.
        const FINAL = 0x0010;      //	Declared final; no subclasses allowed.
        const SUPER = 0x0020;      //	Treat superclass methods specially when invoked by the invokespecial instruction.
        const INTERFACE = 0x0200;  //	Is an interface, not a class.
        const ABSTRACT = 0x0400;   //	Declared abstract; must not be instantiated.
        const SYNTHETIC = 0x1000;  //	Declared synthetic; not present in the source code.
        const ANNOTATION = 0x2000; //	Declared as an annotation type.
        const ENUM = 0x4000;       //	Declared as an enum type.
        const MODULE = 0x8000;     //	Declared as a module type.
    }
}

impl ClassFile {
    /// An empty class shell: only the constant pool and header fields are set.
    pub fn empty(major_version: u16) -> Self {
        ClassFile {
            minor_version: 0,
            major_version,
            const_pool: Vec::new(),
            access_flags: ClassAccessFlags::empty(),
            this_class: 0,
            super_class: 0,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            attributes: Vec::new(),
        }
    }

    /// Parse a class from its binary form and interpret the attributes the
    /// rewriters work on.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut class_file = ClassFile::read(&mut Cursor::new(bytes))?;
        class_file.interpret_inner()?;
        Ok(class_file)
    }

    /// Serialize the class, re-encoding parsed attributes first.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut synced = self.clone();
        synced.sync_all()?;
        let mut out = Cursor::new(Vec::new());
        synced.write(&mut out)?;
        Ok(out.into_inner())
    }

    /// Decode the known attributes of the class, its fields and methods.
    pub fn interpret_inner(&mut self) -> Result<()> {
        let pool = &self.const_pool;
        for attribute in &mut self.attributes {
            attribute.interpret(pool)?;
        }
        for field in &mut self.fields {
            for attribute in &mut field.attributes {
                attribute.interpret(pool)?;
            }
        }
        for method in &mut self.methods {
            for attribute in &mut method.attributes {
                attribute.interpret(pool)?;
            }
        }
        Ok(())
    }

    /// Re-encode every parsed attribute into its raw bytes.
    pub fn sync_all(&mut self) -> Result<()> {
        for attribute in &mut self.attributes {
            attribute.sync_from_parsed()?;
        }
        for field in &mut self.fields {
            for attribute in &mut field.attributes {
                attribute.sync_from_parsed()?;
            }
        }
        for method in &mut self.methods {
            for attribute in &mut method.attributes {
                attribute.sync_from_parsed()?;
            }
        }
        Ok(())
    }

    pub fn is_interface(&self) -> bool {
        self.access_flags.contains(ClassAccessFlags::INTERFACE)
    }

    /// Internal name of this class. Fails only on a malformed pool.
    pub fn name(&self) -> Result<&str> {
        self.get_class_name(self.this_class)
            .ok_or_else(|| BackportError::DanglingConstant {
                class: "<unnamed>".into(),
                index: self.this_class,
            })
    }

    /// Internal name of this class, or a placeholder for diagnostics.
    pub fn display_name(&self) -> &str {
        self.get_class_name(self.this_class).unwrap_or("<unnamed>")
    }

    pub fn super_class_name(&self) -> Option<&str> {
        if self.super_class == 0 {
            None
        } else {
            self.get_class_name(self.super_class)
        }
    }

    pub fn interface_names(&self) -> Vec<&str> {
        self.interfaces
            .iter()
            .filter_map(|&index| self.get_class_name(index))
            .collect()
    }

    /// Package part of the class name, empty for the default package.
    pub fn package_name(&self) -> &str {
        package_of(self.display_name())
    }

    pub fn method_name(&self, method: &MethodInfo) -> Option<&str> {
        self.get_utf8(method.name_index)
    }

    pub fn method_descriptor(&self, method: &MethodInfo) -> Option<&str> {
        self.get_utf8(method.descriptor_index)
    }

    pub fn field_name(&self, field: &FieldInfo) -> Option<&str> {
        self.get_utf8(field.name_index)
    }

    pub fn field_descriptor(&self, field: &FieldInfo) -> Option<&str> {
        self.get_utf8(field.descriptor_index)
    }

    pub fn find_method(&self, name: &str, descriptor: &str) -> Option<&MethodInfo> {
        self.methods.iter().find(|m| {
            self.method_name(m) == Some(name) && self.method_descriptor(m) == Some(descriptor)
        })
    }

    pub fn find_method_index(&self, name: &str, descriptor: &str) -> Option<usize> {
        self.methods.iter().position(|m| {
            self.method_name(m) == Some(name) && self.method_descriptor(m) == Some(descriptor)
        })
    }

    pub fn find_field(&self, name: &str, descriptor: &str) -> Option<&FieldInfo> {
        self.fields.iter().find(|f| {
            self.field_name(f) == Some(name) && self.field_descriptor(f) == Some(descriptor)
        })
    }
}

/// Package part of an internal class name.
pub fn package_of(class_name: &str) -> &str {
    match class_name.rfind('/') {
        Some(pos) => &class_name[..pos],
        None => "",
    }
}
