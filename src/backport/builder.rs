//! Construction of synthesized classes and straight-line method bodies.

use crate::attribute_info::{self, AttributeInfo, AttributeInfoVariant, CodeAttribute};
use crate::code_attribute::stack::{compute_max_stack, invokeinterface_count};
use crate::code_attribute::{encode_code, Instruction};
use crate::constant_info::{ConstantInfo, MemberKind, MemberRef};
use crate::descriptor::{JvmType, MethodDescriptor};
use crate::error::{BackportError, Result};
use crate::field_info::{FieldAccessFlags, FieldInfo};
use crate::method_info::{MethodAccessFlags, MethodInfo};
use crate::types::{ClassAccessFlags, ClassFile};

/// Builds a new class around an owned [`ClassFile`].
pub struct ClassBuilder {
    class: ClassFile,
}

impl ClassBuilder {
    pub fn new(
        name: &str,
        super_name: &str,
        access_flags: ClassAccessFlags,
        major_version: u16,
    ) -> Result<Self> {
        Self::with_pool(Vec::new(), name, super_name, access_flags, major_version)
    }

    /// Start from an existing constant pool, so copied code keeps its indices.
    pub fn with_pool(
        const_pool: Vec<ConstantInfo>,
        name: &str,
        super_name: &str,
        access_flags: ClassAccessFlags,
        major_version: u16,
    ) -> Result<Self> {
        let mut class = ClassFile::empty(major_version);
        class.const_pool = const_pool;
        class.access_flags = access_flags;
        class.this_class = class.get_or_add_class(name)?;
        class.super_class = class.get_or_add_class(super_name)?;
        Ok(ClassBuilder { class })
    }

    pub fn add_interface(&mut self, name: &str) -> Result<()> {
        let index = self.class.get_or_add_class(name)?;
        if !self.class.interfaces.contains(&index) {
            self.class.interfaces.push(index);
        }
        Ok(())
    }

    pub fn add_field(&mut self, access_flags: FieldAccessFlags, name: &str, descriptor: &str) -> Result<()> {
        let name_index = self.class.get_or_add_utf8(name)?;
        let descriptor_index = self.class.get_or_add_utf8(descriptor)?;
        self.class
            .fields
            .push(FieldInfo::new(access_flags, name_index, descriptor_index));
        Ok(())
    }

    pub fn class(&self) -> &ClassFile {
        &self.class
    }

    pub fn class_mut(&mut self) -> &mut ClassFile {
        &mut self.class
    }

    pub fn method(&mut self) -> MethodBuilder<'_> {
        MethodBuilder::new(&mut self.class)
    }

    pub fn build(self) -> ClassFile {
        self.class
    }
}

/// Emits the body of one method into a class. Only straight-line code is
/// supported: max stack is computed linearly.
pub struct MethodBuilder<'c> {
    class: &'c mut ClassFile,
    code: Vec<Instruction>,
}

impl<'c> MethodBuilder<'c> {
    pub fn new(class: &'c mut ClassFile) -> Self {
        MethodBuilder {
            class,
            code: Vec::new(),
        }
    }

    pub fn class(&mut self) -> &mut ClassFile {
        &mut *self.class
    }

    pub fn emit(&mut self, instruction: Instruction) -> &mut Self {
        self.code.push(instruction);
        self
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.code
    }

    pub fn new_object(&mut self, class_name: &str) -> Result<()> {
        let index = self.class.get_or_add_class(class_name)?;
        self.emit(Instruction::New(index));
        Ok(())
    }

    pub fn checkcast(&mut self, class_name: &str) -> Result<()> {
        let index = self.class.get_or_add_class(class_name)?;
        self.emit(Instruction::Checkcast(index));
        Ok(())
    }

    pub fn get_field(&mut self, owner: &str, name: &str, descriptor: &str) -> Result<()> {
        let index = self.class.get_or_add_field_ref(owner, name, descriptor)?;
        self.emit(Instruction::Getfield(index));
        Ok(())
    }

    pub fn put_field(&mut self, owner: &str, name: &str, descriptor: &str) -> Result<()> {
        let index = self.class.get_or_add_field_ref(owner, name, descriptor)?;
        self.emit(Instruction::Putfield(index));
        Ok(())
    }

    pub fn get_static(&mut self, owner: &str, name: &str, descriptor: &str) -> Result<()> {
        let index = self.class.get_or_add_field_ref(owner, name, descriptor)?;
        self.emit(Instruction::Getstatic(index));
        Ok(())
    }

    pub fn put_static(&mut self, owner: &str, name: &str, descriptor: &str) -> Result<()> {
        let index = self.class.get_or_add_field_ref(owner, name, descriptor)?;
        self.emit(Instruction::Putstatic(index));
        Ok(())
    }

    pub fn invoke_static(&mut self, method: &MemberRef) -> Result<()> {
        let index = self.class.get_or_add_member_ref(method)?;
        self.emit(Instruction::Invokestatic(index));
        Ok(())
    }

    pub fn invoke_special(&mut self, method: &MemberRef) -> Result<()> {
        let index = self.class.get_or_add_member_ref(method)?;
        self.emit(Instruction::Invokespecial(index));
        Ok(())
    }

    /// `invokeinterface` for interface owners, `invokevirtual` otherwise.
    pub fn invoke_instance(&mut self, method: &MemberRef) -> Result<()> {
        let index = self.class.get_or_add_member_ref(method)?;
        if method.kind == MemberKind::InterfaceMethod {
            let count = invokeinterface_count(&*self.class, index)?;
            self.emit(Instruction::Invokeinterface {
                index,
                count,
                filler: 0,
            });
        } else {
            self.emit(Instruction::Invokevirtual(index));
        }
        Ok(())
    }

    /// Push every parameter of `descriptor`, starting at local `first_slot`.
    pub fn load_parameters(&mut self, descriptor: &MethodDescriptor, first_slot: u16) -> u16 {
        let mut slot = first_slot;
        for param in &descriptor.params {
            self.emit(Instruction::load(param, slot));
            slot += param.slots();
        }
        slot
    }

    /// Convert the value on top of the stack from `from` to `to`: casts,
    /// boxing, unboxing and primitive widening.
    pub fn adapt(&mut self, from: &JvmType, to: &JvmType) -> Result<()> {
        if from == to || *to == JvmType::Void {
            return Ok(());
        }
        match (from.is_primitive(), to.is_primitive()) {
            (true, true) => {
                self.widen(from, to);
                Ok(())
            }
            (true, false) => {
                self.box_value(from)?;
                let boxed = from.box_class().unwrap_or("java/lang/Object");
                match to {
                    JvmType::Reference(name) if !is_supertype_of_box(name, boxed) => self.checkcast(name),
                    JvmType::Array(_) => self.checkcast(&to.to_descriptor()),
                    _ => Ok(()),
                }
            }
            (false, true) => {
                let unboxed = match from {
                    JvmType::Reference(name) => JvmType::unboxed(name),
                    _ => None,
                };
                let primitive = match unboxed {
                    Some(primitive) => primitive,
                    None => {
                        let boxed = to.box_class().unwrap_or("java/lang/Object");
                        self.checkcast(boxed)?;
                        to.clone()
                    }
                };
                self.unbox_value(&primitive)?;
                self.widen(&primitive, to);
                Ok(())
            }
            (false, false) => match to {
                JvmType::Reference(name) if name == "java/lang/Object" => Ok(()),
                _ => match to.class_constant_name() {
                    Some(name) => self.checkcast(&name),
                    None => Ok(()),
                },
            },
        }
    }

    fn box_value(&mut self, primitive: &JvmType) -> Result<()> {
        let Some(boxed) = primitive.box_class() else {
            return Ok(());
        };
        let descriptor = format!("({})L{};", primitive.to_descriptor(), boxed);
        self.invoke_static(&MemberRef {
            kind: MemberKind::Method,
            class_name: boxed.to_string(),
            name: "valueOf".to_string(),
            descriptor,
        })
    }

    fn unbox_value(&mut self, primitive: &JvmType) -> Result<()> {
        let (Some(boxed), Some(method)) = (primitive.box_class(), primitive.unbox_method()) else {
            return Ok(());
        };
        self.invoke_instance(&MemberRef {
            kind: MemberKind::Method,
            class_name: boxed.to_string(),
            name: method.to_string(),
            descriptor: format!("(){}", primitive.to_descriptor()),
        })
    }

    fn widen(&mut self, from: &JvmType, to: &JvmType) {
        let conversion = match (numeric_rank(from), numeric_rank(to)) {
            (Some(0), Some(1)) => Instruction::I2l,
            (Some(0), Some(2)) => Instruction::I2f,
            (Some(0), Some(3)) => Instruction::I2d,
            (Some(1), Some(2)) => Instruction::L2f,
            (Some(1), Some(3)) => Instruction::L2d,
            (Some(2), Some(3)) => Instruction::F2d,
            _ => return,
        };
        self.emit(conversion);
    }

    /// Install the body as a new method. Max stack is computed from the
    /// code and max locals from the parameters. Returns the emitted code.
    pub fn finish(
        self,
        access_flags: MethodAccessFlags,
        name: &str,
        descriptor: &str,
    ) -> Result<Vec<Instruction>> {
        let parsed = MethodDescriptor::parse(descriptor)?;
        let receiver = if access_flags.contains(MethodAccessFlags::STATIC) {
            0
        } else {
            1
        };
        let max_locals = parsed.param_slots() + receiver;
        let max_stack = compute_max_stack(&self.code, &*self.class)?;
        let bytes = encode_code(&self.code)?;
        if bytes.len() > u16::MAX as usize {
            return Err(BackportError::CodeTooLarge {
                method: name.to_string(),
                length: bytes.len(),
            });
        }

        let code_name = self.class.get_or_add_utf8(attribute_info::CODE)?;
        let name_index = self.class.get_or_add_utf8(name)?;
        let descriptor_index = self.class.get_or_add_utf8(descriptor)?;
        let mut method = MethodInfo::new(access_flags, name_index, descriptor_index);
        method.attributes.push(AttributeInfo::from_parsed(
            code_name,
            AttributeInfoVariant::Code(CodeAttribute {
                max_stack,
                max_locals,
                code: bytes,
                exception_table: Vec::new(),
                attributes: Vec::new(),
            }),
        ));
        self.class.methods.push(method);
        Ok(self.code)
    }
}

/// Rank in the widening order int < long < float < double. Sub-int types
/// rank as int.
fn numeric_rank(ty: &JvmType) -> Option<u8> {
    match ty {
        JvmType::Int | JvmType::Byte | JvmType::Short | JvmType::Char | JvmType::Boolean => Some(0),
        JvmType::Long => Some(1),
        JvmType::Float => Some(2),
        JvmType::Double => Some(3),
        _ => None,
    }
}

fn is_supertype_of_box(name: &str, boxed: &str) -> bool {
    name == boxed
        || matches!(
            name,
            "java/lang/Object" | "java/lang/Number" | "java/io/Serializable" | "java/lang/Comparable"
        )
}
