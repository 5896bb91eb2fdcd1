use crate::error::{BackportError, Result};
use crate::types::ClassFile;

use super::types::*;

/// Which kind of reference constant a [`MemberRef`] was read from.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum MemberKind {
    Field,
    Method,
    InterfaceMethod,
}

/// A field or method reference with every index resolved to its string.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MemberRef {
    pub kind: MemberKind,
    pub class_name: String,
    pub name: String,
    pub descriptor: String,
}

impl MemberRef {
    pub fn is_interface(&self) -> bool {
        self.kind == MemberKind::InterfaceMethod
    }
}

const MAX_POOL_SLOTS: usize = u16::MAX as usize - 1;

impl ClassFile {
    /// The entry at a 1-based pool index.
    pub fn constant(&self, index: u16) -> Option<&ConstantInfo> {
        if index == 0 {
            return None;
        }
        self.const_pool.get(index as usize - 1)
    }

    pub fn constant_mut(&mut self, index: u16) -> Option<&mut ConstantInfo> {
        if index == 0 {
            return None;
        }
        self.const_pool.get_mut(index as usize - 1)
    }

    pub fn get_utf8(&self, index: u16) -> Option<&str> {
        match self.constant(index) {
            Some(ConstantInfo::Utf8(utf8)) => Some(&utf8.utf8_string),
            _ => None,
        }
    }

    pub fn get_class_name(&self, index: u16) -> Option<&str> {
        match self.constant(index) {
            Some(ConstantInfo::Class(class)) => self.get_utf8(class.name_index),
            _ => None,
        }
    }

    /// Name and descriptor of a NameAndType entry.
    pub fn get_name_and_type(&self, index: u16) -> Option<(&str, &str)> {
        match self.constant(index) {
            Some(ConstantInfo::NameAndType(nat)) => Some((
                self.get_utf8(nat.name_index)?,
                self.get_utf8(nat.descriptor_index)?,
            )),
            _ => None,
        }
    }

    /// Resolve a Fieldref, Methodref or InterfaceMethodref entry.
    pub fn resolve_ref(&self, index: u16) -> Option<MemberRef> {
        let (kind, class_index, nat_index) = match self.constant(index)? {
            ConstantInfo::FieldRef(r) => (MemberKind::Field, r.class_index, r.name_and_type_index),
            ConstantInfo::MethodRef(r) => (MemberKind::Method, r.class_index, r.name_and_type_index),
            ConstantInfo::InterfaceMethodRef(r) => (
                MemberKind::InterfaceMethod,
                r.class_index,
                r.name_and_type_index,
            ),
            _ => return None,
        };
        let (name, descriptor) = self.get_name_and_type(nat_index)?;
        Some(MemberRef {
            kind,
            class_name: self.get_class_name(class_index)?.to_string(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
        })
    }

    /// The reference behind a MethodHandle entry, with its kind.
    pub fn resolve_method_handle(&self, index: u16) -> Option<(u8, MemberRef)> {
        match self.constant(index) {
            Some(ConstantInfo::MethodHandle(handle)) => {
                Some((handle.reference_kind, self.resolve_ref(handle.reference_index)?))
            }
            _ => None,
        }
    }

    pub fn get_method_type(&self, index: u16) -> Option<&str> {
        match self.constant(index) {
            Some(ConstantInfo::MethodType(mt)) => self.get_utf8(mt.descriptor_index),
            _ => None,
        }
    }

    pub fn get_string(&self, index: u16) -> Option<&str> {
        match self.constant(index) {
            Some(ConstantInfo::String(s)) => self.get_utf8(s.string_index),
            _ => None,
        }
    }

    /// Append an entry and return its index. Wide entries take two slots.
    pub fn add_constant(&mut self, constant: ConstantInfo) -> Result<u16> {
        let slots = if constant.is_wide() { 2 } else { 1 };
        if self.const_pool.len() + slots > MAX_POOL_SLOTS {
            return Err(BackportError::ConstantPoolOverflow {
                class: self.display_name().to_string(),
            });
        }
        let wide = constant.is_wide();
        self.const_pool.push(constant);
        let index = self.const_pool.len() as u16;
        if wide {
            self.const_pool.push(ConstantInfo::Unusable);
        }
        Ok(index)
    }

    fn find_constant(&self, wanted: &ConstantInfo) -> Option<u16> {
        self.const_pool
            .iter()
            .position(|c| c == wanted)
            .map(|pos| pos as u16 + 1)
    }

    fn get_or_add(&mut self, constant: ConstantInfo) -> Result<u16> {
        match self.find_constant(&constant) {
            Some(index) => Ok(index),
            None => self.add_constant(constant),
        }
    }

    pub fn get_or_add_utf8(&mut self, value: &str) -> Result<u16> {
        let found = self.const_pool.iter().position(
            |c| matches!(c, ConstantInfo::Utf8(utf8) if utf8.utf8_string == value),
        );
        match found {
            Some(pos) => Ok(pos as u16 + 1),
            None => self.add_constant(ConstantInfo::Utf8(Utf8Constant::new(value))),
        }
    }

    pub fn get_or_add_class(&mut self, name: &str) -> Result<u16> {
        let name_index = self.get_or_add_utf8(name)?;
        self.get_or_add(ConstantInfo::Class(ClassConstant { name_index }))
    }

    pub fn get_or_add_string(&mut self, value: &str) -> Result<u16> {
        let string_index = self.get_or_add_utf8(value)?;
        self.get_or_add(ConstantInfo::String(StringConstant { string_index }))
    }

    pub fn get_or_add_integer(&mut self, value: i32) -> Result<u16> {
        self.get_or_add(ConstantInfo::Integer(IntegerConstant { value }))
    }

    pub fn get_or_add_float(&mut self, value: f32) -> Result<u16> {
        // NaN never compares equal, so those always get a fresh entry.
        self.get_or_add(ConstantInfo::Float(FloatConstant { value }))
    }

    pub fn get_or_add_long(&mut self, value: i64) -> Result<u16> {
        self.get_or_add(ConstantInfo::Long(LongConstant { value }))
    }

    pub fn get_or_add_double(&mut self, value: f64) -> Result<u16> {
        self.get_or_add(ConstantInfo::Double(DoubleConstant { value }))
    }

    pub fn get_or_add_name_and_type(&mut self, name: &str, descriptor: &str) -> Result<u16> {
        let name_index = self.get_or_add_utf8(name)?;
        let descriptor_index = self.get_or_add_utf8(descriptor)?;
        self.get_or_add(ConstantInfo::NameAndType(NameAndTypeConstant {
            name_index,
            descriptor_index,
        }))
    }

    pub fn get_or_add_field_ref(&mut self, class: &str, name: &str, descriptor: &str) -> Result<u16> {
        let class_index = self.get_or_add_class(class)?;
        let name_and_type_index = self.get_or_add_name_and_type(name, descriptor)?;
        self.get_or_add(ConstantInfo::FieldRef(FieldRefConstant {
            class_index,
            name_and_type_index,
        }))
    }

    pub fn get_or_add_method_ref(&mut self, class: &str, name: &str, descriptor: &str) -> Result<u16> {
        let class_index = self.get_or_add_class(class)?;
        let name_and_type_index = self.get_or_add_name_and_type(name, descriptor)?;
        self.get_or_add(ConstantInfo::MethodRef(MethodRefConstant {
            class_index,
            name_and_type_index,
        }))
    }

    pub fn get_or_add_interface_method_ref(
        &mut self,
        class: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<u16> {
        let class_index = self.get_or_add_class(class)?;
        let name_and_type_index = self.get_or_add_name_and_type(name, descriptor)?;
        self.get_or_add(ConstantInfo::InterfaceMethodRef(InterfaceMethodRefConstant {
            class_index,
            name_and_type_index,
        }))
    }

    /// A method reference of the right constant kind for the owner.
    pub fn get_or_add_member_ref(&mut self, member: &MemberRef) -> Result<u16> {
        match member.kind {
            MemberKind::Field => {
                self.get_or_add_field_ref(&member.class_name, &member.name, &member.descriptor)
            }
            MemberKind::Method => {
                self.get_or_add_method_ref(&member.class_name, &member.name, &member.descriptor)
            }
            MemberKind::InterfaceMethod => self.get_or_add_interface_method_ref(
                &member.class_name,
                &member.name,
                &member.descriptor,
            ),
        }
    }

    pub fn get_or_add_method_handle(&mut self, reference_kind: u8, member: &MemberRef) -> Result<u16> {
        let reference_index = self.get_or_add_member_ref(member)?;
        self.get_or_add(ConstantInfo::MethodHandle(MethodHandleConstant {
            reference_kind,
            reference_index,
        }))
    }

    pub fn get_or_add_method_type(&mut self, descriptor: &str) -> Result<u16> {
        let descriptor_index = self.get_or_add_utf8(descriptor)?;
        self.get_or_add(ConstantInfo::MethodType(MethodTypeConstant { descriptor_index }))
    }
}
