mod types;

use std::io::Cursor;

use binrw::{BinRead, BinWrite};

use crate::constant_info::ConstantInfo;
use crate::error::Result;
use crate::types::ClassFile;

pub use types::*;

pub const CODE: &str = "Code";
pub const BOOTSTRAP_METHODS: &str = "BootstrapMethods";
pub const LINE_NUMBER_TABLE: &str = "LineNumberTable";
pub const LOCAL_VARIABLE_TABLE: &str = "LocalVariableTable";
pub const LOCAL_VARIABLE_TYPE_TABLE: &str = "LocalVariableTypeTable";
pub const STACK_MAP_TABLE: &str = "StackMapTable";

fn read_attribute<T>(info: &[u8]) -> Result<T>
where
    T: for<'a> BinRead<Args<'a> = ()>,
{
    Ok(T::read_be(&mut Cursor::new(info))?)
}

fn write_attribute<T>(value: &T) -> Result<Vec<u8>>
where
    T: for<'a> BinWrite<Args<'a> = ()>,
{
    let mut out = Cursor::new(Vec::new());
    value.write_be(&mut out)?;
    Ok(out.into_inner())
}

impl AttributeInfo {
    /// A new attribute whose raw bytes are produced on the next sync.
    pub fn from_parsed(attribute_name_index: u16, parsed: AttributeInfoVariant) -> Self {
        AttributeInfo {
            attribute_name_index,
            info: Vec::new(),
            info_parsed: Some(parsed),
        }
    }

    pub fn name<'a>(&self, pool: &'a [ConstantInfo]) -> Option<&'a str> {
        let index = self.attribute_name_index as usize;
        match pool.get(index.checked_sub(1)?) {
            Some(ConstantInfo::Utf8(utf8)) => Some(&utf8.utf8_string),
            _ => None,
        }
    }

    /// Decode `info` if the attribute is one the rewriters work on.
    pub fn interpret(&mut self, pool: &[ConstantInfo]) -> Result<()> {
        let parsed = match self.name(pool) {
            Some(CODE) => {
                let mut code: CodeAttribute = read_attribute(&self.info)?;
                for attribute in &mut code.attributes {
                    attribute.interpret(pool)?;
                }
                AttributeInfoVariant::Code(code)
            }
            Some(BOOTSTRAP_METHODS) => {
                AttributeInfoVariant::BootstrapMethods(read_attribute(&self.info)?)
            }
            Some(LINE_NUMBER_TABLE) => AttributeInfoVariant::LineNumberTable(read_attribute(&self.info)?),
            Some(LOCAL_VARIABLE_TABLE) => {
                AttributeInfoVariant::LocalVariableTable(read_attribute(&self.info)?)
            }
            Some(LOCAL_VARIABLE_TYPE_TABLE) => {
                AttributeInfoVariant::LocalVariableTypeTable(read_attribute(&self.info)?)
            }
            Some(STACK_MAP_TABLE) => AttributeInfoVariant::StackMapTable(read_attribute(&self.info)?),
            _ => return Ok(()),
        };
        self.info_parsed = Some(parsed);
        Ok(())
    }

    /// Regenerate `info` from the decoded form.
    pub fn sync_from_parsed(&mut self) -> Result<()> {
        let Some(parsed) = &mut self.info_parsed else {
            return Ok(());
        };
        self.info = match parsed {
            AttributeInfoVariant::Code(code) => {
                for attribute in &mut code.attributes {
                    attribute.sync_from_parsed()?;
                }
                write_attribute(code)?
            }
            AttributeInfoVariant::BootstrapMethods(attr) => write_attribute(attr)?,
            AttributeInfoVariant::LineNumberTable(attr) => write_attribute(attr)?,
            AttributeInfoVariant::LocalVariableTable(attr) => write_attribute(attr)?,
            AttributeInfoVariant::LocalVariableTypeTable(attr) => write_attribute(attr)?,
            AttributeInfoVariant::StackMapTable(attr) => write_attribute(attr)?,
        };
        Ok(())
    }
}

impl ClassFile {
    pub fn bootstrap_methods(&self) -> Option<&BootstrapMethodsAttribute> {
        self.attributes.iter().find_map(|a| match &a.info_parsed {
            Some(AttributeInfoVariant::BootstrapMethods(attr)) => Some(attr),
            _ => None,
        })
    }

    pub fn bootstrap_methods_mut(&mut self) -> Option<&mut BootstrapMethodsAttribute> {
        self.attributes.iter_mut().find_map(|a| match &mut a.info_parsed {
            Some(AttributeInfoVariant::BootstrapMethods(attr)) => Some(attr),
            _ => None,
        })
    }

    /// The BootstrapMethods attribute, created empty when missing.
    pub fn ensure_bootstrap_methods(&mut self) -> Result<&mut BootstrapMethodsAttribute> {
        let existing = self.attributes.iter().position(|a| {
            matches!(a.info_parsed, Some(AttributeInfoVariant::BootstrapMethods(_)))
        });
        let position = match existing {
            Some(position) => position,
            None => {
                let name_index = self.get_or_add_utf8(BOOTSTRAP_METHODS)?;
                self.attributes.push(AttributeInfo::from_parsed(
                    name_index,
                    AttributeInfoVariant::BootstrapMethods(BootstrapMethodsAttribute::default()),
                ));
                self.attributes.len() - 1
            }
        };
        match &mut self.attributes[position].info_parsed {
            Some(AttributeInfoVariant::BootstrapMethods(attr)) => Ok(attr),
            _ => unreachable!("position always points at a BootstrapMethods attribute"),
        }
    }

    pub fn remove_bootstrap_methods(&mut self) {
        self.attributes.retain(|a| {
            !matches!(a.info_parsed, Some(AttributeInfoVariant::BootstrapMethods(_)))
        });
    }
}
