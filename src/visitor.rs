//! A closed set of class-file nodes and a visitor over them.
//!
//! Visitors only override [`ClassVisitor::visit`] and match the node kinds
//! they care about; everything else falls through to the default arm.

use crate::attribute_info::{AttributeInfo, BootstrapMethod};
use crate::code_attribute::{decode_code, Instruction};
use crate::constant_info::ConstantInfo;
use crate::error::Result;
use crate::types::ClassFile;

#[derive(Debug)]
pub enum Node<'a> {
    Class(&'a ClassFile),
    Constant {
        index: u16,
        constant: &'a ConstantInfo,
    },
    Attribute(&'a AttributeInfo),
    BootstrapMethod {
        index: u16,
        method: &'a BootstrapMethod,
    },
    Instruction {
        method_index: usize,
        offset: u32,
        instruction: &'a Instruction,
    },
}

pub trait ClassVisitor {
    /// Called once per node. The default does nothing.
    fn visit(&mut self, class: &ClassFile, node: &Node<'_>) {
        let _ = (class, node);
    }
}

/// Drive `visitor` over a class: the class node, its constants, every
/// attribute, the bootstrap methods and finally each method's code.
pub fn walk_class<V>(class: &ClassFile, visitor: &mut V) -> Result<()>
where
    V: ClassVisitor + ?Sized,
{
    visitor.visit(class, &Node::Class(class));

    for (position, constant) in class.const_pool.iter().enumerate() {
        if matches!(constant, ConstantInfo::Unusable) {
            continue;
        }
        let index = position as u16 + 1;
        visitor.visit(class, &Node::Constant { index, constant });
    }

    let member_attributes = class
        .fields
        .iter()
        .flat_map(|f| f.attributes.iter())
        .chain(class.methods.iter().flat_map(|m| m.attributes.iter()));
    for attribute in class.attributes.iter().chain(member_attributes) {
        visitor.visit(class, &Node::Attribute(attribute));
    }

    if let Some(bootstrap) = class.bootstrap_methods() {
        for (index, method) in bootstrap.bootstrap_methods.iter().enumerate() {
            let index = index as u16;
            visitor.visit(class, &Node::BootstrapMethod { index, method });
        }
    }

    for (method_index, method) in class.methods.iter().enumerate() {
        let Some(code) = method.code() else {
            continue;
        };
        for (offset, instruction) in decode_code(&code.code)? {
            visitor.visit(
                class,
                &Node::Instruction {
                    method_index,
                    offset,
                    instruction: &instruction,
                },
            );
        }
    }
    Ok(())
}
