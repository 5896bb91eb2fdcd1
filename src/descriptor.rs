//! JVM field and method descriptors.

use std::fmt;

use crate::error::{BackportError, Result};

/// A JVM type as written in a descriptor.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum JvmType {
    Int,
    Long,
    Float,
    Double,
    Byte,
    Char,
    Short,
    Boolean,
    Void,
    Reference(String),
    Array(Box<JvmType>),
}

impl JvmType {
    /// Returns true if this type occupies two slots on the JVM stack.
    pub fn is_wide(&self) -> bool {
        matches!(self, JvmType::Long | JvmType::Double)
    }

    /// Stack or local-variable slots taken by a value of this type.
    pub fn slots(&self) -> u16 {
        match self {
            JvmType::Void => 0,
            JvmType::Long | JvmType::Double => 2,
            _ => 1,
        }
    }

    pub fn is_primitive(&self) -> bool {
        !matches!(self, JvmType::Reference(_) | JvmType::Array(_) | JvmType::Void)
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, JvmType::Reference(_) | JvmType::Array(_))
    }

    pub fn object() -> JvmType {
        JvmType::Reference("java/lang/Object".into())
    }

    /// Returns the JVM descriptor string for this type.
    pub fn to_descriptor(&self) -> String {
        match self {
            JvmType::Int => "I".into(),
            JvmType::Long => "J".into(),
            JvmType::Float => "F".into(),
            JvmType::Double => "D".into(),
            JvmType::Byte => "B".into(),
            JvmType::Char => "C".into(),
            JvmType::Short => "S".into(),
            JvmType::Boolean => "Z".into(),
            JvmType::Void => "V".into(),
            JvmType::Reference(name) => format!("L{};", name),
            JvmType::Array(inner) => format!("[{}", inner.to_descriptor()),
        }
    }

    /// The name used in a Class constant: internal name or array descriptor.
    pub fn class_constant_name(&self) -> Option<String> {
        match self {
            JvmType::Reference(name) => Some(name.clone()),
            JvmType::Array(_) => Some(self.to_descriptor()),
            _ => None,
        }
    }

    /// Wrapper class of a primitive type.
    pub fn box_class(&self) -> Option<&'static str> {
        Some(match self {
            JvmType::Int => "java/lang/Integer",
            JvmType::Long => "java/lang/Long",
            JvmType::Float => "java/lang/Float",
            JvmType::Double => "java/lang/Double",
            JvmType::Byte => "java/lang/Byte",
            JvmType::Char => "java/lang/Character",
            JvmType::Short => "java/lang/Short",
            JvmType::Boolean => "java/lang/Boolean",
            _ => return None,
        })
    }

    /// The primitive type wrapped by a box class.
    pub fn unboxed(class_name: &str) -> Option<JvmType> {
        Some(match class_name {
            "java/lang/Integer" => JvmType::Int,
            "java/lang/Long" => JvmType::Long,
            "java/lang/Float" => JvmType::Float,
            "java/lang/Double" => JvmType::Double,
            "java/lang/Byte" => JvmType::Byte,
            "java/lang/Character" => JvmType::Char,
            "java/lang/Short" => JvmType::Short,
            "java/lang/Boolean" => JvmType::Boolean,
            _ => return None,
        })
    }

    /// Name of the `xxxValue` method that unboxes to this type.
    pub fn unbox_method(&self) -> Option<&'static str> {
        Some(match self {
            JvmType::Int => "intValue",
            JvmType::Long => "longValue",
            JvmType::Float => "floatValue",
            JvmType::Double => "doubleValue",
            JvmType::Byte => "byteValue",
            JvmType::Char => "charValue",
            JvmType::Short => "shortValue",
            JvmType::Boolean => "booleanValue",
            _ => return None,
        })
    }
}

impl fmt::Display for JvmType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_descriptor())
    }
}

/// Parse a single type descriptor starting at position `pos` in `desc`.
/// Returns (JvmType, next_position).
pub fn parse_type_at(desc: &str, pos: usize) -> Option<(JvmType, usize)> {
    let bytes = desc.as_bytes();
    if pos >= bytes.len() {
        return None;
    }
    match bytes[pos] {
        b'B' => Some((JvmType::Byte, pos + 1)),
        b'C' => Some((JvmType::Char, pos + 1)),
        b'D' => Some((JvmType::Double, pos + 1)),
        b'F' => Some((JvmType::Float, pos + 1)),
        b'I' => Some((JvmType::Int, pos + 1)),
        b'J' => Some((JvmType::Long, pos + 1)),
        b'S' => Some((JvmType::Short, pos + 1)),
        b'Z' => Some((JvmType::Boolean, pos + 1)),
        b'V' => Some((JvmType::Void, pos + 1)),
        b'L' => {
            let semi = desc[pos + 1..].find(';')?;
            let class_name = &desc[pos + 1..pos + 1 + semi];
            if class_name.is_empty() {
                return None;
            }
            Some((JvmType::Reference(class_name.to_string()), pos + 1 + semi + 1))
        }
        b'[' => {
            let (inner, next) = parse_type_at(desc, pos + 1)?;
            if inner == JvmType::Void {
                return None;
            }
            Some((JvmType::Array(Box::new(inner)), next))
        }
        _ => None,
    }
}

/// Parse a full type descriptor string.
pub fn parse_type_descriptor(desc: &str) -> Option<JvmType> {
    let (ty, next) = parse_type_at(desc, 0)?;
    (next == desc.len()).then_some(ty)
}

/// A parsed method descriptor.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MethodDescriptor {
    pub params: Vec<JvmType>,
    pub ret: JvmType,
}

impl MethodDescriptor {
    pub fn new(params: Vec<JvmType>, ret: JvmType) -> Self {
        MethodDescriptor { params, ret }
    }

    pub fn parse(desc: &str) -> Result<Self> {
        parse_method_descriptor(desc)
            .map(|(params, ret)| MethodDescriptor { params, ret })
            .ok_or_else(|| BackportError::InvalidDescriptor {
                descriptor: desc.to_string(),
            })
    }

    /// Stack slots taken by the parameters, without a receiver.
    pub fn param_slots(&self) -> u16 {
        self.params.iter().map(JvmType::slots).sum()
    }

    /// The same descriptor with `receiver` as a new first parameter.
    pub fn with_receiver(&self, receiver: JvmType) -> MethodDescriptor {
        let mut params = Vec::with_capacity(self.params.len() + 1);
        params.push(receiver);
        params.extend(self.params.iter().cloned());
        MethodDescriptor {
            params,
            ret: self.ret.clone(),
        }
    }
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for param in &self.params {
            f.write_str(&param.to_descriptor())?;
        }
        f.write_str(")")?;
        f.write_str(&self.ret.to_descriptor())
    }
}

/// Parse a method descriptor, e.g. "(II)V" -> ([Int, Int], Void)
pub fn parse_method_descriptor(desc: &str) -> Option<(Vec<JvmType>, JvmType)> {
    if !desc.starts_with('(') {
        return None;
    }
    let close = desc.find(')')?;
    let mut params = Vec::new();
    let mut pos = 1;
    while pos < close {
        let (ty, next) = parse_type_at(desc, pos)?;
        if ty == JvmType::Void {
            return None;
        }
        params.push(ty);
        pos = next;
    }
    if pos != close {
        return None;
    }
    let (ret, next) = parse_type_at(desc, close + 1)?;
    (next == desc.len()).then_some((params, ret))
}

/// Rewrite every class name inside a field or method descriptor. Returns
/// `None` when nothing changed.
pub fn map_descriptor_classes<F>(desc: &str, mut map: F) -> Option<String>
where
    F: FnMut(&str) -> Option<String>,
{
    let mut out = String::with_capacity(desc.len());
    let mut changed = false;
    let mut rest = desc;
    while let Some(start) = rest.find('L') {
        out.push_str(&rest[..=start]);
        let tail = &rest[start + 1..];
        let Some(end) = tail.find(';') else {
            out.push_str(tail);
            rest = "";
            break;
        };
        let name = &tail[..end];
        match map(name) {
            Some(mapped) if mapped != name => {
                out.push_str(&mapped);
                changed = true;
            }
            _ => out.push_str(name),
        }
        out.push(';');
        rest = &tail[end + 1..];
    }
    out.push_str(rest);
    changed.then_some(out)
}

/// Rewrite the class name held by a Class constant, which is either an
/// internal name or an array descriptor.
pub fn map_class_constant_name<F>(name: &str, mut map: F) -> Option<String>
where
    F: FnMut(&str) -> Option<String>,
{
    if name.starts_with('[') {
        map_descriptor_classes(name, map)
    } else {
        map(name).filter(|mapped| mapped != name)
    }
}

/// Get just the simple class name from an internal name.
pub fn simple_class_name(name: &str) -> &str {
    match name.rfind('/') {
        Some(pos) => &name[pos + 1..],
        None => name,
    }
}
