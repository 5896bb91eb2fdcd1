//! Errors raised while reading, rewriting and writing class files

use thiserror::Error;

use crate::replace::PatternError;

#[derive(Error, Debug)]
pub enum BackportError {
    #[error("Malformed class file: {0}")]
    Decode(#[from] binrw::Error),
    #[error("Constant pool of {class} exceeds 65535 entries")]
    ConstantPoolOverflow { class: String },
    #[error("Dangling constant pool index {index} in {class}")]
    DanglingConstant { class: String, index: u16 },
    #[error("Branch at offset {offset} targets {target}, which is not an instruction")]
    DanglingBranch { offset: u32, target: i64 },
    #[error("Branch offset {delta} at {offset} does not fit the instruction")]
    BranchOverflow { offset: u32, delta: i64 },
    #[error("Code of {method} is {length} bytes, more than 65535")]
    CodeTooLarge { method: String, length: usize },
    #[error("Undecodable code at offset {offset}: {reason}")]
    InvalidCode { offset: u32, reason: String },
    #[error("Invalid descriptor: {descriptor}")]
    InvalidDescriptor { descriptor: String },
    #[error("Invalid pattern: {0}")]
    Pattern(#[from] PatternError),
    #[error("Invalid configuration: {reason}")]
    Config { reason: String },
}

impl BackportError {
    /// Errors that mean a class could not be rewritten without corrupting it.
    pub fn is_structural(&self) -> bool {
        !matches!(self, BackportError::Config { .. } | BackportError::Pattern(_))
    }
}

pub type Result<T> = std::result::Result<T, BackportError>;
