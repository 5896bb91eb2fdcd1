//! Rewrites [Java class files](https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html)
//! so that code compiled for a newer platform runs on an older runtime.
//!
//! ```rust
//! use classfile_backport::backport::{BackportConfig, Backporter};
//! use classfile_backport::class_pool::ClassPool;
//! use classfile_backport::report::LogReporter;
//!
//! let mut program = ClassPool::new();
//! let library = ClassPool::new();
//! let backporter = Backporter::new(BackportConfig::new(50), &LogReporter).unwrap();
//! let summary = backporter.run(&mut program, &library);
//! assert!(summary.modified.is_empty());
//! ```

#[macro_use]
extern crate bitflags;

pub mod attribute_info;
pub mod backport;
pub mod class_pool;
pub mod code_attribute;
pub mod constant_info;
pub mod descriptor;
pub mod error;
pub mod field_info;
#[cfg(feature = "jar-utils")]
pub mod jar_utils;
pub mod method_info;
pub mod replace;
pub mod report;
pub mod types;
pub mod visitor;

pub use error::{BackportError, Result};
pub use types::*;
