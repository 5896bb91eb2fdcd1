//! Loading program classes from JAR archives and storing the rewritten ones.

mod types;

pub use types::*;
