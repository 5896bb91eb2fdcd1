mod mutf8;
mod pool;
mod types;

pub use mutf8::{decode_modified_utf8, encode_modified_utf8};
pub use pool::{MemberKind, MemberRef};
pub use types::*;
