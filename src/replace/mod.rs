//! Pattern-based replacement of API references.

mod pattern;
mod resolver;
mod rewrite;

pub use pattern::{PatternError, PatternMatcher, Template};
pub use resolver::{
    resolve_method, resolve_type, MethodMapping, MethodReplacement, MethodReplacementRule,
    MethodTarget, ReplacementResolver, Resolution, TypeReplacement, TypeReplacementRule,
};
pub use rewrite::ReferenceRewriter;
