//! Warning sinks for conditions that skip a rewrite without failing the run.

use std::cell::RefCell;
use std::fmt;

use log::warn;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum WarningCategory {
    /// A replacement target exists in neither class pool.
    MissingReplacement,
    /// A replacement pattern or template could not be compiled.
    InvalidPattern,
    /// A call site of a known bootstrap factory has unexpected arguments.
    MalformedCallSite,
    /// The target of a lambda could not be resolved or made accessible.
    UnresolvedTarget,
    /// A class inherits conflicting default methods.
    AmbiguousDefault,
    /// A generated member would clash with an existing one.
    NameCollision,
    /// A class was left unmodified because rewriting it would corrupt it.
    StructuralViolation,
}

impl fmt::Display for WarningCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WarningCategory::MissingReplacement => "missing replacement",
            WarningCategory::InvalidPattern => "invalid pattern",
            WarningCategory::MalformedCallSite => "malformed call site",
            WarningCategory::UnresolvedTarget => "unresolved target",
            WarningCategory::AmbiguousDefault => "ambiguous default method",
            WarningCategory::NameCollision => "name collision",
            WarningCategory::StructuralViolation => "structural violation",
        };
        f.write_str(name)
    }
}

/// Receives warnings. Reporting never fails and never changes the rewrite.
pub trait WarningReporter {
    fn report(&self, category: WarningCategory, message: &str);
}

/// Forwards warnings to the `log` facade.
#[derive(Copy, Clone, Debug, Default)]
pub struct LogReporter;

impl WarningReporter for LogReporter {
    fn report(&self, category: WarningCategory, message: &str) {
        warn!("{}: {}", category, message);
    }
}

#[derive(Copy, Clone, Debug, Default)]
pub struct NoopReporter;

impl WarningReporter for NoopReporter {
    fn report(&self, _category: WarningCategory, _message: &str) {}
}

/// Keeps every warning, in order.
#[derive(Debug, Default)]
pub struct CollectingReporter {
    warnings: RefCell<Vec<(WarningCategory, String)>>,
}

impl CollectingReporter {
    pub fn new() -> Self {
        CollectingReporter::default()
    }

    pub fn warnings(&self) -> Vec<(WarningCategory, String)> {
        self.warnings.borrow().clone()
    }

    pub fn count(&self, category: WarningCategory) -> usize {
        self.warnings
            .borrow()
            .iter()
            .filter(|(c, _)| *c == category)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.warnings.borrow().is_empty()
    }
}

impl WarningReporter for CollectingReporter {
    fn report(&self, category: WarningCategory, message: &str) {
        self.warnings.borrow_mut().push((category, message.to_string()));
    }
}
