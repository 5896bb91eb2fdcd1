use std::cell::RefCell;
use std::collections::BTreeMap;

use log::debug;

use crate::backport::BackportConfig;
use crate::class_pool::ClassPools;
use crate::descriptor::{map_descriptor_classes, JvmType, MethodDescriptor};
use crate::method_info::MethodAccessFlags;
use crate::report::{WarningCategory, WarningReporter};

use super::pattern::{PatternError, PatternMatcher, Template};

/// A type replacement as configured: every class matching `pattern` is
/// replaced by the class named by `replacement`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypeReplacementRule {
    pub pattern: String,
    pub replacement: String,
}

impl TypeReplacementRule {
    pub fn new(pattern: impl Into<String>, replacement: impl Into<String>) -> Self {
        TypeReplacementRule {
            pattern: pattern.into(),
            replacement: replacement.into(),
        }
    }
}

/// A method replacement as configured. An empty replacement descriptor
/// derives the descriptor from the original one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodReplacementRule {
    pub class_pattern: String,
    pub name_pattern: String,
    pub descriptor_pattern: String,
    pub replacement_class: String,
    pub replacement_name: String,
    pub replacement_descriptor: String,
}

/// Outcome of resolving the replacement side of a record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolution<T> {
    /// The concrete replacement exists in one of the pools.
    Resolved(T),
    /// The concrete replacement exists in neither pool.
    Missing,
    /// The replacement depends on captures; checked per substituted name.
    Deferred,
    /// The replacement template failed to compile.
    Invalid(PatternError),
}

impl<T> Resolution<T> {
    pub fn resolved(&self) -> Option<&T> {
        match self {
            Resolution::Resolved(target) => Some(target),
            _ => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Resolution::Missing)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypeReplacement {
    pub matcher: PatternMatcher,
    pub template: Option<Template>,
    pub resolution: Resolution<String>,
}

impl TypeReplacement {
    /// The pattern this record matches against.
    pub fn matching_name(&self) -> &str {
        self.matcher.pattern()
    }

    pub fn resolved(&self) -> Option<&str> {
        self.resolution.resolved().map(String::as_str)
    }

    /// The substituted replacement for `name`, if the record matches it.
    pub fn substitute(&self, name: &str) -> Option<String> {
        let captures = self.matcher.captures(name)?;
        Some(self.template.as_ref()?.substitute(&captures))
    }
}

/// Identity of a resolved replacement method.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodTarget {
    pub class_name: String,
    pub name: String,
    /// `None` when the descriptor is derived from each original call.
    pub descriptor: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodReplacement {
    pub class_matcher: PatternMatcher,
    pub name_matcher: PatternMatcher,
    pub descriptor_matcher: PatternMatcher,
    pub class_template: Option<Template>,
    pub name_template: Option<Template>,
    /// `None` when the descriptor is derived from the original.
    pub descriptor_template: Option<Template>,
    pub resolution: Resolution<MethodTarget>,
}

impl MethodReplacement {
    pub fn matches(&self, class_name: &str, name: &str, descriptor: &str) -> bool {
        self.class_matcher.matches(class_name)
            && self.name_matcher.matches(name)
            && self.descriptor_matcher.matches(descriptor)
    }

    /// Substituted class, name and optional descriptor for a matching member.
    pub fn substitute(&self, class_name: &str, name: &str, descriptor: &str) -> Option<MethodTarget> {
        let class_captures = self.class_matcher.captures(class_name)?;
        let name_captures = self.name_matcher.captures(name)?;
        let descriptor_captures = self.descriptor_matcher.captures(descriptor)?;
        Some(MethodTarget {
            class_name: self.class_template.as_ref()?.substitute(&class_captures),
            name: self.name_template.as_ref()?.substitute(&name_captures),
            descriptor: self
                .descriptor_template
                .as_ref()
                .map(|t| t.substitute(&descriptor_captures)),
        })
    }
}

/// How a call site reaches its target after replacement.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodMapping {
    pub class_name: String,
    pub name: String,
    pub descriptor: String,
    pub is_static: bool,
    pub owner_is_interface: bool,
}

/// Compile a type replacement and resolve its target eagerly when concrete.
pub fn resolve_type(
    pools: ClassPools<'_>,
    matching: &str,
    replacement: &str,
    reporter: &dyn WarningReporter,
) -> TypeReplacement {
    let matcher = PatternMatcher::new(matching);
    let template = match Template::compile(replacement, &matcher) {
        Ok(template) => template,
        Err(err) => {
            reporter.report(WarningCategory::InvalidPattern, &err.to_string());
            return TypeReplacement {
                matcher,
                template: None,
                resolution: Resolution::Invalid(err),
            };
        }
    };
    let resolution = if !template.is_concrete() {
        Resolution::Deferred
    } else if pools.lookup(replacement).is_some() {
        Resolution::Resolved(replacement.to_string())
    } else {
        reporter.report(
            WarningCategory::MissingReplacement,
            &format!(
                "replacement class {} for {} not found",
                replacement, matching
            ),
        );
        Resolution::Missing
    };
    TypeReplacement {
        matcher,
        template: Some(template),
        resolution,
    }
}

/// Compile a method replacement. Each template substitutes from the
/// captures of its own matcher.
pub fn resolve_method(
    pools: ClassPools<'_>,
    rule: &MethodReplacementRule,
    reporter: &dyn WarningReporter,
) -> MethodReplacement {
    let class_matcher = PatternMatcher::new(&rule.class_pattern);
    let name_matcher = PatternMatcher::new(&rule.name_pattern);
    let descriptor_matcher = PatternMatcher::new(&rule.descriptor_pattern);

    let compiled = (|| {
        let class_template = Template::compile(&rule.replacement_class, &class_matcher)?;
        let name_template = Template::compile(&rule.replacement_name, &name_matcher)?;
        let descriptor_template = if rule.replacement_descriptor.is_empty() {
            None
        } else {
            Some(Template::compile(&rule.replacement_descriptor, &descriptor_matcher)?)
        };
        Ok::<_, PatternError>((class_template, name_template, descriptor_template))
    })();

    let (class_template, name_template, descriptor_template) = match compiled {
        Ok(templates) => templates,
        Err(err) => {
            reporter.report(WarningCategory::InvalidPattern, &err.to_string());
            return MethodReplacement {
                class_matcher,
                name_matcher,
                descriptor_matcher,
                class_template: None,
                name_template: None,
                descriptor_template: None,
                resolution: Resolution::Invalid(err),
            };
        }
    };

    let concrete = class_template.is_concrete()
        && name_template.is_concrete()
        && descriptor_template.as_ref().is_none_or(Template::is_concrete);
    let resolution = if !concrete {
        Resolution::Deferred
    } else {
        let target = MethodTarget {
            class_name: rule.replacement_class.clone(),
            name: rule.replacement_name.clone(),
            descriptor: descriptor_template.as_ref().map(|t| t.source().to_string()),
        };
        if method_exists(pools, &target) {
            Resolution::Resolved(target)
        } else {
            reporter.report(
                WarningCategory::MissingReplacement,
                &format!(
                    "replacement method {}.{}{} not found",
                    target.class_name,
                    target.name,
                    target.descriptor.as_deref().unwrap_or("")
                ),
            );
            Resolution::Missing
        }
    };

    MethodReplacement {
        class_matcher,
        name_matcher,
        descriptor_matcher,
        class_template: Some(class_template),
        name_template: Some(name_template),
        descriptor_template,
        resolution,
    }
}

fn method_exists(pools: ClassPools<'_>, target: &MethodTarget) -> bool {
    match &target.descriptor {
        Some(descriptor) => pools
            .resolve_method(&target.class_name, &target.name, descriptor)
            .is_some(),
        None => pools.superclass_chain(&target.class_name).iter().any(|class| {
            class
                .methods
                .iter()
                .any(|m| class.method_name(m) == Some(target.name.as_str()))
        }),
    }
}

/// The replacement list, built once from the configuration and shared by
/// every rewriter of a run.
pub struct ReplacementResolver {
    types: Vec<TypeReplacement>,
    methods: Vec<MethodReplacement>,
    // Existence of deferred targets, so each missing name warns once.
    checked_types: RefCell<BTreeMap<String, bool>>,
    checked_methods: RefCell<BTreeMap<String, bool>>,
}

impl ReplacementResolver {
    pub fn new(pools: ClassPools<'_>, config: &BackportConfig, reporter: &dyn WarningReporter) -> Self {
        let types = config
            .type_replacements
            .iter()
            .map(|rule| resolve_type(pools, &rule.pattern, &rule.replacement, reporter))
            .collect();
        let methods = config
            .method_replacements
            .iter()
            .map(|rule| resolve_method(pools, rule, reporter))
            .collect();
        ReplacementResolver {
            types,
            methods,
            checked_types: RefCell::new(BTreeMap::new()),
            checked_methods: RefCell::new(BTreeMap::new()),
        }
    }

    pub fn type_replacements(&self) -> &[TypeReplacement] {
        &self.types
    }

    pub fn method_replacements(&self) -> &[MethodReplacement] {
        &self.methods
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty() && self.methods.is_empty()
    }

    /// The replacement of an internal class name. `None` when no record
    /// applies, the target is unavailable, or the name maps to itself.
    pub fn map_class(
        &self,
        pools: ClassPools<'_>,
        reporter: &dyn WarningReporter,
        name: &str,
    ) -> Option<String> {
        let record = self.types.iter().find(|t| t.matcher.matches(name))?;
        let replacement = match &record.resolution {
            Resolution::Resolved(target) => target.clone(),
            Resolution::Deferred => {
                let substituted = record.substitute(name)?;
                let exists = *self
                    .checked_types
                    .borrow_mut()
                    .entry(substituted.clone())
                    .or_insert_with(|| {
                        let exists = pools.lookup(&substituted).is_some();
                        if !exists {
                            reporter.report(
                                WarningCategory::MissingReplacement,
                                &format!("replacement class {} for {} not found", substituted, name),
                            );
                        }
                        exists
                    });
                if !exists {
                    return None;
                }
                substituted
            }
            Resolution::Missing | Resolution::Invalid(_) => return None,
        };
        (replacement != name).then_some(replacement)
    }

    /// Map every class name inside a descriptor. `None` when unchanged.
    pub fn map_descriptor(
        &self,
        pools: ClassPools<'_>,
        reporter: &dyn WarningReporter,
        descriptor: &str,
    ) -> Option<String> {
        if self.types.is_empty() {
            return None;
        }
        map_descriptor_classes(descriptor, |name| self.map_class(pools, reporter, name))
    }

    /// The replacement of a method invoked as `owner.name descriptor`.
    /// `static_call` tells whether the original call has no receiver.
    pub fn map_method(
        &self,
        pools: ClassPools<'_>,
        reporter: &dyn WarningReporter,
        owner: &str,
        name: &str,
        descriptor: &str,
        static_call: bool,
    ) -> Option<MethodMapping> {
        let record = self
            .methods
            .iter()
            .find(|m| m.matches(owner, name, descriptor))?;
        let target = match &record.resolution {
            Resolution::Resolved(target) => target.clone(),
            Resolution::Deferred => record.substitute(owner, name, descriptor)?,
            Resolution::Missing | Resolution::Invalid(_) => return None,
        };

        let mapped_descriptor = self
            .map_descriptor(pools, reporter, descriptor)
            .unwrap_or_else(|| descriptor.to_string());
        let mut candidates = Vec::new();
        match &target.descriptor {
            Some(explicit) => candidates.push(explicit.clone()),
            None => {
                candidates.push(mapped_descriptor.clone());
                if !static_call {
                    let receiver = self
                        .map_class(pools, reporter, owner)
                        .unwrap_or_else(|| owner.to_string());
                    if let Ok(parsed) = MethodDescriptor::parse(&mapped_descriptor) {
                        candidates.push(parsed.with_receiver(JvmType::Reference(receiver)).to_string());
                    }
                }
            }
        }

        for candidate in &candidates {
            if let Some(resolved) = pools.resolve_method(&target.class_name, &target.name, candidate) {
                let is_static = resolved.access_flags.contains(MethodAccessFlags::STATIC);
                // An instance target only replaces an instance call with the same shape.
                if !is_static && static_call {
                    continue;
                }
                if target.class_name == owner && target.name == name && *candidate == descriptor {
                    return None;
                }
                debug!(
                    "Replacing {}.{}{} with {}.{}{}",
                    owner, name, descriptor, target.class_name, target.name, candidate
                );
                return Some(MethodMapping {
                    class_name: target.class_name.clone(),
                    name: target.name.clone(),
                    descriptor: candidate.clone(),
                    is_static,
                    owner_is_interface: pools
                        .lookup(&target.class_name)
                        .is_some_and(|c| c.is_interface()),
                });
            }
        }

        let key = format!("{}.{}{}", target.class_name, target.name, candidates[0]);
        let first = self.checked_methods.borrow_mut().insert(key.clone(), false).is_none();
        if first {
            reporter.report(
                WarningCategory::MissingReplacement,
                &format!("replacement method {} for {}.{}{} not found", key, owner, name, descriptor),
            );
        }
        None
    }
}
