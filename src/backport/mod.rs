//! Version-gated rewriting of a program pool.
//!
//! [`Backporter::run`] applies the passes in a fixed order: API reference
//! replacement, string concatenation, lambdas, interface methods. Every
//! class is rewritten on a working copy that only replaces the pooled class
//! once the pass succeeded; a structural error restores the class as it
//! was before the run.

mod access;
mod builder;
mod callsite;
mod concat;
mod eval;
mod interface;
mod lambda;
mod registry;

use std::collections::{BTreeMap, BTreeSet};

use log::{debug, error, info};

pub use access::{AccessFixer, AccessRequest, Visibility};
pub use builder::{ClassBuilder, MethodBuilder};
pub use callsite::{
    analyze_call_sites, CallSiteAnalysis, CallSiteAnalyzer, ConcatConstant, ConcatRecipe,
    DynamicCallSite, InvocationKind, LambdaExpression, LAMBDA_METAFACTORY, STRING_CONCAT_FACTORY,
};
pub use concat::StringConcatDesugarer;
pub use eval::{
    ConstantValue, Evaluation, EvaluationError, NoOracle, PartialEvaluator, ValueOracle,
};
pub use interface::{Forwarder, InterfaceMethodExtractor, InterfacePlan, MovedKind, MovedMethod};
pub use lambda::{generate_lambda_class, GeneratedClass, LambdaDesugarer, LambdaRewrite};
pub use registry::CompanionRegistry;

use crate::class_pool::{ClassPool, ClassPools};
use crate::code_attribute::{decode_code, Instruction};
use crate::constant_info::{ConstantInfo, Utf8Constant};
use crate::error::{BackportError, Result};
use crate::replace::{MethodReplacementRule, ReferenceRewriter, ReplacementResolver, TypeReplacementRule};
use crate::report::{NoopReporter, WarningCategory, WarningReporter};
use crate::types::{version, ClassFile};

/// Options for a run. `target_version` is a class-file major version; zero
/// disables every version-gated pass.
#[derive(Clone, Debug, Default)]
pub struct BackportConfig {
    pub target_version: u16,
    /// Allow widening the access of non-synthetic members.
    pub allow_access_modification: bool,
    pub type_replacements: Vec<TypeReplacementRule>,
    pub method_replacements: Vec<MethodReplacementRule>,
    /// Fold constant operands of rewritten call sites for diagnostics.
    pub partial_evaluation: bool,
}

impl BackportConfig {
    pub fn new(target_version: u16) -> Self {
        BackportConfig {
            target_version,
            ..BackportConfig::default()
        }
    }

    fn below(&self, major_version: u16) -> bool {
        self.target_version != 0 && self.target_version < major_version
    }
}

/// Names touched by a run, each list sorted.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub modified: Vec<String>,
    pub created: Vec<String>,
    /// Classes left as they were because rewriting them failed.
    pub aborted: Vec<String>,
}

pub struct Backporter<'r> {
    config: BackportConfig,
    reporter: &'r dyn WarningReporter,
}

impl<'r> Backporter<'r> {
    pub fn new(config: BackportConfig, reporter: &'r dyn WarningReporter) -> Result<Self> {
        if config.target_version != 0 && config.target_version < version::JAVA_1_1 {
            return Err(BackportError::Config {
                reason: format!(
                    "target version {} is below {}",
                    config.target_version,
                    version::JAVA_1_1
                ),
            });
        }
        Ok(Backporter { config, reporter })
    }

    pub fn config(&self) -> &BackportConfig {
        &self.config
    }

    pub fn run(&self, program: &mut ClassPool, library: &ClassPool) -> RunSummary {
        self.run_with(program, library, |_| {}, |_, _| {})
    }

    /// Run every pass. `on_modified` is called once per mutated or created
    /// class and `on_instruction` for each instruction a rewriter emitted
    /// into it, both in class name order.
    pub fn run_with<M, I>(
        &self,
        program: &mut ClassPool,
        library: &ClassPool,
        mut on_modified: M,
        mut on_instruction: I,
    ) -> RunSummary
    where
        M: FnMut(&str),
        I: FnMut(&str, &Instruction),
    {
        let mut state = RunState::default();
        let reporter = self.reporter;
        let resolver = ReplacementResolver::new(ClassPools::new(program, library), &self.config, reporter);

        if !resolver.is_empty() {
            debug!(
                "Applying {} type and {} method replacements",
                resolver.type_replacements().len(),
                resolver.method_replacements().len()
            );
            let rewriter = ReferenceRewriter::new(&resolver, reporter);
            for name in program.class_names() {
                state.transform(reporter, program, library, &name, |pools, _, class, emitted| {
                    rewriter.rewrite_class(pools, class, emitted).map(PassOutput::from)
                });
            }
        }

        // The first call-site pass reports malformed entries, later ones
        // analyze quietly.
        let mut analysis_reporter: &dyn WarningReporter = reporter;

        if self.config.below(version::JAVA_9) {
            let evaluator = PartialEvaluator::default();
            let oracle: &dyn ValueOracle = if self.config.partial_evaluation {
                &evaluator
            } else {
                &NoOracle
            };
            let desugarer = StringConcatDesugarer::new(oracle);
            for name in program.class_names() {
                state.transform(reporter, program, library, &name, |pools, _, class, emitted| {
                    let analysis = analyze_call_sites(pools, analysis_reporter, class)?;
                    if analysis.concats.is_empty() {
                        return Ok(PassOutput::default());
                    }
                    desugarer.rewrite_class(class, &analysis, emitted).map(PassOutput::from)
                });
            }
            analysis_reporter = &NoopReporter;
        }

        if self.config.below(version::JAVA_8) {
            let desugarer = LambdaDesugarer::new(reporter, self.config.allow_access_modification);
            for name in program.class_names() {
                state.transform(reporter, program, library, &name, |pools, registry, class, emitted| {
                    let analysis = analyze_call_sites(pools, analysis_reporter, class)?;
                    if analysis.lambdas.is_empty() {
                        return Ok(PassOutput::default());
                    }
                    let rewrite = desugarer.rewrite_class(pools, registry, class, &analysis, emitted)?;
                    Ok(PassOutput {
                        changed: rewrite.changed,
                        classes: rewrite.classes,
                        access: rewrite.access,
                    })
                });
            }

            let extractor = InterfaceMethodExtractor::new(reporter);
            let plan = extractor.plan(ClassPools::new(program, library), &mut state.registry);
            if !plan.is_empty() {
                for companion in &plan.companions {
                    state.add_created(reporter, program, companion.clone());
                }
                for name in program.class_names() {
                    state.transform(reporter, program, library, &name, |_, _, class, emitted| {
                        extractor.rewrite_class(&plan, class, emitted).map(PassOutput::from)
                    });
                }
            }
        }

        if !state.access.is_empty() {
            for name in state.access.apply(program) {
                state.mark_modified(name);
            }
        }

        if self.config.target_version != 0 {
            let target = self.config.target_version;
            for name in program.class_names() {
                state.transform(reporter, program, library, &name, |_, _, class, _| {
                    lower_version(class, target).map(PassOutput::from)
                });
            }
        }

        let summary = state.summary();
        for name in summary.modified.iter().chain(&summary.created) {
            if let Some(instructions) = state.emitted.get(name) {
                for instruction in instructions {
                    on_instruction(name.as_str(), instruction);
                }
            }
        }
        let mut touched: Vec<&str> = summary
            .modified
            .iter()
            .chain(&summary.created)
            .map(String::as_str)
            .collect();
        touched.sort_unstable();
        for name in touched {
            on_modified(name);
        }
        info!(
            "Backported {} classes, created {}, left {} unmodified after errors",
            summary.modified.len(),
            summary.created.len(),
            summary.aborted.len()
        );
        summary
    }
}

#[derive(Default)]
struct PassOutput {
    changed: bool,
    classes: Vec<GeneratedClass>,
    access: Vec<AccessRequest>,
}

impl From<bool> for PassOutput {
    fn from(changed: bool) -> Self {
        PassOutput {
            changed,
            ..PassOutput::default()
        }
    }
}

#[derive(Default)]
struct RunState {
    registry: CompanionRegistry,
    access: AccessFixer,
    // Classes as they were before the run, saved on first change.
    originals: BTreeMap<String, ClassFile>,
    modified: BTreeSet<String>,
    created: BTreeSet<String>,
    aborted: BTreeSet<String>,
    emitted: BTreeMap<String, Vec<Instruction>>,
}

impl RunState {
    /// Run one pass over a working copy of `name` and commit it on success.
    fn transform<F>(
        &mut self,
        reporter: &dyn WarningReporter,
        program: &mut ClassPool,
        library: &ClassPool,
        name: &str,
        pass: F,
    ) where
        F: FnOnce(ClassPools<'_>, &mut CompanionRegistry, &mut ClassFile, &mut Vec<Instruction>) -> Result<PassOutput>,
    {
        if self.aborted.contains(name) {
            return;
        }
        let Some(mut working) = program.lookup(name).cloned() else {
            return;
        };
        let mut emitted = Vec::new();
        let result = pass(
            ClassPools::new(program, library),
            &mut self.registry,
            &mut working,
            &mut emitted,
        );
        let output = match result {
            Ok(output) => output,
            Err(e) => return self.abort(reporter, program, name, e),
        };
        if output.changed {
            if !self.created.contains(name) && !self.originals.contains_key(name) {
                if let Some(original) = program.lookup(name) {
                    self.originals.insert(name.to_string(), original.clone());
                }
            }
            if let Err(e) = program.insert(working) {
                return self.abort(reporter, program, name, e);
            }
            self.emitted.entry(name.to_string()).or_default().extend(emitted);
            self.mark_modified(name.to_string());
        }
        for generated in output.classes {
            self.add_created(reporter, program, generated);
        }
        for request in output.access {
            self.access.request(request);
        }
    }

    fn add_created(&mut self, reporter: &dyn WarningReporter, program: &mut ClassPool, generated: GeneratedClass) {
        let name = generated.name().to_string();
        if program.contains(&name) {
            reporter.report(
                WarningCategory::NameCollision,
                &format!("generated class {} already exists", name),
            );
            return;
        }
        match program.insert(generated.class) {
            Ok(_) => {
                debug!("Created {}", name);
                self.emitted.entry(name.clone()).or_default().extend(generated.emitted);
                self.created.insert(name);
            }
            Err(e) => reporter.report(
                WarningCategory::StructuralViolation,
                &format!("generated class {} dropped: {}", name, e),
            ),
        }
    }

    fn mark_modified(&mut self, name: String) {
        if !self.created.contains(&name) {
            self.modified.insert(name);
        }
    }

    fn abort(&mut self, reporter: &dyn WarningReporter, program: &mut ClassPool, name: &str, e: BackportError) {
        error!("{} left unmodified: {}", name, e);
        reporter.report(WarningCategory::StructuralViolation, &format!("{}: {}", name, e));
        if let Some(original) = self.originals.remove(name) {
            // The original was read from this pool under the same name.
            let _ = program.insert(original);
        }
        self.modified.remove(name);
        self.emitted.remove(name);
        for lambda in self.registry.discard_origin(name) {
            program.remove(&lambda);
            self.created.remove(&lambda);
            self.emitted.remove(&lambda);
        }
        self.aborted.insert(name.to_string());
    }

    fn summary(&self) -> RunSummary {
        RunSummary {
            modified: self.modified.iter().cloned().collect(),
            created: self.created.iter().cloned().collect(),
            aborted: self.aborted.iter().cloned().collect(),
        }
    }
}

/// Lower the class file version to `target` and, below Java 7, scrub
/// constants the older format cannot hold.
fn lower_version(class: &mut ClassFile, target: u16) -> Result<bool> {
    let mut changed = false;
    if target < version::JAVA_7 {
        changed |= scrub_dynamic_constants(class)?;
    }
    if class.major_version > target {
        debug!("{}: version {} -> {}", class.display_name(), class.major_version, target);
        class.major_version = target;
        class.minor_version = 0;
        changed = true;
    }
    Ok(changed)
}

/// Replace method handle, method type and dynamic constants that nothing
/// uses any more, and drop an unused BootstrapMethods attribute.
pub fn scrub_dynamic_constants(class: &mut ClassFile) -> Result<bool> {
    let mut live: BTreeSet<u16> = BTreeSet::new();
    for method in &class.methods {
        let Some(code) = method.code() else {
            continue;
        };
        for (_, instruction) in decode_code(&code.code)? {
            match instruction {
                Instruction::Invokedynamic { index, .. } | Instruction::LdcW(index) | Instruction::Ldc2W(index) => {
                    live.insert(index);
                }
                Instruction::Ldc(index) => {
                    live.insert(index as u16);
                }
                _ => {}
            }
        }
    }

    // Bootstrap methods reachable from live constants, with their arguments.
    let mut live_bootstrap: BTreeSet<u16> = BTreeSet::new();
    let mut pending: Vec<u16> = live.iter().copied().collect();
    while let Some(index) = pending.pop() {
        let bootstrap_index = match class.constant(index) {
            Some(ConstantInfo::InvokeDynamic(c)) => c.bootstrap_method_attr_index,
            Some(ConstantInfo::Dynamic(c)) => c.bootstrap_method_attr_index,
            _ => continue,
        };
        if !live_bootstrap.insert(bootstrap_index) {
            continue;
        }
        let Some(method) = class
            .bootstrap_methods()
            .and_then(|b| b.bootstrap_methods.get(bootstrap_index as usize))
        else {
            continue;
        };
        for &referenced in std::iter::once(&method.bootstrap_method_ref).chain(&method.bootstrap_arguments) {
            if live.insert(referenced) {
                pending.push(referenced);
            }
        }
    }

    let mut changed = false;
    for (position, constant) in class.const_pool.iter_mut().enumerate() {
        let index = position as u16 + 1;
        if constant.requires_invokedynamic_support() && !live.contains(&index) {
            *constant = ConstantInfo::Utf8(Utf8Constant::new(""));
            changed = true;
        }
    }
    if live_bootstrap.is_empty() && class.bootstrap_methods().is_some() {
        class.remove_bootstrap_methods();
        changed = true;
    }
    if changed {
        debug!("{}: scrubbed dynamic constants", class.display_name());
    }
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constant_info::{reference_kind, InvokeDynamicConstant, MemberKind, MemberRef};
    use crate::attribute_info::BootstrapMethod;
    use crate::report::CollectingReporter;

    #[test]
    fn rejects_targets_below_java_1_1() {
        let reporter = CollectingReporter::new();
        assert!(matches!(
            Backporter::new(BackportConfig::new(44), &reporter),
            Err(BackportError::Config { .. })
        ));
        assert!(Backporter::new(BackportConfig::new(0), &reporter).is_ok());
        assert!(Backporter::new(BackportConfig::new(version::JAVA_1_1), &reporter).is_ok());
    }

    #[test]
    fn zero_target_leaves_versions_alone() {
        let mut class = ClassFile::empty(version::JAVA_17);
        class.this_class = class.get_or_add_class("p/A").unwrap();
        let mut program = ClassPool::from_classes([class]).unwrap();
        let library = ClassPool::new();
        let reporter = CollectingReporter::new();
        let summary = Backporter::new(BackportConfig::default(), &reporter)
            .unwrap()
            .run(&mut program, &library);
        assert!(summary.modified.is_empty());
        assert_eq!(program.lookup("p/A").unwrap().major_version, version::JAVA_17);
    }

    #[test]
    fn unused_dynamic_constants_are_scrubbed() {
        let mut class = ClassFile::empty(version::JAVA_8);
        class.this_class = class.get_or_add_class("p/A").unwrap();
        let handle = class
            .get_or_add_method_handle(
                reference_kind::INVOKE_STATIC,
                &MemberRef {
                    kind: MemberKind::Method,
                    class_name: "p/A".into(),
                    name: "bootstrap".into(),
                    descriptor: "()V".into(),
                },
            )
            .unwrap();
        class.ensure_bootstrap_methods().unwrap().bootstrap_methods.push(BootstrapMethod {
            bootstrap_method_ref: handle,
            bootstrap_arguments: Vec::new(),
        });
        let nat = class.get_or_add_name_and_type("run", "()V").unwrap();
        let indy = class
            .add_constant(ConstantInfo::InvokeDynamic(InvokeDynamicConstant {
                bootstrap_method_attr_index: 0,
                name_and_type_index: nat,
            }))
            .unwrap();

        assert!(scrub_dynamic_constants(&mut class).unwrap());
        assert!(!class.constant(handle).unwrap().requires_invokedynamic_support());
        assert!(!class.constant(indy).unwrap().requires_invokedynamic_support());
        assert!(class.bootstrap_methods().is_none());
        assert!(!scrub_dynamic_constants(&mut class).unwrap());
    }
}
