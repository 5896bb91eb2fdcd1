//! Desugaring of lambda metafactory call sites into generated classes.

use std::collections::{BTreeMap, BTreeSet};

use log::debug;

use crate::class_pool::{ClassPools, ResolvedMethod};
use crate::code_attribute::{CodeEditor, Instruction};
use crate::constant_info::{MemberKind, MemberRef};
use crate::descriptor::{JvmType, MethodDescriptor};
use crate::error::Result;
use crate::field_info::FieldAccessFlags;
use crate::method_info::MethodAccessFlags;
use crate::report::{WarningCategory, WarningReporter};
use crate::types::{package_of, ClassAccessFlags, ClassFile};

use super::access::{AccessRequest, Visibility};
use super::builder::{ClassBuilder, MethodBuilder};
use super::callsite::{CallSiteAnalysis, InvocationKind, LambdaExpression};
use super::registry::CompanionRegistry;

const INSTANCE_FIELD: &str = "INSTANCE";
const FACTORY_METHOD: &str = "lambdaFactory$";
const SERIALIZABLE: &str = "java/io/Serializable";

/// A class synthesized by a rewriter together with the code it emitted.
#[derive(Clone, Debug)]
pub struct GeneratedClass {
    pub class: ClassFile,
    pub emitted: Vec<Instruction>,
}

impl GeneratedClass {
    pub fn name(&self) -> &str {
        self.class.display_name()
    }
}

/// What desugaring one class produced besides edits to the class itself.
#[derive(Debug, Default)]
pub struct LambdaRewrite {
    pub changed: bool,
    pub classes: Vec<GeneratedClass>,
    pub access: Vec<AccessRequest>,
}

pub struct LambdaDesugarer<'a> {
    reporter: &'a dyn WarningReporter,
    allow_access_modification: bool,
}

impl<'a> LambdaDesugarer<'a> {
    pub fn new(reporter: &'a dyn WarningReporter, allow_access_modification: bool) -> Self {
        LambdaDesugarer {
            reporter,
            allow_access_modification,
        }
    }

    pub fn rewrite_class(
        &self,
        pools: ClassPools<'_>,
        registry: &mut CompanionRegistry,
        class: &mut ClassFile,
        analysis: &CallSiteAnalysis,
        emitted: &mut Vec<Instruction>,
    ) -> Result<LambdaRewrite> {
        let mut rewrite = LambdaRewrite::default();
        // invokedynamic constant -> replacement instruction
        let mut replacements: BTreeMap<u16, Instruction> = BTreeMap::new();
        // Bootstrap entries and their constants can outlive the last call site.
        let used: BTreeSet<u16> = analysis
            .lambda_sites()
            .map(|(site, _)| site.constant_index)
            .collect();

        for (&constant_index, lambda) in &analysis.lambdas {
            if !used.contains(&constant_index) {
                continue;
            }
            let through_accessor;
            let (lambda, access) = match self.check_target(lambda) {
                None => continue,
                Some(Reach::Direct(access)) => (lambda, access),
                Some(Reach::Accessor) => {
                    let Some(via) = self.add_accessor(class, lambda, emitted)? else {
                        continue;
                    };
                    rewrite.changed = true;
                    through_accessor = via;
                    (&through_accessor, Vec::new())
                }
            };
            let signature = lambda.signature();
            let class_name = match registry.lambda_class(&signature) {
                Some(existing) => existing.to_string(),
                None => {
                    let name = registry.next_lambda_name(&lambda.origin, |n| pools.lookup(n).is_some());
                    let generated = generate_lambda_class(class.major_version, &name, lambda)?;
                    debug!(
                        "{}: {} implements {} via {}.{}{}",
                        lambda.origin,
                        name,
                        lambda.functional_interface(),
                        lambda.target.class_name,
                        lambda.target.name,
                        lambda.target.descriptor
                    );
                    registry.register_lambda(&lambda.origin, signature, name.clone());
                    rewrite.classes.push(generated);
                    name
                }
            };
            rewrite.access.extend(access);

            let instruction = if lambda.is_capturing() {
                Instruction::Invokestatic(class.get_or_add_method_ref(
                    &class_name,
                    FACTORY_METHOD,
                    &lambda.factory_descriptor,
                )?)
            } else {
                Instruction::Getstatic(class.get_or_add_field_ref(
                    &class_name,
                    INSTANCE_FIELD,
                    &format!("L{};", class_name),
                )?)
            };
            replacements.insert(constant_index, instruction);
        }

        if replacements.is_empty() {
            return Ok(rewrite);
        }

        let mut by_method: BTreeMap<usize, Vec<(u32, Instruction)>> = BTreeMap::new();
        for (site, _) in analysis.lambda_sites() {
            if let Some(instruction) = replacements.get(&site.constant_index) {
                by_method
                    .entry(site.method_index)
                    .or_default()
                    .push((site.offset, instruction.clone()));
            }
        }
        for (method_index, sites) in by_method {
            let Some(code) = class.methods.get(method_index).and_then(|m| m.code()) else {
                continue;
            };
            let mut editor = CodeEditor::new(code)?;
            for (offset, instruction) in sites {
                editor.replace(offset, vec![instruction]);
            }
            rewrite.changed |= class.apply_code_edit(method_index, editor, emitted)?;
        }
        Ok(rewrite)
    }

    /// Decide how the generated class reaches the target, or `None` when the
    /// site must stay.
    fn check_target(&self, lambda: &LambdaExpression) -> Option<Reach> {
        let target = &lambda.target;
        let Some(resolved) = &lambda.resolved else {
            self.reporter.report(
                WarningCategory::UnresolvedTarget,
                &format!(
                    "{}: lambda target {}.{}{} not found",
                    lambda.origin, target.class_name, target.name, target.descriptor
                ),
            );
            return None;
        };

        let flags = resolved.access_flags;
        // A widened private instance method could be overridden by a
        // subclass method of the same name, so it is called nonvirtually
        // through a static accessor in its own class.
        if lambda.kind != InvocationKind::Constructor
            && flags.contains(MethodAccessFlags::PRIVATE)
            && !flags.contains(MethodAccessFlags::STATIC)
        {
            if resolved.owner == lambda.origin {
                return Some(Reach::Accessor);
            }
            self.reporter.report(
                WarningCategory::UnresolvedTarget,
                &format!(
                    "{}: private method {}.{}{} belongs to another class",
                    lambda.origin, resolved.owner, target.name, target.descriptor
                ),
            );
            return None;
        }

        let same_package = package_of(&resolved.owner) == package_of(&lambda.origin);
        let required = if flags.contains(MethodAccessFlags::PUBLIC) {
            None
        } else if flags.contains(MethodAccessFlags::PRIVATE) {
            if same_package && !resolved.owner_is_interface {
                Some(Visibility::Package)
            } else {
                Some(Visibility::Public)
            }
        } else if same_package {
            None
        } else {
            Some(Visibility::Public)
        };
        let Some(visibility) = required else {
            return Some(Reach::Direct(Vec::new()));
        };

        if !resolved.in_program {
            self.reporter.report(
                WarningCategory::UnresolvedTarget,
                &format!(
                    "{}: library method {}.{}{} is not accessible from a lambda class",
                    lambda.origin, resolved.owner, target.name, target.descriptor
                ),
            );
            return None;
        }
        if !resolved.is_synthetic && !self.allow_access_modification {
            self.reporter.report(
                WarningCategory::UnresolvedTarget,
                &format!(
                    "{}: {}.{}{} needs wider access, which is not allowed",
                    lambda.origin, resolved.owner, target.name, target.descriptor
                ),
            );
            return None;
        }
        Some(Reach::Direct(vec![AccessRequest {
            class_name: resolved.owner.clone(),
            name: target.name.clone(),
            descriptor: target.descriptor.clone(),
            visibility,
        }]))
    }

    /// Add `access$<name>` to `class`: a static method taking the receiver
    /// first that calls the private target with `invokespecial`. Returns the
    /// lambda rewritten to call it, or `None` when the name is taken.
    fn add_accessor(
        &self,
        class: &mut ClassFile,
        lambda: &LambdaExpression,
        emitted: &mut Vec<Instruction>,
    ) -> Result<Option<LambdaExpression>> {
        let target = &lambda.target;
        let owner_is_interface = lambda.resolved.as_ref().is_some_and(|r| r.owner_is_interface);
        let member_kind = if owner_is_interface {
            MemberKind::InterfaceMethod
        } else {
            MemberKind::Method
        };
        let body = MethodDescriptor::parse(&target.descriptor)?;
        let mut params = Vec::with_capacity(body.params.len() + 1);
        params.push(JvmType::Reference(target.class_name.clone()));
        params.extend(body.params.iter().cloned());
        let accessor = MethodDescriptor::new(params, body.ret.clone());
        let name = format!("access${}", target.name);
        let descriptor = accessor.to_string();

        let mut flags = MethodAccessFlags::STATIC | MethodAccessFlags::SYNTHETIC;
        if owner_is_interface {
            flags |= MethodAccessFlags::PUBLIC;
        }
        let existing = class
            .find_method(&name, &descriptor)
            .map(|m| m.is_static() && m.access_flags.contains(MethodAccessFlags::SYNTHETIC));
        match existing {
            Some(true) => {}
            Some(false) => {
                self.reporter.report(
                    WarningCategory::NameCollision,
                    &format!("{}: accessor {}{} already exists", lambda.origin, name, descriptor),
                );
                return Ok(None);
            }
            None => {
                let mut method = MethodBuilder::new(class);
                method.load_parameters(&accessor, 0);
                method.invoke_special(&MemberRef {
                    kind: member_kind,
                    ..target.clone()
                })?;
                method.emit(Instruction::return_for(&accessor.ret));
                emitted.extend(method.finish(flags, &name, &descriptor)?);
            }
        }

        Ok(Some(LambdaExpression {
            kind: InvocationKind::Static,
            target: MemberRef {
                kind: member_kind,
                class_name: target.class_name.clone(),
                name,
                descriptor,
            },
            resolved: Some(ResolvedMethod {
                owner: target.class_name.clone(),
                access_flags: flags,
                owner_is_interface,
                in_program: true,
                is_synthetic: true,
            }),
            ..lambda.clone()
        }))
    }
}

/// How a generated lambda class reaches its target.
#[derive(Debug, PartialEq, Eq)]
enum Reach {
    /// Call the target itself, after the listed widenings.
    Direct(Vec<AccessRequest>),
    /// Call a static accessor in the origin class.
    Accessor,
}

/// Build `name`, the implementation class of one lambda.
pub fn generate_lambda_class(
    major_version: u16,
    name: &str,
    lambda: &LambdaExpression,
) -> Result<GeneratedClass> {
    let mut builder = ClassBuilder::new(
        name,
        "java/lang/Object",
        ClassAccessFlags::FINAL | ClassAccessFlags::SYNTHETIC | ClassAccessFlags::SUPER,
        major_version,
    )?;
    for interface in &lambda.interfaces {
        builder.add_interface(interface)?;
    }
    if lambda.serializable {
        builder.add_interface(SERIALIZABLE)?;
    }

    let captured = lambda.captured_types();
    let fields: Vec<(String, String)> = captured
        .iter()
        .enumerate()
        .map(|(i, ty)| (format!("arg${}", i + 1), ty.to_descriptor()))
        .collect();
    for (field, descriptor) in &fields {
        builder.add_field(FieldAccessFlags::PRIVATE | FieldAccessFlags::FINAL, field, descriptor)?;
    }

    let mut emitted = Vec::new();
    let init = MethodDescriptor::new(captured.clone(), JvmType::Void);
    let init_descriptor = init.to_string();

    // Constructor: store every captured value.
    {
        let mut method = builder.method();
        method.emit(Instruction::Aload0);
        method.invoke_special(&object_init())?;
        let mut slot = 1;
        for (ty, (field, descriptor)) in captured.iter().zip(&fields) {
            method.emit(Instruction::Aload0);
            method.emit(Instruction::load(ty, slot));
            method.put_field(name, field, descriptor)?;
            slot += ty.slots();
        }
        method.emit(Instruction::Return);
        emitted.extend(method.finish(MethodAccessFlags::PRIVATE, "<init>", &init_descriptor)?);
    }

    let self_type = format!("L{};", name);
    let constructor = MemberRef {
        kind: MemberKind::Method,
        class_name: name.to_string(),
        name: "<init>".to_string(),
        descriptor: init_descriptor,
    };
    let class_index = builder.class_mut().get_or_add_class(name)?;
    if captured.is_empty() {
        builder.add_field(
            FieldAccessFlags::PUBLIC | FieldAccessFlags::STATIC | FieldAccessFlags::FINAL,
            INSTANCE_FIELD,
            &self_type,
        )?;
        let mut method = builder.method();
        method.emit(Instruction::New(class_index));
        method.emit(Instruction::Dup);
        method.invoke_special(&constructor)?;
        method.put_static(name, INSTANCE_FIELD, &self_type)?;
        method.emit(Instruction::Return);
        emitted.extend(method.finish(MethodAccessFlags::STATIC, "<clinit>", "()V")?);
    } else {
        let mut method = builder.method();
        method.emit(Instruction::New(class_index));
        method.emit(Instruction::Dup);
        method.load_parameters(&init, 0);
        method.invoke_special(&constructor)?;
        method.emit(Instruction::Areturn);
        emitted.extend(method.finish(
            MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
            FACTORY_METHOD,
            &lambda.factory_descriptor,
        )?);
    }

    let instantiated = MethodDescriptor::parse(&lambda.instantiated_descriptor)?;
    let mut implemented = vec![lambda.method_descriptor.clone()];
    implemented.extend(lambda.bridge_descriptors.iter().cloned());
    for (position, descriptor) in implemented.iter().enumerate() {
        let functional = MethodDescriptor::parse(descriptor)?;
        let mut method = builder.method();
        delegate(&mut method, name, lambda, &captured, &fields, &functional, &instantiated)?;
        let mut flags = MethodAccessFlags::PUBLIC;
        if position > 0 {
            flags |= MethodAccessFlags::BRIDGE | MethodAccessFlags::SYNTHETIC;
        }
        emitted.extend(method.finish(flags, &lambda.method_name, descriptor)?);
    }

    Ok(GeneratedClass {
        class: builder.build(),
        emitted,
    })
}

fn object_init() -> MemberRef {
    MemberRef {
        kind: MemberKind::Method,
        class_name: "java/lang/Object".to_string(),
        name: "<init>".to_string(),
        descriptor: "()V".to_string(),
    }
}

/// Body of a functional method: push the captured values and the
/// arguments, call the target and convert the result.
fn delegate(
    method: &mut MethodBuilder<'_>,
    class_name: &str,
    lambda: &LambdaExpression,
    captured: &[JvmType],
    fields: &[(String, String)],
    functional: &MethodDescriptor,
    instantiated: &MethodDescriptor,
) -> Result<()> {
    let target = &lambda.target;
    let target_descriptor = MethodDescriptor::parse(&target.descriptor)?;
    let owner_type = JvmType::Reference(target.class_name.clone());

    let mut expected = Vec::with_capacity(target_descriptor.params.len() + 1);
    if lambda.kind.has_receiver() {
        expected.push(owner_type.clone());
    }
    expected.extend(target_descriptor.params.iter().cloned());

    if lambda.kind == InvocationKind::Constructor {
        method.new_object(&target.class_name)?;
        method.emit(Instruction::Dup);
    }

    let mut expected_types = expected.iter();
    for (ty, (field, descriptor)) in captured.iter().zip(fields) {
        method.emit(Instruction::Aload0);
        method.get_field(class_name, field, descriptor)?;
        if let Some(to) = expected_types.next() {
            method.adapt(ty, to)?;
        }
    }
    let mut slot = 1;
    for (position, ty) in functional.params.iter().enumerate() {
        method.emit(Instruction::load(ty, slot));
        slot += ty.slots();
        let through = instantiated.params.get(position).unwrap_or(ty);
        method.adapt(ty, through)?;
        if let Some(to) = expected_types.next() {
            method.adapt(through, to)?;
        }
    }

    let owner_is_interface = lambda
        .resolved
        .as_ref()
        .map(|r| r.owner_is_interface)
        .unwrap_or(target.kind == MemberKind::InterfaceMethod);
    let mut call = target.clone();
    match lambda.kind {
        InvocationKind::Static => method.invoke_static(&call)?,
        InvocationKind::Constructor => method.invoke_special(&call)?,
        InvocationKind::Virtual | InvocationKind::Interface | InvocationKind::Special => {
            call.kind = if owner_is_interface {
                MemberKind::InterfaceMethod
            } else {
                MemberKind::Method
            };
            method.invoke_instance(&call)?;
        }
    }

    let result = if lambda.kind == InvocationKind::Constructor {
        owner_type
    } else {
        target_descriptor.ret
    };
    if functional.ret == JvmType::Void {
        match result.slots() {
            2 => {
                method.emit(Instruction::Pop2);
            }
            1 => {
                method.emit(Instruction::Pop);
            }
            _ => {}
        }
    } else {
        let through = if instantiated.ret == JvmType::Void {
            &functional.ret
        } else {
            &instantiated.ret
        };
        method.adapt(&result, through)?;
        method.adapt(through, &functional.ret)?;
    }
    method.emit(Instruction::return_for(&functional.ret));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backport::callsite::DynamicCallSite;
    use crate::class_pool::ClassPool;
    use crate::code_attribute::decode_code;
    use crate::report::CollectingReporter;
    use crate::types::version;

    fn lambda(factory: &str, target: MemberRef, kind: InvocationKind, flags: MethodAccessFlags) -> LambdaExpression {
        LambdaExpression {
            origin: "p/Main".into(),
            bootstrap_index: 0,
            factory_descriptor: factory.into(),
            interfaces: vec!["java/util/function/Function".into()],
            method_name: "apply".into(),
            method_descriptor: "(Ljava/lang/Object;)Ljava/lang/Object;".into(),
            instantiated_descriptor: "(Ljava/lang/String;)Ljava/lang/Integer;".into(),
            bridge_descriptors: Vec::new(),
            kind,
            resolved: Some(ResolvedMethod {
                owner: target.class_name.clone(),
                access_flags: flags,
                owner_is_interface: false,
                in_program: target.class_name.starts_with("p/"),
                is_synthetic: flags.contains(MethodAccessFlags::SYNTHETIC),
            }),
            target,
            serializable: false,
        }
    }

    fn string_length() -> MemberRef {
        MemberRef {
            kind: MemberKind::Method,
            class_name: "java/lang/String".into(),
            name: "length".into(),
            descriptor: "()I".into(),
        }
    }

    #[test]
    fn non_capturing_lambda_gets_a_singleton() {
        let expression = lambda(
            "()Ljava/util/function/Function;",
            string_length(),
            InvocationKind::Virtual,
            MethodAccessFlags::PUBLIC,
        );
        let generated = generate_lambda_class(version::JAVA_8, "p/Main$$Lambda$0", &expression).unwrap();
        let class = &generated.class;
        assert_eq!(class.interface_names(), vec!["java/util/function/Function"]);
        assert!(class.find_field(INSTANCE_FIELD, "Lp/Main$$Lambda$0;").is_some());
        assert!(class.find_method("<clinit>", "()V").is_some());

        let apply = class
            .find_method("apply", "(Ljava/lang/Object;)Ljava/lang/Object;")
            .unwrap();
        let code: Vec<Instruction> = decode_code(&apply.code().unwrap().code)
            .unwrap()
            .into_iter()
            .map(|(_, i)| i)
            .collect();
        // load, checkcast String, invokevirtual length, Integer.valueOf, areturn
        assert_eq!(code[0], Instruction::Aload1);
        assert!(matches!(code[1], Instruction::Checkcast(_)));
        assert!(matches!(code[2], Instruction::Invokevirtual(_)));
        assert!(matches!(code[3], Instruction::Invokestatic(_)));
        assert_eq!(code[4], Instruction::Areturn);
    }

    #[test]
    fn capturing_lambda_gets_fields_and_a_factory() {
        let target = MemberRef {
            kind: MemberKind::Method,
            class_name: "p/Main".into(),
            name: "lambda$run$0".into(),
            descriptor: "(JLjava/lang/String;)Ljava/lang/Integer;".into(),
        };
        let expression = lambda(
            "(J)Ljava/util/function/Function;",
            target,
            InvocationKind::Static,
            MethodAccessFlags::PRIVATE | MethodAccessFlags::STATIC | MethodAccessFlags::SYNTHETIC,
        );
        let generated = generate_lambda_class(version::JAVA_8, "p/Main$$Lambda$1", &expression).unwrap();
        let class = &generated.class;
        assert!(class.find_field("arg$1", "J").is_some());
        assert!(class.find_field(INSTANCE_FIELD, "Lp/Main$$Lambda$1;").is_none());
        let factory = class
            .find_method(FACTORY_METHOD, "(J)Ljava/util/function/Function;")
            .unwrap();
        assert!(factory.is_static());
        let init = class.find_method("<init>", "(J)V").unwrap();
        assert_eq!(init.code().unwrap().max_locals, 3);
    }

    #[test]
    fn private_targets_need_permission_unless_synthetic() {
        let reporter = CollectingReporter::new();
        let target = MemberRef {
            kind: MemberKind::Method,
            class_name: "p/Main".into(),
            name: "helper".into(),
            descriptor: "(Ljava/lang/String;)Ljava/lang/Integer;".into(),
        };
        let private = lambda(
            "()Ljava/util/function/Function;",
            target.clone(),
            InvocationKind::Static,
            MethodAccessFlags::PRIVATE | MethodAccessFlags::STATIC,
        );
        let strict = LambdaDesugarer::new(&reporter, false);
        assert!(strict.check_target(&private).is_none());
        assert_eq!(reporter.count(WarningCategory::UnresolvedTarget), 1);

        let permissive = LambdaDesugarer::new(&reporter, true);
        let Some(Reach::Direct(requests)) = permissive.check_target(&private) else {
            panic!("expected a direct call");
        };
        assert_eq!(requests[0].visibility, Visibility::Package);

        let synthetic = lambda(
            "()Ljava/util/function/Function;",
            target,
            InvocationKind::Static,
            MethodAccessFlags::PRIVATE | MethodAccessFlags::STATIC | MethodAccessFlags::SYNTHETIC,
        );
        assert!(matches!(strict.check_target(&synthetic), Some(Reach::Direct(r)) if r.len() == 1));
    }

    #[test]
    fn private_instance_targets_go_through_an_accessor() {
        let reporter = CollectingReporter::new();
        let target = MemberRef {
            kind: MemberKind::Method,
            class_name: "p/Main".into(),
            name: "lambda$run$0".into(),
            descriptor: "(Ljava/lang/String;)Ljava/lang/Integer;".into(),
        };
        let mut expression = lambda(
            "(Lp/Main;)Ljava/util/function/Function;",
            target,
            InvocationKind::Special,
            MethodAccessFlags::PRIVATE | MethodAccessFlags::SYNTHETIC,
        );
        let desugarer = LambdaDesugarer::new(&reporter, false);
        assert_eq!(desugarer.check_target(&expression), Some(Reach::Accessor));

        let mut class = ClassFile::empty(version::JAVA_8);
        class.this_class = class.get_or_add_class("p/Main").unwrap();
        let mut emitted = Vec::new();
        let via = desugarer
            .add_accessor(&mut class, &expression, &mut emitted)
            .unwrap()
            .unwrap();
        assert_eq!(via.kind, InvocationKind::Static);
        assert_eq!(via.target.name, "access$lambda$run$0");
        assert_eq!(via.target.descriptor, "(Lp/Main;Ljava/lang/String;)Ljava/lang/Integer;");
        assert_eq!(desugarer.check_target(&via), Some(Reach::Direct(Vec::new())));

        let accessor = class.find_method(&via.target.name, &via.target.descriptor).unwrap();
        assert!(accessor.is_static());
        assert_eq!(
            emitted,
            vec![
                Instruction::Aload0,
                Instruction::Aload1,
                Instruction::Invokespecial(class.get_or_add_member_ref(&expression.target).unwrap()),
                Instruction::Areturn,
            ]
        );

        expression.origin = "p/Other".into();
        assert!(desugarer.check_target(&expression).is_none());
        assert_eq!(reporter.count(WarningCategory::UnresolvedTarget), 1);
    }

    #[test]
    fn unresolved_targets_are_reported() {
        let reporter = CollectingReporter::new();
        let mut expression = lambda(
            "()Ljava/util/function/Function;",
            string_length(),
            InvocationKind::Virtual,
            MethodAccessFlags::PUBLIC,
        );
        expression.resolved = None;
        let program = ClassPool::new();
        let library = ClassPool::new();
        let mut analysis = CallSiteAnalysis::default();
        analysis.lambdas.insert(1, expression);
        analysis.sites.push(DynamicCallSite {
            method_index: 0,
            offset: 0,
            constant_index: 1,
            bootstrap_index: 0,
            name: "apply".into(),
            descriptor: "()Ljava/util/function/Function;".into(),
        });
        let mut class = ClassFile::empty(version::JAVA_8);
        class.this_class = class.get_or_add_class("p/Main").unwrap();
        let mut registry = CompanionRegistry::new();
        let rewrite = LambdaDesugarer::new(&reporter, true)
            .rewrite_class(
                ClassPools::new(&program, &library),
                &mut registry,
                &mut class,
                &analysis,
                &mut Vec::new(),
            )
            .unwrap();
        assert!(rewrite.classes.is_empty());
        assert!(!rewrite.changed);
        assert_eq!(reporter.count(WarningCategory::UnresolvedTarget), 1);
    }
}
