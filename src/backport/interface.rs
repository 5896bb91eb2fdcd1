//! Extraction of static, private and default interface methods into
//! companion classes.
//!
//! Planning reads the whole program before anything changes: it builds the
//! companions, records every moved method and decides which classes need
//! forwarders for inherited defaults. Applying the plan then rewrites one
//! class at a time.

use std::collections::{BTreeMap, BTreeSet};

use log::debug;

use crate::class_pool::ClassPools;
use crate::code_attribute::{decode_code, CodeEditor, Instruction};
use crate::constant_info::{ConstantInfo, MemberKind, MemberRef, MethodRefConstant};
use crate::descriptor::{JvmType, MethodDescriptor};
use crate::error::Result;
use crate::method_info::MethodAccessFlags;
use crate::report::{WarningCategory, WarningReporter};
use crate::types::{ClassAccessFlags, ClassFile};

use super::builder::{ClassBuilder, MethodBuilder};
use super::lambda::GeneratedClass;
use super::registry::CompanionRegistry;

/// Method-level attributes that describe the old signature and are dropped
/// when a receiver parameter is added.
const SIGNATURE_ATTRIBUTES: [&str; 2] = ["Signature", "MethodParameters"];

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MovedKind {
    Static,
    Default,
    Private,
}

/// A method whose body now lives in a companion class.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MovedMethod {
    pub interface: String,
    pub companion: String,
    pub name: String,
    pub descriptor: String,
    pub kind: MovedKind,
    /// Descriptor of the companion method: with a receiver for instance
    /// methods.
    pub companion_descriptor: String,
}

impl MovedMethod {
    fn companion_ref(&self) -> MemberRef {
        MemberRef {
            kind: MemberKind::Method,
            class_name: self.companion.clone(),
            name: self.name.clone(),
            descriptor: self.companion_descriptor.clone(),
        }
    }
}

/// An inherited default that a class must implement explicitly.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Forwarder {
    pub name: String,
    pub descriptor: String,
    pub target: MovedMethod,
}

type MemberKey = (String, String, String);

/// Everything decided before any class is rewritten.
#[derive(Debug, Default)]
pub struct InterfacePlan {
    pub moved: BTreeMap<MemberKey, MovedMethod>,
    pub companions: Vec<GeneratedClass>,
    pub forwarders: BTreeMap<String, Vec<Forwarder>>,
}

impl InterfacePlan {
    pub fn is_empty(&self) -> bool {
        self.moved.is_empty()
    }

    pub fn lookup(&self, class_name: &str, name: &str, descriptor: &str) -> Option<&MovedMethod> {
        self.moved
            .get(&(class_name.to_string(), name.to_string(), descriptor.to_string()))
    }

    fn moves_from(&self, interface: &str) -> bool {
        self.moved.values().any(|m| m.interface == interface)
    }
}

pub struct InterfaceMethodExtractor<'a> {
    reporter: &'a dyn WarningReporter,
}

impl<'a> InterfaceMethodExtractor<'a> {
    pub fn new(reporter: &'a dyn WarningReporter) -> Self {
        InterfaceMethodExtractor { reporter }
    }

    /// Scan every program interface, build the companions and find the
    /// classes that need forwarders.
    pub fn plan(&self, pools: ClassPools<'_>, registry: &mut CompanionRegistry) -> InterfacePlan {
        let mut plan = InterfacePlan::default();
        for (name, class) in pools.program.iter() {
            if !class.is_interface() || registry.is_lambda_class(name) {
                continue;
            }
            let qualifying = qualifying_methods(class);
            if qualifying.is_empty() {
                continue;
            }
            let companion = registry.companion_name(name);
            if pools.lookup(&companion).is_some() {
                self.reporter.report(
                    WarningCategory::NameCollision,
                    &format!("{}: companion class {} already exists", name, companion),
                );
                continue;
            }
            match self.build_companion(class, &companion, &qualifying) {
                Ok(Some((generated, moved))) => {
                    debug!("{}: moving {} methods to {}", name, moved.len(), companion);
                    for method in moved {
                        let key = (method.interface.clone(), method.name.clone(), method.descriptor.clone());
                        plan.moved.insert(key, method);
                    }
                    plan.companions.push(generated);
                }
                Ok(None) => {}
                Err(e) => self.reporter.report(
                    WarningCategory::StructuralViolation,
                    &format!("{}: companion class not created: {}", name, e),
                ),
            }
        }
        if !plan.is_empty() {
            self.plan_forwarders(pools, &mut plan);
        }
        plan
    }

    fn build_companion(
        &self,
        interface: &ClassFile,
        companion: &str,
        qualifying: &[(usize, MovedKind)],
    ) -> Result<Option<(GeneratedClass, Vec<MovedMethod>)>> {
        let interface_name = interface.name()?.to_string();
        let mut builder = ClassBuilder::with_pool(
            interface.const_pool.clone(),
            companion,
            "java/lang/Object",
            ClassAccessFlags::PUBLIC | ClassAccessFlags::FINAL | ClassAccessFlags::SYNTHETIC | ClassAccessFlags::SUPER,
            interface.major_version,
        )?;
        if let Some(bootstrap) = interface.bootstrap_methods() {
            let copied = bootstrap.bootstrap_methods.clone();
            builder.class_mut().ensure_bootstrap_methods()?.bootstrap_methods = copied;
        }

        let mut moved = Vec::with_capacity(qualifying.len());
        let mut declared: BTreeSet<(String, String)> = BTreeSet::new();
        for &(method_index, kind) in qualifying {
            let method = &interface.methods[method_index];
            let (Some(name), Some(descriptor)) =
                (interface.method_name(method), interface.method_descriptor(method))
            else {
                continue;
            };
            let companion_descriptor = match kind {
                MovedKind::Static => descriptor.to_string(),
                MovedKind::Default | MovedKind::Private => MethodDescriptor::parse(descriptor)?
                    .with_receiver(JvmType::Reference(interface_name.clone()))
                    .to_string(),
            };
            if !declared.insert((name.to_string(), companion_descriptor.clone())) {
                self.reporter.report(
                    WarningCategory::NameCollision,
                    &format!(
                        "{}: {}{} clashes with another method moved to {}",
                        interface_name, name, companion_descriptor, companion
                    ),
                );
                return Ok(None);
            }

            let mut copy = method.clone();
            let adds_receiver = companion_descriptor != descriptor;
            if adds_receiver {
                let pool = &builder.class().const_pool;
                copy.attributes
                    .retain(|a| !a.name(pool).is_some_and(|n| SIGNATURE_ATTRIBUTES.contains(&n)));
            }
            copy.access_flags = (copy.access_flags
                - MethodAccessFlags::PRIVATE
                - MethodAccessFlags::PROTECTED
                - MethodAccessFlags::ABSTRACT)
                | MethodAccessFlags::PUBLIC
                | MethodAccessFlags::STATIC;
            copy.descriptor_index = builder.class_mut().get_or_add_utf8(&companion_descriptor)?;
            builder.class_mut().methods.push(copy);

            moved.push(MovedMethod {
                interface: interface_name.clone(),
                companion: companion.to_string(),
                name: name.to_string(),
                descriptor: descriptor.to_string(),
                kind,
                companion_descriptor,
            });
        }

        let class = builder.build();
        let emitted = class
            .methods
            .iter()
            .filter_map(|m| m.code())
            .map(|code| decode_code(&code.code))
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .flatten()
            .map(|(_, instruction)| instruction)
            .collect();
        Ok(Some((GeneratedClass { class, emitted }, moved)))
    }

    fn plan_forwarders(&self, pools: ClassPools<'_>, plan: &mut InterfacePlan) {
        let defaults: BTreeMap<(String, String), Vec<&MovedMethod>> =
            plan.moved.values().filter(|m| m.kind == MovedKind::Default).fold(
                BTreeMap::new(),
                |mut acc, m| {
                    acc.entry((m.name.clone(), m.descriptor.clone())).or_default().push(m);
                    acc
                },
            );
        if defaults.is_empty() {
            return;
        }

        let mut forwarders: BTreeMap<String, Vec<Forwarder>> = BTreeMap::new();
        for (class_name, class) in pools.program.iter() {
            if class.is_interface() {
                continue;
            }
            let interfaces = pools.all_interfaces(class_name);
            for ((name, descriptor), candidates) in &defaults {
                if !candidates.iter().any(|m| interfaces.contains(&m.interface)) {
                    continue;
                }
                let Some(winner) = self.selected_default(pools, plan, class_name, name, descriptor) else {
                    continue;
                };
                // A program superclass that selects the same default gets the
                // forwarder and this class inherits it.
                let inherited = class
                    .super_class_name()
                    .filter(|s| pools.is_program_class(s))
                    .and_then(|s| self.selected_default_quiet(pools, plan, s, name, descriptor))
                    .is_some_and(|m| m.interface == winner.interface);
                if inherited {
                    continue;
                }
                debug!("{}: forwarder for {}.{}{}", class_name, winner.interface, name, descriptor);
                forwarders.entry(class_name.to_string()).or_default().push(Forwarder {
                    name: name.clone(),
                    descriptor: descriptor.clone(),
                    target: winner.clone(),
                });
            }
        }
        plan.forwarders = forwarders;
    }

    fn selected_default(
        &self,
        pools: ClassPools<'_>,
        plan: &InterfacePlan,
        class_name: &str,
        name: &str,
        descriptor: &str,
    ) -> Option<MovedMethod> {
        match maximally_specific(pools, class_name, name, descriptor) {
            Selection::Declared | Selection::None => None,
            Selection::Unique(interface) => plan.lookup(&interface, name, descriptor).cloned(),
            Selection::Ambiguous(interfaces) => {
                self.reporter.report(
                    WarningCategory::AmbiguousDefault,
                    &format!(
                        "{} inherits {}{} from {}",
                        class_name,
                        name,
                        descriptor,
                        interfaces.join(" and ")
                    ),
                );
                None
            }
        }
    }

    fn selected_default_quiet(
        &self,
        pools: ClassPools<'_>,
        plan: &InterfacePlan,
        class_name: &str,
        name: &str,
        descriptor: &str,
    ) -> Option<MovedMethod> {
        match maximally_specific(pools, class_name, name, descriptor) {
            Selection::Unique(interface) => plan.lookup(&interface, name, descriptor).cloned(),
            _ => None,
        }
    }

    /// Apply the plan to one program class: strip moved methods from
    /// planned interfaces, add forwarders and redirect call sites.
    pub fn rewrite_class(
        &self,
        plan: &InterfacePlan,
        class: &mut ClassFile,
        emitted: &mut Vec<Instruction>,
    ) -> Result<bool> {
        if plan.is_empty() {
            return Ok(false);
        }
        let class_name = class.name()?.to_string();
        let mut changed = false;

        if class.is_interface() && plan.moves_from(&class_name) {
            changed |= strip_interface(plan, &class_name, class);
        }
        if let Some(forwarders) = plan.forwarders.get(&class_name) {
            for forwarder in forwarders {
                emitted.extend(add_forwarder(class, forwarder)?);
                changed = true;
            }
        }
        changed |= rewrite_call_sites(plan, class, emitted)?;
        Ok(changed)
    }
}

/// Methods of `interface` that move, with their kind.
fn qualifying_methods(interface: &ClassFile) -> Vec<(usize, MovedKind)> {
    interface
        .methods
        .iter()
        .enumerate()
        .filter(|(_, m)| m.code().is_some())
        .filter_map(|(index, m)| {
            let name = interface.method_name(m)?;
            if name == "<clinit>" {
                return None;
            }
            let kind = if m.is_static() {
                MovedKind::Static
            } else if m.is_private() {
                MovedKind::Private
            } else {
                MovedKind::Default
            };
            Some((index, kind))
        })
        .collect()
}

enum Selection {
    /// The class or a superclass declares the method itself.
    Declared,
    None,
    Unique(String),
    Ambiguous(Vec<String>),
}

/// The interface method `class_name` inherits for `name` and `descriptor`,
/// following the maximally-specific rule.
fn maximally_specific(pools: ClassPools<'_>, class_name: &str, name: &str, descriptor: &str) -> Selection {
    if pools
        .superclass_chain(class_name)
        .iter()
        .any(|c| c.find_method(name, descriptor).is_some_and(|m| !m.is_static()))
    {
        return Selection::Declared;
    }
    let declaring: Vec<(String, bool)> = pools
        .all_interfaces(class_name)
        .into_iter()
        .filter_map(|interface| {
            let method = pools.lookup(&interface)?.find_method(name, descriptor)?;
            if method.is_static() || method.is_private() {
                return None;
            }
            let has_body = method.code().is_some();
            Some((interface, has_body))
        })
        .collect();
    let specific: Vec<&(String, bool)> = declaring
        .iter()
        .filter(|(interface, _)| {
            !declaring
                .iter()
                .any(|(other, _)| other != interface && pools.is_assignable_to(other, interface))
        })
        .collect();
    match specific.as_slice() {
        [] => Selection::None,
        [(interface, true)] => Selection::Unique(interface.clone()),
        [(_, false)] => Selection::None,
        many if many.iter().any(|(_, has_body)| *has_body) => {
            Selection::Ambiguous(many.iter().map(|(i, _)| i.clone()).collect())
        }
        _ => Selection::None,
    }
}

fn strip_interface(plan: &InterfacePlan, interface: &str, class: &mut ClassFile) -> bool {
    let mut changed = false;
    let mut kept = Vec::with_capacity(class.methods.len());
    for mut method in std::mem::take(&mut class.methods) {
        let moved = match (class.method_name(&method), class.method_descriptor(&method)) {
            (Some(name), Some(descriptor)) => plan.lookup(interface, name, descriptor).map(|m| m.kind),
            _ => None,
        };
        match moved {
            Some(MovedKind::Default) => {
                if let Some(index) = method.code_index() {
                    method.attributes.remove(index);
                }
                method.access_flags |= MethodAccessFlags::ABSTRACT;
                kept.push(method);
                changed = true;
            }
            Some(MovedKind::Static | MovedKind::Private) => changed = true,
            None => kept.push(method),
        }
    }
    class.methods = kept;
    changed
}

fn add_forwarder(class: &mut ClassFile, forwarder: &Forwarder) -> Result<Vec<Instruction>> {
    let descriptor = MethodDescriptor::parse(&forwarder.descriptor)?;
    let mut method = MethodBuilder::new(class);
    method.emit(Instruction::Aload0);
    method.load_parameters(&descriptor, 1);
    method.invoke_static(&forwarder.target.companion_ref())?;
    method.emit(Instruction::return_for(&descriptor.ret));
    method.finish(MethodAccessFlags::PUBLIC, &forwarder.name, &forwarder.descriptor)
}

fn rewrite_call_sites(plan: &InterfacePlan, class: &mut ClassFile, emitted: &mut Vec<Instruction>) -> Result<bool> {
    let mut changed = false;
    // Instance methods: original ref index -> companion ref index.
    let mut to_static: BTreeMap<u16, u16> = BTreeMap::new();

    for index in 1..=class.const_pool.len() as u16 {
        let Some(member) = class.resolve_ref(index) else {
            continue;
        };
        if member.kind == MemberKind::Field {
            continue;
        }
        let Some(moved) = plan.lookup(&member.class_name, &member.name, &member.descriptor) else {
            continue;
        };
        let target = moved.companion_ref();
        if moved.companion_descriptor == moved.descriptor {
            // Static in the interface and in the companion: repoint in place,
            // which also moves static method handles.
            let class_index = class.get_or_add_class(&target.class_name)?;
            let name_and_type_index = class.get_or_add_name_and_type(&target.name, &target.descriptor)?;
            if let Some(slot) = class.constant_mut(index) {
                *slot = ConstantInfo::MethodRef(MethodRefConstant {
                    class_index,
                    name_and_type_index,
                });
            }
            changed = true;
        } else {
            to_static.insert(index, class.get_or_add_member_ref(&target)?);
        }
    }
    if to_static.is_empty() {
        return Ok(changed);
    }

    for method_index in 0..class.methods.len() {
        let Some(code) = class.methods[method_index].code() else {
            continue;
        };
        let mut editor = CodeEditor::new(code)?;
        let mut edits = Vec::new();
        for (offset, instruction) in editor.instructions() {
            let index = match instruction {
                Instruction::Invokespecial(index) | Instruction::Invokeinterface { index, .. } => *index,
                _ => continue,
            };
            let Some(&target) = to_static.get(&index) else {
                continue;
            };
            // Public defaults keep dynamic dispatch through invokeinterface.
            let private = class
                .resolve_ref(index)
                .and_then(|m| plan.lookup(&m.class_name, &m.name, &m.descriptor))
                .is_some_and(|m| m.kind == MovedKind::Private);
            if matches!(instruction, Instruction::Invokeinterface { .. }) && !private {
                continue;
            }
            edits.push((*offset, Instruction::Invokestatic(target)));
        }
        for (offset, instruction) in edits {
            editor.replace(offset, vec![instruction]);
        }
        changed |= class.apply_code_edit(method_index, editor, emitted)?;
    }
    Ok(changed)
}
