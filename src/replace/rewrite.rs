use std::collections::{BTreeMap, BTreeSet};

use log::debug;

use crate::class_pool::ClassPools;
use crate::code_attribute::stack::invokeinterface_count;
use crate::code_attribute::{decode_code, CodeEditor, Instruction};
use crate::constant_info::*;
use crate::descriptor::map_class_constant_name;
use crate::error::Result;
use crate::report::{WarningCategory, WarningReporter};
use crate::types::ClassFile;

use super::resolver::ReplacementResolver;

#[derive(Default)]
struct Usage {
    static_call: bool,
    instance_call: bool,
}

/// Applies the replacement list to program classes.
pub struct ReferenceRewriter<'r> {
    resolver: &'r ReplacementResolver,
    reporter: &'r dyn WarningReporter,
}

impl<'r> ReferenceRewriter<'r> {
    pub fn new(resolver: &'r ReplacementResolver, reporter: &'r dyn WarningReporter) -> Self {
        ReferenceRewriter { resolver, reporter }
    }

    fn map_class(&self, pools: ClassPools<'_>, name: &str) -> Option<String> {
        self.resolver.map_class(pools, self.reporter, name)
    }

    fn map_descriptor(&self, pools: ClassPools<'_>, descriptor: &str) -> Option<String> {
        self.resolver.map_descriptor(pools, self.reporter, descriptor)
    }

    /// Rewrite one class in place. Returns whether anything changed.
    pub fn rewrite_class(
        &self,
        pools: ClassPools<'_>,
        class: &mut ClassFile,
        emitted: &mut Vec<Instruction>,
    ) -> Result<bool> {
        if self.resolver.is_empty() {
            return Ok(false);
        }
        let this_name = class.name()?.to_string();
        let pool_len = class.const_pool.len() as u16;

        // Member references and how they are invoked, before owners move.
        let member_refs: Vec<(u16, MemberRef)> = (1..=pool_len)
            .filter_map(|index| class.resolve_ref(index).map(|member| (index, member)))
            .collect();
        let usages = collect_usages(class)?;
        let mut changed = false;

        for index in 1..=pool_len {
            if index == class.this_class {
                continue;
            }
            let Some(name) = class.get_class_name(index) else {
                continue;
            };
            let Some(new_name) = map_class_constant_name(name, |n| self.map_class(pools, n)) else {
                continue;
            };
            debug!("{}: class constant {} -> {}", this_name, name, new_name);
            let name_index = class.get_or_add_utf8(&new_name)?;
            if let Some(ConstantInfo::Class(constant)) = class.constant_mut(index) {
                constant.name_index = name_index;
                changed = true;
            }
        }

        // Original ref index -> static replacement ref index.
        let mut to_static: BTreeMap<u16, u16> = BTreeMap::new();
        // Refs whose owner switched between class and interface.
        let mut kind_switched: BTreeSet<u16> = BTreeSet::new();

        for (index, member) in member_refs {
            let usage = usages.get(&index);
            let static_call = usage.is_some_and(|u| u.static_call && !u.instance_call);
            let mapping = match member.kind {
                MemberKind::Field => None,
                _ => self.resolver.map_method(
                    pools,
                    self.reporter,
                    &member.class_name,
                    &member.name,
                    &member.descriptor,
                    static_call,
                ),
            };

            if let Some(mapping) = mapping {
                let kind = if mapping.owner_is_interface {
                    MemberKind::InterfaceMethod
                } else {
                    MemberKind::Method
                };
                let target = MemberRef {
                    kind,
                    class_name: mapping.class_name.clone(),
                    name: mapping.name.clone(),
                    descriptor: mapping.descriptor.clone(),
                };
                if mapping.is_static && !static_call {
                    to_static.insert(index, class.get_or_add_member_ref(&target)?);
                } else {
                    let class_index = class.get_or_add_class(&target.class_name)?;
                    let name_and_type_index =
                        class.get_or_add_name_and_type(&target.name, &target.descriptor)?;
                    let replacement = match kind {
                        MemberKind::InterfaceMethod => {
                            ConstantInfo::InterfaceMethodRef(InterfaceMethodRefConstant {
                                class_index,
                                name_and_type_index,
                            })
                        }
                        _ => ConstantInfo::MethodRef(MethodRefConstant {
                            class_index,
                            name_and_type_index,
                        }),
                    };
                    if kind != member.kind && !static_call {
                        kind_switched.insert(index);
                    }
                    if let Some(slot) = class.constant_mut(index) {
                        *slot = replacement;
                    }
                }
                changed = true;
                continue;
            }

            let owner_moves = self.map_class(pools, &member.class_name).is_some();
            let owner_is_program =
                member.class_name == this_name || pools.is_program_class(&member.class_name);
            let Some(descriptor) = self.map_descriptor(pools, &member.descriptor) else {
                continue;
            };
            if !owner_moves && !owner_is_program {
                self.reporter.report(
                    WarningCategory::MissingReplacement,
                    &format!(
                        "{}: library member {}.{}{} mentions a replaced type and was kept",
                        this_name, member.class_name, member.name, member.descriptor
                    ),
                );
                continue;
            }
            let name_and_type_index = class.get_or_add_name_and_type(&member.name, &descriptor)?;
            match class.constant_mut(index) {
                Some(ConstantInfo::FieldRef(r)) => r.name_and_type_index = name_and_type_index,
                Some(ConstantInfo::MethodRef(r)) => r.name_and_type_index = name_and_type_index,
                Some(ConstantInfo::InterfaceMethodRef(r)) => {
                    r.name_and_type_index = name_and_type_index
                }
                _ => {}
            }
            changed = true;
        }

        if !to_static.is_empty() || !kind_switched.is_empty() {
            self.rewrite_invocations(class, &to_static, &kind_switched, emitted)?;
        }

        changed |= self.rewrite_method_types(pools, class)?;
        changed |= self.rewrite_declarations(pools, class)?;
        Ok(changed)
    }

    fn rewrite_invocations(
        &self,
        class: &mut ClassFile,
        to_static: &BTreeMap<u16, u16>,
        kind_switched: &BTreeSet<u16>,
        emitted: &mut Vec<Instruction>,
    ) -> Result<()> {
        for method_index in 0..class.methods.len() {
            let Some(code) = class.methods[method_index].code() else {
                continue;
            };
            let mut editor = CodeEditor::new(code)?;
            let mut edits = Vec::new();
            for (offset, instruction) in editor.instructions() {
                let index = match instruction {
                    Instruction::Invokevirtual(index)
                    | Instruction::Invokespecial(index)
                    | Instruction::Invokeinterface { index, .. } => *index,
                    _ => continue,
                };
                if let Some(&target) = to_static.get(&index) {
                    edits.push((*offset, Instruction::Invokestatic(target)));
                } else if kind_switched.contains(&index) {
                    let switched = match (instruction, class.constant(index)) {
                        (Instruction::Invokevirtual(_), Some(ConstantInfo::InterfaceMethodRef(_))) => {
                            let count = invokeinterface_count(class, index)?;
                            Instruction::Invokeinterface {
                                index,
                                count,
                                filler: 0,
                            }
                        }
                        (Instruction::Invokeinterface { .. }, Some(ConstantInfo::MethodRef(_))) => {
                            Instruction::Invokevirtual(index)
                        }
                        _ => continue,
                    };
                    edits.push((*offset, switched));
                }
            }
            for (offset, instruction) in edits {
                editor.replace(offset, vec![instruction]);
            }
            class.apply_code_edit(method_index, editor, emitted)?;
        }

        // Method handles follow their references.
        for constant in class.const_pool.iter_mut() {
            if let ConstantInfo::MethodHandle(handle) = constant {
                if let Some(&target) = to_static.get(&handle.reference_index) {
                    handle.reference_kind = reference_kind::INVOKE_STATIC;
                    handle.reference_index = target;
                }
            }
        }
        Ok(())
    }

    fn rewrite_method_types(&self, pools: ClassPools<'_>, class: &mut ClassFile) -> Result<bool> {
        let mut changed = false;
        for index in 1..=class.const_pool.len() as u16 {
            match class.constant(index) {
                Some(ConstantInfo::MethodType(mt)) => {
                    let Some(descriptor) = class
                        .get_utf8(mt.descriptor_index)
                        .and_then(|d| self.map_descriptor(pools, d))
                    else {
                        continue;
                    };
                    let descriptor_index = class.get_or_add_utf8(&descriptor)?;
                    if let Some(ConstantInfo::MethodType(mt)) = class.constant_mut(index) {
                        mt.descriptor_index = descriptor_index;
                        changed = true;
                    }
                }
                Some(ConstantInfo::InvokeDynamic(InvokeDynamicConstant {
                    name_and_type_index,
                    ..
                }))
                | Some(ConstantInfo::Dynamic(DynamicConstant {
                    name_and_type_index,
                    ..
                })) => {
                    let Some((name, descriptor)) = class.get_name_and_type(*name_and_type_index) else {
                        continue;
                    };
                    let Some(descriptor) = self.map_descriptor(pools, descriptor) else {
                        continue;
                    };
                    let name = name.to_string();
                    let nat = class.get_or_add_name_and_type(&name, &descriptor)?;
                    match class.constant_mut(index) {
                        Some(ConstantInfo::InvokeDynamic(indy)) => indy.name_and_type_index = nat,
                        Some(ConstantInfo::Dynamic(dynamic)) => dynamic.name_and_type_index = nat,
                        _ => {}
                    }
                    changed = true;
                }
                _ => {}
            }
        }
        Ok(changed)
    }

    fn rewrite_declarations(&self, pools: ClassPools<'_>, class: &mut ClassFile) -> Result<bool> {
        let mut changed = false;
        for field_index in 0..class.fields.len() {
            let descriptor = class.field_descriptor(&class.fields[field_index]);
            if let Some(mapped) = descriptor.and_then(|d| self.map_descriptor(pools, d)) {
                class.fields[field_index].descriptor_index = class.get_or_add_utf8(&mapped)?;
                changed = true;
            }
        }
        for method_index in 0..class.methods.len() {
            let descriptor = class.method_descriptor(&class.methods[method_index]);
            if let Some(mapped) = descriptor.and_then(|d| self.map_descriptor(pools, d)) {
                class.methods[method_index].descriptor_index = class.get_or_add_utf8(&mapped)?;
                changed = true;
            }
        }
        Ok(changed)
    }
}

fn collect_usages(class: &ClassFile) -> Result<BTreeMap<u16, Usage>> {
    let mut usages: BTreeMap<u16, Usage> = BTreeMap::new();
    for method in &class.methods {
        let Some(code) = method.code() else {
            continue;
        };
        for (_, instruction) in decode_code(&code.code)? {
            match instruction {
                Instruction::Invokestatic(index) => usages.entry(index).or_default().static_call = true,
                Instruction::Invokevirtual(index)
                | Instruction::Invokespecial(index)
                | Instruction::Invokeinterface { index, .. } => {
                    usages.entry(index).or_default().instance_call = true
                }
                _ => {}
            }
        }
    }
    for constant in &class.const_pool {
        if let ConstantInfo::MethodHandle(handle) = constant {
            let usage = usages.entry(handle.reference_index).or_default();
            if handle.reference_kind == reference_kind::INVOKE_STATIC {
                usage.static_call = true;
            } else {
                usage.instance_call = true;
            }
        }
    }
    Ok(usages)
}
