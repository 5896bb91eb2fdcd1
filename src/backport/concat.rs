//! Desugaring of `StringConcatFactory` call sites into `StringBuilder`
//! append chains.

use std::collections::BTreeMap;

use log::debug;

use crate::code_attribute::{CodeEditor, Instruction};
use crate::descriptor::{JvmType, MethodDescriptor};
use crate::error::{BackportError, Result};
use crate::types::ClassFile;

use super::callsite::{CallSiteAnalysis, ConcatConstant, ConcatRecipe, DynamicCallSite, TAG_ARG, TAG_CONST};
use super::eval::{Evaluation, ValueOracle};

const STRING_BUILDER: &str = "java/lang/StringBuilder";

pub struct StringConcatDesugarer<'a> {
    oracle: &'a dyn ValueOracle,
}

impl<'a> StringConcatDesugarer<'a> {
    pub fn new(oracle: &'a dyn ValueOracle) -> Self {
        StringConcatDesugarer { oracle }
    }

    /// Replace every concatenation site found by the analyzer. Returns
    /// whether any method changed.
    pub fn rewrite_class(
        &self,
        class: &mut ClassFile,
        analysis: &CallSiteAnalysis,
        emitted: &mut Vec<Instruction>,
    ) -> Result<bool> {
        let mut by_method: BTreeMap<usize, Vec<(&DynamicCallSite, &ConcatRecipe)>> = BTreeMap::new();
        for (site, recipe) in analysis.concat_sites() {
            by_method.entry(site.method_index).or_default().push((site, recipe));
        }

        let mut changed = false;
        for (method_index, sites) in by_method {
            let Some(code) = class.methods.get(method_index).and_then(|m| m.code()) else {
                continue;
            };
            let mut editor = CodeEditor::new(code)?;
            let scratch = code.max_locals;
            let original_stack = code.max_stack;
            let mut max_locals = scratch;
            let mut max_stack = original_stack;

            for (site, recipe) in sites {
                let descriptor = MethodDescriptor::parse(&recipe.descriptor)?;
                self.log_folded(class, site, &descriptor);
                let arg_slots = descriptor.param_slots();
                let sequence = append_sequence(class, recipe, &descriptor, scratch, site.offset)?;
                max_locals = max_locals.max(scratch.checked_add(arg_slots).ok_or_else(|| {
                    BackportError::InvalidCode {
                        offset: site.offset,
                        reason: "scratch locals exceed 65535 slots".into(),
                    }
                })?);
                max_stack = max_stack.max(original_stack.saturating_sub(arg_slots).saturating_add(3));
                editor.replace(site.offset, sequence);
            }

            if class.apply_code_edit(method_index, editor, emitted)? {
                if let Some(code) = class.methods[method_index].code_mut() {
                    code.max_locals = max_locals;
                    code.max_stack = max_stack;
                }
                changed = true;
            }
        }
        Ok(changed)
    }

    fn log_folded(&self, class: &ClassFile, site: &DynamicCallSite, descriptor: &MethodDescriptor) {
        let Ok(values) = self
            .oracle
            .operands(class, site.method_index, site.offset, &descriptor.params)
        else {
            return;
        };
        if values.is_empty() || values.iter().any(|v| v.known().is_none()) {
            if values.iter().any(|v| *v == Evaluation::Unreachable) {
                debug!("{}: concatenation at {} is unreachable", class.display_name(), site.offset);
            }
            return;
        }
        let folded: String = values
            .iter()
            .filter_map(Evaluation::known)
            .map(|v| v.to_string())
            .collect();
        debug!(
            "{}: concatenation at {} has constant operands {:?}",
            class.display_name(),
            site.offset,
            folded
        );
    }
}

/// The instructions that replace one `invokedynamic`: spill the arguments to
/// scratch locals, then append every recipe element in order.
fn append_sequence(
    class: &mut ClassFile,
    recipe: &ConcatRecipe,
    descriptor: &MethodDescriptor,
    scratch: u16,
    offset: u32,
) -> Result<Vec<Instruction>> {
    let mut slots = Vec::with_capacity(descriptor.params.len());
    let mut next = scratch;
    for param in &descriptor.params {
        slots.push(next);
        next = next
            .checked_add(param.slots())
            .ok_or_else(|| BackportError::InvalidCode {
                offset,
                reason: "scratch locals exceed 65535 slots".into(),
            })?;
    }

    let mut code = Vec::new();
    for (param, slot) in descriptor.params.iter().zip(&slots).rev() {
        code.push(Instruction::store(param, *slot));
    }
    code.push(Instruction::New(class.get_or_add_class(STRING_BUILDER)?));
    code.push(Instruction::Dup);
    code.push(Instruction::Invokespecial(
        class.get_or_add_method_ref(STRING_BUILDER, "<init>", "()V")?,
    ));

    let mut arguments = descriptor.params.iter().zip(&slots);
    match &recipe.recipe {
        None => {
            for (param, slot) in arguments {
                code.push(Instruction::load(param, *slot));
                code.push(append(class, param)?);
            }
        }
        Some(text) => {
            let mut constants = recipe.constants.iter();
            let mut literal = String::new();
            for c in text.chars() {
                if c != TAG_ARG && c != TAG_CONST {
                    literal.push(c);
                    continue;
                }
                flush_literal(class, &mut literal, &mut code)?;
                if c == TAG_ARG {
                    let (param, slot) = arguments.next().ok_or_else(|| BackportError::InvalidDescriptor {
                        descriptor: recipe.descriptor.clone(),
                    })?;
                    code.push(Instruction::load(param, *slot));
                    code.push(append(class, param)?);
                } else {
                    let constant = constants.next().ok_or_else(|| BackportError::InvalidDescriptor {
                        descriptor: recipe.descriptor.clone(),
                    })?;
                    push_constant(class, constant, &mut code)?;
                }
            }
            flush_literal(class, &mut literal, &mut code)?;
        }
    }

    code.push(Instruction::Invokevirtual(class.get_or_add_method_ref(
        STRING_BUILDER,
        "toString",
        "()Ljava/lang/String;",
    )?));
    Ok(code)
}

fn flush_literal(class: &mut ClassFile, literal: &mut String, code: &mut Vec<Instruction>) -> Result<()> {
    if literal.is_empty() {
        return Ok(());
    }
    let index = class.get_or_add_string(literal)?;
    code.push(Instruction::ldc(index, false));
    code.push(append(class, &JvmType::Reference("java/lang/String".into()))?);
    literal.clear();
    Ok(())
}

fn push_constant(class: &mut ClassFile, constant: &ConcatConstant, code: &mut Vec<Instruction>) -> Result<()> {
    let (index, ty) = match constant {
        ConcatConstant::String(value) => (
            class.get_or_add_string(value)?,
            JvmType::Reference("java/lang/String".into()),
        ),
        ConcatConstant::Int(value) => (class.get_or_add_integer(*value)?, JvmType::Int),
        ConcatConstant::Long(value) => (class.get_or_add_long(*value)?, JvmType::Long),
        ConcatConstant::Float(value) => (class.get_or_add_float(*value)?, JvmType::Float),
        ConcatConstant::Double(value) => (class.get_or_add_double(*value)?, JvmType::Double),
    };
    code.push(Instruction::ldc(index, ty.is_wide()));
    code.push(append(class, &ty)?);
    Ok(())
}

/// `StringBuilder.append` with the overload javac picks for `ty`.
fn append(class: &mut ClassFile, ty: &JvmType) -> Result<Instruction> {
    let parameter = match ty {
        JvmType::Boolean => "Z",
        JvmType::Char => "C",
        JvmType::Long => "J",
        JvmType::Float => "F",
        JvmType::Double => "D",
        JvmType::Int | JvmType::Byte | JvmType::Short => "I",
        JvmType::Reference(name) if name == "java/lang/String" => "Ljava/lang/String;",
        _ => "Ljava/lang/Object;",
    };
    let descriptor = format!("({})Ljava/lang/StringBuilder;", parameter);
    Ok(Instruction::Invokevirtual(class.get_or_add_method_ref(
        STRING_BUILDER,
        "append",
        &descriptor,
    )?))
}
