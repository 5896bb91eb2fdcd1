//! Partial evaluation of operand stack values.
//!
//! The backporter only uses folded values for diagnostics, so every
//! evaluator must be safe to answer [`Evaluation::Unknown`].

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use log::debug;
use thiserror::Error;

use crate::attribute_info::{AttributeInfoVariant, CodeAttribute, StackMapFrameInner, VerificationTypeInfo};
use crate::code_attribute::stack::stack_delta;
use crate::code_attribute::{decode_code, Instruction, WideInstruction};
use crate::constant_info::ConstantInfo;
use crate::descriptor::{parse_type_descriptor, JvmType, MethodDescriptor};
use crate::types::ClassFile;

#[derive(Clone, Debug, PartialEq)]
pub enum ConstantValue {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    Null,
}

impl fmt::Display for ConstantValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstantValue::Int(v) => write!(f, "{}", v),
            ConstantValue::Long(v) => write!(f, "{}", v),
            ConstantValue::Float(v) if v.is_finite() && v.fract() == 0.0 => write!(f, "{:.1}", v),
            ConstantValue::Float(v) => write!(f, "{}", v),
            ConstantValue::Double(v) if v.is_finite() && v.fract() == 0.0 => write!(f, "{:.1}", v),
            ConstantValue::Double(v) => write!(f, "{}", v),
            ConstantValue::String(v) => f.write_str(v),
            ConstantValue::Null => f.write_str("null"),
        }
    }
}

/// What is known about a value at a program point.
#[derive(Clone, Debug, PartialEq)]
pub enum Evaluation {
    Known(ConstantValue),
    /// The program point cannot be reached.
    Unreachable,
    Unknown,
}

impl Evaluation {
    pub fn known(&self) -> Option<&ConstantValue> {
        match self {
            Evaluation::Known(value) => Some(value),
            _ => None,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EvaluationError {
    #[error("evaluation exceeded {max_steps} steps")]
    StepLimit { max_steps: usize },
    #[error("no instruction starts at offset {offset}")]
    InvalidOffset { offset: u32 },
    #[error("method {method_index} has no code")]
    NoCode { method_index: usize },
    #[error("call at offset {offset} cannot be evaluated")]
    UnsupportedCall { offset: u32 },
    #[error("stack depth at offset {offset} is unknown")]
    UnknownStackDepth { offset: u32 },
    #[error("operand stack underflow at offset {offset}")]
    StackUnderflow { offset: u32 },
    #[error("{0}")]
    Malformed(String),
}

/// Answers questions about operand values at a program point.
pub trait ValueOracle {
    /// Values of the topmost operands just before the instruction at
    /// `offset`, one per entry of `operand_types`, bottom first.
    fn operands(
        &self,
        class: &ClassFile,
        method_index: usize,
        offset: u32,
        operand_types: &[JvmType],
    ) -> Result<Vec<Evaluation>, EvaluationError>;
}

/// An oracle that knows nothing.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoOracle;

impl ValueOracle for NoOracle {
    fn operands(
        &self,
        _class: &ClassFile,
        _method_index: usize,
        _offset: u32,
        operand_types: &[JvmType],
    ) -> Result<Vec<Evaluation>, EvaluationError> {
        Ok(vec![Evaluation::Unknown; operand_types.len()])
    }
}

/// Forward constant propagation over the code of one method, in code
/// order. Branch targets and handlers are merge points where everything
/// becomes unknown.
#[derive(Clone, Debug)]
pub struct PartialEvaluator {
    pub max_steps: usize,
    /// Treat calls as producing unknown values instead of failing.
    pub skip_unresolved_calls: bool,
    /// Turn internal errors into unknown values instead of returning them.
    pub suppress_errors: bool,
}

impl Default for PartialEvaluator {
    fn default() -> Self {
        PartialEvaluator {
            max_steps: 10_000,
            skip_unresolved_calls: true,
            suppress_errors: true,
        }
    }
}

impl ValueOracle for PartialEvaluator {
    fn operands(
        &self,
        class: &ClassFile,
        method_index: usize,
        offset: u32,
        operand_types: &[JvmType],
    ) -> Result<Vec<Evaluation>, EvaluationError> {
        match self.evaluate(class, method_index, offset, operand_types) {
            Err(e) if self.suppress_errors => {
                debug!("Partial evaluation at {} gave up: {}", offset, e);
                Ok(vec![Evaluation::Unknown; operand_types.len()])
            }
            result => result,
        }
    }
}

struct Frame {
    stack: Vec<Evaluation>,
    locals: Vec<Evaluation>,
}

impl Frame {
    fn push(&mut self, value: Evaluation, wide: bool) {
        self.stack.push(value);
        if wide {
            self.stack.push(Evaluation::Unknown);
        }
    }

    fn push_known(&mut self, value: ConstantValue) {
        let wide = matches!(value, ConstantValue::Long(_) | ConstantValue::Double(_));
        self.push(Evaluation::Known(value), wide);
    }

    fn pop_slots(&mut self, count: usize, offset: u32) -> Result<Vec<Evaluation>, EvaluationError> {
        if self.stack.len() < count {
            return Err(EvaluationError::StackUnderflow { offset });
        }
        Ok(self.stack.split_off(self.stack.len() - count))
    }

    fn pop(&mut self, wide: bool, offset: u32) -> Result<Evaluation, EvaluationError> {
        let mut slots = self.pop_slots(if wide { 2 } else { 1 }, offset)?;
        Ok(slots.swap_remove(0))
    }

    fn pop_int(&mut self, offset: u32) -> Result<Option<i32>, EvaluationError> {
        Ok(match self.pop(false, offset)? {
            Evaluation::Known(ConstantValue::Int(v)) => Some(v),
            _ => None,
        })
    }

    fn load(&mut self, index: u16, wide: bool) {
        let value = self
            .locals
            .get(index as usize)
            .cloned()
            .unwrap_or(Evaluation::Unknown);
        self.push(value, wide);
    }

    fn store(&mut self, index: u16, wide: bool, offset: u32) -> Result<(), EvaluationError> {
        let value = self.pop(wide, offset)?;
        let index = index as usize;
        let needed = index + if wide { 2 } else { 1 };
        if self.locals.len() < needed {
            self.locals.resize(needed, Evaluation::Unknown);
        }
        self.locals[index] = value;
        if wide {
            self.locals[index + 1] = Evaluation::Unknown;
        }
        Ok(())
    }

    fn forget(&mut self) {
        self.stack.iter_mut().for_each(|v| *v = Evaluation::Unknown);
        self.locals.iter_mut().for_each(|v| *v = Evaluation::Unknown);
    }

    /// Apply a net stack effect without knowing the exact operands.
    fn havoc(&mut self, delta: i32, offset: u32) -> Result<(), EvaluationError> {
        if delta < 0 {
            self.pop_slots((-delta) as usize, offset)?;
        } else {
            for _ in 0..delta {
                self.stack.push(Evaluation::Unknown);
            }
        }
        // Results are at most two slots wide.
        let len = self.stack.len();
        for value in &mut self.stack[len.saturating_sub(2)..] {
            *value = Evaluation::Unknown;
        }
        Ok(())
    }
}

impl PartialEvaluator {
    fn evaluate(
        &self,
        class: &ClassFile,
        method_index: usize,
        offset: u32,
        operand_types: &[JvmType],
    ) -> Result<Vec<Evaluation>, EvaluationError> {
        let code = class
            .methods
            .get(method_index)
            .and_then(|m| m.code())
            .ok_or(EvaluationError::NoCode { method_index })?;
        let instructions =
            decode_code(&code.code).map_err(|e| EvaluationError::Malformed(e.to_string()))?;
        if !instructions.iter().any(|(at, _)| *at == offset) {
            return Err(EvaluationError::InvalidOffset { offset });
        }

        let mut merge_points = BTreeSet::new();
        for (at, instruction) in &instructions {
            for delta in instruction.branch_offsets() {
                merge_points.insert((*at as i64 + delta as i64) as u32);
            }
        }
        let mut depths = frame_depths(code);
        for entry in &code.exception_table {
            merge_points.insert(entry.handler_pc as u32);
            depths.insert(entry.handler_pc as u32, 1);
        }

        let mut frame = Frame {
            stack: Vec::new(),
            locals: vec![Evaluation::Unknown; code.max_locals as usize],
        };
        let mut reachable = true;
        let mut steps = 0;

        for (at, instruction) in &instructions {
            let at = *at;
            if !reachable {
                if let Some(&depth) = depths.get(&at) {
                    reachable = true;
                    frame.stack = vec![Evaluation::Unknown; depth];
                    frame.forget();
                } else if merge_points.contains(&at) {
                    return Err(EvaluationError::UnknownStackDepth { offset: at });
                } else if at == offset {
                    return Ok(vec![Evaluation::Unreachable; operand_types.len()]);
                } else {
                    continue;
                }
            } else if merge_points.contains(&at) {
                frame.forget();
            }

            if at == offset {
                return read_operands(&mut frame, operand_types, offset);
            }

            steps += 1;
            if steps > self.max_steps {
                return Err(EvaluationError::StepLimit {
                    max_steps: self.max_steps,
                });
            }
            self.step(class, &mut frame, at, instruction)?;

            for delta in instruction.branch_offsets() {
                let target = (at as i64 + delta as i64) as u32;
                if target > at {
                    depths.entry(target).or_insert(frame.stack.len());
                }
            }
            if instruction.ends_block() {
                reachable = false;
            }
        }
        Err(EvaluationError::InvalidOffset { offset })
    }

    fn step(
        &self,
        class: &ClassFile,
        frame: &mut Frame,
        at: u32,
        instruction: &Instruction,
    ) -> Result<(), EvaluationError> {
        use ConstantValue::{Double, Float, Int, Long, Null};
        use Instruction as I;

        match instruction {
            I::Nop => {}
            I::Aconstnull => frame.push_known(Null),
            I::Iconstm1 => frame.push_known(Int(-1)),
            I::Iconst0 => frame.push_known(Int(0)),
            I::Iconst1 => frame.push_known(Int(1)),
            I::Iconst2 => frame.push_known(Int(2)),
            I::Iconst3 => frame.push_known(Int(3)),
            I::Iconst4 => frame.push_known(Int(4)),
            I::Iconst5 => frame.push_known(Int(5)),
            I::Lconst0 => frame.push_known(Long(0)),
            I::Lconst1 => frame.push_known(Long(1)),
            I::Fconst0 => frame.push_known(Float(0.0)),
            I::Fconst1 => frame.push_known(Float(1.0)),
            I::Fconst2 => frame.push_known(Float(2.0)),
            I::Dconst0 => frame.push_known(Double(0.0)),
            I::Dconst1 => frame.push_known(Double(1.0)),
            I::Bipush(v) => frame.push_known(Int(*v as i32)),
            I::Sipush(v) => frame.push_known(Int(*v as i32)),
            I::Ldc(index) => push_constant(class, frame, *index as u16),
            I::LdcW(index) | I::Ldc2W(index) => push_constant(class, frame, *index),

            I::Iload(n) | I::Fload(n) | I::Aload(n) => frame.load(*n as u16, false),
            I::Lload(n) | I::Dload(n) => frame.load(*n as u16, true),
            I::Iload0 | I::Fload0 | I::Aload0 => frame.load(0, false),
            I::Iload1 | I::Fload1 | I::Aload1 => frame.load(1, false),
            I::Iload2 | I::Fload2 | I::Aload2 => frame.load(2, false),
            I::Iload3 | I::Fload3 | I::Aload3 => frame.load(3, false),
            I::Lload0 | I::Dload0 => frame.load(0, true),
            I::Lload1 | I::Dload1 => frame.load(1, true),
            I::Lload2 | I::Dload2 => frame.load(2, true),
            I::Lload3 | I::Dload3 => frame.load(3, true),

            I::Istore(n) | I::Fstore(n) | I::Astore(n) => frame.store(*n as u16, false, at)?,
            I::Lstore(n) | I::Dstore(n) => frame.store(*n as u16, true, at)?,
            I::Istore0 | I::Fstore0 | I::Astore0 => frame.store(0, false, at)?,
            I::Istore1 | I::Fstore1 | I::Astore1 => frame.store(1, false, at)?,
            I::Istore2 | I::Fstore2 | I::Astore2 => frame.store(2, false, at)?,
            I::Istore3 | I::Fstore3 | I::Astore3 => frame.store(3, false, at)?,
            I::Lstore0 | I::Dstore0 => frame.store(0, true, at)?,
            I::Lstore1 | I::Dstore1 => frame.store(1, true, at)?,
            I::Lstore2 | I::Dstore2 => frame.store(2, true, at)?,
            I::Lstore3 | I::Dstore3 => frame.store(3, true, at)?,

            I::Wide(wide) => match wide {
                WideInstruction::Iload(n) | WideInstruction::Fload(n) | WideInstruction::Aload(n) => {
                    frame.load(*n, false)
                }
                WideInstruction::Lload(n) | WideInstruction::Dload(n) => frame.load(*n, true),
                WideInstruction::Istore(n) | WideInstruction::Fstore(n) | WideInstruction::Astore(n) => {
                    frame.store(*n, false, at)?
                }
                WideInstruction::Lstore(n) | WideInstruction::Dstore(n) => frame.store(*n, true, at)?,
                WideInstruction::Iinc { index, value } => increment(frame, *index, *value as i32),
                WideInstruction::Ret(_) => {}
            },
            I::Iinc { index, value } => increment(frame, *index as u16, *value as i32),

            I::Pop => {
                frame.pop_slots(1, at)?;
            }
            I::Pop2 => {
                frame.pop_slots(2, at)?;
            }
            I::Dup => {
                let top = frame.pop_slots(1, at)?;
                frame.stack.extend(top.clone());
                frame.stack.extend(top);
            }
            I::Dup2 => {
                let top = frame.pop_slots(2, at)?;
                frame.stack.extend(top.clone());
                frame.stack.extend(top);
            }
            I::Dupx1 => duplicate_below(frame, 1, 1, at)?,
            I::Dupx2 => duplicate_below(frame, 1, 2, at)?,
            I::Dup2x1 => duplicate_below(frame, 2, 1, at)?,
            I::Dup2x2 => duplicate_below(frame, 2, 2, at)?,
            I::Swap => {
                let mut top = frame.pop_slots(2, at)?;
                top.swap(0, 1);
                frame.stack.extend(top);
            }

            I::Iadd | I::Isub | I::Imul | I::Iand | I::Ior | I::Ixor => {
                let right = frame.pop_int(at)?;
                let left = frame.pop_int(at)?;
                let value = match (left, right) {
                    (Some(l), Some(r)) => Evaluation::Known(Int(match instruction {
                        I::Iadd => l.wrapping_add(r),
                        I::Isub => l.wrapping_sub(r),
                        I::Imul => l.wrapping_mul(r),
                        I::Iand => l & r,
                        I::Ior => l | r,
                        _ => l ^ r,
                    })),
                    _ => Evaluation::Unknown,
                };
                frame.push(value, false);
            }
            I::Ineg | I::I2b | I::I2c | I::I2s | I::I2l | I::I2f | I::I2d => {
                let value = frame.pop_int(at)?;
                let converted = value.map(|v| match instruction {
                    I::Ineg => Int(v.wrapping_neg()),
                    I::I2b => Int(v as i8 as i32),
                    I::I2c => Int(v as u16 as i32),
                    I::I2s => Int(v as i16 as i32),
                    I::I2l => Long(v as i64),
                    I::I2f => Float(v as f32),
                    _ => Double(v as f64),
                });
                match converted {
                    Some(value) => frame.push_known(value),
                    None => {
                        let wide = matches!(instruction, I::I2l | I::I2d);
                        frame.push(Evaluation::Unknown, wide);
                    }
                }
            }

            I::Invokevirtual(index)
            | I::Invokespecial(index)
            | I::Invokestatic(index)
            | I::Invokeinterface { index, .. } => {
                if !self.skip_unresolved_calls {
                    return Err(EvaluationError::UnsupportedCall { offset: at });
                }
                let method = class
                    .resolve_ref(*index)
                    .ok_or_else(|| EvaluationError::Malformed(format!("dangling method reference {}", index)))?;
                let receiver = usize::from(!matches!(instruction, I::Invokestatic(_)));
                invoke(frame, &method.descriptor, receiver, at)?;
            }
            I::Invokedynamic { index, .. } => {
                if !self.skip_unresolved_calls {
                    return Err(EvaluationError::UnsupportedCall { offset: at });
                }
                let descriptor = match class.constant(*index) {
                    Some(ConstantInfo::InvokeDynamic(indy)) => class
                        .get_name_and_type(indy.name_and_type_index)
                        .map(|(_, descriptor)| descriptor.to_string()),
                    _ => None,
                }
                .ok_or_else(|| EvaluationError::Malformed(format!("dangling call site {}", index)))?;
                invoke(frame, &descriptor, 0, at)?;
            }

            other => {
                let delta =
                    stack_delta(other, class).map_err(|e| EvaluationError::Malformed(e.to_string()))?;
                frame.havoc(delta, at)?;
            }
        }
        Ok(())
    }
}

fn push_constant(class: &ClassFile, frame: &mut Frame, index: u16) {
    match class.constant(index) {
        Some(ConstantInfo::Integer(c)) => frame.push_known(ConstantValue::Int(c.value)),
        Some(ConstantInfo::Float(c)) => frame.push_known(ConstantValue::Float(c.value)),
        Some(ConstantInfo::Long(c)) => frame.push_known(ConstantValue::Long(c.value)),
        Some(ConstantInfo::Double(c)) => frame.push_known(ConstantValue::Double(c.value)),
        Some(ConstantInfo::String(c)) => match class.get_utf8(c.string_index) {
            Some(value) => frame.push_known(ConstantValue::String(value.to_string())),
            None => frame.push(Evaluation::Unknown, false),
        },
        Some(ConstantInfo::Dynamic(c)) => {
            let wide = class
                .get_name_and_type(c.name_and_type_index)
                .and_then(|(_, descriptor)| parse_type_descriptor(descriptor))
                .is_some_and(|ty| ty.is_wide());
            frame.push(Evaluation::Unknown, wide);
        }
        _ => frame.push(Evaluation::Unknown, false),
    }
}

fn increment(frame: &mut Frame, index: u16, amount: i32) {
    if let Some(slot) = frame.locals.get_mut(index as usize) {
        *slot = match slot {
            Evaluation::Known(ConstantValue::Int(v)) => {
                Evaluation::Known(ConstantValue::Int(v.wrapping_add(amount)))
            }
            _ => Evaluation::Unknown,
        };
    }
}

/// `dup_x` family: copy the top `copied` slots below the next `skipped`.
fn duplicate_below(frame: &mut Frame, copied: usize, skipped: usize, at: u32) -> Result<(), EvaluationError> {
    let top = frame.pop_slots(copied, at)?;
    let below = frame.pop_slots(skipped, at)?;
    frame.stack.extend(top.iter().cloned());
    frame.stack.extend(below);
    frame.stack.extend(top);
    Ok(())
}

fn invoke(frame: &mut Frame, descriptor: &str, receiver: usize, at: u32) -> Result<(), EvaluationError> {
    let parsed = MethodDescriptor::parse(descriptor).map_err(|e| EvaluationError::Malformed(e.to_string()))?;
    frame.pop_slots(parsed.param_slots() as usize + receiver, at)?;
    for _ in 0..parsed.ret.slots() {
        frame.stack.push(Evaluation::Unknown);
    }
    Ok(())
}

fn read_operands(
    frame: &mut Frame,
    operand_types: &[JvmType],
    offset: u32,
) -> Result<Vec<Evaluation>, EvaluationError> {
    let mut values = Vec::with_capacity(operand_types.len());
    for ty in operand_types.iter().rev() {
        values.push(frame.pop(ty.is_wide(), offset)?);
    }
    values.reverse();
    Ok(values)
}

/// Operand stack depth, in slots, at each offset described by the stack map.
fn frame_depths(code: &CodeAttribute) -> BTreeMap<u32, usize> {
    let mut depths = BTreeMap::new();
    let frames = code.attributes.iter().find_map(|a| match &a.info_parsed {
        Some(AttributeInfoVariant::StackMapTable(table)) => Some(&table.entries),
        _ => None,
    });
    let Some(frames) = frames else {
        return depths;
    };
    let slots = |types: &[VerificationTypeInfo]| {
        types
            .iter()
            .map(|t| match t {
                VerificationTypeInfo::Long | VerificationTypeInfo::Double => 2,
                _ => 1,
            })
            .sum::<usize>()
    };
    let mut position: i64 = -1;
    for frame in frames {
        position += frame.offset_delta() as i64 + 1;
        let depth = match &frame.inner {
            StackMapFrameInner::SameLocals1StackItemFrame { stack }
            | StackMapFrameInner::SameLocals1StackItemFrameExtended { stack, .. } => {
                slots(std::slice::from_ref(stack))
            }
            StackMapFrameInner::FullFrame { stack, .. } => slots(stack),
            _ => 0,
        };
        depths.insert(position as u32, depth);
    }
    depths
}
