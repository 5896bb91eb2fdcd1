use std::collections::BTreeMap;

use log::debug;

use crate::attribute_info::{AttributeInfoVariant, CodeAttribute, StackMapFrame, VerificationTypeInfo};
use crate::constant_info::ConstantInfo;
use crate::error::{BackportError, Result};
use crate::types::ClassFile;

use super::{decode_code, encode_instruction, instruction_byte_size, Instruction};

const MAX_CODE_LENGTH: usize = u16::MAX as usize;

/// Offset-keyed type annotations cannot be re-based and are dropped from
/// edited code.
const TYPE_ANNOTATIONS: [&str; 2] = [
    "RuntimeVisibleTypeAnnotations",
    "RuntimeInvisibleTypeAnnotations",
];

/// Pending edits to one Code attribute.
///
/// Replacements are keyed by the original offset of the instruction they
/// replace and must be straight-line code. [`CodeEditor::apply`] lays the
/// code out again in one pass and re-bases every offset-dependent
/// structure: branches, switches, the exception table, line numbers,
/// local variable (type) tables and the stack map table.
pub struct CodeEditor {
    instructions: Vec<(u32, Instruction)>,
    code_length: u32,
    replacements: BTreeMap<u32, Vec<Instruction>>,
}

impl CodeEditor {
    pub fn new(code: &CodeAttribute) -> Result<Self> {
        Ok(CodeEditor {
            instructions: decode_code(&code.code)?,
            code_length: code.code.len() as u32,
            replacements: BTreeMap::new(),
        })
    }

    /// The original instructions with their original offsets.
    pub fn instructions(&self) -> &[(u32, Instruction)] {
        &self.instructions
    }

    pub fn instruction_at(&self, offset: u32) -> Option<&Instruction> {
        self.instructions
            .binary_search_by_key(&offset, |(o, _)| *o)
            .ok()
            .map(|pos| &self.instructions[pos].1)
    }

    /// Replace the instruction at `offset` with a sequence. Branches to
    /// `offset` land on the first instruction of the sequence.
    pub fn replace(&mut self, offset: u32, sequence: Vec<Instruction>) {
        self.replacements.insert(offset, sequence);
    }

    pub fn is_modified(&self) -> bool {
        !self.replacements.is_empty()
    }

    /// Write the edited code back into `code`.
    pub fn apply(self, code: &mut CodeAttribute, pool: &[ConstantInfo], method: &str) -> Result<()> {
        if !self.is_modified() {
            return Ok(());
        }

        // Layout: new offset of every original instruction, plus the end.
        let mut offset_map: BTreeMap<u32, u32> = BTreeMap::new();
        let mut emitted: Vec<(u32, Option<u32>, Instruction)> = Vec::new();
        let mut address = 0u32;
        for (old_offset, instruction) in &self.instructions {
            offset_map.insert(*old_offset, address);
            match self.replacements.get(old_offset) {
                Some(sequence) => {
                    for replacement in sequence {
                        let size = instruction_byte_size(replacement, address);
                        emitted.push((address, None, replacement.clone()));
                        address += size;
                    }
                }
                None => {
                    let size = instruction_byte_size(instruction, address);
                    emitted.push((address, Some(*old_offset), instruction.clone()));
                    address += size;
                }
            }
        }
        offset_map.insert(self.code_length, address);

        if address as usize > MAX_CODE_LENGTH {
            return Err(BackportError::CodeTooLarge {
                method: method.to_string(),
                length: address as usize,
            });
        }

        let map = |old: i64, from: u32| -> Result<u32> {
            u32::try_from(old)
                .ok()
                .and_then(|old| offset_map.get(&old).copied())
                .ok_or(BackportError::DanglingBranch {
                    offset: from,
                    target: old,
                })
        };

        let mut bytes = Vec::with_capacity(address as usize);
        for (new_offset, old_offset, mut instruction) in emitted {
            if let Some(old_offset) = old_offset {
                let relative = instruction.branch_offsets();
                if !relative.is_empty() {
                    let mut rebased = Vec::with_capacity(relative.len());
                    for delta in relative {
                        let target = map(old_offset as i64 + delta as i64, old_offset)?;
                        rebased.push(target as i32 - new_offset as i32);
                    }
                    instruction.set_branch_offsets(&rebased).map_err(|delta| {
                        BackportError::BranchOverflow {
                            offset: new_offset,
                            delta: delta as i64,
                        }
                    })?;
                }
            }
            bytes.extend(encode_instruction(&instruction, new_offset)?);
        }

        for entry in &mut code.exception_table {
            entry.start_pc = map(entry.start_pc as i64, entry.start_pc as u32)? as u16;
            entry.end_pc = map(entry.end_pc as i64, entry.end_pc as u32)? as u16;
            entry.handler_pc = map(entry.handler_pc as i64, entry.handler_pc as u32)? as u16;
        }

        let mut dropped = 0;
        code.attributes.retain(|attribute| {
            let keep = !matches!(attribute.name(pool), Some(name) if TYPE_ANNOTATIONS.contains(&name));
            if !keep {
                dropped += 1;
            }
            keep
        });
        if dropped > 0 {
            debug!("Dropped {} type annotation attribute(s) from {}", dropped, method);
        }

        for attribute in &mut code.attributes {
            match &mut attribute.info_parsed {
                Some(AttributeInfoVariant::LineNumberTable(table)) => {
                    for entry in &mut table.line_number_table {
                        entry.start_pc = map(entry.start_pc as i64, entry.start_pc as u32)? as u16;
                    }
                }
                Some(AttributeInfoVariant::LocalVariableTable(table)) => {
                    for item in &mut table.items {
                        let (start, length) = rebase_range(&map, item.start_pc, item.length)?;
                        item.start_pc = start;
                        item.length = length;
                    }
                }
                Some(AttributeInfoVariant::LocalVariableTypeTable(table)) => {
                    for item in &mut table.local_variable_type_table {
                        let (start, length) = rebase_range(&map, item.start_pc, item.length)?;
                        item.start_pc = start;
                        item.length = length;
                    }
                }
                Some(AttributeInfoVariant::StackMapTable(table)) => {
                    table.entries = rebase_frames(&table.entries, &map)?;
                }
                _ => {}
            }
        }

        code.code = bytes;
        Ok(())
    }
}

impl ClassFile {
    /// Apply an editor built from the Code attribute of `method_index`.
    /// Every instruction the editor inserts is appended to `emitted`.
    pub fn apply_code_edit(
        &mut self,
        method_index: usize,
        editor: CodeEditor,
        emitted: &mut Vec<Instruction>,
    ) -> Result<bool> {
        if !editor.is_modified() {
            return Ok(false);
        }
        emitted.extend(editor.replacements.values().flatten().cloned());
        let name = self
            .methods
            .get(method_index)
            .and_then(|m| self.method_name(m))
            .unwrap_or("<unknown>")
            .to_string();
        let ClassFile {
            const_pool,
            methods,
            ..
        } = self;
        match methods.get_mut(method_index).and_then(|m| m.code_mut()) {
            Some(code) => {
                editor.apply(code, const_pool, &name)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

fn rebase_range<F>(map: &F, start_pc: u16, length: u16) -> Result<(u16, u16)>
where
    F: Fn(i64, u32) -> Result<u32>,
{
    let start = map(start_pc as i64, start_pc as u32)?;
    let end = map(start_pc as i64 + length as i64, start_pc as u32)?;
    Ok((start as u16, (end - start) as u16))
}

fn rebase_frames<F>(frames: &[StackMapFrame], map: &F) -> Result<Vec<StackMapFrame>>
where
    F: Fn(i64, u32) -> Result<u32>,
{
    let mut rebased = Vec::with_capacity(frames.len());
    let mut old_position: i64 = -1;
    let mut new_position: i64 = -1;
    for frame in frames {
        old_position += frame.offset_delta() as i64 + 1;
        let target = map(old_position, old_position as u32)? as i64;
        let mut frame = frame.with_offset_delta((target - new_position - 1) as u16);
        for info in frame.verification_types_mut() {
            if let VerificationTypeInfo::Uninitialized { offset } = info {
                *offset = map(*offset as i64, *offset as u32)? as u16;
            }
        }
        rebased.push(frame);
        new_position = target;
    }
    Ok(rebased)
}
