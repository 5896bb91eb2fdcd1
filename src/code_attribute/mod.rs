mod editor;
pub mod stack;
mod types;

use std::io::Cursor;

use binrw::{BinRead, BinWrite, Endian};

use crate::descriptor::JvmType;
use crate::error::{BackportError, Result};

pub use editor::CodeEditor;
pub use types::*;

/// Decode a code array into instructions paired with their offsets.
pub fn decode_code(code: &[u8]) -> Result<Vec<(u32, Instruction)>> {
    let mut cursor = Cursor::new(code);
    let mut instructions = Vec::new();
    while (cursor.position() as usize) < code.len() {
        let address = cursor.position() as u32;
        let instruction = Instruction::read_options(&mut cursor, Endian::Big, (address,))
            .map_err(|e| BackportError::InvalidCode {
                offset: address,
                reason: e.to_string(),
            })?;
        instructions.push((address, instruction));
    }
    Ok(instructions)
}

/// Encode one instruction as it would appear at `address`.
pub fn encode_instruction(instruction: &Instruction, address: u32) -> Result<Vec<u8>> {
    let mut out = Cursor::new(Vec::new());
    instruction.write_options(&mut out, Endian::Big, (address,))?;
    Ok(out.into_inner())
}

/// Encode a straight sequence of instructions starting at offset 0.
pub fn encode_code<'a, I>(instructions: I) -> Result<Vec<u8>>
where
    I: IntoIterator<Item = &'a Instruction>,
{
    let mut code = Vec::new();
    for instruction in instructions {
        let bytes = encode_instruction(instruction, code.len() as u32)?;
        code.extend_from_slice(&bytes);
    }
    Ok(code)
}

/// Returns the byte size of an instruction in the code array.
/// `address` is the bytecode offset of this instruction (needed for switch alignment).
pub fn instruction_byte_size(instr: &Instruction, address: u32) -> u32 {
    match instr {
        Instruction::Nop => 1,
        Instruction::Aconstnull => 1,
        Instruction::Iconstm1 | Instruction::Iconst0 | Instruction::Iconst1
        | Instruction::Iconst2 | Instruction::Iconst3 | Instruction::Iconst4
        | Instruction::Iconst5 => 1,
        Instruction::Lconst0 | Instruction::Lconst1 => 1,
        Instruction::Fconst0 | Instruction::Fconst1 | Instruction::Fconst2 => 1,
        Instruction::Dconst0 | Instruction::Dconst1 => 1,
        Instruction::Bipush(_) => 2,
        Instruction::Sipush(_) => 3,
        Instruction::Ldc(_) => 2,
        Instruction::LdcW(_) => 3,
        Instruction::Ldc2W(_) => 3,
        Instruction::Iload(_) | Instruction::Lload(_) | Instruction::Fload(_)
        | Instruction::Dload(_) | Instruction::Aload(_) => 2,
        Instruction::Iload0 | Instruction::Iload1 | Instruction::Iload2 | Instruction::Iload3 => 1,
        Instruction::Lload0 | Instruction::Lload1 | Instruction::Lload2 | Instruction::Lload3 => 1,
        Instruction::Fload0 | Instruction::Fload1 | Instruction::Fload2 | Instruction::Fload3 => 1,
        Instruction::Dload0 | Instruction::Dload1 | Instruction::Dload2 | Instruction::Dload3 => 1,
        Instruction::Aload0 | Instruction::Aload1 | Instruction::Aload2 | Instruction::Aload3 => 1,
        Instruction::Iaload | Instruction::Laload | Instruction::Faload
        | Instruction::Daload | Instruction::Aaload | Instruction::Baload
        | Instruction::Caload | Instruction::Saload => 1,
        Instruction::Istore(_) | Instruction::Lstore(_) | Instruction::Fstore(_)
        | Instruction::Dstore(_) | Instruction::Astore(_) => 2,
        Instruction::Istore0 | Instruction::Istore1 | Instruction::Istore2 | Instruction::Istore3 => 1,
        Instruction::Lstore0 | Instruction::Lstore1 | Instruction::Lstore2 | Instruction::Lstore3 => 1,
        Instruction::Fstore0 | Instruction::Fstore1 | Instruction::Fstore2 | Instruction::Fstore3 => 1,
        Instruction::Dstore0 | Instruction::Dstore1 | Instruction::Dstore2 | Instruction::Dstore3 => 1,
        Instruction::Astore0 | Instruction::Astore1 | Instruction::Astore2 | Instruction::Astore3 => 1,
        Instruction::Iastore | Instruction::Lastore | Instruction::Fastore
        | Instruction::Dastore | Instruction::Aastore | Instruction::Bastore
        | Instruction::Castore | Instruction::Sastore => 1,
        Instruction::Pop => 1,
        Instruction::Pop2 => 1,
        Instruction::Dup => 1,
        Instruction::Dupx1 => 1,
        Instruction::Dupx2 => 1,
        Instruction::Dup2 => 1,
        Instruction::Dup2x1 => 1,
        Instruction::Dup2x2 => 1,
        Instruction::Swap => 1,
        Instruction::Iadd | Instruction::Ladd | Instruction::Fadd | Instruction::Dadd => 1,
        Instruction::Isub | Instruction::Lsub | Instruction::Fsub | Instruction::Dsub => 1,
        Instruction::Imul | Instruction::Lmul | Instruction::Fmul | Instruction::Dmul => 1,
        Instruction::Idiv | Instruction::Ldiv | Instruction::Fdiv | Instruction::Ddiv => 1,
        Instruction::Irem | Instruction::Lrem | Instruction::Frem | Instruction::Drem => 1,
        Instruction::Ineg | Instruction::Lneg | Instruction::Fneg | Instruction::Dneg => 1,
        Instruction::Ishl | Instruction::Lshl => 1,
        Instruction::Ishr | Instruction::Lshr => 1,
        Instruction::Iushr | Instruction::Lushr => 1,
        Instruction::Iand | Instruction::Land => 1,
        Instruction::Ior | Instruction::Lor => 1,
        Instruction::Ixor | Instruction::Lxor => 1,
        Instruction::Iinc { .. } => 3,
        Instruction::I2l | Instruction::I2f | Instruction::I2d => 1,
        Instruction::L2i | Instruction::L2f | Instruction::L2d => 1,
        Instruction::F2i | Instruction::F2l | Instruction::F2d => 1,
        Instruction::D2i | Instruction::D2l | Instruction::D2f => 1,
        Instruction::I2b | Instruction::I2c | Instruction::I2s => 1,
        Instruction::Lcmp => 1,
        Instruction::Fcmpl | Instruction::Fcmpg => 1,
        Instruction::Dcmpl | Instruction::Dcmpg => 1,
        Instruction::Ifeq(_) | Instruction::Ifne(_) | Instruction::Iflt(_)
        | Instruction::Ifge(_) | Instruction::Ifgt(_) | Instruction::Ifle(_) => 3,
        Instruction::IfIcmpeq(_) | Instruction::IfIcmpne(_) | Instruction::IfIcmplt(_)
        | Instruction::IfIcmpge(_) | Instruction::IfIcmpgt(_) | Instruction::IfIcmple(_) => 3,
        Instruction::IfAcmpeq(_) | Instruction::IfAcmpne(_) => 3,
        Instruction::Goto(_) => 3,
        Instruction::Jsr(_) => 3,
        Instruction::Ret(_) => 2,
        Instruction::Tableswitch { offsets, .. } => {
            let padding = (4 - (address + 1) % 4) % 4;
            // 1 (opcode) + padding + 4 (default) + 4 (low) + 4 (high) + 4*(high-low+1)
            1 + padding + 4 + 4 + 4 + 4 * offsets.len() as u32
        }
        Instruction::Lookupswitch { pairs, .. } => {
            let padding = (4 - (address + 1) % 4) % 4;
            // 1 (opcode) + padding + 4 (default) + 4 (npairs) + 8*npairs
            1 + padding + 4 + 4 + 8 * pairs.len() as u32
        }
        Instruction::Getstatic(_) | Instruction::Putstatic(_)
        | Instruction::Getfield(_) | Instruction::Putfield(_) => 3,
        Instruction::Invokevirtual(_) | Instruction::Invokespecial(_)
        | Instruction::Invokestatic(_) => 3,
        Instruction::Invokeinterface { .. } => 5,
        Instruction::Invokedynamic { .. } => 5,
        Instruction::New(_) => 3,
        Instruction::Newarray(_) => 2,
        Instruction::Anewarray(_) => 3,
        Instruction::Arraylength => 1,
        Instruction::Athrow => 1,
        Instruction::Checkcast(_) => 3,
        Instruction::Instanceof(_) => 3,
        Instruction::Monitorenter | Instruction::Monitorexit => 1,
        Instruction::Multianewarray { .. } => 4,
        Instruction::Ifnull(_) | Instruction::Ifnonnull(_) => 3,
        Instruction::GotoW(_) => 5,
        Instruction::JsrW(_) => 5,
        Instruction::Areturn | Instruction::Ireturn | Instruction::Lreturn
        | Instruction::Freturn | Instruction::Dreturn | Instruction::Return => 1,
        // wide prefix + opcode + 2 byte index
        Instruction::Wide(WideInstruction::Iinc { .. }) => 6,
        Instruction::Wide(_) => 4,
    }
}

impl Instruction {
    fn short_branch_mut(&mut self) -> Option<&mut i16> {
        match self {
            Instruction::Ifeq(o)
            | Instruction::Ifne(o)
            | Instruction::Iflt(o)
            | Instruction::Ifge(o)
            | Instruction::Ifgt(o)
            | Instruction::Ifle(o)
            | Instruction::IfIcmpeq(o)
            | Instruction::IfIcmpne(o)
            | Instruction::IfIcmplt(o)
            | Instruction::IfIcmpge(o)
            | Instruction::IfIcmpgt(o)
            | Instruction::IfIcmple(o)
            | Instruction::IfAcmpeq(o)
            | Instruction::IfAcmpne(o)
            | Instruction::Ifnull(o)
            | Instruction::Ifnonnull(o)
            | Instruction::Goto(o)
            | Instruction::Jsr(o) => Some(o),
            _ => None,
        }
    }

    /// Relative branch offsets of the instruction. Switches list their
    /// default first, then each case in encoding order.
    pub fn branch_offsets(&self) -> Vec<i32> {
        match self {
            Instruction::GotoW(offset) | Instruction::JsrW(offset) => vec![*offset],
            Instruction::Tableswitch {
                default, offsets, ..
            } => std::iter::once(*default).chain(offsets.iter().copied()).collect(),
            Instruction::Lookupswitch { default, pairs, .. } => std::iter::once(*default)
                .chain(pairs.iter().map(|(_, offset)| *offset))
                .collect(),
            other => other
                .clone()
                .short_branch_mut()
                .map(|offset| vec![*offset as i32])
                .unwrap_or_default(),
        }
    }

    /// Replace the offsets reported by [`Instruction::branch_offsets`], in
    /// the same order. Returns the first offset that does not fit.
    pub fn set_branch_offsets(&mut self, new_offsets: &[i32]) -> std::result::Result<(), i32> {
        if let Some(offset) = self.short_branch_mut() {
            let value = new_offsets[0];
            *offset = i16::try_from(value).map_err(|_| value)?;
            return Ok(());
        }
        match self {
            Instruction::GotoW(offset) | Instruction::JsrW(offset) => *offset = new_offsets[0],
            Instruction::Tableswitch {
                default, offsets, ..
            } => {
                *default = new_offsets[0];
                offsets.copy_from_slice(&new_offsets[1..]);
            }
            Instruction::Lookupswitch { default, pairs, .. } => {
                *default = new_offsets[0];
                for (pair, offset) in pairs.iter_mut().zip(&new_offsets[1..]) {
                    pair.1 = *offset;
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Instructions after which control never falls through.
    pub fn ends_block(&self) -> bool {
        matches!(
            self,
            Instruction::Goto(_)
                | Instruction::GotoW(_)
                | Instruction::Tableswitch { .. }
                | Instruction::Lookupswitch { .. }
                | Instruction::Athrow
                | Instruction::Ret(_)
                | Instruction::Wide(WideInstruction::Ret(_))
                | Instruction::Return
                | Instruction::Ireturn
                | Instruction::Lreturn
                | Instruction::Freturn
                | Instruction::Dreturn
                | Instruction::Areturn
        )
    }

    /// Load a local of the given type, picking the shortest encoding.
    pub fn load(ty: &JvmType, index: u16) -> Instruction {
        use Instruction::*;
        match ty {
            JvmType::Long => match index {
                0 => Lload0,
                1 => Lload1,
                2 => Lload2,
                3 => Lload3,
                i if i <= 255 => Lload(i as u8),
                i => Wide(WideInstruction::Lload(i)),
            },
            JvmType::Float => match index {
                0 => Fload0,
                1 => Fload1,
                2 => Fload2,
                3 => Fload3,
                i if i <= 255 => Fload(i as u8),
                i => Wide(WideInstruction::Fload(i)),
            },
            JvmType::Double => match index {
                0 => Dload0,
                1 => Dload1,
                2 => Dload2,
                3 => Dload3,
                i if i <= 255 => Dload(i as u8),
                i => Wide(WideInstruction::Dload(i)),
            },
            JvmType::Reference(_) | JvmType::Array(_) => match index {
                0 => Aload0,
                1 => Aload1,
                2 => Aload2,
                3 => Aload3,
                i if i <= 255 => Aload(i as u8),
                i => Wide(WideInstruction::Aload(i)),
            },
            _ => match index {
                0 => Iload0,
                1 => Iload1,
                2 => Iload2,
                3 => Iload3,
                i if i <= 255 => Iload(i as u8),
                i => Wide(WideInstruction::Iload(i)),
            },
        }
    }

    /// Store into a local of the given type, picking the shortest encoding.
    pub fn store(ty: &JvmType, index: u16) -> Instruction {
        use Instruction::*;
        match ty {
            JvmType::Long => match index {
                0 => Lstore0,
                1 => Lstore1,
                2 => Lstore2,
                3 => Lstore3,
                i if i <= 255 => Lstore(i as u8),
                i => Wide(WideInstruction::Lstore(i)),
            },
            JvmType::Float => match index {
                0 => Fstore0,
                1 => Fstore1,
                2 => Fstore2,
                3 => Fstore3,
                i if i <= 255 => Fstore(i as u8),
                i => Wide(WideInstruction::Fstore(i)),
            },
            JvmType::Double => match index {
                0 => Dstore0,
                1 => Dstore1,
                2 => Dstore2,
                3 => Dstore3,
                i if i <= 255 => Dstore(i as u8),
                i => Wide(WideInstruction::Dstore(i)),
            },
            JvmType::Reference(_) | JvmType::Array(_) => match index {
                0 => Astore0,
                1 => Astore1,
                2 => Astore2,
                3 => Astore3,
                i if i <= 255 => Astore(i as u8),
                i => Wide(WideInstruction::Astore(i)),
            },
            _ => match index {
                0 => Istore0,
                1 => Istore1,
                2 => Istore2,
                3 => Istore3,
                i if i <= 255 => Istore(i as u8),
                i => Wide(WideInstruction::Istore(i)),
            },
        }
    }

    pub fn return_for(ty: &JvmType) -> Instruction {
        match ty {
            JvmType::Void => Instruction::Return,
            JvmType::Long => Instruction::Lreturn,
            JvmType::Float => Instruction::Freturn,
            JvmType::Double => Instruction::Dreturn,
            JvmType::Reference(_) | JvmType::Array(_) => Instruction::Areturn,
            _ => Instruction::Ireturn,
        }
    }

    /// Load a pool constant; `wide` selects `ldc2_w` for long and double.
    pub fn ldc(index: u16, wide: bool) -> Instruction {
        if wide {
            Instruction::Ldc2W(index)
        } else if index <= 255 {
            Instruction::Ldc(index as u8)
        } else {
            Instruction::LdcW(index)
        }
    }
}
