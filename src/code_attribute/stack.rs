use crate::code_attribute::{Instruction, WideInstruction};
use crate::constant_info::ConstantInfo;
use crate::descriptor::{parse_type_descriptor, MethodDescriptor};
use crate::error::{BackportError, Result};
use crate::types::ClassFile;

/// Max stack of straight-line code, such as the bodies the backporter
/// synthesizes.
pub fn compute_max_stack(instructions: &[Instruction], class: &ClassFile) -> Result<u16> {
    let mut depth: i32 = 0;
    let mut max_depth: i32 = 0;

    for instr in instructions {
        depth += stack_delta(instr, class)?;
        max_depth = max_depth.max(depth);
        // Clamp to prevent underflow from unreachable code
        if depth < 0 {
            depth = 0;
        }
    }

    Ok(max_depth as u16)
}

/// Returns the net stack depth change for an instruction. Invocations and
/// field accesses are resolved through the class's constant pool.
pub fn stack_delta(instr: &Instruction, class: &ClassFile) -> Result<i32> {
    let delta = match instr {
        // Constants: push 1
        Instruction::Aconstnull
        | Instruction::Iconstm1
        | Instruction::Iconst0
        | Instruction::Iconst1
        | Instruction::Iconst2
        | Instruction::Iconst3
        | Instruction::Iconst4
        | Instruction::Iconst5
        | Instruction::Fconst0
        | Instruction::Fconst1
        | Instruction::Fconst2
        | Instruction::Bipush(_)
        | Instruction::Sipush(_)
        | Instruction::Ldc(_)
        | Instruction::LdcW(_) => 1,

        // long and double take two slots
        Instruction::Lconst0 | Instruction::Lconst1 | Instruction::Dconst0 | Instruction::Dconst1 => 2,
        Instruction::Ldc2W(_) => 2,

        // Loads: push 1 (or 2 for long/double)
        Instruction::Iload(_)
        | Instruction::Iload0
        | Instruction::Iload1
        | Instruction::Iload2
        | Instruction::Iload3
        | Instruction::Fload(_)
        | Instruction::Fload0
        | Instruction::Fload1
        | Instruction::Fload2
        | Instruction::Fload3
        | Instruction::Aload(_)
        | Instruction::Aload0
        | Instruction::Aload1
        | Instruction::Aload2
        | Instruction::Aload3
        | Instruction::Wide(WideInstruction::Iload(_))
        | Instruction::Wide(WideInstruction::Fload(_))
        | Instruction::Wide(WideInstruction::Aload(_)) => 1,

        Instruction::Lload(_)
        | Instruction::Lload0
        | Instruction::Lload1
        | Instruction::Lload2
        | Instruction::Lload3
        | Instruction::Dload(_)
        | Instruction::Dload0
        | Instruction::Dload1
        | Instruction::Dload2
        | Instruction::Dload3
        | Instruction::Wide(WideInstruction::Lload(_))
        | Instruction::Wide(WideInstruction::Dload(_)) => 2,

        // Array loads: pop 2 (arrayref + index), push 1 (or 2)
        Instruction::Iaload
        | Instruction::Faload
        | Instruction::Aaload
        | Instruction::Baload
        | Instruction::Caload
        | Instruction::Saload => -1, // -2 + 1

        Instruction::Laload | Instruction::Daload => 0, // -2 + 2

        // Stores: pop 1 (or 2 for long/double)
        Instruction::Istore(_)
        | Instruction::Istore0
        | Instruction::Istore1
        | Instruction::Istore2
        | Instruction::Istore3
        | Instruction::Fstore(_)
        | Instruction::Fstore0
        | Instruction::Fstore1
        | Instruction::Fstore2
        | Instruction::Fstore3
        | Instruction::Astore(_)
        | Instruction::Astore0
        | Instruction::Astore1
        | Instruction::Astore2
        | Instruction::Astore3
        | Instruction::Wide(WideInstruction::Istore(_))
        | Instruction::Wide(WideInstruction::Fstore(_))
        | Instruction::Wide(WideInstruction::Astore(_)) => -1,

        Instruction::Lstore(_)
        | Instruction::Lstore0
        | Instruction::Lstore1
        | Instruction::Lstore2
        | Instruction::Lstore3
        | Instruction::Dstore(_)
        | Instruction::Dstore0
        | Instruction::Dstore1
        | Instruction::Dstore2
        | Instruction::Dstore3
        | Instruction::Wide(WideInstruction::Lstore(_))
        | Instruction::Wide(WideInstruction::Dstore(_)) => -2,

        // Array stores: pop 3 (arrayref + index + value)
        Instruction::Iastore
        | Instruction::Fastore
        | Instruction::Aastore
        | Instruction::Bastore
        | Instruction::Castore
        | Instruction::Sastore => -3,

        Instruction::Lastore | Instruction::Dastore => -4, // pop arrayref + index + long/double

        // Stack manipulation
        Instruction::Pop => -1,
        Instruction::Pop2 => -2,
        Instruction::Dup => 1,
        Instruction::Dupx1 => 1,
        Instruction::Dupx2 => 1,
        Instruction::Dup2 => 2,
        Instruction::Dup2x1 => 2,
        Instruction::Dup2x2 => 2,
        Instruction::Swap => 0,

        // Arithmetic: pop 2, push 1 (net -1 for int/float)
        Instruction::Iadd
        | Instruction::Isub
        | Instruction::Imul
        | Instruction::Idiv
        | Instruction::Irem
        | Instruction::Ishl
        | Instruction::Ishr
        | Instruction::Iushr
        | Instruction::Iand
        | Instruction::Ior
        | Instruction::Ixor
        | Instruction::Fadd
        | Instruction::Fsub
        | Instruction::Fmul
        | Instruction::Fdiv
        | Instruction::Frem => -1,

        // Long/double arithmetic: pop 4, push 2 (net -2)
        Instruction::Ladd
        | Instruction::Lsub
        | Instruction::Lmul
        | Instruction::Ldiv
        | Instruction::Lrem
        | Instruction::Land
        | Instruction::Lor
        | Instruction::Lxor
        | Instruction::Dadd
        | Instruction::Dsub
        | Instruction::Dmul
        | Instruction::Ddiv
        | Instruction::Drem => -2,

        // Long shift: pop long(2) + int(1), push long(2) = -1
        Instruction::Lshl | Instruction::Lshr | Instruction::Lushr => -1,

        // Negate: pop 1, push 1 = 0
        Instruction::Ineg | Instruction::Fneg => 0,
        Instruction::Lneg | Instruction::Dneg => 0,

        // Iinc doesn't touch the stack
        Instruction::Iinc { .. } | Instruction::Wide(WideInstruction::Iinc { .. }) => 0,

        // Conversions: same stack effect as source and target sizes
        Instruction::I2l | Instruction::I2d | Instruction::F2l | Instruction::F2d => 1, // push extra slot
        Instruction::L2i | Instruction::L2f | Instruction::D2i | Instruction::D2f => -1, // lose a slot
        Instruction::I2f | Instruction::I2b | Instruction::I2c | Instruction::I2s | Instruction::F2i => 0,
        Instruction::L2d | Instruction::D2l => 0, // 2 -> 2

        // Comparisons
        Instruction::Lcmp => -3, // pop 2 longs (4 slots), push int (1) = -3
        Instruction::Fcmpl | Instruction::Fcmpg => -1, // pop 2, push 1
        Instruction::Dcmpl | Instruction::Dcmpg => -3, // pop 2 doubles (4 slots), push int

        // Branches: pop operand(s), no push
        Instruction::Ifeq(_)
        | Instruction::Ifne(_)
        | Instruction::Iflt(_)
        | Instruction::Ifge(_)
        | Instruction::Ifgt(_)
        | Instruction::Ifle(_)
        | Instruction::Ifnull(_)
        | Instruction::Ifnonnull(_) => -1,

        Instruction::IfIcmpeq(_)
        | Instruction::IfIcmpne(_)
        | Instruction::IfIcmplt(_)
        | Instruction::IfIcmpge(_)
        | Instruction::IfIcmpgt(_)
        | Instruction::IfIcmple(_)
        | Instruction::IfAcmpeq(_)
        | Instruction::IfAcmpne(_) => -2,

        Instruction::Goto(_) | Instruction::GotoW(_) => 0,

        // Returns
        Instruction::Return => 0,
        Instruction::Ireturn | Instruction::Freturn | Instruction::Areturn => -1,
        Instruction::Lreturn | Instruction::Dreturn => -2,

        // Field access
        Instruction::Getstatic(index) => field_slots(class, *index)?,
        Instruction::Putstatic(index) => -field_slots(class, *index)?,
        Instruction::Getfield(index) => field_slots(class, *index)? - 1,
        Instruction::Putfield(index) => -field_slots(class, *index)? - 1,

        // Invocations pop the receiver (if any) and arguments, push the result
        Instruction::Invokevirtual(index)
        | Instruction::Invokespecial(index)
        | Instruction::Invokeinterface { index, .. } => invoke_delta(class, *index)? - 1,
        Instruction::Invokestatic(index) => invoke_delta(class, *index)?,
        Instruction::Invokedynamic { index, .. } => {
            let descriptor = match class.constant(*index) {
                Some(ConstantInfo::InvokeDynamic(indy)) => class
                    .get_name_and_type(indy.name_and_type_index)
                    .map(|(_, descriptor)| descriptor),
                _ => None,
            };
            let descriptor = descriptor.ok_or_else(|| dangling(class, *index))?;
            let parsed = MethodDescriptor::parse(descriptor)?;
            parsed.ret.slots() as i32 - parsed.param_slots() as i32
        }

        // Object creation
        Instruction::New(_) => 1,
        Instruction::Newarray(_) => 0, // pop count, push arrayref
        Instruction::Anewarray(_) => 0,
        Instruction::Arraylength => 0, // pop arrayref, push length

        Instruction::Athrow => -1,
        Instruction::Checkcast(_) => 0,
        Instruction::Instanceof(_) => 0, // pop ref, push int

        Instruction::Monitorenter | Instruction::Monitorexit => -1,

        Instruction::Multianewarray { dimensions, .. } => {
            1 - (*dimensions as i32) // pop N counts, push arrayref
        }

        // Switch
        Instruction::Tableswitch { .. } | Instruction::Lookupswitch { .. } => -1,

        // JSR/RET (legacy)
        Instruction::Jsr(_) | Instruction::JsrW(_) => 1,
        Instruction::Ret(_) | Instruction::Wide(WideInstruction::Ret(_)) => 0,

        // Nop
        Instruction::Nop => 0,
    };
    Ok(delta)
}

fn dangling(class: &ClassFile, index: u16) -> BackportError {
    BackportError::DanglingConstant {
        class: class.display_name().to_string(),
        index,
    }
}

fn field_slots(class: &ClassFile, index: u16) -> Result<i32> {
    let field = class.resolve_ref(index).ok_or_else(|| dangling(class, index))?;
    let ty = parse_type_descriptor(&field.descriptor).ok_or_else(|| {
        BackportError::InvalidDescriptor {
            descriptor: field.descriptor.clone(),
        }
    })?;
    Ok(ty.slots() as i32)
}

/// The `count` operand of invokeinterface: receiver plus argument slots.
pub fn invokeinterface_count(class: &ClassFile, index: u16) -> Result<u8> {
    let method = class.resolve_ref(index).ok_or_else(|| dangling(class, index))?;
    let parsed = MethodDescriptor::parse(&method.descriptor)?;
    Ok(parsed.param_slots() as u8 + 1)
}

fn invoke_delta(class: &ClassFile, index: u16) -> Result<i32> {
    let method = class.resolve_ref(index).ok_or_else(|| dangling(class, index))?;
    let parsed = MethodDescriptor::parse(&method.descriptor)?;
    Ok(parsed.ret.slots() as i32 - parsed.param_slots() as i32)
}
