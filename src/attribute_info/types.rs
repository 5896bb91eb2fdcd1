use binrw::binrw;

#[binrw]
#[derive(Clone, Debug)]
#[brw(big)]
pub struct AttributeInfo {
    pub attribute_name_index: u16,
    #[br(temp)]
    #[bw(calc = info.len() as u32)]
    attribute_length: u32,
    #[br(count = attribute_length as usize)]
    pub info: Vec<u8>,
    /// Decoded form of the attributes the rewriters understand. When set,
    /// it is the source of truth and `info` is regenerated from it.
    #[brw(ignore)]
    pub info_parsed: Option<AttributeInfoVariant>,
}

#[derive(Clone, Debug)]
pub enum AttributeInfoVariant {
    Code(CodeAttribute),
    BootstrapMethods(BootstrapMethodsAttribute),
    LineNumberTable(LineNumberTableAttribute),
    LocalVariableTable(LocalVariableTableAttribute),
    LocalVariableTypeTable(LocalVariableTypeTableAttribute),
    StackMapTable(StackMapTableAttribute),
}

#[binrw]
#[derive(Clone, Debug, PartialEq, Eq)]
#[brw(big)]
pub struct ExceptionEntry {
    pub start_pc: u16,
    pub end_pc: u16,
    pub handler_pc: u16,
    pub catch_type: u16,
}

#[binrw]
#[derive(Clone, Debug)]
#[brw(big)]
pub struct CodeAttribute {
    pub max_stack: u16,
    pub max_locals: u16,
    #[br(temp)]
    #[bw(calc = code.len() as u32)]
    code_length: u32,
    #[br(count = code_length as usize)]
    pub code: Vec<u8>,
    #[br(temp)]
    #[bw(calc = exception_table.len() as u16)]
    exception_table_length: u16,
    #[br(count = exception_table_length)]
    pub exception_table: Vec<ExceptionEntry>,
    #[br(temp)]
    #[bw(calc = attributes.len() as u16)]
    attributes_count: u16,
    #[br(count = attributes_count)]
    pub attributes: Vec<AttributeInfo>,
}

#[binrw]
#[derive(Clone, Debug, PartialEq, Eq)]
#[brw(big)]
pub struct BootstrapMethod {
    pub bootstrap_method_ref: u16,
    #[br(temp)]
    #[bw(calc = bootstrap_arguments.len() as u16)]
    num_bootstrap_arguments: u16,
    #[br(count = num_bootstrap_arguments)]
    pub bootstrap_arguments: Vec<u16>,
}

#[binrw]
#[derive(Clone, Debug, Default)]
#[brw(big)]
pub struct BootstrapMethodsAttribute {
    #[br(temp)]
    #[bw(calc = bootstrap_methods.len() as u16)]
    num_bootstrap_methods: u16,
    #[br(count = num_bootstrap_methods)]
    pub bootstrap_methods: Vec<BootstrapMethod>,
}

#[binrw]
#[derive(Clone, Debug, PartialEq, Eq)]
#[brw(big)]
pub struct LineNumberTableEntry {
    pub start_pc: u16,
    pub line_number: u16,
}

#[binrw]
#[derive(Clone, Debug, Default)]
#[brw(big)]
pub struct LineNumberTableAttribute {
    #[br(temp)]
    #[bw(calc = line_number_table.len() as u16)]
    line_number_table_length: u16,
    #[br(count = line_number_table_length)]
    pub line_number_table: Vec<LineNumberTableEntry>,
}

#[binrw]
#[derive(Clone, Debug, PartialEq, Eq)]
#[brw(big)]
pub struct LocalVariableTableItem {
    pub start_pc: u16,
    pub length: u16,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub index: u16,
}

#[binrw]
#[derive(Clone, Debug, Default)]
#[brw(big)]
pub struct LocalVariableTableAttribute {
    #[br(temp)]
    #[bw(calc = items.len() as u16)]
    local_variable_table_length: u16,
    #[br(count = local_variable_table_length)]
    pub items: Vec<LocalVariableTableItem>,
}

#[binrw]
#[derive(Clone, Debug, PartialEq, Eq)]
#[brw(big)]
pub struct LocalVariableTypeTableItem {
    pub start_pc: u16,
    pub length: u16,
    pub name_index: u16,
    pub signature_index: u16,
    pub index: u16,
}

#[binrw]
#[derive(Clone, Debug, Default)]
#[brw(big)]
pub struct LocalVariableTypeTableAttribute {
    #[br(temp)]
    #[bw(calc = local_variable_type_table.len() as u16)]
    local_variable_type_table_length: u16,
    #[br(count = local_variable_type_table_length)]
    pub local_variable_type_table: Vec<LocalVariableTypeTableItem>,
}

#[binrw]
#[derive(Clone, Debug, PartialEq, Eq)]
#[brw(big)]
pub enum VerificationTypeInfo {
    #[brw(magic = 0u8)]
    Top,
    #[brw(magic = 1u8)]
    Integer,
    #[brw(magic = 2u8)]
    Float,
    #[brw(magic = 3u8)]
    Double,
    #[brw(magic = 4u8)]
    Long,
    #[brw(magic = 5u8)]
    Null,
    #[brw(magic = 6u8)]
    UninitializedThis,
    #[brw(magic = 7u8)]
    Object {
        /// An index into the constant pool for the class of the object
        class: u16,
    },
    #[brw(magic = 8u8)]
    Uninitialized {
        /// Offset into associated code array of a new instruction
        /// that created the object being stored here.
        offset: u16,
    },
}

#[binrw]
#[derive(Clone, Debug, PartialEq, Eq)]
#[brw(big)]
pub struct StackMapFrame {
    pub frame_type: u8,
    #[br(args(frame_type))]
    pub inner: StackMapFrameInner,
}

#[binrw]
#[derive(Clone, Debug, PartialEq, Eq)]
#[brw(big)]
#[br(import(frame_type: u8))]
pub enum StackMapFrameInner {
    #[br(pre_assert(frame_type <= 63))]
    SameFrame,
    #[br(pre_assert((64..=127).contains(&frame_type)))]
    SameLocals1StackItemFrame { stack: VerificationTypeInfo },
    #[br(pre_assert(frame_type == 247))]
    SameLocals1StackItemFrameExtended {
        offset_delta: u16,
        stack: VerificationTypeInfo,
    },
    #[br(pre_assert((248..=250).contains(&frame_type)))]
    ChopFrame { offset_delta: u16 },
    #[br(pre_assert(frame_type == 251))]
    SameFrameExtended { offset_delta: u16 },
    #[br(pre_assert((252..=254).contains(&frame_type)))]
    AppendFrame {
        offset_delta: u16,
        #[br(count = frame_type - 251)]
        locals: Vec<VerificationTypeInfo>,
    },
    #[br(pre_assert(frame_type == 255))]
    FullFrame {
        offset_delta: u16,
        #[br(temp)]
        #[bw(calc = locals.len() as u16)]
        number_of_locals: u16,
        #[br(count = number_of_locals)]
        locals: Vec<VerificationTypeInfo>,
        #[br(temp)]
        #[bw(calc = stack.len() as u16)]
        number_of_stack_items: u16,
        #[br(count = number_of_stack_items)]
        stack: Vec<VerificationTypeInfo>,
    },
}

impl StackMapFrame {
    pub fn offset_delta(&self) -> u16 {
        match &self.inner {
            StackMapFrameInner::SameFrame => self.frame_type as u16,
            StackMapFrameInner::SameLocals1StackItemFrame { .. } => self.frame_type as u16 - 64,
            StackMapFrameInner::SameLocals1StackItemFrameExtended { offset_delta, .. }
            | StackMapFrameInner::ChopFrame { offset_delta }
            | StackMapFrameInner::SameFrameExtended { offset_delta }
            | StackMapFrameInner::AppendFrame { offset_delta, .. }
            | StackMapFrameInner::FullFrame { offset_delta, .. } => *offset_delta,
        }
    }

    /// The same frame re-encoded with a new offset delta, switching between
    /// the compact and extended forms as the delta requires.
    pub fn with_offset_delta(&self, delta: u16) -> StackMapFrame {
        use StackMapFrameInner::*;
        match &self.inner {
            SameFrame | SameFrameExtended { .. } => {
                if delta <= 63 {
                    StackMapFrame {
                        frame_type: delta as u8,
                        inner: SameFrame,
                    }
                } else {
                    StackMapFrame {
                        frame_type: 251,
                        inner: SameFrameExtended {
                            offset_delta: delta,
                        },
                    }
                }
            }
            SameLocals1StackItemFrame { stack }
            | SameLocals1StackItemFrameExtended { stack, .. } => {
                if delta <= 63 {
                    StackMapFrame {
                        frame_type: 64 + delta as u8,
                        inner: SameLocals1StackItemFrame {
                            stack: stack.clone(),
                        },
                    }
                } else {
                    StackMapFrame {
                        frame_type: 247,
                        inner: SameLocals1StackItemFrameExtended {
                            offset_delta: delta,
                            stack: stack.clone(),
                        },
                    }
                }
            }
            ChopFrame { .. } => StackMapFrame {
                frame_type: self.frame_type,
                inner: ChopFrame {
                    offset_delta: delta,
                },
            },
            AppendFrame { locals, .. } => StackMapFrame {
                frame_type: self.frame_type,
                inner: AppendFrame {
                    offset_delta: delta,
                    locals: locals.clone(),
                },
            },
            FullFrame { locals, stack, .. } => StackMapFrame {
                frame_type: self.frame_type,
                inner: FullFrame {
                    offset_delta: delta,
                    locals: locals.clone(),
                    stack: stack.clone(),
                },
            },
        }
    }

    /// Verification types mentioned by the frame, mutable.
    pub fn verification_types_mut(&mut self) -> Vec<&mut VerificationTypeInfo> {
        use StackMapFrameInner::*;
        match &mut self.inner {
            SameFrame | ChopFrame { .. } | SameFrameExtended { .. } => Vec::new(),
            SameLocals1StackItemFrame { stack }
            | SameLocals1StackItemFrameExtended { stack, .. } => vec![stack],
            AppendFrame { locals, .. } => locals.iter_mut().collect(),
            FullFrame { locals, stack, .. } => locals.iter_mut().chain(stack.iter_mut()).collect(),
        }
    }
}

#[binrw]
#[derive(Clone, Debug, Default)]
#[brw(big)]
pub struct StackMapTableAttribute {
    #[br(temp)]
    #[bw(calc = entries.len() as u16)]
    number_of_entries: u16,
    #[br(count = number_of_entries)]
    pub entries: Vec<StackMapFrame>,
}
