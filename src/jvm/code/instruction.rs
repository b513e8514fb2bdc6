use super::{Label, LabelGenerator};
use crate::isa::{opcode, Category, Jvm};
use crate::jvm::class_file::{ConstantIndex, VerificationType};
use crate::jvm::{FieldType, ParseDescriptor};
use std::fmt;

/// One JVM instruction, with symbolic operands
///
/// The variants mirror the operand shapes of the instruction set rather than individual opcodes,
/// so the opcode is carried along wherever a variant covers several instructions. The probe
/// inserter matches on these variants exhaustively.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Instruction {
    /// Instructions without operands (constants, arithmetic, conversions, array accesses, stack
    /// manipulation, returns, monitors, `athrow`, `arraylength`)
    Insn(u8),

    /// `bipush`, `sipush`, and `newarray` (where the operand is the array type code)
    Int { opcode: u8, operand: i32 },

    /// Local variable loads and stores, and `ret`
    ///
    /// The opcode is kept as it appeared: `iload 2` and `iload_2` are different instructions as
    /// far as probes are concerned.
    Var { opcode: u8, var: u16 },

    IInc { var: u16, increment: i16 },

    /// Conditional and unconditional jumps, including `jsr`
    Jump { opcode: u8, target: Label },

    TableSwitch {
        low: i32,
        high: i32,
        default: Label,
        targets: Vec<Label>,
    },

    LookupSwitch {
        default: Label,
        pairs: Vec<(i32, Label)>,
    },

    /// `ldc`, `ldc_w`, and `ldc2_w` (the encoder picks the right form)
    Ldc(LdcValue),

    Field {
        opcode: u8,
        owner: String,
        name: String,
        descriptor: String,
    },

    Method {
        opcode: u8,
        owner: String,
        name: String,
        descriptor: String,
        is_interface: bool,
    },

    InvokeDynamic {
        /// `InvokeDynamic` constant (the pool is append-only, so this stays valid)
        index: ConstantIndex,
        name: String,
        descriptor: String,
        bootstrap: BootstrapInfo,
    },

    /// `new`, `anewarray`, `checkcast`, `instanceof`
    Type { opcode: u8, class: String },

    MultiANewArray { descriptor: String, dimensions: u8 },
}

/// Is `op` an instruction without operands (the ones carried by [`Instruction::Insn`])?
pub fn takes_no_operands(op: u8) -> bool {
    matches!(
        op,
        opcode::NOP..=opcode::DCONST_1
            | opcode::IALOAD..=opcode::SALOAD
            | opcode::IASTORE..=opcode::LXOR
            | opcode::I2L..=opcode::DCMPG
            | opcode::IRETURN..=opcode::RETURN
            | opcode::ARRAYLENGTH
            | opcode::ATHROW
            | opcode::MONITORENTER
            | opcode::MONITOREXIT
    )
}

/// Does a local variable instruction encode its slot as an operand (`iload 4` rather than
/// `iload_0`)?
pub fn has_explicit_slot(op: u8) -> bool {
    matches!(op, opcode::ILOAD..=opcode::ALOAD | opcode::ISTORE..=opcode::ASTORE | opcode::RET)
}

/// Constant loaded by an `ldc` instruction
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LdcValue {
    Integer(i32),

    /// Raw bits
    Float(u32),
    Long(i64),

    /// Raw bits
    Double(u64),

    /// Modified UTF-8 bytes of the string
    String(Vec<u8>),

    /// Internal name or array descriptor
    Class(String),

    /// Method descriptor
    MethodType(String),

    /// `MethodHandle` constant
    MethodHandle(ConstantIndex),

    /// Dynamically-computed constant and its field descriptor
    Dynamic {
        index: ConstantIndex,
        descriptor: String,
    },
}

impl LdcValue {
    pub fn category(&self) -> Category {
        match self {
            LdcValue::Long(_) | LdcValue::Double(_) => Category::Two,
            LdcValue::Dynamic { descriptor, .. } => match descriptor.as_str() {
                "J" | "D" => Category::Two,
                _ => Category::One,
            },
            _ => Category::One,
        }
    }

    /// Descriptor of the value once it is on the stack, as passed to a probe
    pub fn probe_descriptor(&self) -> String {
        match self {
            LdcValue::Integer(_) => String::from("I"),
            LdcValue::Float(_) => String::from("F"),
            LdcValue::Long(_) => String::from("J"),
            LdcValue::Double(_) => String::from("D"),
            LdcValue::String(_) => String::from("Ljava/lang/String;"),
            LdcValue::Class(_) => String::from("Ljava/lang/Class;"),
            LdcValue::MethodType(_) | LdcValue::MethodHandle(_) => {
                String::from("Ljava/lang/Object;")
            }
            LdcValue::Dynamic { descriptor, .. } => match FieldType::parse(descriptor) {
                Ok(field_type) => field_type.kind().stack_descriptor().to_owned(),
                Err(_) => String::from("Ljava/lang/Object;"),
            },
        }
    }
}

/// What the bootstrap method of an `invokedynamic` call site is
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BootstrapInfo {
    /// Class declaring the bootstrap method
    pub owner: String,

    /// Bootstrap method name
    pub name: String,

    /// Implementation owner for lambda metafactories, the recipe for string concatenation,
    /// otherwise the bootstrap method name
    pub detail: String,
}

impl Instruction {
    /// Opcode the instruction is encoded with (for `ldc`, the short form)
    pub fn opcode(&self) -> u8 {
        match self {
            Instruction::Insn(opcode)
            | Instruction::Int { opcode, .. }
            | Instruction::Var { opcode, .. }
            | Instruction::Jump { opcode, .. }
            | Instruction::Field { opcode, .. }
            | Instruction::Method { opcode, .. }
            | Instruction::Type { opcode, .. } => *opcode,
            Instruction::IInc { .. } => opcode::IINC,
            Instruction::TableSwitch { .. } => opcode::TABLESWITCH,
            Instruction::LookupSwitch { .. } => opcode::LOOKUPSWITCH,
            Instruction::Ldc(value) => match value.category() {
                Category::One => opcode::LDC,
                Category::Two => opcode::LDC2_W,
            },
            Instruction::InvokeDynamic { .. } => opcode::INVOKEDYNAMIC,
            Instruction::MultiANewArray { .. } => opcode::MULTIANEWARRAY,
        }
    }

    /// Upper case mnemonic of the instruction
    pub fn mnemonic(&self) -> &'static str {
        Jvm.info(self.opcode())
            .map_or("<unknown>", |info| info.mnemonic)
    }

    /// Labels this instruction may jump to
    pub fn jump_targets(&self) -> Vec<Label> {
        match self {
            Instruction::Jump { target, .. } => vec![*target],
            Instruction::TableSwitch {
                default, targets, ..
            } => {
                let mut all = vec![*default];
                all.extend(targets.iter().copied());
                all
            }
            Instruction::LookupSwitch { default, pairs } => {
                let mut all = vec![*default];
                all.extend(pairs.iter().map(|(_, target)| *target));
                all
            }
            _ => vec![],
        }
    }

    /// Can execution continue with the next instruction?
    pub fn falls_through(&self) -> bool {
        match self {
            Instruction::Insn(op) => !matches!(
                *op,
                opcode::IRETURN
                    | opcode::LRETURN
                    | opcode::FRETURN
                    | opcode::DRETURN
                    | opcode::ARETURN
                    | opcode::RETURN
                    | opcode::ATHROW
            ),
            Instruction::Jump { opcode, .. } => !matches!(*opcode, opcode::GOTO | opcode::GOTO_W),
            Instruction::Var { opcode, .. } => *opcode != opcode::RET,
            Instruction::TableSwitch { .. } | Instruction::LookupSwitch { .. } => false,
            _ => true,
        }
    }

    /// Is this a conditional jump (as opposed to `goto` or `jsr`)?
    pub fn is_conditional_jump(&self) -> bool {
        matches!(self, Instruction::Jump { opcode, .. }
            if (opcode::IFEQ..=opcode::IF_ACMPNE).contains(opcode)
                || *opcode == opcode::IFNULL
                || *opcode == opcode::IFNONNULL)
    }

    /// `jsr` or `jsr_w`
    pub fn is_subroutine_call(&self) -> bool {
        matches!(self, Instruction::Jump { opcode, .. }
            if *opcode == opcode::JSR || *opcode == opcode::JSR_W)
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())?;
        match self {
            Instruction::Insn(_) => Ok(()),
            Instruction::Int { operand, .. } => write!(f, " {}", operand),
            Instruction::Var { var, .. } => write!(f, " {}", var),
            Instruction::IInc { var, increment } => write!(f, " {} {}", var, increment),
            Instruction::Jump { target, .. } => write!(f, " {:?}", target),
            Instruction::TableSwitch { low, high, .. } => write!(f, " {}..={}", low, high),
            Instruction::LookupSwitch { pairs, .. } => write!(f, " ({} cases)", pairs.len()),
            Instruction::Ldc(value) => write!(f, " {:?}", value),
            Instruction::Field {
                owner,
                name,
                descriptor,
                ..
            } => write!(f, " {}.{}:{}", owner, name, descriptor),
            Instruction::Method {
                owner,
                name,
                descriptor,
                ..
            } => write!(f, " {}.{}{}", owner, name, descriptor),
            Instruction::InvokeDynamic {
                name, descriptor, ..
            } => write!(f, " {}{}", name, descriptor),
            Instruction::Type { class, .. } => write!(f, " {}", class),
            Instruction::MultiANewArray {
                descriptor,
                dimensions,
            } => write!(f, " {} {}", descriptor, dimensions),
        }
    }
}

/// Element of a method body
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Node {
    Label(Label),

    /// Source line starting at `start` (which is placed before this marker)
    Line { line: u16, start: Label },

    Instruction(Instruction),
}

/// Entry of the exception table
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Handler {
    pub start: Label,
    pub end: Label,
    pub handler: Label,

    /// `None` catches everything (`finally`)
    pub catch_type: Option<String>,
}

/// Types of the locals and the stack at some label
///
/// Locals are listed the way stack map frames list them: a `long` or `double` is one entry
/// even though it takes two slots. Uninitialized objects are identified by which `new`
/// instruction (counting from 0 in code order) created them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub locals: Vec<VerificationType<usize>>,
    pub stack: Vec<VerificationType<usize>>,
}

/// Entry of the `LocalVariableTable` or `LocalVariableTypeTable`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalVariableEntry {
    pub start: Label,
    pub end: Label,
    pub name: ConstantIndex,

    /// Descriptor, or generic signature for the type table
    pub descriptor: ConstantIndex,
    pub index: u16,
    pub is_type_table: bool,
}

/// Type annotation on something inside a method body
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CodeTypeAnnotation {
    /// `RuntimeVisibleTypeAnnotations` rather than `RuntimeInvisibleTypeAnnotations`
    pub visible: bool,
    pub target_type: u8,
    pub target: AnnotatedCode,

    /// Type path, type, and element values, copied verbatim
    pub annotation: Vec<u8>,
}

/// What a [`CodeTypeAnnotation`] is attached to
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AnnotatedCode {
    /// Live ranges (start, end, slot) of a local variable
    LocalVariable(Vec<(Label, Label, u16)>),

    /// Entry of [`MethodBody::handlers`]
    Catch(usize),

    /// First instruction equal to `instruction` from `at` on
    ///
    /// Code inserted between a label and the instruction after it doesn't move the annotation
    /// off its instruction.
    Instruction {
        at: Label,
        instruction: Instruction,
        type_argument: Option<u8>,
    },
}

/// Editable representation of a `Code` attribute
#[derive(Clone, Debug)]
pub struct MethodBody {
    pub nodes: Vec<Node>,
    pub handlers: Vec<Handler>,

    /// Frames of the original `StackMapTable` (empty if there was none)
    pub frames: Vec<(Label, Frame)>,
    pub local_variables: Vec<LocalVariableEntry>,
    pub type_annotations: Vec<CodeTypeAnnotation>,

    /// Declared maxima of the original code
    pub max_stack: u16,
    pub max_locals: u16,

    /// Names of code attributes that won't survive re-encoding
    pub unmapped_attributes: Vec<String>,
    pub labels: LabelGenerator,
}

impl MethodBody {
    /// Empty body
    pub fn new(max_locals: u16) -> MethodBody {
        MethodBody {
            nodes: vec![],
            handlers: vec![],
            frames: vec![],
            local_variables: vec![],
            type_annotations: vec![],
            max_stack: 0,
            max_locals,
            unmapped_attributes: vec![],
            labels: LabelGenerator::new(),
        }
    }

    /// Iterate over the instructions, skipping labels and line markers
    pub fn instructions(&self) -> impl Iterator<Item = &Instruction> + '_ {
        self.nodes.iter().filter_map(|node| match node {
            Node::Instruction(instruction) => Some(instruction),
            _ => None,
        })
    }

    pub fn has_frames(&self) -> bool {
        !self.frames.is_empty()
    }

    /// Does the body use `jsr`/`ret`?
    pub fn has_subroutines(&self) -> bool {
        self.instructions()
            .any(|instruction| instruction.is_subroutine_call())
    }
}
