//! Instruction set metadata
//!
//! The probe inserter only needs three facts about an opcode: what it is called (probe entry
//! points are named after it), which operand category it works over (so duplicated operands use
//! the right width), and how many stack words it pops and pushes (so the serializer can
//! recompute `max_stack`). [`InstructionSet`] captures exactly that, plus a way to lower the
//! shuffler's [`PrimitiveOp`]s back into opcodes. [`Jvm`] is the only implementation.
//!
//! Tables are checked once with [`validate`] before any class is rewritten. A gap is a bug in
//! the table, so it is reported at start-up rather than when some rare opcode shows up.

mod jvm;

pub use jvm::*;

use crate::shuffle::PrimitiveOp;
use std::collections::HashSet;
use std::fmt;

/// Number of stack words (and local slots) a value occupies
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    One,
    Two,
}

impl Category {
    pub const fn width(&self) -> usize {
        match self {
            Category::One => 1,
            Category::Two => 2,
        }
    }
}

/// Stack words popped and pushed by an instruction
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StackEffect {
    Fixed { pop: u8, push: u8 },

    /// Depends on operands (field and method descriptors, dimension counts)
    Variable,
}

/// Metadata the instrumenter needs from a stack machine's instruction set
pub trait InstructionSet {
    type Opcode: Copy + fmt::Debug;

    /// Every opcode the instruction set defines
    fn defined_opcodes(&self) -> Vec<Self::Opcode>;

    /// Upper case mnemonic (`IADD`, `GOTO_W`)
    fn mnemonic(&self, opcode: Self::Opcode) -> Option<&'static str>;

    /// Category of the value the instruction is typed over
    fn category(&self, opcode: Self::Opcode) -> Option<Category>;

    fn stack_effect(&self, opcode: Self::Opcode) -> Option<StackEffect>;

    /// Opcode implementing a primitive stack reordering
    fn primitive(&self, op: PrimitiveOp) -> Self::Opcode;
}

#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    /// Some defined opcode has no (or inconsistent) metadata
    IncompleteIsaTable(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::IncompleteIsaTable(msg) => write!(f, "incomplete ISA table: {}", msg),
        }
    }
}

/// Completeness self-check for an instruction set table
///
/// Every defined opcode needs a unique mnemonic, a category, and a stack effect, and every
/// primitive reordering must lower to an opcode whose fixed effect matches the primitive's.
pub fn validate<I: InstructionSet + ?Sized>(isa: &I) -> Result<(), Error> {
    let mut mnemonics = HashSet::new();
    for opcode in isa.defined_opcodes() {
        let missing = |what: &str| {
            Error::IncompleteIsaTable(format!("opcode {:?} has no {}", opcode, what))
        };
        let mnemonic = isa.mnemonic(opcode).ok_or_else(|| missing("mnemonic"))?;
        isa.category(opcode).ok_or_else(|| missing("category"))?;
        isa.stack_effect(opcode).ok_or_else(|| missing("stack effect"))?;
        if !mnemonics.insert(mnemonic) {
            return Err(Error::IncompleteIsaTable(format!(
                "mnemonic {} is used twice",
                mnemonic
            )));
        }
    }

    for op in PrimitiveOp::ALL {
        let opcode = isa.primitive(op);
        let (pop, push) = op.words();
        match isa.stack_effect(opcode) {
            Some(StackEffect::Fixed { pop: p, push: q }) if (p, q) == (pop, push) => (),
            other => {
                return Err(Error::IncompleteIsaTable(format!(
                    "{:?} lowers to {:?} with effect {:?}",
                    op, opcode, other
                )))
            }
        }
    }

    Ok(())
}
