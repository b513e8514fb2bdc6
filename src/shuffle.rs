//! Operand stack shuffling
//!
//! Probes frequently need to observe a value that is not on top of the stack: the array
//! reference underneath an index and a value for an array store, or the receiver underneath the
//! value for a field write. This module synthesizes sequences of the stack machine's primitive
//! reordering operations that push one extra copy of such a buried value, leaving everything
//! else where it was.
//!
//! ### Category forms
//!
//! The JVM has two value categories and each `dup*`/`pop*` instruction works on a fixed number
//! of *words* rather than values. For example, `dup2` either duplicates two category 1 values
//! or one category 2 value, and it is illegal if the top two words straddle a category 2 value.
//! [`AbstractStack`] models exactly these rules and is the reference the table is checked
//! against.
//!
//! ### Table
//!
//! Sequences are looked up in a fixed table keyed by the categories of the target and of the
//! (at most two) values above it. Each entry has been found by exhaustive search over the
//! primitive operations and is replayed by [`ShuffleTable::validate`] at start-up. Four shapes
//! have no solution at all using only primitive operations:
//!
//! ```text
//! target  above (deep to top)
//!   1       2 2
//!   2       1 2
//!   2       2 1
//!   2       2 2
//! ```
//!
//! Callers that could meet these shapes (calls with long argument lists) spill values to local
//! variables instead.

use crate::isa::Category;
use std::fmt;

/// Primitive stack reordering operations
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum PrimitiveOp {
    /// Duplicate the top word
    Dup,
    /// Duplicate the top word and insert it one word down
    DupX1,
    /// Duplicate the top word and insert it two words down
    DupX2,
    /// Duplicate the top two words
    Dup2,
    /// Duplicate the top two words and insert them one word down
    Dup2X1,
    /// Duplicate the top two words and insert them two words down
    Dup2X2,
    /// Swap the top two words (both must be category 1)
    Swap,
    /// Pop the top word
    Pop,
    /// Pop the top two words
    Pop2,
}

impl PrimitiveOp {
    pub const ALL: [PrimitiveOp; 9] = [
        PrimitiveOp::Dup,
        PrimitiveOp::DupX1,
        PrimitiveOp::DupX2,
        PrimitiveOp::Dup2,
        PrimitiveOp::Dup2X1,
        PrimitiveOp::Dup2X2,
        PrimitiveOp::Swap,
        PrimitiveOp::Pop,
        PrimitiveOp::Pop2,
    ];

    /// Stack words popped and pushed
    pub const fn words(&self) -> (u8, u8) {
        match self {
            PrimitiveOp::Dup => (1, 2),
            PrimitiveOp::DupX1 => (2, 3),
            PrimitiveOp::DupX2 => (3, 4),
            PrimitiveOp::Dup2 => (2, 4),
            PrimitiveOp::Dup2X1 => (3, 5),
            PrimitiveOp::Dup2X2 => (4, 6),
            PrimitiveOp::Swap => (2, 2),
            PrimitiveOp::Pop => (1, 0),
            PrimitiveOp::Pop2 => (2, 0),
        }
    }

    /// For duplications: words copied and words skipped before inserting the copy
    const fn duplication(&self) -> Option<(usize, usize)> {
        match self {
            PrimitiveOp::Dup => Some((1, 0)),
            PrimitiveOp::DupX1 => Some((1, 1)),
            PrimitiveOp::DupX2 => Some((1, 2)),
            PrimitiveOp::Dup2 => Some((2, 0)),
            PrimitiveOp::Dup2X1 => Some((2, 1)),
            PrimitiveOp::Dup2X2 => Some((2, 2)),
            PrimitiveOp::Swap | PrimitiveOp::Pop | PrimitiveOp::Pop2 => None,
        }
    }
}

/// Categories of the values on the stack, listed from the top down
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct StackShape(pub Vec<Category>);

impl StackShape {
    /// Shape whose first element is the top of the stack
    pub fn from_top(categories: &[Category]) -> StackShape {
        StackShape(categories.to_vec())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Total words occupied
    pub fn words(&self) -> usize {
        self.0.iter().map(Category::width).sum()
    }
}

impl fmt::Display for StackShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (idx, category) in self.0.iter().enumerate() {
            if idx > 0 {
                f.write_str(", ")?;
            }
            write!(f, "v{}:{}", idx, category.width())?;
        }
        f.write_str("]")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShuffleError {
    /// No sequence is known for duplicating `target_index` out of this shape
    ShapeUnsupported {
        shape: StackShape,
        target_index: usize,
    },

    /// Operation doesn't match any legal category form of the stack it was applied to
    InvalidForm { op: PrimitiveOp, shape: StackShape },

    /// A table entry doesn't produce what it claims to
    BrokenEntry {
        shape: StackShape,
        target_index: usize,
    },
}

impl fmt::Display for ShuffleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShuffleError::ShapeUnsupported {
                shape,
                target_index,
            } => write!(f, "cannot duplicate v{} out of {}", target_index, shape),
            ShuffleError::InvalidForm { op, shape } => {
                write!(f, "{:?} is not applicable to {}", op, shape)
            }
            ShuffleError::BrokenEntry {
                shape,
                target_index,
            } => write!(
                f,
                "table entry for v{} out of {} does not replay",
                target_index, shape
            ),
        }
    }
}

/// Stack of abstract values: each value is an identifier and a category
///
/// Values are stored bottom to top. Identifiers are handed out by [`AbstractStack::from_shape`]
/// so that `v{i}` (counting from the top) has identifier `i`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AbstractStack {
    values: Vec<(usize, Category)>,
}

impl AbstractStack {
    pub fn from_shape(shape: &StackShape) -> AbstractStack {
        let values = shape
            .0
            .iter()
            .copied()
            .enumerate()
            .rev()
            .collect();
        AbstractStack { values }
    }

    /// Values from the top down
    pub fn top_down(&self) -> Vec<(usize, Category)> {
        self.values.iter().rev().copied().collect()
    }

    pub fn shape(&self) -> StackShape {
        StackShape(self.values.iter().rev().map(|(_, cat)| *cat).collect())
    }

    /// Number of values (from the top) that make up exactly `words` words, starting `skip`
    /// values down
    fn values_spanning(&self, skip: usize, words: usize) -> Option<usize> {
        let mut covered = 0;
        let mut count = 0;
        for (_, category) in self.values.iter().rev().skip(skip) {
            if covered == words {
                break;
            }
            covered += category.width();
            count += 1;
        }
        if covered == words {
            Some(count)
        } else {
            None
        }
    }

    /// Apply one primitive operation, respecting the category forms
    pub fn apply(&mut self, op: PrimitiveOp) -> Result<(), ShuffleError> {
        let invalid = || ShuffleError::InvalidForm {
            op,
            shape: self.shape(),
        };
        let len = self.values.len();

        if let Some((copy_words, skip_words)) = op.duplication() {
            let copied = self.values_spanning(0, copy_words).ok_or_else(invalid)?;
            let skipped = if skip_words == 0 {
                0
            } else {
                self.values_spanning(copied, skip_words)
                    .ok_or_else(invalid)?
            };
            let copy: Vec<(usize, Category)> = self.values[len - copied..].to_vec();
            let insert_at = len - copied - skipped;
            self.values.splice(insert_at..insert_at, copy);
            return Ok(());
        }

        match op {
            PrimitiveOp::Swap => {
                let count = self.values_spanning(0, 2).ok_or_else(invalid)?;
                if count != 2 {
                    return Err(invalid());
                }
                self.values.swap(len - 1, len - 2);
            }
            PrimitiveOp::Pop | PrimitiveOp::Pop2 => {
                let words = op.words().0 as usize;
                let count = self.values_spanning(0, words).ok_or_else(invalid)?;
                self.values.truncate(len - count);
            }
            _ => return Err(invalid()),
        }
        Ok(())
    }

    /// Apply a sequence of primitive operations
    pub fn replay(&mut self, ops: &[PrimitiveOp]) -> Result<(), ShuffleError> {
        ops.iter().try_for_each(|op| self.apply(*op))
    }
}

struct ShuffleEntry {
    target: Category,

    /// Categories of the values above the target, from deep to top
    above: &'static [Category],

    ops: &'static [PrimitiveOp],
}

use Category::{One, Two};
use PrimitiveOp::*;

static SHUFFLE_TABLE: &[ShuffleEntry] = &[
    ShuffleEntry {
        target: One,
        above: &[],
        ops: &[Dup],
    },
    ShuffleEntry {
        target: Two,
        above: &[],
        ops: &[Dup2],
    },
    ShuffleEntry {
        target: One,
        above: &[One],
        ops: &[Dup2, Pop],
    },
    ShuffleEntry {
        target: One,
        above: &[Two],
        ops: &[Dup2X1, Pop2, DupX2],
    },
    ShuffleEntry {
        target: Two,
        above: &[One],
        ops: &[DupX2, Pop, Dup2X1],
    },
    ShuffleEntry {
        target: Two,
        above: &[Two],
        ops: &[Dup2X2, Pop2, Dup2X2],
    },
    ShuffleEntry {
        target: One,
        above: &[One, One],
        ops: &[Dup2X1, Pop2, DupX2],
    },
    ShuffleEntry {
        target: One,
        above: &[One, Two],
        ops: &[Dup2X2, Pop2, Dup2X2, Pop],
    },
    ShuffleEntry {
        target: Two,
        above: &[One, One],
        ops: &[Dup2X2, Pop2, Dup2X2],
    },
    ShuffleEntry {
        target: One,
        above: &[Two, One],
        ops: &[
            DupX2, Pop, Dup2X2, Pop2, Dup2X2, Pop, DupX2, Pop, Dup2X2, Pop2,
        ],
    },
];

impl ShuffleEntry {
    /// Shape from the top down, target last
    fn shape(&self) -> StackShape {
        let mut categories: Vec<Category> = self.above.iter().rev().copied().collect();
        categories.push(self.target);
        StackShape(categories)
    }

    fn matches(&self, shape: &StackShape, target_index: usize) -> bool {
        shape.0[target_index] == self.target
            && self.above.len() == target_index
            && self
                .above
                .iter()
                .rev()
                .zip(&shape.0[..target_index])
                .all(|(expected, actual)| expected == actual)
    }
}

/// Handle on the static shuffle table
pub struct ShuffleTable;

impl ShuffleTable {
    /// Replay every entry and check that it yields the original stack plus one copy of its target
    pub fn validate() -> Result<(), ShuffleError> {
        for entry in SHUFFLE_TABLE {
            let shape = entry.shape();
            let target_index = entry.above.len();
            let broken = || ShuffleError::BrokenEntry {
                shape: shape.clone(),
                target_index,
            };
            if !replays_correctly(&shape, target_index, entry.ops) {
                return Err(broken());
            }
        }
        Ok(())
    }

    /// Shapes (top down, target last) the table covers
    pub fn covered_shapes() -> Vec<StackShape> {
        SHUFFLE_TABLE.iter().map(ShuffleEntry::shape).collect()
    }
}

/// Does replaying `ops` on `shape` leave the stack unchanged apart from one extra copy of
/// `v{target_index}` on top?
pub fn replays_correctly(shape: &StackShape, target_index: usize, ops: &[PrimitiveOp]) -> bool {
    let mut stack = AbstractStack::from_shape(shape);
    let mut expected = stack.top_down();
    match expected.get(target_index).copied() {
        Some(target) => expected.insert(0, target),
        None => return false,
    }
    stack.replay(ops).is_ok() && stack.top_down() == expected
}

/// Sequence of primitive operations that pushes a copy of `v{target_index}` (counting from the
/// top of `shape`) while leaving all the values in place
///
/// Only values at most two deep are supported, and not all category combinations are possible
/// (see the module documentation).
pub fn duplicate_buried(
    shape: &StackShape,
    target_index: usize,
) -> Result<Vec<PrimitiveOp>, ShuffleError> {
    let unsupported = || ShuffleError::ShapeUnsupported {
        shape: shape.clone(),
        target_index,
    };
    if target_index >= shape.len() {
        return Err(unsupported());
    }
    SHUFFLE_TABLE
        .iter()
        .find(|entry| entry.matches(shape, target_index))
        .map(|entry| entry.ops.to_vec())
        .ok_or_else(unsupported)
}

/// Copy the top two values as a pair (both must be category 1)
pub fn duplicate_top_pair(shape: &StackShape) -> Result<Vec<PrimitiveOp>, ShuffleError> {
    match shape.0.get(..2) {
        Some([One, One]) => Ok(vec![Dup2]),
        _ => Err(ShuffleError::ShapeUnsupported {
            shape: shape.clone(),
            target_index: 1,
        }),
    }
}
