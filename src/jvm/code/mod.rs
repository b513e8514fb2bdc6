//! Editable method bodies
//!
//! A `Code` attribute is decoded into a [`MethodBody`]: a list of [`Node`]s where jump targets,
//! exception ranges, line numbers, local variable ranges, and stack map frames all refer to
//! [`Label`]s instead of bytecode offsets. That way instructions can be inserted anywhere
//! without having to patch offsets, and [`encode`] works out the final layout.

mod decode;
mod encode;
mod frame;
mod inference;
mod instruction;
mod label;
mod stack_depth;
mod subroutines;

pub use decode::*;
pub use encode::*;
pub use frame::*;
pub use inference::*;
pub use instruction::*;
pub use label::*;
pub use stack_depth::*;
pub use subroutines::*;
