//! Rewriting whole classes
//!
//! A class file is parsed into a [`ClassModel`], whose method bodies are passed through an
//! ordered list of [`ClassTransform`] stages before being laid out again. The built-in stages
//! inline subroutines and insert probes; callers can append their own.

mod model;
mod rewriter;
mod stage;

pub use model::*;
pub use rewriter::*;
pub use stage::*;
