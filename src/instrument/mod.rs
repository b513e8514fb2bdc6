//! Probe insertion
//!
//! [`ProbeInserter`] rewrites one [`crate::jvm::code::MethodBody`] at a time so that every
//! instruction is accompanied by a static call into a probe class. The probe class (by default
//! `org/evosuite/dse/VM`) has one overload per probe name and argument shape.

mod context;
mod emit;
mod errors;
mod inserter;

pub use context::*;
pub use emit::*;
pub use errors::*;
pub use inserter::*;
