//! Instruction-level probe instrumentation for JVM class files
//!
//! Every instruction of every method is preceded (or, for calls, followed) by a static call
//! into a probe class that observes the operands the instruction is about to consume. The
//! instrumented class behaves exactly like the original, except for the probe calls.
//!
//! The pieces, leaves first:
//!
//!   - [`isa`] describes opcodes (mnemonic, operand category, stack effect)
//!   - [`shuffle`] synthesizes `dup`/`pop` sequences copying values buried in the stack
//!   - [`instrument`] inserts probes into one method body
//!   - [`rewrite`] runs a class through a pipeline of stages and lays it out again
//!   - [`loader`] rewrites classes on demand and caches the result
//!
//! Class files are read and written by [`jvm`].

pub mod instrument;
pub mod isa;
pub mod jvm;
pub mod loader;
pub mod rewrite;
pub mod settings;
pub mod shuffle;
