//! The reference host VM (spec §4.4, ambient/supplemented): a minimal
//! executor implementing the §6 Host-side VM contract on top of this crate's
//! own scope analyzer, IL compiler and heap.
//!
//! Grounded in the teacher crate's `run.rs` `Executor`: a stack-machine
//! interpreter that walks one IL function's blocks at a time, maintains an
//! operand stack and a per-call argument/local/closure-scope set, and
//! dispatches on [`crate::il::Opcode`]. Unlike the teacher's `Executor`,
//! which resumes a suspended generator across a step budget, this one runs
//! straight through — step budgets and async resumption are the kind of
//! runtime-performance concern the originating spec explicitly scopes out.

mod executor;

pub use executor::{Executor, ImportResolver};
