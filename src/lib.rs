#![doc = include_str!("../README.md")]

pub mod ast;
mod config;
mod error;
mod heap;
mod hostvm;
pub mod il;
mod intern;
mod scope;
mod snapshot;
mod value;

pub use crate::{
    ast::{Program, SourceLocation},
    config::Config,
    error::{CompileResult, HostResult, InvalidBytecodeReason, MicroviumError, ScopeResult, SnapshotResult},
    heap::{Allocation, AllocationId, Heap},
    hostvm::{Executor, ImportResolver},
    il::{compile, verify_unit, IlFunction, IlUnit, ModuleImport},
    intern::{InternerBuilder, Interns, StringId},
    scope::{analyze, ScopeModel},
    snapshot::{decode, encode, Component, ComponentKind, DecodedImage, DecodedRegion, ExportEntry, ImportEntry, SnapshotInfo},
    value::{EphemeralId, FunctionId, HostFunctionId, Value},
};
