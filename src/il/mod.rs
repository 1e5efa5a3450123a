//! IL lowering (spec §4.2): AST + scope model -> [`unit::IlUnit`].
//!
//! Submodules mirror the spec's own breakdown: [`opcode`] is the closed
//! instruction set and its stack-effect table, [`cursor`] is the per-function
//! emission cursor, [`unit`] is the data model the compiler produces, and
//! [`verify`] independently re-checks the invariants the cursor already
//! enforces while emitting.

mod compiler;
mod cursor;
mod opcode;
mod unit;
mod verify;

pub use compiler::compile;
pub use cursor::{BlockId, IlBlock, Operation};
pub use opcode::{Accessor, IlBinOp, IlLiteral, IlUnaryOp, Opcode};
pub use unit::{IlFunction, IlUnit, ModuleImport};
pub use verify::verify_unit;
