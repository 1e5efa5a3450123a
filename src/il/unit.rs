//! IL Unit / Function data types (spec §3).

use indexmap::IndexMap;

use crate::il::cursor::{BlockId, IlBlock};
use crate::intern::{Interns, StringId};
use crate::scope::{BindingId, Slot};
use crate::value::FunctionId;

pub struct IlFunction {
    pub id: FunctionId,
    pub entry_block_id: BlockId,
    pub max_stack_depth: u16,
    pub blocks: IndexMap<BlockId, IlBlock>,
}

/// One `{slot, specifier}` pair describing a module import (spec §3 IL Unit).
pub struct ModuleImport {
    pub slot: Slot,
    pub specifier: String,
}

/// The finished output of IL compilation for one source module (spec §3).
pub struct IlUnit {
    pub source_filename: String,
    pub entry_function_id: FunctionId,
    pub functions: IndexMap<FunctionId, IlFunction>,
    pub module_imports: Vec<ModuleImport>,
    pub module_variables: Vec<BindingId>,
    pub free_variables: Vec<StringId>,
    /// `{globalName, functionId}` for every module-level function declaration
    /// (spec §4.2 "Entry function": "skipped at top level ... materialized
    /// as globals by the scope model"). The IL compiler itself never emits a
    /// store for these, so the host VM must pre-populate these globals
    /// before running `#entry`.
    pub hoisted_module_functions: Vec<(StringId, FunctionId)>,
    /// The final string table, a superset of the scope model's: every
    /// `StringId` any `Opcode` in this unit refers to resolves here,
    /// including property-key and `"thisModule"`/`"#module"` literals the IL
    /// compiler interns itself at lowering time (spec §4.3 step 4 consumes
    /// this as the snapshot's string table).
    pub interns: Interns,
}

impl IlUnit {
    pub fn entry_function(&self) -> &IlFunction {
        &self.functions[&self.entry_function_id]
    }
}
