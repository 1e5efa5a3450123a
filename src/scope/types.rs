//! Scope-model data types (spec §3 Binding / Slot / Scope, §4.1).

use indexmap::IndexMap;

use crate::ast::SourceLocation;
use crate::intern::StringId;

/// Index into [`super::ScopeModel::scopes`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(pub(super) u32);

impl ScopeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub fn from_index(index: u32) -> Self {
        Self(index)
    }
}

/// Index into [`super::ScopeModel::bindings`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BindingId(pub(super) u32);

impl BindingId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    Var,
    Let,
    Const,
    Param,
    This,
    Import,
    Export,
}

/// One declared name (spec §3 Binding).
#[derive(Debug, Clone)]
pub struct Binding {
    pub name: StringId,
    pub kind: BindingKind,
    pub declared_at: SourceLocation,
    pub is_written_to: bool,
    pub is_accessed_by_nested_function: bool,
    pub is_exported: bool,
    /// Populated by pass 2. `None` is only observable mid-analysis.
    pub slot: Option<Slot>,
}

/// Runtime storage location assigned to a binding (spec §3 Slot).
#[derive(Debug, Clone, PartialEq)]
pub enum Slot {
    /// Position on the function's operand/local stack.
    Local { index: u16 },
    /// Immutable incoming argument; index 0 is `this`.
    Argument { arg_index: u16 },
    /// Index into the enclosing function's closure scope vector.
    Closure { index: u16 },
    /// Module-wide unique global name.
    Global { name: StringId },
    /// Access via another module's exported namespace object.
    ModuleImportExport {
        namespace_slot: Box<Slot>,
        property_name: StringId,
    },
}

/// What a resolved identifier use points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolved {
    Binding(BindingId),
    /// Escaped every function scope — a host global (spec §4.1 pass 1).
    FreeVariable(StringId),
}

/// One identifier use (spec §3 Reference), recorded in the exact
/// depth-first order the IL compiler will later visit the same AST, so the
/// two passes can be kept in lockstep (see `scope::ReferenceCursor`).
#[derive(Debug, Clone, Copy)]
pub struct Reference {
    pub resolved: Resolved,
    pub is_write: bool,
    pub location: SourceLocation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Module,
    Function,
    Block,
}

/// Scope-initialization pseudo-ops emitted into a scope's prologue
/// (spec §3 Scope.prologue / §4.1 pass 2).
#[derive(Debug, Clone, Copy)]
pub enum PrologueOp {
    ScopePush { slot_count: u16 },
    InitVarDeclaration { binding: BindingId },
    InitLexicalDeclaration { binding: BindingId },
    InitFunctionDeclaration { binding: BindingId },
    InitParameter { binding: BindingId },
    InitThis { binding: BindingId },
}

/// One lexical scope: module, function or block (spec §3 Scope).
#[derive(Debug, Clone)]
pub struct Scope {
    pub kind: ScopeKind,
    pub parent: Option<ScopeId>,
    pub children: Vec<ScopeId>,
    /// Bindings declared directly in this scope, in declaration order.
    pub bindings: IndexMap<StringId, BindingId>,
    pub var_declarations: Vec<BindingId>,
    pub lexical_declarations: Vec<BindingId>,
    pub nested_function_declarations: Vec<BindingId>,
    pub prologue: Vec<PrologueOp>,

    // --- FunctionScope-only fields (spec §3) ---
    pub parameter_bindings: Vec<BindingId>,
    pub this_binding: Option<BindingId>,
    /// Number of closure slots allocated for this function; 0 unless at
    /// least one binding's `is_accessed_by_nested_function` is true.
    pub closure_slot_count: u16,
    pub function_is_closure: bool,

    // --- BlockScope-only field (spec §4.1 pass 2) ---
    /// Net operand-stack delta to undo when leaving this block
    /// (number of lexical slots pushed for `let`/`const` locals).
    pub epilogue_pop_count: u16,
}

impl Scope {
    pub(super) fn new(kind: ScopeKind, parent: Option<ScopeId>) -> Self {
        Self {
            kind,
            parent,
            children: Vec::new(),
            bindings: IndexMap::new(),
            var_declarations: Vec::new(),
            lexical_declarations: Vec::new(),
            nested_function_declarations: Vec::new(),
            prologue: Vec::new(),
            parameter_bindings: Vec::new(),
            this_binding: None,
            closure_slot_count: 0,
            function_is_closure: false,
            epilogue_pop_count: 0,
        }
    }
}
