//! The compilation cursor (spec §4.2): `{unit, function, current block,
//! current stack depth, break scope, reachability flag, pending comment}`.
//!
//! Modeled directly on the teacher crate's `CodeBuilder` (see
//! `bytecode/builder.rs`): emitting an operation appends to the current
//! block and updates the tracked stack depth by the opcode's static delta,
//! stamping before/after depths on the operation the way `CodeBuilder::emit`
//! stamps byte offsets. Unlike `CodeBuilder`, control-flow targets here are
//! block IDs resolved by a graph rather than byte offsets patched after the
//! fact — blocks are *predeclared* (with their entry depth fixed up front)
//! instead of patched in place.

use crate::ast::SourceLocation;
use crate::error::{CompileResult, MicroviumError};
use crate::il::opcode::Opcode;

/// Index into an [`crate::il::unit::IlFunction`]'s block list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub(crate) u32);

impl BlockId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone)]
pub struct Operation {
    pub opcode: Opcode,
    pub stack_depth_before: u16,
    pub stack_depth_after: u16,
    pub location: Option<SourceLocation>,
}

#[derive(Debug, Clone)]
pub struct IlBlock {
    pub id: BlockId,
    pub expected_stack_depth_at_entry: u16,
    pub operations: Vec<Operation>,
}

/// Drives emission of one function's block graph.
pub struct Cursor {
    blocks: Vec<IlBlock>,
    current: BlockId,
    stack_depth: u16,
    max_stack_depth: u16,
    /// Innermost-last stack of `break` targets (spec §4.2 "break scope").
    break_targets: Vec<BlockId>,
    /// Suppresses emission of unreachable code after a terminator.
    reachable: bool,
    pending_location: Option<SourceLocation>,
}

impl Cursor {
    pub fn new() -> Self {
        let entry = IlBlock {
            id: BlockId(0),
            expected_stack_depth_at_entry: 0,
            operations: Vec::new(),
        };
        Self {
            blocks: vec![entry],
            current: BlockId(0),
            stack_depth: 0,
            max_stack_depth: 0,
            break_targets: Vec::new(),
            reachable: true,
            pending_location: None,
        }
    }

    pub fn entry_block(&self) -> BlockId {
        BlockId(0)
    }

    pub fn stack_depth(&self) -> u16 {
        self.stack_depth
    }

    pub fn set_pending_location(&mut self, location: SourceLocation) {
        self.pending_location = Some(location);
    }

    /// Predeclares a block so branches can reference it before its body is
    /// populated (spec §4.2 "Control flow"). The caller supplies the entry
    /// depth up front — this compiler never infers it, it is always known
    /// from the construct being lowered (e.g. loop bodies re-enter at the
    /// depth they started at).
    pub fn predeclare_block(&mut self, expected_stack_depth_at_entry: u16) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(IlBlock {
            id,
            expected_stack_depth_at_entry,
            operations: Vec::new(),
        });
        id
    }

    /// Switches emission to `block`, which must have been predeclared.
    /// Re-enters at that block's declared entry depth and marks the cursor
    /// reachable again — every block is an independent entry point.
    pub fn switch_to(&mut self, block: BlockId) {
        self.current = block;
        self.stack_depth = self.blocks[block.index()].expected_stack_depth_at_entry;
        self.reachable = true;
    }

    pub fn push_break_target(&mut self, target: BlockId) {
        self.break_targets.push(target);
    }

    pub fn pop_break_target(&mut self) {
        self.break_targets.pop();
    }

    pub fn innermost_break_target(&self) -> CompileResult<BlockId> {
        self.break_targets
            .last()
            .copied()
            .ok_or_else(|| MicroviumError::compile("'break' outside of a loop or switch", SourceLocation::default()))
    }

    /// Appends `opcode` to the current block, unless code since the last
    /// terminator has been unreachable. Stamps before/after stack depths and
    /// asserts that jumps/branches land on their target's declared depth
    /// (spec §3 invariant: "every entering edge agrees on stack depth").
    pub fn emit(&mut self, opcode: Opcode) -> CompileResult<()> {
        if !self.reachable {
            return Ok(());
        }
        let before = self.stack_depth;
        let delta = opcode.stack_delta();
        let after = before as i32 + delta;
        if after < 0 {
            return Err(MicroviumError::internal(format!(
                "stack underflow emitting {opcode:?}: depth {before} delta {delta}"
            )));
        }
        let after = after as u16;

        if let Opcode::Jump { target } | Opcode::Branch { target } = &opcode {
            let expected = self.blocks[target.index()].expected_stack_depth_at_entry;
            if after != expected {
                return Err(MicroviumError::internal(format!(
                    "stack depth mismatch jumping to block {}: have {after}, block expects {expected}",
                    target.index()
                )));
            }
        }

        let terminates = matches!(opcode, Opcode::Jump { .. } | Opcode::Return);
        let location = self.pending_location.take();
        self.blocks[self.current.index()].operations.push(Operation {
            opcode,
            stack_depth_before: before,
            stack_depth_after: after,
            location,
        });
        self.stack_depth = after;
        self.max_stack_depth = self.max_stack_depth.max(after).max(before);
        if terminates {
            self.reachable = false;
        }
        Ok(())
    }

    pub fn is_reachable(&self) -> bool {
        self.reachable
    }

    pub fn finish(self) -> (Vec<IlBlock>, u16) {
        (self.blocks, self.max_stack_depth)
    }
}

impl Default for Cursor {
    fn default() -> Self {
        Self::new()
    }
}
