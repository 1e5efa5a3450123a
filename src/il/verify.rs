//! Independent re-derivation of the stack-depth invariants the cursor
//! already enforces while emitting (spec §3 Invariants, §8 Testable
//! properties, §9 "implementers should derive both `emit` and `verify` from
//! the same table").
//!
//! The cursor asserts these invariants incrementally, one opcode at a time,
//! as it's building a function. This module re-checks the finished graph
//! from scratch, the way a reviewer would: given only the blocks and their
//! declared entry depths, does every operation's stamped depth follow from
//! its predecessor, and does every edge land where its target expects?

use crate::error::{CompileResult, MicroviumError};
use crate::il::opcode::Opcode;
use crate::il::unit::{IlFunction, IlUnit};

/// Checks every function in `unit` against the spec §3/§8 invariants.
pub fn verify_unit(unit: &IlUnit) -> CompileResult<()> {
    for function in unit.functions.values() {
        verify_function(function)?;
    }
    Ok(())
}

fn verify_function(function: &IlFunction) -> CompileResult<()> {
    let mut observed_max = 0u16;

    for block in function.blocks.values() {
        let mut depth = block.expected_stack_depth_at_entry;

        for op in &block.operations {
            if op.stack_depth_before != depth {
                return Err(MicroviumError::internal(format!(
                    "function {:?} block {}: operation {:?} expected entry depth {depth}, recorded {}",
                    function.id,
                    block.id.index(),
                    op.opcode,
                    op.stack_depth_before
                )));
            }

            let delta = op.opcode.stack_delta();
            let expected_after = depth as i32 + delta;
            if expected_after < 0 {
                return Err(MicroviumError::internal(format!(
                    "function {:?} block {}: operation {:?} underflows the stack",
                    function.id,
                    block.id.index(),
                    op.opcode
                )));
            }
            let expected_after = expected_after as u16;
            if op.stack_depth_after != expected_after {
                return Err(MicroviumError::internal(format!(
                    "function {:?} block {}: operation {:?} recorded exit depth {}, derived {expected_after}",
                    function.id,
                    block.id.index(),
                    op.opcode,
                    op.stack_depth_after
                )));
            }

            if let Opcode::Jump { target } | Opcode::Branch { target } = &op.opcode {
                let target_block = function.blocks.get(target).ok_or_else(|| {
                    MicroviumError::internal(format!(
                        "function {:?} block {}: jump/branch to undeclared block {}",
                        function.id,
                        block.id.index(),
                        target.index()
                    ))
                })?;
                if expected_after != target_block.expected_stack_depth_at_entry {
                    return Err(MicroviumError::internal(format!(
                        "function {:?} block {} -> {}: stack depth {expected_after} disagrees with target's expected entry depth {}",
                        function.id,
                        block.id.index(),
                        target.index(),
                        target_block.expected_stack_depth_at_entry
                    )));
                }
            }

            depth = expected_after;
            observed_max = observed_max.max(depth).max(op.stack_depth_before);
        }
    }

    if observed_max > function.max_stack_depth {
        return Err(MicroviumError::internal(format!(
            "function {:?}: reported max_stack_depth {} is less than observed depth {observed_max}",
            function.id, function.max_stack_depth
        )));
    }

    Ok(())
}
