//! Peephole optimization pipeline.
//!
//! Runs once per function, after the last instruction is emitted, in a fixed
//! order:
//!
//! 1. [`BytecodeEmitter::check_resolved`] - every label must be bound
//! 2. [`propagate`] - jumps to unconditional jumps go straight to the end of the chain
//! 3. [`redundant`] - unconditional jumps to the next instruction are removed
//! 4. [`invert`] - `cond-jump(+2); jump(T)` becomes `inverted-cond-jump(T)`
//! 5. [`collapse`] - unconditional jumps right after an unconditional jump are removed
//!
//! Every pass changes the stream only through instruction replacement and
//! [`BytecodeEmitter::remove_range`]. `Nop` instructions are never removed.
//! When optimization is disabled only the label check runs. In both cases
//! every jump target is validated at the end.

mod collapse;
mod invert;
mod propagate;
mod redundant;

use kiln_core::StructuralError;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::emit::BytecodeEmitter;

/// What the pipeline changed in one function.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimizeStats {
    /// Jumps redirected past a chain of unconditional jumps.
    pub propagated: usize,
    /// Unconditional jumps to the next instruction that were removed.
    pub redundant_removed: usize,
    /// Conditional jumps inverted over an unconditional jump.
    pub inverted: usize,
    /// Unreachable unconditional jumps removed after another one.
    pub collapsed: usize,
}

impl OptimizeStats {
    /// Number of instructions removed from the stream.
    pub fn removed(&self) -> usize {
        self.redundant_removed + self.inverted + self.collapsed
    }
}

/// Run the pipeline over a finished emitter.
#[cfg_attr(feature = "profiling", profiling::function)]
#[tracing::instrument(level = "debug", skip_all, fields(len = emitter.len()))]
pub fn optimize(
    emitter: &mut BytecodeEmitter,
    enabled: bool,
) -> Result<OptimizeStats, StructuralError> {
    emitter.check_resolved()?;

    let mut stats = OptimizeStats::default();
    if enabled {
        stats.propagated = propagate::propagate_jump_targets(emitter)?;
        debug!(count = stats.propagated, "propagated jump targets");

        stats.redundant_removed = redundant::remove_redundant_jumps(emitter)?;
        debug!(count = stats.redundant_removed, "removed jumps to next");

        stats.inverted = invert::invert_conditional_jumps(emitter)?;
        debug!(count = stats.inverted, "inverted conditional jumps");

        stats.collapsed = collapse::collapse_consecutive_jumps(emitter)?;
        debug!(count = stats.collapsed, "collapsed consecutive jumps");
    }

    emitter.validate_targets()?;
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{Instruction, OpCode};

    fn emitter_with(code: Vec<Instruction>) -> BytecodeEmitter {
        let mut emitter = BytecodeEmitter::new(false);
        for instruction in code {
            emitter.emit(instruction);
        }
        emitter
    }

    #[test]
    fn unresolved_label_stops_pipeline() {
        let mut emitter = BytecodeEmitter::new(false);
        emitter.emit_jump_to_label("nowhere");
        let err = optimize(&mut emitter, true).unwrap_err();
        assert!(matches!(err, StructuralError::UnresolvedLabel { .. }));
    }

    #[test]
    fn disabled_pipeline_leaves_stream_alone() {
        let mut emitter = emitter_with(vec![
            Instruction::jump(OpCode::Jump, 1),
            Instruction::simple(OpCode::ReturnVoid),
        ]);
        let stats = optimize(&mut emitter, false).unwrap();
        assert_eq!(stats, OptimizeStats::default());
        assert_eq!(emitter.len(), 2);
    }

    #[test]
    fn reinversion_over_label() {
        // 0: if-true -> 2
        // 1: jump -> 4
        // 2: L: push 1
        // 3: return
        // 4: push 2
        // 5: return
        let mut emitter = BytecodeEmitter::new(false);
        emitter
            .emit_branch_to_label(OpCode::JumpIfTrue, "L")
            .unwrap();
        emitter.emit_jump_to_label("M");
        emitter.define_label_here("L").unwrap();
        emitter.emit(Instruction::with_operand(OpCode::PushInt, 1));
        emitter.emit(Instruction::simple(OpCode::Return));
        emitter.define_label_here("M").unwrap();
        emitter.emit(Instruction::with_operand(OpCode::PushInt, 2));
        emitter.emit(Instruction::simple(OpCode::Return));

        let stats = optimize(&mut emitter, true).unwrap();

        assert_eq!(stats.inverted, 1);
        assert_eq!(emitter.len(), 5);
        let first = emitter.get(0).unwrap();
        assert_eq!(first.opcode(), OpCode::JumpIfFalse);
        assert_eq!(first.target(), Some(3));
        assert_eq!(emitter.label_address("L"), Some(1));
        assert_eq!(emitter.label_address("M"), Some(3));
    }

    #[test]
    fn chain_then_redundant_removal_settles() {
        // 0: jump -> 2
        // 1: jump -> 2
        // 2: jump -> 4
        // 3: jump -> 0
        // 4: return
        let mut emitter = emitter_with(vec![
            Instruction::jump(OpCode::Jump, 2),
            Instruction::jump(OpCode::Jump, 2),
            Instruction::jump(OpCode::Jump, 4),
            Instruction::jump(OpCode::Jump, 0),
            Instruction::simple(OpCode::ReturnVoid),
        ]);

        let stats = optimize(&mut emitter, true).unwrap();

        // Propagation sends 0, 1 and 3 to the return; every jump then
        // targets its successor and the removals cascade backwards
        assert_eq!(stats.propagated, 3);
        assert_eq!(stats.redundant_removed, 4);
        assert_eq!(stats.removed(), 4);
        emitter.stream().assert_opcodes(&[OpCode::ReturnVoid]);
    }

    #[test]
    fn empty_else_branch_is_fatal() {
        let mut emitter = BytecodeEmitter::new(false);
        emitter.emit(Instruction::named(OpCode::GetVar, "c"));
        emitter
            .emit_branch_to_label(OpCode::JumpIfFalse, "else")
            .unwrap();
        emitter.emit_jump_to_label("end");
        emitter.define_label_here("else").unwrap();
        emitter.define_label_here("end").unwrap();
        emitter.emit(Instruction::simple(OpCode::ReturnVoid));

        assert_eq!(
            optimize(&mut emitter, true),
            Err(StructuralError::ConditionalJumpToNext { address: 1 })
        );
    }

    #[test]
    fn nop_anchor_survives() {
        let mut emitter = BytecodeEmitter::new(false);
        let block = emitter.begin_try_block();
        emitter.emit_jump(OpCode::Jump, 2).unwrap();
        emitter.mark_finally(block).unwrap();
        emitter.end_try_block(block).unwrap();
        emitter.emit(Instruction::simple(OpCode::ReturnVoid));

        optimize(&mut emitter, true).unwrap();

        emitter
            .stream()
            .assert_opcodes(&[OpCode::Jump, OpCode::Nop, OpCode::ReturnVoid]);
        assert_eq!(emitter.validate_regions(), Ok(()));
    }
}
