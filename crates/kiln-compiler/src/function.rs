//! The finished, validated output for one function.

use kiln_core::Span;

use crate::bytecode::{self, Instruction};
use crate::emit::{ExceptionRegion, TryBlock, TryBlockId};
use crate::optimize::OptimizeStats;
use crate::positions::PersistedPositions;

/// A function whose code generation completed.
///
/// Every jump and leave target lies inside `instructions`, and every try
/// block is valid against it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledFunction {
    /// Function name.
    pub name: String,
    /// Optimized instructions.
    pub instructions: Vec<Instruction>,
    /// Try blocks in registration order.
    pub try_blocks: Vec<TryBlock>,
    /// Names the function reads from enclosing functions, in first-use order.
    pub outer_variables: Vec<String>,
    /// Parameter names, including lifted captures.
    pub parameters: Vec<String>,
    /// Number of stack slots used by locals and parameters.
    pub frame_size: u32,
    /// Source positions.
    pub positions: PersistedPositions,
    /// What the optimizer changed.
    pub stats: OptimizeStats,
}

impl CompiledFunction {
    /// Every non-empty exception region.
    pub fn regions(&self) -> Vec<ExceptionRegion> {
        self.try_blocks
            .iter()
            .enumerate()
            .flat_map(|(index, block)| block.regions(TryBlockId(index)))
            .collect()
    }

    /// Source position of the instruction at `address`.
    pub fn position_of(&self, address: usize) -> Option<(&str, Span)> {
        self.positions.lookup(address)
    }

    /// Human-readable listing of the instructions.
    pub fn disassemble(&self) -> String {
        bytecode::disassemble(&self.instructions)
    }
}
