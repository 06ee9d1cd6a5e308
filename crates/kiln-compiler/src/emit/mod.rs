//! Bytecode emitter for the Kiln backend.
//!
//! The [`BytecodeEmitter`] owns everything that refers to instruction
//! addresses in one function: the instruction stream, the label table, the
//! try blocks, the source positions and the relocation observers. Keeping
//! them together lets [`BytecodeEmitter::remove_range`] update all of them
//! in one place.
//!
//! # Example
//!
//! ```
//! use kiln_compiler::bytecode::{Instruction, OpCode};
//! use kiln_compiler::emit::BytecodeEmitter;
//!
//! let mut emitter = BytecodeEmitter::new(false);
//! emitter.emit(Instruction::named(OpCode::GetLocal, "done"));
//! emitter.emit_branch_to_label(OpCode::JumpIfTrue, "exit").unwrap();
//! emitter.emit(Instruction::with_operand(OpCode::PushInt, 1));
//! emitter.define_label_here("exit").unwrap();
//! emitter.emit(Instruction::simple(OpCode::ReturnVoid));
//!
//! assert_eq!(emitter.get(1).unwrap().target(), Some(3));
//! ```

mod labels;
mod regions;
mod relocate;

pub use labels::LabelTable;
pub use regions::{ExceptionRegion, ExceptionTable, RegionKind, TryBlock, TryBlockId};
pub use relocate::{ObserverId, ObserverRegistry, RelocationObserver};

use kiln_core::StructuralError;
use tracing::trace;

use crate::bytecode::{Instruction, InstructionStream, OpCode};
use crate::positions::PositionTable;

/// Emits the instructions of a single function.
#[derive(Debug, Default)]
pub struct BytecodeEmitter {
    /// The instructions emitted so far
    stream: InstructionStream,

    /// Bound and pending labels
    labels: LabelTable,

    /// Try blocks registered in this function
    exceptions: ExceptionTable,

    /// External holders of instruction addresses
    observers: ObserverRegistry,

    /// Source position of each instruction
    positions: PositionTable,
}

/// Everything a finished emitter hands over.
#[derive(Debug)]
pub(crate) struct EmittedCode {
    pub instructions: Vec<Instruction>,
    pub try_blocks: Vec<TryBlock>,
    pub positions: PositionTable,
}

impl BytecodeEmitter {
    /// Create an emitter. Source positions are only kept if
    /// `record_positions` is set.
    pub fn new(record_positions: bool) -> Self {
        Self {
            positions: PositionTable::new(record_positions),
            ..Self::default()
        }
    }

    /// Set the source position for subsequently emitted instructions.
    pub fn set_position(&mut self, file: &str, line: u32, col: u32) {
        self.positions.set(file, line, col);
    }

    /// Emit subsequent instructions without a source position.
    pub fn clear_position(&mut self) {
        self.positions.clear();
    }

    // ==========================================================================
    // Basic Emission
    // ==========================================================================

    /// Append an instruction and return its address.
    ///
    /// A jump that carries a label name instead of a target is linked to that
    /// label: resolved now if the label is bound, patched later otherwise.
    pub fn emit(&mut self, instruction: Instruction) -> usize {
        let label = instruction.pending_label().map(str::to_owned);
        let address = self.stream.push(instruction);
        self.positions.record();
        if let Some(label) = label
            && let Some(target) = self.labels.reference(&label, address)
        {
            self.patch(address, target);
        }
        address
    }

    /// Emit an unconditional jump to `label`.
    pub fn emit_jump_to_label(&mut self, label: &str) -> usize {
        self.emit(Instruction::to_label(OpCode::Jump, label))
    }

    /// Emit a jump of any kind (conditional, unconditional, leave) to `label`.
    pub fn emit_branch_to_label(
        &mut self,
        opcode: OpCode,
        label: &str,
    ) -> Result<usize, StructuralError> {
        self.check_jump(opcode)?;
        Ok(self.emit(Instruction::to_label(opcode, label)))
    }

    /// Emit a jump to an already known address.
    pub fn emit_jump(&mut self, opcode: OpCode, target: usize) -> Result<usize, StructuralError> {
        self.check_jump(opcode)?;
        Ok(self.emit(Instruction::jump(opcode, target)))
    }

    fn check_jump(&self, opcode: OpCode) -> Result<(), StructuralError> {
        if opcode.is_jump() {
            Ok(())
        } else {
            Err(StructuralError::NotAJump {
                opcode: opcode.name(),
                address: self.current_address(),
            })
        }
    }

    // ==========================================================================
    // Labels
    // ==========================================================================

    /// Bind `label` to `address` and patch every jump waiting on it.
    pub fn define_label(&mut self, label: &str, address: usize) -> Result<(), StructuralError> {
        let fixups = self.labels.define(label, address)?;
        trace!(label, address, fixups = fixups.len(), "label defined");
        for fixup in fixups {
            self.patch(fixup, address);
        }
        Ok(())
    }

    /// Bind `label` to the address of the next emitted instruction.
    pub fn define_label_here(&mut self, label: &str) -> Result<usize, StructuralError> {
        let address = self.current_address();
        self.define_label(label, address)?;
        Ok(address)
    }

    /// The address `label` is bound to.
    pub fn label_address(&self, label: &str) -> Option<usize> {
        self.labels.address(label)
    }

    fn patch(&mut self, address: usize, target: usize) {
        if let Some(resolved) = self
            .stream
            .get(address)
            .map(|jump| jump.retarget(target))
        {
            self.stream.replace(address, resolved);
        }
    }

    /// Fail if any jump still waits on an unbound label.
    pub fn check_resolved(&self) -> Result<(), StructuralError> {
        match self.labels.first_unresolved() {
            Some((name, address)) => Err(StructuralError::UnresolvedLabel {
                name: name.to_string(),
                address,
            }),
            None => Ok(()),
        }
    }

    /// Fail if any jump or leave targets an address outside the stream.
    pub fn validate_targets(&self) -> Result<(), StructuralError> {
        let len = self.stream.len();
        for (address, instruction) in self.stream.iter() {
            if !instruction.is_jump() {
                continue;
            }
            if let Some(target) = instruction.operand() {
                let in_range = usize::try_from(target).is_ok_and(|t| t < len);
                if !in_range {
                    return Err(StructuralError::JumpTargetOutOfRange {
                        address,
                        target,
                        len,
                    });
                }
            }
        }
        Ok(())
    }

    // ==========================================================================
    // Try Blocks
    // ==========================================================================

    /// Open a try block whose body starts at the next emitted instruction.
    pub fn begin_try_block(&mut self) -> TryBlockId {
        self.exceptions.begin(self.current_address())
    }

    /// Start the finally clause of `block` at the next emitted instruction.
    pub fn mark_finally(&mut self, block: TryBlockId) -> Result<(), StructuralError> {
        self.exceptions.mark_finally(block, self.current_address())
    }

    /// Start the catch clause of `block` at the next emitted instruction.
    pub fn mark_catch(&mut self, block: TryBlockId) -> Result<(), StructuralError> {
        self.exceptions.mark_catch(block, self.current_address())
    }

    /// Close `block` after the last emitted instruction.
    ///
    /// If the clause opened last is still empty, a `Nop` is emitted as its
    /// anchor so the block ends inside the stream.
    pub fn end_try_block(&mut self, block: TryBlockId) -> Result<(), StructuralError> {
        let last_begin = self.exceptions.get(block).map(|open| {
            [open.begin_finally, open.begin_catch]
                .into_iter()
                .flatten()
                .fold(open.begin_try, usize::max)
        });
        if last_begin == Some(self.current_address()) {
            self.emit(Instruction::simple(OpCode::Nop));
        }
        let end = self.current_address().saturating_sub(1);
        self.exceptions.end(block, end)
    }

    /// The try blocks of this function.
    pub fn exceptions(&self) -> &ExceptionTable {
        &self.exceptions
    }

    /// Fail if any try block is unterminated or out of range.
    pub fn validate_regions(&self) -> Result<(), StructuralError> {
        self.exceptions.validate(self.stream.len())
    }

    // ==========================================================================
    // Observers
    // ==========================================================================

    /// Track `address` for `observer` across removals.
    pub fn register_observer(
        &mut self,
        address: usize,
        observer: Box<dyn RelocationObserver>,
    ) -> ObserverId {
        self.observers.register(address, observer)
    }

    /// The address an observer currently tracks.
    pub fn observer_address(&self, id: ObserverId) -> Option<usize> {
        self.observers.tracked_address(id)
    }

    // ==========================================================================
    // Access
    // ==========================================================================

    /// Get the instruction at an address.
    pub fn get(&self, address: usize) -> Option<&Instruction> {
        self.stream.get(address)
    }

    /// Swap in a replacement instruction, returning the old one.
    pub fn replace(&mut self, address: usize, instruction: Instruction) -> Option<Instruction> {
        self.stream.replace(address, instruction)
    }

    /// Address the next emitted instruction will get.
    pub fn current_address(&self) -> usize {
        self.stream.current_address()
    }

    /// Number of instructions.
    pub fn len(&self) -> usize {
        self.stream.len()
    }

    /// Check if nothing has been emitted.
    pub fn is_empty(&self) -> bool {
        self.stream.is_empty()
    }

    /// The instruction stream.
    pub fn stream(&self) -> &InstructionStream {
        &self.stream
    }

    /// The source positions.
    pub fn positions(&self) -> &PositionTable {
        &self.positions
    }

    pub(crate) fn into_code(self) -> EmittedCode {
        EmittedCode {
            instructions: self.stream.into_instructions(),
            try_blocks: self.exceptions.into_blocks(),
            positions: self.positions,
        }
    }
}

#[cfg(test)]
mod tests {
    use kiln_core::{RegionViolation, Span};

    use super::*;

    fn push(value: i64) -> Instruction {
        Instruction::with_operand(OpCode::PushInt, value)
    }

    #[test]
    fn emit_returns_addresses() {
        let mut emitter = BytecodeEmitter::new(false);
        assert_eq!(emitter.emit(push(1)), 0);
        assert_eq!(emitter.emit(push(2)), 1);
        assert_eq!(emitter.current_address(), 2);
        emitter
            .stream()
            .assert_opcodes(&[OpCode::PushInt, OpCode::PushInt]);
    }

    #[test]
    fn forward_label_is_patched() {
        let mut emitter = BytecodeEmitter::new(false);
        let jump = emitter.emit_jump_to_label("L");
        emitter.emit(push(1));
        emitter.emit(push(2));
        assert_eq!(emitter.get(jump).unwrap().pending_label(), Some("L"));

        emitter.define_label("L", 2).unwrap();

        let patched = emitter.get(jump).unwrap();
        assert_eq!(patched.target(), Some(2));
        assert_eq!(patched.name(), None);
        assert_eq!(emitter.check_resolved(), Ok(()));
    }

    #[test]
    fn backward_label_resolves_on_emit() {
        let mut emitter = BytecodeEmitter::new(false);
        emitter.define_label_here("top").unwrap();
        emitter.emit(push(1));
        let jump = emitter.emit_jump_to_label("top");
        assert_eq!(emitter.get(jump).unwrap().target(), Some(0));
        assert_eq!(emitter.label_address("top"), Some(0));
    }

    #[test]
    fn branch_keeps_its_opcode() {
        let mut emitter = BytecodeEmitter::new(false);
        let branch = emitter
            .emit_branch_to_label(OpCode::JumpIfNull, "skip")
            .unwrap();
        emitter.emit(push(1));
        emitter.define_label_here("skip").unwrap();
        emitter.emit(Instruction::simple(OpCode::ReturnVoid));

        let patched = emitter.get(branch).unwrap();
        assert_eq!(patched.opcode(), OpCode::JumpIfNull);
        assert_eq!(patched.target(), Some(2));
    }

    #[test]
    fn branch_rejects_non_jump() {
        let mut emitter = BytecodeEmitter::new(false);
        emitter.emit(push(1));
        let err = emitter.emit_branch_to_label(OpCode::Add, "x").unwrap_err();
        assert_eq!(
            err,
            StructuralError::NotAJump {
                opcode: "ADD",
                address: 1,
            }
        );
        assert_eq!(emitter.len(), 1);
    }

    #[test]
    fn duplicate_label_is_fatal() {
        let mut emitter = BytecodeEmitter::new(false);
        emitter.define_label("L", 0).unwrap();
        assert!(matches!(
            emitter.define_label("L", 1),
            Err(StructuralError::DuplicateLabel { .. })
        ));
    }

    #[test]
    fn unresolved_label_names_first_reference() {
        let mut emitter = BytecodeEmitter::new(false);
        emitter.emit(push(1));
        emitter.emit_jump_to_label("missing");
        emitter.emit_jump_to_label("missing");
        assert_eq!(
            emitter.check_resolved(),
            Err(StructuralError::UnresolvedLabel {
                name: "missing".into(),
                address: 1,
            })
        );
    }

    #[test]
    fn target_out_of_range() {
        let mut emitter = BytecodeEmitter::new(false);
        emitter.emit_jump(OpCode::Jump, 5).unwrap();
        assert_eq!(
            emitter.validate_targets(),
            Err(StructuralError::JumpTargetOutOfRange {
                address: 0,
                target: 5,
                len: 1,
            })
        );
    }

    #[test]
    fn relocation_moves_jump_and_region() {
        let mut emitter = BytecodeEmitter::new(false);
        let block = emitter.begin_try_block();
        for i in 0..10 {
            if i == 1 {
                emitter.emit_jump(OpCode::Jump, 8).unwrap();
            } else {
                emitter.emit(push(i));
            }
        }
        emitter.end_try_block(block).unwrap();
        assert_eq!(emitter.exceptions().get(block).unwrap().end_try, Some(9));

        emitter.remove_range(5, 2).unwrap();

        assert_eq!(emitter.get(1).unwrap().target(), Some(6));
        assert_eq!(emitter.exceptions().get(block).unwrap().end_try, Some(7));
        assert_eq!(emitter.validate_regions(), Ok(()));
    }

    #[test]
    fn empty_finally_gets_anchor() {
        let mut emitter = BytecodeEmitter::new(false);
        let block = emitter.begin_try_block();
        emitter.emit(push(1));
        emitter.mark_finally(block).unwrap();
        emitter.end_try_block(block).unwrap();

        emitter
            .stream()
            .assert_opcodes(&[OpCode::PushInt, OpCode::Nop]);
        let regions = emitter.exceptions().regions();
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[1].kind, RegionKind::Finally);
        assert_eq!((regions[1].begin, regions[1].end), (1, 1));
    }

    #[test]
    fn unterminated_block_fails_validation() {
        let mut emitter = BytecodeEmitter::new(false);
        emitter.begin_try_block();
        emitter.emit(push(1));
        assert_eq!(
            emitter.validate_regions(),
            Err(StructuralError::InvalidExceptionRegion {
                block: 0,
                violation: RegionViolation::Unterminated,
            })
        );
    }

    #[test]
    fn positions_follow_emission() {
        let mut emitter = BytecodeEmitter::new(true);
        emitter.set_position("main.k", 3, 7);
        emitter.emit(push(1));
        emitter.clear_position();
        emitter.emit(push(2));

        assert_eq!(
            emitter.positions().position_at(0),
            Some(("main.k", Span::new(3, 7)))
        );
        assert_eq!(emitter.positions().position_at(1), None);
    }
}
