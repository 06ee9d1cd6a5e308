//! The relocation engine.
//!
//! [`BytecodeEmitter::remove_range`] is the only way instructions leave a
//! stream. Removing instructions shifts every later address down, so the
//! engine rewrites everything that refers to an address:
//!
//! - jump and leave targets past the removal point
//! - try-block boundaries, re-validating every closed block
//! - addresses tracked by registered [`RelocationObserver`]s
//! - bound label addresses and pending label fixups
//!
//! Source positions are removed together with their instructions.

use std::fmt;

use kiln_core::StructuralError;
use tracing::trace;

use super::BytecodeEmitter;

/// Something outside the emitter that holds an instruction address.
///
/// Observers are told the old and new address whenever a removal moves the
/// address they track. They never see the stream and cannot re-enter the
/// engine.
pub trait RelocationObserver {
    /// The tracked address moved from `old` to `new`.
    fn relocated(&mut self, old: usize, new: usize);
}

impl<F: FnMut(usize, usize)> RelocationObserver for F {
    fn relocated(&mut self, old: usize, new: usize) {
        self(old, new)
    }
}

/// Handle to a registered observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(usize);

struct Tracked {
    address: usize,
    observer: Box<dyn RelocationObserver>,
}

/// Registered observers with the address each one tracks.
#[derive(Default)]
pub struct ObserverRegistry {
    entries: Vec<Tracked>,
}

impl ObserverRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `address` on behalf of `observer`.
    pub fn register(
        &mut self,
        address: usize,
        observer: Box<dyn RelocationObserver>,
    ) -> ObserverId {
        self.entries.push(Tracked { address, observer });
        ObserverId(self.entries.len() - 1)
    }

    /// The address an observer currently tracks.
    pub fn tracked_address(&self, id: ObserverId) -> Option<usize> {
        self.entries.get(id.0).map(|entry| entry.address)
    }

    /// Tell every observer tracking an address past `index` where it went.
    pub fn notify(&mut self, index: usize, count: usize) {
        for entry in &mut self.entries {
            if entry.address > index {
                let old = entry.address;
                let new = old.saturating_sub(count);
                entry.observer.relocated(old, new);
                entry.address = new;
            }
        }
    }

    /// Number of registered observers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if no observer is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for ObserverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|entry| entry.address))
            .finish()
    }
}

impl BytecodeEmitter {
    /// Remove `count` instructions starting at `index`.
    ///
    /// Every address past `index` that refers into the stream is moved down
    /// by `count`. A removal that would leave a try block invalid is fatal
    /// and changes nothing. Removing zero instructions does nothing.
    pub fn remove_range(&mut self, index: usize, count: usize) -> Result<(), StructuralError> {
        if count == 0 {
            return Ok(());
        }
        let len = self.stream.len();
        if index.checked_add(count).is_none_or(|end| end > len) {
            return Err(StructuralError::RangeOutOfBounds { index, count, len });
        }

        // Regions are checked before anything moves
        let mut exceptions = self.exceptions.clone();
        exceptions.relocate(index, count, len - count)?;

        self.stream.remove(index, count);
        self.positions.remove(index, count);

        for address in 0..self.stream.len() {
            let moved = self.stream.get(address).and_then(|instruction| {
                instruction
                    .target()
                    .filter(|&target| target > index)
                    .map(|target| instruction.retarget(target.saturating_sub(count)))
            });
            if let Some(moved) = moved {
                self.stream.replace(address, moved);
            }
        }

        self.exceptions = exceptions;
        self.observers.notify(index, count);
        self.labels.relocate(index, count);

        trace!(index, count, len = self.stream.len(), "removed instructions");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use kiln_core::RegionViolation;

    use super::*;
    use crate::bytecode::{Instruction, OpCode};

    fn emitter_with(instructions: Vec<Instruction>) -> BytecodeEmitter {
        let mut emitter = BytecodeEmitter::new(false);
        for instruction in instructions {
            emitter.emit(instruction);
        }
        emitter
    }

    fn pushes(n: i64) -> Vec<Instruction> {
        (0..n)
            .map(|i| Instruction::with_operand(OpCode::PushInt, i))
            .collect()
    }

    #[test]
    fn zero_count_is_noop() {
        let mut emitter = emitter_with(pushes(3));
        emitter.remove_range(1, 0).unwrap();
        assert_eq!(emitter.len(), 3);
        // Zero-length removal at the end is allowed too
        emitter.remove_range(3, 0).unwrap();
    }

    #[test]
    fn range_past_end_is_fatal() {
        let mut emitter = emitter_with(pushes(4));
        let err = emitter.remove_range(3, 2).unwrap_err();
        assert_eq!(
            err,
            StructuralError::RangeOutOfBounds {
                index: 3,
                count: 2,
                len: 4,
            }
        );
        assert_eq!(emitter.len(), 4);
    }

    #[test]
    fn jumps_past_index_move_down() {
        let mut code = pushes(6);
        code[0] = Instruction::jump(OpCode::Jump, 5);
        code[1] = Instruction::jump(OpCode::JumpIfFalse, 2);
        code[4] = Instruction::leave(0);
        let mut emitter = emitter_with(code);

        emitter.remove_range(2, 2).unwrap();

        assert_eq!(emitter.len(), 4);
        assert_eq!(emitter.get(0).unwrap().target(), Some(3));
        // Target equal to the removal index is left alone
        assert_eq!(emitter.get(1).unwrap().target(), Some(2));
        assert_eq!(emitter.get(2).unwrap().target(), Some(0));
        assert_eq!(emitter.get(2).unwrap().opcode(), OpCode::Leave);
    }

    #[test]
    fn non_jump_operands_are_untouched() {
        let mut emitter = emitter_with(pushes(5));
        emitter.remove_range(0, 1).unwrap();
        assert_eq!(emitter.get(3).unwrap().operand(), Some(4));
    }

    #[test]
    fn observers_see_old_and_new_address() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut emitter = emitter_with(pushes(10));

        let log = Rc::clone(&seen);
        let moved = emitter.register_observer(
            7,
            Box::new(move |old: usize, new: usize| log.borrow_mut().push((old, new))),
        );
        let log = Rc::clone(&seen);
        let kept = emitter.register_observer(
            2,
            Box::new(move |old: usize, new: usize| log.borrow_mut().push((old, new))),
        );

        emitter.remove_range(2, 3).unwrap();

        assert_eq!(*seen.borrow(), vec![(7, 4)]);
        assert_eq!(emitter.observer_address(moved), Some(4));
        assert_eq!(emitter.observer_address(kept), Some(2));
    }

    #[test]
    fn region_boundaries_move_and_revalidate() {
        let mut emitter = BytecodeEmitter::new(false);
        let block = emitter.begin_try_block();
        for instruction in pushes(4) {
            emitter.emit(instruction);
        }
        emitter.mark_catch(block).unwrap();
        for instruction in pushes(4) {
            emitter.emit(instruction);
        }
        emitter.end_try_block(block).unwrap();

        emitter.remove_range(1, 2).unwrap();

        let try_block = emitter.exceptions().get(block).unwrap();
        assert_eq!(try_block.begin_try, 0);
        assert_eq!(try_block.begin_catch, Some(2));
        assert_eq!(try_block.end_try, Some(5));
    }

    #[test]
    fn removing_region_tail_is_fatal() {
        let mut emitter = BytecodeEmitter::new(true);
        let block = emitter.begin_try_block();
        for (line, instruction) in pushes(3).into_iter().enumerate() {
            emitter.set_position("main.k", line as u32 + 1, 1);
            emitter.emit(instruction);
        }
        emitter.end_try_block(block).unwrap();
        let before = emitter.exceptions().blocks().to_vec();

        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&seen);
        let observer = emitter.register_observer(
            2,
            Box::new(move |old: usize, new: usize| log.borrow_mut().push((old, new))),
        );

        let err = emitter.remove_range(2, 1).unwrap_err();
        assert_eq!(
            err,
            StructuralError::InvalidExceptionRegion {
                block: 0,
                violation: RegionViolation::EndOutOfRange { end: 2, len: 2 },
            }
        );

        // The rejected removal left everything in place
        assert_eq!(emitter.len(), 3);
        assert_eq!(emitter.positions().len(), 3);
        assert_eq!(emitter.positions().position_at(2).unwrap().1.line, 3);
        assert_eq!(emitter.exceptions().blocks(), before.as_slice());
        assert_eq!(emitter.observer_address(observer), Some(2));
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn positions_are_removed_with_instructions() {
        let mut emitter = BytecodeEmitter::new(true);
        for line in 1..=4 {
            emitter.set_position("main.k", line, 1);
            emitter.emit(Instruction::simple(OpCode::Nop));
        }
        emitter.remove_range(1, 2).unwrap();
        let (file, span) = emitter.positions().position_at(1).unwrap();
        assert_eq!(file, "main.k");
        assert_eq!(span.line, 4);
    }

    #[test]
    fn pending_label_fixups_follow_their_jumps() {
        let mut emitter = emitter_with(pushes(3));
        emitter.emit_jump_to_label("end");
        emitter.remove_range(0, 2).unwrap();
        emitter.emit(Instruction::simple(OpCode::ReturnVoid));
        emitter.define_label_here("end").unwrap();
        emitter.emit(Instruction::simple(OpCode::ReturnVoid));

        let jump = emitter.get(1).unwrap();
        assert_eq!(jump.opcode(), OpCode::Jump);
        assert_eq!(jump.target(), Some(3));
    }
}
