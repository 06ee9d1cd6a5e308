//! Removal of jumps to the next instruction.

use kiln_core::StructuralError;

use crate::emit::BytecodeEmitter;

/// Remove every unconditional jump whose target is the following
/// instruction. Returns the number removed.
///
/// A conditional jump to the next instruction is fatal. After a removal the
/// scan steps back one address: the instruction before the removed jump may
/// now target its own successor.
pub(super) fn remove_redundant_jumps(
    emitter: &mut BytecodeEmitter,
) -> Result<usize, StructuralError> {
    let mut removed = 0;
    let mut address = 0;

    while let Some(instruction) = emitter.get(address) {
        if instruction.target() == Some(address + 1) {
            if instruction.is_conditional_jump() {
                return Err(StructuralError::ConditionalJumpToNext { address });
            }
            if instruction.is_unconditional_jump() {
                emitter.remove_range(address, 1)?;
                removed += 1;
                address = address.saturating_sub(1);
                continue;
            }
        }
        address += 1;
    }

    Ok(removed)
}
