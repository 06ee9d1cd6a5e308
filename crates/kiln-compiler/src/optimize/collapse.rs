//! Collapse of consecutive unconditional jumps.

use kiln_core::StructuralError;

use crate::emit::BytecodeEmitter;

/// Remove every unconditional jump that directly follows another one.
/// Returns the number removed.
///
/// Control never falls through an unconditional jump, so the second jump of
/// a pair is unreachable.
pub(super) fn collapse_consecutive_jumps(
    emitter: &mut BytecodeEmitter,
) -> Result<usize, StructuralError> {
    let mut removed = 0;
    let mut address = 0;

    while address + 1 < emitter.len() {
        let pair = [address, address + 1].map(|at| {
            emitter
                .get(at)
                .is_some_and(|instruction| instruction.is_unconditional_jump())
        });
        if pair == [true, true] {
            emitter.remove_range(address + 1, 1)?;
            removed += 1;
        } else {
            address += 1;
        }
    }

    Ok(removed)
}
