//! Unconditional-jump target propagation.

use kiln_core::StructuralError;
use rustc_hash::FxHashSet;

use crate::emit::BytecodeEmitter;

/// Redirect every jump whose target is an unconditional jump to the end of
/// that chain. Returns the number of jumps redirected.
///
/// Each originating jump keeps its own visited set; reaching an address twice
/// is a cycle and is fatal.
pub(super) fn propagate_jump_targets(
    emitter: &mut BytecodeEmitter,
) -> Result<usize, StructuralError> {
    let len = emitter.len();
    let mut visited = FxHashSet::default();
    let mut redirected = 0;

    for address in 0..len {
        let Some(start) = emitter.get(address).and_then(|jump| jump.target()) else {
            continue;
        };
        if start >= len {
            continue;
        }

        visited.clear();
        visited.insert(start);
        let mut target = start;
        while let Some(next) = emitter
            .get(target)
            .filter(|hop| hop.is_unconditional_jump())
            .and_then(|hop| hop.target())
            .filter(|&next| next < len)
        {
            if !visited.insert(next) {
                return Err(StructuralError::JumpCycle { address });
            }
            target = next;
        }

        if target != start {
            let redirected_jump = emitter.get(address).map(|jump| jump.retarget(target));
            if let Some(jump) = redirected_jump {
                emitter.replace(address, jump);
                redirected += 1;
            }
        }
    }

    Ok(redirected)
}
