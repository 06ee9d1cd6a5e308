//! Conditional jump re-inversion.
//!
//! ```text
//! addr:     if-true  -> addr+2        addr:   if-false -> T
//! addr+1:   jump     -> T        =>
//! addr+2:   ...                       addr+1: ...
//! ```

use kiln_core::StructuralError;

use crate::bytecode::Instruction;
use crate::emit::BytecodeEmitter;

/// Fold every conditional jump over an unconditional jump into one inverted
/// conditional jump. Returns the number of jumps inverted.
pub(super) fn invert_conditional_jumps(
    emitter: &mut BytecodeEmitter,
) -> Result<usize, StructuralError> {
    let mut inverted = 0;
    let mut address = 0;

    while address + 1 < emitter.len() {
        if let Some(replacement) = inversion_at(emitter, address) {
            emitter.replace(address, replacement);
            emitter.remove_range(address + 1, 1)?;
            inverted += 1;
        }
        address += 1;
    }

    Ok(inverted)
}

fn inversion_at(emitter: &BytecodeEmitter, address: usize) -> Option<Instruction> {
    let branch = emitter.get(address)?;
    if !branch.is_conditional_jump() || branch.target() != Some(address + 2) {
        return None;
    }
    let opcode = branch.opcode().inverted()?;

    let skipped = emitter.get(address + 1)?;
    if !skipped.is_unconditional_jump() {
        return None;
    }
    let target = skipped.target()?;

    Some(branch.with_jump(opcode, target))
}
