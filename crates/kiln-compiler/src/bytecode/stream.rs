//! Instruction stream for a single function.
//!
//! An `InstructionStream` is the densely indexed instruction array owned by
//! one compilation target. Addresses are plain indices into it.

use std::fmt::Write as _;

use super::{Instruction, OpCode};

/// The instructions of one function, in address order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstructionStream {
    instructions: Vec<Instruction>,
}

impl InstructionStream {
    /// Create a new empty stream.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an instruction and return its address.
    pub fn push(&mut self, instruction: Instruction) -> usize {
        let address = self.instructions.len();
        self.instructions.push(instruction);
        address
    }

    /// Swap in a replacement instruction, returning the old one.
    ///
    /// Returns `None` (and changes nothing) if `address` is out of range.
    pub fn replace(&mut self, address: usize, instruction: Instruction) -> Option<Instruction> {
        self.instructions
            .get_mut(address)
            .map(|slot| std::mem::replace(slot, instruction))
    }

    /// Physically remove `count` instructions starting at `index`.
    ///
    /// Nothing else is adjusted; see the relocation engine for that.
    pub(crate) fn remove(&mut self, index: usize, count: usize) {
        self.instructions.drain(index..index + count);
    }

    /// Get the instruction at an address.
    pub fn get(&self, address: usize) -> Option<&Instruction> {
        self.instructions.get(address)
    }

    /// Address the next emitted instruction will get.
    pub fn current_address(&self) -> usize {
        self.instructions.len()
    }

    /// Number of instructions.
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Check if the stream is empty.
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// All instructions, in address order.
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Iterate over `(address, instruction)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &Instruction)> {
        self.instructions.iter().enumerate()
    }

    /// Consume the stream, returning the instructions.
    pub fn into_instructions(self) -> Vec<Instruction> {
        self.instructions
    }

    /// Extract all opcodes, dropping operands.
    ///
    /// Useful for testing instruction sequences without caring about
    /// specific operand values or addresses.
    pub fn opcodes(&self) -> Vec<OpCode> {
        self.instructions.iter().map(Instruction::opcode).collect()
    }

    /// Check that the stream contains exactly the given opcode sequence.
    ///
    /// Panics with a descriptive message if the sequences don't match.
    #[track_caller]
    pub fn assert_opcodes(&self, expected: &[OpCode]) {
        let actual = self.opcodes();
        assert_eq!(
            actual,
            expected,
            "Bytecode mismatch.\nExpected: {:?}\nActual:   {:?}",
            expected.iter().map(|op| op.name()).collect::<Vec<_>>(),
            actual.iter().map(|op| op.name()).collect::<Vec<_>>(),
        );
    }

    /// Render a human-readable listing, one instruction per line.
    pub fn disassemble(&self) -> String {
        disassemble(&self.instructions)
    }
}

/// Render a listing of `instructions` with zero-padded addresses.
pub fn disassemble(instructions: &[Instruction]) -> String {
    let width = instructions.len().max(1).to_string().len().max(4);
    let mut out = String::new();
    for (address, instruction) in instructions.iter().enumerate() {
        let _ = writeln!(out, "{address:0width$}  {instruction}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_stream_is_empty() {
        let stream = InstructionStream::new();
        assert!(stream.is_empty());
        assert_eq!(stream.len(), 0);
        assert_eq!(stream.current_address(), 0);
    }

    #[test]
    fn push_returns_address() {
        let mut stream = InstructionStream::new();
        assert_eq!(stream.push(Instruction::simple(OpCode::PushTrue)), 0);
        assert_eq!(stream.push(Instruction::simple(OpCode::Pop)), 1);
        assert_eq!(stream.current_address(), 2);
        assert_eq!(stream.get(1).map(Instruction::opcode), Some(OpCode::Pop));
        assert!(stream.get(2).is_none());
    }

    #[test]
    fn replace_swaps_whole_instruction() {
        let mut stream = InstructionStream::new();
        stream.push(Instruction::jump(OpCode::Jump, 0));

        let old = stream.replace(0, Instruction::simple(OpCode::Nop));
        assert_eq!(old, Some(Instruction::jump(OpCode::Jump, 0)));
        stream.assert_opcodes(&[OpCode::Nop]);

        assert!(stream.replace(5, Instruction::simple(OpCode::Nop)).is_none());
    }

    #[test]
    fn remove_drains_range() {
        let mut stream = InstructionStream::new();
        for op in [OpCode::PushTrue, OpCode::Dup, OpCode::Swap, OpCode::Pop] {
            stream.push(Instruction::simple(op));
        }
        stream.remove(1, 2);
        stream.assert_opcodes(&[OpCode::PushTrue, OpCode::Pop]);
    }

    #[test]
    fn disassembly_listing() {
        let mut stream = InstructionStream::new();
        stream.push(Instruction::with_operand(OpCode::PushInt, 1));
        stream.push(Instruction::jump(OpCode::Jump, 0));

        assert_eq!(stream.disassemble(), "0000  PUSH_INT 1\n0001  JUMP -> 0\n");
    }

    #[test]
    #[should_panic(expected = "Bytecode mismatch")]
    fn assert_opcodes_reports_mismatch() {
        let mut stream = InstructionStream::new();
        stream.push(Instruction::simple(OpCode::Pop));
        stream.assert_opcodes(&[OpCode::Dup]);
    }
}
