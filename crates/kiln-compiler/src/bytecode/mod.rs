//! Bytecode types for the Kiln backend.
//!
//! This module contains the core bytecode types:
//!
//! - [`OpCode`] - The instruction set for the VM
//! - [`Instruction`] - One immutable instruction with its operand and flags
//! - [`InstructionStream`] - The instruction array of a single function

mod instruction;
mod opcode;
mod stream;

pub use instruction::{Instruction, InstructionFlags};
pub use opcode::OpCode;
pub use stream::{InstructionStream, disassemble};
