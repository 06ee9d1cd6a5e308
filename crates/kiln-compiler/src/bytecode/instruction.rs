//! A single emitted instruction.
//!
//! Instructions are immutable values. Passes that need to change one build a
//! replacement (see [`Instruction::retarget`]) and swap it into the stream.

use std::fmt;

use bitflags::bitflags;
use kiln_core::ModuleRef;

use super::OpCode;

bitflags! {
    /// Classification flags carried by every instruction.
    ///
    /// `JUMP` and `CONDITIONAL` are derived from the opcode when the instruction
    /// is built; `DISCARDS_RESULT` is set by the code generator.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct InstructionFlags: u8 {
        /// Transfers control to the operand address (jumps and leave).
        const JUMP = 1 << 0;
        /// Jump that may fall through to the next instruction.
        const CONDITIONAL = 1 << 1;
        /// The value this instruction produces is not used.
        const DISCARDS_RESULT = 1 << 2;
    }
}

impl InstructionFlags {
    fn for_opcode(opcode: OpCode) -> Self {
        let mut flags = InstructionFlags::empty();
        if opcode.is_jump() {
            flags |= InstructionFlags::JUMP;
        }
        if opcode.is_conditional_jump() {
            flags |= InstructionFlags::CONDITIONAL;
        }
        flags
    }
}

/// One bytecode instruction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Instruction {
    opcode: OpCode,
    operand: Option<i64>,
    name: Option<String>,
    module: Option<ModuleRef>,
    flags: InstructionFlags,
}

impl Instruction {
    /// An instruction with no operand.
    pub fn simple(opcode: OpCode) -> Self {
        Self {
            opcode,
            operand: None,
            name: None,
            module: None,
            flags: InstructionFlags::for_opcode(opcode),
        }
    }

    /// An instruction with an integer operand.
    pub fn with_operand(opcode: OpCode, operand: i64) -> Self {
        Self {
            operand: Some(operand),
            ..Self::simple(opcode)
        }
    }

    /// An instruction that refers to a variable by name.
    pub fn named(opcode: OpCode, name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::simple(opcode)
        }
    }

    /// A jump (or leave) with a resolved target address.
    pub fn jump(opcode: OpCode, target: usize) -> Self {
        debug_assert!(opcode.is_jump(), "{opcode} is not a jump");
        Self::with_operand(opcode, target as i64)
    }

    /// A leave out of a protected region, continuing at `target`.
    pub fn leave(target: usize) -> Self {
        Self::jump(OpCode::Leave, target)
    }

    /// A jump (or leave) whose target is the still-unbound label `label`.
    pub fn to_label(opcode: OpCode, label: impl Into<String>) -> Self {
        debug_assert!(opcode.is_jump(), "{opcode} is not a jump");
        Self::named(opcode, label)
    }

    /// A call to a member of an external module.
    pub fn module_call(module: &str, member: &str, arg_count: u8) -> Self {
        Self {
            operand: Some(i64::from(arg_count)),
            name: Some(member.to_string()),
            module: Some(ModuleRef::from_member(module, member)),
            ..Self::simple(OpCode::CallModule)
        }
    }

    /// Mark the produced value as unused.
    pub fn discarding(mut self) -> Self {
        self.flags |= InstructionFlags::DISCARDS_RESULT;
        self
    }

    /// A copy of this jump pointing at `target`, with any label name dropped.
    pub fn retarget(&self, target: usize) -> Self {
        Self {
            operand: Some(target as i64),
            name: None,
            ..self.clone()
        }
    }

    /// A copy of this jump with a different opcode and target.
    ///
    /// Keeps the `DISCARDS_RESULT` flag; jump flags follow the new opcode.
    pub fn with_jump(&self, opcode: OpCode, target: usize) -> Self {
        let keep = self.flags & InstructionFlags::DISCARDS_RESULT;
        Self {
            opcode,
            operand: Some(target as i64),
            name: None,
            module: self.module,
            flags: InstructionFlags::for_opcode(opcode) | keep,
        }
    }

    // ==========================================================================
    // Accessors
    // ==========================================================================

    /// The opcode.
    pub fn opcode(&self) -> OpCode {
        self.opcode
    }

    /// The integer operand, if any.
    pub fn operand(&self) -> Option<i64> {
        self.operand
    }

    /// The symbolic name, if any.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The external module reference, if any.
    pub fn module(&self) -> Option<ModuleRef> {
        self.module
    }

    /// The classification flags.
    pub fn flags(&self) -> InstructionFlags {
        self.flags
    }

    /// Whether this is a jump or leave.
    pub fn is_jump(&self) -> bool {
        self.flags.contains(InstructionFlags::JUMP)
    }

    /// Whether this is a conditional jump.
    pub fn is_conditional_jump(&self) -> bool {
        self.flags.contains(InstructionFlags::CONDITIONAL)
    }

    /// Whether this is a plain unconditional jump.
    pub fn is_unconditional_jump(&self) -> bool {
        self.opcode.is_unconditional_jump()
    }

    /// Whether the produced value is unused.
    pub fn discards_result(&self) -> bool {
        self.flags.contains(InstructionFlags::DISCARDS_RESULT)
    }

    /// The target of a resolved jump.
    ///
    /// `None` for non-jumps, for jumps still waiting on a label, and for
    /// negative operands.
    pub fn target(&self) -> Option<usize> {
        if !self.is_jump() {
            return None;
        }
        self.operand.and_then(|t| usize::try_from(t).ok())
    }

    /// The label a jump is still waiting on.
    pub fn pending_label(&self) -> Option<&str> {
        if self.is_jump() && self.operand.is_none() {
            self.name()
        } else {
            None
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.opcode.name())?;
        if self.is_jump() {
            match (self.operand, self.name()) {
                (Some(target), _) => write!(f, " -> {target}")?,
                (None, Some(label)) => write!(f, " -> @{label}")?,
                (None, None) => write!(f, " -> ?")?,
            }
        } else {
            if let Some(operand) = self.operand {
                write!(f, " {operand}")?;
            }
            if let Some(name) = self.name() {
                write!(f, " {name}")?;
            }
        }
        if let Some(module) = self.module {
            write!(f, " [{module}]")?;
        }
        if self.discards_result() {
            write!(f, " (discard)")?;
        }
        Ok(())
    }
}
