//! Bytecode operation codes.
//!
//! This module defines the instruction set emitted by the backend. Operands are
//! not encoded inline: each [`Instruction`](super::Instruction) carries its
//! operand, symbolic name and module reference as separate fields.

use num_enum::TryFromPrimitive;

/// Bytecode operation codes.
///
/// The VM is a stack-based machine. Most operations pop operands
/// from the stack and push results back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive)]
#[repr(u8)]
pub enum OpCode {
    // =========================================================================
    // Placeholders
    // =========================================================================
    /// Does nothing. Anchors degenerate exception regions and is never
    /// removed by the optimizer.
    Nop = 0,

    // =========================================================================
    // Constants
    // =========================================================================
    /// Push the integer operand.
    PushInt,
    /// Push a constant from the module pool.
    /// Operand: constant index
    PushConst,
    /// Push the null value.
    PushNull,
    /// Push boolean true.
    PushTrue,
    /// Push boolean false.
    PushFalse,

    // =========================================================================
    // Stack Operations
    // =========================================================================
    /// Pop top of stack.
    Pop,
    /// Duplicate top of stack.
    Dup,
    /// Swap the two topmost values.
    Swap,

    // =========================================================================
    // Variables
    // =========================================================================
    /// Load a local slot.
    /// Operand: slot index
    GetLocal,
    /// Store to a local slot.
    /// Operand: slot index
    SetLocal,
    /// Load a variable by name.
    /// Name: variable identifier
    GetVar,
    /// Store to a variable by name.
    /// Name: variable identifier
    SetVar,
    /// Load a variable supplied by an enclosing function.
    /// Name: variable identifier
    GetOuter,
    /// Store to a variable supplied by an enclosing function.
    /// Name: variable identifier
    SetOuter,

    // =========================================================================
    // Arithmetic
    // =========================================================================
    /// Add two values.
    Add,
    /// Subtract two values.
    Sub,
    /// Multiply two values.
    Mul,
    /// Divide two values.
    Div,
    /// Remainder of two values.
    Mod,
    /// Negate a value.
    Neg,

    // =========================================================================
    // Comparison & Logic
    // =========================================================================
    /// Equal.
    Eq,
    /// Not equal.
    Ne,
    /// Less than.
    Lt,
    /// Less than or equal.
    Le,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    Ge,
    /// Logical not.
    Not,

    // =========================================================================
    // Control Flow
    // =========================================================================
    /// Unconditional jump.
    /// Operand: absolute target address
    Jump,
    /// Pop a value, jump if it is true.
    /// Operand: absolute target address
    JumpIfTrue,
    /// Pop a value, jump if it is false.
    /// Operand: absolute target address
    JumpIfFalse,
    /// Pop a value, jump if it is null.
    /// Operand: absolute target address
    JumpIfNull,
    /// Pop a value, jump if it is not null.
    /// Operand: absolute target address
    JumpIfNotNull,
    /// Leave the enclosing try block(s), running finally clauses, then jump.
    /// Operand: absolute target address
    Leave,

    // =========================================================================
    // Exceptions
    // =========================================================================
    /// Throw the value on top of the stack.
    Throw,
    /// End of a finally clause - resume the pending leave or rethrow.
    EndFinally,

    // =========================================================================
    // Calls & Closures
    // =========================================================================
    /// Call a function value.
    /// Operand: argument count
    Call,
    /// Call a member of an external module.
    /// Operand: argument count, Name: member, Module: module reference
    CallModule,
    /// Instantiate a closure over a nested function.
    /// Operand: number of capture arguments, Name: nested function
    MakeClosure,
    /// Return the value on top of the stack.
    Return,
    /// Return from a function without a value.
    ReturnVoid,
}

impl OpCode {
    /// Convert from u8, returning None for invalid values.
    pub fn from_u8(value: u8) -> Option<Self> {
        OpCode::try_from(value).ok()
    }

    /// Whether this opcode transfers control to its operand address.
    ///
    /// Includes [`OpCode::Leave`], which jumps after unwinding try blocks.
    pub fn is_jump(&self) -> bool {
        matches!(
            self,
            OpCode::Jump
                | OpCode::JumpIfTrue
                | OpCode::JumpIfFalse
                | OpCode::JumpIfNull
                | OpCode::JumpIfNotNull
                | OpCode::Leave
        )
    }

    /// Whether this opcode is a jump that may fall through.
    pub fn is_conditional_jump(&self) -> bool {
        matches!(
            self,
            OpCode::JumpIfTrue | OpCode::JumpIfFalse | OpCode::JumpIfNull | OpCode::JumpIfNotNull
        )
    }

    /// Whether this opcode is a plain unconditional jump.
    ///
    /// [`OpCode::Leave`] is not: it has unwinding side effects.
    pub fn is_unconditional_jump(&self) -> bool {
        matches!(self, OpCode::Jump)
    }

    /// The conditional jump taken in exactly the opposite case.
    pub fn inverted(&self) -> Option<OpCode> {
        match self {
            OpCode::JumpIfTrue => Some(OpCode::JumpIfFalse),
            OpCode::JumpIfFalse => Some(OpCode::JumpIfTrue),
            OpCode::JumpIfNull => Some(OpCode::JumpIfNotNull),
            OpCode::JumpIfNotNull => Some(OpCode::JumpIfNull),
            _ => None,
        }
    }

    /// Get the opcode name for disassembly.
    pub fn name(&self) -> &'static str {
        match self {
            OpCode::Nop => "NOP",
            OpCode::PushInt => "PUSH_INT",
            OpCode::PushConst => "PUSH_CONST",
            OpCode::PushNull => "PUSH_NULL",
            OpCode::PushTrue => "PUSH_TRUE",
            OpCode::PushFalse => "PUSH_FALSE",
            OpCode::Pop => "POP",
            OpCode::Dup => "DUP",
            OpCode::Swap => "SWAP",
            OpCode::GetLocal => "GET_LOCAL",
            OpCode::SetLocal => "SET_LOCAL",
            OpCode::GetVar => "GET_VAR",
            OpCode::SetVar => "SET_VAR",
            OpCode::GetOuter => "GET_OUTER",
            OpCode::SetOuter => "SET_OUTER",
            OpCode::Add => "ADD",
            OpCode::Sub => "SUB",
            OpCode::Mul => "MUL",
            OpCode::Div => "DIV",
            OpCode::Mod => "MOD",
            OpCode::Neg => "NEG",
            OpCode::Eq => "EQ",
            OpCode::Ne => "NE",
            OpCode::Lt => "LT",
            OpCode::Le => "LE",
            OpCode::Gt => "GT",
            OpCode::Ge => "GE",
            OpCode::Not => "NOT",
            OpCode::Jump => "JUMP",
            OpCode::JumpIfTrue => "JUMP_IF_TRUE",
            OpCode::JumpIfFalse => "JUMP_IF_FALSE",
            OpCode::JumpIfNull => "JUMP_IF_NULL",
            OpCode::JumpIfNotNull => "JUMP_IF_NOT_NULL",
            OpCode::Leave => "LEAVE",
            OpCode::Throw => "THROW",
            OpCode::EndFinally => "END_FINALLY",
            OpCode::Call => "CALL",
            OpCode::CallModule => "CALL_MODULE",
            OpCode::MakeClosure => "MAKE_CLOSURE",
            OpCode::Return => "RETURN",
            OpCode::ReturnVoid => "RETURN_VOID",
        }
    }
}

impl std::fmt::Display for OpCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_repr() {
        assert_eq!(OpCode::Nop as u8, 0);
        assert_eq!(OpCode::PushInt as u8, 1);
    }

    #[test]
    fn opcode_from_u8() {
        assert_eq!(OpCode::from_u8(0), Some(OpCode::Nop));
        assert_eq!(OpCode::from_u8(OpCode::Jump as u8), Some(OpCode::Jump));
        assert_eq!(OpCode::from_u8(OpCode::ReturnVoid as u8 + 1), None);
        assert_eq!(OpCode::from_u8(255), None);
    }

    #[test]
    fn opcode_name() {
        assert_eq!(OpCode::Nop.name(), "NOP");
        assert_eq!(OpCode::JumpIfFalse.name(), "JUMP_IF_FALSE");
        assert_eq!(OpCode::CallModule.to_string(), "CALL_MODULE");
    }

    #[test]
    fn jump_classification() {
        assert!(OpCode::Jump.is_jump());
        assert!(OpCode::Jump.is_unconditional_jump());
        assert!(!OpCode::Jump.is_conditional_jump());

        assert!(OpCode::JumpIfTrue.is_jump());
        assert!(OpCode::JumpIfTrue.is_conditional_jump());
        assert!(!OpCode::JumpIfTrue.is_unconditional_jump());

        // Leave is a jump but never treated as a plain unconditional one
        assert!(OpCode::Leave.is_jump());
        assert!(!OpCode::Leave.is_unconditional_jump());
        assert!(!OpCode::Leave.is_conditional_jump());

        assert!(!OpCode::Nop.is_jump());
        assert!(!OpCode::Return.is_jump());
    }

    #[test]
    fn inversion_is_symmetric() {
        for op in [
            OpCode::JumpIfTrue,
            OpCode::JumpIfFalse,
            OpCode::JumpIfNull,
            OpCode::JumpIfNotNull,
        ] {
            let inverted = op.inverted().unwrap();
            assert_ne!(inverted, op);
            assert_eq!(inverted.inverted(), Some(op));
        }
        assert_eq!(OpCode::Jump.inverted(), None);
        assert_eq!(OpCode::Leave.inverted(), None);
    }
}
