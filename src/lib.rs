//! Kiln
//!
//! A bytecode compiler backend for a scripting-language toolchain. A front end
//! walks its syntax tree and calls into Kiln to emit instructions, declare
//! variables, thread outer variables through nested closures and register
//! try blocks. When a function is done Kiln resolves its labels, runs a fixed
//! peephole pipeline and returns a validated [`CompiledFunction`].
//!
//! ```
//! use kiln::prelude::*;
//!
//! let mut arena = TargetArena::new(CodegenOptions::default());
//! let main = arena.create_root("main");
//!
//! let target = arena.get_mut(main)?;
//! target.emit_branch_to_label(OpCode::JumpIfFalse, "else")?;
//! target.emit(Instruction::with_operand(OpCode::PushInt, 1));
//! target.emit_jump_to_label("end");
//! target.define_label_here("else")?;
//! target.emit(Instruction::with_operand(OpCode::PushInt, 2));
//! target.define_label_here("end")?;
//! target.emit(Instruction::simple(OpCode::Return));
//!
//! let function = arena.finish(main)?;
//! assert_eq!(function.instructions.len(), 5);
//! # Ok::<(), kiln::CodegenError>(())
//! ```

pub use kiln_compiler as compiler;

pub use kiln_compiler::{
    CodegenOptions, CompilationTarget, CompiledFunction, TargetArena, TargetId,
};
pub use kiln_core::{CodegenError, RegionViolation, Result, StructuralError};

/// Everything a front end needs to drive code generation.
pub mod prelude {
    pub use kiln_compiler::{
        Binding, CaptureArgument, CodegenOptions, CompilationTarget, CompiledFunction,
        ExceptionRegion, Instruction, OpCode, PersistedPositions, RegionKind,
        RelocationObserver, Resolution, TargetArena, TargetId, TryBlockId,
    };
    pub use kiln_core::{CodegenError, ModuleRef, Span, StructuralError};
}
