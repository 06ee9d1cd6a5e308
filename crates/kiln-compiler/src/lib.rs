//! Kiln Compiler
//!
//! The per-function bytecode backend of Kiln. A front end walks its syntax
//! tree and drives code generation through a [`CompilationTarget`]; when a
//! function is complete, [`TargetArena::finish`] runs the peephole pipeline
//! once and hands back a validated [`CompiledFunction`].
//!
//! ## Architecture
//!
//! ```text
//! TargetArena ── CompilationTarget (one per function, parent by id)
//!                 ├── BytecodeEmitter
//!                 │    ├── InstructionStream
//!                 │    ├── LabelTable        single-pass forward references
//!                 │    ├── ExceptionTable    try/finally/catch boundaries
//!                 │    ├── PositionTable     source positions
//!                 │    └── ObserverRegistry  external address holders
//!                 ├── ScopeStack
//!                 ├── OuterVariables
//!                 └── TemporaryPool
//! ```
//!
//! ## Modules
//!
//! - [`bytecode`]: Opcodes, instructions and the instruction stream
//! - [`emit`]: Emitter, labels, try blocks and the relocation engine
//! - [`optimize`]: The peephole pipeline
//! - [`scope`]: Lexical scope tracking
//! - [`capture`]: Outer variables and capture lifting
//! - [`temps`]: Temporary variable pool
//! - [`positions`]: Source-position table and its persisted form

pub mod arena;
pub mod bytecode;
pub mod capture;
pub mod emit;
pub mod function;
pub mod optimize;
pub mod options;
pub mod positions;
pub mod scope;
pub mod target;
pub mod temps;

pub use arena::{TargetArena, TargetId};
pub use bytecode::{Instruction, InstructionFlags, InstructionStream, OpCode, disassemble};
pub use capture::{Binding, CaptureArgument, OuterVariables};
pub use emit::{
    BytecodeEmitter, ExceptionRegion, ObserverId, RegionKind, RelocationObserver, TryBlock,
    TryBlockId,
};
pub use function::CompiledFunction;
pub use optimize::{OptimizeStats, optimize};
pub use options::CodegenOptions;
pub use positions::{PersistedPositions, PositionEntry, PositionTable};
pub use scope::{LocalVar, ScopeStack, VarKind};
pub use target::{CompilationTarget, Resolution};
pub use temps::TemporaryPool;

// Re-export error types from core for convenience
pub use kiln_core::{CodegenError, RegionViolation, Result, StructuralError};
