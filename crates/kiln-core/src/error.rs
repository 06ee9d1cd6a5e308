//! Error types for the Kiln backend.
//!
//! Every failure the backend can report is a structural (internal consistency)
//! violation. None of them is recoverable: the function being generated is
//! abandoned and the error is handed back to the front end.
//!
//! ## Error Hierarchy
//!
//! ```text
//! CodegenError            - a StructuralError tagged with the function it aborted
//! └── StructuralError     - what went wrong
//!     └── RegionViolation - why an exception region became invalid
//! ```
//!
//! Components that do not know which function they belong to (label tables,
//! scope stacks, temporary pools) return [`StructuralError`]; the compilation
//! target attaches its name with [`StructuralError::in_function`].

use thiserror::Error;

/// Result type for operations that know which function they belong to.
pub type Result<T, E = CodegenError> = std::result::Result<T, E>;

// ============================================================================
// Region Violations
// ============================================================================

/// Why a try-block descriptor failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegionViolation {
    /// The last protected address lies past the end of the instruction stream.
    #[error("end {end} is outside the instruction stream (length {len})")]
    EndOutOfRange { end: usize, len: usize },

    /// Two boundaries appear in the wrong order.
    #[error("{first} at {first_at} comes after {second} at {second_at}")]
    Misordered {
        first: &'static str,
        first_at: usize,
        second: &'static str,
        second_at: usize,
    },

    /// The try block was opened but never closed.
    #[error("try block was never closed")]
    Unterminated,

    /// A finally or catch clause was marked twice, or after the block closed.
    #[error("{clause} clause marked out of sequence")]
    OutOfSequence { clause: &'static str },

    /// A boundary fell inside a removed range and cannot be shifted.
    #[error("{boundary} at {at} was inside the removed range")]
    BoundaryRemoved { boundary: &'static str, at: usize },

    /// The handle does not name a try block of this function.
    #[error("no such try block")]
    UnknownBlock,
}

// ============================================================================
// Structural Errors
// ============================================================================

/// A fatal internal-consistency violation detected during code generation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StructuralError {
    /// A label name was bound twice in the same function.
    #[error("label '{name}' defined twice (bound to {first}, redefined at {second})")]
    DuplicateLabel {
        name: String,
        first: usize,
        second: usize,
    },

    /// A jump still refers to a label that was never defined.
    #[error("label '{name}' referenced at {address} was never defined")]
    UnresolvedLabel { name: String, address: usize },

    /// An exception region is invalid, usually after a relocation.
    #[error("invalid exception region in try block {block}: {violation}")]
    InvalidExceptionRegion {
        block: usize,
        violation: RegionViolation,
    },

    /// Following unconditional jumps from `address` never terminates.
    #[error("infinite loop in unconditional jump sequence starting at {address}")]
    JumpCycle { address: usize },

    /// A conditional jump targets the instruction immediately after it.
    #[error("conditional jump at {address} targets the next instruction")]
    ConditionalJumpToNext { address: usize },

    /// A resolved jump or leave target lies outside the instruction stream.
    #[error("jump at {address} targets {target}, outside the instruction stream (length {len})")]
    JumpTargetOutOfRange {
        address: usize,
        target: i64,
        len: usize,
    },

    /// A removal range extends past the end of the instruction stream.
    #[error("cannot remove {count} instruction(s) at {index}: stream length is {len}")]
    RangeOutOfBounds {
        index: usize,
        count: usize,
        len: usize,
    },

    /// `end_block` was called with only the function's root scope open.
    #[error("cannot close the function's root scope")]
    ScopeUnderflow,

    /// A block was closed at a different depth than the caller expected.
    #[error("scope mismatch: expected to close depth {expected}, current depth is {actual}")]
    ScopeMismatch { expected: usize, actual: usize },

    /// A temporary was released or promoted without being checked out.
    #[error("temporary '{name}' is not checked out")]
    UnknownTemporary { name: String },

    /// An outer-variable requirement reached the root without a declaration.
    #[error("outer variable '{name}' is not declared by any enclosing function")]
    UnresolvedOuterVariable { name: String },

    /// A target handle does not refer to a compilation target.
    #[error("unknown compilation target #{id}")]
    UnknownTarget { id: usize },

    /// A compilation target was used after it was finished or abandoned.
    #[error("compilation target #{id} is already finished")]
    TargetFinished { id: usize },

    /// A label reference was emitted with an opcode that is not a jump.
    #[error("opcode {opcode} at {address} cannot refer to a label")]
    NotAJump { opcode: &'static str, address: usize },

    /// Function metadata could not be serialized.
    #[error("serialization failed: {message}")]
    Serialization { message: String },
}

impl StructuralError {
    /// Attach the name of the function whose generation this error aborts.
    pub fn in_function(self, function: impl Into<String>) -> CodegenError {
        CodegenError {
            function: function.into(),
            error: self,
        }
    }
}

/// A structural error tagged with the function it aborted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("in function '{function}': {error}")]
pub struct CodegenError {
    /// Name of the function whose generation failed.
    pub function: String,
    /// What went wrong.
    #[source]
    pub error: StructuralError,
}

impl CodegenError {
    /// The underlying structural error.
    pub fn kind(&self) -> &StructuralError {
        &self.error
    }
}

// ============================================================================
// Tests
// ============================================================================
