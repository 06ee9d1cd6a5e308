//! Kiln Core
//!
//! Types shared by every stage of the Kiln backend:
//!
//! - [`error`]: structural error types reported by the code generator
//! - [`span`]: line/column source locations
//! - [`module_ref`]: deterministic identities for external module references

pub mod error;
pub mod module_ref;
pub mod span;

pub use error::{CodegenError, RegionViolation, Result, StructuralError};
pub use module_ref::ModuleRef;
pub use span::Span;
