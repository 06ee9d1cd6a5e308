//! Code generation options.

use crate::temps::DEFAULT_TEMP_PREFIX;

/// Settings shared by every function generated through one arena.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodegenOptions {
    /// Run the peephole passes when a function is finished.
    pub optimize: bool,
    /// Keep a source position for every instruction.
    pub record_positions: bool,
    /// Prefix of synthesized temporary names.
    pub temp_prefix: String,
}

impl Default for CodegenOptions {
    fn default() -> Self {
        Self {
            optimize: true,
            record_positions: true,
            temp_prefix: DEFAULT_TEMP_PREFIX.to_string(),
        }
    }
}

impl CodegenOptions {
    /// Default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable the peephole passes.
    pub fn with_optimize(mut self, optimize: bool) -> Self {
        self.optimize = optimize;
        self
    }

    /// Enable or disable source positions.
    pub fn with_positions(mut self, record_positions: bool) -> Self {
        self.record_positions = record_positions;
        self
    }

    /// Set the prefix of synthesized temporary names.
    pub fn with_temp_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.temp_prefix = prefix.into();
        self
    }
}
