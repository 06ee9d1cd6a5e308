//! Temporary variable names.
//!
//! Temporaries are ordinary function-level variables that the code generator
//! borrows for intermediate values. Released names go on a free list and are
//! handed out again, most recently released first.

use kiln_core::StructuralError;
use rustc_hash::FxHashSet;

/// Default prefix for synthesized temporary names.
pub const DEFAULT_TEMP_PREFIX: &str = "t";

/// Checked-out and reusable temporary names of one function.
#[derive(Debug)]
pub struct TemporaryPool {
    prefix: String,
    next: usize,
    checked_out: FxHashSet<String>,
    free: Vec<String>,
}

impl Default for TemporaryPool {
    fn default() -> Self {
        Self::new(DEFAULT_TEMP_PREFIX)
    }
}

impl TemporaryPool {
    /// Create a pool whose fresh names start with `prefix`.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: 0,
            checked_out: FxHashSet::default(),
            free: Vec::new(),
        }
    }

    /// Check out a name.
    ///
    /// Reuses the most recently released name if there is one. Otherwise a
    /// fresh `{prefix}{n}` is built, skipping every candidate for which
    /// `is_taken` holds.
    pub fn request(&mut self, is_taken: impl Fn(&str) -> bool) -> String {
        let name = match self.free.pop() {
            Some(name) => name,
            None => self.fresh(is_taken),
        };
        self.checked_out.insert(name.clone());
        name
    }

    fn fresh(&mut self, is_taken: impl Fn(&str) -> bool) -> String {
        loop {
            let candidate = format!("{}{}", self.prefix, self.next);
            self.next += 1;
            if !is_taken(&candidate) && !self.checked_out.contains(&candidate) {
                return candidate;
            }
        }
    }

    /// Return a checked-out name for reuse.
    pub fn release(&mut self, name: &str) -> Result<(), StructuralError> {
        self.check_in(name)?;
        self.free.push(name.to_string());
        Ok(())
    }

    /// Stop tracking a checked-out name. It stays declared but is never
    /// handed out again.
    pub fn promote(&mut self, name: &str) -> Result<(), StructuralError> {
        self.check_in(name)
    }

    fn check_in(&mut self, name: &str) -> Result<(), StructuralError> {
        if self.checked_out.remove(name) {
            Ok(())
        } else {
            Err(StructuralError::UnknownTemporary {
                name: name.to_string(),
            })
        }
    }

    /// Check if `name` is currently checked out.
    pub fn is_checked_out(&self, name: &str) -> bool {
        self.checked_out.contains(name)
    }

    /// Number of names currently checked out.
    pub fn checked_out_count(&self) -> usize {
        self.checked_out.len()
    }

    /// Number of released names waiting for reuse.
    pub fn free_count(&self) -> usize {
        self.free.len()
    }
}
