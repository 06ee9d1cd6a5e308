//! Outer variables and capture-by-value arguments.
//!
//! A function's outer variables are the names it uses without declaring
//! them. They are kept in the order they were first required, which is also
//! the order closure-instantiation code passes them in.

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::bytecode::{Instruction, OpCode};

/// Ordered set of outer-variable names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OuterVariables {
    order: Vec<String>,
    members: FxHashSet<String>,
}

impl OuterVariables {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `name`. Returns `false` if it was already present.
    pub fn insert(&mut self, name: &str) -> bool {
        if !self.members.insert(name.to_string()) {
            return false;
        }
        self.order.push(name.to_string());
        true
    }

    /// Remove `name`. Returns `false` if it was not present.
    pub fn remove(&mut self, name: &str) -> bool {
        if !self.members.remove(name) {
            return false;
        }
        self.order.retain(|member| member != name);
        true
    }

    /// Check if `name` is present.
    pub fn contains(&self, name: &str) -> bool {
        self.members.contains(name)
    }

    /// Names in first-requirement order.
    pub fn names(&self) -> &[String] {
        &self.order
    }

    /// Iterate over names in first-requirement order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// Number of outer variables.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Check if there are no outer variables.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Consume the set, returning the names in order.
    pub fn into_names(self) -> Vec<String> {
        self.order
    }
}

/// How the enclosing function reaches a captured variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Binding {
    /// Declared by the enclosing function itself.
    Local,
    /// An outer variable of the enclosing function.
    Outer,
}

/// One extra argument for every instantiation of a closure whose captures
/// were lifted to parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CaptureArgument {
    /// The captured variable.
    pub name: String,
    /// Where the enclosing function finds it.
    pub binding: Binding,
}

impl CaptureArgument {
    /// The instruction that loads this argument in the enclosing function.
    pub fn load(&self) -> Instruction {
        let opcode = match self.binding {
            Binding::Local => OpCode::GetLocal,
            Binding::Outer => OpCode::GetOuter,
        };
        Instruction::named(opcode, self.name.as_str())
    }
}
