//! Lexical scope tracking for the function being generated.
//!
//! [`ScopeStack`] tracks which names are visible at the current point of code
//! generation. It handles:
//! - Variable declaration with stack slot allocation
//! - Nested block scopes (if/while/for bodies) in strict stack order
//! - Shadowing, with the outer variable restored when the block closes
//! - Parameters, including captures promoted to parameters
//!
//! The function's root scope (depth 0) is never closed.

use kiln_core::StructuralError;
use rustc_hash::{FxHashMap, FxHashSet};

// ============================================================================
// Types
// ============================================================================

/// How a name was declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VarKind {
    /// Declared in a block.
    Local,
    /// A parameter of the function.
    Parameter,
}

/// A declared variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalVar {
    /// Variable name
    pub name: String,
    /// Stack slot index
    pub slot: u32,
    /// Scope depth where declared
    pub depth: usize,
    /// Local or parameter
    pub kind: VarKind,
}

// ============================================================================
// ScopeStack
// ============================================================================

/// Scope state of one function.
#[derive(Debug, Default)]
pub struct ScopeStack {
    /// Visible variables by name
    variables: FxHashMap<String, LocalVar>,

    /// Current depth (0 = function root)
    depth: usize,

    /// Variables hidden by a deeper declaration, with the depth that hid them
    shadowed: Vec<(usize, LocalVar)>,

    /// Parameters in declaration order
    parameters: Vec<String>,

    /// Every name ever declared, visible or not
    all_names: FxHashSet<String>,

    /// Next available stack slot
    next_slot: u32,
}

impl ScopeStack {
    /// Create a stack holding only the function's root scope.
    pub fn new() -> Self {
        Self::default()
    }

    // ==========================================================================
    // Scope Management
    // ==========================================================================

    /// Open a nested block scope.
    pub fn push(&mut self) {
        self.depth += 1;
    }

    /// Close the innermost block scope.
    pub fn pop(&mut self) -> Result<(), StructuralError> {
        if self.depth == 0 {
            return Err(StructuralError::ScopeUnderflow);
        }

        let depth = self.depth;
        self.variables.retain(|_, var| var.depth < depth);
        while let Some((hidden_at, _)) = self.shadowed.last() {
            if *hidden_at != depth {
                break;
            }
            if let Some((_, var)) = self.shadowed.pop() {
                self.variables.insert(var.name.clone(), var);
            }
        }

        self.depth -= 1;
        Ok(())
    }

    /// Close the innermost block, which the caller expects to be at `expected`.
    pub fn pop_checked(&mut self, expected: usize) -> Result<(), StructuralError> {
        if self.depth != expected {
            return Err(StructuralError::ScopeMismatch {
                expected,
                actual: self.depth,
            });
        }
        self.pop()
    }

    /// Current depth; 0 is the function root.
    pub fn depth(&self) -> usize {
        self.depth
    }

    // ==========================================================================
    // Declaration
    // ==========================================================================

    /// Declare `name` in the innermost scope and return its slot.
    ///
    /// Redeclaring a name in the same scope returns the existing slot. A
    /// parameter redeclared at the root stays a parameter.
    pub fn declare_local(&mut self, name: &str) -> u32 {
        self.declare_at(name, self.depth, VarKind::Local)
    }

    /// Declare `name` in the function's root scope.
    pub fn declare_function_local(&mut self, name: &str) -> u32 {
        self.declare_at(name, 0, VarKind::Local)
    }

    /// Declare a parameter. Parameters keep their declaration order.
    pub fn declare_parameter(&mut self, name: &str) -> u32 {
        if let Some(var) = self.variables.get(name)
            && var.kind == VarKind::Parameter
        {
            return var.slot;
        }
        self.parameters.push(name.to_string());
        self.declare_at(name, 0, VarKind::Parameter)
    }

    fn declare_at(&mut self, name: &str, depth: usize, kind: VarKind) -> u32 {
        if let Some(existing) = self.variables.get(name) {
            if existing.depth == depth
                && (existing.kind == kind || existing.kind == VarKind::Parameter)
            {
                return existing.slot;
            }
            // Shadowing: restore the hidden variable when this depth closes
            if existing.depth < depth {
                self.shadowed.push((depth, existing.clone()));
            }
        }

        let slot = self.next_slot;
        self.next_slot += 1;
        self.all_names.insert(name.to_string());
        self.variables.insert(
            name.to_string(),
            LocalVar {
                name: name.to_string(),
                slot,
                depth,
                kind,
            },
        );
        slot
    }

    // ==========================================================================
    // Lookup
    // ==========================================================================

    /// Look up a visible variable.
    pub fn lookup(&self, name: &str) -> Option<&LocalVar> {
        self.variables.get(name)
    }

    /// Check if `name` is visible from the innermost scope.
    pub fn is_declared(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    /// Check if `name` was declared anywhere in this function, even in a
    /// block that has since closed.
    pub fn ever_declared(&self, name: &str) -> bool {
        self.all_names.contains(name)
    }

    /// Parameter names in declaration order.
    pub fn parameters(&self) -> &[String] {
        &self.parameters
    }

    /// Number of stack slots allocated.
    pub fn frame_size(&self) -> u32 {
        self.next_slot
    }
}

// ============================================================================
// Tests
// ============================================================================
