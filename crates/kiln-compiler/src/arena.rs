//! Arena of compilation targets.
//!
//! Nested functions form a tree: each [`CompilationTarget`] stores the
//! [`TargetId`] of its enclosing function. The arena owns every target of one
//! top-level compilation so cross-function operations (outer-variable
//! propagation, capture lifting) can walk the parent chain by id.
//!
//! A finished or abandoned target stays in the arena as a retired slot that
//! remembers its name and parent; touching it again is an error.

use kiln_core::{Result, StructuralError};
use tracing::trace;

use crate::capture::{Binding, CaptureArgument};
use crate::function::CompiledFunction;
use crate::options::CodegenOptions;
use crate::target::CompilationTarget;

/// Handle to a compilation target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(pub(crate) usize);

impl TargetId {
    /// Index of this target in creation order.
    pub fn index(&self) -> usize {
        self.0
    }
}

#[derive(Debug)]
enum Slot {
    Active(Box<CompilationTarget>),
    Retired {
        name: String,
        parent: Option<TargetId>,
    },
}

/// Owner of every compilation target of one compilation.
#[derive(Debug, Default)]
pub struct TargetArena {
    options: CodegenOptions,
    slots: Vec<Slot>,
}

impl TargetArena {
    /// Create an empty arena.
    pub fn new(options: CodegenOptions) -> Self {
        Self {
            options,
            slots: Vec::new(),
        }
    }

    /// The options applied to every target.
    pub fn options(&self) -> &CodegenOptions {
        &self.options
    }

    /// Start a top-level function.
    pub fn create_root(&mut self, name: &str) -> TargetId {
        self.insert(name, None)
    }

    /// Start a function nested in `parent`.
    pub fn create_child(&mut self, parent: TargetId, name: &str) -> Result<TargetId> {
        self.get(parent)?;
        Ok(self.insert(name, Some(parent)))
    }

    fn insert(&mut self, name: &str, parent: Option<TargetId>) -> TargetId {
        let id = TargetId(self.slots.len());
        let target = CompilationTarget::new(name, id, parent, &self.options);
        self.slots.push(Slot::Active(Box::new(target)));
        trace!(function = name, id = id.0, parent = ?parent.map(|p| p.0), "target created");
        id
    }

    /// Get an active target.
    pub fn get(&self, id: TargetId) -> Result<&CompilationTarget> {
        match self.slots.get(id.0) {
            Some(Slot::Active(target)) => Ok(target.as_ref()),
            Some(Slot::Retired { name, .. }) => {
                Err(StructuralError::TargetFinished { id: id.0 }.in_function(name.as_str()))
            }
            None => Err(unknown(id)),
        }
    }

    /// Get an active target mutably.
    pub fn get_mut(&mut self, id: TargetId) -> Result<&mut CompilationTarget> {
        match self.slots.get_mut(id.0) {
            Some(Slot::Active(target)) => Ok(target.as_mut()),
            Some(Slot::Retired { name, .. }) => {
                Err(StructuralError::TargetFinished { id: id.0 }.in_function(name.as_str()))
            }
            None => Err(unknown(id)),
        }
    }

    /// The enclosing function of `id`, active or not.
    pub fn parent(&self, id: TargetId) -> Option<TargetId> {
        match self.slots.get(id.0)? {
            Slot::Active(target) => target.parent(),
            Slot::Retired { parent, .. } => *parent,
        }
    }

    /// Check if `id` can still be generated into.
    pub fn is_active(&self, id: TargetId) -> bool {
        matches!(self.slots.get(id.0), Some(Slot::Active(_)))
    }

    /// Number of targets ever created.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Check if no target was created.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    // ==========================================================================
    // Cross-Function Operations
    // ==========================================================================

    /// Record that `id` reads `name` from an enclosing function.
    ///
    /// `name` is added to the outer variables of `id` and of every ancestor up
    /// to, but not including, the first one that declares it or already
    /// requires it. Reaching the outermost function without a declaration is
    /// fatal, and in that case no outer-variable set is changed. If `id`
    /// declares `name` itself nothing happens.
    pub fn require_outer_variable(&mut self, id: TargetId, name: &str) -> Result<()> {
        let caller = self.get(id)?;
        if caller.is_declared(name) || caller.outer_variables().contains(name) {
            return Ok(());
        }

        let mut chain = vec![id];
        let mut cursor = caller.parent();
        loop {
            let Some(ancestor_id) = cursor else {
                let function = self.get(id)?.name();
                return Err(StructuralError::UnresolvedOuterVariable {
                    name: name.to_string(),
                }
                .in_function(function));
            };
            let ancestor = self.get(ancestor_id)?;
            if ancestor.is_declared(name) || ancestor.outer_variables().contains(name) {
                break;
            }
            chain.push(ancestor_id);
            cursor = ancestor.parent();
        }

        trace!(variable = name, functions = chain.len(), "outer variable required");
        for target in chain {
            self.get_mut(target)?.add_outer(name);
        }
        Ok(())
    }

    /// Lift every outer variable of `id` not in `keep_by_reference` into a
    /// parameter.
    ///
    /// Returns one argument per lifted variable, in outer-variable order, that
    /// every instantiation of this closure must pass.
    pub fn lift_captures(
        &mut self,
        id: TargetId,
        keep_by_reference: &[&str],
    ) -> Result<Vec<CaptureArgument>> {
        let target = self.get(id)?;
        let enclosing = match target.parent() {
            Some(parent) => Some(self.get(parent)?),
            None => None,
        };

        let arguments: Vec<CaptureArgument> = target
            .outer_variables()
            .iter()
            .filter(|name| !keep_by_reference.contains(name))
            .map(|name| CaptureArgument {
                name: name.to_string(),
                binding: match enclosing {
                    Some(parent) if parent.is_declared(name) => Binding::Local,
                    _ => Binding::Outer,
                },
            })
            .collect();

        let target = self.get_mut(id)?;
        for argument in &arguments {
            target.lift_to_parameter(&argument.name);
        }
        trace!(function = target.name(), lifted = arguments.len(), "captures lifted");
        Ok(arguments)
    }

    // ==========================================================================
    // Finishing
    // ==========================================================================

    /// Optimize and validate `id`, retiring it.
    ///
    /// The target is retired whether or not this succeeds.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn finish(&mut self, id: TargetId) -> Result<CompiledFunction> {
        let target = self.retire(id)?;
        (*target).into_compiled(self.options.optimize)
    }

    /// Retire `id` without producing a function.
    pub fn abandon(&mut self, id: TargetId) -> Result<()> {
        self.retire(id).map(|_| ())
    }

    fn retire(&mut self, id: TargetId) -> Result<Box<CompilationTarget>> {
        let target = self.get(id)?;
        let retired = Slot::Retired {
            name: target.name().to_string(),
            parent: target.parent(),
        };
        match std::mem::replace(&mut self.slots[id.0], retired) {
            Slot::Active(target) => Ok(target),
            Slot::Retired { name, .. } => {
                Err(StructuralError::TargetFinished { id: id.0 }.in_function(name))
            }
        }
    }
}

fn unknown(id: TargetId) -> kiln_core::CodegenError {
    StructuralError::UnknownTarget { id: id.0 }.in_function(format!("#{}", id.0))
}
