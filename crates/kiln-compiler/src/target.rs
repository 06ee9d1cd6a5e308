//! Per-function compilation state.
//!
//! A [`CompilationTarget`] owns everything that belongs to one function while
//! its code is generated: the emitter (instructions, labels, try blocks,
//! positions, observers), the scope stack, the outer-variable set and the
//! temporary pool. Targets live in a [`TargetArena`](crate::TargetArena) and
//! refer to their enclosing function by id.
//!
//! Errors returned here carry the target's function name.

use kiln_core::{CodegenError, Result, StructuralError};
use tracing::debug;

use crate::arena::TargetId;
use crate::bytecode::{Instruction, OpCode};
use crate::capture::OuterVariables;
use crate::emit::{BytecodeEmitter, ObserverId, RelocationObserver, TryBlockId};
use crate::function::CompiledFunction;
use crate::optimize;
use crate::options::CodegenOptions;
use crate::scope::{ScopeStack, VarKind};
use crate::temps::TemporaryPool;

/// What an identifier refers to from inside a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// A visible local variable, with its slot.
    Local(u32),
    /// A parameter, with its slot.
    Parameter(u32),
    /// An outer variable this function already requires.
    Outer,
    /// Not known to this function.
    Unknown,
}

/// Code generation state of one function.
#[derive(Debug)]
pub struct CompilationTarget {
    name: String,
    id: TargetId,
    parent: Option<TargetId>,
    emitter: BytecodeEmitter,
    scopes: ScopeStack,
    outer: OuterVariables,
    temps: TemporaryPool,
}

impl CompilationTarget {
    pub(crate) fn new(
        name: &str,
        id: TargetId,
        parent: Option<TargetId>,
        options: &CodegenOptions,
    ) -> Self {
        Self {
            name: name.to_string(),
            id,
            parent,
            emitter: BytecodeEmitter::new(options.record_positions),
            scopes: ScopeStack::new(),
            outer: OuterVariables::new(),
            temps: TemporaryPool::new(options.temp_prefix.as_str()),
        }
    }

    fn fail(&self, error: StructuralError) -> CodegenError {
        error.in_function(self.name.as_str())
    }

    /// Function name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// This target's id.
    pub fn id(&self) -> TargetId {
        self.id
    }

    /// The enclosing function, if any.
    pub fn parent(&self) -> Option<TargetId> {
        self.parent
    }

    /// The emitter, for inspection.
    pub fn emitter(&self) -> &BytecodeEmitter {
        &self.emitter
    }

    // ==========================================================================
    // Emission
    // ==========================================================================

    /// Set the source position for subsequently emitted instructions.
    pub fn set_position(&mut self, file: &str, line: u32, col: u32) {
        self.emitter.set_position(file, line, col);
    }

    /// Emit subsequent instructions without a source position.
    pub fn clear_position(&mut self) {
        self.emitter.clear_position();
    }

    /// Append an instruction and return its address.
    pub fn emit(&mut self, instruction: Instruction) -> usize {
        self.emitter.emit(instruction)
    }

    /// Emit an unconditional jump to `label`.
    pub fn emit_jump_to_label(&mut self, label: &str) -> usize {
        self.emitter.emit_jump_to_label(label)
    }

    /// Emit a jump of any kind to `label`.
    pub fn emit_branch_to_label(&mut self, opcode: OpCode, label: &str) -> Result<usize> {
        self.emitter
            .emit_branch_to_label(opcode, label)
            .map_err(|err| self.fail(err))
    }

    /// Emit a jump to a known address.
    pub fn emit_jump(&mut self, opcode: OpCode, target: usize) -> Result<usize> {
        self.emitter
            .emit_jump(opcode, target)
            .map_err(|err| self.fail(err))
    }

    /// Bind `label` to `address`, patching pending jumps.
    pub fn define_label(&mut self, label: &str, address: usize) -> Result<()> {
        self.emitter
            .define_label(label, address)
            .map_err(|err| self.fail(err))
    }

    /// Bind `label` to the next emitted address.
    pub fn define_label_here(&mut self, label: &str) -> Result<usize> {
        self.emitter
            .define_label_here(label)
            .map_err(|err| self.fail(err))
    }

    /// The address `label` is bound to.
    pub fn label_address(&self, label: &str) -> Option<usize> {
        self.emitter.label_address(label)
    }

    /// Address the next emitted instruction will get.
    pub fn current_address(&self) -> usize {
        self.emitter.current_address()
    }

    /// Remove `count` instructions at `index`, relocating everything after.
    pub fn remove_range(&mut self, index: usize, count: usize) -> Result<()> {
        self.emitter
            .remove_range(index, count)
            .map_err(|err| self.fail(err))
    }

    /// Track `address` for `observer` across removals.
    pub fn register_observer(
        &mut self,
        address: usize,
        observer: Box<dyn RelocationObserver>,
    ) -> ObserverId {
        self.emitter.register_observer(address, observer)
    }

    // ==========================================================================
    // Try Blocks
    // ==========================================================================

    /// Open a try block at the next emitted address.
    pub fn begin_try_block(&mut self) -> TryBlockId {
        self.emitter.begin_try_block()
    }

    /// Start the finally clause of `block`.
    pub fn mark_finally(&mut self, block: TryBlockId) -> Result<()> {
        self.emitter
            .mark_finally(block)
            .map_err(|err| self.fail(err))
    }

    /// Start the catch clause of `block`.
    pub fn mark_catch(&mut self, block: TryBlockId) -> Result<()> {
        self.emitter.mark_catch(block).map_err(|err| self.fail(err))
    }

    /// Close `block` after the last emitted instruction.
    pub fn end_try_block(&mut self, block: TryBlockId) -> Result<()> {
        self.emitter
            .end_try_block(block)
            .map_err(|err| self.fail(err))
    }

    // ==========================================================================
    // Scopes
    // ==========================================================================

    /// Open a nested block scope.
    pub fn begin_block(&mut self) {
        self.scopes.push();
    }

    /// Close the innermost block scope.
    pub fn end_block(&mut self) -> Result<()> {
        self.scopes.pop().map_err(|err| self.fail(err))
    }

    /// Close the innermost block scope, which must be at `expected` depth.
    pub fn end_block_checked(&mut self, expected: usize) -> Result<()> {
        self.scopes
            .pop_checked(expected)
            .map_err(|err| self.fail(err))
    }

    /// Current block depth; 0 is the function root.
    pub fn scope_depth(&self) -> usize {
        self.scopes.depth()
    }

    /// Declare a variable in the innermost scope and return its slot.
    pub fn declare_local(&mut self, name: &str) -> u32 {
        self.scopes.declare_local(name)
    }

    /// Declare a parameter and return its slot.
    pub fn declare_parameter(&mut self, name: &str) -> u32 {
        self.scopes.declare_parameter(name)
    }

    /// Check if `name` is declared and visible in this function.
    pub fn is_declared(&self, name: &str) -> bool {
        self.scopes.is_declared(name)
    }

    /// Classify an identifier.
    pub fn resolve(&self, name: &str) -> Resolution {
        match self.scopes.lookup(name) {
            Some(var) if var.kind == VarKind::Parameter => Resolution::Parameter(var.slot),
            Some(var) => Resolution::Local(var.slot),
            None if self.outer.contains(name) => Resolution::Outer,
            None => Resolution::Unknown,
        }
    }

    /// Parameter names in declaration order.
    pub fn parameters(&self) -> &[String] {
        self.scopes.parameters()
    }

    // ==========================================================================
    // Outer Variables
    // ==========================================================================

    /// Names this function reads from enclosing functions.
    pub fn outer_variables(&self) -> &OuterVariables {
        &self.outer
    }

    pub(crate) fn add_outer(&mut self, name: &str) -> bool {
        self.outer.insert(name)
    }

    /// Turn an outer variable into a parameter.
    pub(crate) fn lift_to_parameter(&mut self, name: &str) {
        if self.outer.remove(name) {
            self.scopes.declare_parameter(name);
        }
    }

    // ==========================================================================
    // Temporaries
    // ==========================================================================

    /// Check out a temporary variable, declared in the function's root scope.
    ///
    /// Fresh names never collide with a declared name, a parameter or an
    /// outer variable of this function.
    pub fn request_temporary(&mut self) -> String {
        let (scopes, outer) = (&self.scopes, &self.outer);
        let name = self
            .temps
            .request(|candidate| scopes.ever_declared(candidate) || outer.contains(candidate));
        self.scopes.declare_function_local(&name);
        name
    }

    /// Return a temporary for reuse.
    pub fn release_temporary(&mut self, name: &str) -> Result<()> {
        self.temps.release(name).map_err(|err| self.fail(err))
    }

    /// Keep a temporary as an ordinary variable; it is never reused.
    pub fn promote_temporary(&mut self, name: &str) -> Result<()> {
        self.temps.promote(name).map_err(|err| self.fail(err))
    }

    /// The temporary pool, for inspection.
    pub fn temporaries(&self) -> &TemporaryPool {
        &self.temps
    }

    // ==========================================================================
    // Finishing
    // ==========================================================================

    pub(crate) fn into_compiled(self, optimize: bool) -> Result<CompiledFunction> {
        let name = self.name.clone();
        self.compile(optimize).map_err(|err| err.in_function(name))
    }

    fn compile(mut self, enabled: bool) -> Result<CompiledFunction, StructuralError> {
        if self.scopes.depth() != 0 {
            return Err(StructuralError::ScopeMismatch {
                expected: 0,
                actual: self.scopes.depth(),
            });
        }
        self.emitter.validate_regions()?;

        let stats = optimize::optimize(&mut self.emitter, enabled)?;
        self.emitter.validate_regions()?;

        let code = self.emitter.into_code();
        debug!(
            function = %self.name,
            instructions = code.instructions.len(),
            removed = stats.removed(),
            "function finished"
        );

        Ok(CompiledFunction {
            name: self.name,
            instructions: code.instructions,
            try_blocks: code.try_blocks,
            outer_variables: self.outer.into_names(),
            parameters: self.scopes.parameters().to_vec(),
            frame_size: self.scopes.frame_size(),
            positions: code.positions.persist(),
            stats,
        })
    }
}
