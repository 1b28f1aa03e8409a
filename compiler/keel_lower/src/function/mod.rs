//! Per-function lowering.
//!
//! A [`FunctionRunner`] rewrites the body of one source function into the
//! output function that [`TargetCallback::lower_function`] declared for it.
//! It layers a function-local cache over the module rewriter: terms that
//! depend on parameters or instruction results are lowered here, and
//! everything else is delegated so global lowerings are shared between
//! functions.
//!
//! # Stack allocations
//!
//! Allocations made by the lowering (temporaries for split and blob values,
//! by-address arguments) and by the source `alloca` instructions are kept
//! on one stack. Freeing an allocation frees everything above it. Blocks
//! are lowered in reverse postorder; each source block starts with the
//! stack its first lowered predecessor jumped with, and every later jump
//! into that block must agree with it.
//!
//! [`TargetCallback::lower_function`]: crate::TargetCallback::lower_function

mod instructions;

use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use keel_ir::{
    ensure_sufficient_stack, BlockId, FunctionBuilder, FunctionId, Module, TermId, TermKind,
};

use crate::rewrite::{types, values};
use crate::{
    LoweredType, LoweredTypeMode, LoweredValue, LoweredValueMode, LoweringError, ModuleRewriter,
    Rewriter,
};

/// Rewriting context for one function body.
pub struct FunctionRunner<'r, 'a> {
    rewriter: &'r mut ModuleRewriter<'a>,
    source_function: FunctionId,
    function: FunctionId,
    /// Output block for each source block, by source block index.
    block_map: Vec<BlockId>,
    current_block: Option<BlockId>,
    alloca_stack: Vec<TermId>,
    /// Stack each source block was first entered with.
    block_stacks: FxHashMap<BlockId, Vec<TermId>>,
    types: FxHashMap<TermId, LoweredType>,
    values: FxHashMap<TermId, LoweredValue>,
    /// Set once a `solidify` has fixed the value of a constant; from then
    /// on global terms may lower differently in this function.
    solidified: bool,
}

impl<'r, 'a> FunctionRunner<'r, 'a> {
    fn new(
        rewriter: &'r mut ModuleRewriter<'a>,
        source_function: FunctionId,
        function: FunctionId,
    ) -> Self {
        FunctionRunner {
            rewriter,
            source_function,
            function,
            block_map: Vec::new(),
            current_block: None,
            alloca_stack: Vec::new(),
            block_stacks: FxHashMap::default(),
            types: FxHashMap::default(),
            values: FxHashMap::default(),
            solidified: false,
        }
    }

    /// Rewrite the body of `source_function` into its declared output
    /// function. Declarations have no body and are left alone.
    pub(crate) fn run(
        rewriter: &'r mut ModuleRewriter<'a>,
        source_function: FunctionId,
    ) -> Result<(), LoweringError> {
        let source = rewriter.source_module().function(source_function);
        if source.is_declaration() {
            return Ok(());
        }
        let function = rewriter.lowered_function(source_function).ok_or_else(|| {
            LoweringError::internal(format!(
                "function `{}` has no output declaration",
                source.name
            ))
        })?;
        debug!(name = %source.name, blocks = source.blocks.len(), "lowering function body");

        let mut runner = FunctionRunner::new(rewriter, source_function, function);
        for _ in source.block_ids() {
            let block = runner.rewriter.output_mut().add_block(function);
            runner.block_map.push(block);
        }

        runner.current_block = runner.block_map.first().copied();
        let target = runner.target();
        target.lower_function_entry(&mut runner)?;

        // Dominators first, so every value and every predecessor's stack is
        // known by the time a block is lowered.
        for block in source.reverse_postorder() {
            runner.switch_to_block(block)?;
            for instruction in &source.block(block).instructions {
                runner.lower_instruction(instruction)?;
            }
        }
        Ok(())
    }

    #[inline]
    pub fn source_module(&self) -> &'a Module {
        self.rewriter.source_module()
    }

    #[inline]
    pub fn source_function(&self) -> FunctionId {
        self.source_function
    }

    /// The output function being built.
    #[inline]
    pub fn function(&self) -> FunctionId {
        self.function
    }

    pub fn rewriter(&mut self) -> &mut ModuleRewriter<'a> {
        self.rewriter
    }

    /// Parameter terms of the source function.
    pub fn source_params(&self) -> &'a [TermId] {
        &self.source_module().function(self.source_function).params
    }

    /// Parameter terms of the output function.
    pub fn params(&self) -> Vec<TermId> {
        self.rewriter.output().function(self.function).params.clone()
    }

    /// An instruction builder positioned at the end of the current output
    /// block.
    pub fn builder(&mut self) -> FunctionBuilder<'_> {
        let mut builder = FunctionBuilder::new(self.rewriter.output_mut(), self.function);
        if let Some(block) = self.current_block {
            builder.position_at_end(block);
        }
        builder
    }

    /// Record the lowering of a function-local source term.
    pub fn add_mapping(&mut self, term: TermId, value: LoweredValue) {
        self.values.insert(term, value);
    }

    fn switch_to_block(&mut self, block: BlockId) -> Result<(), LoweringError> {
        self.current_block = Some(self.mapped_block(block)?);
        // Only the entry and unreachable blocks have no lowered predecessor;
        // they start with an empty stack.
        let stack = self.block_stacks.entry(block).or_default();
        self.alloca_stack.clone_from(stack);
        Ok(())
    }

    fn mapped_block(&self, block: BlockId) -> Result<BlockId, LoweringError> {
        self.block_map
            .get(block.index())
            .copied()
            .ok_or_else(|| LoweringError::internal(format!("branch to unknown block {block:?}")))
    }

    /// Bring the alloca stack into the state expected by every block in
    /// `targets` and return their output blocks.
    ///
    /// Allocations live at the jump but not at a target that was already
    /// entered are freed before the jump.
    fn prepare_jump(&mut self, targets: &[BlockId]) -> Result<Vec<BlockId>, LoweringError> {
        let mut depth = self.alloca_stack.len();
        for target in targets {
            if let Some(expected) = self.block_stacks.get(target) {
                if !self.alloca_stack.starts_with(expected) {
                    return Err(LoweringError::user(
                        "stack allocations differ between predecessors of a block",
                    ));
                }
                depth = depth.min(expected.len());
            }
        }
        for target in targets {
            if let Some(expected) = self.block_stacks.get(target) {
                if expected.len() != depth {
                    return Err(LoweringError::user(
                        "branch targets expect different stack allocations",
                    ));
                }
            }
        }
        self.alloca_free_from(depth)?;
        for &target in targets {
            self.block_stacks
                .entry(target)
                .or_insert_with(|| self.alloca_stack.clone());
        }
        targets.iter().map(|&target| self.mapped_block(target)).collect()
    }

    // ── Stack allocation ────────────────────────────────────────────

    /// Allocate stack storage for a value of type `ty` and push it on the
    /// alloca stack. Returns the allocation's own pointer.
    pub fn alloca_type(&mut self, ty: &LoweredType) -> Result<TermId, LoweringError> {
        let pointer = match ty.register_type() {
            Some(register_type) => self.builder().alloca(register_type, None, None)?,
            None => {
                self.builder()
                    .alloca(TermId::BYTE, Some(ty.size()), Some(ty.alignment()))?
            }
        };
        self.alloca_stack.push(pointer);
        Ok(pointer)
    }

    /// Record an allocation emitted directly through the builder.
    pub(crate) fn push_alloca(&mut self, pointer: TermId) {
        self.alloca_stack.push(pointer);
    }

    /// Free `pointer` and every allocation above it, or the whole stack
    /// when `pointer` is `None`.
    pub fn alloca_free(&mut self, pointer: Option<TermId>) -> Result<(), LoweringError> {
        let depth = match pointer {
            None => 0,
            Some(pointer) => self
                .alloca_stack
                .iter()
                .rposition(|&live| live == pointer)
                .ok_or_else(|| {
                    LoweringError::user("freea of a pointer that is not a live stack allocation")
                })?,
        };
        self.alloca_free_from(depth)
    }

    #[inline]
    pub fn alloca_depth(&self) -> usize {
        self.alloca_stack.len()
    }

    /// Free every allocation at stack position `depth` or above.
    pub fn alloca_free_from(&mut self, depth: usize) -> Result<(), LoweringError> {
        let Some(&bottom) = self.alloca_stack.get(depth) else {
            return Ok(());
        };
        self.builder().freea(bottom)?;
        self.alloca_stack.truncate(depth);
        Ok(())
    }

    // ── Memory movement ─────────────────────────────────────────────

    /// Load a value of type `ty` from `pointer`.
    pub fn load_value(
        &mut self,
        ty: &LoweredType,
        pointer: TermId,
    ) -> Result<LoweredValue, LoweringError> {
        match ty.mode() {
            LoweredTypeMode::Register(register_type) => {
                let typed = self
                    .output_graph()
                    .pointer_cast(pointer, *register_type, None)?;
                let value = self.builder().load(typed)?;
                Ok(LoweredValue::register(ty.clone(), false, value))
            }
            LoweredTypeMode::Split(entries) => {
                let base = self.output_graph().pointer_cast(pointer, TermId::BYTE, None)?;
                let mut offset = self.output_graph().size_value(0);
                let mut loaded = Vec::with_capacity(entries.len());
                for entry in entries {
                    let output = self.output_graph();
                    offset = output.align_to(offset, entry.alignment())?;
                    let entry_ptr = output.pointer_offset(base, offset)?;
                    loaded.push(self.load_value(entry, entry_ptr)?);
                    offset = self.output_graph().add(offset, entry.size())?;
                }
                Ok(LoweredValue::split(ty.clone(), loaded))
            }
            LoweredTypeMode::Blob => Err(LoweringError::user(
                "cannot load a value of unknown layout into registers",
            )),
        }
    }

    /// Store `value` to `pointer`.
    pub fn store_value(&mut self, value: &LoweredValue, pointer: TermId) -> Result<(), LoweringError> {
        match value.mode() {
            LoweredValueMode::Empty => Ok(()),
            LoweredValueMode::Register(register) => {
                let output = self.output_graph();
                let register_type = output.type_of(*register);
                let typed = output.pointer_cast(pointer, register_type, None)?;
                self.builder().store(*register, typed)?;
                Ok(())
            }
            LoweredValueMode::Split(entries) => {
                let base = self.output_graph().pointer_cast(pointer, TermId::BYTE, None)?;
                let mut offset = self.output_graph().size_value(0);
                for entry in entries {
                    let output = self.output_graph();
                    offset = output.align_to(offset, entry.ty().alignment())?;
                    let entry_ptr = output.pointer_offset(base, offset)?;
                    self.store_value(entry, entry_ptr)?;
                    offset = self.output_graph().add(offset, entry.ty().size())?;
                }
                Ok(())
            }
        }
    }

    /// Emit an `eval` of every register in `value`.
    fn eval_value(&mut self, value: &LoweredValue) -> Result<(), LoweringError> {
        match value.mode() {
            LoweredValueMode::Empty => Ok(()),
            LoweredValueMode::Register(register) => {
                self.builder().eval(*register)?;
                Ok(())
            }
            LoweredValueMode::Split(entries) => {
                entries.iter().try_for_each(|entry| self.eval_value(entry))
            }
        }
    }

    /// The output pointer an allocation was made with, looking through the
    /// byte-pointer cast applied to allocation results.
    fn allocation_pointer(&mut self, pointer: TermId) -> TermId {
        match *self.output_graph().kind(pointer) {
            TermKind::PointerCast { pointer, .. } => pointer,
            _ => pointer,
        }
    }

    /// Whether `term` may be served from the module-wide caches.
    fn shares_global_lowering(&mut self, term: TermId) -> bool {
        !self.solidified && self.rewriter.source_graph().is_global(term)
    }
}

impl<'a> Rewriter<'a> for FunctionRunner<'_, 'a> {
    fn module(&mut self) -> &mut ModuleRewriter<'a> {
        self.rewriter
    }

    fn rewrite_type(&mut self, ty: TermId) -> Result<LoweredType, LoweringError> {
        if let Some(hit) = self.types.get(&ty) {
            return Ok(hit.clone());
        }
        if self.shares_global_lowering(ty) {
            return self.rewriter.rewrite_type(ty);
        }
        let lowered = ensure_sufficient_stack(|| types::lower_type(self, ty))?;
        trace!(?ty, mode = ?lowered.mode(), "lowered function-local type");
        self.types.insert(ty, lowered.clone());
        Ok(lowered)
    }

    fn rewrite_value(&mut self, value: TermId) -> Result<LoweredValue, LoweringError> {
        if let Some(hit) = self.values.get(&value) {
            return Ok(hit.clone());
        }
        if self.shares_global_lowering(value) {
            return self.rewriter.rewrite_value(value);
        }
        let lowered = ensure_sufficient_stack(|| values::lower_value(self, value))?;
        self.values.insert(value, lowered.clone());
        Ok(lowered)
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "tests panic on unexpected construction errors"
)]
