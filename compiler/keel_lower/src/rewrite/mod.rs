//! The memoized rewriter core.
//!
//! [`Rewriter`] is the interface every lowering rule is written against.
//! It has two implementations:
//!
//! - [`ModuleRewriter`]: the global context. Owns the output module, the
//!   working copy of the source graph and the caches for every term that
//!   does not depend on function-local state.
//! - [`FunctionRunner`](crate::FunctionRunner): one function body. Keeps
//!   its own caches for function-local terms and hands everything else to
//!   the module rewriter, so global lowerings are shared by all functions.
//!
//! The rules themselves live in [`types`], [`values`] and [`element`] and
//! dispatch with exhaustive matches over [`TermKind`](keel_ir::TermKind).

mod element;
pub(crate) mod types;
pub(crate) mod values;

use rustc_hash::FxHashMap;
use tracing::trace;

use keel_ir::{
    ensure_sufficient_stack, FunctionId, GlobalId, Graph, Module, TermId, TermKind,
};

use crate::{
    LoweredRegister, LoweredType, LoweredValue, LoweredValueMode, LoweringConfig, LoweringError,
    TargetCallback,
};

pub(crate) use types::size_register;
pub(crate) use values::zero_or_undef;

/// Access to the lowering of source terms.
///
/// `'a` is the lifetime of the pass inputs: the source module, the
/// configuration and the target callback.
pub trait Rewriter<'a> {
    /// The global rewriting context.
    fn module(&mut self) -> &mut ModuleRewriter<'a>;

    /// Lower a source type. Repeated calls return the same handle.
    fn rewrite_type(&mut self, ty: TermId) -> Result<LoweredType, LoweringError>;

    /// Lower a source value. Repeated calls return the same handle.
    fn rewrite_value(&mut self, value: TermId) -> Result<LoweredValue, LoweringError>;

    /// Lower a value that must fit in one register.
    fn rewrite_value_register(&mut self, value: TermId) -> Result<LoweredRegister, LoweringError> {
        let lowered = self.rewrite_value(value)?;
        match lowered.mode() {
            LoweredValueMode::Register(register) => Ok(LoweredRegister {
                value: *register,
                global: lowered.global(),
            }),
            LoweredValueMode::Empty => Ok(LoweredRegister {
                value: TermId::EMPTY_VALUE,
                global: true,
            }),
            LoweredValueMode::Split(_) => Err(LoweringError::user(
                "value does not fit in a register on this target",
            )
            .at(value)),
        }
    }

    /// The working copy of the source graph.
    ///
    /// Lowering interns helper terms (unpacked recursive bodies, offset
    /// queries) here; ids of the original source terms stay valid.
    fn source_graph<'s>(&'s mut self) -> &'s mut Graph
    where
        'a: 's,
    {
        &mut self.module().source
    }

    /// The graph of the module being built.
    fn output_graph<'s>(&'s mut self) -> &'s mut Graph
    where
        'a: 's,
    {
        &mut self.module().output.graph
    }

    fn config(&mut self) -> &'a LoweringConfig {
        self.module().config
    }

    fn target(&mut self) -> &'a dyn TargetCallback {
        self.module().target
    }
}

/// The global lowering context of one module.
pub struct ModuleRewriter<'a> {
    source_module: &'a Module,
    source: Graph,
    output: Module,
    config: &'a LoweringConfig,
    target: &'a dyn TargetCallback,
    types: FxHashMap<TermId, LoweredType>,
    values: FxHashMap<TermId, LoweredValue>,
    functions: Vec<Option<FunctionId>>,
    globals: Vec<Option<GlobalId>>,
}

impl<'a> ModuleRewriter<'a> {
    pub fn new(
        source_module: &'a Module,
        config: &'a LoweringConfig,
        target: &'a dyn TargetCallback,
    ) -> Self {
        ModuleRewriter {
            source_module,
            source: source_module.graph.clone(),
            output: Module::new(source_module.name.clone()),
            config,
            target,
            types: FxHashMap::default(),
            values: FxHashMap::default(),
            functions: vec![None; source_module.functions.len()],
            globals: vec![None; source_module.globals.len()],
        }
    }

    /// The module being lowered.
    #[inline]
    pub fn source_module(&self) -> &'a Module {
        self.source_module
    }

    /// The module being built.
    pub fn output(&self) -> &Module {
        &self.output
    }

    pub fn output_mut(&mut self) -> &mut Module {
        &mut self.output
    }

    /// The output function a source function was declared as.
    pub fn lowered_function(&self, source: FunctionId) -> Option<FunctionId> {
        self.functions[source.index()]
    }

    pub fn lowered_global(&self, source: GlobalId) -> Option<GlobalId> {
        self.globals[source.index()]
    }

    pub(crate) fn map_function(&mut self, source: FunctionId, lowered: FunctionId) {
        self.functions[source.index()] = Some(lowered);
    }

    pub(crate) fn map_global(&mut self, source: GlobalId, lowered: GlobalId) {
        self.globals[source.index()] = Some(lowered);
    }

    pub(crate) fn into_output(self) -> Module {
        self.output
    }

    /// Byte pointer to an output function or global.
    fn reference(&mut self, term: TermId) -> Result<LoweredValue, LoweringError> {
        let reference = match *self.source.kind(term) {
            TermKind::FunctionRef(id) => {
                let lowered = self.lowered_function(id).ok_or_else(|| {
                    LoweringError::internal("function referenced before it was declared").at(term)
                })?;
                self.output.function(lowered).reference
            }
            TermKind::GlobalRef(id) => {
                let lowered = self.lowered_global(id).ok_or_else(|| {
                    LoweringError::internal("global referenced before it was declared").at(term)
                })?;
                self.output.global(lowered).reference
            }
            _ => return Err(LoweringError::internal("not a module-level reference").at(term)),
        };
        let ty = self.rewrite_type(TermId::BYTE_PTR)?;
        let pointer = self
            .output
            .graph
            .pointer_cast(reference, TermId::BYTE, None)?;
        Ok(LoweredValue::register(ty, true, pointer))
    }
}

impl<'a> Rewriter<'a> for ModuleRewriter<'a> {
    fn module(&mut self) -> &mut ModuleRewriter<'a> {
        self
    }

    fn rewrite_type(&mut self, ty: TermId) -> Result<LoweredType, LoweringError> {
        if let Some(hit) = self.types.get(&ty) {
            return Ok(hit.clone());
        }
        if !self.source.is_global(ty) {
            return Err(
                LoweringError::internal("function-local type lowered outside a function").at(ty),
            );
        }
        let lowered = ensure_sufficient_stack(|| types::lower_type(self, ty))?;
        trace!(?ty, mode = ?lowered.mode(), "lowered type");
        self.types.insert(ty, lowered.clone());
        Ok(lowered)
    }

    fn rewrite_value(&mut self, value: TermId) -> Result<LoweredValue, LoweringError> {
        if let Some(hit) = self.values.get(&value) {
            return Ok(hit.clone());
        }
        if !self.source.is_global(value) {
            return Err(
                LoweringError::internal("function-local value lowered outside a function")
                    .at(value),
            );
        }
        let lowered = ensure_sufficient_stack(|| values::lower_value(self, value))?;
        self.values.insert(value, lowered.clone());
        Ok(lowered)
    }
}

/// Lower a function or global reference in any context.
pub(crate) fn lower_reference<'a, R: Rewriter<'a> + ?Sized>(
    rw: &mut R,
    term: TermId,
) -> Result<LoweredValue, LoweringError> {
    rw.module().reference(term)
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "tests panic on unexpected construction errors"
)]
mod tests;
