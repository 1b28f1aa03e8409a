//! Shared test utilities for the lowering tests.
//!
//! Factory functions for source modules and a few queries over lowered
//! output. Only compiled in test builds.

use keel_ir::{
    BlockId, FunctionBuilder, FunctionId, Graph, InstKind, IntWidth, Module, TermId,
};

use crate::{LoweringConfig, LoweringError, LoweringPass, TargetCallback};

pub(crate) fn i32_ty(graph: &mut Graph) -> TermId {
    graph.int_type(IntWidth::I32, true)
}

pub(crate) fn i64_ty(graph: &mut Graph) -> TermId {
    graph.int_type(IntWidth::I64, true)
}

pub(crate) fn i32_value(graph: &mut Graph, value: u32) -> TermId {
    graph.int_value(IntWidth::I32, true, u128::from(value))
}

/// `struct { i32, i64 }`: two members with padding between them.
pub(crate) fn padded_pair(graph: &mut Graph) -> TermId {
    let a = i32_ty(graph);
    let b = i64_ty(graph);
    graph.struct_type(&[a, b]).unwrap()
}

/// Declare `name(params) -> result` and give it an entry block.
pub(crate) fn define(
    module: &mut Module,
    name: &str,
    params: &[TermId],
    result: TermId,
) -> (FunctionId, BlockId) {
    let fn_ty = module.graph.function_type(result, params, false).unwrap();
    let function = module.declare_function(name, fn_ty).unwrap();
    let entry = module.add_block(function);
    (function, entry)
}

/// A builder positioned at the end of `block`.
pub(crate) fn builder_at(
    module: &mut Module,
    function: FunctionId,
    block: BlockId,
) -> FunctionBuilder<'_> {
    let mut builder = FunctionBuilder::new(module, function);
    builder.position_at_end(block);
    builder
}

pub(crate) fn try_lower(
    module: &Module,
    target: &dyn TargetCallback,
    config: LoweringConfig,
) -> Result<Module, LoweringError> {
    LoweringPass::new(target).with_config(config).run(module)
}

pub(crate) fn lower(module: &Module, target: &dyn TargetCallback, config: LoweringConfig) -> Module {
    try_lower(module, target, config).unwrap()
}

/// Every instruction of output function `name`, in layout order.
pub(crate) fn instructions<'m>(module: &'m Module, name: &str) -> Vec<&'m InstKind> {
    let function = module.function(module.function_by_name(name).unwrap());
    function
        .blocks
        .iter()
        .flat_map(|block| block.instructions.iter().map(|inst| &inst.kind))
        .collect()
}

pub(crate) fn count(insts: &[&InstKind], pred: impl Fn(&InstKind) -> bool) -> usize {
    insts.iter().filter(|inst| pred(inst)).count()
}
