use pretty_assertions::assert_eq;

use keel_ir::{InstKind, Module, TermId};

use super::LoweringPass;
use crate::test_helpers::{builder_at, count, define, i32_ty, instructions, padded_pair, try_lower};
use crate::{
    init_tracing, verify_lowered, ErrorKind, LoweringConfig, SimpleTarget, SysVAmd64Target,
    TargetCallback,
};

/// A small program touching every part of the pass:
///
/// - `nodes`, a global of recursive type `list(i32)`,
/// - `consume`, an external function taking `{ i32, i64 }`,
/// - `make`, returning a zeroed `{ i32, i64 }`,
/// - `size_of`, reading the size of a type parameter,
/// - `main`, passing values between them through the stack.
fn program() -> Module {
    let mut module = Module::new("program");
    let pair = padded_pair(&mut module.graph);

    let graph = &mut module.graph;
    let list = graph.new_recursive("list", &[TermId::METATYPE]).unwrap();
    let element = graph.recursive(list).params[0];
    let self_ty = graph.apply(list, &[element]).unwrap();
    let next = graph.pointer_type(self_ty).unwrap();
    let body = graph.struct_type(&[element, next]).unwrap();
    graph.resolve_recursive(list, body).unwrap();
    let i32_ty = i32_ty(graph);
    let list_i32 = graph.apply(list, &[i32_ty]).unwrap();
    module.declare_global("nodes", list_i32, false).unwrap();

    let consume_ty = module
        .graph
        .function_type(TermId::EMPTY, &[pair], false)
        .unwrap();
    let consume = module.declare_function("consume", consume_ty).unwrap();
    let consume_ref = module.function(consume).reference;

    let zero = module.graph.zero(pair).unwrap();
    let (make, entry) = define(&mut module, "make", &[TermId::BOOL], pair);
    builder_at(&mut module, make, entry).ret(zero).unwrap();
    let make_ref = module.function(make).reference;

    let (size_of, entry) = define(&mut module, "size_of", &[TermId::METATYPE], TermId::SIZE);
    let ty = module.function(size_of).params[0];
    let size = module.graph.metatype_size(ty).unwrap();
    builder_at(&mut module, size_of, entry).ret(size).unwrap();

    let one = module.graph.size_value(1);
    let (main, entry) = define(&mut module, "main", &[], TermId::EMPTY);
    let mut builder = builder_at(&mut module, main, entry);
    let value = builder.call(make_ref, &[TermId::FALSE]).unwrap();
    builder.call(consume_ref, &[value]).unwrap();
    let slot = builder.alloca(pair, None, None).unwrap();
    builder.store(value, slot).unwrap();
    let second = builder.graph().element_ptr(slot, one).unwrap();
    let loaded = builder.load(second).unwrap();
    builder.eval(loaded).unwrap();
    builder.freea(slot).unwrap();
    builder.ret_void().unwrap();
    module
}

fn names(module: &Module) -> Vec<(String, bool)> {
    module
        .function_ids()
        .map(|id| {
            let function = module.function(id);
            (function.name.clone(), function.is_declaration())
        })
        .collect()
}

#[test]
fn lowered_program_satisfies_the_output_contract() {
    let module = program();
    let targets: [&dyn TargetCallback; 2] = [&SimpleTarget, &SysVAmd64Target];
    for target in targets {
        for config in [LoweringConfig::default(), LoweringConfig::all_split()] {
            let lowered = try_lower(&module, target, config.clone())
                .unwrap_or_else(|err| panic!("lowering under {config:?} failed: {err}"));
            verify_lowered(&lowered)
                .unwrap_or_else(|err| panic!("output under {config:?} is invalid: {err}"));
        }
    }
}

#[test]
fn lowering_keeps_names_and_declarations() {
    let module = program();
    let lowered = LoweringPass::new(&SysVAmd64Target)
        .with_config(LoweringConfig::all_split())
        .run(&module)
        .unwrap();

    assert_eq!(lowered.name, module.name);
    assert_eq!(names(&lowered), names(&module));
    assert_eq!(lowered.globals.len(), 1);
    assert_eq!(lowered.globals[0].name, "nodes");
}

#[test]
fn every_stack_allocation_is_freed() {
    let module = program();
    let lowered = LoweringPass::new(&SimpleTarget)
        .with_config(LoweringConfig::all_split())
        .run(&module)
        .unwrap();

    let body = instructions(&lowered, "main");
    let allocas = count(&body, |inst| matches!(inst, InstKind::Alloca { .. }));
    let frees = count(&body, |inst| matches!(inst, InstKind::FreeAlloca(_)));
    assert!(allocas >= 1);
    assert_eq!(allocas, frees);
}

#[test]
fn first_error_aborts_the_pass() {
    let mut module = program();
    let (f, entry) = define(&mut module, "broken", &[TermId::METATYPE], TermId::EMPTY);
    let ty = module.function(f).params[0];
    let mut builder = builder_at(&mut module, f, entry);
    let slot = builder.alloca(ty, None, None).unwrap();
    builder.load(slot).unwrap();
    builder.ret_void().unwrap();

    let err = try_lower(&module, &SysVAmd64Target, LoweringConfig::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::User);
}

#[test]
fn pass_carries_its_configuration() {
    let pass = LoweringPass::new(&SimpleTarget);
    assert_eq!(*pass.config(), LoweringConfig::default());
    let pass = pass.with_config(LoweringConfig::all_split());
    assert!(pass.config().split_structs);
    assert!(pass.config().flatten_globals);
}

#[test]
fn tracing_can_be_initialized_repeatedly() {
    init_tracing();
    init_tracing();
    assert!(try_lower(&program(), &SimpleTarget, LoweringConfig::default()).is_ok());
}
