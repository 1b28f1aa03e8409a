use pretty_assertions::assert_eq;

use super::*;
use crate::{FunctionBuilder, IntWidth};

fn module_with_function(params: &[TermId], result: TermId) -> (Module, FunctionId) {
    let mut module = Module::new("test");
    let fn_ty = module.graph.function_type(result, params, false).unwrap();
    let f = module.declare_function("f", fn_ty).unwrap();
    (module, f)
}

#[test]
fn declared_function_has_typed_parameters() {
    let (module, f) = module_with_function(&[TermId::BOOL, TermId::SIZE], TermId::EMPTY);
    let func = module.function(f);
    assert!(func.is_declaration());
    assert_eq!(func.params.len(), 2);
    assert_eq!(module.graph.type_of(func.params[0]), TermId::BOOL);
    assert_eq!(module.graph.type_of(func.params[1]), TermId::SIZE);
    assert_eq!(module.graph.pointer_target(func.reference), Some(func.ty));
    assert!(!module.graph.is_global(func.params[0]));
    assert!(module.graph.is_global(func.reference));
}

#[test]
fn declare_function_rejects_non_function_type() {
    let mut module = Module::new("test");
    let err = module.declare_function("f", TermId::BOOL).unwrap_err();
    assert_eq!(err, IrError::NotAFunction(TermId::BOOL));
}

#[test]
fn instruction_results_are_typed() {
    let (mut module, f) = module_with_function(&[], TermId::EMPTY);
    let mut builder = FunctionBuilder::new(&mut module, f);
    let entry = builder.new_block();
    builder.position_at_end(entry);

    let i32_ty = builder.graph().int_type(IntWidth::I32, true);
    let slot = builder.alloca(i32_ty, None, None).unwrap();
    let loaded = builder.load(slot).unwrap();
    let stored = builder.store(loaded, slot).unwrap();
    builder.ret_void().unwrap();

    let graph = &module.graph;
    assert_eq!(graph.pointer_target(slot), Some(i32_ty));
    assert_eq!(graph.type_of(loaded), i32_ty);
    assert_eq!(graph.type_of(stored), TermId::EMPTY);
    assert_eq!(module.function(f).blocks[0].instructions.len(), 4);
}

#[test]
fn store_checks_pointee_type() {
    let (mut module, f) = module_with_function(&[], TermId::EMPTY);
    let mut builder = FunctionBuilder::new(&mut module, f);
    let entry = builder.new_block();
    builder.position_at_end(entry);
    let slot = builder.alloca(TermId::SIZE, None, None).unwrap();
    let err = builder.store(TermId::TRUE, slot).unwrap_err();
    assert_eq!(
        err,
        IrError::TypeMismatch {
            expected: TermId::SIZE,
            found: TermId::BOOL
        }
    );
}

#[test]
fn call_checks_arguments() {
    let (mut module, f) = module_with_function(&[TermId::BOOL], TermId::SIZE);
    let target = module.function(f).reference;
    let mut builder = FunctionBuilder::new(&mut module, f);
    let entry = builder.new_block();
    builder.position_at_end(entry);

    let result = builder.call(target, &[TermId::TRUE]).unwrap();
    assert_eq!(builder.graph().type_of(result), TermId::SIZE);

    let err = builder.call(target, &[]).unwrap_err();
    assert_eq!(
        err,
        IrError::ArgumentCount {
            expected: 1,
            found: 0
        }
    );
}

#[test]
fn emitting_after_terminator_fails() {
    let (mut module, f) = module_with_function(&[], TermId::EMPTY);
    let mut builder = FunctionBuilder::new(&mut module, f);
    let entry = builder.new_block();
    builder.position_at_end(entry);
    builder.unreachable().unwrap();
    assert!(builder.current_block_terminated());
    assert_eq!(
        builder.unreachable().unwrap_err(),
        IrError::BlockTerminated(entry)
    );
}

#[test]
fn emitting_without_position_fails() {
    let (mut module, f) = module_with_function(&[], TermId::EMPTY);
    let mut builder = FunctionBuilder::new(&mut module, f);
    assert_eq!(builder.ret_void().unwrap_err(), IrError::NoInsertPoint);
}

#[test]
fn cond_br_lists_successors() {
    let (mut module, f) = module_with_function(&[TermId::BOOL], TermId::EMPTY);
    let cond = module.function(f).params[0];
    let mut builder = FunctionBuilder::new(&mut module, f);
    let entry = builder.new_block();
    let yes = builder.new_block();
    let no = builder.new_block();
    builder.position_at_end(entry);
    builder.cond_br(cond, yes, no).unwrap();

    let term = module.function(f).block(entry).terminator().unwrap();
    assert_eq!(term.kind.successors(), vec![yes, no]);
}

#[test]
fn reverse_postorder_puts_dominators_first() {
    // entry -> b2 -> b1, laid out as [entry, b1, b2]; b3 is unreachable.
    let (mut module, f) = module_with_function(&[], TermId::EMPTY);
    let mut builder = FunctionBuilder::new(&mut module, f);
    let entry = builder.new_block();
    let b1 = builder.new_block();
    let b2 = builder.new_block();
    let b3 = builder.new_block();
    builder.position_at_end(entry);
    builder.br(b2).unwrap();
    builder.position_at_end(b1);
    builder.ret_void().unwrap();
    builder.position_at_end(b2);
    builder.br(b1).unwrap();
    builder.position_at_end(b3);
    builder.br(b1).unwrap();

    let func = module.function(f);
    assert_eq!(func.successors(entry), vec![b2]);
    assert_eq!(func.successors(b1), vec![]);
    assert_eq!(func.reverse_postorder(), vec![entry, b2, b1, b3]);
}

#[test]
fn reverse_postorder_visits_loops_once() {
    let (mut module, f) = module_with_function(&[TermId::BOOL], TermId::EMPTY);
    let cond = module.function(f).params[0];
    let mut builder = FunctionBuilder::new(&mut module, f);
    let entry = builder.new_block();
    let exit = builder.new_block();
    let body = builder.new_block();
    builder.position_at_end(entry);
    builder.br(body).unwrap();
    builder.position_at_end(body);
    builder.cond_br(cond, body, exit).unwrap();
    builder.position_at_end(exit);
    builder.ret_void().unwrap();

    assert_eq!(
        module.function(f).reverse_postorder(),
        vec![entry, body, exit]
    );
}

#[test]
fn global_value_must_match_type() {
    let mut module = Module::new("test");
    let g = module.declare_global("flag", TermId::BOOL, true).unwrap();
    module.set_global_value(g, TermId::TRUE).unwrap();
    assert_eq!(module.global(g).value, Some(TermId::TRUE));

    let one = module.graph.size_value(1);
    assert!(module.set_global_value(g, one).is_err());
}

#[test]
fn module_display_lists_functions_and_globals() {
    let (mut module, f) = module_with_function(&[], TermId::EMPTY);
    module.declare_global("flag", TermId::BOOL, false).unwrap();
    let mut builder = FunctionBuilder::new(&mut module, f);
    let entry = builder.new_block();
    builder.position_at_end(entry);
    builder.ret_void().unwrap();

    let text = module.to_string();
    assert!(text.starts_with("module test\n"));
    assert!(text.contains("global flag: bool;"));
    assert!(text.contains("fn f: fn() -> empty {"));
    assert!(text.contains("bb0:\n  return ()\n"));
}
