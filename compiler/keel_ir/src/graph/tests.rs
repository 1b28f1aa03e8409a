use pretty_assertions::assert_eq;

use super::*;
use crate::{BinaryOp, FloatWidth, IntWidth};

fn i32_type(graph: &mut Graph) -> TermId {
    graph.int_type(IntWidth::I32, true)
}

fn i32_value(graph: &mut Graph, value: i32) -> TermId {
    let bits = u32::from_ne_bytes(value.to_ne_bytes());
    graph.int_value(IntWidth::I32, true, u128::from(bits))
}

// -- Pre-interned terms --

#[test]
fn preinterned_terms_at_fixed_indices() {
    let graph = Graph::new();

    assert_eq!(*graph.kind(TermId::METATYPE), TermKind::Metatype);
    assert_eq!(*graph.kind(TermId::EMPTY), TermKind::Empty);
    assert_eq!(*graph.kind(TermId::BLOCK), TermKind::Block);
    assert_eq!(*graph.kind(TermId::BOOL), TermKind::Bool);
    assert_eq!(*graph.kind(TermId::BYTE), TermKind::Byte);
    assert_eq!(
        *graph.kind(TermId::SIZE),
        TermKind::Int {
            width: IntWidth::IPtr,
            signed: false
        }
    );
    assert_eq!(graph.pointer_target(TermId::BYTE_PTR), Some(TermId::BYTE));
    assert_eq!(graph.type_of(TermId::EMPTY_VALUE), TermId::EMPTY);
    assert_eq!(graph.as_bool(TermId::TRUE), Some(true));
    assert_eq!(graph.as_bool(TermId::FALSE), Some(false));
    assert_eq!(graph.len(), TermId::PREINTERNED_COUNT as usize);
}

#[test]
fn metatype_is_its_own_type() {
    let graph = Graph::new();
    assert_eq!(graph.type_of(TermId::METATYPE), TermId::METATYPE);
    assert!(graph.is_type(TermId::METATYPE));
    assert!(graph.is_type(TermId::SIZE));
    assert!(!graph.is_type(TermId::TRUE));
}

// -- Hash-consing --

#[test]
fn structurally_equal_terms_share_an_id() {
    let mut graph = Graph::new();
    let a = i32_type(&mut graph);
    let b = i32_type(&mut graph);
    assert_eq!(a, b);

    let s1 = graph.struct_type(&[a, TermId::BOOL]).unwrap();
    let s2 = graph.struct_type(&[b, TermId::BOOL]).unwrap();
    assert_eq!(s1, s2);

    let s3 = graph.struct_type(&[TermId::BOOL, a]).unwrap();
    assert_ne!(s1, s3);
}

#[test]
fn size_literal_reuses_pre_interned_type() {
    let mut graph = Graph::new();
    let four = graph.size_value(4);
    assert_eq!(graph.type_of(four), TermId::SIZE);
    assert_eq!(graph.as_u64(four), Some(4));
}

#[test]
fn int_literals_are_truncated_to_width() {
    let mut graph = Graph::new();
    let v = graph.int_value(IntWidth::I8, false, 0x1ff);
    assert_eq!(graph.as_int(v), Some(0xff));
}

// -- Type inference --

#[test]
fn struct_value_type_is_inferred() {
    let mut graph = Graph::new();
    let one = i32_value(&mut graph, 1);
    let value = graph.struct_value(&[one, TermId::TRUE]).unwrap();
    let i32_ty = i32_type(&mut graph);
    let expected = graph.struct_type(&[i32_ty, TermId::BOOL]).unwrap();
    assert_eq!(graph.type_of(value), expected);
}

#[test]
fn array_value_type_has_literal_length() {
    let mut graph = Graph::new();
    let a = i32_value(&mut graph, 1);
    let b = i32_value(&mut graph, 2);
    let i32_ty = i32_type(&mut graph);
    let value = graph.array_value(i32_ty, &[a, b]).unwrap();
    let expected = graph.array_type(i32_ty, 2).unwrap();
    assert_eq!(graph.type_of(value), expected);
}

#[test]
fn array_value_rejects_mismatched_elements() {
    let mut graph = Graph::new();
    let i32_ty = i32_type(&mut graph);
    let err = graph.array_value(i32_ty, &[TermId::TRUE]).unwrap_err();
    assert_eq!(
        err,
        IrError::TypeMismatch {
            expected: i32_ty,
            found: TermId::BOOL
        }
    );
}

#[test]
fn struct_type_rejects_values() {
    let mut graph = Graph::new();
    let err = graph.struct_type(&[TermId::TRUE]).unwrap_err();
    assert_eq!(err, IrError::NotAType(TermId::TRUE));
}

#[test]
fn element_of_struct_needs_literal_index() {
    let mut graph = Graph::new();
    let i32_ty = i32_type(&mut graph);
    let s = graph.struct_type(&[i32_ty, TermId::BOOL]).unwrap();
    let fn_ty = graph.function_type(TermId::EMPTY, &[s, TermId::SIZE], false).unwrap();
    let mut module = crate::Module::with_graph("m", graph);
    let f = module.declare_function("f", fn_ty).unwrap();
    let (param, index) = {
        let func = module.function(f);
        (func.params[0], func.params[1])
    };

    let graph = &mut module.graph;
    assert_eq!(
        graph.element_value(param, index).unwrap_err(),
        IrError::NonConstantIndex(index)
    );
    let two = graph.size_value(2);
    assert!(matches!(
        graph.element_value(param, two).unwrap_err(),
        IrError::IndexOutOfRange { index: 2, len: 2, .. }
    ));
    let one = graph.size_value(1);
    let member = graph.element_value(param, one).unwrap();
    assert_eq!(graph.type_of(member), TermId::BOOL);
}

#[test]
fn element_of_scalar_is_rejected() {
    let mut graph = Graph::new();
    let zero = graph.size_value(0);
    assert_eq!(
        graph.element_value(TermId::TRUE, zero).unwrap_err(),
        IrError::NotAnAggregate(TermId::BOOL)
    );
}

#[test]
fn element_ptr_records_upward_reference() {
    let mut graph = Graph::new();
    let i32_ty = i32_type(&mut graph);
    let s = graph.struct_type(&[TermId::BOOL, i32_ty]).unwrap();
    let ptr_ty = graph.pointer_type(s).unwrap();
    let fn_ty = graph.function_type(TermId::EMPTY, &[ptr_ty], false).unwrap();
    let mut module = crate::Module::with_graph("m", graph);
    let f = module.declare_function("f", fn_ty).unwrap();
    let p = module.function(f).params[0];

    let graph = &mut module.graph;
    let one = graph.size_value(1);
    let member = graph.element_ptr(p, one).unwrap();
    assert_eq!(graph.pointer_target(member), Some(i32_ty));

    let outer = graph.outer_ptr(member).unwrap();
    assert_eq!(graph.type_of(outer), ptr_ty);
}

#[test]
fn outer_ptr_without_upward_reference_fails() {
    let mut graph = Graph::new();
    let null = graph.zero(TermId::BYTE_PTR).unwrap();
    assert_eq!(
        graph.outer_ptr(null).unwrap_err(),
        IrError::MissingUpwardReference(null)
    );
}

#[test]
fn binary_requires_matching_widths() {
    let mut graph = Graph::new();
    let a = i32_value(&mut graph, 1);
    let b = graph.size_value(1);
    assert!(matches!(
        graph.add(a, b).unwrap_err(),
        IrError::TypeMismatch { .. }
    ));
}

#[test]
fn select_requires_boolean_condition() {
    let mut graph = Graph::new();
    let a = i32_value(&mut graph, 1);
    let b = i32_value(&mut graph, 2);
    let err = graph.select(a, a, b).unwrap_err();
    assert!(matches!(err, IrError::TypeMismatch { .. }));
}

// -- Constant folding --

#[test]
fn literal_arithmetic_folds() {
    let mut graph = Graph::new();
    let a = graph.size_value(6);
    let b = graph.size_value(7);
    let sum = graph.add(a, b).unwrap();
    assert_eq!(graph.as_u64(sum), Some(13));
    let product = graph.mul(a, b).unwrap();
    assert_eq!(graph.as_u64(product), Some(42));
    let max = graph.max(a, b).unwrap();
    assert_eq!(max, b);
}

#[test]
fn signed_arithmetic_wraps_to_width() {
    let mut graph = Graph::new();
    let a = graph.int_value(IntWidth::I8, true, 0x7f);
    let b = graph.int_value(IntWidth::I8, true, 1);
    let sum = graph.add(a, b).unwrap();
    assert_eq!(graph.as_int(sum), Some(0x80));

    let neg = graph.neg(b).unwrap();
    assert_eq!(graph.as_int(neg), Some(0xff));

    let lt = graph.binary(BinaryOp::CmpLt, neg, b).unwrap();
    assert_eq!(lt, TermId::TRUE);
}

#[test]
fn division_by_zero_is_not_folded() {
    let mut graph = Graph::new();
    let a = graph.size_value(6);
    let zero = graph.size_value(0);
    let div = graph.binary(BinaryOp::Div, a, zero).unwrap();
    assert!(matches!(graph.kind(div), TermKind::Binary { .. }));
}

#[test]
fn align_to_folds_on_powers_of_two() {
    let mut graph = Graph::new();
    let five = graph.size_value(5);
    let four = graph.size_value(4);
    let aligned = graph.align_to(five, four).unwrap();
    assert_eq!(graph.as_u64(aligned), Some(8));
}

#[test]
fn additive_and_multiplicative_identities() {
    let mut graph = Graph::new();
    let fn_ty = graph.function_type(TermId::EMPTY, &[TermId::SIZE], false).unwrap();
    let mut module = crate::Module::with_graph("m", graph);
    let f = module.declare_function("f", fn_ty).unwrap();
    let x = module.function(f).params[0];

    let graph = &mut module.graph;
    let zero = graph.size_value(0);
    let one = graph.size_value(1);
    assert_eq!(graph.add(x, zero).unwrap(), x);
    assert_eq!(graph.add(zero, x).unwrap(), x);
    assert_eq!(graph.mul(x, one).unwrap(), x);
    assert_eq!(graph.mul(x, zero).unwrap(), zero);
    assert_eq!(graph.max(x, x).unwrap(), x);
    assert_eq!(graph.align_to(x, one).unwrap(), x);
    assert_eq!(graph.cmp_eq(x, x).unwrap(), TermId::TRUE);
}

#[test]
fn select_on_literal_condition_folds() {
    let mut graph = Graph::new();
    let a = i32_value(&mut graph, 1);
    let b = i32_value(&mut graph, 2);
    assert_eq!(graph.select(TermId::TRUE, a, b).unwrap(), a);
    assert_eq!(graph.select(TermId::FALSE, a, b).unwrap(), b);
}

#[test]
fn element_of_literal_aggregate_folds() {
    let mut graph = Graph::new();
    let a = i32_value(&mut graph, 1);
    let s = graph.struct_value(&[a, TermId::TRUE]).unwrap();
    let one = graph.size_value(1);
    assert_eq!(graph.element_value(s, one).unwrap(), TermId::TRUE);

    let ty = graph.type_of(s);
    let z = graph.zero(ty).unwrap();
    let zero = graph.size_value(0);
    let member = graph.element_value(z, zero).unwrap();
    assert_eq!(*graph.kind(member), TermKind::Zero(graph.type_of(a)));
}

#[test]
fn pointer_offset_by_zero_folds() {
    let mut graph = Graph::new();
    let null = graph.zero(TermId::BYTE_PTR).unwrap();
    let zero = graph.size_value(0);
    assert_eq!(graph.pointer_offset(null, zero).unwrap(), null);
    assert_eq!(graph.pointer_cast(null, TermId::BYTE, None).unwrap(), null);
}

// -- Flags --

#[test]
fn function_local_flag_propagates() {
    let mut graph = Graph::new();
    let fn_ty = graph.function_type(TermId::EMPTY, &[TermId::SIZE], false).unwrap();
    let mut module = crate::Module::with_graph("m", graph);
    let f = module.declare_function("f", fn_ty).unwrap();
    let x = module.function(f).params[0];

    let graph = &mut module.graph;
    assert!(!graph.is_global(x));
    let one = graph.size_value(1);
    let sum = graph.add(x, one).unwrap();
    assert!(!graph.is_global(sum));
    let array = graph.array_type_dyn(TermId::BYTE, sum).unwrap();
    assert!(!graph.is_global(array));
    assert!(graph.is_global(one));
}

// -- Recursive types --

#[test]
fn unpack_substitutes_parameters() {
    let mut graph = Graph::new();
    let list = graph.new_recursive("list", &[TermId::METATYPE]).unwrap();
    let elem = graph.recursive(list).params[0];
    assert!(graph.flags(elem).contains(TermFlags::HAS_PLACEHOLDER));

    let self_ty = graph.apply(list, &[elem]).unwrap();
    let next = graph.pointer_type(self_ty).unwrap();
    let body = graph.struct_type(&[elem, next]).unwrap();
    graph.resolve_recursive(list, body).unwrap();

    let i32_ty = i32_type(&mut graph);
    let list_i32 = graph.apply(list, &[i32_ty]).unwrap();
    let unpacked = graph.unpack(list_i32).unwrap();

    let next_i32 = graph.pointer_type(list_i32).unwrap();
    let expected = graph.struct_type(&[i32_ty, next_i32]).unwrap();
    assert_eq!(unpacked, expected);
    assert!(!graph.flags(unpacked).contains(TermFlags::HAS_PLACEHOLDER));
}

#[test]
fn unresolved_recursive_cannot_be_unpacked() {
    let mut graph = Graph::new();
    let r = graph.new_recursive("r", &[]).unwrap();
    let applied = graph.apply(r, &[]).unwrap();
    assert_eq!(
        graph.unpack(applied).unwrap_err(),
        IrError::UnresolvedRecursive(r)
    );
}

#[test]
fn recursive_resolves_once() {
    let mut graph = Graph::new();
    let r = graph.new_recursive("r", &[]).unwrap();
    graph.resolve_recursive(r, TermId::BOOL).unwrap();
    assert_eq!(
        graph.resolve_recursive(r, TermId::BOOL).unwrap_err(),
        IrError::RecursiveAlreadyResolved(r)
    );
}

#[test]
fn apply_checks_argument_count() {
    let mut graph = Graph::new();
    let r = graph.new_recursive("r", &[TermId::METATYPE]).unwrap();
    assert_eq!(
        graph.apply(r, &[]).unwrap_err(),
        IrError::ArgumentCount {
            expected: 1,
            found: 0
        }
    );
}

#[test]
fn apply_value_wraps_unpacked_body() {
    let mut graph = Graph::new();
    let r = graph.new_recursive("boxed", &[TermId::METATYPE]).unwrap();
    let param = graph.recursive(r).params[0];
    let body = graph.struct_type(&[param]).unwrap();
    graph.resolve_recursive(r, body).unwrap();

    let applied = graph.apply(r, &[TermId::BOOL]).unwrap();
    let inner = graph.struct_value(&[TermId::TRUE]).unwrap();
    let value = graph.apply_value(applied, inner).unwrap();
    assert_eq!(graph.type_of(value), applied);

    let zero = graph.size_value(0);
    assert_eq!(graph.element_value(value, zero).unwrap(), inner);
}

// -- Display --

#[test]
fn display_renders_nested_types() {
    let mut graph = Graph::new();
    let i32_ty = i32_type(&mut graph);
    let f64_ty = graph.float_type(FloatWidth::F64);
    let arr = graph.array_type(f64_ty, 3).unwrap();
    let s = graph.struct_type(&[i32_ty, arr]).unwrap();
    assert_eq!(graph.display(s).to_string(), "struct {i32, [f64; 3]}");
}
