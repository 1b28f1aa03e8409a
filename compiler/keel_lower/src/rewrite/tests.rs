use pretty_assertions::assert_eq;
use proptest::prelude::*;

use keel_ir::{FloatWidth, IntWidth, Module, TermId, TermKind};

use super::*;
use crate::test_helpers::{i32_ty, i32_value, i64_ty, padded_pair};
use crate::{ErrorKind, SimpleTarget};

/// Run `f` against a module rewriter over `module`.
fn with_rewriter<T>(
    module: &Module,
    config: &LoweringConfig,
    f: impl FnOnce(&mut ModuleRewriter<'_>) -> T,
) -> T {
    let target = SimpleTarget;
    let mut rw = ModuleRewriter::new(module, config, &target);
    f(&mut rw)
}

fn literal(rw: &mut ModuleRewriter<'_>, term: TermId) -> u64 {
    rw.output_graph().as_u64(term).unwrap()
}

/// Size and alignment of a lowered type, as literals.
fn layout(rw: &mut ModuleRewriter<'_>, ty: &LoweredType) -> (u64, u64) {
    (literal(rw, ty.size()), literal(rw, ty.alignment()))
}

// -- Memoization --

#[test]
fn rewriting_a_type_twice_returns_the_same_handle() {
    let mut module = Module::new("test");
    let pair = padded_pair(&mut module.graph);
    with_rewriter(&module, &LoweringConfig::default(), |rw| {
        let first = rw.rewrite_type(pair).unwrap();
        let second = rw.rewrite_type(pair).unwrap();
        assert!(LoweredType::ptr_eq(&first, &second));
    });
}

#[test]
fn rewriting_a_value_twice_returns_the_same_handle() {
    let mut module = Module::new("test");
    let a = i32_value(&mut module.graph, 7);
    let b = module.graph.size_value(9);
    let value = module.graph.struct_value(&[a, b]).unwrap();
    with_rewriter(&module, &LoweringConfig::all_split(), |rw| {
        let first = rw.rewrite_value(value).unwrap();
        let second = rw.rewrite_value(value).unwrap();
        assert!(LoweredValue::ptr_eq(&first, &second));
        assert!(first.global());
    });
}

// -- Primitive and struct layout --

#[test]
fn primitives_lower_to_themselves() {
    let mut module = Module::new("test");
    let i32_ty = i32_ty(&mut module.graph);
    let f64_ty = module.graph.float_type(FloatWidth::F64);
    with_rewriter(&module, &LoweringConfig::default(), |rw| {
        for (ty, size) in [(TermId::BOOL, 1), (i32_ty, 4), (f64_ty, 8), (TermId::SIZE, 8)] {
            let lowered = rw.rewrite_type(ty).unwrap();
            assert_eq!(layout(rw, &lowered), (size, size));
            let register = lowered.register_type().unwrap();
            assert_eq!(rw.output_graph().kind(register), module.graph.kind(ty));
        }
    });
}

#[test]
fn every_pointer_becomes_a_byte_pointer() {
    let mut module = Module::new("test");
    let pair = padded_pair(&mut module.graph);
    let pointer = module.graph.pointer_type(pair).unwrap();
    with_rewriter(&module, &LoweringConfig::default(), |rw| {
        let lowered = rw.rewrite_type(pointer).unwrap();
        assert_eq!(lowered.register_type(), Some(TermId::BYTE_PTR));
        assert_eq!(layout(rw, &lowered), (8, 8));
    });
}

#[test]
fn struct_layout_pads_members_and_tail() {
    let mut module = Module::new("test");
    let i32_ty = i32_ty(&mut module.graph);
    let ty = module.graph.struct_type(&[TermId::BYTE, i32_ty, TermId::BYTE]).unwrap();
    with_rewriter(&module, &LoweringConfig::default(), |rw| {
        let lowered = rw.rewrite_type(ty).unwrap();
        assert_eq!(layout(rw, &lowered), (12, 4));
        let register = lowered.register_type().unwrap();
        assert!(matches!(rw.output_graph().kind(register), TermKind::Struct(m) if m.len() == 3));
    });
}

#[test]
fn split_structs_keeps_member_lowerings() {
    let mut module = Module::new("test");
    let pair = padded_pair(&mut module.graph);
    let i32_ty = i32_ty(&mut module.graph);
    let config = LoweringConfig::default().with_split_structs(true);
    with_rewriter(&module, &config, |rw| {
        let lowered = rw.rewrite_type(pair).unwrap();
        assert_eq!(layout(rw, &lowered), (16, 8));
        let entries = lowered.split_entries().unwrap();
        assert_eq!(entries.len(), 2);
        let member = rw.rewrite_type(i32_ty).unwrap();
        assert!(LoweredType::ptr_eq(&entries[0], &member));
    });
}

#[test]
fn empty_struct_has_size_zero_and_alignment_one() {
    let mut module = Module::new("test");
    let ty = module.graph.struct_type(&[]).unwrap();
    with_rewriter(&module, &LoweringConfig::default(), |rw| {
        let lowered = rw.rewrite_type(ty).unwrap();
        assert_eq!(layout(rw, &lowered), (0, 1));
    });
}

// -- Arrays --

#[test]
fn literal_array_lowers_to_register_array() {
    let mut module = Module::new("test");
    let i32_ty = i32_ty(&mut module.graph);
    let ty = module.graph.array_type(i32_ty, 4).unwrap();
    with_rewriter(&module, &LoweringConfig::default(), |rw| {
        let lowered = rw.rewrite_type(ty).unwrap();
        assert_eq!(layout(rw, &lowered), (16, 4));
        let register = lowered.register_type().unwrap();
        assert!(matches!(rw.output_graph().kind(register), TermKind::Array { .. }));
    });
}

#[test]
fn split_arrays_repeats_the_element_lowering() {
    let mut module = Module::new("test");
    let i32_ty = i32_ty(&mut module.graph);
    let ty = module.graph.array_type(i32_ty, 3).unwrap();
    let config = LoweringConfig::default().with_split_arrays(true);
    with_rewriter(&module, &config, |rw| {
        let lowered = rw.rewrite_type(ty).unwrap();
        let entries = lowered.split_entries().unwrap();
        assert_eq!(entries.len(), 3);
        assert!(LoweredType::ptr_eq(&entries[0], &entries[2]));
    });
}

#[test]
fn array_length_must_be_pointer_sized() {
    let mut module = Module::new("test");
    let length = i32_value(&mut module.graph, 2);
    let ty = module.graph.array_type_dyn(TermId::BYTE, length).unwrap();
    with_rewriter(&module, &LoweringConfig::default(), |rw| {
        let err = rw.rewrite_type(ty).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::User);
    });
}

#[test]
fn enormous_split_array_is_a_user_error() {
    let mut module = Module::new("test");
    let i32_ty = i32_ty(&mut module.graph);
    let ty = module
        .graph
        .array_type(i32_ty, types::MAX_SPLIT_LENGTH + 1)
        .unwrap();
    with_rewriter(&module, &LoweringConfig::default(), |rw| {
        assert!(rw.rewrite_type(ty).unwrap().is_register());
    });
    let config = LoweringConfig::default().with_split_arrays(true);
    with_rewriter(&module, &config, |rw| {
        let err = rw.rewrite_type(ty).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::User);
    });
}

// -- Blob members --

/// A 4-byte type whose layout the rewriter knows only as a blob.
fn opaque_word(module: &mut Module) -> TermId {
    let four = module.graph.size_value(4);
    module.graph.metatype_value(four, four).unwrap()
}

#[test]
fn struct_with_a_blob_member_is_a_blob() {
    let mut module = Module::new("test");
    let opaque = opaque_word(&mut module);
    let i32_ty = i32_ty(&mut module.graph);
    let ty = module.graph.struct_type(&[opaque, i32_ty]).unwrap();
    for config in [LoweringConfig::default(), LoweringConfig::all_split()] {
        with_rewriter(&module, &config, |rw| {
            let lowered = rw.rewrite_type(ty).unwrap();
            assert!(lowered.is_blob(), "{:?}", lowered.mode());
            assert!(lowered.global());
            assert_eq!(layout(rw, &lowered), (8, 4));
        });
    }
}

#[test]
fn array_of_blobs_is_a_blob() {
    let mut module = Module::new("test");
    let opaque = opaque_word(&mut module);
    let ty = module.graph.array_type(opaque, 3).unwrap();
    for config in [LoweringConfig::default(), LoweringConfig::all_split()] {
        with_rewriter(&module, &config, |rw| {
            let lowered = rw.rewrite_type(ty).unwrap();
            assert!(lowered.is_blob(), "{:?}", lowered.mode());
            assert_eq!(layout(rw, &lowered), (12, 4));
        });
    }
}

// -- Unions --

#[test]
fn union_of_registers_stays_a_union() {
    let mut module = Module::new("test");
    let i32_ty = i32_ty(&mut module.graph);
    let ty = module.graph.union_type(&[i32_ty, TermId::BYTE]).unwrap();
    with_rewriter(&module, &LoweringConfig::default(), |rw| {
        let lowered = rw.rewrite_type(ty).unwrap();
        assert_eq!(layout(rw, &lowered), (4, 4));
        let register = lowered.register_type().unwrap();
        assert!(matches!(rw.output_graph().kind(register), TermKind::Union(_)));
    });
}

#[test]
fn removed_union_becomes_array_of_alignment_sized_integers() {
    let mut module = Module::new("test");
    let five_bytes = module.graph.array_type(TermId::BYTE, 5).unwrap();
    let i16_ty = module.graph.int_type(IntWidth::I16, false);
    let ty = module.graph.union_type(&[five_bytes, i16_ty]).unwrap();
    let config = LoweringConfig::default().with_remove_unions(true);
    with_rewriter(&module, &config, |rw| {
        let lowered = rw.rewrite_type(ty).unwrap();
        assert_eq!(layout(rw, &lowered), (6, 2));
        let register = lowered.register_type().unwrap();
        let TermKind::Array { element, length } = *rw.output_graph().kind(register) else {
            panic!("expected a register array, got {:?}", lowered.mode());
        };
        assert_eq!(literal(rw, length), 3);
        assert!(matches!(
            rw.output_graph().kind(element),
            TermKind::Int { width: IntWidth::I16, .. }
        ));
    });
}

#[test]
fn removed_union_with_split_arrays_is_split() {
    let mut module = Module::new("test");
    let five_bytes = module.graph.array_type(TermId::BYTE, 5).unwrap();
    let i16_ty = module.graph.int_type(IntWidth::I16, false);
    let ty = module.graph.union_type(&[five_bytes, i16_ty]).unwrap();
    let config = LoweringConfig::default()
        .with_remove_unions(true)
        .with_split_arrays(true);
    with_rewriter(&module, &config, |rw| {
        let lowered = rw.rewrite_type(ty).unwrap();
        assert_eq!(lowered.split_entries().map(<[_]>::len), Some(3));
    });
}

#[test]
fn single_word_union_surrogate_is_one_register() {
    let mut module = Module::new("test");
    let i32_ty = i32_ty(&mut module.graph);
    let f32_ty = module.graph.float_type(FloatWidth::F32);
    let ty = module.graph.union_type(&[i32_ty, f32_ty]).unwrap();
    let config = LoweringConfig::default().with_remove_unions(true);
    with_rewriter(&module, &config, |rw| {
        let lowered = rw.rewrite_type(ty).unwrap();
        let register = lowered.register_type().unwrap();
        assert!(matches!(
            rw.output_graph().kind(register),
            TermKind::Int { width: IntWidth::I32, .. }
        ));
    });
}

#[test]
fn byte_aligned_union_surrogate_is_a_byte_array() {
    let mut module = Module::new("test");
    let three_bytes = module.graph.array_type(TermId::BYTE, 3).unwrap();
    let ty = module.graph.union_type(&[three_bytes, TermId::BYTE]).unwrap();
    let config = LoweringConfig::default().with_remove_unions(true);
    with_rewriter(&module, &config, |rw| {
        let lowered = rw.rewrite_type(ty).unwrap();
        assert_eq!(layout(rw, &lowered), (3, 1));
        let register = lowered.register_type().unwrap();
        let TermKind::Array { element, length } = *rw.output_graph().kind(register) else {
            panic!("expected a register array, got {:?}", lowered.mode());
        };
        assert_eq!(element, TermId::BYTE);
        assert_eq!(literal(rw, length), 3);
    });
}

#[test]
fn union_with_blob_member_uses_a_surrogate() {
    let mut module = Module::new("test");
    let size = module.graph.size_value(24);
    let alignment = module.graph.size_value(8);
    let opaque = module.graph.metatype_value(size, alignment).unwrap();
    let i32_ty = i32_ty(&mut module.graph);
    let ty = module.graph.union_type(&[opaque, i32_ty]).unwrap();
    with_rewriter(&module, &LoweringConfig::default(), |rw| {
        assert!(rw.rewrite_type(opaque).unwrap().is_blob());
        let lowered = rw.rewrite_type(ty).unwrap();
        assert_eq!(layout(rw, &lowered), (24, 8));
        let register = lowered.register_type().unwrap();
        assert!(matches!(rw.output_graph().kind(register), TermKind::Array { .. }));
    });
}

// -- Recursive types and the metatype --

#[test]
fn recursive_instantiation_lowers_its_body() {
    let mut module = Module::new("test");
    let graph = &mut module.graph;
    let list = graph.new_recursive("list", &[TermId::METATYPE]).unwrap();
    let element = graph.recursive(list).params[0];
    let self_ty = graph.apply(list, &[element]).unwrap();
    let next = graph.pointer_type(self_ty).unwrap();
    let body = graph.struct_type(&[element, next]).unwrap();
    graph.resolve_recursive(list, body).unwrap();
    let i32_ty = i32_ty(graph);
    let list_i32 = graph.apply(list, &[i32_ty]).unwrap();

    with_rewriter(&module, &LoweringConfig::default(), |rw| {
        let lowered = rw.rewrite_type(list_i32).unwrap();
        assert_eq!(layout(rw, &lowered), (16, 8));
        assert!(lowered.is_register());
    });
    with_rewriter(&module, &LoweringConfig::all_split(), |rw| {
        let lowered = rw.rewrite_type(list_i32).unwrap();
        let entries = lowered.split_entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].split_entries().map(<[_]>::len), Some(2));
    });
}

#[test]
fn metatype_is_a_size_alignment_pair() {
    let module = Module::new("test");
    with_rewriter(&module, &LoweringConfig::default(), |rw| {
        let lowered = rw.rewrite_type(TermId::METATYPE).unwrap();
        assert_eq!(layout(rw, &lowered), (16, 8));
        assert!(lowered.is_register());
    });
    with_rewriter(&module, &LoweringConfig::all_split(), |rw| {
        let lowered = rw.rewrite_type(TermId::METATYPE).unwrap();
        assert_eq!(lowered.split_entries().map(<[_]>::len), Some(2));
    });
}

#[test]
fn type_used_as_value_is_its_layout() {
    let mut module = Module::new("test");
    let pair = padded_pair(&mut module.graph);
    let size = module.graph.metatype_size(pair).unwrap();
    let alignment = module.graph.metatype_alignment(pair).unwrap();
    with_rewriter(&module, &LoweringConfig::all_split(), |rw| {
        let size = rw.rewrite_value_register(size).unwrap();
        let alignment = rw.rewrite_value_register(alignment).unwrap();
        assert_eq!(literal(rw, size.value), 16);
        assert_eq!(literal(rw, alignment.value), 8);
        assert!(size.global);

        let value = rw.rewrite_value(pair).unwrap();
        let entries = value.split_entries().unwrap();
        assert_eq!(entries[0].register_value(), Some(size.value));
        assert_eq!(entries[1].register_value(), Some(alignment.value));
    });
}

// -- Values --

#[test]
fn struct_value_of_split_struct_is_split() {
    let mut module = Module::new("test");
    let a = i32_value(&mut module.graph, 1);
    let b = module.graph.int_value(IntWidth::I64, true, 2);
    let value = module.graph.struct_value(&[a, b]).unwrap();
    let config = LoweringConfig::default().with_split_structs(true);
    with_rewriter(&module, &config, |rw| {
        let lowered = rw.rewrite_value(value).unwrap();
        let entries = lowered.split_entries().unwrap();
        assert_eq!(entries.len(), 2);
        let member = rw.rewrite_value(a).unwrap();
        assert!(LoweredValue::ptr_eq(&entries[0], &member));
    });
}

#[test]
fn zero_of_split_struct_zeroes_every_entry() {
    let mut module = Module::new("test");
    let pair = padded_pair(&mut module.graph);
    let zero = module.graph.zero(pair).unwrap();
    let i64_ty = i64_ty(&mut module.graph);
    with_rewriter(&module, &LoweringConfig::all_split(), |rw| {
        let lowered = rw.rewrite_value(zero).unwrap();
        let entries = lowered.split_entries().unwrap();
        let last = entries[1].register_value().unwrap();
        let i64_register = rw.rewrite_type(i64_ty).unwrap().register_type().unwrap();
        assert_eq!(*rw.output_graph().kind(last), TermKind::Zero(i64_register));
    });
}

#[test]
fn zero_of_blob_is_a_user_error() {
    let mut module = Module::new("test");
    let size = module.graph.size_value(24);
    let opaque = module.graph.metatype_value(size, size).unwrap();
    let zero = module.graph.zero(opaque).unwrap();
    with_rewriter(&module, &LoweringConfig::default(), |rw| {
        let err = rw.rewrite_value(zero).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::User);
        assert_eq!(err.term(), Some(opaque));
    });
}

#[test]
fn union_value_of_surrogate_converts_the_member() {
    let mut module = Module::new("test");
    let i32_ty = i32_ty(&mut module.graph);
    let f32_ty = module.graph.float_type(FloatWidth::F32);
    let ty = module.graph.union_type(&[i32_ty, f32_ty]).unwrap();
    let member = module.graph.float_value(FloatWidth::F32, 0x3f80_0000);
    let value = module.graph.union_value(ty, member).unwrap();
    let config = LoweringConfig::default().with_remove_unions(true);
    with_rewriter(&module, &config, |rw| {
        let lowered = rw.rewrite_value(value).unwrap();
        let register = lowered.register_value().unwrap();
        assert!(matches!(rw.output_graph().kind(register), TermKind::BitCast { .. }));
        assert!(lowered.global());
    });
}

#[test]
fn pointer_offset_scales_to_bytes_on_request() {
    let mut module = Module::new("test");
    let i32_ty = i32_ty(&mut module.graph);
    let global = module.declare_global("g", i32_ty, false).unwrap();
    let base = module.global(global).reference;
    let two = module.graph.size_value(2);
    let moved = module.graph.pointer_offset(base, two).unwrap();

    let typed = LoweringConfig::default();
    let bytes = LoweringConfig::default().with_pointer_arithmetic_to_bytes(true);
    for (config, expected_offset) in [(typed, 2), (bytes, 8)] {
        with_rewriter(&module, &config, |rw| {
            let lowered = rw.output_mut().declare_global("g", TermId::SIZE, false).unwrap();
            rw.map_global(global, lowered);
            let mut value = rw.rewrite_value_register(moved).unwrap().value;
            if let TermKind::PointerCast { pointer, .. } = *rw.output_graph().kind(value) {
                value = pointer;
            }
            let TermKind::PointerOffset { offset, .. } = *rw.output_graph().kind(value) else {
                panic!("expected a pointer offset");
            };
            assert_eq!(literal(rw, offset), expected_offset);
        });
    }
}

// -- Layout properties --

fn primitive_strategy() -> impl Strategy<Value = u8> {
    0u8..5
}

fn primitive(graph: &mut keel_ir::Graph, code: u8) -> (TermId, u64) {
    match code {
        0 => (TermId::BYTE, 1),
        1 => (graph.int_type(IntWidth::I16, false), 2),
        2 => (graph.int_type(IntWidth::I32, false), 4),
        3 => (graph.int_type(IntWidth::I64, false), 8),
        _ => (graph.float_type(FloatWidth::F64), 8),
    }
}

proptest! {
    #[test]
    fn struct_layout_matches_c_rules(codes in prop::collection::vec(primitive_strategy(), 0..8)) {
        let mut module = Module::new("prop");
        let mut members = Vec::new();
        let mut expected_size = 0u64;
        let mut expected_alignment = 1u64;
        for code in codes {
            let (ty, size) = primitive(&mut module.graph, code);
            members.push(ty);
            expected_size = expected_size.next_multiple_of(size) + size;
            expected_alignment = expected_alignment.max(size);
        }
        expected_size = expected_size.next_multiple_of(expected_alignment);
        let ty = module.graph.struct_type(&members).unwrap();

        for config in [LoweringConfig::default(), LoweringConfig::all_split()] {
            let (size, alignment) = with_rewriter(&module, &config, |rw| {
                let lowered = rw.rewrite_type(ty).unwrap();
                layout(rw, &lowered)
            });
            prop_assert_eq!(size, expected_size);
            prop_assert_eq!(alignment, expected_alignment);
        }
    }
}
