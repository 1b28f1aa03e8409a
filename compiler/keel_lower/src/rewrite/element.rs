//! Aggregate member access: `element_value`, `element_ptr`, member offsets
//! and `outer_ptr`.
//!
//! Every rule dispatches on the *source* aggregate type, since the lowered
//! type alone no longer says whether a register array came from an array
//! or a union surrogate.

use keel_ir::{TermId, TermKind};

use super::types::size_register;
use super::values::{convert_lowered, zero_or_undef};
use super::Rewriter;
use crate::{LoweredRegister, LoweredTypeMode, LoweredValue, LoweringError};

pub(super) fn element_value<'a, R: Rewriter<'a> + ?Sized>(
    rw: &mut R,
    term: TermId,
    aggregate: TermId,
    index: TermId,
) -> Result<LoweredValue, LoweringError> {
    let source = rw.source_graph();
    let aggregate_ty = source.type_of(aggregate);
    let result_ty = source.type_of(term);
    let aggregate_kind = source.kind(aggregate_ty).clone();
    match aggregate_kind {
        TermKind::Struct(_) => {
            let index = literal_index(rw, term, index)?;
            let value = rw.rewrite_value(aggregate)?;
            if let Some(register) = value.register_value() {
                let ty = rw.rewrite_type(result_ty)?;
                let output = rw.output_graph();
                let index = output.size_value(index);
                let member = output.element_value(register, index)?;
                Ok(LoweredValue::register(ty, value.global(), member))
            } else {
                split_entry(&value, index, term)
            }
        }
        TermKind::Array { .. } => array_element(rw, term, aggregate, index, result_ty),
        TermKind::Union(_) => {
            let member_ty = rw.rewrite_type(result_ty)?;
            if !member_ty.is_register() {
                return Err(LoweringError::user(
                    "cannot read a union member of unknown size",
                )
                .at(term));
            }
            let value = rw.rewrite_value(aggregate)?;
            let union_register = value
                .ty()
                .register_type()
                .filter(|&ty| matches!(rw.output_graph().kind(ty), TermKind::Union(_)));
            match (union_register, value.register_value()) {
                (Some(_), Some(register)) => {
                    let index = rw.rewrite_value_register(index)?;
                    let member = rw.output_graph().element_value(register, index.value)?;
                    Ok(LoweredValue::register(member_ty, value.global(), member))
                }
                _ => convert_lowered(rw, &value, &member_ty).map_err(|err| err.at(term)),
            }
        }
        TermKind::Apply { .. } => {
            let value = rw.rewrite_value(aggregate)?;
            if let Some(register) = value.register_value() {
                let ty = rw.rewrite_type(result_ty)?;
                Ok(LoweredValue::register(ty, value.global(), register))
            } else {
                split_entry(&value, 0, term)
            }
        }
        _ => Err(LoweringError::user("element_value argument is not an aggregate").at(term)),
    }
}

fn array_element<'a, R: Rewriter<'a> + ?Sized>(
    rw: &mut R,
    term: TermId,
    aggregate: TermId,
    index: TermId,
    result_ty: TermId,
) -> Result<LoweredValue, LoweringError> {
    let index = size_register(rw, index)?;
    let array = rw.rewrite_value(aggregate)?;
    if let Some(register) = array.register_value() {
        let ty = rw.rewrite_type(result_ty)?;
        let member = rw.output_graph().element_value(register, index.value)?;
        return Ok(LoweredValue::register(
            ty,
            index.global && array.global(),
            member,
        ));
    }
    let Some(entries) = array.split_entries() else {
        return Err(LoweringError::user("cannot index an array of unknown layout").at(term));
    };
    if let Some(literal) = rw.output_graph().as_u64(index.value) {
        return usize::try_from(literal)
            .ok()
            .and_then(|i| entries.get(i).cloned())
            .ok_or_else(|| LoweringError::user("array index out of range").at(term));
    }
    match entries {
        [] => zero_or_undef(rw, result_ty, false),
        [only] => Ok(only.clone()),
        _ => select_entry(rw, index, entries).map_err(|err| err.at(term)),
    }
}

/// Pick entry `index` of a split array with a chain of compare-and-select
/// nodes, recursing through split components.
fn select_entry<'a, R: Rewriter<'a> + ?Sized>(
    rw: &mut R,
    index: LoweredRegister,
    entries: &[LoweredValue],
) -> Result<LoweredValue, LoweringError> {
    let Some(first) = entries.first() else {
        return Err(LoweringError::internal("no entries to select from"));
    };
    let ty = first.ty().clone();
    match ty.mode() {
        LoweredTypeMode::Register(register_type) => {
            let output = rw.output_graph();
            let mut value = output.undef(*register_type)?;
            let mut global = ty.global() && index.global;
            for (i, entry) in entries.iter().enumerate() {
                let register = entry
                    .register_value()
                    .ok_or_else(|| LoweringError::internal("split entry is not a register"))?;
                global &= entry.global();
                let candidate = output.size_value(i as u64);
                let hit = output.cmp_eq(index.value, candidate)?;
                value = output.select(hit, register, value)?;
            }
            Ok(LoweredValue::register(ty, global, value))
        }
        LoweredTypeMode::Split(components) => {
            let mut result = Vec::with_capacity(components.len());
            for component in 0..components.len() {
                let column = entries
                    .iter()
                    .map(|entry| {
                        entry
                            .split_entries()
                            .and_then(|parts| parts.get(component))
                            .cloned()
                            .ok_or_else(|| {
                                LoweringError::internal("split entries differ in shape")
                            })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                result.push(select_entry(rw, index, &column)?);
            }
            Ok(LoweredValue::split(ty, result))
        }
        LoweredTypeMode::Blob => Err(LoweringError::user(
            "array elements of unknown layout cannot be held in registers",
        )),
    }
}

pub(super) fn element_ptr<'a, R: Rewriter<'a> + ?Sized>(
    rw: &mut R,
    term: TermId,
    pointer: TermId,
    index: TermId,
) -> Result<LoweredValue, LoweringError> {
    let result_ty = rw.source_graph().type_of(term);
    let result_ty = rw.rewrite_type(result_ty)?;
    let base = rw.rewrite_value_register(pointer)?;
    let aggregate_ty = rw.source_graph().pointer_target(pointer).ok_or_else(|| {
        LoweringError::user("element_ptr argument is not a pointer").at(term)
    })?;

    let kind = rw.source_graph().kind(aggregate_ty).clone();
    let result = match kind {
        TermKind::Struct(_) => {
            let index = literal_index(rw, term, index)?;
            struct_ptr_offset(rw, aggregate_ty, base, index)?
        }
        TermKind::Array { element, .. } => {
            let index = size_register(rw, index)?;
            array_ptr_offset(rw, aggregate_ty, element, base, index)?
        }
        TermKind::Union(_) | TermKind::Apply { .. } => base,
        _ => {
            return Err(
                LoweringError::user("element_ptr argument does not point to an aggregate")
                    .at(term),
            )
        }
    };
    Ok(LoweredValue::register(result_ty, result.global, result.value))
}

/// Byte pointer to member `index` of the struct `base` points at.
fn struct_ptr_offset<'a, R: Rewriter<'a> + ?Sized>(
    rw: &mut R,
    struct_ty: TermId,
    base: LoweredRegister,
    index: u64,
) -> Result<LoweredRegister, LoweringError> {
    let lowered = rw.rewrite_type(struct_ty)?;
    if let Some(register_type) = lowered.register_type() {
        let output = rw.output_graph();
        let typed = output.pointer_cast(base.value, register_type, None)?;
        let index = output.size_value(index);
        let member = output.element_ptr(typed, index)?;
        let value = output.pointer_cast(member, TermId::BYTE, None)?;
        return Ok(LoweredRegister {
            value,
            global: base.global && lowered.global(),
        });
    }
    let index = u32::try_from(index)
        .map_err(|_| LoweringError::user("struct member index out of range").at(struct_ty))?;
    let offset = rw.source_graph().struct_element_offset(struct_ty, index)?;
    let offset = rw.rewrite_value_register(offset)?;
    let value = rw.output_graph().pointer_offset(base.value, offset.value)?;
    Ok(LoweredRegister {
        value,
        global: base.global && offset.global,
    })
}

/// Byte pointer to element `index` of the array `base` points at.
fn array_ptr_offset<'a, R: Rewriter<'a> + ?Sized>(
    rw: &mut R,
    array_ty: TermId,
    element: TermId,
    base: LoweredRegister,
    index: LoweredRegister,
) -> Result<LoweredRegister, LoweringError> {
    let array = rw.rewrite_type(array_ty)?;
    if let Some(register_type) = array.register_type() {
        let output = rw.output_graph();
        let typed = output.pointer_cast(base.value, register_type, None)?;
        let member = output.element_ptr(typed, index.value)?;
        let value = output.pointer_cast(member, TermId::BYTE, None)?;
        return Ok(LoweredRegister {
            value,
            global: base.global && index.global && array.global(),
        });
    }

    let element = rw.rewrite_type(element)?;
    let global = base.global && index.global && element.global();
    let output = rw.output_graph();
    let value = if let Some(register_type) = element.register_type() {
        let typed = output.pointer_cast(base.value, register_type, None)?;
        let moved = output.pointer_offset(typed, index.value)?;
        output.pointer_cast(moved, TermId::BYTE, None)?
    } else {
        let offset = output.mul(element.size(), index.value)?;
        output.pointer_offset(base.value, offset)?
    };
    Ok(LoweredRegister { value, global })
}

/// Byte offset of member `index` of struct type `ty`.
pub(super) fn struct_element_offset<'a, R: Rewriter<'a> + ?Sized>(
    rw: &mut R,
    ty: TermId,
    index: u32,
) -> Result<LoweredValue, LoweringError> {
    let Some(members) = rw.source_graph().members(ty).cloned() else {
        return Err(LoweringError::user("member offset requested on a non-struct").at(ty));
    };
    let Some(prefix) = members.get(..=index as usize) else {
        return Err(LoweringError::user("struct member index out of range").at(ty));
    };

    let mut layouts = Vec::with_capacity(prefix.len());
    for &member in prefix {
        layouts.push(rw.rewrite_type(member)?);
    }
    let size_ty = rw.rewrite_type(TermId::SIZE)?;
    let global = layouts.iter().all(|layout| layout.global());

    let output = rw.output_graph();
    let mut offset = output.size_value(0);
    if let Some((member, before)) = layouts.split_last() {
        for layout in before {
            offset = output.align_to(offset, layout.alignment())?;
            offset = output.add(offset, layout.size())?;
        }
        offset = output.align_to(offset, member.alignment())?;
    }
    Ok(LoweredValue::register(size_ty, global, offset))
}

/// Pointer to the aggregate containing the member `pointer` points at.
pub(super) fn outer_ptr<'a, R: Rewriter<'a> + ?Sized>(
    rw: &mut R,
    term: TermId,
    pointer: TermId,
) -> Result<LoweredValue, LoweringError> {
    let inner = rw.rewrite_value_register(pointer)?;
    let result_ty = rw.source_graph().type_of(term);
    let result_ty = rw.rewrite_type(result_ty)?;

    let source = rw.source_graph();
    let pointer_ty = source.type_of(pointer);
    let upref = match *source.kind(pointer_ty) {
        TermKind::Pointer {
            upref: Some(upref), ..
        } => upref,
        _ => {
            return Err(
                LoweringError::internal("outer_ptr of a pointer without upward reference")
                    .at(term),
            )
        }
    };
    let TermKind::UpwardReference {
        outer_type, index, ..
    } = *source.kind(upref)
    else {
        return Err(LoweringError::internal("malformed upward reference").at(term));
    };

    let mut global = inner.global && result_ty.global();
    let offset = match source.kind(outer_type).clone() {
        TermKind::Struct(_) => {
            let member = literal_index(rw, term, index)?;
            let member = u32::try_from(member)
                .map_err(|_| LoweringError::user("struct member index out of range").at(term))?;
            let offset = struct_element_offset(rw, outer_type, member)?;
            global &= offset.global();
            offset.register_value().ok_or_else(|| {
                LoweringError::internal("member offset is not a register").at(term)
            })?
        }
        TermKind::Array { element, .. } => {
            let index = size_register(rw, index)?;
            let element = rw.rewrite_type(element)?;
            global &= index.global && element.global();
            rw.output_graph().mul(index.value, element.size())?
        }
        TermKind::Union(_) | TermKind::Apply { .. } => {
            return Ok(LoweredValue::register(result_ty, global, inner.value));
        }
        _ => {
            return Err(
                LoweringError::internal("upward reference into a non-aggregate").at(term),
            )
        }
    };
    let output = rw.output_graph();
    let back = output.neg(offset)?;
    let value = output.pointer_offset(inner.value, back)?;
    Ok(LoweredValue::register(result_ty, global, value))
}

/// A struct or recursive member index, which must be a literal.
fn literal_index<'a, R: Rewriter<'a> + ?Sized>(
    rw: &mut R,
    term: TermId,
    index: TermId,
) -> Result<u64, LoweringError> {
    rw.source_graph()
        .as_u64(index)
        .ok_or_else(|| LoweringError::user("member index must be a constant").at(term))
}

fn split_entry(
    value: &LoweredValue,
    index: u64,
    term: TermId,
) -> Result<LoweredValue, LoweringError> {
    usize::try_from(index)
        .ok()
        .and_then(|i| value.split_entries()?.get(i).cloned())
        .ok_or_else(|| LoweringError::internal("aggregate lowered without the member").at(term))
}
