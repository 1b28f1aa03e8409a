//! Value lowering rules.
//!
//! Aggregate member access lives in [`super::element`]; everything else
//! dispatches from [`lower_value`].

use keel_ir::{TermId, TermKind, TermList};

use super::element;
use super::types::size_register;
use super::{lower_reference, Rewriter};
use crate::{LoweredRegister, LoweredType, LoweredTypeMode, LoweredValue, LoweringError};

/// Lower the source value `term`. Called on a cache miss.
pub(crate) fn lower_value<'a, R: Rewriter<'a> + ?Sized>(
    rw: &mut R,
    term: TermId,
) -> Result<LoweredValue, LoweringError> {
    let kind = rw.source_graph().kind(term).clone();
    match kind {
        TermKind::Metatype
        | TermKind::Empty
        | TermKind::Block
        | TermKind::Bool
        | TermKind::Byte
        | TermKind::Int { .. }
        | TermKind::Float(_)
        | TermKind::Pointer { .. }
        | TermKind::Array { .. }
        | TermKind::Struct(_)
        | TermKind::Union(_)
        | TermKind::Apply { .. }
        | TermKind::FunctionType { .. }
        | TermKind::UpwardReferenceType
        | TermKind::MetatypeValue { .. }
        | TermKind::ConstantType(_) => type_value(rw, term),

        TermKind::IntValue { .. }
        | TermKind::BoolValue(_)
        | TermKind::FloatValue { .. }
        | TermKind::EmptyValue
        | TermKind::Binary { .. }
        | TermKind::Neg(_) => default_rewrite(rw, term, &kind),

        TermKind::BitCast { value, ty } => bit_cast(rw, term, value, ty),
        TermKind::Zero(ty) => zero_or_undef(rw, ty, true),
        TermKind::Undef(ty) => zero_or_undef(rw, ty, false),
        TermKind::ArrayValue { element, elements } => array_value(rw, term, element, &elements),
        TermKind::StructValue(members) => struct_value(rw, term, &members),
        TermKind::UnionValue { ty, value } => union_value(rw, term, ty, value),
        TermKind::ApplyValue { ty, value } => apply_value(rw, term, ty, value),

        TermKind::ElementValue { aggregate, index } => {
            element::element_value(rw, term, aggregate, index)
        }
        TermKind::ElementPtr { pointer, index } => element::element_ptr(rw, term, pointer, index),
        TermKind::StructElementOffset { ty, index } => {
            element::struct_element_offset(rw, ty, index)
        }
        TermKind::OuterPtr(pointer) => element::outer_ptr(rw, term, pointer),

        TermKind::PointerOffset { pointer, offset } => pointer_offset(rw, term, pointer, offset),
        TermKind::PointerCast { pointer, .. } => rw.rewrite_value(pointer),
        TermKind::MetatypeSize(ty) => {
            let lowered = rw.rewrite_type(ty)?;
            let size_ty = rw.rewrite_type(TermId::SIZE)?;
            Ok(LoweredValue::register(size_ty, lowered.global(), lowered.size()))
        }
        TermKind::MetatypeAlignment(ty) => {
            let lowered = rw.rewrite_type(ty)?;
            let size_ty = rw.rewrite_type(TermId::SIZE)?;
            Ok(LoweredValue::register(
                size_ty,
                lowered.global(),
                lowered.alignment(),
            ))
        }
        TermKind::Select {
            condition,
            if_true,
            if_false,
        } => {
            let ty = rw.source_graph().type_of(term);
            let ty = rw.rewrite_type(ty)?;
            let condition = rw.rewrite_value_register(condition)?;
            let if_true = rw.rewrite_value(if_true)?;
            let if_false = rw.rewrite_value(if_false)?;
            build_select(rw, &ty, condition, &if_true, &if_false).map_err(|err| err.at(term))
        }

        TermKind::FunctionRef(_) | TermKind::GlobalRef(_) => lower_reference(rw, term),
        TermKind::Parameter { .. } | TermKind::InstructionResult { .. } => Err(
            LoweringError::internal("function-local value used before its definition").at(term),
        ),
        TermKind::RecursiveParameter { .. } | TermKind::UpwardReference { .. } => Err(
            LoweringError::internal("placeholder terms cannot be lowered").at(term),
        ),
    }
}

/// A type used as a value becomes its `(size, alignment)` pair.
fn type_value<'a, R: Rewriter<'a> + ?Sized>(
    rw: &mut R,
    ty: TermId,
) -> Result<LoweredValue, LoweringError> {
    let lowered = rw.rewrite_type(ty)?;
    let metatype = rw.rewrite_type(TermId::METATYPE)?;
    if metatype.is_register() {
        let pair = rw
            .output_graph()
            .struct_value(&[lowered.size(), lowered.alignment()])?;
        Ok(LoweredValue::register(metatype, lowered.global(), pair))
    } else {
        let size_ty = rw.rewrite_type(TermId::SIZE)?;
        let entries = vec![
            LoweredValue::register(size_ty.clone(), lowered.global(), lowered.size()),
            LoweredValue::register(size_ty, lowered.global(), lowered.alignment()),
        ];
        Ok(LoweredValue::split(metatype, entries))
    }
}

/// Rebuild a scalar node over the register lowerings of its operands.
fn default_rewrite<'a, R: Rewriter<'a> + ?Sized>(
    rw: &mut R,
    term: TermId,
    kind: &TermKind,
) -> Result<LoweredValue, LoweringError> {
    let mut global = true;
    let rebuilt = kind.try_map_operands(|operand| {
        let register = rw.rewrite_value_register(operand)?;
        global &= register.global;
        Ok::<_, LoweringError>(register.value)
    })?;
    let value = rw.output_graph().intern(rebuilt)?;
    let ty = rw.source_graph().type_of(term);
    let ty = rw.rewrite_type(ty)?;
    Ok(LoweredValue::register(ty, global, value))
}

fn bit_cast<'a, R: Rewriter<'a> + ?Sized>(
    rw: &mut R,
    term: TermId,
    value: TermId,
    ty: TermId,
) -> Result<LoweredValue, LoweringError> {
    let value = rw.rewrite_value(value)?;
    let ty = rw.rewrite_type(ty)?;
    convert_lowered(rw, &value, &ty).map_err(|err| err.at(term))
}

/// Reinterpret a register value as another register type through the
/// target's conversion hook.
pub(super) fn convert_lowered<'a, R: Rewriter<'a> + ?Sized>(
    rw: &mut R,
    value: &LoweredValue,
    ty: &LoweredType,
) -> Result<LoweredValue, LoweringError> {
    let (Some(register), Some(register_type)) = (value.register_value(), ty.register_type()) else {
        return Err(LoweringError::user(
            "bit-level conversion needs register types on both sides",
        ));
    };
    let target = rw.target();
    let converted = target.convert_value(rw.output_graph(), register, register_type)?;
    Ok(LoweredValue::register(ty.clone(), value.global(), converted))
}

/// Zero or undefined value of source type `ty`.
///
/// The zero of a constant type is the constant itself.
pub(crate) fn zero_or_undef<'a, R: Rewriter<'a> + ?Sized>(
    rw: &mut R,
    ty: TermId,
    zero: bool,
) -> Result<LoweredValue, LoweringError> {
    if zero {
        if let TermKind::ConstantType(value) = *rw.source_graph().kind(ty) {
            return rw.rewrite_value(value);
        }
    }
    let lowered = rw.rewrite_type(ty)?;
    build_zero_undef(rw, &lowered, zero).map_err(|err| err.at(ty))
}

fn build_zero_undef<'a, R: Rewriter<'a> + ?Sized>(
    rw: &mut R,
    ty: &LoweredType,
    zero: bool,
) -> Result<LoweredValue, LoweringError> {
    match ty.mode() {
        LoweredTypeMode::Register(register_type) => {
            let output = rw.output_graph();
            let value = if zero {
                output.zero(*register_type)?
            } else {
                output.undef(*register_type)?
            };
            Ok(LoweredValue::register(ty.clone(), true, value))
        }
        LoweredTypeMode::Split(entries) => {
            let entries = entries
                .iter()
                .map(|entry| build_zero_undef(rw, entry, zero))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(LoweredValue::split(ty.clone(), entries))
        }
        LoweredTypeMode::Blob => Err(LoweringError::user(
            "a type of unknown layout cannot be held in registers",
        )),
    }
}

fn array_value<'a, R: Rewriter<'a> + ?Sized>(
    rw: &mut R,
    term: TermId,
    element: TermId,
    elements: &TermList,
) -> Result<LoweredValue, LoweringError> {
    let array_ty = rw.source_graph().type_of(term);
    let array_ty = rw.rewrite_type(array_ty)?;
    let element_ty = rw.rewrite_type(element)?;
    let entries = elements
        .iter()
        .map(|&value| rw.rewrite_value(value))
        .collect::<Result<Vec<_>, _>>()?;

    match element_ty.register_type().filter(|_| array_ty.is_register()) {
        Some(register_type) => {
            let (values, global) = register_entries(&entries, term)?;
            let value = rw.output_graph().array_value(register_type, &values)?;
            Ok(LoweredValue::register(array_ty, global, value))
        }
        None => Ok(LoweredValue::split(array_ty, entries)),
    }
}

fn struct_value<'a, R: Rewriter<'a> + ?Sized>(
    rw: &mut R,
    term: TermId,
    members: &TermList,
) -> Result<LoweredValue, LoweringError> {
    let struct_ty = rw.source_graph().type_of(term);
    let struct_ty = rw.rewrite_type(struct_ty)?;
    let entries = members
        .iter()
        .map(|&value| rw.rewrite_value(value))
        .collect::<Result<Vec<_>, _>>()?;

    if struct_ty.is_register() {
        let (values, global) = register_entries(&entries, term)?;
        let value = rw.output_graph().struct_value(&values)?;
        Ok(LoweredValue::register(struct_ty, global, value))
    } else {
        Ok(LoweredValue::split(struct_ty, entries))
    }
}

/// Register values of lowered members, and whether all of them are global.
fn register_entries(
    entries: &[LoweredValue],
    term: TermId,
) -> Result<(TermList, bool), LoweringError> {
    let values = entries
        .iter()
        .map(|entry| {
            entry.register_value().ok_or_else(|| {
                LoweringError::internal("member of a register aggregate is not a register")
                    .at(term)
            })
        })
        .collect::<Result<TermList, _>>()?;
    Ok((values, entries.iter().all(LoweredValue::global)))
}

fn union_value<'a, R: Rewriter<'a> + ?Sized>(
    rw: &mut R,
    term: TermId,
    ty: TermId,
    value: TermId,
) -> Result<LoweredValue, LoweringError> {
    let union_ty = rw.rewrite_type(ty)?;
    let Some(register_type) = union_ty.register_type() else {
        return Err(LoweringError::user("cannot build a union value of unknown size").at(term));
    };
    let inner = rw.rewrite_value(value)?;
    if matches!(rw.output_graph().kind(register_type), TermKind::Union(_)) {
        let member = inner.register_value().ok_or_else(|| {
            LoweringError::internal("member of a register union is not a register").at(term)
        })?;
        let value = rw.output_graph().union_value(register_type, member)?;
        Ok(LoweredValue::register(union_ty, inner.global(), value))
    } else {
        convert_lowered(rw, &inner, &union_ty).map_err(|err| err.at(term))
    }
}

fn apply_value<'a, R: Rewriter<'a> + ?Sized>(
    rw: &mut R,
    term: TermId,
    ty: TermId,
    value: TermId,
) -> Result<LoweredValue, LoweringError> {
    let apply_ty = rw.rewrite_type(ty)?;
    let inner = rw.rewrite_value(value)?;
    match (inner.register_value(), apply_ty.mode()) {
        (Some(register), LoweredTypeMode::Register(_)) => Ok(LoweredValue::register(
            apply_ty,
            inner.global(),
            register,
        )),
        (None, LoweredTypeMode::Split(_)) => Ok(LoweredValue::split(apply_ty, vec![inner])),
        _ => Err(LoweringError::internal(
            "recursive instantiation lowered inconsistently with its body",
        )
        .at(term)),
    }
}

fn pointer_offset<'a, R: Rewriter<'a> + ?Sized>(
    rw: &mut R,
    term: TermId,
    pointer: TermId,
    offset: TermId,
) -> Result<LoweredValue, LoweringError> {
    let base = rw.rewrite_value_register(pointer)?;
    let offset = size_register(rw, offset)?;
    let result_ty = rw.source_graph().type_of(term);
    let result_ty = rw.rewrite_type(result_ty)?;
    let target = rw.source_graph().pointer_target(pointer).ok_or_else(|| {
        LoweringError::internal("pointer offset applied to a non-pointer").at(term)
    })?;
    let target = rw.rewrite_type(target)?;
    let to_bytes = rw.config().pointer_arithmetic_to_bytes;
    let global = target.global() && base.global && offset.global;

    let output = rw.output_graph();
    let result = match target.register_type() {
        Some(register_type) if !to_bytes => {
            let typed = output.pointer_cast(base.value, register_type, None)?;
            let moved = output.pointer_offset(typed, offset.value)?;
            output.pointer_cast(moved, TermId::BYTE, None)?
        }
        _ => {
            let bytes = output.mul(target.size(), offset.value)?;
            output.pointer_offset(base.value, bytes)?
        }
    };
    Ok(LoweredValue::register(result_ty, global, result))
}

/// Select between two lowered values of type `ty`, pointwise.
pub(super) fn build_select<'a, R: Rewriter<'a> + ?Sized>(
    rw: &mut R,
    ty: &LoweredType,
    condition: LoweredRegister,
    if_true: &LoweredValue,
    if_false: &LoweredValue,
) -> Result<LoweredValue, LoweringError> {
    match ty.mode() {
        LoweredTypeMode::Register(_) => {
            let (Some(t), Some(f)) = (if_true.register_value(), if_false.register_value()) else {
                return Err(LoweringError::internal("select operands are not registers"));
            };
            let value = rw.output_graph().select(condition.value, t, f)?;
            let global =
                ty.global() && condition.global && if_true.global() && if_false.global();
            Ok(LoweredValue::register(ty.clone(), global, value))
        }
        LoweredTypeMode::Split(types) => {
            let (Some(t), Some(f)) = (if_true.split_entries(), if_false.split_entries()) else {
                return Err(LoweringError::internal("select operands are not split"));
            };
            if t.len() != types.len() || f.len() != types.len() {
                return Err(LoweringError::internal("select operands differ in shape"));
            }
            let entries = types
                .iter()
                .zip(t.iter().zip(f))
                .map(|(ty, (t, f))| build_select(rw, ty, condition, t, f))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(LoweredValue::split(ty.clone(), entries))
        }
        LoweredTypeMode::Blob => Err(LoweringError::user(
            "cannot select between values of unknown layout",
        )),
    }
}
