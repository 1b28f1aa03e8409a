//! Type lowering rules.

use smallvec::SmallVec;

use keel_ir::{IntWidth, TermId, TermKind, TermList};

use super::Rewriter;
use crate::{LoweredRegister, LoweredType, LoweredValueMode, LoweringError};

/// Longest array or union surrogate that is split into one entry per
/// element. Longer ones are rejected rather than materialized.
pub(crate) const MAX_SPLIT_LENGTH: u64 = 1 << 16;

/// Lower the source type `ty`. Called on a cache miss.
pub(crate) fn lower_type<'a, R: Rewriter<'a> + ?Sized>(
    rw: &mut R,
    ty: TermId,
) -> Result<LoweredType, LoweringError> {
    let kind = rw.source_graph().kind(ty).clone();
    match kind {
        TermKind::Empty
        | TermKind::Block
        | TermKind::Bool
        | TermKind::Byte
        | TermKind::Int { .. }
        | TermKind::Float(_) => primitive(rw, ty, &kind),
        TermKind::Pointer { .. } => register_primitive(rw, ty, TermId::BYTE_PTR),
        TermKind::Array { element, length } => array(rw, ty, element, length),
        TermKind::Struct(members) => structure(rw, ty, &members),
        TermKind::Union(members) => union(rw, ty, &members),
        TermKind::Apply { .. } => apply(rw, ty),
        TermKind::Metatype => {
            let metatype = rw
                .source_graph()
                .struct_type(&[TermId::SIZE, TermId::SIZE])?;
            rw.rewrite_type(metatype)
        }
        TermKind::MetatypeValue { size, alignment } => {
            let size = size_register(rw, size)?;
            let alignment = size_register(rw, alignment)?;
            Ok(LoweredType::blob(
                rw.output_graph(),
                Some(ty),
                size.value,
                alignment.value,
            ))
        }
        TermKind::ConstantType(value) => {
            let value_ty = rw.source_graph().type_of(value);
            Ok(rw.rewrite_type(value_ty)?.with_origin(ty))
        }
        TermKind::UpwardReferenceType => Err(LoweringError::internal(
            "upward reference types cannot be lowered",
        )
        .at(ty)),
        TermKind::FunctionType { .. } => Err(LoweringError::internal(
            "function types are only lowered through pointers",
        )
        .at(ty)),
        _ if rw.source_graph().is_type(ty) => parameter_type(rw, ty),
        _ => Err(LoweringError::internal("rewrite_type called on a value").at(ty)),
    }
}

/// Rewrite a size-typed source value as a register.
///
/// Sizes, lengths and offsets combine with target layout terms, which are
/// pointer-sized.
pub(crate) fn size_register<'a, R: Rewriter<'a> + ?Sized>(
    rw: &mut R,
    value: TermId,
) -> Result<LoweredRegister, LoweringError> {
    let register = rw.rewrite_value_register(value)?;
    let output = rw.output_graph();
    let ty = output.type_of(register.value);
    match output.kind(ty) {
        TermKind::Int {
            width: IntWidth::IPtr,
            ..
        } => Ok(register),
        _ => Err(LoweringError::user("sizes, lengths and offsets must be pointer-sized").at(value)),
    }
}

fn primitive<'a, R: Rewriter<'a> + ?Sized>(
    rw: &mut R,
    ty: TermId,
    kind: &TermKind,
) -> Result<LoweredType, LoweringError> {
    let output = rw.output_graph();
    let register_type = match *kind {
        TermKind::Int { width, signed } => output.int_type(width, signed),
        TermKind::Float(width) => output.float_type(width),
        // Remaining primitives are pre-interned with the same id in every graph.
        _ => ty,
    };
    register_primitive(rw, ty, register_type)
}

fn register_primitive<'a, R: Rewriter<'a> + ?Sized>(
    rw: &mut R,
    origin: TermId,
    register_type: TermId,
) -> Result<LoweredType, LoweringError> {
    let target = rw.target();
    let layout = target.type_size_alignment(rw.output_graph(), register_type)?;
    let output = rw.output_graph();
    let size = output.size_value(layout.size);
    let alignment = output.size_value(layout.alignment);
    Ok(LoweredType::register(
        output,
        Some(origin),
        size,
        alignment,
        register_type,
    ))
}

fn array<'a, R: Rewriter<'a> + ?Sized>(
    rw: &mut R,
    ty: TermId,
    element: TermId,
    length: TermId,
) -> Result<LoweredType, LoweringError> {
    let length = size_register(rw, length)?;
    let element = rw.rewrite_type(element)?;
    let split_arrays = rw.config().split_arrays;

    let output = rw.output_graph();
    let size = output.mul(length.value, element.size())?;
    let alignment = element.alignment();

    let literal = output.as_u64(length.value);
    match literal {
        // A blob element makes the whole array a blob.
        Some(n) if element.global() && !element.is_blob() => match element.register_type() {
            Some(register) if !split_arrays => {
                let register_type = output.array_type(register, n)?;
                Ok(LoweredType::register(
                    output,
                    Some(ty),
                    size,
                    alignment,
                    register_type,
                ))
            }
            _ => {
                let count = split_length(n).ok_or_else(|| {
                    LoweringError::user("array too long to split").at(ty)
                })?;
                Ok(LoweredType::split(
                    Some(ty),
                    size,
                    alignment,
                    vec![element; count],
                ))
            }
        },
        _ => Ok(LoweredType::blob(output, Some(ty), size, alignment)),
    }
}

fn structure<'a, R: Rewriter<'a> + ?Sized>(
    rw: &mut R,
    ty: TermId,
    members: &TermList,
) -> Result<LoweredType, LoweringError> {
    let mut entries = Vec::with_capacity(members.len());
    for &member in members {
        entries.push(rw.rewrite_type(member)?);
    }
    let split_structs = rw.config().split_structs;

    let output = rw.output_graph();
    let mut size = output.size_value(0);
    let mut alignment = output.size_value(1);
    for entry in &entries {
        size = output.align_to(size, entry.alignment())?;
        size = output.add(size, entry.size())?;
        alignment = output.max(alignment, entry.alignment())?;
    }
    size = output.align_to(size, alignment)?;

    let registers: Option<SmallVec<[TermId; 4]>> =
        entries.iter().map(LoweredType::register_type).collect();
    let splittable = entries
        .iter()
        .all(|entry| entry.global() && !entry.is_blob());

    match registers {
        Some(registers) if !split_structs => {
            let register_type = output.struct_type(&registers)?;
            Ok(LoweredType::register(
                output,
                Some(ty),
                size,
                alignment,
                register_type,
            ))
        }
        _ if splittable => Ok(LoweredType::split(Some(ty), size, alignment, entries)),
        _ => Ok(LoweredType::blob(output, Some(ty), size, alignment)),
    }
}

fn union<'a, R: Rewriter<'a> + ?Sized>(
    rw: &mut R,
    ty: TermId,
    members: &TermList,
) -> Result<LoweredType, LoweringError> {
    let mut lowered = Vec::with_capacity(members.len());
    for &member in members {
        lowered.push(rw.rewrite_type(member)?);
    }
    let config = rw.config();
    let target = rw.target();

    let output = rw.output_graph();
    let mut size = output.size_value(0);
    let mut alignment = output.size_value(1);
    for member in &lowered {
        size = output.max(size, member.size())?;
        alignment = output.max(alignment, member.alignment())?;
    }
    size = output.align_to(size, alignment)?;

    let registers: Option<SmallVec<[TermId; 4]>> =
        lowered.iter().map(LoweredType::register_type).collect();
    if let Some(registers) = registers.filter(|_| !config.remove_unions) {
        let register_type = output.union_type(&registers)?;
        return Ok(LoweredType::register(
            output,
            Some(ty),
            size,
            alignment,
            register_type,
        ));
    }

    let (Some(size_bytes), Some(alignment_bytes)) = (output.as_u64(size), output.as_u64(alignment))
    else {
        return Ok(LoweredType::blob(output, Some(ty), size, alignment));
    };

    let (element_type, element_size) = target.type_from_alignment(output, alignment_bytes);
    let count = size_bytes / element_size.max(1);
    if count <= 1 {
        return Ok(LoweredType::register(
            output,
            Some(ty),
            size,
            alignment,
            element_type,
        ));
    }
    if config.split_arrays {
        let element_size = output.size_value(element_size);
        let element = LoweredType::register(output, None, element_size, element_size, element_type);
        let count = split_length(count)
            .ok_or_else(|| LoweringError::user("union too large to split").at(ty))?;
        Ok(LoweredType::split(
            Some(ty),
            size,
            alignment,
            vec![element; count],
        ))
    } else {
        let register_type = output.array_type(element_type, count)?;
        Ok(LoweredType::register(
            output,
            Some(ty),
            size,
            alignment,
            register_type,
        ))
    }
}

fn apply<'a, R: Rewriter<'a> + ?Sized>(
    rw: &mut R,
    ty: TermId,
) -> Result<LoweredType, LoweringError> {
    let body = rw.source_graph().unpack(ty)?;
    let inner = rw.rewrite_type(body)?;
    let split_structs = rw.config().split_structs;
    match inner.register_type() {
        Some(register) if !split_structs => Ok(LoweredType::register(
            rw.output_graph(),
            Some(ty),
            inner.size(),
            inner.alignment(),
            register,
        )),
        _ if inner.global() && !inner.is_blob() => Ok(LoweredType::split(
            Some(ty),
            inner.size(),
            inner.alignment(),
            vec![inner.clone()],
        )),
        _ => Ok(LoweredType::blob(
            rw.output_graph(),
            Some(ty),
            inner.size(),
            inner.alignment(),
        )),
    }
}

fn split_length(n: u64) -> Option<usize> {
    if n > MAX_SPLIT_LENGTH {
        return None;
    }
    usize::try_from(n).ok()
}

/// A type only known at run time, such as a function parameter of the
/// metatype: its layout is read out of the lowered `(size, alignment)`
/// pair.
fn parameter_type<'a, R: Rewriter<'a> + ?Sized>(
    rw: &mut R,
    ty: TermId,
) -> Result<LoweredType, LoweringError> {
    let value = rw.rewrite_value(ty)?;
    let (size, alignment) = match value.mode() {
        LoweredValueMode::Register(pair) => {
            let output = rw.output_graph();
            let zero = output.size_value(0);
            let one = output.size_value(1);
            (
                output.element_value(*pair, zero)?,
                output.element_value(*pair, one)?,
            )
        }
        LoweredValueMode::Split(entries) => match entries.as_slice() {
            [size, alignment] => match (size.register_value(), alignment.register_value()) {
                (Some(size), Some(alignment)) => (size, alignment),
                _ => return Err(malformed_layout(ty)),
            },
            _ => return Err(malformed_layout(ty)),
        },
        LoweredValueMode::Empty => return Err(malformed_layout(ty)),
    };
    Ok(LoweredType::blob(
        rw.output_graph(),
        Some(ty),
        size,
        alignment,
    ))
}

fn malformed_layout(ty: TermId) -> LoweringError {
    LoweringError::internal("type value did not lower to a (size, alignment) pair").at(ty)
}
