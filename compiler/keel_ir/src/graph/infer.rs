//! Type inference for newly interned terms.
//!
//! Every kind except the externally typed references has its type fully
//! determined by its operands. Ill-formed operands are rejected here, so
//! every term in a graph is well-typed.

use crate::{Graph, IrError, TermId, TermKind, TermList};

pub(super) fn type_of(graph: &mut Graph, kind: &TermKind) -> Result<TermId, IrError> {
    let ty = match kind {
        TermKind::Metatype
        | TermKind::Empty
        | TermKind::Block
        | TermKind::Bool
        | TermKind::Byte
        | TermKind::Int { .. }
        | TermKind::Float(_)
        | TermKind::UpwardReferenceType => TermId::METATYPE,

        TermKind::Apply { recursive, args } => {
            let params = graph.recursive(*recursive).params.clone();
            if params.len() != args.len() {
                return Err(IrError::ArgumentCount {
                    expected: params.len(),
                    found: args.len(),
                });
            }
            for (&param, &arg) in params.iter().zip(args) {
                let expected = graph.type_of(param);
                expect_type_is(graph, arg, expected)?;
            }
            TermId::METATYPE
        }

        TermKind::Pointer { target, upref } => {
            expect_type(graph, *target)?;
            if let Some(upref) = upref {
                let upref_ty = graph.upward_reference_type();
                expect_type_is(graph, *upref, upref_ty)?;
            }
            TermId::METATYPE
        }
        TermKind::Array { element, length } => {
            expect_type(graph, *element)?;
            expect_integer(graph, *length)?;
            TermId::METATYPE
        }
        TermKind::Struct(members) | TermKind::Union(members) => {
            for &member in members {
                expect_type(graph, member)?;
            }
            TermId::METATYPE
        }
        TermKind::FunctionType { result, params, .. } => {
            expect_type(graph, *result)?;
            for &param in params {
                expect_type(graph, param)?;
            }
            TermId::METATYPE
        }
        TermKind::MetatypeValue { size, alignment } => {
            expect_integer(graph, *size)?;
            expect_integer(graph, *alignment)?;
            TermId::METATYPE
        }
        TermKind::ConstantType(_) => TermId::METATYPE,
        TermKind::RecursiveParameter { recursive, index } => {
            let param = graph
                .recursive(*recursive)
                .params
                .get(*index as usize)
                .copied()
                .ok_or(IrError::IndexOutOfRange {
                    term: TermId::METATYPE,
                    index: u64::from(*index),
                    len: graph.recursive(*recursive).params.len(),
                })?;
            graph.type_of(param)
        }

        TermKind::IntValue { width, signed, .. } => graph.int_type(*width, *signed),
        TermKind::BoolValue(_) => TermId::BOOL,
        TermKind::FloatValue { width, .. } => graph.float_type(*width),
        TermKind::EmptyValue => TermId::EMPTY,
        TermKind::Undef(ty) | TermKind::Zero(ty) => {
            expect_type(graph, *ty)?;
            *ty
        }

        TermKind::ArrayValue { element, elements } => {
            expect_type(graph, *element)?;
            for &value in elements {
                expect_type_is(graph, value, *element)?;
            }
            let length = graph.size_value(elements.len() as u64);
            graph.intern_type(TermKind::Array {
                element: *element,
                length,
            })
        }
        TermKind::StructValue(members) => {
            let types: TermList = members.iter().map(|&m| graph.type_of(m)).collect();
            graph.intern_type(TermKind::Struct(types))
        }
        TermKind::UnionValue { ty, value } => {
            let TermKind::Union(members) = graph.kind(*ty) else {
                return Err(IrError::NotAnAggregate(*ty));
            };
            let value_ty = graph.type_of(*value);
            if !members.contains(&value_ty) {
                return Err(IrError::TypeMismatch {
                    expected: *ty,
                    found: value_ty,
                });
            }
            *ty
        }
        TermKind::ApplyValue { ty, value } => {
            if !matches!(graph.kind(*ty), TermKind::Apply { .. }) {
                return Err(IrError::NotAnAggregate(*ty));
            }
            let inner = graph.unpack(*ty)?;
            expect_type_is(graph, *value, inner)?;
            *ty
        }
        TermKind::ElementValue { aggregate, index } => {
            let aggregate_ty = graph.type_of(*aggregate);
            graph.member_type(aggregate_ty, *index)?
        }
        TermKind::ElementPtr { pointer, index } => {
            let (aggregate_ty, outer_upref) = pointer_parts(graph, *pointer)?;
            let member = graph.member_type(aggregate_ty, *index)?;
            let upref = graph.intern(TermKind::UpwardReference {
                outer_type: aggregate_ty,
                index: *index,
                next: outer_upref,
            })?;
            graph.intern_type(TermKind::Pointer {
                target: member,
                upref: Some(upref),
            })
        }
        TermKind::StructElementOffset { ty, index } => {
            let TermKind::Struct(members) = graph.kind(*ty) else {
                return Err(IrError::NotAStruct(*ty));
            };
            if *index as usize >= members.len() {
                return Err(IrError::IndexOutOfRange {
                    term: *ty,
                    index: u64::from(*index),
                    len: members.len(),
                });
            }
            TermId::SIZE
        }
        TermKind::UpwardReference {
            outer_type, index, ..
        } => {
            expect_type(graph, *outer_type)?;
            expect_integer(graph, *index)?;
            graph.upward_reference_type()
        }
        TermKind::OuterPtr(pointer) => {
            let (_, upref) = pointer_parts(graph, *pointer)?;
            let upref = upref.ok_or(IrError::MissingUpwardReference(*pointer))?;
            let TermKind::UpwardReference {
                outer_type, next, ..
            } = *graph.kind(upref)
            else {
                return Err(IrError::MissingUpwardReference(*pointer));
            };
            graph.intern_type(TermKind::Pointer {
                target: outer_type,
                upref: next,
            })
        }

        TermKind::PointerOffset { pointer, offset } => {
            let (target, _) = pointer_parts(graph, *pointer)?;
            expect_integer(graph, *offset)?;
            graph.pointer_type(target)?
        }
        TermKind::PointerCast {
            pointer,
            target,
            upref,
        } => {
            pointer_parts(graph, *pointer)?;
            expect_type(graph, *target)?;
            graph.intern_type(TermKind::Pointer {
                target: *target,
                upref: *upref,
            })
        }
        TermKind::MetatypeSize(ty) | TermKind::MetatypeAlignment(ty) => {
            expect_type(graph, *ty)?;
            TermId::SIZE
        }
        TermKind::Select {
            condition,
            if_true,
            if_false,
        } => {
            expect_type_is(graph, *condition, TermId::BOOL)?;
            let ty = graph.type_of(*if_true);
            expect_type_is(graph, *if_false, ty)?;
            ty
        }
        TermKind::Binary { op, lhs, rhs } => {
            let lhs_ty = expect_integer(graph, *lhs)?;
            let rhs_ty = expect_integer(graph, *rhs)?;
            if !same_width(graph, lhs_ty, rhs_ty) {
                return Err(IrError::TypeMismatch {
                    expected: lhs_ty,
                    found: rhs_ty,
                });
            }
            if op.is_comparison() {
                TermId::BOOL
            } else {
                lhs_ty
            }
        }
        TermKind::Neg(value) => expect_integer(graph, *value)?,
        TermKind::BitCast { ty, .. } => {
            expect_type(graph, *ty)?;
            *ty
        }

        TermKind::FunctionRef(_)
        | TermKind::GlobalRef(_)
        | TermKind::Parameter { .. }
        | TermKind::InstructionResult { .. } => return Err(IrError::UntypedTerm),
    };
    Ok(ty)
}

fn expect_type(graph: &Graph, term: TermId) -> Result<(), IrError> {
    if graph.is_type(term) {
        Ok(())
    } else {
        Err(IrError::NotAType(term))
    }
}

fn expect_type_is(graph: &Graph, value: TermId, expected: TermId) -> Result<(), IrError> {
    let found = graph.type_of(value);
    if found == expected {
        Ok(())
    } else {
        Err(IrError::TypeMismatch { expected, found })
    }
}

/// Check that `value` is an integer (or byte) and return its type.
fn expect_integer(graph: &Graph, value: TermId) -> Result<TermId, IrError> {
    let ty = graph.type_of(value);
    match graph.kind(ty) {
        TermKind::Int { .. } | TermKind::Byte => Ok(ty),
        _ => Err(IrError::NotAnInteger(value)),
    }
}

/// Integer types of the same width class, ignoring signedness.
fn same_width(graph: &Graph, a: TermId, b: TermId) -> bool {
    match (graph.kind(a), graph.kind(b)) {
        (TermKind::Int { width: wa, .. }, TermKind::Int { width: wb, .. }) => wa == wb,
        _ => a == b,
    }
}

/// Target type and upward reference of a pointer value.
fn pointer_parts(graph: &Graph, pointer: TermId) -> Result<(TermId, Option<TermId>), IrError> {
    match *graph.kind(graph.type_of(pointer)) {
        TermKind::Pointer { target, upref } => Ok((target, upref)),
        _ => Err(IrError::NotAPointer(pointer)),
    }
}
