//! Constant folding and algebraic identities applied at intern time.
//!
//! Folding runs before type inference, so every rule here checks that the
//! operand types line up before rewriting; anything it cannot prove is left
//! for [`super::infer`] to accept or reject.

use crate::{BinaryOp, Graph, IntWidth, IrError, TermId, TermKind};

/// Return an existing term equivalent to `kind`, if one can be found.
pub(super) fn simplify(graph: &mut Graph, kind: &TermKind) -> Result<Option<TermId>, IrError> {
    match *kind {
        TermKind::Binary { op, lhs, rhs } => fold_binary(graph, op, lhs, rhs),
        TermKind::Neg(value) => fold_neg(graph, value),
        TermKind::Select {
            condition,
            if_true,
            if_false,
        } => Ok(fold_select(graph, condition, if_true, if_false)),
        TermKind::PointerOffset { pointer, offset } => {
            let unreferenced = matches!(
                graph.kind(graph.type_of(pointer)),
                TermKind::Pointer { upref: None, .. }
            );
            if unreferenced && graph.as_int(offset) == Some(0) {
                Ok(Some(pointer))
            } else {
                Ok(None)
            }
        }
        TermKind::PointerCast {
            pointer,
            target,
            upref,
        } => match *graph.kind(graph.type_of(pointer)) {
            TermKind::Pointer {
                target: from,
                upref: from_upref,
            } if from == target && from_upref == upref => Ok(Some(pointer)),
            _ => Ok(None),
        },
        TermKind::BitCast { value, ty } if graph.type_of(value) == ty => Ok(Some(value)),
        TermKind::ElementValue { aggregate, index } => fold_element(graph, aggregate, index),
        TermKind::MetatypeSize(ty) => match *graph.kind(ty) {
            TermKind::MetatypeValue { size, .. } => Ok(Some(size)),
            _ => Ok(None),
        },
        TermKind::MetatypeAlignment(ty) => match *graph.kind(ty) {
            TermKind::MetatypeValue { alignment, .. } => Ok(Some(alignment)),
            _ => Ok(None),
        },
        _ => Ok(None),
    }
}

/// Width and signedness of an integer-typed value.
fn int_params(graph: &Graph, value: TermId) -> Option<(IntWidth, bool)> {
    match *graph.kind(graph.type_of(value)) {
        TermKind::Int { width, signed } => Some((width, signed)),
        _ => None,
    }
}

fn fold_binary(
    graph: &mut Graph,
    op: BinaryOp,
    lhs: TermId,
    rhs: TermId,
) -> Result<Option<TermId>, IrError> {
    let (Some((width, signed)), Some((rhs_width, _))) = (int_params(graph, lhs), int_params(graph, rhs))
    else {
        return Ok(None);
    };
    if width != rhs_width {
        return Ok(None);
    }

    if let (Some(a), Some(b)) = (graph.as_int(lhs), graph.as_int(rhs)) {
        return match eval_binary(op, width, signed, a, b) {
            Some(Folded::Bool(value)) => Ok(Some(graph.bool_value(value))),
            Some(Folded::Int(bits)) => Ok(Some(graph.int_value(width, signed, bits))),
            None => Ok(None),
        };
    }

    let rhs_lit = graph.as_int(rhs);
    let folded = match (op, rhs_lit) {
        (BinaryOp::Add | BinaryOp::Sub | BinaryOp::Or | BinaryOp::Shl | BinaryOp::Shr, Some(0))
        | (BinaryOp::Mul | BinaryOp::Div | BinaryOp::AlignTo, Some(1)) => Some(lhs),
        (BinaryOp::Mul | BinaryOp::And, Some(0)) => Some(graph.int_value(width, signed, 0)),
        (BinaryOp::Max | BinaryOp::Min | BinaryOp::And | BinaryOp::Or, _) if lhs == rhs => {
            Some(lhs)
        }
        (BinaryOp::CmpEq, _) if lhs == rhs => Some(TermId::TRUE),
        (BinaryOp::CmpNe | BinaryOp::CmpLt | BinaryOp::CmpGt, _) if lhs == rhs => {
            Some(TermId::FALSE)
        }
        _ => None,
    };
    if folded.is_some() {
        return Ok(folded);
    }
    // 0 + x, 1 * x
    match (op, graph.as_int(lhs)) {
        (BinaryOp::Add | BinaryOp::Or, Some(0)) | (BinaryOp::Mul, Some(1)) => Ok(Some(rhs)),
        _ => Ok(None),
    }
}

enum Folded {
    Int(u128),
    Bool(bool),
}

#[expect(
    clippy::cast_sign_loss,
    reason = "signed results are stored as their two's complement bit pattern"
)]
fn eval_binary(op: BinaryOp, width: IntWidth, signed: bool, a: u128, b: u128) -> Option<Folded> {
    let sa = width.sign_extend(a);
    let sb = width.sign_extend(b);
    let bits = match op {
        BinaryOp::Add => a.wrapping_add(b),
        BinaryOp::Sub => a.wrapping_sub(b),
        BinaryOp::Mul => a.wrapping_mul(b),
        BinaryOp::Div if signed => sa.checked_div(sb)? as u128,
        BinaryOp::Div => a.checked_div(b)?,
        BinaryOp::Rem if signed => sa.checked_rem(sb)? as u128,
        BinaryOp::Rem => a.checked_rem(b)?,
        BinaryOp::Max if signed => sa.max(sb) as u128,
        BinaryOp::Max => a.max(b),
        BinaryOp::Min if signed => sa.min(sb) as u128,
        BinaryOp::Min => a.min(b),
        BinaryOp::AlignTo => {
            if !b.is_power_of_two() {
                return None;
            }
            a.checked_add(b - 1)? & !(b - 1)
        }
        BinaryOp::And => a & b,
        BinaryOp::Or => a | b,
        BinaryOp::Shl => {
            let shift = u32::try_from(b).ok().filter(|&s| s < width.bits())?;
            a << shift
        }
        BinaryOp::Shr => {
            let shift = u32::try_from(b).ok().filter(|&s| s < width.bits())?;
            if signed {
                (sa >> shift) as u128
            } else {
                a >> shift
            }
        }
        BinaryOp::CmpEq => return Some(Folded::Bool(a == b)),
        BinaryOp::CmpNe => return Some(Folded::Bool(a != b)),
        BinaryOp::CmpLt if signed => return Some(Folded::Bool(sa < sb)),
        BinaryOp::CmpLt => return Some(Folded::Bool(a < b)),
        BinaryOp::CmpGt if signed => return Some(Folded::Bool(sa > sb)),
        BinaryOp::CmpGt => return Some(Folded::Bool(a > b)),
    };
    Some(Folded::Int(width.truncate(bits)))
}

fn fold_neg(graph: &mut Graph, value: TermId) -> Result<Option<TermId>, IrError> {
    match *graph.kind(value) {
        TermKind::IntValue {
            width,
            signed,
            bits,
        } => Ok(Some(graph.int_value(width, signed, 0u128.wrapping_sub(bits)))),
        TermKind::Neg(inner) => Ok(Some(inner)),
        _ => Ok(None),
    }
}

fn fold_select(
    graph: &Graph,
    condition: TermId,
    if_true: TermId,
    if_false: TermId,
) -> Option<TermId> {
    if graph.type_of(condition) != TermId::BOOL
        || graph.type_of(if_true) != graph.type_of(if_false)
    {
        return None;
    }
    if if_true == if_false {
        return Some(if_true);
    }
    graph
        .as_bool(condition)
        .map(|c| if c { if_true } else { if_false })
}

fn fold_element(
    graph: &mut Graph,
    aggregate: TermId,
    index: TermId,
) -> Result<Option<TermId>, IrError> {
    let literal = graph.as_u64(index).and_then(|i| usize::try_from(i).ok());
    match graph.kind(aggregate).clone() {
        TermKind::StructValue(members) => Ok(literal.and_then(|i| members.get(i).copied())),
        TermKind::ArrayValue { elements, .. } => {
            Ok(literal.and_then(|i| elements.get(i).copied()))
        }
        TermKind::UnionValue { ty, value } => {
            let member = graph.member_type(ty, index)?;
            Ok((graph.type_of(value) == member).then_some(value))
        }
        TermKind::ApplyValue { value, .. } if literal == Some(0) => Ok(Some(value)),
        TermKind::Zero(ty) => {
            let member = graph.member_type(ty, index)?;
            graph.zero(member).map(Some)
        }
        TermKind::Undef(ty) => {
            let member = graph.member_type(ty, index)?;
            graph.undef(member).map(Some)
        }
        _ => Ok(None),
    }
}
