//! Construction helpers for the graph.
//!
//! Thin wrappers over [`Graph::intern`] so that callers never spell out
//! `TermKind` literals. Primitive constructors cannot fail; everything
//! that takes operands is type-checked and returns `Result`.

use crate::{BinaryOp, FloatWidth, Graph, IntWidth, IrError, RecursiveId, TermId, TermKind, TermList};

impl Graph {
    // === Primitive types ===

    pub fn int_type(&mut self, width: IntWidth, signed: bool) -> TermId {
        self.intern_type(TermKind::Int { width, signed })
    }

    pub fn float_type(&mut self, width: FloatWidth) -> TermId {
        self.intern_type(TermKind::Float(width))
    }

    /// The type of [`TermKind::UpwardReference`] values.
    pub fn upward_reference_type(&mut self) -> TermId {
        self.intern_type(TermKind::UpwardReferenceType)
    }

    // === Compound types ===

    /// Create a pointer type `target*` with no upward reference.
    pub fn pointer_type(&mut self, target: TermId) -> Result<TermId, IrError> {
        self.intern(TermKind::Pointer {
            target,
            upref: None,
        })
    }

    /// Create a pointer type carrying an upward reference.
    pub fn pointer_type_upref(
        &mut self,
        target: TermId,
        upref: Option<TermId>,
    ) -> Result<TermId, IrError> {
        self.intern(TermKind::Pointer { target, upref })
    }

    /// Create an array type `[element; length]` with a literal length.
    pub fn array_type(&mut self, element: TermId, length: u64) -> Result<TermId, IrError> {
        let length = self.size_value(length);
        self.array_type_dyn(element, length)
    }

    /// Create an array type whose length is an arbitrary size value.
    pub fn array_type_dyn(&mut self, element: TermId, length: TermId) -> Result<TermId, IrError> {
        self.intern(TermKind::Array { element, length })
    }

    pub fn struct_type(&mut self, members: &[TermId]) -> Result<TermId, IrError> {
        self.intern(TermKind::Struct(members.into()))
    }

    pub fn union_type(&mut self, members: &[TermId]) -> Result<TermId, IrError> {
        self.intern(TermKind::Union(members.into()))
    }

    pub fn function_type(
        &mut self,
        result: TermId,
        params: &[TermId],
        sret: bool,
    ) -> Result<TermId, IrError> {
        self.intern(TermKind::FunctionType {
            result,
            params: params.into(),
            sret,
        })
    }

    /// Instantiate a recursive type with `args`.
    pub fn apply(&mut self, recursive: RecursiveId, args: &[TermId]) -> Result<TermId, IrError> {
        self.intern(TermKind::Apply {
            recursive,
            args: args.into(),
        })
    }

    /// A type described only by its size and alignment.
    pub fn metatype_value(&mut self, size: TermId, alignment: TermId) -> Result<TermId, IrError> {
        self.intern(TermKind::MetatypeValue { size, alignment })
    }

    /// The singleton type whose only value is `value`.
    pub fn constant_type(&mut self, value: TermId) -> Result<TermId, IrError> {
        self.intern(TermKind::ConstantType(value))
    }

    // === Literals ===

    /// A size (unsigned pointer-width) literal.
    pub fn size_value(&mut self, value: u64) -> TermId {
        self.int_value(IntWidth::IPtr, false, u128::from(value))
    }

    /// An integer literal; `bits` is truncated to `width`.
    pub fn int_value(&mut self, width: IntWidth, signed: bool, bits: u128) -> TermId {
        let ty = self.int_type(width, signed);
        self.insert(
            TermKind::IntValue {
                width,
                signed,
                bits: width.truncate(bits),
            },
            ty,
        )
    }

    pub fn bool_value(&mut self, value: bool) -> TermId {
        if value {
            TermId::TRUE
        } else {
            TermId::FALSE
        }
    }

    pub fn float_value(&mut self, width: FloatWidth, bits: u128) -> TermId {
        let ty = self.float_type(width);
        self.insert(TermKind::FloatValue { width, bits }, ty)
    }

    pub fn undef(&mut self, ty: TermId) -> Result<TermId, IrError> {
        self.intern(TermKind::Undef(ty))
    }

    pub fn zero(&mut self, ty: TermId) -> Result<TermId, IrError> {
        self.intern(TermKind::Zero(ty))
    }

    // === Aggregate values ===

    pub fn struct_value(&mut self, members: &[TermId]) -> Result<TermId, IrError> {
        self.intern(TermKind::StructValue(members.into()))
    }

    pub fn array_value(&mut self, element: TermId, elements: &[TermId]) -> Result<TermId, IrError> {
        self.intern(TermKind::ArrayValue {
            element,
            elements: elements.into(),
        })
    }

    pub fn union_value(&mut self, ty: TermId, value: TermId) -> Result<TermId, IrError> {
        self.intern(TermKind::UnionValue { ty, value })
    }

    pub fn apply_value(&mut self, ty: TermId, value: TermId) -> Result<TermId, IrError> {
        self.intern(TermKind::ApplyValue { ty, value })
    }

    /// Member `index` of an aggregate value.
    pub fn element_value(&mut self, aggregate: TermId, index: TermId) -> Result<TermId, IrError> {
        self.intern(TermKind::ElementValue { aggregate, index })
    }

    /// Pointer to member `index` of the aggregate `pointer` points at.
    pub fn element_ptr(&mut self, pointer: TermId, index: TermId) -> Result<TermId, IrError> {
        self.intern(TermKind::ElementPtr { pointer, index })
    }

    pub fn struct_element_offset(&mut self, ty: TermId, index: u32) -> Result<TermId, IrError> {
        self.intern(TermKind::StructElementOffset { ty, index })
    }

    pub fn upward_reference(
        &mut self,
        outer_type: TermId,
        index: TermId,
        next: Option<TermId>,
    ) -> Result<TermId, IrError> {
        self.intern(TermKind::UpwardReference {
            outer_type,
            index,
            next,
        })
    }

    pub fn outer_ptr(&mut self, pointer: TermId) -> Result<TermId, IrError> {
        self.intern(TermKind::OuterPtr(pointer))
    }

    // === Pointers and layout ===

    /// Advance `pointer` by `offset` elements of its target type.
    pub fn pointer_offset(&mut self, pointer: TermId, offset: TermId) -> Result<TermId, IrError> {
        self.intern(TermKind::PointerOffset { pointer, offset })
    }

    pub fn pointer_cast(
        &mut self,
        pointer: TermId,
        target: TermId,
        upref: Option<TermId>,
    ) -> Result<TermId, IrError> {
        self.intern(TermKind::PointerCast {
            pointer,
            target,
            upref,
        })
    }

    pub fn metatype_size(&mut self, ty: TermId) -> Result<TermId, IrError> {
        self.intern(TermKind::MetatypeSize(ty))
    }

    pub fn metatype_alignment(&mut self, ty: TermId) -> Result<TermId, IrError> {
        self.intern(TermKind::MetatypeAlignment(ty))
    }

    // === Arithmetic ===

    pub fn select(
        &mut self,
        condition: TermId,
        if_true: TermId,
        if_false: TermId,
    ) -> Result<TermId, IrError> {
        self.intern(TermKind::Select {
            condition,
            if_true,
            if_false,
        })
    }

    pub fn binary(&mut self, op: BinaryOp, lhs: TermId, rhs: TermId) -> Result<TermId, IrError> {
        self.intern(TermKind::Binary { op, lhs, rhs })
    }

    pub fn add(&mut self, lhs: TermId, rhs: TermId) -> Result<TermId, IrError> {
        self.binary(BinaryOp::Add, lhs, rhs)
    }

    pub fn sub(&mut self, lhs: TermId, rhs: TermId) -> Result<TermId, IrError> {
        self.binary(BinaryOp::Sub, lhs, rhs)
    }

    pub fn mul(&mut self, lhs: TermId, rhs: TermId) -> Result<TermId, IrError> {
        self.binary(BinaryOp::Mul, lhs, rhs)
    }

    pub fn max(&mut self, lhs: TermId, rhs: TermId) -> Result<TermId, IrError> {
        self.binary(BinaryOp::Max, lhs, rhs)
    }

    /// Round `value` up to a multiple of `alignment`.
    pub fn align_to(&mut self, value: TermId, alignment: TermId) -> Result<TermId, IrError> {
        self.binary(BinaryOp::AlignTo, value, alignment)
    }

    pub fn cmp_eq(&mut self, lhs: TermId, rhs: TermId) -> Result<TermId, IrError> {
        self.binary(BinaryOp::CmpEq, lhs, rhs)
    }

    pub fn neg(&mut self, value: TermId) -> Result<TermId, IrError> {
        self.intern(TermKind::Neg(value))
    }

    pub fn bit_cast(&mut self, value: TermId, ty: TermId) -> Result<TermId, IrError> {
        self.intern(TermKind::BitCast { value, ty })
    }

    // === Queries ===

    /// The type of member `index` of aggregate type `ty`.
    ///
    /// Struct and union members need a literal index; arrays accept any
    /// size value. Index 0 of a recursive instantiation is its unpacked
    /// body.
    pub fn member_type(&mut self, ty: TermId, index: TermId) -> Result<TermId, IrError> {
        let literal = self.as_u64(index);
        match self.kind(ty) {
            TermKind::Struct(members) | TermKind::Union(members) => {
                let i = literal.ok_or(IrError::NonConstantIndex(index))?;
                usize::try_from(i)
                    .ok()
                    .and_then(|i| members.get(i).copied())
                    .ok_or(IrError::IndexOutOfRange {
                        term: ty,
                        index: i,
                        len: members.len(),
                    })
            }
            TermKind::Array { element, .. } => Ok(*element),
            TermKind::Apply { .. } => match literal {
                Some(0) => self.unpack(ty),
                Some(i) => Err(IrError::IndexOutOfRange {
                    term: ty,
                    index: i,
                    len: 1,
                }),
                None => Err(IrError::NonConstantIndex(index)),
            },
            _ => Err(IrError::NotAnAggregate(ty)),
        }
    }

    /// Members of a struct or union type.
    pub fn members(&self, ty: TermId) -> Option<&TermList> {
        match self.kind(ty) {
            TermKind::Struct(members) | TermKind::Union(members) => Some(members),
            _ => None,
        }
    }
}
