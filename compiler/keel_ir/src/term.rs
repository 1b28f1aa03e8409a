//! Term handles and node kinds.
//!
//! Every type, value and function-local result in a [`Graph`](crate::Graph)
//! is a *term*: a [`TermKind`] plus the term's own type, addressed by a
//! 32-bit [`TermId`]. Terms are immutable once interned.
//!
//! # Design
//!
//! - `TermKind` is a closed sum type. Passes match on it exhaustively, so a
//!   new node kind is a compile error everywhere it needs handling.
//! - Operand lists use `SmallVec` so that the common 1-4 member aggregates
//!   stay inline in the dedup key.
//! - A handful of terms have fixed ids (`TermId::METATYPE`, `TermId::SIZE`,
//!   ...), pre-interned by [`Graph::new`](crate::Graph::new).

use std::fmt;

use smallvec::SmallVec;

/// Operand list of an aggregate term.
pub type TermList = SmallVec<[TermId; 4]>;

// ── ID newtypes ─────────────────────────────────────────────────────

/// Handle to a term in a [`Graph`](crate::Graph).
///
/// Two handles from the same graph are equal iff the terms are
/// structurally equal (hash-consing).
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
pub struct TermId(u32);

impl TermId {
    // === Pre-interned terms (indices 0-9) ===

    /// The type of types.
    pub const METATYPE: Self = Self(0);
    /// The empty (unit) type.
    pub const EMPTY: Self = Self(1);
    /// The type of basic block labels.
    pub const BLOCK: Self = Self(2);
    /// The boolean type.
    pub const BOOL: Self = Self(3);
    /// The byte type.
    pub const BYTE: Self = Self(4);
    /// Unsigned pointer-sized integer, used for sizes and offsets.
    pub const SIZE: Self = Self(5);
    /// Pointer to byte.
    pub const BYTE_PTR: Self = Self(6);
    /// The only value of the empty type.
    pub const EMPTY_VALUE: Self = Self(7);
    /// Boolean `true`.
    pub const TRUE: Self = Self(8);
    /// Boolean `false`.
    pub const FALSE: Self = Self(9);

    /// Number of pre-interned terms.
    pub const PREINTERNED_COUNT: u32 = 10;

    /// Create a term id from a raw index.
    #[inline]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Get the raw `u32` value.
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Get the index as `usize` (for indexing into `Vec`s).
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for TermId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

macro_rules! id_newtype {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        #[repr(transparent)]
        pub struct $name(u32);

        impl $name {
            /// Create an id from a raw index.
            #[inline]
            pub const fn new(raw: u32) -> Self {
                Self(raw)
            }

            /// Get the raw `u32` value.
            #[inline]
            pub const fn raw(self) -> u32 {
                self.0
            }

            /// Get the index as `usize` (for indexing into `Vec`s).
            #[inline]
            pub const fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

id_newtype!(
    /// Function within a [`Module`](crate::Module).
    FunctionId,
    "fn"
);
id_newtype!(
    /// Global variable within a [`Module`](crate::Module).
    GlobalId,
    "g"
);
id_newtype!(
    /// Basic block within a [`Function`](crate::Function).
    BlockId,
    "bb"
);
id_newtype!(
    /// Recursive type definition within a [`Graph`](crate::Graph).
    RecursiveId,
    "rec"
);

// ── Primitive descriptors ───────────────────────────────────────────

/// Width class of an integer type.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum IntWidth {
    I8,
    I16,
    I32,
    I64,
    I128,
    /// Pointer-sized. Constant folding treats it as 64 bits.
    IPtr,
}

impl IntWidth {
    /// Width in bits used for constant folding.
    pub const fn bits(self) -> u32 {
        match self {
            IntWidth::I8 => 8,
            IntWidth::I16 => 16,
            IntWidth::I32 => 32,
            IntWidth::I64 | IntWidth::IPtr => 64,
            IntWidth::I128 => 128,
        }
    }

    /// Truncate a bit pattern to this width.
    pub const fn truncate(self, bits: u128) -> u128 {
        match self.bits() {
            128 => bits,
            n => bits & ((1u128 << n) - 1),
        }
    }

    /// Sign-extend a bit pattern of this width to 128 bits.
    #[expect(
        clippy::cast_possible_wrap,
        reason = "reinterpreting the bit pattern is the point"
    )]
    pub const fn sign_extend(self, bits: u128) -> i128 {
        let shift = 128 - self.bits();
        ((bits << shift) as i128) >> shift
    }

    /// The integer width with exactly `bytes` bytes, if any.
    pub const fn from_bytes(bytes: u64) -> Option<Self> {
        match bytes {
            1 => Some(IntWidth::I8),
            2 => Some(IntWidth::I16),
            4 => Some(IntWidth::I32),
            8 => Some(IntWidth::I64),
            16 => Some(IntWidth::I128),
            _ => None,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            IntWidth::I8 => "8",
            IntWidth::I16 => "16",
            IntWidth::I32 => "32",
            IntWidth::I64 => "64",
            IntWidth::I128 => "128",
            IntWidth::IPtr => "ptr",
        }
    }
}

/// Width of a floating point type.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FloatWidth {
    F32,
    F64,
    F128,
    /// x87 80-bit extended precision.
    X87,
}

impl FloatWidth {
    pub const fn name(self) -> &'static str {
        match self {
            FloatWidth::F32 => "f32",
            FloatWidth::F64 => "f64",
            FloatWidth::F128 => "f128",
            FloatWidth::X87 => "x87",
        }
    }
}

/// Binary operator on integers.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Max,
    Min,
    /// Round `lhs` up to a multiple of `rhs` (a power of two).
    AlignTo,
    And,
    Or,
    Shl,
    Shr,
    CmpEq,
    CmpNe,
    CmpLt,
    CmpGt,
}

impl BinaryOp {
    /// Whether the result is a boolean.
    pub const fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::CmpEq | BinaryOp::CmpNe | BinaryOp::CmpLt | BinaryOp::CmpGt
        )
    }

    pub const fn name(self) -> &'static str {
        match self {
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            BinaryOp::Mul => "mul",
            BinaryOp::Div => "div",
            BinaryOp::Rem => "rem",
            BinaryOp::Max => "max",
            BinaryOp::Min => "min",
            BinaryOp::AlignTo => "align_to",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            BinaryOp::Shl => "shl",
            BinaryOp::Shr => "shr",
            BinaryOp::CmpEq => "cmp_eq",
            BinaryOp::CmpNe => "cmp_ne",
            BinaryOp::CmpLt => "cmp_lt",
            BinaryOp::CmpGt => "cmp_gt",
        }
    }
}

// ── Term kinds ──────────────────────────────────────────────────────

/// The operation and operands of a term.
///
/// The term's type is stored next to the kind in the graph, and is
/// derived from the operands for every kind except the function-local
/// and module-level references at the bottom of the enum.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TermKind {
    // === Types ===
    /// The type of types.
    Metatype,
    Empty,
    /// Basic block label.
    Block,
    Bool,
    Byte,
    Int {
        width: IntWidth,
        signed: bool,
    },
    Float(FloatWidth),
    /// Pointer to `target`. `upref` is an [`TermKind::UpwardReference`]
    /// describing the aggregate member the pointer was derived from.
    Pointer {
        target: TermId,
        upref: Option<TermId>,
    },
    Array {
        element: TermId,
        length: TermId,
    },
    Struct(TermList),
    Union(TermList),
    /// Instantiation of a recursive type.
    Apply {
        recursive: RecursiveId,
        args: TermList,
    },
    FunctionType {
        result: TermId,
        params: TermList,
        sret: bool,
    },
    /// The type of upward references.
    UpwardReferenceType,
    /// A type only known by its size and alignment.
    MetatypeValue {
        size: TermId,
        alignment: TermId,
    },
    /// A type with exactly one value.
    ConstantType(TermId),
    /// Placeholder for a parameter inside a recursive type body.
    RecursiveParameter {
        recursive: RecursiveId,
        index: u32,
    },

    // === Literals ===
    IntValue {
        width: IntWidth,
        signed: bool,
        bits: u128,
    },
    BoolValue(bool),
    FloatValue {
        width: FloatWidth,
        bits: u128,
    },
    EmptyValue,
    Undef(TermId),
    Zero(TermId),

    // === Aggregate values ===
    ArrayValue {
        element: TermId,
        elements: TermList,
    },
    StructValue(TermList),
    UnionValue {
        ty: TermId,
        value: TermId,
    },
    ApplyValue {
        ty: TermId,
        value: TermId,
    },
    ElementValue {
        aggregate: TermId,
        index: TermId,
    },
    ElementPtr {
        pointer: TermId,
        index: TermId,
    },
    /// Byte offset of member `index` within struct type `ty`.
    StructElementOffset {
        ty: TermId,
        index: u32,
    },
    UpwardReference {
        outer_type: TermId,
        index: TermId,
        next: Option<TermId>,
    },
    /// Pointer to the aggregate containing the member `pointer` points at.
    OuterPtr(TermId),

    // === Pointers, layout and arithmetic ===
    PointerOffset {
        pointer: TermId,
        offset: TermId,
    },
    PointerCast {
        pointer: TermId,
        target: TermId,
        upref: Option<TermId>,
    },
    MetatypeSize(TermId),
    MetatypeAlignment(TermId),
    Select {
        condition: TermId,
        if_true: TermId,
        if_false: TermId,
    },
    Binary {
        op: BinaryOp,
        lhs: TermId,
        rhs: TermId,
    },
    Neg(TermId),
    /// Bit-level reinterpretation of `value` as `ty`.
    BitCast {
        value: TermId,
        ty: TermId,
    },

    // === Externally typed references ===
    FunctionRef(FunctionId),
    GlobalRef(GlobalId),
    Parameter {
        function: FunctionId,
        index: u32,
    },
    InstructionResult {
        function: FunctionId,
        index: u32,
    },
}

impl TermKind {
    /// Every term this kind refers to, in declaration order.
    pub fn operands(&self) -> TermList {
        let mut out = TermList::new();
        match self {
            TermKind::Metatype
            | TermKind::Empty
            | TermKind::Block
            | TermKind::Bool
            | TermKind::Byte
            | TermKind::Int { .. }
            | TermKind::Float(_)
            | TermKind::UpwardReferenceType
            | TermKind::RecursiveParameter { .. }
            | TermKind::IntValue { .. }
            | TermKind::BoolValue(_)
            | TermKind::FloatValue { .. }
            | TermKind::EmptyValue
            | TermKind::FunctionRef(_)
            | TermKind::GlobalRef(_)
            | TermKind::Parameter { .. }
            | TermKind::InstructionResult { .. } => {}

            TermKind::Pointer { target, upref } => {
                out.push(*target);
                out.extend(upref.iter().copied());
            }
            TermKind::Array { element, length } => out.extend([*element, *length]),
            TermKind::Struct(members) | TermKind::Union(members) | TermKind::StructValue(members) => {
                out.extend(members.iter().copied());
            }
            TermKind::Apply { args, .. } => out.extend(args.iter().copied()),
            TermKind::FunctionType { result, params, .. } => {
                out.push(*result);
                out.extend(params.iter().copied());
            }
            TermKind::MetatypeValue { size, alignment } => out.extend([*size, *alignment]),
            TermKind::ConstantType(value)
            | TermKind::Undef(value)
            | TermKind::Zero(value)
            | TermKind::OuterPtr(value)
            | TermKind::MetatypeSize(value)
            | TermKind::MetatypeAlignment(value)
            | TermKind::Neg(value) => out.push(*value),
            TermKind::ArrayValue { element, elements } => {
                out.push(*element);
                out.extend(elements.iter().copied());
            }
            TermKind::UnionValue { ty, value } | TermKind::ApplyValue { ty, value } => {
                out.extend([*ty, *value]);
            }
            TermKind::BitCast { value, ty } => out.extend([*value, *ty]),
            TermKind::ElementValue { aggregate, index } => out.extend([*aggregate, *index]),
            TermKind::ElementPtr { pointer, index } => out.extend([*pointer, *index]),
            TermKind::StructElementOffset { ty, .. } => out.push(*ty),
            TermKind::UpwardReference {
                outer_type,
                index,
                next,
            } => {
                out.extend([*outer_type, *index]);
                out.extend(next.iter().copied());
            }
            TermKind::PointerOffset { pointer, offset } => out.extend([*pointer, *offset]),
            TermKind::PointerCast {
                pointer,
                target,
                upref,
            } => {
                out.extend([*pointer, *target]);
                out.extend(upref.iter().copied());
            }
            TermKind::Select {
                condition,
                if_true,
                if_false,
            } => out.extend([*condition, *if_true, *if_false]),
            TermKind::Binary { lhs, rhs, .. } => out.extend([*lhs, *rhs]),
        }
        out
    }

    /// Rebuild this kind with every operand passed through `f`.
    ///
    /// Operands are visited in the same order as [`TermKind::operands`].
    pub fn try_map_operands<E>(
        &self,
        mut f: impl FnMut(TermId) -> Result<TermId, E>,
    ) -> Result<TermKind, E> {
        fn map_list<E>(
            list: &TermList,
            f: &mut impl FnMut(TermId) -> Result<TermId, E>,
        ) -> Result<TermList, E> {
            list.iter().map(|&t| f(t)).collect()
        }

        let kind = match self {
            TermKind::Metatype
            | TermKind::Empty
            | TermKind::Block
            | TermKind::Bool
            | TermKind::Byte
            | TermKind::Int { .. }
            | TermKind::Float(_)
            | TermKind::UpwardReferenceType
            | TermKind::RecursiveParameter { .. }
            | TermKind::IntValue { .. }
            | TermKind::BoolValue(_)
            | TermKind::FloatValue { .. }
            | TermKind::EmptyValue
            | TermKind::FunctionRef(_)
            | TermKind::GlobalRef(_)
            | TermKind::Parameter { .. }
            | TermKind::InstructionResult { .. } => self.clone(),

            TermKind::Pointer { target, upref } => TermKind::Pointer {
                target: f(*target)?,
                upref: upref.map(&mut f).transpose()?,
            },
            TermKind::Array { element, length } => TermKind::Array {
                element: f(*element)?,
                length: f(*length)?,
            },
            TermKind::Struct(members) => TermKind::Struct(map_list(members, &mut f)?),
            TermKind::Union(members) => TermKind::Union(map_list(members, &mut f)?),
            TermKind::StructValue(members) => TermKind::StructValue(map_list(members, &mut f)?),
            TermKind::Apply { recursive, args } => TermKind::Apply {
                recursive: *recursive,
                args: map_list(args, &mut f)?,
            },
            TermKind::FunctionType {
                result,
                params,
                sret,
            } => TermKind::FunctionType {
                result: f(*result)?,
                params: map_list(params, &mut f)?,
                sret: *sret,
            },
            TermKind::MetatypeValue { size, alignment } => TermKind::MetatypeValue {
                size: f(*size)?,
                alignment: f(*alignment)?,
            },
            TermKind::ConstantType(value) => TermKind::ConstantType(f(*value)?),
            TermKind::Undef(ty) => TermKind::Undef(f(*ty)?),
            TermKind::Zero(ty) => TermKind::Zero(f(*ty)?),
            TermKind::OuterPtr(pointer) => TermKind::OuterPtr(f(*pointer)?),
            TermKind::MetatypeSize(ty) => TermKind::MetatypeSize(f(*ty)?),
            TermKind::MetatypeAlignment(ty) => TermKind::MetatypeAlignment(f(*ty)?),
            TermKind::Neg(value) => TermKind::Neg(f(*value)?),
            TermKind::ArrayValue { element, elements } => TermKind::ArrayValue {
                element: f(*element)?,
                elements: map_list(elements, &mut f)?,
            },
            TermKind::UnionValue { ty, value } => TermKind::UnionValue {
                ty: f(*ty)?,
                value: f(*value)?,
            },
            TermKind::ApplyValue { ty, value } => TermKind::ApplyValue {
                ty: f(*ty)?,
                value: f(*value)?,
            },
            TermKind::BitCast { value, ty } => TermKind::BitCast {
                value: f(*value)?,
                ty: f(*ty)?,
            },
            TermKind::ElementValue { aggregate, index } => TermKind::ElementValue {
                aggregate: f(*aggregate)?,
                index: f(*index)?,
            },
            TermKind::ElementPtr { pointer, index } => TermKind::ElementPtr {
                pointer: f(*pointer)?,
                index: f(*index)?,
            },
            TermKind::StructElementOffset { ty, index } => TermKind::StructElementOffset {
                ty: f(*ty)?,
                index: *index,
            },
            TermKind::UpwardReference {
                outer_type,
                index,
                next,
            } => TermKind::UpwardReference {
                outer_type: f(*outer_type)?,
                index: f(*index)?,
                next: next.map(&mut f).transpose()?,
            },
            TermKind::PointerOffset { pointer, offset } => TermKind::PointerOffset {
                pointer: f(*pointer)?,
                offset: f(*offset)?,
            },
            TermKind::PointerCast {
                pointer,
                target,
                upref,
            } => TermKind::PointerCast {
                pointer: f(*pointer)?,
                target: f(*target)?,
                upref: upref.map(&mut f).transpose()?,
            },
            TermKind::Select {
                condition,
                if_true,
                if_false,
            } => TermKind::Select {
                condition: f(*condition)?,
                if_true: f(*if_true)?,
                if_false: f(*if_false)?,
            },
            TermKind::Binary { op, lhs, rhs } => TermKind::Binary {
                op: *op,
                lhs: f(*lhs)?,
                rhs: f(*rhs)?,
            },
        };
        Ok(kind)
    }

    /// Whether this kind's type must be supplied by the caller.
    pub const fn is_externally_typed(&self) -> bool {
        matches!(
            self,
            TermKind::FunctionRef(_)
                | TermKind::GlobalRef(_)
                | TermKind::Parameter { .. }
                | TermKind::InstructionResult { .. }
        )
    }

    /// Whether this kind is a primitive scalar type.
    pub const fn is_primitive_type(&self) -> bool {
        matches!(
            self,
            TermKind::Empty
                | TermKind::Block
                | TermKind::Bool
                | TermKind::Byte
                | TermKind::Int { .. }
                | TermKind::Float(_)
        )
    }
}
