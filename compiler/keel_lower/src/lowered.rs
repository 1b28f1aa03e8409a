//! The lowered type and value model.
//!
//! A [`LoweredType`] says how the backend sees a source type: as one
//! concrete register type, as an ordered list of sub-lowerings, or as an
//! opaque blob of known size and alignment. A [`LoweredValue`] mirrors it
//! for values.
//!
//! # Design
//!
//! Both are reference-counted handles to immutable data. The rewriter
//! caches one handle per source term and context, so "rewriting the same
//! term twice yields the same lowering" is checkable with
//! [`LoweredType::ptr_eq`] and [`LoweredValue::ptr_eq`].
//!
//! The `global` flag is always derived from the parts at construction:
//! register and blob types from their size and alignment terms, split
//! types and values from their entries.

use std::rc::Rc;

use keel_ir::{Graph, TermId};

// ── Types ───────────────────────────────────────────────────────────

/// How a lowered type is represented.
#[derive(Clone, Debug)]
pub enum LoweredTypeMode {
    /// One concrete backend type in the output graph.
    Register(TermId),
    /// An ordered sequence of sub-lowerings laid out like struct members.
    Split(Vec<LoweredType>),
    /// Only size and alignment are known; values live in memory.
    Blob,
}

#[derive(Debug)]
struct LoweredTypeData {
    origin: Option<TermId>,
    size: TermId,
    alignment: TermId,
    mode: LoweredTypeMode,
    global: bool,
}

/// Lowering of a source type.
///
/// `size` and `alignment` are size-typed values in the output graph and
/// need not be literals.
#[derive(Clone, Debug)]
pub struct LoweredType(Rc<LoweredTypeData>);

impl LoweredType {
    /// A type held in one backend register type.
    pub fn register(
        graph: &Graph,
        origin: Option<TermId>,
        size: TermId,
        alignment: TermId,
        register_type: TermId,
    ) -> Self {
        let global = graph.is_global(size) && graph.is_global(alignment);
        Self::build(origin, size, alignment, LoweredTypeMode::Register(register_type), global)
    }

    /// A type decomposed into `entries`.
    pub fn split(
        origin: Option<TermId>,
        size: TermId,
        alignment: TermId,
        entries: Vec<LoweredType>,
    ) -> Self {
        let global = entries.iter().all(LoweredType::global);
        Self::build(origin, size, alignment, LoweredTypeMode::Split(entries), global)
    }

    /// A type known only by size and alignment.
    pub fn blob(graph: &Graph, origin: Option<TermId>, size: TermId, alignment: TermId) -> Self {
        let global = graph.is_global(size) && graph.is_global(alignment);
        Self::build(origin, size, alignment, LoweredTypeMode::Blob, global)
    }

    fn build(
        origin: Option<TermId>,
        size: TermId,
        alignment: TermId,
        mode: LoweredTypeMode,
        global: bool,
    ) -> Self {
        LoweredType(Rc::new(LoweredTypeData {
            origin,
            size,
            alignment,
            mode,
            global,
        }))
    }

    /// The same lowering attributed to a different source type.
    #[must_use]
    pub fn with_origin(&self, origin: TermId) -> Self {
        Self::build(
            Some(origin),
            self.0.size,
            self.0.alignment,
            self.0.mode.clone(),
            self.0.global,
        )
    }

    /// The source type this lowering was produced for, if any.
    #[inline]
    pub fn origin(&self) -> Option<TermId> {
        self.0.origin
    }

    #[inline]
    pub fn size(&self) -> TermId {
        self.0.size
    }

    #[inline]
    pub fn alignment(&self) -> TermId {
        self.0.alignment
    }

    #[inline]
    pub fn mode(&self) -> &LoweredTypeMode {
        &self.0.mode
    }

    /// Whether the layout is independent of function-local values.
    #[inline]
    pub fn global(&self) -> bool {
        self.0.global
    }

    pub fn register_type(&self) -> Option<TermId> {
        match self.0.mode {
            LoweredTypeMode::Register(ty) => Some(ty),
            _ => None,
        }
    }

    pub fn split_entries(&self) -> Option<&[LoweredType]> {
        match &self.0.mode {
            LoweredTypeMode::Split(entries) => Some(entries),
            _ => None,
        }
    }

    pub fn is_register(&self) -> bool {
        matches!(self.0.mode, LoweredTypeMode::Register(_))
    }

    pub fn is_blob(&self) -> bool {
        matches!(self.0.mode, LoweredTypeMode::Blob)
    }

    /// Whether both handles share one allocation.
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Rc::ptr_eq(&a.0, &b.0)
    }
}

// ── Values ──────────────────────────────────────────────────────────

/// How a lowered value is represented.
#[derive(Clone, Debug)]
pub enum LoweredValueMode {
    /// The result of an instruction that produces nothing.
    Empty,
    Register(TermId),
    Split(Vec<LoweredValue>),
}

#[derive(Debug)]
struct LoweredValueData {
    ty: LoweredType,
    global: bool,
    mode: LoweredValueMode,
}

/// Lowering of a source value.
#[derive(Clone, Debug)]
pub struct LoweredValue(Rc<LoweredValueData>);

impl LoweredValue {
    pub fn empty(ty: LoweredType) -> Self {
        LoweredValue(Rc::new(LoweredValueData {
            ty,
            global: true,
            mode: LoweredValueMode::Empty,
        }))
    }

    /// A value in one register. `global` must be computed by the caller
    /// from every input the value was built from.
    pub fn register(ty: LoweredType, global: bool, value: TermId) -> Self {
        LoweredValue(Rc::new(LoweredValueData {
            ty,
            global,
            mode: LoweredValueMode::Register(value),
        }))
    }

    pub fn split(ty: LoweredType, entries: Vec<LoweredValue>) -> Self {
        let global = entries.iter().all(LoweredValue::global);
        LoweredValue(Rc::new(LoweredValueData {
            ty,
            global,
            mode: LoweredValueMode::Split(entries),
        }))
    }

    #[inline]
    pub fn ty(&self) -> &LoweredType {
        &self.0.ty
    }

    /// Whether the value is usable as a compile-time constant.
    #[inline]
    pub fn global(&self) -> bool {
        self.0.global
    }

    #[inline]
    pub fn mode(&self) -> &LoweredValueMode {
        &self.0.mode
    }

    pub fn register_value(&self) -> Option<TermId> {
        match self.0.mode {
            LoweredValueMode::Register(value) => Some(value),
            _ => None,
        }
    }

    pub fn split_entries(&self) -> Option<&[LoweredValue]> {
        match &self.0.mode {
            LoweredValueMode::Split(entries) => Some(entries),
            _ => None,
        }
    }

    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Rc::ptr_eq(&a.0, &b.0)
    }
}

/// A value known to be in register mode, with its globality.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LoweredRegister {
    pub value: TermId,
    pub global: bool,
}

// ── Parameter categories ────────────────────────────────────────────

/// How a parameter or return value crosses a call boundary.
///
/// Ordered so that [`ParameterCategory::merge`] is the maximum.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ParameterCategory {
    /// Passed as its ordinary lowering.
    Simple,
    /// Re-encoded through a scalar of the same size before passing.
    Altered,
    /// Passed by address.
    ForcePtr,
}

impl ParameterCategory {
    /// The category of an aggregate holding members of both categories.
    #[must_use]
    pub fn merge(self, other: Self) -> Self {
        self.max(other)
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "tests panic on unexpected construction errors"
)]
