//! The term graph: an append-only arena of hash-consed terms.
//!
//! # Design
//!
//! - The arena owns every term. Terms are never freed individually; the
//!   whole graph is dropped at once.
//! - Interning computes the term's type from its operands
//!   ([`infer`]), folds constant expressions ([`fold`]) and then
//!   deduplicates on `(kind, type)`.
//! - Recursive types are named placeholders resolved exactly once and
//!   instantiated by substitution ([`substitute`]).

mod construct;
mod fold;
mod infer;
mod substitute;

use rustc_hash::FxHashMap;

use crate::{IrError, RecursiveId, TermFlags, TermId, TermKind};

/// A single interned term.
#[derive(Clone, Debug)]
pub struct Node {
    pub kind: TermKind,
    /// The term's type. The metatype is its own type.
    pub ty: TermId,
    pub flags: TermFlags,
}

/// Named, once-resolved placeholder for a recursive type.
#[derive(Clone, Debug)]
pub struct RecursiveType {
    pub name: String,
    /// One `RecursiveParameter` term per parameter.
    pub params: Vec<TermId>,
    pub body: Option<TermId>,
}

/// Hash-consed term arena.
#[derive(Clone, Debug)]
pub struct Graph {
    nodes: Vec<Node>,
    dedup: FxHashMap<(TermKind, TermId), TermId>,
    recursives: Vec<RecursiveType>,
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl Graph {
    /// Create a graph holding only the pre-interned terms.
    pub fn new() -> Self {
        let mut graph = Graph {
            nodes: Vec::with_capacity(64),
            dedup: FxHashMap::default(),
            recursives: Vec::new(),
        };
        // Order must match the `TermId` constants.
        graph.insert(TermKind::Metatype, TermId::METATYPE);
        graph.insert(TermKind::Empty, TermId::METATYPE);
        graph.insert(TermKind::Block, TermId::METATYPE);
        graph.insert(TermKind::Bool, TermId::METATYPE);
        graph.insert(TermKind::Byte, TermId::METATYPE);
        graph.insert(
            TermKind::Int {
                width: crate::IntWidth::IPtr,
                signed: false,
            },
            TermId::METATYPE,
        );
        graph.insert(
            TermKind::Pointer {
                target: TermId::BYTE,
                upref: None,
            },
            TermId::METATYPE,
        );
        graph.insert(TermKind::EmptyValue, TermId::EMPTY);
        graph.insert(TermKind::BoolValue(true), TermId::BOOL);
        graph.insert(TermKind::BoolValue(false), TermId::BOOL);
        debug_assert_eq!(graph.nodes.len(), TermId::PREINTERNED_COUNT as usize);
        graph
    }

    /// Number of terms in the graph.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    // === Accessors ===

    #[inline]
    pub fn node(&self, term: TermId) -> &Node {
        &self.nodes[term.index()]
    }

    #[inline]
    pub fn kind(&self, term: TermId) -> &TermKind {
        &self.nodes[term.index()].kind
    }

    /// The type of `term`.
    #[inline]
    pub fn type_of(&self, term: TermId) -> TermId {
        self.nodes[term.index()].ty
    }

    #[inline]
    pub fn flags(&self, term: TermId) -> TermFlags {
        self.nodes[term.index()].flags
    }

    #[inline]
    pub fn is_type(&self, term: TermId) -> bool {
        self.flags(term).contains(TermFlags::IS_TYPE)
    }

    /// Whether `term` is free of function-local state.
    #[inline]
    pub fn is_global(&self, term: TermId) -> bool {
        self.flags(term).is_global()
    }

    /// Iterate over every term id in interning order.
    #[expect(
        clippy::cast_possible_truncation,
        reason = "term count is bounded by u32 ids"
    )]
    pub fn terms(&self) -> impl Iterator<Item = TermId> {
        let len = self.nodes.len() as u32;
        (0..len).map(TermId::new)
    }

    // === Literal queries ===

    /// The bit pattern of an integer literal.
    pub fn as_int(&self, term: TermId) -> Option<u128> {
        match self.kind(term) {
            TermKind::IntValue { bits, .. } => Some(*bits),
            _ => None,
        }
    }

    /// An integer literal that fits in `u64`, read as unsigned.
    pub fn as_u64(&self, term: TermId) -> Option<u64> {
        self.as_int(term).and_then(|bits| u64::try_from(bits).ok())
    }

    /// A boolean literal.
    pub fn as_bool(&self, term: TermId) -> Option<bool> {
        match self.kind(term) {
            TermKind::BoolValue(b) => Some(*b),
            _ => None,
        }
    }

    /// The target of a pointer type, or of the type of a pointer value.
    pub fn pointer_target(&self, term: TermId) -> Option<TermId> {
        let ty = if self.is_type(term) {
            term
        } else {
            self.type_of(term)
        };
        match self.kind(ty) {
            TermKind::Pointer { target, .. } => Some(*target),
            _ => None,
        }
    }

    // === Interning ===

    /// Intern `kind`, inferring its type and folding constants.
    pub fn intern(&mut self, kind: TermKind) -> Result<TermId, IrError> {
        if let Some(folded) = fold::simplify(self, &kind)? {
            return Ok(folded);
        }
        let ty = infer::type_of(self, &kind)?;
        Ok(self.insert(kind, ty))
    }

    /// Intern a term whose type is supplied by its owner (function
    /// references, globals, parameters and instruction results).
    pub fn intern_typed(&mut self, kind: TermKind, ty: TermId) -> Result<TermId, IrError> {
        if !self.is_type(ty) {
            return Err(IrError::NotAType(ty));
        }
        if !kind.is_externally_typed() {
            return self.intern(kind);
        }
        Ok(self.insert(kind, ty))
    }

    /// Insert a type constructor, which cannot fail.
    fn intern_type(&mut self, kind: TermKind) -> TermId {
        self.insert(kind, TermId::METATYPE)
    }

    fn insert(&mut self, kind: TermKind, ty: TermId) -> TermId {
        let key = (kind, ty);
        if let Some(&existing) = self.dedup.get(&key) {
            return existing;
        }
        let (kind, ty) = key;

        let mut flags = TermFlags::empty();
        if ty == TermId::METATYPE {
            flags |= TermFlags::IS_TYPE;
        }
        match &kind {
            TermKind::Parameter { .. } | TermKind::InstructionResult { .. } => {
                flags |= TermFlags::FUNCTION_LOCAL;
            }
            TermKind::RecursiveParameter { .. } => flags |= TermFlags::HAS_PLACEHOLDER,
            _ => {}
        }
        for operand in kind.operands() {
            flags |= self.flags(operand) & TermFlags::INHERITED;
        }
        if let Some(node) = self.nodes.get(ty.index()) {
            flags |= node.flags & TermFlags::INHERITED;
        }

        #[expect(
            clippy::cast_possible_truncation,
            reason = "graphs never approach u32::MAX terms"
        )]
        let id = TermId::new(self.nodes.len() as u32);
        self.nodes.push(Node {
            kind: kind.clone(),
            ty,
            flags,
        });
        self.dedup.insert((kind, ty), id);
        id
    }

    // === Recursive types ===

    /// Declare a recursive type with the given parameter types.
    ///
    /// The body is installed later by [`Graph::resolve_recursive`].
    pub fn new_recursive(
        &mut self,
        name: impl Into<String>,
        param_types: &[TermId],
    ) -> Result<RecursiveId, IrError> {
        #[expect(
            clippy::cast_possible_truncation,
            reason = "recursive type count is bounded by u32 ids"
        )]
        let id = RecursiveId::new(self.recursives.len() as u32);
        let mut params = Vec::with_capacity(param_types.len());
        for (index, &ty) in param_types.iter().enumerate() {
            if !self.is_type(ty) {
                return Err(IrError::NotAType(ty));
            }
            #[expect(
                clippy::cast_possible_truncation,
                reason = "parameter count is bounded by u32"
            )]
            let kind = TermKind::RecursiveParameter {
                recursive: id,
                index: index as u32,
            };
            params.push(self.insert(kind, ty));
        }
        self.recursives.push(RecursiveType {
            name: name.into(),
            params,
            body: None,
        });
        Ok(id)
    }

    /// Install the body of a recursive type.
    pub fn resolve_recursive(&mut self, id: RecursiveId, body: TermId) -> Result<(), IrError> {
        if !self.is_type(body) {
            return Err(IrError::NotAType(body));
        }
        let recursive = &mut self.recursives[id.index()];
        if recursive.body.is_some() {
            return Err(IrError::RecursiveAlreadyResolved(id));
        }
        recursive.body = Some(body);
        Ok(())
    }

    pub fn recursive(&self, id: RecursiveId) -> &RecursiveType {
        &self.recursives[id.index()]
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "tests panic on unexpected construction errors"
)]
mod tests;
