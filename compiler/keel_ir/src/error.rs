//! Construction errors.

use crate::{BlockId, RecursiveId, TermId};

/// Error raised when a term or instruction would be ill-formed.
///
/// The graph type-checks every node as it is interned; these are the
/// ways that check can fail.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum IrError {
    #[error("{0:?} is not a type")]
    NotAType(TermId),
    #[error("{0:?} is not a pointer")]
    NotAPointer(TermId),
    #[error("{0:?} is not an aggregate type")]
    NotAnAggregate(TermId),
    #[error("{0:?} is not a struct type")]
    NotAStruct(TermId),
    #[error("{0:?} is not a function pointer")]
    NotAFunction(TermId),
    #[error("{0:?} does not have a constant type")]
    NotAConstant(TermId),
    #[error("{0:?} is not an integer")]
    NotAnInteger(TermId),
    #[error("index {index} out of range for {term:?} with {len} members")]
    IndexOutOfRange { term: TermId, index: u64, len: usize },
    #[error("index {0:?} of a struct or union member must be a constant")]
    NonConstantIndex(TermId),
    #[error("type mismatch: expected {expected:?}, found {found:?}")]
    TypeMismatch { expected: TermId, found: TermId },
    #[error("expected {expected} arguments, found {found}")]
    ArgumentCount { expected: usize, found: usize },
    #[error("terms of this kind need an explicit type")]
    UntypedTerm,
    #[error("pointer {0:?} carries no upward reference")]
    MissingUpwardReference(TermId),
    #[error("recursive type {0:?} has no body")]
    UnresolvedRecursive(RecursiveId),
    #[error("recursive type {0:?} is already resolved")]
    RecursiveAlreadyResolved(RecursiveId),
    #[error("block {0:?} already ends in a terminator")]
    BlockTerminated(BlockId),
    #[error("no insertion block selected")]
    NoInsertPoint,
}
