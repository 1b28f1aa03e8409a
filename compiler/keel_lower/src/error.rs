//! Lowering errors.
//!
//! Lowering either succeeds for a whole module or fails with one
//! [`LoweringError`]; there is no partial output.

use std::fmt;

use keel_ir::{IrError, TermId};

/// Who is to blame for a failed lowering.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The input uses a construct the target cannot represent, such as a
    /// union of unknown size held in a register.
    User,
    /// The input broke a precondition of the pass, or the pass itself is
    /// wrong.
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::User => f.write_str("error"),
            ErrorKind::Internal => f.write_str("internal error"),
        }
    }
}

/// Error raised while lowering a module.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct LoweringError {
    kind: ErrorKind,
    message: String,
    term: Option<TermId>,
}

impl LoweringError {
    pub fn user(message: impl Into<String>) -> Self {
        LoweringError {
            kind: ErrorKind::User,
            message: message.into(),
            term: None,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        LoweringError {
            kind: ErrorKind::Internal,
            message: message.into(),
            term: None,
        }
    }

    /// Attach the source term the error concerns.
    #[must_use]
    pub fn at(mut self, term: TermId) -> Self {
        self.term = Some(term);
        self
    }

    #[inline]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// The source term this error concerns, if known.
    #[inline]
    pub fn term(&self) -> Option<TermId> {
        self.term
    }
}

/// Terms the pass builds in the output graph are well-typed by
/// construction, so a rejected node is a bug in the pass.
impl From<IrError> for LoweringError {
    fn from(err: IrError) -> Self {
        LoweringError::internal(err.to_string())
    }
}
