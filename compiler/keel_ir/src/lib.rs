//! Term graph and module representation for the Keel low-level IR.
//!
//! This crate provides:
//!
//! - **Terms** ([`TermId`], [`TermKind`]): every type and value is a
//!   hash-consed node in a [`Graph`]. Types are terms whose own type is the
//!   metatype, so types and values share one representation.
//!
//! - **Construction checks**: interning infers each node's type from its
//!   operands, rejects ill-formed nodes with [`IrError`] and folds constant
//!   expressions, so a graph only ever holds well-typed, simplified terms.
//!
//! - **Modules** ([`Module`], [`Function`], [`Block`], [`InstKind`]): basic
//!   block functions and global variables over one shared graph, plus a
//!   [`FunctionBuilder`] for appending instructions.
//!
//! # Design
//!
//! The graph is append-only: handles stay valid for the graph's lifetime
//! and a clone of a graph shares every id with the original. Passes that
//! transform a module read the source graph and build terms in a fresh
//! output graph.

mod builder;
mod error;
mod flags;
mod format;
mod graph;
mod module;
mod stack;
mod term;

pub use builder::FunctionBuilder;
pub use error::IrError;
pub use flags::TermFlags;
pub use format::TermDisplay;
pub use graph::{Graph, Node, RecursiveType};
pub use module::{Block, Function, GlobalVariable, InstKind, Instruction, Module};
pub use stack::ensure_sufficient_stack;
pub use term::{
    BinaryOp, BlockId, FloatWidth, FunctionId, GlobalId, IntWidth, RecursiveId, TermId, TermKind,
    TermList,
};
