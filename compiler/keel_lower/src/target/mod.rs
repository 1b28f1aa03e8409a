//! Target callbacks.
//!
//! Everything the pass needs to know about the machine goes through
//! [`TargetCallback`]: primitive layout, which register type stands in for
//! a chunk of memory, and how parameters and return values cross a call.
//!
//! - [`SimpleTarget`]: registers passed directly, everything else by
//!   address.
//! - [`SysVAmd64Target`]: the System V x86-64 eightbyte classification.
//!
//! Both share the calling-convention driver in [`common`].

pub mod amd64;
pub mod common;

use keel_ir::{FloatWidth, FunctionId, Graph, IntWidth, TermId, TermKind};

use crate::{FunctionRunner, LoweredValue, LoweringError, ModuleRewriter, Rewriter};

pub use amd64::SysVAmd64Target;
pub use common::{FunctionAbi, ParamPassing, ParameterClassifier, ReturnPassing};

/// Size and alignment of a primitive register type, in bytes.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct TypeSizeAlignment {
    pub size: u64,
    pub alignment: u64,
}

impl TypeSizeAlignment {
    pub const fn new(size: u64, alignment: u64) -> Self {
        TypeSizeAlignment { size, alignment }
    }
}

/// Machine-specific decisions made during lowering.
///
/// The ABI entry points receive the rewriting context so they can emit
/// code and consult the lowering of source types.
pub trait TargetCallback {
    /// Layout of a primitive type (including the byte pointer) of the
    /// output graph.
    fn type_size_alignment(
        &self,
        graph: &Graph,
        ty: TermId,
    ) -> Result<TypeSizeAlignment, LoweringError>;

    /// The largest register type no bigger than `size` bytes, and its
    /// size.
    fn type_from_size(&self, graph: &mut Graph, size: u64) -> (TermId, u64);

    /// The register type used to carry memory of the given alignment.
    fn type_from_alignment(&self, graph: &mut Graph, alignment: u64) -> (TermId, u64) {
        self.type_from_size(graph, alignment)
    }

    /// Declare the output counterpart of a source function.
    fn lower_function(
        &self,
        rewriter: &mut ModuleRewriter<'_>,
        function: FunctionId,
    ) -> Result<FunctionId, LoweringError>;

    /// Map the source parameters to values in the new entry block.
    fn lower_function_entry(&self, runner: &mut FunctionRunner<'_, '_>) -> Result<(), LoweringError>;

    /// Emit a call of the lowered pointer `target` with source arguments
    /// `args`, returning the lowering of the call's result.
    fn lower_function_call(
        &self,
        runner: &mut FunctionRunner<'_, '_>,
        target: TermId,
        args: &[TermId],
    ) -> Result<LoweredValue, LoweringError>;

    /// Emit the return of source value `value`.
    fn lower_return(
        &self,
        runner: &mut FunctionRunner<'_, '_>,
        value: TermId,
    ) -> Result<(), LoweringError>;

    /// Reinterpret the bits of `value` as register type `ty`.
    fn convert_value(
        &self,
        graph: &mut Graph,
        value: TermId,
        ty: TermId,
    ) -> Result<TermId, LoweringError> {
        Ok(graph.bit_cast(value, ty)?)
    }
}

/// Layout of primitive types on an LP64 machine.
///
/// Returns `None` for anything that is not a primitive or pointer type.
pub fn lp64_size_alignment(kind: &TermKind) -> Option<TypeSizeAlignment> {
    let layout = match kind {
        TermKind::Empty => TypeSizeAlignment::new(0, 1),
        TermKind::Bool | TermKind::Byte => TypeSizeAlignment::new(1, 1),
        TermKind::Int { width, .. } => match width {
            IntWidth::I8 => TypeSizeAlignment::new(1, 1),
            IntWidth::I16 => TypeSizeAlignment::new(2, 2),
            IntWidth::I32 => TypeSizeAlignment::new(4, 4),
            IntWidth::I64 | IntWidth::IPtr => TypeSizeAlignment::new(8, 8),
            IntWidth::I128 => TypeSizeAlignment::new(16, 16),
        },
        TermKind::Float(width) => match width {
            FloatWidth::F32 => TypeSizeAlignment::new(4, 4),
            FloatWidth::F64 => TypeSizeAlignment::new(8, 8),
            FloatWidth::F128 | FloatWidth::X87 => TypeSizeAlignment::new(16, 16),
        },
        TermKind::Pointer { .. } | TermKind::Block => TypeSizeAlignment::new(8, 8),
        _ => return None,
    };
    Some(layout)
}

/// The largest power-of-two integer type no bigger than `size`, capped at
/// 16 bytes. Sizes below one byte get a byte.
pub fn lp64_type_from_size(graph: &mut Graph, size: u64) -> (TermId, u64) {
    let bytes = match size {
        0 | 1 => return (TermId::BYTE, 1),
        2..=3 => 2,
        4..=7 => 4,
        8..=15 => 8,
        _ => 16,
    };
    let width = IntWidth::from_bytes(bytes).unwrap_or(IntWidth::I8);
    (graph.int_type(width, false), bytes)
}

fn lp64_layout(graph: &Graph, ty: TermId) -> Result<TypeSizeAlignment, LoweringError> {
    lp64_size_alignment(graph.kind(ty))
        .ok_or_else(|| LoweringError::internal("no primitive layout for this type").at(ty))
}

// ── Simple target ───────────────────────────────────────────────────

/// A target without a platform calling convention.
///
/// Parameters and results that lower to a single register are passed as
/// that register; anything else is passed by address, and results by a
/// hidden return pointer.
#[derive(Copy, Clone, Debug, Default)]
pub struct SimpleTarget;

impl ParameterClassifier for SimpleTarget {
    fn parameter_passing<'a, R: Rewriter<'a> + ?Sized>(
        &self,
        rw: &mut R,
        ty: TermId,
    ) -> Result<ParamPassing, LoweringError> {
        let lowered = rw.rewrite_type(ty)?;
        Ok(if lowered.is_register() {
            ParamPassing::Direct
        } else {
            ParamPassing::Indirect
        })
    }
}

impl TargetCallback for SimpleTarget {
    fn type_size_alignment(
        &self,
        graph: &Graph,
        ty: TermId,
    ) -> Result<TypeSizeAlignment, LoweringError> {
        lp64_layout(graph, ty)
    }

    fn type_from_size(&self, graph: &mut Graph, size: u64) -> (TermId, u64) {
        lp64_type_from_size(graph, size)
    }

    fn lower_function(
        &self,
        rewriter: &mut ModuleRewriter<'_>,
        function: FunctionId,
    ) -> Result<FunctionId, LoweringError> {
        common::lower_function(self, rewriter, function)
    }

    fn lower_function_entry(&self, runner: &mut FunctionRunner<'_, '_>) -> Result<(), LoweringError> {
        common::lower_function_entry(self, runner)
    }

    fn lower_function_call(
        &self,
        runner: &mut FunctionRunner<'_, '_>,
        target: TermId,
        args: &[TermId],
    ) -> Result<LoweredValue, LoweringError> {
        common::lower_function_call(self, runner, target, args)
    }

    fn lower_return(
        &self,
        runner: &mut FunctionRunner<'_, '_>,
        value: TermId,
    ) -> Result<(), LoweringError> {
        common::lower_return(self, runner, value)
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "tests panic on unexpected construction errors"
)]
