//! System V x86-64 parameter classification.
//!
//! Every parameter and return type is folded into one [`ElementInfo`]: an
//! eightbyte class in the sense of the AMD64 psABI, the layout, and the
//! number of scalar elements. The fold only looks at source types, so the
//! decision is independent of the structural options of the pass.
//!
//! Simplifications against the full psABI: a whole aggregate gets one
//! class instead of one class per eightbyte, and integer aggregates of up
//! to 16 bytes are repacked into a single integer of the next power of two
//! bytes instead of two registers.

use keel_ir::{FloatWidth, FunctionId, Graph, IntWidth, TermId, TermKind};

use super::common::{self, ParamPassing, ParameterClassifier};
use super::{
    lp64_layout, lp64_size_alignment, lp64_type_from_size, TargetCallback, TypeSizeAlignment,
};
use crate::{
    FunctionRunner, LoweredValue, LoweringError, ModuleRewriter, ParameterCategory, Rewriter,
};

/// Eightbyte class of a type.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Amd64Class {
    Integer,
    Sse,
    X87,
    /// Empty types, which contribute nothing.
    NoClass,
    Memory,
}

impl Amd64Class {
    /// The class of memory holding values of both classes.
    ///
    /// X87 with SSE merges to `Memory`, following the psABI rather than
    /// folding the pair into `Sse`.
    #[must_use]
    pub fn merge(self, other: Self) -> Self {
        use Amd64Class::{Integer, Memory, NoClass, Sse, X87};
        match (self, other) {
            (left, right) if left == right => left,
            (NoClass, class) | (class, NoClass) => class,
            (Memory, _) | (_, Memory) => Memory,
            (Integer, _) | (_, Integer) => Integer,
            (X87, Sse) | (Sse, X87) => Memory,
            _ => Sse,
        }
    }
}

/// Classification summary of a (sub-)type.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ElementInfo {
    pub category: ParameterCategory,
    pub class: Amd64Class,
    /// Size in bytes, padded to `alignment`.
    pub size: u64,
    pub alignment: u64,
    /// Number of scalar elements.
    pub elements: u64,
}

impl ElementInfo {
    fn primitive(class: Amd64Class, layout: TypeSizeAlignment) -> Self {
        ElementInfo {
            category: ParameterCategory::Simple,
            class,
            size: layout.size,
            alignment: layout.alignment,
            elements: 1,
        }
    }

    /// A type whose layout is not known at compile time.
    fn force_ptr() -> Self {
        ElementInfo {
            category: ParameterCategory::ForcePtr,
            class: Amd64Class::Memory,
            size: 0,
            alignment: 1,
            elements: 0,
        }
    }

    fn empty() -> Self {
        ElementInfo {
            category: ParameterCategory::Simple,
            class: Amd64Class::NoClass,
            size: 0,
            alignment: 1,
            elements: 0,
        }
    }
}

/// The System V AMD64 target: LP64 layout plus eightbyte classification
/// of parameters.
#[derive(Copy, Clone, Debug, Default)]
pub struct SysVAmd64Target;

impl SysVAmd64Target {
    /// Fold source type `ty` into its classification summary.
    pub fn element_info<'a, R: Rewriter<'a> + ?Sized>(
        &self,
        rw: &mut R,
        ty: TermId,
    ) -> Result<ElementInfo, LoweringError> {
        let kind = rw.source_graph().kind(ty).clone();
        let info = match &kind {
            TermKind::Struct(members) => {
                let mut info = ElementInfo::empty();
                for &member in members {
                    let child = self.element_info(rw, member)?;
                    info.elements += child.elements;
                    info.size = align_to(info.size, child.alignment) + child.size;
                    info.alignment = info.alignment.max(child.alignment);
                    info.class = info.class.merge(child.class);
                    info.category = info.category.merge(child.category);
                }
                info.size = align_to(info.size, info.alignment);
                info
            }
            &TermKind::Array { element, length } => {
                let length = rw.rewrite_value_register(length)?;
                let Some(length) = rw.output_graph().as_u64(length.value) else {
                    return Ok(ElementInfo::force_ptr());
                };
                let mut info = self.element_info(rw, element)?;
                info.size = info.size.saturating_mul(length);
                info.elements = info.elements.saturating_mul(length);
                info
            }
            TermKind::Union(members) => {
                let mut info = ElementInfo {
                    category: ParameterCategory::Altered,
                    ..ElementInfo::empty()
                };
                for &member in members {
                    let child = self.element_info(rw, member)?;
                    info.elements = info.elements.max(child.elements);
                    info.size = info.size.max(child.size);
                    info.alignment = info.alignment.max(child.alignment);
                    info.class = info.class.merge(child.class);
                    info.category = info.category.merge(child.category);
                }
                info.size = align_to(info.size, info.alignment);
                info
            }
            TermKind::Pointer { .. }
            | TermKind::Block
            | TermKind::Bool
            | TermKind::Byte
            | TermKind::Int { .. } => primitive(&kind, Amd64Class::Integer, ty)?,
            TermKind::Float(FloatWidth::X87) => primitive(&kind, Amd64Class::X87, ty)?,
            TermKind::Float(_) => primitive(&kind, Amd64Class::Sse, ty)?,
            TermKind::Empty => ElementInfo::empty(),
            TermKind::Metatype => {
                let pair = rw
                    .source_graph()
                    .struct_type(&[TermId::SIZE, TermId::SIZE])?;
                self.element_info(rw, pair)?
            }
            TermKind::Apply { .. } => {
                let body = rw.source_graph().unpack(ty)?;
                self.element_info(rw, body)?
            }
            &TermKind::ConstantType(value) => {
                let value_ty = rw.source_graph().type_of(value);
                self.element_info(rw, value_ty)?
            }
            TermKind::FunctionType { .. } | TermKind::UpwardReferenceType => {
                return Err(LoweringError::internal("type cannot be passed as a parameter").at(ty))
            }
            // Metatype values and run-time type parameters.
            _ => ElementInfo::force_ptr(),
        };
        Ok(info)
    }

    /// Classify a parameter or return type.
    pub fn parameter_info<'a, R: Rewriter<'a> + ?Sized>(
        &self,
        rw: &mut R,
        ty: TermId,
    ) -> Result<ElementInfo, LoweringError> {
        let mut info = self.element_info(rw, ty)?;
        match info.class {
            Amd64Class::Sse | Amd64Class::X87 if info.elements > 1 => {
                info.class = Amd64Class::Memory;
            }
            Amd64Class::Integer if info.size > 16 => info.class = Amd64Class::Memory,
            Amd64Class::Integer if info.elements > 2 || (info.elements == 2 && info.size < 16) => {
                info.category = info.category.merge(ParameterCategory::Altered);
            }
            _ => {}
        }
        if info.class == Amd64Class::Memory {
            info.category = ParameterCategory::ForcePtr;
        }
        Ok(info)
    }
}

fn primitive(kind: &TermKind, class: Amd64Class, ty: TermId) -> Result<ElementInfo, LoweringError> {
    let layout = lp64_size_alignment(kind)
        .ok_or_else(|| LoweringError::internal("no primitive layout for this type").at(ty))?;
    Ok(ElementInfo::primitive(class, layout))
}

fn align_to(size: u64, alignment: u64) -> u64 {
    size.next_multiple_of(alignment.max(1))
}

/// The scalar an `altered` value of this class and size is passed as.
fn altered_type(graph: &mut Graph, info: &ElementInfo) -> Option<TermId> {
    match info.class {
        Amd64Class::Integer => {
            let width = IntWidth::from_bytes(info.size.max(1).next_power_of_two())?;
            Some(graph.int_type(width, false))
        }
        Amd64Class::Sse => {
            let width = match info.size {
                4 => FloatWidth::F32,
                8 => FloatWidth::F64,
                16 => FloatWidth::F128,
                _ => return None,
            };
            Some(graph.float_type(width))
        }
        Amd64Class::X87 => Some(graph.float_type(FloatWidth::X87)),
        Amd64Class::NoClass | Amd64Class::Memory => None,
    }
}

impl ParameterClassifier for SysVAmd64Target {
    fn parameter_passing<'a, R: Rewriter<'a> + ?Sized>(
        &self,
        rw: &mut R,
        ty: TermId,
    ) -> Result<ParamPassing, LoweringError> {
        let info = self.parameter_info(rw, ty)?;
        let passing = match (info.category, info.class) {
            (ParameterCategory::ForcePtr, _) => ParamPassing::Indirect,
            (_, Amd64Class::NoClass) => ParamPassing::Ignore,
            (ParameterCategory::Altered, _) => match altered_type(rw.output_graph(), &info) {
                Some(coerced) => ParamPassing::Coerce(coerced),
                None => ParamPassing::Indirect,
            },
            (ParameterCategory::Simple, _) => ParamPassing::Direct,
        };
        Ok(passing)
    }
}

impl TargetCallback for SysVAmd64Target {
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
