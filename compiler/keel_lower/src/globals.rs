//! Global variable lowering.
//!
//! A global whose type lowers to a register is stored as that register
//! type. Anything else, and every global when `flatten_globals` is set, is
//! stored as one struct of register leaves with explicit byte-array padding,
//! so each leaf sits at the offset its lowering gives it. Declaration and
//! initializer packing walk the lowered type the same way, which keeps the
//! declared type and the initializer's type identical.

use tracing::debug;

use keel_ir::{Graph, TermId, TermKind};

use crate::rewrite::types::MAX_SPLIT_LENGTH;
use crate::{
    LoweredType, LoweredTypeMode, LoweredValue, LoweringError, ModuleRewriter, Rewriter,
    TargetCallback, TypeSizeAlignment,
};

/// Declare every source global in the output module.
pub(crate) fn declare_globals(rewriter: &mut ModuleRewriter<'_>) -> Result<(), LoweringError> {
    let source = rewriter.source_module();
    for id in source.global_ids() {
        let global = source.global(id);
        let lowered = rewriter.rewrite_type(global.ty)?;
        let (storage_ty, _) = storage(rewriter, &lowered, None).map_err(|err| err.at(global.ty))?;
        let output = rewriter.output_mut();
        let lowered_id = output.declare_global(global.name.clone(), storage_ty, global.constant)?;
        output.set_global_alignment(lowered_id, lowered.alignment());
        rewriter.map_global(id, lowered_id);
        debug!(name = %global.name, mode = ?lowered.mode(), "declared global");
    }
    Ok(())
}

/// Lower and install the initializer of every source global.
pub(crate) fn lower_initializers(rewriter: &mut ModuleRewriter<'_>) -> Result<(), LoweringError> {
    let source = rewriter.source_module();
    for id in source.global_ids() {
        let global = source.global(id);
        let Some(value) = global.value else {
            continue;
        };
        let lowered_id = rewriter.lowered_global(id).ok_or_else(|| {
            LoweringError::internal(format!("global `{}` was not declared", global.name))
        })?;
        let lowered_ty = rewriter.rewrite_type(global.ty)?;
        let lowered = rewriter.rewrite_value(value)?;
        if !lowered.global() {
            return Err(
                LoweringError::user("global initializer is not a compile-time constant").at(value),
            );
        }
        let (_, initializer) =
            storage(rewriter, &lowered_ty, Some(&lowered)).map_err(|err| err.at(value))?;
        let initializer = initializer
            .ok_or_else(|| LoweringError::internal("initializer packing produced no value"))?;
        rewriter
            .output_mut()
            .set_global_value(lowered_id, initializer)?;
    }
    Ok(())
}

/// The storage type of a global of lowered type `ty`, and the packed
/// initializer when `value` is given.
fn storage(
    rewriter: &mut ModuleRewriter<'_>,
    ty: &LoweredType,
    value: Option<&LoweredValue>,
) -> Result<(TermId, Option<TermId>), LoweringError> {
    let flatten = rewriter.config().flatten_globals;
    if let Some(register_type) = ty.register_type().filter(|_| !flatten) {
        let value = value.map(register_of).transpose()?;
        return Ok((register_type, value));
    }

    let target = rewriter.target();
    let mut packer = Packer {
        graph: rewriter.output_graph(),
        target,
        flatten,
        offset: 0,
        fields: Vec::new(),
    };
    packer.push_lowered(ty, value)?;
    let size = literal(packer.graph, ty.size())?;
    packer.pad_to(size)?;

    let types: Vec<TermId> = packer.fields.iter().map(|field| field.0).collect();
    let storage_ty = packer.graph.struct_type(&types)?;
    let initializer = match value {
        Some(_) => {
            let values = packer
                .fields
                .iter()
                .map(|field| field.1)
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| LoweringError::internal("initializer leaf without a value"))?;
            Some(packer.graph.struct_value(&values)?)
        }
        None => None,
    };
    Ok((storage_ty, initializer))
}

/// Lays out the leaves of one global.
struct Packer<'g> {
    graph: &'g mut Graph,
    target: &'g dyn TargetCallback,
    flatten: bool,
    /// Bytes laid out so far.
    offset: u64,
    /// Field type and, when packing an initializer, field value.
    fields: Vec<(TermId, Option<TermId>)>,
}

impl Packer<'_> {
    fn push_lowered(
        &mut self,
        ty: &LoweredType,
        value: Option<&LoweredValue>,
    ) -> Result<(), LoweringError> {
        let alignment = literal(self.graph, ty.alignment())?;
        let size = literal(self.graph, ty.size())?;
        match ty.mode() {
            LoweredTypeMode::Register(register_type) => {
                let value = value.map(register_of).transpose()?;
                self.push_register(*register_type, value)
            }
            LoweredTypeMode::Split(entries) => {
                let values = match value {
                    Some(value) => Some(value.split_entries().ok_or_else(|| {
                        LoweringError::internal("split global type with a non-split initializer")
                    })?),
                    None => None,
                };
                let start = self.offset.next_multiple_of(alignment.max(1));
                self.pad_to(start)?;
                for (index, entry) in entries.iter().enumerate() {
                    let entry_value = values.and_then(|values| values.get(index));
                    self.push_lowered(entry, entry_value)?;
                }
                self.pad_to(start + size)
            }
            LoweredTypeMode::Blob => {
                if value.is_some() {
                    return Err(LoweringError::user(
                        "a global of unknown layout cannot have an initializer",
                    ));
                }
                let start = self.offset.next_multiple_of(alignment.max(1));
                self.pad_to(start + size)
            }
        }
    }

    fn push_register(
        &mut self,
        register_type: TermId,
        value: Option<TermId>,
    ) -> Result<(), LoweringError> {
        let layout = register_layout(self.graph, self.target, register_type)?;
        let start = self.offset.next_multiple_of(layout.alignment.max(1));
        self.pad_to(start)?;

        let members: Option<Vec<TermId>> = match self.graph.kind(register_type).clone() {
            TermKind::Struct(members) if self.flatten => Some(members.to_vec()),
            TermKind::Array { element, length } if self.flatten => self
                .graph
                .as_u64(length)
                .filter(|&length| length <= MAX_SPLIT_LENGTH)
                .and_then(|length| usize::try_from(length).ok())
                .map(|length| vec![element; length]),
            _ => None,
        };
        match members {
            Some(members) => {
                for (index, member) in members.into_iter().enumerate() {
                    let member_value = match value {
                        Some(value) => {
                            let index = self.graph.size_value(index as u64);
                            Some(self.graph.element_value(value, index)?)
                        }
                        None => None,
                    };
                    self.push_register(member, member_value)?;
                }
                self.pad_to(start + layout.size)
            }
            None => {
                self.fields.push((register_type, value));
                self.offset = start + layout.size;
                Ok(())
            }
        }
    }

    fn pad_to(&mut self, offset: u64) -> Result<(), LoweringError> {
        if offset > self.offset {
            let padding = self.graph.array_type(TermId::BYTE, offset - self.offset)?;
            let zero = self.graph.zero(padding)?;
            self.fields.push((padding, Some(zero)));
            self.offset = offset;
        }
        Ok(())
    }
}

/// Layout of an output register type, aggregates included.
fn register_layout(
    graph: &Graph,
    target: &dyn TargetCallback,
    ty: TermId,
) -> Result<TypeSizeAlignment, LoweringError> {
    match graph.kind(ty) {
        TermKind::Struct(members) => {
            let mut size = 0u64;
            let mut alignment = 1u64;
            for &member in members {
                let layout = register_layout(graph, target, member)?;
                size = size.next_multiple_of(layout.alignment.max(1)) + layout.size;
                alignment = alignment.max(layout.alignment);
            }
            Ok(TypeSizeAlignment::new(size.next_multiple_of(alignment), alignment))
        }
        TermKind::Union(members) => {
            let mut size = 0u64;
            let mut alignment = 1u64;
            for &member in members {
                let layout = register_layout(graph, target, member)?;
                size = size.max(layout.size);
                alignment = alignment.max(layout.alignment);
            }
            Ok(TypeSizeAlignment::new(size.next_multiple_of(alignment), alignment))
        }
        &TermKind::Array { element, length } => {
            let length = graph
                .as_u64(length)
                .ok_or_else(|| LoweringError::user("global array length is not a constant"))?;
            let layout = register_layout(graph, target, element)?;
            let size = layout
                .size
                .checked_mul(length)
                .ok_or_else(|| LoweringError::user("global array is too large").at(ty))?;
            Ok(TypeSizeAlignment::new(size, layout.alignment))
        }
        _ => target.type_size_alignment(graph, ty),
    }
}

fn register_of(value: &LoweredValue) -> Result<TermId, LoweringError> {
    value.register_value().ok_or_else(|| {
        LoweringError::internal("register global type with a non-register initializer")
    })
}

fn literal(graph: &Graph, term: TermId) -> Result<u64, LoweringError> {
    graph
        .as_u64(term)
        .ok_or_else(|| LoweringError::user("global layout is not a compile-time constant"))
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "tests panic on unexpected construction errors"
)]
