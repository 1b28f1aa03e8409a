//! Output contract check.
//!
//! After lowering, every term a function or global can reach must be
//! something a backend can realize directly. The reflective and
//! recursive constructs the pass exists to remove must be gone.

use rustc_hash::FxHashSet;

use keel_ir::{InstKind, Module, TermId, TermKind};

use crate::LoweringError;

/// Check that no construct the pass should have removed survives in
/// `module`.
pub fn verify_lowered(module: &Module) -> Result<(), LoweringError> {
    let mut checker = Checker {
        module,
        visited: FxHashSet::default(),
        stack: Vec::new(),
    };

    for id in module.global_ids() {
        let global = module.global(id);
        checker.stack.extend([global.ty, global.reference]);
        checker.stack.extend(global.value);
        checker.stack.extend(global.alignment);
    }
    for id in module.function_ids() {
        let function = module.function(id);
        checker.stack.push(function.ty);
        checker.stack.extend(function.params.iter().copied());
        for block in &function.blocks {
            for instruction in &block.instructions {
                if let InstKind::Solidify(_) = instruction.kind {
                    return Err(LoweringError::internal(format!(
                        "solidify survived lowering in `{}`",
                        function.name
                    )));
                }
                checker.stack.push(instruction.value);
                checker.stack.extend(instruction.kind.operands());
            }
        }
    }
    checker.run()
}

struct Checker<'m> {
    module: &'m Module,
    visited: FxHashSet<TermId>,
    stack: Vec<TermId>,
}

impl Checker<'_> {
    fn run(&mut self) -> Result<(), LoweringError> {
        let graph = &self.module.graph;
        while let Some(term) = self.stack.pop() {
            if !self.visited.insert(term) {
                continue;
            }
            let kind = graph.kind(term);
            if let Some(name) = forbidden(kind) {
                return Err(LoweringError::internal(format!("{name} survived lowering")).at(term));
            }
            self.stack.extend(kind.operands());
            // The type of a type is the metatype, which is fine.
            if !graph.is_type(term) {
                self.stack.push(graph.type_of(term));
            }
        }
        Ok(())
    }
}

fn forbidden(kind: &TermKind) -> Option<&'static str> {
    let name = match kind {
        TermKind::Apply { .. } => "apply type",
        TermKind::ApplyValue { .. } => "apply value",
        TermKind::Metatype => "metatype",
        TermKind::MetatypeValue { .. } => "metatype value",
        TermKind::MetatypeSize(_) => "metatype size",
        TermKind::MetatypeAlignment(_) => "metatype alignment",
        TermKind::ConstantType(_) => "constant type",
        TermKind::RecursiveParameter { .. } => "recursive parameter",
        TermKind::OuterPtr(_) => "outer pointer",
        TermKind::StructElementOffset { .. } => "struct element offset",
        _ => return None,
    };
    Some(name)
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "tests panic on unexpected construction errors"
)]
