//! Instantiation of recursive types.

use rustc_hash::FxHashMap;

use crate::{ensure_sufficient_stack, Graph, IrError, TermFlags, TermId, TermKind};

impl Graph {
    /// The body of a recursive instantiation with its parameters replaced
    /// by the instantiation's arguments.
    pub fn unpack(&mut self, apply: TermId) -> Result<TermId, IrError> {
        let TermKind::Apply { recursive, args } = self.kind(apply).clone() else {
            return Err(IrError::NotAnAggregate(apply));
        };
        let def = self.recursive(recursive);
        let body = def.body.ok_or(IrError::UnresolvedRecursive(recursive))?;
        let mut map: FxHashMap<TermId, TermId> = def.params.iter().copied().zip(args).collect();
        self.substitute(body, &mut map)
    }

    /// Rebuild `term` with every key of `map` replaced by its value.
    ///
    /// Only terms containing placeholders are visited. `map` doubles as
    /// the memo table, so shared subterms are rebuilt once.
    pub fn substitute(
        &mut self,
        term: TermId,
        map: &mut FxHashMap<TermId, TermId>,
    ) -> Result<TermId, IrError> {
        if let Some(&mapped) = map.get(&term) {
            return Ok(mapped);
        }
        if !self.flags(term).contains(TermFlags::HAS_PLACEHOLDER) {
            return Ok(term);
        }
        ensure_sufficient_stack(|| {
            let kind = self.kind(term).clone();
            let rebuilt = if kind.is_externally_typed() {
                let ty = self.substitute(self.type_of(term), map)?;
                self.intern_typed(kind, ty)?
            } else {
                let kind = kind.try_map_operands(|operand| self.substitute(operand, map))?;
                self.intern(kind)?
            };
            map.insert(term, rebuilt);
            Ok(rebuilt)
        })
    }
}
