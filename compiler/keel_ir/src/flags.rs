//! Pre-computed term flags.
//!
//! `TermFlags` are computed once when a term is interned, so queries such
//! as "does this value depend on a function parameter?" never walk the
//! graph.

use bitflags::bitflags;

bitflags! {
    /// Per-term properties, fixed at interning time.
    #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
    pub struct TermFlags: u8 {
        /// The term is a type (its own type is the metatype).
        const IS_TYPE = 1 << 0;
        /// The term mentions a function parameter or instruction result.
        const FUNCTION_LOCAL = 1 << 1;
        /// The term mentions a recursive type parameter placeholder.
        const HAS_PLACEHOLDER = 1 << 2;
    }
}

impl TermFlags {
    /// Flags a term inherits from each of its operands.
    pub const INHERITED: Self = Self::FUNCTION_LOCAL.union(Self::HAS_PLACEHOLDER);

    /// Whether the term can be evaluated without any function-local state.
    #[inline]
    pub fn is_global(self) -> bool {
        !self.contains(Self::FUNCTION_LOCAL)
    }
}
