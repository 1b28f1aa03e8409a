//! Pass configuration.

/// Structural options for [`LoweringPass`](crate::LoweringPass).
///
/// The defaults keep as much structure as possible in register types, for
/// a backend that understands aggregate registers. [`LoweringConfig::all_split`]
/// suits a backend that only handles scalars.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[expect(
    clippy::struct_excessive_bools,
    reason = "each flag is an independent switch"
)]
pub struct LoweringConfig {
    /// Lower arrays (and union surrogates) to `split` instead of register
    /// arrays.
    pub split_arrays: bool,
    /// Lower structs and recursive instantiations to `split` instead of
    /// register structs.
    pub split_structs: bool,
    /// Replace every union with a surrogate of the same size and alignment.
    pub remove_unions: bool,
    /// Compute every pointer offset in bytes.
    pub pointer_arithmetic_to_bytes: bool,
    /// Make every `memcpy` and `memzero` byte-granular.
    pub memcpy_to_bytes: bool,
    /// Store every global as one flat struct of register leaves.
    pub flatten_globals: bool,
}

impl LoweringConfig {
    /// Every structural option switched on.
    pub fn all_split() -> Self {
        LoweringConfig {
            split_arrays: true,
            split_structs: true,
            remove_unions: true,
            pointer_arithmetic_to_bytes: true,
            memcpy_to_bytes: true,
            flatten_globals: true,
        }
    }

    #[must_use]
    pub fn with_split_arrays(mut self, value: bool) -> Self {
        self.split_arrays = value;
        self
    }

    #[must_use]
    pub fn with_split_structs(mut self, value: bool) -> Self {
        self.split_structs = value;
        self
    }

    #[must_use]
    pub fn with_remove_unions(mut self, value: bool) -> Self {
        self.remove_unions = value;
        self
    }

    #[must_use]
    pub fn with_pointer_arithmetic_to_bytes(mut self, value: bool) -> Self {
        self.pointer_arithmetic_to_bytes = value;
        self
    }

    #[must_use]
    pub fn with_memcpy_to_bytes(mut self, value: bool) -> Self {
        self.memcpy_to_bytes = value;
        self
    }

    #[must_use]
    pub fn with_flatten_globals(mut self, value: bool) -> Self {
        self.flatten_globals = value;
        self
    }
}
