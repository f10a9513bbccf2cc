//! Collection aliases and module classification

use std::hash::BuildHasherDefault;

use indexmap::{IndexMap, IndexSet};
use rustc_hash::FxHasher;

/// Type alias for FxHasher-based IndexMap
pub type FxIndexMap<K, V> = IndexMap<K, V, BuildHasherDefault<FxHasher>>;

/// Type alias for FxHasher-based IndexSet
pub type FxIndexSet<T> = IndexSet<T, BuildHasherDefault<FxHasher>>;

/// Classification of a bundle module based on its delivery role
///
/// The base module is the one every device installs; it owns the manifest that
/// ends up in each standalone package and is the only module that receives
/// placeholder native libraries and base-manifest resource pinning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ModuleKind {
    /// The base module (always installed)
    Base,

    /// A feature module carrying code and resources
    #[default]
    Feature,

    /// A module that only carries assets
    AssetOnly,
}

impl ModuleKind {
    /// Check if this is the base module
    pub fn is_base(&self) -> bool {
        matches!(self, Self::Base)
    }
}
