//! Code-segment renumbering
//!
//! Each module numbers its code segments on its own (`classes.dex`,
//! `classes2.dex`, ...). A standalone package needs a single contiguous
//! sequence, so segments are concatenated in module-processing order and
//! renumbered from 1. Segments with identical content are kept once.

use rustc_hash::FxHashSet;

use crate::{
    error::Result,
    model::entry::{ContentDigest, EntryPath, ModuleEntry},
};

/// One code segment contributed to a shard
#[derive(Debug, Clone)]
pub(crate) struct DexSource {
    pub(crate) module: String,
    /// Position of the module in the processing order
    pub(crate) module_position: usize,
    /// Position of the segment within its module's sequence
    pub(crate) index: u32,
    pub(crate) entry: ModuleEntry,
    pub(crate) digest: ContentDigest,
}

impl DexSource {
    /// Reads the entry's digest; the entry must be a code segment
    pub(crate) fn new(
        module: impl Into<String>,
        module_position: usize,
        entry: ModuleEntry,
    ) -> Result<Self> {
        let index = entry.path().dex_index().unwrap_or_default();
        debug_assert!(index >= 1, "{} is not a code segment", entry.path());
        let digest = entry.digest()?;
        Ok(Self {
            module: module.into(),
            module_position,
            index,
            entry,
            digest,
        })
    }
}

/// Renumber `sources` into one contiguous sequence starting at `classes.dex`
///
/// Sources are ordered by module position, then by their index inside the
/// module. Content already emitted is skipped, so identical segments shipped
/// by several modules appear once.
pub(crate) fn renumber(sources: &[DexSource]) -> Vec<ModuleEntry> {
    let mut ordered: Vec<&DexSource> = sources.iter().collect();
    ordered.sort_by_key(|source| (source.module_position, source.index));

    let mut emitted = FxHashSet::default();
    let mut next_index = 1;
    let mut renumbered = Vec::with_capacity(ordered.len());
    for source in ordered {
        if !emitted.insert(source.digest) {
            continue;
        }
        renumbered.push(source.entry.with_path(EntryPath::dex(next_index)));
        next_index += 1;
    }
    renumbered
}
