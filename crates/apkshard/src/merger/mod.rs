//! Shard merger
//!
//! Fuses the splits of one shard into a single split:
//! - non-code entries are united; the same path with the same content is kept
//!   once, the same path with different content aborts the merge
//! - code segments of all modules are renumbered into one sequence, memoized
//!   across shards by [`DexMergeCache`]
//! - the targeting of the result is the union of its splits' targeting

pub mod cache;
pub(crate) mod dex;


use log::debug;

pub use cache::{CacheStats, DexMergeCache, DexMergeKey};
use dex::DexSource;

use crate::{
    error::{GenerationError, Result},
    model::{
        entry::{EntryPath, ModuleEntry},
        module::BundleModule,
        split::ModuleSplit,
        targeting::ApkTargeting,
    },
    sharder::ShardGroup,
    types::{FxIndexMap, FxIndexSet},
};

/// Merges shard groups using a fixed module-processing order
#[derive(Debug, Clone)]
pub struct ShardMerger {
    module_order: FxIndexSet<String>,
    base_module: Option<String>,
}

impl ShardMerger {
    /// Merger processing modules in the given order
    pub fn new<S: Into<String>>(module_order: impl IntoIterator<Item = S>) -> Self {
        Self {
            module_order: module_order.into_iter().map(Into::into).collect(),
            base_module: None,
        }
    }

    /// Merger processing modules in bundle declaration order
    pub fn for_modules(modules: &[BundleModule]) -> Self {
        Self {
            module_order: modules
                .iter()
                .map(|module| module.name().to_owned())
                .collect(),
            base_module: modules
                .iter()
                .find(|module| module.is_base())
                .map(|module| module.name().to_owned()),
        }
    }

    /// Fuse all splits of `shard` into one split
    pub fn merge_single_shard(
        &self,
        shard: &ShardGroup<'_>,
        cache: &DexMergeCache,
    ) -> Result<ModuleSplit> {
        if shard.splits.is_empty() {
            return Err(GenerationError::EmptyShard { shard: shard.index });
        }

        let mut ordered = Vec::with_capacity(shard.splits.len());
        for split in &shard.splits {
            ordered.push((self.position_of(&split.module_name)?, *split));
        }
        // Stable: splits of one module keep their relative order
        ordered.sort_by_key(|(position, _)| *position);

        let targeting = self.merge_targeting(shard, &ordered)?;

        let mut merged: FxIndexMap<EntryPath, (&str, ModuleEntry)> = FxIndexMap::default();
        let mut dex_sources = Vec::new();
        for (position, split) in &ordered {
            for entry in &split.entries {
                if entry.path().is_dex() {
                    dex_sources.push(DexSource::new(
                        split.module_name.as_str(),
                        *position,
                        entry.clone(),
                    )?);
                    continue;
                }
                match merged.get(entry.path()) {
                    Some((first_module, existing)) => {
                        if !same_content(existing, entry)? {
                            return Err(GenerationError::ConflictingEntry {
                                path: entry.path().clone(),
                                shard: shard.index,
                                first_module: (*first_module).to_owned(),
                                second_module: split.module_name.clone(),
                            });
                        }
                    }
                    None => {
                        merged.insert(
                            entry.path().clone(),
                            (split.module_name.as_str(), entry.clone()),
                        );
                    }
                }
            }
        }

        let dex_entries = if dex_sources.is_empty() {
            Vec::new()
        } else {
            let key = DexMergeKey::from_sources(&dex_sources);
            cache
                .get_or_merge(key, || dex::renumber(&dex_sources))
                .to_vec()
        };

        let (_, representative) = ordered
            .iter()
            .find(|(_, split)| Some(&split.module_name) == self.base_module.as_ref())
            .unwrap_or(&ordered[0]);

        debug!(
            "Merged shard {} [{}]: {} splits from {} modules, {} entries, {} code segments",
            shard.index,
            targeting,
            ordered.len(),
            shard.module_names().len(),
            merged.len(),
            dex_entries.len()
        );

        let mut entries: Vec<ModuleEntry> = merged.into_values().map(|(_, entry)| entry).collect();
        entries.extend(dex_entries);

        Ok(ModuleSplit {
            apk_targeting: targeting,
            ..ModuleSplit::master(
                representative.module_name.clone(),
                representative.manifest.clone(),
                entries,
            )
        })
    }

    fn position_of(&self, module: &str) -> Result<usize> {
        self.module_order
            .get_index_of(module)
            .ok_or_else(|| GenerationError::UnknownModule {
                module: module.to_owned(),
            })
    }

    fn merge_targeting(
        &self,
        shard: &ShardGroup<'_>,
        ordered: &[(usize, &ModuleSplit)],
    ) -> Result<ApkTargeting> {
        ordered
            .iter()
            .try_fold(ApkTargeting::master(), |targeting, (_, split)| {
                targeting.merge(&split.apk_targeting).map_err(|conflict| {
                    GenerationError::ConflictingTargeting {
                        dimension: conflict.existing.dimension(),
                        shard: shard.index,
                        module: split.module_name.clone(),
                        first: conflict.existing.to_string(),
                        second: conflict.incoming.to_string(),
                    }
                })
            })
    }
}

/// Content equality by digest; handles to the same content skip hashing
fn same_content(a: &ModuleEntry, b: &ModuleEntry) -> Result<bool> {
    if a.content().ptr_eq(b.content()) {
        return Ok(true);
    }
    if a.size() != b.size() {
        return Ok(false);
    }
    Ok(a.digest()? == b.digest()?)
}
