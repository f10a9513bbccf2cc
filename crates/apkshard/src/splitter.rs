//! Module splitter
//!
//! Partitions the entries of one module along the active optimization
//! dimensions. Every entry ends up in exactly one split: the master split when
//! it is untargeted on all active dimensions (or pinned to master), otherwise
//! the split of the first active dimension it is targeted on.
//!
//! Dimensions with suffix stripping enabled are resolved to one variant before
//! partitioning, so the partition covers the selected entries rather than
//! every entry of the module.

use std::collections::{BTreeMap, BTreeSet};

use log::{debug, trace};
use rustc_hash::FxHashSet;

use crate::{
    config::GenerationConfig,
    model::{
        entry::{Compression, EntryContent, EntryPath, ModuleEntry},
        module::BundleModule,
        split::ModuleSplit,
        targeting::{ApkTargeting, DimensionValue, OptimizationDimension},
    },
};

/// File name of the empty native libraries added for ABI placeholders
const PLACEHOLDER_LIBRARY_NAME: &str = "libplaceholder.so";

/// Splits bundle modules into master and single-dimension splits
#[derive(Debug, Clone, Copy)]
pub struct ModuleSplitter<'a> {
    config: &'a GenerationConfig,
}

impl<'a> ModuleSplitter<'a> {
    pub fn new(config: &'a GenerationConfig) -> Self {
        Self { config }
    }

    /// Split `module` along `dimensions`
    ///
    /// The master split is always emitted first, even when empty. Targeted
    /// splits follow in dimension order, then value order within a dimension.
    /// Dimensions without any targeted entry produce no split.
    pub fn split_module(
        &self,
        module: &BundleModule,
        dimensions: &BTreeSet<OptimizationDimension>,
    ) -> Vec<ModuleSplit> {
        let mut master_entries = Vec::new();
        let mut targeted_entries: BTreeMap<DimensionValue, Vec<ModuleEntry>> = BTreeMap::new();

        for (entry, targeting) in self.entries_with_targeting(module, dimensions) {
            let entry = self.apply_compression(entry);
            match self.assign(module, &entry, &targeting, dimensions) {
                Some(value) => {
                    trace!("{}: {} -> {value}", module.name(), entry.path());
                    targeted_entries.entry(value).or_default().push(entry);
                }
                None => master_entries.push(entry),
            }
        }

        let mut splits = Vec::with_capacity(targeted_entries.len() + 1);
        splits.push(ModuleSplit::master(
            module.name(),
            module.manifest().clone(),
            master_entries,
        ));
        for (value, entries) in targeted_entries {
            splits.push(ModuleSplit::targeted(
                module.name(),
                module.manifest().clone(),
                ApkTargeting::for_value(value),
                entries,
            ));
        }

        debug!(
            "Split module '{}' into {} splits ({} master entries)",
            module.name(),
            splits.len(),
            splits[0].entries.len()
        );
        splits
    }

    /// Module entries paired with their targeting, plus ABI placeholders,
    /// after variant selection
    fn entries_with_targeting(
        &self,
        module: &BundleModule,
        dimensions: &BTreeSet<OptimizationDimension>,
    ) -> Vec<(ModuleEntry, ApkTargeting)> {
        let mut entries: Vec<(ModuleEntry, ApkTargeting)> = module
            .entries()
            .map(|entry| {
                let targeting = module
                    .entry_config(entry.path())
                    .map(|config| config.targeting.clone())
                    .unwrap_or_default();
                (entry.clone(), targeting)
            })
            .collect();

        let needs_placeholders = module.is_base()
            && dimensions.contains(&OptimizationDimension::Abi)
            && !self.config.abis_for_placeholder_libs().is_empty()
            && !module.has_native_libraries();
        if needs_placeholders {
            debug!(
                "Adding placeholder libraries for {} ABIs to module '{}'",
                self.config.abis_for_placeholder_libs().len(),
                module.name()
            );
            for abi in self.config.abis_for_placeholder_libs() {
                let path = EntryPath::new(format!(
                    "lib/{}/{PLACEHOLDER_LIBRARY_NAME}",
                    abi.platform_name()
                ));
                entries.push((
                    ModuleEntry::new(path, EntryContent::empty()),
                    ApkTargeting::for_value(*abi),
                ));
            }
        }

        self.select_variants(module, entries)
    }

    /// Resolve dimensions with suffix stripping enabled to a single variant
    ///
    /// Entries under the default suffix lose the suffix and their targeting on
    /// that dimension. Other variants are dropped. A kept variant replaces the
    /// untargeted fallback entry at the same path.
    fn select_variants(
        &self,
        module: &BundleModule,
        entries: Vec<(ModuleEntry, ApkTargeting)>,
    ) -> Vec<(ModuleEntry, ApkTargeting)> {
        let stripped: Vec<(OptimizationDimension, &str, Option<&str>)> =
            OptimizationDimension::ALL
                .into_iter()
                .filter(|dimension| self.config.should_strip_targeting_suffix(*dimension))
                .filter_map(|dimension| {
                    let default = self
                        .config
                        .suffix_stripping(dimension)
                        .and_then(|stripping| stripping.default_suffix.as_deref());
                    Some((dimension, dimension.suffix_key()?, default))
                })
                .collect();
        if stripped.is_empty() {
            return entries;
        }

        let mut selected = Vec::with_capacity(entries.len());
        let mut replacements = FxHashSet::default();
        'entries: for (mut entry, mut targeting) in entries {
            let mut renamed = false;
            for &(dimension, key, default) in &stripped {
                let Some(value) = targeting.value(dimension) else {
                    continue;
                };
                if default != Some(value.suffix_value().as_str()) {
                    trace!("{}: {} dropped, {value} not selected", module.name(), entry.path());
                    continue 'entries;
                }
                entry = entry.with_path(entry.path().strip_directory_suffix(key));
                targeting = targeting.without(dimension);
                renamed = true;
            }
            if renamed {
                replacements.insert(entry.path().clone());
            }
            selected.push((entry, targeting, renamed));
        }

        selected
            .into_iter()
            .filter(|(entry, _, renamed)| {
                let replaced = !renamed && replacements.contains(entry.path());
                if replaced {
                    trace!("{}: fallback {} replaced", module.name(), entry.path());
                }
                !replaced
            })
            .map(|(entry, targeting, _)| (entry, targeting))
            .collect()
    }

    /// Dimension value the entry is split on, `None` for master
    fn assign(
        &self,
        module: &BundleModule,
        entry: &ModuleEntry,
        targeting: &ApkTargeting,
        dimensions: &BTreeSet<OptimizationDimension>,
    ) -> Option<DimensionValue> {
        let pinned = module
            .entry_config(entry.path())
            .and_then(|config| config.resource.as_ref())
            .is_some_and(|resource| self.config.is_master_pinned(resource, module.is_base()));
        if pinned {
            trace!("{}: {} pinned to master", module.name(), entry.path());
            return None;
        }
        dimensions
            .iter()
            .find_map(|dimension| targeting.value(*dimension))
    }

    fn apply_compression(&self, entry: ModuleEntry) -> ModuleEntry {
        let uncompress = (entry.path().is_native_library()
            && self.config.should_uncompress_native_libraries())
            || (entry.path().is_dex() && self.config.should_uncompress_dex());
        if uncompress {
            entry.with_compression(Compression::Uncompressed)
        } else {
            entry
        }
    }
}
