//! Module splits: the fragments flowing between splitter, sharder and merger

use std::fmt;

use super::{
    entry::{EntryPath, ModuleEntry},
    module::AndroidManifest,
    targeting::{ApkTargeting, VariantTargeting},
};

/// How the consuming device treats a split
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SplitType {
    /// One of several splits installed together
    #[default]
    Split,
    /// Self-contained package, no further splits expected
    Standalone,
}

impl fmt::Display for SplitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Split => write!(f, "split"),
            Self::Standalone => write!(f, "standalone"),
        }
    }
}

/// A dimension-scoped subset of one module's content, or a fused shard
#[derive(Debug, Clone)]
pub struct ModuleSplit {
    pub module_name: String,
    pub entries: Vec<ModuleEntry>,
    pub apk_targeting: ApkTargeting,
    pub variant_targeting: VariantTargeting,
    pub master: bool,
    pub split_type: SplitType,
    pub manifest: AndroidManifest,
}

impl ModuleSplit {
    /// Master split of `module_name` holding `entries`
    pub fn master(
        module_name: impl Into<String>,
        manifest: AndroidManifest,
        entries: Vec<ModuleEntry>,
    ) -> Self {
        Self {
            module_name: module_name.into(),
            entries,
            apk_targeting: ApkTargeting::master(),
            variant_targeting: VariantTargeting::default(),
            master: true,
            split_type: SplitType::Split,
            manifest,
        }
    }

    /// Split of `module_name` restricted to a single dimension value
    pub fn targeted(
        module_name: impl Into<String>,
        manifest: AndroidManifest,
        targeting: ApkTargeting,
        entries: Vec<ModuleEntry>,
    ) -> Self {
        debug_assert!(
            targeting.values().count() == 1,
            "targeted splits carry exactly one dimension value"
        );
        Self {
            apk_targeting: targeting,
            master: false,
            ..Self::master(module_name, manifest, entries)
        }
    }

    pub fn find_entry(&self, path: &EntryPath) -> Option<&ModuleEntry> {
        self.entries.iter().find(|entry| entry.path() == path)
    }

    pub fn paths(&self) -> impl Iterator<Item = &EntryPath> {
        self.entries.iter().map(ModuleEntry::path)
    }

    /// Copy of the split with an extra entry, replacing any entry at the same path
    #[must_use]
    pub fn with_entry(mut self, entry: ModuleEntry) -> Self {
        self.entries.retain(|existing| existing.path() != entry.path());
        self.entries.push(entry);
        self
    }
}

impl fmt::Display for ModuleSplit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] ({} entries, {})",
            self.module_name,
            self.apk_targeting,
            self.entries.len(),
            self.split_type
        )
    }
}
