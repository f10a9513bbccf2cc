//! Bundle modules as handed over by bundle loading and validation

use std::{collections::BTreeMap, fmt};

use rustc_hash::FxHashMap;
use serde::Deserialize;

use super::{
    entry::{EntryContent, EntryPath, ModuleEntry},
    targeting::ApkTargeting,
};
use crate::types::{FxIndexMap, ModuleKind};

/// Numeric identifier of a compiled resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(pub u32);

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

/// Resource an entry is the file of
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceRef {
    pub id: ResourceId,
    pub name: String,
}

/// Configuration metadata attached to a single entry
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryConfig {
    /// Device configurations the entry is restricted to (master when empty)
    pub targeting: ApkTargeting,
    /// Resource backed by this entry, if any
    pub resource: Option<ResourceRef>,
}

/// Parsed module manifest
///
/// Only what the injectors touch is modelled; everything else is opaque to
/// this crate and carried along in `attributes`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AndroidManifest {
    pub package_name: String,
    pub attributes: BTreeMap<String, String>,
    metadata: BTreeMap<String, String>,
}

impl AndroidManifest {
    pub fn new(package_name: impl Into<String>) -> Self {
        Self {
            package_name: package_name.into(),
            ..Self::default()
        }
    }

    /// `<meta-data>` value under `key`
    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    /// Copy of the manifest with a `<meta-data>` element set
    #[must_use]
    pub fn with_metadata(&self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut manifest = self.clone();
        manifest.metadata.insert(key.into(), value.into());
        manifest
    }
}

/// A named, self-contained unit of a bundle
///
/// Entries keep their insertion order, which is the order the splitter emits
/// them in.
#[derive(Debug, Clone)]
pub struct BundleModule {
    name: String,
    kind: ModuleKind,
    entries: FxIndexMap<EntryPath, ModuleEntry>,
    entry_configs: FxHashMap<EntryPath, EntryConfig>,
    manifest: AndroidManifest,
}

impl BundleModule {
    pub fn builder(name: impl Into<String>) -> BundleModuleBuilder {
        BundleModuleBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_base(&self) -> bool {
        self.kind.is_base()
    }

    pub fn manifest(&self) -> &AndroidManifest {
        &self.manifest
    }

    pub fn entries(&self) -> impl Iterator<Item = &ModuleEntry> {
        self.entries.values()
    }

    /// Configuration of an entry; untagged entries get the master config
    pub fn entry_config(&self, path: &EntryPath) -> Option<&EntryConfig> {
        self.entry_configs.get(path)
    }

    pub fn has_native_libraries(&self) -> bool {
        self.entries.keys().any(EntryPath::is_native_library)
    }
}

/// Builder for [`BundleModule`]
#[derive(Debug)]
pub struct BundleModuleBuilder {
    module: BundleModule,
}

impl BundleModuleBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            module: BundleModule {
                manifest: AndroidManifest::new(name.clone()),
                name,
                kind: ModuleKind::default(),
                entries: FxIndexMap::default(),
                entry_configs: FxHashMap::default(),
            },
        }
    }

    pub fn kind(mut self, kind: ModuleKind) -> Self {
        self.module.kind = kind;
        self
    }

    pub fn manifest(mut self, manifest: AndroidManifest) -> Self {
        self.module.manifest = manifest;
        self
    }

    /// Add an entry that applies to every device configuration
    pub fn entry(mut self, entry: ModuleEntry) -> Self {
        self.module.entries.insert(entry.path().clone(), entry);
        self
    }

    /// Add an in-memory entry that applies to every device configuration
    pub fn file(self, path: &str, bytes: impl Into<std::sync::Arc<[u8]>>) -> Self {
        self.entry(ModuleEntry::new(path, EntryContent::from_bytes(bytes)))
    }

    /// Add an entry restricted to the given targeting
    pub fn targeted_entry(self, entry: ModuleEntry, targeting: ApkTargeting) -> Self {
        self.configured_entry(
            entry,
            EntryConfig {
                targeting,
                resource: None,
            },
        )
    }

    /// Add an entry together with its full configuration metadata
    pub fn configured_entry(mut self, entry: ModuleEntry, config: EntryConfig) -> Self {
        let path = entry.path().clone();
        self.module.entries.insert(path.clone(), entry);
        self.module.entry_configs.insert(path, config);
        self
    }

    pub fn build(self) -> BundleModule {
        self.module
    }
}

/// Provenance source stamped into generated packages
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceStamp {
    pub source: String,
}

/// Bundle-level files that are not part of any module
#[derive(Debug, Clone, Default)]
pub struct BundleMetadata {
    /// Signed code transparency token
    pub code_transparency: Option<EntryContent>,
    /// Binary baseline runtime profile
    pub baseline_profile: Option<EntryContent>,
    /// Metadata accompanying the baseline profile
    pub baseline_profile_metadata: Option<EntryContent>,
}
