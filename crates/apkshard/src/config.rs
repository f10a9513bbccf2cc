//! Generation configuration
//!
//! A [`GenerationConfig`] is built once per run, either through
//! [`GenerationConfig::builder`] or loaded from a TOML file, and is only ever
//! read afterwards. Every pipeline stage borrows it; none mutates it.
//!
//! ```toml
//! optimization_dimensions = ["ABI", "SCREEN_DENSITY"]
//! enable_native_library_compression_splitter = true
//! abis_for_placeholder_libs = ["arm64-v8a", "armeabi-v7a"]
//! master_pinned_resource_ids = [0x7f010001]
//!
//! [[suffix_stripping]]
//! dimension = "TEXTURE_COMPRESSION_FORMAT"
//! enabled = true
//! default_suffix = "astc"
//! ```

use std::{
    collections::{BTreeMap, BTreeSet},
    path::Path,
};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::model::{
    module::{ResourceId, ResourceRef},
    targeting::{Abi, OptimizationDimension},
};

/// Suffix stripping policy for one dimension
///
/// Stripping resolves the dimension to a single variant per package. Only the
/// entries under `default_suffix` are kept, with the suffix removed from their
/// directory. Without a default suffix every suffixed variant is dropped and
/// the untargeted fallback directory is shipped instead.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SuffixStripping {
    pub enabled: bool,
    /// Suffix value of the variant to keep, e.g. `astc`
    pub default_suffix: Option<String>,
}

/// Immutable policy for one generation run
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "ConfigFile")]
pub struct GenerationConfig {
    optimization_dimensions: BTreeSet<OptimizationDimension>,
    enable_native_library_compression_splitter: bool,
    enable_dex_compression_splitter: bool,
    installable_on_external_storage: bool,
    abis_for_placeholder_libs: BTreeSet<Abi>,
    master_pinned_resource_ids: BTreeSet<ResourceId>,
    master_pinned_resource_names: BTreeSet<String>,
    base_manifest_reachable_resources: BTreeSet<ResourceId>,
    suffix_strippings: BTreeMap<OptimizationDimension, SuffixStripping>,
    restrict_v3_signing_to_r_plus: bool,
}

impl GenerationConfig {
    pub fn builder() -> GenerationConfigBuilder {
        GenerationConfigBuilder::default()
    }

    /// Builder pre-populated with this configuration
    pub fn to_builder(&self) -> GenerationConfigBuilder {
        GenerationConfigBuilder {
            config: self.clone(),
        }
    }

    pub fn from_toml_str(source: &str) -> Result<Self> {
        toml::from_str(source).context("Failed to parse generation configuration")
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path).with_context(|| {
            format!("Failed to read generation configuration {}", path.display())
        })?;
        Self::from_toml_str(&source).with_context(|| format!("Invalid {}", path.display()))
    }

    /// Active dimensions in declaration order
    pub fn optimization_dimensions(&self) -> &BTreeSet<OptimizationDimension> {
        &self.optimization_dimensions
    }

    /// Active dimensions that standalone packages are sharded along
    pub fn standalone_dimensions(&self) -> BTreeSet<OptimizationDimension> {
        self.optimization_dimensions
            .iter()
            .copied()
            .filter(OptimizationDimension::is_standalone_axis)
            .collect()
    }

    pub fn enable_native_library_compression_splitter(&self) -> bool {
        self.enable_native_library_compression_splitter
    }

    pub fn enable_dex_compression_splitter(&self) -> bool {
        self.enable_dex_compression_splitter
    }

    pub fn installable_on_external_storage(&self) -> bool {
        self.installable_on_external_storage
    }

    pub fn abis_for_placeholder_libs(&self) -> &BTreeSet<Abi> {
        &self.abis_for_placeholder_libs
    }

    pub fn master_pinned_resource_ids(&self) -> &BTreeSet<ResourceId> {
        &self.master_pinned_resource_ids
    }

    pub fn master_pinned_resource_names(&self) -> &BTreeSet<String> {
        &self.master_pinned_resource_names
    }

    pub fn base_manifest_reachable_resources(&self) -> &BTreeSet<ResourceId> {
        &self.base_manifest_reachable_resources
    }

    pub fn suffix_stripping(&self, dimension: OptimizationDimension) -> Option<&SuffixStripping> {
        self.suffix_strippings.get(&dimension)
    }

    pub fn should_strip_targeting_suffix(&self, dimension: OptimizationDimension) -> bool {
        self.suffix_stripping(dimension)
            .is_some_and(|stripping| stripping.enabled)
    }

    pub fn restrict_v3_signing_to_r_plus(&self) -> bool {
        self.restrict_v3_signing_to_r_plus
    }

    /// Native libraries must stay compressed when the app can live on external storage
    pub fn should_uncompress_native_libraries(&self) -> bool {
        self.enable_native_library_compression_splitter && !self.installable_on_external_storage
    }

    pub fn should_uncompress_dex(&self) -> bool {
        self.enable_dex_compression_splitter
    }

    /// Whether a resource must stay in the master split of its module
    pub fn is_master_pinned(&self, resource: &ResourceRef, in_base_module: bool) -> bool {
        self.master_pinned_resource_ids.contains(&resource.id)
            || self.master_pinned_resource_names.contains(&resource.name)
            || (in_base_module && self.base_manifest_reachable_resources.contains(&resource.id))
    }
}

/// Builder for [`GenerationConfig`]
#[derive(Debug, Default)]
pub struct GenerationConfigBuilder {
    config: GenerationConfig,
}

impl GenerationConfigBuilder {
    pub fn optimization_dimensions(
        mut self,
        dimensions: impl IntoIterator<Item = OptimizationDimension>,
    ) -> Self {
        self.config.optimization_dimensions = dimensions.into_iter().collect();
        self
    }

    pub fn enable_native_library_compression_splitter(mut self, enabled: bool) -> Self {
        self.config.enable_native_library_compression_splitter = enabled;
        self
    }

    pub fn enable_dex_compression_splitter(mut self, enabled: bool) -> Self {
        self.config.enable_dex_compression_splitter = enabled;
        self
    }

    pub fn installable_on_external_storage(mut self, installable: bool) -> Self {
        self.config.installable_on_external_storage = installable;
        self
    }

    pub fn abis_for_placeholder_libs(mut self, abis: impl IntoIterator<Item = Abi>) -> Self {
        self.config.abis_for_placeholder_libs = abis.into_iter().collect();
        self
    }

    pub fn master_pinned_resource_ids(
        mut self,
        ids: impl IntoIterator<Item = ResourceId>,
    ) -> Self {
        self.config.master_pinned_resource_ids = ids.into_iter().collect();
        self
    }

    pub fn master_pinned_resource_names<S: Into<String>>(
        mut self,
        names: impl IntoIterator<Item = S>,
    ) -> Self {
        self.config.master_pinned_resource_names = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn base_manifest_reachable_resources(
        mut self,
        ids: impl IntoIterator<Item = ResourceId>,
    ) -> Self {
        self.config.base_manifest_reachable_resources = ids.into_iter().collect();
        self
    }

    pub fn suffix_stripping(
        mut self,
        dimension: OptimizationDimension,
        stripping: SuffixStripping,
    ) -> Self {
        self.config.suffix_strippings.insert(dimension, stripping);
        self
    }

    pub fn restrict_v3_signing_to_r_plus(mut self, restrict: bool) -> Self {
        self.config.restrict_v3_signing_to_r_plus = restrict;
        self
    }

    pub fn build(self) -> GenerationConfig {
        self.config
    }
}

/// On-disk shape of the configuration
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    optimization_dimensions: Vec<OptimizationDimension>,
    enable_native_library_compression_splitter: bool,
    enable_dex_compression_splitter: bool,
    installable_on_external_storage: bool,
    abis_for_placeholder_libs: Vec<Abi>,
    master_pinned_resource_ids: Vec<ResourceId>,
    master_pinned_resource_names: Vec<String>,
    base_manifest_reachable_resources: Vec<ResourceId>,
    suffix_stripping: Vec<SuffixStrippingEntry>,
    restrict_v3_signing_to_r_plus: bool,
}

#[derive(Debug, Deserialize)]
struct SuffixStrippingEntry {
    dimension: OptimizationDimension,
    #[serde(flatten)]
    stripping: SuffixStripping,
}

impl From<ConfigFile> for GenerationConfig {
    fn from(file: ConfigFile) -> Self {
        Self {
            optimization_dimensions: file.optimization_dimensions.into_iter().collect(),
            enable_native_library_compression_splitter: file
                .enable_native_library_compression_splitter,
            enable_dex_compression_splitter: file.enable_dex_compression_splitter,
            installable_on_external_storage: file.installable_on_external_storage,
            abis_for_placeholder_libs: file.abis_for_placeholder_libs.into_iter().collect(),
            master_pinned_resource_ids: file.master_pinned_resource_ids.into_iter().collect(),
            master_pinned_resource_names: file.master_pinned_resource_names.into_iter().collect(),
            base_manifest_reachable_resources: file
                .base_manifest_reachable_resources
                .into_iter()
                .collect(),
            suffix_strippings: file
                .suffix_stripping
                .into_iter()
                .map(|entry| (entry.dimension, entry.stripping))
                .collect(),
            restrict_v3_signing_to_r_plus: file.restrict_v3_signing_to_r_plus,
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_default_instance_is_empty() {
        let config = GenerationConfig::default();
        assert!(config.optimization_dimensions().is_empty());
        assert!(!config.should_uncompress_native_libraries());
        assert!(!config.should_uncompress_dex());
        assert!(!config.should_strip_targeting_suffix(OptimizationDimension::DeviceTier));
        assert_eq!(config, GenerationConfig::builder().build());
    }

    #[test]
    fn test_load_from_toml() {
        let config = GenerationConfig::from_toml_str(
            r#"
optimization_dimensions = ["ABI", "SCREEN_DENSITY", "ABI"]
enable_native_library_compression_splitter = true
installable_on_external_storage = true
abis_for_placeholder_libs = ["arm64-v8a", "x86"]
master_pinned_resource_ids = [0x7f010001]
master_pinned_resource_names = ["app_name"]

[[suffix_stripping]]
dimension = "TEXTURE_COMPRESSION_FORMAT"
enabled = true
default_suffix = "astc"
"#,
        )
        .unwrap();

        let expected = GenerationConfig::builder()
            .optimization_dimensions([
                OptimizationDimension::Abi,
                OptimizationDimension::ScreenDensity,
            ])
            .enable_native_library_compression_splitter(true)
            .installable_on_external_storage(true)
            .abis_for_placeholder_libs([Abi::Arm64V8a, Abi::X86])
            .master_pinned_resource_ids([ResourceId(0x7f01_0001)])
            .master_pinned_resource_names(["app_name"])
            .suffix_stripping(
                OptimizationDimension::TextureCompressionFormat,
                SuffixStripping {
                    enabled: true,
                    default_suffix: Some("astc".to_owned()),
                },
            )
            .build();
        assert_eq!(config, expected);
        // External storage keeps native libraries compressed
        assert!(!config.should_uncompress_native_libraries());
        assert!(
            config.should_strip_targeting_suffix(OptimizationDimension::TextureCompressionFormat)
        );
    }

    #[test]
    fn test_standalone_dimensions_keep_abi_and_density() {
        let config = GenerationConfig::builder()
            .optimization_dimensions(OptimizationDimension::ALL)
            .build();
        assert_eq!(
            config.standalone_dimensions().into_iter().collect::<Vec<_>>(),
            [OptimizationDimension::Abi, OptimizationDimension::ScreenDensity]
        );

        let language_only = config
            .to_builder()
            .optimization_dimensions([OptimizationDimension::Language])
            .build();
        assert!(language_only.standalone_dimensions().is_empty());
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let err = GenerationConfig::from_toml_str("shard_everything = true").unwrap_err();
        assert!(format!("{err:#}").contains("shard_everything"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("generation.toml");
        std::fs::write(&path, "enable_dex_compression_splitter = true\n").unwrap();
        let config = GenerationConfig::from_file(&path).unwrap();
        assert!(config.should_uncompress_dex());

        let missing = GenerationConfig::from_file(&dir.path().join("missing.toml")).unwrap_err();
        assert!(missing.to_string().contains("missing.toml"));
    }

    #[test]
    fn test_master_pinning() {
        let config = GenerationConfig::builder()
            .master_pinned_resource_names(["icon"])
            .base_manifest_reachable_resources([ResourceId(7)])
            .build();
        let icon = ResourceRef {
            id: ResourceId(1),
            name: "icon".to_owned(),
        };
        let reachable = ResourceRef {
            id: ResourceId(7),
            name: "theme".to_owned(),
        };
        assert!(config.is_master_pinned(&icon, false));
        assert!(config.is_master_pinned(&reachable, true));
        assert!(!config.is_master_pinned(&reachable, false));
    }

    #[test]
    fn test_to_builder_preserves_fields() {
        let config = GenerationConfig::builder()
            .restrict_v3_signing_to_r_plus(true)
            .build();
        let derived = config.to_builder().enable_dex_compression_splitter(true).build();
        assert!(derived.restrict_v3_signing_to_r_plus());
        assert!(derived.enable_dex_compression_splitter());
        assert!(!config.enable_dex_compression_splitter());
    }
}
