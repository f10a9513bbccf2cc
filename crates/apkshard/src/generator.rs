//! Standalone package generator
//!
//! Runs the pipeline for one bundle:
//! 1. split every module along the active ABI and screen density dimensions
//! 2. group the splits into shards
//! 3. merge each shard into a single split
//! 4. run the injector chain over every merged shard
//!
//! Merging and injection run in parallel across shards. The output keeps the
//! sharder's order.

use log::{debug, info};
use rayon::{ThreadPoolBuilder, prelude::*};

use crate::{
    config::GenerationConfig,
    error::Result,
    injectors::InjectorChain,
    merger::{DexMergeCache, ShardMerger},
    model::{
        module::{BundleMetadata, BundleModule, SourceStamp},
        split::ModuleSplit,
    },
    sharder::Sharder,
    splitter::ModuleSplitter,
};

/// Generates one standalone package per shard of a bundle
#[derive(Debug)]
pub struct StandaloneApksGenerator<'a> {
    config: &'a GenerationConfig,
    injectors: InjectorChain,
    parallelism: Option<usize>,
}

impl<'a> StandaloneApksGenerator<'a> {
    pub fn new(
        config: &'a GenerationConfig,
        metadata: &BundleMetadata,
        stamp: Option<&SourceStamp>,
    ) -> Self {
        Self {
            config,
            injectors: InjectorChain::standalone(
                config.restrict_v3_signing_to_r_plus(),
                stamp,
                metadata,
            ),
            parallelism: None,
        }
    }

    /// Run on a dedicated pool of `workers` threads instead of the global pool
    #[must_use]
    pub fn with_parallelism(mut self, workers: usize) -> Self {
        self.parallelism = Some(workers);
        self
    }

    pub fn injectors(&self) -> &InjectorChain {
        &self.injectors
    }

    /// Generate the final standalone splits for `modules`
    ///
    /// `modules` must be in bundle declaration order; that order decides how
    /// code segments are numbered in every shard. Any fault aborts the whole
    /// run.
    pub fn generate(&self, modules: &[BundleModule]) -> Result<Vec<ModuleSplit>> {
        match self.parallelism {
            Some(workers) => {
                debug!("Generating on a dedicated pool of {workers} workers");
                let pool = ThreadPoolBuilder::new().num_threads(workers).build()?;
                pool.install(|| self.run(modules))
            }
            None => self.run(modules),
        }
    }

    fn run(&self, modules: &[BundleModule]) -> Result<Vec<ModuleSplit>> {
        let dimensions = self.config.standalone_dimensions();
        info!(
            "Generating standalone packages for {} modules sharded on {:?}",
            modules.len(),
            dimensions
        );

        let splitter = ModuleSplitter::new(self.config);
        let splits: Vec<ModuleSplit> = modules
            .par_iter()
            .map(|module| splitter.split_module(module, &dimensions))
            .collect::<Vec<_>>()
            .into_iter()
            .flatten()
            .collect();

        let shards = Sharder::new(dimensions.iter().copied()).group_splits_to_shards(&splits)?;

        let merger = ShardMerger::for_modules(modules);
        let cache = DexMergeCache::new();
        let standalone = shards
            .par_iter()
            .map(|shard| {
                merger
                    .merge_single_shard(shard, &cache)
                    .map(|merged| self.injectors.apply(merged))
            })
            .collect::<Result<Vec<_>>>()?;

        let stats = cache.stats();
        info!(
            "Generated {} standalone packages from {} splits ({} dex cache hits, {} misses)",
            standalone.len(),
            splits.len(),
            stats.hits,
            stats.misses
        );
        Ok(standalone)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        error::GenerationError,
        model::{
            entry::{EntryContent, ModuleEntry},
            module::AndroidManifest,
            split::SplitType,
            targeting::{
                Abi, ApkTargeting, Language, OptimizationDimension, TextureCompressionFormat,
            },
        },
        config::SuffixStripping,
        types::ModuleKind,
    };

    fn base_with_abis() -> BundleModule {
        BundleModule::builder("base")
            .kind(ModuleKind::Base)
            .manifest(AndroidManifest::new("com.example.app"))
            .file("dex/classes.dex", b"base-code".to_vec())
            .targeted_entry(
                ModuleEntry::from_bytes("lib/x86/libapp.so", b"x86".to_vec()),
                ApkTargeting::for_value(Abi::X86),
            )
            .targeted_entry(
                ModuleEntry::from_bytes("lib/armeabi-v7a/libapp.so", b"arm".to_vec()),
                ApkTargeting::for_value(Abi::ArmeabiV7a),
            )
            .build()
    }

    fn abi_config() -> GenerationConfig {
        GenerationConfig::builder()
            .optimization_dimensions([OptimizationDimension::Abi])
            .build()
    }

    #[test]
    fn test_no_modules_no_packages() {
        let config = abi_config();
        let generator = StandaloneApksGenerator::new(&config, &BundleMetadata::default(), None);
        assert!(generator.generate(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_one_package_per_abi() {
        let config = abi_config();
        let generator = StandaloneApksGenerator::new(&config, &BundleMetadata::default(), None);
        let packages = generator.generate(&[base_with_abis()]).unwrap();

        let abis: Vec<Option<Abi>> = packages.iter().map(|p| p.apk_targeting.abi()).collect();
        assert_eq!(abis, [Some(Abi::ArmeabiV7a), Some(Abi::X86)]);
        for package in &packages {
            assert_eq!(package.split_type, SplitType::Standalone);
            assert_eq!(package.variant_targeting.targeting, package.apk_targeting);
            assert_eq!(package.module_name, "base");
        }
    }

    #[test]
    fn test_dedicated_pool_gives_same_output() {
        let config = abi_config();
        let modules = [base_with_abis()];
        let generator = StandaloneApksGenerator::new(&config, &BundleMetadata::default(), None);
        let global = generator.generate(&modules).unwrap();
        let pooled = generator.with_parallelism(2).generate(&modules).unwrap();

        let describe = |packages: &[ModuleSplit]| -> Vec<String> {
            packages.iter().map(ToString::to_string).collect()
        };
        assert_eq!(describe(&global), describe(&pooled));
    }

    #[test]
    fn test_v3_signing_flag_is_carried() {
        let config = abi_config()
            .to_builder()
            .restrict_v3_signing_to_r_plus(true)
            .build();
        let generator = StandaloneApksGenerator::new(&config, &BundleMetadata::default(), None);
        let packages = generator.generate(&[base_with_abis()]).unwrap();
        assert!(packages.iter().all(|p| p.variant_targeting.v3_signing_restricted_to_r_plus));
    }

    #[test]
    fn test_metadata_is_injected_into_every_package() {
        let config = abi_config();
        let metadata = BundleMetadata {
            code_transparency: Some(EntryContent::from_bytes(b"jwt".to_vec())),
            ..BundleMetadata::default()
        };
        let stamp = SourceStamp {
            source: "store".to_owned(),
        };
        let generator = StandaloneApksGenerator::new(&config, &metadata, Some(&stamp));
        assert_eq!(generator.injectors().len(), 3);

        for package in generator.generate(&[base_with_abis()]).unwrap() {
            assert!(
                package
                    .paths()
                    .any(|path| path.as_str() == crate::injectors::CODE_TRANSPARENCY_PATH)
            );
            assert_eq!(
                package
                    .manifest
                    .metadata_value(crate::injectors::STAMP_SOURCE_METADATA_KEY),
                Some("store")
            );
        }
    }

    #[test]
    fn test_conflict_aborts_the_run() {
        let config = GenerationConfig::default();
        let feature = |name: &str, bytes: &[u8]| {
            BundleModule::builder(name)
                .file("assets/shared.txt", bytes.to_vec())
                .build()
        };
        let generator = StandaloneApksGenerator::new(&config, &BundleMetadata::default(), None);
        let err = generator
            .generate(&[feature("one", b"1"), feature("two", b"2")])
            .unwrap_err();
        assert!(matches!(err, GenerationError::ConflictingEntry { .. }));
    }

    fn contents(package: &ModuleSplit) -> Vec<(String, Vec<u8>)> {
        package
            .entries
            .iter()
            .map(|e| (e.path().to_string(), e.read_content().unwrap().to_vec()))
            .collect()
    }

    #[test]
    fn test_languages_ship_in_every_package() {
        let module = BundleModule::builder("base")
            .kind(ModuleKind::Base)
            .file("dex/classes.dex", b"code".to_vec())
            .targeted_entry(
                ModuleEntry::from_bytes("lib/x86/libapp.so", b"x86".to_vec()),
                ApkTargeting::for_value(Abi::X86),
            )
            .targeted_entry(
                ModuleEntry::from_bytes("lib/arm64-v8a/libapp.so", b"arm64".to_vec()),
                ApkTargeting::for_value(Abi::Arm64V8a),
            )
            .targeted_entry(
                ModuleEntry::from_bytes("res/values-fr/strings.xml", b"fr".to_vec()),
                ApkTargeting::for_value(Language::new("fr")),
            )
            .targeted_entry(
                ModuleEntry::from_bytes("res/values-de/strings.xml", b"de".to_vec()),
                ApkTargeting::for_value(Language::new("de")),
            )
            .build();
        let config = GenerationConfig::builder()
            .optimization_dimensions([OptimizationDimension::Abi, OptimizationDimension::Language])
            .build();
        let generator = StandaloneApksGenerator::new(&config, &BundleMetadata::default(), None);
        let packages = generator.generate(&[module]).unwrap();

        assert_eq!(packages.len(), 2);
        for package in &packages {
            assert!(package.apk_targeting.language().is_none());
            let paths: Vec<&str> = package.paths().map(|path| path.as_str()).collect();
            assert!(paths.contains(&"res/values-fr/strings.xml"), "{paths:?}");
            assert!(paths.contains(&"res/values-de/strings.xml"), "{paths:?}");
        }
    }

    #[test]
    fn test_stripped_texture_variant_replaces_fallback() {
        let textures = |stripping: Option<SuffixStripping>| {
            let mut builder = GenerationConfig::builder()
                .optimization_dimensions([OptimizationDimension::TextureCompressionFormat]);
            if let Some(stripping) = stripping {
                builder = builder
                    .suffix_stripping(OptimizationDimension::TextureCompressionFormat, stripping);
            }
            builder.build()
        };
        let module = BundleModule::builder("base")
            .kind(ModuleKind::Base)
            .file("assets/textures/a.ktx", b"fallback".to_vec())
            .targeted_entry(
                ModuleEntry::from_bytes("assets/textures#tcf_astc/a.ktx", b"astc".to_vec()),
                ApkTargeting::for_value(TextureCompressionFormat::Astc),
            )
            .build();
        let generate = |config: &GenerationConfig| {
            StandaloneApksGenerator::new(config, &BundleMetadata::default(), None)
                .generate(std::slice::from_ref(&module))
                .unwrap()
        };

        let selected = generate(&textures(Some(SuffixStripping {
            enabled: true,
            default_suffix: Some("astc".to_owned()),
        })));
        assert_eq!(selected.len(), 1);
        assert_eq!(
            contents(&selected[0]),
            [("assets/textures/a.ktx".to_owned(), b"astc".to_vec())]
        );

        let fallback = generate(&textures(Some(SuffixStripping {
            enabled: true,
            default_suffix: None,
        })));
        assert_eq!(
            contents(&fallback[0]),
            [("assets/textures/a.ktx".to_owned(), b"fallback".to_vec())]
        );

        // Without stripping every variant ships under its own directory
        let unstripped = generate(&textures(None));
        assert_eq!(unstripped.len(), 1);
        assert_eq!(unstripped[0].entries.len(), 2);
    }
}
