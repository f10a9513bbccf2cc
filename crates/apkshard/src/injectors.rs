//! Post-merge injectors
//!
//! Each injector maps a merged shard to its final form. Injectors never fail:
//! a missing input turns the injector into a pass-through, and the chain only
//! contains the injectors whose inputs are present.

use std::fmt;

use log::trace;

use crate::model::{
    entry::{EntryContent, ModuleEntry},
    module::{BundleMetadata, SourceStamp},
    split::{ModuleSplit, SplitType},
    targeting::VariantTargeting,
};

/// Manifest metadata key holding the provenance source
pub const STAMP_SOURCE_METADATA_KEY: &str = "com.android.stamp.source";
/// Manifest metadata key holding the stamp type
pub const STAMP_TYPE_METADATA_KEY: &str = "com.android.stamp.type";
/// Stamp type written into standalone packages
pub const STAMP_TYPE_STANDALONE_APK: &str = "STAMP_TYPE_STANDALONE_APK";

pub const CODE_TRANSPARENCY_PATH: &str = "root/META-INF/code_transparency_signed.jwt";
pub const BASELINE_PROFILE_PATH: &str = "assets/dexopt/baseline.prof";
pub const BASELINE_PROFILE_METADATA_PATH: &str = "assets/dexopt/baseline.profm";

type Inject = Box<dyn Fn(ModuleSplit) -> ModuleSplit + Send + Sync>;

/// Derive the variant targeting from the shard's point and mark it standalone
pub fn set_variant_targeting_and_split_type(
    shard: ModuleSplit,
    restrict_v3_signing: bool,
) -> ModuleSplit {
    ModuleSplit {
        variant_targeting: VariantTargeting::standalone(&shard.apk_targeting, restrict_v3_signing),
        split_type: SplitType::Standalone,
        ..shard
    }
}

/// Write the provenance stamp into the shard's manifest
pub fn write_source_stamp(shard: ModuleSplit, stamp: &SourceStamp) -> ModuleSplit {
    let manifest = shard
        .manifest
        .with_metadata(STAMP_SOURCE_METADATA_KEY, stamp.source.as_str())
        .with_metadata(STAMP_TYPE_METADATA_KEY, STAMP_TYPE_STANDALONE_APK);
    ModuleSplit { manifest, ..shard }
}

/// Embed the bundle's signed code transparency token
pub fn inject_code_transparency(shard: ModuleSplit, token: &EntryContent) -> ModuleSplit {
    shard.with_entry(ModuleEntry::new(CODE_TRANSPARENCY_PATH, token.clone()))
}

/// Embed the baseline runtime profile and its metadata, each when present
pub fn inject_baseline_profiles(
    shard: ModuleSplit,
    profile: Option<&EntryContent>,
    metadata: Option<&EntryContent>,
) -> ModuleSplit {
    [
        (BASELINE_PROFILE_PATH, profile),
        (BASELINE_PROFILE_METADATA_PATH, metadata),
    ]
    .into_iter()
    .filter_map(|(path, content)| content.map(|content| ModuleEntry::new(path, content.clone())))
    .fold(shard, ModuleSplit::with_entry)
}

/// Ordered chain of injectors applied to every merged shard
#[derive(Default)]
pub struct InjectorChain {
    steps: Vec<(&'static str, Inject)>,
}

impl InjectorChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// The standalone chain: targeting, provenance stamp, code transparency,
    /// then runtime profiles
    pub fn standalone(
        restrict_v3_signing: bool,
        stamp: Option<&SourceStamp>,
        metadata: &BundleMetadata,
    ) -> Self {
        let mut chain = Self::new().then("variant targeting", move |shard| {
            set_variant_targeting_and_split_type(shard, restrict_v3_signing)
        });

        if let Some(stamp) = stamp.cloned() {
            chain = chain.then("source stamp", move |shard| write_source_stamp(shard, &stamp));
        }
        if let Some(token) = metadata.code_transparency.clone() {
            chain = chain.then("code transparency", move |shard| {
                inject_code_transparency(shard, &token)
            });
        }
        let profile = metadata.baseline_profile.clone();
        let profile_metadata = metadata.baseline_profile_metadata.clone();
        if profile.is_some() || profile_metadata.is_some() {
            chain = chain.then("baseline profiles", move |shard| {
                inject_baseline_profiles(shard, profile.as_ref(), profile_metadata.as_ref())
            });
        }
        chain
    }

    /// Append `inject` to the end of the chain
    #[must_use]
    pub fn then(
        mut self,
        name: &'static str,
        inject: impl Fn(ModuleSplit) -> ModuleSplit + Send + Sync + 'static,
    ) -> Self {
        self.steps.push((name, Box::new(inject)));
        self
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.steps.iter().map(|(name, _)| *name)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn apply(&self, shard: ModuleSplit) -> ModuleSplit {
        self.steps.iter().fold(shard, |shard, (name, inject)| {
            trace!("Applying {name} injector to {}", shard.module_name);
            inject(shard)
        })
    }
}

impl fmt::Debug for InjectorChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
