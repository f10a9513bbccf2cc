//! Data model shared by every pipeline stage

pub mod entry;
pub mod module;
pub mod split;
pub mod targeting;

pub use entry::{Compression, ContentDigest, EntryContent, EntryPath, ModuleEntry};
pub use module::{
    AndroidManifest, BundleMetadata, BundleModule, BundleModuleBuilder, EntryConfig, ResourceId,
    ResourceRef, SourceStamp,
};
pub use split::{ModuleSplit, SplitType};
pub use targeting::{
    Abi, ApkTargeting, DeviceTier, DimensionValue, Language, OptimizationDimension, ScreenDensity,
    TargetingConflict, TextureCompressionFormat, VariantTargeting,
};
