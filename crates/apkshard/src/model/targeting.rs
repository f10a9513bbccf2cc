//! Device-configuration dimensions and targeting descriptors
//!
//! Every dimension has a finite, ordered value domain. The declaration order of
//! the variants below is the order fragments are emitted in and the order the
//! sharder enumerates its cross-product in, so it must not be rearranged.

use std::fmt;

use serde::Deserialize;

/// An axis of device variation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OptimizationDimension {
    Abi,
    ScreenDensity,
    Language,
    TextureCompressionFormat,
    DeviceTier,
}

impl OptimizationDimension {
    /// All dimensions in declaration order
    pub const ALL: [Self; 5] = [
        Self::Abi,
        Self::ScreenDensity,
        Self::Language,
        Self::TextureCompressionFormat,
        Self::DeviceTier,
    ];

    /// Key used in `#<key>_<value>` directory suffixes, if the dimension has one
    pub fn suffix_key(&self) -> Option<&'static str> {
        match self {
            Self::TextureCompressionFormat => Some("tcf"),
            Self::DeviceTier => Some("tier"),
            Self::Abi | Self::ScreenDensity | Self::Language => None,
        }
    }

    /// Whether standalone packages are sharded along this dimension
    ///
    /// Standalone packages vary only by ABI and screen density. Content
    /// targeted on other dimensions ships in every package.
    pub fn is_standalone_axis(&self) -> bool {
        matches!(self, Self::Abi | Self::ScreenDensity)
    }
}

impl fmt::Display for OptimizationDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Abi => write!(f, "ABI"),
            Self::ScreenDensity => write!(f, "screen density"),
            Self::Language => write!(f, "language"),
            Self::TextureCompressionFormat => write!(f, "texture compression format"),
            Self::DeviceTier => write!(f, "device tier"),
        }
    }
}

/// Processor architecture
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
pub enum Abi {
    #[serde(rename = "armeabi")]
    Armeabi,
    #[serde(rename = "armeabi-v7a")]
    ArmeabiV7a,
    #[serde(rename = "arm64-v8a")]
    Arm64V8a,
    #[serde(rename = "x86")]
    X86,
    #[serde(rename = "x86_64")]
    X86_64,
    #[serde(rename = "mips")]
    Mips,
    #[serde(rename = "mips64")]
    Mips64,
    #[serde(rename = "riscv64")]
    Riscv64,
}

impl Abi {
    /// Directory name used under `lib/`
    pub fn platform_name(&self) -> &'static str {
        match self {
            Self::Armeabi => "armeabi",
            Self::ArmeabiV7a => "armeabi-v7a",
            Self::Arm64V8a => "arm64-v8a",
            Self::X86 => "x86",
            Self::X86_64 => "x86_64",
            Self::Mips => "mips",
            Self::Mips64 => "mips64",
            Self::Riscv64 => "riscv64",
        }
    }
}

impl fmt::Display for Abi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.platform_name())
    }
}

/// Screen density bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScreenDensity {
    Ldpi,
    Mdpi,
    Tvdpi,
    Hdpi,
    Xhdpi,
    Xxhdpi,
    Xxxhdpi,
}

impl fmt::Display for ScreenDensity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ldpi => "ldpi",
            Self::Mdpi => "mdpi",
            Self::Tvdpi => "tvdpi",
            Self::Hdpi => "hdpi",
            Self::Xhdpi => "xhdpi",
            Self::Xxhdpi => "xxhdpi",
            Self::Xxxhdpi => "xxxhdpi",
        };
        f.write_str(name)
    }
}

/// Texture compression format of targeted assets
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextureCompressionFormat {
    Etc1Rgb8,
    Paletted,
    #[serde(rename = "3dc")]
    ThreeDc,
    Atc,
    Latc,
    Dxt1,
    S3tc,
    Pvrtc,
    Astc,
    Etc2,
}

impl TextureCompressionFormat {
    /// Value used in `#tcf_<value>` directory suffixes
    pub fn suffix(&self) -> &'static str {
        match self {
            Self::Etc1Rgb8 => "etc1_rgb8",
            Self::Paletted => "paletted",
            Self::ThreeDc => "3dc",
            Self::Atc => "atc",
            Self::Latc => "latc",
            Self::Dxt1 => "dxt1",
            Self::S3tc => "s3tc",
            Self::Pvrtc => "pvrtc",
            Self::Astc => "astc",
            Self::Etc2 => "etc2",
        }
    }
}

impl fmt::Display for TextureCompressionFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

/// BCP-47 language tag
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(transparent)]
pub struct Language(String);

impl Language {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Device tier level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(transparent)]
pub struct DeviceTier(pub u32);

impl fmt::Display for DeviceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A concrete value on one dimension
///
/// Ordering compares the dimension first, then the value in its domain order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DimensionValue {
    Abi(Abi),
    ScreenDensity(ScreenDensity),
    Language(Language),
    TextureCompressionFormat(TextureCompressionFormat),
    DeviceTier(DeviceTier),
}

impl DimensionValue {
    pub fn dimension(&self) -> OptimizationDimension {
        match self {
            Self::Abi(_) => OptimizationDimension::Abi,
            Self::ScreenDensity(_) => OptimizationDimension::ScreenDensity,
            Self::Language(_) => OptimizationDimension::Language,
            Self::TextureCompressionFormat(_) => OptimizationDimension::TextureCompressionFormat,
            Self::DeviceTier(_) => OptimizationDimension::DeviceTier,
        }
    }

    /// Value written into `#<key>_<value>` directory suffixes
    pub fn suffix_value(&self) -> String {
        match self {
            Self::TextureCompressionFormat(format) => format.suffix().to_owned(),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for DimensionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Abi(abi) => abi.fmt(f),
            Self::ScreenDensity(density) => density.fmt(f),
            Self::Language(language) => language.fmt(f),
            Self::TextureCompressionFormat(format) => format.fmt(f),
            Self::DeviceTier(tier) => tier.fmt(f),
        }
    }
}

impl From<Abi> for DimensionValue {
    fn from(abi: Abi) -> Self {
        Self::Abi(abi)
    }
}

impl From<ScreenDensity> for DimensionValue {
    fn from(density: ScreenDensity) -> Self {
        Self::ScreenDensity(density)
    }
}

impl From<Language> for DimensionValue {
    fn from(language: Language) -> Self {
        Self::Language(language)
    }
}

impl From<TextureCompressionFormat> for DimensionValue {
    fn from(format: TextureCompressionFormat) -> Self {
        Self::TextureCompressionFormat(format)
    }
}

impl From<DeviceTier> for DimensionValue {
    fn from(tier: DeviceTier) -> Self {
        Self::DeviceTier(tier)
    }
}

/// Two targetings disagree on a dimension
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetingConflict {
    pub existing: DimensionValue,
    pub incoming: DimensionValue,
}

/// Per-dimension targeting of an entry, a fragment, or a merged shard
///
/// An empty targeting is the master targeting. A fragment produced by the
/// splitter sets at most one dimension; a merged shard carries the union of
/// its fragments' values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ApkTargeting {
    abi: Option<Abi>,
    screen_density: Option<ScreenDensity>,
    language: Option<Language>,
    texture_compression_format: Option<TextureCompressionFormat>,
    device_tier: Option<DeviceTier>,
}

impl ApkTargeting {
    pub fn master() -> Self {
        Self::default()
    }

    pub fn for_value(value: impl Into<DimensionValue>) -> Self {
        let mut targeting = Self::default();
        targeting.set(value.into());
        targeting
    }

    /// Builder-style variant of [`Self::set`]
    #[must_use]
    pub fn with(mut self, value: impl Into<DimensionValue>) -> Self {
        self.set(value.into());
        self
    }

    fn set(&mut self, value: DimensionValue) {
        match value {
            DimensionValue::Abi(abi) => self.abi = Some(abi),
            DimensionValue::ScreenDensity(density) => self.screen_density = Some(density),
            DimensionValue::Language(language) => self.language = Some(language),
            DimensionValue::TextureCompressionFormat(format) => {
                self.texture_compression_format = Some(format);
            }
            DimensionValue::DeviceTier(tier) => self.device_tier = Some(tier),
        }
    }

    pub fn value(&self, dimension: OptimizationDimension) -> Option<DimensionValue> {
        match dimension {
            OptimizationDimension::Abi => self.abi.map(DimensionValue::Abi),
            OptimizationDimension::ScreenDensity => {
                self.screen_density.map(DimensionValue::ScreenDensity)
            }
            OptimizationDimension::Language => {
                self.language.clone().map(DimensionValue::Language)
            }
            OptimizationDimension::TextureCompressionFormat => self
                .texture_compression_format
                .map(DimensionValue::TextureCompressionFormat),
            OptimizationDimension::DeviceTier => self.device_tier.map(DimensionValue::DeviceTier),
        }
    }

    pub fn abi(&self) -> Option<Abi> {
        self.abi
    }

    pub fn screen_density(&self) -> Option<ScreenDensity> {
        self.screen_density
    }

    pub fn language(&self) -> Option<&Language> {
        self.language.as_ref()
    }

    pub fn texture_compression_format(&self) -> Option<TextureCompressionFormat> {
        self.texture_compression_format
    }

    pub fn device_tier(&self) -> Option<DeviceTier> {
        self.device_tier
    }

    pub fn is_master(&self) -> bool {
        *self == Self::default()
    }

    /// Set values in dimension order
    pub fn values(&self) -> impl Iterator<Item = DimensionValue> + '_ {
        OptimizationDimension::ALL
            .into_iter()
            .filter_map(|dimension| self.value(dimension))
    }

    /// Copy with the value on `dimension` cleared
    #[must_use]
    pub fn without(&self, dimension: OptimizationDimension) -> Self {
        self.values()
            .filter(|value| value.dimension() != dimension)
            .fold(Self::default(), |targeting, value| targeting.with(value))
    }

    /// Union of two targetings; the more specific value wins over an unset one
    pub fn merge(&self, other: &Self) -> Result<Self, TargetingConflict> {
        let mut merged = self.clone();
        for incoming in other.values() {
            match merged.value(incoming.dimension()) {
                Some(existing) if existing != incoming => {
                    return Err(TargetingConflict { existing, incoming });
                }
                Some(_) => {}
                None => merged.set(incoming),
            }
        }
        Ok(merged)
    }
}

impl fmt::Display for ApkTargeting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_master() {
            return f.write_str("master");
        }
        let parts: Vec<String> = self
            .values()
            .map(|value| format!("{}={value}", value.dimension()))
            .collect();
        f.write_str(&parts.join(", "))
    }
}

/// Targeting of a whole package variant as seen by the delivery side
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct VariantTargeting {
    pub targeting: ApkTargeting,
    /// Signing with the v3 scheme is limited to Android R+ devices
    pub v3_signing_restricted_to_r_plus: bool,
}

impl VariantTargeting {
    /// Variant targeting of a standalone package built from a merged shard
    pub fn standalone(shard_targeting: &ApkTargeting, restrict_v3_signing: bool) -> Self {
        Self {
            targeting: shard_targeting.clone(),
            v3_signing_restricted_to_r_plus: restrict_v3_signing,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dimension_values_order_by_dimension_then_domain() {
        let mut values = vec![
            DimensionValue::from(ScreenDensity::Hdpi),
            DimensionValue::from(Abi::X86),
            DimensionValue::from(ScreenDensity::Ldpi),
            DimensionValue::from(Abi::Armeabi),
        ];
        values.sort();
        assert_eq!(
            values,
            vec![
                DimensionValue::from(Abi::Armeabi),
                DimensionValue::from(Abi::X86),
                DimensionValue::from(ScreenDensity::Ldpi),
                DimensionValue::from(ScreenDensity::Hdpi),
            ]
        );
    }

    #[test]
    fn test_merge_takes_union() {
        let abi = ApkTargeting::for_value(Abi::Arm64V8a);
        let density = ApkTargeting::for_value(ScreenDensity::Xhdpi);
        let merged = abi.merge(&density).unwrap();
        assert_eq!(merged.abi(), Some(Abi::Arm64V8a));
        assert_eq!(merged.screen_density(), Some(ScreenDensity::Xhdpi));
        assert_eq!(merged.merge(&ApkTargeting::master()).unwrap(), merged);
    }

    #[test]
    fn test_merge_detects_conflict() {
        let arm = ApkTargeting::for_value(Abi::Arm64V8a);
        let x86 = ApkTargeting::for_value(Abi::X86);
        let conflict = arm.merge(&x86).unwrap_err();
        assert_eq!(conflict.existing, DimensionValue::Abi(Abi::Arm64V8a));
        assert_eq!(conflict.incoming, DimensionValue::Abi(Abi::X86));
    }

    #[test]
    fn test_without_clears_one_dimension() {
        let targeting = ApkTargeting::for_value(Abi::X86)
            .with(Language::new("fr"))
            .with(DeviceTier(2));
        assert_eq!(
            targeting.without(OptimizationDimension::DeviceTier),
            ApkTargeting::for_value(Abi::X86).with(Language::new("fr"))
        );
        assert!(
            ApkTargeting::for_value(DeviceTier(1))
                .without(OptimizationDimension::DeviceTier)
                .is_master()
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(ApkTargeting::master().to_string(), "master");
        let targeting = ApkTargeting::for_value(ScreenDensity::Hdpi).with(Abi::X86);
        assert_eq!(targeting.to_string(), "ABI=x86, screen density=hdpi");
    }
}
