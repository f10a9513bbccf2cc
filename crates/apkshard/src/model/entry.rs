//! Module entries and their content handles
//!
//! An entry is a single logical file inside a module. Content is read lazily:
//! in-memory buffers are returned as-is, file-backed content is read on first
//! use. The SHA-256 digest of the content is computed at most once per handle
//! and is what the merger uses to tell duplicates from collisions.

use std::{
    fmt,
    path::{Path, PathBuf},
    sync::{Arc, OnceLock},
};

use sha2::{Digest, Sha256};

use crate::error::{GenerationError, Result};

/// Directory holding the ordered code segments of a module
const DEX_DIRECTORY: &str = "dex";
/// Directory holding per-ABI native libraries
const LIB_DIRECTORY: &str = "lib";

/// Path of an entry, relative to the root of its module
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntryPath(String);

impl EntryPath {
    pub fn new(path: impl Into<String>) -> Self {
        let path = path.into();
        match path.strip_prefix('/') {
            Some(stripped) => Self(stripped.to_owned()),
            None => Self(path),
        }
    }

    /// Path of the code segment at `index` (1-based, the first one is unindexed)
    pub fn dex(index: u32) -> Self {
        debug_assert!(index >= 1, "dex indices start at 1");
        if index <= 1 {
            Self(format!("{DEX_DIRECTORY}/classes.dex"))
        } else {
            Self(format!("{DEX_DIRECTORY}/classes{index}.dex"))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this path lives under the given top-level directory
    pub fn starts_with_dir(&self, dir: &str) -> bool {
        self.0
            .strip_prefix(dir)
            .is_some_and(|rest| rest.starts_with('/'))
    }

    /// Whether this is a native library (`lib/<abi>/*.so`)
    pub fn is_native_library(&self) -> bool {
        self.starts_with_dir(LIB_DIRECTORY) && self.0.ends_with(".so")
    }

    /// Position of this entry in its module's code-segment sequence
    ///
    /// `dex/classes.dex` is index 1, `dex/classesN.dex` is index N for N >= 2.
    /// Anything else (including `classes1.dex` and `classes0.dex`) is not a
    /// code segment.
    pub fn dex_index(&self) -> Option<u32> {
        let file_name = self.0.strip_prefix("dex/")?;
        let number = file_name.strip_prefix("classes")?.strip_suffix(".dex")?;
        if number.is_empty() {
            return Some(1);
        }
        if number.starts_with('0') || !number.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        number.parse::<u32>().ok().filter(|index| *index >= 2)
    }

    pub fn is_dex(&self) -> bool {
        self.dex_index().is_some()
    }

    /// Remove `#<key>_<value>` suffixes from every directory component
    ///
    /// `assets/textures#tcf_astc/a.png` with key `tcf` becomes
    /// `assets/textures/a.png`. The file name itself is left untouched.
    pub fn strip_directory_suffix(&self, key: &str) -> Self {
        let marker = format!("#{key}_");
        let mut components: Vec<&str> = self.0.split('/').collect();
        let last = components.len().saturating_sub(1);
        for component in &mut components[..last] {
            let current = *component;
            if let Some(position) = current.find(&marker) {
                *component = &current[..position];
            }
        }
        Self(components.join("/"))
    }
}

impl fmt::Display for EntryPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntryPath {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

/// SHA-256 digest of an entry's content
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContentDigest([u8; 32]);

impl ContentDigest {
    pub fn of(bytes: &[u8]) -> Self {
        Self(Sha256::digest(bytes).into())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl From<[u8; 32]> for ContentDigest {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // First 8 bytes are enough to tell entries apart in logs
        let hex = self.to_string();
        write!(f, "ContentDigest({})", &hex[..16])
    }
}

enum ContentSource {
    Memory(Arc<[u8]>),
    File { path: PathBuf, size: u64 },
}

struct ContentInner {
    source: ContentSource,
    digest: OnceLock<ContentDigest>,
}

/// Lazily readable, cheaply clonable handle to entry bytes
#[derive(Clone)]
pub struct EntryContent {
    inner: Arc<ContentInner>,
}

impl EntryContent {
    pub fn from_bytes(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self::with_source(ContentSource::Memory(bytes.into()))
    }

    /// Handle to a file on disk; only its size is looked up here
    pub fn from_file(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        let size = std::fs::metadata(&path)?.len();
        Ok(Self::with_source(ContentSource::File { path, size }))
    }

    pub fn empty() -> Self {
        Self::from_bytes(Vec::new())
    }

    fn with_source(source: ContentSource) -> Self {
        Self {
            inner: Arc::new(ContentInner {
                source,
                digest: OnceLock::new(),
            }),
        }
    }

    pub fn size(&self) -> u64 {
        match &self.inner.source {
            ContentSource::Memory(bytes) => bytes.len() as u64,
            ContentSource::File { size, .. } => *size,
        }
    }

    /// Backing file, if this content is not held in memory
    pub fn backing_file(&self) -> Option<&Path> {
        match &self.inner.source {
            ContentSource::Memory(_) => None,
            ContentSource::File { path, .. } => Some(path),
        }
    }

    pub fn read(&self) -> std::io::Result<Arc<[u8]>> {
        match &self.inner.source {
            ContentSource::Memory(bytes) => Ok(Arc::clone(bytes)),
            ContentSource::File { path, .. } => Ok(std::fs::read(path)?.into()),
        }
    }

    /// Digest of the content, computed on first call
    pub fn digest(&self) -> std::io::Result<ContentDigest> {
        if let Some(digest) = self.inner.digest.get() {
            return Ok(*digest);
        }
        let digest = ContentDigest::of(&self.read()?);
        // A concurrent reader may have stored the same value first
        Ok(*self.inner.digest.get_or_init(|| digest))
    }

    /// Whether both handles point at the same underlying content object
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for EntryContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner.source {
            ContentSource::Memory(bytes) => f
                .debug_struct("EntryContent")
                .field("size", &bytes.len())
                .finish(),
            ContentSource::File { path, size } => f
                .debug_struct("EntryContent")
                .field("path", path)
                .field("size", size)
                .finish(),
        }
    }
}

/// Compression preference of an entry in the final package
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Compression {
    #[default]
    Compressed,
    Uncompressed,
}

/// A single logical file of a module
#[derive(Debug, Clone)]
pub struct ModuleEntry {
    path: EntryPath,
    content: EntryContent,
    compression: Compression,
}

impl ModuleEntry {
    pub fn new(path: impl Into<EntryPath>, content: EntryContent) -> Self {
        Self {
            path: path.into(),
            content,
            compression: Compression::default(),
        }
    }

    pub fn from_bytes(path: impl Into<EntryPath>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self::new(path, EntryContent::from_bytes(bytes))
    }

    pub fn path(&self) -> &EntryPath {
        &self.path
    }

    pub fn content(&self) -> &EntryContent {
        &self.content
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }

    pub fn size(&self) -> u64 {
        self.content.size()
    }

    /// Same content under a different path
    #[must_use]
    pub fn with_path(&self, path: EntryPath) -> Self {
        Self {
            path,
            content: self.content.clone(),
            compression: self.compression,
        }
    }

    #[must_use]
    pub fn with_compression(&self, compression: Compression) -> Self {
        Self {
            path: self.path.clone(),
            content: self.content.clone(),
            compression,
        }
    }

    pub fn read_content(&self) -> Result<Arc<[u8]>> {
        self.content.read().map_err(|source| self.read_error(source))
    }

    pub fn digest(&self) -> Result<ContentDigest> {
        self.content
            .digest()
            .map_err(|source| self.read_error(source))
    }

    fn read_error(&self, source: std::io::Error) -> GenerationError {
        GenerationError::ContentRead {
            path: self.path.clone(),
            source_path: self
                .content
                .backing_file()
                .map_or_else(PathBuf::new, Path::to_path_buf),
            source,
        }
    }
}
