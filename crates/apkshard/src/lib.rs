//! Standalone package generation for multi-module application bundles
//!
//! Devices that cannot install split packages receive one self-contained
//! package per device configuration. This crate turns the modules of a bundle
//! into those packages:
//!
//! - [`splitter`] partitions each module along the optimization dimensions
//! - [`sharder`] groups the splits of all modules per point of the dimension
//!   space
//! - [`merger`] fuses each group into one split, renumbering code segments
//! - [`injectors`] finalize each merged shard
//! - [`generator`] runs the whole pipeline
//!
//! Archive I/O, signing and bundle validation are left to the caller.

pub mod config;
pub mod error;
pub mod generator;
pub mod injectors;
pub mod merger;
pub mod model;
pub mod sharder;
pub mod splitter;
pub mod types;

pub use config::{GenerationConfig, GenerationConfigBuilder, SuffixStripping};
pub use error::{GenerationError, Result};
pub use generator::StandaloneApksGenerator;
pub use merger::{CacheStats, DexMergeCache, ShardMerger};
pub use sharder::{ShardGroup, Sharder};
pub use splitter::ModuleSplitter;
