//! Error types for standalone generation
//!
//! Every fault raised by the split/shard/merge pipeline is fatal to the run.
//! Malformed bundles are rejected before the pipeline starts, so the variants
//! below describe either broken invariants or unreadable content.

use std::path::PathBuf;

use thiserror::Error;

use crate::model::{entry::EntryPath, targeting::OptimizationDimension};

/// Result type for generation operations
pub type Result<T> = std::result::Result<T, GenerationError>;

/// Errors that can occur while generating standalone packages
#[derive(Error, Debug)]
pub enum GenerationError {
    /// Two modules contribute different content at the same path
    #[error(
        "Conflicting entry '{path}' in shard {shard}: modules '{first_module}' and \
         '{second_module}' provide different content"
    )]
    ConflictingEntry {
        path: EntryPath,
        shard: usize,
        first_module: String,
        second_module: String,
    },

    /// Two fragments of one shard disagree on a dimension value
    #[error(
        "Conflicting {dimension} targeting in shard {shard}: '{first}' vs '{second}' (module \
         '{module}')"
    )]
    ConflictingTargeting {
        dimension: OptimizationDimension,
        shard: usize,
        module: String,
        first: String,
        second: String,
    },

    /// A shard group without any fragments
    #[error("Shard {shard} contains no fragments")]
    EmptyShard { shard: usize },

    /// A module contributes two fragments for the same axis of a shard
    #[error("Module '{module}' contributes more than one {axis} fragment to shard {shard}")]
    DuplicateModuleFragment {
        module: String,
        axis: String,
        shard: usize,
    },

    /// A fragment targets a dimension the sharder does not shard on
    #[error("Fragment of module '{module}' targets {dimension}, which is not a sharded dimension")]
    UnshardedDimension {
        module: String,
        dimension: OptimizationDimension,
    },

    /// A fragment belongs to a module outside the declared module order
    #[error("Module '{module}' is not part of the declared module order")]
    UnknownModule { module: String },

    /// Entry content could not be read
    #[error("Failed to read content of '{path}' from {}", .source_path.display())]
    ContentRead {
        path: EntryPath,
        source_path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The dedicated worker pool could not be started
    #[error("Failed to start worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}
