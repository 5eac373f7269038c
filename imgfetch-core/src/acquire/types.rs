//! Core types for the acquisition pipeline.
//!
//! These are the values that flow between the stages, the orchestrator and
//! whoever renders progress: transfer targets, progress samples, archive
//! entries and the terminal outcome of a run.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Full scale of the progress indicator (0 to 10000).
pub const PROGRESS_SCALE: u32 = 10_000;

// ============================================================================
// Transfer Target
// ============================================================================

/// What to fetch and where to unpack it.
///
/// Immutable for the lifetime of one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferTarget {
    /// Remote archive URL.
    pub url: String,
    /// Directory the archive is downloaded into and extracted under.
    pub destination: PathBuf,
}

impl TransferTarget {
    pub fn new(url: impl Into<String>, destination: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            destination: destination.into(),
        }
    }

    /// Path of the intermediate archive file inside the destination directory.
    pub fn archive_path(&self, archive_file_name: &str) -> PathBuf {
        self.destination.join(archive_file_name)
    }
}

// ============================================================================
// Progress
// ============================================================================

/// A point-in-time measurement of bytes transferred versus bytes expected.
///
/// `bytes_done` may exceed `bytes_total` when a server reports a wrong size;
/// consumers must tolerate that.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressSample {
    pub bytes_done: u64,
    pub bytes_total: u64,
}

impl ProgressSample {
    pub fn new(bytes_done: u64, bytes_total: u64) -> Self {
        Self {
            bytes_done,
            bytes_total,
        }
    }

    /// Progress on a 0..=10000 scale, or `None` when the total is zero.
    ///
    /// Overshooting samples clamp to the full scale.
    pub fn per_myriad(&self) -> Option<u32> {
        if self.bytes_total == 0 {
            return None;
        }
        let scaled =
            self.bytes_done as u128 * PROGRESS_SCALE as u128 / self.bytes_total as u128;
        Some(scaled.min(PROGRESS_SCALE as u128) as u32)
    }
}

/// The pipeline stage a progress update belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stage {
    /// Fetching the archive.
    Downloading,
    /// Unpacking the archive; carries the entry currently being written.
    Extracting { entry: String },
}

impl Stage {
    pub fn is_download(&self) -> bool {
        matches!(self, Self::Downloading)
    }
}

/// A progress sample tagged with the stage that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub stage: Stage,
    pub sample: ProgressSample,
}

impl ProgressUpdate {
    pub fn downloading(sample: ProgressSample) -> Self {
        Self {
            stage: Stage::Downloading,
            sample,
        }
    }

    pub fn extracting(entry: impl Into<String>, sample: ProgressSample) -> Self {
        Self {
            stage: Stage::Extracting {
                entry: entry.into(),
            },
            sample,
        }
    }
}

// ============================================================================
// Archive Entries
// ============================================================================

/// One record from the archive's central directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Index of the entry inside the archive.
    pub index: usize,
    /// Relative path, already checked to stay inside the destination.
    pub name: PathBuf,
    pub uncompressed_size: u64,
    pub is_directory: bool,
    /// Stored permission bits (`0o644` when the archive carries none).
    pub file_mode: u32,
}

// ============================================================================
// Pipeline State and Outcome
// ============================================================================

/// Broad classification of a failed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    /// Connect, timeout, or non-success HTTP status.
    Network,
    /// Create, open, permission, or disk-full problems.
    Filesystem,
    /// Corrupt, truncated, or unsafe archive.
    ArchiveFormat,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network => write!(f, "Network error"),
            Self::Filesystem => write!(f, "Filesystem error"),
            Self::ArchiveFormat => write!(f, "Archive error"),
        }
    }
}

/// Terminal result of one pipeline run. Exactly one is produced per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    Success,
    Cancelled,
    Failed { kind: FailureKind, message: String },
}

impl PipelineOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// What the orchestrator is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PipelineState {
    #[default]
    Idle,
    Downloading,
    Extracting,
}

impl PipelineState {
    pub fn is_running(&self) -> bool {
        !matches!(self, Self::Idle)
    }
}
