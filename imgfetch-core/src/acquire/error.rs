//! Stage error types.
//!
//! Cancellation is modelled as a variant so it travels through `?` like any
//! other early exit, but it is not a failure: callers check `is_cancelled()`
//! before treating an error as one.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use super::types::FailureKind;

/// Errors from the resumable downloader.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("Failed to create directory {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to open {}: {source}", path.display())]
    OpenFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Server returned {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("Failed to read response body: {0}")]
    Body(#[source] reqwest::Error),

    #[error("Failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Download cancelled")]
    Cancelled,
}

impl DownloadError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Request { .. } | Self::Status { .. } | Self::Body(_) => FailureKind::Network,
            Self::CreateDir { .. } | Self::OpenFile { .. } | Self::Write { .. } => {
                FailureKind::Filesystem
            }
            // Never reported as a failure; classified for completeness.
            Self::Cancelled => FailureKind::Network,
        }
    }
}

/// Errors from the archive extractor.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Failed to read archive {}: {source}", path.display())]
    OpenArchive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("Failed to read archive entry {name}: {source}")]
    ReadEntry {
        name: String,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("Archive entry has an unsafe path: {name}")]
    UnsafePath { name: String },

    #[error("Failed to create directory {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to create {}: {source}", path.display())]
    CreateFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Extraction task failed: {0}")]
    Task(String),

    #[error("Extraction cancelled")]
    Cancelled,
}

impl ExtractError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            Self::OpenArchive { .. } | Self::ReadEntry { .. } | Self::UnsafePath { .. } => {
                FailureKind::ArchiveFormat
            }
            Self::CreateDir { .. } | Self::CreateFile { .. } | Self::Write { .. } => {
                FailureKind::Filesystem
            }
            Self::Task(_) | Self::Cancelled => FailureKind::Filesystem,
        }
    }
}
