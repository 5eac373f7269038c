//! Resumable, cancellable download-then-extract pipeline.
//!
//! A run fetches a ZIP archive over HTTP into the destination directory,
//! resuming from whatever a previous run left on disk, then extracts it in
//! place and removes the archive. Both stages report sampled progress and stop
//! promptly when the run is cancelled.
//!
//! # Architecture
//!
//! - `types`: Core types (TransferTarget, ProgressSample, PipelineOutcome, ...)
//! - `error`: Stage error types
//! - `display`: Size and path formatting for status text
//! - `sampler`: Fixed-interval file-size sampling shared by both stages
//! - `downloader`: HEAD probe, range resume, streamed body copy
//! - `extractor`: ZIP listing and streaming extraction
//! - `progress`: Event-to-indicator formatting
//! - `orchestrator`: Run sequencing, cancellation, cleanup
//!
//! # Example
//!
//! ```ignore
//! use imgfetch_core::acquire::{event_channel, PipelineEvent, PipelineOrchestrator, TransferTarget};
//! use imgfetch_core::config::PipelineConfig;
//!
//! let (tx, mut rx) = event_channel();
//! let orchestrator = PipelineOrchestrator::new(PipelineConfig::default(), handle, tx)?;
//! orchestrator.start(TransferTarget::new(url, "images"));
//!
//! while let Some(event) = rx.recv().await {
//!     if let PipelineEvent::Finished { outcome, .. } = event {
//!         println!("{:?}", outcome);
//!         break;
//!     }
//! }
//! ```

pub mod display;
pub mod downloader;
pub mod error;
pub mod extractor;
pub mod orchestrator;
pub mod progress;
pub mod sampler;
pub mod types;

// Re-export commonly used types
pub use display::{format_size, truncate_path};
pub use downloader::{download, DownloadSummary};
pub use error::{DownloadError, ExtractError};
pub use extractor::{extract, list_entries, ExtractSummary};
pub use orchestrator::{
    event_channel, EventReceiver, EventSender, PipelineEvent, PipelineOrchestrator,
    StartDisposition,
};
pub use progress::{outcome_text, status_text, ProgressDisplay, ProgressReporter};
pub use sampler::{progress_channel, ProgressReceiver, ProgressSender};
pub use types::{
    ArchiveEntry, FailureKind, PipelineOutcome, PipelineState, ProgressSample, ProgressUpdate,
    Stage, TransferTarget, PROGRESS_SCALE,
};
