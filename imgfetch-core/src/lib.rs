//! imgfetch Core Library
//!
//! This crate provides the core functionality for imgfetch, a firmware image
//! downloader. It includes:
//!
//! - Resumable HTTP download with range requests
//! - Streaming ZIP extraction that keeps stored permissions
//! - Sampled progress reporting for both stages
//! - A single-run orchestrator with cooperative cancellation
//! - Configuration management (settings, pipeline knobs)

pub mod acquire;
pub mod config;

// Re-exports for convenience
pub use config::{PipelineConfig, Settings};

// Re-export the pipeline surface
pub use acquire::{
    event_channel, format_size, truncate_path, EventReceiver, EventSender, FailureKind,
    PipelineEvent, PipelineOrchestrator, PipelineOutcome, PipelineState, ProgressDisplay,
    ProgressReporter, ProgressSample, ProgressUpdate, StartDisposition, TransferTarget,
    PROGRESS_SCALE,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_set() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn default_user_agent_carries_version() {
        let config = PipelineConfig::default();
        assert!(config.user_agent.ends_with(VERSION));
    }
}
