//! Configuration module for imgfetch.
//!
//! `PipelineConfig` holds the runtime knobs a run is started with; `Settings`
//! is the user-facing state persisted as JSON between sessions.

mod settings;

pub use settings::{
    default_settings_path, PipelineConfig, Settings, DEFAULT_ARCHIVE_FILE_NAME,
    DEFAULT_DESTINATION_DIR, DEFAULT_URL, MAX_REMEMBERED_URLS,
};
