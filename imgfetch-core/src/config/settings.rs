//! Pipeline knobs and persisted application settings.
//!
//! Settings are stored as JSON under the platform config directory.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

// =============================================================================
// Defaults
// =============================================================================

/// Firmware image offered when nothing else has been used yet.
pub const DEFAULT_URL: &str =
    "https://zima.oss-cn-hongkong.aliyuncs.com/images/zima/SW_SD5300_V046_A03_fastboot.zip";

/// Where images are extracted unless the user picks another directory.
pub const DEFAULT_DESTINATION_DIR: &str = "images";

/// Name of the intermediate archive inside the destination directory.
pub const DEFAULT_ARCHIVE_FILE_NAME: &str = "download.tmp";

/// How many URLs the settings file keeps.
pub const MAX_REMEMBERED_URLS: usize = 10;

const DEFAULT_SAMPLE_INTERVAL_MS: u64 = 100;
const DEFAULT_HEAD_TIMEOUT_MS: u64 = 2_000;

// =============================================================================
// Pipeline Config
// =============================================================================

/// Runtime knobs for one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// How often both stages sample the file being written.
    pub sample_interval: Duration,
    /// Upper bound on the HEAD probe, independent of cancellation.
    pub head_timeout: Duration,
    /// File name of the downloaded archive within the destination.
    pub archive_file_name: String,
    /// User-Agent sent with every request.
    pub user_agent: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sample_interval: Duration::from_millis(DEFAULT_SAMPLE_INTERVAL_MS),
            head_timeout: Duration::from_millis(DEFAULT_HEAD_TIMEOUT_MS),
            archive_file_name: DEFAULT_ARCHIVE_FILE_NAME.to_string(),
            user_agent: format!("imgfetch/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

// =============================================================================
// Application Settings
// =============================================================================

/// Application settings - persisted as JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Preset and recently used URLs, most recent first.
    pub urls: Vec<String>,

    /// Directory the archive is downloaded to and extracted into.
    pub destination_dir: PathBuf,

    /// Progress sampling interval in milliseconds.
    pub sample_interval_ms: u64,

    /// HEAD probe timeout in milliseconds.
    pub head_timeout_ms: u64,

    /// Intermediate archive file name.
    pub archive_file_name: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            urls: vec![DEFAULT_URL.to_string()],
            destination_dir: PathBuf::from(DEFAULT_DESTINATION_DIR),
            sample_interval_ms: DEFAULT_SAMPLE_INTERVAL_MS,
            head_timeout_ms: DEFAULT_HEAD_TIMEOUT_MS,
            archive_file_name: DEFAULT_ARCHIVE_FILE_NAME.to_string(),
        }
    }
}

/// `<config_dir>/imgfetch/settings.json`, if the platform has a config dir.
pub fn default_settings_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("imgfetch").join("settings.json"))
}

impl Settings {
    /// Load settings from `path`, using defaults for missing values.
    ///
    /// If the file doesn't exist or can't be parsed, returns defaults.
    pub fn load_from(path: &Path) -> Self {
        let mut settings = match std::fs::read_to_string(path) {
            Ok(json) => match serde_json::from_str::<Settings>(&json) {
                Ok(loaded) => loaded,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to parse settings, using defaults");
                    Self::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to read settings, using defaults");
                Self::default()
            }
        };

        settings.validate();
        settings
    }

    /// Save settings to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write settings to {}", path.display()))?;

        tracing::debug!(path = %path.display(), "Saved settings");
        Ok(())
    }

    /// Validate and clamp settings to valid ranges.
    pub fn validate(&mut self) {
        self.sample_interval_ms = self.sample_interval_ms.clamp(10, 5_000);
        self.head_timeout_ms = self.head_timeout_ms.clamp(250, 60_000);

        // The archive must live directly inside the destination directory
        let name = self.archive_file_name.trim();
        if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
            self.archive_file_name = DEFAULT_ARCHIVE_FILE_NAME.to_string();
        }

        if self.destination_dir.as_os_str().is_empty() {
            self.destination_dir = PathBuf::from(DEFAULT_DESTINATION_DIR);
        }

        let mut seen = Vec::with_capacity(self.urls.len());
        for url in self.urls.drain(..) {
            let url = url.trim().to_string();
            if !url.is_empty() && !seen.contains(&url) {
                seen.push(url);
            }
        }
        seen.truncate(MAX_REMEMBERED_URLS);
        self.urls = seen;

        if self.urls.is_empty() {
            self.urls.push(DEFAULT_URL.to_string());
        }
    }

    /// Moves `url` to the front of the remembered list.
    pub fn remember_url(&mut self, url: &str) {
        let url = url.trim();
        if url.is_empty() {
            return;
        }

        self.urls.retain(|u| u != url);
        self.urls.insert(0, url.to_string());
        self.urls.truncate(MAX_REMEMBERED_URLS);
    }

    /// URL shown when the window opens.
    pub fn last_url(&self) -> &str {
        self.urls.first().map(String::as_str).unwrap_or(DEFAULT_URL)
    }

    /// Knobs for a pipeline run started with these settings.
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            sample_interval: Duration::from_millis(self.sample_interval_ms),
            head_timeout: Duration::from_millis(self.head_timeout_ms),
            archive_file_name: self.archive_file_name.clone(),
            ..PipelineConfig::default()
        }
    }
}
