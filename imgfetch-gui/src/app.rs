//! Main application state and update loop.

use std::path::PathBuf;
use std::time::Duration;

use eframe::egui;
use tokio::runtime::Runtime;
use tracing::{debug, error, info, warn};

use imgfetch_core::acquire::{outcome_text, PipelineOutcome, ProgressReporter};
use imgfetch_core::config::default_settings_path;
use imgfetch_core::{
    event_channel, EventReceiver, PipelineEvent, PipelineOrchestrator, PipelineState, Settings,
    StartDisposition, TransferTarget,
};

use crate::ui;
use crate::ui::downloader::ProgressView;

/// Repaint cadence while a run is active.
const REPAINT_INTERVAL: Duration = Duration::from_millis(100);

// =============================================================================
// Application State
// =============================================================================

/// Main application state.
pub struct ImgfetchApp {
    /// Tokio runtime for the pipeline and dialogs.
    pub runtime: Runtime,

    /// User settings.
    pub settings: Settings,

    /// Where settings are persisted, if the platform has a config dir.
    settings_path: Option<PathBuf>,

    // -------------------------------------------------------------------------
    // Pipeline
    // -------------------------------------------------------------------------
    pub orchestrator: PipelineOrchestrator,

    /// Events from the orchestrator.
    event_rx: EventReceiver,

    /// Formats progress events for the indicator.
    reporter: ProgressReporter,

    /// What the pipeline is doing, as of the last processed event.
    pub pipeline_state: PipelineState,

    // -------------------------------------------------------------------------
    // UI State
    // -------------------------------------------------------------------------
    /// Indicator value and status line.
    pub progress: ProgressView,

    /// URL field contents.
    pub url_input: String,

    /// Failure shown in the error dialog.
    pub error_message: Option<String>,

    /// Transient status bar message.
    pub status_message: Option<(String, chrono::DateTime<chrono::Utc>)>,

    /// Pending folder selection result receiver.
    folder_result_rx: Option<tokio::sync::oneshot::Receiver<Option<PathBuf>>>,
}

impl ImgfetchApp {
    /// Create a new application instance.
    pub fn new(cc: &eframe::CreationContext<'_>, runtime: Runtime) -> anyhow::Result<Self> {
        info!("Initializing ImgfetchApp");

        let settings_path = default_settings_path();
        let settings = match &settings_path {
            Some(path) => Settings::load_from(path),
            None => {
                warn!("No config directory, settings will not be saved");
                Settings::default()
            }
        };
        debug!(?settings, "Loaded settings");

        let (tx, event_rx) = event_channel();
        let orchestrator =
            PipelineOrchestrator::new(settings.pipeline_config(), runtime.handle().clone(), tx)?;

        let mut style = (*cc.egui_ctx.style()).clone();
        style.spacing.item_spacing = egui::vec2(8.0, 6.0);
        cc.egui_ctx.set_style(style);

        let url_input = settings.last_url().to_string();

        let app = Self {
            runtime,
            settings,
            settings_path,
            orchestrator,
            event_rx,
            reporter: ProgressReporter::new(),
            pipeline_state: PipelineState::Idle,
            progress: ProgressView::default(),
            url_input,
            error_message: None,
            status_message: None,
            folder_result_rx: None,
        };

        if let Err(e) = std::fs::create_dir_all(app.destination()) {
            warn!(error = %e, "Failed to create destination directory");
        }

        Ok(app)
    }

    /// Absolute destination directory.
    pub fn destination(&self) -> PathBuf {
        let dir = &self.settings.destination_dir;
        if dir.is_absolute() {
            return dir.clone();
        }

        match std::env::current_dir() {
            Ok(cwd) => cwd.join(dir),
            Err(_) => dir.clone(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.orchestrator.is_running()
    }

    /// DOWNLOAD/STOP button handler.
    pub fn toggle_download(&mut self) {
        if self.is_running() {
            info!("Stop requested");
            self.orchestrator.cancel();
            return;
        }

        let url = self.url_input.trim().to_string();
        if url.is_empty() {
            self.error_message = Some("Enter a URL to download.".to_string());
            return;
        }

        let target = TransferTarget::new(url.clone(), self.destination());
        match self.orchestrator.start(target) {
            StartDisposition::Started(run_id) => {
                debug!(%run_id, "Run started");
                self.settings.remember_url(&url);
                self.save_settings();
            }
            StartDisposition::CancelledActive => {
                debug!("Start turned into cancel");
            }
        }
    }

    /// Process events from the orchestrator.
    pub fn process_events(&mut self, ctx: &egui::Context) {
        while let Ok(event) = self.event_rx.try_recv() {
            self.reporter.apply(&event, &mut self.progress);

            match event {
                PipelineEvent::Started { run_id, target } => {
                    debug!(%run_id, url = %target.url, "Run accepted");
                }
                PipelineEvent::StageChanged(state) => {
                    self.pipeline_state = state;
                }
                PipelineEvent::Progress(_) => {}
                PipelineEvent::Finished { run_id, outcome } => {
                    debug!(%run_id, ?outcome, "Run finished");
                    self.pipeline_state = PipelineState::Idle;
                    if let PipelineOutcome::Failed { message, .. } = &outcome {
                        error!(error = %message, "Download failed");
                        self.error_message = Some(message.clone());
                    }
                    self.set_status(&outcome_text(&outcome));
                }
            }

            ctx.request_repaint();
        }
    }

    /// Set a status message.
    pub fn set_status(&mut self, msg: &str) {
        self.status_message = Some((msg.to_string(), chrono::Utc::now()));
    }

    /// Clear old status messages.
    pub fn clear_old_status(&mut self) {
        if let Some((_, time)) = &self.status_message {
            if chrono::Utc::now() - *time > chrono::Duration::seconds(5) {
                self.status_message = None;
            }
        }
    }

    /// Save settings to the config directory.
    pub fn save_settings(&mut self) {
        let Some(path) = &self.settings_path else {
            return;
        };

        if let Err(e) = self.settings.save_to(path) {
            error!("Failed to save settings: {:#}", e);
            self.set_status("Failed to save settings");
        }
    }

    /// Open a folder selection dialog asynchronously.
    pub fn open_folder_dialog(&mut self) {
        // Don't open another dialog if one is pending
        if self.folder_result_rx.is_some() || self.is_running() {
            return;
        }

        let (tx, rx) = tokio::sync::oneshot::channel();
        self.folder_result_rx = Some(rx);

        let start_dir = self.destination();
        self.runtime.spawn(async move {
            let folder = rfd::AsyncFileDialog::new()
                .set_directory(start_dir)
                .pick_folder()
                .await
                .map(|f| f.path().to_path_buf());
            let _ = tx.send(folder);
        });
    }

    /// Check for folder selection completion.
    fn check_folder_selection(&mut self) {
        if let Some(mut rx) = self.folder_result_rx.take() {
            match rx.try_recv() {
                Ok(Some(folder)) => {
                    info!("Destination set to {}", folder.display());
                    self.settings.destination_dir = folder.clone();
                    self.save_settings();
                    self.set_status(&format!("Saving to {}", folder.display()));
                }
                Ok(None) => {
                    // User cancelled the dialog
                    debug!("Folder selection cancelled");
                }
                Err(tokio::sync::oneshot::error::TryRecvError::Empty) => {
                    // Still waiting
                    self.folder_result_rx = Some(rx);
                }
                Err(tokio::sync::oneshot::error::TryRecvError::Closed) => {
                    warn!("Folder selection channel closed unexpectedly");
                }
            }
        }
    }
}

impl eframe::App for ImgfetchApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.check_folder_selection();
        self.process_events(ctx);
        self.clear_old_status();

        egui::TopBottomPanel::bottom("status_panel")
            .max_height(24.0)
            .show(ctx, |ui| {
                ui::status::render(self, ui);
            });

        egui::CentralPanel::default().show(ctx, |ui| {
            ui::downloader::render(self, ui);
        });

        if self.error_message.is_some() {
            ui::error_dialog::render(self, ctx);
        }

        if self.is_running() || self.folder_result_rx.is_some() {
            ctx.request_repaint_after(REPAINT_INTERVAL);
        }
    }
}

impl Drop for ImgfetchApp {
    fn drop(&mut self) {
        // Closing the window stops any run in flight
        self.orchestrator.cancel();
    }
}
