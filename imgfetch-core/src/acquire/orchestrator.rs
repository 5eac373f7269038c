//! Pipeline orchestrator: download, then extract, one run at a time.
//!
//! The orchestrator owns the only cancellation token. Collaborators talk to it
//! through `start`/`cancel` and observe runs through a `PipelineEvent` channel.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::Context;
use reqwest::Client;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::downloader;
use super::extractor;
use super::sampler::{progress_channel, ProgressSender};
use super::types::{PipelineOutcome, PipelineState, ProgressUpdate, TransferTarget};
use crate::config::PipelineConfig;

// =============================================================================
// Events
// =============================================================================

/// Events sent from the orchestrator to its collaborator.
///
/// Every run produces `Started`, then progress and stage changes, then
/// exactly one `Finished`.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// A run was accepted.
    Started { run_id: Uuid, target: TransferTarget },

    /// The orchestrator moved to another state.
    StageChanged(PipelineState),

    /// Sample from the active stage.
    Progress(ProgressUpdate),

    /// Terminal outcome. Nothing else is sent for this run afterwards.
    Finished {
        run_id: Uuid,
        outcome: PipelineOutcome,
    },
}

// =============================================================================
// Channel Types
// =============================================================================

/// Sender for pipeline events.
pub type EventSender = mpsc::UnboundedSender<PipelineEvent>;

/// Receiver for pipeline events.
pub type EventReceiver = mpsc::UnboundedReceiver<PipelineEvent>;

/// Create an event channel for pipeline events.
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

// =============================================================================
// Orchestrator
// =============================================================================

/// What `start` did with the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartDisposition {
    /// A new run was spawned.
    Started(Uuid),
    /// A run was already active; it has been asked to cancel instead.
    CancelledActive,
}

struct ActiveRun {
    run_id: Uuid,
    cancel: CancellationToken,
}

struct Inner {
    config: PipelineConfig,
    client: Client,
    runtime: Handle,
    events: EventSender,
    active: Mutex<Option<ActiveRun>>,
    state: Mutex<PipelineState>,
}

/// Sequences downloader and extractor and owns the cancellation handle.
///
/// Cheap to clone; clones share the same run slot.
#[derive(Clone)]
pub struct PipelineOrchestrator {
    inner: Arc<Inner>,
}

impl PipelineOrchestrator {
    /// Creates an orchestrator that spawns its runs on `runtime`.
    pub fn new(
        config: PipelineConfig,
        runtime: Handle,
        events: EventSender,
    ) -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                client,
                runtime,
                events,
                active: Mutex::new(None),
                state: Mutex::new(PipelineState::Idle),
            }),
        })
    }

    /// Starts a run for `target`, or cancels the active run if there is one.
    pub fn start(&self, target: TransferTarget) -> StartDisposition {
        let mut active = lock(&self.inner.active);

        if let Some(run) = active.as_ref() {
            info!(run_id = %run.run_id, "Run already active, cancelling it");
            run.cancel.cancel();
            return StartDisposition::CancelledActive;
        }

        let run_id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        *active = Some(ActiveRun {
            run_id,
            cancel: cancel.clone(),
        });
        *lock(&self.inner.state) = PipelineState::Downloading;
        drop(active);

        let span = info_span!("pipeline", run_id = %run_id);
        let inner = Arc::clone(&self.inner);
        self.inner
            .runtime
            .spawn(async move { inner.run(run_id, target, cancel).await }.instrument(span));

        StartDisposition::Started(run_id)
    }

    /// Asks the active run, if any, to stop. Idempotent.
    pub fn cancel(&self) {
        if let Some(run) = lock(&self.inner.active).as_ref() {
            debug!(run_id = %run.run_id, "Cancel requested");
            run.cancel.cancel();
        }
    }

    pub fn state(&self) -> PipelineState {
        *lock(&self.inner.state)
    }

    pub fn is_running(&self) -> bool {
        lock(&self.inner.active).is_some()
    }
}

impl Inner {
    async fn run(&self, run_id: Uuid, target: TransferTarget, cancel: CancellationToken) {
        info!(url = %target.url, dest = %target.destination.display(), "Pipeline started");
        self.emit(PipelineEvent::Started {
            run_id,
            target: target.clone(),
        });
        self.emit(PipelineEvent::StageChanged(PipelineState::Downloading));

        let archive = target.archive_path(&self.config.archive_file_name);
        let outcome = self.execute(&target, &archive, &cancel).await;

        match &outcome {
            PipelineOutcome::Success => info!("Pipeline finished"),
            PipelineOutcome::Cancelled => info!("Pipeline cancelled"),
            PipelineOutcome::Failed { kind, message } => {
                error!(kind = %kind, error = %message, "Pipeline failed")
            }
        }

        // The slot is free before `Finished` goes out. State is reset under
        // the slot lock; a run started after this point owns the state.
        {
            let mut active = lock(&self.active);
            *active = None;
            *lock(&self.state) = PipelineState::Idle;
        }
        self.emit(PipelineEvent::StageChanged(PipelineState::Idle));
        self.emit(PipelineEvent::Finished { run_id, outcome });
    }

    async fn execute(
        &self,
        target: &TransferTarget,
        archive: &Path,
        cancel: &CancellationToken,
    ) -> PipelineOutcome {
        let (progress, relay) = self.relay_progress();
        let downloaded = downloader::download(
            &self.client,
            cancel,
            &target.url,
            archive,
            &self.config,
            progress,
        )
        .await;
        finish_relay(relay).await;

        match downloaded {
            Ok(summary) => debug!(bytes = summary.bytes_total, "Download stage done"),
            Err(e) if e.is_cancelled() => {
                // The partial archive is the resume point for the next run.
                return PipelineOutcome::Cancelled;
            }
            Err(e) => {
                remove_archive(archive).await;
                return PipelineOutcome::Failed {
                    kind: e.kind(),
                    message: e.to_string(),
                };
            }
        }

        self.set_state(PipelineState::Extracting);

        let (progress, relay) = self.relay_progress();
        let extracted = extractor::extract(
            cancel,
            archive,
            &target.destination,
            &self.config,
            progress,
        )
        .await;
        finish_relay(relay).await;

        remove_archive(archive).await;

        match extracted {
            Ok(summary) => {
                debug!(files = summary.files, bytes = summary.bytes_total, "Extract stage done");
                PipelineOutcome::Success
            }
            Err(e) if e.is_cancelled() => PipelineOutcome::Cancelled,
            Err(e) => PipelineOutcome::Failed {
                kind: e.kind(),
                message: e.to_string(),
            },
        }
    }

    /// Forwards one stage's samples as events until the stage drops its sender.
    fn relay_progress(&self) -> (ProgressSender, JoinHandle<()>) {
        let (tx, mut rx) = progress_channel();
        let events = self.events.clone();

        let relay = tokio::spawn(async move {
            while let Some(update) = rx.recv().await {
                if events.send(PipelineEvent::Progress(update)).is_err() {
                    break;
                }
            }
        });

        (tx, relay)
    }

    fn set_state(&self, state: PipelineState) {
        *lock(&self.state) = state;
        self.emit(PipelineEvent::StageChanged(state));
    }

    fn emit(&self, event: PipelineEvent) {
        if self.events.send(event).is_err() {
            debug!("Event receiver dropped");
        }
    }
}

async fn finish_relay(relay: JoinHandle<()>) {
    if let Err(e) = relay.await {
        warn!(error = %e, "Progress relay failed");
    }
}

/// Best-effort removal of the intermediate archive.
async fn remove_archive(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "Removed archive"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove archive"),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
