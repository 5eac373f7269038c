//! Fixed-interval progress sampling.
//!
//! Both stages measure progress the same way: a side task stats the file that
//! is being written on every tick and turns its size into a `ProgressUpdate`.
//! The stage stops the sampler before it pushes its own final update, so the
//! final update is always the last one a stage emits.

use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::trace;

use super::types::ProgressUpdate;

/// Sender half of a stage's progress channel.
pub type ProgressSender = mpsc::UnboundedSender<ProgressUpdate>;

/// Receiver half of a stage's progress channel.
pub type ProgressReceiver = mpsc::UnboundedReceiver<ProgressUpdate>;

/// Creates a progress channel for one stage.
pub fn progress_channel() -> (ProgressSender, ProgressReceiver) {
    mpsc::unbounded_channel()
}

/// Current on-disk size of `path`, if it can be read.
pub(crate) async fn file_size(path: &std::path::Path) -> Option<u64> {
    tokio::fs::metadata(path).await.ok().map(|m| m.len())
}

/// A running sampler task.
pub(crate) struct Sampler {
    stop_tx: oneshot::Sender<()>,
    handle: JoinHandle<u64>,
}

impl Sampler {
    /// Spawns a task that samples `path` right away and then every `every`.
    ///
    /// `to_update` maps the observed file size to the update to push. Sizes
    /// never go backwards in the pushed updates.
    pub(crate) fn spawn<F>(
        path: PathBuf,
        every: Duration,
        progress: ProgressSender,
        to_update: F,
    ) -> Self
    where
        F: Fn(u64) -> ProgressUpdate + Send + 'static,
    {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + every, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut highest = 0u64;

            loop {
                if let Some(size) = file_size(&path).await {
                    highest = highest.max(size);
                    trace!(path = %path.display(), size = highest, "Progress tick");
                    if progress.send(to_update(highest)).is_err() {
                        // Nobody is listening anymore; keep the stage running.
                        trace!("Progress receiver dropped");
                    }
                }

                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {}
                }
            }

            highest
        });

        Self { stop_tx, handle }
    }

    /// Stops the sampler and waits for it to exit.
    ///
    /// Returns the largest size the sampler observed.
    pub(crate) async fn stop(self) -> u64 {
        let _ = self.stop_tx.send(());
        self.handle.await.unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquire::types::ProgressSample;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_sampler_reports_and_stops() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("growing.bin");
        tokio::fs::write(&path, vec![0u8; 128]).await.unwrap();

        let (tx, mut rx) = progress_channel();
        let sampler = Sampler::spawn(path.clone(), Duration::from_millis(5), tx, |size| {
            ProgressUpdate::downloading(ProgressSample::new(size, 1024))
        });

        tokio::time::sleep(Duration::from_millis(30)).await;
        tokio::fs::write(&path, vec![0u8; 512]).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        let highest = sampler.stop().await;
        assert_eq!(highest, 512);

        let mut samples = Vec::new();
        while let Ok(update) = rx.try_recv() {
            samples.push(update.sample);
        }

        assert!(!samples.is_empty());
        assert_eq!(samples[0], ProgressSample::new(128, 1024));
        assert!(samples
            .windows(2)
            .all(|w| w[0].bytes_done <= w[1].bytes_done));
    }

    #[tokio::test]
    async fn test_sampler_never_goes_backwards() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("shrinking.bin");
        tokio::fs::write(&path, vec![0u8; 256]).await.unwrap();

        let (tx, mut rx) = progress_channel();
        let sampler = Sampler::spawn(path.clone(), Duration::from_millis(5), tx, |size| {
            ProgressUpdate::downloading(ProgressSample::new(size, 256))
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        tokio::fs::write(&path, vec![0u8; 16]).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        sampler.stop().await;

        while let Ok(update) = rx.try_recv() {
            assert_eq!(update.sample.bytes_done, 256);
        }
    }
}
