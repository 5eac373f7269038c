//! Turns pipeline events into indicator values and status text.

use super::display::format_size;
use super::orchestrator::PipelineEvent;
use super::types::{PipelineOutcome, ProgressUpdate, Stage, PROGRESS_SCALE};

/// A passive progress indicator plus status line.
pub trait ProgressDisplay {
    /// Sets the indicator, on a `0..=PROGRESS_SCALE` scale.
    fn set_value(&mut self, value: u32);

    fn set_status(&mut self, status: &str);
}

/// Formats updates for a `ProgressDisplay`. Holds only the last update.
#[derive(Debug, Default)]
pub struct ProgressReporter {
    last: Option<ProgressUpdate>,
}

impl ProgressReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self) -> Option<&ProgressUpdate> {
        self.last.as_ref()
    }

    /// Applies one pipeline event to `display`.
    pub fn apply(&mut self, event: &PipelineEvent, display: &mut impl ProgressDisplay) {
        match event {
            PipelineEvent::Started { .. } => {
                self.last = None;
                display.set_value(0);
                display.set_status("Starting download");
            }
            PipelineEvent::StageChanged(_) => {}
            PipelineEvent::Progress(update) => self.report(update, display),
            PipelineEvent::Finished { outcome, .. } => {
                if outcome.is_success() {
                    display.set_value(PROGRESS_SCALE);
                }
                display.set_status(&outcome_text(outcome));
            }
        }
    }

    /// Forwards one update. A sample with an unknown total leaves the
    /// indicator where it is.
    pub fn report(&mut self, update: &ProgressUpdate, display: &mut impl ProgressDisplay) {
        render(update, display);
        self.last = Some(update.clone());
    }

    /// Renders the last update again, if there is one.
    pub fn rerender(&self, display: &mut impl ProgressDisplay) {
        if let Some(update) = &self.last {
            render(update, display);
        }
    }
}

fn render(update: &ProgressUpdate, display: &mut impl ProgressDisplay) {
    if let Some(value) = update.sample.per_myriad() {
        display.set_value(value);
    }
    display.set_status(&status_text(update));
}

/// Status line for a progress update.
pub fn status_text(update: &ProgressUpdate) -> String {
    match &update.stage {
        Stage::Downloading => format!(
            "Received {} out of {}",
            format_size(update.sample.bytes_done),
            format_size(update.sample.bytes_total)
        ),
        Stage::Extracting { entry } if entry.is_empty() => "Extracting".to_string(),
        Stage::Extracting { entry } => format!("Extracting {}", entry),
    }
}

/// Status line for a terminal outcome.
pub fn outcome_text(outcome: &PipelineOutcome) -> String {
    match outcome {
        PipelineOutcome::Success => "Done".to_string(),
        PipelineOutcome::Cancelled => "Cancelled".to_string(),
        PipelineOutcome::Failed { message, .. } => format!("Failed: {}", message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquire::types::{FailureKind, ProgressSample};
    use uuid::Uuid;

    #[derive(Default)]
    struct Recorder {
        values: Vec<u32>,
        statuses: Vec<String>,
    }

    impl ProgressDisplay for Recorder {
        fn set_value(&mut self, value: u32) {
            self.values.push(value);
        }

        fn set_status(&mut self, status: &str) {
            self.statuses.push(status.to_string());
        }
    }

    #[test]
    fn test_download_status() {
        let mut reporter = ProgressReporter::new();
        let mut display = Recorder::default();

        let update = ProgressUpdate::downloading(ProgressSample::new(1536, 10 * 1024 * 1024));
        reporter.report(&update, &mut display);

        assert_eq!(display.values, vec![1]);
        assert_eq!(display.statuses, vec!["Received 1.50 KB out of 10.00 MB"]);
        assert_eq!(reporter.last(), Some(&update));
    }

    #[test]
    fn test_extract_status_names_entry() {
        let mut reporter = ProgressReporter::new();
        let mut display = Recorder::default();

        reporter.report(
            &ProgressUpdate::extracting("images/boot.img", ProgressSample::new(500, 1000)),
            &mut display,
        );

        assert_eq!(display.values, vec![5_000]);
        assert_eq!(display.statuses, vec!["Extracting images/boot.img"]);
    }

    #[test]
    fn test_unknown_total_leaves_indicator() {
        let mut reporter = ProgressReporter::new();
        let mut display = Recorder::default();

        reporter.report(
            &ProgressUpdate::downloading(ProgressSample::new(4096, 0)),
            &mut display,
        );

        assert!(display.values.is_empty());
        assert_eq!(display.statuses.len(), 1);
    }

    #[test]
    fn test_rerender_repeats_last() {
        let mut reporter = ProgressReporter::new();
        let mut display = Recorder::default();

        reporter.rerender(&mut display);
        assert!(display.statuses.is_empty());

        reporter.report(
            &ProgressUpdate::downloading(ProgressSample::new(250, 1000)),
            &mut display,
        );
        reporter.rerender(&mut display);

        assert_eq!(display.values, vec![2_500, 2_500]);
        assert_eq!(display.statuses[0], display.statuses[1]);
    }

    #[test]
    fn test_apply_run_events() {
        let mut reporter = ProgressReporter::new();
        let mut display = Recorder::default();
        let run_id = Uuid::new_v4();

        reporter.apply(
            &PipelineEvent::Started {
                run_id,
                target: crate::acquire::TransferTarget::new("https://a/x.zip", "images"),
            },
            &mut display,
        );
        reporter.apply(
            &PipelineEvent::Progress(ProgressUpdate::downloading(ProgressSample::new(10, 10))),
            &mut display,
        );
        reporter.apply(
            &PipelineEvent::Finished {
                run_id,
                outcome: PipelineOutcome::Success,
            },
            &mut display,
        );

        assert_eq!(display.values, vec![0, PROGRESS_SCALE, PROGRESS_SCALE]);
        assert_eq!(display.statuses.first().unwrap(), "Starting download");
        assert_eq!(display.statuses.last().unwrap(), "Done");
    }

    #[test]
    fn test_outcome_text() {
        assert_eq!(outcome_text(&PipelineOutcome::Cancelled), "Cancelled");
        assert_eq!(
            outcome_text(&PipelineOutcome::Failed {
                kind: FailureKind::Network,
                message: "Server returned 404".to_string(),
            }),
            "Failed: Server returned 404"
        );
    }
}
