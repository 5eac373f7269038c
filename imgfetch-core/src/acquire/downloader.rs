//! Resumable HTTP downloader with sampled progress and cancellation.
//!
//! The destination file doubles as the resume state: whatever is already on
//! disk is kept when the server advertises byte ranges and the size is
//! consistent with the remote length, and discarded otherwise.

use futures::StreamExt;
use reqwest::header::{HeaderMap, ACCEPT_RANGES, CONTENT_LENGTH, RANGE};
use reqwest::{Client, StatusCode};
use std::path::Path;
use std::time::Duration;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::error::DownloadError;
use super::sampler::{file_size, ProgressSender, Sampler};
use super::types::{ProgressSample, ProgressUpdate};
use crate::config::PipelineConfig;

/// Write buffer size for the body copy (64 KiB).
const WRITE_BUFFER_SIZE: usize = 64 * 1024;

// ============================================================================
// Capability Probe
// ============================================================================

/// What a HEAD request told us about the remote file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Probe {
    content_length: Option<u64>,
    accepts_ranges: bool,
}

/// Where the body transfer should begin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResumePoint {
    /// The local file already holds the whole resource.
    Complete,
    /// Append the remaining bytes starting at this offset.
    From(u64),
    /// Discard the local file and fetch everything.
    Restart,
}

fn resume_point(local_size: u64, probe: &Probe) -> ResumePoint {
    match probe.content_length {
        Some(total) if local_size > 0 && probe.accepts_ranges => {
            if local_size < total {
                ResumePoint::From(local_size)
            } else if local_size == total {
                ResumePoint::Complete
            } else {
                ResumePoint::Restart
            }
        }
        _ => ResumePoint::Restart,
    }
}

/// Reads `Content-Length` straight from the headers.
///
/// `Response::content_length` reports the body size hint, which is zero for
/// HEAD responses.
fn header_content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

async fn probe(
    client: &Client,
    cancel: &CancellationToken,
    url: &str,
    timeout: Duration,
) -> Result<Probe, DownloadError> {
    let request = client.head(url).timeout(timeout).send();
    let response = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(DownloadError::Cancelled),
        response = request => response.map_err(|source| DownloadError::Request {
            url: url.to_string(),
            source,
        })?,
    };

    let status = response.status();
    if !status.is_success() {
        return Err(DownloadError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    let headers = response.headers();
    let accepts_ranges = headers
        .get(ACCEPT_RANGES)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.contains("bytes"))
        .unwrap_or(false);

    Ok(Probe {
        content_length: header_content_length(headers),
        accepts_ranges,
    })
}

// ============================================================================
// Download
// ============================================================================

/// What a finished download did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadSummary {
    /// Final size of the local file.
    pub bytes_total: u64,
    /// Offset the transfer resumed from (0 for a fresh download).
    pub resumed_from: u64,
    /// True when the local file was already complete and nothing was fetched.
    pub already_complete: bool,
}

#[derive(Debug, Default)]
struct TransferState {
    total: Option<u64>,
    sampled: u64,
    resumed_from: u64,
    already_complete: bool,
}

/// Downloads `url` into `dest`, resuming from a partial file when possible.
///
/// Progress is sampled from the file size every `config.sample_interval` and
/// pushed to `progress`; one final update is always pushed before returning,
/// whatever the result. The sender is dropped on return, which closes the
/// channel once all clones are gone.
///
/// # Errors
///
/// Returns `DownloadError::Cancelled` when `cancel` fires, and another
/// variant when a directory, file, request, or body copy fails. A cancelled
/// or failed download leaves the partial file in place.
pub async fn download(
    client: &Client,
    cancel: &CancellationToken,
    url: &str,
    dest: &Path,
    config: &PipelineConfig,
    progress: ProgressSender,
) -> Result<DownloadSummary, DownloadError> {
    info!(url, path = %dest.display(), "Starting download");

    if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|source| DownloadError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
    }

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(dest)
        .await
        .map_err(|source| DownloadError::OpenFile {
            path: dest.to_path_buf(),
            source,
        })?;
    let local_size = file
        .metadata()
        .await
        .map_err(|source| DownloadError::OpenFile {
            path: dest.to_path_buf(),
            source,
        })?
        .len();

    let mut state = TransferState::default();
    let result = transfer(
        client, cancel, url, dest, file, local_size, config, &progress, &mut state,
    )
    .await;

    // Final sample, pushed on every path out of the transfer.
    let on_disk = file_size(dest).await.unwrap_or(0).max(state.sampled);
    let total = match (&result, state.total) {
        (Ok(()), None) => on_disk,
        (_, total) => total.unwrap_or(0),
    };
    let _ = progress.send(ProgressUpdate::downloading(ProgressSample::new(
        on_disk, total,
    )));

    match result {
        Ok(()) => {
            info!(
                bytes = on_disk,
                resumed_from = state.resumed_from,
                "Download complete: {}",
                dest.display()
            );
            Ok(DownloadSummary {
                bytes_total: on_disk,
                resumed_from: state.resumed_from,
                already_complete: state.already_complete,
            })
        }
        Err(DownloadError::Cancelled) => {
            info!(bytes = on_disk, "Download cancelled, keeping partial file");
            Err(DownloadError::Cancelled)
        }
        Err(e) => {
            warn!(error = %e, "Download failed");
            Err(e)
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn transfer(
    client: &Client,
    cancel: &CancellationToken,
    url: &str,
    dest: &Path,
    file: File,
    local_size: u64,
    config: &PipelineConfig,
    progress: &ProgressSender,
    state: &mut TransferState,
) -> Result<(), DownloadError> {
    let remote = probe(client, cancel, url, config.head_timeout).await?;
    debug!(
        content_length = ?remote.content_length,
        accepts_ranges = remote.accepts_ranges,
        local_size,
        "Probed remote file"
    );
    state.total = remote.content_length;

    if remote.content_length == Some(0) {
        debug!("Remote file is empty");
        truncate(&file, dest).await?;
        return Ok(());
    }

    let start = match resume_point(local_size, &remote) {
        ResumePoint::Complete => {
            info!(bytes = local_size, "Local file already complete");
            state.already_complete = true;
            return Ok(());
        }
        ResumePoint::From(offset) => {
            info!(offset, "Resuming download");
            offset
        }
        ResumePoint::Restart => {
            if local_size > 0 {
                debug!(local_size, "Discarding existing partial file");
            }
            truncate(&file, dest).await?;
            0
        }
    };
    state.resumed_from = start;

    let mut request = client.get(url);
    if start > 0 {
        request = request.header(RANGE, format!("bytes={}-", start));
    }

    let response = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(DownloadError::Cancelled),
        response = request.send() => response.map_err(|source| DownloadError::Request {
            url: url.to_string(),
            source,
        })?,
    };

    let status = response.status();
    if !status.is_success() {
        return Err(DownloadError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }
    if start > 0 && status != StatusCode::PARTIAL_CONTENT {
        // The body is the whole resource; appending it corrupts the file.
        warn!(%status, start, "Server ignored the Range header");
    }

    if state.total.is_none() {
        state.total = header_content_length(response.headers()).map(|len| start + len);
    }

    let total = state.total.unwrap_or(0);
    let sampler = Sampler::spawn(
        dest.to_path_buf(),
        config.sample_interval,
        progress.clone(),
        move |size| ProgressUpdate::downloading(ProgressSample::new(size, total)),
    );

    let copied = copy_body(cancel, response, file, dest).await;
    state.sampled = sampler.stop().await;

    let written = copied?;
    debug!(written, "Body copy finished");
    Ok(())
}

async fn truncate(file: &File, dest: &Path) -> Result<(), DownloadError> {
    file.set_len(0)
        .await
        .map_err(|source| DownloadError::Write {
            path: dest.to_path_buf(),
            source,
        })
}

async fn copy_body(
    cancel: &CancellationToken,
    response: reqwest::Response,
    file: File,
    dest: &Path,
) -> Result<u64, DownloadError> {
    let write_err = |source| DownloadError::Write {
        path: dest.to_path_buf(),
        source,
    };

    let mut writer = BufWriter::with_capacity(WRITE_BUFFER_SIZE, file);
    let mut stream = response.bytes_stream();
    let mut written: u64 = 0;

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                // Keep what arrived so the next run can resume from it.
                let _ = writer.flush().await;
                return Err(DownloadError::Cancelled);
            }
            next = stream.next() => next,
        };

        match next {
            Some(Ok(chunk)) => {
                writer.write_all(&chunk).await.map_err(write_err)?;
                written += chunk.len() as u64;
            }
            Some(Err(e)) => {
                let _ = writer.flush().await;
                return Err(DownloadError::Body(e));
            }
            None => break,
        }
    }

    writer.flush().await.map_err(write_err)?;
    Ok(written)
}
