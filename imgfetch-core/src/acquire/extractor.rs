//! Streaming ZIP extraction with sampled progress and cancellation.
//!
//! The `zip` reader is synchronous, so every touch of the archive runs on the
//! blocking pool. The archive handle is moved into each blocking call and
//! handed back, which keeps exactly one entry in flight at a time while the
//! async side samples the destination file.

use std::fs::{self, File};
use std::io::{self, BufReader, Read, Seek, Write};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use zip::result::ZipError;
use zip::ZipArchive;

use super::error::ExtractError;
use super::sampler::{file_size, ProgressSender, Sampler};
use super::types::{ArchiveEntry, ProgressSample, ProgressUpdate};
use crate::config::PipelineConfig;

/// Chunk size for entry copies; cancellation is checked between chunks.
const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// Permissions used when an entry carries none.
const DEFAULT_FILE_MODE: u32 = 0o644;

type Archive = ZipArchive<BufReader<File>>;

// ============================================================================
// Entry Listing
// ============================================================================

/// Reads the central directory of the archive at `archive_path`.
///
/// # Errors
///
/// Fails when the archive cannot be opened or parsed, or when any entry name
/// would resolve outside the destination directory.
pub fn list_entries(archive_path: &Path) -> Result<Vec<ArchiveEntry>, ExtractError> {
    let mut archive = open_archive(archive_path)?;
    read_entries(&mut archive)
}

fn open_archive(archive_path: &Path) -> Result<Archive, ExtractError> {
    let open_err = |source| ExtractError::OpenArchive {
        path: archive_path.to_path_buf(),
        source,
    };

    let file = File::open(archive_path).map_err(|e| open_err(ZipError::Io(e)))?;
    ZipArchive::new(BufReader::new(file)).map_err(open_err)
}

fn read_entries<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
) -> Result<Vec<ArchiveEntry>, ExtractError> {
    let mut entries = Vec::with_capacity(archive.len());

    for index in 0..archive.len() {
        let entry = archive
            .by_index_raw(index)
            .map_err(|source| ExtractError::ReadEntry {
                name: format!("#{}", index),
                source,
            })?;

        // Reject the whole archive rather than writing outside dest_dir.
        let name = entry
            .enclosed_name()
            .map(|p| p.to_path_buf())
            .ok_or_else(|| ExtractError::UnsafePath {
                name: entry.name().to_string(),
            })?;

        entries.push(ArchiveEntry {
            index,
            name,
            uncompressed_size: entry.size(),
            is_directory: entry.is_dir(),
            file_mode: entry_mode(entry.unix_mode()),
        });
    }

    Ok(entries)
}

/// Permission bits to apply to an extracted file.
///
/// Only the rwx bits are honoured; setuid, setgid and sticky are dropped.
fn entry_mode(stored: Option<u32>) -> u32 {
    stored
        .map(|mode| mode & 0o777)
        .filter(|mode| *mode != 0)
        .unwrap_or(DEFAULT_FILE_MODE)
}

// ============================================================================
// Extraction
// ============================================================================

/// What a finished extraction wrote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractSummary {
    /// Number of files written (directory entries excluded).
    pub files: usize,
    /// Sum of the written file sizes.
    pub bytes_total: u64,
}

/// Extracts every file entry of `archive_path` under `dest_dir`.
///
/// Entries are written in archive order. Directory entries are skipped; the
/// parents of each file are created as needed. While an entry is copied its
/// destination is sampled every `config.sample_interval` and the cumulative
/// byte count across all entries is pushed to `progress`, tagged with the
/// entry name.
///
/// # Errors
///
/// Returns `ExtractError::Cancelled` when `cancel` fires; files already
/// written are left in place. Other variants report archive, entry, or
/// destination failures.
pub async fn extract(
    cancel: &CancellationToken,
    archive_path: &Path,
    dest_dir: &Path,
    config: &PipelineConfig,
    progress: ProgressSender,
) -> Result<ExtractSummary, ExtractError> {
    info!(
        "Extracting {} to {}",
        archive_path.display(),
        dest_dir.display()
    );

    let path = archive_path.to_path_buf();
    let (mut archive, entries) = run_blocking(move || {
        let mut archive = open_archive(&path)?;
        let entries = read_entries(&mut archive)?;
        Ok((archive, entries))
    })
    .await?;

    // The archive itself lives in dest_dir; an entry landing on it would
    // truncate the file the reader still has open.
    let (files, clashing): (Vec<ArchiveEntry>, Vec<ArchiveEntry>) = entries
        .into_iter()
        .filter(|e| !e.is_directory)
        .partition(|e| dest_dir.join(&e.name) != archive_path);
    for entry in &clashing {
        warn!(entry = %entry.name.display(), "Skipping entry that would overwrite the archive");
    }
    let grand_total: u64 = files.iter().map(|e| e.uncompressed_size).sum();
    debug!(files = files.len(), grand_total, "Read archive directory");

    if files.is_empty() {
        let _ = progress.send(ProgressUpdate::extracting(
            String::new(),
            ProgressSample::new(0, 0),
        ));
        info!("Archive has no files to extract");
        return Ok(ExtractSummary {
            files: 0,
            bytes_total: 0,
        });
    }

    let mut done: u64 = 0;
    for entry in &files {
        if cancel.is_cancelled() {
            info!(done, "Extraction cancelled");
            return Err(ExtractError::Cancelled);
        }

        let label = entry.name.to_string_lossy().to_string();
        let dest_path = dest_dir.join(&entry.name);
        debug!(entry = %label, size = entry.uncompressed_size, "Extracting entry");

        let open_path = dest_path.clone();
        let file = run_blocking(move || open_destination(&open_path)).await?;

        let sampler = {
            let label = label.clone();
            let prior = done;
            Sampler::spawn(
                dest_path.clone(),
                config.sample_interval,
                progress.clone(),
                move |size| {
                    ProgressUpdate::extracting(
                        label.clone(),
                        ProgressSample::new(prior + size, grand_total),
                    )
                },
            )
        };

        let index = entry.index;
        let mode = entry.file_mode;
        let copy_path = dest_path.clone();
        let copy_label = label.clone();
        let copy_cancel = cancel.clone();
        let (returned, copied) = tokio::task::spawn_blocking(move || {
            let copied = copy_entry(
                &mut archive,
                index,
                &copy_label,
                file,
                &copy_path,
                mode,
                &copy_cancel,
            );
            (archive, copied)
        })
        .await
        .map_err(|e| ExtractError::Task(e.to_string()))?;
        archive = returned;

        let sampled = sampler.stop().await;
        let written = match &copied {
            Ok(written) => *written,
            Err(_) => file_size(&dest_path).await.unwrap_or(0),
        };
        let _ = progress.send(ProgressUpdate::extracting(
            label.clone(),
            ProgressSample::new(done + written.max(sampled), grand_total),
        ));

        match copied {
            Ok(_) => done += written,
            Err(ExtractError::Cancelled) => {
                info!(entry = %label, done, "Extraction cancelled mid-entry");
                return Err(ExtractError::Cancelled);
            }
            Err(e) => {
                warn!(entry = %label, error = %e, "Extraction failed");
                return Err(e);
            }
        }
    }

    info!(files = files.len(), bytes = done, "Extraction complete");
    Ok(ExtractSummary {
        files: files.len(),
        bytes_total: done,
    })
}

async fn run_blocking<T, F>(f: F) -> Result<T, ExtractError>
where
    F: FnOnce() -> Result<T, ExtractError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ExtractError::Task(e.to_string()))?
}

/// Creates or truncates the destination file, creating parents as needed.
fn open_destination(path: &Path) -> Result<File, ExtractError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| ExtractError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    File::create(path).map_err(|source| ExtractError::CreateFile {
        path: path.to_path_buf(),
        source,
    })
}

fn copy_entry<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    index: usize,
    label: &str,
    mut file: File,
    dest: &Path,
    mode: u32,
    cancel: &CancellationToken,
) -> Result<u64, ExtractError> {
    let read_err = |source| ExtractError::ReadEntry {
        name: label.to_string(),
        source,
    };
    let write_err = |source| ExtractError::Write {
        path: dest.to_path_buf(),
        source,
    };

    let mut reader = archive.by_index(index).map_err(read_err)?;
    let mut buf = vec![0u8; COPY_BUFFER_SIZE];
    let mut written: u64 = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(ExtractError::Cancelled);
        }

        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(read_err(ZipError::Io(e))),
        };

        file.write_all(&buf[..n]).map_err(write_err)?;
        written += n as u64;
    }

    file.flush().map_err(write_err)?;
    set_permissions(dest, mode)?;
    Ok(written)
}

// ============================================================================
// Unix Permissions
// ============================================================================

#[allow(unused_variables)]
fn set_permissions(path: &Path, mode: u32) -> Result<(), ExtractError> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        fs::set_permissions(path, fs::Permissions::from_mode(mode)).map_err(|source| {
            ExtractError::Write {
                path: PathBuf::from(path),
                source,
            }
        })?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquire::sampler::{progress_channel, ProgressReceiver};
    use crate::acquire::types::Stage;
    use std::time::Duration;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;
    use zip::CompressionMethod;

    fn test_config() -> PipelineConfig {
        PipelineConfig {
            sample_interval: Duration::from_millis(5),
            ..PipelineConfig::default()
        }
    }

    /// Builds a zip; names ending in `/` become directory entries.
    fn build_zip(path: &Path, entries: &[(&str, &[u8], u32)]) {
        let file = File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);

        for (name, data, mode) in entries {
            let options = SimpleFileOptions::default()
                .compression_method(CompressionMethod::Deflated)
                .unix_permissions(*mode);
            if name.ends_with('/') {
                zip.add_directory(*name, options).unwrap();
            } else {
                zip.start_file(*name, options).unwrap();
                zip.write_all(data).unwrap();
            }
        }

        zip.finish().unwrap();
    }

    fn drain(rx: &mut ProgressReceiver) -> Vec<ProgressUpdate> {
        let mut updates = Vec::new();
        while let Ok(update) = rx.try_recv() {
            updates.push(update);
        }
        updates
    }

    fn entry_name(update: &ProgressUpdate) -> &str {
        match &update.stage {
            Stage::Extracting { entry } => entry,
            Stage::Downloading => panic!("download update from extractor"),
        }
    }

    #[test]
    fn test_list_entries() {
        let temp_dir = TempDir::new().unwrap();
        let archive_path = temp_dir.path().join("image.zip");
        build_zip(
            &archive_path,
            &[
                ("boot.img", &[1u8; 300], 0o644),
                ("tools/", &[], 0o755),
                ("tools/fastboot", &[2u8; 50], 0o755),
            ],
        );

        let entries = list_entries(&archive_path).unwrap();
        assert_eq!(entries.len(), 3);

        assert_eq!(entries[0].name, PathBuf::from("boot.img"));
        assert_eq!(entries[0].uncompressed_size, 300);
        assert!(!entries[0].is_directory);
        assert_eq!(entries[0].file_mode, 0o644);

        assert!(entries[1].is_directory);

        assert_eq!(entries[2].name, PathBuf::from("tools/fastboot"));
        assert_eq!(entries[2].file_mode, 0o755);
    }

    #[tokio::test]
    async fn test_extract_reports_cumulative_progress() {
        let temp_dir = TempDir::new().unwrap();
        let archive_path = temp_dir.path().join("image.zip");
        let dest_dir = temp_dir.path().join("out");
        let data_a = vec![0xABu8; 1000];
        build_zip(
            &archive_path,
            &[
                ("a.bin", &data_a, 0o644),
                ("empty/", &[], 0o755),
                ("b.bin", &[], 0o644),
            ],
        );

        let (tx, mut rx) = progress_channel();
        let summary = extract(
            &CancellationToken::new(),
            &archive_path,
            &dest_dir,
            &test_config(),
            tx,
        )
        .await
        .unwrap();

        assert_eq!(summary.files, 2);
        assert_eq!(summary.bytes_total, 1000);
        assert_eq!(fs::read(dest_dir.join("a.bin")).unwrap(), data_a);
        assert_eq!(fs::metadata(dest_dir.join("b.bin")).unwrap().len(), 0);
        assert!(!dest_dir.join("empty").exists());

        let updates = drain(&mut rx);
        assert!(updates
            .windows(2)
            .all(|w| w[0].sample.bytes_done <= w[1].sample.bytes_done));
        assert!(updates.iter().all(|u| u.sample.bytes_total == 1000));
        assert!(updates
            .iter()
            .all(|u| matches!(entry_name(u), "a.bin" | "b.bin")));

        let last = updates.last().unwrap();
        assert_eq!(entry_name(last), "b.bin");
        assert_eq!(last.sample, ProgressSample::new(1000, 1000));
    }

    #[tokio::test]
    async fn test_extract_nested_paths() {
        let temp_dir = TempDir::new().unwrap();
        let archive_path = temp_dir.path().join("image.zip");
        let dest_dir = temp_dir.path().join("out");
        let system = vec![7u8; 200_000];
        build_zip(
            &archive_path,
            &[
                ("images/system.img", &system, 0o644),
                ("images/meta/info.txt", b"build 46", 0o644),
            ],
        );

        let (tx, mut rx) = progress_channel();
        extract(
            &CancellationToken::new(),
            &archive_path,
            &dest_dir,
            &test_config(),
            tx,
        )
        .await
        .unwrap();

        assert_eq!(fs::read(dest_dir.join("images/system.img")).unwrap(), system);
        assert_eq!(
            fs::read_to_string(dest_dir.join("images/meta/info.txt")).unwrap(),
            "build 46"
        );
        assert_eq!(
            drain(&mut rx).last().map(|u| u.sample),
            Some(ProgressSample::new(200_008, 200_008))
        );
    }

    #[tokio::test]
    async fn test_extract_overwrites_existing_files() {
        let temp_dir = TempDir::new().unwrap();
        let archive_path = temp_dir.path().join("image.zip");
        let dest_dir = temp_dir.path().join("out");
        build_zip(&archive_path, &[("boot.img", b"new", 0o644)]);

        fs::create_dir_all(&dest_dir).unwrap();
        fs::write(dest_dir.join("boot.img"), vec![0u8; 4096]).unwrap();

        let (tx, _rx) = progress_channel();
        extract(
            &CancellationToken::new(),
            &archive_path,
            &dest_dir,
            &test_config(),
            tx,
        )
        .await
        .unwrap();

        assert_eq!(fs::read(dest_dir.join("boot.img")).unwrap(), b"new");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_extract_preserves_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let archive_path = temp_dir.path().join("image.zip");
        let dest_dir = temp_dir.path().join("out");
        build_zip(
            &archive_path,
            &[
                ("fastboot", b"#!/bin/sh\n", 0o755),
                ("notes.txt", b"private", 0o640),
            ],
        );

        let (tx, _rx) = progress_channel();
        extract(
            &CancellationToken::new(),
            &archive_path,
            &dest_dir,
            &test_config(),
            tx,
        )
        .await
        .unwrap();

        let mode = |name: &str| {
            fs::metadata(dest_dir.join(name))
                .unwrap()
                .permissions()
                .mode()
                & 0o777
        };
        assert_eq!(mode("fastboot"), 0o755);
        assert_eq!(mode("notes.txt"), 0o640);
    }

    #[tokio::test]
    async fn test_extract_empty_archive() {
        let temp_dir = TempDir::new().unwrap();
        let archive_path = temp_dir.path().join("empty.zip");
        let dest_dir = temp_dir.path().join("out");
        build_zip(&archive_path, &[]);

        let (tx, mut rx) = progress_channel();
        let summary = extract(
            &CancellationToken::new(),
            &archive_path,
            &dest_dir,
            &test_config(),
            tx,
        )
        .await
        .unwrap();

        assert_eq!(summary.files, 0);
        let updates = drain(&mut rx);
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].sample, ProgressSample::new(0, 0));
        assert_eq!(updates[0].sample.per_myriad(), None);
    }

    #[tokio::test]
    async fn test_extract_corrupt_archive() {
        let temp_dir = TempDir::new().unwrap();
        let archive_path = temp_dir.path().join("broken.zip");
        fs::write(&archive_path, b"this is not a zip file at all").unwrap();

        let (tx, _rx) = progress_channel();
        let err = extract(
            &CancellationToken::new(),
            &archive_path,
            temp_dir.path(),
            &test_config(),
            tx,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ExtractError::OpenArchive { .. }));
        assert_eq!(err.kind(), crate::acquire::FailureKind::ArchiveFormat);
    }

    #[tokio::test]
    async fn test_extract_rejects_path_traversal() {
        let temp_dir = TempDir::new().unwrap();
        let archive_path = temp_dir.path().join("evil.zip");
        let dest_dir = temp_dir.path().join("out");
        build_zip(
            &archive_path,
            &[
                ("fine.txt", b"ok", 0o644),
                ("../escaped.txt", b"gotcha", 0o644),
            ],
        );

        let (tx, _rx) = progress_channel();
        let err = extract(
            &CancellationToken::new(),
            &archive_path,
            &dest_dir,
            &test_config(),
            tx,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ExtractError::UnsafePath { .. }));
        assert!(!temp_dir.path().join("escaped.txt").exists());
        assert!(!dest_dir.join("fine.txt").exists());
    }

    #[tokio::test]
    async fn test_extract_cancelled_before_start() {
        let temp_dir = TempDir::new().unwrap();
        let archive_path = temp_dir.path().join("image.zip");
        let dest_dir = temp_dir.path().join("out");
        build_zip(&archive_path, &[("boot.img", &[1u8; 64], 0o644)]);

        let cancel = CancellationToken::new();
        cancel.cancel();

        let (tx, _rx) = progress_channel();
        let err = extract(&cancel, &archive_path, &dest_dir, &test_config(), tx)
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert!(!dest_dir.join("boot.img").exists());
    }

    #[test]
    fn test_copy_entry_stops_when_cancelled() {
        let temp_dir = TempDir::new().unwrap();
        let archive_path = temp_dir.path().join("image.zip");
        build_zip(&archive_path, &[("big.img", &vec![3u8; 1 << 20], 0o644)]);

        let mut archive = open_archive(&archive_path).unwrap();
        let dest = temp_dir.path().join("big.img");
        let file = open_destination(&dest).unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = copy_entry(&mut archive, 0, "big.img", file, &dest, 0o644, &cancel)
            .unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(fs::metadata(&dest).unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_extract_cancelled_mid_entry() {
        let temp_dir = TempDir::new().unwrap();
        let archive_path = temp_dir.path().join("image.zip");
        let dest_dir = temp_dir.path().join("out");
        let size = 32 << 20;
        build_zip(&archive_path, &[("system.img", &vec![0u8; size], 0o644)]);

        let config = PipelineConfig::default();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let watched = dest_dir.join("system.img");
        let watcher = tokio::spawn(async move {
            loop {
                if let Ok(meta) = tokio::fs::metadata(&watched).await {
                    if meta.len() > 0 {
                        trigger.cancel();
                        return std::time::Instant::now();
                    }
                }
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        });

        let (tx, _rx) = progress_channel();
        let err = extract(&cancel, &archive_path, &dest_dir, &config, tx)
            .await
            .unwrap_err();
        let cancelled_at = watcher.await.unwrap();

        assert!(err.is_cancelled());
        assert!(cancelled_at.elapsed() < config.sample_interval);
        assert!(fs::metadata(dest_dir.join("system.img")).unwrap().len() < size as u64);
    }

    #[tokio::test]
    async fn test_extract_skips_entry_named_like_archive() {
        let temp_dir = TempDir::new().unwrap();
        let dest_dir = temp_dir.path().to_path_buf();
        let archive_path = dest_dir.join("download.tmp");
        build_zip(
            &archive_path,
            &[
                ("download.tmp", b"not the archive", 0o644),
                ("a.bin", b"payload", 0o644),
            ],
        );
        let archive_bytes = fs::read(&archive_path).unwrap();

        let (tx, _rx) = progress_channel();
        let summary = extract(
            &CancellationToken::new(),
            &archive_path,
            &dest_dir,
            &test_config(),
            tx,
        )
        .await
        .unwrap();

        assert_eq!(summary.files, 1);
        assert_eq!(summary.bytes_total, 7);
        assert_eq!(fs::read(&archive_path).unwrap(), archive_bytes);
        assert_eq!(fs::read(dest_dir.join("a.bin")).unwrap(), b"payload");
    }

    #[test]
    fn test_entry_mode_keeps_only_rwx_bits() {
        assert_eq!(entry_mode(Some(0o104755)), 0o755);
        assert_eq!(entry_mode(Some(0o107777)), 0o777);
        assert_eq!(entry_mode(Some(0o100640)), 0o640);
        assert_eq!(entry_mode(Some(0o100000)), DEFAULT_FILE_MODE);
        assert_eq!(entry_mode(None), DEFAULT_FILE_MODE);
    }
}
