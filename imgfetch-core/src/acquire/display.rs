//! Human-readable formatting for sizes and paths.

use std::path::{Path, MAIN_SEPARATOR};

const UNIT: u64 = 1024;
const PREFIXES: &[char] = &['K', 'M', 'G', 'T', 'P', 'E'];

/// Formats a byte count with binary units, e.g. `1.50 KB`.
pub fn format_size(bytes: u64) -> String {
    if bytes < UNIT {
        return format!("{} B", bytes);
    }

    let mut div = UNIT;
    let mut exp = 0;
    let mut n = bytes / UNIT;
    while n >= UNIT {
        div *= UNIT;
        exp += 1;
        n /= UNIT;
    }

    format!("{:.2} {}B", bytes as f64 / div as f64, PREFIXES[exp])
}

/// Shortens a long path for display by replacing middle components with `...`.
///
/// Starts from the first and last component and keeps one more component at
/// each end per step, stopping at the first result that reaches `max_len`.
/// Returns the full path when the two ends meet.
pub fn truncate_path(path: &Path, max_len: usize) -> String {
    let full = path.to_string_lossy().to_string();
    if full.len() <= max_len {
        return full;
    }

    let sep = MAIN_SEPARATOR.to_string();
    let parts: Vec<&str> = full.split(MAIN_SEPARATOR).collect();
    let mut truncated = String::new();

    let mut i = 0;
    while truncated.len() < max_len {
        let head = i + 1;
        let tail = parts.len().saturating_sub(1 + i);
        if head >= tail {
            return full;
        }

        let mut kept: Vec<&str> = parts[..head].to_vec();
        kept.push("...");
        kept.extend_from_slice(&parts[tail..]);
        truncated = kept.join(&sep);
        i += 1;
    }

    truncated
}
