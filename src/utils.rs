//! Utility functions

use crate::error::{OctError, Result};
use crate::types::Sample;

/// Fictitious directory every raw member lives in
pub const DATA_DIR: &str = "data";

/// Extension of raw members
pub const DATA_EXTENSION: &str = ".data";

/// Name of the metadata document at the archive root
pub const HEADER_NAME: &str = "Header.xml";

/// Normalize a member path to forward slashes.
///
/// Headers are authored with `\` separators (`data\Spectral0.data`) while
/// archive member names may use either convention.
pub fn normalize_member_path(path: &str) -> String {
    let path = path.replace('\\', "/");
    path.trim_start_matches("./").trim_start_matches('/').to_string()
}

/// Logical member name: `data\Spectral0.data` -> `Spectral0`
pub fn logical_name(path: &str) -> String {
    let path = normalize_member_path(path);
    let path = path
        .strip_prefix(DATA_DIR)
        .and_then(|p| p.strip_prefix('/'))
        .unwrap_or(&path);
    path.strip_suffix(DATA_EXTENSION).unwrap_or(path).to_string()
}

/// Canonical archive path for a logical name: `Spectral0` -> `data/Spectral0.data`
pub fn member_path(name: &str) -> String {
    format!("{}/{}{}", DATA_DIR, logical_name(name), DATA_EXTENSION)
}

/// Channel index of a `Spectral{n}` logical name
pub fn spectral_index(name: &str) -> Option<usize> {
    let digits = name.strip_prefix("Spectral")?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Bytes in `rows x cols` elements of `width` bytes, `None` on overflow
pub fn checked_frame_len(rows: usize, cols: usize, width: usize) -> Option<usize> {
    rows.checked_mul(cols)?.checked_mul(width)
}

/// Convert little-endian raw bytes to typed data
pub fn bytes_to_samples<T: Sample>(bytes: &[u8]) -> Result<Vec<T>> {
    let width = T::ELEMENT_TYPE.size_in_bytes();
    if bytes.len() % width != 0 {
        return Err(OctError::ShortBuffer {
            name: T::ELEMENT_TYPE.to_string(),
            expected: width,
            actual: bytes.len(),
        });
    }
    let mut data = vec![T::default(); bytes.len() / width];
    T::decode_le(bytes, &mut data);
    Ok(data)
}

/// Format byte size in human-readable form
pub fn format_bytes(bytes: usize) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];

    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}
