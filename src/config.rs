//! Decode options
//!
//! Options can be built in code or loaded from JSON:
//!
//! ```json
//! {
//!   "frame_count": 4,
//!   "named_members": ["Chirp", "VideoImage"],
//!   "max_key_len": 30
//! }
//! ```
//!
//! Fields left out keep their defaults.

use crate::canonical::DEFAULT_MAX_KEY_LEN;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Singly-occurring members decoded alongside the spectral volume
pub const DEFAULT_NAMED_MEMBERS: &[&str] = &[
    "Chirp",
    "OffsetErrors",
    "ApodizationSpectrum",
    "VideoImage",
    "Intensity",
];

/// Controls what [`decode_recording`](crate::recording::decode_recording) produces
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodeOptions {
    /// Outer extent of the spectral volume; the header's frame count when unset
    pub frame_count: Option<usize>,

    /// Decode the `Spectral{n}` channels
    pub decode_spectral: bool,

    /// Members decoded as standalone arrays
    pub named_members: Vec<String>,

    /// Shorten metadata keys for export
    pub canonicalize_header: bool,

    pub max_key_len: usize,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            frame_count: None,
            decode_spectral: true,
            named_members: DEFAULT_NAMED_MEMBERS.iter().map(|s| s.to_string()).collect(),
            canonicalize_header: true,
            max_key_len: DEFAULT_MAX_KEY_LEN,
        }
    }
}

impl DecodeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse options from a JSON string
    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Load options from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn with_frame_count(mut self, frame_count: usize) -> Self {
        self.frame_count = Some(frame_count);
        self
    }

    pub fn with_spectral(mut self, decode_spectral: bool) -> Self {
        self.decode_spectral = decode_spectral;
        self
    }

    pub fn with_named_members<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.named_members = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_canonical_header(mut self, canonicalize: bool) -> Self {
        self.canonicalize_header = canonicalize;
        self
    }

    pub fn with_max_key_len(mut self, max_key_len: usize) -> Self {
        self.max_key_len = max_key_len;
        self
    }

    /// Frame count to use given the header's own value
    pub fn resolve_frame_count(&self, header_frame_count: usize) -> usize {
        self.frame_count.unwrap_or(header_frame_count)
    }
}
