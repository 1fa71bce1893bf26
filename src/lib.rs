//! Thorlabs OCT - decoder for optical coherence tomography acquisitions
//!
//! A pure Rust reader for the zip-based `.oct` containers written by Thorlabs
//! spectral-domain OCT systems. Each container holds a `Header.xml` metadata
//! document and a set of raw little-endian `data\<Name>.data` members.
//!
//! # Features
//!
//! - Typed header model with an export-safe, canonicalized metadata tree
//! - Element type resolution for `Colored`, `Real` and `Raw` members
//! - Stacking of multi-channel `Spectral{n}` data into scan and apodization volumes
//! - DC removal, chirp linearization and inverse FFT reconstruction
//! - Reading from the container itself or from an already-extracted folder
//!
//! # Example
//!
//! ```rust,no_run
//! use thorlabs_oct::{DecodeOptions, OctFile};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut oct = OctFile::open("scan.oct")?;
//! let chirp = oct.decode_member("Chirp")?;
//! let volume = oct.decode_spectral_volume()?;
//! println!("{} / chirp {:?}", volume.summary(), chirp.shape());
//!
//! let recording = oct.decode_recording(&DecodeOptions::default())?;
//! println!("{}", recording.summary());
//! # Ok(())
//! # }
//! ```

pub mod archive;
pub mod canonical;
pub mod config;
pub mod decode;
pub mod error;
pub mod file;
pub mod layout;
pub mod metadata;
pub mod reconstruct;
pub mod recording;
pub mod types;
pub mod utils;
pub mod xml;

// Re-exports
pub use archive::{DirectorySource, MemberSource, OctArchive, SourceKind};
pub use config::DecodeOptions;
pub use decode::{decode_member, decode_member_frames, decode_spectral_volume, SpectralVolume};
pub use error::{OctError, Result};
pub use file::OctFile;
pub use layout::{resolve_type, split_regions, ChannelLayout, RegionPlan, VolumeExtents};
pub use metadata::{entries_matching, parse_header, DataFileEntry, HeaderDocument, RowRange};
pub use reconstruct::{chirp_is_monotonic, linearize_and_transform, Reconstruction};
pub use recording::{decode_recording, OctRecording};
pub use types::{DecodedArray, DecodedVolume, ElementKind, ElementType, NumericArray};

/// Version of the decoder
pub const THORLABS_OCT_VERSION: &str = env!("CARGO_PKG_VERSION");
