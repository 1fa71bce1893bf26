//! OCT file access - main API for decoding acquisitions

use crate::archive::{DirectorySource, MemberSource, OctArchive, SourceKind};
use crate::config::DecodeOptions;
use crate::decode::{self, SpectralVolume};
use crate::error::Result;
use crate::metadata::{parse_header, HeaderDocument};
use crate::recording::{self, OctRecording};
use crate::types::{DecodedArray, DecodedVolume};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Main interface for reading one OCT acquisition.
///
/// The header is parsed once when the file is opened; every decode call
/// reads members from the same source.
pub struct OctFile<S: MemberSource = OctArchive<BufReader<File>>> {
    /// Parsed metadata document
    header: HeaderDocument,

    /// Storage the members are read from
    source: S,
}

impl OctFile {
    /// Open a `.oct` container
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_source(OctArchive::open(path)?)
    }
}

impl OctFile<DirectorySource> {
    /// Open a folder of already-extracted members
    pub fn open_dir(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_source(DirectorySource::new(path))
    }
}

impl<S: MemberSource> OctFile<S> {
    /// Wrap any member source, reading and parsing its header
    pub fn from_source(mut source: S) -> Result<Self> {
        let bytes = source.read_header()?;
        let header = parse_header(&bytes)?;
        log::debug!(
            "Parsed header <{}>: {} data files, {} frame(s)",
            header.root_name,
            header.entries().len(),
            header.frame_count()
        );
        Ok(Self { header, source })
    }

    pub fn header(&self) -> &HeaderDocument {
        &self.header
    }

    pub fn source_kind(&self) -> SourceKind {
        self.source.kind()
    }

    /// Member names as stored
    pub fn list_members(&self) -> Vec<String> {
        self.source.list_members()
    }

    /// Decode one member as `(size_x, size_z)`
    pub fn decode_member(&mut self, logical_name: &str) -> Result<DecodedArray> {
        decode::decode_member(&mut self.source, &self.header, logical_name)
    }

    /// Decode every frame of one member as `(frames, size_x, size_z)`
    pub fn decode_member_frames(&mut self, logical_name: &str) -> Result<DecodedVolume> {
        decode::decode_member_frames(&mut self.source, &self.header, logical_name)
    }

    /// Stack every `Spectral{n}` channel using the header's frame count
    pub fn decode_spectral_volume(&mut self) -> Result<SpectralVolume> {
        let frame_count = self.header.frame_count();
        decode::decode_spectral_volume(&mut self.source, &self.header, frame_count)
    }

    /// Stack every `Spectral{n}` channel with an explicit outer extent
    pub fn decode_spectral_volume_with_frames(&mut self, frame_count: usize) -> Result<SpectralVolume> {
        decode::decode_spectral_volume(&mut self.source, &self.header, frame_count)
    }

    /// Decode the full record
    pub fn decode_recording(&mut self, options: &DecodeOptions) -> Result<OctRecording> {
        recording::decode_recording(&mut self.source, &self.header, options)
    }

    /// Release the source, returning the parsed header
    pub fn into_header(self) -> HeaderDocument {
        self.header
    }
}
