//! Layout resolution - element types and scan/apodization row splits
//!
//! Three container layouts have been observed for `Spectral{n}` members:
//!
//! - every channel carries both an apodization and a scan row range,
//! - channel 0 is pure apodization data and later channels are pure scan data,
//! - a single channel without any region metadata.
//!
//! [`RegionPlan`] names these cases and [`resolve_channel_layouts`] picks one
//! per channel.

use crate::error::{OctError, Result};
use crate::metadata::{DataFileEntry, HeaderDocument, RowRange};
use crate::types::{ElementKind, ElementType};
use crate::utils::checked_frame_len;
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Resolve the numeric element type of an entry
pub fn resolve_type(entry: &DataFileEntry, is_signed: bool) -> Result<ElementType> {
    let resolved = match (&entry.element_kind, entry.bytes_per_element, is_signed) {
        (ElementKind::Colored, 4, _) => Some(ElementType::Int32),
        (ElementKind::Colored, 2, _) => Some(ElementType::Int16),
        (ElementKind::Real, 4, _) => Some(ElementType::Float32),
        (ElementKind::Raw, 1, true) => Some(ElementType::Int8),
        (ElementKind::Raw, 1, false) => Some(ElementType::UInt8),
        (ElementKind::Raw, 2, true) => Some(ElementType::Int16),
        (ElementKind::Raw, 2, false) => Some(ElementType::UInt16),
        _ => None,
    };
    resolved.ok_or_else(|| OctError::UnsupportedElementType {
        name: entry.logical_name.clone(),
        kind: entry.element_kind.to_string(),
        bytes_per_element: entry.bytes_per_element,
        signed: is_signed,
    })
}

/// How the rows of one member split into scan and apodization data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegionPlan {
    /// Both ranges declared; both sub-arrays are kept
    Split { scan: RowRange, apo: RowRange },
    /// Only an apodization range declared; the whole buffer is apodization data
    Apodization { rows: RowRange },
    /// No apodization range; the buffer (or its declared scan range) is scan data
    Scan { rows: RowRange },
}

impl RegionPlan {
    pub fn scan_rows(&self) -> Option<Range<usize>> {
        match self {
            RegionPlan::Split { scan, .. } => Some(scan.as_range()),
            RegionPlan::Scan { rows } => Some(rows.as_range()),
            RegionPlan::Apodization { .. } => None,
        }
    }

    pub fn apo_rows(&self) -> Option<Range<usize>> {
        match self {
            RegionPlan::Split { apo, .. } => Some(apo.as_range()),
            RegionPlan::Apodization { rows } => Some(rows.as_range()),
            RegionPlan::Scan { .. } => None,
        }
    }

    /// Short name for logs
    pub fn case_name(&self) -> &'static str {
        match self {
            RegionPlan::Split { .. } => "split",
            RegionPlan::Apodization { .. } => "apodization-only",
            RegionPlan::Scan { .. } => "scan-only",
        }
    }
}

/// Pick the region plan for an entry; a full split wins over apodization-only
pub fn split_regions(entry: &DataFileEntry) -> RegionPlan {
    let whole = RowRange::new(0, entry.size_x);
    match (entry.scan_region, entry.apo_region) {
        (Some(scan), Some(apo)) => RegionPlan::Split { scan, apo },
        (None, Some(_)) => RegionPlan::Apodization { rows: whole },
        (Some(scan), None) => RegionPlan::Scan { rows: scan },
        (None, None) => RegionPlan::Scan { rows: whole },
    }
}

/// One discovered `Spectral{n}` channel
#[derive(Debug, Clone, Copy)]
pub struct ChannelEntry<'a> {
    pub index: usize,
    pub entry: &'a DataFileEntry,
}

/// Find every `Spectral{n}` entry and check the indices run `0..N` without gaps
pub fn discover_channels(header: &HeaderDocument) -> Result<Vec<ChannelEntry<'_>>> {
    let mut channels: Vec<ChannelEntry<'_>> = header
        .entries_matching("Spectral")
        .into_iter()
        .filter_map(|entry| entry.channel_index().map(|index| ChannelEntry { index, entry }))
        .collect();
    channels.sort_by_key(|c| c.index);

    if channels.is_empty() {
        return Err(OctError::ChannelSequence(
            "header declares no Spectral channels".to_string(),
        ));
    }
    for (expected, channel) in channels.iter().enumerate() {
        if channel.index != expected {
            let found = channels
                .iter()
                .map(|c| c.index.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            return Err(OctError::ChannelSequence(format!(
                "expected Spectral{} but channels are [{}]",
                expected, found
            )));
        }
    }
    Ok(channels)
}

/// Fully resolved layout of one channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelLayout {
    pub channel: usize,
    pub logical_name: String,
    pub element_type: ElementType,
    pub size_x: usize,
    pub size_z: usize,
    pub plan: RegionPlan,
    /// Geometry came from the `Spectral1` entry rather than the channel's own
    pub inherited: bool,
}

impl ChannelLayout {
    /// Bytes occupied by one frame of this channel
    pub fn frame_len(&self) -> Result<usize> {
        let width = self.element_type.size_in_bytes();
        checked_frame_len(self.size_x, self.size_z, width).ok_or_else(|| {
            OctError::InvalidDimensions(format!(
                "{}: {} x {} elements of {} overflow",
                self.logical_name, self.size_x, self.size_z, self.element_type
            ))
        })
    }
}

/// Resolve every channel's layout.
///
/// Channels from index 2 on that carry no region metadata take their type and
/// geometry from the `Spectral1` entry: channel 0 may be a differently shaped
/// apodization-only buffer, so channel 1 is the reference for scan layout.
pub fn resolve_channel_layouts(
    header: &HeaderDocument,
    channels: &[ChannelEntry<'_>],
) -> Result<Vec<ChannelLayout>> {
    let is_signed = header.raw_data_is_signed();
    let reference = channels.iter().find(|c| c.index == 1).map(|c| c.entry);

    channels
        .iter()
        .map(|channel| -> Result<ChannelLayout> {
            let own = channel.entry;
            let source = match reference {
                Some(reference) if channel.index >= 2 && !own.has_regions() => {
                    if (own.size_x, own.size_z, own.bytes_per_element)
                        != (reference.size_x, reference.size_z, reference.bytes_per_element)
                    {
                        log::warn!(
                            "{} declares {}x{} ({} B/px) but inherits {}x{} ({} B/px) from {}",
                            own.logical_name,
                            own.size_x,
                            own.size_z,
                            own.bytes_per_element,
                            reference.size_x,
                            reference.size_z,
                            reference.bytes_per_element,
                            reference.logical_name
                        );
                    }
                    reference
                }
                _ => own,
            };
            let inherited = !std::ptr::eq(source, own);

            let element_type = resolve_type(source, is_signed)?;
            let plan = if inherited {
                RegionPlan::Scan {
                    rows: RowRange::new(0, source.size_x),
                }
            } else {
                split_regions(own)
            };

            log::debug!(
                "{}: {} {}x{} {}{}",
                own.logical_name,
                element_type,
                source.size_x,
                source.size_z,
                plan.case_name(),
                if inherited { " (Spectral1 geometry)" } else { "" }
            );

            Ok(ChannelLayout {
                channel: channel.index,
                logical_name: own.logical_name.clone(),
                element_type,
                size_x: source.size_x,
                size_z: source.size_z,
                plan,
                inherited,
            })
        })
        .collect()
}

/// Output extents of a stacked spectral volume
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeExtents {
    /// Outer (frame) dimension
    pub frames: usize,
    pub scan_rows: usize,
    pub apo_rows: usize,
    pub size_z: usize,
}

impl VolumeExtents {
    /// Largest scan/apodization row counts and sample count over all channels
    pub fn from_layouts(layouts: &[ChannelLayout], frame_count: usize) -> Self {
        let scan_rows = layouts
            .iter()
            .filter_map(|l| l.plan.scan_rows().map(|r| r.len()))
            .max()
            .unwrap_or(0);
        let apo_rows = layouts
            .iter()
            .filter_map(|l| l.plan.apo_rows().map(|r| r.len()))
            .max()
            .unwrap_or(0);
        let size_z = layouts.iter().map(|l| l.size_z).max().unwrap_or(0);
        Self {
            frames: frame_count.max(layouts.len()),
            scan_rows,
            apo_rows,
            size_z,
        }
    }

    pub fn scan_shape(&self) -> (usize, usize, usize) {
        (self.frames, self.scan_rows, self.size_z)
    }

    pub fn apo_shape(&self) -> (usize, usize, usize) {
        (self.frames, self.apo_rows, self.size_z)
    }

    /// Bytes needed to hold both stacked volumes.
    ///
    /// Fails with `InvalidDimensions` when the total overflows or exceeds what
    /// a single allocation may address.
    pub fn byte_size(&self, element_type: ElementType) -> Result<usize> {
        self.scan_rows
            .checked_add(self.apo_rows)
            .and_then(|rows| checked_frame_len(rows, self.size_z, element_type.size_in_bytes()))
            .and_then(|frame| frame.checked_mul(self.frames))
            .filter(|&total| total <= isize::MAX as usize)
            .ok_or_else(|| {
                OctError::InvalidDimensions(format!(
                    "volume of {} does not fit in memory",
                    self.summary()
                ))
            })
    }

    /// Get a summary string of the extents
    pub fn summary(&self) -> String {
        format!(
            "scan {} x {} x {}, apodization {} x {} x {}",
            self.frames, self.scan_rows, self.size_z, self.frames, self.apo_rows, self.size_z
        )
    }
}

/// Element type of the stacked volume: channel 1's type when present, else channel 0's
pub fn volume_element_type(layouts: &[ChannelLayout]) -> Option<ElementType> {
    layouts
        .iter()
        .find(|l| l.channel == 1)
        .or_else(|| layouts.first())
        .map(|l| l.element_type)
}
