//! Frame decoding - typed arrays from raw member bytes

use crate::archive::MemberSource;
use crate::error::{OctError, Result};
use crate::layout::{
    discover_channels, resolve_channel_layouts, resolve_type, volume_element_type, ChannelEntry,
    ChannelLayout, VolumeExtents,
};
use crate::metadata::{DataFileEntry, HeaderDocument};
use crate::types::{DecodedArray, DecodedVolume, ElementType, NumericArray, Sample};
use crate::utils::{bytes_to_samples, checked_frame_len, format_bytes};
use ndarray::{s, Array2, Array3, Axis};
use serde::Serialize;

/// Scan and apodization data of every `Spectral{n}` channel, stacked
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpectralVolume {
    pub element_type: ElementType,
    pub extents: VolumeExtents,
    /// `(frames, scan_rows, size_z)`
    pub scan: DecodedVolume,
    /// `(frames, apo_rows, size_z)`
    pub apo: DecodedVolume,
    pub channels: Vec<ChannelLayout>,
}

impl SpectralVolume {
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Get a summary string of the volume
    pub fn summary(&self) -> String {
        format!(
            "{} channel(s), {} ({}), {}",
            self.channel_count(),
            self.extents.summary(),
            self.element_type,
            format_bytes(self.scan.size_in_bytes() + self.apo.size_in_bytes())
        )
    }
}

/// Decode a member into `(size_x, size_z)`, keeping the first frame when the
/// buffer holds several
pub fn decode_member<S: MemberSource + ?Sized>(
    source: &mut S,
    header: &HeaderDocument,
    logical_name: &str,
) -> Result<DecodedArray> {
    let frames = decode_member_frames(source, header, logical_name)?;
    Ok(first_frame(&frames))
}

/// Decode every frame of a member into `(frames, size_x, size_z)`
pub fn decode_member_frames<S: MemberSource + ?Sized>(
    source: &mut S,
    header: &HeaderDocument,
    logical_name: &str,
) -> Result<DecodedVolume> {
    let entry = header
        .entry(logical_name)
        .ok_or_else(|| OctError::member_not_found(logical_name, header.logical_names()))?;
    let element_type = resolve_type(entry, header.raw_data_is_signed())?;
    let frame_len = frame_len(&entry.logical_name, element_type, entry.size_x, entry.size_z)?;
    let stored = source.member_size(&entry.logical_name)?;
    check_stored_size(&entry.logical_name, frame_len, stored)?;
    let bytes = source.read_member(&entry.logical_name)?;
    reinterpret(entry, element_type, entry.size_x, entry.size_z, &bytes)
}

fn frame_len(name: &str, element_type: ElementType, rows: usize, cols: usize) -> Result<usize> {
    checked_frame_len(rows, cols, element_type.size_in_bytes()).ok_or_else(|| {
        OctError::InvalidDimensions(format!(
            "{}: {} x {} elements of {} overflow",
            name, rows, cols, element_type
        ))
    })
}

/// A member must hold at least one whole frame and no partial ones
fn check_stored_size(name: &str, frame_len: usize, stored: u64) -> Result<()> {
    let actual = usize::try_from(stored).unwrap_or(usize::MAX);
    if frame_len == 0 || actual == 0 || actual % frame_len != 0 {
        return Err(OctError::ShortBuffer {
            name: name.to_string(),
            expected: frame_len,
            actual,
        });
    }
    Ok(())
}

/// Reinterpret raw bytes as `(frames, rows, cols)` elements of `element_type`
pub fn reinterpret(
    entry: &DataFileEntry,
    element_type: ElementType,
    rows: usize,
    cols: usize,
    bytes: &[u8],
) -> Result<DecodedVolume> {
    let frame_len = frame_len(&entry.logical_name, element_type, rows, cols)?;
    check_stored_size(&entry.logical_name, frame_len, bytes.len() as u64)?;
    let frames = bytes.len() / frame_len;
    if frames > 1 {
        log::debug!("{} holds {} frames of {}x{}", entry.logical_name, frames, rows, cols);
    }
    let shape = (frames, rows, cols);
    match element_type {
        ElementType::Int8 => to_volume::<i8>(bytes, shape),
        ElementType::UInt8 => to_volume::<u8>(bytes, shape),
        ElementType::Int16 => to_volume::<i16>(bytes, shape),
        ElementType::UInt16 => to_volume::<u16>(bytes, shape),
        ElementType::Int32 => to_volume::<i32>(bytes, shape),
        ElementType::Float32 => to_volume::<f32>(bytes, shape),
    }
}

fn to_volume<T: Sample>(bytes: &[u8], shape: (usize, usize, usize)) -> Result<DecodedVolume> {
    let data = bytes_to_samples::<T>(bytes)?;
    let array = Array3::from_shape_vec(shape, data)
        .map_err(|e| OctError::InvalidDimensions(e.to_string()))?;
    Ok(T::wrap(array))
}

fn first_frame(frames: &DecodedVolume) -> DecodedArray {
    fn take<T: Sample>(a: &Array3<T>) -> DecodedArray {
        T::wrap(a.index_axis(Axis(0), 0).to_owned())
    }
    match frames {
        NumericArray::I8(a) => take(a),
        NumericArray::U8(a) => take(a),
        NumericArray::I16(a) => take(a),
        NumericArray::U16(a) => take(a),
        NumericArray::I32(a) => take(a),
        NumericArray::F32(a) => take(a),
    }
}

/// Decode and stack every `Spectral{n}` channel.
///
/// Channel `n` lands at outer index `n`; the outer extent is the larger of
/// `frame_count` and the channel count. Sub-arrays smaller than the volume
/// extents fill the leading rows and columns, the rest stays zero.
///
/// Every channel's stored size is checked against its layout before the
/// volumes are allocated.
pub fn decode_spectral_volume<S: MemberSource + ?Sized>(
    source: &mut S,
    header: &HeaderDocument,
    frame_count: usize,
) -> Result<SpectralVolume> {
    let channels = discover_channels(header)?;
    let layouts = resolve_channel_layouts(header, &channels)?;
    let extents = VolumeExtents::from_layouts(&layouts, frame_count);
    let element_type = volume_element_type(&layouts).ok_or_else(|| {
        OctError::ChannelSequence("header declares no Spectral channels".to_string())
    })?;

    for layout in &layouts {
        let frame_len = layout.frame_len()?;
        let stored = source.member_size(&layout.logical_name)?;
        check_stored_size(&layout.logical_name, frame_len, stored)?;
    }
    let total = extents.byte_size(element_type)?;
    log::debug!("Stacking {} into {}", extents.summary(), format_bytes(total));

    let (scan, apo) = match element_type {
        ElementType::Int8 => stack::<i8, S>(source, &channels, &layouts, &extents)?,
        ElementType::UInt8 => stack::<u8, S>(source, &channels, &layouts, &extents)?,
        ElementType::Int16 => stack::<i16, S>(source, &channels, &layouts, &extents)?,
        ElementType::UInt16 => stack::<u16, S>(source, &channels, &layouts, &extents)?,
        ElementType::Int32 => stack::<i32, S>(source, &channels, &layouts, &extents)?,
        ElementType::Float32 => stack::<f32, S>(source, &channels, &layouts, &extents)?,
    };

    Ok(SpectralVolume {
        element_type,
        extents,
        scan,
        apo,
        channels: layouts,
    })
}

fn stack<T: Sample, S: MemberSource + ?Sized>(
    source: &mut S,
    channels: &[ChannelEntry<'_>],
    layouts: &[ChannelLayout],
    extents: &VolumeExtents,
) -> Result<(DecodedVolume, DecodedVolume)> {
    let mut scan = Array3::<T>::zeros(extents.scan_shape());
    let mut apo = Array3::<T>::zeros(extents.apo_shape());

    for (channel, layout) in channels.iter().zip(layouts) {
        let bytes = source.read_member(&channel.entry.logical_name)?;
        let frames = reinterpret(
            channel.entry,
            layout.element_type,
            layout.size_x,
            layout.size_z,
            &bytes,
        )?;
        let data: Array2<T> = first_frame(&frames).cast();

        if let Some(rows) = layout.plan.scan_rows() {
            let block = data.slice(s![rows, ..]);
            let (r, c) = block.dim();
            scan.slice_mut(s![layout.channel, ..r, ..c]).assign(&block);
        }
        if let Some(rows) = layout.plan.apo_rows() {
            let block = data.slice(s![rows, ..]);
            let (r, c) = block.dim();
            apo.slice_mut(s![layout.channel, ..r, ..c]).assign(&block);
        }
    }

    Ok((T::wrap(scan), T::wrap(apo)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::OctArchive;
    use crate::metadata::parse_header;
    use ndarray::array;
    use std::io::{Cursor, Write};
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    fn archive(header: &str, members: &[(&str, Vec<u8>)]) -> OctArchive<Cursor<Vec<u8>>> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();
        zip.start_file("Header.xml", options).unwrap();
        zip.write_all(header.as_bytes()).unwrap();
        for (name, data) in members {
            zip.start_file(format!("data\\{}.data", name), options).unwrap();
            zip.write_all(data).unwrap();
        }
        let mut cursor = zip.finish().unwrap();
        cursor.set_position(0);
        OctArchive::from_reader(cursor).unwrap()
    }

    fn header(signed: &str, entries: &str) -> String {
        format!(
            "<Ocity><Instrument><RawDataIsSigned>{}</RawDataIsSigned></Instrument><DataFiles>{}</DataFiles></Ocity>",
            signed, entries
        )
    }

    fn u16_bytes(values: impl IntoIterator<Item = u16>) -> Vec<u8> {
        values.into_iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    #[test]
    fn test_decode_member_u16() {
        let xml = header(
            "False",
            r#"<DataFile Type="Raw" BytesPerPixel="2" SizeX="2" SizeZ="4">data\Spectral0.data</DataFile>"#,
        );
        let doc = parse_header(xml.as_bytes()).unwrap();
        let mut src = archive(&xml, &[("Spectral0", u16_bytes(1..=8))]);

        let decoded = decode_member(&mut src, &doc, "Spectral0").unwrap();
        assert_eq!(decoded, DecodedArray::U16(array![[1, 2, 3, 4], [5, 6, 7, 8]]));
    }

    #[test]
    fn test_decode_member_short_buffer() {
        let xml = header(
            "False",
            r#"<DataFile Type="Raw" BytesPerPixel="2" SizeX="2" SizeZ="4">data\Spectral0.data</DataFile>"#,
        );
        let doc = parse_header(xml.as_bytes()).unwrap();
        let mut src = archive(&xml, &[("Spectral0", u16_bytes(1..=7))]);

        let err = decode_member(&mut src, &doc, "Spectral0").unwrap_err();
        assert!(matches!(
            err,
            OctError::ShortBuffer { expected: 16, actual: 14, .. }
        ));
    }

    #[test]
    fn test_oversized_extents_rejected_before_allocation() {
        let xml = header(
            "False",
            r#"<DataFile Type="Raw" BytesPerPixel="2" SizeX="2147483648" SizeZ="2147483648">data\Spectral0.data</DataFile>"#,
        );
        let doc = parse_header(xml.as_bytes()).unwrap();
        let mut src = archive(&xml, &[("Spectral0", u16_bytes(1..=8))]);

        assert!(matches!(
            decode_spectral_volume(&mut src, &doc, doc.frame_count()),
            Err(OctError::ShortBuffer { actual: 16, .. })
        ));
        assert!(matches!(
            decode_member(&mut src, &doc, "Spectral0"),
            Err(OctError::ShortBuffer { actual: 16, .. })
        ));
    }

    #[test]
    fn test_overflowing_extents_rejected() {
        let xml = header(
            "False",
            r#"<DataFile Type="Raw" BytesPerPixel="2" SizeX="4294967296" SizeZ="4294967296">data\Spectral0.data</DataFile>"#,
        );
        let doc = parse_header(xml.as_bytes()).unwrap();
        let mut src = archive(&xml, &[("Spectral0", u16_bytes(1..=8))]);

        assert!(matches!(
            decode_spectral_volume(&mut src, &doc, doc.frame_count()),
            Err(OctError::InvalidDimensions(_))
        ));
        assert!(matches!(
            decode_member(&mut src, &doc, "Spectral0"),
            Err(OctError::InvalidDimensions(_))
        ));
    }

    #[test]
    fn test_decode_member_frames() {
        let xml = header(
            "False",
            r#"<DataFile Type="Real" BytesPerPixel="4" SizeX="1" SizeZ="2">data\Intensity.data</DataFile>"#,
        );
        let doc = parse_header(xml.as_bytes()).unwrap();
        let bytes: Vec<u8> = [1.0f32, 2.0, 3.0, 4.0]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        let mut src = archive(&xml, &[("Intensity", bytes)]);

        let frames = decode_member_frames(&mut src, &doc, "Intensity").unwrap();
        assert_eq!(frames.shape(), &[2, 1, 2]);
        let first = decode_member(&mut src, &doc, "Intensity").unwrap();
        assert_eq!(first, DecodedArray::F32(array![[1.0, 2.0]]));
    }

    #[test]
    fn test_undeclared_member() {
        let xml = header("False", "");
        let doc = parse_header(xml.as_bytes()).unwrap();
        let mut src = archive(&xml, &[]);
        assert!(matches!(
            decode_member(&mut src, &doc, "Chirp"),
            Err(OctError::MemberNotFound { .. })
        ));
    }

    #[test]
    fn test_declared_but_absent_member() {
        let xml = header(
            "False",
            r#"<DataFile Type="Real" BytesPerPixel="4" SizeZ="4">data\Chirp.data</DataFile>"#,
        );
        let doc = parse_header(xml.as_bytes()).unwrap();
        let mut src = archive(&xml, &[]);
        assert!(matches!(
            decode_member(&mut src, &doc, "Chirp"),
            Err(OctError::MemberNotFound { .. })
        ));
    }

    #[test]
    fn test_split_channel_volume() {
        let xml = header(
            "True",
            r#"<DataFile Type="Raw" BytesPerPixel="2" SizeX="3" SizeZ="2" ApoRegionStart0="0" ApoRegionEnd0="1" ScanRegionStart0="1" ScanRegionEnd0="3">data\Spectral0.data</DataFile>"#,
        );
        let doc = parse_header(xml.as_bytes()).unwrap();
        let bytes: Vec<u8> = [-1i16, -2, 3, 4, 5, 6]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        let mut src = archive(&xml, &[("Spectral0", bytes)]);

        let volume = decode_spectral_volume(&mut src, &doc, doc.frame_count()).unwrap();
        assert_eq!(volume.element_type, ElementType::Int16);
        assert_eq!(volume.apo, DecodedVolume::I16(array![[[-1, -2]]]));
        assert_eq!(volume.scan, DecodedVolume::I16(array![[[3, 4], [5, 6]]]));
        assert!(volume.summary().contains("1 channel"));
    }
}
