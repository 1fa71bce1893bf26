//! The decoded record handed to exporters

use crate::archive::MemberSource;
use crate::canonical::{canonical_key, canonicalize};
use crate::config::DecodeOptions;
use crate::decode::{decode_member, decode_spectral_volume, SpectralVolume};
use crate::error::Result;
use crate::metadata::{DataFileEntry, HeaderDocument};
use crate::types::DecodedArray;
use crate::utils::format_bytes;
use crate::xml::TEXT_KEY;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Everything decoded from one acquisition.
///
/// Nothing is written to disk; serializing the record is left to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct OctRecording {
    /// Metadata tree, canonicalized unless disabled in [`DecodeOptions`]
    pub header: Value,
    /// `header` as a JSON string, for formats without nested mappings
    pub header_json: String,
    /// Logical name -> attributes of each data-file entry
    pub data_file_dict: Value,
    /// Frame count the spectral volume was allocated with
    pub frame_count: usize,
    pub spectral: Option<SpectralVolume>,
    /// Singly-occurring members (`Chirp`, `VideoImage`, ...)
    pub arrays: BTreeMap<String, DecodedArray>,
}

impl OctRecording {
    pub fn array(&self, name: &str) -> Option<&DecodedArray> {
        self.arrays.get(name)
    }

    /// Total size of decoded element data
    pub fn size_in_bytes(&self) -> usize {
        let spectral = self
            .spectral
            .as_ref()
            .map(|v| v.scan.size_in_bytes() + v.apo.size_in_bytes())
            .unwrap_or(0);
        spectral + self.arrays.values().map(|a| a.size_in_bytes()).sum::<usize>()
    }

    /// Get a summary string of the recording
    pub fn summary(&self) -> String {
        let spectral = match &self.spectral {
            Some(volume) => volume.summary(),
            None => "no spectral data".to_string(),
        };
        let names: Vec<&str> = self.arrays.keys().map(|k| k.as_str()).collect();
        format!(
            "{}; arrays [{}]; {} total",
            spectral,
            names.join(", "),
            format_bytes(self.size_in_bytes())
        )
    }
}

/// Decode the header tree, the spectral volume and the named members.
///
/// Named members the header does not declare are skipped. A declared member
/// missing from the source is skipped with a warning.
pub fn decode_recording<S: MemberSource + ?Sized>(
    source: &mut S,
    header: &HeaderDocument,
    options: &DecodeOptions,
) -> Result<OctRecording> {
    let tree = if options.canonicalize_header {
        header.canonical_tree(options.max_key_len)
    } else {
        header.tree().clone()
    };
    let header_json = serde_json::to_string(&tree)?;
    let data_file_dict = data_file_dict(header, options);
    let frame_count = options.resolve_frame_count(header.frame_count());

    let has_channels = header.entries().iter().any(|e| e.channel_index().is_some());
    let spectral = if options.decode_spectral && has_channels {
        Some(decode_spectral_volume(source, header, frame_count)?)
    } else {
        if options.decode_spectral {
            log::warn!("Header declares no Spectral channels");
        }
        None
    };

    let mut arrays = BTreeMap::new();
    for name in &options.named_members {
        if header.entry(name).is_none() {
            log::debug!("{} not declared, skipping", name);
            continue;
        }
        if !source.contains(name) {
            log::warn!("{} is declared in the header but missing from the source", name);
            continue;
        }
        arrays.insert(name.clone(), decode_member(source, header, name)?);
    }

    let recording = OctRecording {
        header: tree,
        header_json,
        data_file_dict,
        frame_count,
        spectral,
        arrays,
    };
    log::info!("Decoded recording: {}", recording.summary());
    Ok(recording)
}

fn data_file_dict(header: &HeaderDocument, options: &DecodeOptions) -> Value {
    let mut dict = Map::new();
    for entry in header.entries() {
        dict.insert(entry.logical_name.clone(), entry_attributes(entry, options));
    }
    Value::Object(dict)
}

fn entry_attributes(entry: &DataFileEntry, options: &DecodeOptions) -> Value {
    let mut attributes = Map::new();
    for (name, value) in &entry.attributes {
        attributes.insert(name.clone(), Value::String(value.clone()));
    }
    attributes.insert(TEXT_KEY.to_string(), Value::String(entry.path.clone()));

    let attributes = Value::Object(attributes);
    if options.canonicalize_header {
        canonicalize(&attributes, options.max_key_len)
    } else {
        attributes
    }
}

/// Canonical key under which an entry's path appears in `data_file_dict`
pub fn path_key(options: &DecodeOptions) -> String {
    if options.canonicalize_header {
        canonical_key(TEXT_KEY, options.max_key_len)
    } else {
        TEXT_KEY.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::OctArchive;
    use crate::metadata::parse_header;
    use std::io::{Cursor, Write};
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    const HEADER: &str = r#"<Ocity>
  <Instrument><RawDataIsSigned>False</RawDataIsSigned></Instrument>
  <Image><SizePixel><SizeZ>4</SizeZ></SizePixel></Image>
  <DataFiles>
    <DataFile Type="Raw" BytesPerPixel="1" SizeX="2" SizeZ="4" RangeX="1.5">data\Spectral0.data</DataFile>
    <DataFile Type="Real" BytesPerPixel="4" SizeZ="4">data\Chirp.data</DataFile>
    <DataFile Type="Colored" BytesPerPixel="4" SizeX="1" SizeZ="2">data\VideoImage.data</DataFile>
  </DataFiles>
</Ocity>"#;

    fn source(with_video: bool) -> OctArchive<Cursor<Vec<u8>>> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();
        zip.start_file("Header.xml", options).unwrap();
        zip.write_all(HEADER.as_bytes()).unwrap();
        zip.start_file("data\\Spectral0.data", options).unwrap();
        zip.write_all(&[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
        zip.start_file("data\\Chirp.data", options).unwrap();
        for v in [0.0f32, 1.0, 2.0, 3.0] {
            zip.write_all(&v.to_le_bytes()).unwrap();
        }
        if with_video {
            zip.start_file("data\\VideoImage.data", options).unwrap();
            zip.write_all(&7i32.to_le_bytes()).unwrap();
            zip.write_all(&(-7i32).to_le_bytes()).unwrap();
        }
        let mut cursor = zip.finish().unwrap();
        cursor.set_position(0);
        OctArchive::from_reader(cursor).unwrap()
    }

    #[test]
    fn test_decode_recording() {
        let header = parse_header(HEADER.as_bytes()).unwrap();
        let mut src = source(true);
        let recording = decode_recording(&mut src, &header, &DecodeOptions::default()).unwrap();

        let volume = recording.spectral.as_ref().unwrap();
        assert_eq!(volume.scan.shape(), &[1, 2, 4]);
        assert_eq!(volume.apo.shape(), &[1, 0, 4]);
        assert_eq!(recording.frame_count, 1);

        assert_eq!(recording.array("Chirp").unwrap().shape(), &[1, 4]);
        assert_eq!(recording.array("VideoImage").unwrap().shape(), &[1, 2]);
        assert!(recording.array("Intensity").is_none());

        let spectral = &recording.data_file_dict["Spectral0"];
        assert_eq!(spectral["RangeX"], "1.5");
        assert_eq!(spectral[path_key(&DecodeOptions::default())], "data\\Spectral0.data");

        let reparsed: Value = serde_json::from_str(&recording.header_json).unwrap();
        assert_eq!(reparsed, recording.header);
        assert!(recording.summary().contains("Chirp, VideoImage"));
    }

    #[test]
    fn test_missing_declared_member_is_skipped() {
        let header = parse_header(HEADER.as_bytes()).unwrap();
        let mut src = source(false);
        let options = DecodeOptions::default().with_spectral(false);
        let recording = decode_recording(&mut src, &header, &options).unwrap();

        assert!(recording.spectral.is_none());
        assert!(recording.array("VideoImage").is_none());
        assert!(recording.array("Chirp").is_some());
    }

    #[test]
    fn test_frame_count_override_and_raw_tree() {
        let header = parse_header(HEADER.as_bytes()).unwrap();
        let mut src = source(true);
        let options = DecodeOptions::default()
            .with_frame_count(3)
            .with_canonical_header(false)
            .with_named_members(Vec::<String>::new());
        let recording = decode_recording(&mut src, &header, &options).unwrap();

        assert_eq!(recording.spectral.unwrap().scan.shape(), &[3, 2, 4]);
        assert_eq!(recording.header, *header.tree());
        assert_eq!(
            recording.data_file_dict["Chirp"]["#text"],
            "data\\Chirp.data"
        );
        assert!(recording.arrays.is_empty());
    }
}
