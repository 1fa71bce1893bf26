//! Typed header metadata
//!
//! `Header.xml` is parsed once into a mapping tree (see [`crate::xml`]) and then
//! validated into a [`HeaderDocument`]. Everything downstream works on the
//! typed fields; the tree is kept only for export.

use crate::canonical;
use crate::error::{OctError, Result};
use crate::types::ElementKind;
use crate::utils::{checked_frame_len, logical_name, normalize_member_path, spectral_index};
use crate::xml::{self, as_list, lookup, TEXT_KEY};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::ops::Range;

/// Half-open `[start, end)` row range inside a member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowRange {
    pub start: usize,
    pub end: usize,
}

impl RowRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn overlaps(&self, other: &RowRange) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn as_range(&self) -> Range<usize> {
        self.start..self.end
    }
}

/// Layout descriptor for one raw member
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataFileEntry {
    /// Path as written in the header, e.g. `data\Spectral0.data`
    pub path: String,
    /// Name without directory and extension, e.g. `Spectral0`
    pub logical_name: String,
    pub element_kind: ElementKind,
    pub bytes_per_element: usize,
    /// Row count
    pub size_x: usize,
    /// Column (sample) count
    pub size_z: usize,
    pub apo_region: Option<RowRange>,
    pub scan_region: Option<RowRange>,
    /// Every attribute of the entry, without the `@` marker
    pub attributes: BTreeMap<String, String>,
}

impl DataFileEntry {
    /// Raw attribute value, e.g. `RangeX`
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(|s| s.as_str())
    }

    /// `true` when the entry declares any region metadata
    pub fn has_regions(&self) -> bool {
        self.apo_region.is_some() || self.scan_region.is_some()
    }

    /// Channel index for `Spectral{n}` entries
    pub fn channel_index(&self) -> Option<usize> {
        spectral_index(&self.logical_name)
    }

    /// Bytes occupied by one `(size_x, size_z)` frame, `None` on overflow
    pub fn frame_len(&self) -> Option<usize> {
        checked_frame_len(self.size_x, self.size_z, self.bytes_per_element)
    }
}

/// Instrument-wide flags
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InstrumentInfo {
    pub raw_data_is_signed: bool,
    pub binary_to_electron_count_scaling: Option<f64>,
}

/// Parsed and validated metadata document
#[derive(Debug, Clone, Serialize)]
pub struct HeaderDocument {
    pub root_name: String,
    pub instrument: InstrumentInfo,
    /// `Image/SizePixel/SizeY`, the index of the last frame
    pub size_y: Option<usize>,
    entries: Vec<DataFileEntry>,
    tree: Value,
}

/// Parse the raw bytes of `Header.xml`
pub fn parse_header(bytes: &[u8]) -> Result<HeaderDocument> {
    let tree = xml::parse_tree(bytes)?;
    HeaderDocument::from_tree(tree)
}

/// All entries whose path contains `name_substring`, in header order
pub fn entries_matching<'a>(header: &'a HeaderDocument, name_substring: &str) -> Vec<&'a DataFileEntry> {
    let needle = normalize_member_path(name_substring);
    header
        .entries
        .iter()
        .filter(|e| normalize_member_path(&e.path).contains(&needle))
        .collect()
}

impl HeaderDocument {
    /// Validate an already-parsed mapping tree
    pub fn from_tree(tree: Value) -> Result<Self> {
        let (root_name, root) = match tree.as_object() {
            Some(map) if map.len() == 1 => {
                let (k, v) = map.iter().next().ok_or_else(|| {
                    OctError::MetadataParse("empty metadata document".to_string())
                })?;
                (k.clone(), v.clone())
            }
            _ => {
                return Err(OctError::MetadataParse(
                    "metadata document must have exactly one root".to_string(),
                ))
            }
        };

        let instrument = parse_instrument(&root)?;
        let size_y = match lookup(&root, &["Image", "SizePixel", "SizeY"]) {
            Some(Value::Null) | None => None,
            Some(v) => Some(parse_usize(v, "Image/SizePixel/SizeY")?),
        };

        let mut entries = Vec::new();
        let mut seen = HashSet::new();
        if let Some(files) = lookup(&root, &["DataFiles", "DataFile"]) {
            for node in as_list(files) {
                let entry = parse_entry(node)?;
                if !seen.insert(entry.logical_name.clone()) {
                    return Err(OctError::MetadataParse(format!(
                        "data file {} declared more than once",
                        entry.logical_name
                    )));
                }
                entries.push(entry);
            }
        }

        Ok(Self {
            root_name,
            instrument,
            size_y,
            entries,
            tree,
        })
    }

    pub fn raw_data_is_signed(&self) -> bool {
        self.instrument.raw_data_is_signed
    }

    /// Number of frames along Y; `SizeY` holds the last index, so add one
    pub fn frame_count(&self) -> usize {
        self.size_y.map(|y| y.saturating_add(1)).unwrap_or(1)
    }

    pub fn entries(&self) -> &[DataFileEntry] {
        &self.entries
    }

    /// Exact lookup by logical name or header path
    pub fn entry(&self, name: &str) -> Option<&DataFileEntry> {
        let name = logical_name(name);
        self.entries.iter().find(|e| e.logical_name == name)
    }

    pub fn entries_matching(&self, name_substring: &str) -> Vec<&DataFileEntry> {
        entries_matching(self, name_substring)
    }

    /// One property of every matching entry; `#text` yields the path
    pub fn entry_properties(&self, name_substring: &str, prop: &str) -> Vec<Option<&str>> {
        let prop = canonical::strip_marker(prop);
        self.entries_matching(name_substring)
            .into_iter()
            .map(|e| {
                if prop == canonical::strip_marker(TEXT_KEY) {
                    Some(e.path.as_str())
                } else {
                    e.attribute(prop)
                }
            })
            .collect()
    }

    pub fn logical_names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.logical_name.as_str()).collect()
    }

    /// The uncanonicalized metadata tree
    pub fn tree(&self) -> &Value {
        &self.tree
    }

    /// Metadata tree with export-safe keys
    pub fn canonical_tree(&self, max_key_len: usize) -> Value {
        canonical::canonicalize(&self.tree, max_key_len)
    }
}

fn parse_instrument(root: &Value) -> Result<InstrumentInfo> {
    let raw_data_is_signed = match lookup(root, &["Instrument", "RawDataIsSigned"]) {
        Some(Value::String(s)) => match s.as_str() {
            "True" => true,
            "False" => false,
            other => {
                return Err(OctError::MetadataParse(format!(
                    "Instrument/RawDataIsSigned must be \"True\" or \"False\", got {:?}",
                    other
                )))
            }
        },
        Some(other) => {
            return Err(OctError::MetadataParse(format!(
                "Instrument/RawDataIsSigned must be text, got {}",
                other
            )))
        }
        None => {
            log::warn!("Header has no Instrument/RawDataIsSigned; treating raw data as unsigned");
            false
        }
    };

    let binary_to_electron_count_scaling =
        match lookup(root, &["Instrument", "BinaryToElectronCountScaling"]) {
            Some(Value::Null) | None => None,
            Some(v) => Some(parse_f64(v, "Instrument/BinaryToElectronCountScaling")?),
        };

    Ok(InstrumentInfo {
        raw_data_is_signed,
        binary_to_electron_count_scaling,
    })
}

fn parse_entry(node: &Value) -> Result<DataFileEntry> {
    let map = node.as_object().ok_or_else(|| {
        OctError::MetadataParse(format!("DataFile entry must carry attributes, got {}", node))
    })?;

    let path = map
        .get(TEXT_KEY)
        .and_then(Value::as_str)
        .ok_or_else(|| OctError::MetadataParse("DataFile entry without a path".to_string()))?
        .to_string();
    let name = logical_name(&path);

    let mut attributes = BTreeMap::new();
    for (k, v) in map {
        if let (Some(key), Some(value)) = (k.strip_prefix(xml::ATTRIBUTE_MARKER), v.as_str()) {
            attributes.insert(key.to_string(), value.to_string());
        }
    }

    let element_kind = ElementKind::parse(required_attr(&attributes, &name, "Type")?);
    let bytes_per_element = attr_int(&name, "BytesPerPixel", required_attr(&attributes, &name, "BytesPerPixel")?)?;
    let size_z = attr_int(&name, "SizeZ", required_attr(&attributes, &name, "SizeZ")?)?;
    let size_x = optional_attr_int(&attributes, &name, "SizeX")?.unwrap_or(1);

    let region = |prefix: &str| -> Result<Option<RowRange>> {
        let start_key = format!("{}RegionStart0", prefix);
        let end_key = format!("{}RegionEnd0", prefix);
        match (
            optional_attr_int(&attributes, &name, &start_key)?,
            optional_attr_int(&attributes, &name, &end_key)?,
        ) {
            (Some(start), Some(end)) => {
                if start > end || end > size_x {
                    return Err(OctError::MetadataParse(format!(
                        "DataFile {}: {} region [{}, {}) outside [0, {})",
                        name, prefix, start, end, size_x
                    )));
                }
                Ok(Some(RowRange::new(start, end)))
            }
            (None, None) => Ok(None),
            _ => Err(OctError::MetadataParse(format!(
                "DataFile {}: {} and {} must be declared together",
                name, start_key, end_key
            ))),
        }
    };
    let apo_region = region("Apo")?;
    let scan_region = region("Scan")?;

    if let (Some(apo), Some(scan)) = (&apo_region, &scan_region) {
        if apo.overlaps(scan) {
            return Err(OctError::MetadataParse(format!(
                "DataFile {}: apodization rows {:?} overlap scan rows {:?}",
                name,
                apo.as_range(),
                scan.as_range()
            )));
        }
    }

    Ok(DataFileEntry {
        path,
        logical_name: name,
        element_kind,
        bytes_per_element,
        size_x,
        size_z,
        apo_region,
        scan_region,
        attributes,
    })
}

fn required_attr<'a>(attributes: &'a BTreeMap<String, String>, name: &str, key: &str) -> Result<&'a str> {
    attributes.get(key).map(|s| s.as_str()).ok_or_else(|| {
        OctError::MetadataParse(format!("DataFile {} is missing attribute {}", name, key))
    })
}

fn attr_int(name: &str, key: &str, text: &str) -> Result<usize> {
    text.trim().parse().map_err(|_| {
        OctError::MetadataParse(format!(
            "DataFile {}: attribute {} is not an integer: {:?}",
            name, key, text
        ))
    })
}

fn optional_attr_int(attributes: &BTreeMap<String, String>, name: &str, key: &str) -> Result<Option<usize>> {
    attributes
        .get(key)
        .map(|text| attr_int(name, key, text))
        .transpose()
}

fn parse_usize(value: &Value, what: &str) -> Result<usize> {
    value
        .as_str()
        .and_then(|s| s.trim().parse().ok())
        .ok_or_else(|| OctError::MetadataParse(format!("{} is not an integer: {}", what, value)))
}

fn parse_f64(value: &Value, what: &str) -> Result<f64> {
    value
        .as_str()
        .and_then(|s| s.trim().parse().ok())
        .ok_or_else(|| OctError::MetadataParse(format!("{} is not a number: {}", what, value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<Ocity>
  <Instrument>
    <RawDataIsSigned>True</RawDataIsSigned>
    <BinaryToElectronCountScaling>2.5</BinaryToElectronCountScaling>
  </Instrument>
  <Image>
    <SizePixel><SizeX>8</SizeX><SizeY>3</SizeY><SizeZ>4</SizeZ></SizePixel>
  </Image>
  <MetaInfo><Comment/></MetaInfo>
  <DataFiles>
    <DataFile Type="Raw" BytesPerPixel="2" SizeX="8" SizeZ="4" ApoRegionStart0="0" ApoRegionEnd0="2" ScanRegionStart0="2" ScanRegionEnd0="8" RangeX="1.5">data\Spectral0.data</DataFile>
    <DataFile Type="Real" BytesPerPixel="4" SizeZ="4">data\Chirp.data</DataFile>
    <DataFile Type="Raw" BytesPerPixel="2" SizeX="6" SizeZ="4">data\Spectral1.data</DataFile>
  </DataFiles>
</Ocity>"#;

    fn header_with_entry(entry: &str) -> String {
        format!(
            "<Ocity><Instrument><RawDataIsSigned>False</RawDataIsSigned></Instrument><DataFiles>{}</DataFiles></Ocity>",
            entry
        )
    }

    #[test]
    fn test_parse_header() {
        let doc = parse_header(HEADER.as_bytes()).unwrap();
        assert_eq!(doc.root_name, "Ocity");
        assert!(doc.raw_data_is_signed());
        assert_eq!(doc.instrument.binary_to_electron_count_scaling, Some(2.5));
        assert_eq!(doc.size_y, Some(3));
        assert_eq!(doc.frame_count(), 4);
        assert_eq!(doc.logical_names(), vec!["Spectral0", "Chirp", "Spectral1"]);

        let s0 = doc.entry("Spectral0").unwrap();
        assert_eq!(s0.element_kind, ElementKind::Raw);
        assert_eq!(s0.bytes_per_element, 2);
        assert_eq!((s0.size_x, s0.size_z), (8, 4));
        assert_eq!(s0.apo_region, Some(RowRange::new(0, 2)));
        assert_eq!(s0.scan_region, Some(RowRange::new(2, 8)));
        assert_eq!(s0.attribute("RangeX"), Some("1.5"));
        assert_eq!(s0.channel_index(), Some(0));
        assert_eq!(s0.frame_len(), Some(8 * 4 * 2));

        let chirp = doc.entry("data\\Chirp.data").unwrap();
        assert_eq!(chirp.size_x, 1);
        assert_eq!(chirp.element_kind, ElementKind::Real);
    }

    #[test]
    fn test_entries_matching_keeps_order() {
        let doc = parse_header(HEADER.as_bytes()).unwrap();
        let names: Vec<_> = entries_matching(&doc, "Spectral")
            .iter()
            .map(|e| e.logical_name.as_str())
            .collect();
        assert_eq!(names, vec!["Spectral0", "Spectral1"]);
        assert_eq!(doc.entries_matching("data\\Chirp").len(), 1);
        assert!(doc.entries_matching("Intensity").is_empty());
    }

    #[test]
    fn test_entry_properties() {
        let doc = parse_header(HEADER.as_bytes()).unwrap();
        assert_eq!(
            doc.entry_properties("Spectral", "@Type"),
            vec![Some("Raw"), Some("Raw")]
        );
        assert_eq!(
            doc.entry_properties("Chirp", "#text"),
            vec![Some("data\\Chirp.data")]
        );
    }

    #[test]
    fn test_signed_flag_is_case_sensitive() {
        let xml = "<Ocity><Instrument><RawDataIsSigned>true</RawDataIsSigned></Instrument></Ocity>";
        assert!(matches!(parse_header(xml.as_bytes()), Err(OctError::MetadataParse(_))));
    }

    #[test]
    fn test_single_entry_not_a_list() {
        let xml = header_with_entry(
            r#"<DataFile Type="Colored" BytesPerPixel="4" SizeX="2" SizeZ="2">data\VideoImage.data</DataFile>"#,
        );
        let doc = parse_header(xml.as_bytes()).unwrap();
        assert_eq!(doc.entries().len(), 1);
        assert!(!doc.raw_data_is_signed());
        assert_eq!(doc.frame_count(), 1);
    }

    #[test]
    fn test_overlapping_regions_rejected() {
        let xml = header_with_entry(
            r#"<DataFile Type="Raw" BytesPerPixel="2" SizeX="8" SizeZ="4" ApoRegionStart0="0" ApoRegionEnd0="3" ScanRegionStart0="2" ScanRegionEnd0="8">data\Spectral0.data</DataFile>"#,
        );
        assert!(matches!(parse_header(xml.as_bytes()), Err(OctError::MetadataParse(_))));
    }

    #[test]
    fn test_region_out_of_bounds_rejected() {
        let xml = header_with_entry(
            r#"<DataFile Type="Raw" BytesPerPixel="2" SizeX="8" SizeZ="4" ScanRegionStart0="2" ScanRegionEnd0="9">data\Spectral0.data</DataFile>"#,
        );
        assert!(matches!(parse_header(xml.as_bytes()), Err(OctError::MetadataParse(_))));
    }

    #[test]
    fn test_half_declared_region_rejected() {
        let xml = header_with_entry(
            r#"<DataFile Type="Raw" BytesPerPixel="2" SizeX="8" SizeZ="4" ApoRegionStart0="0">data\Spectral0.data</DataFile>"#,
        );
        assert!(matches!(parse_header(xml.as_bytes()), Err(OctError::MetadataParse(_))));
    }

    #[test]
    fn test_duplicate_entry_rejected() {
        let entry = r#"<DataFile Type="Real" BytesPerPixel="4" SizeZ="4">data\Chirp.data</DataFile>"#;
        let xml = header_with_entry(&format!("{}{}", entry, entry));
        assert!(matches!(parse_header(xml.as_bytes()), Err(OctError::MetadataParse(_))));
    }

    #[test]
    fn test_non_integer_size_rejected() {
        let xml = header_with_entry(
            r#"<DataFile Type="Real" BytesPerPixel="4" SizeZ="four">data\Chirp.data</DataFile>"#,
        );
        let err = parse_header(xml.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("SizeZ"));
    }

    #[test]
    fn test_canonical_tree_keeps_lookup_tree() {
        let doc = parse_header(HEADER.as_bytes()).unwrap();
        let canonical = doc.canonical_tree(30);
        assert!(lookup(&canonical, &["Ocity", "DataFiles", "DataFile"]).is_some());
        let first = &canonical["Ocity"]["DataFiles"]["DataFile"][0];
        assert_eq!(first["Type"], "Raw");
        assert_eq!(first["text"], "data\\Spectral0.data");
        // the original tree is untouched
        assert_eq!(doc.tree()["Ocity"]["DataFiles"]["DataFile"][0]["@Type"], "Raw");
        assert!(canonical["Ocity"]["MetaInfo"]["Comment"].is_null());
    }
}
