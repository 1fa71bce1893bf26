//! Member sources - the zip container and already-extracted folders

use crate::error::{OctError, Result};
use crate::utils::{
    format_bytes, logical_name, member_path, normalize_member_path, DATA_DIR, DATA_EXTENSION, HEADER_NAME,
};
use bytes::Bytes;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufReader, Read, Seek};
use std::path::{Path, PathBuf};
use zip::ZipArchive;

/// Most bytes reserved up front from a member's declared size
const MAX_PREALLOC: u64 = 64 * 1024 * 1024;

/// Initial buffer capacity for a member; the declared size is not trusted
fn prealloc_hint(declared: u64) -> usize {
    usize::try_from(declared.min(MAX_PREALLOC)).unwrap_or(0)
}

/// Source types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Zip-format `.oct` container
    Archive,
    /// Folder holding the extracted members
    Directory,
}

/// Read access to the header and raw members of one OCT acquisition.
///
/// Member names may be given as logical names (`Spectral0`) or as header
/// paths with either separator (`data\Spectral0.data`).
pub trait MemberSource {
    /// Read a raw member's bytes
    fn read_member(&mut self, name: &str) -> Result<Bytes>;

    /// Read the metadata document
    fn read_header(&mut self) -> Result<Bytes>;

    /// Member names in storage order
    fn list_members(&self) -> Vec<String>;

    /// Check if a member exists
    fn contains(&self, name: &str) -> bool;

    /// Uncompressed size of a member
    fn member_size(&self, name: &str) -> Result<u64>;

    fn kind(&self) -> SourceKind;
}

struct MemberInfo {
    index: usize,
    size: u64,
}

/// An open `.oct` container.
///
/// The underlying file is closed when the archive is dropped.
pub struct OctArchive<R: Read + Seek> {
    archive: ZipArchive<R>,
    names: Vec<String>,
    by_logical_name: HashMap<String, MemberInfo>,
    header_index: Option<usize>,
}

impl OctArchive<BufReader<File>> {
    /// Open a container on disk
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| OctError::ArchiveOpen {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let archive = Self::from_reader_named(BufReader::new(file), &path.display().to_string())?;
        log::info!(
            "Opened {} ({} members)",
            path.display(),
            archive.names.len()
        );
        Ok(archive)
    }
}

impl<R: Read + Seek> OctArchive<R> {
    /// Open a container from any seekable reader, e.g. an in-memory cursor
    pub fn from_reader(reader: R) -> Result<Self> {
        Self::from_reader_named(reader, "<reader>")
    }

    fn from_reader_named(reader: R, label: &str) -> Result<Self> {
        let mut archive = ZipArchive::new(reader).map_err(|e| OctError::ArchiveOpen {
            path: label.to_string(),
            reason: e.to_string(),
        })?;

        let mut names = Vec::with_capacity(archive.len());
        let mut by_logical_name = HashMap::new();
        let mut header_index = None;
        for index in 0..archive.len() {
            let file = archive.by_index_raw(index).map_err(|e| OctError::ArchiveOpen {
                path: label.to_string(),
                reason: e.to_string(),
            })?;
            if file.is_dir() {
                continue;
            }
            let name = file.name().to_string();
            let normalized = normalize_member_path(&name);
            if normalized.eq_ignore_ascii_case(HEADER_NAME) {
                header_index = Some(index);
            } else {
                by_logical_name.insert(
                    logical_name(&name),
                    MemberInfo {
                        index,
                        size: file.size(),
                    },
                );
            }
            names.push(name);
        }

        Ok(Self {
            archive,
            names,
            by_logical_name,
            header_index,
        })
    }

    fn read_index(&mut self, index: usize, label: &str) -> Result<Bytes> {
        let mut file = self.archive.by_index(index)?;
        let mut data = Vec::with_capacity(prealloc_hint(file.size()));
        file.read_to_end(&mut data)?;
        log::debug!("Read {} ({})", label, format_bytes(data.len()));
        Ok(Bytes::from(data))
    }

    fn lookup(&self, name: &str) -> Result<&MemberInfo> {
        let key = logical_name(name);
        self.by_logical_name
            .get(&key)
            .ok_or_else(|| OctError::member_not_found(key, &self.names))
    }
}

impl<R: Read + Seek> MemberSource for OctArchive<R> {
    fn read_member(&mut self, name: &str) -> Result<Bytes> {
        let index = self.lookup(name)?.index;
        self.read_index(index, name)
    }

    fn read_header(&mut self) -> Result<Bytes> {
        let index = self
            .header_index
            .ok_or_else(|| OctError::member_not_found(HEADER_NAME, &self.names))?;
        self.read_index(index, HEADER_NAME)
    }

    fn list_members(&self) -> Vec<String> {
        self.names.clone()
    }

    fn contains(&self, name: &str) -> bool {
        self.by_logical_name.contains_key(&logical_name(name))
    }

    fn member_size(&self, name: &str) -> Result<u64> {
        Ok(self.lookup(name)?.size)
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Archive
    }
}

/// Members already extracted into a folder.
///
/// Extracting a container authored with `\` separators on a `/` host leaves
/// files literally named `data\Spectral0.data`; both that and
/// `data/Spectral0.data` are accepted.
pub struct DirectorySource {
    base_path: PathBuf,
}

impl DirectorySource {
    pub fn new(base_path: impl AsRef<Path>) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
        }
    }

    fn candidates(&self, name: &str) -> [PathBuf; 2] {
        let file_name = format!("{}{}", logical_name(name), DATA_EXTENSION);
        [
            self.base_path.join(member_path(name)),
            self.base_path.join(format!("{}\\{}", DATA_DIR, file_name)),
        ]
    }

    fn resolve(&self, name: &str) -> Result<PathBuf> {
        self.candidates(name)
            .into_iter()
            .find(|p| p.is_file())
            .ok_or_else(|| OctError::member_not_found(logical_name(name), self.list_members()))
    }
}

impl MemberSource for DirectorySource {
    fn read_member(&mut self, name: &str) -> Result<Bytes> {
        let path = self.resolve(name)?;
        let data = fs::read(&path)?;
        log::debug!("Read {} ({})", path.display(), format_bytes(data.len()));
        Ok(Bytes::from(data))
    }

    fn read_header(&mut self) -> Result<Bytes> {
        let path = self.base_path.join(HEADER_NAME);
        if !path.is_file() {
            return Err(OctError::member_not_found(HEADER_NAME, self.list_members()));
        }
        Ok(Bytes::from(fs::read(path)?))
    }

    fn list_members(&self) -> Vec<String> {
        let mut entries = Vec::new();
        let mut collect = |dir: &Path, prefix: &str| {
            if let Ok(read_dir) = fs::read_dir(dir) {
                for entry in read_dir.flatten() {
                    if entry.path().is_file() {
                        if let Some(name) = entry.file_name().to_str() {
                            entries.push(format!("{}{}", prefix, name));
                        }
                    }
                }
            }
        };
        collect(&self.base_path, "");
        collect(&self.base_path.join(DATA_DIR), "data/");
        entries.sort();
        entries
    }

    fn contains(&self, name: &str) -> bool {
        self.resolve(name).is_ok()
    }

    fn member_size(&self, name: &str) -> Result<u64> {
        Ok(fs::metadata(self.resolve(name)?)?.len())
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Directory
    }
}
