use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use crate::catalog::metadata::MetadataExtractor;
use crate::common::constants::{DEFAULT_IGNORED_DIRS, IGNORED_FILE_NAMES};
use crate::file::path::{extension_lowercase, join, normalize_name, relative_catalog_path};
use crate::file::{Entry, EntryError, EntryKind};
use crate::utils::hash::{hash_file, HashError};
use crate::utils::time::system_time_to_millis;

/// Defines errors that can occur while scanning a directory.
//
// // 定义扫描目录时可能发生的错误。
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    /// The directory to scan does not exist or is not a directory.
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("Failed to walk directory: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Hashing failed: {0}")]
    Hash(#[from] HashError),

    #[error("Invalid entry: {0}")]
    Entry(#[from] EntryError),
}

/// A classified file found on disk, not yet hashed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskFile {
    pub absolute_path: PathBuf,
    /// Catalog directory, relative to the scanner base.
    pub path: String,
    pub name: String,
    pub size: u64,
    pub modified: i64,
    pub kind: EntryKind,
}

impl DiskFile {
    pub fn full_path(&self) -> String {
        join(&self.path, &self.name)
    }
}

/// Result of listing a directory without hashing.
#[derive(Debug, Default)]
pub struct DiskListing {
    /// Accepted files, sorted by catalog path.
    pub files: Vec<DiskFile>,
    pub accepted_extensions: BTreeSet<String>,
    pub rejected_extensions: BTreeSet<String>,
    /// Zero-byte files of an accepted kind.
    pub rejected_paths: Vec<PathBuf>,
}

/// Result of a full scan.
#[derive(Debug, Default)]
pub struct ScanReport {
    pub entries: Vec<Entry>,
    pub accepted_extensions: BTreeSet<String>,
    pub rejected_extensions: BTreeSet<String>,
    pub rejected_paths: Vec<PathBuf>,
    /// Files that could not be read while hashing.
    pub unreadable: Vec<PathBuf>,
}

/// Turns files on disk into catalog entries.
///
/// Hidden files, `.DS_Store` and ignored directories are skipped. Files whose
/// extension matches no known kind are only recorded by extension, zero-byte
/// files only by path; neither ever becomes an [`Entry`].
//
// // 将磁盘上的文件转换为目录条目。
#[derive(Debug, Clone)]
pub struct DirectoryScanner {
    dir: PathBuf,
    base: PathBuf,
    recursive: bool,
    ignored_dirs: Vec<String>,
}

impl DirectoryScanner {
    /// Scans `dir`; catalog paths are relative to `dir` itself.
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
            base: dir.to_path_buf(),
            recursive: false,
            ignored_dirs: DEFAULT_IGNORED_DIRS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Computes catalog paths relative to `base` instead of the scanned directory.
    pub fn relative_to(mut self, base: &Path) -> Self {
        self.base = base.to_path_buf();
        self
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    pub fn ignored_dirs(mut self, ignored_dirs: &[String]) -> Self {
        self.ignored_dirs = ignored_dirs.to_vec();
        self
    }

    fn is_skipped(&self, item: &DirEntry) -> bool {
        // the scan root itself is never skipped, even if its name starts with a dot
        if item.depth() == 0 {
            return false;
        }
        let name = item.file_name().to_string_lossy();
        if name.starts_with('.') || IGNORED_FILE_NAMES.contains(&&*name) {
            return true;
        }
        item.file_type().is_dir() && self.ignored_dirs.iter().any(|d| d.as_str() == name)
    }

    /// Lists and classifies files without reading their contents.
    pub fn list(&self) -> Result<DiskListing, ScanError> {
        if !self.dir.is_dir() {
            return Err(ScanError::NotADirectory(self.dir.clone()));
        }

        let mut listing = DiskListing::default();
        let walker = WalkDir::new(&self.dir)
            .max_depth(if self.recursive { usize::MAX } else { 1 })
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !self.is_skipped(e));

        for item in walker {
            let item = item?;
            if !item.file_type().is_file() {
                continue;
            }
            let file_name = normalize_name(&item.file_name().to_string_lossy());
            let Some(kind) = EntryKind::classify(&file_name) else {
                match extension_lowercase(&file_name) {
                    Some(ext) => {
                        debug!(file = %item.path().display(), %ext, "unsupported type");
                        listing.rejected_extensions.insert(ext);
                    }
                    None => debug!(file = %item.path().display(), "no extension"),
                }
                continue;
            };

            let metadata = item.metadata()?;
            if metadata.len() == 0 {
                warn!(file = %item.path().display(), "zero-byte file rejected");
                listing.rejected_paths.push(item.path().to_path_buf());
                continue;
            }

            let parent = item.path().parent().unwrap_or(&self.dir);
            let Some(path) = relative_catalog_path(&self.base, parent) else {
                warn!(file = %item.path().display(), base = %self.base.display(), "outside of the scan base");
                continue;
            };

            if let Some(ext) = extension_lowercase(&file_name) {
                listing.accepted_extensions.insert(ext);
            }
            listing.files.push(DiskFile {
                absolute_path: item.path().to_path_buf(),
                path,
                name: file_name,
                size: metadata.len(),
                modified: system_time_to_millis(metadata.modified()?),
                kind,
            });
        }

        listing.files.sort_by_key(|f| f.full_path());
        Ok(listing)
    }

    /// Hashes one listed file and attaches extracted metadata.
    pub fn load_entry(
        &self,
        file: &DiskFile,
        extractor: &dyn MetadataExtractor,
    ) -> Result<Entry, ScanError> {
        let checksum = hash_file(&file.absolute_path)?;
        let mut entry = Entry::new(&file.name, &file.path, file.size, file.modified, checksum)?;
        entry.original_path = Some(file.absolute_path.clone());
        extractor.extract(&file.absolute_path, file.kind).apply_to(&mut entry);
        Ok(entry)
    }

    /// Lists, hashes and extracts every accepted file.
    pub fn scan(&self, extractor: &dyn MetadataExtractor) -> Result<ScanReport, ScanError> {
        let listing = self.list()?;
        let mut report = ScanReport {
            entries: Vec::with_capacity(listing.files.len()),
            accepted_extensions: listing.accepted_extensions,
            rejected_extensions: listing.rejected_extensions,
            rejected_paths: listing.rejected_paths,
            unreadable: Vec::new(),
        };

        for file in &listing.files {
            match self.load_entry(file, extractor) {
                Ok(entry) => report.entries.push(entry),
                // truncated between listing and hashing
                Err(ScanError::Hash(HashError::ZeroSize)) => {
                    report.rejected_paths.push(file.absolute_path.clone())
                }
                Err(e) => {
                    warn!(file = %file.absolute_path.display(), error = %e, "unreadable file skipped");
                    report.unreadable.push(file.absolute_path.clone());
                }
            }
        }

        debug!(
            dir = %self.dir.display(),
            entries = report.entries.len(),
            rejected = report.rejected_paths.len(),
            "scan finished"
        );
        Ok(report)
    }
}

/// Reads size and modification time of a single file.
pub(crate) fn stat(path: &Path) -> Result<(u64, i64), std::io::Error> {
    let metadata = fs::metadata(path)?;
    Ok((metadata.len(), system_time_to_millis(metadata.modified()?)))
}
