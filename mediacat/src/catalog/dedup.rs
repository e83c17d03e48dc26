use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::catalog::{tolerate_missing, Mirrors};
use crate::common::hash::CatalogHash;
use crate::file::path::normalize_catalog_path;
use crate::index::{Document, Field, Filter, IndexError, IndexStore};
use crate::storage::{BlobError, BlobStore};
use crate::utils::time::is_timestamp_name;

#[derive(Debug, thiserror::Error)]
pub enum DedupError {
    #[error("Index error: {0}")]
    Index(#[from] IndexError),
}

/// Which documents to look at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DedupScope {
    /// One logical directory.
    Directory(String),
    /// Every directory of the catalog, one at a time.
    All,
}

/// One set of documents sharing `(path, checksum)`.
#[derive(Debug, Clone)]
pub struct DuplicateGroup {
    pub path: String,
    pub checksum: CatalogHash,
    pub kept: Document,
    /// Removed from the index and from disk (or planned to be, in a dry run).
    pub deleted: Vec<Document>,
    /// Kept because removing a physical copy failed.
    pub retained: Vec<Document>,
}

#[derive(Debug, Default)]
pub struct DedupReport {
    pub groups: Vec<DuplicateGroup>,
    pub dry_run: bool,
}

impl DedupReport {
    pub fn deleted_count(&self) -> usize {
        self.groups.iter().map(|g| g.deleted.len()).sum()
    }

    pub fn retained_count(&self) -> usize {
        self.groups.iter().map(|g| g.retained.len()).sum()
    }
}

/// Removes redundant copies of the same content filed in the same directory.
///
/// Documents are grouped by `(path, checksum)`. In every group one member
/// survives: the smallest canonical timestamp name if there is one,
/// otherwise the smallest name. The others lose their physical file first
/// and their index document second; if a file cannot be removed for any
/// reason other than "not found", its document stays.
//
// // 清除同一目录下内容相同的重复文件。
#[derive(Debug)]
pub struct DirectoryDeduplicator<'a> {
    index: &'a dyn IndexStore,
    disk: &'a dyn BlobStore,
    mirrors: Mirrors<'a>,
    dry_run: bool,
}

impl<'a> DirectoryDeduplicator<'a> {
    pub fn new(index: &'a dyn IndexStore, disk: &'a dyn BlobStore) -> Self {
        Self {
            index,
            disk,
            mirrors: Mirrors::none(),
            dry_run: false,
        }
    }

    /// Also removes the mirror copies of deleted documents.
    pub fn with_mirrors(mut self, mirrors: Mirrors<'a>) -> Self {
        self.mirrors = mirrors;
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn find_and_resolve(&self, scope: &DedupScope) -> Result<DedupReport, DedupError> {
        let directories = match scope {
            DedupScope::Directory(dir) => vec![normalize_catalog_path(dir)],
            DedupScope::All => self.index.aggregate_distinct(Field::Path)?,
        };

        let mut report = DedupReport {
            groups: Vec::new(),
            dry_run: self.dry_run,
        };
        for dir in directories {
            let docs = self.index.scan(&Filter::Directory(dir))?;
            for (kept, duplicates) in plan_groups(docs) {
                report.groups.push(self.resolve(kept, duplicates)?);
            }
        }

        info!(
            groups = report.groups.len(),
            deleted = report.deleted_count(),
            retained = report.retained_count(),
            dry_run = self.dry_run,
            "deduplication finished"
        );
        Ok(report)
    }

    fn resolve(&self, kept: Document, duplicates: Vec<Document>) -> Result<DuplicateGroup, DedupError> {
        let mut group = DuplicateGroup {
            path: kept.entry.path.clone(),
            checksum: kept.entry.checksum,
            kept,
            deleted: Vec::new(),
            retained: Vec::new(),
        };

        for doc in duplicates {
            debug!(
                keep = %group.kept.entry.full_path(),
                drop = %doc.entry.full_path(),
                dry_run = self.dry_run,
                "duplicate"
            );
            if self.dry_run {
                group.deleted.push(doc);
                continue;
            }
            if let Err(e) = self.remove_physical(&doc) {
                warn!(path = %doc.entry.full_path(), error = %e, "could not remove copy, keeping document");
                group.retained.push(doc);
                continue;
            }
            self.index.delete(doc.id)?;
            group.deleted.push(doc);
        }
        Ok(group)
    }

    fn remove_physical(&self, doc: &Document) -> Result<(), BlobError> {
        tolerate_missing(self.disk.delete(&doc.entry.full_path()))?;
        self.mirrors.remove_copies(&doc.entry)
    }
}

/// Groups documents of one directory and picks the survivor of every group
/// with more than one member.
pub fn plan_groups(docs: Vec<Document>) -> Vec<(Document, Vec<Document>)> {
    let mut groups: BTreeMap<(String, CatalogHash), Vec<Document>> = BTreeMap::new();
    for doc in docs {
        let key = (doc.entry.path.clone(), doc.entry.checksum);
        groups.entry(key).or_default().push(doc);
    }

    groups
        .into_values()
        .filter(|members| members.len() > 1)
        .map(|mut members| {
            let keep = keeper_index(&members);
            let kept = members.remove(keep);
            (kept, members)
        })
        .collect()
}

/// Position of the member to keep.
fn keeper_index(members: &[Document]) -> usize {
    let rank = |doc: &Document| (!is_timestamp_name(&doc.entry.name), doc.entry.name.clone(), doc.id);
    members
        .iter()
        .enumerate()
        .min_by_key(|(_, doc)| rank(doc))
        .map(|(i, _)| i)
        .unwrap_or(0)
}
