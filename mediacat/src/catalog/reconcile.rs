//! Three-way reconciliation between the index and the disk origin.
//!
//! Every catalog document below a scope is classified against the files on
//! disk below the same scope:
//!
//! | State     | Condition                                              | Action                          |
//! |-----------|--------------------------------------------------------|---------------------------------|
//! | in sync   | the document's file exists                             | patch size/modified/checksum on drift |
//! | moved     | missing, an uncatalogued disk file has its checksum    | patch path/name, id kept        |
//! | redundant | missing, another document has its content on disk      | delete the document only        |
//! | orphan    | missing, content found nowhere                         | confirm, delete document and mirror copies |
//! | new       | disk file without document and not claimed by a move   | confirm, ingest                 |
//!
//! Paths are compared in Unicode NFC. Each mutation is derived from the
//! comparison alone, so an interrupted run leaves nothing half-applied.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::catalog::ingest::{IngestOptions, IngestionStore};
use crate::catalog::metadata::{MetadataExtractor, NoMetadata};
use crate::catalog::scan::{stat, DirectoryScanner, DiskFile, ScanError};
use crate::catalog::Mirrors;
use crate::common::constants::DEFAULT_IGNORED_DIRS;
use crate::common::hash::CatalogHash;
use crate::file::path::{is_within, normalize_catalog_path};
use crate::file::{Entry, EntryError, EntryPatch};
use crate::index::{Document, Field, Filter, IndexError, IndexStore};
use crate::utils::hash::hash_file;

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Scan error: {0}")]
    Scan(#[from] ScanError),
}

/// An irreversible step that needs a decision before it is taken.
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileAction {
    /// Delete an orphaned document together with its mirror copies.
    DeleteOrphan(Entry),
    /// Ingest a file that has no document.
    IngestNew(DiskFile),
}

impl fmt::Display for ReconcileAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReconcileAction::DeleteOrphan(entry) => write!(
                f,
                "'{}' is catalogued but found nowhere on disk. Delete it from the catalog?",
                entry.full_path()
            ),
            ReconcileAction::IngestNew(file) => write!(
                f,
                "'{}' is on disk but not catalogued. Add it?",
                file.full_path()
            ),
        }
    }
}

/// Decides whether a [`ReconcileAction`] is carried out.
pub trait Confirm {
    fn confirm(&self, action: &ReconcileAction) -> bool;
}

/// Approves everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct AutoApprove;

impl Confirm for AutoApprove {
    fn confirm(&self, _action: &ReconcileAction) -> bool {
        true
    }
}

/// Rejects everything: only moves, drift and redundant documents are fixed.
#[derive(Debug, Default, Clone, Copy)]
pub struct AutoReject;

impl Confirm for AutoReject {
    fn confirm(&self, _action: &ReconcileAction) -> bool {
        false
    }
}

/// Asks on the terminal. Anything but `y`/`yes` (or a read error) is a no.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsolePrompt;

impl Confirm for ConsolePrompt {
    fn confirm(&self, action: &ReconcileAction) -> bool {
        match confirm_action(&action.to_string()) {
            Ok(answer) => answer,
            Err(e) => {
                warn!(error = %e, "could not read confirmation, declining");
                false
            }
        }
    }
}

impl<F> Confirm for F
where
    F: Fn(&ReconcileAction) -> bool,
{
    fn confirm(&self, action: &ReconcileAction) -> bool {
        self(action)
    }
}

/// 向用户请求确认操作
fn confirm_action(prompt: &str) -> Result<bool, io::Error> {
    print!("{} [y/N]: ", prompt);
    io::stdout().flush()?;
    let mut confirmation = String::new();
    io::stdin().read_line(&mut confirmation)?;
    Ok(confirmation.trim().eq_ignore_ascii_case("y")
        || confirmation.trim().eq_ignore_ascii_case("yes"))
}

/// What one reconciliation run found and did. In a dry run the lists hold
/// what would have been done.
#[derive(Debug, Default)]
pub struct ReconcileReport {
    pub dry_run: bool,
    pub in_sync: usize,
    /// Documents patched for size/modified/checksum drift.
    pub updated: Vec<String>,
    /// `(old, new)` full paths of moved documents.
    pub moved: Vec<(String, String)>,
    /// Deleted duplicate documents.
    pub redundant: Vec<String>,
    /// Orphaned documents detected.
    pub orphans: Vec<String>,
    /// Orphans actually deleted.
    pub orphans_deleted: Vec<String>,
    /// Uncatalogued disk files detected.
    pub new_files: Vec<String>,
    /// New files written to the index.
    pub ingested: Vec<String>,
    /// Files that could not be hashed or turned into entries.
    pub unreadable: Vec<PathBuf>,
}

/// A disk-only file with its checksum, waiting to be matched.
#[derive(Debug)]
struct PoolFile {
    file: DiskFile,
    checksum: CatalogHash,
    claimed: bool,
}

/// Aligns the index with the disk origin for one subtree.
//
// // 将索引与磁盘上的某个子树对齐：检测移动、孤立记录与漂移。
pub struct DiskCatalogReconciler<'a> {
    index: &'a dyn IndexStore,
    disk_root: PathBuf,
    confirm: &'a dyn Confirm,
    mirrors: Mirrors<'a>,
    extractor: &'a dyn MetadataExtractor,
    ignored_dirs: Vec<String>,
    dry_run: bool,
}

impl<'a> DiskCatalogReconciler<'a> {
    pub fn new(index: &'a dyn IndexStore, disk_root: &Path, confirm: &'a dyn Confirm) -> Self {
        Self {
            index,
            disk_root: disk_root.to_path_buf(),
            confirm,
            mirrors: Mirrors::none(),
            extractor: &NoMetadata,
            ignored_dirs: DEFAULT_IGNORED_DIRS.iter().map(|s| s.to_string()).collect(),
            dry_run: false,
        }
    }

    pub fn with_mirrors(mut self, mirrors: Mirrors<'a>) -> Self {
        self.mirrors = mirrors;
        self
    }

    pub fn with_extractor(mut self, extractor: &'a dyn MetadataExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn ignored_dirs(mut self, ignored_dirs: &[String]) -> Self {
        self.ignored_dirs = ignored_dirs.to_vec();
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Reconciles the catalog subtree `scope` (`""` is the whole catalog).
    pub fn run(&self, scope: &str) -> Result<ReconcileReport, ReconcileError> {
        let scope = normalize_catalog_path(scope);
        let mut report = ReconcileReport {
            dry_run: self.dry_run,
            ..Default::default()
        };

        // 1. 读取目录与磁盘的当前状态
        let docs = self.index.scan(&Filter::Subtree(scope.clone()))?;
        let disk_files = self.list_disk(&scope)?;
        let catalog_paths: HashSet<String> = docs.iter().map(|d| d.entry.full_path()).collect();

        // 2. 仍存在的记录: 检查漂移
        let mut live_checksums: HashSet<CatalogHash> = HashSet::new();
        let mut missing: Vec<Document> = Vec::new();
        for doc in docs {
            match disk_files.get(&doc.entry.full_path()) {
                Some(file) => {
                    let checksum = self.check_drift(&doc, file, &mut report)?;
                    live_checksums.insert(checksum);
                }
                None => missing.push(doc),
            }
        }

        // 3. 仅在磁盘上的文件: 计算哈希, 作为移动匹配的候选
        let mut disk_only: Vec<&DiskFile> = disk_files
            .values()
            .filter(|f| !catalog_paths.contains(&f.full_path()))
            .collect();
        disk_only.sort_by_key(|f| f.full_path());
        let mut pool: Vec<PoolFile> = Vec::with_capacity(disk_only.len());
        for file in disk_only {
            match hash_file(&file.absolute_path) {
                Ok(checksum) => pool.push(PoolFile {
                    file: file.clone(),
                    checksum,
                    claimed: false,
                }),
                Err(e) => {
                    warn!(file = %file.absolute_path.display(), error = %e, "could not hash");
                    report.unreadable.push(file.absolute_path.clone());
                }
            }
        }
        let mut by_checksum: HashMap<CatalogHash, VecDeque<usize>> = HashMap::new();
        for (i, candidate) in pool.iter().enumerate() {
            by_checksum.entry(candidate.checksum).or_default().push_back(i);
        }

        // 4. 磁盘上缺失的记录: 移动 / 冗余 / 孤立
        missing.sort_by_key(|d| d.entry.full_path());
        for doc in missing {
            let claim = by_checksum
                .get_mut(&doc.entry.checksum)
                .and_then(VecDeque::pop_front);
            if let Some(i) = claim {
                pool[i].claimed = true;
                self.apply_move(&doc, &pool[i].file, &mut report)?;
                live_checksums.insert(doc.entry.checksum);
            } else if live_checksums.contains(&doc.entry.checksum) || self.has_live_copy(&doc)? {
                self.remove_redundant(&doc, &mut report)?;
            } else {
                self.handle_orphan(doc, &mut report)?;
            }
        }

        // 5. 未被认领的磁盘文件: 新文件
        self.handle_new(pool.into_iter().filter(|p| !p.claimed), &mut report)?;

        info!(
            scope = %scope,
            in_sync = report.in_sync,
            updated = report.updated.len(),
            moved = report.moved.len(),
            redundant = report.redundant.len(),
            orphans = report.orphans.len(),
            orphans_deleted = report.orphans_deleted.len(),
            new_files = report.new_files.len(),
            ingested = report.ingested.len(),
            dry_run = self.dry_run,
            "reconciliation finished"
        );
        Ok(report)
    }

    /// Disk files below the scope keyed by their NFC catalog path.
    fn list_disk(&self, scope: &str) -> Result<HashMap<String, DiskFile>, ReconcileError> {
        if !self.disk_root.is_dir() {
            warn!(root = %self.disk_root.display(), "disk root missing");
            return Ok(HashMap::new());
        }
        // the scope may be stored in another normalization form on disk
        let dir = self.disk_root.join(scope);
        let start = if dir.is_dir() { dir } else { self.disk_root.clone() };
        let listing = DirectoryScanner::new(&start)
            .relative_to(&self.disk_root)
            .recursive(true)
            .ignored_dirs(&self.ignored_dirs)
            .list()?;
        Ok(listing
            .files
            .into_iter()
            .filter(|f| is_within(&f.path, scope))
            .map(|f| (f.full_path(), f))
            .collect())
    }

    /// Patches a live document whose file changed size or modification time.
    /// Returns the document's current checksum.
    fn check_drift(
        &self,
        doc: &Document,
        file: &DiskFile,
        report: &mut ReconcileReport,
    ) -> Result<CatalogHash, ReconcileError> {
        if doc.entry.size == file.size && doc.entry.modified == file.modified {
            report.in_sync += 1;
            return Ok(doc.entry.checksum);
        }

        let checksum = match hash_file(&file.absolute_path) {
            Ok(checksum) => checksum,
            Err(e) => {
                warn!(file = %file.absolute_path.display(), error = %e, "drifted file unreadable, left as is");
                report.unreadable.push(file.absolute_path.clone());
                return Ok(doc.entry.checksum);
            }
        };
        let patch = EntryPatch {
            size: Some(file.size),
            modified: Some(file.modified),
            checksum: (checksum != doc.entry.checksum).then_some(checksum),
            ..Default::default()
        };
        debug!(path = %file.full_path(), content_changed = patch.checksum.is_some(), "drift");
        if !self.dry_run {
            self.index.update(doc.id, &patch)?;
        }
        report.updated.push(file.full_path());
        Ok(checksum)
    }

    fn apply_move(
        &self,
        doc: &Document,
        file: &DiskFile,
        report: &mut ReconcileReport,
    ) -> Result<(), ReconcileError> {
        let mut target = doc.entry.clone();
        target.path = file.path.clone();
        target.name = file.name.clone();
        // the file may have been touched by the move
        if let Ok((size, modified)) = stat(&file.absolute_path) {
            target.size = size;
            target.modified = modified;
        }
        let patch = doc.entry.diff(&target);

        debug!(from = %doc.entry.full_path(), to = %file.full_path(), "moved");
        if !self.dry_run {
            self.index.update(doc.id, &patch)?;
        }
        report.moved.push((doc.entry.full_path(), file.full_path()));
        Ok(())
    }

    /// Another document with the same content has its file on disk, possibly
    /// outside the scope.
    fn has_live_copy(&self, doc: &Document) -> Result<bool, ReconcileError> {
        let holders = self
            .index
            .term_query(Field::Checksum, &doc.entry.checksum.to_hex())?;
        Ok(holders
            .iter()
            .filter(|other| other.id != doc.id)
            .any(|other| self.disk_root.join(other.entry.full_path()).is_file()))
    }

    fn remove_redundant(&self, doc: &Document, report: &mut ReconcileReport) -> Result<(), ReconcileError> {
        debug!(path = %doc.entry.full_path(), "redundant document");
        if !self.dry_run {
            self.index.delete(doc.id)?;
        }
        report.redundant.push(doc.entry.full_path());
        Ok(())
    }

    fn handle_orphan(&self, doc: Document, report: &mut ReconcileReport) -> Result<(), ReconcileError> {
        let full_path = doc.entry.full_path();
        report.orphans.push(full_path.clone());
        if self.dry_run {
            return Ok(());
        }

        if !self.confirm.confirm(&ReconcileAction::DeleteOrphan(doc.entry.clone())) {
            debug!(path = %full_path, "orphan kept");
            return Ok(());
        }
        if let Err(e) = self.mirrors.remove_copies(&doc.entry) {
            warn!(path = %full_path, error = %e, "mirror copy not removed, keeping document");
            return Ok(());
        }
        self.index.delete(doc.id)?;
        report.orphans_deleted.push(full_path);
        Ok(())
    }

    fn handle_new(
        &self,
        unclaimed: impl Iterator<Item = PoolFile>,
        report: &mut ReconcileReport,
    ) -> Result<(), ReconcileError> {
        let mut accepted = Vec::new();
        for candidate in unclaimed {
            report.new_files.push(candidate.file.full_path());
            if self.dry_run {
                continue;
            }
            if !self.confirm.confirm(&ReconcileAction::IngestNew(candidate.file.clone())) {
                continue;
            }
            match self.entry_for(&candidate.file, candidate.checksum) {
                Ok(entry) => accepted.push(entry),
                Err(e) => {
                    warn!(file = %candidate.file.absolute_path.display(), error = %e, "not a valid entry, skipped");
                    report.unreadable.push(candidate.file.absolute_path.clone());
                }
            }
        }
        if accepted.is_empty() {
            return Ok(());
        }

        let stored = IngestionStore::new(self.index)
            .with_options(IngestOptions::default())
            .store(accepted);
        report
            .ingested
            .extend(stored.stored.iter().map(|e| e.full_path()));
        Ok(())
    }

    fn entry_for(&self, file: &DiskFile, checksum: CatalogHash) -> Result<Entry, EntryError> {
        let mut entry = Entry::new(&file.name, &file.path, file.size, file.modified, checksum)?;
        entry.original_path = Some(file.absolute_path.clone());
        self.extractor
            .extract(&file.absolute_path, file.kind)
            .apply_to(&mut entry);
        Ok(entry)
    }
}
