use std::collections::HashSet;
use tracing::{debug, info, warn};

use crate::common::hash::CatalogHash;
use crate::file::path::split_name;
use crate::file::Entry;
use crate::index::{Field, IndexError, IndexStore};

/// Switches of the ingestion write path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestOptions {
    /// Store entries even if their content or exact fact is already known.
    /// Name collisions are still resolved.
    pub allow_duplicates: bool,
    /// Run every check, write nothing.
    pub dry_run: bool,
}

/// Why an entry was not stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The content is already catalogued (in this batch or elsewhere).
    Checksum,
    /// The same bytes are already filed at the same path.
    PathHash,
    /// The index refused the document or a lookup failed.
    WriteFailure,
}

/// Outcome of one [`IngestionStore::store`] call.
#[derive(Debug, Default)]
pub struct StoreReport {
    /// Entries written (or that would have been written in a dry run), with
    /// their final names and `original_path` kept.
    pub stored: Vec<Entry>,
    pub skipped_checksum: usize,
    pub skipped_path_hash: usize,
    pub failed: usize,
}

impl StoreReport {
    pub fn skipped(&self) -> usize {
        self.skipped_checksum + self.skipped_path_hash + self.failed
    }

    fn skip(&mut self, reason: SkipReason) {
        match reason {
            SkipReason::Checksum => self.skipped_checksum += 1,
            SkipReason::PathHash => self.skipped_path_hash += 1,
            SkipReason::WriteFailure => self.failed += 1,
        }
    }
}

/// Identities written during the current call, so later entries of the same
/// batch see them without asking the index. Dropped when the call returns.
#[derive(Debug, Default)]
struct BatchSet {
    checksums: HashSet<CatalogHash>,
    path_hashes: HashSet<CatalogHash>,
    name_hashes: HashSet<CatalogHash>,
}

impl BatchSet {
    fn record(&mut self, entry: &Entry) {
        self.checksums.insert(entry.checksum);
        self.path_hashes.insert(entry.path_hash());
        self.name_hashes.insert(entry.name_hash());
    }
}

/// Idempotent, duplicate-suppressing write path into the index.
///
/// Calling [`store`](Self::store) twice with the same entries stores them
/// once: the second call finds every `path_hash` already indexed.
//
// // 幂等且去重的索引写入路径。
#[derive(Debug)]
pub struct IngestionStore<'a> {
    index: &'a dyn IndexStore,
    options: IngestOptions,
}

impl<'a> IngestionStore<'a> {
    pub fn new(index: &'a dyn IndexStore) -> Self {
        Self {
            index,
            options: IngestOptions::default(),
        }
    }

    pub fn with_options(mut self, options: IngestOptions) -> Self {
        self.options = options;
        self
    }

    /// Stores a batch of entries. Never aborts: every per-entry failure is
    /// logged and counted as skipped.
    pub fn store<I>(&self, entries: I) -> StoreReport
    where
        I: IntoIterator<Item = Entry>,
    {
        let mut report = StoreReport::default();
        let mut batch = BatchSet::default();

        for entry in entries {
            let full_path = entry.full_path();
            match self.store_one(entry, &mut batch) {
                Ok(stored) => {
                    debug!(from = %full_path, to = %stored.full_path(), dry_run = self.options.dry_run, "stored");
                    report.stored.push(stored);
                }
                Err(reason) => {
                    debug!(path = %full_path, ?reason, "skipped");
                    report.skip(reason);
                }
            }
        }

        info!(
            stored = report.stored.len(),
            skipped = report.skipped(),
            failed = report.failed,
            dry_run = self.options.dry_run,
            "ingestion finished"
        );
        report
    }

    fn store_one(&self, mut entry: Entry, batch: &mut BatchSet) -> Result<Entry, SkipReason> {
        let failed = |e: IndexError| {
            warn!(error = %e, "index lookup failed");
            SkipReason::WriteFailure
        };

        if !self.options.allow_duplicates {
            // 1. 内容已存在于本批次, 或需要核对目录且索引中已有该内容
            if batch.checksums.contains(&entry.checksum)
                || (entry.check_catalog
                    && self
                        .index
                        .contains(Field::Checksum, &entry.checksum.to_hex())
                        .map_err(failed)?)
            {
                return Err(SkipReason::Checksum);
            }

            // 2. 同一路径下的相同内容已记录
            let path_hash = entry.path_hash();
            if batch.path_hashes.contains(&path_hash)
                || self
                    .index
                    .contains(Field::PathHash, &path_hash.to_hex())
                    .map_err(failed)?
            {
                return Err(SkipReason::PathHash);
            }
        }

        // 3. 解决名称冲突并写入
        entry.name = self.resolve_name(&entry, batch).map_err(failed)?;
        if !self.options.dry_run {
            if let Err(e) = self.index.index(&entry) {
                warn!(path = %entry.full_path(), error = %e, "index write failed");
                return Err(SkipReason::WriteFailure);
            }
        }
        batch.record(&entry);
        Ok(entry)
    }

    /// First free name for `entry` at its path.
    fn resolve_name(&self, entry: &Entry, batch: &BatchSet) -> Result<String, IndexError> {
        let mut candidate = entry.clone();
        loop {
            let name_hash = candidate.name_hash();
            let taken = batch.name_hashes.contains(&name_hash)
                || self.index.contains(Field::NameHash, &name_hash.to_hex())?;
            if !taken {
                return Ok(candidate.name);
            }
            candidate.name = next_name_candidate(&candidate.name);
        }
    }
}

/// Next collision candidate: a trailing `_<integer>` on the stem is
/// incremented (keeping its zero padding), otherwise `_1` is appended.
///
/// `a.jpg` → `a_1.jpg` → `a_2.jpg`; `IMG_0009.JPG` → `IMG_0010.JPG`.
pub fn next_name_candidate(name: &str) -> String {
    let (stem, ext) = split_name(name);
    let ext = ext.map(|e| format!(".{e}")).unwrap_or_default();

    if let Some((head, token)) = stem.rsplit_once('_') {
        if !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(n) = token.parse::<u64>() {
                if let Some(next) = n.checked_add(1) {
                    let width = token.len();
                    return format!("{head}_{next:0width$}{ext}");
                }
            }
        }
    }
    format!("{stem}_1{ext}")
}
