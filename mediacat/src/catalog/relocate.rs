use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::common::constants::DEFAULT_POLL_INTERVAL_MS;
use crate::file::path::normalize_catalog_path;
use crate::file::{Entry, EntryPatch};
use crate::index::{Field, Filter, IndexError, IndexStore};
use crate::storage::{BlobError, BlobStore, JobId, JobStatus, RelocateMode, RelocationPair};

/// Defines errors that end a whole relocation batch.
//
// // 定义导致整个批量迁移失败的错误。
#[derive(Debug, thiserror::Error)]
pub enum RelocateError {
    /// Submitting or polling the job failed with a non-retryable error.
    #[error("Blob store error: {0}")]
    Blob(#[from] BlobError),

    /// The remote side reported the whole job as failed.
    #[error("Batch job {job} failed: {reason}")]
    JobFailed { job: JobId, reason: String },

    /// Marking or rolling back index documents failed.
    #[error("Index error: {0}")]
    Index(#[from] IndexError),
}

/// A secondary physical copy of the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MirrorTarget {
    Nas,
    Cloud,
}

impl MirrorTarget {
    /// Whether the entry claims a copy on this mirror.
    pub fn is_marked(&self, entry: &Entry) -> bool {
        match self {
            MirrorTarget::Nas => entry.on_nas,
            MirrorTarget::Cloud => entry.on_cloud,
        }
    }

    /// Patch that sets this mirror's completeness flag.
    pub fn mark(&self) -> EntryPatch {
        match self {
            MirrorTarget::Nas => EntryPatch {
                on_nas: Some(true),
                ..Default::default()
            },
            MirrorTarget::Cloud => EntryPatch {
                on_cloud: Some(true),
                ..Default::default()
            },
        }
    }
}

impl fmt::Display for MirrorTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MirrorTarget::Nas => f.write_str("nas"),
            MirrorTarget::Cloud => f.write_str("cloud"),
        }
    }
}

/// Where stored entries are pushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Into the catalog tree of the disk origin.
    Origin,
    Mirror(MirrorTarget),
}

/// Successes and failures of one completed batch.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RelocationReport {
    pub succeeded: Vec<RelocationPair>,
    pub failed: Vec<RelocationPair>,
}

impl RelocationReport {
    /// Sources of the failed pairs.
    pub fn failed_sources(&self) -> Vec<&str> {
        self.failed.iter().map(|p| p.from.as_str()).collect()
    }
}

/// Outcome of [`BatchRelocator::push_entries`].
#[derive(Debug, Default)]
pub struct PushReport {
    pub relocated: Vec<Entry>,
    /// Entries whose index documents were deleted because their copy failed.
    pub rolled_back: Vec<Entry>,
    /// Entries without a source path; nothing was attempted for them.
    pub skipped: usize,
}

/// Drives a batch copy or move on a blob store and waits for it.
///
/// The remote job is modelled as a polling state machine: submit, then poll
/// on a fixed interval until the store reports completion. Transient poll
/// errors are retried; anything else ends the batch.
//
// // 批量复制/移动，并以固定间隔轮询远程作业直至完成。
#[derive(Debug)]
pub struct BatchRelocator<'a> {
    store: &'a dyn BlobStore,
    mode: RelocateMode,
    poll_interval: Duration,
}

impl<'a> BatchRelocator<'a> {
    pub fn new(store: &'a dyn BlobStore) -> Self {
        Self {
            store,
            mode: RelocateMode::Copy,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        }
    }

    pub fn with_mode(mut self, mode: RelocateMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Relocates all pairs in one job and partitions the results.
    pub fn relocate(&self, pairs: &[RelocationPair]) -> Result<RelocationReport, RelocateError> {
        if pairs.is_empty() {
            return Ok(RelocationReport::default());
        }

        // 1. 按路径长度升序创建目标父目录
        for dir in parent_directories(pairs) {
            if !self.store.exists(&dir)? {
                self.store.create_directory(&dir)?;
            }
        }

        // 2. 提交作业
        let job = self.store.batch_relocate(pairs, self.mode)?;
        debug!(%job, pairs = pairs.len(), mode = ?self.mode, "batch submitted");

        // 3. 轮询直至完成
        let outcomes = loop {
            match self.store.poll(&job) {
                Ok(JobStatus::Complete(outcomes)) => break outcomes,
                Ok(JobStatus::InProgress) => {}
                Ok(JobStatus::Failed(reason)) => {
                    return Err(RelocateError::JobFailed { job, reason });
                }
                Err(e) if e.is_retryable() => {
                    warn!(%job, error = %e, "transient poll error, retrying");
                }
                Err(e) => return Err(e.into()),
            }
            thread::sleep(self.poll_interval);
        };

        // 4. 划分成功与失败; 未报告结果的请求按失败处理
        let mut reported: HashMap<&RelocationPair, bool> = HashMap::new();
        for outcome in &outcomes {
            if let Some(reason) = &outcome.error {
                warn!(from = %outcome.pair.from, to = %outcome.pair.to, %reason, "relocation failed");
            }
            reported.insert(&outcome.pair, outcome.is_success());
        }
        let mut report = RelocationReport::default();
        for pair in pairs {
            if reported.get(pair).copied().unwrap_or(false) {
                report.succeeded.push(pair.clone());
            } else {
                report.failed.push(pair.clone());
            }
        }

        info!(
            %job,
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            "batch finished"
        );
        Ok(report)
    }

    /// Copies freshly stored entries from their source paths to `path/name` on
    /// this relocator's store.
    ///
    /// Each failed entry has its index document rolled back, so a document
    /// never promises a copy that does not exist. When the whole batch fails,
    /// every entry is rolled back before the error is returned. Mirror pushes
    /// additionally set the mirror flag on every successful document.
    pub fn push_entries(
        &self,
        index: &dyn IndexStore,
        entries: &[Entry],
        placement: Placement,
    ) -> Result<PushReport, RelocateError> {
        let mut report = PushReport::default();
        let mut pairs = Vec::with_capacity(entries.len());
        let mut by_pair: HashMap<RelocationPair, &Entry> = HashMap::new();
        for entry in entries {
            let Some(source) = &entry.original_path else {
                warn!(path = %entry.full_path(), "no source path, not pushed");
                report.skipped += 1;
                continue;
            };
            let pair = RelocationPair::new(source.to_string_lossy(), entry.full_path());
            by_pair.insert(pair.clone(), entry);
            pairs.push(pair);
        }

        // 整个批次失败时, 所有条目都没有得到确认的副本
        let relocation = match self.relocate(&pairs) {
            Ok(relocation) => relocation,
            Err(e) => {
                warn!(error = %e, entries = pairs.len(), ?placement, "batch failed, rolling back all entries");
                for pair in &pairs {
                    let Some(&entry) = by_pair.get(pair) else { continue };
                    if let Err(rollback) = roll_back(index, entry, placement) {
                        warn!(path = %entry.full_path(), error = %rollback, "rollback failed");
                    }
                }
                return Err(e);
            }
        };

        // name_hash identifies exactly one document; path_hash may be shared by
        // duplicates stored on purpose
        for pair in &relocation.succeeded {
            let Some(&entry) = by_pair.get(pair) else { continue };
            let mut relocated = entry.clone();
            if let Placement::Mirror(target) = placement {
                for doc in index.term_query(Field::NameHash, &entry.name_hash().to_hex())? {
                    index.update(doc.id, &target.mark())?;
                }
                relocated.apply(&target.mark());
            }
            report.relocated.push(relocated);
        }

        for pair in &relocation.failed {
            let Some(&entry) = by_pair.get(pair) else { continue };
            roll_back(index, entry, placement)?;
            report.rolled_back.push(entry.clone());
        }

        Ok(report)
    }
}

/// Deletes the index document of an entry whose copy was not confirmed.
fn roll_back(index: &dyn IndexStore, entry: &Entry, placement: Placement) -> Result<(), IndexError> {
    let removed = index.delete_by_query(&Filter::Term(Field::NameHash, entry.name_hash().to_hex()))?;
    warn!(path = %entry.full_path(), removed, ?placement, "rolled back index write");
    Ok(())
}

/// Distinct parent directories of the destinations, shortest first.
fn parent_directories(pairs: &[RelocationPair]) -> Vec<String> {
    let dirs: BTreeSet<String> = pairs
        .iter()
        .filter_map(|p| {
            let to = normalize_catalog_path(&p.to);
            to.rsplit_once('/').map(|(dir, _)| dir.to_string())
        })
        .collect();
    let mut dirs: Vec<String> = dirs.into_iter().collect();
    dirs.sort_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));
    dirs
}
