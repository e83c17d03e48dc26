pub mod local;

use std::fmt;
use std::fmt::Debug;
use std::io::{self, Read};

use crate::common::hash::CatalogHash;
use crate::utils::hash::{hash_reader, HashError};

/// Errors surfaced by a blob store.
///
/// "Not found" is kept apart from everything else: a missing copy that was
/// expected to exist is actionable, while any other failure leaves the
/// affected entry untouched.
//
// // 存储后端错误。“未找到”与其他错误严格区分。
#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    /// The object does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The destination already exists or otherwise conflicts with the request.
    #[error("Conflict at {0}")]
    Conflict(String),

    /// A temporary failure of the remote side. Safe to retry.
    #[error("Transient remote error: {0}")]
    Transient(String),

    /// Any other I/O failure.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    /// The stored bytes could not be hashed.
    #[error("Hashing failed: {0}")]
    Hash(#[from] HashError),
}

impl BlobError {
    /// Maps an `io::Error` for `path`, keeping `NotFound` distinguishable.
    pub fn io(path: impl Into<String>, source: io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            io::ErrorKind::NotFound => Self::NotFound(path),
            io::ErrorKind::AlreadyExists => Self::Conflict(path),
            _ => Self::Io { path, source },
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, BlobError::NotFound(_))
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, BlobError::Transient(_))
    }
}

/// One `(from, to)` request of a batch relocation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RelocationPair {
    pub from: String,
    pub to: String,
}

impl RelocationPair {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelocateMode {
    Copy,
    Move,
}

/// Opaque handle of a server-side batch job.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobId(pub String);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of a single pair once the job has completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairOutcome {
    pub pair: RelocationPair,
    /// `None` on success, otherwise the backend's reason.
    pub error: Option<String>,
}

impl PairOutcome {
    pub fn success(pair: RelocationPair) -> Self {
        Self { pair, error: None }
    }

    pub fn failure(pair: RelocationPair, reason: impl Into<String>) -> Self {
        Self {
            pair,
            error: Some(reason.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// State of a batch job as reported by [`BlobStore::poll`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    InProgress,
    Complete(Vec<PairOutcome>),
    /// The whole job failed on the remote side.
    Failed(String),
}

/// A physical store of media bytes: the local disk origin, the NAS mirror
/// or the cloud mirror.
///
/// Paths are `/`-separated. Relative paths are resolved against the store's
/// own root; absolute paths address the store's filesystem directly (used to
/// read a source file that lives outside the catalog tree).
pub trait BlobStore: Send + Sync + Debug {
    // --- 读操作 ---

    fn exists(&self, path: &str) -> Result<bool, BlobError>;

    fn is_directory(&self, path: &str) -> Result<bool, BlobError>;

    /// Opens the object for reading.
    fn read(&self, path: &str) -> Result<Box<dyn Read + Send>, BlobError>;

    /// Content hash of the stored object. Backends that keep block digests
    /// can answer without streaming the bytes.
    fn content_hash(&self, path: &str) -> Result<CatalogHash, BlobError> {
        Ok(hash_reader(self.read(path)?)?)
    }

    // --- 写操作 ---

    /// Creates the directory and any missing parents.
    fn create_directory(&self, path: &str) -> Result<(), BlobError>;

    /// Stores all bytes of `data` at `path`, returning the number written.
    fn write(&self, path: &str, data: &mut dyn Read) -> Result<u64, BlobError>;

    /// Deletes the object. A missing object yields `BlobError::NotFound`.
    fn delete(&self, path: &str) -> Result<(), BlobError>;

    // --- 批量作业 ---

    /// Submits an asynchronous batch copy or move.
    fn batch_relocate(&self, pairs: &[RelocationPair], mode: RelocateMode)
    -> Result<JobId, BlobError>;

    /// Reports the state of a submitted job.
    fn poll(&self, job: &JobId) -> Result<JobStatus, BlobError>;
}
