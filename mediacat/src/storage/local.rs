use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use super::{BlobError, BlobStore, JobId, JobStatus, PairOutcome, RelocateMode, RelocationPair};

/// Blob store on a local filesystem tree: the disk origin or a mounted NAS.
///
/// Batch jobs run synchronously inside `batch_relocate`; the first `poll`
/// hands back the finished results.
#[derive(Debug)]
pub struct LocalBlobStore {
    root_path: PathBuf,
    next_job: AtomicU64,
    finished_jobs: Mutex<HashMap<JobId, Vec<PairOutcome>>>,
}

impl LocalBlobStore {
    pub fn new(root_path: &Path) -> Self {
        Self {
            root_path: root_path.to_path_buf(),
            next_job: AtomicU64::new(1),
            finished_jobs: Mutex::new(HashMap::new()),
        }
    }

    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    /// Physical location of `path`.
    pub fn resolve(&self, path: &str) -> PathBuf {
        let p = Path::new(path);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.root_path.join(path.trim_start_matches('/'))
        }
    }

    fn relocate_one(&self, pair: &RelocationPair, mode: RelocateMode) -> Result<(), BlobError> {
        let source = self.resolve(&pair.from);
        let target = self.resolve(&pair.to);

        if !source.is_file() {
            return Err(BlobError::NotFound(pair.from.clone()));
        }
        if target.exists() {
            return Err(BlobError::Conflict(pair.to.clone()));
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| BlobError::io(&pair.to, e))?;
        }

        match mode {
            RelocateMode::Copy => copy_preserving_mtime(&source, &target)
                .map_err(|e| BlobError::io(&pair.to, e)),
            RelocateMode::Move => {
                if fs::rename(&source, &target).is_ok() {
                    return Ok(());
                }
                // rename fails across filesystems; fall back to copy + delete
                copy_preserving_mtime(&source, &target).map_err(|e| BlobError::io(&pair.to, e))?;
                fs::remove_file(&source).map_err(|e| BlobError::io(&pair.from, e))
            }
        }
    }
}

fn copy_preserving_mtime(source: &Path, target: &Path) -> io::Result<()> {
    fs::copy(source, target)?;
    let modified = fs::metadata(source)?.modified()?;
    let file = fs::OpenOptions::new().write(true).open(target)?;
    file.set_modified(modified)?;
    Ok(())
}

impl BlobStore for LocalBlobStore {
    fn exists(&self, path: &str) -> Result<bool, BlobError> {
        Ok(self.resolve(path).exists())
    }

    fn is_directory(&self, path: &str) -> Result<bool, BlobError> {
        Ok(self.resolve(path).is_dir())
    }

    fn read(&self, path: &str) -> Result<Box<dyn Read + Send>, BlobError> {
        let file = File::open(self.resolve(path)).map_err(|e| BlobError::io(path, e))?;
        Ok(Box::new(BufReader::new(file)))
    }

    fn create_directory(&self, path: &str) -> Result<(), BlobError> {
        fs::create_dir_all(self.resolve(path)).map_err(|e| BlobError::io(path, e))
    }

    fn write(&self, path: &str, data: &mut dyn Read) -> Result<u64, BlobError> {
        let target = self.resolve(path);
        let parent = target
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root_path.clone());
        fs::create_dir_all(&parent).map_err(|e| BlobError::io(path, e))?;

        // 在同一文件系统下创建临时文件，保证 persist 是原子的
        let mut temp_file = NamedTempFile::new_in(&parent).map_err(|e| BlobError::io(path, e))?;
        let written = io::copy(data, temp_file.as_file_mut()).map_err(|e| BlobError::io(path, e))?;
        temp_file
            .persist(&target)
            .map_err(|e| BlobError::io(path, e.error))?;
        Ok(written)
    }

    fn delete(&self, path: &str) -> Result<(), BlobError> {
        fs::remove_file(self.resolve(path)).map_err(|e| BlobError::io(path, e))
    }

    fn batch_relocate(
        &self,
        pairs: &[RelocationPair],
        mode: RelocateMode,
    ) -> Result<JobId, BlobError> {
        let job = JobId(format!("local-{}", self.next_job.fetch_add(1, Ordering::SeqCst)));
        let outcomes: Vec<PairOutcome> = pairs
            .iter()
            .map(|pair| match self.relocate_one(pair, mode) {
                Ok(()) => {
                    debug!(from = %pair.from, to = %pair.to, ?mode, "relocated");
                    PairOutcome::success(pair.clone())
                }
                Err(e) => {
                    warn!(from = %pair.from, to = %pair.to, error = %e, "relocation failed");
                    PairOutcome::failure(pair.clone(), e.to_string())
                }
            })
            .collect();

        self.finished_jobs
            .lock()
            .map_err(|_| BlobError::Transient("job table poisoned".to_string()))?
            .insert(job.clone(), outcomes);
        Ok(job)
    }

    fn poll(&self, job: &JobId) -> Result<JobStatus, BlobError> {
        let mut jobs = self
            .finished_jobs
            .lock()
            .map_err(|_| BlobError::Transient("job table poisoned".to_string()))?;
        match jobs.remove(job) {
            Some(outcomes) => Ok(JobStatus::Complete(outcomes)),
            None => Err(BlobError::NotFound(format!("job {job}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::tempdir;

    #[test]
    fn test_write_read_delete() {
        let dir = tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path());

        let written = store.write("2022/03_March/a.jpg", &mut Cursor::new(b"bytes".to_vec())).unwrap();
        assert_eq!(written, 5);
        assert!(store.exists("2022/03_March/a.jpg").unwrap());
        assert!(store.is_directory("2022/03_March").unwrap());

        let mut content = String::new();
        store.read("2022/03_March/a.jpg").unwrap().read_to_string(&mut content).unwrap();
        assert_eq!(content, "bytes");

        store.delete("2022/03_March/a.jpg").unwrap();
        assert!(store.delete("2022/03_March/a.jpg").unwrap_err().is_not_found());
    }

    #[test]
    fn test_content_hash_matches_local_hash() {
        let dir = tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path());
        fs::write(dir.path().join("x.jpg"), b"picture").unwrap();
        let expected = crate::utils::hash::hash_file(&dir.path().join("x.jpg")).unwrap();
        assert_eq!(store.content_hash("x.jpg").unwrap(), expected);
    }

    #[test]
    fn test_batch_copy_reports_per_pair_outcomes() {
        let dir = tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path());
        fs::write(dir.path().join("a.jpg"), b"a").unwrap();
        fs::write(dir.path().join("taken.jpg"), b"t").unwrap();
        fs::write(dir.path().join("b.jpg"), b"b").unwrap();

        let pairs = vec![
            RelocationPair::new("a.jpg", "mirror/a.jpg"),
            RelocationPair::new("b.jpg", "taken.jpg"),
            RelocationPair::new("missing.jpg", "mirror/missing.jpg"),
        ];
        let job = store.batch_relocate(&pairs, RelocateMode::Copy).unwrap();
        let JobStatus::Complete(outcomes) = store.poll(&job).unwrap() else {
            panic!("local jobs complete immediately");
        };
        assert!(outcomes[0].is_success());
        assert!(!outcomes[1].is_success());
        assert!(!outcomes[2].is_success());
        assert!(dir.path().join("a.jpg").exists());
        assert!(dir.path().join("mirror/a.jpg").exists());
        assert_eq!(fs::read(dir.path().join("taken.jpg")).unwrap(), b"t");
    }

    #[test]
    fn test_batch_move_removes_source() {
        let dir = tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path());
        fs::write(dir.path().join("a.jpg"), b"a").unwrap();
        let job = store
            .batch_relocate(&[RelocationPair::new("a.jpg", "x/y/a.jpg")], RelocateMode::Move)
            .unwrap();
        assert!(matches!(store.poll(&job).unwrap(), JobStatus::Complete(_)));
        assert!(!dir.path().join("a.jpg").exists());
        assert!(dir.path().join("x/y/a.jpg").exists());
    }

    #[test]
    fn test_absolute_source_path_is_used_verbatim() {
        let source_dir = tempdir().unwrap();
        let mirror_dir = tempdir().unwrap();
        let source = source_dir.path().join("in.jpg");
        fs::write(&source, b"abs").unwrap();
        let store = LocalBlobStore::new(mirror_dir.path());
        let job = store
            .batch_relocate(
                &[RelocationPair::new(source.to_string_lossy(), "2020/in.jpg")],
                RelocateMode::Copy,
            )
            .unwrap();
        let JobStatus::Complete(outcomes) = store.poll(&job).unwrap() else {
            panic!("expected completion");
        };
        assert!(outcomes[0].is_success());
        assert_eq!(fs::read(mirror_dir.path().join("2020/in.jpg")).unwrap(), b"abs");
    }
}
