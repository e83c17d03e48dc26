#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use mediacat::catalog::Catalog;
use mediacat::catalog::config::CatalogConfig;
use mediacat::index::sqlite::SqliteIndex;
use mediacat::storage::local::LocalBlobStore;
use mediacat::storage::{
    BlobError, BlobStore, JobId, JobStatus, PairOutcome, RelocateMode, RelocationPair,
};

// --- Scripted Remote Storage (脚本化远程存储模拟) ---
// 对象保存在内存中。批量作业在提交时立即执行, 但轮询结果按脚本返回:
// 先若干次临时错误, 再若干次 InProgress, 最后 Complete 或 Failed。
// 用来验证迁移逻辑不依赖于本地文件系统的同步语义。

#[derive(Debug)]
struct RemoteJob {
    transient_left: usize,
    in_progress_left: usize,
    outcomes: Vec<PairOutcome>,
}

#[derive(Debug, Default)]
pub struct ScriptedRemote {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
    jobs: Mutex<HashMap<JobId, RemoteJob>>,
    next_job: AtomicU64,
    polls: AtomicUsize,
    transient_polls: usize,
    in_progress_polls: usize,
    failing_targets: HashSet<String>,
    silent_targets: HashSet<String>,
    job_failure: Option<String>,
}

impl ScriptedRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// 每个作业在完成前先返回 `transient` 次临时错误, 再返回 `in_progress` 次 InProgress。
    pub fn with_delays(mut self, transient: usize, in_progress: usize) -> Self {
        self.transient_polls = transient;
        self.in_progress_polls = in_progress;
        self
    }

    /// 写到该目标的请求失败。
    pub fn failing(mut self, target: &str) -> Self {
        self.failing_targets.insert(target.to_string());
        self
    }

    /// 写到该目标的请求在结果中缺失 (既不成功也不失败)。
    pub fn silent(mut self, target: &str) -> Self {
        self.silent_targets.insert(target.to_string());
        self
    }

    /// 整个作业在远程被标记为失败。
    pub fn failing_job(mut self, reason: &str) -> Self {
        self.job_failure = Some(reason.to_string());
        self
    }

    pub fn put(&self, path: &str, data: &[u8]) {
        self.objects.lock().unwrap().insert(path.to_string(), data.to_vec());
    }

    pub fn get(&self, path: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(path).cloned()
    }

    pub fn paths(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    pub fn poll_count(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }

    /// 源路径为绝对路径时从本地文件系统读取, 否则从内存读取。
    fn source_bytes(&self, from: &str) -> Result<Vec<u8>, String> {
        if Path::new(from).is_absolute() {
            return fs::read(from).map_err(|e| e.to_string());
        }
        self.get(from).ok_or_else(|| format!("{from} not found"))
    }

    fn relocate_one(&self, pair: &RelocationPair, mode: RelocateMode) -> Result<(), String> {
        if self.failing_targets.contains(&pair.to) {
            return Err("remote quota exceeded".to_string());
        }
        let bytes = self.source_bytes(&pair.from)?;
        let mut objects = self.objects.lock().unwrap();
        if objects.contains_key(&pair.to) {
            return Err(format!("{} already exists", pair.to));
        }
        objects.insert(pair.to.clone(), bytes);
        if mode == RelocateMode::Move {
            objects.remove(&pair.from);
        }
        Ok(())
    }
}

impl BlobStore for ScriptedRemote {
    fn exists(&self, path: &str) -> Result<bool, BlobError> {
        let prefix = format!("{}/", path.trim_end_matches('/'));
        let objects = self.objects.lock().unwrap();
        Ok(objects.contains_key(path) || objects.keys().any(|k| k.starts_with(&prefix)))
    }

    fn is_directory(&self, path: &str) -> Result<bool, BlobError> {
        let prefix = format!("{}/", path.trim_end_matches('/'));
        Ok(self.objects.lock().unwrap().keys().any(|k| k.starts_with(&prefix)))
    }

    fn read(&self, path: &str) -> Result<Box<dyn Read + Send>, BlobError> {
        let data = self.get(path).ok_or_else(|| BlobError::NotFound(path.to_string()))?;
        Ok(Box::new(Cursor::new(data)))
    }

    fn create_directory(&self, _path: &str) -> Result<(), BlobError> {
        // 对象存储没有真正的目录
        Ok(())
    }

    fn write(&self, path: &str, data: &mut dyn Read) -> Result<u64, BlobError> {
        let mut buffer = Vec::new();
        data.read_to_end(&mut buffer).map_err(|e| BlobError::io(path, e))?;
        let len = buffer.len() as u64;
        self.objects.lock().unwrap().insert(path.to_string(), buffer);
        Ok(len)
    }

    fn delete(&self, path: &str) -> Result<(), BlobError> {
        match self.objects.lock().unwrap().remove(path) {
            Some(_) => Ok(()),
            None => Err(BlobError::NotFound(path.to_string())),
        }
    }

    fn batch_relocate(&self, pairs: &[RelocationPair], mode: RelocateMode) -> Result<JobId, BlobError> {
        let job = JobId(format!("remote-{}", self.next_job.fetch_add(1, Ordering::SeqCst)));
        let mut outcomes = Vec::new();
        for pair in pairs {
            if self.silent_targets.contains(&pair.to) {
                continue;
            }
            outcomes.push(match self.relocate_one(pair, mode) {
                Ok(()) => PairOutcome::success(pair.clone()),
                Err(reason) => PairOutcome::failure(pair.clone(), reason),
            });
        }
        self.jobs.lock().unwrap().insert(
            job.clone(),
            RemoteJob {
                transient_left: self.transient_polls,
                in_progress_left: self.in_progress_polls,
                outcomes,
            },
        );
        Ok(job)
    }

    fn poll(&self, job: &JobId) -> Result<JobStatus, BlobError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        let mut jobs = self.jobs.lock().unwrap();
        let Some(state) = jobs.get_mut(job) else {
            return Err(BlobError::Io {
                path: job.to_string(),
                source: io::Error::other("unknown job"),
            });
        };
        if state.transient_left > 0 {
            state.transient_left -= 1;
            return Err(BlobError::Transient("rate limited".to_string()));
        }
        if state.in_progress_left > 0 {
            state.in_progress_left -= 1;
            return Ok(JobStatus::InProgress);
        }
        if let Some(reason) = &self.job_failure {
            return Ok(JobStatus::Failed(reason.clone()));
        }
        let finished = jobs.remove(job).map(|s| s.outcomes).unwrap_or_default();
        Ok(JobStatus::Complete(finished))
    }
}

/// 辅助函数：在目录中创建一个具有特定内容的媒体文件。
pub fn create_media_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let file_path = dir.join(name);
    if let Some(parent) = file_path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&file_path, content).unwrap();
    file_path
}

/// 辅助函数：在临时目录中建立导入目录、磁盘根目录与一个使用内存索引的目录实例。
///
/// 云端镜像 (如果给出) 使用脚本化的远程存储。轮询间隔设为 1ms 以加快测试。
/// 返回 `(导入目录, 磁盘根目录, Catalog)`。
pub fn setup_catalog(dir: &TempDir, cloud: Option<Arc<ScriptedRemote>>) -> (PathBuf, PathBuf, Catalog) {
    let import = dir.path().join("import");
    let disk_root = dir.path().join("disk");
    fs::create_dir_all(&import).unwrap();
    fs::create_dir_all(&disk_root).unwrap();

    let mut config = CatalogConfig::new("test-catalog", disk_root.clone());
    config.poll_interval_ms = 1;
    let cloud: Option<Arc<dyn BlobStore>> = cloud.map(|c| c as Arc<dyn BlobStore>);
    let catalog = Catalog::new(
        dir.path(),
        config,
        Box::new(SqliteIndex::open_in_memory().unwrap()),
        Arc::new(LocalBlobStore::new(&disk_root)),
        None,
        cloud,
    );
    (import, disk_root, catalog)
}
