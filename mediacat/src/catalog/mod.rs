pub mod config;
pub mod dedup;
pub mod ingest;
pub mod metadata;
pub mod naming;
pub mod reconcile;
pub mod relocate;
pub mod scan;

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::catalog::config::CatalogConfig;
use crate::catalog::dedup::{DedupError, DedupReport, DedupScope, DirectoryDeduplicator};
use crate::catalog::ingest::{IngestOptions, IngestionStore, StoreReport};
use crate::catalog::metadata::{MetadataExtractor, NoMetadata};
use crate::catalog::naming::{assign_identity, NamingOptions};
use crate::catalog::reconcile::{Confirm, DiskCatalogReconciler, ReconcileError, ReconcileReport};
use crate::catalog::relocate::{BatchRelocator, MirrorTarget, Placement, RelocateError};
use crate::catalog::scan::{DirectoryScanner, ScanError};
use crate::common::constants::{CONFIG_FILE_NAME, CURRENT_CATALOG_VERSION};
use crate::file::Entry;
use crate::index::sqlite::SqliteIndex;
use crate::index::{Field, IndexError, IndexStore};
use crate::storage::local::LocalBlobStore;
use crate::storage::{BlobError, BlobStore};

/// Defines errors that can occur while creating, opening or running a catalog.
//
// // 定义创建、打开或运行目录时可能发生的错误。
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// The target directory already exists and is not empty.
    //
    // // 目标目录已存在且不为空。
    #[error("Catalog directory already exists at {0}")]
    AlreadyExists(PathBuf),

    /// The specified path does not exist or is not a directory.
    #[error("Catalog path does not exist or is not a directory: {0}")]
    PathNotFound(PathBuf),

    /// The `catalog.json` file is missing from the catalog directory.
    //
    // // 目录中缺少 `catalog.json` 文件。
    #[error("Configuration file 'catalog.json' not found in catalog.")]
    ConfigNotFound,

    /// The database file named in the config is missing.
    #[error("Database file specified in config not found: {0}")]
    DatabaseNotFound(PathBuf),

    /// The config version is not supported by this library version.
    //
    // // 配置文件版本不受此库版本支持。
    #[error("Unsupported catalog version: found {found}, but this library supports version {supported}.")]
    UnsupportedVersion { supported: u32, found: u32 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to (de)serialize configuration: {0}")]
    Config(#[from] serde_json::Error),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Scan error: {0}")]
    Scan(#[from] ScanError),

    #[error("Relocation error: {0}")]
    Relocate(#[from] RelocateError),

    #[error("Deduplication error: {0}")]
    Dedup(#[from] DedupError),

    #[error("Reconciliation error: {0}")]
    Reconcile(#[from] ReconcileError),
}

/// The mirror stores available to an operation.
#[derive(Debug, Clone, Copy, Default)]
pub struct Mirrors<'a> {
    pub nas: Option<&'a dyn BlobStore>,
    pub cloud: Option<&'a dyn BlobStore>,
}

impl<'a> Mirrors<'a> {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn get(&self, target: MirrorTarget) -> Option<&'a dyn BlobStore> {
        match target {
            MirrorTarget::Nas => self.nas,
            MirrorTarget::Cloud => self.cloud,
        }
    }

    /// Deletes the mirror copies the entry claims. Copies that are already
    /// gone are fine; any other failure is returned and the caller keeps the
    /// index document.
    pub(crate) fn remove_copies(&self, entry: &Entry) -> Result<(), BlobError> {
        for target in [MirrorTarget::Nas, MirrorTarget::Cloud] {
            if !target.is_marked(entry) {
                continue;
            }
            match self.get(target) {
                Some(store) => tolerate_missing(store.delete(&entry.full_path()))?,
                None => warn!(path = %entry.full_path(), %target, "mirror copy tracked but mirror not configured"),
            }
        }
        Ok(())
    }
}

/// Treats "not found" as success for deletions.
pub(crate) fn tolerate_missing(result: Result<(), BlobError>) -> Result<(), BlobError> {
    match result {
        Err(e) if e.is_not_found() => {
            debug!(error = %e, "already gone");
            Ok(())
        }
        other => other,
    }
}

/// Options of [`Catalog::catalog_directory`].
#[derive(Debug, Clone, Default)]
pub struct CatalogOptions {
    pub naming: NamingOptions,
    pub ingest: IngestOptions,
    pub recursive: bool,
    /// Skip the NAS and cloud pushes even when mirrors are configured.
    pub skip_mirrors: bool,
}

/// Outcome of [`Catalog::catalog_directory`].
#[derive(Debug, Default)]
pub struct CatalogReport {
    pub scanned: usize,
    pub stored: usize,
    pub skipped: usize,
    /// Copied into the catalog tree of the disk origin.
    pub placed: usize,
    pub pushed_nas: usize,
    pub pushed_cloud: usize,
    pub rolled_back: usize,
    pub rejected_extensions: BTreeSet<String>,
    pub rejected_paths: Vec<PathBuf>,
    pub unreadable: Vec<PathBuf>,
}

/// A catalog: its configuration, the index and the physical stores.
///
/// All collaborators are owned by this context and handed to the engine
/// components explicitly.
//
// // 目录上下文：配置、索引与物理存储。所有协作者显式注入。
pub struct Catalog {
    pub root_path: PathBuf,
    pub config: CatalogConfig,
    index: Box<dyn IndexStore>,
    disk: Arc<dyn BlobStore>,
    nas: Option<Arc<dyn BlobStore>>,
    cloud: Option<Arc<dyn BlobStore>>,
    extractor: Box<dyn MetadataExtractor>,
}

impl Catalog {
    /// Creates a new catalog in `catalog_path`, which must be empty or absent.
    pub fn create(catalog_path: &Path, name: &str, disk_root: &Path) -> Result<Self, CatalogError> {
        if catalog_path.exists() && fs::read_dir(catalog_path)?.next().is_some() {
            return Err(CatalogError::AlreadyExists(catalog_path.to_path_buf()));
        }
        fs::create_dir_all(catalog_path)?;

        let config = CatalogConfig::new(name, disk_root.to_path_buf());
        fs::write(
            catalog_path.join(CONFIG_FILE_NAME),
            serde_json::to_string_pretty(&config)?,
        )?;
        let index = SqliteIndex::open(&catalog_path.join(&config.database))?;
        info!(name, path = %catalog_path.display(), "catalog created");

        Self::from_config(catalog_path, config, Box::new(index))
    }

    /// Opens an existing catalog.
    pub fn open(catalog_path: &Path) -> Result<Self, CatalogError> {
        if !catalog_path.is_dir() {
            return Err(CatalogError::PathNotFound(catalog_path.to_path_buf()));
        }
        let config_path = catalog_path.join(CONFIG_FILE_NAME);
        if !config_path.exists() {
            return Err(CatalogError::ConfigNotFound);
        }
        let config: CatalogConfig = serde_json::from_str(&fs::read_to_string(config_path)?)?;
        if config.version != CURRENT_CATALOG_VERSION {
            return Err(CatalogError::UnsupportedVersion {
                supported: CURRENT_CATALOG_VERSION,
                found: config.version,
            });
        }
        let db_path = catalog_path.join(&config.database);
        if !db_path.exists() {
            return Err(CatalogError::DatabaseNotFound(db_path));
        }
        let index = SqliteIndex::open(&db_path)?;

        Self::from_config(catalog_path, config, Box::new(index))
    }

    fn from_config(
        catalog_path: &Path,
        config: CatalogConfig,
        index: Box<dyn IndexStore>,
    ) -> Result<Self, CatalogError> {
        let local = |root: &Path| -> Arc<dyn BlobStore> { Arc::new(LocalBlobStore::new(root)) };
        let disk = local(&config.disk_root);
        let nas = config.nas_root.as_deref().map(local);
        let cloud = config.cloud_root.as_deref().map(local);
        Ok(Self::new(catalog_path, config, index, disk, nas, cloud))
    }

    /// Assembles a catalog from explicitly constructed collaborators.
    pub fn new(
        root_path: &Path,
        config: CatalogConfig,
        index: Box<dyn IndexStore>,
        disk: Arc<dyn BlobStore>,
        nas: Option<Arc<dyn BlobStore>>,
        cloud: Option<Arc<dyn BlobStore>>,
    ) -> Self {
        Self {
            root_path: root_path.to_path_buf(),
            config,
            index,
            disk,
            nas,
            cloud,
            extractor: Box::new(NoMetadata),
        }
    }

    pub fn with_extractor(mut self, extractor: Box<dyn MetadataExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn index(&self) -> &dyn IndexStore {
        self.index.as_ref()
    }

    pub fn disk(&self) -> &dyn BlobStore {
        self.disk.as_ref()
    }

    pub fn mirrors(&self) -> Mirrors<'_> {
        Mirrors {
            nas: self.nas.as_deref(),
            cloud: self.cloud.as_deref(),
        }
    }

    fn relocator<'a>(&self, store: &'a dyn BlobStore) -> BatchRelocator<'a> {
        BatchRelocator::new(store).with_poll_interval(Duration::from_millis(self.config.poll_interval_ms))
    }

    /// All distinct catalog directories.
    pub fn directories(&self) -> Result<Vec<String>, IndexError> {
        self.index.aggregate_distinct(Field::Path)
    }

    /// Runs entries through the ingestion write path.
    pub fn ingest<I>(&self, entries: I, options: IngestOptions) -> StoreReport
    where
        I: IntoIterator<Item = Entry>,
    {
        IngestionStore::new(self.index.as_ref())
            .with_options(options)
            .store(entries)
    }

    /// Catalogues the files of `dir`: scan, naming policy, ingestion, then
    /// placement into the disk origin and pushes to the configured mirrors.
    ///
    /// Entries whose copy fails at any stage lose their index document.
    pub fn catalog_directory(
        &self,
        dir: &Path,
        options: &CatalogOptions,
    ) -> Result<CatalogReport, CatalogError> {
        // 1. 扫描
        let scan = DirectoryScanner::new(dir)
            .recursive(options.recursive)
            .ignored_dirs(&self.config.ignored_dirs)
            .scan(self.extractor.as_ref())?;
        let mut report = CatalogReport {
            scanned: scan.entries.len(),
            rejected_extensions: scan.rejected_extensions,
            rejected_paths: scan.rejected_paths,
            unreadable: scan.unreadable,
            ..Default::default()
        };

        // 2. 命名
        let naming = NamingOptions {
            utc_offset_minutes: self.config.utc_offset_minutes,
            ..options.naming.clone()
        };
        let named = scan.entries.into_iter().map(|e| assign_identity(e, &naming));

        // 3. 写入索引
        let stored = self.ingest(named, options.ingest);
        report.stored = stored.stored.len();
        report.skipped = stored.skipped();
        if options.ingest.dry_run || stored.stored.is_empty() {
            return Ok(report);
        }

        // 4. 放入磁盘目录树
        let (in_place, to_place): (Vec<Entry>, Vec<Entry>) = stored
            .stored
            .into_iter()
            .partition(|e| self.is_in_place(e));
        let placement = self
            .relocator(self.disk.as_ref())
            .push_entries(self.index.as_ref(), &to_place, Placement::Origin)?;
        report.placed = placement.relocated.len();
        report.rolled_back += placement.rolled_back.len();

        // mirrors copy from the disk origin
        let mut on_disk: Vec<Entry> = in_place
            .into_iter()
            .chain(placement.relocated)
            .map(|mut e| {
                e.original_path = Some(self.config.disk_root.join(e.full_path()));
                e
            })
            .collect();

        // 5. 推送到镜像
        if !options.skip_mirrors {
            for target in [MirrorTarget::Nas, MirrorTarget::Cloud] {
                let Some(store) = self.mirrors().get(target) else {
                    continue;
                };
                let pushed = self.relocator(store).push_entries(
                    self.index.as_ref(),
                    &on_disk,
                    Placement::Mirror(target),
                )?;
                match target {
                    MirrorTarget::Nas => report.pushed_nas = pushed.relocated.len(),
                    MirrorTarget::Cloud => report.pushed_cloud = pushed.relocated.len(),
                }
                report.rolled_back += pushed.rolled_back.len();
                on_disk = pushed.relocated;
            }
        }

        info!(
            dir = %dir.display(),
            scanned = report.scanned,
            stored = report.stored,
            skipped = report.skipped,
            placed = report.placed,
            rolled_back = report.rolled_back,
            "directory catalogued"
        );
        Ok(report)
    }

    /// The entry's source already is its place in the disk origin.
    fn is_in_place(&self, entry: &Entry) -> bool {
        entry
            .original_path
            .as_deref()
            .is_some_and(|p| p == self.config.disk_root.join(entry.full_path()))
    }

    /// Removes duplicate documents (and their files) within one directory or
    /// in every directory.
    pub fn deduplicate(&self, scope: &DedupScope, dry_run: bool) -> Result<DedupReport, CatalogError> {
        let report = DirectoryDeduplicator::new(self.index.as_ref(), self.disk.as_ref())
            .with_mirrors(self.mirrors())
            .dry_run(dry_run)
            .find_and_resolve(scope)?;
        Ok(report)
    }

    /// Reconciles the index with the disk origin below `scope`.
    pub fn reconcile(
        &self,
        scope: &str,
        confirm: &dyn Confirm,
        dry_run: bool,
    ) -> Result<ReconcileReport, CatalogError> {
        let report = DiskCatalogReconciler::new(self.index.as_ref(), &self.config.disk_root, confirm)
            .with_mirrors(self.mirrors())
            .with_extractor(self.extractor.as_ref())
            .ignored_dirs(&self.config.ignored_dirs)
            .dry_run(dry_run)
            .run(scope)?;
        Ok(report)
    }
}
