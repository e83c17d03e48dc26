use std::path::PathBuf;
use serde::{Deserialize, Serialize};

use crate::common::constants::{
    CURRENT_CATALOG_VERSION, DEFAULT_DATABASE_NAME, DEFAULT_IGNORED_DIRS, DEFAULT_POLL_INTERVAL_MS,
};

/// 代表 `catalog.json` 配置文件的顶层结构。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogConfig {
    /// 目录的名称
    pub name: String,
    /// 配置格式版本号
    pub version: u32,
    /// 索引数据库的路径 (相对于目录根), 例如 "catalog.db"
    #[serde(default = "default_database")]
    pub database: PathBuf,
    /// Root of the local disk origin.
    pub disk_root: PathBuf,
    /// Root of the NAS mirror, if one is mounted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nas_root: Option<PathBuf>,
    /// Root of the cloud mirror, if one is synced locally.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud_root: Option<PathBuf>,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// Fixed offset applied when formatting timestamp names and date folders.
    #[serde(default)]
    pub utc_offset_minutes: i32,
    #[serde(default = "default_ignored_dirs")]
    pub ignored_dirs: Vec<String>,
}

impl CatalogConfig {
    pub fn new(name: &str, disk_root: PathBuf) -> Self {
        Self {
            name: name.to_string(),
            version: CURRENT_CATALOG_VERSION,
            database: default_database(),
            disk_root,
            nas_root: None,
            cloud_root: None,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            utc_offset_minutes: 0,
            ignored_dirs: default_ignored_dirs(),
        }
    }
}

fn default_database() -> PathBuf {
    PathBuf::from(DEFAULT_DATABASE_NAME)
}

fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_ignored_dirs() -> Vec<String> {
    DEFAULT_IGNORED_DIRS.iter().map(|s| s.to_string()).collect()
}
