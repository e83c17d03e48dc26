mod reconcile_test;

use std::fs;
use std::path::{Path, PathBuf};

use crate::common::hash::CatalogHash;
use crate::file::Entry;
use crate::utils::hash::hash_file;

/// 构造一个只有结构信息的条目 (内容由字符串决定)
pub(crate) fn entry(name: &str, path: &str, content: &str) -> Entry {
    Entry::new(name, path, content.len() as u64, 1_587_456_138_000, CatalogHash::of_text(content)).unwrap()
}

/// 在 `root/rel` 写入文件, 自动创建父目录
pub(crate) fn write_file(root: &Path, rel: &str, content: &str) -> PathBuf {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, content).unwrap();
    path
}

/// 为磁盘上已存在的文件构造一条与之完全一致的记录
pub(crate) fn entry_for_file(root: &Path, rel: &str) -> Entry {
    let absolute = root.join(rel);
    let (dir, name) = rel.rsplit_once('/').unwrap_or(("", rel));
    let (size, modified) = crate::catalog::scan::stat(&absolute).unwrap();
    let mut entry = Entry::new(name, dir, size, modified, hash_file(&absolute).unwrap()).unwrap();
    entry.original_path = Some(absolute);
    entry
}
