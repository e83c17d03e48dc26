use std::cell::RefCell;
use std::fs;
use tempfile::tempdir;

use super::{entry, entry_for_file, write_file};
use crate::catalog::reconcile::{AutoApprove, AutoReject, DiskCatalogReconciler, ReconcileAction};
use crate::catalog::Mirrors;
use crate::index::sqlite::SqliteIndex;
use crate::index::{Filter, IndexStore};
use crate::storage::local::LocalBlobStore;

fn full_paths(index: &SqliteIndex) -> Vec<String> {
    let mut paths: Vec<String> = index
        .scan(&Filter::All)
        .unwrap()
        .into_iter()
        .map(|d| d.entry.full_path())
        .collect();
    paths.sort();
    paths
}

#[test]
fn test_in_sync_catalog_is_left_alone() {
    let dir = tempdir().unwrap();
    let index = SqliteIndex::open_in_memory().unwrap();
    for rel in ["2022/03_March/a.jpg", "2022/03_March/filmchen/b.mov"] {
        write_file(dir.path(), rel, rel);
        index.index(&entry_for_file(dir.path(), rel)).unwrap();
    }

    let report = DiskCatalogReconciler::new(&index, dir.path(), &AutoApprove)
        .run("")
        .unwrap();

    assert_eq!(report.in_sync, 2);
    assert!(report.updated.is_empty());
    assert!(report.moved.is_empty());
    assert!(report.orphans.is_empty());
    assert!(report.new_files.is_empty());
}

#[test]
fn test_moved_file_keeps_document_id() {
    // 1. 准备环境
    let dir = tempdir().unwrap();
    let index = SqliteIndex::open_in_memory().unwrap();
    write_file(dir.path(), "2022/03_March/a.jpg", "A");
    let id = index
        .index(&entry_for_file(dir.path(), "2022/03_March/a.jpg"))
        .unwrap();

    // 2. 在目录之外移动文件
    fs::create_dir_all(dir.path().join("2022/04_April")).unwrap();
    fs::rename(
        dir.path().join("2022/03_March/a.jpg"),
        dir.path().join("2022/04_April/renamed.jpg"),
    )
    .unwrap();

    // 3. 执行操作 (拒绝一切确认: 移动不需要确认)
    let report = DiskCatalogReconciler::new(&index, dir.path(), &AutoReject)
        .run("2022")
        .unwrap();

    // 4. 断言结果
    assert_eq!(
        report.moved,
        [(
            "2022/03_March/a.jpg".to_string(),
            "2022/04_April/renamed.jpg".to_string()
        )]
    );
    assert!(report.new_files.is_empty());
    assert!(report.orphans.is_empty());
    let doc = index.get(id).unwrap().unwrap();
    assert_eq!(doc.entry.full_path(), "2022/04_April/renamed.jpg");
    assert_eq!(full_paths(&index), ["2022/04_April/renamed.jpg"]);
}

#[test]
fn test_missing_copy_of_live_content_is_redundant() {
    let dir = tempdir().unwrap();
    let index = SqliteIndex::open_in_memory().unwrap();
    write_file(dir.path(), "x/a.jpg", "A");
    index.index(&entry_for_file(dir.path(), "x/a.jpg")).unwrap();
    // 同一内容的另一条记录, 文件已不存在
    let mut stale = entry_for_file(dir.path(), "x/a.jpg");
    stale.path = "y".to_string();
    index.index(&stale).unwrap();

    let asked = RefCell::new(0);
    let confirm = |_: &ReconcileAction| {
        *asked.borrow_mut() += 1;
        false
    };
    let report = DiskCatalogReconciler::new(&index, dir.path(), &confirm)
        .run("")
        .unwrap();

    assert_eq!(report.redundant, ["y/a.jpg"]);
    assert!(report.orphans.is_empty());
    assert_eq!(*asked.borrow(), 0);
    assert_eq!(full_paths(&index), ["x/a.jpg"]);
}

#[test]
fn test_live_copy_outside_scope_makes_document_redundant() {
    let dir = tempdir().unwrap();
    let nas_dir = tempdir().unwrap();
    let nas = LocalBlobStore::new(nas_dir.path());
    let index = SqliteIndex::open_in_memory().unwrap();
    write_file(dir.path(), "x/a.jpg", "A");
    index.index(&entry_for_file(dir.path(), "x/a.jpg")).unwrap();
    // 范围内的记录已没有文件, 但内容仍在范围外的 x/a.jpg 中
    let mut stale = entry_for_file(dir.path(), "x/a.jpg");
    stale.path = "y".to_string();
    stale.on_nas = true;
    index.index(&stale).unwrap();
    write_file(nas_dir.path(), "y/a.jpg", "A");

    let report = DiskCatalogReconciler::new(&index, dir.path(), &AutoApprove)
        .with_mirrors(Mirrors {
            nas: Some(&nas),
            cloud: None,
        })
        .run("y")
        .unwrap();

    assert_eq!(report.redundant, ["y/a.jpg"]);
    assert!(report.orphans.is_empty());
    assert_eq!(full_paths(&index), ["x/a.jpg"]);
    // 只删除记录, 不删除任何物理副本
    assert!(nas_dir.path().join("y/a.jpg").exists());
}

#[test]
fn test_orphan_needs_confirmation() {
    let dir = tempdir().unwrap();
    fs::create_dir_all(dir.path().join("2021")).unwrap();
    let index = SqliteIndex::open_in_memory().unwrap();
    index.index(&entry("gone.jpg", "2021", "G")).unwrap();

    let rejected = DiskCatalogReconciler::new(&index, dir.path(), &AutoReject)
        .run("2021")
        .unwrap();
    assert_eq!(rejected.orphans, ["2021/gone.jpg"]);
    assert!(rejected.orphans_deleted.is_empty());
    assert_eq!(full_paths(&index), ["2021/gone.jpg"]);

    let approved = DiskCatalogReconciler::new(&index, dir.path(), &AutoApprove)
        .run("2021")
        .unwrap();
    assert_eq!(approved.orphans_deleted, ["2021/gone.jpg"]);
    assert!(full_paths(&index).is_empty());
}

#[test]
fn test_orphan_deletion_removes_mirror_copy() {
    let disk_dir = tempdir().unwrap();
    let nas_dir = tempdir().unwrap();
    let nas = LocalBlobStore::new(nas_dir.path());
    let index = SqliteIndex::open_in_memory().unwrap();
    write_file(nas_dir.path(), "2021/gone.jpg", "G");
    let mut orphan = entry("gone.jpg", "2021", "G");
    orphan.on_nas = true;
    index.index(&orphan).unwrap();

    let report = DiskCatalogReconciler::new(&index, disk_dir.path(), &AutoApprove)
        .with_mirrors(Mirrors {
            nas: Some(&nas),
            cloud: None,
        })
        .run("")
        .unwrap();

    assert_eq!(report.orphans_deleted, ["2021/gone.jpg"]);
    assert!(!nas_dir.path().join("2021/gone.jpg").exists());
}

#[test]
fn test_new_files_are_ingested_after_confirmation() {
    let dir = tempdir().unwrap();
    let index = SqliteIndex::open_in_memory().unwrap();
    write_file(dir.path(), "2020/07_July/new.jpg", "N");
    write_file(dir.path(), "2020/07_July/skip.png", "S");
    write_file(dir.path(), "2020/07_July/notes.txt", "ignored type");
    write_file(dir.path(), "2020/07_July/_gsdata_/cache.jpg", "ignored dir");

    let confirm = |action: &ReconcileAction| match action {
        ReconcileAction::IngestNew(file) => file.name == "new.jpg",
        ReconcileAction::DeleteOrphan(_) => false,
    };
    let report = DiskCatalogReconciler::new(&index, dir.path(), &confirm)
        .run("2020")
        .unwrap();

    assert_eq!(
        report.new_files,
        ["2020/07_July/new.jpg", "2020/07_July/skip.png"]
    );
    assert_eq!(report.ingested, ["2020/07_July/new.jpg"]);
    assert_eq!(full_paths(&index), ["2020/07_July/new.jpg"]);
}

#[test]
fn test_drift_is_patched() {
    let dir = tempdir().unwrap();
    let index = SqliteIndex::open_in_memory().unwrap();
    write_file(dir.path(), "d/a.jpg", "before");
    let before = entry_for_file(dir.path(), "d/a.jpg");
    let id = index.index(&before).unwrap();

    write_file(dir.path(), "d/a.jpg", "after, and longer");
    let report = DiskCatalogReconciler::new(&index, dir.path(), &AutoReject)
        .run("d")
        .unwrap();

    assert_eq!(report.updated, ["d/a.jpg"]);
    let after = index.get(id).unwrap().unwrap().entry;
    assert_eq!(after.size, "after, and longer".len() as u64);
    assert_ne!(after.checksum, before.checksum);
    assert_eq!(after.checksum, entry_for_file(dir.path(), "d/a.jpg").checksum);
}

#[test]
fn test_decomposed_names_match_catalog() {
    let dir = tempdir().unwrap();
    let index = SqliteIndex::open_in_memory().unwrap();
    // 磁盘上是 NFD 形式, 索引中是 NFC 形式
    let decomposed = "Fe\u{301}te/Cafe\u{301}.jpg";
    write_file(dir.path(), decomposed, "A");
    let e = entry_for_file(dir.path(), decomposed);
    assert_eq!(e.full_path(), "F\u{e9}te/Caf\u{e9}.jpg");
    index.index(&e).unwrap();

    let report = DiskCatalogReconciler::new(&index, dir.path(), &AutoApprove)
        .run("F\u{e9}te")
        .unwrap();

    assert_eq!(report.in_sync, 1);
    assert!(report.new_files.is_empty());
    assert!(report.orphans.is_empty());
}

#[test]
fn test_dry_run_reports_without_changes() {
    let dir = tempdir().unwrap();
    let index = SqliteIndex::open_in_memory().unwrap();
    write_file(dir.path(), "m/a.jpg", "A");
    let id = index.index(&entry_for_file(dir.path(), "m/a.jpg")).unwrap();
    fs::rename(dir.path().join("m/a.jpg"), dir.path().join("m/b.jpg")).unwrap();
    index.index(&entry("gone.jpg", "m", "G")).unwrap();
    write_file(dir.path(), "m/new.jpg", "N");

    let report = DiskCatalogReconciler::new(&index, dir.path(), &AutoApprove)
        .dry_run(true)
        .run("m")
        .unwrap();

    assert!(report.dry_run);
    assert_eq!(report.moved.len(), 1);
    assert_eq!(report.orphans, ["m/gone.jpg"]);
    assert_eq!(report.new_files, ["m/new.jpg"]);
    assert!(report.orphans_deleted.is_empty());
    assert!(report.ingested.is_empty());
    assert_eq!(index.get(id).unwrap().unwrap().entry.full_path(), "m/a.jpg");
    assert_eq!(full_paths(&index), ["m/a.jpg", "m/gone.jpg"]);
}
#[cfg(unix)]
#[test]
fn test_invalid_new_file_does_not_abort_the_run() {
    let dir = tempdir().unwrap();
    let index = SqliteIndex::open_in_memory().unwrap();
    // 反斜杠在 Unix 上是合法的文件名字符, 但不是合法的条目名
    let bad = write_file(dir.path(), "2020/bad\\name.jpg", "B");
    write_file(dir.path(), "2020/good.jpg", "G");

    let report = DiskCatalogReconciler::new(&index, dir.path(), &AutoApprove)
        .run("2020")
        .unwrap();

    assert_eq!(report.new_files.len(), 2);
    assert_eq!(report.ingested, ["2020/good.jpg"]);
    assert_eq!(report.unreadable, [bad]);
    assert_eq!(full_paths(&index), ["2020/good.jpg"]);
}

#[test]
fn test_scope_limits_the_run() {
    let dir = tempdir().unwrap();
    fs::create_dir_all(dir.path().join("2022")).unwrap();
    let index = SqliteIndex::open_in_memory().unwrap();
    index.index(&entry("gone.jpg", "2021", "G")).unwrap();
    write_file(dir.path(), "2021/new.jpg", "N");

    let report = DiskCatalogReconciler::new(&index, dir.path(), &AutoApprove)
        .run("2022")
        .unwrap();

    assert!(report.orphans.is_empty());
    assert!(report.new_files.is_empty());
    assert_eq!(full_paths(&index), ["2021/gone.jpg"]);
}
