//! Deterministic catalog path and display name of an entry.
//!
//! The policy only looks at fields that are already set on the entry and
//! recognises the markers it adds itself (`<timestamp>@` prefix and
//! ` <timestamp>` suffix), so applying it twice with the same options leaves
//! the entry unchanged.

use std::path::Path;

use crate::common::constants::MOVIES_BUCKET;
use crate::file::path::{join, normalize_catalog_path, split_name};
use crate::file::{Entry, EntryKind};
use crate::utils::time::{
    date_folder, date_folder_from_millis, date_from_dir_path, date_from_file_name,
    format_timestamp, is_timestamp_stem,
};

/// Length of a formatted timestamp, e.g. `2017-02-18 22-15-38`.
const STAMP_LEN: usize = 19;

/// Options of the naming policy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamingOptions {
    /// Explicit destination directory.
    pub destination: Option<String>,
    /// Place entries in `YYYY/MM_Month` folders (below `destination`, if given).
    pub by_year_month: bool,
    /// Rename to the captured timestamp when one exists.
    pub name_from_captured: bool,
    /// Prefix the stem with the modified timestamp; a captured timestamp wins.
    pub name_from_modified: bool,
    /// Keep human-authored names, appending the captured timestamp.
    pub keep_manual_names: bool,
    pub utc_offset_minutes: i32,
}

/// Decides the catalog `path` and `name` of `entry`.
///
/// # Path
/// 1. An explicit destination without `by_year_month` is used verbatim.
/// 2. Otherwise the date folder comes from the captured time, else from a date
///    embedded in the original file name or directory (this also sets
///    `check_catalog`), else from the modified time. With `by_year_month` the
///    folder goes below the destination, if one is given.
/// 3. Videos placed by date go to the `filmchen` sub-bucket.
///
/// # Name
/// Later rules override earlier ones:
/// 1. `name_from_modified`: `<modified>@<stem>.<ext>`
/// 2. `name_from_captured` or `name_from_modified` with a captured time: `<captured>.<ext>`
/// 3. `keep_manual_names`: a mostly-text stem is kept (plus ` <captured>`),
///    otherwise a captured time still wins.
///
/// Rewritten names always carry a lower-case extension.
//
// // 根据元数据为条目确定目录路径与显示名称。该过程是确定且幂等的。
pub fn assign_identity(mut entry: Entry, options: &NamingOptions) -> Entry {
    // 路径必须先于名称决定：嵌入日期需要读取原始文件名
    assign_path(&mut entry, options);
    if let Some(name) = derive_name(&entry, options) {
        entry.name = name;
    }
    entry
}

fn assign_path(entry: &mut Entry, options: &NamingOptions) {
    if let (Some(destination), false) = (&options.destination, options.by_year_month) {
        entry.path = normalize_catalog_path(destination);
        return;
    }

    let offset = options.utc_offset_minutes;
    let (folder, from_embedded_date) = match entry.captured {
        Some(captured) => (date_folder_from_millis(captured, offset), false),
        None => match embedded_date_folder(entry) {
            Some(folder) => (Some(folder), true),
            None => (date_folder_from_millis(entry.modified, offset), false),
        },
    };
    let Some(folder) = folder else {
        return;
    };

    let mut path = join(options.destination.as_deref().unwrap_or(""), &folder);
    if entry.kind == EntryKind::Video {
        path = join(&path, MOVIES_BUCKET);
    }
    entry.path = path;
    if from_embedded_date {
        entry.check_catalog = true;
    }
}

/// Date folder from a date in the file name or in the source directory.
fn embedded_date_folder(entry: &Entry) -> Option<String> {
    // a modified-time prefix added by this policy is not an embedded date
    let stem = strip_policy_markers(split_name(&entry.name).0);
    if let Some(date) = date_from_file_name(stem) {
        return Some(date_folder(date));
    }
    let source_dir = entry
        .original_path
        .as_deref()
        .and_then(Path::parent)
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_else(|| entry.path.clone());
    date_from_dir_path(&source_dir).map(date_folder)
}

fn derive_name(entry: &Entry, options: &NamingOptions) -> Option<String> {
    let offset = options.utc_offset_minutes;
    let (raw_stem, ext) = split_name(&entry.name);
    let stem = strip_policy_markers(raw_stem);
    let ext = ext.map(|e| format!(".{}", e.to_lowercase())).unwrap_or_default();
    let captured = entry.captured.and_then(|c| format_timestamp(c, offset));

    let mut name = None;
    if options.name_from_modified {
        if let Some(modified) = format_timestamp(entry.modified, offset) {
            name = Some(format!("{modified}@{stem}{ext}"));
        }
    }
    if options.name_from_captured || options.name_from_modified {
        if let Some(captured) = &captured {
            name = Some(format!("{captured}{ext}"));
        }
    }
    if options.keep_manual_names {
        if is_mostly_text(stem) {
            name = Some(match &captured {
                Some(captured) => format!("{stem} {captured}{ext}"),
                None => format!("{stem}{ext}"),
            });
        } else if let Some(captured) = &captured {
            name = Some(format!("{captured}{ext}"));
        }
    }
    name
}

/// Removes a `<timestamp>@` prefix and a ` <timestamp>` suffix.
fn strip_policy_markers(stem: &str) -> &str {
    let stem = match stem.split_once('@') {
        Some((prefix, rest)) if is_timestamp_stem(prefix) => rest,
        _ => stem,
    };
    let suffix_len = STAMP_LEN + 1;
    if stem.len() > suffix_len && stem.is_char_boundary(stem.len() - suffix_len) {
        let (head, tail) = stem.split_at(stem.len() - suffix_len);
        if tail.strip_prefix(' ').is_some_and(is_timestamp_stem) {
            return head;
        }
    }
    stem
}

/// Letters and spaces make up more than half of the stem.
fn is_mostly_text(stem: &str) -> bool {
    let total = stem.chars().count();
    if total == 0 {
        return false;
    }
    let text = stem.chars().filter(|c| c.is_alphabetic() || *c == ' ').count();
    text * 2 > total
}
