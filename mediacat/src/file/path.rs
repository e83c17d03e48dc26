//! Logical catalog paths.
//!
//! A catalog path is a relative, `/`-separated directory such as
//! `2022/03_March`; the catalog root is the empty string. Paths coming from
//! different filesystems may carry precomposed or decomposed accents, so all
//! of them are brought to Unicode NFC before they are stored or compared.

use std::path::{Component, Path};
use unicode_normalization::UnicodeNormalization;

/// Normalizes a raw path into catalog form.
///
/// - `\` becomes `/`
/// - empty and `.` segments are dropped, `..` pops a segment
/// - no leading or trailing `/`
/// - Unicode NFC
///
/// Examples:
/// - "/2022//03_March/" -> "2022/03_March"
/// - "a/./b/../c" -> "a/c"
/// - "/" -> ""
pub fn normalize_catalog_path(raw: &str) -> String {
    let unified = raw.replace('\\', "/");
    let mut components: Vec<&str> = Vec::new();
    for component in unified.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                components.pop();
            }
            comp => components.push(comp),
        }
    }
    components.join("/").nfc().collect()
}

/// NFC form of a single name (no separator handling).
pub fn normalize_name(name: &str) -> String {
    name.nfc().collect()
}

/// Joins a catalog directory and a leaf name.
pub fn join(dir: &str, name: &str) -> String {
    let dir = normalize_catalog_path(dir);
    if dir.is_empty() {
        normalize_name(name)
    } else {
        format!("{}/{}", dir, normalize_name(name))
    }
}

/// Splits a file name into `(stem, extension)`; the extension keeps its case
/// and does not include the dot. Leading-dot names have no extension.
pub fn split_name(name: &str) -> (&str, Option<&str>) {
    match name.rfind('.') {
        Some(idx) if idx > 0 && idx + 1 < name.len() => (&name[..idx], Some(&name[idx + 1..])),
        _ => (name, None),
    }
}

/// Lower-cased extension of a file name, if any.
pub fn extension_lowercase(name: &str) -> Option<String> {
    split_name(name).1.map(|ext| ext.to_lowercase())
}

/// True if `path` equals `scope` or lies below it. The empty scope contains everything.
pub fn is_within(path: &str, scope: &str) -> bool {
    let path = normalize_catalog_path(path);
    let scope = normalize_catalog_path(scope);
    scope.is_empty() || path == scope || path.starts_with(&format!("{scope}/"))
}

/// Catalog path of `dir` relative to `root`, or `None` if `dir` is not below `root`.
pub fn relative_catalog_path(root: &Path, dir: &Path) -> Option<String> {
    let relative = dir.strip_prefix(root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    Some(normalize_catalog_path(&parts.join("/")))
}
