pub mod path;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef};
use rusqlite::ToSql;
use serde::{Deserialize, Serialize};

use crate::common::constants::{IMAGE_TYPES, OTHER_TYPES, VIDEO_TYPES};
use crate::common::hash::CatalogHash;
use crate::file::path::{extension_lowercase, join, normalize_catalog_path, normalize_name};

/// Errors raised while building an [`Entry`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EntryError {
    /// The extension matches none of the known kinds.
    //
    // // 扩展名不属于任何已知类型。
    #[error("Unsupported file type: '{0}'")]
    UnsupportedType(String),

    /// The name is empty or contains a path separator.
    #[error("A file name must be a plain name, not a path: '{0}'")]
    InvalidName(String),
}

/// The kind of media an entry holds, decided once from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Image,
    Video,
    Other,
}

impl EntryKind {
    /// Classifies a lower- or mixed-case extension (without the dot).
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.to_lowercase();
        if IMAGE_TYPES.contains(&ext.as_str()) {
            Some(EntryKind::Image)
        } else if VIDEO_TYPES.contains(&ext.as_str()) {
            Some(EntryKind::Video)
        } else if OTHER_TYPES.contains(&ext.as_str()) {
            Some(EntryKind::Other)
        } else {
            None
        }
    }

    /// Classifies a file name by its extension.
    pub fn classify(name: &str) -> Option<Self> {
        extension_lowercase(name).and_then(|ext| Self::from_extension(&ext))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Image => "image",
            EntryKind::Video => "video",
            EntryKind::Other => "other",
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryKind {
    type Err = EntryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image" => Ok(EntryKind::Image),
            "video" => Ok(EntryKind::Video),
            "other" => Ok(EntryKind::Other),
            other => Err(EntryError::UnsupportedType(other.to_string())),
        }
    }
}

impl ToSql for EntryKind {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for EntryKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()
            .and_then(|s| EntryKind::from_str(s).map_err(|e| FromSqlError::Other(Box::new(e))))
    }
}

/// One physical media item as the catalog sees it.
///
/// The record is the same whether it was built by scanning a directory or
/// materialized from an index document. Optional metadata stays `None` when
/// extraction failed or does not apply to the kind.
//
// // 代表目录中的一个媒体文件记录。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    /// Leaf file name, extension case preserved.
    pub name: String,
    /// Logical directory, e.g. `2022/03_March`.
    pub path: String,
    pub size: u64,
    /// Device / file modification time, epoch millis.
    pub modified: i64,
    /// Content hash of the bytes.
    pub checksum: CatalogHash,
    /// Extracted shooting time, epoch millis.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub captured: Option<i64>,
    /// `"lat,lon"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// `"WxH"`, images only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<String>,
    /// Seconds, videos only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
    pub kind: EntryKind,
    /// Where the bytes were read from before any relocation. Never persisted.
    #[serde(skip)]
    pub original_path: Option<PathBuf>,
    #[serde(default)]
    pub on_nas: bool,
    #[serde(default)]
    pub on_cloud: bool,
    /// The path was not derived from trusted capture metadata; ingestion
    /// must check whether the content is already catalogued elsewhere.
    #[serde(default)]
    pub check_catalog: bool,
}

impl Entry {
    /// Builds an entry with only structural facts. The kind is derived from
    /// the extension; unknown extensions are rejected.
    pub fn new(
        name: &str,
        path: &str,
        size: u64,
        modified: i64,
        checksum: CatalogHash,
    ) -> Result<Self, EntryError> {
        validate_name(name)?;
        let kind = EntryKind::classify(name)
            .ok_or_else(|| EntryError::UnsupportedType(extension_lowercase(name).unwrap_or_default()))?;
        Ok(Self {
            name: normalize_name(name),
            path: normalize_catalog_path(path),
            size,
            modified,
            checksum,
            captured: None,
            location: None,
            dimensions: None,
            duration: None,
            kind,
            original_path: None,
            on_nas: false,
            on_cloud: false,
            check_catalog: false,
        })
    }

    /// `path/name`.
    pub fn full_path(&self) -> String {
        join(&self.path, &self.name)
    }

    /// Identity of "these bytes, filed at this logical location". The dedup key.
    pub fn path_hash(&self) -> CatalogHash {
        CatalogHash::of_text(&format!(
            "{}{}",
            normalize_catalog_path(&self.path),
            self.checksum
        ))
    }

    /// Identity of "this display name at this path", independent of content.
    pub fn name_hash(&self) -> CatalogHash {
        CatalogHash::of_text(&format!(
            "{}/{}",
            normalize_catalog_path(&self.path),
            normalize_name(&self.name)
        ))
    }

    pub fn set_location_from_lat_lon(&mut self, latitude: f64, longitude: f64) {
        self.location = Some(location_from_lat_lon(latitude, longitude));
    }

    /// Fields in which `other` differs from `self`, expressed as a patch
    /// that turns `self` into `other`.
    pub fn diff(&self, other: &Entry) -> EntryPatch {
        EntryPatch {
            name: (self.name != other.name).then(|| other.name.clone()),
            path: (self.path != other.path).then(|| other.path.clone()),
            size: (self.size != other.size).then_some(other.size),
            modified: (self.modified != other.modified).then_some(other.modified),
            checksum: (self.checksum != other.checksum).then_some(other.checksum),
            on_nas: (self.on_nas != other.on_nas).then_some(other.on_nas),
            on_cloud: (self.on_cloud != other.on_cloud).then_some(other.on_cloud),
        }
    }

    pub fn apply(&mut self, patch: &EntryPatch) {
        if let Some(name) = &patch.name {
            self.name = normalize_name(name);
        }
        if let Some(path) = &patch.path {
            self.path = normalize_catalog_path(path);
        }
        if let Some(size) = patch.size {
            self.size = size;
        }
        if let Some(modified) = patch.modified {
            self.modified = modified;
        }
        if let Some(checksum) = patch.checksum {
            self.checksum = checksum;
        }
        if let Some(on_nas) = patch.on_nas {
            self.on_nas = on_nas;
        }
        if let Some(on_cloud) = patch.on_cloud {
            self.on_cloud = on_cloud;
        }
    }
}

/// A partial update of an indexed entry. `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryPatch {
    pub name: Option<String>,
    pub path: Option<String>,
    pub size: Option<u64>,
    pub modified: Option<i64>,
    pub checksum: Option<CatalogHash>,
    pub on_nas: Option<bool>,
    pub on_cloud: Option<bool>,
}

impl EntryPatch {
    pub fn is_empty(&self) -> bool {
        *self == EntryPatch::default()
    }

    /// Moves the entry to `path/name`.
    pub fn relocation(path: &str, name: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            path: Some(path.to_string()),
            ..Default::default()
        }
    }
}

/// `"lat,lon"` rounded to 5 decimals.
pub fn location_from_lat_lon(latitude: f64, longitude: f64) -> String {
    let round = |v: f64| (v * 100_000.0).round() / 100_000.0;
    format!("{},{}", round(latitude), round(longitude))
}

pub(crate) fn validate_name(name: &str) -> Result<(), EntryError> {
    if name.is_empty() || name.contains('/') || name.contains('\\') {
        return Err(EntryError::InvalidName(name.to_string()));
    }
    Ok(())
}
