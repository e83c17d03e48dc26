use std::fmt::Debug;
use std::path::Path;

use crate::file::{Entry, EntryKind};

/// Optional facts read from inside a media file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedMetadata {
    /// Shooting time, epoch millis.
    pub captured: Option<i64>,
    /// `(latitude, longitude)` in degrees.
    pub coordinates: Option<(f64, f64)>,
    /// `(width, height)`, images only.
    pub dimensions: Option<(u32, u32)>,
    /// Seconds, videos only.
    pub duration: Option<u32>,
}

impl ExtractedMetadata {
    /// Copies the extracted facts onto `entry`, respecting which fields
    /// apply to the entry's kind.
    pub fn apply_to(&self, entry: &mut Entry) {
        if let Some(captured) = self.captured {
            entry.captured = Some(captured);
        }
        if let Some((lat, lon)) = self.coordinates {
            entry.set_location_from_lat_lon(lat, lon);
        }
        match entry.kind {
            EntryKind::Image => {
                if let Some((w, h)) = self.dimensions {
                    entry.dimensions = Some(format!("{w}x{h}"));
                }
            }
            EntryKind::Video => {
                if self.duration.is_some() {
                    entry.duration = self.duration;
                }
            }
            EntryKind::Other => {}
        }
    }
}

/// Reads capture metadata (EXIF, container headers) from a file.
///
/// Extraction never fails a scan: implementations return an empty
/// [`ExtractedMetadata`] when nothing could be read.
pub trait MetadataExtractor: Debug {
    fn extract(&self, path: &Path, kind: EntryKind) -> ExtractedMetadata;
}

/// Extractor that never finds anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoMetadata;

impl MetadataExtractor for NoMetadata {
    fn extract(&self, _path: &Path, _kind: EntryKind) -> ExtractedMetadata {
        ExtractedMetadata::default()
    }
}
