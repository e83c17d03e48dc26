use std::sync::LazyLock;
use std::time::{SystemTime, UNIX_EPOCH};
use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, Offset, Utc};
use regex::Regex;

use crate::common::constants::{MONTH_NAMES, TIMESTAMP_NAME_FORMAT};

/// `YYYYMMDD` or `YYYY-MM-DD` embedded in a file name.
static NAME_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|\D)((?:19|20)\d{2})(?:(\d{2})(\d{2})|-(\d{2})-(\d{2}))(?:\D|$)")
        .expect("static regex")
});

/// `YYYY/MM/DD` inside a directory path.
static DIR_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|/)((?:19|20)\d{2})/(\d{2})/(\d{2})(?:/|$)").expect("static regex")
});

/// Canonical timestamp name pattern, e.g. `2008-08-16 13-45-01.jpg`.
static TIMESTAMP_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{4}-\d\d-\d\d \d\d-\d\d-\d\d\.\w+$").expect("static regex")
});

/// A bare timestamp stem, e.g. `2008-08-16 13-45-01`.
static TIMESTAMP_STEM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{4}-\d\d-\d\d \d\d-\d\d-\d\d$").expect("static regex")
});

fn offset(utc_offset_minutes: i32) -> FixedOffset {
    FixedOffset::east_opt(utc_offset_minutes.saturating_mul(60))
        .unwrap_or_else(|| Utc.fix())
}

fn local_time(millis: i64, utc_offset_minutes: i32) -> Option<DateTime<FixedOffset>> {
    DateTime::<Utc>::from_timestamp_millis(millis).map(|dt| dt.with_timezone(&offset(utc_offset_minutes)))
}

/// Formats epoch millis as a canonical timestamp name stem ("2017-02-18 22-15-38").
pub fn format_timestamp(millis: i64, utc_offset_minutes: i32) -> Option<String> {
    local_time(millis, utc_offset_minutes).map(|dt| dt.format(TIMESTAMP_NAME_FORMAT).to_string())
}

/// Year/month folder for a calendar date, e.g. `2022/03_March`.
pub fn date_folder(date: NaiveDate) -> String {
    let month = date.month() as usize;
    format!("{:04}/{:02}_{}", date.year(), month, MONTH_NAMES[month - 1])
}

/// Year/month folder for epoch millis.
pub fn date_folder_from_millis(millis: i64, utc_offset_minutes: i32) -> Option<String> {
    local_time(millis, utc_offset_minutes).map(|dt| date_folder(dt.date_naive()))
}

/// Finds the first plausible `YYYYMMDD` / `YYYY-MM-DD` date in a file name.
pub fn date_from_file_name(name: &str) -> Option<NaiveDate> {
    NAME_DATE.captures_iter(name).find_map(|caps| {
        let year = caps.get(1)?.as_str().parse().ok()?;
        let (month, day) = match (caps.get(2), caps.get(3)) {
            (Some(m), Some(d)) => (m, d),
            _ => (caps.get(4)?, caps.get(5)?),
        };
        NaiveDate::from_ymd_opt(year, month.as_str().parse().ok()?, day.as_str().parse().ok()?)
    })
}

/// Finds a `YYYY/MM/DD` date in a directory path.
pub fn date_from_dir_path(path: &str) -> Option<NaiveDate> {
    let path = path.replace('\\', "/");
    DIR_DATE.captures_iter(&path).find_map(|caps| {
        NaiveDate::from_ymd_opt(
            caps.get(1)?.as_str().parse().ok()?,
            caps.get(2)?.as_str().parse().ok()?,
            caps.get(3)?.as_str().parse().ok()?,
        )
    })
}

/// True if `name` is exactly a canonical timestamp name plus extension.
pub fn is_timestamp_name(name: &str) -> bool {
    TIMESTAMP_NAME.is_match(name)
}

/// True if `stem` is exactly a timestamp, without extension.
pub fn is_timestamp_stem(stem: &str) -> bool {
    TIMESTAMP_STEM.is_match(stem)
}

/// Converts a filesystem time to epoch millis (negative before 1970).
pub fn system_time_to_millis(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_millis() as i64,
        Err(e) => -(e.duration().as_millis() as i64),
    }
}
