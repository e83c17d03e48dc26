/// The current version of the catalog configuration file format.
pub const CURRENT_CATALOG_VERSION: u32 = 1;

/// Name of the configuration file inside a catalog directory.
pub const CONFIG_FILE_NAME: &str = "catalog.json";

/// Default name of the SQLite index file inside a catalog directory.
pub const DEFAULT_DATABASE_NAME: &str = "catalog.db";

// --- 内容哈希 ---
/// Block size used by the two-level content hash (4 MiB).
pub const HASH_BLOCK_SIZE: usize = 4 * 1024 * 1024;

// --- 文件类型 ---
/// Extensions (lower case, without dot) accepted as images.
pub const IMAGE_TYPES: &[&str] = &[
    "png", "jpg", "jpeg", "jpg2", "jp2", "heic", "bmp", "gif", "orf", "nef", "cr2", "mpo",
];

/// Extensions accepted as videos.
pub const VIDEO_TYPES: &[&str] = &["mov", "avi", "mp4", "mpg", "m4v", "wmv", "mts", "3gp"];

/// Extensions of files kept in the catalog that are neither images nor videos.
pub const OTHER_TYPES: &[&str] = &["psd"];

// --- 目录结构 ---
/// Sub-bucket of a date folder that receives video entries.
pub const MOVIES_BUCKET: &str = "filmchen";

/// Month folder suffixes, index 0 is January.
pub const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

/// File names that are never catalogued.
pub const IGNORED_FILE_NAMES: &[&str] = &[".DS_Store"];

/// Directory names skipped while scanning, unless the configuration overrides them.
pub const DEFAULT_IGNORED_DIRS: &[&str] = &["_gsdata_"];

/// Time format of canonical timestamp names ("2017-02-18 22-15-38").
pub const TIMESTAMP_NAME_FORMAT: &str = "%Y-%m-%d %H-%M-%S";

/// Default interval between two polls of a remote relocation job.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 3000;
