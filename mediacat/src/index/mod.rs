pub mod sqlite;

use std::fmt;
use std::fmt::Debug;

use crate::common::hash::HashParseError;
use crate::file::path::{normalize_catalog_path, normalize_name};
use crate::file::{Entry, EntryPatch};

/// Defines errors that can occur while talking to the index store.
//
// // 定义与索引存储交互时可能发生的错误。
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// An error occurred while interacting with the database.
    //
    // // 与数据库交互时发生错误。
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The document violates the index schema and was not written.
    //
    // // 文档不符合索引结构，未被写入。
    #[error("Document rejected by the index: {0}")]
    Rejected(String),

    /// No document carries the given id.
    #[error("Document {0} not found")]
    NotFound(DocId),

    /// A stored hash failed to parse.
    #[error("Hash parsing error: {0}")]
    HashParse(#[from] HashParseError),

    /// The index file or its directory could not be accessed.
    #[error("Index I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Identifier the index assigns to a document. Survives `update`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocId(pub i64);

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An indexed entry together with its id.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: DocId,
    pub entry: Entry,
}

/// Fields usable in term filters and distinct aggregations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Checksum,
    PathHash,
    NameHash,
    Path,
    Name,
}

impl Field {
    pub(crate) fn column(&self) -> &'static str {
        match self {
            Field::Checksum => "checksum",
            Field::PathHash => "path_hash",
            Field::NameHash => "name_hash",
            Field::Path => "path",
            Field::Name => "name",
        }
    }

    /// Brings a query value into the form the field is stored in.
    pub(crate) fn normalize_value(&self, value: &str) -> String {
        match self {
            Field::Path => normalize_catalog_path(value),
            Field::Name => normalize_name(value),
            Field::Checksum | Field::PathHash | Field::NameHash => value.to_lowercase(),
        }
    }
}

/// Selects a set of documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    All,
    /// Documents filed exactly in this directory.
    Directory(String),
    /// Documents in this directory or any directory below it. The root
    /// (empty path) selects everything.
    Subtree(String),
    /// Documents whose field equals the value.
    Term(Field, String),
}

/// The searchable document store that is the single source of truth of the catalog.
///
/// Derived identities (`path_hash`, `name_hash`) are computed by the store from
/// the entry on every write and update; callers never supply them.
//
// // 目录唯一的事实来源。派生哈希由存储自身在每次写入时计算。
pub trait IndexStore: Debug {
    /// Writes a new document and returns its id.
    fn index(&self, entry: &Entry) -> Result<DocId, IndexError>;

    fn get(&self, id: DocId) -> Result<Option<Document>, IndexError>;

    /// All documents whose `field` equals `value`.
    fn term_query(&self, field: Field, value: &str) -> Result<Vec<Document>, IndexError>;

    /// True if at least one document has `field == value`.
    fn contains(&self, field: Field, value: &str) -> Result<bool, IndexError> {
        Ok(!self.term_query(field, value)?.is_empty())
    }

    /// All documents matching the filter, in id order.
    fn scan(&self, filter: &Filter) -> Result<Vec<Document>, IndexError>;

    /// Applies a partial update in place. The id is preserved.
    fn update(&self, id: DocId, patch: &EntryPatch) -> Result<(), IndexError>;

    fn delete(&self, id: DocId) -> Result<(), IndexError>;

    /// Deletes every matching document, returning how many were removed.
    fn delete_by_query(&self, filter: &Filter) -> Result<usize, IndexError>;

    /// Distinct values of `field`, sorted.
    fn aggregate_distinct(&self, field: Field) -> Result<Vec<String>, IndexError>;
}
