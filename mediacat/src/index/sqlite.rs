use std::path::Path;
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};
use tracing::debug;

use crate::file::{validate_name, Entry, EntryPatch};
use crate::index::{DocId, Document, Field, Filter, IndexError, IndexStore};

const SELECT_COLUMNS: &str = "id, name, path, size, modified, checksum, kind, captured, \
     location, dimensions, duration, on_nas, on_cloud, check_catalog";

/// The index store on a single SQLite database.
#[derive(Debug)]
pub struct SqliteIndex {
    conn: Connection,
}

impl SqliteIndex {
    /// Opens (or creates) the index database at `path`.
    pub fn open(path: &Path) -> Result<Self, IndexError> {
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, IndexError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, IndexError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS entries (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                name            TEXT NOT NULL,
                path            TEXT NOT NULL,
                size            INTEGER NOT NULL,
                modified        INTEGER NOT NULL,
                checksum        CHAR(64) NOT NULL,
                path_hash       CHAR(64) NOT NULL,
                name_hash       CHAR(64) NOT NULL,
                kind            TEXT NOT NULL,
                captured        INTEGER,
                location        TEXT,
                dimensions      TEXT,
                duration        INTEGER,
                on_nas          INTEGER NOT NULL DEFAULT 0,
                on_cloud        INTEGER NOT NULL DEFAULT 0,
                check_catalog   INTEGER NOT NULL DEFAULT 0
             );
             CREATE INDEX IF NOT EXISTS idx_entries_checksum ON entries(checksum);
             CREATE INDEX IF NOT EXISTS idx_entries_path_hash ON entries(path_hash);
             CREATE INDEX IF NOT EXISTS idx_entries_name_hash ON entries(name_hash);
             CREATE INDEX IF NOT EXISTS idx_entries_path ON entries(path);",
        )?;
        Ok(Self { conn })
    }

    fn query_documents(&self, filter: &Filter) -> Result<Vec<Document>, IndexError> {
        let (clause, values) = filter_clause(filter);
        let sql = format!("SELECT {SELECT_COLUMNS} FROM entries WHERE {clause} ORDER BY id");
        let mut stmt = self.conn.prepare(&sql)?;
        let docs = stmt
            .query_map(params_from_iter(values.iter()), row_to_document)?
            .collect::<Result<Vec<Document>, _>>()?;
        Ok(docs)
    }
}

/// WHERE clause and its positional values for a filter.
fn filter_clause(filter: &Filter) -> (String, Vec<String>) {
    match filter {
        Filter::All => ("1 = 1".to_string(), Vec::new()),
        Filter::Directory(path) => (
            "path = ?1".to_string(),
            vec![Field::Path.normalize_value(path)],
        ),
        Filter::Subtree(path) => {
            let scope = Field::Path.normalize_value(path);
            if scope.is_empty() {
                return filter_clause(&Filter::All);
            }
            // substr instead of LIKE: `_` is common in folder names
            (
                "(path = ?1 OR substr(path, 1, length(?1) + 1) = ?1 || '/')".to_string(),
                vec![scope],
            )
        }
        Filter::Term(field, value) => (
            format!("{} = ?1", field.column()),
            vec![field.normalize_value(value)],
        ),
    }
}

fn row_to_document(row: &Row<'_>) -> rusqlite::Result<Document> {
    let size: i64 = row.get(3)?;
    Ok(Document {
        id: DocId(row.get(0)?),
        entry: Entry {
            name: row.get(1)?,
            path: row.get(2)?,
            size: size as u64,
            modified: row.get(4)?,
            checksum: row.get(5)?,
            kind: row.get(6)?,
            captured: row.get(7)?,
            location: row.get(8)?,
            dimensions: row.get(9)?,
            duration: row.get(10)?,
            original_path: None,
            on_nas: row.get(11)?,
            on_cloud: row.get(12)?,
            check_catalog: row.get(13)?,
        },
    })
}

/// Schema checks a document must pass before it is written.
fn validate(entry: &Entry) -> Result<i64, IndexError> {
    validate_name(&entry.name).map_err(|e| IndexError::Rejected(e.to_string()))?;
    if entry.size == 0 {
        return Err(IndexError::Rejected(format!(
            "'{}' has size 0",
            entry.full_path()
        )));
    }
    i64::try_from(entry.size)
        .map_err(|_| IndexError::Rejected(format!("size {} out of range", entry.size)))
}

impl IndexStore for SqliteIndex {
    fn index(&self, entry: &Entry) -> Result<DocId, IndexError> {
        let size = validate(entry)?;
        self.conn.execute(
            "INSERT INTO entries (name, path, size, modified, checksum, path_hash, name_hash, kind,
                                  captured, location, dimensions, duration, on_nas, on_cloud, check_catalog)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                entry.name,
                entry.path,
                size,
                entry.modified,
                entry.checksum,
                entry.path_hash(),
                entry.name_hash(),
                entry.kind,
                entry.captured,
                entry.location,
                entry.dimensions,
                entry.duration,
                entry.on_nas,
                entry.on_cloud,
                entry.check_catalog,
            ],
        )?;
        let id = DocId(self.conn.last_insert_rowid());
        debug!(%id, path = %entry.full_path(), "indexed");
        Ok(id)
    }

    fn get(&self, id: DocId) -> Result<Option<Document>, IndexError> {
        let sql = format!("SELECT {SELECT_COLUMNS} FROM entries WHERE id = ?1");
        Ok(self
            .conn
            .query_row(&sql, params![id.0], row_to_document)
            .optional()?)
    }

    fn term_query(&self, field: Field, value: &str) -> Result<Vec<Document>, IndexError> {
        self.query_documents(&Filter::Term(field, value.to_string()))
    }

    fn scan(&self, filter: &Filter) -> Result<Vec<Document>, IndexError> {
        self.query_documents(filter)
    }

    fn update(&self, id: DocId, patch: &EntryPatch) -> Result<(), IndexError> {
        let mut entry = self.get(id)?.ok_or(IndexError::NotFound(id))?.entry;
        entry.apply(patch);
        let size = validate(&entry)?;
        self.conn.execute(
            "UPDATE entries SET name = ?1, path = ?2, size = ?3, modified = ?4, checksum = ?5,
                                path_hash = ?6, name_hash = ?7, on_nas = ?8, on_cloud = ?9
             WHERE id = ?10",
            params![
                entry.name,
                entry.path,
                size,
                entry.modified,
                entry.checksum,
                entry.path_hash(),
                entry.name_hash(),
                entry.on_nas,
                entry.on_cloud,
                id.0,
            ],
        )?;
        debug!(%id, path = %entry.full_path(), "updated");
        Ok(())
    }

    fn delete(&self, id: DocId) -> Result<(), IndexError> {
        let affected = self
            .conn
            .execute("DELETE FROM entries WHERE id = ?1", params![id.0])?;
        if affected == 0 {
            return Err(IndexError::NotFound(id));
        }
        Ok(())
    }

    fn delete_by_query(&self, filter: &Filter) -> Result<usize, IndexError> {
        let (clause, values) = filter_clause(filter);
        let sql = format!("DELETE FROM entries WHERE {clause}");
        Ok(self.conn.execute(&sql, params_from_iter(values.iter()))?)
    }

    fn aggregate_distinct(&self, field: Field) -> Result<Vec<String>, IndexError> {
        let column = field.column();
        let sql = format!("SELECT DISTINCT {column} FROM entries ORDER BY {column}");
        let mut stmt = self.conn.prepare(&sql)?;
        let values = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::hash::CatalogHash;

    fn entry(name: &str, path: &str, content: &str) -> Entry {
        Entry::new(name, path, 100, 1587456138000, CatalogHash::of_text(content)).unwrap()
    }

    #[test]
    fn test_index_and_term_query() {
        let index = SqliteIndex::open_in_memory().unwrap();
        let e = entry("spiderman.jpg", "2022/03_March", "A");
        let id = index.index(&e).unwrap();

        let hits = index
            .term_query(Field::PathHash, &e.path_hash().to_hex())
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, id);
        assert_eq!(hits[0].entry, e);

        assert!(index.contains(Field::Checksum, &e.checksum.to_hex()).unwrap());
        assert!(index.contains(Field::NameHash, &e.name_hash().to_hex()).unwrap());
        assert!(!index.contains(Field::Name, "spidey.jpg").unwrap());
    }

    #[test]
    fn test_rejects_schema_violations() {
        let index = SqliteIndex::open_in_memory().unwrap();
        let mut e = entry("a.jpg", "x", "A");
        e.size = 0;
        assert!(matches!(index.index(&e), Err(IndexError::Rejected(_))));
        let mut e = entry("a.jpg", "x", "A");
        e.name = "x/a.jpg".to_string();
        assert!(matches!(index.index(&e), Err(IndexError::Rejected(_))));
    }

    #[test]
    fn test_update_preserves_id_and_recomputes_hashes() {
        let index = SqliteIndex::open_in_memory().unwrap();
        let e = entry("a.jpg", "2020/01_January", "A");
        let id = index.index(&e).unwrap();

        index
            .update(id, &EntryPatch::relocation("2021/02_February", "b.jpg"))
            .unwrap();
        let doc = index.get(id).unwrap().unwrap();
        assert_eq!(doc.entry.full_path(), "2021/02_February/b.jpg");
        assert!(index
            .contains(Field::PathHash, &doc.entry.path_hash().to_hex())
            .unwrap());
        assert!(!index.contains(Field::PathHash, &e.path_hash().to_hex()).unwrap());

        assert!(matches!(
            index.update(DocId(999), &EntryPatch::default()),
            Err(IndexError::NotFound(_))
        ));
    }

    #[test]
    fn test_subtree_filter_does_not_treat_underscore_as_wildcard() {
        let index = SqliteIndex::open_in_memory().unwrap();
        index.index(&entry("a.jpg", "2022/03_March", "A")).unwrap();
        index.index(&entry("b.jpg", "2022/03_March/filmchen", "B")).unwrap();
        index.index(&entry("c.jpg", "2022/03XMarch", "C")).unwrap();
        index.index(&entry("d.jpg", "2022/03_March2", "D")).unwrap();

        let names = |filter: Filter| -> Vec<String> {
            index
                .scan(&filter)
                .unwrap()
                .into_iter()
                .map(|d| d.entry.name)
                .collect()
        };
        assert_eq!(names(Filter::Subtree("2022/03_March".into())), ["a.jpg", "b.jpg"]);
        assert_eq!(names(Filter::Directory("/2022/03_March/".into())), ["a.jpg"]);
        assert_eq!(names(Filter::Subtree("".into())).len(), 4);
    }

    #[test]
    fn test_delete_and_aggregate() {
        let index = SqliteIndex::open_in_memory().unwrap();
        let a = index.index(&entry("a.jpg", "2022/03_March", "A")).unwrap();
        index.index(&entry("b.jpg", "2021/01_January", "B")).unwrap();
        index.index(&entry("c.jpg", "2021/01_January", "C")).unwrap();

        assert_eq!(
            index.aggregate_distinct(Field::Path).unwrap(),
            ["2021/01_January", "2022/03_March"]
        );
        index.delete(a).unwrap();
        assert!(matches!(index.delete(a), Err(IndexError::NotFound(_))));
        let removed = index
            .delete_by_query(&Filter::Directory("2021/01_January".into()))
            .unwrap();
        assert_eq!(removed, 2);
        assert!(index.scan(&Filter::All).unwrap().is_empty());
    }
}
