//! SQLite side of the store: citation rows keyed by `vector_id`, plus a
//! small key/value `meta` table.

use crate::error::StoreError;
use crate::models::{VectorId, VectorRecord};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use tracing::debug;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS chunks (
    vector_id INTEGER PRIMARY KEY,
    file_name TEXT NOT NULL,
    page INTEGER NOT NULL,
    text TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_chunks_file_name ON chunks(file_name);
CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

pub struct MetadataDb {
    conn: Connection,
}

impl MetadataDb {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        debug!(path = %path.display(), "opened metadata database");
        Self::initialize(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::initialize(Connection::open_in_memory()?)
    }

    fn initialize(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    pub fn max_vector_id(&self) -> Result<Option<VectorId>, StoreError> {
        let max = self
            .conn
            .query_row("SELECT MAX(vector_id) FROM chunks", [], |row| {
                row.get::<_, Option<VectorId>>(0)
            })?;
        Ok(max)
    }

    /// Inserts all rows in one transaction; either every row lands or none.
    pub fn insert_records(&mut self, records: &[VectorRecord]) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO chunks (vector_id, file_name, page, text) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for record in records {
                stmt.execute(params![
                    record.vector_id,
                    record.file_name,
                    record.page,
                    record.text
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn record(&self, vector_id: VectorId) -> Result<Option<VectorRecord>, StoreError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT vector_id, file_name, page, text FROM chunks WHERE vector_id = ?1",
        )?;
        let record = stmt.query_row(params![vector_id], row_to_record).optional()?;
        Ok(record)
    }

    /// Every row in ascending id order.
    pub fn records(&self) -> Result<Vec<VectorRecord>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT vector_id, file_name, page, text FROM chunks ORDER BY vector_id")?;
        let records = stmt
            .query_map([], row_to_record)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    pub fn vector_ids(&self) -> Result<Vec<VectorId>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT vector_id FROM chunks ORDER BY vector_id")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, VectorId>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    pub fn chunk_count(&self) -> Result<usize, StoreError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn document_names(&self) -> Result<Vec<String>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT file_name FROM chunks ORDER BY file_name")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }

    pub fn document_chunk_count(&self, file_name: &str) -> Result<usize, StoreError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM chunks WHERE file_name = ?1",
            params![file_name],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    pub fn delete_document(&mut self, file_name: &str) -> Result<usize, StoreError> {
        let removed = self
            .conn
            .execute("DELETE FROM chunks WHERE file_name = ?1", params![file_name])?;
        Ok(removed)
    }

    /// Ids in `[start, end)` that have a row.
    pub fn ids_in_range(&self, start: VectorId, end: VectorId) -> Result<Vec<VectorId>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT vector_id FROM chunks WHERE vector_id >= ?1 AND vector_id < ?2 ORDER BY vector_id",
        )?;
        let ids = stmt
            .query_map(params![start, end], |row| row.get::<_, VectorId>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    pub fn delete_id_range(&mut self, start: VectorId, end: VectorId) -> Result<usize, StoreError> {
        let removed = self.conn.execute(
            "DELETE FROM chunks WHERE vector_id >= ?1 AND vector_id < ?2",
            params![start, end],
        )?;
        Ok(removed)
    }

    pub fn meta(&self, key: &str) -> Result<Option<String>, StoreError> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM meta WHERE key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn set_meta(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO meta (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn delete_meta(&self, key: &str) -> Result<(), StoreError> {
        self.conn
            .execute("DELETE FROM meta WHERE key = ?1", params![key])?;
        Ok(())
    }
}

fn row_to_record(row: &Row) -> rusqlite::Result<VectorRecord> {
    Ok(VectorRecord {
        vector_id: row.get(0)?,
        file_name: row.get(1)?,
        page: row.get(2)?,
        text: row.get(3)?,
    })
}
