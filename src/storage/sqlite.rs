//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the DocumentStore
//! trait, with FTS5 backing the lexical search.

use crate::storage::schema::initialize_schema;
use crate::storage::traits::{DocumentStore, StorageError, StorageResult};
use crate::storage::{Document, RunRecord, RunStatus, TextField, WordCountStats};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashSet;
use std::path::Path;

const DOCUMENT_COLUMNS: &str =
    "title, content, clean_content, summary, word_count, url, created_at";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        // Configure SQLite for better performance
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            PRAGMA mmap_size = 268435456;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

fn document_from_row(row: &Row<'_>) -> rusqlite::Result<Document> {
    let word_count: i64 = row.get(4)?;
    let created_at: String = row.get(6)?;
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(Document {
        title: row.get(0)?,
        content: row.get(1)?,
        clean_text: row.get(2)?,
        summary: row.get(3)?,
        word_count: word_count.max(0) as usize,
        url: row.get(5)?,
        created_at,
    })
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        started_at: row.get(1)?,
        finished_at: row.get(2)?,
        config_hash: row.get(3)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(4)?)
            .unwrap_or(RunStatus::Interrupted),
        accepted: row.get::<_, i64>(5)?.max(0) as u64,
        persisted: row.get::<_, i64>(6)?.max(0) as u64,
    })
}

/// Builds an FTS5 match expression from free text
///
/// Every word is quoted so user input can never be read as FTS syntax, and
/// the words are OR-ed so partial matches still rank. Returns `None` when
/// the text has no searchable words.
fn build_match_expression(query: &str, fields: &[TextField]) -> Option<String> {
    let terms: Vec<String> = query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(|word| format!("\"{}\"", word.to_lowercase()))
        .collect();

    if terms.is_empty() {
        return None;
    }

    let fields = if fields.is_empty() {
        &TextField::ALL[..]
    } else {
        fields
    };
    let columns: Vec<&str> = fields.iter().map(|f| f.column()).collect();

    Some(format!("{{{}}} : ({})", columns.join(" "), terms.join(" OR ")))
}

/// Escapes LIKE wildcards so `text` only matches itself
fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

impl DocumentStore for SqliteStorage {
    // ===== Documents =====

    fn insert_batch(&mut self, documents: &[Document]) -> StorageResult<usize> {
        if documents.is_empty() {
            return Ok(0);
        }

        let tx = self.conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR IGNORE INTO documents
                 (title, summary, content, clean_content, url, word_count, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;

            for doc in documents {
                inserted += stmt.execute(params![
                    doc.title,
                    doc.summary,
                    doc.content,
                    doc.clean_text,
                    doc.url,
                    doc.word_count as i64,
                    doc.created_at.to_rfc3339(),
                ])?;
            }
        }
        tx.commit()?;

        Ok(inserted)
    }

    fn snapshot_all(&self) -> StorageResult<Vec<Document>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM documents ORDER BY title",
            DOCUMENT_COLUMNS
        ))?;

        let documents = stmt
            .query_map([], document_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(documents)
    }

    fn get_by_id(&self, id: &str) -> StorageResult<Document> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM documents WHERE title = ?1",
            DOCUMENT_COLUMNS
        ))?;

        stmt.query_row(params![id], document_from_row)
            .optional()?
            .ok_or_else(|| StorageError::NotFound(id.to_string()))
    }

    fn full_text_search(
        &self,
        query: &str,
        fields: &[TextField],
        limit: usize,
    ) -> StorageResult<Vec<(String, f64)>> {
        let expression = match build_match_expression(query, fields) {
            Some(e) => e,
            None => return Ok(Vec::new()),
        };

        let mut stmt = self.conn.prepare(
            "SELECT d.title, bm25(documents_fts) AS rank
             FROM documents_fts
             JOIN documents d ON d.id = documents_fts.rowid
             WHERE documents_fts MATCH ?1
             ORDER BY rank, d.title
             LIMIT ?2",
        )?;

        // bm25() is lower-is-better; flip it so callers see higher-is-better
        let hits = stmt
            .query_map(params![expression, limit as i64], |row| {
                Ok((row.get::<_, String>(0)?, -row.get::<_, f64>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(hits)
    }

    fn title_search(&self, query: &str, limit: usize) -> StorageResult<Vec<(String, f64)>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let escaped = escape_like(query);
        let mut stmt = self.conn.prepare(
            "SELECT title,
                    CASE
                        WHEN lower(title) = lower(?1) THEN 3.0
                        WHEN title LIKE ?2 ESCAPE '\\' THEN 2.0
                        ELSE 1.0
                    END AS score
             FROM documents
             WHERE title LIKE ?3 ESCAPE '\\'
             ORDER BY score DESC, title
             LIMIT ?4",
        )?;

        let hits = stmt
            .query_map(
                params![
                    query,
                    format!("{}%", escaped),
                    format!("%{}%", escaped),
                    limit as i64
                ],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?)),
            )?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(hits)
    }

    fn recent(&self, limit: usize) -> StorageResult<Vec<Document>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM documents ORDER BY created_at DESC, title LIMIT ?1",
            DOCUMENT_COLUMNS
        ))?;

        let documents = stmt
            .query_map(params![limit as i64], document_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(documents)
    }

    fn word_count_stats(&self) -> StorageResult<Option<WordCountStats>> {
        let stats = self.conn.query_row(
            "SELECT AVG(word_count), MIN(word_count), MAX(word_count) FROM documents",
            [],
            |row| {
                let average: Option<f64> = row.get(0)?;
                let min: Option<i64> = row.get(1)?;
                let max: Option<i64> = row.get(2)?;
                Ok(average.zip(min.zip(max)).map(|(average, (min, max))| WordCountStats {
                    average,
                    min: min.max(0) as usize,
                    max: max.max(0) as usize,
                }))
            },
        )?;

        Ok(stats)
    }

    fn existing_ids(&self) -> StorageResult<HashSet<String>> {
        let mut stmt = self.conn.prepare("SELECT title FROM documents")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<HashSet<_>, _>>()?;
        Ok(ids)
    }

    fn count_documents(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    // ===== Run Management =====

    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
            params![now, config_hash, RunStatus::Running.to_db_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn finish_run(
        &mut self,
        run_id: i64,
        status: RunStatus,
        accepted: u64,
        persisted: u64,
    ) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2, accepted = ?3, persisted = ?4
             WHERE id = ?5",
            params![
                status.to_db_string(),
                now,
                accepted as i64,
                persisted as i64,
                run_id
            ],
        )?;

        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    fn latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let run = self
            .conn
            .query_row(
                "SELECT id, started_at, finished_at, config_hash, status, accepted, persisted
                 FROM runs ORDER BY id DESC LIMIT 1",
                [],
                run_from_row,
            )
            .optional()?;

        Ok(run)
    }
}
