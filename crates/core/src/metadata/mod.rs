pub mod schema;
mod verify;

pub use verify::{FileCheck, FileVerification, ReconcileReport};

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::domain::{MediaRow, Orientation};
use crate::error::Result;

/// SQLite-backed cache of per-photo facts (size, orientation, timestamps)
/// so the rest of the application can avoid decoding images.
///
/// The files are the source of truth. Every query failure is logged and
/// reported as an absent value, so callers must treat "not found" as a
/// normal outcome.
pub struct MetadataStore {
    conn: Connection,
}

impl MetadataStore {
    /// Open or create a store at the given path with WAL mode.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        schema::initialize(&conn)?;
        schema::migrate(&conn)?;
        Ok(Self { conn })
    }

    /// Open an in-memory store (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::initialize(&conn)?;
        schema::migrate(&conn)?;
        Ok(Self { conn })
    }

    // ── Rows ─────────────────────────────────────────────────────────

    pub fn id_for_file(&self, filename: &Path) -> Option<i64> {
        let result = self
            .conn
            .query_row(
                "SELECT id FROM media WHERE filename = ?1",
                params![filename.to_string_lossy().as_ref()],
                |row| row.get(0),
            )
            .optional();
        logged("id_for_file", result).flatten()
    }

    /// Insert a row for a newly discovered file and return its id.
    pub fn create_row(
        &self,
        filename: &Path,
        timestamp: DateTime<Utc>,
        exposure_time: Option<DateTime<Utc>>,
        orientation: Orientation,
        filesize: u64,
    ) -> Option<i64> {
        let result = self.conn.execute(
            "INSERT INTO media (filename, timestamp, exposure_time, original_orientation, orientation, filesize)
             VALUES (?1, ?2, ?3, ?4, ?4, ?5)",
            params![
                filename.to_string_lossy().as_ref(),
                timestamp.timestamp_millis(),
                exposure_time.map(|t| t.timestamp_millis()),
                orientation.to_exif(),
                filesize as i64,
            ],
        );
        logged("create_row", result).map(|_| self.conn.last_insert_rowid())
    }

    /// Overwrite the file-derived fields of a row.
    pub fn update_row(
        &self,
        id: i64,
        filename: &Path,
        timestamp: DateTime<Utc>,
        exposure_time: Option<DateTime<Utc>>,
        orientation: Orientation,
        filesize: u64,
    ) {
        let result = self.conn.execute(
            "UPDATE media SET filename = ?1, timestamp = ?2, exposure_time = ?3,
             original_orientation = ?4, filesize = ?5 WHERE id = ?6",
            params![
                filename.to_string_lossy().as_ref(),
                timestamp.timestamp_millis(),
                exposure_time.map(|t| t.timestamp_millis()),
                orientation.to_exif(),
                filesize as i64,
                id,
            ],
        );
        logged("update_row", result);
    }

    pub fn get_row(&self, id: i64) -> Option<MediaRow> {
        let result = self
            .conn
            .query_row(
                "SELECT id, filename, timestamp, exposure_time, original_orientation,
                 COALESCE(orientation, original_orientation), filesize, width, height
                 FROM media WHERE id = ?1",
                params![id],
                |row| {
                    let width: Option<u32> = row.get(7)?;
                    let height: Option<u32> = row.get(8)?;
                    Ok(MediaRow {
                        id: row.get(0)?,
                        filename: PathBuf::from(row.get::<_, String>(1)?),
                        timestamp: row.get::<_, Option<i64>>(2)?.and_then(from_millis),
                        exposure_time: row.get::<_, Option<i64>>(3)?.and_then(from_millis),
                        original_orientation: Orientation::from_exif(row.get(4)?),
                        orientation: Orientation::from_exif(row.get(5)?),
                        filesize: row.get::<_, i64>(6)? as u64,
                        size: valid_size(width, height),
                    })
                },
            )
            .optional();
        logged("get_row", result).flatten()
    }

    /// Stored dimensions, `None` when unset or not positive.
    pub fn get_size(&self, id: i64) -> Option<(u32, u32)> {
        let result = self
            .conn
            .query_row(
                "SELECT width, height FROM media WHERE id = ?1 LIMIT 1",
                params![id],
                |row| Ok(valid_size(row.get(0)?, row.get(1)?)),
            )
            .optional();
        logged("get_size", result).flatten().flatten()
    }

    pub fn set_size(&self, id: i64, (width, height): (u32, u32)) {
        let result = self.conn.execute(
            "UPDATE media SET width = ?1, height = ?2 WHERE id = ?3",
            params![width, height, id],
        );
        logged("set_size", result);
    }

    /// Record the photo's current orientation (after user rotation).
    pub fn set_orientation(&self, id: i64, orientation: Orientation) {
        let result = self.conn.execute(
            "UPDATE media SET orientation = ?1 WHERE id = ?2",
            params![orientation.to_exif(), id],
        );
        logged("set_orientation", result);
    }

    pub fn get_orientation(&self, id: i64) -> Option<Orientation> {
        let result = self
            .conn
            .query_row(
                "SELECT COALESCE(orientation, original_orientation) FROM media WHERE id = ?1",
                params![id],
                |row| row.get::<_, u32>(0),
            )
            .optional();
        logged("get_orientation", result)
            .flatten()
            .map(Orientation::from_exif)
    }

    pub fn get_file_timestamp(&self, id: i64) -> Option<DateTime<Utc>> {
        self.get_millis("timestamp", id)
    }

    pub fn get_exposure_timestamp(&self, id: i64) -> Option<DateTime<Utc>> {
        self.get_millis("exposure_time", id)
    }

    /// True when the row predates the current schema (NULL timestamp) and
    /// must be repopulated with `update_row`.
    pub fn needs_migration(&self, id: i64) -> bool {
        let result = self
            .conn
            .query_row(
                "SELECT 1 FROM media WHERE timestamp IS NULL AND id = ?1 LIMIT 1",
                params![id],
                |_| Ok(()),
            )
            .optional();
        logged("needs_migration", result).flatten().is_some()
    }

    pub fn remove_row(&self, id: i64) {
        let result = self
            .conn
            .execute("DELETE FROM media WHERE id = ?1", params![id]);
        logged("remove_row", result);
    }

    /// Delete several rows in one transaction. Either all go or none do.
    /// Returns the number of rows deleted.
    pub fn remove_rows(&mut self, ids: &[i64]) -> usize {
        let result = (|| -> rusqlite::Result<usize> {
            let tx = self.conn.transaction()?;
            let mut removed = 0;
            {
                let mut stmt = tx.prepare("DELETE FROM media WHERE id = ?1")?;
                for id in ids {
                    removed += stmt.execute(params![id])?;
                }
            }
            tx.commit()?;
            Ok(removed)
        })();
        logged("remove_rows", result).unwrap_or(0)
    }

    pub fn count_rows(&self) -> usize {
        let result = self
            .conn
            .query_row("SELECT COUNT(*) FROM media", [], |row| row.get::<_, i64>(0));
        logged("count_rows", result).unwrap_or(0) as usize
    }

    // ── Verification ─────────────────────────────────────────────────

    /// Start a verification pass over every row. See [`FileVerification`].
    pub fn verify_files(&self) -> FileVerification {
        let result = (|| -> rusqlite::Result<Vec<(i64, PathBuf)>> {
            let mut stmt = self.conn.prepare("SELECT id, filename FROM media ORDER BY id")?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((row.get(0)?, PathBuf::from(row.get::<_, String>(1)?)))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })();
        FileVerification::new(logged("verify_files", result).unwrap_or_default())
    }

    /// Remove every row whose file no longer exists. The deletions are
    /// committed as a single transaction once the whole table is checked.
    pub fn reconcile_with_disk(&mut self) -> ReconcileReport {
        let mut checked = 0;
        let mut missing = Vec::new();
        for check in self.verify_files() {
            checked += 1;
            if !check.exists {
                tracing::debug!(id = check.id, file = %check.filename.display(), "file is gone");
                missing.push(check);
            }
        }

        let ids: Vec<i64> = missing.iter().map(|check| check.id).collect();
        let removed = if ids.is_empty() || self.remove_rows(&ids) == ids.len() {
            missing
        } else {
            Vec::new()
        };
        tracing::info!(checked, removed = removed.len(), "reconciled metadata with disk");
        ReconcileReport { checked, removed }
    }

    // ── Config ───────────────────────────────────────────────────────

    pub fn set_config(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO config (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn get_config(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM config WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn get_millis(&self, column: &str, id: i64) -> Option<DateTime<Utc>> {
        let result = self
            .conn
            .query_row(
                &format!("SELECT {column} FROM media WHERE id = ?1"),
                params![id],
                |row| row.get::<_, Option<i64>>(0),
            )
            .optional();
        logged(column, result).flatten().flatten().and_then(from_millis)
    }
}

fn from_millis(ms: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
}

fn valid_size(width: Option<u32>, height: Option<u32>) -> Option<(u32, u32)> {
    match (width, height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => Some((w, h)),
        _ => None,
    }
}

/// Log a failed query and turn it into `None`.
fn logged<T>(op: &str, result: rusqlite::Result<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::warn!(op, error = %err, "metadata query failed");
            None
        }
    }
}
