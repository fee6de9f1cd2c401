use rusqlite::Connection;

use crate::error::Result;

pub fn initialize(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS media (
            id                   INTEGER PRIMARY KEY AUTOINCREMENT,
            filename             TEXT NOT NULL UNIQUE,
            timestamp            INTEGER,
            exposure_time        INTEGER,
            original_orientation INTEGER NOT NULL DEFAULT 1,
            orientation          INTEGER,
            filesize             INTEGER NOT NULL DEFAULT 0,
            width                INTEGER,
            height               INTEGER
        );

        CREATE INDEX IF NOT EXISTS idx_media_filename ON media(filename);

        CREATE TABLE IF NOT EXISTS config (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        ",
    )?;
    Ok(())
}

/// Columns added after the first schema, with the type used to add them.
/// Rows that predate `timestamp` end up with it NULL, which marks them for
/// repopulation.
const LATER_COLUMNS: &[(&str, &str)] = &[
    ("timestamp", "INTEGER"),
    ("exposure_time", "INTEGER"),
    ("original_orientation", "INTEGER NOT NULL DEFAULT 1"),
    ("orientation", "INTEGER"),
    ("filesize", "INTEGER NOT NULL DEFAULT 0"),
    ("width", "INTEGER"),
    ("height", "INTEGER"),
];

/// Bring a `media` table created by an older version up to date.
pub fn migrate(conn: &Connection) -> Result<()> {
    let existing: Vec<String> = {
        let mut stmt = conn.prepare("SELECT name FROM pragma_table_info('media')")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        names
    };

    for (column, ty) in LATER_COLUMNS {
        if !existing.iter().any(|c| c == column) {
            tracing::info!(column, "adding missing media column");
            conn.execute_batch(&format!("ALTER TABLE media ADD COLUMN {column} {ty}"))?;
        }
    }
    Ok(())
}
