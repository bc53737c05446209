//! Connection setup and schema.

use rusqlite::Connection;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("student {0} not found")]
    StudentNotFound(String),
    #[error("student {0} already exists")]
    DuplicateStudent(String),
    #[error("field `{0}` must not be empty")]
    MissingField(&'static str),
    #[error("nothing to update")]
    EmptyUpdate,
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS students (
    id      TEXT PRIMARY KEY NOT NULL,
    name    TEXT NOT NULL,
    major   TEXT NOT NULL,
    year    TEXT NOT NULL,
    started TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS attendance (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    student_id  TEXT NOT NULL REFERENCES students(id) ON DELETE CASCADE,
    recorded_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS attendance_by_student ON attendance(student_id, id);
";

/// Open (creating if needed) the database at `path` and apply the schema.
pub fn open(path: &Path) -> Result<Connection, DbError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| DbError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let conn = Connection::open(path)?;
    let mode = enable_wal(&conn)?;
    prepare(&conn)?;

    tracing::info!(path = %path.display(), journal_mode = %mode, "database opened");
    Ok(conn)
}

/// In-memory database with the schema applied.
pub fn open_in_memory() -> Result<Connection, DbError> {
    let conn = Connection::open_in_memory()?;
    prepare(&conn)?;
    Ok(conn)
}

/// Switch a file database to write-ahead logging; returns the resulting mode.
pub fn enable_wal(conn: &Connection) -> Result<String, DbError> {
    Ok(conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?)
}

/// Per-connection settings and schema. Safe to call more than once.
pub fn prepare(conn: &Connection) -> Result<(), DbError> {
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.busy_timeout(std::time::Duration::from_secs(5))?;
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_applies_twice() {
        let conn = open_in_memory().unwrap();
        prepare(&conn).unwrap();
        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN ('students', 'attendance')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 2);
    }

    #[test]
    fn test_foreign_keys_enforced() {
        let conn = open_in_memory().unwrap();
        let err = conn.execute(
            "INSERT INTO attendance (student_id, recorded_at) VALUES ('ghost', '2024-01-01T00:00:00')",
            [],
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_open_file_creates_parent() {
        let dir = std::env::temp_dir().join(format!("rollcall-store-db-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        let path = dir.join("nested").join("attendance.db");
        open(&path).unwrap();
        assert!(path.exists());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
