//! The store handle.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use rusqlite::functions::FunctionFlags;
use rusqlite::Connection;

use crate::error::{Result, StoreError};
use crate::migrations;

const FILE_NAME: &str = "tandem.db";

/// SQL name of the Unicode-aware lowercase function. The built-in
/// `lower()` only folds ASCII.
const UNICODE_LOWER: &str = "unicode_lower";

/// One SQLite connection with the schema migrated and foreign keys on.
/// Every table helper in this crate is a method on it.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open the database in the platform data directory, creating the
    /// directory on first run (`~/.local/share/tandem/` on Linux).
    pub fn new() -> Result<Self> {
        let path = Self::default_path()?;
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        tracing::info!(path = %path.display(), "opening database");
        Self::open_at(&path)
    }

    pub fn default_path() -> Result<PathBuf> {
        ProjectDirs::from("chat", "tandem", "tandem")
            .map(|dirs| dirs.data_dir().join(FILE_NAME))
            .ok_or(StoreError::NoDataDir)
    }

    pub fn open_at(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Self::prepare(conn)
    }

    /// Private throwaway database; gone when dropped.
    pub fn open_in_memory() -> Result<Self> {
        Self::prepare(Connection::open_in_memory()?)
    }

    fn prepare(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        register_functions(&conn)?;
        migrations::run_migrations(&conn)?;
        Ok(Self { conn })
    }

    /// Raw connection, for the table modules and ad-hoc queries in tests.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// File backing this database; `None` when in memory.
    pub fn path(&self) -> Option<PathBuf> {
        match self.conn.path() {
            Some(p) if !p.is_empty() => Some(PathBuf::from(p)),
            _ => None,
        }
    }
}

fn register_functions(conn: &Connection) -> Result<()> {
    conn.create_scalar_function(
        UNICODE_LOWER,
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let text: Option<String> = ctx.get(0)?;
            Ok(text.map(|t| t.to_lowercase()))
        },
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reopening_keeps_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(FILE_NAME);

        let db = Database::open_at(&path).unwrap();
        assert!(db.path().is_some());
        db.insert_user(&crate::users::test_user("Alice")).unwrap();
        drop(db);

        let db = Database::open_at(&path).unwrap();
        assert!(db.find_user_by_email("alice@example.com").unwrap().is_some());
    }

    #[test]
    fn unicode_lower_folds_accents() {
        let db = Database::open_in_memory().unwrap();
        let folded: String = db
            .conn()
            .query_row("SELECT unicode_lower('ÉMILE Øster')", [], |row| row.get(0))
            .unwrap();
        assert_eq!(folded, "émile øster");

        let null: Option<String> = db
            .conn()
            .query_row("SELECT unicode_lower(NULL)", [], |row| row.get(0))
            .unwrap();
        assert_eq!(null, None);
    }

    #[test]
    fn in_memory_has_no_path() {
        assert!(Database::open_in_memory().unwrap().path().is_none());
    }
}
