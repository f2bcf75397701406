//! Schema versions.
//!
//! The schema version lives in SQLite's `user_version` pragma. On open,
//! every step newer than the stored version is applied in order, each in
//! its own transaction together with the version bump.

pub mod v001_initial;

use rusqlite::Connection;

use crate::error::{Result, StoreError};

type Step = fn(&Connection) -> rusqlite::Result<()>;

/// `(version, name, apply)`, ascending. Append only.
const STEPS: &[(u32, &str, Step)] = &[(1, "initial", v001_initial::up)];

/// Version a fully migrated database reports.
pub fn current_version() -> u32 {
    STEPS.last().map(|(v, _, _)| *v).unwrap_or(0)
}

pub fn run_migrations(conn: &Connection) -> Result<()> {
    let found: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    let target = current_version();

    if found > target {
        return Err(StoreError::Migration(format!(
            "database is at schema v{found}, newer than this build (v{target})"
        )));
    }

    for (version, name, apply) in STEPS.iter().filter(|(v, _, _)| *v > found) {
        tracing::info!(version, name, "applying schema step");
        let tx = conn.unchecked_transaction()?;
        apply(&tx).map_err(|e| StoreError::Migration(format!("v{version} {name}: {e}")))?;
        tx.pragma_update(None, "user_version", version)?;
        tx.commit()?;
    }

    Ok(())
}
