mod v1_initial;
mod v2_cover_path;
mod v3_reading_state;

use std::collections::BTreeSet;

use chrono::Utc;
use rusqlite::Connection;

use crate::error::Result;

/// One step of the catalog schema history.
pub trait Migration {
    fn version(&self) -> u32;
    fn description(&self) -> &'static str;
    fn up(&self, conn: &Connection) -> Result<()>;
}

/// Every migration, oldest first.
const MIGRATIONS: &[&dyn Migration] = &[
    &v1_initial::V1Initial,
    &v2_cover_path::V2CoverPath,
    &v3_reading_state::V3ReadingState,
];

/// Bring the catalog schema up to date.
///
/// Each pending migration runs in its own transaction together with the row
/// that records it, so a failed step leaves no partial schema change behind.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    let applied: BTreeSet<u32> = get_applied_versions(conn)?.into_iter().collect();

    for migration in MIGRATIONS.iter().filter(|m| !applied.contains(&m.version())) {
        let tx = conn.unchecked_transaction()?;
        migration.up(&tx)?;
        tx.execute(
            "INSERT INTO schema_migrations(version, applied_at) VALUES (?1, ?2)",
            rusqlite::params![migration.version(), Utc::now().to_rfc3339()],
        )?;
        tx.commit()?;
        tracing::debug!(
            version = migration.version(),
            description = migration.description(),
            "applied catalog migration"
        );
    }
    Ok(())
}

/// Versions recorded in `schema_migrations`, ascending. Empty for a catalog
/// that predates versioning.
pub fn get_applied_versions(conn: &Connection) -> Result<Vec<u32>> {
    let tracked = conn
        .prepare("SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'schema_migrations'")?
        .exists([])?;
    if !tracked {
        return Ok(Vec::new());
    }

    let mut stmt = conn.prepare("SELECT version FROM schema_migrations ORDER BY version")?;
    let versions = stmt
        .query_map([], |row| row.get(0))?
        .collect::<std::result::Result<Vec<u32>, _>>()?;
    Ok(versions)
}
