//! Database schema migrations.
//!
//! A version table records which migrations have been applied; each
//! pending migration runs inside its own transaction.

use super::Error;
use tokio_rusqlite::{Connection, params};

/// Migration list: (version, name, SQL), applied in ascending order.
///
/// Every script uses CREATE ... IF NOT EXISTS so a half-recorded run can
/// be repeated safely.
const MIGRATIONS: &[(i64, &str, &str)] = &[
    (1, "stores", include_str!("../../migrations/001_stores.sql")),
    (2, "entries", include_str!("../../migrations/002_entries.sql")),
];

/// Run any pending migrations.
///
/// # Errors
///
/// Returns an error if a migration SQL fails to execute.
pub async fn run(conn: &Connection) -> Result<(), Error> {
    conn.call(|conn| -> Result<(), Error> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at TEXT NOT NULL
            )",
            [],
        )?;

        let current: i64 =
            conn.query_row("SELECT COALESCE(MAX(version), 0) FROM _migrations", [], |row| row.get(0))?;

        for (version, name, sql) in MIGRATIONS.iter().filter(|(v, _, _)| *v > current) {
            let tx = conn.transaction()?;
            tx.execute_batch(sql)
                .map_err(|e| Error::MigrationFailed(format!("{version} ({name}): {e}")))?;
            tx.execute(
                "INSERT INTO _migrations (version, name, applied_at) VALUES (?1, ?2, ?3)",
                params![version, name, chrono::Utc::now().to_rfc3339()],
            )?;
            tx.commit()?;
            tracing::debug!(version, name, "applied cache migration");
        }

        Ok(())
    })
    .await
    .map_err(Error::from)
}
