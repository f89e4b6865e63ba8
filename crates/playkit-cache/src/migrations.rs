//! Cache schema migrations.
//!
//! Migrations are run in order and tracked in the `migrations` table.
//! The schema is private to this crate; no other component writes it.

use crate::CacheResult;
use rusqlite::Connection;
use tracing::{debug, info};

/// Current schema version.
pub const CURRENT_VERSION: i32 = 2;

/// Run all pending migrations.
pub fn run_migrations(conn: &Connection) -> CacheResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    let current_version: i32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM migrations",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    info!(current_version, target_version = CURRENT_VERSION, "Running cache migrations");

    if current_version < 1 {
        migrate_v1_cached_requests(conn)?;
    }
    if current_version < 2 {
        migrate_v2_install_info(conn)?;
    }

    Ok(())
}

fn record_migration(conn: &Connection, version: i32, name: &str) -> CacheResult<()> {
    conn.execute(
        "INSERT INTO migrations (version, name) VALUES (?1, ?2)",
        rusqlite::params![version, name],
    )?;
    debug!(version, name, "Migration applied");
    Ok(())
}

/// V1: the pending-request table.
fn migrate_v1_cached_requests(conn: &Connection) -> CacheResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS cached_requests (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            request_id TEXT NOT NULL,
            service_category INTEGER NOT NULL,
            endpoint TEXT NOT NULL,
            method TEXT NOT NULL,
            payload TEXT NOT NULL,
            date_issued TEXT NOT NULL,
            retry_count INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_cached_requests_category
            ON cached_requests(service_category);
        CREATE INDEX IF NOT EXISTS idx_cached_requests_date_issued
            ON cached_requests(date_issued);
        ",
    )?;

    record_migration(conn, 1, "cached_requests")
}

/// V2: one-row install metadata table.
fn migrate_v2_install_info(conn: &Connection) -> CacheResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS install_info (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            install_date TEXT NOT NULL,
            metric_sent INTEGER NOT NULL DEFAULT 0
        );
        ",
    )?;

    record_migration(conn, 2, "install_info")
}
