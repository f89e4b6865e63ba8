//! The persistent request cache.

use crate::{migrations, CacheError, CacheResult, CachedRequest};
use chrono::{DateTime, Utc};
use playkit_core::{AuthStatus, HttpMethod, Payload, Request, ServiceCategory};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Mutex;
use tracing::debug;

/// The single store handle for the queue's lifetime.
///
/// One connection, guarded by a mutex: concurrent callers (application
/// thread enqueueing, worker thread completing) serialize here, so no
/// two mutations interleave within a logical operation.
pub struct RequestCache {
    conn: Mutex<Connection>,
}

impl RequestCache {
    /// Open or create the store at `path`, applying schema migrations
    /// idempotently.
    pub fn open(path: &Path) -> CacheResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| CacheError::Unavailable(e.to_string()))?;
        }

        let conn = Connection::open(path).map_err(|e| CacheError::Unavailable(e.to_string()))?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA busy_timeout = 5000;
        ",
        )
        .map_err(|e| CacheError::Unavailable(e.to_string()))?;

        migrations::run_migrations(&conn)
            .map_err(|e| CacheError::Unavailable(e.to_string()))?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory store for testing.
    pub fn open_in_memory() -> CacheResult<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| CacheError::Unavailable(e.to_string()))?;
        migrations::run_migrations(&conn)
            .map_err(|e| CacheError::Unavailable(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    // ==========================================
    // Install metadata
    // ==========================================

    /// Record the install date if it has never been recorded. Returns
    /// `true` exactly once per store.
    pub fn record_install_if_absent(&self) -> CacheResult<bool> {
        let conn = self.conn.lock().expect("lock poisoned");
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO install_info (id, install_date) VALUES (1, ?1)",
            params![Utc::now().to_rfc3339()],
        )?;
        Ok(inserted > 0)
    }

    /// The recorded install date, if any.
    pub fn install_date(&self) -> CacheResult<Option<DateTime<Utc>>> {
        let conn = self.conn.lock().expect("lock poisoned");
        let result = conn.query_row(
            "SELECT install_date FROM install_info WHERE id = 1",
            [],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(s) => Ok(Some(parse_datetime(&s)?)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Whether the one-time install metric has been sent.
    pub fn install_metric_sent(&self) -> CacheResult<bool> {
        let conn = self.conn.lock().expect("lock poisoned");
        let result = conn.query_row(
            "SELECT metric_sent FROM install_info WHERE id = 1",
            [],
            |row| row.get::<_, bool>(0),
        );

        match result {
            Ok(sent) => Ok(sent),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Flag the install metric as sent, preventing duplicate first-run
    /// telemetry.
    pub fn mark_install_metric_sent(&self) -> CacheResult<()> {
        let conn = self.conn.lock().expect("lock poisoned");
        conn.execute("UPDATE install_info SET metric_sent = 1 WHERE id = 1", [])?;
        Ok(())
    }

    // ==========================================
    // Cached requests
    // ==========================================

    /// Insert a new row for a request that has none, recording the
    /// assigned row id on the request. Already-persisted requests are
    /// left alone.
    ///
    /// On failure the caller must retain the request in memory and
    /// retry the persist later rather than lose it.
    pub fn persist(&self, request: &mut CachedRequest) -> CacheResult<i64> {
        if let Some(row_id) = request.cache_row_id {
            return Ok(row_id);
        }

        let payload_json = serde_json::to_string(&request.request.payload)?;
        let conn = self.conn.lock().expect("lock poisoned");
        conn.execute(
            "INSERT INTO cached_requests
                (request_id, service_category, endpoint, method, payload, date_issued, retry_count)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                request.request_id,
                request.request.service_category.code(),
                request.request.endpoint,
                request.request.method.as_str(),
                payload_json,
                request.date_issued.to_rfc3339(),
                request.retry_count,
            ],
        )?;

        let row_id = conn.last_insert_rowid();
        request.cache_row_id = Some(row_id);
        debug!(
            request_id = %request.request_id,
            row_id,
            endpoint = %request.request.endpoint,
            "Request persisted"
        );
        Ok(row_id)
    }

    /// Atomically increment the row's retry counter. Safe to call
    /// again when an earlier attempt's outcome is unknown; the worst
    /// case is over-counting, which only brings the ceiling closer.
    pub fn increment_retry(&self, request: &CachedRequest) -> CacheResult<()> {
        let Some(row_id) = request.cache_row_id else {
            debug!(request_id = %request.request_id, "Retry increment for unpersisted request skipped");
            return Ok(());
        };

        let conn = self.conn.lock().expect("lock poisoned");
        conn.execute(
            "UPDATE cached_requests SET retry_count = retry_count + 1 WHERE id = ?1",
            params![row_id],
        )?;
        Ok(())
    }

    /// Delete the row backing `request`. A missing row is a no-op, to
    /// tolerate a crash between delete and queue removal.
    pub fn remove(&self, request: &CachedRequest) -> CacheResult<()> {
        let Some(row_id) = request.cache_row_id else {
            return Ok(());
        };

        let conn = self.conn.lock().expect("lock poisoned");
        let deleted = conn.execute("DELETE FROM cached_requests WHERE id = ?1", params![row_id])?;
        debug!(
            request_id = %request.request_id,
            row_id,
            deleted,
            "Request removed from cache"
        );
        Ok(())
    }

    /// Load every pending request deliverable under `status`, oldest
    /// first, so original issuance order survives restarts.
    pub fn load_pending(&self, status: AuthStatus) -> CacheResult<Vec<CachedRequest>> {
        let raw_rows = {
            let conn = self.conn.lock().expect("lock poisoned");
            let mut stmt = conn.prepare(
                "SELECT id, request_id, service_category, endpoint, method, payload,
                        date_issued, retry_count
                 FROM cached_requests
                 WHERE service_category <= ?1
                 ORDER BY date_issued ASC, id ASC",
            )?;

            // Collected into a local so the statement borrow ends
            // before `stmt` is dropped.
            let rows = stmt
                .query_map(params![status.code()], |row| {
                    Ok(RawRow {
                        id: row.get(0)?,
                        request_id: row.get(1)?,
                        service_category: row.get(2)?,
                        endpoint: row.get(3)?,
                        method: row.get(4)?,
                        payload: row.get(5)?,
                        date_issued: row.get(6)?,
                        retry_count: row.get(7)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>();
            rows?
        };

        raw_rows.into_iter().map(RawRow::into_cached).collect()
    }

    /// Number of stored rows, regardless of deliverability. Diagnostic
    /// only.
    pub fn pending_count(&self) -> CacheResult<usize> {
        let conn = self.conn.lock().expect("lock poisoned");
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM cached_requests", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

/// A `cached_requests` row before reconstruction.
struct RawRow {
    id: i64,
    request_id: String,
    service_category: i32,
    endpoint: String,
    method: String,
    payload: String,
    date_issued: String,
    retry_count: u32,
}

impl RawRow {
    fn into_cached(self) -> CacheResult<CachedRequest> {
        let category = ServiceCategory::from_code(self.service_category).ok_or_else(|| {
            CacheError::InvalidData(format!("unknown service category {}", self.service_category))
        })?;
        let method = HttpMethod::from_str(&self.method)
            .ok_or_else(|| CacheError::InvalidData(format!("unknown method {}", self.method)))?;
        let payload: Payload = serde_json::from_str(&self.payload)?;

        let date_issued = parse_datetime(&self.date_issued)?;

        let request = Request::new(category, self.endpoint, method, payload);
        Ok(CachedRequest::from_row(
            request,
            self.request_id,
            date_issued,
            self.retry_count,
            self.id,
        ))
    }
}

/// Parse an RFC3339 datetime string as stored in the cache. A value
/// that does not parse means the row is corrupt, reported the same
/// way as an unknown category or method.
fn parse_datetime(s: &str) -> CacheResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| CacheError::InvalidData(format!("invalid timestamp {s:?}: {e}")))
}
