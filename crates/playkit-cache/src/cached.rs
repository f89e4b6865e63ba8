//! Requests decorated with durability metadata.

use crate::{CacheResult, RequestCache};
use chrono::{DateTime, Utc};
use playkit_core::Request;
use uuid::Uuid;

/// A [`Request`] plus the metadata needed to survive process restarts:
/// a stable identifier, the first-enqueue timestamp, a retry counter,
/// and a handle to the backing cache row.
///
/// A `cache_row_id` of `None` means the request lives only in memory
/// and has never touched disk. Once set, it corresponds to exactly one
/// row until the request is removed.
#[derive(Debug)]
pub struct CachedRequest {
    pub request: Request,
    /// Stable across persist/reload cycles; generated once.
    pub request_id: String,
    /// Timestamp of first enqueue. Does not reset on retry.
    pub date_issued: DateTime<Utc>,
    /// Failed delivery attempts so far.
    pub retry_count: u32,
    /// Backing row identifier, `None` until persisted.
    pub cache_row_id: Option<i64>,
}

impl CachedRequest {
    /// Wrap a freshly enqueued request. Nothing is written to disk.
    pub fn from_request(request: Request) -> Self {
        Self {
            request,
            request_id: Uuid::new_v4().to_string(),
            date_issued: Utc::now(),
            retry_count: 0,
            cache_row_id: None,
        }
    }

    /// Reconstruct a request loaded from an existing cache row.
    pub(crate) fn from_row(
        request: Request,
        request_id: String,
        date_issued: DateTime<Utc>,
        retry_count: u32,
        cache_row_id: i64,
    ) -> Self {
        Self {
            request,
            request_id,
            date_issued,
            retry_count,
            cache_row_id: Some(cache_row_id),
        }
    }

    /// Whether this request has a backing row.
    pub fn is_persisted(&self) -> bool {
        self.cache_row_id.is_some()
    }

    /// Insert into the cache, recording the assigned row id. No-op if
    /// already persisted.
    pub fn persist(&mut self, cache: &RequestCache) -> CacheResult<i64> {
        cache.persist(self)
    }

    /// Bump the retry counter, in memory and (when persisted) in the
    /// backing row. The in-memory counter is bumped even if the row
    /// update fails, so the ceiling check never under-counts.
    pub fn increment_retry(&mut self, cache: &RequestCache) -> CacheResult<()> {
        self.retry_count += 1;
        if self.is_persisted() {
            cache.increment_retry(self)?;
        }
        Ok(())
    }

    /// Delete the backing row, if any. Clears `cache_row_id`.
    pub fn remove(&mut self, cache: &RequestCache) -> CacheResult<()> {
        if self.is_persisted() {
            cache.remove(self)?;
            self.cache_row_id = None;
        }
        Ok(())
    }
}
