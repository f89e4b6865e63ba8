//! SQLite persistence layer for the PlayKit outbound request queue.
//!
//! This crate provides:
//! - `RequestCache`: the single store handle, with migrations and
//!   install metadata
//! - `CachedRequest`: a request decorated with durability metadata
//!   that persists itself into the cache
//!
//! All access goes through one connection guarded by a mutex, so every
//! logical operation is a single serialized transaction.

mod cached;
mod error;
mod migrations;
mod store;

pub use cached::CachedRequest;
pub use error::{CacheError, CacheResult};
pub use migrations::run_migrations;
pub use store::RequestCache;
