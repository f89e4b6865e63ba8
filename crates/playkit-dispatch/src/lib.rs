//! Background dispatch worker for the PlayKit outbound request queue.
//!
//! This crate provides:
//! - `DispatchWorker`: a single background task draining an ordered
//!   in-memory queue, with authentication gating, bounded retries, and
//!   crash-safe deferral through `playkit-cache`
//! - The `Transport`, `AuthStatusProvider`, and `PayloadFinalizer`
//!   seams the worker delivers through
//! - `HttpTransport`: a reqwest-backed transport implementation

mod auth;
mod envelope;
mod transport;
mod worker;

pub use auth::{AuthStatusProvider, SharedAuthStatus};
pub use envelope::{DeviceEnvelope, PassthroughFinalizer, PayloadFinalizer};
pub use transport::{HttpTransport, HttpTransportConfig, Response, Transport, TransportError};
pub use worker::{DispatchConfig, DispatchWorker, WorkerState};
