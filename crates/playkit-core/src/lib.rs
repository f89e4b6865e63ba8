//! Core types for the PlayKit outbound request queue.
//!
//! This crate provides:
//! - Service categories and the authentication status gating rules
//! - The immutable `Request` value object and its completion callback
//! - The `RequestSink` trait implemented by the dispatch worker
//! - Logging initialization

mod logging;
mod request;
mod service;

pub use logging::init_logging;
pub use request::{Completion, DeliveryOutcome, Payload, Request, RequestSink};
pub use service::{AuthStatus, HttpMethod, ServiceCategory};
