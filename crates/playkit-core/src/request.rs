//! The immutable request value object and completion plumbing.

use crate::{HttpMethod, ServiceCategory};
use std::fmt;

/// Ordered payload mapping. Insertion order is preserved through
/// serialization so stored payloads read back exactly as the caller
/// built them.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// Final outcome of a request's delivery, reported to its completion
/// callback exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The service accepted the request (2xx).
    Delivered {
        /// HTTP status code.
        status: u16,
        /// Raw response body.
        body: Vec<u8>,
    },
    /// The retry ceiling was exceeded; the request will never be
    /// attempted again.
    Abandoned {
        /// Total failed delivery attempts.
        attempts: u32,
    },
}

/// Sink for follow-up requests, implemented by the dispatch worker.
///
/// Completions receive a sink reference so a response can chain the
/// next call without holding the worker itself.
pub trait RequestSink: Send + Sync {
    /// Append (or prepend) a request to the queue. Returns `false` if
    /// the worker has been stopped.
    fn submit(&self, request: Request, at_front: bool) -> bool;
}

/// One-shot completion callback, invoked on the worker task.
pub type Completion = Box<dyn FnOnce(DeliveryOutcome, &dyn RequestSink) + Send + 'static>;

/// An outbound remote call: target category, endpoint, verb, payload,
/// and an optional completion. Immutable after construction.
pub struct Request {
    pub service_category: ServiceCategory,
    pub endpoint: String,
    pub method: HttpMethod,
    pub payload: Payload,
    completion: Option<Completion>,
}

impl Request {
    /// Create a request without a completion callback.
    pub fn new(
        service_category: ServiceCategory,
        endpoint: impl Into<String>,
        method: HttpMethod,
        payload: Payload,
    ) -> Self {
        Self {
            service_category,
            endpoint: endpoint.into(),
            method,
            payload,
            completion: None,
        }
    }

    /// Attach a one-shot completion callback.
    pub fn with_completion(mut self, completion: Completion) -> Self {
        self.completion = Some(completion);
        self
    }

    /// Whether a completion callback is attached.
    pub fn has_completion(&self) -> bool {
        self.completion.is_some()
    }

    /// Take the completion callback, leaving `None` behind. The worker
    /// calls this at the moment of final resolution so the callback
    /// can fire at most once.
    pub fn take_completion(&mut self) -> Option<Completion> {
        self.completion.take()
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("service_category", &self.service_category)
            .field("endpoint", &self.endpoint)
            .field("method", &self.method)
            .field("payload", &self.payload)
            .field("completion", &self.completion.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload_with(key: &str, value: &str) -> Payload {
        let mut payload = Payload::new();
        payload.insert(key.to_string(), serde_json::Value::String(value.to_string()));
        payload
    }

    #[test]
    fn test_request_construction() {
        let request = Request::new(
            ServiceCategory::Post,
            "/me/achievements",
            HttpMethod::Post,
            payload_with("achievement_id", "first_blood"),
        );

        assert_eq!(request.service_category, ServiceCategory::Post);
        assert_eq!(request.endpoint, "/me/achievements");
        assert_eq!(request.method, HttpMethod::Post);
        assert!(!request.has_completion());
    }

    #[test]
    fn test_take_completion_is_one_shot() {
        let mut request = Request::new(
            ServiceCategory::Metrics,
            "/metrics",
            HttpMethod::Post,
            Payload::new(),
        )
        .with_completion(Box::new(|_, _| {}));

        assert!(request.has_completion());
        assert!(request.take_completion().is_some());
        assert!(request.take_completion().is_none());
    }

    #[test]
    fn test_payload_preserves_insertion_order() {
        let mut payload = Payload::new();
        payload.insert("zebra".into(), 1.into());
        payload.insert("apple".into(), 2.into());
        payload.insert("mango".into(), 3.into());

        let keys: Vec<&String> = payload.keys().collect();
        assert_eq!(keys, ["zebra", "apple", "mango"]);

        let json = serde_json::to_string(&payload).unwrap();
        assert_eq!(json, r#"{"zebra":1,"apple":2,"mango":3}"#);
    }
}
