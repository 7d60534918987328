//! Event delivery.
//!
//! Delivery is fire-and-forget: [`Transport::send`] returns immediately, the
//! request is never retried, and its outcome is only observable through the
//! optional completion callback, which runs once the request has settled
//! whether it succeeded or not.
//!
//! The body is posted as `text/plain` so that browsers treat it as a simple
//! request and skip the CORS preflight a JSON content type would trigger.

#[cfg(not(target_arch = "wasm32"))]
mod http;

#[cfg(not(target_arch = "wasm32"))]
pub use http::ReqwestTransport;

use crate::event::Callback;

/// Content type of every event request.
pub const CONTENT_TYPE: &str = "text/plain";

/// A single event request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRequest {
    /// Collection endpoint URL.
    pub endpoint: String,
    /// JSON payload text.
    pub body: String,
}

impl EventRequest {
    /// Create a request.
    pub fn new(endpoint: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            body: body.into(),
        }
    }
}

/// Trait for event delivery.
///
/// This abstraction allows the dispatcher to run against the browser's
/// `XMLHttpRequest`, a native HTTP client, or a recording fake in tests.
pub trait Transport {
    /// Start delivering `request` and return without waiting.
    ///
    /// `on_settled`, if given, must be invoked exactly once after the request
    /// completes or fails.
    fn send(&self, request: EventRequest, on_settled: Option<Callback>);
}

/// Transport that logs requests instead of sending them.
///
/// Each request settles immediately.
#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunTransport;

impl Transport for DryRunTransport {
    fn send(&self, request: EventRequest, on_settled: Option<Callback>) {
        tracing::info!(
            endpoint = %request.endpoint,
            content_type = CONTENT_TYPE,
            body = %request.body,
            "Dry run: event not sent"
        );
        if let Some(callback) = on_settled {
            callback();
        }
    }
}
