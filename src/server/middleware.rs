//! HTTP middleware for registry-scan-gate
//!
//! Every request gets a random trace identifier and runs inside an
//! `http_request` span, so all log lines emitted while handling it (forwarder,
//! gate, scanner) carry the same `trace_id`.

use std::time::Instant;

use axum::{extract::Request, middleware::Next, response::Response};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::RngCore;
use tracing::Instrument;

/// Random bytes per trace identifier
const TRACE_ID_BYTES: usize = 8;

/// Per-request trace identifier, available as a request extension
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceId(pub String);

impl TraceId {
    /// Generate a new random identifier
    ///
    /// Uniqueness is not enforced; 64 random bits make collisions negligible.
    pub fn generate() -> Self {
        let mut bytes = [0u8; TRACE_ID_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(STANDARD.encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TraceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Trace middleware function
///
/// Assigns a trace id, logs the request on entry and logs method, path, the
/// status actually written and the elapsed time on completion. The status is
/// also recorded on the span.
pub async fn trace_middleware(mut request: Request, next: Next) -> Response {
    let trace_id = TraceId::generate();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    request.extensions_mut().insert(trace_id.clone());

    let span = tracing::info_span!(
        "http_request",
        trace_id = %trace_id,
        method = %method,
        path = %path,
        status = tracing::field::Empty,
    );

    async move {
        let start = Instant::now();
        tracing::info!(method = %method, path = %path, "<<");

        let response = next.run(request).await;

        let status = response.status().as_u16();
        tracing::Span::current().record("status", status);
        tracing::info!(
            method = %method,
            path = %path,
            status = status,
            duration_ms = %start.elapsed().as_millis(),
            ">>"
        );

        response
    }
    .instrument(span)
    .await
}
