//! HTTP router for registry-scan-gate
//!
//! Every path is routed to one dispatcher. The dispatcher classifies the
//! request and sends manifest reads through the scan gate; blob reads and all
//! other traffic are forwarded to the upstream registry untouched.

use axum::{
    extract::{Request, State},
    middleware,
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use std::sync::Arc;

use crate::gate::ScanGate;
use crate::proxy::{stream_response, Forwarder};
use crate::registry::{classify, ImageRef, Route};

use super::middleware::trace_middleware;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Upstream forwarder for pass-through traffic
    pub forwarder: Arc<Forwarder>,

    /// Vulnerability gate for manifest reads
    pub gate: Arc<ScanGate>,
}

/// Build the application router
///
/// # Arguments
///
/// * `state` - Forwarder and scan gate for one upstream registry
///
/// # Returns
///
/// An axum Router that dispatches every path and method
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", any(dispatch_handler))
        .route("/*path", any(dispatch_handler))
        .layer(middleware::from_fn(trace_middleware))
        .with_state(state)
}

/// Classify the request and route it to the gate or the forwarder
async fn dispatch_handler(State(state): State<AppState>, request: Request) -> Response {
    let route = classify(request.method(), request.uri().path());
    tracing::debug!(route = ?route.kind(), "Classified request");

    match route {
        Route::Manifest(image) => gate_manifest(&state, image, request).await,
        Route::Blob(_) | Route::Other => forward(&state, request).await,
    }
}

async fn gate_manifest(state: &AppState, image: ImageRef, request: Request) -> Response {
    match state.gate.gate(&image, request).await {
        Ok(action) => action.into_response(),
        Err(err) => {
            tracing::error!(
                image = %image,
                error_kind = err.kind(),
                error = %err,
                "Scan gate failed"
            );
            err.into_response()
        }
    }
}

async fn forward(state: &AppState, request: Request) -> Response {
    match state.forwarder.forward(request).await {
        Ok(upstream) => stream_response(upstream),
        Err(err) => {
            tracing::error!(
                upstream = state.forwarder.upstream_url(),
                error = %err,
                "Failed to proxy request"
            );
            err.into_response()
        }
    }
}
