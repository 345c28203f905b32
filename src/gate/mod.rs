//! Scan gate for manifest pulls
//!
//! Fetches the manifest from upstream, scans the image, cross-checks the
//! scanned image ID against the manifest's config digest and applies the
//! severity policy before letting the manifest through.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, HeaderValue, Method, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::error::GateError;
use crate::models::{evaluate_policy, is_docker_manifest_v2, Manifest, ScanReport};
use crate::proxy::{buffered_response, stream_response, Forwarder};
use crate::registry::ImageRef;
use crate::scanner::ImageScanner;

const RULE: &str =
    "====================================================================================";

/// Result of gating a manifest request
#[derive(Debug)]
pub enum GateAction {
    /// Serve this response to the client
    Forward(Response),

    /// Deny the pull
    Block(Denial),
}

impl IntoResponse for GateAction {
    fn into_response(self) -> Response {
        match self {
            GateAction::Forward(response) => response,
            GateAction::Block(denial) => denial.into_response(),
        }
    }
}

/// A pull denied by the severity policy
#[derive(Debug, Clone, PartialEq)]
pub struct Denial {
    pub image: ImageRef,

    /// Raw scanner report, echoed to the client
    pub report: Bytes,

    pub violating_count: usize,
}

impl Denial {
    /// Plain-text body explaining the denial
    pub fn body(&self) -> String {
        format!(
            "\nWARNING: Download of image {} is prohibited due to existing vulnerabilities!!!\n\n\
             Information about the containing vulnerabilities are shown below.\n\n\
             {}\n{}\n{}\n",
            self.image,
            RULE,
            String::from_utf8_lossy(&self.report),
            RULE
        )
    }
}

impl IntoResponse for Denial {
    fn into_response(self) -> Response {
        (
            StatusCode::FORBIDDEN,
            [(
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/plain; charset=utf-8"),
            )],
            self.body(),
        )
            .into_response()
    }
}

/// Vulnerability gate in front of one upstream registry
#[derive(Clone)]
pub struct ScanGate {
    forwarder: Arc<Forwarder>,
    scanner: Arc<dyn ImageScanner>,
}

impl ScanGate {
    pub fn new(forwarder: Arc<Forwarder>, scanner: Arc<dyn ImageScanner>) -> Self {
        Self { forwarder, scanner }
    }

    /// Decide whether the manifest for `image` may be served
    ///
    /// Only GET and HEAD are gated. Non-success upstream responses (auth
    /// challenges, 404) are passed through without scanning.
    pub async fn gate(
        &self,
        image: &ImageRef,
        request: Request<Body>,
    ) -> Result<GateAction, GateError> {
        let (parts, _body) = request.into_parts();
        let head_only = match parts.method {
            Method::GET => false,
            Method::HEAD => true,
            ref other => return Err(GateError::MethodNotAllowed(other.to_string())),
        };

        // HEAD has no body to inspect, so the manifest is always fetched with GET.
        let upstream = self
            .forwarder
            .send(Method::GET, &parts.uri, &parts.headers, reqwest::Body::from(Bytes::new()))
            .await?;

        let status = upstream.status();
        if !status.is_success() {
            warn!(
                image = %image,
                status = status.as_u16(),
                "Unexpected upstream status for manifest, passing through"
            );
            return Ok(GateAction::Forward(stream_response(upstream)));
        }

        let content_type = upstream
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if !is_docker_manifest_v2(&content_type) {
            return Err(GateError::UnexpectedContentType(content_type));
        }

        let headers = upstream.headers().clone();
        let body = upstream
            .bytes()
            .await
            .map_err(|e| GateError::UpstreamUnreachable(e.to_string()))?;

        let manifest = Manifest::from_slice(&body)
            .map_err(|e| GateError::ManifestUnparseable(e.to_string()))?;

        debug!(image = %image, scanner = self.scanner.name(), "Scanning image");
        let raw_report = self.scanner.scan(&image.name, &image.reference).await?;

        let report = ScanReport::from_slice(&raw_report)
            .map_err(|e| GateError::ReportUnparseable(e.to_string()))?;

        // An unidentified image on either side never matches.
        if manifest.image_id().is_empty() || report.metadata.image_id != manifest.image_id() {
            return Err(GateError::DigestMismatch {
                manifest: manifest.image_id().to_string(),
                report: report.metadata.image_id,
            });
        }

        let decision = evaluate_policy(&report);
        if !decision.allow {
            info!(
                image = %image,
                violating_count = decision.violating_count,
                "Blocked image pull due to vulnerabilities"
            );
            return Ok(GateAction::Block(Denial {
                image: image.clone(),
                report: raw_report,
                violating_count: decision.violating_count,
            }));
        }

        info!(image = %image, image_id = manifest.image_id(), "Image passed scan gate");
        let body = if head_only { Bytes::new() } else { body };
        Ok(GateAction::Forward(buffered_response(status, &headers, body)))
    }
}
