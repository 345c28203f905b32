//! Application error types for registry-scan-gate
//!
//! This module defines the error taxonomy shared by the forwarder, the scanner
//! boundary and the scan gate. All error types use `thiserror`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Upstream forwarding errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ForwardError {
    /// Transport-level failure talking to the upstream registry
    #[error("Upstream unreachable: {0}")]
    UpstreamUnreachable(String),

    /// Upstream base URL combined with the request path is not a valid URL
    #[error("Invalid upstream URL: {0}")]
    InvalidUpstreamUrl(String),

    /// HTTP client could not be constructed
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(String),
}

impl ForwardError {
    /// HTTP status written to the client for this failure
    pub fn status_code(&self) -> StatusCode {
        match self {
            ForwardError::UpstreamUnreachable(_) => StatusCode::BAD_GATEWAY,
            ForwardError::InvalidUpstreamUrl(_) | ForwardError::ClientBuild(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ForwardError {
    fn into_response(self) -> Response {
        let message = match self {
            ForwardError::UpstreamUnreachable(_) => "failed to proxy request",
            ForwardError::InvalidUpstreamUrl(_) | ForwardError::ClientBuild(_) => {
                "failed to create proxy request"
            }
        };
        (self.status_code(), format!("{}\n", message)).into_response()
    }
}

impl From<reqwest::Error> for ForwardError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_builder() {
            ForwardError::InvalidUpstreamUrl(err.to_string())
        } else {
            ForwardError::UpstreamUnreachable(err.to_string())
        }
    }
}

/// Scanner invocation errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ScanError {
    /// Scanner process could not be started
    #[error("Failed to start scanner: {0}")]
    Spawn(String),

    /// Scanner finished with a non-zero exit status
    #[error("Scanner exited with {status}: {stderr}")]
    ExitStatus { status: String, stderr: String },
}

/// Scan gate failures
///
/// Every variant is terminal for the request that produced it. A policy
/// violation is not an error and is reported through `GateAction::Block`.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GateError {
    /// Manifest could not be fetched from the upstream registry
    #[error("Upstream unreachable: {0}")]
    UpstreamUnreachable(String),

    /// Upstream served something other than a Docker V2 image manifest
    #[error("Unexpected manifest content type: {0}")]
    UnexpectedContentType(String),

    /// Manifest body is not a valid image manifest
    #[error("Manifest unparseable: {0}")]
    ManifestUnparseable(String),

    /// Scanner invocation failed
    #[error("Scan failed: {0}")]
    ScanFailed(#[from] ScanError),

    /// Scanner output is not a valid report
    #[error("Report unparseable: {0}")]
    ReportUnparseable(String),

    /// Scanned image is not the image being served
    #[error("Digest mismatch: manifest config {manifest}, report image {report}")]
    DigestMismatch { manifest: String, report: String },

    /// Method is not handled by the gate
    #[error("Method not allowed: {0}")]
    MethodNotAllowed(String),
}

impl GateError {
    /// HTTP status written to the client for this failure
    pub fn status_code(&self) -> StatusCode {
        match self {
            GateError::UpstreamUnreachable(_) => StatusCode::BAD_GATEWAY,
            GateError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            GateError::UnexpectedContentType(_)
            | GateError::ManifestUnparseable(_)
            | GateError::ScanFailed(_)
            | GateError::ReportUnparseable(_)
            | GateError::DigestMismatch { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short taxonomy name used as a structured log field
    pub fn kind(&self) -> &'static str {
        match self {
            GateError::UpstreamUnreachable(_) => "UpstreamUnreachable",
            GateError::UnexpectedContentType(_) => "UnexpectedContentType",
            GateError::ManifestUnparseable(_) => "ManifestUnparseable",
            GateError::ScanFailed(_) => "ScanFailed",
            GateError::ReportUnparseable(_) => "ReportUnparseable",
            GateError::DigestMismatch { .. } => "DigestMismatch",
            GateError::MethodNotAllowed(_) => "MethodNotAllowed",
        }
    }

    /// Generic operator-facing message; details stay in the logs
    fn public_message(&self) -> &'static str {
        match self {
            GateError::UpstreamUnreachable(_) => "unable to fetch manifest",
            GateError::UnexpectedContentType(_) => "unexpected content type of manifest",
            GateError::ManifestUnparseable(_) => "unable to parse manifest",
            GateError::ScanFailed(_) => "unable to scan image",
            GateError::ReportUnparseable(_) => "unable to parse scan report",
            GateError::DigestMismatch { .. } => "image ID mismatch",
            GateError::MethodNotAllowed(_) => "method not allowed",
        }
    }
}

impl From<ForwardError> for GateError {
    fn from(err: ForwardError) -> Self {
        GateError::UpstreamUnreachable(err.to_string())
    }
}

impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        (self.status_code(), format!("{}\n", self.public_message())).into_response()
    }
}
