//! Domain models for registry-scan-gate
//!
//! This module contains the documents the scan gate inspects: the image
//! manifest served by the upstream registry and the report produced by the
//! vulnerability scanner.

pub mod manifest;
pub mod report;

// Re-export commonly used types
pub use manifest::{is_docker_manifest_v2, Descriptor, Manifest, DOCKER_MANIFEST_V2};
pub use report::{
    evaluate_policy, PackageIdentifier, PolicyDecision, ReportMetadata, ReportResult, ScanReport,
    Severity, Vulnerability,
};
