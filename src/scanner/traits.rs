//! Image scanner trait definition
//!
//! The scan gate only depends on this capability: given a repository name and
//! a reference, produce the raw bytes of a JSON vulnerability report.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::ScanError;

/// Trait for vulnerability scan backends
///
/// Implementations are invoked once per gated manifest request and may take
/// seconds to complete. Dropping the returned future must abort the scan.
///
/// # Example
///
/// ```ignore
/// use registry_scan_gate::scanner::ImageScanner;
///
/// struct FixedReport(bytes::Bytes);
///
/// #[async_trait]
/// impl ImageScanner for FixedReport {
///     fn name(&self) -> &str {
///         "fixed"
///     }
///
///     async fn scan(&self, _name: &str, _reference: &str) -> Result<Bytes, ScanError> {
///         Ok(self.0.clone())
///     }
/// }
/// ```
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ImageScanner: Send + Sync {
    /// Backend name used in logs
    fn name(&self) -> &str;

    /// Scan `name:reference` and return the raw report
    ///
    /// # Arguments
    ///
    /// * `name` - Repository name as requested by the client (`library/nginx`)
    /// * `reference` - Tag or digest
    async fn scan(&self, name: &str, reference: &str) -> Result<Bytes, ScanError>;
}
