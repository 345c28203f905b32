//! Trivy scan backend
//!
//! Runs the `trivy` CLI against the image on the upstream registry and returns
//! its JSON report.

use std::process::Stdio;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::ScanError;
use crate::registry::ImageRef;

use super::traits::ImageScanner;

/// Longest stderr excerpt carried in a scan error
const MAX_STDERR_LEN: usize = 2048;

/// Configuration for the Trivy backend
#[derive(Debug, Clone, PartialEq)]
pub struct TrivyConfig {
    /// Path to the trivy binary (default: trivy)
    pub binary: String,

    /// Scan cache directory
    pub cache_dir: Option<String>,

    /// Extra arguments appended before the image target
    pub extra_args: Vec<String>,
}

impl Default for TrivyConfig {
    fn default() -> Self {
        Self {
            binary: "trivy".to_string(),
            cache_dir: None,
            extra_args: Vec::new(),
        }
    }
}

/// Scanner that shells out to `trivy image`
#[derive(Debug, Clone)]
pub struct TrivyScanner {
    config: TrivyConfig,
    registry: String,
}

impl TrivyScanner {
    /// Create a scanner for images hosted on `registry` (host[:port])
    pub fn new(config: TrivyConfig, registry: impl Into<String>) -> Self {
        Self {
            config,
            registry: registry.into(),
        }
    }

    /// Registry host images are resolved against
    pub fn registry(&self) -> &str {
        &self.registry
    }

    /// Command line arguments for scanning `target`
    pub fn build_args(&self, target: &str) -> Vec<String> {
        let mut args: Vec<String> = ["image", "--format", "json", "--quiet", "--scanners", "vuln"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        if let Some(ref cache_dir) = self.config.cache_dir {
            args.push("--cache-dir".to_string());
            args.push(cache_dir.clone());
        }
        args.extend(self.config.extra_args.iter().cloned());
        args.push(target.to_string());
        args
    }
}

#[async_trait]
impl ImageScanner for TrivyScanner {
    fn name(&self) -> &str {
        "trivy"
    }

    async fn scan(&self, name: &str, reference: &str) -> Result<Bytes, ScanError> {
        let target = ImageRef::new(name, reference).scan_target(&self.registry);
        info!(target = %target, "Scanning image with trivy");

        // The child is killed if this future is dropped (client went away).
        let output = Command::new(&self.config.binary)
            .args(self.build_args(&target))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ScanError::Spawn(format!("{}: {}", self.config.binary, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ScanError::ExitStatus {
                status: output.status.to_string(),
                stderr: truncate(stderr.trim(), MAX_STDERR_LEN).to_string(),
            });
        }

        debug!(target = %target, report_size = output.stdout.len(), "Scan finished");
        Ok(Bytes::from(output.stdout))
    }
}

fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
