//! Vulnerability scan report model and severity policy

use serde::{Deserialize, Deserializer, Serialize};

/// Severity level for vulnerabilities
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Severity {
    /// Unknown severity
    #[default]
    Unknown,
    /// Low severity
    Low,
    /// Medium severity
    Medium,
    /// High severity
    High,
    /// Critical severity
    Critical,
}

impl Severity {
    /// Whether a vulnerability of this severity blocks a pull
    pub fn is_blocking(self) -> bool {
        self >= Severity::High
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Unknown => write!(f, "UNKNOWN"),
            Severity::Low => write!(f, "LOW"),
            Severity::Medium => write!(f, "MEDIUM"),
            Severity::High => write!(f, "HIGH"),
            Severity::Critical => write!(f, "CRITICAL"),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "UNKNOWN" => Ok(Severity::Unknown),
            "LOW" => Ok(Severity::Low),
            "MEDIUM" => Ok(Severity::Medium),
            "HIGH" => Ok(Severity::High),
            "CRITICAL" => Ok(Severity::Critical),
            _ => Err(format!("Invalid severity: {}", s)),
        }
    }
}

// Scanners may grow new labels; anything unrecognised counts as UNKNOWN.
impl From<String> for Severity {
    fn from(s: String) -> Self {
        s.parse().unwrap_or_default()
    }
}

impl From<Severity> for String {
    fn from(severity: Severity) -> Self {
        severity.to_string()
    }
}

/// Package URL wrapper as emitted by the scanner
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageIdentifier {
    #[serde(rename = "PURL", default)]
    pub purl: String,
}

/// A single vulnerability finding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Vulnerability {
    #[serde(default)]
    pub severity: Severity,

    #[serde(rename = "VulnerabilityID", default)]
    pub vulnerability_id: String,

    #[serde(default)]
    pub pkg_identifier: PackageIdentifier,

    #[serde(default)]
    pub published_date: Option<String>,

    #[serde(default)]
    pub last_modified_date: Option<String>,
}

impl Vulnerability {
    /// Package URL of the affected package
    pub fn package_url(&self) -> &str {
        &self.pkg_identifier.purl
    }
}

/// Findings for one scan target (OS packages, a language lockfile, ...)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ReportResult {
    #[serde(default)]
    pub target: String,

    #[serde(default, deserialize_with = "null_as_empty")]
    pub vulnerabilities: Vec<Vulnerability>,
}

/// Report metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportMetadata {
    /// Digest of the scanned image config
    #[serde(rename = "ImageID", default)]
    pub image_id: String,
}

/// Structured scan report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ScanReport {
    pub metadata: ReportMetadata,

    #[serde(default, deserialize_with = "null_as_empty")]
    pub results: Vec<ReportResult>,
}

impl ScanReport {
    /// Parse a report from raw scanner output
    pub fn from_slice(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }

    /// Iterate over every vulnerability across all results
    pub fn vulnerabilities(&self) -> impl Iterator<Item = &Vulnerability> {
        self.results.iter().flat_map(|r| r.vulnerabilities.iter())
    }
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Outcome of applying the severity policy to a report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyDecision {
    /// Whether the pull may proceed
    pub allow: bool,

    /// Number of HIGH or CRITICAL findings
    pub violating_count: usize,
}

/// Apply the fixed severity policy: any HIGH or CRITICAL finding blocks.
pub fn evaluate_policy(report: &ScanReport) -> PolicyDecision {
    let violating_count = report
        .vulnerabilities()
        .filter(|v| v.severity.is_blocking())
        .count();

    PolicyDecision {
        allow: violating_count == 0,
        violating_count,
    }
}
