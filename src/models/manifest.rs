//! Image manifest model
//!
//! Only the fields the scan gate inspects are modelled. The manifest bytes
//! served to the client are always the upstream bytes, never a re-serialized
//! copy of this struct.

use serde::{Deserialize, Serialize};

/// Docker Registry V2 image manifest media type (schema 2)
pub const DOCKER_MANIFEST_V2: &str = "application/vnd.docker.distribution.manifest.v2+json";

/// Docker manifest list media type (multi-arch)
pub const DOCKER_MANIFEST_LIST_V2: &str =
    "application/vnd.docker.distribution.manifest.list.v2+json";

/// OCI image index media type (multi-arch)
pub const OCI_IMAGE_INDEX_V1: &str = "application/vnd.oci.image.index.v1+json";

/// Content descriptor referencing a blob by digest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    /// Media type of the referenced blob
    #[serde(default)]
    pub media_type: String,

    /// Size of the referenced blob in bytes
    #[serde(default)]
    pub size: u64,

    /// Content digest (e.g. `sha256:...`)
    pub digest: String,
}

/// Image manifest describing a config blob and its layers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    /// Schema version (2 for Docker V2 manifests)
    #[serde(default)]
    pub schema_version: u32,

    /// Manifest media type
    #[serde(default)]
    pub media_type: String,

    /// Image config descriptor; its digest is the image ID
    pub config: Descriptor,

    /// Layer descriptors
    #[serde(default)]
    pub layers: Vec<Descriptor>,
}

impl Manifest {
    /// Parse a manifest from raw response bytes
    pub fn from_slice(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }

    /// Digest of the image config blob
    pub fn image_id(&self) -> &str {
        &self.config.digest
    }
}

/// Check whether a `Content-Type` header value denotes a Docker V2 image manifest
///
/// Media type parameters (after `;`) are ignored and the comparison is
/// case-insensitive.
pub fn is_docker_manifest_v2(content_type: &str) -> bool {
    let essence = content_type.split(';').next().unwrap_or_default().trim();
    essence.eq_ignore_ascii_case(DOCKER_MANIFEST_V2)
}
