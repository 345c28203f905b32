//! Docker Registry V2 route classification
//!
//! Classifies an inbound method + path against the manifest and blob
//! sub-resources of the registry API. Repository names may be nested
//! (`library/nginx`, `team/project/app`), so the name and reference are read
//! from named capture groups rather than positional ones.

use axum::http::Method;
use once_cell::sync::Lazy;
use regex_lite::Regex;

/// Repository name grammar: `/`-separated components of lowercase
/// alphanumerics joined by `.`, `_`, `__` or runs of `-`.
const NAME_EXPRESSION: &str =
    r"[a-z0-9]+(?:(?:\.|_|__|-+)[a-z0-9]+)*(?:/[a-z0-9]+(?:(?:\.|_|__|-+)[a-z0-9]+)*)*";

/// Reference grammar: a tag or a content digest.
const REFERENCE_EXPRESSION: &str =
    r"[a-zA-Z0-9_][a-zA-Z0-9._-]{0,127}|[a-z0-9]+(?:[+._-][a-z0-9]+)*:[a-zA-Z0-9=_-]+";

static MANIFEST_PATTERN: Lazy<Regex> = Lazy::new(|| compile_pattern("manifests"));
static BLOB_PATTERN: Lazy<Regex> = Lazy::new(|| compile_pattern("blobs"));

fn compile_pattern(resource: &str) -> Regex {
    Regex::new(&format!(
        r"^/v2/(?P<name>{NAME_EXPRESSION})/{resource}/(?P<reference>{REFERENCE_EXPRESSION})$"
    ))
    .expect("Invalid registry route pattern")
}

/// Kind of registry sub-resource a request addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteKind {
    /// `GET|HEAD /v2/<name>/manifests/<reference>`
    Manifest,
    /// `GET|HEAD /v2/<name>/blobs/<digest>`
    Blob,
    /// Anything else
    Other,
}

/// Repository name and reference extracted from a matched path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    /// Repository name, possibly nested (`library/nginx`)
    pub name: String,
    /// Tag or digest
    pub reference: String,
}

impl ImageRef {
    pub fn new(name: impl Into<String>, reference: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reference: reference.into(),
        }
    }

    /// Whether the reference is a content digest rather than a tag
    pub fn is_digest(&self) -> bool {
        self.reference.contains(':')
    }

    /// Full image reference on the given registry host, as a scanner expects it
    pub fn scan_target(&self, registry: &str) -> String {
        let separator = if self.is_digest() { '@' } else { ':' };
        let registry = registry.trim_end_matches('/');
        if registry.is_empty() {
            format!("{}{}{}", self.name, separator, self.reference)
        } else {
            format!("{}/{}{}{}", registry, self.name, separator, self.reference)
        }
    }
}

impl std::fmt::Display for ImageRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.name, self.reference)
    }
}

/// Result of classifying a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Manifest(ImageRef),
    Blob(ImageRef),
    Other,
}

impl Route {
    pub fn kind(&self) -> RouteKind {
        match self {
            Route::Manifest(_) => RouteKind::Manifest,
            Route::Blob(_) => RouteKind::Blob,
            Route::Other => RouteKind::Other,
        }
    }

    /// Whether the path matched a manifest or blob pattern
    pub fn matched(&self) -> bool {
        !matches!(self, Route::Other)
    }

    pub fn image(&self) -> Option<&ImageRef> {
        match self {
            Route::Manifest(image) | Route::Blob(image) => Some(image),
            Route::Other => None,
        }
    }
}

/// Classify a request method and URL path
///
/// Only `GET` and `HEAD` are classified as manifest or blob reads; every other
/// method, and every path outside the grammar, is `Route::Other`.
pub fn classify(method: &Method, path: &str) -> Route {
    if method != Method::GET && method != Method::HEAD {
        return Route::Other;
    }

    if let Some(image) = capture(&MANIFEST_PATTERN, path) {
        return Route::Manifest(image);
    }
    if let Some(image) = capture(&BLOB_PATTERN, path) {
        return Route::Blob(image);
    }
    Route::Other
}

fn capture(pattern: &Regex, path: &str) -> Option<ImageRef> {
    let caps = pattern.captures(path)?;
    let name = caps.name("name")?.as_str();
    let reference = caps.name("reference")?.as_str();
    Some(ImageRef::new(name, reference))
}

#[cfg(test)]
mod tests {
    use super::*;

    // Test 1: Manifest by tag
    #[test]
    fn test_classify_manifest_tag() {
        let route = classify(&Method::GET, "/v2/library/nginx/manifests/latest");
        assert_eq!(route, Route::Manifest(ImageRef::new("library/nginx", "latest")));
        assert_eq!(route.kind(), RouteKind::Manifest);
        assert!(route.matched());
    }

    // Test 2: Manifest by digest
    #[test]
    fn test_classify_manifest_digest() {
        let digest = "sha256:e692418e4cbaf90ca69d05a66403747baa33ee08806650b51fab815ad7fc331f";
        let route = classify(&Method::GET, &format!("/v2/library/nginx/manifests/{digest}"));
        assert_eq!(route, Route::Manifest(ImageRef::new("library/nginx", digest)));
    }

    // Test 3: Nested names of any depth keep the full name and trailing reference
    #[test]
    fn test_classify_nested_names() {
        for name in [
            "nginx",
            "library/nginx",
            "team/project/app",
            "a/b/c/d/e/f",
            "my-org/sub.group/app_name/image--x",
        ] {
            let route = classify(&Method::GET, &format!("/v2/{name}/manifests/v1.2.3"));
            assert_eq!(
                route,
                Route::Manifest(ImageRef::new(name, "v1.2.3")),
                "name {name}"
            );
        }
    }

    // Test 4: A name component spelled like a sub-resource stays part of the name
    #[test]
    fn test_classify_name_containing_resource_word() {
        let route = classify(&Method::GET, "/v2/org/manifests/manifests/latest");
        assert_eq!(route, Route::Manifest(ImageRef::new("org/manifests", "latest")));

        let route = classify(&Method::GET, "/v2/org/blobs/blobs/sha256:abc");
        assert_eq!(route, Route::Blob(ImageRef::new("org/blobs", "sha256:abc")));
    }

    // Test 5: Blob requests
    #[test]
    fn test_classify_blob() {
        let route = classify(&Method::GET, "/v2/library/nginx/blobs/sha256:abc");
        assert_eq!(route, Route::Blob(ImageRef::new("library/nginx", "sha256:abc")));
        assert_eq!(route.kind(), RouteKind::Blob);
    }

    // Test 6: HEAD is classified like GET
    #[test]
    fn test_classify_head() {
        assert_eq!(
            classify(&Method::HEAD, "/v2/library/nginx/manifests/latest").kind(),
            RouteKind::Manifest
        );
        assert_eq!(
            classify(&Method::HEAD, "/v2/library/nginx/blobs/sha256:abc").kind(),
            RouteKind::Blob
        );
    }

    // Test 7: Write methods are never classified
    #[test]
    fn test_classify_write_methods() {
        for method in [Method::PUT, Method::POST, Method::DELETE, Method::PATCH] {
            assert_eq!(
                classify(&method, "/v2/library/nginx/manifests/latest"),
                Route::Other
            );
        }
    }

    // Test 8: Paths outside the grammar fall back to Other
    #[test]
    fn test_classify_other_paths() {
        for path in [
            "/v2/",
            "/v2/_catalog",
            "/v2/library/nginx/tags/list",
            "/v2/library/nginx/blobs/uploads/",
            "/v2/library/nginx/manifests",
            "/v2/Library/Nginx/manifests/latest",
            "/v2/library//nginx/manifests/latest",
            "/v2/-nginx/manifests/latest",
            "/v2/library/nginx/manifests/.hidden",
            "/v3/library/nginx/manifests/latest",
            "/health",
        ] {
            assert_eq!(classify(&Method::GET, path), Route::Other, "path {path}");
        }
    }

    // Test 9: Tags are limited to 128 characters
    #[test]
    fn test_classify_tag_length() {
        let tag = "a".repeat(128);
        assert!(classify(&Method::GET, &format!("/v2/app/manifests/{tag}")).matched());

        let tag = "a".repeat(129);
        assert!(!classify(&Method::GET, &format!("/v2/app/manifests/{tag}")).matched());
    }

    // Test 10: Scan target uses ':' for tags and '@' for digests
    #[test]
    fn test_scan_target() {
        let tag = ImageRef::new("library/nginx", "latest");
        assert!(!tag.is_digest());
        assert_eq!(
            tag.scan_target("registry.example.com:5000"),
            "registry.example.com:5000/library/nginx:latest"
        );
        assert_eq!(tag.scan_target(""), "library/nginx:latest");

        let digest = ImageRef::new("library/nginx", "sha256:abc");
        assert!(digest.is_digest());
        assert_eq!(
            digest.scan_target("registry.example.com/"),
            "registry.example.com/library/nginx@sha256:abc"
        );
    }

    // Test 11: Display renders name:reference
    #[test]
    fn test_image_ref_display() {
        assert_eq!(
            ImageRef::new("library/nginx", "latest").to_string(),
            "library/nginx:latest"
        );
    }
}
