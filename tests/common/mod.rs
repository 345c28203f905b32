//! Common test utilities and helpers for integration tests

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use registry_scan_gate::config::EntrypointConfig;
use registry_scan_gate::error::ScanError;
use registry_scan_gate::gate::ScanGate;
use registry_scan_gate::models::DOCKER_MANIFEST_V2;
use registry_scan_gate::proxy::Forwarder;
use registry_scan_gate::scanner::ImageScanner;
use registry_scan_gate::server::{AppState, Server};

/// Scanner stub returning a fixed outcome and counting invocations
pub struct StubScanner {
    outcome: Result<Bytes, ScanError>,
    calls: AtomicUsize,
    requested: Mutex<Vec<(String, String)>>,
}

impl StubScanner {
    pub fn with_report(report: Bytes) -> Arc<Self> {
        Arc::new(Self {
            outcome: Ok(report),
            calls: AtomicUsize::new(0),
            requested: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(err: ScanError) -> Arc<Self> {
        Arc::new(Self {
            outcome: Err(err),
            calls: AtomicUsize::new(0),
            requested: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requested(&self) -> Vec<(String, String)> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageScanner for StubScanner {
    fn name(&self) -> &str {
        "stub"
    }

    async fn scan(&self, name: &str, reference: &str) -> Result<Bytes, ScanError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requested
            .lock()
            .unwrap()
            .push((name.to_string(), reference.to_string()));
        self.outcome.clone()
    }
}

/// Docker V2 manifest whose config digest is `config_digest`
pub fn manifest_json(config_digest: &str) -> String {
    serde_json::json!({
        "schemaVersion": 2,
        "mediaType": DOCKER_MANIFEST_V2,
        "config": {
            "mediaType": "application/vnd.docker.container.image.v1+json",
            "size": 7023,
            "digest": config_digest
        },
        "layers": [
            {
                "mediaType": "application/vnd.docker.image.rootfs.diff.tar.gzip",
                "size": 29126484,
                "digest": "sha256:09f376ebb190216b0459f470e71bec7b5dfa611d66bf008492b40dcc5f1d8eae"
            },
            {
                "mediaType": "application/vnd.docker.image.rootfs.diff.tar.gzip",
                "size": 41380513,
                "digest": "sha256:5529e0792248ff6a0b2e6b2f1b0a0b0cc9f28b7b4fc1de1cbad6bdcd3f7e5a2e"
            }
        ]
    })
    .to_string()
}

/// Trivy-shaped report with one finding per severity label
pub fn report_json(image_id: &str, severities: &[&str]) -> Bytes {
    let vulnerabilities: Vec<serde_json::Value> = severities
        .iter()
        .enumerate()
        .map(|(i, severity)| {
            serde_json::json!({
                "VulnerabilityID": format!("CVE-2024-{:04}", i + 1),
                "PkgName": "libssl3",
                "InstalledVersion": "3.0.11-1~deb12u2",
                "Severity": severity,
                "PkgIdentifier": { "PURL": "pkg:deb/debian/libssl3@3.0.11-1~deb12u2?arch=amd64" },
                "PublishedDate": "2024-01-15T20:15:00Z",
                "LastModifiedDate": "2024-02-01T10:00:00Z"
            })
        })
        .collect();

    Bytes::from(
        serde_json::json!({
            "SchemaVersion": 2,
            "ArtifactName": "registry.example.com/library/nginx:latest",
            "ArtifactType": "container_image",
            "Metadata": {
                "OS": { "Family": "debian", "Name": "12.4" },
                "ImageID": image_id
            },
            "Results": [{
                "Target": "registry.example.com/library/nginx:latest (debian 12.4)",
                "Class": "os-pkgs",
                "Type": "debian",
                "Vulnerabilities": vulnerabilities
            }]
        })
        .to_string(),
    )
}

/// Application state pointing at `upstream` and using `scanner`
pub fn create_test_state(upstream: &str, scanner: Arc<dyn ImageScanner>) -> AppState {
    let forwarder = Arc::new(
        Forwarder::new(upstream, Duration::from_secs(2)).expect("Failed to build forwarder"),
    );
    let gate = Arc::new(ScanGate::new(Arc::clone(&forwarder), scanner));
    AppState { forwarder, gate }
}

/// Run a proxy in front of `upstream` and return its address
/// The server will be shut down when the returned shutdown sender is dropped or sent
pub async fn run_test_server(
    upstream: &str,
    scanner: Arc<dyn ImageScanner>,
) -> (SocketAddr, tokio::sync::oneshot::Sender<()>) {
    let config = EntrypointConfig {
        name: "test".to_string(),
        address: "127.0.0.1:0".to_string(),
        upstream_url: upstream.to_string(),
        registry: None,
    };
    let server = Server::new(config, create_test_state(upstream, scanner));
    let listener = server.bind().await.expect("Failed to bind test server");
    let addr = listener.local_addr().expect("Failed to get local address");

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

    tokio::spawn(async move {
        server
            .serve(listener, async move {
                let _ = shutdown_rx.await;
            })
            .await
            .expect("Server error");
    });

    (addr, shutdown_tx)
}

/// Address of a port nothing listens on
pub fn closed_port_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("Failed to bind");
    let addr = listener.local_addr().expect("Failed to get local address");
    drop(listener);
    format!("http://{}", addr)
}
