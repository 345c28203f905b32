//! Upstream forwarder
//!
//! Replays an inbound request against the configured upstream registry and
//! turns the upstream response back into a client response. One pooled
//! `reqwest::Client` is owned per forwarder and lives as long as the listener.

use std::time::Duration;

use axum::body::{Body, HttpBody};
use axum::http::{header, HeaderMap, HeaderName, Method, Request, StatusCode, Uri};
use axum::response::Response;
use bytes::Bytes;
use reqwest::Client;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::debug;

use crate::error::ForwardError;

/// Connection-scoped headers that must not be relayed by a proxy
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Buffered chunks between the inbound body and the upstream request
const BODY_CHANNEL_CAPACITY: usize = 16;

fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP_HEADERS.contains(&name.as_str())
}

/// Forwards requests to a single upstream registry
#[derive(Debug, Clone)]
pub struct Forwarder {
    client: Client,
    upstream: String,
}

impl Forwarder {
    /// Create a forwarder with its own connection-pooled client
    pub fn new(upstream: impl Into<String>, connect_timeout: Duration) -> Result<Self, ForwardError> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| ForwardError::ClientBuild(e.to_string()))?;
        Ok(Self::with_client(client, upstream))
    }

    /// Create a forwarder around an existing client
    pub fn with_client(client: Client, upstream: impl Into<String>) -> Self {
        let upstream = upstream.into().trim_end_matches('/').to_string();
        Self { client, upstream }
    }

    /// Upstream base URL
    pub fn upstream_url(&self) -> &str {
        &self.upstream
    }

    /// Upstream URL for an inbound request URI (base + path + query)
    pub fn target_url(&self, uri: &Uri) -> String {
        let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
        format!("{}{}", self.upstream, path_and_query)
    }

    /// Clone the inbound request against the upstream and execute it
    ///
    /// The request body is streamed, not buffered.
    pub async fn forward(&self, request: Request<Body>) -> Result<reqwest::Response, ForwardError> {
        let (parts, body) = request.into_parts();
        self.send(parts.method, &parts.uri, &parts.headers, streaming_body(body))
            .await
    }

    /// Execute a request against the upstream with the given method and headers
    pub async fn send(
        &self,
        method: Method,
        uri: &Uri,
        headers: &HeaderMap,
        body: reqwest::Body,
    ) -> Result<reqwest::Response, ForwardError> {
        let url = self.target_url(uri);
        debug!(method = %method, url = %url, "Forwarding request upstream");

        let response = self
            .client
            .request(method, &url)
            .headers(outbound_headers(headers))
            .body(body)
            .send()
            .await?;

        debug!(url = %url, status = response.status().as_u16(), "Upstream responded");
        Ok(response)
    }
}

/// Pipe an inbound body into an upstream request body chunk by chunk
fn streaming_body(body: Body) -> reqwest::Body {
    if body.is_end_stream() {
        return reqwest::Body::from(Bytes::new());
    }

    let (tx, rx) = mpsc::channel(BODY_CHANNEL_CAPACITY);
    tokio::spawn(async move {
        let mut stream = body.into_data_stream();
        while let Some(chunk) = stream.next().await {
            if tx.send(chunk).await.is_err() {
                break;
            }
        }
    });
    reqwest::Body::wrap_stream(ReceiverStream::new(rx))
}

/// Inbound headers minus `Host` and hop-by-hop headers
fn outbound_headers(headers: &HeaderMap) -> HeaderMap {
    let mut outbound = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if name == header::HOST || is_hop_by_hop(name) {
            continue;
        }
        outbound.append(name.clone(), value.clone());
    }
    outbound
}

/// Copy upstream headers onto a response, replacing any existing values
pub fn copy_headers(from: &HeaderMap, to: &mut HeaderMap) {
    for name in from.keys() {
        if is_hop_by_hop(name) {
            continue;
        }
        to.remove(name);
        for value in from.get_all(name) {
            to.append(name.clone(), value.clone());
        }
    }
}

/// Stream an upstream response back to the client verbatim
pub fn stream_response(upstream: reqwest::Response) -> Response {
    let status = upstream.status();
    let headers = upstream.headers().clone();
    build_response(status, &headers, Body::from_stream(upstream.bytes_stream()))
}

/// Replay an already buffered upstream response
pub fn buffered_response(status: StatusCode, headers: &HeaderMap, body: Bytes) -> Response {
    build_response(status, headers, Body::from(body))
}

fn build_response(status: StatusCode, headers: &HeaderMap, body: Body) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    copy_headers(headers, response.headers_mut());
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use wiremock::matchers::{body_string, header as header_eq, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn forwarder(uri: &str) -> Forwarder {
        Forwarder::new(uri, Duration::from_secs(5)).unwrap()
    }

    // Test 1: Target URL joins base, path and query
    #[test]
    fn test_target_url() {
        let fwd = forwarder("https://registry.example.com:5000/");
        let uri: Uri = "/v2/library/nginx/tags/list?n=10&last=b".parse().unwrap();
        assert_eq!(
            fwd.target_url(&uri),
            "https://registry.example.com:5000/v2/library/nginx/tags/list?n=10&last=b"
        );
        assert_eq!(fwd.upstream_url(), "https://registry.example.com:5000");
    }

    // Test 2: Outbound headers drop Host and hop-by-hop headers only
    #[test]
    fn test_outbound_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("proxy.local"));
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
        headers.insert("keep-alive", HeaderValue::from_static("timeout=5"));
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        headers.append(header::ACCEPT, HeaderValue::from_static("application/json"));
        headers.append(
            header::ACCEPT,
            HeaderValue::from_static("application/vnd.docker.distribution.manifest.v2+json"),
        );

        let outbound = outbound_headers(&headers);
        assert!(outbound.get(header::HOST).is_none());
        assert!(outbound.get(header::CONNECTION).is_none());
        assert!(outbound.get("keep-alive").is_none());
        assert_eq!(outbound.get(header::AUTHORIZATION).unwrap(), "Bearer abc");
        assert_eq!(outbound.get_all(header::ACCEPT).iter().count(), 2);
    }

    // Test 3: Header copy overwrites existing values
    #[test]
    fn test_copy_headers_overwrites() {
        let mut from = HeaderMap::new();
        from.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        from.insert("docker-content-digest", HeaderValue::from_static("sha256:abc"));
        from.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));

        let mut to = HeaderMap::new();
        to.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        to.insert("x-existing", HeaderValue::from_static("kept"));

        copy_headers(&from, &mut to);
        assert_eq!(to.get(header::CONTENT_TYPE).unwrap(), "application/json");
        assert_eq!(to.get_all(header::CONTENT_TYPE).iter().count(), 1);
        assert_eq!(to.get("docker-content-digest").unwrap(), "sha256:abc");
        assert_eq!(to.get("x-existing").unwrap(), "kept");
        assert!(to.get(header::TRANSFER_ENCODING).is_none());
    }

    // Test 4: Forward preserves method, path, query, headers and body
    #[tokio::test]
    async fn test_forward_preserves_request() {
        let mock_server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/v2/team/app/manifests/v1"))
            .and(query_param("mount", "sha256:abc"))
            .and(header_eq("authorization", "Bearer token"))
            .and(body_string("manifest-bytes"))
            .respond_with(ResponseTemplate::new(201).insert_header("location", "/v2/team/app/manifests/sha256:def"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let request = Request::builder()
            .method(Method::PUT)
            .uri("/v2/team/app/manifests/v1?mount=sha256:abc")
            .header(header::AUTHORIZATION, "Bearer token")
            .header(header::HOST, "proxy.local")
            .body(Body::from("manifest-bytes"))
            .unwrap();

        let response = forwarder(&mock_server.uri()).forward(request).await.unwrap();
        assert_eq!(response.status(), 201);
        assert_eq!(
            response.headers().get("location").unwrap(),
            "/v2/team/app/manifests/sha256:def"
        );
    }

    // Test 5: Streamed response reproduces status, headers and body
    #[tokio::test]
    async fn test_stream_response_verbatim() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/library/nginx/blobs/sha256:abc"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("docker-content-digest", "sha256:abc")
                    .set_body_bytes(b"layer-bytes".to_vec()),
            )
            .mount(&mock_server)
            .await;

        let request = Request::builder()
            .uri("/v2/library/nginx/blobs/sha256:abc")
            .body(Body::empty())
            .unwrap();
        let upstream = forwarder(&mock_server.uri()).forward(request).await.unwrap();
        let response = stream_response(upstream);

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("docker-content-digest").unwrap(),
            "sha256:abc"
        );
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"layer-bytes");
    }

    // Test 6: Connection failure is UpstreamUnreachable
    #[tokio::test]
    async fn test_forward_unreachable() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let request = Request::builder()
            .uri("/v2/")
            .body(Body::empty())
            .unwrap();
        let err = forwarder(&format!("http://{}", addr))
            .forward(request)
            .await
            .unwrap_err();

        assert!(matches!(err, ForwardError::UpstreamUnreachable(_)));
    }

    // Test 7: Buffered response replays the given bytes
    #[tokio::test]
    async fn test_buffered_response() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let response = buffered_response(StatusCode::OK, &headers, Bytes::from_static(b"{}"));
        assert_eq!(response.headers().get(header::CONTENT_TYPE).unwrap(), "application/json");
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"{}");
    }
}
