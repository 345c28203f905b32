//! Upstream registry forwarding
//!
//! The forwarder is used both as the default pass-through path and by the
//! scan gate to fetch the manifest it inspects.

pub mod forwarder;

pub use forwarder::{buffered_response, copy_headers, stream_response, Forwarder};
