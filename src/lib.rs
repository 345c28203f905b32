//! registry-scan-gate - A Docker Registry V2 proxy with a vulnerability scan gate
//!
//! This crate provides a proxy server that sits between container clients and
//! an upstream registry. Manifest pulls are scanned and blocked when the image
//! carries HIGH or CRITICAL vulnerabilities; all other traffic is forwarded.

pub mod config;
pub mod error;
pub mod gate;
pub mod models;
pub mod proxy;
pub mod registry;
pub mod scanner;
pub mod server;
pub mod telemetry;
