//! Vulnerability scanner backends

pub mod traits;
pub mod trivy;

pub use traits::ImageScanner;
pub use trivy::{TrivyConfig, TrivyScanner};

#[cfg(test)]
pub use traits::MockImageScanner;
