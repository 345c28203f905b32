//! Docker Registry V2 API surface
//!
//! Path grammar and request classification for the registry routes the scan
//! gate cares about.

pub mod route;

pub use route::{classify, ImageRef, Route, RouteKind};
