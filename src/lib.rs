//! pkgserve: reports the newest published package version and serves the
//! matching package file for download.
//!
//! The manifest (`version.json` in the package store) is re-read on every
//! request; nothing is cached between requests.

pub mod config;
pub mod error;
pub mod logging;
pub mod manifest;
pub mod service;
pub mod version;

pub use config::ServerConfig;
pub use error::ServeError;
pub use logging::ServerLog;
pub use manifest::{Manifest, ManifestStore, VersionEntry};
pub use version::VersionTuple;
