//! Error taxonomy for manifest access and package resolution.
//!
//! Every variant carries enough detail for the server log. None of it is
//! ever written to a response body: [`ServeError::status`] and
//! [`ServeError::public_message`] are the only things a client sees.

use std::path::PathBuf;

use axum::http::StatusCode;

/// Body sent for every failure that is not a "not found" case.
pub const INTERNAL_ERROR_BODY: &str = "Internal server error";

#[derive(Debug, thiserror::Error)]
pub enum ServeError {
    /// Manifest file missing, unreadable, not JSON, or missing `versions`.
    #[error("manifest {} unavailable", path.display())]
    ManifestUnavailable {
        path: PathBuf,
        #[source]
        source: ManifestFault,
    },

    /// No manifest entry matches the requested download version.
    #[error("version {version:?} is not listed in the manifest")]
    VersionNotFound { version: String },

    /// Manifest entry points at a file that cannot be served.
    #[error("package file {} for version {version:?} unavailable", path.display())]
    FileUnavailable {
        version: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The manifest lists no versions at all.
    #[error("manifest lists no versions")]
    EmptyManifest,

    /// A manifest version string is not dot-separated non-negative integers.
    #[error("invalid version string {version:?}")]
    InvalidVersion { version: String },

    /// Manifest entry path resolves outside the package store.
    #[error("package path {} for version {version:?} escapes the store root {}", path.display(), root.display())]
    PathEscapesStore {
        version: String,
        path: PathBuf,
        root: PathBuf,
    },
}

/// Underlying cause of a [`ServeError::ManifestUnavailable`].
#[derive(Debug, thiserror::Error)]
pub enum ManifestFault {
    #[error("read failed")]
    Io(#[from] std::io::Error),
    #[error("parse failed")]
    Json(#[from] serde_json::Error),
}

impl ServeError {
    /// HTTP status this error maps to at the endpoint boundary.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::VersionNotFound { .. } | Self::EmptyManifest => StatusCode::NOT_FOUND,
            Self::ManifestUnavailable { .. }
            | Self::FileUnavailable { .. }
            | Self::InvalidVersion { .. }
            | Self::PathEscapesStore { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Opaque response body; never includes paths or error causes.
    pub fn public_message(&self) -> &'static str {
        match self {
            Self::VersionNotFound { .. } => "Version not found",
            Self::EmptyManifest => "No versions found",
            _ => INTERNAL_ERROR_BODY,
        }
    }

    /// Full diagnostic text including the `source()` chain, for the server log.
    pub fn diagnostic(&self) -> String {
        let mut text = self.to_string();
        let mut cause = std::error::Error::source(self);
        while let Some(err) = cause {
            text.push_str(": ");
            text.push_str(&err.to_string());
            cause = err.source();
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unavailable() -> ServeError {
        ServeError::ManifestUnavailable {
            path: PathBuf::from("/srv/packages/version.json"),
            source: ManifestFault::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no such file",
            )),
        }
    }

    #[test]
    fn not_found_kinds_map_to_404() {
        let err = ServeError::VersionNotFound {
            version: "9.9.9".into(),
        };
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.public_message(), "Version not found");
        assert_eq!(ServeError::EmptyManifest.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn internal_kinds_hide_details() {
        let err = unavailable();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.public_message(), INTERNAL_ERROR_BODY);

        let escape = ServeError::PathEscapesStore {
            version: "1.0.0".into(),
            path: PathBuf::from("/etc/passwd"),
            root: PathBuf::from("/srv/packages"),
        };
        assert_eq!(escape.public_message(), INTERNAL_ERROR_BODY);
    }

    #[test]
    fn diagnostic_includes_source_chain() {
        let text = unavailable().diagnostic();
        assert!(text.contains("/srv/packages/version.json"));
        assert!(text.contains("no such file"));
    }
}
