//! Manifest store: the `version.json` file and the package directory around it.
//!
//! The manifest is maintained out of band and read fresh on every call, so an
//! edit on disk is visible to the next request without a restart.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ManifestFault, ServeError};
use crate::version::{self, VersionTuple};

/// One downloadable package version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionEntry {
    pub version: String,
    /// File path relative to the package store root.
    pub path: String,
}

/// On-disk JSON description of every published version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub versions: Vec<VersionEntry>,
}

impl Manifest {
    /// Exact string match on the `version` field; the first match wins.
    pub fn find(&self, version: &str) -> Option<&VersionEntry> {
        self.versions.iter().find(|entry| entry.version == version)
    }

    pub fn latest(&self) -> Result<(VersionTuple, &VersionEntry), ServeError> {
        version::latest(&self.versions)
    }
}

/// Location of the package store and its manifest.
#[derive(Debug, Clone)]
pub struct ManifestStore {
    store_dir: PathBuf,
    manifest_path: PathBuf,
}

/// Outcome of [`ManifestStore::verify`].
#[derive(Debug, Default)]
pub struct VerifyReport {
    pub entries: usize,
    pub latest: Option<String>,
    pub problems: Vec<String>,
}

impl VerifyReport {
    pub fn is_clean(&self) -> bool {
        self.problems.is_empty()
    }
}

impl ManifestStore {
    pub fn new(store_dir: impl Into<PathBuf>, manifest_file: impl AsRef<Path>) -> Self {
        let store_dir = store_dir.into();
        let manifest_path = store_dir.join(manifest_file);
        Self {
            store_dir,
            manifest_path,
        }
    }

    pub fn store_dir(&self) -> &Path {
        &self.store_dir
    }

    pub fn manifest_path(&self) -> &Path {
        &self.manifest_path
    }

    /// Read and parse the manifest from disk.
    pub async fn load(&self) -> Result<Manifest, ServeError> {
        let raw = tokio::fs::read(&self.manifest_path)
            .await
            .map_err(|e| self.unavailable(e.into()))?;
        serde_json::from_slice(&raw).map_err(|e| self.unavailable(e.into()))
    }

    fn unavailable(&self, source: ManifestFault) -> ServeError {
        ServeError::ManifestUnavailable {
            path: self.manifest_path.clone(),
            source,
        }
    }

    /// Resolve an entry to a regular file inside the store root.
    ///
    /// Both the root and the candidate are canonicalized, so `..` segments and
    /// symlinks pointing outside the store are rejected.
    pub async fn resolve(&self, entry: &VersionEntry) -> Result<PathBuf, ServeError> {
        let file_unavailable = |path: PathBuf, source: std::io::Error| ServeError::FileUnavailable {
            version: entry.version.clone(),
            path,
            source,
        };

        let root = tokio::fs::canonicalize(&self.store_dir)
            .await
            .map_err(|e| file_unavailable(self.store_dir.clone(), e))?;

        let candidate = self.store_dir.join(&entry.path);
        let resolved = tokio::fs::canonicalize(&candidate)
            .await
            .map_err(|e| file_unavailable(candidate.clone(), e))?;

        if !resolved.starts_with(&root) {
            return Err(ServeError::PathEscapesStore {
                version: entry.version.clone(),
                path: resolved,
                root,
            });
        }

        let metadata = tokio::fs::metadata(&resolved)
            .await
            .map_err(|e| file_unavailable(resolved.clone(), e))?;
        if !metadata.is_file() {
            return Err(file_unavailable(
                resolved,
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a regular file"),
            ));
        }

        Ok(resolved)
    }

    /// Check every manifest entry: versions parse, files resolve, no duplicates.
    pub async fn verify(&self) -> Result<VerifyReport, ServeError> {
        let manifest = self.load().await?;
        let mut report = VerifyReport {
            entries: manifest.versions.len(),
            ..VerifyReport::default()
        };

        match manifest.latest() {
            Ok((tuple, _)) => report.latest = Some(tuple.to_string()),
            // Reported against its entry below
            Err(ServeError::InvalidVersion { .. }) => {}
            Err(e) => report.problems.push(e.to_string()),
        }

        for (idx, entry) in manifest.versions.iter().enumerate() {
            if manifest.versions[..idx]
                .iter()
                .any(|earlier| earlier.version == entry.version)
            {
                report.problems.push(format!(
                    "version {:?} is listed more than once; only the first entry is downloadable",
                    entry.version
                ));
            }
            if let Err(e) = VersionTuple::parse(&entry.version) {
                report.problems.push(e.to_string());
            }
            if let Err(e) = self.resolve(entry).await {
                report.problems.push(e.diagnostic());
            }
        }

        Ok(report)
    }
}
