use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::manifest::ManifestStore;

/// Port the update service has always listened on.
pub const DEFAULT_PORT: u16 = 38686;

fn default_bind() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT))
}

fn default_store_dir() -> PathBuf {
    PathBuf::from("./packages")
}

fn default_manifest_file() -> String {
    "version.json".to_string()
}

fn default_max_concurrent() -> usize {
    2000
}

/// Top‑level server configuration (TOML).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address (host:port)
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,
    /// Package store root; relative paths resolve against the working directory
    #[serde(default = "default_store_dir")]
    pub store_dir: PathBuf,
    /// Manifest file name inside the store
    #[serde(default = "default_manifest_file")]
    pub manifest_file: String,
    /// Log destination; stderr when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
    /// Requests beyond this many in flight are rejected with 429
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_requests: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            store_dir: default_store_dir(),
            manifest_file: default_manifest_file(),
            log_file: None,
            max_concurrent_requests: default_max_concurrent(),
        }
    }
}

/// Command-line values that take precedence over the config file.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub bind: Option<SocketAddr>,
    pub store_dir: Option<PathBuf>,
    pub log_file: Option<PathBuf>,
}

impl ServerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_requests == 0 {
            bail!("max_concurrent_requests must be at least 1");
        }
        if self.max_concurrent_requests > tokio::sync::Semaphore::MAX_PERMITS {
            bail!(
                "max_concurrent_requests must not exceed {}",
                tokio::sync::Semaphore::MAX_PERMITS
            );
        }
        if self.manifest_file.trim().is_empty() {
            bail!("manifest_file must not be empty");
        }
        Ok(())
    }

    pub fn apply(&mut self, overrides: Overrides) {
        if let Some(bind) = overrides.bind {
            self.bind = bind;
        }
        if let Some(store_dir) = overrides.store_dir {
            self.store_dir = store_dir;
        }
        if let Some(log_file) = overrides.log_file {
            self.log_file = Some(log_file);
        }
    }

    pub fn manifest_store(&self) -> ManifestStore {
        ManifestStore::new(&self.store_dir, &self.manifest_file)
    }

    /// Parse a config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let cfg_str = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let cfg: Self = toml::from_str(&cfg_str)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load `explicit` if given, otherwise the per-user default config,
    /// writing a default file there first when none exists.
    ///
    /// Runs before the logger exists, so the caller reports what happened.
    pub fn load(explicit: Option<&Path>) -> Result<LoadedConfig> {
        let cfg_path = match explicit {
            Some(path) => path.to_path_buf(),
            None => default_config_path()?,
        };

        let created = explicit.is_none() && !cfg_path.exists();
        if created {
            write_default(&cfg_path)?;
        }

        let config = Self::from_file(&cfg_path)?;
        Ok(LoadedConfig {
            config,
            path: cfg_path,
            created,
        })
    }
}

#[derive(Debug)]
pub struct LoadedConfig {
    pub config: ServerConfig,
    pub path: PathBuf,
    /// A default file was written because none existed
    pub created: bool,
}

/// `<user config dir>/pkgserve/pkgserve.toml`
pub fn default_config_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?
        .join("pkgserve");
    Ok(config_dir.join("pkgserve.toml"))
}

fn write_default(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("Failed to create config directory")?;
    }
    let default_toml = toml::to_string_pretty(&ServerConfig::default())
        .context("Failed to serialize default config")?;
    fs::write(path, default_toml).context("Failed to write config file")?;
    Ok(())
}
