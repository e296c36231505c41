use std::{
    env,
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result, bail};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    backend::{Backend, MemoryBackend, RestBackend, rest::DEFAULT_TIMEOUT_SECS},
    naming::DEFAULT_MAX_IDENTIFIER_LEN,
};

pub const ENV_URL: &str = "RESULTS_PORTAL_URL";
pub const ENV_API_KEY: &str = "RESULTS_PORTAL_API_KEY";
pub const ENV_STATE_DIR: &str = "RESULTS_PORTAL_STATE_DIR";

pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Local,
    Rest,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub kind: BackendKind,
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub state_dir: PathBuf,
    pub create_table_rpc: String,
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::Local,
            url: None,
            api_key: None,
            state_dir: PathBuf::from(".results-portal"),
            create_table_rpc: "create_table".to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub bucket: String,
    pub archive_prefix: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            bucket: "results".to_string(),
            archive_prefix: "uploads".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub table: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            table: "results_metadata".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    pub max_upload_bytes: u64,
    pub max_identifier_len: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            max_identifier_len: DEFAULT_MAX_IDENTIFIER_LEN,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub rollback_on_failure: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            rollback_on_failure: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalConfig {
    pub backend: BackendConfig,
    pub storage: StorageConfig,
    pub registry: RegistryConfig,
    pub limits: Limits,
    pub pipeline: PipelineConfig,
}

impl PortalConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening config file {path:?}"))?;
        let config = serde_yaml::from_reader(BufReader::new(file))
            .with_context(|| format!("Parsing config file {path:?}"))?;
        Ok(config)
    }

    /// File (if any), then environment, then the explicit state-dir flag.
    pub fn resolve(path: Option<&Path>, state_dir: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply_env(|name| env::var(name).ok());
        if let Some(dir) = state_dir {
            config.backend.kind = BackendKind::Local;
            config.backend.state_dir = dir.to_path_buf();
        }
        config.validate()?;
        debug!("Resolved configuration: {:?}", config.redacted());
        Ok(config)
    }

    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_URL).filter(|v| !v.trim().is_empty()) {
            self.backend.url = Some(url);
            self.backend.kind = BackendKind::Rest;
        }
        if let Some(key) = lookup(ENV_API_KEY).filter(|v| !v.trim().is_empty()) {
            self.backend.api_key = Some(key);
        }
        if let Some(dir) = lookup(ENV_STATE_DIR).filter(|v| !v.trim().is_empty()) {
            self.backend.state_dir = PathBuf::from(dir);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.backend.kind == BackendKind::Rest {
            if self.backend.url.as_deref().is_none_or(|u| u.trim().is_empty()) {
                bail!("Backend kind 'rest' requires a url (config backend.url or {ENV_URL})");
            }
            if self.backend.api_key.as_deref().is_none_or(|k| k.trim().is_empty()) {
                bail!("Backend kind 'rest' requires an api_key (config backend.api_key or {ENV_API_KEY})");
            }
        }
        if self.limits.max_identifier_len == 0 {
            bail!("limits.max_identifier_len must be positive");
        }
        if self.storage.bucket.trim().is_empty() {
            bail!("storage.bucket cannot be empty");
        }
        Ok(())
    }

    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.backend.api_key.is_some() {
            copy.backend.api_key = Some("***".to_string());
        }
        copy
    }

    pub fn connect(&self) -> Result<Box<dyn Backend>> {
        match self.backend.kind {
            BackendKind::Local => {
                let store = MemoryBackend::open(&self.backend.state_dir).with_context(|| {
                    format!("Opening local store at {:?}", self.backend.state_dir)
                })?;
                Ok(Box::new(store))
            }
            BackendKind::Rest => {
                self.validate()?;
                let url = self.backend.url.as_deref().unwrap_or_default();
                let key = self.backend.api_key.as_deref().unwrap_or_default();
                let backend = RestBackend::new(
                    url,
                    key,
                    &self.backend.create_table_rpc,
                    Duration::from_secs(self.backend.timeout_secs),
                )
                .context("Configuring REST backend")?;
                Ok(Box::new(backend))
            }
        }
    }
}
