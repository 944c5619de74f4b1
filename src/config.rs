use anyhow::{Context, Result};
use reconcile::BackoffPolicy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Get the config directory path
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".config").join("dbconverge"))
}

/// Default config file path (~/.config/dbconverge/config.toml)
pub fn default_config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

// ============================================================================
// Handler Config
// ============================================================================

/// Tunables shared by every handler invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandlerConfig {
    pub backoff: BackoffConfig,

    /// Consecutive positive observations required before an instance counts as stable
    pub probe_threshold: u32,

    /// Overrides `backoff.timeout_secs` while waiting for a delete to finish
    pub delete_timeout_secs: Option<u64>,

    pub soft_fail_tags: SoftFailTags,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    pub initial_delay_secs: u64,
    pub max_delay_secs: u64,
    pub factor: f64,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoftFailTags {
    /// Retry a create that was denied tagging with system tags only
    pub enabled: bool,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            backoff: BackoffConfig::default(),
            probe_threshold: 3,
            delete_timeout_secs: None,
            soft_fail_tags: SoftFailTags::default(),
        }
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        let policy = BackoffPolicy::default();
        Self {
            initial_delay_secs: policy.initial_delay.as_secs(),
            max_delay_secs: policy.max_delay.as_secs(),
            factor: policy.factor,
            timeout_secs: policy.timeout.as_secs(),
        }
    }
}

impl Default for SoftFailTags {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl BackoffConfig {
    pub fn to_policy(&self) -> BackoffPolicy {
        BackoffPolicy {
            initial_delay: Duration::from_secs(self.initial_delay_secs),
            max_delay: Duration::from_secs(self.max_delay_secs),
            factor: self.factor,
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

impl HandlerConfig {
    /// Load from `path`, or from the default location when `path` is `None`
    ///
    /// A missing file yields the defaults.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let path = match path {
            Some(p) => PathBuf::from(shellexpand::tilde(p).as_ref()),
            None => default_config_path()?,
        };
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("Config file {} does not exist, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        if config.probe_threshold == 0 {
            anyhow::bail!("probe_threshold must be at least 1 in {}", path.display());
        }

        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Backoff used by every stabilization except delete
    pub fn backoff_policy(&self) -> BackoffPolicy {
        self.backoff.to_policy()
    }

    /// Backoff used while waiting for the instance to disappear
    pub fn delete_policy(&self) -> BackoffPolicy {
        let mut policy = self.backoff.to_policy();
        if let Some(secs) = self.delete_timeout_secs {
            policy.timeout = Duration::from_secs(secs);
        }
        policy
    }
}
