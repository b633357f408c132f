//! Render pool configuration.
//!
//! Layered with figment: built-in defaults, then an optional TOML file, then
//! `PRERENDER_*` environment variables. Command-line overrides are applied on
//! top by the binary.

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Environment variable prefix for configuration overrides.
pub const ENV_PREFIX: &str = "PRERENDER_";

const BYTES_PER_MB: usize = 1024 * 1024;

/// Configuration consumed by the render core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderConfig {
    /// Rendering bundle on disk
    #[serde(default = "default_bundle_path")]
    pub bundle_path: PathBuf,

    /// Number of prewarmed workers (fixed pool only)
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    /// Build a fresh worker per request instead of pooling
    #[serde(default)]
    pub debug: bool,

    /// Watchdog deadline per render
    #[serde(default = "default_render_timeout_ms")]
    pub render_timeout_ms: u64,

    /// Optional heap cap per interpreter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_limit_mb: Option<usize>,
}

fn default_bundle_path() -> PathBuf {
    PathBuf::from("static/build/bundle.js")
}

/// Available parallelism plus one.
pub fn default_pool_size() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        + 1
}

fn default_render_timeout_ms() -> u64 {
    2000
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            bundle_path: default_bundle_path(),
            pool_size: default_pool_size(),
            debug: false,
            render_timeout_ms: default_render_timeout_ms(),
            memory_limit_mb: None,
        }
    }
}

impl RenderConfig {
    /// Load defaults, then `file` if given, then the environment.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(RenderConfig::default()));
        if let Some(file) = file {
            figment = figment.merge(Toml::file(file));
        }
        Self::extract(figment.merge(Env::prefixed(ENV_PREFIX)))
    }

    fn extract(figment: Figment) -> Result<Self> {
        let config: RenderConfig = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the pool cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.pool_size == 0 {
            return Err(Error::Config("pool_size must be at least 1".to_string()));
        }
        if self.render_timeout_ms == 0 {
            return Err(Error::Config("render_timeout_ms must be positive".to_string()));
        }
        if let Some(mb) = self.memory_limit_mb {
            if mb == 0 {
                return Err(Error::Config("memory_limit_mb must be positive".to_string()));
            }
            if mb.checked_mul(BYTES_PER_MB).is_none() {
                return Err(Error::Config(format!(
                    "memory_limit_mb {mb} does not fit in the address space"
                )));
            }
        }
        Ok(())
    }

    pub fn render_timeout(&self) -> Duration {
        Duration::from_millis(self.render_timeout_ms)
    }

    /// `None` when unset or when the value overflows; `validate` rejects the latter.
    pub fn memory_limit_bytes(&self) -> Option<usize> {
        self.memory_limit_mb.and_then(|mb| mb.checked_mul(BYTES_PER_MB))
    }
}
