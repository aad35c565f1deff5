//! Configuration for the Arklet core
//!
//! Loaded from TOML or JSON, every field defaulted, then adjusted by
//! `ARKLET_*` environment variables.

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::module::registry::{DEFAULT_RETIRED_CAPACITY, DEFAULT_RETIRED_TTL_SECS};
use crate::module::traits::{ArtifactRef, ModuleKey};
use crate::utils::env::{env_bool_opt, env_int, env_opt};

/// Lock wait override (milliseconds)
pub const ENV_LOCK_TIMEOUT_MS: &str = "ARKLET_LOCK_TIMEOUT_MS";
/// Loader timeout override (milliseconds)
pub const ENV_LOADER_TIMEOUT_MS: &str = "ARKLET_LOADER_TIMEOUT_MS";
/// Embedded mode override
pub const ENV_EMBED_ENABLE: &str = "ARKLET_EMBED_ENABLE";
/// Log filter override (still below `RUST_LOG`)
pub const ENV_LOG_FILTER: &str = "ARKLET_LOG_FILTER";

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArkletConfig {
    #[serde(default)]
    pub dispatch: DispatchSettings,

    #[serde(default)]
    pub registry: RegistrySettings,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Modules installed during bootstrap, in declaration order
    #[serde(default)]
    pub modules: Vec<StaticModuleConfig>,

    /// Whether the core runs embedded in a host application
    #[serde(default = "default_true")]
    pub embedded: bool,
}

fn default_true() -> bool {
    true
}

impl Default for ArkletConfig {
    fn default() -> Self {
        Self {
            dispatch: DispatchSettings::default(),
            registry: RegistrySettings::default(),
            logging: LoggingConfig::default(),
            modules: Vec::new(),
            embedded: true,
        }
    }
}

/// Dispatch timeouts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchSettings {
    /// Bounded wait for a module-key lock before failing with `Busy`
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,

    /// Timeout passed to (and enforced around) loader calls
    #[serde(default = "default_loader_timeout_ms")]
    pub loader_timeout_ms: u64,
}

fn default_lock_timeout_ms() -> u64 {
    3_000
}

fn default_loader_timeout_ms() -> u64 {
    60_000
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            lock_timeout_ms: default_lock_timeout_ms(),
            loader_timeout_ms: default_loader_timeout_ms(),
        }
    }
}

impl DispatchSettings {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn loader_timeout(&self) -> Duration {
        Duration::from_millis(self.loader_timeout_ms)
    }
}

/// Audit retention for retired records
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrySettings {
    #[serde(default = "default_retired_capacity")]
    pub retired_capacity: usize,

    #[serde(default = "default_retired_ttl_secs")]
    pub retired_ttl_secs: u64,
}

fn default_retired_capacity() -> usize {
    DEFAULT_RETIRED_CAPACITY
}

fn default_retired_ttl_secs() -> u64 {
    DEFAULT_RETIRED_TTL_SECS
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            retired_capacity: default_retired_capacity(),
            retired_ttl_secs: default_retired_ttl_secs(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive, e.g. "info" or "arklet=debug"
    #[serde(default)]
    pub filter: Option<String>,

    /// Emit JSON lines (requires the `json-logging` feature)
    #[serde(default)]
    pub json_format: bool,
}

/// A module installed at bootstrap
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticModuleConfig {
    pub name: String,
    pub version: String,
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

impl StaticModuleConfig {
    pub fn artifact(&self) -> ArtifactRef {
        ArtifactRef {
            location: self.location.clone(),
            checksum: self.checksum.clone(),
        }
    }

    pub fn key(&self) -> ModuleKey {
        ModuleKey::new(self.name.clone(), self.version.clone())
    }
}

impl ArkletConfig {
    /// Load configuration from a TOML file
    pub fn from_toml_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: ArkletConfig = toml::from_str(&content)
            .with_context(|| format!("parsing TOML config {}", path.display()))?;
        Ok(config)
    }

    /// Load configuration from a JSON file
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: ArkletConfig = serde_json::from_str(&content)
            .with_context(|| format!("parsing JSON config {}", path.display()))?;
        Ok(config)
    }

    /// Load by file extension (`.json`, anything else is TOML)
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_file(path),
            _ => Self::from_toml_file(path),
        }
    }

    /// Save configuration to a JSON file
    pub fn to_json_file(&self, path: &Path) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("writing config {}", path.display()))?;
        Ok(())
    }

    /// Apply `ARKLET_*` environment overrides
    ///
    /// Unparseable values are ignored.
    pub fn apply_env_overrides(&mut self) {
        if let Some(ms) = env_int::<u64>(ENV_LOCK_TIMEOUT_MS) {
            debug!("{} override: {}ms", ENV_LOCK_TIMEOUT_MS, ms);
            self.dispatch.lock_timeout_ms = ms;
        }
        if let Some(ms) = env_int::<u64>(ENV_LOADER_TIMEOUT_MS) {
            debug!("{} override: {}ms", ENV_LOADER_TIMEOUT_MS, ms);
            self.dispatch.loader_timeout_ms = ms;
        }
        if let Some(embedded) = env_bool_opt(ENV_EMBED_ENABLE) {
            self.embedded = embedded;
        }
        if let Some(filter) = env_opt(ENV_LOG_FILTER) {
            self.logging.filter = Some(filter);
        }
    }

    /// Reject values the core cannot run with
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.dispatch.lock_timeout_ms == 0 {
            bail!("dispatch.lock_timeout_ms must be greater than zero");
        }
        if self.dispatch.loader_timeout_ms == 0 {
            bail!("dispatch.loader_timeout_ms must be greater than zero");
        }
        if self.registry.retired_capacity == 0 {
            bail!("registry.retired_capacity must be greater than zero");
        }

        let mut seen = std::collections::HashSet::new();
        for module in &self.modules {
            if !seen.insert((module.name.as_str(), module.version.as_str())) {
                bail!(
                    "static module {}@{} is declared more than once",
                    module.name,
                    module.version
                );
            }
        }
        Ok(())
    }
}
