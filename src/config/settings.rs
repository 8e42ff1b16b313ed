use super::ConfigError;
use crate::plan::PlanConfig;
use crate::recovery::RetentionPolicy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    #[default]
    Memory,
    File,
    Sqlite,
}

impl StoreBackend {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::File => "file",
            Self::Sqlite => "sqlite",
        }
    }
}

impl std::fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    /// Directory for `file`, database file for `sqlite`; unused for `memory`.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

fn default_checkpoint_every_batches() -> u32 {
    1
}

fn default_max_steps() -> usize {
    PlanConfig::default().max_steps
}

fn default_timeout_ms() -> u64 {
    PlanConfig::default().timeout_ms
}

fn default_retry_attempts() -> u32 {
    PlanConfig::default().retry_attempts
}

fn default_retry_delay_ms() -> u64 {
    PlanConfig::default().retry_delay_ms
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlanDefaults {
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for PlanDefaults {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            timeout_ms: default_timeout_ms(),
            retry_attempts: default_retry_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl PlanDefaults {
    pub fn to_plan_config(&self) -> PlanConfig {
        PlanConfig {
            max_steps: self.max_steps,
            timeout_ms: self.timeout_ms,
            retry_attempts: self.retry_attempts,
            retry_delay_ms: self.retry_delay_ms,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EngineSettings {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub retention: RetentionPolicy,
    #[serde(default = "default_checkpoint_every_batches")]
    pub checkpoint_every_batches: u32,
    #[serde(default)]
    pub event_log: Option<PathBuf>,
    #[serde(default)]
    pub plan_defaults: PlanDefaults,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            retention: RetentionPolicy::default(),
            checkpoint_every_batches: default_checkpoint_every_batches(),
            event_log: None,
            plan_defaults: PlanDefaults::default(),
        }
    }
}

impl EngineSettings {
    pub fn from_yaml_str(raw: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(raw)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.store.backend {
            StoreBackend::Memory => {}
            StoreBackend::File | StoreBackend::Sqlite => match self.store.path.as_ref() {
                None => {
                    return Err(ConfigError::Settings(format!(
                        "`store.path` is required for the `{}` backend",
                        self.store.backend
                    )));
                }
                Some(path) if !path.is_absolute() => {
                    return Err(ConfigError::Settings(
                        "`store.path` must be an absolute path".to_string(),
                    ));
                }
                Some(_) => {}
            },
        }
        if self.retention.keep == Some(0) {
            return Err(ConfigError::Settings(
                "`retention.keep` must be >= 1".to_string(),
            ));
        }
        if self.retention.max_age_ms == Some(0) {
            return Err(ConfigError::Settings(
                "`retention.max_age_ms` must be >= 1".to_string(),
            ));
        }
        if self.checkpoint_every_batches == 0 {
            return Err(ConfigError::Settings(
                "`checkpoint_every_batches` must be >= 1".to_string(),
            ));
        }
        if self
            .event_log
            .as_ref()
            .is_some_and(|path| !path.is_absolute())
        {
            return Err(ConfigError::Settings(
                "`event_log` must be an absolute path".to_string(),
            ));
        }
        if self.plan_defaults.max_steps == 0 {
            return Err(ConfigError::Settings(
                "`plan_defaults.max_steps` must be >= 1".to_string(),
            ));
        }
        Ok(())
    }
}
