// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::config::consts::{
    DEFAULT_ASK_PARALLELISM, DEFAULT_ASK_TIMEOUT_MS, DEFAULT_BUFFER_SIZE, DEFAULT_FAIRNESS_BUDGET,
    DEFAULT_INJECTION_CAPACITY, DEFAULT_SHUTDOWN_TIMEOUT_MS, MAX_BUFFER_SIZE,
};
use crate::errors::ConfigError;
use crate::stages::OverflowPolicy;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Main configuration structure for the streaming engine.
///
/// Every section is optional; omitted values fall back to the constants in
/// [`crate::config::consts`]. Loaded from YAML, or from TOML when the file
/// extension is `.toml`.
///
/// # Example
/// ```yaml
/// scheduler:
///   worker_threads: 4
///   fairness_budget: 64
/// materializer:
///   buffer_size: 16
/// injection:
///   capacity: 32
///   overflow: drop_newest
/// ask:
///   timeout_ms: 5000
///   parallelism: 2
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub materializer: MaterializerConfig,
    #[serde(default)]
    pub injection: InjectionConfig,
    #[serde(default)]
    pub ask: AskConfig,
}

/// Worker pool options.
///
/// # Fields
/// * `worker_threads` - Threads of the owned runtime (defaults to available parallelism)
/// * `fairness_budget` - Elements a stage handles before yielding to other stages
/// * `shutdown_timeout_ms` - How long shutdown waits for worker threads
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SchedulerConfig {
    pub worker_threads: Option<usize>,
    pub fairness_budget: Option<u32>,
    pub shutdown_timeout_ms: Option<u64>,
}

impl SchedulerConfig {
    pub fn get_worker_threads(&self) -> usize {
        self.worker_threads.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        })
    }

    pub fn get_fairness_budget(&self) -> u32 {
        self.fairness_budget.unwrap_or(DEFAULT_FAIRNESS_BUDGET)
    }

    pub fn get_shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms.unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT_MS))
    }
}

/// Materializer defaults applied to stages that do not set their own attributes.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MaterializerConfig {
    pub buffer_size: Option<usize>,
}

impl MaterializerConfig {
    pub fn get_buffer_size(&self) -> usize {
        self.buffer_size.unwrap_or(DEFAULT_BUFFER_SIZE)
    }
}

/// Defaults for external-injection sources built with `Source::queue_from`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InjectionConfig {
    pub capacity: Option<usize>,
    #[serde(default)]
    pub overflow: OverflowPolicy,
}

impl InjectionConfig {
    pub fn get_capacity(&self) -> usize {
        self.capacity.unwrap_or(DEFAULT_INJECTION_CAPACITY)
    }
}

/// Defaults for ask stages built from `AskSettings::from(&AskConfig)`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AskConfig {
    pub timeout_ms: Option<u64>,
    pub parallelism: Option<usize>,
}

impl AskConfig {
    pub fn get_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.unwrap_or(DEFAULT_ASK_TIMEOUT_MS))
    }

    pub fn get_parallelism(&self) -> usize {
        self.parallelism.unwrap_or(DEFAULT_ASK_PARALLELISM)
    }
}

impl EngineConfig {
    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let buffer_size = self.materializer.get_buffer_size();
        if buffer_size == 0 || buffer_size > MAX_BUFFER_SIZE {
            return Err(ConfigError::InvalidValue {
                field: "materializer.buffer_size",
                reason: format!("must be within 1..={}, got {}", MAX_BUFFER_SIZE, buffer_size),
            });
        }
        if self.injection.get_capacity() == 0 {
            return Err(ConfigError::InvalidValue {
                field: "injection.capacity",
                reason: "must be at least 1".into(),
            });
        }
        if self.ask.get_parallelism() == 0 {
            return Err(ConfigError::InvalidValue {
                field: "ask.parallelism",
                reason: "must be at least 1".into(),
            });
        }
        if self.scheduler.get_worker_threads() == 0 {
            return Err(ConfigError::InvalidValue {
                field: "scheduler.worker_threads",
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }
}

/// Load a config from a YAML or TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<EngineConfig, ConfigError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let is_toml = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);
    let cfg = if is_toml {
        toml::from_str(&content)?
    } else {
        serde_yaml::from_str(&content)?
    };
    Ok(cfg)
}

/// Load and validate a config file
pub fn load_and_validate_config<P: AsRef<Path>>(path: P) -> Result<EngineConfig, ConfigError> {
    let cfg = load_config(path)?;
    cfg.validate()?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parse_full_yaml_config() {
        let yaml = r#"
scheduler:
  worker_threads: 2
  fairness_budget: 8
materializer:
  buffer_size: 4
injection:
  capacity: 10
  overflow: drop_oldest
ask:
  timeout_ms: 250
  parallelism: 3
"#;
        let cfg: EngineConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.scheduler.get_worker_threads(), 2);
        assert_eq!(cfg.scheduler.get_fairness_budget(), 8);
        assert_eq!(cfg.materializer.get_buffer_size(), 4);
        assert_eq!(cfg.injection.get_capacity(), 10);
        assert_eq!(cfg.injection.overflow, OverflowPolicy::DropOldest);
        assert_eq!(cfg.ask.get_timeout(), Duration::from_millis(250));
        assert_eq!(cfg.ask.get_parallelism(), 3);
    }

    #[test]
    fn empty_config_uses_defaults() {
        let cfg: EngineConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(cfg.materializer.get_buffer_size(), DEFAULT_BUFFER_SIZE);
        assert_eq!(cfg.injection.get_capacity(), DEFAULT_INJECTION_CAPACITY);
        assert_eq!(cfg.injection.overflow, OverflowPolicy::DropNewest);
        assert_eq!(cfg.ask.get_parallelism(), DEFAULT_ASK_PARALLELISM);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn zero_buffer_size_is_rejected() {
        let cfg: EngineConfig = serde_yaml::from_str("materializer:\n  buffer_size: 0\n").unwrap();
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("materializer.buffer_size"));
    }

    #[test]
    fn loads_toml_by_extension() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[materializer]\nbuffer_size = 2\n\n[injection]\ncapacity = 5\noverflow = \"fail\""
        )
        .unwrap();

        let cfg = load_and_validate_config(file.path()).unwrap();
        assert_eq!(cfg.materializer.get_buffer_size(), 2);
        assert_eq!(cfg.injection.overflow, OverflowPolicy::Fail);
    }

    #[test]
    fn loads_yaml_and_reports_invalid_values() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "ask:\n  parallelism: 0").unwrap();

        let err = load_and_validate_config(file.path()).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                field: "ask.parallelism",
                ..
            }
        ));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = load_config("/definitely/not/here.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
