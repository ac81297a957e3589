// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::config::EngineConfig;
use crate::engine::{Materializer, MaterializerSettings, Scheduler};
use crate::errors::{ConfigError, SchedulerError};
use thiserror::Error;

/// Errors raised while assembling a runtime from configuration.
#[derive(Debug, Error)]
pub enum RuntimeBuildError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

/// Streaming runtime builder - creates the scheduler and a materializer bound to it.
///
/// # Examples
///
/// ```
/// use the_streamwood::config::{EngineConfig, RuntimeBuilder};
///
/// let config = EngineConfig::default();
/// let (scheduler, materializer) = RuntimeBuilder::from_config(&config).unwrap();
/// assert_eq!(materializer.settings().buffer_size, 16);
/// scheduler.shutdown();
/// ```
pub struct RuntimeBuilder;

impl RuntimeBuilder {
    /// Start an owned worker pool and return it with a materializer using the
    /// configured defaults.
    pub fn from_config(cfg: &EngineConfig) -> Result<(Scheduler, Materializer), RuntimeBuildError> {
        cfg.validate()?;
        let scheduler = Scheduler::start(&cfg.scheduler)?;
        let materializer = Materializer::new(scheduler.clone(), MaterializerSettings::from(cfg));
        Ok((scheduler, materializer))
    }

    /// Like [`RuntimeBuilder::from_config`] but schedules onto the tokio runtime
    /// the caller is already running in.
    pub fn on_current(cfg: &EngineConfig) -> Result<(Scheduler, Materializer), RuntimeBuildError> {
        cfg.validate()?;
        let scheduler = Scheduler::from_current(&cfg.scheduler)?;
        let materializer = Materializer::new(scheduler.clone(), MaterializerSettings::from(cfg));
        Ok((scheduler, materializer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn on_current_uses_configured_buffer() {
        let cfg: EngineConfig = serde_yaml::from_str("materializer:\n  buffer_size: 3\n").unwrap();
        let (_scheduler, materializer) = RuntimeBuilder::on_current(&cfg).unwrap();
        assert_eq!(materializer.settings().buffer_size, 3);
    }

    #[test]
    fn invalid_config_is_rejected_before_starting() {
        let cfg: EngineConfig = serde_yaml::from_str("materializer:\n  buffer_size: 0\n").unwrap();
        assert!(matches!(
            RuntimeBuilder::from_config(&cfg),
            Err(RuntimeBuildError::Config(_))
        ));
    }

    #[test]
    fn on_current_outside_runtime_fails() {
        let cfg = EngineConfig::default();
        assert!(matches!(
            RuntimeBuilder::on_current(&cfg),
            Err(RuntimeBuildError::Scheduler(SchedulerError::NoCurrentRuntime))
        ));
    }
}
