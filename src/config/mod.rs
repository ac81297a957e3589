// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

mod attributes;
mod loader;
mod runtime;

pub mod consts;

pub use attributes::Attributes;
pub use loader::{
    load_and_validate_config, load_config, AskConfig, EngineConfig, InjectionConfig,
    MaterializerConfig, SchedulerConfig,
};
pub use runtime::{RuntimeBuildError, RuntimeBuilder};
