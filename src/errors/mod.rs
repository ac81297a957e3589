// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

mod config;
mod graph;
mod injection;
mod runtime;
mod stream;

pub use config::ConfigError;
pub use graph::{GraphBuildError, MaterializeError, PortDescriptor, PortDirection};
pub use injection::SendError;
pub use runtime::SchedulerError;
pub use stream::{StageFault, StageRuntimeError, TerminationError};
