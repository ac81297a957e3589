// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Execution engine: credit edges, stage contexts, scheduling, materialization,
//! supervision and kill switches.

mod context;
mod edge;
pub(crate) mod kill_switch;
mod materializer;
mod scheduler;
pub mod supervision;

#[cfg(test)]
mod integration_tests;

pub use context::{Pulled, StageContext};
pub use edge::{DemandSignal, EdgeSnapshot};
pub use kill_switch::{KillSwitches, SharedKillSwitch, UniqueKillSwitch};
pub use materializer::{MaterializedGraph, MaterializedValues, Materializer, MaterializerSettings};
pub use scheduler::{GraphSnapshot, Scheduler, StageSnapshot, StageState};
pub use supervision::{Decider, SupervisionDecision, Supervisor};
