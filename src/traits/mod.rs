// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod responder;
pub mod stage;

pub use responder::{FnResponder, Responder};
pub use stage::{DemandMode, MatValue, StageFactory, StageKind, StageLogic};
