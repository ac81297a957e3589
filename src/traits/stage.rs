// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::any::Any;

use async_trait::async_trait;
use serde::Serialize;

use crate::engine::StageContext;
use crate::errors::TerminationError;

/// Value a stage hands back to the caller of `materialize`.
pub type MatValue = Box<dyn Any + Send>;

/// Coarse classification of a stage by its port counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Source,
    Sink,
    Transform,
    Junction,
}

impl StageKind {
    pub fn from_shape(inlets: usize, outlets: usize) -> Self {
        match (inlets, outlets) {
            (0, _) => StageKind::Source,
            (_, 0) => StageKind::Sink,
            (1, 1) => StageKind::Transform,
            _ => StageKind::Junction,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::Source => "source",
            StageKind::Sink => "sink",
            StageKind::Transform => "transform",
            StageKind::Junction => "junction",
        }
    }
}

/// How a stage's inlets receive credit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DemandMode {
    /// Fill every inlet at start and re-grant one unit per element taken.
    #[default]
    Prefetch,
    /// Grant credit only through [`StageContext::request`].
    OnRequest,
}

/// Running state machine of one stage instance.
///
/// `run` drives the stage until it reaches a terminal state, talking to its
/// neighbours only through the context's pull/push/complete/fail/cancel
/// operations. Returning `Ok(())` completes every outlet still open and
/// cancels every inlet still open; returning an error fails the open outlets
/// with it.
#[async_trait]
pub trait StageLogic: Send {
    async fn run(&mut self, ctx: &mut StageContext) -> Result<(), TerminationError>;

    fn demand_mode(&self) -> DemandMode {
        DemandMode::Prefetch
    }
}

/// Creates fresh stage instances; called once per materialization.
pub trait StageFactory: Send + Sync {
    fn create(&self) -> (Box<dyn StageLogic>, Option<MatValue>);
}

impl<F> StageFactory for F
where
    F: Fn() -> (Box<dyn StageLogic>, Option<MatValue>) + Send + Sync,
{
    fn create(&self) -> (Box<dyn StageLogic>, Option<MatValue>) {
        self()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_follows_shape() {
        assert_eq!(StageKind::from_shape(0, 1), StageKind::Source);
        assert_eq!(StageKind::from_shape(1, 0), StageKind::Sink);
        assert_eq!(StageKind::from_shape(1, 1), StageKind::Transform);
        assert_eq!(StageKind::from_shape(2, 1), StageKind::Junction);
        assert_eq!(StageKind::from_shape(1, 3), StageKind::Junction);
    }
}
