// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Per-stage failure policy.
//!
//! When a stage raises a [`StageRuntimeError`] while processing an element, the
//! stage asks its [`Supervisor`] what to do before anything is torn down. The
//! supervisor consults the stage's [`Decider`] (from its attributes, default
//! `Stop`) and records the outcome. Recovery is strictly local: a decider only
//! ever sees errors raised by its own stage.

use std::fmt;
use std::sync::Arc;

use crate::errors::StageRuntimeError;
use crate::observability::messages::supervision::SupervisionApplied;
use crate::observability::messages::StructuredLog;

/// Outcome of consulting a decider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SupervisionDecision {
    /// Drop the failing element, keep stage-local state.
    Resume,
    /// Drop the failing element and rebuild stage-local state.
    Restart,
    /// Fail downstream, cancel upstream.
    #[default]
    Stop,
}

/// Function from a stage error to a [`SupervisionDecision`].
#[derive(Clone)]
pub struct Decider(Arc<dyn Fn(&StageRuntimeError) -> SupervisionDecision + Send + Sync>);

impl Decider {
    pub fn new<F>(decide: F) -> Self
    where
        F: Fn(&StageRuntimeError) -> SupervisionDecision + Send + Sync + 'static,
    {
        Self(Arc::new(decide))
    }

    pub fn stopping() -> Self {
        Self::new(|_| SupervisionDecision::Stop)
    }

    pub fn resuming() -> Self {
        Self::new(|_| SupervisionDecision::Resume)
    }

    pub fn restarting() -> Self {
        Self::new(|_| SupervisionDecision::Restart)
    }

    pub fn decide(&self, error: &StageRuntimeError) -> SupervisionDecision {
        (self.0)(error)
    }
}

impl Default for Decider {
    fn default() -> Self {
        Self::stopping()
    }
}

impl fmt::Debug for Decider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Decider(..)")
    }
}

/// Applies one stage's decider and counts what it decided.
#[derive(Debug)]
pub struct Supervisor {
    stage: String,
    decider: Decider,
    resumed: u64,
    restarted: u64,
}

impl Supervisor {
    pub fn new(stage: impl Into<String>, decider: Decider) -> Self {
        Self {
            stage: stage.into(),
            decider,
            resumed: 0,
            restarted: 0,
        }
    }

    /// Consult the decider for `error` and log the decision.
    pub fn on_failure(&mut self, error: &StageRuntimeError) -> SupervisionDecision {
        let decision = self.decider.decide(error);
        match decision {
            SupervisionDecision::Resume => self.resumed += 1,
            SupervisionDecision::Restart => self.restarted += 1,
            SupervisionDecision::Stop => {}
        }
        SupervisionApplied {
            stage: &self.stage,
            decision,
            error,
        }
        .log();
        decision
    }

    pub fn resumed(&self) -> u64 {
        self.resumed
    }

    pub fn restarted(&self) -> u64 {
        self.restarted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::StageFault;

    #[derive(Debug, thiserror::Error)]
    #[error("bad input")]
    struct BadInput;

    #[test]
    fn default_decision_is_stop() {
        assert_eq!(SupervisionDecision::default(), SupervisionDecision::Stop);
        let decider = Decider::default();
        assert_eq!(
            decider.decide(&StageRuntimeError::msg("x")),
            SupervisionDecision::Stop
        );
    }

    #[test]
    fn decider_can_match_specific_error_types() {
        let decider = Decider::new(|err| {
            if err.is::<BadInput>() {
                SupervisionDecision::Resume
            } else {
                SupervisionDecision::Stop
            }
        });
        assert_eq!(
            decider.decide(&StageRuntimeError::new(BadInput)),
            SupervisionDecision::Resume
        );
        assert_eq!(
            decider.decide(&StageFault::AbruptTermination.into()),
            SupervisionDecision::Stop
        );
    }

    #[test]
    fn supervisor_counts_decisions() {
        let mut supervisor = Supervisor::new("parse", Decider::restarting());
        supervisor.on_failure(&StageRuntimeError::new(BadInput));
        supervisor.on_failure(&StageRuntimeError::new(BadInput));
        assert_eq!(supervisor.restarted(), 2);
        assert_eq!(supervisor.resumed(), 0);
    }
}
