// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for supervision decisions and recovery stages.

use crate::engine::supervision::SupervisionDecision;
use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use tracing::Span;

/// Decider consulted after a stage raised an error.
///
/// # Log Level
/// `warn!` for `Resume` and `Restart`, `error!` for `Stop`
///
/// # Example
/// ```
/// use the_streamwood::engine::SupervisionDecision;
/// use the_streamwood::observability::messages::supervision::SupervisionApplied;
///
/// let error = std::io::Error::new(std::io::ErrorKind::Other, "bad element");
/// let msg = SupervisionApplied {
///     stage: "parse",
///     decision: SupervisionDecision::Resume,
///     error: &error,
/// };
///
/// tracing::warn!("{}", msg);
/// ```
pub struct SupervisionApplied<'a> {
    pub stage: &'a str,
    pub decision: SupervisionDecision,
    pub error: &'a dyn std::error::Error,
}

impl Display for SupervisionApplied<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Stage '{}' failed ({}), decider chose {:?}",
            self.stage, self.error, self.decision
        )
    }
}

impl StructuredLog for SupervisionApplied<'_> {
    fn log(&self) {
        match self.decision {
            SupervisionDecision::Stop => tracing::error!(
                stage = self.stage,
                decision = ?self.decision,
                error = %self.error,
                "{}", self
            ),
            _ => tracing::warn!(
                stage = self.stage,
                decision = ?self.decision,
                error = %self.error,
                "{}", self
            ),
        }
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!(
            "supervision",
            span_name = name,
            stage = self.stage,
            decision = ?self.decision,
        )
    }
}

/// Recover stage turned an upstream failure into completion.
///
/// # Log Level
/// `info!` - Failure handled
pub struct RecoveredFromFailure<'a> {
    pub stage: &'a str,
    pub emitted_fallback: bool,
    pub error: &'a dyn std::error::Error,
}

impl Display for RecoveredFromFailure<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        let fallback = if self.emitted_fallback {
            "with fallback element"
        } else {
            "without fallback element"
        };
        write!(
            f,
            "Stage '{}' recovered from upstream failure ({}) {}",
            self.stage, self.error, fallback
        )
    }
}

impl StructuredLog for RecoveredFromFailure<'_> {
    fn log(&self) {
        tracing::info!(
            stage = self.stage,
            emitted_fallback = self.emitted_fallback,
            error = %self.error,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!("recover", span_name = name, stage = self.stage)
    }
}

/// Replacement upstream spliced in after a failure.
///
/// # Log Level
/// `warn!` - Retrying
pub struct UpstreamReplaced<'a> {
    pub stage: &'a str,
    pub attempt: usize,
    pub remaining: usize,
    pub error: &'a dyn std::error::Error,
}

impl Display for UpstreamReplaced<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Stage '{}' replaced failed upstream ({}): attempt {}, {} remaining",
            self.stage, self.error, self.attempt, self.remaining
        )
    }
}

impl StructuredLog for UpstreamReplaced<'_> {
    fn log(&self) {
        tracing::warn!(
            stage = self.stage,
            attempt = self.attempt,
            remaining = self.remaining,
            error = %self.error,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!(
            "recover_with_retries",
            span_name = name,
            stage = self.stage,
            attempt = self.attempt,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::StageRuntimeError;

    #[test]
    fn supervision_display_names_decision() {
        let error = StageRuntimeError::msg("boom");
        let msg = SupervisionApplied {
            stage: "map",
            decision: SupervisionDecision::Restart,
            error: &error,
        };
        assert_eq!(msg.to_string(), "Stage 'map' failed (boom), decider chose Restart");
    }
}
