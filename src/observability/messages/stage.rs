// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for stage context lifecycle events.

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use tracing::Span;

/// Stage context started.
///
/// # Log Level
/// `debug!` - One per stage per materialization
pub struct StageStarted<'a> {
    pub graph_id: u64,
    pub stage: &'a str,
    pub kind: &'a str,
}

impl Display for StageStarted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Stage '{}' ({}) started in graph {}",
            self.stage, self.kind, self.graph_id
        )
    }
}

impl StructuredLog for StageStarted<'_> {
    fn log(&self) {
        tracing::debug!(
            graph_id = self.graph_id,
            stage = self.stage,
            kind = self.kind,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "stage",
            span_name = name,
            graph_id = self.graph_id,
            stage = self.stage,
            kind = self.kind,
        )
    }
}

/// Stage reached a terminal state.
///
/// # Log Level
/// `debug!` for completion and cancellation, `warn!` for failure
///
/// # Example
/// ```
/// use the_streamwood::observability::messages::stage::StageTerminated;
///
/// let msg = StageTerminated {
///     graph_id: 1,
///     stage: "map",
///     outcome: "completed",
///     elements: 42,
/// };
///
/// tracing::debug!("{}", msg);
/// ```
pub struct StageTerminated<'a> {
    pub graph_id: u64,
    pub stage: &'a str,
    pub outcome: &'a str,
    pub elements: u64,
}

impl Display for StageTerminated<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Stage '{}' in graph {} {} after {} elements",
            self.stage, self.graph_id, self.outcome, self.elements
        )
    }
}

impl StructuredLog for StageTerminated<'_> {
    fn log(&self) {
        if self.outcome.starts_with("failed") {
            tracing::warn!(
                graph_id = self.graph_id,
                stage = self.stage,
                outcome = self.outcome,
                elements = self.elements,
                "{}", self
            );
        } else {
            tracing::debug!(
                graph_id = self.graph_id,
                stage = self.stage,
                outcome = self.outcome,
                elements = self.elements,
                "{}", self
            );
        }
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "stage_terminated",
            span_name = name,
            graph_id = self.graph_id,
            stage = self.stage,
            outcome = self.outcome,
        )
    }
}

/// An ask request did not complete in time.
///
/// # Log Level
/// `warn!` - Routed to the supervisor next
pub struct AskTimedOut<'a> {
    pub stage: &'a str,
    pub timeout: std::time::Duration,
}

impl Display for AskTimedOut<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Stage '{}' ask request timed out after {:?}",
            self.stage, self.timeout
        )
    }
}

impl StructuredLog for AskTimedOut<'_> {
    fn log(&self) {
        tracing::warn!(
            stage = self.stage,
            timeout_ms = self.timeout.as_millis() as u64,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!("ask_timeout", span_name = name, stage = self.stage)
    }
}
