// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for scheduler and materializer lifecycle events.
//!
//! This module contains message types for logging events related to:
//! * Worker pool start and shutdown
//! * Graph materialization and rejection
//! * Materialized graph termination

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use tracing::Span;

/// Scheduler started and ready to accept graphs.
///
/// # Log Level
/// `info!` - Important operational event
///
/// # Example
/// ```
/// use the_streamwood::observability::messages::engine::SchedulerStarted;
///
/// let msg = SchedulerStarted {
///     worker_threads: 4,
///     owned_runtime: true,
/// };
///
/// tracing::info!("{}", msg);
/// ```
pub struct SchedulerStarted {
    pub worker_threads: usize,
    pub owned_runtime: bool,
}

impl Display for SchedulerStarted {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        let runtime = if self.owned_runtime { "owned" } else { "borrowed" };
        write!(
            f,
            "Scheduler started on {} runtime with {} worker threads",
            runtime, self.worker_threads
        )
    }
}

impl StructuredLog for SchedulerStarted {
    fn log(&self) {
        tracing::info!(
            worker_threads = self.worker_threads,
            owned_runtime = self.owned_runtime,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "scheduler",
            span_name = name,
            worker_threads = self.worker_threads,
            owned_runtime = self.owned_runtime,
        )
    }
}

/// Scheduler shutting down, cancelling every live graph.
///
/// # Log Level
/// `info!` - Important operational event
pub struct SchedulerShutdown {
    pub active_graphs: usize,
}

impl Display for SchedulerShutdown {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Scheduler shutting down, cancelling {} active graphs",
            self.active_graphs
        )
    }
}

impl StructuredLog for SchedulerShutdown {
    fn log(&self) {
        tracing::info!(active_graphs = self.active_graphs, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "scheduler_shutdown",
            span_name = name,
            active_graphs = self.active_graphs,
        )
    }
}

/// Graph materialized; every stage context has been spawned.
///
/// # Log Level
/// `info!` - Important operational event
///
/// # Example
/// ```
/// use the_streamwood::observability::messages::engine::GraphMaterialized;
///
/// let msg = GraphMaterialized {
///     graph_id: 1,
///     stage_count: 4,
///     edge_count: 3,
/// };
///
/// tracing::info!("{}", msg);
/// ```
pub struct GraphMaterialized {
    pub graph_id: u64,
    pub stage_count: usize,
    pub edge_count: usize,
}

impl Display for GraphMaterialized {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Graph {} materialized: {} stages, {} edges",
            self.graph_id, self.stage_count, self.edge_count
        )
    }
}

impl StructuredLog for GraphMaterialized {
    fn log(&self) {
        tracing::info!(
            graph_id = self.graph_id,
            stage_count = self.stage_count,
            edge_count = self.edge_count,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "graph",
            span_name = name,
            graph_id = self.graph_id,
            stage_count = self.stage_count,
            edge_count = self.edge_count,
        )
    }
}

/// Materialization refused before any stage started.
///
/// # Log Level
/// `error!` - Failure requiring attention
pub struct MaterializationRejected<'a> {
    pub error: &'a dyn std::error::Error,
}

impl Display for MaterializationRejected<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Materialization rejected: {}", self.error)
    }
}

impl StructuredLog for MaterializationRejected<'_> {
    fn log(&self) {
        tracing::error!(error = %self.error, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!(
            "materialization_rejected",
            span_name = name,
            error = %self.error,
        )
    }
}

/// Every stage of a materialized graph reached a terminal state.
///
/// # Log Level
/// `info!` - Important operational event
pub struct GraphTerminated {
    pub graph_id: u64,
    pub stage_count: usize,
    pub duration: std::time::Duration,
}

impl Display for GraphTerminated {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Graph {} terminated: {} stages in {:?}",
            self.graph_id, self.stage_count, self.duration
        )
    }
}

impl StructuredLog for GraphTerminated {
    fn log(&self) {
        tracing::info!(
            graph_id = self.graph_id,
            stage_count = self.stage_count,
            duration_ms = self.duration.as_millis() as u64,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "graph_terminated",
            span_name = name,
            graph_id = self.graph_id,
            duration = ?self.duration,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graph_materialized_display() {
        let msg = GraphMaterialized {
            graph_id: 3,
            stage_count: 5,
            edge_count: 4,
        };
        assert_eq!(msg.to_string(), "Graph 3 materialized: 5 stages, 4 edges");
    }

    #[test]
    fn scheduler_started_display() {
        let msg = SchedulerStarted {
            worker_threads: 2,
            owned_runtime: false,
        };
        assert_eq!(
            msg.to_string(),
            "Scheduler started on borrowed runtime with 2 worker threads"
        );
    }
}
