// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Errors surfaced while building or materializing a graph.

use std::fmt;

use thiserror::Error;

/// Direction of a port relative to its stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortDirection {
    In,
    Out,
}

/// Human-readable location of a port, carried by build errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortDescriptor {
    pub stage: usize,
    pub stage_name: String,
    pub direction: PortDirection,
    pub index: usize,
    pub element: &'static str,
}

impl fmt::Display for PortDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dir = match self.direction {
            PortDirection::In => "in",
            PortDirection::Out => "out",
        };
        write!(
            f,
            "'{}'#{}.{}({}): {}",
            self.stage_name, self.stage, dir, self.index, self.element
        )
    }
}

fn join_ports(ports: &[PortDescriptor]) -> String {
    ports
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Errors raised synchronously while wiring a graph description.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphBuildError {
    /// The outlet and inlet carry different element types.
    #[error("cannot connect {from} to {to}: element types differ")]
    TypeMismatch {
        from: PortDescriptor,
        to: PortDescriptor,
    },

    /// One side of the requested edge already has an edge.
    #[error("port {port} is already connected")]
    PortAlreadyConnected { port: PortDescriptor },

    /// Ports left without an edge; lists every one of them.
    #[error("graph is incomplete, unconnected ports: [{}]", join_ports(.unconnected))]
    IncompleteGraph { unconnected: Vec<PortDescriptor> },

    /// The connections form a cycle through the listed stages.
    #[error("graph contains a cycle through stages [{}]", .stages.join(", "))]
    CyclicGraph { stages: Vec<String> },

    /// The port reference does not exist in this graph.
    #[error("unknown port: stage #{stage} {direction:?}({index})")]
    UnknownPort {
        stage: usize,
        direction: PortDirection,
        index: usize,
    },
}

/// Errors raised by `Materializer::materialize`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MaterializeError {
    /// Validation failed; no stage was started.
    #[error("graph is not runnable: {0}")]
    GraphNotRunnable(#[source] GraphBuildError),

    /// A materialized value was requested that the stage did not produce.
    #[error("stage #{stage} did not materialize a value of type {expected}")]
    MaterializedValueMissing { stage: usize, expected: &'static str },

    /// The scheduler no longer accepts new graphs.
    #[error("scheduler has been shut down")]
    SchedulerShutdown,
}
