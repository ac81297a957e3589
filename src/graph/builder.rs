// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Graph construction and validation.
//!
//! A [`GraphBuilder`] collects stage specs and connections; `connect` checks
//! element types and port occupancy as edges are added. [`GraphBuilder::build`]
//! freezes the result into an immutable, cheaply cloneable [`Graph`] that can
//! be validated and materialized any number of times.
//!
//! # Validation
//!
//! `validate` reports every unconnected port at once, then rejects cycles
//! with a depth-first search that tracks the recursion stack so the cycle
//! path can be reported.

use std::collections::HashSet;
use std::sync::Arc;

use crate::config::Attributes;
use crate::errors::{GraphBuildError, PortDescriptor, PortDirection};
use crate::graph::dsl::{MatHandle, Flow, Sink, Source};
use crate::graph::port::{ElementType, InletRef, OutletRef};
use crate::graph::stage_spec::StageSpec;

/// One edge of a graph description.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Connection {
    pub from: OutletRef,
    pub to: InletRef,
}

/// Ports of a stage added to a builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageHandle {
    index: usize,
}

impl StageHandle {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn inlet(&self, index: usize) -> InletRef {
        InletRef::new(self.index, index)
    }

    pub fn outlet(&self, index: usize) -> OutletRef {
        OutletRef::new(self.index, index)
    }
}

/// Mutable collection of stages and connections.
#[derive(Debug, Clone, Default)]
pub struct GraphBuilder {
    stages: Vec<StageSpec>,
    connections: Vec<Connection>,
    attributes: Attributes,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attributes for the whole graph, below stage and composite attributes.
    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = attributes.or(&self.attributes);
        self
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn add_stage(&mut self, spec: StageSpec) -> StageHandle {
        self.stages.push(spec);
        StageHandle {
            index: self.stages.len() - 1,
        }
    }

    /// Add an edge from `from` to `to`.
    pub fn connect(&mut self, from: OutletRef, to: InletRef) -> Result<(), GraphBuildError> {
        let out_type = self.outlet_type(from)?;
        let in_type = self.inlet_type(to)?;
        if out_type != in_type {
            return Err(GraphBuildError::TypeMismatch {
                from: self.describe(from.stage(), PortDirection::Out, from.index(), out_type),
                to: self.describe(to.stage(), PortDirection::In, to.index(), in_type),
            });
        }
        if self.connections.iter().any(|c| c.from == from) {
            return Err(GraphBuildError::PortAlreadyConnected {
                port: self.describe(from.stage(), PortDirection::Out, from.index(), out_type),
            });
        }
        if self.connections.iter().any(|c| c.to == to) {
            return Err(GraphBuildError::PortAlreadyConnected {
                port: self.describe(to.stage(), PortDirection::In, to.index(), in_type),
            });
        }
        self.connections.push(Connection { from, to });
        Ok(())
    }

    /// Import a typed source; returns its open outlet and a handle to its value.
    pub fn add_source<T, M>(&mut self, source: Source<T, M>) -> (OutletRef, MatHandle<M>)
    where
        T: Send + 'static,
        M: 'static,
    {
        let (builder, outlet, mat) = source.into_parts();
        let offset = self.append(builder);
        (outlet.shifted(offset), MatHandle::new(mat, offset))
    }

    pub fn add_flow<I, O, M>(&mut self, flow: Flow<I, O, M>) -> (InletRef, OutletRef, MatHandle<M>)
    where
        I: Send + 'static,
        O: Send + 'static,
        M: 'static,
    {
        let (builder, inlet, outlet, mat) = flow.into_parts();
        let offset = self.append(builder);
        (
            inlet.shifted(offset),
            outlet.shifted(offset),
            MatHandle::new(mat, offset),
        )
    }

    pub fn add_sink<T, M>(&mut self, sink: Sink<T, M>) -> (InletRef, MatHandle<M>)
    where
        T: Send + 'static,
        M: 'static,
    {
        let (builder, inlet, mat) = sink.into_parts();
        let offset = self.append(builder);
        (inlet.shifted(offset), MatHandle::new(mat, offset))
    }

    pub fn build(self) -> Graph {
        Graph {
            inner: Arc::new(self),
        }
    }

    /// Move every stage and connection of `other` into this builder; returns
    /// the position of `other`'s first stage.
    pub(crate) fn append(&mut self, other: GraphBuilder) -> usize {
        let offset = self.stages.len();
        let outer = other.attributes;
        self.stages.extend(other.stages.into_iter().map(|mut spec| {
            spec.inherit_attributes(&outer);
            spec
        }));
        self.connections
            .extend(other.connections.into_iter().map(|c| Connection {
                from: c.from.shifted(offset),
                to: c.to.shifted(offset),
            }));
        offset
    }

    /// Connect ports whose types the typed DSL already guarantees.
    pub(crate) fn link(&mut self, from: OutletRef, to: InletRef) {
        self.connections.push(Connection { from, to });
    }

    pub(crate) fn apply_attributes(&mut self, attributes: &Attributes) {
        for spec in &mut self.stages {
            spec.inherit_attributes(attributes);
        }
    }

    pub(crate) fn name_stage(&mut self, stage: usize, name: String) {
        if let Some(spec) = self.stages.get_mut(stage) {
            spec.set_name(name);
        }
    }

    fn outlet_type(&self, port: OutletRef) -> Result<ElementType, GraphBuildError> {
        self.stages
            .get(port.stage())
            .and_then(|s| s.outlets().get(port.index()))
            .copied()
            .ok_or(GraphBuildError::UnknownPort {
                stage: port.stage(),
                direction: PortDirection::Out,
                index: port.index(),
            })
    }

    fn inlet_type(&self, port: InletRef) -> Result<ElementType, GraphBuildError> {
        self.stages
            .get(port.stage())
            .and_then(|s| s.inlets().get(port.index()))
            .copied()
            .ok_or(GraphBuildError::UnknownPort {
                stage: port.stage(),
                direction: PortDirection::In,
                index: port.index(),
            })
    }

    fn describe(
        &self,
        stage: usize,
        direction: PortDirection,
        index: usize,
        element: ElementType,
    ) -> PortDescriptor {
        PortDescriptor {
            stage,
            stage_name: self
                .stages
                .get(stage)
                .map(|s| s.display_name().to_string())
                .unwrap_or_default(),
            direction,
            index,
            element: element.name(),
        }
    }
}

/// Immutable graph description. Cloning shares the description.
#[derive(Debug, Clone)]
pub struct Graph {
    inner: Arc<GraphBuilder>,
}

impl Graph {
    pub fn stages(&self) -> &[StageSpec] {
        &self.inner.stages
    }

    pub fn connections(&self) -> &[Connection] {
        &self.inner.connections
    }

    pub fn attributes(&self) -> &Attributes {
        &self.inner.attributes
    }

    pub fn stage_count(&self) -> usize {
        self.inner.stages.len()
    }

    /// Copy of this graph with `attributes` layered over its own.
    pub fn with_attributes(&self, attributes: Attributes) -> Graph {
        let mut builder = (*self.inner).clone();
        builder.attributes = attributes.or(&builder.attributes);
        builder.build()
    }

    /// Succeeds iff every port has exactly one edge and there is no cycle.
    pub fn validate(&self) -> Result<(), GraphBuildError> {
        self.check(None)
    }

    /// Like [`Graph::validate`] but `open` must be the one unconnected port.
    pub(crate) fn validate_open(&self, open: OutletRef) -> Result<(), GraphBuildError> {
        let element = self.inner.outlet_type(open)?;
        if self.connections().iter().any(|c| c.from == open) {
            return Err(GraphBuildError::PortAlreadyConnected {
                port: self
                    .inner
                    .describe(open.stage(), PortDirection::Out, open.index(), element),
            });
        }
        self.check(Some(open))
    }

    fn check(&self, open: Option<OutletRef>) -> Result<(), GraphBuildError> {
        let unconnected = self.unconnected_ports(open);
        if !unconnected.is_empty() {
            return Err(GraphBuildError::IncompleteGraph { unconnected });
        }
        if let Some(cycle) = self.find_cycle() {
            return Err(GraphBuildError::CyclicGraph { stages: cycle });
        }
        Ok(())
    }

    fn unconnected_ports(&self, open: Option<OutletRef>) -> Vec<PortDescriptor> {
        let inbound: HashSet<InletRef> = self.connections().iter().map(|c| c.to).collect();
        let outbound: HashSet<OutletRef> = self.connections().iter().map(|c| c.from).collect();
        let mut missing = Vec::new();
        for (stage, spec) in self.stages().iter().enumerate() {
            for (index, element) in spec.inlets().iter().enumerate() {
                if !inbound.contains(&InletRef::new(stage, index)) {
                    missing.push(self.inner.describe(stage, PortDirection::In, index, *element));
                }
            }
            for (index, element) in spec.outlets().iter().enumerate() {
                let port = OutletRef::new(stage, index);
                if !outbound.contains(&port) && Some(port) != open {
                    missing.push(self.inner.describe(stage, PortDirection::Out, index, *element));
                }
            }
        }
        missing
    }

    fn find_cycle(&self) -> Option<Vec<String>> {
        let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); self.stage_count()];
        for c in self.connections() {
            adjacency[c.from.stage()].push(c.to.stage());
        }
        let mut visited = vec![false; self.stage_count()];
        let mut on_stack = vec![false; self.stage_count()];
        let mut path = Vec::new();
        for start in 0..self.stage_count() {
            if !visited[start] {
                if let Some(cycle) =
                    dfs_cycle(start, &adjacency, &mut visited, &mut on_stack, &mut path)
                {
                    return Some(
                        cycle
                            .into_iter()
                            .map(|i| self.stages()[i].display_name().to_string())
                            .collect(),
                    );
                }
            }
        }
        None
    }
}

/// Depth-first search returning the stage path of the first back edge found.
fn dfs_cycle(
    node: usize,
    adjacency: &[Vec<usize>],
    visited: &mut [bool],
    on_stack: &mut [bool],
    path: &mut Vec<usize>,
) -> Option<Vec<usize>> {
    visited[node] = true;
    on_stack[node] = true;
    path.push(node);
    for &next in &adjacency[node] {
        if on_stack[next] {
            let start = path.iter().position(|&n| n == next).unwrap_or(0);
            let mut cycle = path[start..].to_vec();
            cycle.push(next);
            return Some(cycle);
        }
        if !visited[next] {
            if let Some(cycle) = dfs_cycle(next, adjacency, visited, on_stack, path) {
                return Some(cycle);
            }
        }
    }
    on_stack[node] = false;
    path.pop();
    None
}
