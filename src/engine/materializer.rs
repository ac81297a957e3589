// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Compiles an immutable [`Graph`] into running stages.
//!
//! Materialization is all-or-nothing up to the point stages are spawned:
//! validation, attribute resolution, edge allocation and stage construction
//! all happen first, and only once every stage instance exists is anything
//! handed to the scheduler. A graph that fails validation therefore never
//! starts a single stage.

use std::any::{type_name, Any};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::{Attributes, EngineConfig};
use crate::engine::context::{ContextParts, StageContext};
use crate::engine::edge::{edge, EdgeReceiver, EdgeSender};
use crate::engine::scheduler::{GraphMonitor, GraphSnapshot, Scheduler, StageSnapshot, StageState};
use crate::engine::supervision::{Decider, Supervisor};
use crate::errors::MaterializeError;
use crate::graph::{Graph, MatHandle, OutletRef};
use crate::observability::messages::engine::{GraphMaterialized, MaterializationRejected};
use crate::observability::messages::StructuredLog;
use crate::traits::MatValue;

/// Outermost defaults applied to stages that leave an attribute unset.
#[derive(Debug, Clone)]
pub struct MaterializerSettings {
    pub buffer_size: usize,
    pub decider: Decider,
}

impl Default for MaterializerSettings {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for MaterializerSettings {
    fn from(cfg: &EngineConfig) -> Self {
        Self {
            buffer_size: cfg.materializer.get_buffer_size().max(1),
            decider: Decider::stopping(),
        }
    }
}

impl MaterializerSettings {
    fn as_attributes(&self) -> Attributes {
        Attributes::buffer(self.buffer_size).with_decider(self.decider.clone())
    }
}

/// Turns graph descriptions into live stage networks on a [`Scheduler`].
#[derive(Debug, Clone)]
pub struct Materializer {
    scheduler: Scheduler,
    settings: MaterializerSettings,
}

/// Live instance of a graph.
///
/// Dropping the handle does not stop the graph; call [`MaterializedGraph::abort`]
/// for that.
#[derive(Debug, Clone)]
pub struct MaterializedGraph {
    monitor: Arc<GraphMonitor>,
    token: CancellationToken,
}

impl MaterializedGraph {
    pub fn id(&self) -> u64 {
        self.monitor.id()
    }

    /// Cancel every stage of this graph; sinks resolve to `Cancelled`.
    pub fn abort(&self) {
        self.token.cancel();
    }

    pub fn is_terminated(&self) -> bool {
        self.monitor.is_terminated()
    }

    /// Resolves once every stage has reached a terminal state.
    pub async fn terminated(&self) {
        self.monitor.terminated().await
    }

    pub fn snapshot(&self) -> GraphSnapshot {
        self.monitor.snapshot()
    }
}

/// Materialized values of one graph, indexed by stage position.
#[derive(Debug)]
pub struct MaterializedValues {
    values: Vec<Option<MatValue>>,
}

impl MaterializedValues {
    pub(crate) fn new(values: Vec<Option<MatValue>>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Whether `stage` produced a value that has not been taken yet.
    pub fn has(&self, stage: usize) -> bool {
        matches!(self.values.get(stage), Some(Some(_)))
    }

    /// Take the value `stage` materialized, if it has type `T`.
    pub fn take<T: Any>(&mut self, stage: usize) -> Result<T, MaterializeError> {
        let missing = MaterializeError::MaterializedValueMissing {
            stage,
            expected: type_name::<T>(),
        };
        let slot = self.values.get_mut(stage).ok_or_else(|| missing.clone())?;
        let value = slot.take().ok_or_else(|| missing.clone())?;
        match value.downcast::<T>() {
            Ok(value) => Ok(*value),
            Err(value) => {
                *slot = Some(value);
                Err(missing)
            }
        }
    }

    /// Take a value through a handle returned by `GraphBuilder::add_*`.
    pub fn take_mat<M>(&mut self, handle: &MatHandle<M>) -> Result<M, MaterializeError> {
        handle.extract(self)
    }
}

impl Materializer {
    pub fn new(scheduler: Scheduler, settings: MaterializerSettings) -> Self {
        Self {
            scheduler,
            settings,
        }
    }

    pub fn settings(&self) -> &MaterializerSettings {
        &self.settings
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Validate `graph`, start one context per stage and return the handles.
    ///
    /// `attributes` sit between the graph's own attributes and the
    /// materializer defaults in the resolution order.
    pub fn materialize(
        &self,
        graph: &Graph,
        attributes: &Attributes,
    ) -> Result<(MaterializedGraph, MaterializedValues), MaterializeError> {
        let (handle, values, _) = self.materialize_inner(graph, attributes, None)?;
        Ok((handle, values))
    }

    /// Materialize a graph whose only unconnected port is `open`, returning
    /// the receiving side of that outlet with the given capacity.
    pub(crate) fn materialize_open(
        &self,
        graph: &Graph,
        attributes: &Attributes,
        open: OutletRef,
        capacity: usize,
    ) -> Result<(MaterializedGraph, MaterializedValues, EdgeReceiver), MaterializeError> {
        let (handle, values, rx) =
            self.materialize_inner(graph, attributes, Some((open, capacity)))?;
        match rx {
            Some(rx) => Ok((handle, values, rx)),
            None => Err(MaterializeError::MaterializedValueMissing {
                stage: open.stage(),
                expected: "open outlet",
            }),
        }
    }

    fn reject(&self, error: MaterializeError) -> MaterializeError {
        MaterializationRejected { error: &error }.log();
        error
    }

    fn materialize_inner(
        &self,
        graph: &Graph,
        attributes: &Attributes,
        open: Option<(OutletRef, usize)>,
    ) -> Result<(MaterializedGraph, MaterializedValues, Option<EdgeReceiver>), MaterializeError>
    {
        if self.scheduler.is_shut_down() {
            return Err(self.reject(MaterializeError::SchedulerShutdown));
        }
        let validated = match open {
            None => graph.validate(),
            Some((outlet, _)) => graph.validate_open(outlet),
        };
        if let Err(error) = validated {
            return Err(self.reject(MaterializeError::GraphNotRunnable(error)));
        }

        let graph_id = self.scheduler.next_graph_id();
        let outer = graph
            .attributes()
            .clone()
            .inherit(attributes)
            .inherit(&self.settings.as_attributes());
        let stages = graph.stages();
        let resolved: Vec<Attributes> = stages
            .iter()
            .map(|spec| spec.attributes().clone().inherit(&outer))
            .collect();
        let names: Vec<String> = stages
            .iter()
            .zip(&resolved)
            .map(|(spec, attrs)| attrs.name().unwrap_or(spec.label()).to_string())
            .collect();
        let buffer_of = |stage: usize| {
            resolved
                .get(stage)
                .and_then(Attributes::buffer_size)
                .unwrap_or(self.settings.buffer_size)
        };

        let mut inlets: Vec<Vec<Option<EdgeReceiver>>> = stages
            .iter()
            .map(|spec| (0..spec.inlets().len()).map(|_| None).collect())
            .collect();
        let mut outlets: Vec<Vec<Option<EdgeSender>>> = stages
            .iter()
            .map(|spec| (0..spec.outlets().len()).map(|_| None).collect())
            .collect();
        let mut edges = Vec::with_capacity(graph.connections().len());
        for connection in graph.connections() {
            let (from, to) = (connection.from, connection.to);
            let label = format!(
                "{}.out({})->{}.in({})",
                names[from.stage()],
                from.index(),
                names[to.stage()],
                to.index()
            );
            let (tx, rx) = edge(label, buffer_of(to.stage()));
            edges.push(tx.shared());
            outlets[from.stage()][from.index()] = Some(tx);
            inlets[to.stage()][to.index()] = Some(rx);
        }
        let open_rx = open.map(|(outlet, capacity)| {
            let label = format!("{}.out({})->splice", names[outlet.stage()], outlet.index());
            let (tx, rx) = edge(label, capacity);
            edges.push(tx.shared());
            outlets[outlet.stage()][outlet.index()] = Some(tx);
            rx
        });

        let mut logics = Vec::with_capacity(stages.len());
        let mut values = Vec::with_capacity(stages.len());
        for spec in stages {
            let (logic, value) = spec.factory().create();
            logics.push(logic);
            values.push(value);
        }

        let records = stages
            .iter()
            .enumerate()
            .map(|(index, spec)| StageSnapshot {
                index,
                name: names[index].clone(),
                kind: spec.kind(),
                state: StageState::Pending,
                elements: 0,
                failure: None,
            })
            .collect();
        let edge_count = edges.len();
        let monitor = Arc::new(GraphMonitor::new(graph_id, records, edges));
        let token = self.scheduler.graph_token();
        // stage tasks unregister the graph, so an empty one is never tracked
        if !stages.is_empty() {
            self.scheduler.register(monitor.clone());
        }

        GraphMaterialized {
            graph_id,
            stage_count: stages.len(),
            edge_count,
        }
        .log();

        let wiring = inlets.into_iter().zip(outlets);
        for (index, ((logic, (inlets, outlets)), spec)) in
            logics.into_iter().zip(wiring).zip(stages).enumerate()
        {
            let decider = resolved[index]
                .decider()
                .cloned()
                .unwrap_or_else(|| self.settings.decider.clone());
            let ctx = StageContext::new(ContextParts {
                graph_id,
                index,
                name: names[index].clone(),
                kind: spec.kind(),
                inlets,
                outlets,
                supervisor: Supervisor::new(names[index].clone(), decider),
                abort: token.clone(),
                materializer: self.clone(),
                buffer_size: buffer_of(index),
                fairness_budget: self.scheduler.fairness_budget(),
            });
            self.scheduler.spawn_stage(monitor.clone(), logic, ctx);
        }

        Ok((MaterializedGraph { monitor, token }, MaterializedValues::new(values), open_rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::GraphBuildError;
    use crate::graph::{GraphBuilder, Sink, Source};

    fn materializer() -> Materializer {
        let config = EngineConfig::default();
        let scheduler = Scheduler::from_current(&config.scheduler).unwrap();
        Materializer::new(scheduler, MaterializerSettings::from(&config))
    }

    #[tokio::test]
    async fn incomplete_graph_starts_nothing() {
        let mat = materializer();
        let mut builder = GraphBuilder::new();
        let (_outlet, _) = builder.add_source(Source::from_iter(vec![1, 2, 3]));
        let graph = builder.build();
        let err = mat.materialize(&graph, &Attributes::new()).unwrap_err();
        assert!(matches!(
            err,
            MaterializeError::GraphNotRunnable(GraphBuildError::IncompleteGraph { .. })
        ));
        assert!(mat.scheduler().active_graphs().is_empty());
    }

    #[tokio::test]
    async fn values_are_typed_by_stage() {
        let mat = materializer();
        let mut builder = GraphBuilder::new();
        let (outlet, _) = builder.add_source(Source::from_iter(vec![1, 2, 3]));
        let (inlet, seq) = builder.add_sink(Sink::<i32, _>::seq());
        builder.connect(outlet, inlet).unwrap();
        let (graph, mut values) = mat.materialize(&builder.build(), &Attributes::new()).unwrap();
        assert!(values.take::<String>(1).is_err());
        let result = values.take_mat(&seq).unwrap();
        assert_eq!(result.await.unwrap(), vec![1, 2, 3]);
        graph.terminated().await;
        assert!(graph.is_terminated());
    }

    #[tokio::test]
    async fn empty_graph_terminates_untracked() {
        let mat = materializer();
        let (graph, values) = mat
            .materialize(&GraphBuilder::new().build(), &Attributes::new())
            .unwrap();
        assert!(values.is_empty());
        assert!(graph.is_terminated());
        graph.terminated().await;
        assert!(mat.scheduler().active_graphs().is_empty());
    }

    #[tokio::test]
    async fn refuses_after_shutdown() {
        let mat = materializer();
        mat.scheduler().shutdown();
        let graph = Source::single(1).to(Sink::ignore());
        assert!(matches!(
            graph.run(&mat),
            Err(MaterializeError::SchedulerShutdown)
        ));
    }
}
