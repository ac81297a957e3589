// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::error::Error;
use std::marker::PhantomData;

use crate::config::{Attributes, InjectionConfig};
use crate::engine::Materializer;
use crate::errors::{MaterializeError, StageRuntimeError, TerminationError};
use crate::graph::builder::GraphBuilder;
use crate::graph::dsl::flow::Flow;
use crate::graph::dsl::mat::{self, Keep, MatFn, NotUsed};
use crate::graph::dsl::runnable::RunnableGraph;
use crate::graph::dsl::sink::Sink;
use crate::graph::port::OutletRef;
use crate::graph::stage_spec::StageSpec;
use crate::stages::{
    self, AskSettings, Broadcast, InjectionEndpoint, Merge, OverflowPolicy, Zip, ZipWith,
};
use crate::traits::Responder;

/// Composite with exactly one open outlet emitting `Out`.
pub struct Source<Out, Mat = NotUsed> {
    builder: GraphBuilder,
    outlet: OutletRef,
    mat: MatFn<Mat>,
    _out: PhantomData<fn() -> Out>,
}

impl<Out, Mat> Clone for Source<Out, Mat> {
    fn clone(&self) -> Self {
        Self {
            builder: self.builder.clone(),
            outlet: self.outlet,
            mat: self.mat.clone(),
            _out: PhantomData,
        }
    }
}

impl<Out: Send + 'static> Source<Out, NotUsed> {
    /// Single-stage source from a spec with no inlets and one outlet.
    pub fn from_spec(spec: StageSpec) -> Self {
        Self::single_stage(spec, mat::not_used())
    }

    /// Emits the items of `items`, then completes. Every materialization
    /// iterates a fresh clone.
    pub fn from_iter<I>(items: I) -> Self
    where
        I: IntoIterator<Item = Out> + Clone + Send + Sync + 'static,
        I::IntoIter: Send + 'static,
    {
        Self::from_spec(stages::sources::iter_spec("from_iter", items))
    }

    pub fn single(value: Out) -> Self
    where
        Out: Clone + Sync,
    {
        Self::from_spec(stages::sources::iter_spec("single", std::iter::once(value)))
    }

    /// Emits `value` forever; never completes on its own.
    pub fn repeat(value: Out) -> Self
    where
        Out: Clone + Sync,
    {
        Self::from_spec(stages::sources::iter_spec("repeat", std::iter::repeat(value)))
    }

    pub fn empty() -> Self {
        Self::from_spec(stages::sources::iter_spec("empty", std::iter::empty::<Out>()))
    }

    /// Fails as soon as it starts.
    pub fn failed(error: StageRuntimeError) -> Self {
        Self::from_spec(stages::sources::failed_spec::<Out>(error))
    }
}

impl<Out: Send + 'static> Source<Out, InjectionEndpoint<Out>> {
    /// Source fed by external callers through the materialized endpoint.
    pub fn queue(capacity: usize, overflow: OverflowPolicy) -> Self {
        Self::from_spec_mat(stages::injection::queue_spec::<Out>(capacity, overflow))
    }

    pub fn queue_from(config: &InjectionConfig) -> Self {
        Self::queue(config.get_capacity(), config.overflow)
    }
}

impl<Out: Send + 'static, Mat: 'static> Source<Out, Mat> {
    /// Single-stage source whose stage materializes a `Mat`.
    pub fn from_spec_mat(spec: StageSpec) -> Self
    where
        Mat: Send,
    {
        Self::single_stage(spec, mat::stage_value::<Mat>(0))
    }

    fn single_stage(spec: StageSpec, mat: MatFn<Mat>) -> Self {
        let mut builder = GraphBuilder::new();
        let stage = builder.add_stage(spec);
        Self::from_parts(builder, stage.outlet(0), mat)
    }

    pub(crate) fn from_parts(builder: GraphBuilder, outlet: OutletRef, mat: MatFn<Mat>) -> Self {
        Self {
            builder,
            outlet,
            mat,
            _out: PhantomData,
        }
    }

    pub(crate) fn into_parts(self) -> (GraphBuilder, OutletRef, MatFn<Mat>) {
        (self.builder, self.outlet, self.mat)
    }

    /// Attach `attributes` to every stage of this source that has not set them itself.
    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        if let Some(name) = attributes.name() {
            self.builder.name_stage(self.outlet.stage(), name.to_string());
        }
        self.builder.apply_attributes(&attributes);
        self
    }

    /// Name the stage that owns the open outlet.
    pub fn named(self, name: impl Into<String>) -> Self {
        self.with_attributes(Attributes::named(name))
    }

    pub fn buffer(self, size: usize) -> Self {
        self.with_attributes(Attributes::buffer(size))
    }

    pub fn map_materialized_value<M2, F>(self, f: F) -> Source<Out, M2>
    where
        M2: 'static,
        F: Fn(Mat) -> M2 + Send + Sync + 'static,
    {
        Source::from_parts(self.builder, self.outlet, mat::map(self.mat, f))
    }

    pub fn via<Next, M2>(self, flow: Flow<Out, Next, M2>) -> Source<Next, Mat>
    where
        Next: Send + 'static,
        M2: 'static,
    {
        self.via_mat(flow, Keep::left)
    }

    pub fn via_mat<Next, M2, M3, F>(self, flow: Flow<Out, Next, M2>, combine: F) -> Source<Next, M3>
    where
        Next: Send + 'static,
        M2: 'static,
        M3: 'static,
        F: Fn(Mat, M2) -> M3 + Send + Sync + 'static,
    {
        let (mut builder, outlet, left) = self.into_parts();
        let (other, inlet, next_outlet, right) = flow.into_parts();
        let offset = builder.append(other);
        builder.link(outlet, inlet.shifted(offset));
        Source::from_parts(
            builder,
            next_outlet.shifted(offset),
            mat::combine(left, right, offset, combine),
        )
    }

    pub fn to<M2: 'static>(self, sink: Sink<Out, M2>) -> RunnableGraph<Mat> {
        self.to_mat(sink, Keep::left)
    }

    pub fn to_mat<M2, M3, F>(self, sink: Sink<Out, M2>, combine: F) -> RunnableGraph<M3>
    where
        M2: 'static,
        M3: 'static,
        F: Fn(Mat, M2) -> M3 + Send + Sync + 'static,
    {
        let (mut builder, outlet, left) = self.into_parts();
        let (other, inlet, right) = sink.into_parts();
        let offset = builder.append(other);
        builder.link(outlet, inlet.shifted(offset));
        RunnableGraph::new(builder, mat::combine(left, right, offset, combine))
    }

    /// Connect to `sink`, materialize, and return the sink's value.
    pub fn run_with<M2: 'static>(
        self,
        sink: Sink<Out, M2>,
        materializer: &Materializer,
    ) -> Result<M2, MaterializeError> {
        self.to_mat(sink, Keep::right).run(materializer)
    }

    pub fn map<U, F>(self, f: F) -> Source<U, Mat>
    where
        U: Send + 'static,
        F: Fn(Out) -> U + Send + Sync + 'static,
    {
        self.via(Flow::map(f))
    }

    pub fn try_map<U, E, F>(self, f: F) -> Source<U, Mat>
    where
        U: Send + 'static,
        E: Error + Send + Sync + 'static,
        F: Fn(Out) -> Result<U, E> + Send + Sync + 'static,
    {
        self.via(Flow::try_map(f))
    }

    pub fn filter<F>(self, predicate: F) -> Source<Out, Mat>
    where
        F: Fn(&Out) -> bool + Send + Sync + 'static,
    {
        self.via(Flow::filter(predicate))
    }

    pub fn stateful_map<S, U, E, I, F>(self, init: I, f: F) -> Source<U, Mat>
    where
        S: Send + 'static,
        U: Send + 'static,
        E: Error + Send + Sync + 'static,
        I: Fn() -> S + Send + Sync + 'static,
        F: Fn(&mut S, Out) -> Result<U, E> + Send + Sync + 'static,
    {
        self.via(Flow::stateful_map(init, f))
    }

    pub fn take(self, n: usize) -> Source<Out, Mat> {
        self.via(Flow::take(n))
    }

    pub fn ask<U, R>(self, responder: R, settings: AskSettings) -> Source<U, Mat>
    where
        U: Send + 'static,
        R: Responder<Out, U> + 'static,
    {
        self.via(Flow::ask(responder, settings))
    }

    pub fn recover<F>(self, f: F) -> Source<Out, Mat>
    where
        F: Fn(&TerminationError) -> Option<Out> + Send + Sync + 'static,
    {
        self.via(Flow::recover(f))
    }

    pub fn recover_with_retries<F>(self, max_attempts: usize, f: F) -> Source<Out, Mat>
    where
        F: Fn(&TerminationError) -> Option<Source<Out>> + Send + Sync + 'static,
    {
        self.via(Flow::recover_with_retries(max_attempts, f))
    }

    /// Pair elements with `other`'s; completes when either side completes.
    pub fn zip<U, M2>(self, other: Source<U, M2>) -> Source<(Out, U), Mat>
    where
        U: Send + 'static,
        M2: 'static,
    {
        self.fan_in(other, Zip::spec::<Out, U>())
    }

    pub fn zip_with<U, R, M2, F>(self, other: Source<U, M2>, f: F) -> Source<R, Mat>
    where
        U: Send + 'static,
        R: Send + 'static,
        M2: 'static,
        F: Fn(Out, U) -> R + Send + Sync + 'static,
    {
        self.fan_in(other, ZipWith::spec(f))
    }

    /// Feed this source and `other` into the two inlets of `junction`.
    fn fan_in<U, R, M2>(self, other: Source<U, M2>, junction: StageSpec) -> Source<R, Mat>
    where
        U: Send + 'static,
        R: Send + 'static,
        M2: 'static,
    {
        let (mut builder, left_outlet, mat) = self.into_parts();
        let (other, right_outlet, _) = other.into_parts();
        let offset = builder.append(other);
        let stage = builder.add_stage(junction);
        builder.link(left_outlet, stage.inlet(0));
        builder.link(right_outlet.shifted(offset), stage.inlet(1));
        Source::from_parts(builder, stage.outlet(0), mat)
    }

    /// Interleave with `other` in arrival order; completes when both complete.
    pub fn merge<M2: 'static>(self, other: Source<Out, M2>) -> Source<Out, Mat> {
        self.fan_in(other, Merge::spec::<Out>(2))
    }

    /// Send every element to `sink` as well as downstream.
    pub fn also_to<M2: 'static>(self, sink: Sink<Out, M2>) -> Source<Out, Mat>
    where
        Out: Clone,
    {
        self.also_to_mat(sink, Keep::left)
    }

    pub fn also_to_mat<M2, M3, F>(self, sink: Sink<Out, M2>, combine: F) -> Source<Out, M3>
    where
        Out: Clone,
        M2: 'static,
        M3: 'static,
        F: Fn(Mat, M2) -> M3 + Send + Sync + 'static,
    {
        let (mut builder, outlet, left) = self.into_parts();
        let bcast = builder.add_stage(Broadcast::spec::<Out>(2));
        builder.link(outlet, bcast.inlet(0));
        let (other, inlet, right) = sink.into_parts();
        let offset = builder.append(other);
        builder.link(bcast.outlet(1), inlet.shifted(offset));
        Source::from_parts(
            builder,
            bcast.outlet(0),
            mat::combine(left, right, offset, combine),
        )
    }
}
