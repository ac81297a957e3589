// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::error::Error;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::config::Attributes;
use crate::errors::TerminationError;
use crate::graph::builder::GraphBuilder;
use crate::graph::dsl::mat::{self, Keep, MatFn, NotUsed};
use crate::graph::dsl::sink::Sink;
use crate::graph::dsl::source::Source;
use crate::graph::port::{InletRef, OutletRef};
use crate::graph::stage_spec::StageSpec;
use crate::stages::{self, AskSettings};
use crate::traits::Responder;

/// Composite with one open inlet taking `In` and one open outlet emitting `Out`.
pub struct Flow<In, Out, Mat = NotUsed> {
    builder: GraphBuilder,
    inlet: InletRef,
    outlet: OutletRef,
    mat: MatFn<Mat>,
    _types: PhantomData<fn(In) -> Out>,
}

impl<In, Out, Mat> Clone for Flow<In, Out, Mat> {
    fn clone(&self) -> Self {
        Self {
            builder: self.builder.clone(),
            inlet: self.inlet,
            outlet: self.outlet,
            mat: self.mat.clone(),
            _types: PhantomData,
        }
    }
}

impl<In: Send + 'static, Out: Send + 'static> Flow<In, Out, NotUsed> {
    /// Single-stage flow from a spec with one inlet and one outlet.
    pub fn from_spec(spec: StageSpec) -> Self {
        Self::single_stage(spec, mat::not_used())
    }

    pub fn map<F>(f: F) -> Self
    where
        F: Fn(In) -> Out + Send + Sync + 'static,
    {
        Self::from_spec(stages::transform::map_spec(f))
    }

    /// Fallible map; errors go to the stage's decider.
    pub fn try_map<E, F>(f: F) -> Self
    where
        E: Error + Send + Sync + 'static,
        F: Fn(In) -> Result<Out, E> + Send + Sync + 'static,
    {
        Self::from_spec(stages::transform::try_map_spec(f))
    }

    /// Map with per-instance state built by `init`; `Restart` rebuilds the state.
    pub fn stateful_map<S, E, I, F>(init: I, f: F) -> Self
    where
        S: Send + 'static,
        E: Error + Send + Sync + 'static,
        I: Fn() -> S + Send + Sync + 'static,
        F: Fn(&mut S, In) -> Result<Out, E> + Send + Sync + 'static,
    {
        Self::from_spec(stages::transform::stateful_map_spec(init, f))
    }

    /// Ask `responder` for each element, emitting replies in input order.
    pub fn ask<R>(responder: R, settings: AskSettings) -> Self
    where
        R: Responder<In, Out> + 'static,
    {
        Self::from_spec(stages::ask::ask_spec(Arc::new(responder), settings))
    }
}

impl<T: Send + 'static> Flow<T, T, NotUsed> {
    pub fn filter<F>(predicate: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        Self::from_spec(stages::transform::filter_spec(predicate))
    }

    /// Pass `n` elements, then complete downstream and cancel upstream.
    pub fn take(n: usize) -> Self {
        Self::from_spec(stages::transform::take_spec::<T>(n))
    }

    /// On upstream failure emit `f(error)` if it is `Some`, then complete.
    pub fn recover<F>(f: F) -> Self
    where
        F: Fn(&TerminationError) -> Option<T> + Send + Sync + 'static,
    {
        Self::from_spec(stages::recover::recover_spec(f))
    }

    /// On upstream failure splice in the source `f(error)` returns, at most
    /// `max_attempts` times; otherwise propagate the failure.
    pub fn recover_with_retries<F>(max_attempts: usize, f: F) -> Self
    where
        F: Fn(&TerminationError) -> Option<Source<T>> + Send + Sync + 'static,
    {
        Self::from_spec(stages::recover::recover_with_retries_spec(max_attempts, f))
    }
}

impl<In: Send + 'static, Out: Send + 'static, Mat: 'static> Flow<In, Out, Mat> {
    /// Single-stage flow whose stage materializes a `Mat`.
    pub fn from_spec_mat(spec: StageSpec) -> Self
    where
        Mat: Send,
    {
        Self::single_stage(spec, mat::stage_value::<Mat>(0))
    }

    fn single_stage(spec: StageSpec, mat: MatFn<Mat>) -> Self {
        let mut builder = GraphBuilder::new();
        let stage = builder.add_stage(spec);
        Self::from_parts(builder, stage.inlet(0), stage.outlet(0), mat)
    }

    pub(crate) fn from_parts(
        builder: GraphBuilder,
        inlet: InletRef,
        outlet: OutletRef,
        mat: MatFn<Mat>,
    ) -> Self {
        Self {
            builder,
            inlet,
            outlet,
            mat,
            _types: PhantomData,
        }
    }

    pub(crate) fn into_parts(self) -> (GraphBuilder, InletRef, OutletRef, MatFn<Mat>) {
        (self.builder, self.inlet, self.outlet, self.mat)
    }

    /// Attach `attributes` to every stage of this flow that has not set them itself.
    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        if let Some(name) = attributes.name() {
            self.builder.name_stage(self.outlet.stage(), name.to_string());
        }
        self.builder.apply_attributes(&attributes);
        self
    }

    pub fn named(self, name: impl Into<String>) -> Self {
        self.with_attributes(Attributes::named(name))
    }

    pub fn buffer(self, size: usize) -> Self {
        self.with_attributes(Attributes::buffer(size))
    }

    pub fn map_materialized_value<M2, F>(self, f: F) -> Flow<In, Out, M2>
    where
        M2: 'static,
        F: Fn(Mat) -> M2 + Send + Sync + 'static,
    {
        Flow::from_parts(self.builder, self.inlet, self.outlet, mat::map(self.mat, f))
    }

    pub fn via<Next, M2>(self, flow: Flow<Out, Next, M2>) -> Flow<In, Next, Mat>
    where
        Next: Send + 'static,
        M2: 'static,
    {
        self.via_mat(flow, Keep::left)
    }

    pub fn via_mat<Next, M2, M3, F>(
        self,
        flow: Flow<Out, Next, M2>,
        combine: F,
    ) -> Flow<In, Next, M3>
    where
        Next: Send + 'static,
        M2: 'static,
        M3: 'static,
        F: Fn(Mat, M2) -> M3 + Send + Sync + 'static,
    {
        let (mut builder, inlet, outlet, left) = self.into_parts();
        let (other, next_inlet, next_outlet, right) = flow.into_parts();
        let offset = builder.append(other);
        builder.link(outlet, next_inlet.shifted(offset));
        Flow::from_parts(
            builder,
            inlet,
            next_outlet.shifted(offset),
            mat::combine(left, right, offset, combine),
        )
    }

    pub fn to<M2: 'static>(self, sink: Sink<Out, M2>) -> Sink<In, Mat> {
        self.to_mat(sink, Keep::left)
    }

    pub fn to_mat<M2, M3, F>(self, sink: Sink<Out, M2>, combine: F) -> Sink<In, M3>
    where
        M2: 'static,
        M3: 'static,
        F: Fn(Mat, M2) -> M3 + Send + Sync + 'static,
    {
        let (mut builder, inlet, outlet, left) = self.into_parts();
        let (other, sink_inlet, right) = sink.into_parts();
        let offset = builder.append(other);
        builder.link(outlet, sink_inlet.shifted(offset));
        Sink::from_parts(builder, inlet, mat::combine(left, right, offset, combine))
    }
}
