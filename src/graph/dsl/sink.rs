// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::marker::PhantomData;

use crate::config::Attributes;
use crate::graph::builder::GraphBuilder;
use crate::graph::dsl::mat::{self, MatFn, NotUsed};
use crate::graph::port::InletRef;
use crate::graph::stage_spec::StageSpec;
use crate::stages::{self, Completion, ElementStream};

/// Composite with exactly one open inlet taking `In`.
pub struct Sink<In, Mat = NotUsed> {
    builder: GraphBuilder,
    inlet: InletRef,
    mat: MatFn<Mat>,
    _in: PhantomData<fn(In)>,
}

impl<In, Mat> Clone for Sink<In, Mat> {
    fn clone(&self) -> Self {
        Self {
            builder: self.builder.clone(),
            inlet: self.inlet,
            mat: self.mat.clone(),
            _in: PhantomData,
        }
    }
}

impl<In: Send + 'static> Sink<In, NotUsed> {
    pub fn from_spec(spec: StageSpec) -> Self {
        Self::single_stage(spec, mat::not_used())
    }
}

impl<In: Send + 'static> Sink<In, Completion<Vec<In>>> {
    /// Collect every element; resolves once upstream completes.
    pub fn seq() -> Self {
        Self::from_spec_mat(stages::sinks::fold_spec("seq", Vec::new, |mut acc: Vec<In>, element| {
            acc.push(element);
            acc
        }))
    }
}

impl<In: Send + 'static> Sink<In, Completion<()>> {
    pub fn for_each<F>(f: F) -> Self
    where
        F: Fn(In) + Send + Sync + 'static,
    {
        Self::from_spec_mat(stages::sinks::fold_spec("for_each", || (), move |(), element| f(element)))
    }

    /// Drain everything, keeping nothing.
    pub fn ignore() -> Self {
        Self::from_spec_mat(stages::sinks::fold_spec("ignore", || (), |(), _element: In| ()))
    }
}

impl<In: Send + 'static, Acc: Send + 'static> Sink<In, Completion<Acc>> {
    /// Fold every element into `zero`; resolves to the final accumulator.
    pub fn fold<F>(zero: Acc, f: F) -> Self
    where
        Acc: Clone + Sync,
        F: Fn(Acc, In) -> Acc + Send + Sync + 'static,
    {
        Self::from_spec_mat(stages::sinks::fold_spec("fold", move || zero.clone(), f))
    }
}

impl<In: Send + 'static> Sink<In, Completion<Option<In>>> {
    /// First element, then cancel upstream; `None` if upstream completes empty.
    pub fn head() -> Self {
        Self::from_spec_mat(stages::sinks::head_spec::<In>())
    }
}

impl<In: Send + 'static> Sink<In, ElementStream<In>> {
    /// Lazy consumption handle; dropping it cancels upstream.
    pub fn stream() -> Self {
        Self::from_spec_mat(stages::sinks::stream_spec::<In>())
    }
}

impl<In: Send + 'static, Mat: 'static> Sink<In, Mat> {
    pub fn from_spec_mat(spec: StageSpec) -> Self
    where
        Mat: Send,
    {
        Self::single_stage(spec, mat::stage_value::<Mat>(0))
    }

    fn single_stage(spec: StageSpec, mat: MatFn<Mat>) -> Self {
        let mut builder = GraphBuilder::new();
        let stage = builder.add_stage(spec);
        Self::from_parts(builder, stage.inlet(0), mat)
    }

    pub(crate) fn from_parts(builder: GraphBuilder, inlet: InletRef, mat: MatFn<Mat>) -> Self {
        Self {
            builder,
            inlet,
            mat,
            _in: PhantomData,
        }
    }

    pub(crate) fn into_parts(self) -> (GraphBuilder, InletRef, MatFn<Mat>) {
        (self.builder, self.inlet, self.mat)
    }

    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        if let Some(name) = attributes.name() {
            self.builder.name_stage(self.inlet.stage(), name.to_string());
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

    pub fn map_materialized_value<M2, F>(self, f: F) -> Sink<In, M2>
    where
        M2: 'static,
        F: Fn(Mat) -> M2 + Send + Sync + 'static,
    {
        Sink::from_parts(self.builder, self.inlet, mat::map(self.mat, f))
    }
}
