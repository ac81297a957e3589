// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::config::Attributes;
use crate::engine::{MaterializedGraph, Materializer};
use crate::errors::MaterializeError;
use crate::graph::builder::{Graph, GraphBuilder};
use crate::graph::dsl::mat::{self, MatFn};

/// Closed graph plus the recipe for its materialized value.
pub struct RunnableGraph<Mat> {
    graph: Graph,
    mat: MatFn<Mat>,
}

impl<Mat> Clone for RunnableGraph<Mat> {
    fn clone(&self) -> Self {
        Self {
            graph: self.graph.clone(),
            mat: self.mat.clone(),
        }
    }
}

impl<Mat: 'static> RunnableGraph<Mat> {
    pub(crate) fn new(builder: GraphBuilder, mat: MatFn<Mat>) -> Self {
        Self {
            graph: builder.build(),
            mat,
        }
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Graph-level attributes, below anything set on stages or composites.
    pub fn with_attributes(self, attributes: Attributes) -> Self {
        Self {
            graph: self.graph.with_attributes(attributes),
            mat: self.mat,
        }
    }

    pub fn map_materialized_value<M2, F>(self, f: F) -> RunnableGraph<M2>
    where
        M2: 'static,
        F: Fn(Mat) -> M2 + Send + Sync + 'static,
    {
        RunnableGraph {
            graph: self.graph,
            mat: mat::map(self.mat, f),
        }
    }

    pub fn run(&self, materializer: &Materializer) -> Result<Mat, MaterializeError> {
        self.run_with_attributes(materializer, &Attributes::new())
    }

    pub fn run_with_attributes(
        &self,
        materializer: &Materializer,
        attributes: &Attributes,
    ) -> Result<Mat, MaterializeError> {
        self.materialize(materializer, attributes).map(|(_, value)| value)
    }

    /// Like [`RunnableGraph::run`] but also returns the live graph handle.
    pub fn materialize(
        &self,
        materializer: &Materializer,
        attributes: &Attributes,
    ) -> Result<(MaterializedGraph, Mat), MaterializeError> {
        let (graph, mut values) = materializer.materialize(&self.graph, attributes)?;
        let value = (self.mat)(&mut values, 0)?;
        Ok((graph, value))
    }
}
