// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Stages that turn an upstream failure into something other than a failure.

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::Attributes;
use crate::engine::{DemandSignal, MaterializedGraph, Pulled, StageContext};
use crate::errors::{StageRuntimeError, TerminationError};
use crate::graph::{ElementType, Source, StageSpec};
use crate::observability::messages::supervision::{RecoveredFromFailure, UpstreamReplaced};
use crate::observability::messages::StructuredLog;
use crate::traits::StageLogic;

type Fallback<T> = Arc<dyn Fn(&TerminationError) -> Option<T> + Send + Sync>;
type Replacement<T> = Arc<dyn Fn(&TerminationError) -> Option<Source<T>> + Send + Sync>;

/// Wait for demand, then pull one element or the upstream's terminal signal.
async fn next_for_demand<T: Send + 'static>(
    ctx: &StageContext,
) -> Result<Option<Pulled<T>>, TerminationError> {
    if ctx.wait_demand(0).await? == DemandSignal::Cancelled {
        return Ok(None);
    }
    ctx.pull::<T>(0).await.map(Some)
}

struct RecoverLogic<T> {
    fallback: Fallback<T>,
}

#[async_trait]
impl<T: Send + 'static> StageLogic for RecoverLogic<T> {
    async fn run(&mut self, ctx: &mut StageContext) -> Result<(), TerminationError> {
        loop {
            match next_for_demand::<T>(ctx).await? {
                None | Some(Pulled::Completed) => return Ok(()),
                Some(Pulled::Element(element)) => ctx.push(0, element)?,
                Some(Pulled::Failed(error)) => {
                    // Demand was already granted for the element that never came.
                    let fallback = (self.fallback)(&error);
                    RecoveredFromFailure {
                        stage: ctx.name(),
                        emitted_fallback: fallback.is_some(),
                        error: &error,
                    }
                    .log();
                    if let Some(element) = fallback {
                        ctx.push(0, element)?;
                    }
                    return Ok(());
                }
            }
        }
    }
}

pub(crate) fn recover_spec<T, F>(f: F) -> StageSpec
where
    T: Send + 'static,
    F: Fn(&TerminationError) -> Option<T> + Send + Sync + 'static,
{
    let fallback: Fallback<T> = Arc::new(f);
    StageSpec::from_logic(
        "recover",
        vec![ElementType::of::<T>()],
        vec![ElementType::of::<T>()],
        move || RecoverLogic {
            fallback: fallback.clone(),
        },
    )
}

struct RecoverWithRetriesLogic<T> {
    max_attempts: usize,
    replacement: Replacement<T>,
    replacements: Vec<MaterializedGraph>,
    _element: PhantomData<fn() -> T>,
}

impl<T: Send + 'static> RecoverWithRetriesLogic<T> {
    /// Materialize `source` on its own and splice its outlet into inlet 0.
    fn splice(&mut self, ctx: &mut StageContext, source: Source<T>) -> Result<(), TerminationError> {
        let (builder, outlet, _) = source.into_parts();
        let graph = builder.build();
        let (handle, _, rx) = ctx
            .materializer()
            .materialize_open(&graph, &Attributes::new(), outlet, ctx.buffer_size())
            .map_err(StageRuntimeError::new)?;
        ctx.splice_inlet(0, rx);
        self.replacements.push(handle);
        Ok(())
    }

    async fn drive(&mut self, ctx: &mut StageContext) -> Result<(), TerminationError> {
        let mut attempts = 0;
        loop {
            match next_for_demand::<T>(ctx).await? {
                None | Some(Pulled::Completed) => return Ok(()),
                Some(Pulled::Element(element)) => ctx.push(0, element)?,
                Some(Pulled::Failed(error)) => {
                    if attempts >= self.max_attempts {
                        return Err(error);
                    }
                    let Some(source) = (self.replacement)(&error) else {
                        return Err(error);
                    };
                    attempts += 1;
                    UpstreamReplaced {
                        stage: ctx.name(),
                        attempt: attempts,
                        remaining: self.max_attempts - attempts,
                        error: &error,
                    }
                    .log();
                    self.splice(ctx, source)?;
                }
            }
        }
    }
}

#[async_trait]
impl<T: Send + 'static> StageLogic for RecoverWithRetriesLogic<T> {
    async fn run(&mut self, ctx: &mut StageContext) -> Result<(), TerminationError> {
        let result = self.drive(ctx).await;
        if ctx.is_aborted() {
            for graph in &self.replacements {
                graph.abort();
            }
        }
        result
    }
}

pub(crate) fn recover_with_retries_spec<T, F>(max_attempts: usize, f: F) -> StageSpec
where
    T: Send + 'static,
    F: Fn(&TerminationError) -> Option<Source<T>> + Send + Sync + 'static,
{
    let replacement: Replacement<T> = Arc::new(f);
    StageSpec::from_logic(
        "recover_with_retries",
        vec![ElementType::of::<T>()],
        vec![ElementType::of::<T>()],
        move || RecoverWithRetriesLogic {
            max_attempts,
            replacement: replacement.clone(),
            replacements: Vec::new(),
            _element: PhantomData,
        },
    )
}
