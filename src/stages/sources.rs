// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use async_trait::async_trait;

use crate::engine::{DemandSignal, StageContext};
use crate::errors::{StageRuntimeError, TerminationError};
use crate::graph::{ElementType, StageSpec};
use crate::traits::StageLogic;

/// Emits one iterator item per unit of demand.
struct IterSource<I> {
    items: I,
}

#[async_trait]
impl<I> StageLogic for IterSource<I>
where
    I: Iterator + Send,
    I::Item: Send + 'static,
{
    async fn run(&mut self, ctx: &mut StageContext) -> Result<(), TerminationError> {
        loop {
            if ctx.wait_demand(0).await? == DemandSignal::Cancelled {
                return Ok(());
            }
            match self.items.next() {
                Some(item) => ctx.push(0, item)?,
                None => return Ok(()),
            }
        }
    }
}

struct FailedSource {
    error: StageRuntimeError,
}

#[async_trait]
impl StageLogic for FailedSource {
    async fn run(&mut self, _ctx: &mut StageContext) -> Result<(), TerminationError> {
        Err(self.error.clone().into())
    }
}

pub(crate) fn iter_spec<I>(label: &str, items: I) -> StageSpec
where
    I: IntoIterator + Clone + Send + Sync + 'static,
    I::IntoIter: Send + 'static,
    I::Item: Send + 'static,
{
    StageSpec::from_logic(
        label,
        Vec::new(),
        vec![ElementType::of::<I::Item>()],
        move || IterSource {
            items: items.clone().into_iter(),
        },
    )
}

pub(crate) fn failed_spec<T: Send + 'static>(error: StageRuntimeError) -> StageSpec {
    StageSpec::from_logic(
        "failed",
        Vec::new(),
        vec![ElementType::of::<T>()],
        move || FailedSource {
            error: error.clone(),
        },
    )
}
