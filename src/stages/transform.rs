// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! One-in/one-out element transforms.
//!
//! Every supervised transform is a [`TransformLogic`] around a step closure
//! produced by a factory. `Resume` drops the failing element and keeps the
//! current step; `Restart` drops it and asks the factory for a fresh step,
//! which discards whatever state the old one captured.

use std::error::Error;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;

use crate::engine::{DemandSignal, Pulled, StageContext, SupervisionDecision};
use crate::errors::{StageRuntimeError, TerminationError};
use crate::graph::{ElementType, StageSpec};
use crate::traits::StageLogic;

/// Per-element function: `Ok(None)` emits nothing for this element.
pub(crate) type Step<In, Out> = Box<dyn FnMut(In) -> Result<Option<Out>, StageRuntimeError> + Send>;

type StepFactory<In, Out> = Arc<dyn Fn() -> Step<In, Out> + Send + Sync>;

pub(crate) struct TransformLogic<In, Out> {
    factory: StepFactory<In, Out>,
    step: Step<In, Out>,
}

impl<In, Out> TransformLogic<In, Out> {
    fn new(factory: StepFactory<In, Out>) -> Self {
        let step = factory();
        Self { factory, step }
    }
}

#[async_trait]
impl<In, Out> StageLogic for TransformLogic<In, Out>
where
    In: Send + 'static,
    Out: Send + 'static,
{
    async fn run(&mut self, ctx: &mut StageContext) -> Result<(), TerminationError> {
        loop {
            if ctx.wait_demand(0).await? == DemandSignal::Cancelled {
                return Ok(());
            }
            loop {
                let element = match ctx.pull::<In>(0).await? {
                    Pulled::Element(element) => element,
                    Pulled::Completed => return Ok(()),
                    Pulled::Failed(error) => return Err(error),
                };
                match (self.step)(element) {
                    Ok(Some(out)) => {
                        ctx.push(0, out)?;
                        break;
                    }
                    Ok(None) => {}
                    Err(error) => match ctx.supervise(&error) {
                        SupervisionDecision::Resume => {}
                        SupervisionDecision::Restart => self.step = (self.factory)(),
                        SupervisionDecision::Stop => return Err(error.into()),
                    },
                }
            }
        }
    }
}

fn transform_spec<In, Out>(label: &str, factory: StepFactory<In, Out>) -> StageSpec
where
    In: Send + 'static,
    Out: Send + 'static,
{
    StageSpec::from_logic(
        label,
        vec![ElementType::of::<In>()],
        vec![ElementType::of::<Out>()],
        move || TransformLogic::new(factory.clone()),
    )
}

pub(crate) fn map_spec<In, Out, F>(f: F) -> StageSpec
where
    In: Send + 'static,
    Out: Send + 'static,
    F: Fn(In) -> Out + Send + Sync + 'static,
{
    let f = Arc::new(f);
    transform_spec(
        "map",
        Arc::new(move || -> Step<In, Out> {
            let f = f.clone();
            Box::new(move |element| Ok(Some(f(element))))
        }),
    )
}

pub(crate) fn try_map_spec<In, Out, E, F>(f: F) -> StageSpec
where
    In: Send + 'static,
    Out: Send + 'static,
    E: Error + Send + Sync + 'static,
    F: Fn(In) -> Result<Out, E> + Send + Sync + 'static,
{
    let f = Arc::new(f);
    transform_spec(
        "try_map",
        Arc::new(move || -> Step<In, Out> {
            let f = f.clone();
            Box::new(move |element| f(element).map(Some).map_err(StageRuntimeError::new))
        }),
    )
}

pub(crate) fn filter_spec<T, F>(predicate: F) -> StageSpec
where
    T: Send + 'static,
    F: Fn(&T) -> bool + Send + Sync + 'static,
{
    let predicate = Arc::new(predicate);
    transform_spec(
        "filter",
        Arc::new(move || -> Step<T, T> {
            let predicate = predicate.clone();
            Box::new(move |element| Ok(predicate(&element).then_some(element)))
        }),
    )
}

pub(crate) fn stateful_map_spec<In, Out, S, E, I, F>(init: I, f: F) -> StageSpec
where
    In: Send + 'static,
    Out: Send + 'static,
    S: Send + 'static,
    E: Error + Send + Sync + 'static,
    I: Fn() -> S + Send + Sync + 'static,
    F: Fn(&mut S, In) -> Result<Out, E> + Send + Sync + 'static,
{
    let f = Arc::new(f);
    transform_spec(
        "stateful_map",
        Arc::new(move || -> Step<In, Out> {
            let f = f.clone();
            let mut state = init();
            Box::new(move |element| {
                f(&mut state, element)
                    .map(Some)
                    .map_err(StageRuntimeError::new)
            })
        }),
    )
}

struct TakeLogic<T> {
    limit: usize,
    _element: PhantomData<fn() -> T>,
}

#[async_trait]
impl<T: Send + 'static> StageLogic for TakeLogic<T> {
    async fn run(&mut self, ctx: &mut StageContext) -> Result<(), TerminationError> {
        let mut remaining = self.limit;
        while remaining > 0 {
            if ctx.wait_demand(0).await? == DemandSignal::Cancelled {
                return Ok(());
            }
            match ctx.pull::<T>(0).await? {
                Pulled::Element(element) => {
                    ctx.push(0, element)?;
                    remaining -= 1;
                }
                Pulled::Completed => return Ok(()),
                Pulled::Failed(error) => return Err(error),
            }
        }
        Ok(())
    }
}

pub(crate) fn take_spec<T: Send + 'static>(n: usize) -> StageSpec {
    StageSpec::from_logic(
        "take",
        vec![ElementType::of::<T>()],
        vec![ElementType::of::<T>()],
        move || TakeLogic::<T> {
            limit: n,
            _element: PhantomData,
        },
    )
}
