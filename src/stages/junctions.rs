// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Fan-in and fan-out junctions.
//!
//! Junctions are plain stages with more than one inlet or outlet; they use the
//! same credit protocol on every port as any other stage.

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;

use crate::engine::{DemandSignal, Pulled, StageContext};
use crate::errors::TerminationError;
use crate::graph::{ElementType, StageSpec};
use crate::traits::StageLogic;

/// Pairs the n-th elements of its two inputs.
pub struct Zip;

/// Combines the n-th elements of its two inputs with a function.
pub struct ZipWith;

/// Interleaves any number of inputs in arrival order.
pub struct Merge;

/// Emits every input element on each of its outputs.
pub struct Broadcast;

impl Zip {
    /// Two inlets `A` and `B`, one outlet `(A, B)`. Completes as soon as
    /// either input completes.
    pub fn spec<A, B>() -> StageSpec
    where
        A: Send + 'static,
        B: Send + 'static,
    {
        zip_spec("zip", |a: A, b: B| (a, b))
    }
}

impl ZipWith {
    pub fn spec<A, B, R, F>(f: F) -> StageSpec
    where
        A: Send + 'static,
        B: Send + 'static,
        R: Send + 'static,
        F: Fn(A, B) -> R + Send + Sync + 'static,
    {
        zip_spec("zip_with", f)
    }
}

impl Merge {
    /// `inputs` inlets of `T`, one outlet. Completes once every input has.
    pub fn spec<T: Send + 'static>(inputs: usize) -> StageSpec {
        StageSpec::from_logic(
            "merge",
            vec![ElementType::of::<T>(); inputs],
            vec![ElementType::of::<T>()],
            || MergeLogic::<T> {
                _element: PhantomData,
            },
        )
    }
}

impl Broadcast {
    /// One inlet, `outputs` outlets. An element is pulled only once every
    /// live output has demand, so the slowest consumer sets the pace.
    pub fn spec<T: Clone + Send + 'static>(outputs: usize) -> StageSpec {
        StageSpec::from_logic(
            "broadcast",
            vec![ElementType::of::<T>()],
            vec![ElementType::of::<T>(); outputs],
            || BroadcastLogic::<T> {
                _element: PhantomData,
            },
        )
    }
}

type Combine<A, B, R> = Arc<dyn Fn(A, B) -> R + Send + Sync>;

fn zip_spec<A, B, R, F>(label: &str, f: F) -> StageSpec
where
    A: Send + 'static,
    B: Send + 'static,
    R: Send + 'static,
    F: Fn(A, B) -> R + Send + Sync + 'static,
{
    let combine: Combine<A, B, R> = Arc::new(f);
    StageSpec::from_logic(
        label,
        vec![ElementType::of::<A>(), ElementType::of::<B>()],
        vec![ElementType::of::<R>()],
        move || ZipLogic {
            combine: combine.clone(),
        },
    )
}

struct ZipLogic<A, B, R> {
    combine: Combine<A, B, R>,
}

#[async_trait]
impl<A, B, R> StageLogic for ZipLogic<A, B, R>
where
    A: Send + 'static,
    B: Send + 'static,
    R: Send + 'static,
{
    async fn run(&mut self, ctx: &mut StageContext) -> Result<(), TerminationError> {
        loop {
            if ctx.wait_demand(0).await? == DemandSignal::Cancelled {
                return Ok(());
            }
            let mut left: Option<A> = None;
            let mut right: Option<B> = None;
            while left.is_none() || right.is_none() {
                tokio::select! {
                    pulled = ctx.pull::<A>(0), if left.is_none() => match pulled? {
                        Pulled::Element(a) => left = Some(a),
                        Pulled::Completed => return Ok(()),
                        Pulled::Failed(error) => return Err(error),
                    },
                    pulled = ctx.pull::<B>(1), if right.is_none() => match pulled? {
                        Pulled::Element(b) => right = Some(b),
                        Pulled::Completed => return Ok(()),
                        Pulled::Failed(error) => return Err(error),
                    },
                }
            }
            if let (Some(a), Some(b)) = (left, right) {
                ctx.push(0, (self.combine)(a, b))?;
            }
        }
    }
}

struct MergeLogic<T> {
    _element: PhantomData<fn() -> T>,
}

#[async_trait]
impl<T: Send + 'static> StageLogic for MergeLogic<T> {
    async fn run(&mut self, ctx: &mut StageContext) -> Result<(), TerminationError> {
        loop {
            if ctx.wait_demand(0).await? == DemandSignal::Cancelled {
                return Ok(());
            }
            loop {
                match ctx.pull_any::<T>().await? {
                    None => return Ok(()),
                    Some((_, Pulled::Element(element))) => {
                        ctx.push(0, element)?;
                        break;
                    }
                    Some((inlet, Pulled::Completed)) => ctx.cancel(inlet),
                    Some((_, Pulled::Failed(error))) => return Err(error),
                }
            }
        }
    }
}

struct BroadcastLogic<T> {
    _element: PhantomData<fn() -> T>,
}

#[async_trait]
impl<T: Clone + Send + 'static> StageLogic for BroadcastLogic<T> {
    async fn run(&mut self, ctx: &mut StageContext) -> Result<(), TerminationError> {
        loop {
            let mut ready = Vec::with_capacity(ctx.outlet_count());
            for outlet in 0..ctx.outlet_count() {
                if ctx.wait_demand(outlet).await? == DemandSignal::Ready {
                    ready.push(outlet);
                }
            }
            if ready.is_empty() {
                return Ok(());
            }
            let element = match ctx.pull::<T>(0).await? {
                Pulled::Element(element) => element,
                Pulled::Completed => return Ok(()),
                Pulled::Failed(error) => return Err(error),
            };
            if let Some((&last, rest)) = ready.split_last() {
                for &outlet in rest {
                    ctx.push(outlet, element.clone())?;
                }
                ctx.push(last, element)?;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::StageKind;

    #[test]
    fn junction_shapes() {
        let zip = Zip::spec::<u8, String>();
        assert_eq!(zip.kind(), StageKind::Junction);
        assert_eq!(zip.outlets(), &[ElementType::of::<(u8, String)>()]);

        let merge = Merge::spec::<u8>(3);
        assert_eq!(merge.inlets().len(), 3);
        assert_eq!(merge.label(), "merge");

        let broadcast = Broadcast::spec::<u8>(4);
        assert_eq!(broadcast.outlets().len(), 4);
        assert_eq!(broadcast.kind(), StageKind::Junction);
    }
}
