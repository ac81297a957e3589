// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;

use crate::engine::kill_switch::{SwitchState, Trigger};
use crate::engine::{DemandSignal, Pulled, StageContext};
use crate::errors::TerminationError;
use crate::graph::{ElementType, StageSpec};
use crate::traits::StageLogic;

/// Pass-through stage that terminates when its switch is triggered.
struct KillSwitchLogic<T> {
    switch: Arc<SwitchState>,
    _element: PhantomData<fn() -> T>,
}

impl<T: Send + 'static> KillSwitchLogic<T> {
    /// Relay elements; returns `true` once the switch fires and `false` when
    /// the stream ended on its own.
    async fn relay(&self, ctx: &mut StageContext) -> Result<bool, TerminationError> {
        loop {
            let demand = tokio::select! {
                biased;
                _ = self.switch.triggered() => return Ok(true),
                demand = ctx.wait_demand(0) => demand?,
            };
            if demand == DemandSignal::Cancelled {
                return Ok(false);
            }
            let pulled = tokio::select! {
                biased;
                _ = self.switch.triggered() => return Ok(true),
                pulled = ctx.pull::<T>(0) => pulled?,
            };
            match pulled {
                Pulled::Element(element) => ctx.push(0, element)?,
                Pulled::Completed => return Ok(false),
                Pulled::Failed(error) => return Err(error),
            }
        }
    }
}

#[async_trait]
impl<T: Send + 'static> StageLogic for KillSwitchLogic<T> {
    async fn run(&mut self, ctx: &mut StageContext) -> Result<(), TerminationError> {
        if !self.relay(ctx).await? {
            return Ok(());
        }
        ctx.cancel(0);
        match self.switch.trigger() {
            Some(Trigger::Abort(error)) => {
                ctx.fail_now(0, error.clone());
                Err(error)
            }
            Some(Trigger::Shutdown) | None => {
                ctx.complete(0);
                Ok(())
            }
        }
    }
}

/// Kill-switch flow stage; `attach` yields the switch state and the
/// materialized handle for each materialization.
pub(crate) fn kill_switch_spec<T, M, F>(attach: F) -> StageSpec
where
    T: Send + 'static,
    M: Send + 'static,
    F: Fn() -> (Arc<SwitchState>, M) + Send + Sync + 'static,
{
    StageSpec::with_value(
        "kill_switch",
        vec![ElementType::of::<T>()],
        vec![ElementType::of::<T>()],
        move || {
            let (switch, handle) = attach();
            switch.attach();
            (
                KillSwitchLogic::<T> {
                    switch,
                    _element: PhantomData,
                },
                handle,
            )
        },
    )
}
