// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Externally held cancellation handles.
//!
//! A switch is a small piece of shared state: the trigger (set once) and a
//! token that wakes every kill-switch stage attached to it. The trigger is
//! recorded before the token fires, so a stage woken by the token always sees
//! how it was triggered. A stage attached after the fact finds the token
//! already cancelled and terminates immediately.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio_util::sync::CancellationToken;

use crate::errors::{StageRuntimeError, TerminationError};
use crate::graph::Flow;
use crate::observability::messages::cancellation::KillSwitchTriggered;
use crate::observability::messages::StructuredLog;
use crate::stages::kill_switch::kill_switch_spec;

/// How a switch was triggered.
#[derive(Debug, Clone)]
pub(crate) enum Trigger {
    /// Complete downstream, cancel upstream.
    Shutdown,
    /// Fail downstream with the error, cancel upstream.
    Abort(TerminationError),
}

#[derive(Debug)]
pub(crate) struct SwitchState {
    name: String,
    trigger: Mutex<Option<Trigger>>,
    token: CancellationToken,
    attached: AtomicUsize,
}

impl SwitchState {
    pub(crate) fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            trigger: Mutex::new(None),
            token: CancellationToken::new(),
            attached: AtomicUsize::new(0),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Option<Trigger>> {
        self.trigger.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn trigger(&self) -> Option<Trigger> {
        self.lock().clone()
    }

    pub(crate) fn attach(&self) {
        self.attached.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    pub(crate) async fn triggered(&self) {
        self.token.cancelled().await
    }

    /// First trigger wins; later calls are no-ops.
    fn fire(&self, trigger: Trigger) {
        let graceful = matches!(trigger, Trigger::Shutdown);
        {
            let mut slot = self.lock();
            if slot.is_some() {
                return;
            }
            *slot = Some(trigger);
        }
        KillSwitchTriggered {
            switch: &self.name,
            graceful,
            attached: self.attached.load(Ordering::Relaxed),
        }
        .log();
        self.token.cancel();
    }
}

/// Switch that controls every graph the flow from [`SharedKillSwitch::flow`]
/// is materialized into.
#[derive(Debug, Clone)]
pub struct SharedKillSwitch {
    state: Arc<SwitchState>,
}

impl SharedKillSwitch {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            state: SwitchState::new(name),
        }
    }

    pub fn name(&self) -> &str {
        &self.state.name
    }

    /// Pass-through flow attached to this switch. Its materialized value is
    /// the switch itself.
    pub fn flow<T: Send + 'static>(&self) -> Flow<T, T, SharedKillSwitch> {
        let switch = self.clone();
        Flow::from_spec_mat(kill_switch_spec::<T, _, _>(move || {
            (switch.state.clone(), switch.clone())
        }))
    }

    /// Complete downstream of every attachment point; elements already past
    /// them still drain.
    pub fn shutdown(&self) {
        self.state.fire(Trigger::Shutdown);
    }

    /// Fail downstream of every attachment point with `error`.
    pub fn abort(&self, error: StageRuntimeError) {
        self.state.fire(Trigger::Abort(error.into()));
    }

    /// `shutdown()` when graceful, otherwise fail with `Cancelled`.
    pub fn cancel(&self, graceful: bool) {
        cancel(&self.state, graceful);
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.is_triggered()
    }
}

/// Switch controlling exactly one materialization of a
/// [`KillSwitches::single`] flow.
#[derive(Debug, Clone)]
pub struct UniqueKillSwitch {
    state: Arc<SwitchState>,
}

impl UniqueKillSwitch {
    pub fn shutdown(&self) {
        self.state.fire(Trigger::Shutdown);
    }

    pub fn abort(&self, error: StageRuntimeError) {
        self.state.fire(Trigger::Abort(error.into()));
    }

    pub fn cancel(&self, graceful: bool) {
        cancel(&self.state, graceful);
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.is_triggered()
    }
}

fn cancel(state: &SwitchState, graceful: bool) {
    if graceful {
        state.fire(Trigger::Shutdown);
    } else {
        state.fire(Trigger::Abort(TerminationError::Cancelled));
    }
}

/// Constructors for kill-switch flows.
pub struct KillSwitches;

impl KillSwitches {
    /// Pass-through flow that materializes a fresh [`UniqueKillSwitch`].
    pub fn single<T: Send + 'static>() -> Flow<T, T, UniqueKillSwitch> {
        Flow::from_spec_mat(kill_switch_spec::<T, _, _>(|| {
            let state = SwitchState::new("unique");
            (state.clone(), UniqueKillSwitch { state })
        }))
    }

    pub fn shared(name: impl Into<String>) -> SharedKillSwitch {
        SharedKillSwitch::new(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_trigger_wins() {
        let switch = SharedKillSwitch::new("ingest");
        assert!(!switch.is_cancelled());
        switch.abort(StageRuntimeError::msg("boom"));
        switch.shutdown();
        assert!(switch.is_cancelled());
        assert!(matches!(switch.state.trigger(), Some(Trigger::Abort(_))));
    }

    #[test]
    fn abrupt_cancel_fails_with_cancelled() {
        let switch = SharedKillSwitch::new("ingest");
        switch.cancel(false);
        match switch.state.trigger() {
            Some(Trigger::Abort(error)) => assert!(error.is_cancelled()),
            other => panic!("unexpected trigger {:?}", other),
        }
    }
}
