// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Credit-based single-producer/single-consumer edge between two stages.
//!
//! The downstream side grants credit with [`EdgeReceiver::demand`]; the
//! upstream side may only [`EdgeSender::push`] while credit is positive, and
//! every push consumes one unit. Credit plus queued elements never exceed the
//! edge capacity, so a fast producer can never grow memory in front of a slow
//! consumer.
//!
//! ```text
//!   upstream                        downstream
//!   push(e)   ──► [ queue | credit ] ──►  pull()
//!   complete / fail ──────────────────►  (after queue drains)
//!   wait_demand() ◄──── demand(n) / cancel()
//! ```
//!
//! Every await point here is cancel-safe: dropping a pending `pull` or
//! `wait_demand` future never loses an element or a signal.

use std::any::Any;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::sync::Notify;

use crate::errors::{StageFault, TerminationError};

/// Type-erased element travelling along an edge.
pub type Element = Box<dyn Any + Send>;

/// What the downstream side got from a pull.
#[derive(Debug)]
pub enum EdgeSignal {
    Element(Element),
    Completed,
    Failed(TerminationError),
}

/// What the upstream side learnt while waiting for demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemandSignal {
    /// At least one unit of credit is available.
    Ready,
    /// Downstream cancelled; stop producing.
    Cancelled,
}

#[derive(Debug)]
enum UpstreamState {
    Open,
    Completed,
    Failed(TerminationError),
}

#[derive(Debug)]
struct EdgeState {
    queue: VecDeque<Element>,
    credit: usize,
    upstream: UpstreamState,
    downstream_cancelled: bool,
    pushed: u64,
    high_water: usize,
}

#[derive(Debug)]
pub(crate) struct EdgeShared {
    label: String,
    capacity: usize,
    state: Mutex<EdgeState>,
    to_downstream: Notify,
    to_upstream: Notify,
}

/// Point-in-time statistics of one edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EdgeSnapshot {
    pub label: String,
    pub capacity: usize,
    pub queued: usize,
    pub credit: usize,
    pub pushed: u64,
    /// Largest queue length ever observed.
    pub high_water: usize,
    pub upstream_terminated: bool,
    pub downstream_cancelled: bool,
}

impl EdgeShared {
    fn lock(&self) -> MutexGuard<'_, EdgeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn snapshot(&self) -> EdgeSnapshot {
        let state = self.lock();
        EdgeSnapshot {
            label: self.label.clone(),
            capacity: self.capacity,
            queued: state.queue.len(),
            credit: state.credit,
            pushed: state.pushed,
            high_water: state.high_water,
            upstream_terminated: !matches!(state.upstream, UpstreamState::Open),
            downstream_cancelled: state.downstream_cancelled,
        }
    }

    fn violation(&self, detail: &'static str) -> TerminationError {
        StageFault::ProtocolViolation {
            edge: self.label.clone(),
            detail,
        }
        .into()
    }
}

/// Create an edge with the given capacity. Capacity zero is raised to one.
pub(crate) fn edge(label: impl Into<String>, capacity: usize) -> (EdgeSender, EdgeReceiver) {
    let shared = Arc::new(EdgeShared {
        label: label.into(),
        capacity: capacity.max(1),
        state: Mutex::new(EdgeState {
            queue: VecDeque::new(),
            credit: 0,
            upstream: UpstreamState::Open,
            downstream_cancelled: false,
            pushed: 0,
            high_water: 0,
        }),
        to_downstream: Notify::new(),
        to_upstream: Notify::new(),
    });
    (
        EdgeSender {
            shared: shared.clone(),
            terminated: false,
        },
        EdgeReceiver {
            shared,
            cancelled: false,
        },
    )
}

/// Upstream half of an edge.
#[derive(Debug)]
pub struct EdgeSender {
    shared: Arc<EdgeShared>,
    terminated: bool,
}

impl EdgeSender {
    pub(crate) fn shared(&self) -> Arc<EdgeShared> {
        self.shared.clone()
    }

    pub fn label(&self) -> &str {
        &self.shared.label
    }

    /// Suspend until downstream has credit or has cancelled.
    pub async fn wait_demand(&self) -> DemandSignal {
        loop {
            let notified = self.shared.to_upstream.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if let Some(signal) = self.poll_demand() {
                return signal;
            }
            notified.await;
        }
    }

    /// Non-blocking variant of [`EdgeSender::wait_demand`].
    pub fn poll_demand(&self) -> Option<DemandSignal> {
        let state = self.shared.lock();
        if state.downstream_cancelled {
            Some(DemandSignal::Cancelled)
        } else if state.credit > 0 {
            Some(DemandSignal::Ready)
        } else {
            None
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.lock().downstream_cancelled
    }

    /// Resolves once downstream has cancelled.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.shared.to_upstream.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }

    /// Push one element, consuming one unit of credit.
    ///
    /// Pushing after downstream cancelled silently drops the element; pushing
    /// without credit or after a terminal signal is a protocol violation.
    pub fn push(&mut self, element: Element) -> Result<(), TerminationError> {
        if self.terminated {
            return Err(self.shared.violation("push after terminal signal"));
        }
        let mut state = self.shared.lock();
        if state.downstream_cancelled {
            return Ok(());
        }
        if state.credit == 0 {
            return Err(self.shared.violation("push without outstanding demand"));
        }
        state.credit -= 1;
        state.pushed += 1;
        state.queue.push_back(element);
        state.high_water = state.high_water.max(state.queue.len());
        drop(state);
        self.shared.to_downstream.notify_waiters();
        Ok(())
    }

    /// Signal completion; queued elements are still delivered first.
    pub fn complete(&mut self) {
        self.terminate(UpstreamState::Completed, false);
    }

    /// Signal failure; queued elements are still delivered first.
    pub fn fail(&mut self, error: TerminationError) {
        self.terminate(UpstreamState::Failed(error), false);
    }

    /// Signal failure and discard anything still queued.
    pub fn fail_now(&mut self, error: TerminationError) {
        self.terminate(UpstreamState::Failed(error), true);
    }

    fn terminate(&mut self, upstream: UpstreamState, discard: bool) {
        if self.terminated {
            return;
        }
        self.terminated = true;
        let mut state = self.shared.lock();
        if discard {
            state.queue.clear();
        }
        state.upstream = upstream;
        drop(state);
        self.shared.to_downstream.notify_waiters();
    }
}

impl Drop for EdgeSender {
    fn drop(&mut self) {
        if !self.terminated {
            self.fail(StageFault::AbruptTermination.into());
        }
    }
}

/// Downstream half of an edge.
#[derive(Debug)]
pub struct EdgeReceiver {
    shared: Arc<EdgeShared>,
    cancelled: bool,
}

impl EdgeReceiver {
    pub(crate) fn shared(&self) -> Arc<EdgeShared> {
        self.shared.clone()
    }

    pub fn label(&self) -> &str {
        &self.shared.label
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Grant up to `n` more elements of credit, bounded by free capacity.
    pub fn demand(&self, n: usize) {
        if n == 0 || self.cancelled {
            return;
        }
        let mut state = self.shared.lock();
        let free = self
            .shared
            .capacity
            .saturating_sub(state.queue.len() + state.credit);
        let granted = n.min(free);
        if granted == 0 {
            return;
        }
        state.credit += granted;
        drop(state);
        self.shared.to_upstream.notify_waiters();
    }

    /// Suspend until an element or a terminal signal is available.
    pub async fn pull(&self) -> EdgeSignal {
        loop {
            let notified = self.shared.to_downstream.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if let Some(signal) = self.try_pull() {
                return signal;
            }
            notified.await;
        }
    }

    /// Take the next element or terminal signal without waiting.
    pub fn try_pull(&self) -> Option<EdgeSignal> {
        let mut state = self.shared.lock();
        if let Some(element) = state.queue.pop_front() {
            return Some(EdgeSignal::Element(element));
        }
        match &state.upstream {
            UpstreamState::Open => None,
            UpstreamState::Completed => Some(EdgeSignal::Completed),
            UpstreamState::Failed(error) => Some(EdgeSignal::Failed(error.clone())),
        }
    }

    /// Withdraw all demand and ask upstream to stop producing.
    pub fn cancel(&mut self) {
        if self.cancelled {
            return;
        }
        self.cancelled = true;
        let mut state = self.shared.lock();
        state.downstream_cancelled = true;
        state.credit = 0;
        state.queue.clear();
        drop(state);
        self.shared.to_upstream.notify_waiters();
    }
}

impl Drop for EdgeReceiver {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn element(value: i32) -> Element {
        Box::new(value)
    }

    fn value(signal: EdgeSignal) -> i32 {
        match signal {
            EdgeSignal::Element(e) => *e.downcast::<i32>().unwrap(),
            other => panic!("expected element, got {:?}", other),
        }
    }

    #[test]
    fn push_without_credit_is_a_violation() {
        let (mut tx, _rx) = edge("a->b", 4);
        let err = tx.push(element(1)).unwrap_err();
        match err.runtime_error().and_then(|e| e.fault()) {
            Some(StageFault::ProtocolViolation { edge, .. }) => assert_eq!(edge, "a->b"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn credit_never_exceeds_capacity() {
        let (mut tx, rx) = edge("e", 2);
        rx.demand(10);
        assert_eq!(tx.shared().snapshot().credit, 2);
        tx.push(element(1)).unwrap();
        tx.push(element(2)).unwrap();
        assert!(tx.push(element(3)).is_err());
        // queue is full, more demand grants nothing until something is pulled
        rx.demand(1);
        assert_eq!(tx.poll_demand(), None);
        assert_eq!(value(rx.try_pull().unwrap()), 1);
        rx.demand(1);
        assert_eq!(tx.poll_demand(), Some(DemandSignal::Ready));
        assert_eq!(rx.shared().snapshot().high_water, 2);
    }

    #[test]
    fn queued_elements_drain_before_completion() {
        let (mut tx, rx) = edge("e", 4);
        rx.demand(4);
        tx.push(element(7)).unwrap();
        tx.complete();
        assert_eq!(value(rx.try_pull().unwrap()), 7);
        assert!(matches!(rx.try_pull(), Some(EdgeSignal::Completed)));
        // terminal signals are sticky
        assert!(matches!(rx.try_pull(), Some(EdgeSignal::Completed)));
    }

    #[test]
    fn fail_now_discards_queue() {
        let (mut tx, rx) = edge("e", 4);
        rx.demand(4);
        tx.push(element(1)).unwrap();
        tx.fail_now(TerminationError::Cancelled);
        assert!(matches!(
            rx.try_pull(),
            Some(EdgeSignal::Failed(TerminationError::Cancelled))
        ));
    }

    #[test]
    fn dropped_sender_fails_downstream() {
        let (tx, rx) = edge("e", 1);
        drop(tx);
        match rx.try_pull() {
            Some(EdgeSignal::Failed(err)) => assert!(matches!(
                err.runtime_error().and_then(|e| e.fault()),
                Some(StageFault::AbruptTermination)
            )),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn cancel_reaches_upstream_and_drops_later_pushes() {
        let (mut tx, mut rx) = edge("e", 2);
        rx.demand(2);
        rx.cancel();
        assert_eq!(tx.poll_demand(), Some(DemandSignal::Cancelled));
        assert!(tx.push(element(1)).is_ok());
        assert_eq!(tx.shared().snapshot().queued, 0);
    }

    #[tokio::test]
    async fn pull_wakes_on_push() {
        let (mut tx, rx) = edge("e", 1);
        rx.demand(1);
        let consumer = tokio::spawn(async move { value(rx.pull().await) });
        tokio::time::sleep(Duration::from_millis(10)).await;
        tx.push(element(42)).unwrap();
        assert_eq!(consumer.await.unwrap(), 42);
    }

    #[tokio::test]
    async fn wait_demand_wakes_on_demand() {
        let (tx, rx) = edge("e", 1);
        let producer = tokio::spawn(async move { tx.wait_demand().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        rx.demand(1);
        assert_eq!(producer.await.unwrap(), DemandSignal::Ready);
    }

    #[tokio::test]
    async fn dropped_pull_future_loses_nothing() {
        let (mut tx, rx) = edge("e", 1);
        rx.demand(1);
        let timed_out = tokio::time::timeout(Duration::from_millis(5), rx.pull()).await;
        assert!(timed_out.is_err());
        tx.push(element(5)).unwrap();
        assert_eq!(value(rx.pull().await), 5);
    }
}
