// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Per-stage execution context.
//!
//! A [`StageContext`] is the only thing a running stage touches: it owns the
//! stage's edge halves, its supervisor and the graph abort token. Every
//! suspension point (`pull`, `pull_any`, `wait_demand`) also watches the abort
//! token so a cancelled graph is observed at the next await. Pulls also watch
//! the stage's outlets: once every remaining downstream has cancelled, a
//! waiting pull reads as completion so the cancel keeps travelling upstream
//! even when no element is on its way.

use std::any::type_name;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};

use futures::future::select_all;
use tokio_util::sync::CancellationToken;

use crate::engine::edge::{DemandSignal, EdgeReceiver, EdgeSender, EdgeSignal};
use crate::engine::materializer::Materializer;
use crate::engine::supervision::{SupervisionDecision, Supervisor};
use crate::errors::{StageFault, StageRuntimeError, TerminationError};
use crate::traits::{DemandMode, StageKind};

/// Result of pulling from an inlet.
#[derive(Debug)]
pub enum Pulled<T> {
    Element(T),
    Completed,
    Failed(TerminationError),
}

impl<T> Pulled<T> {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Pulled::Element(_))
    }
}

pub(crate) struct ContextParts {
    pub graph_id: u64,
    pub index: usize,
    pub name: String,
    pub kind: StageKind,
    pub inlets: Vec<Option<EdgeReceiver>>,
    pub outlets: Vec<Option<EdgeSender>>,
    pub supervisor: Supervisor,
    pub abort: CancellationToken,
    pub materializer: Materializer,
    pub buffer_size: usize,
    pub fairness_budget: u32,
}

/// Handle through which a stage's logic talks to its neighbours.
pub struct StageContext {
    graph_id: u64,
    index: usize,
    name: String,
    kind: StageKind,
    inlets: Vec<Option<EdgeReceiver>>,
    outlets: Vec<Option<EdgeSender>>,
    supervisor: Supervisor,
    abort: CancellationToken,
    materializer: Materializer,
    buffer_size: usize,
    fairness_budget: u32,
    demand_mode: DemandMode,
    steps: AtomicU32,
    elements: AtomicU64,
    rotation: AtomicUsize,
    saw_cancel: AtomicBool,
}

impl StageContext {
    pub(crate) fn new(parts: ContextParts) -> Self {
        Self {
            graph_id: parts.graph_id,
            index: parts.index,
            name: parts.name,
            kind: parts.kind,
            inlets: parts.inlets,
            outlets: parts.outlets,
            supervisor: parts.supervisor,
            abort: parts.abort,
            materializer: parts.materializer,
            buffer_size: parts.buffer_size,
            fairness_budget: parts.fairness_budget,
            demand_mode: DemandMode::Prefetch,
            steps: AtomicU32::new(0),
            elements: AtomicU64::new(0),
            rotation: AtomicUsize::new(0),
            saw_cancel: AtomicBool::new(false),
        }
    }

    pub fn graph_id(&self) -> u64 {
        self.graph_id
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> StageKind {
        self.kind
    }

    /// Capacity of the edges feeding this stage.
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub fn materializer(&self) -> &Materializer {
        &self.materializer
    }

    pub fn inlet_count(&self) -> usize {
        self.inlets.len()
    }

    pub fn outlet_count(&self) -> usize {
        self.outlets.len()
    }

    pub fn is_inlet_open(&self, inlet: usize) -> bool {
        matches!(self.inlets.get(inlet), Some(Some(_)))
    }

    pub fn is_outlet_open(&self, outlet: usize) -> bool {
        matches!(self.outlets.get(outlet), Some(Some(tx)) if !tx.is_cancelled())
    }

    /// Indices of outlets whose downstream has not cancelled.
    pub fn live_outlets(&self) -> Vec<usize> {
        (0..self.outlets.len())
            .filter(|&i| self.is_outlet_open(i))
            .collect()
    }

    pub fn elements_processed(&self) -> u64 {
        self.elements.load(Ordering::Relaxed)
    }

    pub fn is_aborted(&self) -> bool {
        self.abort.is_cancelled()
    }

    /// Resolves once the graph has been aborted.
    pub async fn aborted(&self) {
        self.abort.cancelled().await
    }

    /// Resolves once every open outlet's downstream has cancelled.
    ///
    /// Never resolves for a stage without open outlets. Records the cancel so
    /// the stage reports itself as stopped by downstream.
    pub async fn downstream_cancelled(&self) {
        let open: Vec<&EdgeSender> = self.outlets.iter().flatten().collect();
        if open.is_empty() {
            return std::future::pending().await;
        }
        for tx in open {
            tx.cancelled().await;
        }
        self.saw_cancel.store(true, Ordering::Relaxed);
    }

    /// Initial demand: fill every inlet up to its capacity.
    pub(crate) fn start(&self) {
        for rx in self.inlets.iter().flatten() {
            rx.demand(rx.capacity());
        }
    }

    /// Adopt the stage's demand mode; only prefetching stages get initial credit.
    pub(crate) fn begin(&mut self, mode: DemandMode) {
        self.demand_mode = mode;
        if mode == DemandMode::Prefetch {
            self.start();
        }
    }

    /// Grant `n` more elements of credit on `inlet`.
    pub fn request(&self, inlet: usize, n: usize) {
        if let Some(rx) = self.inlets.get(inlet).and_then(Option::as_ref) {
            rx.demand(n);
        }
    }

    /// Wait for the next element or terminal signal on `inlet`.
    ///
    /// Each element taken re-grants one unit of credit unless the stage
    /// demands on request. A closed or unknown
    /// inlet reads as `Completed`, and so does a wait cut short by every
    /// downstream cancelling.
    pub async fn pull<T: Send + 'static>(
        &self,
        inlet: usize,
    ) -> Result<Pulled<T>, TerminationError> {
        let Some(rx) = self.inlets.get(inlet).and_then(Option::as_ref) else {
            return Ok(Pulled::Completed);
        };
        let signal = tokio::select! {
            biased;
            _ = self.abort.cancelled() => return Err(TerminationError::Cancelled),
            _ = self.downstream_cancelled() => return Ok(Pulled::Completed),
            signal = rx.pull() => signal,
        };
        self.accept(rx, signal)
    }

    /// Wait for whichever open inlet has something first.
    ///
    /// The starting inlet rotates on every call so a busy input cannot starve
    /// the others. Returns `None` once no inlet is open or every downstream
    /// has cancelled.
    pub async fn pull_any<T: Send + 'static>(
        &self,
    ) -> Result<Option<(usize, Pulled<T>)>, TerminationError> {
        let open: Vec<(usize, &EdgeReceiver)> = self
            .inlets
            .iter()
            .enumerate()
            .filter_map(|(i, rx)| rx.as_ref().map(|rx| (i, rx)))
            .collect();
        if open.is_empty() {
            return Ok(None);
        }
        if self.abort.is_cancelled() {
            return Err(TerminationError::Cancelled);
        }
        let start = self.rotation.fetch_add(1, Ordering::Relaxed) % open.len();
        for k in 0..open.len() {
            let (i, rx) = open[(start + k) % open.len()];
            if let Some(signal) = rx.try_pull() {
                return self.accept(rx, signal).map(|p| Some((i, p)));
            }
        }
        let pulls = open
            .iter()
            .map(|&(i, rx)| Box::pin(async move { (i, rx.pull().await) }));
        let ((i, signal), _, _) = tokio::select! {
            biased;
            _ = self.abort.cancelled() => return Err(TerminationError::Cancelled),
            _ = self.downstream_cancelled() => return Ok(None),
            ready = select_all(pulls) => ready,
        };
        match open.iter().find(|(j, _)| *j == i) {
            Some(&(_, rx)) => self.accept(rx, signal).map(|p| Some((i, p))),
            None => Ok(Some((i, Pulled::Completed))),
        }
    }

    fn accept<T: Send + 'static>(
        &self,
        rx: &EdgeReceiver,
        signal: EdgeSignal,
    ) -> Result<Pulled<T>, TerminationError> {
        match signal {
            EdgeSignal::Element(element) => {
                if self.demand_mode == DemandMode::Prefetch {
                    rx.demand(1);
                }
                self.elements.fetch_add(1, Ordering::Relaxed);
                match element.downcast::<T>() {
                    Ok(value) => Ok(Pulled::Element(*value)),
                    Err(_) => Err(StageFault::ElementTypeMismatch {
                        stage: self.name.clone(),
                        expected: type_name::<T>(),
                    }
                    .into()),
                }
            }
            EdgeSignal::Completed => Ok(Pulled::Completed),
            EdgeSignal::Failed(error) => Ok(Pulled::Failed(error)),
        }
    }

    /// Suspend until `outlet` has credit or its downstream cancelled.
    ///
    /// Every call counts against the fairness budget; once it is spent the
    /// stage yields to the worker pool before continuing.
    pub async fn wait_demand(&self, outlet: usize) -> Result<DemandSignal, TerminationError> {
        self.tick().await;
        let Some(tx) = self.outlets.get(outlet).and_then(Option::as_ref) else {
            return Ok(DemandSignal::Cancelled);
        };
        let signal = tokio::select! {
            biased;
            _ = self.abort.cancelled() => return Err(TerminationError::Cancelled),
            signal = tx.wait_demand() => signal,
        };
        if signal == DemandSignal::Cancelled {
            self.saw_cancel.store(true, Ordering::Relaxed);
        }
        Ok(signal)
    }

    /// Non-blocking demand check.
    pub fn has_demand(&self, outlet: usize) -> bool {
        matches!(
            self.outlets.get(outlet).and_then(Option::as_ref).and_then(EdgeSender::poll_demand),
            Some(DemandSignal::Ready)
        )
    }

    async fn tick(&self) {
        if self.fairness_budget == 0 {
            return;
        }
        let steps = self.steps.fetch_add(1, Ordering::Relaxed) + 1;
        if steps % self.fairness_budget == 0 {
            tokio::task::yield_now().await;
        }
    }

    /// Push one element; requires outstanding demand on `outlet`.
    pub fn push<T: Send + 'static>(&mut self, outlet: usize, value: T) -> Result<(), TerminationError> {
        match self.outlets.get_mut(outlet).and_then(Option::as_mut) {
            Some(tx) => tx.push(Box::new(value)),
            None => Err(StageFault::ProtocolViolation {
                edge: format!("{}.out({})", self.name, outlet),
                detail: "push on a terminated outlet",
            }
            .into()),
        }
    }

    pub fn complete(&mut self, outlet: usize) {
        if let Some(mut tx) = self.outlets.get_mut(outlet).and_then(Option::take) {
            tx.complete();
        }
    }

    pub fn fail(&mut self, outlet: usize, error: TerminationError) {
        if let Some(mut tx) = self.outlets.get_mut(outlet).and_then(Option::take) {
            tx.fail(error);
        }
    }

    /// Fail `outlet` and drop whatever is still queued on it.
    pub fn fail_now(&mut self, outlet: usize, error: TerminationError) {
        if let Some(mut tx) = self.outlets.get_mut(outlet).and_then(Option::take) {
            tx.fail_now(error);
        }
    }

    /// Withdraw demand from `inlet` and ask its upstream to stop.
    pub fn cancel(&mut self, inlet: usize) {
        if let Some(mut rx) = self.inlets.get_mut(inlet).and_then(Option::take) {
            rx.cancel();
        }
    }

    pub fn cancel_all(&mut self) {
        for i in 0..self.inlets.len() {
            self.cancel(i);
        }
    }

    /// Replace the upstream of `inlet` with a freshly materialized receiver.
    pub(crate) fn splice_inlet(&mut self, inlet: usize, rx: EdgeReceiver) {
        rx.demand(rx.capacity());
        if let Some(slot) = self.inlets.get_mut(inlet) {
            if let Some(mut old) = slot.replace(rx) {
                old.cancel();
            }
        }
    }

    /// Ask this stage's decider what to do about `error`.
    pub fn supervise(&mut self, error: &StageRuntimeError) -> SupervisionDecision {
        self.supervisor.on_failure(error)
    }

    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    /// Whether this stage stopped because its downstream went away.
    pub(crate) fn stopped_by_downstream(&self) -> bool {
        self.saw_cancel.load(Ordering::Relaxed)
    }

    /// Deliver the terminal signal implied by `result` to every open port.
    pub(crate) fn finish(&mut self, result: &Result<(), TerminationError>) {
        for slot in self.outlets.iter_mut() {
            if let Some(mut tx) = slot.take() {
                match result {
                    Ok(()) => tx.complete(),
                    Err(error) => tx.fail(error.clone()),
                }
            }
        }
        self.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::config::EngineConfig;
    use crate::engine::edge::edge;
    use crate::engine::supervision::Decider;
    use crate::engine::{MaterializerSettings, Scheduler};

    fn context(
        inlets: Vec<Option<EdgeReceiver>>,
        outlets: Vec<Option<EdgeSender>>,
        abort: CancellationToken,
    ) -> StageContext {
        let config = EngineConfig::default();
        let scheduler = Scheduler::from_current(&config.scheduler).unwrap();
        StageContext::new(ContextParts {
            graph_id: 1,
            index: 0,
            name: "probe".into(),
            kind: StageKind::Junction,
            inlets,
            outlets,
            supervisor: Supervisor::new("probe", Decider::stopping()),
            abort,
            materializer: Materializer::new(scheduler, MaterializerSettings::from(&config)),
            buffer_size: 2,
            fairness_budget: 4,
        })
    }

    #[tokio::test]
    async fn pull_regrants_credit_per_element() {
        let (mut tx, rx) = edge("up->probe", 2);
        let ctx = context(vec![Some(rx)], vec![], CancellationToken::new());
        ctx.start();
        tx.push(Box::new(1u8)).unwrap();
        tx.push(Box::new(2u8)).unwrap();
        assert_eq!(tx.poll_demand(), None);
        assert!(matches!(ctx.pull::<u8>(0).await, Ok(Pulled::Element(1))));
        assert_eq!(tx.poll_demand(), Some(DemandSignal::Ready));
    }

    #[tokio::test]
    async fn on_request_stage_grants_only_what_it_asks_for() {
        let (mut tx, rx) = edge("up->probe", 4);
        let mut ctx = context(vec![Some(rx)], vec![], CancellationToken::new());
        ctx.begin(DemandMode::OnRequest);
        assert_eq!(tx.poll_demand(), None);
        ctx.request(0, 1);
        tx.push(Box::new(5u8)).unwrap();
        assert!(matches!(ctx.pull::<u8>(0).await, Ok(Pulled::Element(5))));
        assert_eq!(tx.poll_demand(), None);
    }

    #[tokio::test]
    async fn wrong_element_type_is_a_fault() {
        let (mut tx, rx) = edge("up->probe", 1);
        let ctx = context(vec![Some(rx)], vec![], CancellationToken::new());
        ctx.start();
        tx.push(Box::new("text")).unwrap();
        let err = ctx.pull::<u64>(0).await.unwrap_err();
        assert!(matches!(
            err.runtime_error().and_then(|e| e.fault()),
            Some(StageFault::ElementTypeMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn abort_interrupts_pull() {
        let abort = CancellationToken::new();
        let (_tx, rx) = edge("up->probe", 1);
        let ctx = context(vec![Some(rx)], vec![], abort.clone());
        abort.cancel();
        assert!(matches!(
            ctx.pull::<u8>(0).await,
            Err(TerminationError::Cancelled)
        ));
    }

    #[tokio::test]
    async fn pull_any_sees_every_inlet() {
        let (mut a, ra) = edge("a->probe", 1);
        let (mut b, rb) = edge("b->probe", 1);
        let ctx = context(vec![Some(ra), Some(rb)], vec![], CancellationToken::new());
        ctx.start();
        a.push(Box::new(1i32)).unwrap();
        b.push(Box::new(2i32)).unwrap();
        let mut seen = Vec::new();
        for _ in 0..2 {
            if let Some((_, Pulled::Element(v))) = ctx.pull_any::<i32>().await.unwrap() {
                seen.push(v);
            }
        }
        seen.sort();
        assert_eq!(seen, vec![1, 2]);
    }

    #[tokio::test]
    async fn downstream_cancel_interrupts_idle_pull() {
        let (_up, rx) = edge("up->probe", 1);
        let (tx, mut down) = edge("probe->down", 1);
        let ctx = context(vec![Some(rx)], vec![Some(tx)], CancellationToken::new());
        ctx.start();
        let canceller = tokio::spawn(async move {
            tokio::task::yield_now().await;
            down.cancel();
        });
        let pulled = tokio::time::timeout(Duration::from_secs(1), ctx.pull::<u8>(0))
            .await
            .expect("pull stayed blocked after downstream cancelled");
        assert!(matches!(pulled, Ok(Pulled::Completed)));
        assert!(ctx.stopped_by_downstream());
        canceller.await.unwrap();
    }

    #[tokio::test]
    async fn pull_without_outlets_ignores_downstream() {
        let (mut up, rx) = edge("up->sink", 1);
        let ctx = context(vec![Some(rx)], vec![], CancellationToken::new());
        ctx.start();
        up.push(Box::new(3u8)).unwrap();
        assert!(matches!(ctx.pull::<u8>(0).await, Ok(Pulled::Element(3))));
        assert!(!ctx.stopped_by_downstream());
    }

    #[tokio::test]
    async fn finish_fails_open_outlets() {
        let (tx, rx) = edge("probe->down", 1);
        let mut ctx = context(vec![], vec![Some(tx)], CancellationToken::new());
        ctx.finish(&Err(StageRuntimeError::msg("boom").into()));
        match rx.try_pull() {
            Some(EdgeSignal::Failed(err)) => assert_eq!(err.to_string(), "boom"),
            other => panic!("unexpected {:?}", other),
        }
    }
}
