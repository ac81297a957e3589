// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Worker pool that drives materialized stages.
//!
//! Every stage runs as its own tokio task on the scheduler's runtime, so a
//! stage's state machine is never entered by two threads at once while
//! different stages progress in parallel across the multi-threaded pool.
//! The scheduler keeps an arena of per-graph monitors (stage records indexed
//! by stage position) and a root cancellation token that `shutdown` trips for
//! every live graph.

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use futures::FutureExt;
use serde::Serialize;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::config::SchedulerConfig;
use crate::engine::context::StageContext;
use crate::engine::edge::{EdgeShared, EdgeSnapshot};
use crate::errors::{SchedulerError, StageRuntimeError, TerminationError};
use crate::observability::messages::engine::{GraphTerminated, SchedulerShutdown, SchedulerStarted};
use crate::observability::messages::stage::{StageStarted, StageTerminated};
use crate::observability::messages::StructuredLog;
use crate::traits::{StageKind, StageLogic};

/// Lifecycle state of one stage instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageState {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl StageState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StageState::Completed | StageState::Failed | StageState::Cancelled
        )
    }

    fn as_str(&self) -> &'static str {
        match self {
            StageState::Pending => "pending",
            StageState::Running => "running",
            StageState::Completed => "completed",
            StageState::Failed => "failed",
            StageState::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StageSnapshot {
    pub index: usize,
    pub name: String,
    pub kind: StageKind,
    pub state: StageState,
    pub elements: u64,
    pub failure: Option<String>,
}

/// Point-in-time view of a materialized graph.
#[derive(Debug, Clone, Serialize)]
pub struct GraphSnapshot {
    pub graph_id: u64,
    pub terminated: bool,
    pub stages: Vec<StageSnapshot>,
    pub edges: Vec<EdgeSnapshot>,
}

impl GraphSnapshot {
    pub fn stage(&self, name: &str) -> Option<&StageSnapshot> {
        self.stages.iter().find(|s| s.name == name)
    }

    pub fn edge(&self, label: &str) -> Option<&EdgeSnapshot> {
        self.edges.iter().find(|e| e.label == label)
    }
}

/// Shared record of one materialized graph's stages.
#[derive(Debug)]
pub(crate) struct GraphMonitor {
    id: u64,
    started: Instant,
    stages: Vec<Mutex<StageSnapshot>>,
    edges: Vec<Arc<EdgeShared>>,
    running: AtomicUsize,
    done: Notify,
}

impl GraphMonitor {
    pub(crate) fn new(id: u64, stages: Vec<StageSnapshot>, edges: Vec<Arc<EdgeShared>>) -> Self {
        let count = stages.len();
        Self {
            id,
            started: Instant::now(),
            stages: stages.into_iter().map(Mutex::new).collect(),
            edges,
            running: AtomicUsize::new(count),
            done: Notify::new(),
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    fn record(&self, index: usize) -> Option<MutexGuard<'_, StageSnapshot>> {
        self.stages
            .get(index)
            .map(|m| m.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn mark_running(&self, index: usize) {
        if let Some(mut record) = self.record(index) {
            record.state = StageState::Running;
        }
    }

    /// Returns true when this was the last stage still running.
    fn mark_terminated(
        &self,
        index: usize,
        state: StageState,
        elements: u64,
        failure: Option<String>,
    ) -> bool {
        if let Some(mut record) = self.record(index) {
            record.state = state;
            record.elements = elements;
            record.failure = failure;
        }
        let last = self.running.fetch_sub(1, Ordering::AcqRel) == 1;
        if last {
            self.done.notify_waiters();
        }
        last
    }

    pub(crate) fn is_terminated(&self) -> bool {
        self.running.load(Ordering::Acquire) == 0
    }

    pub(crate) async fn terminated(&self) {
        loop {
            let notified = self.done.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_terminated() {
                return;
            }
            notified.await;
        }
    }

    pub(crate) fn snapshot(&self) -> GraphSnapshot {
        GraphSnapshot {
            graph_id: self.id,
            terminated: self.is_terminated(),
            stages: (0..self.stages.len())
                .filter_map(|i| self.record(i).map(|r| r.clone()))
                .collect(),
            edges: self.edges.iter().map(|e| e.snapshot()).collect(),
        }
    }
}

struct SchedulerInner {
    handle: Handle,
    runtime: Mutex<Option<Runtime>>,
    root: CancellationToken,
    graphs: Mutex<HashMap<u64, Arc<GraphMonitor>>>,
    next_graph: AtomicU64,
    worker_threads: usize,
    fairness_budget: u32,
    shutdown_timeout: Duration,
    shut_down: AtomicBool,
}

impl SchedulerInner {
    fn graphs(&self) -> MutexGuard<'_, HashMap<u64, Arc<GraphMonitor>>> {
        self.graphs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for SchedulerInner {
    fn drop(&mut self) {
        self.root.cancel();
        let runtime = self
            .runtime
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(runtime) = runtime {
            runtime.shutdown_background();
        }
    }
}

/// Explicit, process-wide handle to the worker pool.
///
/// Cheap to clone; all clones drive the same pool. Nothing is global: a
/// scheduler exists only once started and is passed to every materializer
/// that should use it.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("worker_threads", &self.inner.worker_threads)
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

impl Scheduler {
    /// Start an owned multi-threaded worker pool.
    pub fn start(config: &SchedulerConfig) -> Result<Self, SchedulerError> {
        let worker_threads = config.get_worker_threads().max(1);
        let runtime = Builder::new_multi_thread()
            .worker_threads(worker_threads)
            .thread_name("streamwood-worker")
            .enable_all()
            .build()?;
        let handle = runtime.handle().clone();
        Ok(Self::with_handle(handle, Some(runtime), worker_threads, config))
    }

    /// Schedule onto the tokio runtime the caller is running in.
    pub fn from_current(config: &SchedulerConfig) -> Result<Self, SchedulerError> {
        let handle = Handle::try_current().map_err(|_| SchedulerError::NoCurrentRuntime)?;
        let worker_threads = handle.metrics().num_workers();
        Ok(Self::with_handle(handle, None, worker_threads, config))
    }

    fn with_handle(
        handle: Handle,
        runtime: Option<Runtime>,
        worker_threads: usize,
        config: &SchedulerConfig,
    ) -> Self {
        SchedulerStarted {
            worker_threads,
            owned_runtime: runtime.is_some(),
        }
        .log();
        Self {
            inner: Arc::new(SchedulerInner {
                handle,
                runtime: Mutex::new(runtime),
                root: CancellationToken::new(),
                graphs: Mutex::new(HashMap::new()),
                next_graph: AtomicU64::new(1),
                worker_threads,
                fairness_budget: config.get_fairness_budget(),
                shutdown_timeout: config.get_shutdown_timeout(),
                shut_down: AtomicBool::new(false),
            }),
        }
    }

    pub fn handle(&self) -> &Handle {
        &self.inner.handle
    }

    pub fn worker_threads(&self) -> usize {
        self.inner.worker_threads
    }

    pub fn fairness_budget(&self) -> u32 {
        self.inner.fairness_budget
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shut_down.load(Ordering::Acquire)
    }

    /// Ids of graphs with at least one stage still running.
    pub fn active_graphs(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.inner.graphs().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Drive `future` to completion on the worker pool from synchronous code.
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.inner.handle.block_on(future)
    }

    /// Cancel every live graph and stop the owned worker pool, if any.
    ///
    /// Later materializations fail with `SchedulerShutdown`.
    pub fn shutdown(&self) {
        if self.inner.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        SchedulerShutdown {
            active_graphs: self.inner.graphs().len(),
        }
        .log();
        self.inner.root.cancel();
        let runtime = self
            .inner
            .runtime
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(runtime) = runtime {
            if Handle::try_current().is_ok() {
                runtime.shutdown_background();
            } else {
                runtime.shutdown_timeout(self.inner.shutdown_timeout);
            }
        }
    }

    pub(crate) fn next_graph_id(&self) -> u64 {
        self.inner.next_graph.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn graph_token(&self) -> CancellationToken {
        self.inner.root.child_token()
    }

    pub(crate) fn register(&self, monitor: Arc<GraphMonitor>) {
        self.inner.graphs().insert(monitor.id(), monitor);
    }

    /// Run one stage to its terminal state on the worker pool.
    pub(crate) fn spawn_stage(
        &self,
        monitor: Arc<GraphMonitor>,
        mut logic: Box<dyn StageLogic>,
        mut ctx: StageContext,
    ) {
        let inner = self.inner.clone();
        let span = StageStarted {
            graph_id: monitor.id(),
            stage: ctx.name(),
            kind: ctx.kind().as_str(),
        }
        .span("stage_task");
        let task = async move {
            let index = ctx.index();
            monitor.mark_running(index);
            StageStarted {
                graph_id: monitor.id(),
                stage: ctx.name(),
                kind: ctx.kind().as_str(),
            }
            .log();

            ctx.begin(logic.demand_mode());
            let result = match AssertUnwindSafe(logic.run(&mut ctx)).catch_unwind().await {
                Ok(result) => result,
                Err(_) => Err(TerminationError::Failed(StageRuntimeError::msg(format!(
                    "stage '{}' panicked",
                    ctx.name()
                )))),
            };
            ctx.finish(&result);
            drop(logic);

            let (state, failure) = match &result {
                Ok(()) if ctx.stopped_by_downstream() => (StageState::Cancelled, None),
                Ok(()) => (StageState::Completed, None),
                Err(TerminationError::Cancelled) => (StageState::Cancelled, None),
                Err(error) => (StageState::Failed, Some(error.to_string())),
            };
            let outcome = match &failure {
                Some(reason) => format!("failed: {}", reason),
                None => state.as_str().to_string(),
            };
            StageTerminated {
                graph_id: monitor.id(),
                stage: ctx.name(),
                outcome: &outcome,
                elements: ctx.elements_processed(),
            }
            .log();

            let elements = ctx.elements_processed();
            drop(ctx);
            if monitor.mark_terminated(index, state, elements, failure) {
                inner.graphs().remove(&monitor.id());
                GraphTerminated {
                    graph_id: monitor.id(),
                    stage_count: monitor.stages.len(),
                    duration: monitor.started.elapsed(),
                }
                .log();
            }
        };
        self.inner.handle.spawn(task.instrument(span));
    }
}
