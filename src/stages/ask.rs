// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Stage that asks an asynchronous collaborator for each element.
//!
//! Up to `parallelism` requests are in flight at once, each on its own task
//! and each bounded by `timeout`. Replies are emitted in input order. A failed
//! or timed-out request is routed through the stage's decider; `Restart`
//! behaves like `Resume` since the stage keeps no state besides the
//! in-flight requests. On any termination the stage waits for outstanding
//! requests before reporting.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;

use crate::config::AskConfig;
use crate::engine::{DemandSignal, Pulled, StageContext, SupervisionDecision};
use crate::errors::{StageFault, StageRuntimeError, TerminationError};
use crate::graph::{ElementType, StageSpec};
use crate::observability::messages::stage::AskTimedOut;
use crate::observability::messages::StructuredLog;
use crate::traits::{Responder, StageLogic};

/// Concurrency and timeout of an ask stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AskSettings {
    pub parallelism: usize,
    pub timeout: Duration,
}

impl AskSettings {
    pub fn new(parallelism: usize, timeout: Duration) -> Self {
        Self {
            parallelism: parallelism.max(1),
            timeout,
        }
    }
}

impl Default for AskSettings {
    fn default() -> Self {
        Self::from(&AskConfig::default())
    }
}

impl From<&AskConfig> for AskSettings {
    fn from(cfg: &AskConfig) -> Self {
        Self::new(cfg.get_parallelism(), cfg.get_timeout())
    }
}

type Reply<Resp> = JoinHandle<Result<Resp, StageRuntimeError>>;

enum Event<Req, Resp> {
    Reply(Result<Resp, StageRuntimeError>),
    Pulled(Pulled<Req>),
}

struct AskLogic<Req, Resp> {
    responder: Arc<dyn Responder<Req, Resp>>,
    settings: AskSettings,
    inflight: VecDeque<Reply<Resp>>,
}

impl<Req, Resp> AskLogic<Req, Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    fn submit(&mut self, request: Req) {
        let responder = self.responder.clone();
        let timeout = self.settings.timeout;
        self.inflight.push_back(tokio::spawn(async move {
            match tokio::time::timeout(timeout, responder.ask(request)).await {
                Ok(reply) => reply,
                Err(_) => Err(StageFault::AskTimeout { after: timeout }.into()),
            }
        }));
    }

    async fn next_reply(&mut self) -> Result<Resp, StageRuntimeError> {
        match self.inflight.front_mut() {
            Some(handle) => {
                let joined = handle.await;
                self.inflight.pop_front();
                joined.unwrap_or_else(|e| Err(StageRuntimeError::msg(format!("ask request panicked: {}", e))))
            }
            None => std::future::pending().await,
        }
    }

    async fn drain(&mut self) {
        while let Some(handle) = self.inflight.pop_front() {
            let _ = handle.await;
        }
    }

    async fn drive(&mut self, ctx: &mut StageContext) -> Result<(), TerminationError> {
        let mut upstream_done = false;
        loop {
            if !ctx.is_outlet_open(0) {
                return Ok(());
            }
            if upstream_done && self.inflight.is_empty() {
                return Ok(());
            }
            let can_pull = !upstream_done && self.inflight.len() < self.settings.parallelism;
            let awaiting = !self.inflight.is_empty();
            let event = tokio::select! {
                biased;
                _ = ctx.aborted() => return Err(TerminationError::Cancelled),
                reply = self.next_reply(), if awaiting => Event::Reply(reply),
                pulled = ctx.pull::<Req>(0), if can_pull => Event::Pulled(pulled?),
            };
            match event {
                Event::Pulled(Pulled::Element(request)) => self.submit(request),
                Event::Pulled(Pulled::Completed) => upstream_done = true,
                Event::Pulled(Pulled::Failed(error)) => return Err(error),
                Event::Reply(Ok(reply)) => {
                    if ctx.wait_demand(0).await? == DemandSignal::Cancelled {
                        return Ok(());
                    }
                    ctx.push(0, reply)?;
                }
                Event::Reply(Err(error)) => {
                    if let Some(StageFault::AskTimeout { after }) = error.fault() {
                        AskTimedOut {
                            stage: ctx.name(),
                            timeout: *after,
                        }
                        .log();
                    }
                    match ctx.supervise(&error) {
                        SupervisionDecision::Resume | SupervisionDecision::Restart => {}
                        SupervisionDecision::Stop => return Err(error.into()),
                    }
                }
            }
        }
    }
}

#[async_trait]
impl<Req, Resp> StageLogic for AskLogic<Req, Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    async fn run(&mut self, ctx: &mut StageContext) -> Result<(), TerminationError> {
        let result = self.drive(ctx).await;
        self.drain().await;
        result
    }
}

pub(crate) fn ask_spec<Req, Resp>(
    responder: Arc<dyn Responder<Req, Resp>>,
    settings: AskSettings,
) -> StageSpec
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    StageSpec::from_logic(
        "ask",
        vec![ElementType::of::<Req>()],
        vec![ElementType::of::<Resp>()],
        move || AskLogic {
            responder: responder.clone(),
            settings,
            inflight: VecDeque::new(),
        },
    )
}
