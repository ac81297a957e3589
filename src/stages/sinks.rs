// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Terminal stages and the handles they materialize.
//!
//! Every sink reports its outcome through its materialized value: a
//! [`Completion`] for sinks that reduce the stream to one value, an
//! [`ElementStream`] for the consumption interface. A graph aborted before
//! the sink finishes resolves to [`TerminationError::Cancelled`].

use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::Stream;
use tokio::sync::{mpsc, oneshot, Semaphore};

use crate::engine::{Pulled, StageContext};
use crate::errors::{StageFault, TerminationError};
use crate::graph::{ElementType, StageSpec};
use crate::traits::{DemandMode, StageLogic};

type Outcome<T> = Result<T, TerminationError>;

/// Resolves to a sink's result once the sink terminates.
#[derive(Debug)]
pub struct Completion<T> {
    rx: oneshot::Receiver<Outcome<T>>,
}

impl<T> Completion<T> {
    fn channel() -> (oneshot::Sender<Outcome<T>>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self { rx })
    }
}

impl<T> Future for Completion<T> {
    type Output = Outcome<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or_else(|_| Err(StageFault::AbruptTermination.into())))
    }
}

/// Pull-based consumption of a running stream.
///
/// Yields `Ok(element)` in order, then `None` on completion or a single
/// `Err` when the stream failed or was cancelled. The sink asks upstream for
/// an element only while the handle is waiting for one, so nothing is
/// buffered ahead of the consumer. Dropping the handle cancels everything
/// upstream of the sink.
#[derive(Debug)]
pub struct ElementStream<T> {
    elements: mpsc::Receiver<T>,
    terminal: oneshot::Receiver<Outcome<()>>,
    requests: Arc<Semaphore>,
    requested: bool,
    finished: bool,
}

impl<T> ElementStream<T> {
    /// Next element, or `None` once the stream has ended.
    pub async fn next(&mut self) -> Option<Outcome<T>> {
        futures::future::poll_fn(|cx| self.poll_item(cx)).await
    }

    /// Drain the remaining elements, stopping at the first error.
    pub async fn collect_all(mut self) -> Outcome<Vec<T>> {
        let mut out = Vec::new();
        while let Some(item) = self.next().await {
            out.push(item?);
        }
        Ok(out)
    }

    fn poll_item(&mut self, cx: &mut Context<'_>) -> Poll<Option<Outcome<T>>> {
        if self.finished {
            return Poll::Ready(None);
        }
        if !self.requested {
            self.requests.add_permits(1);
            self.requested = true;
        }
        match self.elements.poll_recv(cx) {
            Poll::Ready(Some(element)) => {
                self.requested = false;
                return Poll::Ready(Some(Ok(element)));
            }
            Poll::Ready(None) => {}
            Poll::Pending => return Poll::Pending,
        }
        match Pin::new(&mut self.terminal).poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(terminal) => {
                self.finished = true;
                match terminal {
                    Ok(Ok(())) => Poll::Ready(None),
                    Ok(Err(error)) => Poll::Ready(Some(Err(error))),
                    Err(_) => Poll::Ready(Some(Err(StageFault::AbruptTermination.into()))),
                }
            }
        }
    }
}

impl<T> Stream for ElementStream<T> {
    type Item = Outcome<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().poll_item(cx)
    }
}

type Zero<Acc> = Arc<dyn Fn() -> Acc + Send + Sync>;
type Step<Acc, In> = Arc<dyn Fn(Acc, In) -> Acc + Send + Sync>;

struct FoldLogic<In, Acc> {
    zero: Zero<Acc>,
    step: Step<Acc, In>,
    result: Option<oneshot::Sender<Outcome<Acc>>>,
}

impl<In: Send + 'static, Acc: Send + 'static> FoldLogic<In, Acc> {
    async fn fold(&self, ctx: &StageContext) -> Outcome<Acc> {
        let mut acc = (self.zero)();
        loop {
            match ctx.pull::<In>(0).await? {
                Pulled::Element(element) => acc = (self.step)(acc, element),
                Pulled::Completed => return Ok(acc),
                Pulled::Failed(error) => return Err(error),
            }
        }
    }
}

#[async_trait]
impl<In: Send + 'static, Acc: Send + 'static> StageLogic for FoldLogic<In, Acc> {
    async fn run(&mut self, ctx: &mut StageContext) -> Result<(), TerminationError> {
        let outcome = self.fold(ctx).await;
        let status = match &outcome {
            Ok(_) => Ok(()),
            Err(error) => Err(error.clone()),
        };
        if let Some(tx) = self.result.take() {
            let _ = tx.send(outcome);
        }
        status
    }
}

/// Sink reducing the stream with `step`, starting from a fresh `zero()` on
/// every materialization.
pub(crate) fn fold_spec<In, Acc, Z, F>(label: &str, zero: Z, step: F) -> StageSpec
where
    In: Send + 'static,
    Acc: Send + 'static,
    Z: Fn() -> Acc + Send + Sync + 'static,
    F: Fn(Acc, In) -> Acc + Send + Sync + 'static,
{
    let zero: Zero<Acc> = Arc::new(zero);
    let step: Step<Acc, In> = Arc::new(step);
    StageSpec::with_value(label, vec![ElementType::of::<In>()], Vec::new(), move || {
        let (tx, completion) = Completion::channel();
        (
            FoldLogic {
                zero: zero.clone(),
                step: step.clone(),
                result: Some(tx),
            },
            completion,
        )
    })
}

struct HeadLogic<T> {
    result: Option<oneshot::Sender<Outcome<Option<T>>>>,
}

#[async_trait]
impl<T: Send + 'static> StageLogic for HeadLogic<T> {
    async fn run(&mut self, ctx: &mut StageContext) -> Result<(), TerminationError> {
        let (outcome, status) = match ctx.pull::<T>(0).await {
            Ok(Pulled::Element(element)) => (Ok(Some(element)), Ok(())),
            Ok(Pulled::Completed) => (Ok(None), Ok(())),
            Ok(Pulled::Failed(error)) | Err(error) => (Err(error.clone()), Err(error)),
        };
        if let Some(tx) = self.result.take() {
            let _ = tx.send(outcome);
        }
        status
    }
}

/// Sink resolving to the first element and cancelling upstream after it.
pub(crate) fn head_spec<T: Send + 'static>() -> StageSpec {
    StageSpec::with_value("head", vec![ElementType::of::<T>()], Vec::new(), || {
        let (tx, completion) = Completion::channel();
        (HeadLogic::<T> { result: Some(tx) }, completion)
    })
}

struct StreamLogic<T> {
    elements: Option<mpsc::Sender<T>>,
    terminal: Option<oneshot::Sender<Outcome<()>>>,
    requests: Arc<Semaphore>,
    _element: PhantomData<fn() -> T>,
}

impl<T: Send + 'static> StreamLogic<T> {
    async fn forward(&self, ctx: &StageContext) -> Outcome<()> {
        let Some(tx) = self.elements.as_ref() else {
            return Ok(());
        };
        loop {
            tokio::select! {
                biased;
                _ = ctx.aborted() => return Err(TerminationError::Cancelled),
                _ = tx.closed() => return Err(TerminationError::Cancelled),
                request = self.requests.acquire() => {
                    request.map_err(|_| TerminationError::Cancelled)?.forget();
                }
            }
            let permit = tx.reserve().await.map_err(|_| TerminationError::Cancelled)?;
            ctx.request(0, 1);
            let pulled = tokio::select! {
                biased;
                _ = tx.closed() => return Err(TerminationError::Cancelled),
                pulled = ctx.pull::<T>(0) => pulled?,
            };
            match pulled {
                Pulled::Element(element) => permit.send(element),
                Pulled::Completed => return Ok(()),
                Pulled::Failed(error) => return Err(error),
            }
        }
    }
}

#[async_trait]
impl<T: Send + 'static> StageLogic for StreamLogic<T> {
    async fn run(&mut self, ctx: &mut StageContext) -> Result<(), TerminationError> {
        let outcome = self.forward(ctx).await;
        self.elements = None;
        if let Some(tx) = self.terminal.take() {
            let _ = tx.send(outcome.clone());
        }
        outcome
    }

    fn demand_mode(&self) -> DemandMode {
        DemandMode::OnRequest
    }
}

/// Sink handing elements to an [`ElementStream`] one at a time.
pub(crate) fn stream_spec<T: Send + 'static>() -> StageSpec {
    StageSpec::with_value("stream", vec![ElementType::of::<T>()], Vec::new(), || {
        let (elements_tx, elements) = mpsc::channel(1);
        let (terminal_tx, terminal) = oneshot::channel();
        let requests = Arc::new(Semaphore::new(0));
        (
            StreamLogic::<T> {
                elements: Some(elements_tx),
                terminal: Some(terminal_tx),
                requests: requests.clone(),
                _element: PhantomData,
            },
            ElementStream {
                elements,
                terminal,
                requests,
                requested: false,
                finished: false,
            },
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn completion_reports_dropped_sink() {
        let (tx, completion) = Completion::<u8>::channel();
        drop(tx);
        let err = completion.await.unwrap_err();
        assert!(matches!(
            err.runtime_error().and_then(|e| e.fault()),
            Some(StageFault::AbruptTermination)
        ));
    }

    #[tokio::test]
    async fn element_stream_ends_with_terminal_error() {
        let (elements_tx, elements) = mpsc::channel(1);
        let (terminal_tx, terminal) = oneshot::channel();
        let mut stream = ElementStream {
            elements,
            terminal,
            requests: Arc::new(Semaphore::new(0)),
            requested: false,
            finished: false,
        };
        elements_tx.send(7u8).await.unwrap();
        drop(elements_tx);
        terminal_tx.send(Err(TerminationError::Cancelled)).unwrap();
        assert!(matches!(stream.next().await, Some(Ok(7))));
        assert!(matches!(stream.next().await, Some(Err(TerminationError::Cancelled))));
        assert!(stream.next().await.is_none());
    }
}
