// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! External-injection source.
//!
//! The stage materializes an [`InjectionEndpoint`]: a bounded mailbox that
//! outside callers push into. The stage only takes from the mailbox when its
//! outlet has credit, so while downstream is slow the mailbox (not the edge)
//! absorbs injected elements, subject to its [`OverflowPolicy`].

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;

use crate::engine::{DemandSignal, StageContext};
use crate::errors::{SendError, StageFault, TerminationError};
use crate::graph::{ElementType, StageSpec};
use crate::observability::messages::cancellation::InjectionDropped;
use crate::observability::messages::StructuredLog;
use crate::traits::StageLogic;

/// What an endpoint does with an element that arrives while it is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Evict the oldest buffered element to make room.
    DropOldest,
    /// Discard the incoming element.
    #[default]
    DropNewest,
    /// Fail the stream with a buffer overflow.
    Fail,
    /// Make `send` wait for room.
    Block,
}

impl OverflowPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            OverflowPolicy::DropOldest => "drop_oldest",
            OverflowPolicy::DropNewest => "drop_newest",
            OverflowPolicy::Fail => "fail",
            OverflowPolicy::Block => "block",
        }
    }
}

/// What happened to an element handed to an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfferOutcome {
    Enqueued,
    /// Enqueued after evicting the oldest buffered element.
    DroppedOldest,
    /// The element itself was discarded.
    DroppedNewest,
}

struct Mailbox<T> {
    queue: VecDeque<T>,
    closed: bool,
    overflowed: bool,
}

struct EndpointShared<T> {
    capacity: usize,
    policy: OverflowPolicy,
    mailbox: Mutex<Mailbox<T>>,
    to_stage: Notify,
    to_senders: Notify,
}

impl<T> EndpointShared<T> {
    fn lock(&self) -> MutexGuard<'_, Mailbox<T>> {
        self.mailbox.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn dropped(&self) {
        InjectionDropped {
            policy: self.policy.as_str(),
            capacity: self.capacity,
        }
        .log();
    }
}

enum Next<T> {
    Element(T),
    Closed,
    Overflowed,
}

/// Handle for pushing elements into a running injection source.
///
/// Cloneable; all clones feed the same stage. [`InjectionEndpoint::close`]
/// completes the stream once buffered elements have drained.
pub struct InjectionEndpoint<T> {
    shared: Arc<EndpointShared<T>>,
}

impl<T> Clone for InjectionEndpoint<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T> fmt::Debug for InjectionEndpoint<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InjectionEndpoint")
            .field("capacity", &self.shared.capacity)
            .field("policy", &self.shared.policy)
            .field("buffered", &self.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl<T> InjectionEndpoint<T> {
    pub(crate) fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        Self {
            shared: Arc::new(EndpointShared {
                capacity: capacity.max(1),
                policy,
                mailbox: Mutex::new(Mailbox {
                    queue: VecDeque::new(),
                    closed: false,
                    overflowed: false,
                }),
                to_stage: Notify::new(),
                to_senders: Notify::new(),
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    pub fn policy(&self) -> OverflowPolicy {
        self.shared.policy
    }

    /// Elements buffered and not yet taken by the stage.
    pub fn len(&self) -> usize {
        self.shared.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }

    /// Offer `value` without waiting.
    ///
    /// Under [`OverflowPolicy::Block`] a full buffer yields [`SendError::Full`].
    pub fn try_send(&self, value: T) -> Result<OfferOutcome, SendError> {
        let shared = &self.shared;
        let mut mailbox = shared.lock();
        if mailbox.closed {
            return Err(SendError::Closed);
        }
        if mailbox.queue.len() < shared.capacity {
            mailbox.queue.push_back(value);
            drop(mailbox);
            shared.to_stage.notify_waiters();
            return Ok(OfferOutcome::Enqueued);
        }
        match shared.policy {
            OverflowPolicy::DropOldest => {
                mailbox.queue.pop_front();
                mailbox.queue.push_back(value);
                drop(mailbox);
                shared.dropped();
                shared.to_stage.notify_waiters();
                Ok(OfferOutcome::DroppedOldest)
            }
            OverflowPolicy::DropNewest => {
                drop(mailbox);
                shared.dropped();
                Ok(OfferOutcome::DroppedNewest)
            }
            OverflowPolicy::Fail => {
                mailbox.overflowed = true;
                mailbox.closed = true;
                drop(mailbox);
                shared.to_stage.notify_waiters();
                shared.to_senders.notify_waiters();
                Err(SendError::Overflow {
                    capacity: shared.capacity,
                })
            }
            OverflowPolicy::Block => Err(SendError::Full),
        }
    }

    /// Offer `value`, waiting for room under [`OverflowPolicy::Block`].
    pub async fn send(&self, value: T) -> Result<OfferOutcome, SendError> {
        if self.shared.policy != OverflowPolicy::Block {
            return self.try_send(value);
        }
        loop {
            let notified = self.shared.to_senders.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let mut mailbox = self.shared.lock();
                if mailbox.closed {
                    return Err(SendError::Closed);
                }
                if mailbox.queue.len() < self.shared.capacity {
                    mailbox.queue.push_back(value);
                    drop(mailbox);
                    self.shared.to_stage.notify_waiters();
                    return Ok(OfferOutcome::Enqueued);
                }
            }
            notified.await;
        }
    }

    /// Stop accepting elements; the stream completes after the buffer drains.
    pub fn close(&self) {
        self.shared.lock().closed = true;
        self.shared.to_stage.notify_waiters();
        self.shared.to_senders.notify_waiters();
    }

    async fn next(&self) -> Next<T> {
        loop {
            let notified = self.shared.to_stage.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let mut mailbox = self.shared.lock();
                if mailbox.overflowed {
                    return Next::Overflowed;
                }
                if let Some(value) = mailbox.queue.pop_front() {
                    drop(mailbox);
                    self.shared.to_senders.notify_waiters();
                    return Next::Element(value);
                }
                if mailbox.closed {
                    return Next::Closed;
                }
            }
            notified.await;
        }
    }
}

struct QueueSource<T> {
    endpoint: InjectionEndpoint<T>,
}

#[async_trait]
impl<T: Send + 'static> StageLogic for QueueSource<T> {
    async fn run(&mut self, ctx: &mut StageContext) -> Result<(), TerminationError> {
        loop {
            if ctx.wait_demand(0).await? == DemandSignal::Cancelled {
                return Ok(());
            }
            let next = tokio::select! {
                biased;
                _ = ctx.aborted() => return Err(TerminationError::Cancelled),
                _ = ctx.downstream_cancelled() => return Ok(()),
                next = self.endpoint.next() => next,
            };
            match next {
                Next::Element(value) => ctx.push(0, value)?,
                Next::Closed => return Ok(()),
                Next::Overflowed => {
                    return Err(StageFault::BufferOverflow {
                        capacity: self.endpoint.capacity(),
                    }
                    .into())
                }
            }
        }
    }
}

impl<T> Drop for QueueSource<T> {
    fn drop(&mut self) {
        self.endpoint.close();
    }
}

pub(crate) fn queue_spec<T: Send + 'static>(capacity: usize, policy: OverflowPolicy) -> StageSpec {
    StageSpec::with_value(
        "queue",
        Vec::new(),
        vec![ElementType::of::<T>()],
        move || {
            let endpoint: InjectionEndpoint<T> = InjectionEndpoint::new(capacity, policy);
            (
                QueueSource {
                    endpoint: endpoint.clone(),
                },
                endpoint,
            )
        },
    )
}
