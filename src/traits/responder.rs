// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::future::Future;
use std::marker::PhantomData;

use async_trait::async_trait;

use crate::errors::StageRuntimeError;

/// Asynchronous request/response collaborator used by ask stages.
///
/// The engine calls `ask` once per element and awaits the reply out-of-band,
/// bounded by the stage's timeout. Errors are routed through the stage's
/// supervisor like any other element failure.
#[async_trait]
pub trait Responder<Req, Resp>: Send + Sync
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    async fn ask(&self, request: Req) -> Result<Resp, StageRuntimeError>;
}

/// Adapts an async closure into a [`Responder`].
pub struct FnResponder<F, Req, Resp> {
    f: F,
    _types: PhantomData<fn(Req) -> Resp>,
}

impl<F, Fut, Req, Resp> FnResponder<F, Req, Resp>
where
    F: Fn(Req) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Resp, StageRuntimeError>> + Send,
{
    pub fn new(f: F) -> Self {
        Self {
            f,
            _types: PhantomData,
        }
    }
}

#[async_trait]
impl<F, Fut, Req, Resp> Responder<Req, Resp> for FnResponder<F, Req, Resp>
where
    F: Fn(Req) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Resp, StageRuntimeError>> + Send,
    Req: Send + 'static,
    Resp: Send + 'static,
{
    async fn ask(&self, request: Req) -> Result<Resp, StageRuntimeError> {
        (self.f)(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fn_responder_forwards_to_closure() {
        let doubler = FnResponder::new(|x: i32| async move { Ok::<_, StageRuntimeError>(x * 2) });
        assert_eq!(doubler.ask(21).await.unwrap(), 42);
    }
}
