// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Runtime errors raised by stages and the terminal errors sinks resolve to.

use std::error::Error;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// Faults originating inside the engine rather than in user code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StageFault {
    /// An asynchronous collaborator did not reply in time.
    #[error("ask timed out after {after:?}")]
    AskTimeout { after: Duration },

    /// An injection endpoint configured with the `fail` policy overflowed.
    #[error("injection buffer overflow (capacity {capacity})")]
    BufferOverflow { capacity: usize },

    /// A stage broke the credit protocol on an edge.
    #[error("protocol violation on edge '{edge}': {detail}")]
    ProtocolViolation { edge: String, detail: &'static str },

    /// An element arrived with a type the stage was not built for.
    #[error("stage '{stage}' received an element that is not {expected}")]
    ElementTypeMismatch { stage: String, expected: &'static str },

    /// The upstream stage went away without emitting a terminal signal.
    #[error("upstream stage terminated without completing")]
    AbruptTermination,

    /// Free-form failure message.
    #[error("{0}")]
    Message(String),
}

/// Any failure raised while a stage processed an element.
///
/// Cloneable so a single failure can be propagated to several outlets and
/// inspected by deciders with [`StageRuntimeError::downcast_ref`].
#[derive(Clone)]
pub struct StageRuntimeError {
    inner: Arc<dyn Error + Send + Sync + 'static>,
}

impl StageRuntimeError {
    pub fn new<E>(error: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(error),
        }
    }

    /// Failure carrying only a message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::new(StageFault::Message(message.into()))
    }

    pub fn downcast_ref<E: Error + 'static>(&self) -> Option<&E> {
        self.inner.downcast_ref::<E>()
    }

    pub fn is<E: Error + 'static>(&self) -> bool {
        self.inner.is::<E>()
    }

    /// Returns the engine fault when this error was raised by the engine itself.
    pub fn fault(&self) -> Option<&StageFault> {
        self.downcast_ref::<StageFault>()
    }
}

impl fmt::Debug for StageRuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StageRuntimeError").field(&self.inner).finish()
    }
}

impl fmt::Display for StageRuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.inner, f)
    }
}

impl Error for StageRuntimeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.inner.source()
    }
}

impl From<StageFault> for StageRuntimeError {
    fn from(fault: StageFault) -> Self {
        Self::new(fault)
    }
}

/// Terminal error observed downstream of a failure or cancellation.
///
/// A sink's result resolves to either its success value or this error.
#[derive(Debug, Clone, Error)]
pub enum TerminationError {
    #[error("stream was cancelled")]
    Cancelled,

    #[error(transparent)]
    Failed(#[from] StageRuntimeError),
}

impl TerminationError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TerminationError::Cancelled)
    }

    /// Looks through to the original error raised inside a stage.
    pub fn downcast_ref<E: Error + 'static>(&self) -> Option<&E> {
        match self {
            TerminationError::Cancelled => None,
            TerminationError::Failed(error) => error.downcast_ref::<E>(),
        }
    }

    pub fn runtime_error(&self) -> Option<&StageRuntimeError> {
        match self {
            TerminationError::Cancelled => None,
            TerminationError::Failed(error) => Some(error),
        }
    }
}

impl From<StageFault> for TerminationError {
    fn from(fault: StageFault) -> Self {
        TerminationError::Failed(fault.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error, PartialEq)]
    #[error("division by zero")]
    struct DivideByZero;

    #[test]
    fn runtime_error_downcasts_to_user_error() {
        let err = StageRuntimeError::new(DivideByZero);
        assert!(err.is::<DivideByZero>());
        assert_eq!(err.downcast_ref::<DivideByZero>(), Some(&DivideByZero));
        assert!(err.fault().is_none());
        assert_eq!(err.to_string(), "division by zero");
    }

    #[test]
    fn termination_error_looks_through_to_stage_error() {
        let err = TerminationError::from(StageRuntimeError::new(DivideByZero));
        assert!(!err.is_cancelled());
        assert!(err.downcast_ref::<DivideByZero>().is_some());
        assert!(TerminationError::Cancelled.downcast_ref::<DivideByZero>().is_none());
    }

    #[test]
    fn faults_convert_into_termination_errors() {
        let err: TerminationError = StageFault::AskTimeout {
            after: Duration::from_millis(10),
        }
        .into();
        let fault = err.runtime_error().and_then(StageRuntimeError::fault);
        assert_eq!(
            fault,
            Some(&StageFault::AskTimeout {
                after: Duration::from_millis(10)
            })
        );
    }
}
