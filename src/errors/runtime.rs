// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use thiserror::Error;

/// Errors raised while starting the scheduler.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The owned worker runtime could not be built.
    #[error("failed to start worker runtime: {0}")]
    RuntimeStart(#[from] std::io::Error),

    /// `from_current` was called outside of a tokio runtime.
    #[error("no tokio runtime is running on this thread")]
    NoCurrentRuntime,
}
