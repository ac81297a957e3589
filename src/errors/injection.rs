// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use thiserror::Error;

/// Errors returned to external producers pushing into an injection endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SendError {
    /// The endpoint was closed, or the stream behind it has terminated.
    #[error("injection endpoint is closed")]
    Closed,

    /// The buffer overflowed under the `fail` policy; the stream fails too.
    #[error("injection buffer overflow (capacity {capacity})")]
    Overflow { capacity: usize },

    /// `try_send` under the `block` policy found the buffer full.
    #[error("injection buffer is full")]
    Full,
}
