// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Centralized message types for structured logging.
//!
//! Each message type implements `Display` for human-readable output and
//! [`StructuredLog`] to emit the same event with structured fields at the
//! level documented on the type.
//!
//! # Organization
//!
//! * `engine` - Scheduler and materializer lifecycle events
//! * `stage` - Stage context lifecycle events
//! * `supervision` - Supervision decisions and recovery stages
//! * `cancellation` - Kill switch and injection endpoint events

use tracing::Span;

pub mod cancellation;
pub mod engine;
pub mod stage;
pub mod supervision;

/// A log message that knows its own level and structured fields.
pub trait StructuredLog {
    /// Emit the message as a tracing event.
    fn log(&self);

    /// Build a span carrying the message's fields.
    fn span(&self, name: &str) -> Span;
}
