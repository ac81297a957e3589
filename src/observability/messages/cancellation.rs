// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for kill switches and injection endpoints.

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use tracing::Span;

/// Kill switch triggered.
///
/// # Log Level
/// `info!` - Operator action
///
/// # Example
/// ```
/// use the_streamwood::observability::messages::cancellation::KillSwitchTriggered;
///
/// let msg = KillSwitchTriggered {
///     switch: "ingest",
///     graceful: true,
///     attached: 2,
/// };
///
/// tracing::info!("{}", msg);
/// ```
pub struct KillSwitchTriggered<'a> {
    pub switch: &'a str,
    pub graceful: bool,
    pub attached: usize,
}

impl Display for KillSwitchTriggered<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        let mode = if self.graceful { "shutdown" } else { "abort" };
        write!(
            f,
            "Kill switch '{}' triggered ({}), {} attached stages",
            self.switch, mode, self.attached
        )
    }
}

impl StructuredLog for KillSwitchTriggered<'_> {
    fn log(&self) {
        tracing::info!(
            switch = self.switch,
            graceful = self.graceful,
            attached = self.attached,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "kill_switch",
            span_name = name,
            switch = self.switch,
            graceful = self.graceful,
        )
    }
}

/// Injection endpoint dropped an element under its overflow policy.
///
/// # Log Level
/// `debug!` - Expected under load
pub struct InjectionDropped<'a> {
    pub policy: &'a str,
    pub capacity: usize,
}

impl Display for InjectionDropped<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Injection buffer full (capacity {}), dropped element under {} policy",
            self.capacity, self.policy
        )
    }
}

impl StructuredLog for InjectionDropped<'_> {
    fn log(&self) {
        tracing::debug!(policy = self.policy, capacity = self.capacity, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!("injection", span_name = name, policy = self.policy)
    }
}
