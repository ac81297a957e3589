// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Per-stage attributes: diagnostic name, edge buffer size and supervision decider.

use crate::engine::supervision::Decider;

/// Optional settings attached to a stage, a composite, a graph or a materialization call.
///
/// Unset values are inherited from the next outer level, ending at the
/// materializer defaults.
#[derive(Clone, Debug, Default)]
pub struct Attributes {
    name: Option<String>,
    buffer_size: Option<usize>,
    decider: Option<Decider>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self::new().with_name(name)
    }

    pub fn buffer(size: usize) -> Self {
        Self::new().with_buffer_size(size)
    }

    pub fn supervision(decider: Decider) -> Self {
        Self::new().with_decider(decider)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Capacity of the edges feeding the stage. Zero is raised to one.
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = Some(size.max(1));
        self
    }

    pub fn with_decider(mut self, decider: Decider) -> Self {
        self.decider = Some(decider);
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn buffer_size(&self) -> Option<usize> {
        self.buffer_size
    }

    pub fn decider(&self) -> Option<&Decider> {
        self.decider.as_ref()
    }

    /// Fill every unset value from `fallback`, keeping values already set here.
    pub fn or(mut self, fallback: &Attributes) -> Self {
        if self.name.is_none() {
            self.name = fallback.name.clone();
        }
        if self.buffer_size.is_none() {
            self.buffer_size = fallback.buffer_size;
        }
        if self.decider.is_none() {
            self.decider = fallback.decider.clone();
        }
        self
    }

    /// Like [`Attributes::or`] but never inherits a name; names identify one stage.
    pub fn inherit(mut self, outer: &Attributes) -> Self {
        if self.buffer_size.is_none() {
            self.buffer_size = outer.buffer_size;
        }
        if self.decider.is_none() {
            self.decider = outer.decider.clone();
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.buffer_size.is_none() && self.decider.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::supervision::SupervisionDecision;
    use crate::errors::StageRuntimeError;

    #[test]
    fn or_keeps_own_values() {
        let inner = Attributes::buffer(4);
        let outer = Attributes::buffer(64).with_name("outer");
        let merged = inner.or(&outer);
        assert_eq!(merged.buffer_size(), Some(4));
        assert_eq!(merged.name(), Some("outer"));
    }

    #[test]
    fn inherit_skips_names() {
        let merged = Attributes::new().inherit(
            &Attributes::named("composite").with_decider(Decider::resuming()),
        );
        assert!(merged.name().is_none());
        let decision = merged
            .decider()
            .map(|d| d.decide(&StageRuntimeError::msg("boom")));
        assert_eq!(decision, Some(SupervisionDecision::Resume));
    }

    #[test]
    fn zero_buffer_is_raised_to_one() {
        assert_eq!(Attributes::buffer(0).buffer_size(), Some(1));
        assert!(Attributes::new().is_empty());
    }
}
