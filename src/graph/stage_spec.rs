// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::fmt;
use std::mem;
use std::sync::Arc;

use crate::config::Attributes;
use crate::graph::port::ElementType;
use crate::traits::{MatValue, StageFactory, StageKind, StageLogic};

/// Immutable description of one stage: its ports, how to build an instance
/// and the attributes attached to it.
#[derive(Clone)]
pub struct StageSpec {
    label: String,
    kind: StageKind,
    inlets: Vec<ElementType>,
    outlets: Vec<ElementType>,
    factory: Arc<dyn StageFactory>,
    attributes: Attributes,
}

impl StageSpec {
    pub fn new<F>(
        label: impl Into<String>,
        inlets: Vec<ElementType>,
        outlets: Vec<ElementType>,
        factory: F,
    ) -> Self
    where
        F: StageFactory + 'static,
    {
        let kind = StageKind::from_shape(inlets.len(), outlets.len());
        Self {
            label: label.into(),
            kind,
            inlets,
            outlets,
            factory: Arc::new(factory),
            attributes: Attributes::default(),
        }
    }

    /// Stage whose instances carry no materialized value.
    pub fn from_logic<L, F>(
        label: impl Into<String>,
        inlets: Vec<ElementType>,
        outlets: Vec<ElementType>,
        make: F,
    ) -> Self
    where
        L: StageLogic + 'static,
        F: Fn() -> L + Send + Sync + 'static,
    {
        Self::new(
            label,
            inlets,
            outlets,
            move || -> (Box<dyn StageLogic>, Option<MatValue>) { (Box::new(make()), None) },
        )
    }

    /// Stage whose instances each hand back a value of type `M`.
    pub fn with_value<L, M, F>(
        label: impl Into<String>,
        inlets: Vec<ElementType>,
        outlets: Vec<ElementType>,
        make: F,
    ) -> Self
    where
        L: StageLogic + 'static,
        M: Send + 'static,
        F: Fn() -> (L, M) + Send + Sync + 'static,
    {
        Self::new(
            label,
            inlets,
            outlets,
            move || -> (Box<dyn StageLogic>, Option<MatValue>) {
                let (logic, value) = make();
                (Box::new(logic), Some(Box::new(value)))
            },
        )
    }

    /// Attach attributes, overriding values set earlier.
    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = attributes.or(&self.attributes);
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.set_name(name.into());
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn kind(&self) -> StageKind {
        self.kind
    }

    pub fn inlets(&self) -> &[ElementType] {
        &self.inlets
    }

    pub fn outlets(&self) -> &[ElementType] {
        &self.outlets
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    /// Display name: the `name` attribute if set, the label otherwise.
    pub fn display_name(&self) -> &str {
        self.attributes.name().unwrap_or(&self.label)
    }

    pub(crate) fn factory(&self) -> &dyn StageFactory {
        self.factory.as_ref()
    }

    pub(crate) fn inherit_attributes(&mut self, outer: &Attributes) {
        self.attributes = mem::take(&mut self.attributes).inherit(outer);
    }

    pub(crate) fn set_name(&mut self, name: String) {
        self.attributes = mem::take(&mut self.attributes).with_name(name);
    }
}

impl fmt::Debug for StageSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageSpec")
            .field("label", &self.label)
            .field("kind", &self.kind)
            .field(
                "inlets",
                &self.inlets.iter().map(ElementType::name).collect::<Vec<_>>(),
            )
            .field(
                "outlets",
                &self.outlets.iter().map(ElementType::name).collect::<Vec<_>>(),
            )
            .field("attributes", &self.attributes)
            .finish()
    }
}
