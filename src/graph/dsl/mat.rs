// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Materialized-value plumbing for the typed DSL.
//!
//! Every composite carries an extractor that knows which stage positions hold
//! its value. Positions are relative; the base offset is applied when the
//! composite is appended to a larger graph.

use std::any::Any;
use std::sync::Arc;

use crate::engine::MaterializedValues;
use crate::errors::MaterializeError;

pub(crate) type MatFn<M> =
    Arc<dyn Fn(&mut MaterializedValues, usize) -> Result<M, MaterializeError> + Send + Sync>;

/// Materialized value of stages that have nothing to hand back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct NotUsed;

/// Combiners choosing which materialized value a composition keeps.
pub struct Keep;

impl Keep {
    pub fn left<L, R>(left: L, _right: R) -> L {
        left
    }

    pub fn right<L, R>(_left: L, right: R) -> R {
        right
    }

    pub fn both<L, R>(left: L, right: R) -> (L, R) {
        (left, right)
    }

    pub fn none<L, R>(_left: L, _right: R) -> NotUsed {
        NotUsed
    }
}

/// Handle to a typed composite's value inside a hand-built graph.
pub struct MatHandle<M> {
    mat: MatFn<M>,
    base: usize,
}

impl<M> MatHandle<M> {
    pub(crate) fn new(mat: MatFn<M>, base: usize) -> Self {
        Self { mat, base }
    }

    pub(crate) fn extract(&self, values: &mut MaterializedValues) -> Result<M, MaterializeError> {
        (self.mat)(values, self.base)
    }
}

impl<M> Clone for MatHandle<M> {
    fn clone(&self) -> Self {
        Self {
            mat: self.mat.clone(),
            base: self.base,
        }
    }
}

impl<M> std::fmt::Debug for MatHandle<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatHandle").field("base", &self.base).finish()
    }
}

pub(crate) fn not_used() -> MatFn<NotUsed> {
    Arc::new(|_: &mut MaterializedValues, _: usize| Ok(NotUsed))
}

/// Value materialized by the stage at relative position `stage`.
pub(crate) fn stage_value<M: Any>(stage: usize) -> MatFn<M> {
    Arc::new(move |values: &mut MaterializedValues, base: usize| values.take::<M>(base + stage))
}

pub(crate) fn combine<A, B, C, F>(left: MatFn<A>, right: MatFn<B>, right_offset: usize, f: F) -> MatFn<C>
where
    A: 'static,
    B: 'static,
    C: 'static,
    F: Fn(A, B) -> C + Send + Sync + 'static,
{
    Arc::new(move |values: &mut MaterializedValues, base: usize| {
        let a = left(values, base)?;
        let b = right(values, base + right_offset)?;
        Ok(f(a, b))
    })
}

pub(crate) fn map<A, B, F>(mat: MatFn<A>, f: F) -> MatFn<B>
where
    A: 'static,
    B: 'static,
    F: Fn(A) -> B + Send + Sync + 'static,
{
    Arc::new(move |values: &mut MaterializedValues, base: usize| mat(values, base).map(&f))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::MatValue;

    #[test]
    fn keep_selects_sides() {
        assert_eq!(Keep::left(1, "a"), 1);
        assert_eq!(Keep::right(1, "a"), "a");
        assert_eq!(Keep::both(1, "a"), (1, "a"));
        assert_eq!(Keep::none(1, "a"), NotUsed);
    }

    #[test]
    fn combined_extractors_respect_offsets() {
        let slots: Vec<Option<MatValue>> = vec![Some(Box::new(1u8)), None, Some(Box::new("right"))];
        let mut values = MaterializedValues::new(slots);
        let both = combine(stage_value::<u8>(0), stage_value::<&str>(1), 1, Keep::both);
        assert_eq!(both(&mut values, 0).unwrap(), (1, "right"));
        assert!(stage_value::<u8>(0)(&mut values, 0).is_err());
    }
}
