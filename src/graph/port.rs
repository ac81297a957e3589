// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::any::{type_name, TypeId};
use std::hash::{Hash, Hasher};

/// Runtime identity of the element type a port carries.
#[derive(Debug, Clone, Copy)]
pub struct ElementType {
    id: TypeId,
    name: &'static str,
}

impl ElementType {
    pub fn of<T: 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for ElementType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ElementType {}

impl Hash for ElementType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Input slot `index` of the stage at position `stage`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InletRef {
    stage: usize,
    index: usize,
}

/// Output slot `index` of the stage at position `stage`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OutletRef {
    stage: usize,
    index: usize,
}

impl InletRef {
    pub fn new(stage: usize, index: usize) -> Self {
        Self { stage, index }
    }

    pub fn stage(&self) -> usize {
        self.stage
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub(crate) fn shifted(self, offset: usize) -> Self {
        Self::new(self.stage + offset, self.index)
    }
}

impl OutletRef {
    pub fn new(stage: usize, index: usize) -> Self {
        Self { stage, index }
    }

    pub fn stage(&self) -> usize {
        self.stage
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub(crate) fn shifted(self, offset: usize) -> Self {
        Self::new(self.stage + offset, self.index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_types_compare_by_type() {
        assert_eq!(ElementType::of::<i32>(), ElementType::of::<i32>());
        assert_ne!(ElementType::of::<i32>(), ElementType::of::<i64>());
        assert_eq!(ElementType::of::<String>().name(), "alloc::string::String");
    }
}
