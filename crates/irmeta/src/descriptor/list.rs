// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! List/container descriptors.

use super::DescriptorId;
use crate::config::{GENERIC_LIST_ALIGN, GENERIC_LIST_SIZE};
use crate::value::Value;
use std::fmt;
use std::rc::Rc;

/// One concrete container implementation, type-erased.
///
/// Supplies construction, teardown and element access for list values of
/// any element type.
pub trait ContainerImpl: fmt::Debug {
    /// Implementation name, persisted with the descriptor.
    fn kind(&self) -> &str;

    /// Size of the container header.
    fn size(&self) -> usize;

    /// Alignment of the container header.
    fn alignment(&self) -> usize;

    /// Empty storage with room for `capacity` elements.
    fn construct(&self, capacity: usize) -> Vec<Value> {
        Vec::with_capacity(capacity)
    }

    /// Release element storage.
    fn destruct(&self, elements: &mut Vec<Value>) {
        elements.clear();
    }

    /// Elements of a list value, in iteration order.
    fn elements<'a>(&self, value: &'a Value) -> &'a [Value] {
        match value.as_list() {
            Some(items) => items,
            None => kernel_fatal!("{} container applied to a non-list value", self.kind()),
        }
    }
}

/// Contiguous sequence container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceContainer {
    kind: &'static str,
    size: usize,
    align: usize,
}

impl SequenceContainer {
    /// Container used for lists whose concrete implementation is unknown.
    pub const GENERIC: Self = Self {
        kind: "generic",
        size: GENERIC_LIST_SIZE,
        align: GENERIC_LIST_ALIGN,
    };

    /// Growable vector.
    pub const VECTOR: Self = Self {
        kind: "vector",
        size: 24,
        align: 8,
    };

    /// Doubly linked list.
    pub const LINKED: Self = Self {
        kind: "list",
        size: 16,
        align: 8,
    };

    /// Implementation for a persisted kind name; unknown names fall back to
    /// the generic container.
    pub fn for_kind(kind: &str) -> Self {
        [Self::VECTOR, Self::LINKED]
            .into_iter()
            .find(|c| c.kind == kind)
            .unwrap_or(Self::GENERIC)
    }
}

impl ContainerImpl for SequenceContainer {
    fn kind(&self) -> &str {
        self.kind
    }

    fn size(&self) -> usize {
        self.size
    }

    fn alignment(&self) -> usize {
        self.align
    }
}

/// List descriptor data.
#[derive(Debug, Clone)]
pub struct ListInfo {
    pub(crate) element: DescriptorId,
    pub(crate) container: Rc<dyn ContainerImpl>,
}

impl ListInfo {
    /// Element descriptor.
    pub fn element(&self) -> DescriptorId {
        self.element
    }

    /// Container implementation.
    pub fn container(&self) -> &dyn ContainerImpl {
        &*self.container
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_kind() {
        assert_eq!(SequenceContainer::for_kind("vector"), SequenceContainer::VECTOR);
        assert_eq!(SequenceContainer::for_kind("list"), SequenceContainer::LINKED);
        assert_eq!(SequenceContainer::for_kind("splay"), SequenceContainer::GENERIC);
    }

    #[test]
    fn test_elements_of_list_value() {
        let v = Value::List(vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(SequenceContainer::GENERIC.elements(&v).len(), 2);
        let mut storage = SequenceContainer::VECTOR.construct(4);
        assert!(storage.capacity() >= 4);
        storage.push(Value::Int(0));
        SequenceContainer::VECTOR.destruct(&mut storage);
        assert!(storage.is_empty());
    }
}
