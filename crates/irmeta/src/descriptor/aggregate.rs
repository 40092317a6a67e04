// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Aggregate descriptors and the field layout law.

use super::DescriptorId;
use crate::iter::VirtualNode;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// One field of an aggregate: (offset, descriptor, name).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    offset: usize,
    descriptor: DescriptorId,
    name: String,
}

impl FieldDescriptor {
    /// Create a field description.
    pub fn new(offset: usize, descriptor: DescriptorId, name: impl Into<String>) -> Self {
        Self {
            offset,
            descriptor,
            name: name.into(),
        }
    }

    /// Byte offset inside the owning aggregate.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Field type.
    pub fn descriptor(&self) -> DescriptorId {
        self.descriptor
    }

    /// Member name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn with_offset(&self, offset: usize) -> Self {
        Self {
            offset,
            ..self.clone()
        }
    }

    pub(crate) fn with_descriptor(&self, descriptor: DescriptorId) -> Self {
        Self {
            descriptor,
            ..self.clone()
        }
    }
}

/// Aggregate (struct-like) descriptor data.
#[derive(Debug, Clone, Default)]
pub struct AggregateInfo {
    pub(crate) base: Option<DescriptorId>,
    pub(crate) fields: Vec<FieldDescriptor>,
    pub(crate) polymorphic: bool,
    pub(crate) virtual_fields: Vec<(String, String)>,
    pub(crate) virtual_cache: RefCell<HashMap<String, Rc<VirtualNode>>>,
}

impl AggregateInfo {
    pub(crate) fn new(base: Option<DescriptorId>, polymorphic: bool) -> Self {
        Self {
            base,
            polymorphic,
            ..Self::default()
        }
    }

    /// Base class.
    pub fn base(&self) -> Option<DescriptorId> {
        self.base
    }

    /// Fields declared at this level, in declaration order.
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Field declared at this level by name.
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Whether instances carry their own runtime type.
    pub fn is_polymorphic(&self) -> bool {
        self.polymorphic
    }

    /// Declared virtual fields as (name, path spec).
    pub fn virtual_fields(&self) -> &[(String, String)] {
        &self.virtual_fields
    }

    /// Path spec of a virtual field declared at this level.
    pub fn virtual_field(&self, name: &str) -> Option<&str> {
        self.virtual_fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, spec)| spec.as_str())
    }
}

/// Round `offset` up to a multiple of `align`.
pub(crate) fn align_up(offset: usize, align: usize) -> usize {
    let align = align.max(1);
    offset.div_ceil(align) * align
}

/// Result of laying out a run of fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FieldLayout {
    pub offsets: Vec<usize>,
    pub size: usize,
    pub align: usize,
}

/// Lay out fields after a base of `base_size`/`base_align`.
///
/// Each field is placed at the running offset rounded up to its
/// alignment; the total is rounded up to the largest alignment seen.
pub(crate) fn layout_fields(
    base_size: usize,
    base_align: usize,
    fields: impl IntoIterator<Item = (usize, usize)>,
) -> FieldLayout {
    let mut offset = base_size;
    let mut total_align = base_align.max(1);
    let mut offsets = Vec::new();
    for (size, align) in fields {
        offset = align_up(offset, align);
        offsets.push(offset);
        offset += size;
        total_align = total_align.max(align);
    }
    FieldLayout {
        offsets,
        size: align_up(offset, total_align),
        align: total_align,
    }
}
