// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Union descriptors.
//!
//! A union is an aggregate (its common fields) plus a set of alternatives
//! of which at most one is active. The active index comes from exactly one
//! discriminant source: an integer field at a fixed offset, or a selector
//! function over the union value.

use super::{AggregateInfo, FieldDescriptor};
use crate::value::Value;
use std::fmt;
use std::rc::Rc;

/// Computes the active alternative from a union value (`None` = empty).
pub type Selector = Rc<dyn Fn(&Value) -> Option<usize>>;

/// Where a union reads its discriminant.
#[derive(Clone, Default)]
pub enum TagSource {
    /// Not configured yet.
    #[default]
    Unset,
    /// Integer common field at this byte offset; negative values mean empty.
    Offset(usize),
    /// Caller-supplied selector.
    Selector(Selector),
}

impl fmt::Debug for TagSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unset => write!(f, "Unset"),
            Self::Offset(offset) => write!(f, "Offset({})", offset),
            Self::Selector(_) => write!(f, "Selector(..)"),
        }
    }
}

/// Union descriptor data.
#[derive(Debug, Clone, Default)]
pub struct UnionInfo {
    pub(crate) aggregate: AggregateInfo,
    pub(crate) alternatives: Vec<FieldDescriptor>,
    pub(crate) tag: TagSource,
    // Flattened common-field index holding the tag, for `TagSource::Offset`.
    pub(crate) tag_field: Option<usize>,
}

impl UnionInfo {
    /// Common part.
    pub fn aggregate(&self) -> &AggregateInfo {
        &self.aggregate
    }

    /// Tagged alternatives in declaration order.
    pub fn alternatives(&self) -> &[FieldDescriptor] {
        &self.alternatives
    }

    /// Alternative by name.
    pub fn alternative(&self, name: &str) -> Option<(usize, &FieldDescriptor)> {
        self.alternatives
            .iter()
            .enumerate()
            .find(|(_, f)| f.name() == name)
    }

    /// Discriminant source.
    pub fn tag(&self) -> &TagSource {
        &self.tag
    }

    /// Tag offset, if the discriminant lives in a field.
    pub fn tag_offset(&self) -> Option<usize> {
        match self.tag {
            TagSource::Offset(offset) => Some(offset),
            _ => None,
        }
    }
}
