// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! List element iteration.

use super::{MetaIterator, ObjectRef};
use crate::descriptor::DescriptorId;
use crate::value::Value;

/// Iterates the elements of a list value through its container.
#[derive(Clone)]
pub struct ListIterator<'a> {
    object: ObjectRef<'a>,
    element: DescriptorId,
    items: &'a [Value],
    pos: usize,
}

impl<'a> ListIterator<'a> {
    /// Iterator over the list `object`; fatal for non-lists.
    pub fn new(object: ObjectRef<'a>) -> Self {
        let registry = object.registry();
        let Some(info) = registry.get(object.descriptor()).list() else {
            kernel_fatal!("'{}' is not a list", object.type_name());
        };
        Self {
            object,
            element: info.element(),
            items: info.container().elements(object.value()),
            pos: 0,
        }
    }
}

impl<'a> MetaIterator<'a> for ListIterator<'a> {
    fn current(&self) -> Option<ObjectRef<'a>> {
        let item = self.items.get(self.pos)?;
        Some(ObjectRef::new(
            self.object.registry(),
            self.object.heap(),
            self.element,
            item,
        ))
    }

    fn current_name(&self) -> Option<&'a str> {
        None
    }

    fn next(&mut self) {
        self.pos = (self.pos + 1).min(self.items.len());
    }

    fn first(&mut self) {
        self.pos = 0;
    }

    fn length(&self) -> usize {
        self.items.len()
    }

    fn boxed_clone(&self) -> Box<dyn MetaIterator<'a> + 'a> {
        Box::new(self.clone())
    }
}
