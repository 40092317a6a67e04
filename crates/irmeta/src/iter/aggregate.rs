// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Field iteration over one aggregate level or a range of the inheritance
//! chain.

use super::{Entry, MetaIterator, ObjectRef};
use crate::descriptor::{DescriptorId, FieldDescriptor};

/// Iterates the fields declared by a contiguous run of classes in an
/// object's inheritance chain, root-most class first.
#[derive(Clone)]
pub struct FieldIterator<'a> {
    object: ObjectRef<'a>,
    fields: Vec<&'a FieldDescriptor>,
    // flattened index of `fields[0]`
    start: usize,
    pos: usize,
}

impl<'a> FieldIterator<'a> {
    /// Fields declared by `level` itself.
    pub fn level(object: ObjectRef<'a>, level: DescriptorId) -> Self {
        Self::between(object, Some(level), Some(level))
    }

    /// Fields declared from `start` down to `end`, both inclusive. `None`
    /// stands for the root class and the object's own type.
    pub fn between(
        object: ObjectRef<'a>,
        start: Option<DescriptorId>,
        end: Option<DescriptorId>,
    ) -> Self {
        let registry = object.registry();
        let end = end.unwrap_or(object.descriptor());
        kernel_assert!(
            registry.is_kind_of(object.descriptor(), end),
            "'{}' is not a '{}'",
            object.type_name(),
            registry.name_of(end)
        );
        let chain = registry.base_chain(end);
        let start = start.unwrap_or(chain[0]);
        let Some(from) = chain.iter().position(|level| *level == start) else {
            kernel_fatal!(
                "'{}' is not a base of '{}'",
                registry.name_of(start),
                registry.name_of(end)
            );
        };
        let fields = chain[from..]
            .iter()
            .filter_map(|level| registry.get(*level).aggregate())
            .flat_map(|info| info.fields().iter())
            .collect();
        Self {
            object,
            fields,
            start: registry.level_start(start),
            pos: 0,
        }
    }

    fn entry_at(&self, pos: usize) -> Option<Entry<'a>> {
        let field = *self.fields.get(pos)?;
        let value = self.object.value().fields()?.get(self.start + pos)?;
        let object = ObjectRef::new(
            self.object.registry(),
            self.object.heap(),
            field.descriptor(),
            value,
        );
        Some((Some(field.name()), object))
    }

    /// Field descriptors covered by this iterator.
    pub fn descriptors(&self) -> &[&'a FieldDescriptor] {
        &self.fields
    }

    pub(crate) fn entries(self) -> impl Iterator<Item = Entry<'a>> {
        (0..self.fields.len()).filter_map(move |pos| self.entry_at(pos))
    }
}

impl<'a> MetaIterator<'a> for FieldIterator<'a> {
    fn current(&self) -> Option<ObjectRef<'a>> {
        self.entry_at(self.pos).map(|(_, object)| object)
    }

    fn current_name(&self) -> Option<&'a str> {
        self.fields.get(self.pos).map(|f| f.name())
    }

    fn next(&mut self) {
        self.pos = (self.pos + 1).min(self.fields.len());
    }

    fn first(&mut self) {
        self.pos = 0;
    }

    fn length(&self) -> usize {
        self.fields.len()
    }

    fn boxed_clone(&self) -> Box<dyn MetaIterator<'a> + 'a> {
        Box::new(self.clone())
    }
}
