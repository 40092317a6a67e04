// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Read surface: typed accessor views and field/element iterators.
//!
//! [`ObjectRef`] pairs a value with the descriptor that interprets it. Every
//! iterator yields `ObjectRef`s, so a printer can walk any registered type
//! without knowing it:
//!
//! ```
//! use irmeta::{Heap, ObjectRef, Registry, Value};
//!
//! let mut registry = Registry::new();
//! let i32_id = registry.builtins().i32;
//! let point = registry.aggregate("Point").field("x", i32_id).field("y", i32_id).build();
//! let mut heap = Heap::new();
//! let h = heap.alloc(point, Value::Aggregate(vec![Value::Int(3), Value::Int(4)]));
//!
//! let names: Vec<_> = ObjectRef::object(&registry, &heap, h)
//!     .elements()
//!     .map(|(name, field)| format!("{}={}", name.unwrap_or("?"), field.as_int()))
//!     .collect();
//! assert_eq!(names, ["x=3", "y=4"]);
//! ```

mod aggregate;
mod list;
mod virtual_path;

pub use aggregate::FieldIterator;
pub use list::ListIterator;
pub use virtual_path::VirtualIterator;
pub(crate) use virtual_path::VirtualNode;

use crate::descriptor::{DescriptorId, DescriptorKind};
use crate::heap::{Handle, Heap};
use crate::registry::Registry;
use crate::value::Value;
use std::fmt;
use std::rc::Rc;

/// Polymorphic cursor over named or anonymous sub-values.
pub trait MetaIterator<'a> {
    /// Value under the cursor.
    fn current(&self) -> Option<ObjectRef<'a>>;

    /// Descriptor of the value under the cursor.
    fn current_type(&self) -> Option<DescriptorId> {
        self.current().map(|object| object.descriptor())
    }

    /// Field name under the cursor; `None` for list elements.
    fn current_name(&self) -> Option<&'a str>;

    /// False once the cursor ran past the end.
    fn is_valid(&self) -> bool {
        self.current().is_some()
    }

    /// Advance.
    fn next(&mut self);

    /// Rewind to the first item.
    fn first(&mut self);

    /// Number of items.
    fn length(&self) -> usize;

    /// Independent copy at the same position.
    fn boxed_clone(&self) -> Box<dyn MetaIterator<'a> + 'a>;
}

/// A value viewed through its descriptor.
#[derive(Clone, Copy)]
pub struct ObjectRef<'a> {
    registry: &'a Registry,
    heap: &'a Heap,
    descriptor: DescriptorId,
    value: &'a Value,
}

impl fmt::Debug for ObjectRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectRef")
            .field("type", &self.type_name())
            .field("value", self.value)
            .finish()
    }
}

impl<'a> ObjectRef<'a> {
    /// View `value` as an instance of `descriptor`.
    pub fn new(
        registry: &'a Registry,
        heap: &'a Heap,
        descriptor: DescriptorId,
        value: &'a Value,
    ) -> Self {
        Self {
            registry,
            heap,
            descriptor,
            value,
        }
    }

    /// View the heap object at `handle` with its runtime type.
    pub fn object(registry: &'a Registry, heap: &'a Heap, handle: Handle) -> Self {
        let Some(descriptor) = heap.descriptor_of(handle) else {
            kernel_fatal!("no object at {}", handle);
        };
        Self::new(registry, heap, descriptor, heap.value(handle))
    }

    /// Registry.
    pub fn registry(&self) -> &'a Registry {
        self.registry
    }

    /// Heap the view dereferences pointers in.
    pub fn heap(&self) -> &'a Heap {
        self.heap
    }

    /// Descriptor.
    pub fn descriptor(&self) -> DescriptorId {
        self.descriptor
    }

    /// Underlying value.
    pub fn value(&self) -> &'a Value {
        self.value
    }

    /// Descriptor name.
    pub fn type_name(&self) -> &'a str {
        self.registry.name_of(self.descriptor)
    }

    fn with(&self, descriptor: DescriptorId, value: &'a Value) -> Self {
        Self::new(self.registry, self.heap, descriptor, value)
    }

    /// Field by name, inherited ones included.
    pub fn try_field(&self, name: &str) -> Option<ObjectRef<'a>> {
        let (index, field) = self.registry.field_by_name(self.descriptor, name)?;
        let value = self.value.fields()?.get(index)?;
        Some(self.with(field.descriptor(), value))
    }

    /// Field by name; fatal if absent.
    pub fn field(&self, name: &str) -> ObjectRef<'a> {
        match self.try_field(name) {
            Some(field) => field,
            None => kernel_fatal!("'{}' has no field '{}'", self.type_name(), name),
        }
    }

    /// Field by flattened index; fatal if out of range.
    pub fn field_at(&self, index: usize) -> ObjectRef<'a> {
        let field = self.registry.field(self.descriptor, index);
        match self.value.fields().and_then(|fields| fields.get(index)) {
            Some(value) => self.with(field.descriptor(), value),
            None => kernel_fatal!("value does not match '{}'", self.type_name()),
        }
    }

    /// Active alternative of a union, with its name.
    pub fn alternative(&self) -> Option<(&'a str, ObjectRef<'a>)> {
        let registry = self.registry;
        let (index, value) = registry.active_value(self.descriptor, self.value)?;
        let info = registry.get(self.descriptor).union()?;
        let field = info.alternatives().get(index)?;
        Some((field.name(), self.with(field.descriptor(), value)))
    }

    /// Pointee of a pointer; `None` when null. Polymorphic pointees are
    /// viewed with their runtime type.
    pub fn deref(&self) -> Option<ObjectRef<'a>> {
        let Some(info) = self.registry.get(self.descriptor).pointer() else {
            kernel_fatal!("deref of non-pointer '{}'", self.type_name());
        };
        match self.value {
            Value::Pointer(Some(handle)) => {
                let descriptor = self.registry.runtime_descriptor(self.heap, *handle, info.base());
                Some(self.with(descriptor, self.heap.value(*handle)))
            }
            Value::Static(Some(inner)) => Some(self.with(info.base(), inner)),
            Value::Pointer(None) | Value::Static(None) => None,
            _ => kernel_fatal!("pointer '{}' holds a non-pointer value", self.type_name()),
        }
    }

    /// Target of an owning/defining/reference pointer.
    pub fn handle(&self) -> Option<Handle> {
        self.value.as_pointer().flatten()
    }

    /// Integer payload; fatal for other kinds.
    pub fn as_int(&self) -> i128 {
        match self.value.as_int() {
            Some(v) => v,
            None => kernel_fatal!("'{}' is not an integer", self.type_name()),
        }
    }

    /// String payload; fatal for other kinds.
    pub fn as_str(&self) -> &'a str {
        match self.value.as_str() {
            Some(v) => v,
            None => kernel_fatal!("'{}' is not a string", self.type_name()),
        }
    }

    /// Number of list elements.
    pub fn len(&self) -> usize {
        ListIterator::new(*self).length()
    }

    /// True for an empty list.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Default iterator for the descriptor kind: all fields of an
    /// aggregate, declared fields plus the active alternative of a union,
    /// the elements of a list, nothing for leaves.
    pub fn iter(&self) -> Box<dyn MetaIterator<'a> + 'a> {
        match self.registry.get(self.descriptor).kind() {
            DescriptorKind::Aggregate(_) => Box::new(FieldIterator::between(*self, None, None)),
            DescriptorKind::Union(_) => Box::new(self.union_iter()),
            DescriptorKind::List(_) => Box::new(ListIterator::new(*self)),
            _ => Box::new(EntryIterator::new(Vec::new())),
        }
    }

    fn union_iter(&self) -> EntryIterator<'a> {
        let mut entries: Vec<Entry<'a>> = FieldIterator::level(*self, self.descriptor)
            .entries()
            .collect();
        if let Some((name, alternative)) = self.alternative() {
            entries.push((Some(name), alternative));
        }
        EntryIterator::new(entries)
    }

    /// Fields declared from `start` down to `end` in the inheritance chain,
    /// both inclusive; `None` means the root and the runtime type.
    pub fn fields_between(
        &self,
        start: Option<DescriptorId>,
        end: Option<DescriptorId>,
    ) -> FieldIterator<'a> {
        FieldIterator::between(*self, start, end)
    }

    /// Iterator over a virtual field.
    pub fn virtual_field(&self, name: &str) -> VirtualIterator<'a> {
        VirtualIterator::new(*self, name)
    }

    /// Adapter over [`ObjectRef::iter`] implementing [`Iterator`].
    pub fn elements(&self) -> Elements<'a> {
        Elements { inner: self.iter() }
    }
}

impl Registry {
    /// Default iterator over `value` viewed as `descriptor`.
    pub fn get_iterator<'a>(
        &'a self,
        heap: &'a Heap,
        descriptor: DescriptorId,
        value: &'a Value,
    ) -> Box<dyn MetaIterator<'a> + 'a> {
        ObjectRef::new(self, heap, descriptor, value).iter()
    }

    /// Fields declared between `start` and `end` in the inheritance chain.
    pub fn get_aggregate_iterator<'a>(
        &'a self,
        heap: &'a Heap,
        descriptor: DescriptorId,
        value: &'a Value,
        start: Option<DescriptorId>,
        end: Option<DescriptorId>,
    ) -> FieldIterator<'a> {
        FieldIterator::between(ObjectRef::new(self, heap, descriptor, value), start, end)
    }

    /// Iterator over the virtual field `name`.
    pub fn get_virtual_iterator<'a>(
        &'a self,
        heap: &'a Heap,
        descriptor: DescriptorId,
        value: &'a Value,
        name: &str,
    ) -> VirtualIterator<'a> {
        VirtualIterator::new(ObjectRef::new(self, heap, descriptor, value), name)
    }
}

/// One iterator item: field name (if any) and the viewed value.
pub type Entry<'a> = (Option<&'a str>, ObjectRef<'a>);

/// Iterator over a materialized list of entries.
#[derive(Clone)]
pub(crate) struct EntryIterator<'a> {
    entries: Rc<Vec<Entry<'a>>>,
    pos: usize,
}

impl<'a> EntryIterator<'a> {
    pub(crate) fn new(entries: Vec<Entry<'a>>) -> Self {
        Self {
            entries: Rc::new(entries),
            pos: 0,
        }
    }
}

impl<'a> MetaIterator<'a> for EntryIterator<'a> {
    fn current(&self) -> Option<ObjectRef<'a>> {
        self.entries.get(self.pos).map(|(_, object)| *object)
    }

    fn current_name(&self) -> Option<&'a str> {
        self.entries.get(self.pos).and_then(|(name, _)| *name)
    }

    fn next(&mut self) {
        self.pos = (self.pos + 1).min(self.entries.len());
    }

    fn first(&mut self) {
        self.pos = 0;
    }

    fn length(&self) -> usize {
        self.entries.len()
    }

    fn boxed_clone(&self) -> Box<dyn MetaIterator<'a> + 'a> {
        Box::new(self.clone())
    }
}

/// [`Iterator`] adapter over a [`MetaIterator`].
pub struct Elements<'a> {
    inner: Box<dyn MetaIterator<'a> + 'a>,
}

impl<'a> Elements<'a> {
    /// Wrap an iterator; iteration starts at its current position.
    pub fn new(inner: Box<dyn MetaIterator<'a> + 'a>) -> Self {
        Self { inner }
    }
}

impl<'a> Iterator for Elements<'a> {
    type Item = Entry<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let object = self.inner.current()?;
        let name = self.inner.current_name();
        self.inner.next();
        Some((name, object))
    }
}
