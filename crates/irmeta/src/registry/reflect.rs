// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Self-description: descriptors as heap objects and back.
//!
//! [`Registry::lower`] turns every installed descriptor into an object of
//! the matching bootstrap type so the registry itself can be streamed.
//! `lift` converts such an object back into descriptor data; pointers to
//! other descriptor objects are resolved by the caller.

use super::Registry;
use crate::descriptor::{
    AggregateInfo, Descriptor, DescriptorId, DescriptorKind, FieldDescriptor, IntegerInfo,
    ListInfo, PointerInfo, SequenceContainer, TagSource, UnionInfo,
};
use crate::heap::{Handle, Heap};
use crate::value::Value;
use std::collections::HashMap;
use std::rc::Rc;
use tracing::{debug, warn};

/// Descriptor data lifted from a descriptor object.
#[derive(Debug, Clone)]
pub(crate) struct LiftedDescriptor {
    pub name: String,
    pub size: usize,
    pub align: usize,
    pub kind: DescriptorKind,
}

impl Registry {
    /// Value of field `name` of an instance of `id`; fatal if absent.
    pub fn field_value<'v>(&self, id: DescriptorId, value: &'v Value, name: &str) -> &'v Value {
        let Some((index, _)) = self.field_by_name(id, name) else {
            kernel_fatal!("'{}' has no field '{}'", self.name_of(id), name);
        };
        match value.fields().and_then(|fields| fields.get(index)) {
            Some(field) => field,
            None => kernel_fatal!("value does not match '{}'", self.name_of(id)),
        }
    }

    /// Overwrite field `name` of an instance of `id`.
    pub fn set_field_value(&self, id: DescriptorId, value: &mut Value, name: &str, new: Value) {
        let Some((index, _)) = self.field_by_name(id, name) else {
            kernel_fatal!("'{}' has no field '{}'", self.name_of(id), name);
        };
        match value.fields_mut().and_then(|fields| fields.get_mut(index)) {
            Some(field) => *field = new,
            None => kernel_fatal!("value does not match '{}'", self.name_of(id)),
        }
    }

    fn int_field(&self, id: DescriptorId, value: &Value, name: &str) -> i128 {
        match self.field_value(id, value, name).as_int() {
            Some(v) => v,
            None => kernel_fatal!("field '{}' of '{}' is not an integer", name, self.name_of(id)),
        }
    }

    fn str_field<'v>(&self, id: DescriptorId, value: &'v Value, name: &str) -> &'v str {
        match self.field_value(id, value, name).as_str() {
            Some(v) => v,
            None => kernel_fatal!("field '{}' of '{}' is not a string", name, self.name_of(id)),
        }
    }

    fn pointer_field(&self, id: DescriptorId, value: &Value, name: &str) -> Option<Handle> {
        match self.field_value(id, value, name).as_pointer() {
            Some(p) => p,
            None => kernel_fatal!("field '{}' of '{}' is not a pointer", name, self.name_of(id)),
        }
    }

    fn required_pointer(&self, id: DescriptorId, value: &Value, name: &str) -> Handle {
        match self.pointer_field(id, value, name) {
            Some(handle) => handle,
            None => kernel_fatal!("field '{}' of '{}' is null", name, self.name_of(id)),
        }
    }

    fn list_field<'v>(&self, id: DescriptorId, value: &'v Value, name: &str) -> &'v [Value] {
        match self.field_value(id, value, name).as_list() {
            Some(items) => items,
            None => kernel_fatal!("field '{}' of '{}' is not a list", name, self.name_of(id)),
        }
    }

    fn meta_type_of(&self, descriptor: &Descriptor) -> DescriptorId {
        let b = self.builtins();
        match descriptor.kind() {
            DescriptorKind::Aggregate(_) => b.aggregate_descriptor,
            DescriptorKind::Union(_) => b.union_descriptor,
            DescriptorKind::Pointer(_) => b.pointer_descriptor,
            DescriptorKind::List(_) => b.list_descriptor,
            DescriptorKind::Integer(_) => b.integer_descriptor,
            DescriptorKind::String => b.string_descriptor,
        }
    }

    /// Reflect every installed descriptor into `heap`. Returns the
    /// registry object whose `descriptors` list owns them, in id order.
    pub fn lower(&self, heap: &mut Heap) -> Handle {
        let b = self.builtins().clone();
        let mut objects: HashMap<DescriptorId, Handle> = HashMap::new();
        for descriptor in self.iter() {
            let meta = self.meta_type_of(descriptor);
            objects.insert(descriptor.id(), self.create_empty_object(heap, meta));
        }
        let object = |id: DescriptorId| match objects.get(&id) {
            Some(handle) => Value::Pointer(Some(*handle)),
            None => kernel_fatal!("descriptor {} not lowered", id),
        };

        for descriptor in self.iter() {
            let meta = self.meta_type_of(descriptor);
            let mut value = self.create_empty_value(meta);
            self.set_field_value(meta, &mut value, "name", descriptor.name().into());
            self.set_field_value(meta, &mut value, "id", descriptor.id().get().into());
            self.set_field_value(meta, &mut value, "size", (descriptor.size() as u64).into());
            self.set_field_value(
                meta,
                &mut value,
                "alignment",
                (descriptor.alignment() as u64).into(),
            );
            if let Some(info) = descriptor.aggregate() {
                let base = info.base.map_or(Value::Pointer(None), object);
                self.set_field_value(meta, &mut value, "base", base);
                let fields = self.lower_fields(heap, &info.fields, object);
                self.set_field_value(meta, &mut value, "fields", fields);
                let virtuals = info
                    .virtual_fields
                    .iter()
                    .map(|(name, path)| {
                        let mut v = self.create_empty_value(b.virtual_field);
                        self.set_field_value(b.virtual_field, &mut v, "name", name.as_str().into());
                        self.set_field_value(b.virtual_field, &mut v, "path", path.as_str().into());
                        v
                    })
                    .collect();
                self.set_field_value(meta, &mut value, "virtual_fields", Value::List(virtuals));
                self.set_field_value(meta, &mut value, "polymorphic", info.polymorphic.into());
            }
            match descriptor.kind() {
                DescriptorKind::Union(info) => {
                    let tag = match &info.tag {
                        TagSource::Offset(offset) => *offset as i128,
                        TagSource::Selector(_) => {
                            warn!(name = %descriptor.name(), "union selector is not persisted");
                            -1
                        }
                        TagSource::Unset => -1,
                    };
                    self.set_field_value(meta, &mut value, "tag_offset", Value::Int(tag));
                    let alternatives = self.lower_fields(heap, &info.alternatives, object);
                    self.set_field_value(meta, &mut value, "alternatives", alternatives);
                }
                DescriptorKind::Pointer(info) => {
                    self.set_field_value(meta, &mut value, "base_type", object(info.base));
                    self.set_field_value(meta, &mut value, "owns", info.owns.into());
                    self.set_field_value(meta, &mut value, "is_static", info.is_static.into());
                    self.set_field_value(
                        meta,
                        &mut value,
                        "needs_cloning",
                        info.needs_cloning.into(),
                    );
                }
                DescriptorKind::List(info) => {
                    self.set_field_value(meta, &mut value, "element", object(info.element));
                    self.set_field_value(
                        meta,
                        &mut value,
                        "container",
                        info.container.kind().into(),
                    );
                }
                DescriptorKind::Integer(info) => {
                    self.set_field_value(meta, &mut value, "is_signed", info.signed.into());
                }
                DescriptorKind::Aggregate(_) | DescriptorKind::String => {}
            }
            if let Some(handle) = objects.get(&descriptor.id()) {
                *heap.value_mut(*handle) = value;
            }
        }

        let list = self.iter().map(|d| object(d.id())).collect();
        let root = self.create_empty_object(heap, b.registry);
        let mut value = self.create_empty_value(b.registry);
        self.set_field_value(b.registry, &mut value, "descriptors", Value::List(list));
        *heap.value_mut(root) = value;
        debug!(descriptors = objects.len(), "lowered registry");
        root
    }

    fn lower_fields(
        &self,
        heap: &mut Heap,
        fields: &[FieldDescriptor],
        object: impl Fn(DescriptorId) -> Value,
    ) -> Value {
        let meta = self.builtins().field_description;
        let items = fields
            .iter()
            .map(|field| {
                let mut v = self.create_empty_value(meta);
                self.set_field_value(meta, &mut v, "offset", (field.offset() as u64).into());
                self.set_field_value(meta, &mut v, "descriptor", object(field.descriptor()));
                self.set_field_value(meta, &mut v, "name", field.name().into());
                Value::Pointer(Some(heap.alloc(meta, v)))
            })
            .collect();
        Value::List(items)
    }

    /// Descriptor objects listed by a lowered registry object.
    pub fn lowered_descriptors(&self, heap: &Heap, root: Handle) -> Vec<Handle> {
        let meta = self.builtins().registry;
        self.list_field(meta, heap.value(root), "descriptors")
            .iter()
            .filter_map(|item| item.as_pointer().flatten())
            .collect()
    }

    /// Type name stored in a descriptor object.
    pub fn lowered_name<'h>(&self, heap: &'h Heap, object: Handle) -> &'h str {
        self.str_field(self.builtins().descriptor, heap.value(object), "name")
    }

    /// Id a descriptor object was lowered from.
    pub fn lowered_id(&self, heap: &Heap, object: Handle) -> u32 {
        let raw = self.int_field(self.builtins().descriptor, heap.value(object), "id");
        u32::try_from(raw).unwrap_or(0)
    }

    /// Element object and container kind of a list descriptor object;
    /// `None` for other kinds.
    pub(crate) fn lowered_list<'h>(
        &self,
        heap: &'h Heap,
        object: Handle,
    ) -> Option<(Handle, &'h str)> {
        let meta = self.builtins().list_descriptor;
        if heap.descriptor_of(object) != Some(meta) {
            return None;
        }
        let value = heap.value(object);
        let element = self.required_pointer(meta, value, "element");
        Some((element, self.str_field(meta, value, "container")))
    }

    /// Convert a descriptor object into descriptor data. `resolve` maps
    /// descriptor objects referenced by it to ids.
    pub(crate) fn lift(
        &self,
        heap: &Heap,
        object: Handle,
        resolve: &mut dyn FnMut(Handle) -> DescriptorId,
    ) -> LiftedDescriptor {
        let b = self.builtins().clone();
        let Some(meta) = heap.descriptor_of(object) else {
            kernel_fatal!("lift of dead object {}", object);
        };
        let value = heap.value(object);
        let name = self.str_field(meta, value, "name").to_string();
        let size = self.int_field(meta, value, "size") as usize;
        let align = self.int_field(meta, value, "alignment") as usize;

        let kind = if meta == b.aggregate_descriptor || meta == b.union_descriptor {
            let base = self.pointer_field(meta, value, "base").map(|h| resolve(h));
            let polymorphic = self.int_field(meta, value, "polymorphic") != 0;
            let mut aggregate = AggregateInfo::new(base, polymorphic);
            aggregate.fields = self.lift_fields(heap, meta, value, "fields", resolve);
            aggregate.virtual_fields = self
                .list_field(meta, value, "virtual_fields")
                .iter()
                .map(|v| {
                    (
                        self.str_field(b.virtual_field, v, "name").to_string(),
                        self.str_field(b.virtual_field, v, "path").to_string(),
                    )
                })
                .collect();
            if meta == b.union_descriptor {
                let tag_offset = self.int_field(meta, value, "tag_offset");
                DescriptorKind::Union(UnionInfo {
                    aggregate,
                    alternatives: self.lift_fields(heap, meta, value, "alternatives", resolve),
                    tag: match usize::try_from(tag_offset) {
                        Ok(offset) => TagSource::Offset(offset),
                        Err(_) => TagSource::Unset,
                    },
                    tag_field: None,
                })
            } else {
                DescriptorKind::Aggregate(aggregate)
            }
        } else if meta == b.pointer_descriptor {
            DescriptorKind::Pointer(PointerInfo {
                base: resolve(self.required_pointer(meta, value, "base_type")),
                owns: self.int_field(meta, value, "owns") != 0,
                is_static: self.int_field(meta, value, "is_static") != 0,
                needs_cloning: self.int_field(meta, value, "needs_cloning") != 0,
            })
        } else if meta == b.list_descriptor {
            let container = SequenceContainer::for_kind(self.str_field(meta, value, "container"));
            DescriptorKind::List(ListInfo {
                element: resolve(self.required_pointer(meta, value, "element")),
                container: Rc::new(container),
            })
        } else if meta == b.integer_descriptor {
            DescriptorKind::Integer(IntegerInfo {
                signed: self.int_field(meta, value, "is_signed") != 0,
            })
        } else if meta == b.string_descriptor {
            DescriptorKind::String
        } else {
            kernel_fatal!("object {} of type '{}' is not a descriptor", object, self.name_of(meta))
        };
        LiftedDescriptor {
            name,
            size,
            align,
            kind,
        }
    }

    fn lift_fields(
        &self,
        heap: &Heap,
        meta: DescriptorId,
        value: &Value,
        list: &str,
        resolve: &mut dyn FnMut(Handle) -> DescriptorId,
    ) -> Vec<FieldDescriptor> {
        let field_meta = self.builtins().field_description;
        self.list_field(meta, value, list)
            .iter()
            .map(|item| {
                let Some(Some(handle)) = item.as_pointer() else {
                    kernel_fatal!("null entry in field list '{}'", list);
                };
                let field = heap.value(handle);
                let Some(descriptor) = self.pointer_field(field_meta, field, "descriptor") else {
                    kernel_fatal!("field without a descriptor in '{}'", list);
                };
                FieldDescriptor::new(
                    self.int_field(field_meta, field, "offset") as usize,
                    resolve(descriptor),
                    self.str_field(field_meta, field, "name"),
                )
            })
            .collect()
    }

    /// Bind the tag field of a union whose tag offset came from a lifted
    /// descriptor.
    pub(crate) fn bind_tag_field(&mut self, union: DescriptorId) {
        let Some(offset) = self.get(union).union().and_then(|u| u.tag_offset()) else {
            return;
        };
        let field = self.locate_tag_field(union, offset);
        if let DescriptorKind::Union(info) = &mut self.get_mut(union).kind {
            info.tag_field = Some(field);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lower_lists_every_descriptor() {
        let registry = Registry::new();
        let mut heap = Heap::new();
        let root = registry.lower(&mut heap);
        let objects = registry.lowered_descriptors(&heap, root);
        assert_eq!(objects.len(), registry.iter().count());
        assert_eq!(registry.lowered_name(&heap, objects[0]), "Descriptor");
        assert_eq!(registry.lowered_id(&heap, objects[0]), 1);
    }

    #[test]
    fn test_lift_inverts_lower() {
        let mut registry = Registry::new();
        let b = registry.builtins().clone();
        let point = registry
            .aggregate("Point")
            .field("x", b.i32)
            .field("y", b.i32)
            .virtual_field("both", "x;y")
            .build();
        let mut heap = Heap::new();
        let root = registry.lower(&mut heap);
        let objects = registry.lowered_descriptors(&heap, root);
        let by_handle: HashMap<Handle, DescriptorId> = objects
            .iter()
            .map(|h| (*h, DescriptorId::from_raw(registry.lowered_id(&heap, *h)).expect("id")))
            .collect();
        let object = objects
            .iter()
            .copied()
            .find(|h| registry.lowered_name(&heap, *h) == "Point")
            .expect("lowered point");
        let lifted = registry.lift(&heap, object, &mut |h| by_handle[&h]);
        assert_eq!(lifted.name, "Point");
        assert_eq!((lifted.size, lifted.align), (8, 4));
        let DescriptorKind::Aggregate(info) = lifted.kind else {
            panic!("expected aggregate");
        };
        assert_eq!(info.fields, registry.get(point).aggregate().expect("agg").fields);
        assert_eq!(info.virtual_fields, vec![("both".to_string(), "x;y".to_string())]);
    }
}
