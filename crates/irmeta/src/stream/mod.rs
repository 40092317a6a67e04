// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Object graph streams.
//!
//! [`write_value`] and [`read_value`] walk a value through its descriptor
//! and hand every leaf and pointer to an [`ObjectOutput`] /
//! [`ObjectInput`]. The binary implementations live in
//! [`BinaryWriter`] and [`BinaryReader`]; the clone engine plugs in its own.
//!
//! # Wire format
//!
//! ```text
//! integer      sized int (see codec)
//! string       sized int length | UTF-8 bytes
//! aggregate    fields in flattened order, base fields first
//! union        common fields | [alternative index] | active alternative
//! list         sized int count | elements
//! static ptr   0 | 1 embedded value
//! heap ptr     id (0 = null, 1 = next fresh id)
//!              first sight only: descriptor id | body
//! close        sized int count | ids referenced but never written
//! ```
//!
//! The alternative index is written for unions without a tag field, as a
//! sized int where `u32::MAX` means empty.

pub mod codec;
mod input;
mod output;

pub use input::BinaryReader;
pub use output::BinaryWriter;

use crate::descriptor::{
    DescriptorId, DescriptorKind, Hooks, InitHook, PointerInfo, PointerStrategy, TagSource,
    UnionInfo,
};
use crate::heap::{Handle, Heap};
use crate::registry::Registry;
use crate::value::Value;
use std::collections::HashSet;

/// Alternative index meaning "no active alternative".
pub const NO_ALTERNATIVE: u32 = u32::MAX;

/// Sink of a value walk.
pub trait ObjectOutput {
    /// Integer leaf.
    fn write_int(&mut self, value: i128);

    /// String leaf.
    fn write_str(&mut self, value: &str);

    /// Owning pointer: the pointee is written in full on first sight.
    fn write_owning_pointer(
        &mut self,
        registry: &Registry,
        heap: &Heap,
        info: &PointerInfo,
        target: Option<Handle>,
    );

    /// Defining pointer; same wire shape as owning.
    fn write_defining_pointer(
        &mut self,
        registry: &Registry,
        heap: &Heap,
        info: &PointerInfo,
        target: Option<Handle>,
    ) {
        self.write_owning_pointer(registry, heap, info, target);
    }

    /// Reference pointer; same wire shape as owning so sharing survives.
    fn write_reference_pointer(
        &mut self,
        registry: &Registry,
        heap: &Heap,
        info: &PointerInfo,
        target: Option<Handle>,
    ) {
        self.write_owning_pointer(registry, heap, info, target);
    }

    /// Static pointer: presence flag, then the embedded value.
    fn write_static_pointer(
        &mut self,
        registry: &Registry,
        heap: &Heap,
        info: &PointerInfo,
        target: Option<&Value>,
    ) {
        match target {
            Some(inner) => {
                self.write_int(1);
                write_value(self, registry, heap, info.base(), inner);
            }
            None => self.write_int(0),
        }
    }
}

/// Source of a value walk.
pub trait ObjectInput {
    /// Integer leaf.
    fn read_int(&mut self) -> i128;

    /// String leaf.
    fn read_str(&mut self) -> String;

    /// Owning pointer.
    fn read_owning_pointer(
        &mut self,
        registry: &Registry,
        heap: &mut Heap,
        info: &PointerInfo,
    ) -> Option<Handle>;

    /// Defining pointer.
    fn read_defining_pointer(
        &mut self,
        registry: &Registry,
        heap: &mut Heap,
        info: &PointerInfo,
    ) -> Option<Handle> {
        self.read_owning_pointer(registry, heap, info)
    }

    /// Reference pointer.
    fn read_reference_pointer(
        &mut self,
        registry: &Registry,
        heap: &mut Heap,
        info: &PointerInfo,
    ) -> Option<Handle> {
        self.read_owning_pointer(registry, heap, info)
    }

    /// Static pointer.
    fn read_static_pointer(
        &mut self,
        registry: &Registry,
        heap: &mut Heap,
        info: &PointerInfo,
    ) -> Option<Box<Value>> {
        match self.read_int() {
            0 => None,
            1 => {
                let mut inner = registry.create_empty_value(info.base());
                read_value(self, registry, heap, info.base(), &mut inner);
                Some(Box::new(inner))
            }
            flag => kernel_fatal!("bad static pointer flag {}", flag),
        }
    }
}

fn checked_int(registry: &Registry, id: DescriptorId, value: i128) -> i128 {
    let descriptor = registry.get(id);
    if let Some(info) = descriptor.integer() {
        let (min, max) = info.range(descriptor.size());
        kernel_assert!(
            (min..=max).contains(&value),
            "{} out of range for '{}'",
            value,
            descriptor.name()
        );
    }
    value
}

// Unions without a tag field carry their alternative index on the wire.
fn writes_alternative_index(tag: &TagSource, alternatives: usize) -> bool {
    !matches!(tag, TagSource::Offset(_)) && alternatives > 0
}

/// Write `value`, an instance of `id`.
pub fn write_value<O: ObjectOutput + ?Sized>(
    out: &mut O,
    registry: &Registry,
    heap: &Heap,
    id: DescriptorId,
    value: &Value,
) {
    let descriptor = registry.get(id);
    match descriptor.kind() {
        DescriptorKind::Integer(_) => {
            let Some(v) = value.as_int() else {
                kernel_fatal!("'{}' applied to a non-integer value", descriptor.name());
            };
            out.write_int(checked_int(registry, id, v));
        }
        DescriptorKind::String => match value.as_str() {
            Some(s) => out.write_str(s),
            None => kernel_fatal!("'{}' applied to a non-string value", descriptor.name()),
        },
        DescriptorKind::Aggregate(_) | DescriptorKind::Union(_) => {
            let fields = registry.fields(id);
            let values = value.fields().unwrap_or_default();
            kernel_assert!(
                fields.len() == values.len(),
                "'{}' has {} fields but the value holds {}",
                descriptor.name(),
                fields.len(),
                values.len()
            );
            for (field, v) in fields.iter().zip(values) {
                write_value(out, registry, heap, field.descriptor(), v);
            }
            if let Some(info) = descriptor.union() {
                let active = registry.active_value(id, value);
                if writes_alternative_index(info.tag(), info.alternatives().len()) {
                    let index = active.map_or(i128::from(NO_ALTERNATIVE), |(i, _)| i as i128);
                    out.write_int(index);
                }
                if let Some((index, alternative)) = active {
                    let target = info.alternatives()[index].descriptor();
                    write_value(out, registry, heap, target, alternative);
                }
            }
        }
        DescriptorKind::Pointer(info) => match (info.strategy(), value) {
            (PointerStrategy::Static, Value::Static(inner)) => {
                out.write_static_pointer(registry, heap, info, inner.as_deref());
            }
            (PointerStrategy::Owning, Value::Pointer(target)) => {
                out.write_owning_pointer(registry, heap, info, *target);
            }
            (PointerStrategy::Defining, Value::Pointer(target)) => {
                out.write_defining_pointer(registry, heap, info, *target);
            }
            (PointerStrategy::Reference, Value::Pointer(target)) => {
                out.write_reference_pointer(registry, heap, info, *target);
            }
            _ => kernel_fatal!("pointer '{}' holds a mismatched value", descriptor.name()),
        },
        DescriptorKind::List(info) => {
            let items = info.container().elements(value);
            out.write_int(items.len() as i128);
            for item in items {
                write_value(out, registry, heap, info.element(), item);
            }
        }
    }
}

/// Read into `value`, a constructed instance of `id`.
pub fn read_value<I: ObjectInput + ?Sized>(
    input: &mut I,
    registry: &Registry,
    heap: &mut Heap,
    id: DescriptorId,
    value: &mut Value,
) {
    let descriptor = registry.get(id);
    match descriptor.kind() {
        DescriptorKind::Integer(_) => {
            let v = input.read_int();
            *value = Value::Int(checked_int(registry, id, v));
        }
        DescriptorKind::String => *value = Value::Str(input.read_str()),
        DescriptorKind::Aggregate(_) | DescriptorKind::Union(_) => {
            let fields: Vec<DescriptorId> =
                registry.fields(id).iter().map(|f| f.descriptor()).collect();
            let Some(values) = value.fields_mut() else {
                kernel_fatal!("'{}' applied to a non-aggregate value", descriptor.name());
            };
            kernel_assert!(
                fields.len() == values.len(),
                "'{}' has {} fields but the value holds {}",
                descriptor.name(),
                fields.len(),
                values.len()
            );
            for (field, slot) in fields.into_iter().zip(values.iter_mut()) {
                read_value(input, registry, heap, field, slot);
            }
            if let Some(info) = descriptor.union() {
                read_alternative(input, registry, heap, id, value, info);
            }
        }
        DescriptorKind::Pointer(info) => {
            *value = match info.strategy() {
                PointerStrategy::Static => {
                    Value::Static(input.read_static_pointer(registry, heap, info))
                }
                PointerStrategy::Owning => {
                    Value::Pointer(input.read_owning_pointer(registry, heap, info))
                }
                PointerStrategy::Defining => {
                    Value::Pointer(input.read_defining_pointer(registry, heap, info))
                }
                PointerStrategy::Reference => {
                    Value::Pointer(input.read_reference_pointer(registry, heap, info))
                }
            };
        }
        DescriptorKind::List(info) => {
            let count = input.read_int();
            let Ok(count) = usize::try_from(count) else {
                kernel_fatal!("negative element count {} for '{}'", count, descriptor.name());
            };
            let mut items = info.container().construct(count);
            for _ in 0..count {
                let mut item = registry.create_empty_value(info.element());
                read_value(input, registry, heap, info.element(), &mut item);
                items.push(item);
            }
            *value = Value::List(items);
        }
    }
}

fn read_alternative<I: ObjectInput + ?Sized>(
    input: &mut I,
    registry: &Registry,
    heap: &mut Heap,
    id: DescriptorId,
    value: &mut Value,
    info: &UnionInfo,
) {
    let tag = info.tag();
    let index = if writes_alternative_index(tag, info.alternatives().len()) {
        let raw = input.read_int();
        let index = if raw == i128::from(NO_ALTERNATIVE) {
            None
        } else {
            match usize::try_from(raw) {
                Ok(index) => Some(index),
                Err(_) => kernel_fatal!("bad alternative index {}", raw),
            }
        };
        if matches!(tag, TagSource::Selector(_)) {
            let selected = registry.active_alternative(id, value);
            kernel_assert!(
                selected == index,
                "union '{}' selector picks {:?} but the stream holds {:?}",
                registry.name_of(id),
                selected,
                index
            );
        }
        index
    } else {
        registry.active_alternative(id, value)
    };
    let active = index.map(|index| {
        let Some(field) = info.alternatives().get(index) else {
            kernel_fatal!("union '{}' has no alternative {}", registry.name_of(id), index);
        };
        let mut alternative = registry.create_empty_value(field.descriptor());
        read_value(input, registry, heap, field.descriptor(), &mut alternative);
        (index, Box::new(alternative))
    });
    match value.as_union_mut() {
        Some(union) => union.active = active,
        None => kernel_fatal!("union '{}' applied to a non-union value", registry.name_of(id)),
    }
}

fn init_hooks(registry: &Registry, id: DescriptorId) -> (Option<InitHook>, Option<InitHook>) {
    let chain = registry.base_chain(id);
    let nearest = |pick: fn(&Hooks) -> Option<&InitHook>| {
        chain
            .iter()
            .rev()
            .find_map(|level| pick(&registry.get(*level).hooks).cloned())
    };
    (nearest(|h| h.pre_init.as_ref()), nearest(|h| h.post_init.as_ref()))
}

/// Two-phase completion of a freshly read object: the nearest pre-init
/// hook, then every owned pointee not initialized yet, then the nearest
/// post-init hook.
pub fn initialize_object(
    registry: &Registry,
    heap: &mut Heap,
    handle: Handle,
    done: &mut HashSet<Handle>,
) {
    if !done.insert(handle) {
        return;
    }
    let Some(id) = heap.descriptor_of(handle) else {
        kernel_fatal!("initialize of dead object {}", handle);
    };
    let (pre, post) = init_hooks(registry, id);
    let mut value = heap.take_value(handle);
    if let Some(pre) = pre {
        pre(&mut value);
    }
    let mut owned = Vec::new();
    owned_targets(registry, id, &value, &mut owned);
    for child in owned {
        if heap.contains(child) {
            initialize_object(registry, heap, child, done);
        }
    }
    if let Some(post) = post {
        post(&mut value);
    }
    heap.restore_value(handle, value);
}

/// Heap objects owned by `value` (owning pointers, looking through
/// embedded members, lists and static pointees).
pub(crate) fn owned_targets(
    registry: &Registry,
    id: DescriptorId,
    value: &Value,
    out: &mut Vec<Handle>,
) {
    match registry.get(id).kind() {
        DescriptorKind::Aggregate(_) | DescriptorKind::Union(_) => {
            let fields = registry.fields(id);
            for (field, v) in fields.iter().zip(value.fields().unwrap_or_default()) {
                owned_targets(registry, field.descriptor(), v, out);
            }
            if let Some(info) = registry.get(id).union() {
                if let Some(union) = value.as_union() {
                    if let Some((index, alternative)) = &union.active {
                        if let Some(field) = info.alternatives().get(*index) {
                            owned_targets(registry, field.descriptor(), alternative, out);
                        }
                    }
                }
            }
        }
        DescriptorKind::Pointer(info) => match (info.strategy(), value) {
            (PointerStrategy::Owning, Value::Pointer(Some(target))) => out.push(*target),
            (PointerStrategy::Static, Value::Static(Some(inner))) => {
                owned_targets(registry, info.base(), inner, out);
            }
            _ => {}
        },
        DescriptorKind::List(info) => {
            for item in info.container().elements(value) {
                owned_targets(registry, info.element(), item, out);
            }
        }
        DescriptorKind::Integer(_) | DescriptorKind::String => {}
    }
}
