// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bootstrap sequence.
//!
//! The registry must describe its own descriptors before it can stream
//! them. Everything below runs once, in a fixed order, from
//! [`Registry::new`](super::Registry::new); the order is the id assignment,
//! so two builds of this crate agree on every bootstrap id.
//!
//! Dependency chain:
//!
//! 1. `Descriptor`, the polymorphic root of every descriptor object
//! 2. the descriptor subclasses that are named by pointer/list types
//! 3. reference and owning pointers to `Descriptor`
//! 4. integers and `String`, then the fields of `Descriptor`
//! 5. `ListDescriptor`, `FieldDescription` and the field list
//! 6. `VirtualField`, then the remaining subclass fields
//! 7. the registry object, then one layout pass over everything

use super::Registry;
use crate::config::{STRING_NAME, USIZE_SIZE};
use crate::descriptor::{DescriptorId, SequenceContainer};
use std::rc::Rc;

/// Ids of the descriptors created by the bootstrap sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Builtins {
    /// Root of all descriptor objects.
    pub descriptor: DescriptorId,
    /// Describes aggregates.
    pub aggregate_descriptor: DescriptorId,
    /// Describes unions.
    pub union_descriptor: DescriptorId,
    /// Describes pointers.
    pub pointer_descriptor: DescriptorId,
    /// Describes lists.
    pub list_descriptor: DescriptorId,
    /// Describes integers.
    pub integer_descriptor: DescriptorId,
    /// Describes strings.
    pub string_descriptor: DescriptorId,
    /// One `(offset, descriptor, name)` triple.
    pub field_description: DescriptorId,
    /// One `(name, path)` virtual field declaration.
    pub virtual_field: DescriptorId,
    /// The registry object written at the head of a persisted graph.
    pub registry: DescriptorId,
    /// `PTR:R:::Descriptor`.
    pub descriptor_ref: DescriptorId,
    /// `PTR:O:::Descriptor`.
    pub descriptor_owner: DescriptorId,
    /// `PTR:O:::FieldDescription`.
    pub field_owner: DescriptorId,
    /// Field list of an aggregate.
    pub field_list: DescriptorId,
    /// Virtual field list of an aggregate.
    pub virtual_list: DescriptorId,
    /// Descriptor list of the registry object.
    pub descriptor_list: DescriptorId,
    pub boolean: DescriptorId,
    pub i8: DescriptorId,
    pub i16: DescriptorId,
    pub i32: DescriptorId,
    pub i64: DescriptorId,
    pub u8: DescriptorId,
    pub u16: DescriptorId,
    pub u32: DescriptorId,
    pub u64: DescriptorId,
    pub usize: DescriptorId,
    /// The string descriptor.
    pub string: DescriptorId,
}

impl Builtins {
    /// The descriptor-describing aggregates, in bootstrap order.
    pub fn meta_types(&self) -> [DescriptorId; 7] {
        [
            self.descriptor,
            self.aggregate_descriptor,
            self.union_descriptor,
            self.pointer_descriptor,
            self.list_descriptor,
            self.integer_descriptor,
            self.string_descriptor,
        ]
    }
}

pub(super) fn run(r: &mut Registry) -> Builtins {
    let descriptor = r.create_object_aggregate("Descriptor", None);
    let aggregate_descriptor = r.create_object_aggregate("AggregateDescriptor", Some(descriptor));
    let pointer_descriptor = r.create_object_aggregate("PointerDescriptor", Some(descriptor));
    let descriptor_ref = r.get_pointer(descriptor, false, false, false);
    let descriptor_owner = r.get_pointer(descriptor, true, false, false);

    let integer_descriptor = r.create_object_aggregate("IntegerDescriptor", Some(descriptor));
    let boolean = r.get_integer("bool", 1, false);
    let i8 = r.get_integer("i8", 1, true);
    let i16 = r.get_integer("i16", 2, true);
    let i32 = r.get_integer("i32", 4, true);
    let i64 = r.get_integer("i64", 8, true);
    let u8 = r.get_integer("u8", 1, false);
    let u16 = r.get_integer("u16", 2, false);
    let u32 = r.get_integer("u32", 4, false);
    let u64 = r.get_integer("u64", 8, false);
    let usize = r.get_integer("usize", USIZE_SIZE, false);
    let string_descriptor = r.create_object_aggregate("StringDescriptor", Some(descriptor));
    let string = r.create_string(STRING_NAME);

    r.add_field(descriptor, "name", string);
    r.add_field(descriptor, "id", u32);
    r.add_field(descriptor, "size", usize);
    r.add_field(descriptor, "alignment", usize);

    let list_descriptor = r.create_object_aggregate("ListDescriptor", Some(descriptor));
    r.add_field(list_descriptor, "element", descriptor_ref);
    r.add_field(list_descriptor, "container", string);

    let field_description = r.create_aggregate("FieldDescription", None);
    r.add_field(field_description, "offset", usize);
    r.add_field(field_description, "descriptor", descriptor_ref);
    r.add_field(field_description, "name", string);
    let field_owner = r.get_pointer(field_description, true, false, false);
    let field_list = r.get_container(
        "LIST:Vec<PTR:O:::FieldDescription>",
        field_owner,
        Rc::new(SequenceContainer::VECTOR),
    );

    let virtual_field = r.create_aggregate("VirtualField", None);
    r.add_field(virtual_field, "name", string);
    r.add_field(virtual_field, "path", string);
    let virtual_list = r.get_container(
        "LIST:Vec<VirtualField>",
        virtual_field,
        Rc::new(SequenceContainer::VECTOR),
    );

    r.add_field(aggregate_descriptor, "base", descriptor_ref);
    r.add_field(aggregate_descriptor, "fields", field_list);
    r.add_field(aggregate_descriptor, "virtual_fields", virtual_list);
    r.add_field(aggregate_descriptor, "polymorphic", boolean);

    let union_descriptor = r.create_object_aggregate("UnionDescriptor", Some(aggregate_descriptor));
    // -1 when the discriminant is not a field
    r.add_field(union_descriptor, "tag_offset", i64);
    r.add_field(union_descriptor, "alternatives", field_list);

    r.add_field(pointer_descriptor, "base_type", descriptor_ref);
    r.add_field(pointer_descriptor, "owns", boolean);
    r.add_field(pointer_descriptor, "is_static", boolean);
    r.add_field(pointer_descriptor, "needs_cloning", boolean);

    r.add_field(integer_descriptor, "is_signed", boolean);

    let descriptor_list = r.get_container(
        "LIST:Vec<PTR:O:::Descriptor>",
        descriptor_owner,
        Rc::new(SequenceContainer::VECTOR),
    );
    let registry = r.create_aggregate("DescriptorRegistry", None);
    r.add_field(registry, "descriptors", descriptor_list);

    r.relayout_all();

    Builtins {
        descriptor,
        aggregate_descriptor,
        union_descriptor,
        pointer_descriptor,
        list_descriptor,
        integer_descriptor,
        string_descriptor,
        field_description,
        virtual_field,
        registry,
        descriptor_ref,
        descriptor_owner,
        field_owner,
        field_list,
        virtual_list,
        descriptor_list,
        boolean,
        i8,
        i16,
        i32,
        i64,
        u8,
        u16,
        u32,
        u64,
        usize,
        string,
    }
}
