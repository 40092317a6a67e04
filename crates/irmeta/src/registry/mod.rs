// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Descriptor registry.
//!
//! The registry owns every [`Descriptor`] of a process, hands out ids in
//! registration order and resolves names. [`Registry::new`] runs the
//! bootstrap sequence first, so the descriptors that describe descriptors
//! always carry the same ids (see [`Builtins`]).
//!
//! # Example
//!
//! ```
//! use irmeta::Registry;
//!
//! let mut registry = Registry::new();
//! let i32_id = registry.builtins().i32;
//! let point = registry
//!     .aggregate("Point")
//!     .field("x", i32_id)
//!     .field("y", i32_id)
//!     .build();
//! assert_eq!(registry.get(point).size(), 8);
//! ```

mod bootstrap;
mod builder;
mod layout;
mod reflect;

pub use bootstrap::Builtins;
pub use builder::AggregateBuilder;
pub(crate) use layout::LayoutFixup;

use crate::config::{
    GENERIC_LIST_SUFFIX, LIST_PREFIX, POINTER_ALIGN, POINTER_SIZE, STRING_ALIGN, STRING_SIZE,
};
use crate::descriptor::{
    align_up, layout_fields, pointer_name, AggregateInfo, ContainerImpl, Constructor, Descriptor,
    DescriptorId, DescriptorKind, Destructor, FieldDescriptor, IntegerInfo, ListInfo, PointerInfo,
    PointerStrategy, SequenceContainer, TagSource, UnionInfo,
};
use crate::heap::{Handle, Heap};
use crate::value::{UnionValue, Value};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::rc::Rc;
use tracing::{debug, trace};

#[derive(Debug)]
enum Entry {
    // Id and name handed out, body not installed yet.
    Reserved(String),
    Installed(Descriptor),
}

/// Name to descriptor table with id assignment.
#[derive(Debug)]
pub struct Registry {
    entries: Vec<Entry>,
    names: HashMap<String, DescriptorId>,
    builtins: Option<Builtins>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Create a registry and run the bootstrap sequence.
    pub fn new() -> Self {
        let mut registry = Self {
            entries: Vec::new(),
            names: HashMap::new(),
            builtins: None,
        };
        let builtins = bootstrap::run(&mut registry);
        registry.builtins = Some(builtins);
        registry
    }

    /// Ids of the bootstrap descriptors.
    pub fn builtins(&self) -> &Builtins {
        match &self.builtins {
            Some(builtins) => builtins,
            None => kernel_fatal!("registry used before bootstrap completed"),
        }
    }

    /// Number of ids handed out, reserved ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always false once bootstrapped.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Installed descriptors in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Descriptor> {
        self.entries.iter().filter_map(|entry| match entry {
            Entry::Installed(descriptor) => Some(descriptor),
            Entry::Reserved(_) => None,
        })
    }

    fn next_id(&self) -> DescriptorId {
        let raw = u32::try_from(self.entries.len() + 1).ok();
        match raw.and_then(DescriptorId::from_raw) {
            Some(id) => id,
            None => kernel_fatal!("descriptor id space exhausted"),
        }
    }

    fn entry(&self, id: DescriptorId) -> Option<&Entry> {
        self.entries.get(id.get() as usize - 1)
    }

    fn claim_name(&mut self, name: &str) -> DescriptorId {
        kernel_assert!(
            !self.names.contains_key(name),
            "duplicate descriptor name '{}'",
            name
        );
        let id = self.next_id();
        self.names.insert(name.to_string(), id);
        id
    }

    // =======================================================================
    // Registration primitives
    // =======================================================================

    /// Register a descriptor body under a fresh id. Duplicate names are fatal.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        size: usize,
        align: usize,
        kind: DescriptorKind,
    ) -> DescriptorId {
        let name = name.into();
        let id = self.claim_name(&name);
        debug!(id = %id, name = %name, kind = kind.label(), "registered descriptor");
        self.entries
            .push(Entry::Installed(Descriptor::new(id, name, size, align, kind)));
        id
    }

    /// Hand out an id for `name` without a body. The body must be supplied
    /// with [`Registry::install`] before the descriptor is used.
    pub fn reserve(&mut self, name: impl Into<String>) -> DescriptorId {
        let name = name.into();
        let id = self.claim_name(&name);
        trace!(id = %id, name = %name, "reserved descriptor id");
        self.entries.push(Entry::Reserved(name));
        id
    }

    /// Install the body of a reserved descriptor.
    pub fn install(&mut self, id: DescriptorId, size: usize, align: usize, kind: DescriptorKind) {
        let Some(entry) = self.entries.get_mut(id.get() as usize - 1) else {
            kernel_fatal!("install of unknown descriptor id {}", id);
        };
        let Entry::Reserved(name) = &mut *entry else {
            kernel_fatal!("install of descriptor {} which is already installed", id);
        };
        let name = std::mem::take(name);
        debug!(id = %id, name = %name, kind = kind.label(), "installed descriptor");
        *entry = Entry::Installed(Descriptor::new(id, name, size, align, kind));
    }

    /// Id registered (or reserved) under `name`.
    pub fn find(&self, name: &str) -> Option<DescriptorId> {
        self.names.get(name).copied()
    }

    /// Installed descriptor registered under `name`.
    pub fn by_name(&self, name: &str) -> Option<&Descriptor> {
        self.find(name).and_then(|id| self.try_get(id))
    }

    /// Installed descriptor for `id`.
    pub fn try_get(&self, id: DescriptorId) -> Option<&Descriptor> {
        match self.entry(id) {
            Some(Entry::Installed(descriptor)) => Some(descriptor),
            _ => None,
        }
    }

    /// True if `id` has a body.
    pub fn is_installed(&self, id: DescriptorId) -> bool {
        self.try_get(id).is_some()
    }

    /// Descriptor for `id`; fatal if unknown or only reserved.
    pub fn get(&self, id: DescriptorId) -> &Descriptor {
        match self.entry(id) {
            Some(Entry::Installed(descriptor)) => descriptor,
            Some(Entry::Reserved(name)) => {
                kernel_fatal!("descriptor '{}' ({}) used before install", name, id)
            }
            None => kernel_fatal!("unknown descriptor id {}", id),
        }
    }

    pub(crate) fn get_mut(&mut self, id: DescriptorId) -> &mut Descriptor {
        match self.entries.get_mut(id.get() as usize - 1) {
            Some(Entry::Installed(descriptor)) => descriptor,
            Some(Entry::Reserved(name)) => {
                kernel_fatal!("descriptor '{}' ({}) used before install", name, id)
            }
            None => kernel_fatal!("unknown descriptor id {}", id),
        }
    }

    /// Name of an installed or reserved descriptor.
    pub fn name_of(&self, id: DescriptorId) -> &str {
        match self.entry(id) {
            Some(Entry::Installed(descriptor)) => descriptor.name(),
            Some(Entry::Reserved(name)) => name,
            None => kernel_fatal!("unknown descriptor id {}", id),
        }
    }

    // =======================================================================
    // Registration API
    // =======================================================================

    fn create_aggregate_kind(
        &mut self,
        name: impl Into<String>,
        base: Option<DescriptorId>,
        polymorphic: bool,
        union: bool,
    ) -> DescriptorId {
        let (size, align, base_polymorphic) = match base {
            Some(base_id) => {
                let base = self.get(base_id);
                kernel_assert!(
                    matches!(base.kind(), DescriptorKind::Aggregate(_)),
                    "base '{}' is not an aggregate",
                    base.name()
                );
                (base.size(), base.alignment(), base.is_polymorphic())
            }
            None => (0, 1, false),
        };
        let aggregate = AggregateInfo::new(base, polymorphic || base_polymorphic);
        let kind = if union {
            DescriptorKind::Union(UnionInfo {
                aggregate,
                ..UnionInfo::default()
            })
        } else {
            DescriptorKind::Aggregate(aggregate)
        };
        self.register(name, size, align, kind)
    }

    /// Register a plain aggregate.
    pub fn create_aggregate(
        &mut self,
        name: impl Into<String>,
        base: Option<DescriptorId>,
    ) -> DescriptorId {
        self.create_aggregate_kind(name, base, false, false)
    }

    /// Register a polymorphic aggregate; its instances are dispatched on
    /// their runtime type.
    pub fn create_object_aggregate(
        &mut self,
        name: impl Into<String>,
        base: Option<DescriptorId>,
    ) -> DescriptorId {
        self.create_aggregate_kind(name, base, true, false)
    }

    /// Register a union. Common fields are added with
    /// [`Registry::add_field`], alternatives with
    /// [`Registry::add_union_field`].
    pub fn create_union(
        &mut self,
        name: impl Into<String>,
        base: Option<DescriptorId>,
    ) -> DescriptorId {
        self.create_aggregate_kind(name, base, false, true)
    }

    /// Append a field and recompute layouts. Returns the field's offset.
    pub fn add_field(
        &mut self,
        aggregate: DescriptorId,
        name: impl Into<String>,
        descriptor: DescriptorId,
    ) -> usize {
        let name = name.into();
        let _ = self.get(descriptor);
        let Some(info) = self.get_mut(aggregate).aggregate_mut() else {
            kernel_fatal!("add_field '{}' on a non-aggregate ({})", name, aggregate);
        };
        kernel_assert!(
            info.field(&name).is_none(),
            "duplicate field '{}' in descriptor {}",
            name,
            aggregate
        );
        info.fields.push(FieldDescriptor::new(0, descriptor, name));
        let index = info.fields.len() - 1;
        self.relayout_all();
        self.get(aggregate)
            .aggregate()
            .and_then(|info| info.fields.get(index))
            .map_or(0, FieldDescriptor::offset)
    }

    /// Append a tagged alternative to a union.
    pub fn add_union_field(
        &mut self,
        union: DescriptorId,
        name: impl Into<String>,
        descriptor: DescriptorId,
    ) -> usize {
        let name = name.into();
        let _ = self.get(descriptor);
        let DescriptorKind::Union(info) = &mut self.get_mut(union).kind else {
            kernel_fatal!("add_union_field '{}' on a non-union ({})", name, union);
        };
        kernel_assert!(
            info.alternative(&name).is_none(),
            "duplicate alternative '{}' in union {}",
            name,
            union
        );
        info.alternatives.push(FieldDescriptor::new(0, descriptor, name));
        self.relayout_all();
        self.union_info(union).alternatives.len() - 1
    }

    fn union_info(&self, union: DescriptorId) -> &UnionInfo {
        match self.get(union).union() {
            Some(info) => info,
            None => kernel_fatal!("descriptor '{}' is not a union", self.name_of(union)),
        }
    }

    /// Read the discriminant from the integer common field at `offset`.
    pub fn set_tag_offset(&mut self, union: DescriptorId, offset: usize) {
        kernel_assert!(
            !matches!(self.union_info(union).tag, TagSource::Selector(_)),
            "union '{}' already has a selector",
            self.name_of(union)
        );
        let field = self.locate_tag_field(union, offset);
        if let DescriptorKind::Union(info) = &mut self.get_mut(union).kind {
            info.tag = TagSource::Offset(offset);
            info.tag_field = Some(field);
        }
    }

    /// Read the discriminant from the named integer common field.
    pub fn set_tag_field(&mut self, union: DescriptorId, field: &str) {
        let Some((_, descriptor)) = self.field_by_name(union, field) else {
            kernel_fatal!("union '{}' has no field '{}'", self.name_of(union), field);
        };
        let offset = descriptor.offset();
        self.set_tag_offset(union, offset);
    }

    /// Compute the discriminant with `selector`.
    pub fn set_selector(
        &mut self,
        union: DescriptorId,
        selector: impl Fn(&Value) -> Option<usize> + 'static,
    ) {
        kernel_assert!(
            !matches!(self.union_info(union).tag, TagSource::Offset(_)),
            "union '{}' already has a tag offset",
            self.name_of(union)
        );
        if let DescriptorKind::Union(info) = &mut self.get_mut(union).kind {
            info.tag = TagSource::Selector(Rc::new(selector));
        }
    }

    pub(crate) fn locate_tag_field(&self, union: DescriptorId, offset: usize) -> usize {
        let fields = self.fields(union);
        let Some(index) = fields.iter().position(|f| f.offset() == offset) else {
            kernel_fatal!(
                "union '{}' has no common field at offset {}",
                self.name_of(union),
                offset
            );
        };
        kernel_assert!(
            self.get(fields[index].descriptor()).integer().is_some(),
            "tag field '{}' of union '{}' is not an integer",
            fields[index].name(),
            self.name_of(union)
        );
        index
    }

    /// Pointer descriptor to `base` with the given flags; created on first
    /// request. Conflicting flags for an existing name are fatal.
    pub fn get_pointer(
        &mut self,
        base: DescriptorId,
        owns: bool,
        is_static: bool,
        needs_cloning: bool,
    ) -> DescriptorId {
        let name = pointer_name(self.name_of(base), owns, is_static, needs_cloning);
        let info = PointerInfo {
            base,
            owns,
            is_static,
            needs_cloning,
        };
        if let Some(existing) = self.find(&name) {
            kernel_assert!(
                self.get(existing).pointer() == Some(&info),
                "descriptor '{}' exists with different pointer parameters",
                name
            );
            return existing;
        }
        self.register(name, POINTER_SIZE, POINTER_ALIGN, DescriptorKind::Pointer(info))
    }

    /// Owning pointer to `base`.
    pub fn owning_pointer(&mut self, base: DescriptorId) -> DescriptorId {
        self.get_pointer(base, true, false, false)
    }

    /// Reference pointer to `base`.
    pub fn reference_pointer(&mut self, base: DescriptorId) -> DescriptorId {
        self.get_pointer(base, false, false, false)
    }

    /// List of `element` named `name`.
    ///
    /// Returns the list registered under `name` when its element matches;
    /// otherwise the generic list `<name>:GENERIC`, created on first use.
    /// An existing list with a different element is fatal.
    pub fn get_list(&mut self, element: DescriptorId, name: &str) -> DescriptorId {
        kernel_assert!(
            name.starts_with(LIST_PREFIX),
            "list name '{}' lacks the '{}' prefix",
            name,
            LIST_PREFIX
        );
        let generic = format!("{}{}", name, GENERIC_LIST_SUFFIX);
        for candidate in [name, generic.as_str()] {
            if let Some(existing) = self.find(candidate) {
                if !self.is_installed(existing) {
                    continue;
                }
                let found = self.get(existing).list().map(|l| l.element);
                kernel_assert!(
                    found == Some(element),
                    "list '{}' exists with a different element type",
                    candidate
                );
                return existing;
            }
        }
        self.get_container(generic, element, Rc::new(SequenceContainer::GENERIC))
    }

    /// List of `element` backed by `container`, registered under `name`.
    pub fn get_container(
        &mut self,
        name: impl Into<String>,
        element: DescriptorId,
        container: Rc<dyn ContainerImpl>,
    ) -> DescriptorId {
        let name = name.into();
        if let Some(existing) = self.find(&name) {
            let same = self
                .get(existing)
                .list()
                .is_some_and(|l| l.element == element && l.container.kind() == container.kind());
            kernel_assert!(same, "list '{}' exists with different parameters", name);
            return existing;
        }
        let (size, align) = (container.size(), container.alignment());
        self.register(
            name,
            size,
            align,
            DescriptorKind::List(ListInfo { element, container }),
        )
    }

    /// Integer descriptor; created on first request.
    pub fn get_integer(&mut self, name: &str, size: usize, signed: bool) -> DescriptorId {
        if let Some(existing) = self.find(name) {
            let descriptor = self.get(existing);
            kernel_assert!(
                descriptor.integer() == Some(&IntegerInfo { signed }) && descriptor.size() == size,
                "integer '{}' exists with a different width or signedness",
                name
            );
            return existing;
        }
        self.register(
            name,
            size,
            size.max(1),
            DescriptorKind::Integer(IntegerInfo { signed }),
        )
    }

    pub(crate) fn create_string(&mut self, name: &str) -> DescriptorId {
        self.register(name, STRING_SIZE, STRING_ALIGN, DescriptorKind::String)
    }

    /// Declare a virtual field: `spec` is a path over real fields, e.g.
    /// `"a;b/*"`.
    pub fn add_virtual_field(
        &mut self,
        aggregate: DescriptorId,
        name: impl Into<String>,
        spec: impl Into<String>,
    ) {
        let name = name.into();
        let Some(info) = self.get_mut(aggregate).aggregate_mut() else {
            kernel_fatal!("virtual field '{}' on a non-aggregate ({})", name, aggregate);
        };
        kernel_assert!(
            info.virtual_field(&name).is_none(),
            "duplicate virtual field '{}'",
            name
        );
        info.virtual_cache.borrow_mut().remove(&name);
        info.virtual_fields.push((name, spec.into()));
    }

    /// Set the constructor run on freshly zeroed instances.
    pub fn set_constructor(&mut self, id: DescriptorId, f: impl Fn(&mut Value) + 'static) {
        self.get_mut(id).hooks.constructor = Some(Rc::new(f));
    }

    /// Set the destructor run on top-level teardown.
    pub fn set_destructor(&mut self, id: DescriptorId, f: impl Fn(&mut Value) + 'static) {
        self.get_mut(id).hooks.destructor = Some(Rc::new(f));
    }

    /// Hook run before a completed object's fields are initialized.
    pub fn set_pre_init(&mut self, id: DescriptorId, f: impl Fn(&mut Value) + 'static) {
        self.get_mut(id).hooks.pre_init = Some(Rc::new(f));
    }

    /// Hook run after a completed object's fields are initialized.
    pub fn set_post_init(&mut self, id: DescriptorId, f: impl Fn(&mut Value) + 'static) {
        self.get_mut(id).hooks.post_init = Some(Rc::new(f));
    }

    // =======================================================================
    // Type queries
    // =======================================================================

    /// Inheritance chain of `id`, root first, `id` last.
    pub fn base_chain(&self, id: DescriptorId) -> Vec<DescriptorId> {
        let mut chain = vec![id];
        let mut current = self.get(id).base();
        while let Some(base) = current {
            kernel_assert!(
                chain.len() <= self.entries.len(),
                "inheritance cycle through '{}'",
                self.name_of(id)
            );
            chain.push(base);
            current = self.get(base).base();
        }
        chain.reverse();
        chain
    }

    /// True if `id` is `ancestor` or derives from it.
    pub fn is_kind_of(&self, id: DescriptorId, ancestor: DescriptorId) -> bool {
        let mut current = Some(id);
        while let Some(level) = current {
            if level == ancestor {
                return true;
            }
            current = self.get(level).base();
        }
        false
    }

    /// Exact type of the object at `handle` when accessed as `static_type`.
    /// Polymorphic types dispatch on the object's stamp; others use the
    /// static type.
    pub fn runtime_descriptor(
        &self,
        heap: &Heap,
        handle: Handle,
        static_type: DescriptorId,
    ) -> DescriptorId {
        if !self.get(static_type).is_polymorphic() {
            return static_type;
        }
        let Some(stamped) = heap.descriptor_of(handle) else {
            kernel_fatal!("dangling handle {} to '{}'", handle, self.name_of(static_type));
        };
        kernel_assert!(
            self.is_kind_of(stamped, static_type),
            "object {} of type '{}' accessed as '{}'",
            handle,
            self.name_of(stamped),
            self.name_of(static_type)
        );
        stamped
    }

    /// All fields of an aggregate, base fields first.
    pub fn fields(&self, id: DescriptorId) -> Vec<&FieldDescriptor> {
        self.base_chain(id)
            .into_iter()
            .flat_map(|level| {
                self.get(level)
                    .aggregate()
                    .map(|info| info.fields.iter())
                    .into_iter()
                    .flatten()
            })
            .collect()
    }

    /// Number of fields including inherited ones.
    pub fn field_count(&self, id: DescriptorId) -> usize {
        self.base_chain(id)
            .into_iter()
            .map(|level| self.get(level).aggregate().map_or(0, |info| info.fields.len()))
            .sum()
    }

    /// Field `index` in the flattened field list; fatal when out of range.
    pub fn field(&self, id: DescriptorId, index: usize) -> &FieldDescriptor {
        match self.fields(id).get(index) {
            Some(field) => field,
            None => kernel_fatal!(
                "field index {} out of range for '{}'",
                index,
                self.name_of(id)
            ),
        }
    }

    /// Field by name with its flattened index. Derived fields hide base
    /// fields of the same name.
    pub fn field_by_name(&self, id: DescriptorId, name: &str) -> Option<(usize, &FieldDescriptor)> {
        let chain = self.base_chain(id);
        let mut start = self.field_count(id);
        for level in chain.into_iter().rev() {
            let Some(info) = self.get(level).aggregate() else {
                continue;
            };
            start -= info.fields.len();
            if let Some(i) = info.fields.iter().position(|f| f.name() == name) {
                return Some((start + i, &info.fields[i]));
            }
        }
        None
    }

    /// Flattened index of the first field declared by `id` itself.
    pub fn level_start(&self, id: DescriptorId) -> usize {
        self.get(id).base().map_or(0, |base| self.field_count(base))
    }

    /// Fields visible on this instance at the descriptor's own level: the
    /// declared fields of an aggregate, 0 or 1 for a union.
    pub fn proper_field_count(&self, id: DescriptorId, value: &Value) -> usize {
        let descriptor = self.get(id);
        match descriptor.kind() {
            DescriptorKind::Union(_) => usize::from(self.active_alternative(id, value).is_some()),
            DescriptorKind::Aggregate(info) => info.fields.len(),
            _ => 0,
        }
    }

    /// Proper field `index`; for a union only index 0 of the active
    /// alternative exists.
    pub fn proper_field(
        &self,
        id: DescriptorId,
        value: &Value,
        index: usize,
    ) -> Option<&FieldDescriptor> {
        let descriptor = self.get(id);
        match descriptor.kind() {
            DescriptorKind::Union(info) => match (index, self.active_alternative(id, value)) {
                (0, Some(active)) => info.alternatives.get(active),
                _ => None,
            },
            DescriptorKind::Aggregate(info) => info.fields.get(index),
            _ => None,
        }
    }

    /// Active alternative of a union value as chosen by its discriminant.
    pub fn active_alternative(&self, id: DescriptorId, value: &Value) -> Option<usize> {
        let info = self.union_info(id);
        let index = match &info.tag {
            TagSource::Offset(_) => {
                let Some(field) = info.tag_field else {
                    kernel_fatal!("union '{}' tag field unresolved", self.name_of(id));
                };
                let tag = value.fields().and_then(|f| f.get(field)).and_then(Value::as_int);
                let Some(tag) = tag else {
                    kernel_fatal!("union '{}' value has no integer tag", self.name_of(id));
                };
                if tag < 0 {
                    return None;
                }
                usize::try_from(tag).unwrap_or(usize::MAX)
            }
            TagSource::Selector(selector) => selector(value)?,
            TagSource::Unset if info.alternatives.is_empty() => return None,
            TagSource::Unset => {
                kernel_fatal!("union '{}' has no discriminant source", self.name_of(id))
            }
        };
        kernel_assert!(
            index < info.alternatives.len(),
            "union '{}' discriminant {} out of range ({} alternatives)",
            self.name_of(id),
            index,
            info.alternatives.len()
        );
        Some(index)
    }

    /// Active alternative and its value. A stored alternative that
    /// disagrees with the discriminant is fatal.
    pub fn active_value<'v>(
        &self,
        id: DescriptorId,
        value: &'v Value,
    ) -> Option<(usize, &'v Value)> {
        let expected = self.active_alternative(id, value);
        let Some(union) = value.as_union() else {
            kernel_fatal!("union '{}' applied to a non-union value", self.name_of(id));
        };
        let stored = union.active.as_ref().map(|(index, alt)| (*index, &**alt));
        kernel_assert!(
            expected == stored.map(|(index, _)| index),
            "union '{}' holds alternative {:?} but its discriminant selects {:?}",
            self.name_of(id),
            stored.map(|(index, _)| index),
            expected
        );
        stored
    }

    /// Make alternative `index` active, updating the tag field.
    pub fn select_alternative(
        &self,
        id: DescriptorId,
        value: &mut Value,
        index: usize,
        alternative: Value,
    ) {
        let info = self.union_info(id);
        kernel_assert!(
            index < info.alternatives.len(),
            "union '{}' has no alternative {}",
            self.name_of(id),
            index
        );
        self.write_union_slot(id, info, value, Some((index, Box::new(alternative))));
    }

    /// Deactivate every alternative.
    pub fn clear_alternative(&self, id: DescriptorId, value: &mut Value) {
        let info = self.union_info(id);
        self.write_union_slot(id, info, value, None);
    }

    fn write_union_slot(
        &self,
        id: DescriptorId,
        info: &UnionInfo,
        value: &mut Value,
        active: Option<(usize, Box<Value>)>,
    ) {
        let Some(union) = value.as_union_mut() else {
            kernel_fatal!("union '{}' applied to a non-union value", self.name_of(id));
        };
        if let Some(field) = info.tag_field {
            let tag = active.as_ref().map_or(-1, |(index, _)| *index as i128);
            match union.fields.get_mut(field) {
                Some(slot) => *slot = Value::Int(tag),
                None => kernel_fatal!("union '{}' value lacks its tag field", self.name_of(id)),
            }
        }
        union.active = active;
    }

    /// Nearest constructor up the inheritance chain.
    pub fn constructor_of(&self, id: DescriptorId) -> Option<&Constructor> {
        self.base_chain(id)
            .into_iter()
            .rev()
            .find_map(|level| self.get(level).constructor())
    }

    /// Nearest destructor up the inheritance chain.
    pub fn destructor_of(&self, id: DescriptorId) -> Option<&Destructor> {
        self.base_chain(id)
            .into_iter()
            .rev()
            .find_map(|level| self.get(level).destructor())
    }

    // =======================================================================
    // Object lifecycle
    // =======================================================================

    /// Zero-initialized storage for an instance of `id`.
    pub fn zeroed(&self, id: DescriptorId) -> Value {
        let descriptor = self.get(id);
        match descriptor.kind() {
            DescriptorKind::Aggregate(_) => Value::Aggregate(
                self.fields(id)
                    .iter()
                    .map(|f| self.zeroed(f.descriptor()))
                    .collect(),
            ),
            DescriptorKind::Union(info) => {
                let fields = self
                    .fields(id)
                    .iter()
                    .map(|f| self.zeroed(f.descriptor()))
                    .collect();
                let mut value = Value::Union(UnionValue {
                    fields,
                    active: None,
                });
                if let Some(index) = self.active_alternative(id, &value) {
                    let alternative = self.zeroed(info.alternatives[index].descriptor());
                    if let Some(union) = value.as_union_mut() {
                        union.active = Some((index, Box::new(alternative)));
                    }
                }
                value
            }
            DescriptorKind::Pointer(info) if info.strategy() == PointerStrategy::Static => {
                Value::Static(None)
            }
            DescriptorKind::Pointer(_) => Value::Pointer(None),
            DescriptorKind::List(info) => Value::List(info.container.construct(0)),
            DescriptorKind::Integer(_) => Value::Int(0),
            DescriptorKind::String => Value::Str(String::new()),
        }
    }

    /// Run constructors: embedded aggregate members first, then the
    /// nearest constructor of `id`.
    pub fn construct(&self, id: DescriptorId, value: &mut Value) {
        if self.get(id).aggregate().is_some() {
            let members: Vec<(usize, DescriptorId)> = self
                .fields(id)
                .iter()
                .enumerate()
                .filter(|(_, f)| self.get(f.descriptor()).aggregate().is_some())
                .map(|(i, f)| (i, f.descriptor()))
                .collect();
            if let Some(values) = value.fields_mut() {
                for (index, member) in members {
                    if let Some(slot) = values.get_mut(index) {
                        self.construct(member, slot);
                    }
                }
            }
        }
        if let Some(constructor) = self.constructor_of(id) {
            constructor(value);
        }
    }

    /// Zeroed and constructed value.
    pub fn create_empty_value(&self, id: DescriptorId) -> Value {
        let mut value = self.zeroed(id);
        self.construct(id, &mut value);
        value
    }

    /// Allocate a zeroed, constructed instance stamped with `id`.
    pub fn create_empty_object(&self, heap: &mut Heap, id: DescriptorId) -> Handle {
        let value = self.create_empty_value(id);
        let handle = heap.alloc(id, value);
        trace!(%handle, descriptor = %self.name_of(id), "created empty object");
        handle
    }

    /// Run the destructor of the object at `handle`, tear its fields down
    /// and free its slot.
    pub fn destroy_object(&self, heap: &mut Heap, handle: Handle) {
        let Some(descriptor) = heap.descriptor_of(handle) else {
            kernel_fatal!("destroy of dead object {}", handle);
        };
        let mut value = heap.take_value(handle);
        self.destruct(heap, descriptor, &mut value, false);
        heap.release(handle);
        trace!(%handle, "destroyed object");
    }

    /// Tear down a value. The destructor hook runs only when
    /// `from_owner_teardown` is false; fields are torn down through their
    /// own descriptors. Owned pointees are destroyed, references are not.
    pub fn destruct(
        &self,
        heap: &mut Heap,
        id: DescriptorId,
        value: &mut Value,
        from_owner_teardown: bool,
    ) {
        if !from_owner_teardown {
            if let Some(destructor) = self.destructor_of(id) {
                destructor(value);
            }
        }
        let descriptor = self.get(id);
        match descriptor.kind() {
            DescriptorKind::Aggregate(_) | DescriptorKind::Union(_) => {
                let members: Vec<DescriptorId> =
                    self.fields(id).iter().map(|f| f.descriptor()).collect();
                if let Some(values) = value.fields_mut() {
                    for (member, slot) in members.into_iter().zip(values.iter_mut()) {
                        self.destruct(heap, member, slot, true);
                    }
                }
                if let (Some(info), Some(union)) = (descriptor.union(), value.as_union_mut()) {
                    if let Some((index, alternative)) = union.active.as_mut() {
                        let Some(field) = info.alternatives.get(*index) else {
                            kernel_fatal!(
                                "union '{}' alternative {} missing",
                                descriptor.name(),
                                index
                            );
                        };
                        self.destruct(heap, field.descriptor(), alternative, true);
                    }
                    union.active = None;
                }
            }
            DescriptorKind::Pointer(info) => match (info.strategy(), value) {
                (PointerStrategy::Static, Value::Static(slot)) => {
                    if let Some(mut inner) = slot.take() {
                        self.destruct(heap, info.base, &mut inner, false);
                    }
                }
                (PointerStrategy::Owning, Value::Pointer(slot)) => {
                    if let Some(target) = slot.take() {
                        if heap.get(target).is_some() {
                            self.destroy_object(heap, target);
                        }
                    }
                }
                _ => {}
            },
            DescriptorKind::List(info) => {
                if let Some(items) = value.as_list_mut() {
                    for item in items.iter_mut() {
                        self.destruct(heap, info.element, item, true);
                    }
                    info.container.destruct(items);
                }
            }
            DescriptorKind::Integer(_) | DescriptorKind::String => {}
        }
    }

    // =======================================================================
    // Layout
    // =======================================================================

    /// Recompute field offsets, size and alignment of one aggregate or
    /// union from its current field types. Returns true if anything moved.
    ///
    /// Union policy: common fields are laid out like an aggregate; all
    /// alternatives share one offset after them, aligned to the largest
    /// alternative alignment; the tag offset follows its field.
    pub fn adjust_field_offsets(&mut self, id: DescriptorId) -> bool {
        let descriptor = self.get(id);
        let Some(info) = descriptor.aggregate() else {
            return false;
        };
        let (base_size, base_align) = match info.base {
            Some(base) => {
                let base = self.get(base);
                (base.size(), base.alignment())
            }
            None => (0, 1),
        };
        let member = |field: &FieldDescriptor| {
            let d = self.get(field.descriptor());
            (d.size(), d.alignment())
        };
        let common = layout_fields(base_size, base_align, info.fields.iter().map(member));
        let (size, align, alternative_offset) = match descriptor.union() {
            Some(union) => {
                let alternatives: Vec<(usize, usize)> =
                    union.alternatives.iter().map(member).collect();
                let alt_align = alternatives.iter().map(|a| a.1).max().unwrap_or(1).max(1);
                let alt_size = alternatives.iter().map(|a| a.0).max().unwrap_or(0);
                let offset = align_up(common.size, alt_align);
                let align = common.align.max(alt_align);
                (align_up(offset + alt_size, align), align, Some(offset))
            }
            None => (common.size, common.align, None),
        };
        let level_start = self.level_start(id);
        let tag_offset = descriptor.union().and_then(|u| u.tag_field).map(|field| {
            if field >= level_start {
                common.offsets[field - level_start]
            } else {
                self.field(id, field).offset()
            }
        });

        let descriptor = self.get_mut(id);
        let mut changed = descriptor.size != size || descriptor.align != align;
        descriptor.size = size;
        descriptor.align = align;
        if let Some(info) = descriptor.aggregate_mut() {
            for (field, offset) in info.fields.iter_mut().zip(&common.offsets) {
                if field.offset() != *offset {
                    *field = field.with_offset(*offset);
                    changed = true;
                }
            }
        }
        if let DescriptorKind::Union(union) = &mut descriptor.kind {
            if let Some(offset) = alternative_offset {
                for field in union.alternatives.iter_mut() {
                    if field.offset() != offset {
                        *field = field.with_offset(offset);
                        changed = true;
                    }
                }
            }
            if let (Some(new), TagSource::Offset(old)) = (tag_offset, &mut union.tag) {
                if *old != new {
                    *old = new;
                    changed = true;
                }
            }
        }
        if changed {
            debug!(id = %id, size, align, "adjusted field offsets");
        }
        changed
    }

    /// Relayout every installed aggregate, dependencies first. Returns the
    /// ids whose layout changed.
    pub fn relayout_all(&mut self) -> Vec<DescriptorId> {
        let ids: Vec<DescriptorId> = self
            .iter()
            .filter(|d| d.aggregate().is_some())
            .map(Descriptor::id)
            .collect();
        let mut fixup = LayoutFixup::new();
        for id in ids {
            fixup.visit(self, id);
        }
        fixup.into_changed()
    }

    // =======================================================================
    // Reports
    // =======================================================================

    /// One row per installed descriptor.
    pub fn summaries(&self) -> Vec<DescriptorSummary> {
        self.iter().map(|d| self.summary(d)).collect()
    }

    fn summary(&self, descriptor: &Descriptor) -> DescriptorSummary {
        let to_row = |f: &FieldDescriptor| FieldSummary {
            name: f.name().to_string(),
            offset: f.offset(),
            type_name: self.name_of(f.descriptor()).to_string(),
        };
        let (tag_offset, alternatives) = match descriptor.union() {
            Some(u) => (u.tag_offset(), u.alternatives.iter().map(to_row).collect()),
            None => (None, Vec::new()),
        };
        DescriptorSummary {
            id: descriptor.id().get(),
            name: descriptor.name().to_string(),
            kind: descriptor.kind().label().to_string(),
            size: descriptor.size(),
            alignment: descriptor.alignment(),
            base: descriptor.base().map(|b| self.name_of(b).to_string()),
            fields: descriptor
                .aggregate()
                .map(|a| a.fields.iter().map(to_row).collect())
                .unwrap_or_default(),
            alternatives,
            tag_offset,
            target: match descriptor.kind() {
                DescriptorKind::Pointer(p) => Some(self.name_of(p.base).to_string()),
                DescriptorKind::List(l) => Some(self.name_of(l.element).to_string()),
                _ => None,
            },
        }
    }
}

/// Serializable view of one descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescriptorSummary {
    /// Registry id.
    pub id: u32,
    /// Type name.
    pub name: String,
    /// Kind label.
    pub kind: String,
    /// Instance size.
    pub size: usize,
    /// Instance alignment.
    pub alignment: usize,
    /// Base class name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base: Option<String>,
    /// Fields declared at this level.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldSummary>,
    /// Union alternatives.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alternatives: Vec<FieldSummary>,
    /// Union tag offset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag_offset: Option<usize>,
    /// Pointee or element type name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

/// One field row of a [`DescriptorSummary`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSummary {
    /// Member name.
    pub name: String,
    /// Byte offset.
    pub offset: usize,
    /// Field type name.
    #[serde(rename = "type")]
    pub type_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(registry: &mut Registry) -> DescriptorId {
        let i32_id = registry.builtins().i32;
        registry
            .aggregate("Point")
            .field("x", i32_id)
            .field("y", i32_id)
            .build()
    }

    #[test]
    fn test_register_assigns_increasing_ids() {
        let mut registry = Registry::new();
        let before = registry.len();
        let a = registry.create_aggregate("A", None);
        let b = registry.create_aggregate("B", None);
        assert_eq!(a.get() as usize, before + 1);
        assert_eq!(b.get(), a.get() + 1);
        assert_eq!(registry.find("B"), Some(b));
    }

    #[test]
    #[should_panic(expected = "duplicate descriptor name 'A'")]
    fn test_duplicate_name_is_fatal() {
        let mut registry = Registry::new();
        registry.create_aggregate("A", None);
        registry.create_aggregate("A", None);
    }

    #[test]
    fn test_point_layout() {
        let mut registry = Registry::new();
        let p = point(&mut registry);
        let d = registry.get(p);
        assert_eq!(d.size(), 8);
        assert_eq!(d.alignment(), 4);
        assert_eq!(registry.field(p, 1).offset(), 4);
    }

    #[test]
    fn test_derived_layout_follows_base() {
        let mut registry = Registry::new();
        let b = registry.builtins().clone();
        let base = registry.aggregate("Base").field("flag", b.u8).build();
        let derived = registry
            .aggregate("Derived")
            .base(base)
            .field("wide", b.u64)
            .build();
        assert_eq!(registry.field_count(derived), 2);
        assert_eq!(registry.field(derived, 1).offset(), 8);
        assert_eq!(registry.get(derived).size(), 16);
        assert!(registry.is_kind_of(derived, base));
        assert!(!registry.is_kind_of(base, derived));
        assert_eq!(registry.level_start(derived), 1);
    }

    #[test]
    fn test_field_by_name_prefers_derived() {
        let mut registry = Registry::new();
        let b = registry.builtins().clone();
        let base = registry.aggregate("Base").field("v", b.u8).build();
        let derived = registry.aggregate("Derived").base(base).field("v", b.u64).build();
        let (index, field) = registry.field_by_name(derived, "v").expect("field");
        assert_eq!(index, 1);
        assert_eq!(field.descriptor(), b.u64);
    }

    #[test]
    fn test_get_pointer_is_memoized() {
        let mut registry = Registry::new();
        let p = point(&mut registry);
        let a = registry.owning_pointer(p);
        let b = registry.get_pointer(p, true, false, false);
        assert_eq!(a, b);
        assert_eq!(registry.get(a).name(), "PTR:O:::Point");
        assert_ne!(a, registry.reference_pointer(p));
    }

    #[test]
    fn test_get_list_falls_back_to_generic() {
        let mut registry = Registry::new();
        let p = point(&mut registry);
        let list = registry.get_list(p, "LIST:Vec<Point>");
        assert_eq!(registry.get(list).name(), "LIST:Vec<Point>:GENERIC");
        assert_eq!(registry.get_list(p, "LIST:Vec<Point>"), list);

        let linked = Rc::new(SequenceContainer::LINKED);
        let native = registry.get_container("LIST:Deque<Point>", p, linked);
        assert_eq!(registry.get_list(p, "LIST:Deque<Point>"), native);
    }

    #[test]
    #[should_panic(expected = "different element type")]
    fn test_get_list_element_mismatch_is_fatal() {
        let mut registry = Registry::new();
        let p = point(&mut registry);
        let i32_id = registry.builtins().i32;
        registry.get_list(p, "LIST:Vec<Point>");
        registry.get_list(i32_id, "LIST:Vec<Point>");
    }

    #[test]
    fn test_reserve_then_install() {
        let mut registry = Registry::new();
        let id = registry.reserve("Later");
        assert!(!registry.is_installed(id));
        assert_eq!(registry.name_of(id), "Later");
        registry.install(id, 4, 4, DescriptorKind::Integer(IntegerInfo { signed: true }));
        assert_eq!(registry.get(id).size(), 4);
    }

    #[test]
    #[should_panic(expected = "used before install")]
    fn test_reserved_use_is_fatal() {
        let mut registry = Registry::new();
        let id = registry.reserve("Later");
        registry.get(id);
    }

    #[test]
    fn test_union_tag_and_proper_fields() {
        let mut registry = Registry::new();
        let b = registry.builtins().clone();
        let u = registry.create_union("Choice", None);
        registry.add_field(u, "tag", b.i32);
        registry.add_union_field(u, "a", b.i64);
        registry.add_union_field(u, "b", b.i32);
        registry.set_tag_field(u, "tag");

        let mut value = registry.create_empty_value(u);
        assert_eq!(registry.active_alternative(u, &value), Some(0));
        registry.select_alternative(u, &mut value, 1, Value::Int(5));
        assert_eq!(registry.proper_field_count(u, &value), 1);
        assert_eq!(registry.proper_field(u, &value, 0).map(FieldDescriptor::name), Some("b"));
        registry.clear_alternative(u, &mut value);
        assert_eq!(registry.proper_field_count(u, &value), 0);
        assert_eq!(registry.get(u).size(), 16);
    }

    #[test]
    #[should_panic(expected = "already has a tag offset")]
    fn test_union_rejects_both_sources() {
        let mut registry = Registry::new();
        let i32_id = registry.builtins().i32;
        let u = registry.create_union("Both", None);
        registry.add_field(u, "tag", i32_id);
        registry.set_tag_offset(u, 0);
        registry.set_selector(u, |_| None);
    }

    #[test]
    fn test_constructor_runs_on_empty_object() {
        let mut registry = Registry::new();
        let p = point(&mut registry);
        registry.set_constructor(p, |v| {
            if let Some(fields) = v.fields_mut() {
                fields[0] = Value::Int(-1);
            }
        });
        let mut heap = Heap::new();
        let h = registry.create_empty_object(&mut heap, p);
        assert_eq!(heap.value(h).at(&[crate::value::Step::Field(0)]), Some(&Value::Int(-1)));
        assert_eq!(heap.descriptor_of(h), Some(p));
    }

    #[test]
    fn test_destroy_frees_owned_not_referenced() {
        let mut registry = Registry::new();
        let p = point(&mut registry);
        let own = registry.owning_pointer(p);
        let reference = registry.reference_pointer(p);
        let holder = registry
            .aggregate("Holder")
            .field("own", own)
            .field("other", reference)
            .build();
        let mut heap = Heap::new();
        let owned = registry.create_empty_object(&mut heap, p);
        let shared = registry.create_empty_object(&mut heap, p);
        let h = registry.create_empty_object(&mut heap, holder);
        *heap.value_mut(h) = Value::Aggregate(vec![owned.into(), shared.into()]);
        registry.destroy_object(&mut heap, h);
        assert!(!heap.contains(h));
        assert!(!heap.contains(owned));
        assert!(heap.contains(shared));
    }

    #[test]
    fn test_summaries_serialize() {
        let mut registry = Registry::new();
        point(&mut registry);
        let rows = registry.summaries();
        let row = rows.iter().find(|r| r.name == "Point").expect("row");
        assert_eq!(row.fields.len(), 2);
        let json = serde_json::to_string(row).expect("json");
        assert!(json.contains("\"type\":\"i32\""));
    }
}
