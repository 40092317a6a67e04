// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Registry synchronization.
//!
//! A persisted registry arrives as lowered descriptor objects in a scratch
//! heap. Each of them is matched by name against the live registry:
//!
//! - **live**: the name is registered; the live descriptor wins and every
//!   reference to the persisted one is redirected to it.
//! - **list**: an unknown list; rebuilt with the live container factory
//!   once its element is resolved.
//! - **cloned**: anything else; its id is reserved, the object is cloned
//!   (field descriptions included), lifted back into descriptor data and
//!   installed.
//!
//! Cloned descriptors are then relaid out against the live field types.
//! The resulting id remap is what payload readers need.

use crate::clone::{CloneEngine, CloneHooks, PointerHandling, PtrType, RefKind, Resolution};
use crate::descriptor::{DescriptorId, SequenceContainer};
use crate::heap::{Handle, Heap};
use crate::registry::{LayoutFixup, Registry};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;
use tracing::{debug, trace};

/// Outcome of [`synchronize`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Persisted descriptor id -> live descriptor id.
    pub remap: BTreeMap<u32, DescriptorId>,
    /// Names resolved to an existing live descriptor.
    pub live: Vec<String>,
    /// Names rebuilt through the list factory.
    pub lists: Vec<String>,
    /// Names installed from the persisted description.
    pub cloned: Vec<String>,
    /// Cloned names whose layout changed against the live build.
    pub adjusted: Vec<String>,
}

impl SyncReport {
    /// True if every persisted id maps to the same live id.
    pub fn is_identity(&self) -> bool {
        self.remap.iter().all(|(old, new)| *old == new.get())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Class {
    Live(DescriptorId),
    List,
    Cloned(DescriptorId),
}

// Descriptor objects are all pushed up front; anything else reached by a
// reference is a broken registry.
struct SyncHooks<'m> {
    known: &'m HashMap<Handle, DescriptorId>,
}

impl CloneHooks for SyncHooks<'_> {
    fn object_enquiry(
        &mut self,
        registry: &Registry,
        _heap: &Heap,
        object: Handle,
        descriptor: DescriptorId,
        _ptr_type: PtrType,
    ) -> Resolution {
        kernel_assert!(
            self.known.contains_key(&object),
            "persisted registry references unlisted {} object {}",
            registry.name_of(descriptor),
            object
        );
        Resolution::Reference
    }
}

fn resolve_list(
    registry: &mut Registry,
    scratch: &Heap,
    object: Handle,
    ids: &mut HashMap<Handle, DescriptorId>,
) -> DescriptorId {
    if let Some(id) = ids.get(&object) {
        return *id;
    }
    let Some((element, container)) = registry.lowered_list(scratch, object) else {
        kernel_fatal!("descriptor object {} is neither listed nor a list", object);
    };
    let container = Rc::new(SequenceContainer::for_kind(container));
    let element = resolve_list(registry, scratch, element, ids);
    let name = registry.lowered_name(scratch, object).to_string();
    let id = registry.get_container(name.as_str(), element, container);
    debug!(name = %name, id = %id, "rebuilt list descriptor");
    ids.insert(object, id);
    id
}

/// Merge the lowered registry below `root` into `registry`.
///
/// `scratch` keeps the persisted objects; the clones made while merging
/// are left in it too.
pub fn synchronize(registry: &mut Registry, scratch: &mut Heap, root: Handle) -> SyncReport {
    let objects = registry.lowered_descriptors(scratch, root);
    let mut report = SyncReport::default();
    let mut ids: HashMap<Handle, DescriptorId> = HashMap::new();
    let mut classes = Vec::with_capacity(objects.len());

    for object in &objects {
        let name = registry.lowered_name(scratch, *object).to_string();
        let class = match registry.find(&name) {
            Some(live) => Class::Live(live),
            None if registry.lowered_list(scratch, *object).is_some() => Class::List,
            None => Class::Cloned(registry.reserve(name.as_str())),
        };
        trace!(name = %name, ?class, "classified persisted descriptor");
        if let Class::Live(id) | Class::Cloned(id) = class {
            ids.insert(*object, id);
        }
        classes.push((*object, name, class));
    }
    for (object, name, class) in &classes {
        if *class == Class::List {
            resolve_list(registry, scratch, *object, &mut ids);
            report.lists.push(name.clone());
        }
    }

    // owned field descriptions follow their descriptor; every descriptor
    // reference already has a decision
    let handling = PointerHandling {
        reference: RefKind::Enquire,
        defining: RefKind::Enquire,
        owning: RefKind::Clone,
    };
    let mut engine = CloneEngine::new(handling);
    engine.open();
    for (object, _, class) in &classes {
        match class {
            Class::Live(_) | Class::List => engine.push_for_copy(scratch, *object),
            Class::Cloned(_) => engine.push_for_clone(scratch, *object),
        }
    }
    engine.perform_cloning(registry, scratch, &mut SyncHooks { known: &ids });

    let mut resolve = ids.clone();
    let mut cloned = Vec::new();
    for (object, name, class) in &classes {
        if let Class::Cloned(id) = class {
            let Some(new) = engine.clone_address(*object) else {
                kernel_fatal!("descriptor '{}' was not cloned", name);
            };
            resolve.insert(new, *id);
            cloned.push((new, name.as_str(), *id));
        }
    }
    engine.close();

    let mut lifted = Vec::with_capacity(cloned.len());
    for (new, name, id) in &cloned {
        let descriptor = registry.lift(scratch, *new, &mut |handle| match resolve.get(&handle) {
            Some(id) => *id,
            None => kernel_fatal!("descriptor '{}' references unknown object {}", name, handle),
        });
        kernel_assert!(
            descriptor.name == *name,
            "lifted '{}' from the object of '{}'",
            descriptor.name,
            name
        );
        lifted.push((*id, descriptor));
    }
    for (id, descriptor) in lifted {
        registry.install(id, descriptor.size, descriptor.align, descriptor.kind);
        registry.bind_tag_field(id);
        report.cloned.push(descriptor.name);
    }

    let targets: Vec<DescriptorId> = cloned.iter().map(|(_, _, id)| *id).collect();
    let mut fixup = LayoutFixup::restricted(targets.iter().copied());
    for id in &targets {
        fixup.visit(registry, *id);
    }
    report.adjusted = fixup
        .into_changed()
        .into_iter()
        .map(|id| registry.name_of(id).to_string())
        .collect();

    for (object, name, class) in &classes {
        if let Class::Live(_) = class {
            report.live.push(name.clone());
        }
        if let Some(id) = ids.get(object) {
            report.remap.insert(registry.lowered_id(scratch, *object), *id);
        }
    }
    debug!(
        live = report.live.len(),
        lists = report.lists.len(),
        cloned = report.cloned.len(),
        adjusted = report.adjusted.len(),
        "registry synchronized"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::DescriptorKind;

    #[test]
    fn test_self_synchronization_is_stable() {
        let mut registry = Registry::new();
        let b = registry.builtins().clone();
        let point = registry.aggregate("Point").field("x", b.i32).field("y", b.i32).build();
        let before = registry.summaries();
        let mut scratch = Heap::new();
        let root = registry.lower(&mut scratch);

        let report = synchronize(&mut registry, &mut scratch, root);
        assert!(report.cloned.is_empty());
        assert!(report.lists.is_empty());
        assert!(report.adjusted.is_empty());
        assert!(report.is_identity());
        assert_eq!(report.remap[&point.get()], point);
        assert_eq!(registry.summaries(), before);
    }

    #[test]
    fn test_unknown_types_are_cloned_and_relaid_out() {
        // writer: Point is two i32, Shape embeds it after a u8
        let mut old = Registry::new();
        let b = old.builtins().clone();
        let old_point = old.aggregate("Point").field("x", b.i32).field("y", b.i32).build();
        let owner = old.owning_pointer(old_point);
        let points = old.get_list(owner, "LIST:Vec<PTR:O:::Point>");
        let shape = old
            .aggregate("Shape")
            .field("tag", b.u8)
            .field("origin", old_point)
            .field("points", points)
            .build();
        assert_eq!(old.field(shape, 1).offset(), 4);
        let mut scratch = Heap::new();
        let root = old.lower(&mut scratch);

        // reader: Point grew to i64 fields and got a different id
        let mut live = Registry::new();
        let lb = live.builtins().clone();
        live.aggregate("Padding").field("p", lb.u8).build();
        let live_point = live.aggregate("Point").field("x", lb.i64).field("y", lb.i64).build();
        assert_ne!(live_point, old_point);

        let report = synchronize(&mut live, &mut scratch, root);
        assert_eq!(report.remap[&old_point.get()], live_point);
        assert!(report.cloned.contains(&"Shape".to_string()));
        assert!(report.cloned.contains(&"PTR:O:::Point".to_string()));
        assert_eq!(report.lists, vec!["LIST:Vec<PTR:O:::Point>:GENERIC".to_string()]);
        assert_eq!(report.adjusted, vec!["Shape".to_string()]);

        let new_shape = live.find("Shape").expect("installed");
        assert_eq!(live.field(new_shape, 1).descriptor(), live_point);
        assert_eq!(live.field(new_shape, 1).offset(), 8);
        assert_eq!(live.get(new_shape).size(), 8 + 16 + 24);
        let list = live.field(new_shape, 2).descriptor();
        let DescriptorKind::List(info) = live.get(list).kind() else {
            panic!("expected list");
        };
        let pointer = live.get(info.element()).pointer().expect("pointer element");
        assert_eq!(pointer.base(), live_point);
        assert!(pointer.owns());
    }
}
