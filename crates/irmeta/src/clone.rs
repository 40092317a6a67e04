// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Object graph cloning.
//!
//! The engine keeps a work list of objects, each with a [`RefKind`] that
//! only ever rises along `Enquire < Null < Copy < Clone`:
//!
//! 1. Discovery: items still at `Enquire` are resolved through
//!    [`CloneHooks::object_enquiry`]; items at `Clone` are written into the
//!    clone buffer with the ordinary value walk, which discovers the
//!    objects they point to. Repeated until nothing changes.
//! 2. Allocation: every `Clone` item gets an empty object of its type.
//! 3. Read-back: every written item is read from its buffer range into the
//!    new object, with pointers redirected through the work list.
//! 4. Orphans: cloned items that were neither pushed nor owned by another
//!    cloned item are handed to [`CloneHooks::finish_orphan_object_cloning`].

use crate::descriptor::{DescriptorId, PointerInfo};
use crate::heap::{Handle, Heap};
use crate::registry::Registry;
use crate::stream::codec;
use crate::stream::{initialize_object, read_value, write_value, ObjectInput, ObjectOutput};
use std::collections::{HashMap, HashSet};
use std::ops::Range;
use tracing::{debug, trace};

/// Per-object clone decision. Ordered: a kind only moves up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RefKind {
    /// Undecided; resolved by [`CloneHooks::object_enquiry`].
    Enquire,
    /// Pointers to the object become null.
    Null,
    /// Pointers keep the original object (or a replacement).
    Copy,
    /// The object is duplicated.
    Clone,
}

/// Kind of pointer an object was reached through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PtrType {
    /// Pushed explicitly; lowest so any pointer kind overrides it.
    Root,
    /// Reference pointer.
    Reference,
    /// Defining pointer.
    Defining,
    /// Owning pointer.
    Owning,
}

/// Initial [`RefKind`] per pointer kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointerHandling {
    /// Targets of reference pointers.
    pub reference: RefKind,
    /// Targets of defining pointers.
    pub defining: RefKind,
    /// Targets of owning pointers.
    pub owning: RefKind,
}

impl PointerHandling {
    /// Duplicate owned and defined objects, share referenced ones.
    pub fn deep() -> Self {
        Self {
            reference: RefKind::Copy,
            defining: RefKind::Clone,
            owning: RefKind::Clone,
        }
    }

    /// Duplicate the pushed roots only; every pointer becomes null.
    pub fn shallow() -> Self {
        Self {
            reference: RefKind::Null,
            defining: RefKind::Null,
            owning: RefKind::Null,
        }
    }

    /// Ask the hooks about every pointee.
    pub fn enquire() -> Self {
        Self {
            reference: RefKind::Enquire,
            defining: RefKind::Enquire,
            owning: RefKind::Enquire,
        }
    }

    /// Kind assigned to a target reached through `ptr_type`.
    pub fn kind_for(&self, ptr_type: PtrType) -> RefKind {
        match ptr_type {
            PtrType::Root => RefKind::Clone,
            PtrType::Reference => self.reference,
            PtrType::Defining => self.defining,
            PtrType::Owning => self.owning,
        }
    }
}

impl Default for PointerHandling {
    fn default() -> Self {
        Self::enquire()
    }
}

/// Answer of [`CloneHooks::object_enquiry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Duplicate the object.
    Clone,
    /// Keep pointing at the original.
    Reference,
    /// Point at another object instead (`None` nulls the pointers).
    Replace(Option<Handle>),
}

/// Caller policy plugged into a clone.
pub trait CloneHooks {
    /// Decide the fate of an object reached at [`RefKind::Enquire`].
    fn object_enquiry(
        &mut self,
        _registry: &Registry,
        _heap: &Heap,
        _object: Handle,
        _descriptor: DescriptorId,
        _ptr_type: PtrType,
    ) -> Resolution {
        Resolution::Reference
    }

    /// Called once per cloned object nothing in the new graph owns.
    fn finish_orphan_object_cloning(
        &mut self,
        _registry: &Registry,
        _heap: &mut Heap,
        _old: Handle,
        _new: Handle,
    ) {
    }
}

/// Hooks with the default behavior.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultCloneHooks;

impl CloneHooks for DefaultCloneHooks {}

#[derive(Debug, Clone)]
struct WorkItem {
    old: Handle,
    new: Option<Handle>,
    descriptor: DescriptorId,
    kind: RefKind,
    ptr_type: PtrType,
    orphan: bool,
    pushed: bool,
    range: Option<Range<usize>>,
}

#[derive(Debug, Default)]
struct CloneTable {
    items: Vec<WorkItem>,
    by_old: HashMap<Handle, usize>,
}

impl CloneTable {
    fn index_or_insert(&mut self, heap: &Heap, old: Handle, descriptor: DescriptorId) -> usize {
        if let Some(index) = self.by_old.get(&old) {
            return *index;
        }
        kernel_assert!(heap.contains(old), "clone of dead object {}", old);
        let index = self.items.len();
        self.items.push(WorkItem {
            old,
            new: None,
            descriptor,
            kind: RefKind::Enquire,
            ptr_type: PtrType::Root,
            orphan: true,
            pushed: false,
            range: None,
        });
        self.by_old.insert(old, index);
        index
    }

    // Raise the kind of item `index`; never lowers. True on change.
    fn advance(&mut self, index: usize, kind: RefKind) -> bool {
        let item = &mut self.items[index];
        if kind <= item.kind {
            return false;
        }
        trace!(old = %item.old, from = ?item.kind, to = ?kind, "ref kind advanced");
        item.kind = kind;
        item.new = match kind {
            RefKind::Copy => Some(item.old),
            RefKind::Enquire | RefKind::Null | RefKind::Clone => None,
        };
        true
    }

    fn discover(
        &mut self,
        registry: &Registry,
        heap: &Heap,
        handling: &PointerHandling,
        target: Handle,
        static_type: DescriptorId,
        ptr_type: PtrType,
    ) {
        let descriptor = registry.runtime_descriptor(heap, target, static_type);
        let index = self.index_or_insert(heap, target, descriptor);
        let item = &mut self.items[index];
        item.ptr_type = item.ptr_type.max(ptr_type);
        if matches!(ptr_type, PtrType::Owning | PtrType::Defining) {
            item.orphan = false;
        }
        self.advance(index, handling.kind_for(ptr_type));
    }

    // Where a pointer to `old` goes in the new graph.
    fn redirect(&self, old: Handle) -> Option<Handle> {
        let Some(index) = self.by_old.get(&old) else {
            return Some(old);
        };
        let item = &self.items[*index];
        match item.kind {
            RefKind::Enquire => kernel_fatal!("object {} still at Enquire after discovery", old),
            RefKind::Null => None,
            RefKind::Copy => item.new,
            RefKind::Clone => match item.new {
                Some(new) => Some(new),
                None => kernel_fatal!("cloned object {} has no new address", old),
            },
        }
    }
}

// Writes values into the clone buffer; pointers are recorded as old
// handle bits and their targets enter the work list.
struct CloneWriter<'e> {
    buffer: &'e mut Vec<u8>,
    table: &'e mut CloneTable,
    handling: PointerHandling,
}

impl CloneWriter<'_> {
    fn pointer(
        &mut self,
        registry: &Registry,
        heap: &Heap,
        info: &PointerInfo,
        target: Option<Handle>,
        ptr_type: PtrType,
    ) {
        let bits = target.map_or(0, Handle::to_bits);
        codec::encode_int(self.buffer, i128::from(bits));
        if let Some(target) = target {
            self.table
                .discover(registry, heap, &self.handling, target, info.base(), ptr_type);
        }
    }
}

impl ObjectOutput for CloneWriter<'_> {
    fn write_int(&mut self, value: i128) {
        codec::encode_int(self.buffer, value);
    }

    fn write_str(&mut self, value: &str) {
        codec::encode_str(self.buffer, value);
    }

    fn write_owning_pointer(
        &mut self,
        registry: &Registry,
        heap: &Heap,
        info: &PointerInfo,
        target: Option<Handle>,
    ) {
        self.pointer(registry, heap, info, target, PtrType::Owning);
    }

    fn write_defining_pointer(
        &mut self,
        registry: &Registry,
        heap: &Heap,
        info: &PointerInfo,
        target: Option<Handle>,
    ) {
        self.pointer(registry, heap, info, target, PtrType::Defining);
    }

    fn write_reference_pointer(
        &mut self,
        registry: &Registry,
        heap: &Heap,
        info: &PointerInfo,
        target: Option<Handle>,
    ) {
        self.pointer(registry, heap, info, target, PtrType::Reference);
    }
}

// Reads one item's buffer range back, redirecting pointers.
struct CloneReader<'e> {
    bytes: &'e [u8],
    pos: usize,
    table: &'e CloneTable,
    produced: &'e mut Vec<Handle>,
    seen: &'e mut HashSet<Handle>,
}

impl CloneReader<'_> {
    fn produce(&mut self, handle: Handle) {
        if self.seen.insert(handle) {
            self.produced.push(handle);
        }
    }
}

impl ObjectInput for CloneReader<'_> {
    fn read_int(&mut self) -> i128 {
        match codec::decode_int(self.bytes, &mut self.pos) {
            Some(value) => value,
            None => kernel_fatal!("clone buffer truncated at byte {}", self.pos),
        }
    }

    fn read_str(&mut self) -> String {
        match codec::decode_str(self.bytes, &mut self.pos) {
            Some(value) => value,
            None => kernel_fatal!("clone buffer truncated at byte {}", self.pos),
        }
    }

    fn read_owning_pointer(
        &mut self,
        _registry: &Registry,
        _heap: &mut Heap,
        _info: &PointerInfo,
    ) -> Option<Handle> {
        let bits = self.read_int();
        let old = Handle::from_bits(u64::try_from(bits).unwrap_or(0))?;
        let new = self.table.redirect(old)?;
        if self
            .table
            .by_old
            .get(&old)
            .is_some_and(|index| self.table.items[*index].kind == RefKind::Clone)
        {
            self.produce(new);
        }
        Some(new)
    }
}

/// Clone session: `open`, push roots, `perform_cloning`, query, `close`.
#[derive(Debug, Default)]
pub struct CloneEngine {
    handling: PointerHandling,
    table: CloneTable,
    buffer: Vec<u8>,
    open: bool,
    performed: bool,
}

impl CloneEngine {
    /// Engine using `handling` for discovered pointees.
    pub fn new(handling: PointerHandling) -> Self {
        Self {
            handling,
            ..Self::default()
        }
    }

    /// Pointer policy of this engine.
    pub fn handling(&self) -> PointerHandling {
        self.handling
    }

    /// Start a session.
    pub fn open(&mut self) {
        kernel_assert!(!self.open, "clone session already open");
        self.table = CloneTable::default();
        self.buffer.clear();
        self.open = true;
        self.performed = false;
    }

    /// End the session and drop its tables.
    pub fn close(&mut self) {
        kernel_assert!(self.open, "clone session not open");
        debug!(items = self.table.items.len(), bytes = self.buffer.len(), "clone session closed");
        self.table = CloneTable::default();
        self.buffer.clear();
        self.open = false;
    }

    fn check_pushable(&self) {
        kernel_assert!(self.open, "clone session not open");
        kernel_assert!(!self.performed, "push after perform_cloning");
    }

    fn item_for(&mut self, heap: &Heap, old: Handle) -> usize {
        let Some(descriptor) = heap.descriptor_of(old) else {
            kernel_fatal!("clone of dead object {}", old);
        };
        self.table.index_or_insert(heap, old, descriptor)
    }

    /// Duplicate `old` as a root of the new graph.
    pub fn push_for_clone(&mut self, heap: &Heap, old: Handle) {
        self.check_pushable();
        let index = self.item_for(heap, old);
        let item = &mut self.table.items[index];
        item.orphan = false;
        item.pushed = true;
        self.table.advance(index, RefKind::Clone);
    }

    /// Keep pointers to `old` pointing at `old`.
    pub fn push_for_copy(&mut self, heap: &Heap, old: Handle) {
        self.check_pushable();
        let index = self.item_for(heap, old);
        self.table.advance(index, RefKind::Copy);
    }

    /// Redirect pointers to `old` at `new` (`None` nulls them). Fatal if
    /// that lowers the kind `old` already has.
    pub fn push_for_replacement(&mut self, heap: &Heap, old: Handle, new: Option<Handle>) {
        self.check_pushable();
        let index = self.item_for(heap, old);
        let item = &mut self.table.items[index];
        let kind = if new.is_some() { RefKind::Copy } else { RefKind::Null };
        kernel_assert!(
            kind >= item.kind,
            "replacement of {} would lower its ref kind from {:?} to {:?}",
            old,
            item.kind,
            kind
        );
        item.kind = kind;
        item.new = new;
        trace!(%old, new = ?new, "pushed for replacement");
    }

    /// Run the four phases. Returns the roots of the new graph, in the
    /// order their addresses were first produced.
    pub fn perform_cloning(
        &mut self,
        registry: &Registry,
        heap: &mut Heap,
        hooks: &mut dyn CloneHooks,
    ) -> Vec<Handle> {
        kernel_assert!(self.open, "clone session not open");
        kernel_assert!(!self.performed, "perform_cloning called twice");
        self.performed = true;

        self.discover(registry, heap, hooks);
        self.allocate(registry, heap);
        let roots = self.read_back(registry, heap);
        self.finish_orphans(registry, heap, hooks);

        let mut done = HashSet::new();
        for root in &roots {
            initialize_object(registry, heap, *root, &mut done);
        }
        debug!(
            items = self.table.items.len(),
            cloned = self.table.items.iter().filter(|i| i.kind == RefKind::Clone).count(),
            bytes = self.buffer.len(),
            "cloning performed"
        );
        roots
    }

    fn discover(&mut self, registry: &Registry, heap: &Heap, hooks: &mut dyn CloneHooks) {
        loop {
            let mut changed = false;
            // items may grow while writing
            let mut index = 0;
            while index < self.table.items.len() {
                if self.table.items[index].kind == RefKind::Enquire {
                    let item = &self.table.items[index];
                    let (old, descriptor, ptr_type) = (item.old, item.descriptor, item.ptr_type);
                    let resolution =
                        hooks.object_enquiry(registry, heap, old, descriptor, ptr_type);
                    trace!(%old, ?resolution, "object enquiry");
                    match resolution {
                        Resolution::Clone => self.table.advance(index, RefKind::Clone),
                        Resolution::Reference => self.table.advance(index, RefKind::Copy),
                        Resolution::Replace(new) => {
                            let item = &mut self.table.items[index];
                            item.kind = if new.is_some() { RefKind::Copy } else { RefKind::Null };
                            item.new = new;
                            true
                        }
                    };
                    changed = true;
                }
                let item = &self.table.items[index];
                if item.kind == RefKind::Clone && item.range.is_none() {
                    let (old, descriptor) = (item.old, item.descriptor);
                    let start = self.buffer.len();
                    let mut writer = CloneWriter {
                        buffer: &mut self.buffer,
                        table: &mut self.table,
                        handling: self.handling,
                    };
                    write_value(&mut writer, registry, heap, descriptor, heap.value(old));
                    let range = start..self.buffer.len();
                    trace!(%old, bytes = range.len(), "clone item written");
                    self.table.items[index].range = Some(range);
                    changed = true;
                }
                index += 1;
            }
            if !changed {
                break;
            }
        }
    }

    fn allocate(&mut self, registry: &Registry, heap: &mut Heap) {
        for item in &mut self.table.items {
            kernel_assert!(
                item.kind != RefKind::Enquire,
                "object {} still at Enquire at allocation",
                item.old
            );
            if item.kind == RefKind::Clone && item.new.is_none() {
                item.new = Some(registry.create_empty_object(heap, item.descriptor));
            }
        }
    }

    fn read_back(&mut self, registry: &Registry, heap: &mut Heap) -> Vec<Handle> {
        let mut produced = Vec::new();
        let mut seen = HashSet::new();
        for index in 0..self.table.items.len() {
            let item = &self.table.items[index];
            let (Some(range), Some(new)) = (item.range.clone(), item.new) else {
                continue;
            };
            let descriptor = item.descriptor;
            if item.pushed && seen.insert(new) {
                produced.push(new);
            }
            let mut value = heap.take_value(new);
            let mut reader = CloneReader {
                bytes: &self.buffer[range.clone()],
                pos: 0,
                table: &self.table,
                produced: &mut produced,
                seen: &mut seen,
            };
            read_value(&mut reader, registry, heap, descriptor, &mut value);
            kernel_assert!(
                reader.pos == range.len(),
                "clone item {} read {} of {} bytes",
                index,
                reader.pos,
                range.len()
            );
            heap.restore_value(new, value);
        }
        produced
    }

    fn finish_orphans(&mut self, registry: &Registry, heap: &mut Heap, hooks: &mut dyn CloneHooks) {
        for item in &self.table.items {
            if item.kind != RefKind::Clone || !item.orphan {
                continue;
            }
            if let Some(new) = item.new {
                trace!(old = %item.old, %new, "finishing orphan");
                hooks.finish_orphan_object_cloning(registry, heap, item.old, new);
            }
        }
    }

    /// New address of `old`, for cloned, copied and replaced objects.
    pub fn clone_address(&self, old: Handle) -> Option<Handle> {
        let index = self.table.by_old.get(&old)?;
        self.table.items[*index].new
    }

    /// True if `old` was duplicated.
    pub fn is_cloned(&self, old: Handle) -> bool {
        self.table
            .by_old
            .get(&old)
            .is_some_and(|index| self.table.items[*index].kind == RefKind::Clone)
    }

    /// Number of work items.
    pub fn clone_count(&self) -> usize {
        self.table.items.len()
    }

    fn item(&self, n: usize) -> &WorkItem {
        match self.table.items.get(n) {
            Some(item) => item,
            None => kernel_fatal!("clone item {} out of range ({})", n, self.table.items.len()),
        }
    }

    /// Original object of item `n`.
    pub fn old_address(&self, n: usize) -> Handle {
        self.item(n).old
    }

    /// New object of item `n`, if any.
    pub fn new_address(&self, n: usize) -> Option<Handle> {
        self.item(n).new
    }

    /// Runtime type of item `n`.
    pub fn descriptor(&self, n: usize) -> DescriptorId {
        self.item(n).descriptor
    }

    /// True if item `n` was duplicated.
    pub fn is_cloned_at(&self, n: usize) -> bool {
        self.item(n).kind == RefKind::Clone
    }

    /// True if item `n` was cloned without an owner in the new graph.
    pub fn is_orphan(&self, n: usize) -> bool {
        let item = self.item(n);
        item.kind == RefKind::Clone && item.orphan
    }

    /// Clone decision of item `n`.
    pub fn ref_kind(&self, n: usize) -> RefKind {
        self.item(n).kind
    }
}

/// Clone the graph below `root` in one session. Returns the new root.
pub fn clone_object(
    registry: &Registry,
    heap: &mut Heap,
    root: Handle,
    handling: PointerHandling,
    hooks: &mut dyn CloneHooks,
) -> Handle {
    let mut engine = CloneEngine::new(handling);
    engine.open();
    engine.push_for_clone(heap, root);
    engine.perform_cloning(registry, heap, hooks);
    let new = match engine.clone_address(root) {
        Some(new) => new,
        None => kernel_fatal!("root {} was not cloned", root),
    };
    engine.close();
    new
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    struct Graph {
        registry: Registry,
        node: DescriptorId,
        leaf: DescriptorId,
    }

    // Node { value: i32, child: PTR:O Leaf, shared: PTR:R Leaf }
    fn graph() -> Graph {
        let mut registry = Registry::new();
        let b = registry.builtins().clone();
        let leaf = registry.aggregate("Leaf").field("v", b.i32).build();
        let owner = registry.owning_pointer(leaf);
        let reference = registry.reference_pointer(leaf);
        let node = registry
            .aggregate("Node")
            .field("value", b.i32)
            .field("child", owner)
            .field("shared", reference)
            .build();
        Graph { registry, node, leaf }
    }

    fn sample(g: &Graph, heap: &mut Heap) -> (Handle, Handle, Handle) {
        let child = heap.alloc(g.leaf, Value::Aggregate(vec![Value::Int(1)]));
        let shared = heap.alloc(g.leaf, Value::Aggregate(vec![Value::Int(2)]));
        let root = heap.alloc(
            g.node,
            Value::Aggregate(vec![
                Value::Int(7),
                Value::Pointer(Some(child)),
                Value::Pointer(Some(shared)),
            ]),
        );
        (root, child, shared)
    }

    #[test]
    fn test_deep_clone_duplicates_owned_and_shares_references() {
        let g = graph();
        let mut heap = Heap::new();
        let (root, child, shared) = sample(&g, &mut heap);

        let deep = PointerHandling::deep();
        let new = clone_object(&g.registry, &mut heap, root, deep, &mut DefaultCloneHooks);
        assert_ne!(new, root);
        let fields = heap.value(new).fields().expect("fields").to_vec();
        assert_eq!(fields[0], Value::Int(7));
        let new_child = fields[1].as_pointer().flatten().expect("child");
        assert_ne!(new_child, child);
        assert_eq!(heap.value(new_child), heap.value(child));
        assert_eq!(fields[2], Value::Pointer(Some(shared)));
        assert_eq!(heap.len(), 5);
    }

    #[test]
    fn test_shallow_clone_nulls_pointers() {
        let g = graph();
        let mut heap = Heap::new();
        let (root, _, _) = sample(&g, &mut heap);
        let shallow = PointerHandling::shallow();
        let new = clone_object(&g.registry, &mut heap, root, shallow, &mut DefaultCloneHooks);
        let fields = heap.value(new).fields().expect("fields");
        assert_eq!(fields[0], Value::Int(7));
        assert_eq!(fields[1], Value::Pointer(None));
        assert_eq!(fields[2], Value::Pointer(None));
    }

    #[test]
    fn test_default_enquiry_keeps_originals() {
        let g = graph();
        let mut heap = Heap::new();
        let (root, child, shared) = sample(&g, &mut heap);
        let mut engine = CloneEngine::default();
        engine.open();
        engine.push_for_clone(&heap, root);
        engine.perform_cloning(&g.registry, &mut heap, &mut DefaultCloneHooks);
        assert_eq!(engine.clone_count(), 3);
        for n in 0..engine.clone_count() {
            assert_ne!(engine.ref_kind(n), RefKind::Enquire);
        }
        assert!(engine.is_cloned(root));
        assert!(!engine.is_cloned(child));
        assert_eq!(engine.clone_address(child), Some(child));
        assert_eq!(engine.clone_address(shared), Some(shared));
        engine.close();
    }

    struct CloneEverything {
        orphans: Vec<(Handle, Handle)>,
    }

    impl CloneHooks for CloneEverything {
        fn object_enquiry(
            &mut self,
            _registry: &Registry,
            _heap: &Heap,
            _object: Handle,
            _descriptor: DescriptorId,
            _ptr_type: PtrType,
        ) -> Resolution {
            Resolution::Clone
        }

        fn finish_orphan_object_cloning(
            &mut self,
            _registry: &Registry,
            _heap: &mut Heap,
            old: Handle,
            new: Handle,
        ) {
            self.orphans.push((old, new));
        }
    }

    #[test]
    fn test_referenced_clone_is_orphan() {
        let g = graph();
        let mut heap = Heap::new();
        let (root, child, shared) = sample(&g, &mut heap);
        let mut hooks = CloneEverything { orphans: Vec::new() };
        let mut engine = CloneEngine::default();
        engine.open();
        engine.push_for_clone(&heap, root);
        engine.perform_cloning(&g.registry, &mut heap, &mut hooks);
        assert!(engine.is_cloned(child));
        assert!(engine.is_cloned(shared));
        let new_shared = engine.clone_address(shared).expect("cloned");
        assert_eq!(hooks.orphans, vec![(shared, new_shared)]);
        let orphans: Vec<usize> =
            (0..engine.clone_count()).filter(|n| engine.is_orphan(*n)).collect();
        assert_eq!(orphans.len(), 1);
        assert_eq!(engine.old_address(orphans[0]), shared);
        assert_eq!(engine.descriptor(orphans[0]), g.leaf);
        engine.close();
    }

    #[test]
    fn test_replacement_redirects_pointers() {
        let g = graph();
        let mut heap = Heap::new();
        let (root, _, shared) = sample(&g, &mut heap);
        let other = heap.alloc(g.leaf, Value::Aggregate(vec![Value::Int(9)]));
        let mut engine = CloneEngine::new(PointerHandling::deep());
        engine.open();
        engine.push_for_replacement(&heap, shared, Some(other));
        engine.push_for_clone(&heap, root);
        let roots = engine.perform_cloning(&g.registry, &mut heap, &mut DefaultCloneHooks);
        let new = engine.clone_address(root).expect("root");
        assert_eq!(roots[0], new);
        let fields = heap.value(new).fields().expect("fields");
        assert_eq!(fields[2], Value::Pointer(Some(other)));
        engine.close();
    }

    #[test]
    #[should_panic(expected = "would lower its ref kind")]
    fn test_lowering_clone_is_fatal() {
        let g = graph();
        let mut heap = Heap::new();
        let (root, _, _) = sample(&g, &mut heap);
        let mut engine = CloneEngine::default();
        engine.open();
        engine.push_for_clone(&heap, root);
        engine.push_for_replacement(&heap, root, None);
    }

    #[test]
    #[should_panic(expected = "from Copy to Null")]
    fn test_nulling_a_copy_is_fatal() {
        let g = graph();
        let mut heap = Heap::new();
        let (_, _, shared) = sample(&g, &mut heap);
        let mut engine = CloneEngine::default();
        engine.open();
        engine.push_for_copy(&heap, shared);
        engine.push_for_replacement(&heap, shared, None);
    }

    #[test]
    fn test_cycle_through_owning_pointers() {
        let mut registry = Registry::new();
        let b = registry.builtins().clone();
        let ring = registry.create_aggregate("Ring", None);
        let next = registry.owning_pointer(ring);
        registry.add_field(ring, "id", b.i32);
        registry.add_field(ring, "next", next);
        let mut heap = Heap::new();
        let a = heap.reserve();
        let c = heap.alloc(ring, Value::Aggregate(vec![Value::Int(2), Value::Pointer(Some(a))]));
        heap.fill(a, ring, Value::Aggregate(vec![Value::Int(1), Value::Pointer(Some(c))]));

        let deep = PointerHandling::deep();
        let new_a = clone_object(&registry, &mut heap, a, deep, &mut DefaultCloneHooks);
        let new_c = heap.value(new_a).fields().expect("fields")[1]
            .as_pointer()
            .flatten()
            .expect("next");
        assert_ne!(new_c, c);
        let back = &heap.value(new_c).fields().expect("fields")[1];
        assert_eq!(*back, Value::Pointer(Some(new_a)));
    }
}
