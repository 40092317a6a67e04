// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Depth-first object graph walks.
//!
//! A walk starts at a heap object and follows the pointer slots its
//! descriptor exposes: aggregate fields, union common fields plus the
//! active alternative, list elements and static pointees. Which heap
//! pointers are followed is up to [`Walker::is_walkable`]; the default
//! follows owning pointers only, so a walk covers the ownership tree.
//!
//! In pre-order mode the callback may return [`ApplyStatus::Replaced`]
//! with a new object. The walker writes the new handle back into the
//! parent slot and descends into the replacement instead.

use crate::descriptor::{DescriptorId, DescriptorKind, PointerInfo, PointerStrategy};
use crate::heap::{Handle, Heap};
use crate::registry::Registry;
use crate::value::{Step, Value};
use std::collections::{HashMap, HashSet};
use tracing::trace;

/// Result of one [`Walker::apply`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyStatus {
    /// Keep walking.
    Continue,
    /// End the walk; it reports [`WalkEnd::Stopped`].
    Stop,
    /// End the walk; it reports [`WalkEnd::Aborted`].
    Abort,
    /// Do not descend below this object.
    Truncate,
    /// The object was replaced by another one (pre-order only).
    Replaced(Handle),
}

/// Whether objects are applied before or after their children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WalkOrder {
    /// Parents first.
    #[default]
    Pre,
    /// Children first.
    Post,
}

/// How a walk ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkEnd {
    /// Every reachable object was visited.
    Completed,
    /// A callback returned [`ApplyStatus::Stop`].
    Stopped,
    /// A callback returned [`ApplyStatus::Abort`].
    Aborted,
}

/// Outcome of [`walk`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Walk {
    /// Root after replacement.
    pub root: Handle,
    /// How the walk ended.
    pub end: WalkEnd,
}

/// Callback of a graph walk.
pub trait Walker {
    /// Pre- or post-order.
    fn order(&self) -> WalkOrder {
        WalkOrder::Pre
    }

    /// Whether `apply` is called for this object. Children are walked
    /// either way.
    fn is_visitable(&self, _registry: &Registry, _heap: &Heap, _handle: Handle) -> bool {
        true
    }

    /// Whether a heap pointer slot is followed.
    fn is_walkable(&self, _registry: &Registry, pointer: &PointerInfo) -> bool {
        pointer.strategy() == PointerStrategy::Owning
    }

    /// Visit one object.
    fn apply(&mut self, registry: &Registry, heap: &mut Heap, handle: Handle) -> ApplyStatus;
}

enum Flow {
    Continue,
    Stop,
    Abort,
}

struct WalkState<'w, W: ?Sized> {
    walker: &'w mut W,
    registry: &'w Registry,
    order: WalkOrder,
    visited: HashSet<Handle>,
}

/// Walk the graph below `root`. Each object is visited at most once.
pub fn walk<W: Walker + ?Sized>(
    walker: &mut W,
    registry: &Registry,
    heap: &mut Heap,
    root: Handle,
) -> Walk {
    let order = walker.order();
    let mut state = WalkState {
        walker,
        registry,
        order,
        visited: HashSet::new(),
    };
    let (root, flow) = state.visit(heap, root);
    let end = match flow {
        Flow::Continue => WalkEnd::Completed,
        Flow::Stop => WalkEnd::Stopped,
        Flow::Abort => WalkEnd::Aborted,
    };
    trace!(%root, visited = state.visited.len(), ?end, "walk finished");
    Walk { root, end }
}

impl<W: Walker + ?Sized> WalkState<'_, W> {
    fn visit(&mut self, heap: &mut Heap, handle: Handle) -> (Handle, Flow) {
        if !self.visited.insert(handle) {
            return (handle, Flow::Continue);
        }
        let mut current = handle;
        let visitable = self.walker.is_visitable(self.registry, heap, current);
        if self.order == WalkOrder::Pre && visitable {
            match self.walker.apply(self.registry, heap, current) {
                ApplyStatus::Continue => {}
                ApplyStatus::Truncate => return (current, Flow::Continue),
                ApplyStatus::Stop => return (current, Flow::Stop),
                ApplyStatus::Abort => return (current, Flow::Abort),
                ApplyStatus::Replaced(replacement) => {
                    trace!(from = %current, to = %replacement, "object replaced during walk");
                    self.visited.insert(replacement);
                    current = replacement;
                }
            }
        }

        for (path, child) in self.children(heap, current) {
            let (replaced, flow) = self.visit(heap, child);
            if replaced != child {
                match heap.value_mut(current).at_mut(&path) {
                    Some(slot) => *slot = Value::Pointer(Some(replaced)),
                    None => kernel_fatal!("pointer slot of {} vanished during walk", current),
                }
            }
            match flow {
                Flow::Continue => {}
                stop => return (current, stop),
            }
        }

        if self.order == WalkOrder::Post && visitable {
            match self.walker.apply(self.registry, heap, current) {
                ApplyStatus::Continue | ApplyStatus::Truncate => {}
                ApplyStatus::Stop => return (current, Flow::Stop),
                ApplyStatus::Abort => return (current, Flow::Abort),
                ApplyStatus::Replaced(_) => {
                    kernel_fatal!("replacement of {} requested in a post-order walk", current)
                }
            }
        }
        (current, Flow::Continue)
    }

    fn children(&self, heap: &Heap, handle: Handle) -> Vec<(Vec<Step>, Handle)> {
        let Some(descriptor) = heap.descriptor_of(handle) else {
            kernel_fatal!("walk reached dead object {}", handle);
        };
        let mut out = Vec::new();
        let mut prefix = Vec::new();
        self.collect(descriptor, heap.value(handle), &mut prefix, &mut out);
        out
    }

    fn collect(
        &self,
        descriptor: DescriptorId,
        value: &Value,
        prefix: &mut Vec<Step>,
        out: &mut Vec<(Vec<Step>, Handle)>,
    ) {
        let registry = self.registry;
        match registry.get(descriptor).kind() {
            DescriptorKind::Aggregate(_) | DescriptorKind::Union(_) => {
                let fields = registry.fields(descriptor);
                let values = value.fields().unwrap_or_default();
                for (index, (field, child)) in fields.iter().zip(values).enumerate() {
                    prefix.push(Step::Field(index));
                    self.collect(field.descriptor(), child, prefix, out);
                    prefix.pop();
                }
                if let Some(info) = registry.get(descriptor).union() {
                    if let Some((index, alternative)) = registry.active_value(descriptor, value) {
                        prefix.push(Step::Alternative);
                        let target = info.alternatives()[index].descriptor();
                        self.collect(target, alternative, prefix, out);
                        prefix.pop();
                    }
                }
            }
            DescriptorKind::Pointer(info) => match value {
                Value::Pointer(Some(target)) if self.walker.is_walkable(registry, info) => {
                    out.push((prefix.clone(), *target));
                }
                Value::Static(Some(inner)) => {
                    prefix.push(Step::Embedded);
                    self.collect(info.base(), inner, prefix, out);
                    prefix.pop();
                }
                _ => {}
            },
            DescriptorKind::List(info) => {
                for (index, item) in info.container().elements(value).iter().enumerate() {
                    prefix.push(Step::Element(index));
                    self.collect(info.element(), item, prefix, out);
                    prefix.pop();
                }
            }
            DescriptorKind::Integer(_) | DescriptorKind::String => {}
        }
    }
}

/// Applies a closure to objects of one type and its subclasses.
pub struct SelectiveWalker<F> {
    target: DescriptorId,
    order: WalkOrder,
    f: F,
}

impl<F> SelectiveWalker<F>
where
    F: FnMut(&Registry, &mut Heap, Handle) -> ApplyStatus,
{
    /// Pre-order walker applying `f` to every object kind-of `target`.
    pub fn new(target: DescriptorId, f: F) -> Self {
        Self {
            target,
            order: WalkOrder::Pre,
            f,
        }
    }

    /// Switch the walk order.
    pub fn with_order(mut self, order: WalkOrder) -> Self {
        self.order = order;
        self
    }

    /// Type the walker selects.
    pub fn target(&self) -> DescriptorId {
        self.target
    }
}

impl<F> Walker for SelectiveWalker<F>
where
    F: FnMut(&Registry, &mut Heap, Handle) -> ApplyStatus,
{
    fn order(&self) -> WalkOrder {
        self.order
    }

    fn is_visitable(&self, registry: &Registry, heap: &Heap, handle: Handle) -> bool {
        heap.descriptor_of(handle)
            .is_some_and(|d| registry.is_kind_of(d, self.target))
    }

    fn apply(&mut self, registry: &Registry, heap: &mut Heap, handle: Handle) -> ApplyStatus {
        (self.f)(registry, heap, handle)
    }
}

/// Table of values keyed by descriptor, looked up through the base chain.
///
/// All entries must be set before the first lookup; setting one afterwards
/// is fatal.
#[derive(Debug)]
pub struct TypeDispatch<T> {
    values: HashMap<DescriptorId, T>,
    // runtime type -> nearest ancestor with an entry
    resolved: HashMap<DescriptorId, Option<DescriptorId>>,
    locked: bool,
}

impl<T> Default for TypeDispatch<T> {
    fn default() -> Self {
        Self {
            values: HashMap::new(),
            resolved: HashMap::new(),
            locked: false,
        }
    }
}

impl<T> TypeDispatch<T> {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the value for `descriptor` and its subclasses.
    pub fn set(&mut self, descriptor: DescriptorId, value: T) {
        kernel_assert!(!self.locked, "type dispatch table modified after lookup");
        self.values.insert(descriptor, value);
    }

    /// Value registered for `descriptor` itself.
    pub fn get(&self, descriptor: DescriptorId) -> Option<&T> {
        self.values.get(&descriptor)
    }

    fn resolve(&mut self, registry: &Registry, descriptor: DescriptorId) -> Option<DescriptorId> {
        self.locked = true;
        if let Some(found) = self.resolved.get(&descriptor) {
            return *found;
        }
        let found = registry
            .base_chain(descriptor)
            .into_iter()
            .rev()
            .find(|level| self.values.contains_key(level));
        self.resolved.insert(descriptor, found);
        found
    }

    /// Value of the nearest ancestor of `descriptor` that has one.
    pub fn lookup(&mut self, registry: &Registry, descriptor: DescriptorId) -> Option<&T> {
        let key = self.resolve(registry, descriptor)?;
        self.values.get(&key)
    }

    /// Mutable form of [`TypeDispatch::lookup`].
    pub fn lookup_mut(&mut self, registry: &Registry, descriptor: DescriptorId) -> Option<&mut T> {
        let key = self.resolve(registry, descriptor)?;
        self.values.get_mut(&key)
    }

    /// True once a lookup happened.
    pub fn is_locked(&self) -> bool {
        self.locked
    }
}

/// Per-type handler of a [`GroupWalker`].
pub type GroupHandler = Box<dyn FnMut(&Registry, &mut Heap, Handle) -> ApplyStatus>;

/// Dispatches each object to the handler of its nearest registered type.
/// Objects without a handler are walked through.
#[derive(Default)]
pub struct GroupWalker {
    handlers: TypeDispatch<GroupHandler>,
    order: WalkOrder,
}

impl GroupWalker {
    /// Pre-order walker with no handlers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Switch the walk order.
    pub fn with_order(mut self, order: WalkOrder) -> Self {
        self.order = order;
        self
    }

    /// Add the handler for `descriptor` and its subclasses.
    pub fn on(
        mut self,
        descriptor: DescriptorId,
        handler: impl FnMut(&Registry, &mut Heap, Handle) -> ApplyStatus + 'static,
    ) -> Self {
        self.handlers.set(descriptor, Box::new(handler));
        self
    }
}

impl Walker for GroupWalker {
    fn order(&self) -> WalkOrder {
        self.order
    }

    fn apply(&mut self, registry: &Registry, heap: &mut Heap, handle: Handle) -> ApplyStatus {
        let Some(descriptor) = heap.descriptor_of(handle) else {
            return ApplyStatus::Continue;
        };
        match self.handlers.lookup_mut(registry, descriptor) {
            Some(handler) => handler(registry, heap, handle),
            None => ApplyStatus::Continue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Tree {
        registry: Registry,
        node: DescriptorId,
        leaf: DescriptorId,
    }

    // Node { tag: i32, kids: LIST<PTR:O Node> }, Leaf : Node
    fn tree() -> Tree {
        let mut registry = Registry::new();
        let i32_id = registry.builtins().i32;
        let node = registry.create_object_aggregate("Node", None);
        let own = registry.owning_pointer(node);
        let kids = registry.get_list(own, "LIST:Vec<Node*>");
        registry.add_field(node, "tag", i32_id);
        registry.add_field(node, "kids", kids);
        let leaf = registry.create_object_aggregate("Leaf", Some(node));
        Tree { registry, node, leaf }
    }

    fn make(heap: &mut Heap, ty: DescriptorId, tag: i32, kids: Vec<Handle>) -> Handle {
        heap.alloc(
            ty,
            Value::Aggregate(vec![
                tag.into(),
                Value::List(kids.into_iter().map(Value::from).collect()),
            ]),
        )
    }

    fn tag(heap: &Heap, h: Handle) -> i128 {
        heap.value(h).fields().and_then(|f| f[0].as_int()).unwrap_or(-1)
    }

    struct Recorder {
        order: WalkOrder,
        seen: Vec<i128>,
        stop_at: Option<i128>,
        truncate_at: Option<i128>,
    }

    impl Walker for Recorder {
        fn order(&self) -> WalkOrder {
            self.order
        }

        fn apply(&mut self, _registry: &Registry, heap: &mut Heap, handle: Handle) -> ApplyStatus {
            let t = tag(heap, handle);
            self.seen.push(t);
            if Some(t) == self.stop_at {
                ApplyStatus::Stop
            } else if Some(t) == self.truncate_at {
                ApplyStatus::Truncate
            } else {
                ApplyStatus::Continue
            }
        }
    }

    fn recorder(order: WalkOrder) -> Recorder {
        Recorder {
            order,
            seen: Vec::new(),
            stop_at: None,
            truncate_at: None,
        }
    }

    fn sample(t: &Tree, heap: &mut Heap) -> Handle {
        let a = make(heap, t.leaf, 2, vec![]);
        let b = make(heap, t.leaf, 3, vec![]);
        let mid = make(heap, t.node, 1, vec![a, b]);
        let c = make(heap, t.leaf, 4, vec![]);
        make(heap, t.node, 0, vec![mid, c])
    }

    #[test]
    fn test_pre_and_post_order() {
        let t = tree();
        let mut heap = Heap::new();
        let root = sample(&t, &mut heap);

        let mut pre = recorder(WalkOrder::Pre);
        let result = walk(&mut pre, &t.registry, &mut heap, root);
        assert_eq!(result.end, WalkEnd::Completed);
        assert_eq!(pre.seen, vec![0, 1, 2, 3, 4]);

        let mut post = recorder(WalkOrder::Post);
        walk(&mut post, &t.registry, &mut heap, root);
        assert_eq!(post.seen, vec![2, 3, 1, 4, 0]);
    }

    #[test]
    fn test_stop_and_truncate() {
        let t = tree();
        let mut heap = Heap::new();
        let root = sample(&t, &mut heap);

        let mut stopping = recorder(WalkOrder::Pre);
        stopping.stop_at = Some(2);
        assert_eq!(walk(&mut stopping, &t.registry, &mut heap, root).end, WalkEnd::Stopped);
        assert_eq!(stopping.seen, vec![0, 1, 2]);

        let mut truncating = recorder(WalkOrder::Pre);
        truncating.truncate_at = Some(1);
        walk(&mut truncating, &t.registry, &mut heap, root);
        assert_eq!(truncating.seen, vec![0, 1, 4]);
    }

    #[test]
    fn test_replacement_is_written_back() {
        let t = tree();
        let mut heap = Heap::new();
        let root = sample(&t, &mut heap);
        let leaf = t.leaf;
        let mut replacer = SelectiveWalker::new(t.node, move |_registry, heap: &mut Heap, h| {
            if tag(heap, h) == 4 {
                ApplyStatus::Replaced(make(heap, leaf, 40, vec![]))
            } else {
                ApplyStatus::Continue
            }
        });
        walk(&mut replacer, &t.registry, &mut heap, root);

        let mut pre = recorder(WalkOrder::Pre);
        walk(&mut pre, &t.registry, &mut heap, root);
        assert_eq!(pre.seen, vec![0, 1, 2, 3, 40]);
    }

    #[test]
    #[should_panic(expected = "post-order walk")]
    fn test_replacement_in_post_order_is_fatal() {
        let t = tree();
        let mut heap = Heap::new();
        let root = make(&mut heap, t.node, 0, vec![]);
        let other = make(&mut heap, t.node, 1, vec![]);
        let mut walker =
            SelectiveWalker::new(t.node, move |_, _: &mut Heap, _| ApplyStatus::Replaced(other))
                .with_order(WalkOrder::Post);
        walk(&mut walker, &t.registry, &mut heap, root);
    }

    #[test]
    fn test_selective_and_group_walkers() {
        let t = tree();
        let mut heap = Heap::new();
        let root = sample(&t, &mut heap);

        let mut leaves = 0;
        let mut selective = SelectiveWalker::new(t.leaf, |_, _: &mut Heap, _| {
            leaves += 1;
            ApplyStatus::Continue
        });
        walk(&mut selective, &t.registry, &mut heap, root);
        assert_eq!(leaves, 3);

        let log = Rc::new(RefCell::new(Vec::new()));
        let (node_log, leaf_log) = (log.clone(), log.clone());
        let mut group = GroupWalker::new()
            .on(t.node, move |_, heap: &mut Heap, h| {
                node_log.borrow_mut().push(format!("node{}", tag(heap, h)));
                ApplyStatus::Continue
            })
            .on(t.leaf, move |_, heap: &mut Heap, h| {
                leaf_log.borrow_mut().push(format!("leaf{}", tag(heap, h)));
                ApplyStatus::Continue
            });
        walk(&mut group, &t.registry, &mut heap, root);
        assert_eq!(*log.borrow(), ["node0", "node1", "leaf2", "leaf3", "leaf4"]);
    }

    #[test]
    #[should_panic(expected = "modified after lookup")]
    fn test_dispatch_locks_after_lookup() {
        let t = tree();
        let mut table = TypeDispatch::new();
        table.set(t.node, 1);
        assert_eq!(table.lookup(&t.registry, t.leaf), Some(&1));
        table.set(t.leaf, 2);
    }
}
