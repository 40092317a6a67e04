// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Binary stream reader.

use super::codec;
use super::{initialize_object, read_value, ObjectInput};
use crate::config::{NEXT_FRESH_ID, NULL_ID};
use crate::descriptor::{DescriptorId, PointerInfo};
use crate::heap::{Handle, Heap};
use crate::registry::Registry;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, trace};

/// Reads object graphs written by [`super::BinaryWriter`].
///
/// Every new object gets a reserved heap handle before its body is read,
/// so back references inside the body resolve to it. Objects are
/// zeroed and constructed while reading; [`BinaryReader::read_close`] runs
/// the init hooks on every root once all objects exist.
#[derive(Debug)]
pub struct BinaryReader<'b> {
    bytes: &'b [u8],
    pos: usize,
    addresses: HashMap<u32, Handle>,
    max_seen: u32,
    // stream descriptor id -> live descriptor
    descriptors: HashMap<u32, DescriptorId>,
    roots: Vec<Handle>,
}

impl<'b> BinaryReader<'b> {
    /// Reader that maps every descriptor installed in `registry` to
    /// itself. Streams written against another registry need
    /// [`BinaryReader::with_remap`].
    pub fn new(bytes: &'b [u8], registry: &Registry) -> Self {
        let descriptors = registry.iter().map(|d| (d.id().get(), d.id())).collect();
        Self {
            bytes,
            pos: 0,
            addresses: HashMap::new(),
            max_seen: NEXT_FRESH_ID,
            descriptors,
            roots: Vec::new(),
        }
    }

    /// Reader whose table is overridden by the descriptor ids in `remap`.
    pub fn with_remap(
        bytes: &'b [u8],
        registry: &Registry,
        remap: &BTreeMap<u32, DescriptorId>,
    ) -> Self {
        let mut reader = Self::new(bytes, registry);
        for (old, new) in remap {
            reader.remap_descriptor(*old, *new);
        }
        reader
    }

    /// Map stream descriptor id `old` to the live descriptor `new`.
    pub fn remap_descriptor(&mut self, old: u32, new: DescriptorId) {
        self.descriptors.insert(old, new);
    }

    /// Roots read so far.
    pub fn roots(&self) -> &[Handle] {
        &self.roots
    }

    /// Bytes not consumed yet.
    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn int(&mut self) -> i128 {
        match codec::decode_int(self.bytes, &mut self.pos) {
            Some(value) => value,
            None => kernel_fatal!("stream truncated at byte {}", self.pos),
        }
    }

    fn id(&mut self) -> u32 {
        let raw = self.int();
        match u32::try_from(raw) {
            Ok(id) => id,
            Err(_) => kernel_fatal!("bad stream id {} at byte {}", raw, self.pos),
        }
    }

    fn descriptor(&mut self) -> DescriptorId {
        let raw = self.id();
        match self.descriptors.get(&raw) {
            Some(id) => *id,
            None => kernel_fatal!("stream names unknown descriptor {}", raw),
        }
    }

    fn read_handle(
        &mut self,
        registry: &Registry,
        heap: &mut Heap,
        static_type: Option<DescriptorId>,
    ) -> Option<Handle> {
        let raw = self.id();
        if raw == NULL_ID {
            return None;
        }
        let id = if raw == NEXT_FRESH_ID { self.max_seen + 1 } else { raw };
        if let Some(handle) = self.addresses.get(&id) {
            return Some(*handle);
        }
        kernel_assert!(
            id == self.max_seen + 1,
            "stream id {} out of order (last seen {})",
            id,
            self.max_seen
        );
        self.max_seen = id;
        let handle = heap.reserve();
        self.addresses.insert(id, handle);

        let descriptor = self.descriptor();
        if let Some(static_type) = static_type {
            kernel_assert!(
                registry.is_kind_of(descriptor, static_type),
                "stream object '{}' stored where '{}' is expected",
                registry.name_of(descriptor),
                registry.name_of(static_type)
            );
        }
        trace!(id, %handle, descriptor = %registry.name_of(descriptor), "reading object");
        let mut value = registry.create_empty_value(descriptor);
        read_value(self, registry, heap, descriptor, &mut value);
        heap.fill(handle, descriptor, value);
        Some(handle)
    }

    /// Read the next root object. `None` for a null root.
    pub fn read_object(&mut self, registry: &Registry, heap: &mut Heap) -> Option<Handle> {
        let root = self.read_handle(registry, heap, None)?;
        if !self.roots.contains(&root) {
            self.roots.push(root);
        }
        Some(root)
    }

    /// Check the trailer, then run two-phase initialization on every root.
    pub fn read_close(mut self, registry: &Registry, heap: &mut Heap) -> Vec<Handle> {
        let count = self.int();
        for _ in 0..count {
            let id = self.id();
            kernel_fatal!("stream object {} was referenced but never written", id);
        }
        kernel_assert!(
            self.pos == self.bytes.len(),
            "{} trailing bytes after stream close",
            self.bytes.len() - self.pos
        );
        let pending: Vec<Handle> = self
            .addresses
            .values()
            .copied()
            .filter(|handle| heap.is_reserved(*handle))
            .collect();
        kernel_assert!(pending.is_empty(), "{} stream objects never filled", pending.len());

        let mut done = HashSet::new();
        for root in &self.roots {
            initialize_object(registry, heap, *root, &mut done);
        }
        debug!(roots = self.roots.len(), objects = self.addresses.len(), "stream read closed");
        self.roots
    }
}

impl ObjectInput for BinaryReader<'_> {
    fn read_int(&mut self) -> i128 {
        self.int()
    }

    fn read_str(&mut self) -> String {
        match codec::decode_str(self.bytes, &mut self.pos) {
            Some(value) => value,
            None => kernel_fatal!("stream truncated at byte {}", self.pos),
        }
    }

    fn read_owning_pointer(
        &mut self,
        registry: &Registry,
        heap: &mut Heap,
        info: &PointerInfo,
    ) -> Option<Handle> {
        self.read_handle(registry, heap, Some(info.base()))
    }
}
