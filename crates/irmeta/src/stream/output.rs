// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Binary stream writer.

use super::codec;
use super::{write_value, ObjectOutput};
use crate::config::{StreamOptions, NEXT_FRESH_ID, NULL_ID};
use crate::descriptor::{DescriptorId, PointerInfo};
use crate::heap::{Handle, Heap};
use crate::registry::Registry;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Writes object graphs into a byte buffer.
///
/// Ids are local to one writer: the first object written gets id 2, the
/// next new one 3, and so on. Objects reached again are written by id only.
#[derive(Debug)]
pub struct BinaryWriter {
    buffer: Vec<u8>,
    options: StreamOptions,
    ids: HashMap<Handle, u32>,
    written: HashSet<Handle>,
    next_id: u32,
    max_emitted: u32,
    roots: usize,
}

impl Default for BinaryWriter {
    fn default() -> Self {
        Self::new(StreamOptions::default())
    }
}

impl BinaryWriter {
    /// Empty writer.
    pub fn new(options: StreamOptions) -> Self {
        Self {
            buffer: Vec::new(),
            options,
            ids: HashMap::new(),
            written: HashSet::new(),
            next_id: NEXT_FRESH_ID + 1,
            max_emitted: NEXT_FRESH_ID,
            roots: 0,
        }
    }

    /// Bytes written so far.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// True before anything was written.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Number of distinct objects seen.
    pub fn object_count(&self) -> usize {
        self.ids.len()
    }

    fn emit_id(&mut self, id: u32) {
        if self.options.compact_ids && id == self.max_emitted + 1 {
            codec::encode_int(&mut self.buffer, i128::from(NEXT_FRESH_ID));
        } else {
            codec::encode_int(&mut self.buffer, i128::from(id));
        }
        self.max_emitted = self.max_emitted.max(id);
    }

    fn write_handle(
        &mut self,
        registry: &Registry,
        heap: &Heap,
        target: Option<Handle>,
        static_type: Option<DescriptorId>,
    ) {
        let Some(handle) = target else {
            codec::encode_int(&mut self.buffer, i128::from(NULL_ID));
            return;
        };
        if let Some(id) = self.ids.get(&handle).copied() {
            self.emit_id(id);
            return;
        }
        let Some(stamp) = heap.get(handle).map(|object| object.descriptor) else {
            kernel_fatal!("write of dead object {}", handle);
        };
        let id = self.next_id;
        self.next_id += 1;
        self.ids.insert(handle, id);
        self.emit_id(id);

        let descriptor = match static_type {
            Some(static_type) => registry.runtime_descriptor(heap, handle, static_type),
            None => stamp,
        };
        codec::encode_int(&mut self.buffer, i128::from(descriptor.get()));
        write_value(self, registry, heap, descriptor, heap.value(handle));
        self.written.insert(handle);
    }

    /// Write a root object with its runtime type.
    pub fn write_object(&mut self, registry: &Registry, heap: &Heap, root: Handle) {
        self.roots += 1;
        self.write_handle(registry, heap, Some(root), None);
    }

    /// Append the trailer and return the bytes.
    pub fn write_close(mut self) -> Vec<u8> {
        let mut unwritten: Vec<u32> = self
            .ids
            .iter()
            .filter(|(handle, _)| !self.written.contains(handle))
            .map(|(_, id)| *id)
            .collect();
        unwritten.sort_unstable();
        codec::encode_int(&mut self.buffer, unwritten.len() as i128);
        for id in &unwritten {
            codec::encode_int(&mut self.buffer, i128::from(*id));
        }
        debug!(
            roots = self.roots,
            objects = self.ids.len(),
            bytes = self.buffer.len(),
            "stream closed"
        );
        self.buffer
    }
}

impl ObjectOutput for BinaryWriter {
    fn write_int(&mut self, value: i128) {
        codec::encode_int(&mut self.buffer, value);
    }

    fn write_str(&mut self, value: &str) {
        codec::encode_str(&mut self.buffer, value);
    }

    fn write_owning_pointer(
        &mut self,
        registry: &Registry,
        heap: &Heap,
        info: &PointerInfo,
        target: Option<Handle>,
    ) {
        self.write_handle(registry, heap, target, Some(info.base()));
    }
}
