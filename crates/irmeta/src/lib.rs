// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! irmeta - runtime reflection and object graph persistence for IR nodes
//!
//! Every type a compiler wants to persist, clone or walk generically is
//! registered as a [`Descriptor`] in a [`Registry`]. Objects live in a
//! [`Heap`] and are addressed by generation-checked [`Handle`]s, so cyclic
//! graphs need no raw pointers.
//!
//! On top of that:
//! - [`iter`]: field, list and virtual-path iteration over any object
//! - [`walker`]: depth-first walks with replacement, per-type dispatch
//! - [`stream`]: compact binary object-graph streams with sharing
//! - [`clone`]: policy-driven graph cloning built on the stream walk
//! - [`sync`]: merging a persisted registry into the live one
//! - [`persist`]: versioned files holding a registry and its payload
//!
//! # Quick Start
//!
//! ```
//! use irmeta::{BinaryReader, BinaryWriter, Heap, Registry, Value};
//!
//! let mut registry = Registry::new();
//! let i32_id = registry.builtins().i32;
//! let point = registry.aggregate("Point").field("x", i32_id).field("y", i32_id).build();
//!
//! let mut heap = Heap::new();
//! let p = heap.alloc(point, Value::Aggregate(vec![Value::Int(3), Value::Int(-4)]));
//!
//! let mut writer = BinaryWriter::default();
//! writer.write_object(&registry, &heap, p);
//! let bytes = writer.write_close();
//!
//! let mut copy = Heap::new();
//! let mut reader = BinaryReader::new(&bytes, &registry);
//! let q = reader.read_object(&registry, &mut copy).expect("root");
//! reader.read_close(&registry, &mut copy);
//! assert_eq!(copy.value(q), heap.value(p));
//! ```
//!
//! # Failure Model
//!
//! Broken kernel invariants (duplicate names, type mismatches, corrupt
//! streams) panic after logging their location. Only file header
//! validation returns an error, [`PersistError`].

#[macro_use]
mod fatal;

pub mod clone;
pub mod config;
pub mod descriptor;
pub mod heap;
pub mod iter;
pub mod persist;
pub mod registry;
pub mod stream;
pub mod sync;
pub mod value;
pub mod walker;

pub use clone::{clone_object, CloneEngine, CloneHooks, PointerHandling, RefKind, Resolution};
pub use config::StreamOptions;
pub use descriptor::{Descriptor, DescriptorId, DescriptorKind};
pub use heap::{Handle, Heap};
pub use iter::{MetaIterator, ObjectRef};
pub use persist::{
    load, load_file, read_header, save, save_file, FileHeader, Loaded, PersistError,
};
pub use registry::{Builtins, DescriptorSummary, Registry};
pub use stream::{BinaryReader, BinaryWriter};
pub use sync::{synchronize, SyncReport};
pub use value::{UnionValue, Value};
pub use walker::{walk, ApplyStatus, WalkOrder, Walker};
