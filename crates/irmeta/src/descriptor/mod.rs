// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Runtime type descriptors.
//!
//! A [`Descriptor`] names a type, records its layout (size and alignment)
//! and carries its constructor/destructor hooks. The variant data in
//! [`DescriptorKind`] says how instances are laid out, streamed, cloned
//! and iterated:
//!
//! - **Aggregate**: ordered fields plus at most one base class
//! - **Union**: aggregate with tagged alternatives, exactly one active
//! - **Pointer**: owning / reference / static, optionally defining
//! - **List**: type-erased container of one element type
//! - **Integer** and **String**: leaves
//!
//! Descriptors refer to each other by [`DescriptorId`]; the owning
//! [`Registry`](crate::registry::Registry) resolves ids, so every operation
//! that needs another descriptor takes the registry as a parameter.

mod aggregate;
mod list;
mod pointer;
mod scalar;
mod union;

pub use aggregate::{AggregateInfo, FieldDescriptor};
pub use list::{ContainerImpl, ListInfo, SequenceContainer};
pub use pointer::{pointer_name, PointerInfo, PointerStrategy};
pub use scalar::IntegerInfo;
pub use union::{Selector, TagSource, UnionInfo};

pub(crate) use aggregate::{align_up, layout_fields, FieldLayout};

use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroU32;
use std::rc::Rc;

/// Registry-assigned descriptor id. Never 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DescriptorId(NonZeroU32);

impl DescriptorId {
    /// Wrap a raw id; `None` for 0.
    pub fn from_raw(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(Self)
    }

    /// Raw id value.
    pub fn get(self) -> u32 {
        self.0.get()
    }
}

impl fmt::Display for DescriptorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Zero-argument constructor, run on a zeroed value.
pub type Constructor = Rc<dyn Fn(&mut Value)>;

/// Destructor, run once on top-level teardown.
pub type Destructor = Rc<dyn Fn(&mut Value)>;

/// Two-phase initialization hook, run when a stream completes.
pub type InitHook = Rc<dyn Fn(&mut Value)>;

/// Per-type callbacks.
#[derive(Clone, Default)]
pub struct Hooks {
    pub(crate) constructor: Option<Constructor>,
    pub(crate) destructor: Option<Destructor>,
    pub(crate) pre_init: Option<InitHook>,
    pub(crate) post_init: Option<InitHook>,
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("constructor", &self.constructor.is_some())
            .field("destructor", &self.destructor.is_some())
            .field("pre_init", &self.pre_init.is_some())
            .field("post_init", &self.post_init.is_some())
            .finish()
    }
}

/// Variant data of a descriptor.
#[derive(Debug, Clone)]
pub enum DescriptorKind {
    /// Struct-like type.
    Aggregate(AggregateInfo),
    /// Tagged union.
    Union(UnionInfo),
    /// Pointer.
    Pointer(PointerInfo),
    /// List/container.
    List(ListInfo),
    /// Integer.
    Integer(IntegerInfo),
    /// String.
    String,
}

impl DescriptorKind {
    /// Short kind label, used in dumps.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Aggregate(info) if info.polymorphic => "object",
            Self::Aggregate(_) => "aggregate",
            Self::Union(_) => "union",
            Self::Pointer(_) => "pointer",
            Self::List(_) => "list",
            Self::Integer(_) => "integer",
            Self::String => "string",
        }
    }
}

/// A runtime type descriptor.
#[derive(Debug, Clone)]
pub struct Descriptor {
    pub(crate) id: DescriptorId,
    pub(crate) name: String,
    pub(crate) size: usize,
    pub(crate) align: usize,
    pub(crate) kind: DescriptorKind,
    pub(crate) hooks: Hooks,
}

impl Descriptor {
    pub(crate) fn new(
        id: DescriptorId,
        name: impl Into<String>,
        size: usize,
        align: usize,
        kind: DescriptorKind,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            size,
            align,
            kind,
            hooks: Hooks::default(),
        }
    }

    /// Registry id.
    pub fn id(&self) -> DescriptorId {
        self.id
    }

    /// Unique type name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Instance size in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Instance alignment in bytes.
    pub fn alignment(&self) -> usize {
        self.align
    }

    /// Variant data.
    pub fn kind(&self) -> &DescriptorKind {
        &self.kind
    }

    /// Own constructor, if any (see `Registry::constructor_of` for the
    /// inherited lookup).
    pub fn constructor(&self) -> Option<&Constructor> {
        self.hooks.constructor.as_ref()
    }

    /// Own destructor, if any.
    pub fn destructor(&self) -> Option<&Destructor> {
        self.hooks.destructor.as_ref()
    }

    /// Aggregate data for aggregates and unions.
    pub fn aggregate(&self) -> Option<&AggregateInfo> {
        match &self.kind {
            DescriptorKind::Aggregate(info) => Some(info),
            DescriptorKind::Union(info) => Some(&info.aggregate),
            _ => None,
        }
    }

    pub(crate) fn aggregate_mut(&mut self) -> Option<&mut AggregateInfo> {
        match &mut self.kind {
            DescriptorKind::Aggregate(info) => Some(info),
            DescriptorKind::Union(info) => Some(&mut info.aggregate),
            _ => None,
        }
    }

    /// Union data.
    pub fn union(&self) -> Option<&UnionInfo> {
        match &self.kind {
            DescriptorKind::Union(info) => Some(info),
            _ => None,
        }
    }

    /// Pointer data.
    pub fn pointer(&self) -> Option<&PointerInfo> {
        match &self.kind {
            DescriptorKind::Pointer(info) => Some(info),
            _ => None,
        }
    }

    /// List data.
    pub fn list(&self) -> Option<&ListInfo> {
        match &self.kind {
            DescriptorKind::List(info) => Some(info),
            _ => None,
        }
    }

    /// Integer data.
    pub fn integer(&self) -> Option<&IntegerInfo> {
        match &self.kind {
            DescriptorKind::Integer(info) => Some(info),
            _ => None,
        }
    }

    /// Base class of an aggregate or union.
    pub fn base(&self) -> Option<DescriptorId> {
        self.aggregate().and_then(|a| a.base)
    }

    /// True if this is a polymorphic ("object") aggregate whose instances
    /// carry their own runtime type.
    pub fn is_polymorphic(&self) -> bool {
        self.aggregate().is_some_and(|a| a.polymorphic)
    }

    /// True for list/container descriptors.
    pub fn is_list(&self) -> bool {
        matches!(self.kind, DescriptorKind::List(_))
    }
}
