// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Field storage for objects described at runtime.

use crate::heap::Handle;

/// Storage for one instance of any descriptor kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Integer of any width or signedness.
    Int(i128),
    /// String.
    Str(String),
    /// Aggregate fields, base-class fields first.
    Aggregate(Vec<Value>),
    /// Union: common fields plus the active alternative.
    Union(UnionValue),
    /// Owning, defining or reference pointer.
    Pointer(Option<Handle>),
    /// Static pointer; the pointee is embedded and never addressable.
    Static(Option<Box<Value>>),
    /// List/container elements.
    List(Vec<Value>),
}

/// Union storage.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UnionValue {
    /// Common (declared) fields, base-class fields first.
    pub fields: Vec<Value>,
    /// Index and storage of the active alternative.
    pub active: Option<(usize, Box<Value>)>,
}

/// One step of a path from an object's root value to a nested value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    /// Field of an aggregate or common field of a union.
    Field(usize),
    /// Active alternative of a union.
    Alternative,
    /// Element of a list.
    Element(usize),
    /// Pointee of a static pointer.
    Embedded,
}

impl Value {
    /// Integer payload.
    pub fn as_int(&self) -> Option<i128> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// String payload.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Pointer target.
    pub fn as_pointer(&self) -> Option<Option<Handle>> {
        match self {
            Self::Pointer(p) => Some(*p),
            _ => None,
        }
    }

    /// List elements.
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Mutable list elements.
    pub fn as_list_mut(&mut self) -> Option<&mut Vec<Value>> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Aggregate or union common fields.
    pub fn fields(&self) -> Option<&[Value]> {
        match self {
            Self::Aggregate(fields) => Some(fields),
            Self::Union(u) => Some(&u.fields),
            _ => None,
        }
    }

    /// Mutable aggregate or union common fields.
    pub fn fields_mut(&mut self) -> Option<&mut Vec<Value>> {
        match self {
            Self::Aggregate(fields) => Some(fields),
            Self::Union(u) => Some(&mut u.fields),
            _ => None,
        }
    }

    /// Union storage.
    pub fn as_union(&self) -> Option<&UnionValue> {
        match self {
            Self::Union(u) => Some(u),
            _ => None,
        }
    }

    /// Mutable union storage.
    pub fn as_union_mut(&mut self) -> Option<&mut UnionValue> {
        match self {
            Self::Union(u) => Some(u),
            _ => None,
        }
    }

    /// Follow one step.
    pub fn child(&self, step: Step) -> Option<&Value> {
        match (self, step) {
            (_, Step::Field(i)) => self.fields()?.get(i),
            (Self::Union(u), Step::Alternative) => u.active.as_ref().map(|(_, v)| &**v),
            (Self::List(items), Step::Element(i)) => items.get(i),
            (Self::Static(Some(inner)), Step::Embedded) => Some(inner),
            _ => None,
        }
    }

    /// Follow one step mutably.
    pub fn child_mut(&mut self, step: Step) -> Option<&mut Value> {
        match step {
            Step::Field(i) => self.fields_mut()?.get_mut(i),
            Step::Alternative => match self {
                Self::Union(u) => u.active.as_mut().map(|(_, v)| &mut **v),
                _ => None,
            },
            Step::Element(i) => match self {
                Self::List(items) => items.get_mut(i),
                _ => None,
            },
            Step::Embedded => match self {
                Self::Static(Some(inner)) => Some(inner),
                _ => None,
            },
        }
    }

    /// Follow a path.
    pub fn at(&self, path: &[Step]) -> Option<&Value> {
        path.iter().try_fold(self, |value, step| value.child(*step))
    }

    /// Follow a path mutably.
    pub fn at_mut(&mut self, path: &[Step]) -> Option<&mut Value> {
        path.iter()
            .try_fold(self, |value, step| value.child_mut(*step))
    }
}

impl Default for Value {
    fn default() -> Self {
        Self::Int(0)
    }
}

impl From<i128> for Value {
    fn from(v: i128) -> Self {
        Self::Int(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(i128::from(v))
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i128::from(v))
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Self::Int(i128::from(v))
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Self::Int(i128::from(v))
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Int(i128::from(v))
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<Option<Handle>> for Value {
    fn from(v: Option<Handle>) -> Self {
        Self::Pointer(v)
    }
}

impl From<Handle> for Value {
    fn from(v: Handle) -> Self {
        Self::Pointer(Some(v))
    }
}
