// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Pointer descriptors.

use super::DescriptorId;
use crate::config::POINTER_PREFIX;

/// How a pointer is streamed and cloned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PointerStrategy {
    /// Owning and static: pointee embedded, never addressable.
    Static,
    /// Owning: written inline on first encounter, by id afterwards.
    Owning,
    /// Canonical owner location consulted during synchronization.
    Defining,
    /// Non-owning reference.
    Reference,
}

/// Pointer descriptor data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointerInfo {
    pub(crate) base: DescriptorId,
    pub(crate) owns: bool,
    pub(crate) is_static: bool,
    pub(crate) needs_cloning: bool,
}

impl PointerInfo {
    /// Pointee descriptor.
    pub fn base(&self) -> DescriptorId {
        self.base
    }

    /// Responsible for destroying the pointee.
    pub fn owns(&self) -> bool {
        self.owns
    }

    /// Pointee embedded and eagerly constructed.
    pub fn is_static(&self) -> bool {
        self.is_static
    }

    /// Marks the canonical owner location.
    pub fn needs_cloning(&self) -> bool {
        self.needs_cloning
    }

    /// Stream strategy selected by the flags.
    pub fn strategy(&self) -> PointerStrategy {
        if self.owns && self.is_static {
            PointerStrategy::Static
        } else if self.owns {
            PointerStrategy::Owning
        } else if self.needs_cloning {
            PointerStrategy::Defining
        } else {
            PointerStrategy::Reference
        }
    }
}

/// Registry name of a pointer descriptor.
pub fn pointer_name(base_name: &str, owns: bool, is_static: bool, needs_cloning: bool) -> String {
    format!(
        "{}{}:{}:{}:{}",
        POINTER_PREFIX,
        if owns { "O" } else { "R" },
        if is_static { "S" } else { "" },
        if needs_cloning { "C" } else { "" },
        base_name
    )
}
