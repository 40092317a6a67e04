// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Dependency-ordered layout recomputation.

use super::Registry;
use crate::descriptor::{DescriptorId, DescriptorKind};
use std::collections::HashSet;

/// Bottom-up, deduplicated `adjust_field_offsets` pass.
///
/// A descriptor is adjusted after its base, its field types and its
/// alternatives, each at most once. Pointer and list sizes do not depend on
/// their targets, so the walk does not follow them and cycles through
/// pointers are harmless.
#[derive(Debug, Default)]
pub(crate) struct LayoutFixup {
    visited: HashSet<DescriptorId>,
    only: Option<HashSet<DescriptorId>>,
    changed: Vec<DescriptorId>,
}

impl LayoutFixup {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Adjust only descriptors in `targets`; others are still walked so
    /// dependencies come first.
    pub(crate) fn restricted(targets: impl IntoIterator<Item = DescriptorId>) -> Self {
        Self {
            only: Some(targets.into_iter().collect()),
            ..Self::default()
        }
    }

    pub(crate) fn visit(&mut self, registry: &mut Registry, id: DescriptorId) {
        if !self.visited.insert(id) || !registry.is_installed(id) {
            return;
        }
        for dependency in layout_dependencies(registry, id) {
            self.visit(registry, dependency);
        }
        let selected = self.only.as_ref().map_or(true, |only| only.contains(&id));
        if selected && registry.adjust_field_offsets(id) {
            self.changed.push(id);
        }
    }

    pub(crate) fn into_changed(self) -> Vec<DescriptorId> {
        self.changed
    }
}

fn layout_dependencies(registry: &Registry, id: DescriptorId) -> Vec<DescriptorId> {
    let descriptor = registry.get(id);
    let mut out = Vec::new();
    if let Some(info) = descriptor.aggregate() {
        out.extend(info.base);
        out.extend(info.fields.iter().map(|f| f.descriptor()));
    }
    if let DescriptorKind::Union(info) = descriptor.kind() {
        out.extend(info.alternatives.iter().map(|f| f.descriptor()));
    }
    out
}
