// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Kernel configuration - single source of truth.
//!
//! Static constants (file framing, descriptor naming, built-in layouts) live
//! here as `const` items. Runtime knobs for streams are in [`StreamOptions`].
//! **Do not hardcode any of these values elsewhere.**

// =======================================================================
// File framing
// =======================================================================

/// Magic bytes at the start of every persisted graph: "IRMETA\0\0".
pub const MAGIC: [u8; 8] = [0x49, 0x52, 0x4D, 0x45, 0x54, 0x41, 0x00, 0x00];

/// Format version written by this build.
pub const FORMAT_VERSION: &str = "1.1";

/// Format versions this build accepts on load.
pub const SUPPORTED_FORMAT_VERSIONS: &[&str] = &["1.0", "1.1"];

/// Producer version recorded in the header.
pub const PRODUCER_VERSION: &str = concat!("irmeta ", env!("CARGO_PKG_VERSION"));

// =======================================================================
// Descriptor naming
// =======================================================================

/// Prefix shared by every pointer descriptor name.
pub const POINTER_PREFIX: &str = "PTR:";

/// Prefix that identifies list/container descriptors.
pub const LIST_PREFIX: &str = "LIST:";

/// Suffix appended to lists built by the generic list factory.
pub const GENERIC_LIST_SUFFIX: &str = ":GENERIC";

/// Name of the built-in string descriptor.
pub const STRING_NAME: &str = "String";

// =======================================================================
// Built-in layouts
// =======================================================================

/// Size of any pointer field (owning, reference, defining or static).
pub const POINTER_SIZE: usize = 8;

/// Alignment of any pointer field.
pub const POINTER_ALIGN: usize = 8;

/// Size of a string field (an interned pointer).
pub const STRING_SIZE: usize = 8;

/// Alignment of a string field.
pub const STRING_ALIGN: usize = 8;

/// Size of a generic list header (start, count, capacity).
pub const GENERIC_LIST_SIZE: usize = 24;

/// Alignment of a generic list header.
pub const GENERIC_LIST_ALIGN: usize = 8;

/// Size of the built-in `usize` integer (sizes, alignments, offsets).
pub const USIZE_SIZE: usize = std::mem::size_of::<usize>();

/// Widest integer the sized-int codec handles (bytes).
pub const MAX_INT_WIDTH: usize = 16;

// =======================================================================
// Stream ids
// =======================================================================

/// Stream id of the null address.
pub const NULL_ID: u32 = 0;

/// Stream id meaning "the next fresh id".
pub const NEXT_FRESH_ID: u32 = 1;

/// Runtime options for object streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamOptions {
    /// Emit [`NEXT_FRESH_ID`] instead of the explicit id when ids are
    /// assigned in strictly increasing first-sight order.
    pub compact_ids: bool,
}

impl StreamOptions {
    /// Create options with defaults (compaction on).
    pub fn new() -> Self {
        Self { compact_ids: true }
    }

    /// Enable or disable id compaction.
    pub fn compact_ids(mut self, enabled: bool) -> Self {
        self.compact_ids = enabled;
        self
    }
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self::new()
    }
}
