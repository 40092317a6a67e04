// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Integer descriptors.

/// Integer descriptor data. The width is the descriptor size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntegerInfo {
    pub(crate) signed: bool,
}

impl IntegerInfo {
    /// Two's-complement signed.
    pub fn is_signed(&self) -> bool {
        self.signed
    }

    /// Inclusive value range for a `width`-byte integer.
    pub fn range(&self, width: usize) -> (i128, i128) {
        let bits = (width * 8) as u32;
        match (self.signed, bits) {
            (_, 0) => (0, 0),
            (true, b) if b >= 128 => (i128::MIN, i128::MAX),
            (true, b) => (-(1i128 << (b - 1)), (1i128 << (b - 1)) - 1),
            (false, b) if b >= 127 => (0, i128::MAX),
            (false, b) => (0, (1i128 << b) - 1),
        }
    }
}
