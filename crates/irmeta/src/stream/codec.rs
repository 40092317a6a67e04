// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Sized-integer and string codec.
//!
//! ```text
//! 0xxxxxxx                  value 0..=127
//! 1sLLLLLL  payload[L]      s = sign, L significant big-endian bytes
//! ```
//!
//! Leading fill bytes (0x00 for non-negative values, 0xFF for negative
//! ones) are stripped; the decoder restores them from the sign bit, so
//! `-1` is the single byte `0xC0`.

use crate::config::MAX_INT_WIDTH;

const LENGTH_FOLLOWS: u8 = 0x80;
const NEGATIVE: u8 = 0x40;
const LENGTH_MASK: u8 = 0x3F;

/// Append the encoding of `value`.
pub fn encode_int(out: &mut Vec<u8>, value: i128) {
    if (0..=0x7F).contains(&value) {
        out.push(value as u8);
        return;
    }
    let bytes = value.to_be_bytes();
    let fill = if value < 0 { 0xFF } else { 0x00 };
    let skip = bytes.iter().take_while(|b| **b == fill).count();
    let payload = &bytes[skip..];
    let mut tag = LENGTH_FOLLOWS | payload.len() as u8;
    if value < 0 {
        tag |= NEGATIVE;
    }
    out.push(tag);
    out.extend_from_slice(payload);
}

/// Number of bytes [`encode_int`] emits for `value`.
pub fn encoded_int_len(value: i128) -> usize {
    if (0..=0x7F).contains(&value) {
        return 1;
    }
    let fill = if value < 0 { 0xFF } else { 0x00 };
    1 + value.to_be_bytes().iter().skip_while(|b| **b == fill).count()
}

/// Decode an integer at `*pos`, advancing it. `None` if the input ends
/// early.
pub fn decode_int(bytes: &[u8], pos: &mut usize) -> Option<i128> {
    let tag = *bytes.get(*pos)?;
    *pos += 1;
    if tag & LENGTH_FOLLOWS == 0 {
        return Some(i128::from(tag));
    }
    let len = usize::from(tag & LENGTH_MASK);
    kernel_assert!(
        len <= MAX_INT_WIDTH,
        "integer of {} bytes exceeds the {}-byte codec limit",
        len,
        MAX_INT_WIDTH
    );
    let payload = bytes.get(*pos..*pos + len)?;
    *pos += len;
    let start: i128 = if tag & NEGATIVE != 0 { -1 } else { 0 };
    Some(payload.iter().fold(start, |acc, b| (acc << 8) | i128::from(*b)))
}

/// Append a length-prefixed UTF-8 string.
pub fn encode_str(out: &mut Vec<u8>, value: &str) {
    encode_int(out, value.len() as i128);
    out.extend_from_slice(value.as_bytes());
}

/// Decode a string at `*pos`. `None` if the input ends early; invalid
/// UTF-8 is fatal.
pub fn decode_str(bytes: &[u8], pos: &mut usize) -> Option<String> {
    let len = decode_int(bytes, pos)?;
    let Ok(len) = usize::try_from(len) else {
        kernel_fatal!("negative string length {}", len);
    };
    let raw = bytes.get(*pos..*pos + len)?;
    *pos += len;
    match std::str::from_utf8(raw) {
        Ok(s) => Some(s.to_string()),
        Err(e) => kernel_fatal!("string payload is not UTF-8: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(value: i128) -> Vec<u8> {
        let mut out = Vec::new();
        encode_int(&mut out, value);
        out
    }

    fn decode(bytes: &[u8]) -> i128 {
        let mut pos = 0;
        let value = decode_int(bytes, &mut pos).expect("complete");
        assert_eq!(pos, bytes.len());
        value
    }

    #[test]
    fn test_small_values_are_one_byte() {
        assert_eq!(encode(0), vec![0x00]);
        assert_eq!(encode(127), vec![0x7F]);
        assert_eq!(encode(-1), vec![0xC0]);
    }

    #[test]
    fn test_tagged_values() {
        assert_eq!(encode(128), vec![0x81, 0x80]);
        assert_eq!(encode(256), vec![0x82, 0x01, 0x00]);
        assert_eq!(encode(-2), vec![0xC1, 0xFE]);
        assert_eq!(encode(-200), vec![0xC1, 0x38]);
        assert_eq!(decode(&[0xC1, 0x38]), -200);
        assert_eq!(decode(&[0xC0]), -1);
    }

    #[test]
    fn test_extremes() {
        for v in [i128::MAX, i128::MIN, i128::from(u64::MAX), i128::from(i64::MIN)] {
            let bytes = encode(v);
            assert_eq!(bytes.len(), encoded_int_len(v));
            assert_eq!(decode(&bytes), v);
        }
        assert_eq!(encode(i128::MIN).len(), 17);
    }

    #[test]
    fn test_randomized_lengths() {
        let mut rng = fastrand::Rng::with_seed(11);
        for _ in 0..2000 {
            let v = i128::from(rng.i64(..)) >> rng.u32(0..63);
            let bytes = encode(v);
            assert_eq!(bytes.len(), encoded_int_len(v));
            assert_eq!(decode(&bytes), v);
        }
    }

    #[test]
    fn test_truncated_input() {
        let mut pos = 0;
        assert_eq!(decode_int(&[0x82, 0x01], &mut pos), None);
        let mut pos = 0;
        assert_eq!(decode_int(&[], &mut pos), None);
    }

    #[test]
    fn test_strings() {
        let mut out = Vec::new();
        encode_str(&mut out, "");
        encode_str(&mut out, "héllo");
        let mut pos = 0;
        assert_eq!(decode_str(&out, &mut pos).as_deref(), Some(""));
        assert_eq!(decode_str(&out, &mut pos).as_deref(), Some("héllo"));
        assert_eq!(pos, out.len());
    }
}
