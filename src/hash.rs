//! Object-hash codecs and views.
//!
//! Cryptomatte object ids are 32-bit MurmurHash3 values.  They appear in
//! three interchangeable forms:
//!   - `u32` — the hash itself, as found in manifests after decoding
//!   - `f32` — the bit pattern reinterpreted as a float, as stored in rank
//!     channel pixels (`uint32_to_float32` conversion)
//!   - 8-char lowercase hex — the JSON manifest surface form
//!
//! The [`HashView`] trait captures the conversion so callers pick their view
//! at the type level; there is no runtime dispatch.

use crate::error::{Error, Result};

// ── Hex codec ────────────────────────────────────────────────────────────────

/// Decode an 8-digit hex string into a u32.
///
/// Mixed case is accepted — manifests in the wild are not consistently
/// lowercase even though the convention asks for it.  Anything other than
/// exactly 8 hex digits is rejected.
pub fn hex_to_u32(s: &str) -> Result<u32> {
    if s.len() != 8 {
        return Err(Error::HexDecode {
            value: s.to_string(),
            reason: format!("expected exactly 8 hex digits, got {}", s.len()),
        });
    }
    let mut bytes = [0u8; 4];
    hex::decode_to_slice(s, &mut bytes).map_err(|e| Error::HexDecode {
        value: s.to_string(),
        reason: e.to_string(),
    })?;
    Ok(u32::from_be_bytes(bytes))
}

/// Encode a u32 as its canonical 8-digit lowercase hex form.
pub fn u32_to_hex(v: u32) -> String {
    hex::encode(v.to_be_bytes())
}

// ── Hash views ───────────────────────────────────────────────────────────────

/// A type a 32-bit object hash can be viewed as.
///
/// Implemented for `u32` (identity), `f32` (bit reinterpretation, the pixel
/// encoding) and `String` (8-char lowercase hex, the manifest encoding).
pub trait HashView: Sized {
    fn from_hash(hash: u32) -> Self;
}

impl HashView for u32 {
    #[inline]
    fn from_hash(hash: u32) -> Self { hash }
}

impl HashView for f32 {
    #[inline]
    fn from_hash(hash: u32) -> Self { f32::from_bits(hash) }
}

impl HashView for String {
    #[inline]
    fn from_hash(hash: u32) -> Self { u32_to_hex(hash) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn known_values() {
        assert_eq!(hex_to_u32("00000000").unwrap(), 0x0000_0000);
        assert_eq!(hex_to_u32("00000001").unwrap(), 0x0000_0001);
        assert_eq!(hex_to_u32("ffffffff").unwrap(), 0xFFFF_FFFF);
        assert_eq!(hex_to_u32("deadbeef").unwrap(), 0xDEAD_BEEF);

        assert_eq!(u32_to_hex(0x0000_0000), "00000000");
        assert_eq!(u32_to_hex(0x0000_0001), "00000001");
        assert_eq!(u32_to_hex(0xFFFF_FFFF), "ffffffff");
        assert_eq!(u32_to_hex(0xDEAD_BEEF), "deadbeef");
    }

    #[test]
    fn mixed_case_accepted() {
        assert_eq!(hex_to_u32("DEADBEEF").unwrap(), 0xDEAD_BEEF);
        assert_eq!(hex_to_u32("DeadBeEf").unwrap(), 0xDEAD_BEEF);
    }

    #[test]
    fn bad_inputs_rejected() {
        assert!(hex_to_u32("").is_err());
        assert!(hex_to_u32("123").is_err());
        assert!(hex_to_u32("123456789").is_err());
        assert!(hex_to_u32("zzzzzzzz").is_err());
    }

    #[test]
    fn views() {
        assert_eq!(u32::from_hash(7), 7);
        assert_eq!(f32::from_hash(1).to_bits(), 1);
        assert_eq!(String::from_hash(0xDEAD_BEEF), "deadbeef");
    }

    proptest! {
        #[test]
        fn hex_roundtrip(v in any::<u32>()) {
            let s = u32_to_hex(v);
            prop_assert!(s.len() == 8);
            prop_assert!(s.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
            prop_assert_eq!(hex_to_u32(&s).unwrap(), v);
        }
    }
}
