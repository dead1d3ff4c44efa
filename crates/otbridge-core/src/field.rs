//! Field codec: typed views onto sub-fields of a 16-bit payload word.
//!
//! Bit 0 is the least-significant bit of the low byte and bit 15 the
//! most-significant bit of the high byte. A byte field at offset 0 is the
//! low byte (bits 0..=7), at offset 8 the high byte (bits 8..=15); any offset
//! up to 8 is accepted, so `u8` at 4 covers bits 4..=11.
//!
//! A [`FieldSpec`] is validated once, when a [`FieldCodec`] is built from it.
//! After that, decoding and encoding are total functions over the whole
//! 16-bit domain.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::FieldError;

/// Width of the payload word in bits.
pub const WORD_BITS: u8 = 16;

/// Which bits of the payload word a field covers and how to interpret them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldSpec {
    /// Single bit, decoded as a boolean
    Flag { bit: u8 },
    /// Eight bits starting at bit `offset`, two's-complement signed
    SignedByte { offset: u8 },
    /// Eight bits starting at bit `offset`, unsigned
    UnsignedByte { offset: u8 },
    /// Whole word, two's-complement signed
    Signed16,
    /// Whole word, unsigned
    Unsigned16,
    /// Whole word, signed fixed point with 8 fractional bits (q7.8)
    FixedPoint8_8,
    /// `length` bits starting at `position`, unsigned
    Masked { position: u8, length: u8 },
}

impl FieldSpec {
    /// Validated flag at `bit`.
    pub fn flag(bit: i64) -> Result<Self, FieldError> {
        let spec = Self::Flag {
            bit: narrow(bit).ok_or(FieldError::BitOutOfRange(bit))?,
        };
        spec.validate()?;
        Ok(spec)
    }

    /// Validated signed byte at `offset` (0..=8).
    pub fn signed_byte(offset: i64) -> Result<Self, FieldError> {
        let spec = Self::SignedByte {
            offset: narrow(offset).ok_or(FieldError::InvalidByteOffset(offset))?,
        };
        spec.validate()?;
        Ok(spec)
    }

    /// Validated unsigned byte at `offset` (0..=8).
    pub fn unsigned_byte(offset: i64) -> Result<Self, FieldError> {
        let spec = Self::UnsignedByte {
            offset: narrow(offset).ok_or(FieldError::InvalidByteOffset(offset))?,
        };
        spec.validate()?;
        Ok(spec)
    }

    /// Validated mask of `length` bits at `position`.
    pub fn masked(position: i64, length: i64) -> Result<Self, FieldError> {
        let spec = Self::Masked {
            position: narrow(position).ok_or(FieldError::InvalidPosition(position))?,
            length: narrow(length).ok_or(FieldError::InvalidLength(length))?,
        };
        spec.validate()?;
        Ok(spec)
    }

    /// Check that the field lies inside the 16-bit word.
    pub fn validate(&self) -> Result<(), FieldError> {
        match *self {
            Self::Flag { bit } if bit >= WORD_BITS => Err(FieldError::BitOutOfRange(bit.into())),
            Self::SignedByte { offset } | Self::UnsignedByte { offset }
                if offset + 8 > WORD_BITS =>
            {
                Err(FieldError::InvalidByteOffset(offset.into()))
            }
            Self::Masked { length, .. } if length == 0 || length > WORD_BITS => {
                Err(FieldError::InvalidLength(length.into()))
            }
            Self::Masked { position, .. } if position >= WORD_BITS => {
                Err(FieldError::InvalidPosition(position.into()))
            }
            Self::Masked { position, length } if position + length > WORD_BITS => {
                Err(FieldError::ExtentOverflow {
                    position: position.into(),
                    length: length.into(),
                })
            }
            _ => Ok(()),
        }
    }

    /// `(position, length)` of the bits this field covers.
    pub fn extent(&self) -> (u8, u8) {
        match *self {
            Self::Flag { bit } => (bit, 1),
            Self::SignedByte { offset } | Self::UnsignedByte { offset } => (offset, 8),
            Self::Signed16 | Self::Unsigned16 | Self::FixedPoint8_8 => (0, WORD_BITS),
            Self::Masked { position, length } => (position, length),
        }
    }

    /// Bit mask of the covered bits within the word.
    pub fn bit_mask(&self) -> u16 {
        let (position, length) = self.extent();
        low_bits(length)
            .checked_shl(u32::from(position))
            .unwrap_or(0)
    }

    /// Whether two fields cover at least one common bit.
    pub fn overlaps(&self, other: &FieldSpec) -> bool {
        self.bit_mask() & other.bit_mask() != 0
    }

    /// Build the codec for this field, rejecting invalid extents.
    pub fn codec(self) -> Result<FieldCodec, FieldError> {
        FieldCodec::new(self)
    }
}

impl fmt::Display for FieldSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Flag { bit } => write!(f, "flag<{}>", bit),
            Self::SignedByte { offset } => write!(f, "s8<{}>", offset),
            Self::UnsignedByte { offset } => write!(f, "u8<{}>", offset),
            Self::Signed16 => f.write_str("s16"),
            Self::Unsigned16 => f.write_str("u16"),
            Self::FixedPoint8_8 => f.write_str("q7_8"),
            Self::Masked { position, length } => write!(f, "mask<{}, {}>", length, position),
        }
    }
}

/// A decoded field value, or a value to be encoded into a field.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Bool(bool),
    Int(i32),
    Float(f32),
}

impl FieldValue {
    /// Non-zero values are true.
    pub fn as_bool(&self) -> bool {
        match *self {
            Self::Bool(b) => b,
            Self::Int(i) => i != 0,
            Self::Float(f) => f != 0.0,
        }
    }

    /// Floats truncate toward zero (saturating at the `i32` bounds).
    pub fn as_i32(&self) -> i32 {
        match *self {
            Self::Bool(b) => i32::from(b),
            Self::Int(i) => i,
            Self::Float(f) => f as i32,
        }
    }

    pub fn as_f32(&self) -> f32 {
        match *self {
            Self::Bool(b) => f32::from(u8::from(b)),
            Self::Int(i) => i as f32,
            Self::Float(f) => f,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(i) => write!(f, "{}", i),
            Self::Float(v) => write!(f, "{}", v),
        }
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        Self::Int(value)
    }
}

impl From<f32> for FieldValue {
    fn from(value: f32) -> Self {
        Self::Float(value)
    }
}

/// Decoder/encoder pair for one validated [`FieldSpec`].
///
/// `Copy` and free of shared state, so it can be captured by callbacks and
/// used from any thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldCodec {
    spec: FieldSpec,
}

impl FieldCodec {
    pub fn new(spec: FieldSpec) -> Result<Self, FieldError> {
        spec.validate()?;
        Ok(Self { spec })
    }

    pub fn spec(&self) -> FieldSpec {
        self.spec
    }

    /// Read this field out of `word`.
    pub fn decode(&self, word: u16) -> FieldValue {
        match self.spec {
            FieldSpec::Flag { bit } => FieldValue::Bool(extract(word, bit, 1) != 0),
            FieldSpec::UnsignedByte { offset } => FieldValue::Int(extract(word, offset, 8).into()),
            FieldSpec::SignedByte { offset } => {
                FieldValue::Int(i32::from(extract(word, offset, 8) as u8 as i8))
            }
            FieldSpec::Unsigned16 => FieldValue::Int(word.into()),
            FieldSpec::Signed16 => FieldValue::Int(i32::from(word as i16)),
            FieldSpec::FixedPoint8_8 => FieldValue::Float(f32::from(word as i16) / 256.0),
            FieldSpec::Masked { position, length } => {
                FieldValue::Int(extract(word, position, length).into())
            }
        }
    }

    /// Return `word` with this field replaced by `value`.
    ///
    /// Bits outside the field are preserved. Whole-word fields replace the
    /// entire word.
    pub fn encode(&self, word: u16, value: FieldValue) -> u16 {
        match self.spec {
            FieldSpec::Flag { bit } => insert(word, bit, 1, u16::from(value.as_bool())),
            FieldSpec::UnsignedByte { offset } | FieldSpec::SignedByte { offset } => {
                insert(word, offset, 8, u16::from(value.as_i32() as u8))
            }
            FieldSpec::Unsigned16 | FieldSpec::Signed16 => value.as_i32() as u16,
            FieldSpec::FixedPoint8_8 => {
                let scaled = (value.as_f32() * 256.0).round() as i32;
                scaled as i16 as u16
            }
            FieldSpec::Masked { position, length } => {
                insert(word, position, length, value.as_i32() as u16)
            }
        }
    }
}

/// `length` bits of `word` starting at `position`.
///
/// Bits past the end of the word read as zero.
pub fn extract(word: u16, position: u8, length: u8) -> u16 {
    word.checked_shr(u32::from(position)).unwrap_or(0) & low_bits(length)
}

/// `word` with `length` bits at `position` replaced by the low bits of `value`.
///
/// Bits that would land past the end of the word are dropped.
pub fn insert(word: u16, position: u8, length: u8, value: u16) -> u16 {
    let shift = |bits: u16| bits.checked_shl(u32::from(position)).unwrap_or(0);
    let mask = shift(low_bits(length));
    (word & !mask) | (shift(value & low_bits(length)) & mask)
}

fn low_bits(length: u8) -> u16 {
    1u32.checked_shl(u32::from(length))
        .unwrap_or(0)
        .wrapping_sub(1) as u16
}

fn narrow(value: i64) -> Option<u8> {
    u8::try_from(value).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec(spec: FieldSpec) -> FieldCodec {
        spec.codec().unwrap()
    }

    #[test]
    fn test_flag_round_trip_preserves_other_bits() {
        for word in [0x0000u16, 0xFFFF, 0xA5A5, 0x5A5A, 0x8001] {
            for bit in 0..16 {
                let c = codec(FieldSpec::Flag { bit });
                for b in [true, false] {
                    let encoded = c.encode(word, FieldValue::Bool(b));
                    assert_eq!(c.decode(encoded), FieldValue::Bool(b));
                    assert_eq!(encoded & !(1 << bit), word & !(1 << bit));
                }
            }
        }
    }

    #[test]
    fn test_byte_round_trip_preserves_other_byte() {
        let word = 0x12_34;
        for offset in [0u8, 8] {
            let other = !(0xFFu16 << offset);
            let unsigned = codec(FieldSpec::UnsignedByte { offset });
            for v in [0, 1, 0x7F, 0x80, 0xFF] {
                let encoded = unsigned.encode(word, FieldValue::Int(v));
                assert_eq!(unsigned.decode(encoded), FieldValue::Int(v));
                assert_eq!(encoded & other, word & other);
            }
            let signed = codec(FieldSpec::SignedByte { offset });
            for v in [-128, -1, 0, 1, 127] {
                let encoded = signed.encode(word, FieldValue::Int(v));
                assert_eq!(signed.decode(encoded), FieldValue::Int(v));
                assert_eq!(encoded & other, word & other);
            }
        }
    }

    #[test]
    fn test_signed_byte_truncates_twos_complement() {
        let c = codec(FieldSpec::SignedByte { offset: 8 });
        assert_eq!(c.encode(0x00FF, FieldValue::Int(-2)), 0xFEFF);
        // 0x1FE truncates to 0xFE
        assert_eq!(c.encode(0x0000, FieldValue::Int(0x1FE)), 0xFE00);
        assert_eq!(c.decode(0xFE00), FieldValue::Int(-2));
    }

    #[test]
    fn test_whole_word_fields() {
        let s16 = codec(FieldSpec::Signed16);
        let u16c = codec(FieldSpec::Unsigned16);
        assert_eq!(s16.decode(0xFFFF), FieldValue::Int(-1));
        assert_eq!(u16c.decode(0xFFFF), FieldValue::Int(65535));
        assert_eq!(s16.encode(0x1234, FieldValue::Int(-1)), 0xFFFF);
        assert_eq!(u16c.encode(0xFFFF, FieldValue::Int(0x8000)), 0x8000);
        assert_eq!(u16c.encode(0x0000, FieldValue::Int(0x1_0001)), 0x0001);
    }

    #[test]
    fn test_fixed_point() {
        let q = codec(FieldSpec::FixedPoint8_8);
        let word = q.encode(0, FieldValue::Float(21.5));
        assert_eq!(word, 5504);
        assert_eq!(q.decode(word), FieldValue::Float(21.5));

        let small = q.decode(q.encode(0, FieldValue::Float(0.003))).as_f32();
        assert!((small - 0.003).abs() <= 1.0 / 256.0);

        let negative = q.encode(0, FieldValue::Float(-1.5));
        assert_eq!(negative, 0xFE80);
        assert_eq!(q.decode(negative), FieldValue::Float(-1.5));
        assert_eq!(q.decode(0x8000), FieldValue::Float(-128.0));
    }

    #[test]
    fn test_masked_round_trip_is_modulo_length() {
        for position in 0u8..16 {
            for length in 1u8..=(16 - position) {
                let c = codec(FieldSpec::Masked { position, length });
                let modulus = 1i64 << length;
                for v in [0i32, 1, 5, 255, 1000, -1, 70_000] {
                    let encoded = c.encode(0xA5A5, FieldValue::Int(v));
                    let expected = (i64::from(v)).rem_euclid(modulus) as i32;
                    assert_eq!(c.decode(encoded), FieldValue::Int(expected));
                    let outside = !c.spec().bit_mask();
                    assert_eq!(encoded & outside, 0xA5A5 & outside);
                }
            }
        }
    }

    #[test]
    fn test_validation_rejects_out_of_word_extents() {
        assert_eq!(
            FieldSpec::masked(10, 8),
            Err(FieldError::ExtentOverflow {
                position: 10,
                length: 8
            })
        );
        assert_eq!(FieldSpec::masked(0, 0), Err(FieldError::InvalidLength(0)));
        assert_eq!(FieldSpec::masked(0, 17), Err(FieldError::InvalidLength(17)));
        assert_eq!(FieldSpec::masked(-1, 4), Err(FieldError::InvalidPosition(-1)));
        assert_eq!(FieldSpec::flag(16), Err(FieldError::BitOutOfRange(16)));
        assert_eq!(FieldSpec::flag(-3), Err(FieldError::BitOutOfRange(-3)));
        assert_eq!(FieldSpec::unsigned_byte(9), Err(FieldError::InvalidByteOffset(9)));
        assert_eq!(FieldSpec::signed_byte(-1), Err(FieldError::InvalidByteOffset(-1)));
        assert_eq!(FieldSpec::signed_byte(300), Err(FieldError::InvalidByteOffset(300)));
        assert!(FieldCodec::new(FieldSpec::Masked { position: 12, length: 8 }).is_err());
        assert!(FieldSpec::masked(0, 16).is_ok());
        assert!(FieldSpec::masked(15, 1).is_ok());
    }

    #[test]
    fn test_byte_at_any_position_up_to_eight() {
        let middle = codec(FieldSpec::unsigned_byte(4).unwrap());
        assert_eq!(middle.decode(0x0FF0), FieldValue::Int(0xFF));
        assert_eq!(middle.encode(0xF00F, FieldValue::Int(0xA5)), 0xFA5F);
        assert_eq!(middle.spec().bit_mask(), 0x0FF0);

        let signed = codec(FieldSpec::signed_byte(3).unwrap());
        assert_eq!(signed.decode(0x0400), FieldValue::Int(-128));
        assert_eq!(signed.encode(0x0000, FieldValue::Int(-1)), 0x07F8);
    }

    #[test]
    fn test_bit_helpers_past_end_of_word() {
        assert_eq!(extract(0xFFFF, 16, 1), 0);
        assert_eq!(extract(0xFFFF, 200, 16), 0);
        assert_eq!(extract(0x8000, 15, 4), 1);
        assert_eq!(insert(0x1234, 16, 1, 1), 0x1234);
        assert_eq!(insert(0x0000, 12, 8, 0xFF), 0xF000);
        assert_eq!(insert(0xFFFF, 200, 16, 0), 0xFFFF);
    }

    #[test]
    fn test_overlap_detection() {
        let low = FieldSpec::UnsignedByte { offset: 0 };
        let high = FieldSpec::UnsignedByte { offset: 8 };
        let bit3 = FieldSpec::Flag { bit: 3 };
        assert!(!low.overlaps(&high));
        assert!(low.overlaps(&bit3));
        assert!(FieldSpec::FixedPoint8_8.overlaps(&high));
        assert_eq!(FieldSpec::Masked { position: 4, length: 4 }.bit_mask(), 0x00F0);
    }

    #[test]
    fn test_display_names() {
        assert_eq!(FieldSpec::Flag { bit: 15 }.to_string(), "flag<15>");
        assert_eq!(FieldSpec::Masked { position: 8, length: 4 }.to_string(), "mask<4, 8>");
        assert_eq!(FieldSpec::FixedPoint8_8.to_string(), "q7_8");
    }
}
