//! N-bit sample extraction from byte pairs.
//!
//! High-bit-depth planar formats store each sample in a 16-bit slot with
//! only the low `bits` carrying data. [`SampleExtractor`] picks the extraction
//! routines once per plane so the pixel loop never re-branches on byte order
//! or depth.

use whereat::at;

use crate::error::{RenderError, Result};

/// Smallest effective depth handled by the 16-bit storage path.
pub const MIN_EFFECTIVE_BITS: u8 = 9;
/// Largest effective depth handled by the 16-bit storage path.
pub const MAX_EFFECTIVE_BITS: u8 = 16;

/// Which byte of a pair carries the least significant bits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ByteOrder {
    /// Lower address holds the least significant byte.
    #[default]
    LittleEndian,
    /// Lower address holds the most significant byte.
    BigEndian,
}

/// Extract a right-justified sample from `(first, second)` storage bytes.
pub type Extract16Fn = fn(u8, u8, u8) -> u16;
/// Extract the top 8 bits of the effective range.
pub type Extract8Fn = fn(u8, u8, u8) -> u8;

/// Extraction routines bound to one bit depth and byte order.
#[derive(Clone, Copy, Debug)]
pub struct SampleExtractor {
    bits: u8,
    order: ByteOrder,
    to_16: Extract16Fn,
    to_8: Extract8Fn,
}

impl SampleExtractor {
    /// Select the routines for `bits` effective bits stored in `order`.
    pub fn new(bits: u8, order: ByteOrder) -> Result<Self> {
        validate_bits(bits)?;
        let (to_16, to_8): (Extract16Fn, Extract8Fn) = match (order, bits) {
            (ByteOrder::LittleEndian, 16) => (le_full, le_full_8),
            (ByteOrder::LittleEndian, _) => (le_masked, le_masked_8),
            (ByteOrder::BigEndian, 16) => (be_full, be_full_8),
            (ByteOrder::BigEndian, _) => (be_masked, be_masked_8),
        };
        Ok(Self {
            bits,
            order,
            to_16,
            to_8,
        })
    }

    /// Effective bit depth.
    #[inline]
    pub fn bits(&self) -> u8 {
        self.bits
    }

    /// Storage byte order.
    #[inline]
    pub fn order(&self) -> ByteOrder {
        self.order
    }

    /// Largest value a sample can take (`2^bits - 1`).
    #[inline]
    pub fn max_value(&self) -> u16 {
        max_value(self.bits)
    }

    /// Right-justified sample with unused high bits cleared.
    #[inline]
    pub fn extract_16bit(&self, first: u8, second: u8) -> u16 {
        (self.to_16)(first, second, self.bits)
    }

    /// Most significant 8 bits of the effective range.
    #[inline]
    pub fn extract_8bit(&self, first: u8, second: u8) -> u8 {
        (self.to_8)(first, second, self.bits)
    }

    /// Decode a whole row of 2-byte samples into `out`.
    ///
    /// Decodes `min(row.len() / 2, out.len())` samples.
    pub fn extract_row_16bit(&self, row: &[u8], out: &mut [u16]) {
        let f = self.to_16;
        let bits = self.bits;
        for (pair, dst) in row.chunks_exact(2).zip(out.iter_mut()) {
            *dst = f(pair[0], pair[1], bits);
        }
    }
}

/// Right-justified 16-bit sample from two storage bytes.
///
/// Fails when `bits` is outside `9..=16`.
pub fn extract_16bit(first: u8, second: u8, bits: u8, order: ByteOrder) -> Result<u16> {
    Ok(SampleExtractor::new(bits, order)?.extract_16bit(first, second))
}

/// Top 8 bits of the effective range from two storage bytes.
///
/// Fails when `bits` is outside `9..=16`.
pub fn extract_8bit(first: u8, second: u8, bits: u8, order: ByteOrder) -> Result<u8> {
    Ok(SampleExtractor::new(bits, order)?.extract_8bit(first, second))
}

/// Reduce an already right-justified `bits`-deep sample to 8 bits.
///
/// Fails when `bits` is outside `9..=16`. Bits above the effective range
/// are ignored.
#[inline]
pub fn downscale_to_8bit(sample: u16, bits: u8) -> Result<u8> {
    validate_bits(bits)?;
    Ok(((sample & max_value(bits)) >> (bits - 8)) as u8)
}

/// Largest value representable in `bits` bits (clamped to 16).
#[inline]
pub const fn max_value(bits: u8) -> u16 {
    if bits >= 16 {
        u16::MAX
    } else {
        (1u16 << bits) - 1
    }
}

pub(crate) fn validate_bits(bits: u8) -> Result<()> {
    if !(MIN_EFFECTIVE_BITS..=MAX_EFFECTIVE_BITS).contains(&bits) {
        return Err(at(RenderError::InvalidBitDepth {
            bits,
            min: MIN_EFFECTIVE_BITS,
            max: MAX_EFFECTIVE_BITS,
        }));
    }
    Ok(())
}

#[inline]
fn le_full(first: u8, second: u8, _bits: u8) -> u16 {
    u16::from_le_bytes([first, second])
}

#[inline]
fn be_full(first: u8, second: u8, _bits: u8) -> u16 {
    u16::from_be_bytes([first, second])
}

#[inline]
fn le_masked(first: u8, second: u8, bits: u8) -> u16 {
    u16::from_le_bytes([first, second]) & max_value(bits)
}

#[inline]
fn be_masked(first: u8, second: u8, bits: u8) -> u16 {
    u16::from_be_bytes([first, second]) & max_value(bits)
}

#[inline]
fn le_full_8(_first: u8, second: u8, _bits: u8) -> u8 {
    second
}

#[inline]
fn be_full_8(first: u8, _second: u8, _bits: u8) -> u8 {
    first
}

#[inline]
fn le_masked_8(first: u8, second: u8, bits: u8) -> u8 {
    (le_masked(first, second, bits) >> (bits - 8)) as u8
}

#[inline]
fn be_masked_8(first: u8, second: u8, bits: u8) -> u8 {
    (be_masked(first, second, bits) >> (bits - 8)) as u8
}
