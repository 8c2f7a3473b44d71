//! CRC-8 checksum for link-layer frames.
//!
//! LBP uses polynomial 0x8C applied LSB-first with a zero seed and no
//! final XOR, which is the CRC-8/MAXIM-DOW algorithm. Because nothing is
//! XORed onto the result, running the CRC over a frame body followed by
//! its own checksum byte always yields zero; receivers rely on that.

use crc::{Crc, CRC_8_MAXIM_DOW};

/// CRC-8/MAXIM-DOW calculator with 256-byte lookup table.
static CRC8: Crc<u8> = Crc::<u8>::new(&CRC_8_MAXIM_DOW);

/// Calculate CRC-8 checksum of a byte slice.
#[inline]
#[must_use]
pub fn calculate_crc8(data: &[u8]) -> u8 {
    CRC8.checksum(data)
}

/// Running CRC-8 accumulator.
///
/// Bytes are folded in one at a time as they cross the link.
/// [`Crc8Digest::take`] yields the accumulated value and restarts from
/// zero, which is what both framers need at a frame boundary.
pub struct Crc8Digest {
    digest: crc::Digest<'static, u8>,
}

impl Crc8Digest {
    /// Create a new CRC-8 digest.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            digest: CRC8.digest(),
        }
    }

    /// Fold a single byte into the accumulator.
    #[inline]
    pub fn update(&mut self, byte: u8) {
        self.digest.update(&[byte]);
    }

    /// Fold a byte slice into the accumulator.
    #[inline]
    pub fn update_slice(&mut self, data: &[u8]) {
        self.digest.update(data);
    }

    /// Return the accumulated value and start over.
    #[inline]
    pub fn take(&mut self) -> u8 {
        core::mem::replace(&mut self.digest, CRC8.digest()).finalize()
    }

    /// Discard everything folded in so far.
    #[inline]
    pub fn reset(&mut self) {
        self.digest = CRC8.digest();
    }
}

impl Default for Crc8Digest {
    fn default() -> Self {
        Self::new()
    }
}
