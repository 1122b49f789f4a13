//! Single-block message layout
//!
//! Builds the one padded, length-appended 512-bit block the kernels hash,
//! with an optional reserved slot where each lane splices its candidate
//! nonce. Layout per FIPS 180-4 §5.1.1, restricted to messages that fit a
//! single block.

use crate::{Error, Result};
use byteorder::{BigEndian, ByteOrder};

/// Bytes reserved for the big-endian nonce appended after the input
pub const NONCE_BYTES: usize = 4;

/// Largest input that leaves room for nonce, terminator, and length field
pub const MAX_INPUT_WITH_NONCE: usize = 64 - 1 - 8 - NONCE_BYTES;

/// Largest input when no nonce slot is reserved
pub const MAX_INPUT_WITHOUT_NONCE: usize = 64 - 1 - 8;

/// One padded 512-bit message block as 16 big-endian words.
///
/// Immutable once built. The nonce slot, when present, is zero-filled so a
/// kernel can splice a candidate in with plain ORs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageBlock {
    words: [u32; 16],
    nonce_offset: Option<u32>,
}

impl MessageBlock {
    /// Build a block with a reserved 4-byte nonce slot after the input.
    ///
    /// Fails with [`Error::InputTooLarge`] for inputs over
    /// [`MAX_INPUT_WITH_NONCE`] bytes.
    pub fn with_nonce_slot(input: &[u8]) -> Result<Self> {
        if input.len() > MAX_INPUT_WITH_NONCE {
            return Err(Error::InputTooLarge {
                len: input.len(),
                max: MAX_INPUT_WITH_NONCE,
            });
        }
        Ok(Self::build(input, true))
    }

    /// Build a block over the input alone (no nonce slot).
    ///
    /// Fails with [`Error::InputTooLarge`] for inputs over
    /// [`MAX_INPUT_WITHOUT_NONCE`] bytes.
    pub fn without_nonce(input: &[u8]) -> Result<Self> {
        if input.len() > MAX_INPUT_WITHOUT_NONCE {
            return Err(Error::InputTooLarge {
                len: input.len(),
                max: MAX_INPUT_WITHOUT_NONCE,
            });
        }
        Ok(Self::build(input, false))
    }

    fn build(input: &[u8], reserve_nonce: bool) -> Self {
        let mut bytes = [0u8; 64];
        bytes[..input.len()].copy_from_slice(input);

        let message_len = input.len() + if reserve_nonce { NONCE_BYTES } else { 0 };
        bytes[message_len] = 0x80;
        BigEndian::write_u64(&mut bytes[56..64], (message_len as u64) * 8);

        let mut words = [0u32; 16];
        for (i, word) in words.iter_mut().enumerate() {
            *word = BigEndian::read_u32(&bytes[i * 4..(i + 1) * 4]);
        }

        Self {
            words,
            nonce_offset: reserve_nonce.then_some(input.len() as u32),
        }
    }

    /// The 16 big-endian block words
    pub fn words(&self) -> &[u32; 16] {
        &self.words
    }

    /// Byte offset of the nonce slot, or `None` for the no-nonce variant
    pub fn nonce_offset(&self) -> Option<u32> {
        self.nonce_offset
    }

    /// Decode the 64-bit big-endian bit-length field (words 14-15)
    pub fn bit_length(&self) -> u64 {
        ((self.words[14] as u64) << 32) | self.words[15] as u64
    }

    /// Copy of the block words with `nonce` spliced big-endian into the
    /// reserved slot. The slot need not be word-aligned.
    pub fn words_with_nonce(&self, nonce: u32) -> [u32; 16] {
        let mut words = self.words;
        if let Some(offset) = self.nonce_offset {
            let wi = (offset / 4) as usize;
            let shift = (offset % 4) * 8;
            if shift == 0 {
                words[wi] |= nonce;
            } else {
                words[wi] |= nonce >> shift;
                words[wi + 1] |= nonce << (32 - shift);
            }
        }
        words
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_length_field_round_trip() {
        let block = MessageBlock::with_nonce_slot(&[0xAB; 32]).unwrap();
        assert_eq!(block.bit_length(), (32 + NONCE_BYTES as u64) * 8);

        let block = MessageBlock::without_nonce(b"Hello, World!").unwrap();
        assert_eq!(block.bit_length(), 13 * 8);
    }

    #[test]
    fn test_terminator_follows_nonce_slot() {
        let input = [0x11u8; 32];
        let block = MessageBlock::with_nonce_slot(&input).unwrap();
        assert_eq!(block.nonce_offset(), Some(32));
        // words 0..8 carry the input, word 8 is the zeroed slot,
        // word 9 starts with the 0x80 terminator
        assert_eq!(block.words()[7], 0x11111111);
        assert_eq!(block.words()[8], 0);
        assert_eq!(block.words()[9], 0x80000000);
    }

    #[test]
    fn test_terminator_without_nonce_slot() {
        let block = MessageBlock::without_nonce(&[0x22u8; 6]).unwrap();
        assert_eq!(block.nonce_offset(), None);
        assert_eq!(block.words()[0], 0x22222222);
        // 0x80 lands at byte 6, the third byte of word 1
        assert_eq!(block.words()[1], 0x22228000);
    }

    #[test]
    fn test_size_limits() {
        assert!(MessageBlock::with_nonce_slot(&[0u8; MAX_INPUT_WITH_NONCE]).is_ok());
        assert_matches!(
            MessageBlock::with_nonce_slot(&[0u8; MAX_INPUT_WITH_NONCE + 1]),
            Err(Error::InputTooLarge { len: 52, max: 51 })
        );

        assert!(MessageBlock::without_nonce(&[0u8; MAX_INPUT_WITHOUT_NONCE]).is_ok());
        assert_matches!(
            MessageBlock::without_nonce(&[0u8; MAX_INPUT_WITHOUT_NONCE + 1]),
            Err(Error::InputTooLarge { len: 56, max: 55 })
        );
    }

    #[test]
    fn test_aligned_nonce_splice() {
        let block = MessageBlock::with_nonce_slot(&[0u8; 32]).unwrap();
        let words = block.words_with_nonce(0xDEADBEEF);
        assert_eq!(words[8], 0xDEADBEEF);
        // splicing never disturbs neighbors
        assert_eq!(words[7], 0);
        assert_eq!(words[9], 0x80000000);
    }

    #[test]
    fn test_unaligned_nonce_splice() {
        let block = MessageBlock::with_nonce_slot(&[0xFFu8; 13]).unwrap();
        assert_eq!(block.nonce_offset(), Some(13));
        let words = block.words_with_nonce(0xAABBCCDD);
        // offset 13: one byte into word 3, three bytes spill into word 4
        assert_eq!(words[3], 0xFF_AA_BB_CC);
        assert_eq!(words[4], 0xDD_80_00_00);
    }

    #[test]
    fn test_blocks_are_deterministic() {
        let a = MessageBlock::with_nonce_slot(b"same input").unwrap();
        let b = MessageBlock::with_nonce_slot(b"same input").unwrap();
        assert_eq!(a, b);
    }
}
