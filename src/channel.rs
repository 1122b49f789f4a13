//! Result readback protocol
//!
//! One dispatch produces one interleaved record per lane. The backend
//! cannot hand back a single logical channel on its own: every lane record
//! is four 4-component vectors (visual, nonce-flag, digest-lo, digest-hi),
//! and the reader de-interleaves, taking only the component it needs.
//!
//! A [`ResultChannel`] owns a host-memory snapshot taken before the device
//! buffers are released; it never aliases a mapped device view.

use crate::types::LaneResult;
use crate::{Error, Result};

/// u32 components per lane record (4 vectors of 4)
pub const LANE_STRIDE: usize = 16;

/// Component offset of the visual vector within a lane record
pub(crate) const VISUAL: usize = 0;
/// Component offset of the nonce-flag vector
pub(crate) const NONCE: usize = 4;
/// Component offset of the digest vectors (8 contiguous words)
pub(crate) const DIGEST: usize = 8;

/// Wire encoding of "no hit in this lane"
pub const NONCE_SENTINEL: u32 = u32::MAX;

/// Logical output channels of one dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelSelector {
    /// Human-visualization channel; functionally inert
    Visual,
    /// Signed nonce with the all-ones not-found sentinel
    NonceFlag,
    /// Leading digest word
    DigestWord,
}

/// Host-owned snapshot of one dispatch's per-lane output records
#[derive(Debug, Clone)]
pub struct ResultChannel {
    raw: Vec<u32>,
    lane_count: u32,
    full_digest: bool,
}

impl ResultChannel {
    /// Wrap a raw interleaved readback.
    ///
    /// `full_digest` marks the exact-digest kernel variant, which populates
    /// all 8 digest words instead of only the leading one.
    pub fn from_raw(raw: Vec<u32>, lane_count: u32, full_digest: bool) -> Result<Self> {
        let expected = lane_count as usize * LANE_STRIDE;
        if raw.len() != expected {
            return Err(Error::batch(format!(
                "readback of {} words does not cover {} lanes ({} expected)",
                raw.len(),
                lane_count,
                expected
            )));
        }
        Ok(Self {
            raw,
            lane_count,
            full_digest,
        })
    }

    pub fn lane_count(&self) -> u32 {
        self.lane_count
    }

    /// De-interleave one logical channel: the leading component of the
    /// selected vector for every lane, in row-major lane order.
    pub fn read(&self, selector: ChannelSelector) -> Vec<u32> {
        let offset = match selector {
            ChannelSelector::Visual => VISUAL,
            ChannelSelector::NonceFlag => NONCE,
            ChannelSelector::DigestWord => DIGEST,
        };
        (0..self.lane_count as usize)
            .map(|lane| self.raw[lane * LANE_STRIDE + offset])
            .collect()
    }

    fn decode_lane(&self, lane: usize) -> LaneResult {
        let record = &self.raw[lane * LANE_STRIDE..(lane + 1) * LANE_STRIDE];
        let nonce_bits = record[NONCE];
        let nonce = if nonce_bits == NONCE_SENTINEL {
            -1
        } else {
            nonce_bits as i64
        };
        let digest = if self.full_digest {
            let mut words = [0u32; 8];
            words.copy_from_slice(&record[DIGEST..DIGEST + 8]);
            Some(words)
        } else {
            None
        };
        LaneResult {
            lane: lane as u32,
            nonce,
            digest_word0: record[DIGEST],
            digest,
        }
    }

    /// Structured view of every lane
    pub fn lane_results(&self) -> Vec<LaneResult> {
        (0..self.lane_count as usize)
            .map(|lane| self.decode_lane(lane))
            .collect()
    }

    /// First successful lane in fixed row-major scan order.
    ///
    /// This is the tie-break among simultaneously successful lanes; the
    /// winner is not necessarily the smallest satisfying nonce.
    pub fn first_hit(&self) -> Option<LaneResult> {
        (0..self.lane_count as usize)
            .map(|lane| self.decode_lane(lane))
            .find(|result| result.found())
    }
}
