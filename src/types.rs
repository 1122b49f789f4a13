//! Core types for the nonce search
//!
//! Digest, difficulty target, dispatch batch, and result types used
//! throughout the engine, with validation and hex/JSON encodings.

use crate::{Error, Result};
use byteorder::{BigEndian, ByteOrder};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A SHA-256 digest as 8 big-endian 32-bit words.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Digest {
    words: [u32; 8],
}

impl Digest {
    /// Create a digest from its 8 words
    pub fn new(words: [u32; 8]) -> Self {
        Self { words }
    }

    /// Create a digest from 32 big-endian bytes
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        let mut words = [0u32; 8];
        for (i, word) in words.iter_mut().enumerate() {
            *word = BigEndian::read_u32(&bytes[i * 4..(i + 1) * 4]);
        }
        Self { words }
    }

    /// Get the digest words
    pub fn words(&self) -> &[u32; 8] {
        &self.words
    }

    /// Leading word of the digest (the word the difficulty predicate inspects)
    pub fn word0(&self) -> u32 {
        self.words[0]
    }

    /// Convert to 32 big-endian bytes
    pub fn to_bytes(&self) -> [u8; 32] {
        let mut bytes = [0u8; 32];
        for (i, word) in self.words.iter().enumerate() {
            BigEndian::write_u32(&mut bytes[i * 4..(i + 1) * 4], *word);
        }
        bytes
    }

    /// Convert to a lowercase hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    /// Number of leading zero bits in the leading digest word
    pub fn leading_zero_bits(&self) -> u32 {
        self.words[0].leading_zeros()
    }
}

impl FromStr for Digest {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let bytes = hex::decode(s)
            .map_err(|e| Error::config(format!("invalid hex in digest: {}", e)))?;
        let bytes: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
            Error::config(format!(
                "invalid digest length: expected 32 bytes, got {}",
                s.len() / 2
            ))
        })?;
        Ok(Self::from_bytes(&bytes))
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for Digest {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Digest::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// Acceptance predicate on a digest.
///
/// One run uses exactly one target; both forms are read-only configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DifficultyTarget {
    /// Required count of leading zero bits in the leading digest word
    LeadingZeroBits(u32),
    /// Full 8-word equality against an expected digest
    ExactDigest(Digest),
}

impl DifficultyTarget {
    /// Maximum meaningful leading-zero difficulty (one 32-bit word)
    pub const MAX_LEADING_ZERO_BITS: u32 = 32;

    /// Validate the target parameters
    pub fn validate(&self) -> Result<()> {
        match self {
            DifficultyTarget::LeadingZeroBits(bits) if *bits > Self::MAX_LEADING_ZERO_BITS => {
                Err(Error::config(format!(
                    "difficulty {} exceeds {} leading zero bits",
                    bits,
                    Self::MAX_LEADING_ZERO_BITS
                )))
            }
            _ => Ok(()),
        }
    }

    /// Evaluate the predicate against a digest
    pub fn matches(&self, digest: &Digest) -> bool {
        match self {
            DifficultyTarget::LeadingZeroBits(bits) => digest.leading_zero_bits() >= *bits,
            DifficultyTarget::ExactDigest(expected) => digest == expected,
        }
    }

    /// Whether the kernel reports the full 8-word digest for this target
    /// (exact-digest verification) or only the leading word (search).
    pub fn wants_full_digest(&self) -> bool {
        matches!(self, DifficultyTarget::ExactDigest(_))
    }
}

/// One kernel dispatch worth of work.
///
/// `base_nonce + lane_count * nonces_per_lane - 1` must stay inside the
/// 32-bit nonce domain; the all-ones nonce is additionally reserved as the
/// not-found sentinel on the result wire and is never scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchBatch {
    base_nonce: u32,
    lane_count: u32,
    nonces_per_lane: u32,
}

impl DispatchBatch {
    /// Create a batch, rejecting empty or domain-overflowing spans
    pub fn new(base_nonce: u32, lane_count: u32, nonces_per_lane: u32) -> Result<Self> {
        if lane_count == 0 || nonces_per_lane == 0 {
            return Err(Error::batch("lane count and nonces per lane must be > 0"));
        }
        let span = lane_count as u64 * nonces_per_lane as u64;
        let last = base_nonce as u64 + span - 1;
        if last >= u32::MAX as u64 {
            return Err(Error::batch(format!(
                "batch [{}..={}] leaves the 32-bit nonce domain",
                base_nonce, last
            )));
        }
        Ok(Self {
            base_nonce,
            lane_count,
            nonces_per_lane,
        })
    }

    pub fn base_nonce(&self) -> u32 {
        self.base_nonce
    }

    pub fn lane_count(&self) -> u32 {
        self.lane_count
    }

    pub fn nonces_per_lane(&self) -> u32 {
        self.nonces_per_lane
    }

    /// Total candidates covered by this batch
    pub fn candidates(&self) -> u64 {
        self.lane_count as u64 * self.nonces_per_lane as u64
    }

    /// Last nonce covered by this batch (inclusive)
    pub fn last_nonce(&self) -> u32 {
        self.base_nonce + (self.candidates() - 1) as u32
    }
}

/// Per-lane outcome of one dispatch, decoded from the result channels.
///
/// Ephemeral: produced and consumed within a single dispatch/readback cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaneResult {
    /// Lane index in row-major grid order
    pub lane: u32,
    /// Winning nonce, or -1 when the lane found nothing
    pub nonce: i64,
    /// Leading digest word reported by the kernel
    pub digest_word0: u32,
    /// Full digest, present only in the exact-digest kernel variant
    pub digest: Option<[u32; 8]>,
}

impl LaneResult {
    pub fn found(&self) -> bool {
        self.nonce >= 0
    }
}

/// A verified winning candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Solution {
    /// The winning nonce
    pub nonce: u32,
    /// Full reference digest of (input ‖ be32(nonce))
    pub digest: Digest,
}

/// Terminal outcome of a search
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchOutcome {
    /// A candidate was found and confirmed by the reference digest
    Verified(Solution),
    /// The dispatch budget was consumed without a hit (normal, not an error)
    Exhausted,
    /// The cooperative stop was observed at a dispatch boundary
    Cancelled,
}

/// Result of one full search, accumulated across dispatches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchResult {
    pub outcome: SearchOutcome,
    /// Total candidate nonces covered
    pub candidates_tried: u64,
    /// Dispatches actually issued
    pub dispatches: u32,
}

impl SearchResult {
    pub fn solution(&self) -> Option<&Solution> {
        match &self.outcome {
            SearchOutcome::Verified(solution) => Some(solution),
            _ => None,
        }
    }
}

/// Caller-facing report of one run.
///
/// `nonce` is -1 when the search ended without a verified solution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    /// Hex digest of the raw input (the fixed prefix the search appends to)
    pub input_hash: String,
    /// Hex digest of (input hash ‖ be32(nonce)), present on success
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub final_hash: Option<String>,
    pub nonce: i64,
    pub duration_ms: u64,
    pub candidates_tried: u64,
}
