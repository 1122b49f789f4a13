//! Reference digest primitive
//!
//! Thin wrapper over the `sha2` crate. This is the trusted, sequential side
//! of the engine: it hashes the raw input to produce the fixed search
//! prefix, and it recomputes every accepted candidate before the result is
//! trusted. The parallel kernels never feed back into it.

use crate::block::NONCE_BYTES;
use crate::types::Digest;
use sha2::{Digest as _, Sha256};

/// SHA-256 over an arbitrary byte sequence
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// SHA-256 as a word digest
pub fn digest_of(data: &[u8]) -> Digest {
    Digest::from_bytes(&sha256(data))
}

/// The fixed 32-byte prefix the search appends candidate nonces to
pub fn input_hash(input: &[u8]) -> [u8; 32] {
    sha256(input)
}

/// Reference digest of (prefix ‖ be32(nonce))
pub fn digest_with_nonce(prefix: &[u8], nonce: u32) -> Digest {
    let mut message = Vec::with_capacity(prefix.len() + NONCE_BYTES);
    message.extend_from_slice(prefix);
    message.extend_from_slice(&nonce.to_be_bytes());
    digest_of(&message)
}
