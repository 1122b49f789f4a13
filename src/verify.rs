//! CPU-side double-check of kernel results
//!
//! Every accepted lane is recomputed with the reference primitive before
//! the run reports success. A disagreement is a kernel-implementation
//! defect and aborts the run with both digests attached; it is never
//! retried or downgraded to a miss.
//!
//! Verification stays mandatory even at low difficulties: parallel
//! backends have historically drifted from the reference once the
//! leading-zero difficulty passed 6 (a nonce-encoding fault at the
//! host/kernel boundary), and this is the stage that makes such drift
//! loud instead of silent.

use crate::crypto;
use crate::types::Digest;
use crate::{Error, Result};

/// Confirm a search hit: the kernel reported only the leading digest word.
///
/// Returns the full reference digest of (prefix ‖ be32(nonce)) on success.
pub fn verify_search_hit(prefix: &[u8], nonce: u32, reported_word0: u32) -> Result<Digest> {
    let reference = crypto::digest_with_nonce(prefix, nonce);
    if reference.word0() != reported_word0 {
        return Err(Error::hash_mismatch(
            format!("{:08x}", reported_word0),
            reference.to_hex(),
        ));
    }
    Ok(reference)
}

/// Confirm an exact-digest hit: the kernel reported all 8 words.
pub fn verify_exact(prefix: &[u8], nonce: u32, reported: &Digest) -> Result<Digest> {
    let reference = crypto::digest_with_nonce(prefix, nonce);
    if &reference != reported {
        return Err(Error::hash_mismatch(reported.to_hex(), reference.to_hex()));
    }
    Ok(reference)
}

/// Confirm a no-nonce hit against the reference digest of the message itself.
pub fn verify_message_digest(message: &[u8], reported_word0: u32) -> Result<Digest> {
    let reference = crypto::digest_of(message);
    if reference.word0() != reported_word0 {
        return Err(Error::hash_mismatch(
            format!("{:08x}", reported_word0),
            reference.to_hex(),
        ));
    }
    Ok(reference)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_search_hit_accepts_matching_word() {
        let prefix = crypto::input_hash(b"verify me");
        let reference = crypto::digest_with_nonce(&prefix, 42);

        let verified = verify_search_hit(&prefix, 42, reference.word0()).unwrap();
        assert_eq!(verified, reference);
    }

    #[test]
    fn test_corrupted_word_raises_mismatch() {
        let prefix = crypto::input_hash(b"verify me");
        let reference = crypto::digest_with_nonce(&prefix, 42);

        let err = verify_search_hit(&prefix, 42, reference.word0() ^ 1).unwrap_err();
        assert_matches!(err, Error::HashMismatch { .. });
        assert!(err.is_fatal());
        // the fault carries both digests for diagnosis
        let text = err.to_string();
        assert!(text.contains(&format!("{:08x}", reference.word0() ^ 1)));
        assert!(text.contains(&reference.to_hex()));
    }

    #[test]
    fn test_exact_verification_checks_all_words() {
        let prefix = [5u8; 32];
        let reference = crypto::digest_with_nonce(&prefix, 12345);
        assert!(verify_exact(&prefix, 12345, &reference).is_ok());

        let mut words = *reference.words();
        words[7] ^= 0x8000_0000;
        assert_matches!(
            verify_exact(&prefix, 12345, &Digest::new(words)),
            Err(Error::HashMismatch { .. })
        );

        // right digest, wrong nonce: still a mismatch
        assert_matches!(
            verify_exact(&prefix, 12346, &reference),
            Err(Error::HashMismatch { .. })
        );
    }

    #[test]
    fn test_message_digest_verification() {
        let reference = crypto::digest_of(b"Hello, World!");
        let verified = verify_message_digest(b"Hello, World!", reference.word0()).unwrap();
        assert_eq!(verified, reference);

        assert_matches!(
            verify_message_digest(b"Hello, World!", !reference.word0()),
            Err(Error::HashMismatch { .. })
        );
    }
}
