// crates/certledger-core/src/core/challenge.rs
// ============================================================================
// Module: Certledger Challenge Phrases
// Description: Salted challenge-phrase digests for revocation by phrase.
// Purpose: Store and verify challenge phrases without keeping plaintext.
// Dependencies: rand, serde, sha2, subtle
// ============================================================================

//! ## Overview
//! A challenge phrase is stored as `SHA-256(salt || phrase)` with a fresh
//! 16-byte salt per record. Verification recomputes the digest with the
//! stored salt and compares in constant time.
//!
//! Security posture: phrases are caller-supplied secrets; plaintext never
//! reaches a record.

// ============================================================================
// SECTION: Imports
// ============================================================================

use rand::CryptoRng;
use rand::RngCore;
use rand::rngs::OsRng;
use serde::Deserialize;
use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::core::hashing::hex_decode;
use crate::core::hashing::hex_encode;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Salt length in bytes.
pub const CHALLENGE_SALT_LEN: usize = 16;

// ============================================================================
// SECTION: Digest
// ============================================================================

/// Salted digest of a challenge phrase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeDigest {
    /// Hex-encoded random salt.
    pub salt: String,
    /// Hex-encoded `SHA-256(salt || phrase)`.
    pub digest: String,
}

impl ChallengeDigest {
    /// Derives a digest with a salt drawn from the operating system RNG.
    #[must_use]
    pub fn derive(phrase: &str) -> Self {
        Self::derive_with_rng(phrase, &mut OsRng)
    }

    /// Derives a digest with a salt drawn from the provided RNG.
    #[must_use]
    pub fn derive_with_rng<R: RngCore + CryptoRng>(phrase: &str, rng: &mut R) -> Self {
        let mut salt = [0_u8; CHALLENGE_SALT_LEN];
        rng.fill_bytes(&mut salt);
        Self {
            salt: hex_encode(&salt),
            digest: hex_encode(&salted_digest(&salt, phrase)),
        }
    }

    /// Returns true when the phrase hashes to the stored digest.
    ///
    /// Malformed stored values never match.
    #[must_use]
    pub fn matches(&self, phrase: &str) -> bool {
        let Some(salt) = hex_decode(&self.salt) else {
            return false;
        };
        let Some(expected) = hex_decode(&self.digest) else {
            return false;
        };
        let actual = salted_digest(&salt, phrase);
        actual.ct_eq(expected.as_slice()).into()
    }
}

/// Computes `SHA-256(salt || phrase)`.
fn salted_digest(salt: &[u8], phrase: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(phrase.as_bytes());
    hasher.finalize().into()
}

// ============================================================================
// SECTION: Tests
// ============================================================================
