use alloy_primitives::{B256, Bytes, U256};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use super::proof::{BackendMode, ThresholdProof};
use crate::crypto::cipher::NONCE_LEN;
use crate::crypto::poseidon::{poseidon4, DOMAIN_COMMITMENT};

/// Per-encryption nonce. Doubles as the AEAD nonce and the commitment blinding input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommitmentNonce(pub [u8; NONCE_LEN]);

impl CommitmentNonce {
    /// Draw a fresh nonce from the thread RNG.
    pub fn random() -> Self {
        let mut bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// The nonce as a field element (96 bits, always canonical).
    pub fn as_field(&self) -> B256 {
        B256::left_padding_from(&self.0)
    }
}

/// commitment = H("prism.commitment", secret_value, context_address, nonce)
///
/// `secret_value` must already be checked to fit the field.
pub fn commitment_hash(secret_value: U256, context_address: B256, nonce: &CommitmentNonce) -> B256 {
    poseidon4(
        DOMAIN_COMMITMENT,
        B256::from(secret_value),
        context_address,
        nonce.as_field(),
    )
}

/// An encrypted secret value bound to exactly one context identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedCommitment {
    /// Oracle ciphertext (ChaCha20-Poly1305 ciphertext + tag)
    pub ciphertext: Bytes,
    pub commitment: B256,
    pub nonce: CommitmentNonce,
    /// Compressed SEC1 ephemeral key used for the agreement. Empty when simulated.
    pub ephemeral_pubkey: Bytes,
    pub bound_context_address: B256,
    pub mode: BackendMode,
}

impl EncryptedCommitment {
    pub fn is_bound_to(&self, context_address: B256) -> bool {
        self.bound_context_address == context_address
    }

    /// Holder-side opening check: does `(secret_value, context_address)` reproduce
    /// the digest under this nonce?
    pub fn opens_to(&self, secret_value: U256, context_address: B256) -> bool {
        commitment_hash(secret_value, context_address, &self.nonce) == self.commitment
    }
}

/// Commitment + proof package handed to a verifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdEvidence {
    pub commitment: EncryptedCommitment,
    pub proof: ThresholdProof,
    pub context_address: B256,
}
