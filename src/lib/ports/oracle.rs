use alloy_primitives::Bytes;
use std::future::Future;

use crate::crypto::cipher::SharedSecret;
use crate::domain::commitment::CommitmentNonce;
use crate::retry::Transient;

/// A single encryption request. The oracle keeps no session state between calls.
#[derive(Debug, Clone)]
pub struct EncryptRequest {
    /// ECDH secret between the caller's ephemeral key and the oracle key
    pub shared_secret: SharedSecret,
    pub plaintext: Vec<u8>,
    pub nonce: CommitmentNonce,
}

/// Port for the encryption oracle (MPC network or enclave).
///
/// Implementations:
/// - `LocalCipherOracle` (in-process key, for PoC/testing)
/// - `SimulatedOracle` (simulation builds only)
pub trait CipherOracle: Send + Sync {
    /// The oracle's public key, compressed SEC1. Stable per oracle instance.
    fn public_key(&self) -> impl Future<Output = Result<Bytes, OracleError>> + Send;

    /// Encrypt `plaintext` under the session key derived from the shared secret.
    fn encrypt(
        &self,
        request: &EncryptRequest,
    ) -> impl Future<Output = Result<Bytes, OracleError>> + Send;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OracleError {
    #[error("oracle unavailable: {0}")]
    Unavailable(String),

    #[error("oracle request timed out")]
    Timeout,

    #[error("oracle rejected request: {0}")]
    Rejected(String),

    #[error("malformed oracle response: {0}")]
    Malformed(String),
}

impl Transient for OracleError {
    fn is_transient(&self) -> bool {
        matches!(self, OracleError::Unavailable(_) | OracleError::Timeout)
    }
}
