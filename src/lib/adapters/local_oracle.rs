use alloy_primitives::{Bytes, U256};
use k256::SecretKey;

use crate::crypto::cipher::{self, encode_public_key, static_agreement};
use crate::domain::commitment::EncryptedCommitment;
use crate::ports::oracle::{CipherOracle, EncryptRequest, OracleError};

/// In-process encryption oracle holding a secp256k1 key.
///
/// Stands in for the MPC network or enclave: it never sees the caller's
/// ephemeral secret, only the derived shared secret for each request.
pub struct LocalCipherOracle {
    secret: SecretKey,
}

impl LocalCipherOracle {
    /// Create an oracle with a freshly generated key.
    pub fn generate() -> Self {
        Self {
            secret: SecretKey::random(&mut rand::thread_rng()),
        }
    }

    /// Decrypt a commitment this oracle encrypted, recovering the secret value.
    pub fn open(&self, commitment: &EncryptedCommitment) -> Result<U256, OracleError> {
        let shared = static_agreement(&self.secret, &commitment.ephemeral_pubkey)
            .map_err(|e| OracleError::Malformed(e.to_string()))?;
        let plaintext = cipher::open(&shared, &commitment.nonce.0, &commitment.ciphertext)
            .map_err(|e| OracleError::Rejected(e.to_string()))?;
        U256::try_from_be_slice(&plaintext)
            .ok_or_else(|| OracleError::Malformed("plaintext is not a 256-bit value".into()))
    }
}

impl CipherOracle for LocalCipherOracle {
    async fn public_key(&self) -> Result<Bytes, OracleError> {
        Ok(Bytes::from(encode_public_key(&self.secret.public_key())))
    }

    async fn encrypt(&self, request: &EncryptRequest) -> Result<Bytes, OracleError> {
        cipher::seal(&request.shared_secret, &request.nonce.0, &request.plaintext)
            .map(Bytes::from)
            .map_err(|e| OracleError::Rejected(e.to_string()))
    }
}
