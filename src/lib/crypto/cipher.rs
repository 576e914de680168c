use std::fmt;

use chacha20poly1305::{
    ChaCha20Poly1305,
    Nonce,
    aead::{
        Aead,
        KeyInit,
    },
};
use hkdf::Hkdf;
use k256::{
    PublicKey,
    SecretKey,
    ecdh::EphemeralSecret,
    elliptic_curve::sec1::ToEncodedPoint,
};
use sha2::Sha256;

/// Domain separator for HKDF key derivation.
const HKDF_INFO: &[u8] = b"prism-commitment-v1";

/// Length of the ChaCha20-Poly1305 nonce.
pub const NONCE_LEN: usize = 12;

/// Raw ECDH shared secret (x-coordinate of the shared point).
#[derive(Clone, PartialEq, Eq)]
pub struct SharedSecret(pub [u8; 32]);

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedSecret(<redacted>)")
    }
}

/// Result of a one-sided key agreement with a fresh ephemeral key.
///
/// The ephemeral secret is dropped inside [`ephemeral_agreement`]; only the
/// shared secret and the public half survive.
#[derive(Debug)]
pub struct EphemeralAgreement {
    pub shared_secret: SharedSecret,
    /// Compressed SEC1 encoding (33 bytes)
    pub ephemeral_pubkey: Vec<u8>,
}

/// Parse a compressed or uncompressed SEC1 secp256k1 public key.
pub fn parse_public_key(bytes: &[u8]) -> Result<PublicKey, CipherError> {
    PublicKey::from_sec1_bytes(bytes).map_err(|_| CipherError::InvalidPublicKey)
}

/// Serialize a public key to compressed SEC1 format (33 bytes).
pub fn encode_public_key(key: &PublicKey) -> Vec<u8> {
    key.to_encoded_point(true).as_bytes().to_vec()
}

/// Generate a fresh ephemeral key pair and agree on a shared secret with `peer`.
pub fn ephemeral_agreement(peer: &PublicKey) -> EphemeralAgreement {
    let ephemeral_secret = EphemeralSecret::random(&mut rand::thread_rng());
    let ephemeral_pubkey = encode_public_key(&ephemeral_secret.public_key());

    let shared = ephemeral_secret.diffie_hellman(peer);
    let mut shared_secret = [0u8; 32];
    shared_secret.copy_from_slice(shared.raw_secret_bytes().as_slice());

    EphemeralAgreement {
        shared_secret: SharedSecret(shared_secret),
        ephemeral_pubkey,
    }
}

/// Recompute the shared secret on the receiving side from the revealed ephemeral key.
pub fn static_agreement(
    secret: &SecretKey,
    ephemeral_pubkey: &[u8],
) -> Result<SharedSecret, CipherError> {
    let ephemeral = parse_public_key(ephemeral_pubkey)?;
    let shared = k256::ecdh::diffie_hellman(secret.to_nonzero_scalar(), ephemeral.as_affine());
    let mut shared_secret = [0u8; 32];
    shared_secret.copy_from_slice(shared.raw_secret_bytes().as_slice());
    Ok(SharedSecret(shared_secret))
}

fn session_cipher(shared: &SharedSecret) -> Result<ChaCha20Poly1305, CipherError> {
    let hkdf = Hkdf::<Sha256>::new(None, &shared.0);
    let mut key = [0u8; 32];
    hkdf.expand(HKDF_INFO, &mut key)
        .map_err(|_| CipherError::KeyDerivationFailed)?;
    ChaCha20Poly1305::new_from_slice(&key).map_err(|_| CipherError::CipherInitFailed)
}

/// Encrypt `plaintext` under the session key derived from `shared`.
pub fn seal(
    shared: &SharedSecret,
    nonce: &[u8; NONCE_LEN],
    plaintext: &[u8],
) -> Result<Vec<u8>, CipherError> {
    session_cipher(shared)?
        .encrypt(Nonce::from_slice(nonce), plaintext)
        .map_err(|_| CipherError::EncryptionFailed)
}

/// Decrypt and authenticate `ciphertext` under the session key derived from `shared`.
pub fn open(
    shared: &SharedSecret,
    nonce: &[u8; NONCE_LEN],
    ciphertext: &[u8],
) -> Result<Vec<u8>, CipherError> {
    session_cipher(shared)?
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| CipherError::DecryptionFailed)
}

/// Errors from the session cipher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CipherError {
    #[error("Invalid public key")]
    InvalidPublicKey,
    #[error("Key derivation failed")]
    KeyDerivationFailed,
    #[error("Cipher initialization failed")]
    CipherInitFailed,
    #[error("Encryption failed")]
    EncryptionFailed,
    #[error("Decryption failed (wrong key or corrupted data)")]
    DecryptionFailed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agreement_symmetry() {
        let receiver = SecretKey::random(&mut rand::thread_rng());
        let agreement = ephemeral_agreement(&receiver.public_key());

        let recomputed = static_agreement(&receiver, &agreement.ephemeral_pubkey).unwrap();
        assert_eq!(agreement.shared_secret, recomputed);
    }

    #[test]
    fn test_ephemeral_keys_are_fresh() {
        let receiver = SecretKey::random(&mut rand::thread_rng());
        let first = ephemeral_agreement(&receiver.public_key());
        let second = ephemeral_agreement(&receiver.public_key());

        assert_ne!(first.ephemeral_pubkey, second.ephemeral_pubkey);
        assert_ne!(first.shared_secret, second.shared_secret);
    }

    #[test]
    fn test_seal_open_roundtrip() {
        let shared = SharedSecret([7u8; 32]);
        let nonce = [1u8; NONCE_LEN];

        let ciphertext = seal(&shared, &nonce, b"500000").unwrap();
        assert_ne!(ciphertext.as_slice(), b"500000");
        assert_eq!(open(&shared, &nonce, &ciphertext).unwrap(), b"500000");
    }

    #[test]
    fn test_open_with_wrong_nonce_fails() {
        let shared = SharedSecret([7u8; 32]);
        let ciphertext = seal(&shared, &[1u8; NONCE_LEN], b"secret").unwrap();

        let result = open(&shared, &[2u8; NONCE_LEN], &ciphertext);
        assert_eq!(result.unwrap_err(), CipherError::DecryptionFailed);
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let shared = SharedSecret([7u8; 32]);
        let nonce = [1u8; NONCE_LEN];
        let mut ciphertext = seal(&shared, &nonce, b"secret").unwrap();
        ciphertext[0] ^= 0xFF;

        assert!(open(&shared, &nonce, &ciphertext).is_err());
    }

    #[test]
    fn test_invalid_public_key_rejected() {
        assert_eq!(
            parse_public_key(&[0x02; 5]).unwrap_err(),
            CipherError::InvalidPublicKey
        );
    }

    #[test]
    fn test_shared_secret_debug_is_redacted() {
        let rendered = format!("{:?}", SharedSecret([9u8; 32]));
        assert!(!rendered.contains('9'));
    }
}
