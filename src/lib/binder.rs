//! Commitment Binder
//!
//! Encrypts a secret value for the oracle under a fresh ephemeral key and binds
//! it to one context address with a Poseidon commitment.

use std::time::Duration;

use alloy_primitives::{B256, Bytes, U256};
use k256::PublicKey;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::crypto::cipher::{ephemeral_agreement, parse_public_key};
use crate::crypto::poseidon::fits_field;
use crate::domain::commitment::{commitment_hash, CommitmentNonce, EncryptedCommitment};
use crate::domain::identity::ContextIdentity;
use crate::domain::proof::BackendMode;
use crate::error::ErrorClass;
use crate::ports::oracle::{CipherOracle, EncryptRequest, OracleError};
use crate::retry::{retry, with_deadline, RetryError, RetryPolicy};

#[cfg(any(test, feature = "simulation"))]
use crate::adapters::simulated::{simulated_ciphertext, SimulatedOracle};

/// Default deadline for a single oracle call.
pub const DEFAULT_ORACLE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BindError {
    #[error("encryption oracle unavailable after {attempts} attempts: {last}")]
    EncryptionUnavailable { attempts: u32, last: String },

    #[error("secret value does not fit the commitment field")]
    ValueOutOfRange,

    #[error("context {0} is revoked")]
    ContextRevoked(B256),

    #[error("encryption oracle rejected request: {0}")]
    OracleRejected(String),

    #[error("malformed oracle response: {0}")]
    MalformedOracleResponse(String),

    #[error("simulated encryption is not compiled into this build")]
    SimulationDisabled,
}

impl BindError {
    pub fn class(&self) -> ErrorClass {
        match self {
            BindError::EncryptionUnavailable { .. } => ErrorClass::Transient,
            BindError::ValueOutOfRange | BindError::ContextRevoked(_) => ErrorClass::Validation,
            BindError::OracleRejected(_)
            | BindError::MalformedOracleResponse(_)
            | BindError::SimulationDisabled => ErrorClass::Fatal,
        }
    }

    fn from_retry(error: RetryError<OracleError>) -> Self {
        match error {
            RetryError::Exhausted { attempts, last } => BindError::EncryptionUnavailable {
                attempts,
                last: last.to_string(),
            },
            RetryError::Fatal(OracleError::Rejected(reason)) => BindError::OracleRejected(reason),
            RetryError::Fatal(OracleError::Malformed(reason)) => {
                BindError::MalformedOracleResponse(reason)
            }
            RetryError::Fatal(other) => BindError::EncryptionUnavailable {
                attempts: 1,
                last: other.to_string(),
            },
        }
    }
}

pub struct CommitmentBinder<O> {
    oracle: O,
    mode: BackendMode,
    retry: RetryPolicy,
    timeout: Duration,
    /// Fetched on first use; stable per oracle instance
    oracle_key: OnceCell<PublicKey>,
}

impl<O: CipherOracle> CommitmentBinder<O> {
    pub fn new(oracle: O) -> Self {
        Self::with_policy(oracle, RetryPolicy::default(), DEFAULT_ORACLE_TIMEOUT)
    }

    pub fn with_policy(oracle: O, retry: RetryPolicy, timeout: Duration) -> Self {
        Self {
            oracle,
            mode: BackendMode::Live,
            retry,
            timeout,
            oracle_key: OnceCell::new(),
        }
    }

    pub fn mode(&self) -> BackendMode {
        self.mode
    }

    pub fn is_simulated(&self) -> bool {
        self.mode == BackendMode::Simulated
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    /// Encrypt `secret_value` and bind it to `context`.
    ///
    /// Every call uses a fresh ephemeral key and a fresh nonce.
    pub async fn bind(
        &self,
        secret_value: U256,
        context: &ContextIdentity,
    ) -> Result<EncryptedCommitment, BindError> {
        if !fits_field(secret_value) {
            return Err(BindError::ValueOutOfRange);
        }
        if context.revoked {
            return Err(BindError::ContextRevoked(context.address));
        }

        let nonce = CommitmentNonce::random();
        let plaintext = secret_value.to_be_bytes::<32>().to_vec();
        let (ciphertext, ephemeral_pubkey) = match self.mode {
            BackendMode::Live => self.encrypt(plaintext, nonce).await?,
            BackendMode::Simulated => simulated_encrypt(context.address, &nonce, &plaintext)?,
        };

        let commitment = commitment_hash(secret_value, context.address, &nonce);
        debug!(context = %context.address, %commitment, mode = %self.mode, "commitment bound");

        Ok(EncryptedCommitment {
            ciphertext,
            commitment,
            nonce,
            ephemeral_pubkey,
            bound_context_address: context.address,
            mode: self.mode,
        })
    }

    async fn oracle_key(&self) -> Result<&PublicKey, BindError> {
        self.oracle_key
            .get_or_try_init(|| async {
                let timeout = self.timeout;
                let bytes = retry(&self.retry, "oracle_public_key", || {
                    with_deadline(timeout, self.oracle.public_key(), || OracleError::Timeout)
                })
                .await
                .map_err(BindError::from_retry)?;
                parse_public_key(&bytes)
                    .map_err(|e| BindError::MalformedOracleResponse(format!("public key: {e}")))
            })
            .await
    }

    /// Returns `(ciphertext, ephemeral_pubkey)`.
    async fn encrypt(
        &self,
        plaintext: Vec<u8>,
        nonce: CommitmentNonce,
    ) -> Result<(Bytes, Bytes), BindError> {
        let oracle_key = self.oracle_key().await?;
        let agreement = ephemeral_agreement(oracle_key);
        let request = EncryptRequest {
            shared_secret: agreement.shared_secret,
            plaintext,
            nonce,
        };

        let timeout = self.timeout;
        let request = &request;
        let ciphertext = retry(&self.retry, "oracle_encrypt", move || {
            with_deadline(timeout, self.oracle.encrypt(request), || OracleError::Timeout)
        })
        .await
        .map_err(BindError::from_retry)?;

        Ok((ciphertext, Bytes::from(agreement.ephemeral_pubkey)))
    }
}

/// Returns `(ciphertext, ephemeral_pubkey)` without contacting an oracle.
#[cfg(any(test, feature = "simulation"))]
fn simulated_encrypt(
    context: B256,
    nonce: &CommitmentNonce,
    plaintext: &[u8],
) -> Result<(Bytes, Bytes), BindError> {
    tracing::warn!(%context, "binding with simulated encryption");
    Ok((simulated_ciphertext(&nonce.0, plaintext), Bytes::new()))
}

#[cfg(not(any(test, feature = "simulation")))]
fn simulated_encrypt(
    _context: B256,
    _nonce: &CommitmentNonce,
    _plaintext: &[u8],
) -> Result<(Bytes, Bytes), BindError> {
    Err(BindError::SimulationDisabled)
}

#[cfg(any(test, feature = "simulation"))]
impl CommitmentBinder<SimulatedOracle> {
    /// Binder that never contacts an oracle. Commitments are tagged `Simulated`.
    pub fn simulated() -> Self {
        Self {
            oracle: SimulatedOracle,
            mode: BackendMode::Simulated,
            retry: RetryPolicy::default(),
            timeout: DEFAULT_ORACLE_TIMEOUT,
            oracle_key: OnceCell::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use chrono::Utc;

    use super::*;
    use crate::adapters::local_oracle::LocalCipherOracle;
    use crate::crypto::poseidon::field_modulus;
    use crate::domain::identity::{ContextCategory, OwnerKey, PrivacyLevel, RootIdentity};

    /// Local oracle that counts calls and can be told to misbehave.
    struct CountingOracle {
        inner: LocalCipherOracle,
        key_fetches: AtomicU32,
        encrypt_calls: AtomicU32,
        failure: Option<OracleError>,
    }

    impl CountingOracle {
        fn new() -> Self {
            Self {
                inner: LocalCipherOracle::generate(),
                key_fetches: AtomicU32::new(0),
                encrypt_calls: AtomicU32::new(0),
                failure: None,
            }
        }

        fn failing(failure: OracleError) -> Self {
            Self {
                failure: Some(failure),
                ..Self::new()
            }
        }
    }

    impl CipherOracle for CountingOracle {
        async fn public_key(&self) -> Result<Bytes, OracleError> {
            self.key_fetches.fetch_add(1, Ordering::SeqCst);
            self.inner.public_key().await
        }

        async fn encrypt(&self, request: &EncryptRequest) -> Result<Bytes, OracleError> {
            self.encrypt_calls.fetch_add(1, Ordering::SeqCst);
            match &self.failure {
                Some(failure) => Err(failure.clone()),
                None => self.inner.encrypt(request).await,
            }
        }
    }

    fn binder(oracle: CountingOracle) -> CommitmentBinder<CountingOracle> {
        CommitmentBinder::with_policy(
            oracle,
            RetryPolicy::new(3, Duration::from_millis(1)),
            Duration::from_secs(1),
        )
    }

    fn contexts() -> (ContextIdentity, ContextIdentity) {
        let root = RootIdentity::new(
            OwnerKey(B256::repeat_byte(0x0A)),
            PrivacyLevel::High,
            Utc::now(),
        );
        (
            ContextIdentity::new(&root, 0, ContextCategory::DeFi, Some(1000), Utc::now()),
            ContextIdentity::new(&root, 1, ContextCategory::DeFi, Some(1000), Utc::now()),
        )
    }

    #[tokio::test]
    async fn test_bind_produces_openable_commitment() {
        let binder = binder(CountingOracle::new());
        let (context, _) = contexts();
        let value = U256::from(500_000u64);

        let commitment = binder.bind(value, &context).await.unwrap();

        assert_eq!(commitment.mode, BackendMode::Live);
        assert!(commitment.is_bound_to(context.address));
        assert!(commitment.opens_to(value, context.address));
        assert_eq!(binder.oracle().inner.open(&commitment).unwrap(), value);
        assert!(!binder.is_simulated());
    }

    #[tokio::test]
    async fn test_commitment_does_not_transfer() {
        let binder = binder(CountingOracle::new());
        let (context_a, context_b) = contexts();
        let value = U256::from(500_000u64);

        let commitment = binder.bind(value, &context_a).await.unwrap();

        assert!(!commitment.is_bound_to(context_b.address));
        assert!(!commitment.opens_to(value, context_b.address));
    }

    #[tokio::test]
    async fn test_fresh_key_and_nonce_per_call_with_cached_oracle_key() {
        let binder = binder(CountingOracle::new());
        let (context, _) = contexts();
        let value = U256::from(42u64);

        let first = binder.bind(value, &context).await.unwrap();
        let second = binder.bind(value, &context).await.unwrap();

        assert_ne!(first.nonce, second.nonce);
        assert_ne!(first.ephemeral_pubkey, second.ephemeral_pubkey);
        assert_ne!(first.commitment, second.commitment);
        assert_eq!(binder.oracle().key_fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_out_of_range_value_never_reaches_oracle() {
        let binder = binder(CountingOracle::new());
        let (context, _) = contexts();

        let err = binder.bind(field_modulus(), &context).await.unwrap_err();

        assert_eq!(err, BindError::ValueOutOfRange);
        assert_eq!(err.class(), ErrorClass::Validation);
        assert_eq!(binder.oracle().key_fetches.load(Ordering::SeqCst), 0);
        assert_eq!(binder.oracle().encrypt_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_revoked_context_is_refused() {
        let binder = binder(CountingOracle::new());
        let (mut context, _) = contexts();
        context.revoked = true;

        assert_eq!(
            binder.bind(U256::from(1u64), &context).await.unwrap_err(),
            BindError::ContextRevoked(context.address)
        );
    }

    #[tokio::test]
    async fn test_unavailable_oracle_is_retried_then_reported() {
        let binder = binder(CountingOracle::failing(OracleError::Unavailable(
            "network down".into(),
        )));
        let (context, _) = contexts();

        let err = binder.bind(U256::from(1u64), &context).await.unwrap_err();

        assert!(matches!(
            err,
            BindError::EncryptionUnavailable { attempts: 3, .. }
        ));
        assert!(err.class().is_retryable());
        assert_eq!(binder.oracle().encrypt_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_rejection_is_not_retried() {
        let binder = binder(CountingOracle::failing(OracleError::Rejected(
            "policy".into(),
        )));
        let (context, _) = contexts();

        let err = binder.bind(U256::from(1u64), &context).await.unwrap_err();

        assert_eq!(err, BindError::OracleRejected("policy".into()));
        assert_eq!(binder.oracle().encrypt_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_simulated_binder_is_labelled() {
        let binder = CommitmentBinder::simulated();
        let (context, _) = contexts();
        let value = U256::from(500_000u64);

        let commitment = binder.bind(value, &context).await.unwrap();

        assert!(binder.is_simulated());
        assert_eq!(commitment.mode, BackendMode::Simulated);
        assert!(commitment.ephemeral_pubkey.is_empty());
        assert!(commitment.opens_to(value, context.address));
    }

    #[test]
    fn test_disabled_simulation_is_a_fatal_error() {
        let err = BindError::SimulationDisabled;

        assert_eq!(err.class(), ErrorClass::Fatal);
        assert!(!err.class().is_retryable());
        assert!(err.to_string().contains("not compiled"));
    }
}
