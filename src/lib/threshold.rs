//! Threshold Prover / Verifier
//!
//! Proves `secret_value >= public_threshold` with the fixed threshold circuit and
//! verifies such proofs from the public threshold alone.

use std::future::Future;
use std::time::Duration;

use alloy_primitives::U256;
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::crypto::poseidon::fits_field;
use crate::domain::proof::{BackendMode, ThresholdCircuitInputs, ThresholdProof};
use crate::error::ErrorClass;
use crate::ports::prover::{ProverError, ProvingBackend};
use crate::retry::{retry, with_deadline, RetryError, RetryPolicy};

#[cfg(any(test, feature = "simulation"))]
use crate::adapters::simulated::SimulatedBackend;

/// Default deadline for a single proving backend call.
pub const DEFAULT_PROVER_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ThresholdError {
    #[error("predicate false: secret value is below threshold {threshold}")]
    PredicateFalse { threshold: U256 },

    #[error("{input} does not fit the circuit field")]
    ValueOutOfRange { input: &'static str },

    #[error("proving backend unavailable during {operation} after {attempts} attempts: {last}")]
    BackendUnavailable {
        operation: &'static str,
        attempts: u32,
        last: String,
    },

    #[error("proving backend failed during {operation}: {reason}")]
    Backend {
        operation: &'static str,
        reason: String,
    },
}

impl ThresholdError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ThresholdError::PredicateFalse { .. } | ThresholdError::ValueOutOfRange { .. } => {
                ErrorClass::Validation
            }
            ThresholdError::BackendUnavailable { .. } => ErrorClass::Transient,
            ThresholdError::Backend { .. } => ErrorClass::Fatal,
        }
    }

    fn from_retry(operation: &'static str, error: RetryError<ProverError>) -> Self {
        match error {
            RetryError::Exhausted { attempts, last } => ThresholdError::BackendUnavailable {
                operation,
                attempts,
                last: last.to_string(),
            },
            RetryError::Fatal(error) => ThresholdError::Backend {
                operation,
                reason: error.to_string(),
            },
        }
    }
}

pub struct ThresholdProver<P> {
    backend: P,
    mode: BackendMode,
    retry: RetryPolicy,
    timeout: Duration,
}

impl<P: ProvingBackend> ThresholdProver<P> {
    pub fn new(backend: P) -> Self {
        Self::with_policy(backend, RetryPolicy::default(), DEFAULT_PROVER_TIMEOUT)
    }

    pub fn with_policy(backend: P, retry: RetryPolicy, timeout: Duration) -> Self {
        Self {
            backend,
            mode: BackendMode::Live,
            retry,
            timeout,
        }
    }

    pub fn mode(&self) -> BackendMode {
        self.mode
    }

    pub fn is_simulated(&self) -> bool {
        self.mode == BackendMode::Simulated
    }

    pub fn backend(&self) -> &P {
        &self.backend
    }

    async fn call<T, F, Fut>(&self, operation: &'static str, mut call: F) -> Result<T, ThresholdError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProverError>>,
    {
        let timeout = self.timeout;
        retry(&self.retry, operation, move || {
            with_deadline(timeout, call(), || ProverError::Timeout)
        })
        .await
        .map_err(|e| ThresholdError::from_retry(operation, e))
    }

    /// Local checks shared by `prove` and its callers: both inputs fit the
    /// circuit field and the predicate holds. Touches no collaborator.
    pub fn validate(&self, secret_value: U256, public_threshold: U256) -> Result<(), ThresholdError> {
        if !fits_field(secret_value) {
            return Err(ThresholdError::ValueOutOfRange {
                input: "secret value",
            });
        }
        if !fits_field(public_threshold) {
            return Err(ThresholdError::ValueOutOfRange { input: "threshold" });
        }
        if secret_value < public_threshold {
            return Err(ThresholdError::PredicateFalse {
                threshold: public_threshold,
            });
        }
        Ok(())
    }

    /// Prove that `secret_value >= public_threshold`.
    ///
    /// A false predicate is refused before the backend is called.
    pub async fn prove(
        &self,
        secret_value: U256,
        public_threshold: U256,
    ) -> Result<ThresholdProof, ThresholdError> {
        self.validate(secret_value, public_threshold)?;

        let inputs = ThresholdCircuitInputs {
            secret_value,
            public_threshold,
        };
        let inputs = &inputs;
        let witness = self
            .call("execute", move || self.backend.execute(inputs))
            .await?;
        debug!(threshold = %public_threshold, "threshold witness solved");

        let witness = &witness;
        let proof_bytes = self
            .call("generate_proof", move || self.backend.generate_proof(witness))
            .await?;

        info!(
            threshold = %public_threshold,
            mode = %self.mode,
            proof_len = proof_bytes.len(),
            "threshold proof generated"
        );
        Ok(ThresholdProof {
            proof_bytes,
            public_threshold,
            predicate_holds: true,
            generated_at: Utc::now(),
            mode: self.mode,
        })
    }

    /// Check a proof against its public threshold. Never needs the secret value.
    ///
    /// Proofs from a different backend mode are rejected without calling the backend.
    pub async fn verify(&self, proof: &ThresholdProof) -> Result<bool, ThresholdError> {
        if proof.mode != self.mode {
            warn!(proof_mode = %proof.mode, verifier_mode = %self.mode, "proof mode mismatch");
            return Ok(false);
        }
        if !proof.predicate_holds || !fits_field(proof.public_threshold) {
            return Ok(false);
        }

        let public_inputs = proof.public_inputs();
        let public_inputs = &public_inputs;
        let valid = self
            .call("verify_proof", move || {
                self.backend.verify_proof(&proof.proof_bytes, public_inputs)
            })
            .await?;
        debug!(threshold = %proof.public_threshold, valid, "threshold proof checked");
        Ok(valid)
    }
}

#[cfg(any(test, feature = "simulation"))]
impl ThresholdProver<SimulatedBackend> {
    /// Prover backed by the plain-Rust stand-in. Proofs are tagged `Simulated`.
    pub fn simulated() -> Self {
        Self {
            backend: SimulatedBackend,
            mode: BackendMode::Simulated,
            retry: RetryPolicy::default(),
            timeout: DEFAULT_PROVER_TIMEOUT,
        }
    }
}
