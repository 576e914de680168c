use std::future::Future;

use alloy_primitives::Bytes;

use crate::domain::proof::{ThresholdCircuitInputs, ThresholdPublicInputs, Witness};
use crate::retry::Transient;

/// Port for the proving backend that runs the threshold circuit.
///
/// Stateless per call. Implementations:
/// - `BBProver` (shells out to `nargo execute` + `bb prove` / `bb verify`)
/// - `SimulatedBackend` (simulation builds only)
pub trait ProvingBackend: Send + Sync {
    /// Execute the circuit on the inputs to produce a solved witness.
    fn execute(
        &self,
        inputs: &ThresholdCircuitInputs,
    ) -> impl Future<Output = Result<Witness, ProverError>> + Send;

    /// Generate proof bytes from a solved witness.
    fn generate_proof(
        &self,
        witness: &Witness,
    ) -> impl Future<Output = Result<Bytes, ProverError>> + Send;

    /// Check proof bytes against the public inputs alone.
    fn verify_proof(
        &self,
        proof: &[u8],
        public_inputs: &ThresholdPublicInputs,
    ) -> impl Future<Output = Result<bool, ProverError>> + Send;
}

#[derive(Debug, thiserror::Error)]
pub enum ProverError {
    #[error("proof generation failed: {0}")]
    ProofFailed(String),

    #[error("witness generation failed: {0}")]
    WitnessError(String),

    #[error("witness serialization error: {0}")]
    WitnessSerialization(String),

    #[error("prover binary not found: {0}")]
    BinaryNotFound(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("verification failed to run: {0}")]
    VerificationError(String),

    #[error("proving backend timed out")]
    Timeout,
}

impl Transient for ProverError {
    fn is_transient(&self) -> bool {
        match self {
            ProverError::Timeout => true,
            ProverError::IoError(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::WouldBlock
            ),
            _ => false,
        }
    }
}
