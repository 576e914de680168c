//! Non-cryptographic stand-ins for the oracle and proving backend.
//!
//! Compiled only for tests and the `simulation` feature. Components built on
//! these are tagged `BackendMode::Simulated` and report `is_simulated() == true`.

use alloy_primitives::Bytes;
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::domain::proof::{ThresholdCircuitInputs, ThresholdPublicInputs, Witness};
use crate::ports::oracle::{CipherOracle, EncryptRequest, OracleError};
use crate::ports::prover::{ProverError, ProvingBackend};

/// Prefix carried by every simulated proof.
pub const SIMULATED_PROOF_TAG: &[u8] = b"SIMULATED";

/// Oracle placeholder for simulated binders. Simulated binders never call it.
#[derive(Debug, Default, Clone, Copy)]
pub struct SimulatedOracle;

impl CipherOracle for SimulatedOracle {
    async fn public_key(&self) -> Result<Bytes, OracleError> {
        Err(OracleError::Unavailable("simulated oracle holds no key".into()))
    }

    async fn encrypt(&self, _request: &EncryptRequest) -> Result<Bytes, OracleError> {
        Err(OracleError::Unavailable("simulated oracle cannot encrypt".into()))
    }
}

/// Checks the predicate in plain Rust and emits a tagged digest instead of a proof.
#[derive(Debug, Default, Clone, Copy)]
pub struct SimulatedBackend;

impl SimulatedBackend {
    fn proof_for(public_inputs: &ThresholdPublicInputs) -> Vec<u8> {
        let digest = Sha256::new()
            .chain_update(SIMULATED_PROOF_TAG)
            .chain_update(public_inputs.to_bytes())
            .finalize();
        [SIMULATED_PROOF_TAG, digest.as_slice()].concat()
    }
}

impl ProvingBackend for SimulatedBackend {
    async fn execute(&self, inputs: &ThresholdCircuitInputs) -> Result<Witness, ProverError> {
        if inputs.secret_value < inputs.public_threshold {
            return Err(ProverError::WitnessError(
                "constraint failed: secret value below threshold".into(),
            ));
        }
        Ok(Witness {
            bytes: Bytes::from_static(SIMULATED_PROOF_TAG),
            public_inputs: inputs.public_inputs(),
        })
    }

    async fn generate_proof(&self, witness: &Witness) -> Result<Bytes, ProverError> {
        warn!("generating simulated threshold proof");
        Ok(Bytes::from(Self::proof_for(&witness.public_inputs)))
    }

    async fn verify_proof(
        &self,
        proof: &[u8],
        public_inputs: &ThresholdPublicInputs,
    ) -> Result<bool, ProverError> {
        Ok(proof == Self::proof_for(public_inputs).as_slice())
    }
}

/// Stand-in ciphertext: a digest of the nonce and plaintext, never the plaintext itself.
pub fn simulated_ciphertext(nonce: &[u8], plaintext: &[u8]) -> Bytes {
    let digest = Sha256::new()
        .chain_update(SIMULATED_PROOF_TAG)
        .chain_update(nonce)
        .chain_update(plaintext)
        .finalize();
    Bytes::copy_from_slice(digest.as_slice())
}
