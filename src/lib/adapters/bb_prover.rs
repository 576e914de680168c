use std::path::{Path, PathBuf};
use std::process::Output;

use alloy_primitives::{B256, Bytes, U256};
use serde::Serialize;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::debug;

use crate::domain::proof::{ThresholdCircuitInputs, ThresholdPublicInputs, Witness};
use crate::ports::prover::{ProverError, ProvingBackend};

/// Circuit package name (must match `circuits/threshold/Nargo.toml`).
const CIRCUIT_NAME: &str = "threshold";

/// Markers `bb verify` prints when the proof itself is rejected. Any other
/// non-zero exit is a tool failure, not a verdict.
const REJECTION_MARKERS: &[&str] = &["verified: 0", "verification failed", "proof is invalid"];

/// Whether a failed `bb verify` run rejected the proof, as opposed to failing to run.
fn is_proof_rejection(output: &Output) -> bool {
    let stdout = String::from_utf8_lossy(&output.stdout).to_lowercase();
    let stderr = String::from_utf8_lossy(&output.stderr).to_lowercase();
    output.status.code().is_some()
        && REJECTION_MARKERS
            .iter()
            .any(|marker| stdout.contains(marker) || stderr.contains(marker))
}

/// Format a value as a hex string for Noir (`0x…`).
fn format_field(value: &U256) -> String {
    format!("{}", B256::from(*value))
}

/// TOML-serializable input for the threshold circuit.
///
/// Field names **must** match the Noir circuit parameter names exactly.
#[derive(Serialize)]
struct ThresholdProverInput {
    secret_value: String,
    threshold: String,
}

impl From<&ThresholdCircuitInputs> for ThresholdProverInput {
    fn from(inputs: &ThresholdCircuitInputs) -> Self {
        Self {
            secret_value: format_field(&inputs.secret_value),
            threshold: format_field(&inputs.public_threshold),
        }
    }
}

/// BBProver runs the threshold circuit by shelling out to nargo and bb (Barretenberg CLI).
///
/// - `execute`: writes Prover.toml, runs `nargo execute`, reads the witness
/// - `generate_proof`: writes the witness back, runs `bb prove`, reads the proof
/// - `verify_proof`: writes proof + public inputs, runs `bb verify`. The
///   verification key is derived from the circuit when none is on disk, so a
///   fresh instance can verify without having proven anything.
///
/// Runs share the circuit's `target/` directory, so they are serialized.
pub struct BBProver {
    /// Path to the circuits directory (containing `threshold/`)
    circuits_dir: PathBuf,
    workdir: Mutex<()>,
}

impl BBProver {
    pub fn new(circuits_dir: PathBuf) -> Self {
        Self {
            circuits_dir,
            workdir: Mutex::new(()),
        }
    }

    fn format_prover_toml(inputs: &ThresholdCircuitInputs) -> Result<String, ProverError> {
        toml::to_string(&ThresholdProverInput::from(inputs))
            .map_err(|e| ProverError::WitnessSerialization(e.to_string()))
    }

    fn circuit_dir(&self) -> Result<PathBuf, ProverError> {
        let circuit_dir = self.circuits_dir.join(CIRCUIT_NAME);
        if !circuit_dir.exists() {
            return Err(ProverError::IoError(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("Circuit directory not found: {}", circuit_dir.display()),
            )));
        }
        Ok(circuit_dir)
    }

    /// Make sure `target/vk` exists, compiling the circuit and running
    /// `bb write_vk` as needed. Caller holds the workdir lock.
    async fn ensure_verification_key(circuit_dir: &Path) -> Result<(), ProverError> {
        if circuit_dir.join("target/vk").exists() {
            return Ok(());
        }

        let bytecode = format!("target/{CIRCUIT_NAME}.json");
        if !circuit_dir.join(&bytecode).exists() {
            let output = Self::run("nargo", &["compile"], circuit_dir).await?;
            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                return Err(ProverError::VerificationError(format!(
                    "nargo compile failed: {stderr}"
                )));
            }
        }

        let output = Self::run(
            "bb",
            &[
                "write_vk",
                "-b",
                &bytecode,
                "--oracle_hash",
                "keccak",
                "-o",
                "target/",
            ],
            circuit_dir,
        )
        .await?;
        if !output.status.success() || !circuit_dir.join("target/vk").exists() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProverError::VerificationError(format!(
                "bb write_vk failed: {stderr}"
            )));
        }
        debug!(dir = %circuit_dir.display(), "verification key derived from circuit");
        Ok(())
    }

    /// Run a toolchain binary in `dir`, mapping a missing binary to `BinaryNotFound`.
    async fn run(program: &str, args: &[&str], dir: &Path) -> Result<Output, ProverError> {
        debug!(program, ?args, "running prover toolchain");
        Command::new(program)
            .args(args)
            .current_dir(dir)
            .output()
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => ProverError::BinaryNotFound(program.to_string()),
                _ => ProverError::IoError(e),
            })
    }
}

impl ProvingBackend for BBProver {
    async fn execute(&self, inputs: &ThresholdCircuitInputs) -> Result<Witness, ProverError> {
        let circuit_dir = self.circuit_dir()?;
        let prover_toml = Self::format_prover_toml(inputs)?;
        let _guard = self.workdir.lock().await;

        tokio::fs::write(circuit_dir.join("Prover.toml"), prover_toml).await?;

        let output = Self::run("nargo", &["execute", "witness"], &circuit_dir).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProverError::WitnessError(format!(
                "nargo execute failed: {stderr}"
            )));
        }

        let bytes = tokio::fs::read(circuit_dir.join("target/witness.gz")).await?;
        Ok(Witness {
            bytes: Bytes::from(bytes),
            public_inputs: inputs.public_inputs(),
        })
    }

    async fn generate_proof(&self, witness: &Witness) -> Result<Bytes, ProverError> {
        let circuit_dir = self.circuit_dir()?;
        let _guard = self.workdir.lock().await;

        tokio::fs::create_dir_all(circuit_dir.join("target")).await?;
        tokio::fs::write(circuit_dir.join("target/witness.gz"), &witness.bytes).await?;

        let bytecode = format!("target/{CIRCUIT_NAME}.json");
        let output = Self::run(
            "bb",
            &[
                "prove",
                "-b",
                &bytecode,
                "-w",
                "target/witness.gz",
                "--write_vk",
                "--oracle_hash",
                "keccak",
                "-o",
                "target/",
            ],
            &circuit_dir,
        )
        .await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProverError::ProofFailed(format!("bb prove failed: {stderr}")));
        }

        let proof = tokio::fs::read(circuit_dir.join("target/proof")).await?;
        Ok(Bytes::from(proof))
    }

    async fn verify_proof(
        &self,
        proof: &[u8],
        public_inputs: &ThresholdPublicInputs,
    ) -> Result<bool, ProverError> {
        let circuit_dir = self.circuit_dir()?;
        let _guard = self.workdir.lock().await;

        Self::ensure_verification_key(&circuit_dir).await?;
        tokio::fs::write(circuit_dir.join("target/verify_proof"), proof).await?;
        tokio::fs::write(
            circuit_dir.join("target/verify_public_inputs"),
            public_inputs.to_bytes(),
        )
        .await?;

        let output = Self::run(
            "bb",
            &[
                "verify",
                "-k",
                "target/vk",
                "-p",
                "target/verify_proof",
                "-i",
                "target/verify_public_inputs",
                "--oracle_hash",
                "keccak",
            ],
            &circuit_dir,
        )
        .await?;

        if output.status.success() {
            return Ok(true);
        }
        if is_proof_rejection(&output) {
            debug!(
                stderr = %String::from_utf8_lossy(&output.stderr),
                "bb verify rejected proof"
            );
            return Ok(false);
        }
        Err(ProverError::VerificationError(format!(
            "bb verify failed ({}): {}",
            output.status,
            String::from_utf8_lossy(&output.stderr)
        )))
    }
}
