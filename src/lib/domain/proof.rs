use std::fmt;

use alloy_primitives::{B256, Bytes, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Whether a component runs real cryptography or the test stand-in.
///
/// Chosen at construction; never inferred from a failed initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendMode {
    #[default]
    Live,
    Simulated,
}

impl fmt::Display for BackendMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendMode::Live => write!(f, "live"),
            BackendMode::Simulated => write!(f, "simulated"),
        }
    }
}

/// Inputs to the threshold circuit: `secret_value` private, `public_threshold` public.
#[derive(Clone, PartialEq, Eq)]
pub struct ThresholdCircuitInputs {
    pub secret_value: U256,
    pub public_threshold: U256,
}

impl ThresholdCircuitInputs {
    pub fn public_inputs(&self) -> ThresholdPublicInputs {
        ThresholdPublicInputs {
            threshold: self.public_threshold,
        }
    }
}

impl fmt::Debug for ThresholdCircuitInputs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThresholdCircuitInputs")
            .field("secret_value", &"<redacted>")
            .field("public_threshold", &self.public_threshold)
            .finish()
    }
}

/// Public inputs of the threshold circuit. This is all a verifier ever sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdPublicInputs {
    pub threshold: U256,
}

impl ThresholdPublicInputs {
    /// Field elements in circuit order (big-endian, 32 bytes each).
    pub fn to_fields(&self) -> Vec<B256> {
        vec![B256::from(self.threshold)]
    }

    /// Concatenated field elements, the on-disk format `bb verify` reads.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_fields()
            .iter()
            .flat_map(|field| field.0)
            .collect()
    }
}

/// Solved witness produced by executing the circuit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Witness {
    /// Backend-specific serialized witness
    pub bytes: Bytes,
    pub public_inputs: ThresholdPublicInputs,
}

/// Zero-knowledge evidence that a private value meets `public_threshold`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdProof {
    pub proof_bytes: Bytes,
    pub public_threshold: U256,
    /// Always true for a packaged proof; false-predicate requests are refused.
    pub predicate_holds: bool,
    pub generated_at: DateTime<Utc>,
    pub mode: BackendMode,
}

impl ThresholdProof {
    pub fn public_inputs(&self) -> ThresholdPublicInputs {
        ThresholdPublicInputs {
            threshold: self.public_threshold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_circuit_inputs_debug_redacts_secret() {
        let inputs = ThresholdCircuitInputs {
            secret_value: U256::from(987_654_321u64),
            public_threshold: U256::from(10_000u64),
        };
        let rendered = format!("{inputs:?}");
        assert!(!rendered.contains("987654321"));
        assert!(rendered.contains("redacted"));
    }

    #[test]
    fn test_public_inputs_byte_layout() {
        let inputs = ThresholdPublicInputs {
            threshold: U256::from(10_000u64),
        };
        let bytes = inputs.to_bytes();
        assert_eq!(bytes.len(), 32);
        assert_eq!(&bytes[30..], &10_000u16.to_be_bytes());
        assert!(bytes[..30].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_backend_mode_defaults_to_live() {
        assert_eq!(BackendMode::default(), BackendMode::Live);
        assert_eq!(BackendMode::Simulated.to_string(), "simulated");
    }
}
