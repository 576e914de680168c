pub mod bb_prover;
pub mod local_oracle;
pub mod memory_ledger;
#[cfg(any(test, feature = "simulation"))]
pub mod simulated;
