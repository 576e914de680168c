//! Context identities with bound commitments and private threshold proofs.
//!
//! A root identity per owner derives disposable context identities by index.
//! A secret value is encrypted for an oracle and committed to exactly one
//! context address, and a threshold proof shows the value meets a public bound
//! without revealing it.

pub mod adapters;
pub mod binder;
pub mod config;
pub mod crypto;
pub mod domain;
pub mod error;
pub mod pipeline;
pub mod ports;
pub mod registry;
pub mod retry;
pub mod threshold;

pub use binder::{BindError, CommitmentBinder};
pub use config::{ConfigError, PipelineConfig};
pub use error::ErrorClass;
pub use pipeline::{AccessPipeline, AccessReport, AccessRequest, ContextSelector, PipelineError};
pub use registry::{IdentityRegistry, RegistryError};
pub use threshold::{ThresholdError, ThresholdProver};
