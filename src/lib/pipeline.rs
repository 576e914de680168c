//! Access Pipeline
//!
//! Start -> EnsureRootIdentity -> EnsureOrCreateContext -> (Bind || Prove) -> Package
//! -> [Revoke] -> Done
//!
//! Bind and Prove run concurrently. A failure stops the run where it happened;
//! earlier steps are not rolled back.

use std::fmt;

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::binder::{BindError, CommitmentBinder};
use crate::config::PipelineConfig;
use crate::domain::commitment::{EncryptedCommitment, ThresholdEvidence};
use crate::domain::identity::{ContextCategory, ContextIdentity, OwnerKey, PrivacyLevel, RootIdentity};
use crate::domain::outcome::{Outcome, RevokeOutcome};
use crate::domain::proof::ThresholdProof;
use crate::error::ErrorClass;
use crate::ports::ledger::LedgerPort;
use crate::ports::oracle::CipherOracle;
use crate::ports::prover::ProvingBackend;
use crate::registry::{IdentityRegistry, RegistryError};
use crate::threshold::{ThresholdError, ThresholdProver};

/// Where in the pipeline (or which standalone operation) a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Start,
    EnsureRootIdentity,
    EnsureOrCreateContext,
    Bind,
    Prove,
    Package,
    Revoke,
    Done,
    CheckSpendingLimit,
    RecordCommitment,
    UpdatePrivacyLevel,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::Start => "start",
            PipelineStage::EnsureRootIdentity => "ensure_root_identity",
            PipelineStage::EnsureOrCreateContext => "ensure_or_create_context",
            PipelineStage::Bind => "bind",
            PipelineStage::Prove => "prove",
            PipelineStage::Package => "package",
            PipelineStage::Revoke => "revoke",
            PipelineStage::Done => "done",
            PipelineStage::CheckSpendingLimit => "check_spending_limit",
            PipelineStage::RecordCommitment => "record_commitment",
            PipelineStage::UpdatePrivacyLevel => "update_privacy_level",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PipelineError {
    #[error("{stage}: {source}")]
    Registry {
        stage: PipelineStage,
        source: RegistryError,
    },

    #[error("bind: {0}")]
    Bind(#[from] BindError),

    #[error("prove: {0}")]
    Threshold(#[from] ThresholdError),
}

impl PipelineError {
    pub fn class(&self) -> ErrorClass {
        match self {
            PipelineError::Registry { source, .. } => source.class(),
            PipelineError::Bind(e) => e.class(),
            PipelineError::Threshold(e) => e.class(),
        }
    }

    pub fn stage(&self) -> PipelineStage {
        match self {
            PipelineError::Registry { stage, .. } => *stage,
            PipelineError::Bind(_) => PipelineStage::Bind,
            PipelineError::Threshold(_) => PipelineStage::Prove,
        }
    }
}

fn at(stage: PipelineStage) -> impl FnOnce(RegistryError) -> PipelineError {
    move |source| PipelineError::Registry { stage, source }
}

/// Which context a run uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContextSelector {
    /// Create the next context under the root.
    Create {
        category: ContextCategory,
        max_per_operation: Option<u64>,
    },
    /// Reuse an existing, unrevoked context.
    Reuse { index: u64 },
}

/// One end-to-end run of the pipeline.
#[derive(Debug, Clone)]
pub struct AccessRequest {
    pub owner: OwnerKey,
    /// Used only if the root identity does not exist yet
    pub privacy_level: PrivacyLevel,
    pub context: ContextSelector,
    pub secret_value: U256,
    pub threshold: U256,
    /// `None` defers to [`revokes_after_use`].
    pub revoke_after_use: Option<bool>,
}

/// Default revocation rule when the caller does not choose: burn temporary
/// contexts, and every context of a maximum-privacy root.
pub fn revokes_after_use(category: ContextCategory, privacy_level: PrivacyLevel) -> bool {
    category == ContextCategory::Temporary || privacy_level == PrivacyLevel::Maximum
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessReport {
    pub root: Outcome<RootIdentity>,
    /// The context as used for binding (before any revocation)
    pub context: ContextIdentity,
    pub evidence: ThresholdEvidence,
    pub revocation: Option<RevokeOutcome>,
}

pub struct AccessPipeline<L, O, P> {
    registry: IdentityRegistry<L>,
    binder: CommitmentBinder<O>,
    prover: ThresholdProver<P>,
}

impl<L, O, P> AccessPipeline<L, O, P>
where
    L: LedgerPort,
    O: CipherOracle,
    P: ProvingBackend,
{
    pub fn new(
        registry: IdentityRegistry<L>,
        binder: CommitmentBinder<O>,
        prover: ThresholdProver<P>,
    ) -> Self {
        Self {
            registry,
            binder,
            prover,
        }
    }

    /// Live pipeline with retry and deadlines taken from `config`.
    pub fn from_config(ledger: L, oracle: O, backend: P, config: &PipelineConfig) -> Self {
        Self::new(
            IdentityRegistry::with_policy(ledger, config.retry.clone(), config.timeouts.ledger),
            CommitmentBinder::with_policy(oracle, config.retry.clone(), config.timeouts.oracle),
            ThresholdProver::with_policy(backend, config.retry.clone(), config.timeouts.prover),
        )
    }

    pub fn registry(&self) -> &IdentityRegistry<L> {
        &self.registry
    }

    pub fn binder(&self) -> &CommitmentBinder<O> {
        &self.binder
    }

    pub fn prover(&self) -> &ThresholdProver<P> {
        &self.prover
    }

    /// Whether either cryptographic component runs its stand-in.
    pub fn is_simulated(&self) -> bool {
        self.binder.is_simulated() || self.prover.is_simulated()
    }

    pub async fn create_root_identity(
        &self,
        owner: OwnerKey,
        privacy_level: PrivacyLevel,
    ) -> Result<Outcome<RootIdentity>, PipelineError> {
        self.registry
            .create_root(owner, privacy_level)
            .await
            .map_err(at(PipelineStage::EnsureRootIdentity))
    }

    pub async fn create_context(
        &self,
        root: &RootIdentity,
        category: ContextCategory,
        max_per_operation: Option<u64>,
    ) -> Result<Outcome<ContextIdentity>, PipelineError> {
        self.registry
            .create_context(root, category, max_per_operation)
            .await
            .map_err(at(PipelineStage::EnsureOrCreateContext))
    }

    pub async fn revoke_context(
        &self,
        context: &ContextIdentity,
    ) -> Result<RevokeOutcome, PipelineError> {
        self.registry
            .revoke(context)
            .await
            .map_err(at(PipelineStage::Revoke))
    }

    /// Bind `secret_value` to `context` and prove it meets `threshold`.
    ///
    /// Inputs are validated before any collaborator is contacted. The context is
    /// then re-read so that a revocation made elsewhere is honored.
    pub async fn generate_threshold_evidence(
        &self,
        secret_value: U256,
        threshold: U256,
        context: &ContextIdentity,
    ) -> Result<ThresholdEvidence, PipelineError> {
        self.prover.validate(secret_value, threshold)?;

        let context = self
            .registry
            .current(context)
            .await
            .map_err(at(PipelineStage::Bind))?;
        if context.revoked {
            return Err(PipelineError::Registry {
                stage: PipelineStage::Bind,
                source: RegistryError::ContextRevoked(context.address),
            });
        }

        debug!(stage = %PipelineStage::Bind, context = %context.address, "binding and proving");
        let (commitment, proof) = tokio::try_join!(
            async {
                self.binder
                    .bind(secret_value, &context)
                    .await
                    .map_err(PipelineError::from)
            },
            async {
                self.prover
                    .prove(secret_value, threshold)
                    .await
                    .map_err(PipelineError::from)
            },
        )?;

        debug!(stage = %PipelineStage::Package, commitment = %commitment.commitment, "evidence packaged");
        Ok(ThresholdEvidence {
            commitment,
            proof,
            context_address: context.address,
        })
    }

    /// Check a commitment and proof presented for `context`.
    ///
    /// `false` means the evidence is not valid for this context: the commitment is
    /// bound elsewhere, it was produced in a different mode, or the proof fails.
    /// Collaborator failures are errors, never `false`.
    pub async fn verify_threshold_evidence(
        &self,
        commitment: &EncryptedCommitment,
        proof: &ThresholdProof,
        context: &ContextIdentity,
    ) -> Result<bool, PipelineError> {
        if !commitment.is_bound_to(context.address) {
            debug!(
                bound = %commitment.bound_context_address,
                presented = %context.address,
                "commitment bound to a different context"
            );
            return Ok(false);
        }
        if commitment.mode != self.binder.mode() {
            debug!(commitment_mode = %commitment.mode, "commitment mode mismatch");
            return Ok(false);
        }
        Ok(self.prover.verify(proof).await?)
    }

    /// [`Self::verify_threshold_evidence`] for a packaged evidence bundle.
    pub async fn verify_evidence(
        &self,
        evidence: &ThresholdEvidence,
        context: &ContextIdentity,
    ) -> Result<bool, PipelineError> {
        if evidence.context_address != context.address {
            return Ok(false);
        }
        self.verify_threshold_evidence(&evidence.commitment, &evidence.proof, context)
            .await
    }

    pub async fn check_spending_limit(
        &self,
        context: &ContextIdentity,
        amount: u64,
    ) -> Result<(), PipelineError> {
        self.registry
            .check_spending_limit(context, amount)
            .await
            .map_err(at(PipelineStage::CheckSpendingLimit))
    }

    pub async fn record_commitment(
        &self,
        context: &ContextIdentity,
        amount: u64,
    ) -> Result<ContextIdentity, PipelineError> {
        self.registry
            .record_commitment(context, amount)
            .await
            .map_err(at(PipelineStage::RecordCommitment))
    }

    pub async fn update_privacy_level(
        &self,
        owner: OwnerKey,
        level: PrivacyLevel,
    ) -> Result<RootIdentity, PipelineError> {
        self.registry
            .update_privacy_level(owner, level)
            .await
            .map_err(at(PipelineStage::UpdatePrivacyLevel))
    }

    /// Run the whole state machine for one request.
    pub async fn run(&self, request: AccessRequest) -> Result<AccessReport, PipelineError> {
        debug!(stage = %PipelineStage::Start, "access pipeline started");

        let root = self
            .create_root_identity(request.owner, request.privacy_level)
            .await?;
        debug!(stage = %PipelineStage::EnsureRootIdentity, root = %root.get().address, created = root.is_created());

        let context = match request.context {
            ContextSelector::Create {
                category,
                max_per_operation,
            } => self
                .create_context(root.get(), category, max_per_operation)
                .await?
                .into_inner(),
            ContextSelector::Reuse { index } => self
                .registry
                .context(root.get(), index)
                .await
                .map_err(at(PipelineStage::EnsureOrCreateContext))?,
        };
        debug!(stage = %PipelineStage::EnsureOrCreateContext, context = %context.address, index = context.index);

        let evidence = self
            .generate_threshold_evidence(request.secret_value, request.threshold, &context)
            .await?;

        let revoke = request
            .revoke_after_use
            .unwrap_or_else(|| revokes_after_use(context.category, root.get().privacy_level));
        let revocation = if revoke {
            Some(self.revoke_context(&context).await?)
        } else {
            None
        };

        info!(
            stage = %PipelineStage::Done,
            context = %context.address,
            threshold = %request.threshold,
            revoked = revocation.is_some(),
            simulated = self.is_simulated(),
            "access pipeline finished"
        );
        Ok(AccessReport {
            root,
            context,
            evidence,
            revocation,
        })
    }
}
