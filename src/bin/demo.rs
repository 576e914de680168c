//! Access pipeline demo
//!
//! Creates a root identity, derives a context, binds a secret value to it and
//! proves the value meets a public threshold, then verifies the evidence and
//! shows that it does not transfer to a sibling context.
//!
//! Run with:
//!   cargo run --bin demo -- --value 500000 --threshold 10000
//!   cargo run --bin demo --features simulation -- --config demo.toml
//!
//! Live mode needs `nargo` and `bb` on PATH.

use std::path::PathBuf;

use alloy_primitives::{B256, U256};
use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use prism_identity::adapters::bb_prover::BBProver;
use prism_identity::adapters::local_oracle::LocalCipherOracle;
use prism_identity::adapters::memory_ledger::InMemoryLedger;
use prism_identity::domain::identity::{ContextCategory, OwnerKey, PrivacyLevel};
use prism_identity::domain::proof::BackendMode;
use prism_identity::pipeline::{AccessPipeline, AccessRequest, ContextSelector};
use prism_identity::ports::oracle::CipherOracle;
use prism_identity::ports::prover::ProvingBackend;
use prism_identity::PipelineConfig;

#[derive(clap::Parser)]
#[command(name = "demo", about = "Context identity threshold disclosure demo")]
struct Args {
    /// Path to an optional TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Secret value to disclose a bound for.
    #[arg(long, default_value_t = 500_000)]
    value: u64,

    /// Public threshold the value must meet.
    #[arg(long, default_value_t = 10_000)]
    threshold: u64,

    /// Owner key (32 bytes hex). Random when omitted.
    #[arg(long)]
    owner: Option<B256>,

    /// Burn the context after use.
    #[arg(long)]
    revoke: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => PipelineConfig::default(),
    };

    match config.prover.mode {
        BackendMode::Live => {
            let pipeline = AccessPipeline::from_config(
                InMemoryLedger::new(),
                LocalCipherOracle::generate(),
                BBProver::new(config.prover.circuits_dir.clone()),
                &config,
            );
            run_demo(&pipeline, &args).await
        }
        BackendMode::Simulated => run_simulated(&config, &args).await,
    }
}

#[cfg(feature = "simulation")]
async fn run_simulated(config: &PipelineConfig, args: &Args) -> Result<()> {
    use prism_identity::registry::IdentityRegistry;
    use prism_identity::{CommitmentBinder, ThresholdProver};

    let pipeline = AccessPipeline::new(
        IdentityRegistry::with_policy(
            InMemoryLedger::new(),
            config.retry.clone(),
            config.timeouts.ledger,
        ),
        CommitmentBinder::simulated(),
        ThresholdProver::simulated(),
    );
    run_demo(&pipeline, args).await
}

#[cfg(not(feature = "simulation"))]
async fn run_simulated(_config: &PipelineConfig, _args: &Args) -> Result<()> {
    anyhow::bail!("simulated mode requires building with --features simulation")
}

async fn run_demo<O, P>(
    pipeline: &AccessPipeline<InMemoryLedger, O, P>,
    args: &Args,
) -> Result<()>
where
    O: CipherOracle,
    P: ProvingBackend,
{
    let owner = OwnerKey(
        args.owner
            .unwrap_or_else(|| B256::from(rand::random::<[u8; 32]>())),
    );
    info!(simulated = pipeline.is_simulated(), "pipeline ready");

    let report = pipeline
        .run(AccessRequest {
            owner,
            privacy_level: PrivacyLevel::High,
            context: ContextSelector::Create {
                category: ContextCategory::DeFi,
                max_per_operation: Some(args.value),
            },
            secret_value: U256::from(args.value),
            threshold: U256::from(args.threshold),
            revoke_after_use: Some(args.revoke),
        })
        .await
        .context("access pipeline failed")?;

    println!("{}", serde_json::to_string_pretty(&report.evidence)?);

    let valid = pipeline
        .verify_evidence(&report.evidence, &report.context)
        .await?;
    info!(valid, context = %report.context.address, "evidence checked against its context");

    let sibling = pipeline
        .create_context(report.root.get(), ContextCategory::DeFi, None)
        .await?
        .into_inner();
    let transferred = pipeline
        .verify_evidence(&report.evidence, &sibling)
        .await?;
    info!(
        valid = transferred,
        context = %sibling.address,
        "evidence checked against sibling context"
    );

    anyhow::ensure!(valid && !transferred, "evidence checks did not hold");
    Ok(())
}
