//! offset-verify - batch runner for the carbon-offset verification engine

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use offset_claims::TrustScoreTable;
use offset_registry::{RegistryClient, RegistryRecord, StaticRegistry};
use offset_verifier::anti_gaming::{EmissionsSource, InMemoryEmissions};
use offset_verifier::{
    ClaimIntake, ClaimResult, ClaimSubmission, Rejection, VerificationService, VerifierConfig,
};

/// Carbon-offset claim verification engine
#[derive(Parser, Debug)]
#[command(name = "offset-verify")]
#[command(about = "Verify carbon-offset claims: trust scoring, limits, anti-gaming and audits")]
struct Args {
    /// Path to a YAML configuration file
    #[arg(long, short, env = "OFFSET_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a JSON array of claim submissions through the engine
    Process {
        /// Claims file
        claims: PathBuf,

        /// JSON map of registry id to registry record, used instead of live registries
        #[arg(long, env = "OFFSET_REGISTRY_FIXTURE")]
        registry_fixture: Option<PathBuf>,

        /// JSON array of emissions entries for the ratio check
        #[arg(long, env = "OFFSET_EMISSIONS_FIXTURE")]
        emissions_fixture: Option<PathBuf>,
    },
    /// Process a batch, then run one random-audit sampling pass over it
    Sample {
        /// Claims file
        claims: PathBuf,

        /// JSON map of registry id to registry record, used instead of live registries
        #[arg(long, env = "OFFSET_REGISTRY_FIXTURE")]
        registry_fixture: Option<PathBuf>,

        /// JSON array of emissions entries for the ratio check
        #[arg(long, env = "OFFSET_EMISSIONS_FIXTURE")]
        emissions_fixture: Option<PathBuf>,

        /// Sampling seed, overrides audit.sampling_seed
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Print the trust weights for a verification tier
    Trust {
        /// Tier name (self_reported, certified_project)
        tier: String,
    },
    /// Print the effective configuration as YAML
    Config,
}

/// Emissions activity for one submitter and year; entries are summed.
#[derive(Debug, Deserialize)]
struct EmissionsEntry {
    submitter_ref: String,
    year: i32,
    kg: f64,
}

/// Claim batch and the fixtures that stand in for external sources.
struct BatchInput<'a> {
    claims: &'a Path,
    registry_fixture: Option<&'a Path>,
    emissions_fixture: Option<&'a Path>,
}

/// One line of batch output.
#[derive(Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
enum BatchEntry {
    Accepted(ClaimResult),
    Rejected {
        index: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        claim_id: Option<String>,
        rejection: Rejection,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    // Logs go to stderr so stdout stays valid JSON
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("offset_verify={0},offset_verifier={0},offset_registry={0},warn", args.log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = match &args.config {
        Some(path) => VerifierConfig::from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => VerifierConfig::default(),
    };

    match args.command {
        Command::Config => {
            print!("{}", config.to_yaml()?);
        }
        Command::Trust { tier } => {
            let weights = TrustScoreTable::lookup_name(&tier)?;
            println!("{}", serde_json::to_string_pretty(&weights)?);
        }
        Command::Process {
            claims,
            registry_fixture,
            emissions_fixture,
        } => {
            let input = BatchInput {
                claims: &claims,
                registry_fixture: registry_fixture.as_deref(),
                emissions_fixture: emissions_fixture.as_deref(),
            };
            let (_, entries) = run_batch(config, input).await?;
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
        Command::Sample {
            claims,
            registry_fixture,
            emissions_fixture,
            seed,
        } => {
            if seed.is_some() {
                config.audit.sampling_seed = seed;
            }
            let input = BatchInput {
                claims: &claims,
                registry_fixture: registry_fixture.as_deref(),
                emissions_fixture: emissions_fixture.as_deref(),
            };
            let (service, _) = run_batch(config, input).await?;
            let report = service.scheduler().run_periodic_sampling().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}

/// Submit every claim in the file and wait for background verification.
async fn run_batch(
    config: VerifierConfig,
    input: BatchInput<'_>,
) -> anyhow::Result<(Arc<VerificationService>, Vec<BatchEntry>)> {
    let raw = std::fs::read_to_string(input.claims)
        .with_context(|| format!("reading claims from {}", input.claims.display()))?;
    let submissions: Vec<ClaimSubmission> =
        serde_json::from_str(&raw).context("claims file must be a JSON array of submissions")?;

    let mut builder = VerificationService::builder().config(config);
    if let Some(path) = input.registry_fixture {
        builder = builder.registry_client(load_fixture(path)?);
    }
    if let Some(path) = input.emissions_fixture {
        builder = builder.emissions(load_emissions(path)?);
    }
    let service = Arc::new(builder.build()?);

    info!(
        verifier_id = %service.config().general.verifier_id,
        environment = %service.config().general.environment,
        claims = submissions.len(),
        "Processing claim batch"
    );

    let intake = ClaimIntake::start(Arc::clone(&service));
    let mut entries = Vec::with_capacity(submissions.len());
    let mut accepted = Vec::new();

    for (index, submission) in submissions.into_iter().enumerate() {
        let claim_id = submission.claim_id.clone();
        match intake.submit_claim(submission).await {
            Ok(result) => {
                accepted.push(entries.len());
                entries.push(BatchEntry::Accepted(result));
            }
            Err(e) => {
                if e.is_recoverable() {
                    warn!(index, error = %e, "Claim rejected");
                } else {
                    error!(index, error = %e, "Claim failed");
                }
                entries.push(BatchEntry::Rejected {
                    index,
                    claim_id,
                    rejection: e.rejection(),
                });
            }
        }
    }

    intake.shutdown().await;

    // Background verification may have moved queued claims on.
    for position in accepted {
        if let BatchEntry::Accepted(result) = &mut entries[position] {
            if let Some(latest) = service
                .store()
                .get(&result.claim_id)
                .await
                .map(|claim| ClaimResult::from(&claim))
            {
                *result = latest;
            }
        }
    }

    Ok((service, entries))
}

fn load_fixture(path: &Path) -> anyhow::Result<Arc<dyn RegistryClient>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading registry fixture {}", path.display()))?;
    let records: HashMap<String, RegistryRecord> =
        serde_json::from_str(&raw).context("registry fixture must map registry ids to records")?;
    info!(records = records.len(), "Using registry fixture");
    Ok(Arc::new(StaticRegistry::from_records(records)))
}

fn load_emissions(path: &Path) -> anyhow::Result<Arc<dyn EmissionsSource>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading emissions fixture {}", path.display()))?;
    let entries: Vec<EmissionsEntry> =
        serde_json::from_str(&raw).context("emissions fixture must be a JSON array of entries")?;

    let emissions = InMemoryEmissions::new();
    for entry in &entries {
        emissions.record(entry.submitter_ref.as_str(), entry.year, entry.kg);
    }
    info!(entries = entries.len(), "Using emissions fixture");
    Ok(Arc::new(emissions))
}
