//! Tracker Validate CLI
//!
//! Preheats the metadata a tracker bundle references from a directory of
//! JSON exports, then runs the validation hook chain over the bundle.

use std::path::PathBuf;

use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use clap::{Parser, ValueEnum};
use dhis_preheat::config::ReportFormat;
use dhis_preheat::{
    ImportConfig, InMemoryObjectStore, ObjectStore, ObjectType, PreheatIdentifier, PreheatService,
    TrackerBundle, TrackerValidator, ValidationContext,
};
use std::collections::BTreeSet;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tracker-validate")]
#[command(about = "Validate a tracker bundle against preheated metadata")]
struct Cli {
    /// Tracker bundle (JSON)
    bundle: PathBuf,

    /// Configuration file layered over the default locations
    #[arg(short, long)]
    config: Option<String>,

    /// Directory of metadata exports (overrides the configured one)
    #[arg(short, long)]
    metadata: Option<PathBuf>,

    /// UID of the importing user
    #[arg(short, long)]
    user: Option<String>,

    /// Identifier scheme for metadata keys in the bundle (UID, CODE, AUTO)
    #[arg(short, long)]
    identifier: Option<String>,

    /// Report format
    #[arg(short, long, value_enum)]
    format: Option<Format>,

    /// Reference time for expiry checks (RFC 3339)
    #[arg(long)]
    now: Option<DateTime<Utc>>,

    /// Print the bundle with removed entities pruned instead of the report
    #[arg(long)]
    prune: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Json,
}

impl From<Format> for ReportFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Text => ReportFormat::Text,
            Format::Json => ReportFormat::Json,
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(2);
        }
    }
}

/// Returns whether the bundle passed validation
fn run(cli: Cli) -> anyhow::Result<bool> {
    let config = ImportConfig::load_from(cli.config.as_deref())
        .context("failed to load configuration")?;

    let metadata_dir = cli.metadata.clone().unwrap_or_else(|| config.metadata_dir());
    let store = InMemoryObjectStore::from_directory(&metadata_dir)
        .with_context(|| format!("failed to load metadata from {}", metadata_dir.display()))?;
    info!(objects = store.len(), dir = %metadata_dir.display(), "metadata loaded");

    let content = std::fs::read_to_string(&cli.bundle)
        .with_context(|| format!("failed to read {}", cli.bundle.display()))?;
    let mut bundle: TrackerBundle = serde_json::from_str(&content)
        .with_context(|| format!("invalid tracker bundle {}", cli.bundle.display()))?;

    if let Some(identifier) = &cli.identifier {
        bundle.identifier = identifier.parse::<PreheatIdentifier>()?;
    } else if bundle.identifier == PreheatIdentifier::default() {
        bundle.identifier = config.preheat.identifier;
    }

    let mut params = bundle.preheat_params();
    if let Some(uid) = &cli.user {
        let uids = BTreeSet::from([uid.clone()]);
        let Some(user) = store.fetch_by_uid(ObjectType::User, &uids)?.into_iter().next() else {
            bail!("user {} not found in metadata", uid);
        };
        params = params.with_user(user);
    }

    let service = PreheatService::new(&store);
    let preheat = service.preheat(params)?;

    let validator = TrackerValidator::from_config(&config.validation);
    let mut ctx = ValidationContext::new(&bundle, &preheat)
        .with_expiry_bypass_authority(config.validation.expiry_bypass_authority.as_str());
    if let Some(now) = cli.now {
        ctx = ctx.with_now(now);
    }
    let result = validator.validate(&mut ctx);

    if cli.prune {
        let mut pruned = bundle.clone();
        let removed = pruned.prune(&result.removed);
        info!(removed, "pruned bundle");
        println!("{}", serde_json::to_string_pretty(&pruned)?);
        return Ok(!result.has_errors());
    }

    let format = cli.format.map(ReportFormat::from).unwrap_or(config.report.format);
    match format {
        ReportFormat::Text => {
            if result.reporter.is_empty() {
                println!("✅ {} entities valid", bundle.len());
            } else {
                print!("{}", result.reporter.format_all());
                if !result.removed.is_empty() {
                    println!("{} entities removed", result.removed.len());
                }
            }
        }
        ReportFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
    }

    Ok(!result.has_errors())
}
