use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use mrdc_core::catalog::{SchemaCatalog, TableDefinition};
use mrdc_core::spec::PipelineSpec;
use mrdc_pipeline::{Orchestrator, unsourced_tables};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "mrdc", about = "Extract, normalize and validate the retail tables")]
struct Args {
    /// Pipeline YAML
    #[arg(short, long, required_unless_present = "print_catalog")]
    pipeline: Option<PathBuf>,
    /// Only run these tables (repeatable)
    #[arg(short, long = "table")]
    tables: Vec<String>,
    /// Bounded channel capacity between a source and its collector
    #[arg(long, default_value_t = 8)]
    channel_capacity: usize,
    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
    /// Print the effective schema catalog as YAML and exit
    #[arg(long)]
    print_catalog: bool,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

fn read_spec(path: &PathBuf) -> Result<PipelineSpec> {
    let y = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    PipelineSpec::from_yaml_str(&y).with_context(|| format!("parsing {}", path.display()))
}

fn print_catalog(spec: Option<&PipelineSpec>) -> Result<()> {
    let overrides = spec.map(|s| s.catalog.clone()).unwrap_or_default();
    let catalog = SchemaCatalog::builtin().with_overrides(overrides)?;
    let tables: Vec<&TableDefinition> = catalog.tables().map(|t| t.as_ref()).collect();
    print!("{}", serde_yaml::to_string(&tables)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.json_logs);

    let spec = args.pipeline.as_ref().map(read_spec).transpose()?;
    if args.print_catalog {
        return print_catalog(spec.as_ref());
    }
    let Some(spec) = spec else {
        bail!("--pipeline is required");
    };

    let orchestrator =
        Orchestrator::from_spec(&spec, &args.tables)?.with_channel_capacity(args.channel_capacity);
    let sourced = orchestrator.tables();
    let missing: Vec<String> = if args.tables.is_empty() {
        unsourced_tables(orchestrator.catalog(), &sourced)
    } else {
        args.tables
            .iter()
            .filter(|t| !sourced.contains(&t.as_str()))
            .cloned()
            .collect()
    };
    for table in &missing {
        warn!(table = %table, "no source configured; table will not be produced");
    }
    info!(pipeline = %spec.name, tables = sourced.len(), "pipeline loaded");

    let cancel = CancellationToken::new();
    let join = orchestrator.spawn(cancel.clone()).join();
    tokio::pin!(join);
    let report = tokio::select! {
        report = &mut join => report,
        _ = signal::ctrl_c() => {
            warn!("interrupted, cancelling every table");
            cancel.cancel();
            join.await
        }
    };

    println!("{report}");
    if !report.is_complete_success() {
        bail!(
            "{} of {} table(s) not produced",
            report.tables.len() - report.tables.iter().filter(|t| t.is_loaded()).count(),
            report.tables.len()
        );
    }
    Ok(())
}
