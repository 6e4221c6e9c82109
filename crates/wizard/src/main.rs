//! Scout wizard command line.
//!
//! Usage:
//!   scout-wizard explain --manifest wizard.toml --query 'filter[name]=John&sort=-id'

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use scout_wizard::manifest::Manifest;
use scout_wizard::search::Page;
use scout_wizard::{
    Record, RecordStore, RelationalQuery, RequestSnapshot, ScoutQueryWizard, SearchBuilder,
    SearchEngine, SearchHits, Searchable, WizardConfig, WizardError,
};

/// Translate HTTP query strings into search queries.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate a query string against a manifest and print the resulting plan.
    Explain {
        /// Manifest declaring models, allow-lists and defaults.
        #[arg(long)]
        manifest: PathBuf,

        /// Wizard configuration file (default: WIZARD_* environment variables).
        #[arg(long)]
        config: Option<PathBuf>,

        /// Query string, with or without the leading `?`.
        #[arg(long, default_value = "")]
        query: String,

        /// Full-text search terms.
        #[arg(long, default_value = "")]
        search: String,
    },
}

/// Backend for planning only; executing a search fails.
struct PlanOnly;

impl SearchEngine for PlanOnly {
    fn search(&self, _builder: &SearchBuilder, _page: Option<Page>) -> Result<SearchHits> {
        bail!("explain does not execute searches")
    }
}

impl RecordStore for PlanOnly {
    fn fetch(&self, _query: &RelationalQuery) -> Result<Vec<Record>> {
        bail!("explain does not hydrate records")
    }
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let args = Args::parse();
    match args.command {
        Command::Explain {
            manifest,
            config,
            query,
            search,
        } => explain(&manifest, config.as_deref(), &query, &search),
    }
}

fn explain(
    manifest_path: &Path,
    config_path: Option<&Path>,
    query: &str,
    search: &str,
) -> Result<()> {
    let config = match config_path {
        Some(path) => WizardConfig::from_file(path)?,
        None => WizardConfig::from_env().context("failed to load configuration")?,
    };
    let manifest = Manifest::from_file(manifest_path)?;
    let schema = Arc::new(manifest.schema()?);
    info!(model = %manifest.model, "manifest loaded");

    let backend = Arc::new(PlanOnly);
    let searchable = Searchable::new(schema, &manifest.model, backend.clone(), backend)?
        .with_soft_delete(config.soft_delete);
    let request = RequestSnapshot::from_query_str(query, &config);
    debug!(request = ?request, "parsed request");

    let wizard = ScoutQueryWizard::with_config(searchable.search(search), request, config)?;
    let built = match manifest.configure(wizard).build() {
        Ok(built) => built,
        Err(err @ WizardError::Query(_)) => return Err(err.into()),
        Err(err) => {
            let report = json!({
                "error": err.to_string(),
                "kind": err.kind().map(|kind| kind.plural()),
                "unknown": err.unknown(),
                "allowed": err.allowed(),
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
            std::process::exit(2);
        }
    };

    let relational = built.refined_query()?;
    let plan = json!({
        "model": built.model().name(),
        "query": built.query_text(),
        "wheres": built.wheres(),
        "where_ins": built.where_ins(),
        "orders": built.orders(),
        "appends": built.appends(),
        "sql": relational.to_sql(),
    });
    println!("{}", serde_json::to_string_pretty(&plan)?);
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
