use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use account_indexer::{
    load_updates, sort_by_tokens_desc, AccountFilter, AccountIndexer, IndexerConfig, VERSION,
};

/// Ingest account updates and report the highest-token accounts per type
#[derive(Debug, Parser)]
#[command(name = "account-indexer", version)]
struct Cli {
    /// Update file (.json array or .csv)
    input: PathBuf,

    /// JSON config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Ranked accounts kept per account type
    #[arg(long)]
    capacity: Option<usize>,

    /// Upper bound of the random callback offset
    #[arg(long)]
    max_jitter_ms: Option<u64>,

    /// Seed for reproducible callback jitter
    #[arg(long)]
    seed: Option<u64>,

    /// Query: only this account type
    #[arg(long)]
    filter_type: Option<String>,

    /// Query: minimum tokens (inclusive)
    #[arg(long)]
    min: Option<i64>,

    /// Query: maximum tokens (inclusive)
    #[arg(long)]
    max: Option<i64>,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn wants_query(&self) -> bool {
        self.filter_type.is_some() || self.min.is_some() || self.max.is_some()
    }

    fn filter(&self) -> AccountFilter {
        AccountFilter {
            account_type: self.filter_type.clone(),
            min_tokens: self.min,
            max_tokens: self.max,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => IndexerConfig::from_file(path)
            .with_context(|| format!("Failed to load config: {:?}", path))?,
        None => IndexerConfig::default(),
    };
    if let Some(capacity) = cli.capacity {
        config.ranking_capacity = capacity;
    }
    if let Some(max_jitter_ms) = cli.max_jitter_ms {
        config.max_jitter_ms = max_jitter_ms;
    }
    if cli.seed.is_some() {
        config.jitter_seed = cli.seed;
    }
    config.validate().context("Invalid configuration")?;

    init_tracing(&config.log_level, config.log_json);
    info!(version = VERSION, input = ?cli.input, "starting account indexer");

    let loaded = load_updates(&cli.input)
        .with_context(|| format!("Failed to load updates: {:?}", cli.input))?;

    let mut indexer = AccountIndexer::from_config(&config);
    let report = indexer.ingest_loaded(&loaded, Utc::now);

    let mut matches = if cli.wants_query() {
        Some(indexer.query(&cli.filter()))
    } else {
        None
    };
    if let Some(accounts) = matches.as_mut() {
        sort_by_tokens_desc(accounts);
    }

    if cli.json {
        let top: std::collections::BTreeMap<&str, _> = indexer
            .ranking()
            .categories()
            .into_iter()
            .map(|t| (t, indexer.top_accounts(t)))
            .collect();
        let output = serde_json::json!({
            "report": report,
            "top_accounts": top,
            "query": matches,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("{}", report.summary());
        println!();
        print!("{}", indexer.top_accounts_report());
        if let Some(accounts) = &matches {
            println!();
            println!("Query matched {} accounts:", accounts.len());
            for account in accounts {
                println!(
                    "  Account {} v{} ({}): Tokens - {}",
                    account.id, account.version, account.account_type, account.tokens
                );
            }
        }
    }

    Ok(())
}

fn init_tracing(log_level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    if json {
        tracing_subscriber::fmt()
            .with_target(false)
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_target(false)
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .compact()
            .init();
    }
}
