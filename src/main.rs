use activity_core::{
    enrich, parse_records, summarize, ActivityEngine, ActivityError, EngineConfig, PriceLookup,
    ResultSet,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Args, Parser, Subcommand};
use config_manager::{ConfigManager, SystemConfig};
use persistence_layer::{detail_cache_from_config, DetailCache};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{debug, info, warn};

#[derive(Parser, Debug)]
#[command(name = "near_pulse", about = "Groups and classifies NEAR account activity", long_about = None)]
#[command(after_help = "Configuration is read from config.toml and PULSE__* environment variables.")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Classify an account's records from a JSON dump
    Analyze(AnalyzeArgs),

    /// Print the stored detail of one operation
    Details {
        session: String,
        index: usize,
    },
}

#[derive(Args, Debug)]
struct AnalyzeArgs {
    account: String,

    #[arg(value_name = "RECORDS_JSON")]
    records_path: PathBuf,

    /// Use the compact result bound
    #[arg(long)]
    compact: bool,

    /// Explicit result bound, takes precedence over --compact
    #[arg(long)]
    limit: Option<usize>,

    /// Store the detail index under this session id
    #[arg(long)]
    session: Option<String>,

    /// Print the detail of this result position after storing
    #[arg(long)]
    expand: Option<usize>,

    #[arg(long)]
    summary: bool,

    /// Fixed USD price of NEAR used to value amounts
    #[arg(long, value_name = "USD")]
    near_price: Option<Decimal>,
}

/// Prices native NEAR at a fixed rate given on the command line
struct FixedNearPrice {
    contract: String,
    price: Decimal,
}

#[async_trait]
impl PriceLookup for FixedNearPrice {
    async fn fetch_prices(
        &self,
        contracts: &[String],
    ) -> activity_core::Result<HashMap<String, Decimal>> {
        if !contracts.contains(&self.contract) {
            return Err(ActivityError::PriceLookup(format!(
                "{} was not requested",
                self.contract
            )));
        }
        Ok(HashMap::from([(self.contract.clone(), self.price)]))
    }
}

async fn run_analyze(config: &SystemConfig, args: AnalyzeArgs) -> Result<()> {
    let json = std::fs::read_to_string(&args.records_path)
        .with_context(|| format!("reading {}", args.records_path.display()))?;
    let records = parse_records(&json)?;

    let engine = ActivityEngine::new(EngineConfig::from_system_config(config));
    let mut result = match (args.limit, args.compact) {
        (Some(limit), _) => engine.analyze_with_limit(&records, &args.account, limit),
        (None, true) => engine.analyze_compact(&records, &args.account),
        (None, false) => engine.analyze(&records, &args.account),
    };

    if let Some(price) = args.near_price {
        let lookup = FixedNearPrice {
            contract: engine.config().patterns.wrapped_native().to_string(),
            price,
        };
        enrich(&mut result, &lookup, engine.config()).await;
    }

    println!("{}", serde_json::to_string_pretty(&result.operations)?);
    info!(
        "Showing {} of {} operations for {}",
        result.len(),
        result.total,
        args.account
    );

    if args.summary {
        let summary = summarize(&result.operations, &engine.config().system_account);
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }

    if args.session.is_some() || args.expand.is_some() {
        let session = args.session.unwrap_or_else(|| args.account.clone());
        store_and_expand(config, &session, &result, args.expand).await?;
    }

    Ok(())
}

async fn store_and_expand(
    config: &SystemConfig,
    session: &str,
    result: &ResultSet,
    expand: Option<usize>,
) -> Result<()> {
    let cache = detail_cache_from_config(&config.cache, &config.redis).await?;
    cache.store(session, &result.detail_index).await?;
    info!(
        "Stored {} expandable operations under session {}",
        result.detail_index.len(),
        session
    );

    if let Some(index) = expand {
        print_detail(cache.as_ref(), session, index).await?;
    }
    Ok(())
}

async fn run_details(config: &SystemConfig, session: &str, index: usize) -> Result<()> {
    if config.cache.backend == "memory" {
        warn!("The memory cache does not outlive a run; use the redis backend for separate lookups");
    }
    let cache = detail_cache_from_config(&config.cache, &config.redis).await?;
    print_detail(cache.as_ref(), session, index).await
}

async fn print_detail(cache: &dyn DetailCache, session: &str, index: usize) -> Result<()> {
    match cache.lookup(session, index).await? {
        Some(detail) => println!("{}", serde_json::to_string_pretty(&detail)?),
        None => println!("No details for operation {} in session {}", index, session),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = ConfigManager::new()?.into_config();
    if config.system.debug_mode {
        debug!("Effective configuration: {}", config.to_json_value());
    }

    match cli.command {
        Commands::Analyze(analyze) => run_analyze(&config, analyze).await,
        Commands::Details { session, index } => run_details(&config, &session, index).await,
    }
}
