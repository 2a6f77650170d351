//! Terminal front end for the Eventide engine.
//!
//! Stands in for the product UI: builds an engine over a file-backed cache
//! in the user data directory, runs one query, and prints the result with
//! its provenance status.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use eventide_core::Engine;
use eventide_core::EngineConfig;
use eventide_core::EventQuery;
use eventide_core::FetchOptions;
use eventide_core::FetchResult;
use eventide_core::FetchStatus;
use eventide_core::FileStore;
use eventide_core::GeminiClient;
use eventide_core::MemoryStore;
use eventide_core::Store;

#[derive(Parser, Debug)]
#[command(name = "eventide", about = "Find local events with graceful degradation")]
struct Cli {
    /// Region or city to search, or "All".
    region: String,

    /// Category filter ("All" means no constraint).
    #[arg(long)]
    category: Option<String>,

    /// Free-text keyword filter.
    #[arg(long)]
    keyword: Option<String>,

    /// Start of the date window, MM/DD/YYYY.
    #[arg(long)]
    start_date: Option<String>,

    /// End of the date window, MM/DD/YYYY.
    #[arg(long)]
    end_date: Option<String>,

    /// 1-based result page.
    #[arg(long, default_value_t = 1)]
    page: u32,

    /// Bypass the cache and refetch.
    #[arg(long)]
    force_refresh: bool,

    /// Purge the persisted cache and exit.
    #[arg(long)]
    clear_cache: bool,

    /// Print raw JSON instead of formatted text.
    #[arg(long)]
    json: bool,

    /// Config file (TOML). Defaults to <config-dir>/eventide/config.toml.
    #[arg(long)]
    config: Option<PathBuf>,

    /// API key for the generative upstream.
    #[arg(long, env = "EVENTIDE_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Keep the cache in memory only (no file store).
    #[arg(long)]
    ephemeral: bool,
}

fn load_config(explicit: Option<&PathBuf>) -> Result<EngineConfig> {
    let path = match explicit {
        Some(path) => Some(path.clone()),
        None => dirs::config_dir().map(|dir| dir.join("eventide").join("config.toml")),
    };
    match path {
        Some(path) if path.exists() => {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("reading config at {}", path.display()))?;
            toml::from_str(&raw).with_context(|| format!("parsing config at {}", path.display()))
        }
        _ => Ok(EngineConfig::default()),
    }
}

fn open_store(config: &EngineConfig, ephemeral: bool) -> Box<dyn Store> {
    if !ephemeral
        && let Some(data_dir) = dirs::data_dir()
    {
        let path = data_dir.join("eventide").join("cache.json");
        match FileStore::open(&path) {
            Ok(store) => {
                let store = match config.store_capacity_bytes {
                    Some(budget) => store.with_capacity_bytes(budget),
                    None => store,
                };
                return Box::new(store);
            }
            Err(err) => {
                tracing::warn!("file cache unavailable ({err}), continuing in memory");
            }
        }
    }
    Box::new(MemoryStore::new())
}

fn print_result(result: &FetchResult, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
        return Ok(());
    }

    let label = match result.status {
        FetchStatus::Grounded => "live, search-backed",
        FetchStatus::Ai => "live, unverified",
        FetchStatus::Cache => "cached",
        FetchStatus::Seed => "offline baseline",
        FetchStatus::QuotaLimited => "quota-limited",
    };
    println!("status: {label}");

    if result.status == FetchStatus::QuotaLimited {
        println!("The upstream is catching its breath; try again in a few minutes.");
        return Ok(());
    }

    for event in &result.events {
        let date = event.date.as_deref().unwrap_or("date TBA");
        println!("- {} [{}] {} — {}", date, event.category, event.title, event.location);
    }
    if !result.sources.is_empty() {
        println!("sources:");
        for source in &result.sources {
            println!("  {} <{}>", source.title, source.uri);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;

    let api_key = cli.api_key.clone().unwrap_or_default();
    let client = Arc::new(GeminiClient::new(api_key.clone(), &config));
    let store = open_store(&config, cli.ephemeral);
    let engine = Engine::new(config, store, client);

    if cli.clear_cache {
        engine.clear_cache();
        println!("cache cleared");
        return Ok(());
    }

    if api_key.is_empty() {
        tracing::warn!("no API key set; live tiers will fail and fallbacks will serve");
    }

    let query = EventQuery {
        region: cli.region,
        category: cli.category,
        keyword: cli.keyword,
        start_date: cli.start_date,
        end_date: cli.end_date,
        page: cli.page,
    };

    let options = FetchOptions {
        force_refresh: cli.force_refresh,
        ..Default::default()
    };

    match engine.fetch(&query, options).await {
        Some(result) => print_result(&result, cli.json)?,
        None => {
            println!("No events available right now; try again shortly.");
        }
    }
    Ok(())
}
