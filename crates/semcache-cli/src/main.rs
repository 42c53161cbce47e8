//! semcache CLI - Command-line interface
//!
//! Usage:
//!   semcache init
//!   semcache lookup [prompt] [--threshold 0.95]
//!   semcache put <prompt> <completion> [--session id]
//!   semcache config

use anyhow::Context;
use clap::{Parser, Subcommand};
use semcache_core::{AppConfig, CacheHit, CacheQuery, LoggingConfig};
use semcache_lookup::{LookupStatsReport, SemanticCache};
use semcache_vector::{create_embedding_client, QdrantCacheStore};
use std::path::PathBuf;
use std::sync::Arc;

const DEMO_PROMPT: &str = "What is the largest lake in North America?";

#[derive(Parser)]
#[command(name = "semcache")]
#[command(about = "Semantic completion cache over Qdrant and an embedding service")]
#[command(version)]
struct Cli {
    /// TOML configuration file (environment variables still take precedence)
    #[arg(short, long, global = true, env = "SEMCACHE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the cache collection if it does not exist
    Init,
    /// Look up a cached completion for a prompt
    Lookup {
        /// Prompt to look up
        #[arg(default_value = DEMO_PROMPT)]
        prompt: String,
        /// Similarity a cached prompt must exceed (defaults to the configured value)
        #[arg(short, long)]
        threshold: Option<f32>,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Embed a prompt and cache its completion
    Put {
        /// Prompt that was asked
        prompt: String,
        /// Completion to return for similar prompts
        completion: String,
        /// Chat session the pair belongs to
        #[arg(short, long)]
        session: Option<String>,
    },
    /// Print the effective configuration with secrets redacted
    Config,
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<AppConfig> {
    let config = match path {
        Some(path) => AppConfig::from_file(path)?.with_env_override()?,
        None => AppConfig::from_env()?,
    };
    Ok(config)
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_file(logging.include_location)
        .with_line_number(logging.include_location);

    if logging.json_format {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn build_cache(config: &AppConfig) -> anyhow::Result<SemanticCache> {
    let embedder = create_embedding_client(&config.embedding, config.store.vector_dimension)?;
    let store = QdrantCacheStore::new(&config.store)?;
    Ok(SemanticCache::new(
        Arc::from(embedder),
        Arc::new(store),
        &config.cache,
    ))
}

/// JSON document printed by `lookup --json`
fn lookup_json(
    prompt: &str,
    threshold: f32,
    hit: Option<&CacheHit>,
    stats: &LookupStatsReport,
) -> serde_json::Value {
    serde_json::json!({
        "prompt": prompt,
        "threshold": threshold,
        "hit": hit,
        "stats": stats,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_ref()).context("Failed to load configuration")?;
    init_tracing(&config.logging);

    match cli.command {
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&config.redacted())?);
        }
        Commands::Init => {
            let store = QdrantCacheStore::new(&config.store)?;
            if store.init_collection().await? {
                println!("Created collection '{}'", store.collection());
            } else {
                println!("Collection '{}' already exists", store.collection());
            }
        }
        Commands::Lookup {
            prompt,
            threshold,
            json,
        } => {
            config.validate()?;
            let cache = build_cache(&config)?;
            let threshold = threshold.unwrap_or(cache.default_threshold());

            let hit = cache.find(&CacheQuery::new(prompt.as_str(), threshold)).await?;

            if json {
                let stats = cache.stats().report();
                let output = lookup_json(&prompt, threshold, hit.as_ref(), &stats);
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                match hit {
                    Some(hit) => {
                        println!("{}", hit.completion_text);
                        tracing::info!(score = hit.similarity_score, "cache hit");
                    }
                    None => println!("No cached completion above {threshold}"),
                }
            }
        }
        Commands::Put {
            prompt,
            completion,
            session,
        } => {
            config.validate()?;
            let cache = build_cache(&config)?;
            let entry = cache
                .record(&prompt, &completion, session.as_deref())
                .await?;
            println!("Cached entry {} in session '{}'", entry.id, entry.session_id);
        }
    }

    Ok(())
}
