mod cli;
mod commands;
mod observability;
mod output;

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use unicache::{CacheMode, CacheOrchestrator, loader};

use cli::{Cli, Commands};
use output::{print_error, print_warning};

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    if let Err(e) = run().await {
        print_error(&format!("{e:#}"));
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    observability::init(cli.log_level.as_deref().unwrap_or("warn"));

    match &cli.command {
        Commands::Decode(args) => {
            commands::inspect::decode(&args.key)?;
        }
        Commands::Stats => {
            let cache = open_cache(&cli).await?;
            commands::namespace::stats(&cache).await?;
        }
        Commands::Invalidate(args) => {
            let cache = open_cache(&cli).await?;
            commands::namespace::invalidate(&cache, &args.namespace, args.key.as_deref()).await?;
        }
        Commands::Peek(args) => {
            let cache = open_cache(&cli).await?;
            commands::inspect::peek(&cache, &args.namespace, &args.subkey).await?;
        }
    }

    Ok(())
}

async fn open_cache(cli: &Cli) -> Result<Arc<CacheOrchestrator>> {
    let settings = loader::load_settings(cli.config.as_deref()).map_err(anyhow::Error::msg)?;
    if cli.log_level.is_none() {
        observability::set_level(&settings.logging.level);
    }

    let cache = unicache::connect(settings).await?;
    if cache.mode() == CacheMode::Memory {
        print_warning("Redis not in use: commands only affect this process's in-memory cache");
    }
    Ok(cache)
}
