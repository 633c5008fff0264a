use anyhow::Result;
use colored::Colorize;
use unicache::CacheOrchestrator;

use crate::output::{print_stats, print_success};

pub async fn stats(cache: &CacheOrchestrator) -> Result<()> {
    println!("{}: {}", "Mode".cyan(), cache.mode().as_str());
    print_stats(&cache.namespace_stats().await);
    Ok(())
}

pub async fn invalidate(cache: &CacheOrchestrator, namespace: &str, key: Option<&str>) -> Result<()> {
    match key {
        Some(subkey) => {
            cache.invalidate_key(namespace, subkey).await?;
            print_success(&format!("Dropped {} from {}", subkey.cyan(), namespace.cyan()));
        }
        None => {
            let version = cache.invalidate(namespace).await?;
            print_success(&format!(
                "{} is now at version {}",
                namespace.cyan(),
                version.to_string().green()
            ));
        }
    }
    Ok(())
}
