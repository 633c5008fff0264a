use anyhow::Result;
use colored::Colorize;
use unicache::{CacheOrchestrator, VersionedKey};

pub fn decode(raw: &str) -> Result<()> {
    let key = VersionedKey::decode(raw)?;
    println!("{}: {}", "Namespace".cyan(), key.namespace());
    println!("{}: {}", "Version".cyan(), key.version());
    println!("{}: {}", "Subkey".cyan(), key.subkey());
    println!("{}: {}", "Lock key".cyan(), key.lock_key());
    Ok(())
}

pub async fn peek(cache: &CacheOrchestrator, namespace: &str, subkey: &str) -> Result<()> {
    let version = cache.version(namespace).await?;
    match cache.peek(namespace, subkey).await? {
        Some(value) => {
            println!("{}: {namespace}:v{version}:{subkey}", "Key".cyan());
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        None => println!("{namespace}:v{version}:{subkey} is {}", "not cached".yellow()),
    }
    Ok(())
}
