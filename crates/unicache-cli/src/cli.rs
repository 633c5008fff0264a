use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "unicache")]
#[command(about = "Inspect and invalidate unicache namespaces")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Settings file (defaults to ./unicache.toml when present)
    #[arg(short, long, global = true, env = "UNICACHE_CONFIG")]
    pub config: Option<String>,

    /// Log level (overrides logging.level from the settings file)
    #[arg(long, global = true)]
    pub log_level: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show version and key pattern of every declared namespace
    Stats,
    /// Invalidate a namespace, or a single key with --key
    Invalidate(InvalidateArgs),
    /// Split a stored key into namespace, version and subkey
    Decode(DecodeArgs),
    /// Print the shared-tier value of a key at the current version
    Peek(PeekArgs),
}

#[derive(clap::Args)]
pub struct InvalidateArgs {
    /// Namespace (e.g. i18n)
    pub namespace: String,
    /// Only drop this subkey at the current version
    #[arg(long)]
    pub key: Option<String>,
}

#[derive(clap::Args)]
pub struct DecodeArgs {
    /// Stored key (e.g. i18n:v3:uz-UZ)
    pub key: String,
}

#[derive(clap::Args)]
pub struct PeekArgs {
    /// Namespace (e.g. menu)
    pub namespace: String,
    /// Subkey (e.g. admin|en)
    pub subkey: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_invalidate_key() {
        let cli = Cli::try_parse_from(["unicache", "invalidate", "menu", "--key", "admin|en"]).unwrap();
        match cli.command {
            Commands::Invalidate(args) => {
                assert_eq!(args.namespace, "menu");
                assert_eq!(args.key.as_deref(), Some("admin|en"));
            }
            _ => panic!("expected invalidate"),
        }
    }

    #[test]
    fn test_global_config_flag() {
        let cli = Cli::try_parse_from(["unicache", "stats", "--config", "/etc/unicache.toml"]).unwrap();
        assert_eq!(cli.config.as_deref(), Some("/etc/unicache.toml"));
        assert!(matches!(cli.command, Commands::Stats));
    }

    #[test]
    fn test_peek_requires_subkey() {
        assert!(Cli::try_parse_from(["unicache", "peek", "menu"]).is_err());
    }
}
