//! CLI logging. Events go to stderr so command output can be piped.
//!
//! `RUST_LOG`, when set and parseable, wins over both `--log-level` and the
//! settings file.

use std::sync::OnceLock;

use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*, reload};

type FilterHandle = reload::Handle<EnvFilter, Registry>;

static FILTER: OnceLock<FilterHandle> = OnceLock::new();

fn env_filter() -> Option<EnvFilter> {
    std::env::var_os("RUST_LOG")?;
    EnvFilter::try_from_default_env().ok()
}

pub fn init(level: &str) {
    let (filter, handle) = reload::Layer::new(env_filter().unwrap_or_else(|| EnvFilter::new(level)));
    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .try_init()
        .is_ok();
    if installed {
        let _ = FILTER.set(handle);
    }
}

/// Swap the active level once the settings file is known.
pub fn set_level(level: &str) {
    if env_filter().is_some() {
        return;
    }
    if let Some(handle) = FILTER.get() {
        let _ = handle.reload(EnvFilter::new(level));
    }
}
