//! Startup warmup.
//!
//! Sources enumerate known-hot entries at boot. Entries marked critical are
//! loaded before the instance reports ready, bounded by
//! `warmup.critical_timeout_secs`; everything else fills in from a background
//! task. A failed entry is logged and skipped, it never fails startup.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::task::{JoinHandle, JoinSet};
use unicache_core::KeyError;
use unicache_core::key::compose_subkey;

use crate::config::WarmupConfig;
use crate::orchestrator::CacheOrchestrator;

type WarmupFn = Box<dyn FnOnce(Arc<CacheOrchestrator>) -> BoxFuture<'static, anyhow::Result<()>> + Send>;

/// One entry to pre-populate.
pub struct WarmupTask {
    label: String,
    critical: bool,
    run: WarmupFn,
}

impl WarmupTask {
    /// Warm `namespace`/`subkey` by reading it through the cache with `loader`.
    pub fn new<T, E, F, Fut>(namespace: impl Into<String>, subkey: impl Into<String>, loader: F) -> Self
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        E: Into<anyhow::Error> + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let namespace = namespace.into();
        let subkey = subkey.into();
        let label = format!("{namespace}/{subkey}");
        let run: WarmupFn = Box::new(move |cache: Arc<CacheOrchestrator>| {
            async move {
                cache
                    .get(&namespace, &subkey, loader)
                    .await
                    .map(|_: T| ())
                    .map_err(Into::into)
            }
            .boxed()
        });
        Self {
            label,
            critical: false,
            run,
        }
    }

    /// Load this entry before the instance reports ready.
    pub fn critical(mut self) -> Self {
        self.critical = true;
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_critical(&self) -> bool {
        self.critical
    }
}

/// Enumerates warmup entries, typically from the application's database.
#[async_trait]
pub trait WarmupSource: Send + Sync {
    fn name(&self) -> &str;

    async fn discover(&self) -> anyhow::Result<Vec<WarmupTask>>;
}

/// Subkeys for every combination of two dimensions, e.g. role × locale.
pub fn subkey_product<A, B>(left: &[A], right: &[B]) -> Result<Vec<String>, KeyError>
where
    A: AsRef<str>,
    B: AsRef<str>,
{
    let mut subkeys = Vec::with_capacity(left.len() * right.len());
    for l in left {
        for r in right {
            subkeys.push(compose_subkey([l.as_ref(), r.as_ref()])?);
        }
    }
    Ok(subkeys)
}

/// Readiness flag flipped once the critical warmup subset has finished.
#[derive(Debug, Clone, Default)]
pub struct Readiness(Arc<AtomicBool>);

impl Readiness {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_ready(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    fn mark_ready(&self) {
        self.0.store(true, Ordering::Release);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WarmupReport {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Entries still running when the deadline hit. They keep running detached.
    pub pending: usize,
}

pub struct WarmupOutcome {
    pub critical: WarmupReport,
    pub background: Option<JoinHandle<WarmupReport>>,
}

pub struct WarmupRunner {
    cache: Arc<CacheOrchestrator>,
    config: WarmupConfig,
    sources: Vec<Box<dyn WarmupSource>>,
    readiness: Readiness,
}

impl WarmupRunner {
    pub fn new(cache: Arc<CacheOrchestrator>, config: &WarmupConfig) -> Self {
        Self {
            cache,
            config: config.clone(),
            sources: Vec::new(),
            readiness: Readiness::new(),
        }
    }

    pub fn with_source(mut self, source: impl WarmupSource + 'static) -> Self {
        self.sources.push(Box::new(source));
        self
    }

    pub fn readiness(&self) -> Readiness {
        self.readiness.clone()
    }

    /// Run the critical subset, mark ready, then hand the rest to a background task.
    pub async fn run(self) -> WarmupOutcome {
        if !self.config.enabled {
            tracing::info!("cache warmup disabled");
            self.readiness.mark_ready();
            return WarmupOutcome {
                critical: WarmupReport::default(),
                background: None,
            };
        }

        let mut critical = Vec::new();
        let mut background = Vec::new();
        for source in &self.sources {
            match source.discover().await {
                Ok(tasks) => {
                    tracing::debug!(source = source.name(), entries = tasks.len(), "warmup source discovered");
                    for task in tasks {
                        if task.critical {
                            critical.push(task);
                        } else {
                            background.push(task);
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(source = source.name(), error = %e, "warmup source failed, skipping");
                }
            }
        }

        let deadline = Duration::from_secs(self.config.critical_timeout_secs);
        let critical_report = run_batch(&self.cache, critical, Some(deadline)).await;
        self.readiness.mark_ready();
        tracing::info!(
            total = critical_report.total,
            succeeded = critical_report.succeeded,
            failed = critical_report.failed,
            pending = critical_report.pending,
            "critical cache warmup finished"
        );

        let background = if background.is_empty() {
            None
        } else {
            let cache = self.cache.clone();
            Some(tokio::spawn(async move {
                let report = run_batch(&cache, background, None).await;
                tracing::info!(
                    total = report.total,
                    succeeded = report.succeeded,
                    failed = report.failed,
                    "background cache warmup finished"
                );
                report
            }))
        };

        WarmupOutcome {
            critical: critical_report,
            background,
        }
    }
}

async fn run_batch(
    cache: &Arc<CacheOrchestrator>,
    tasks: Vec<WarmupTask>,
    deadline: Option<Duration>,
) -> WarmupReport {
    let mut report = WarmupReport {
        total: tasks.len(),
        ..WarmupReport::default()
    };

    let mut set = JoinSet::new();
    for WarmupTask { label, run, .. } in tasks {
        let warm = run(cache.clone());
        set.spawn(async move { (label, warm.await) });
    }

    let drain = async {
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((_, Ok(()))) => report.succeeded += 1,
                Ok((label, Err(e))) => {
                    report.failed += 1;
                    tracing::warn!(entry = %label, error = %e, "warmup entry failed");
                }
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(error = %e, "warmup task aborted");
                }
            }
        }
    };

    match deadline {
        Some(deadline) => {
            if tokio::time::timeout(deadline, drain).await.is_err() {
                report.pending = set.len();
                set.detach_all();
                tracing::warn!(
                    pending = report.pending,
                    timeout_secs = deadline.as_secs(),
                    "critical warmup deadline reached, continuing in background"
                );
            }
        }
        None => drain.await,
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subkey_product() {
        let subkeys = subkey_product(&["admin", "nurse"], &["en", "uz-UZ"]).unwrap();
        assert_eq!(subkeys, vec!["admin|en", "admin|uz-UZ", "nurse|en", "nurse|uz-UZ"]);
    }

    #[test]
    fn test_subkey_product_rejects_separator() {
        assert!(subkey_product(&["a:b"], &["en"]).is_err());
    }

    #[test]
    fn test_readiness_shared_between_clones() {
        let readiness = Readiness::new();
        let observer = readiness.clone();
        assert!(!observer.is_ready());
        readiness.mark_ready();
        assert!(observer.is_ready());
    }
}
