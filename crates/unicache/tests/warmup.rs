use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use unicache::{
    CacheOrchestrator, CacheSettings, MemoryStore, NamespaceConfig, ReadPath, WarmupConfig,
    WarmupReport, WarmupRunner, WarmupSource, WarmupTask, subkey_product,
};

fn cache(store: &MemoryStore) -> Arc<CacheOrchestrator> {
    let settings = CacheSettings::default()
        .with_namespace(NamespaceConfig::new("menu"))
        .with_namespace(NamespaceConfig::new("i18n"));
    CacheOrchestrator::builder()
        .with_settings(settings)
        .with_memory_store(store.clone())
        .build()
        .unwrap()
}

fn config(critical_timeout_secs: u64) -> WarmupConfig {
    WarmupConfig {
        enabled: true,
        critical_timeout_secs,
    }
}

/// Menus for every role × locale; the admin menus are critical.
struct MenuSource {
    roles: Vec<&'static str>,
    locales: Vec<&'static str>,
}

#[async_trait]
impl WarmupSource for MenuSource {
    fn name(&self) -> &str {
        "menus"
    }

    async fn discover(&self) -> anyhow::Result<Vec<WarmupTask>> {
        let tasks = subkey_product(&self.roles, &self.locales)?
            .into_iter()
            .map(|subkey| {
                let critical = subkey.starts_with("admin|");
                let value = format!("menu for {subkey}");
                let task = WarmupTask::new("menu", subkey, move || async move {
                    Ok::<_, Infallible>(value)
                });
                if critical { task.critical() } else { task }
            })
            .collect();
        Ok(tasks)
    }
}

struct Fixed(Vec<(&'static str, bool, Result<u32, &'static str>, Duration)>);

#[async_trait]
impl WarmupSource for Fixed {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn discover(&self) -> anyhow::Result<Vec<WarmupTask>> {
        Ok(self
            .0
            .iter()
            .map(|&(subkey, critical, result, delay)| {
                let task = WarmupTask::new("i18n", subkey, move || async move {
                    tokio::time::sleep(delay).await;
                    result.map_err(anyhow::Error::msg)
                });
                if critical { task.critical() } else { task }
            })
            .collect())
    }
}

struct Broken;

#[async_trait]
impl WarmupSource for Broken {
    fn name(&self) -> &str {
        "broken"
    }

    async fn discover(&self) -> anyhow::Result<Vec<WarmupTask>> {
        anyhow::bail!("database unreachable")
    }
}

#[tokio::test]
async fn test_critical_first_then_background() {
    let store = MemoryStore::new();
    let cache = cache(&store);
    let runner = WarmupRunner::new(cache.clone(), &config(5)).with_source(MenuSource {
        roles: vec!["admin", "nurse"],
        locales: vec!["en", "uz-UZ"],
    });
    let readiness = runner.readiness();
    assert!(!readiness.is_ready());

    let outcome = runner.run().await;
    assert!(readiness.is_ready());
    assert_eq!(
        outcome.critical,
        WarmupReport {
            total: 2,
            succeeded: 2,
            failed: 0,
            pending: 0
        }
    );
    assert!(store.contains_value("menu:v1:admin|en"));
    assert!(store.contains_value("menu:v1:admin|uz-UZ"));

    let background = outcome.background.unwrap().await.unwrap();
    assert_eq!(background.succeeded, 2);
    assert!(store.contains_value("menu:v1:nurse|uz-UZ"));

    let warmed = cache
        .lookup("menu", "nurse|en", None, || async {
            Ok::<_, Infallible>("recomputed".to_string())
        })
        .await
        .unwrap();
    assert_eq!(warmed.path, ReadPath::L1Hit);
    assert_eq!(warmed.value, "menu for nurse|en");
}

#[tokio::test]
async fn test_failures_are_skipped() {
    let store = MemoryStore::new();
    let source = Fixed(vec![
        ("en", true, Ok(1), Duration::ZERO),
        ("ru", true, Err("translation table missing"), Duration::ZERO),
        ("uz-UZ", false, Err("translation table missing"), Duration::ZERO),
    ]);
    let outcome = WarmupRunner::new(cache(&store), &config(5))
        .with_source(Broken)
        .with_source(source)
        .run()
        .await;

    assert_eq!(outcome.critical.total, 2);
    assert_eq!(outcome.critical.succeeded, 1);
    assert_eq!(outcome.critical.failed, 1);
    assert!(store.contains_value("i18n:v1:en"));
    assert!(!store.contains_value("i18n:v1:ru"));

    let background = outcome.background.unwrap().await.unwrap();
    assert_eq!(background.failed, 1);
}

#[tokio::test]
async fn test_critical_deadline_bounds_readiness() {
    let store = MemoryStore::new();
    let source = Fixed(vec![
        ("en", true, Ok(1), Duration::ZERO),
        ("slow", true, Ok(2), Duration::from_millis(1_500)),
    ]);
    let runner = WarmupRunner::new(cache(&store), &config(1)).with_source(source);
    let readiness = runner.readiness();

    let started = std::time::Instant::now();
    let outcome = runner.run().await;
    assert!(started.elapsed() < Duration::from_millis(1_400));
    assert!(readiness.is_ready());
    assert_eq!(outcome.critical.succeeded, 1);
    assert_eq!(outcome.critical.pending, 1);
    assert!(outcome.background.is_none());

    // The detached entry still completes.
    tokio::time::sleep(Duration::from_millis(800)).await;
    assert!(store.contains_value("i18n:v1:slow"));
}

#[tokio::test]
async fn test_disabled_warmup_is_ready_immediately() {
    let store = MemoryStore::new();
    let runner = WarmupRunner::new(
        cache(&store),
        &WarmupConfig {
            enabled: false,
            critical_timeout_secs: 30,
        },
    )
    .with_source(Fixed(vec![("en", true, Ok(1), Duration::ZERO)]));
    let readiness = runner.readiness();

    let outcome = runner.run().await;
    assert!(readiness.is_ready());
    assert_eq!(outcome.critical, WarmupReport::default());
    assert_eq!(store.value_count(), 0);
}
