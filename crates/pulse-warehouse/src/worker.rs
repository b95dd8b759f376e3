use crate::schema::AssetSpec;
use crate::source::{ChangeFallback, QuoteSource};
use crate::store::{ObservationStore, WriteMode};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{self, MissedTickBehavior};
use tokio_stream::{self as stream, StreamExt};
use tracing::{debug, error, info, warn};

/// Counts for one pass over the configured assets.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchSummary {
    pub stored: usize,
    pub no_data: usize,
    pub failed: usize,
}

/// The polling worker.
///
/// Assets are polled one after another with a fixed pause between provider calls; free provider
/// tiers ban keys that burst. A failure only costs that asset its row for this pass, there is no
/// retry until the next scheduled run.
pub struct Worker {
    source: Arc<dyn QuoteSource>,
    store: Arc<dyn ObservationStore>,
    assets: Vec<AssetSpec>,
    delay: Duration,
    mode: WriteMode,
    fallback: ChangeFallback,
    last_capture: Option<DateTime<Utc>>,
    migrated: bool,
}

impl Worker {
    pub fn new(
        source: Arc<dyn QuoteSource>,
        store: Arc<dyn ObservationStore>,
        assets: Vec<AssetSpec>,
    ) -> Self {
        Self {
            source,
            store,
            assets,
            delay: Duration::from_secs(15),
            mode: WriteMode::Append,
            fallback: ChangeFallback::Omit,
            last_capture: None,
            migrated: false,
        }
    }

    /// Pause between two provider calls.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn write_mode(mut self, mode: WriteMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn change_fallback(mut self, fallback: ChangeFallback) -> Self {
        self.fallback = fallback;
        self
    }

    /// Poll every asset once, in configuration order.
    pub async fn run_batch(&mut self) -> BatchSummary {
        info!(
            "Syncing market data: {} assets via {}",
            self.assets.len(),
            self.source.name()
        );
        let started = time::Instant::now();
        let mut summary = BatchSummary::default();

        // a store that was down at start-up gets its schema on the first pass it is back
        if !self.migrated {
            match self.store.migrate().await {
                Ok(_) => self.migrated = true,
                Err(e) => error!("Store migration failed, retrying next run: {e}"),
            }
        }

        let mut stream = stream::iter(self.assets.iter().enumerate());
        while let Some((i, asset)) = stream.next().await {
            if i > 0 && !self.delay.is_zero() {
                time::sleep(self.delay).await;
            }

            let quote = match self.source.quote(asset).await {
                Ok(Some(quote)) => quote,
                Ok(None) => {
                    warn!("No data for {} (API limit or invalid key)", asset.id);
                    summary.no_data += 1;
                    continue;
                }
                Err(e) => {
                    warn!("Error fetching {}: {e}", asset.id);
                    summary.failed += 1;
                    continue;
                }
            };

            let captured_at = next_capture(&mut self.last_capture, Utc::now());
            let obs = quote.into_observation(asset, captured_at, self.fallback);
            match self.store.record(&obs, self.mode).await {
                Ok(_) => {
                    info!("{}: {}", obs.asset_id, obs.price);
                    summary.stored += 1;
                }
                Err(e) => {
                    error!("Failed to store {}: {e}", obs.asset_id);
                    summary.failed += 1;
                }
            }
        }

        debug!(
            "Sync finished: {summary:?}. Elapsed time: {} ms",
            started.elapsed().as_millis()
        );
        summary
    }

    /// Run a batch now and then once every `every`, until the task is dropped.
    pub async fn run(mut self, every: Duration) {
        let mut ticker = time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            // the first tick completes immediately
            ticker.tick().await;
            let summary = self.run_batch().await;
            info!(
                "Market data synced: {} stored, {} without data, {} failed",
                summary.stored, summary.no_data, summary.failed
            );
        }
    }
}

/// Capture timestamps never go backwards for one worker, even if the wall clock does.
fn next_capture(last: &mut Option<DateTime<Utc>>, now: DateTime<Utc>) -> DateTime<Utc> {
    let stamp = match *last {
        Some(previous) if previous > now => previous,
        _ => now,
    };
    *last = Some(stamp);
    stamp
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Category, SourceParams};
    use crate::source::{Quote, SourceError};
    use crate::store::{MemoryStore, StoreError};
    use crate::Observation;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Clone, Copy)]
    enum Script {
        Price(f64, Option<f64>),
        Empty,
        Fail,
    }

    /// Answers from a fixed script and remembers the call order.
    struct ScriptedSource {
        script: HashMap<String, Script>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedSource {
        fn new(script: &[(&str, Script)]) -> Self {
            Self {
                script: script
                    .iter()
                    .map(|(id, s)| (id.to_string(), *s))
                    .collect(),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl QuoteSource for ScriptedSource {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn quote(&self, asset: &AssetSpec) -> Result<Option<Quote>, SourceError> {
            self.calls.lock().unwrap().push(asset.id.clone());
            match self.script.get(&asset.id).copied().unwrap_or(Script::Empty) {
                Script::Price(price, change_pct) => Ok(Some(Quote { price, change_pct })),
                Script::Empty => Ok(None),
                Script::Fail => Err(SourceError::Provider("rate limited".to_string())),
            }
        }
    }

    /// Rejects writes for one asset.
    struct FlakyStore {
        inner: MemoryStore,
        reject: &'static str,
    }

    #[async_trait]
    impl ObservationStore for FlakyStore {
        async fn record(&self, obs: &Observation, mode: WriteMode) -> Result<(), StoreError> {
            if obs.asset_id == self.reject {
                return Err(StoreError::Unavailable("disk full".to_string()));
            }
            self.inner.record(obs, mode).await
        }

        async fn latest_per_asset(&self) -> Result<Vec<Observation>, StoreError> {
            self.inner.latest_per_asset().await
        }

        async fn recent_for(
            &self,
            asset_ids: &[String],
            limit: usize,
        ) -> Result<Vec<Observation>, StoreError> {
            self.inner.recent_for(asset_ids, limit).await
        }
    }

    /// Refuses everything, migrations included, until it is brought up.
    #[derive(Default)]
    struct OfflineStore {
        inner: MemoryStore,
        up: AtomicBool,
        migrations: AtomicUsize,
    }

    impl OfflineStore {
        fn check(&self) -> Result<(), StoreError> {
            if self.up.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(StoreError::Unavailable("connection refused".to_string()))
            }
        }
    }

    #[async_trait]
    impl ObservationStore for OfflineStore {
        async fn migrate(&self) -> Result<(), StoreError> {
            self.migrations.fetch_add(1, Ordering::SeqCst);
            self.check()
        }

        async fn record(&self, obs: &Observation, mode: WriteMode) -> Result<(), StoreError> {
            self.check()?;
            self.inner.record(obs, mode).await
        }

        async fn latest_per_asset(&self) -> Result<Vec<Observation>, StoreError> {
            self.check()?;
            self.inner.latest_per_asset().await
        }

        async fn recent_for(
            &self,
            asset_ids: &[String],
            limit: usize,
        ) -> Result<Vec<Observation>, StoreError> {
            self.check()?;
            self.inner.recent_for(asset_ids, limit).await
        }
    }

    fn asset(id: &str, category: Category) -> AssetSpec {
        AssetSpec::new(
            id,
            id,
            category,
            SourceParams::GlobalQuote {
                symbol: id.to_string(),
            },
        )
    }

    fn assets() -> Vec<AssetSpec> {
        vec![
            asset("IBM", Category::Stock),
            asset("BTC", Category::Crypto),
            asset("EUR", Category::Currency),
        ]
    }

    #[tokio::test]
    async fn failure_for_one_asset_does_not_stop_the_next() {
        let source = Arc::new(ScriptedSource::new(&[
            ("IBM", Script::Fail),
            ("BTC", Script::Price(64000.0, Some(2.5))),
            ("EUR", Script::Empty),
        ]));
        let store = Arc::new(MemoryStore::new());
        let mut worker = Worker::new(source.clone(), store.clone(), assets()).delay(Duration::ZERO);

        let summary = worker.run_batch().await;
        assert_eq!(
            summary,
            BatchSummary {
                stored: 1,
                no_data: 1,
                failed: 1
            }
        );
        assert_eq!(*source.calls.lock().unwrap(), vec!["IBM", "BTC", "EUR"]);

        let latest = store.latest_per_asset().await.unwrap();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].asset_id, "BTC");
        assert_eq!(latest[0].change_pct, Some(2.5));
    }

    #[tokio::test]
    async fn store_failure_is_skipped_too() {
        let source = Arc::new(ScriptedSource::new(&[
            ("IBM", Script::Price(180.0, None)),
            ("BTC", Script::Price(64000.0, None)),
            ("EUR", Script::Price(1.08, None)),
        ]));
        let store = Arc::new(FlakyStore {
            inner: MemoryStore::new(),
            reject: "IBM",
        });
        let mut worker = Worker::new(source, store.clone(), assets()).delay(Duration::ZERO);

        let summary = worker.run_batch().await;
        assert_eq!(summary.stored, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(store.inner.len().await, 2);
    }

    #[tokio::test]
    async fn migration_is_retried_until_the_store_is_back() {
        let source = Arc::new(ScriptedSource::new(&[("IBM", Script::Price(180.0, None))]));
        let store = Arc::new(OfflineStore::default());
        let mut worker = Worker::new(source, store.clone(), vec![asset("IBM", Category::Stock)])
            .delay(Duration::ZERO);

        let summary = worker.run_batch().await;
        assert_eq!(summary.failed, 1);
        assert_eq!(store.migrations.load(Ordering::SeqCst), 1);

        store.up.store(true, Ordering::SeqCst);
        let summary = worker.run_batch().await;
        assert_eq!(summary.stored, 1);
        assert_eq!(store.migrations.load(Ordering::SeqCst), 2);

        // migrated once it worked
        worker.run_batch().await;
        assert_eq!(store.migrations.load(Ordering::SeqCst), 2);
        assert_eq!(store.inner.len().await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn calls_are_spaced_by_the_delay() {
        let source = Arc::new(ScriptedSource::new(&[]));
        let store = Arc::new(MemoryStore::new());
        let mut worker = Worker::new(source, store, assets()).delay(Duration::from_secs(15));

        let start = time::Instant::now();
        worker.run_batch().await;
        // two pauses between three calls, none after the last
        assert_eq!(start.elapsed(), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn synthesized_changes_are_flagged() {
        let source = Arc::new(ScriptedSource::new(&[
            ("IBM", Script::Price(180.0, Some(1.1))),
            ("EUR", Script::Price(1.08, None)),
        ]));
        let store = Arc::new(MemoryStore::new());
        let mut worker = Worker::new(source, store.clone(), assets())
            .delay(Duration::ZERO)
            .change_fallback(ChangeFallback::Synthesize);
        worker.run_batch().await;

        let latest = store.latest_per_asset().await.unwrap();
        let eur = latest.iter().find(|o| o.asset_id == "EUR").unwrap();
        assert!(eur.change_synthesized);
        assert!(eur.change_pct.is_some());
        let ibm = latest.iter().find(|o| o.asset_id == "IBM").unwrap();
        assert!(!ibm.change_synthesized);
        assert_eq!(ibm.change_pct, Some(1.1));
    }

    #[tokio::test(start_paused = true)]
    async fn runs_immediately_and_then_on_schedule() {
        let source = Arc::new(ScriptedSource::new(&[("IBM", Script::Price(180.0, None))]));
        let store = Arc::new(MemoryStore::new());
        let worker = Worker::new(source, store.clone(), vec![asset("IBM", Category::Stock)])
            .delay(Duration::ZERO);

        let handle = tokio::spawn(worker.run(Duration::from_secs(600)));
        time::sleep(Duration::from_secs(1)).await;
        assert_eq!(store.len().await, 1);

        time::sleep(Duration::from_secs(600)).await;
        assert_eq!(store.len().await, 2);
        handle.abort();
    }

    #[test]
    fn capture_time_never_goes_backwards() {
        let mut last = None;
        let now = Utc::now();
        assert_eq!(next_capture(&mut last, now), now);
        let earlier = now - chrono::Duration::seconds(5);
        assert_eq!(next_capture(&mut last, earlier), now);
        let later = now + chrono::Duration::seconds(5);
        assert_eq!(next_capture(&mut last, later), later);
    }
}
