use crate::config::Settings;
use crate::schema::{Observation, PricePoint};
use crate::store::{ObservationStore, StoreError};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::trace;

/// Upper bound on a history request.
pub const MAX_HISTORY_LIMIT: usize = 500;

/// Mean reported change (in percent) beyond which the market reads bullish or bearish.
const SENTIMENT_BAND: f64 = 0.1;

/// Latest observations grouped by category bucket.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub timestamp: DateTime<Utc>,
    pub groups: BTreeMap<&'static str, Vec<Observation>>,
}

impl Snapshot {
    fn new(timestamp: DateTime<Utc>, observations: Vec<Observation>) -> Self {
        let mut groups: BTreeMap<&'static str, Vec<Observation>> = BTreeMap::new();
        for obs in observations {
            groups.entry(obs.category.bucket()).or_default().push(obs);
        }
        Self { timestamp, groups }
    }

    /// Observations in one bucket (`stock`, `crypto`, `currency`, `commodity` or `other`).
    pub fn bucket(&self, name: &str) -> &[Observation] {
        self.groups.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn asset_count(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    /// Reading of the mean provider-reported change; synthesized figures do not count.
    pub fn sentiment(&self) -> &'static str {
        let changes: Vec<f64> = self
            .groups
            .values()
            .flatten()
            .filter_map(Observation::reported_change)
            .collect();
        if changes.is_empty() {
            return "No data";
        }

        let mean = changes.iter().sum::<f64>() / changes.len() as f64;
        if mean > SENTIMENT_BAND {
            "Bullish"
        } else if mean < -SENTIMENT_BAND {
            "Bearish"
        } else {
            "Neutral"
        }
    }
}

/// Read side of the warehouse, shared by every HTTP worker.
#[derive(Clone)]
pub struct Reports {
    store: Arc<dyn ObservationStore>,
    history_symbols: Vec<String>,
    history_limit: usize,
}

impl Reports {
    pub fn new(
        store: Arc<dyn ObservationStore>,
        history_symbols: Vec<String>,
        history_limit: usize,
    ) -> Self {
        Self {
            store,
            history_symbols,
            history_limit,
        }
    }

    pub fn from_settings(store: Arc<dyn ObservationStore>, settings: &Settings) -> Self {
        Self::new(
            store,
            settings.history_symbols.clone(),
            settings.history_limit,
        )
    }

    /// Latest usable observation per asset; assets never polled are simply absent.
    pub async fn latest(&self) -> Result<Vec<Observation>, StoreError> {
        let mut latest = self.store.latest_per_asset().await?;
        latest.retain(|obs| obs.price.is_finite() && obs.price > 0.0);
        trace!("latest snapshot holds {} assets", latest.len());
        Ok(latest)
    }

    /// The latest observations, grouped for presentation.
    pub async fn get_latest(&self) -> Result<Snapshot, StoreError> {
        Ok(Snapshot::new(Utc::now(), self.latest().await?))
    }

    /// Recent prices for `selector` (default: the configured reference assets), oldest first.
    pub async fn get_history(
        &self,
        selector: Option<&[String]>,
        limit: Option<usize>,
    ) -> Result<Vec<PricePoint>, StoreError> {
        let selector = selector.unwrap_or(&self.history_symbols);
        let limit = limit
            .unwrap_or(self.history_limit)
            .clamp(1, MAX_HISTORY_LIMIT);

        let rows = self.store.recent_for(selector, limit).await?;
        Ok(rows.iter().map(PricePoint::from).collect())
    }
}
