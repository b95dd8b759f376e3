//! Observation storage.
//!
//! The store is the only thing the polling worker and the HTTP layer share. It is built once at
//! start-up, handed to both as an `Arc<dyn ObservationStore>`, and closed on shutdown.
pub mod memory;
pub mod postgres;

use crate::config::{Settings, StoreKind};
use crate::schema::Observation;
use async_trait::async_trait;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Errors raised by an [`ObservationStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to build connection pool: {0}")]
    Build(String),

    #[error("no database connection available: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    #[error("query failed: {0}")]
    Query(#[from] tokio_postgres::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// How the worker writes observations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Every poll is a new row.
    Append,
    /// One row per asset per UTC day; a later poll the same day overwrites it.
    Daily,
}

impl FromStr for WriteMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "append" => Ok(Self::Append),
            "daily" | "day" | "upsert" => Ok(Self::Daily),
            _ => Err(()),
        }
    }
}

#[async_trait]
pub trait ObservationStore: Send + Sync {
    /// Create whatever the store needs to exist. Idempotent.
    async fn migrate(&self) -> Result<(), StoreError> {
        Ok(())
    }

    /// Write one observation, appending or upserting by `(asset_id, day)`.
    async fn record(&self, obs: &Observation, mode: WriteMode) -> Result<(), StoreError>;

    /// The most recent observation of every asset, one row per asset, ordered by asset id.
    ///
    /// Rows sharing the latest timestamp are resolved in favour of the one written last.
    async fn latest_per_asset(&self) -> Result<Vec<Observation>, StoreError>;

    /// At most `limit` of the most recent observations among `asset_ids`, oldest first.
    async fn recent_for(
        &self,
        asset_ids: &[String],
        limit: usize,
    ) -> Result<Vec<Observation>, StoreError>;

    /// Release pooled resources; later calls fail instead of waiting.
    fn close(&self) {}
}

/// Open the configured store.
pub fn open(settings: &Settings) -> Result<Arc<dyn ObservationStore>, StoreError> {
    Ok(match settings.store {
        StoreKind::Postgres => Arc::new(PgStore::connect(&settings.db)?),
        StoreKind::Memory => Arc::new(MemoryStore::new()),
    })
}
