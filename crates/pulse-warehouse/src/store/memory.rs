use crate::schema::Observation;
use crate::store::{ObservationStore, StoreError, WriteMode};
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

/// In-process store with the same semantics as [`PgStore`](crate::store::PgStore).
///
/// Nothing survives a restart; used for local runs without a database and in tests.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    rows: Vec<Row>,
    next_seq: u64,
}

struct Row {
    // insertion order, the tie-breaker for identical timestamps
    seq: u64,
    obs: Observation,
}

impl Row {
    fn order_key(&self) -> (chrono::DateTime<chrono::Utc>, u64) {
        (self.obs.captured_at, self.seq)
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored rows.
    pub async fn len(&self) -> usize {
        self.inner.read().await.rows.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl ObservationStore for MemoryStore {
    async fn record(&self, obs: &Observation, mode: WriteMode) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;

        if mode == WriteMode::Daily {
            let day = obs.day();
            let mut overwritten = false;
            for row in inner
                .rows
                .iter_mut()
                .filter(|row| row.obs.asset_id == obs.asset_id && row.obs.day() == day)
            {
                row.obs = obs.clone();
                overwritten = true;
            }
            if overwritten {
                return Ok(());
            }
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.rows.push(Row {
            seq,
            obs: obs.clone(),
        });
        Ok(())
    }

    async fn latest_per_asset(&self) -> Result<Vec<Observation>, StoreError> {
        let inner = self.inner.read().await;

        let mut latest: BTreeMap<&str, &Row> = BTreeMap::new();
        for row in &inner.rows {
            let entry = latest.entry(row.obs.asset_id.as_str()).or_insert(row);
            if row.order_key() > entry.order_key() {
                *entry = row;
            }
        }

        Ok(latest.into_values().map(|row| row.obs.clone()).collect())
    }

    async fn recent_for(
        &self,
        asset_ids: &[String],
        limit: usize,
    ) -> Result<Vec<Observation>, StoreError> {
        let inner = self.inner.read().await;

        let mut rows: Vec<&Row> = inner
            .rows
            .iter()
            .filter(|row| asset_ids.contains(&row.obs.asset_id))
            .collect();
        rows.sort_by_key(|row| std::cmp::Reverse(row.order_key()));
        rows.truncate(limit);
        rows.reverse();

        Ok(rows.into_iter().map(|row| row.obs.clone()).collect())
    }
}
