use crate::config::DbSettings;
use crate::schema::{Category, Observation};
use crate::store::{ObservationStore, StoreError, WriteMode};
use async_trait::async_trait;
use deadpool_postgres::{Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime};
use tokio_postgres::{NoTls, Row};
use tracing::{debug, trace};

//////////////////////////////////////////////////////////////////////////////////////

static MIGRATION: &str = "
    CREATE SCHEMA IF NOT EXISTS market;

    CREATE TABLE IF NOT EXISTS market.observations (
        id                  BIGSERIAL PRIMARY KEY,
        asset_id            TEXT NOT NULL,
        display_name        TEXT NOT NULL,
        category            TEXT NOT NULL,
        price               DOUBLE PRECISION NOT NULL CHECK (price > 0),
        change_pct          DOUBLE PRECISION,
        change_synthesized  BOOLEAN NOT NULL DEFAULT FALSE,
        captured_at         TIMESTAMPTZ NOT NULL,
        captured_on         DATE NOT NULL
    );

    CREATE INDEX IF NOT EXISTS observations_asset_time
        ON market.observations (asset_id, captured_at DESC);
";

static INSERT_QUERY: &str = "
    INSERT INTO market.observations (
        asset_id,
        display_name,
        category,
        price,
        change_pct,
        change_synthesized,
        captured_at,
        captured_on
    )
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
";

static UPDATE_DAY_QUERY: &str = "
    UPDATE market.observations
    SET
        display_name = $2,
        category = $3,
        price = $4,
        change_pct = $5,
        change_synthesized = $6,
        captured_at = $7
    WHERE asset_id = $1 AND captured_on = $8
";

// `id` breaks timestamp ties in favour of the row inserted last
static LATEST_QUERY: &str = "
    SELECT DISTINCT ON (asset_id)
        asset_id,
        display_name,
        category,
        price,
        change_pct,
        change_synthesized,
        captured_at
    FROM market.observations
    ORDER BY asset_id, captured_at DESC, id DESC
";

static RECENT_QUERY: &str = "
    SELECT
        asset_id,
        display_name,
        category,
        price,
        change_pct,
        change_synthesized,
        captured_at
    FROM market.observations
    WHERE asset_id = ANY($1)
    ORDER BY captured_at DESC, id DESC
    LIMIT $2
";

//////////////////////////////////////////////////////////////////////////////////////

/// PostgreSQL store behind a bounded [`deadpool_postgres`] pool.
///
/// When every connection is checked out, callers wait for one to be returned.
pub struct PgStore {
    pool: Pool,
}

impl PgStore {
    /// Build the pool; no connection is opened until the first query.
    pub fn connect(db: &DbSettings) -> Result<Self, StoreError> {
        let mut cfg = Config::new();
        cfg.host = Some(db.host.clone());
        cfg.port = Some(db.port);
        cfg.user = Some(db.user.clone());
        cfg.password = db.password.clone();
        cfg.dbname = Some(db.name.clone());
        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });
        cfg.pool = Some(PoolConfig::new(db.pool_size));

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| StoreError::Build(e.to_string()))?;
        debug!(
            "PostgreSQL pool for {}@{}:{}/{} (max {} connections)",
            db.user, db.host, db.port, db.name, db.pool_size
        );

        Ok(Self { pool })
    }
}

#[async_trait]
impl ObservationStore for PgStore {
    async fn migrate(&self) -> Result<(), StoreError> {
        let conn = self.pool.get().await?;
        conn.batch_execute(MIGRATION).await?;
        debug!("market.observations is in place");
        Ok(())
    }

    async fn record(&self, obs: &Observation, mode: WriteMode) -> Result<(), StoreError> {
        let mut conn = self.pool.get().await?;
        let category = obs.category.as_str();
        let day = obs.day();

        // update-then-insert runs in one transaction so readers never see the gap
        let transaction = conn.transaction().await?;
        let updated = match mode {
            WriteMode::Append => 0,
            WriteMode::Daily => {
                let query = transaction.prepare_cached(UPDATE_DAY_QUERY).await?;
                transaction
                    .execute(
                        &query,
                        &[
                            &obs.asset_id,
                            &obs.display_name,
                            &category,
                            &obs.price,
                            &obs.change_pct,
                            &obs.change_synthesized,
                            &obs.captured_at,
                            &day,
                        ],
                    )
                    .await?
            }
        };

        if updated == 0 {
            let query = transaction.prepare_cached(INSERT_QUERY).await?;
            transaction
                .execute(
                    &query,
                    &[
                        &obs.asset_id,
                        &obs.display_name,
                        &category,
                        &obs.price,
                        &obs.change_pct,
                        &obs.change_synthesized,
                        &obs.captured_at,
                        &day,
                    ],
                )
                .await?;
        }
        transaction.commit().await?;

        trace!("recorded {} ({mode:?}, {updated} overwritten)", obs.asset_id);
        Ok(())
    }

    async fn latest_per_asset(&self) -> Result<Vec<Observation>, StoreError> {
        let conn = self.pool.get().await?;
        let query = conn.prepare_cached(LATEST_QUERY).await?;
        let rows = conn.query(&query, &[]).await?;
        Ok(rows.iter().map(observation).collect())
    }

    async fn recent_for(
        &self,
        asset_ids: &[String],
        limit: usize,
    ) -> Result<Vec<Observation>, StoreError> {
        let conn = self.pool.get().await?;
        let query = conn.prepare_cached(RECENT_QUERY).await?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = conn.query(&query, &[&asset_ids, &limit]).await?;

        // newest first from the database, oldest first to the caller
        let mut history: Vec<Observation> = rows.iter().map(observation).collect();
        history.reverse();
        Ok(history)
    }

    fn close(&self) {
        self.pool.close();
    }
}

fn observation(row: &Row) -> Observation {
    let category: String = row.get("category");
    Observation {
        asset_id: row.get("asset_id"),
        display_name: row.get("display_name"),
        category: Category::parse(&category),
        price: row.get("price"),
        change_pct: row.get("change_pct"),
        change_synthesized: row.get("change_synthesized"),
        captured_at: row.get("captured_at"),
    }
}

// needs a live database: DATABASE_URL=postgres://... cargo test -- --ignored
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use tokio_postgres::config::Host;

    fn settings_from_url() -> Option<DbSettings> {
        let url = std::env::var("DATABASE_URL").ok()?;
        let cfg: tokio_postgres::Config = url.parse().ok()?;
        let host = match cfg.get_hosts().first() {
            Some(Host::Tcp(host)) => host.clone(),
            _ => "localhost".to_string(),
        };
        Some(DbSettings {
            host,
            port: cfg.get_ports().first().copied().unwrap_or(5432),
            user: cfg.get_user().unwrap_or("postgres").to_string(),
            password: cfg
                .get_password()
                .map(|p| String::from_utf8_lossy(p).into_owned()),
            name: cfg.get_dbname().unwrap_or("globalpulse").to_string(),
            pool_size: 2,
        })
    }

    async fn store() -> Option<PgStore> {
        let store = PgStore::connect(&settings_from_url()?).unwrap();
        store.migrate().await.unwrap();
        Some(store)
    }

    // ids are unique per run so reruns against the same database do not collide
    fn unique(id: &str) -> String {
        format!("{id}-{}", Utc::now().timestamp_nanos_opt().unwrap_or_default())
    }

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 3, hour, minute, 0).unwrap()
    }

    fn obs(id: &str, price: f64, captured_at: DateTime<Utc>) -> Observation {
        Observation {
            asset_id: id.to_string(),
            display_name: id.to_string(),
            category: Category::Stock,
            price,
            change_pct: Some(0.5),
            change_synthesized: false,
            captured_at,
        }
    }

    async fn latest_of(store: &PgStore, id: &str) -> Vec<Observation> {
        let latest = store.latest_per_asset().await.unwrap();
        latest.into_iter().filter(|o| o.asset_id == id).collect()
    }

    #[tokio::test]
    #[ignore]
    async fn latest_breaks_timestamp_ties_by_insert_order() {
        let Some(store) = store().await else { return };
        let id = unique("TIE");

        store.record(&obs(&id, 1.0, at(9, 0)), WriteMode::Append).await.unwrap();
        store.record(&obs(&id, 2.0, at(9, 30)), WriteMode::Append).await.unwrap();
        store.record(&obs(&id, 3.0, at(9, 30)), WriteMode::Append).await.unwrap();

        let latest = latest_of(&store, &id).await;
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].price, 3.0);
        assert_eq!(latest[0].captured_at, at(9, 30));
    }

    #[tokio::test]
    #[ignore]
    async fn daily_mode_overwrites_the_day_row() {
        let Some(store) = store().await else { return };
        let id = unique("DAY");

        store.record(&obs(&id, 1.0, at(9, 0)), WriteMode::Daily).await.unwrap();
        store.record(&obs(&id, 2.0, at(15, 0)), WriteMode::Daily).await.unwrap();

        let history = store.recent_for(&[id.clone()], 10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].price, 2.0);
        assert_eq!(history[0].captured_at, at(15, 0));

        // append still adds rows next to the day row
        store.record(&obs(&id, 3.0, at(16, 0)), WriteMode::Append).await.unwrap();
        assert_eq!(store.recent_for(&[id], 10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    #[ignore]
    async fn recent_is_bounded_and_ascending() {
        let Some(store) = store().await else { return };
        let ibm = unique("IBM");
        let btc = unique("BTC");

        for minute in 0..5 {
            let price = 100.0 + minute as f64;
            store.record(&obs(&ibm, price, at(10, minute)), WriteMode::Append).await.unwrap();
        }
        store.record(&obs(&btc, 64000.0, at(10, 30)), WriteMode::Append).await.unwrap();

        let history = store.recent_for(&[ibm.clone(), btc.clone()], 3).await.unwrap();
        let prices: Vec<f64> = history.iter().map(|o| o.price).collect();
        assert_eq!(prices, vec![103.0, 104.0, 64000.0]);
        assert!(history.windows(2).all(|w| w[0].captured_at <= w[1].captured_at));

        store.close();
    }
}
