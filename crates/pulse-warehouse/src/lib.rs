//! Market data warehouse: quote sources, the observation store, the polling worker and the
//! report queries served over HTTP by `pulse-web`.
pub mod api;
pub mod config;
pub mod report;
pub mod schema;
pub mod source;
pub mod store;
pub mod worker;

pub use crate::config::{ConfigError, Settings};
pub use crate::report::{Reports, Snapshot};
pub use crate::schema::{AssetSpec, Category, Observation, PricePoint};
pub use crate::source::{QuoteSource, SourceError};
pub use crate::store::{ObservationStore, StoreError, WriteMode};
pub use crate::worker::Worker;
