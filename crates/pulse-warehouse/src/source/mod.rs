//! Quote sources.
//!
//! A [`QuoteSource`] turns one configured [`AssetSpec`] into at most one [`Quote`] with a
//! single provider call. Sources never panic on odd payloads; a missing or unusable price is
//! `Ok(None)` and anything the provider got wrong is a [`SourceError`].
pub mod alpha_vantage;
pub mod twelve_data;

use crate::api::build_client;
use crate::config::{ConfigError, Settings};
use crate::schema::{AssetSpec, Observation};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde_json::Value;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

pub use alpha_vantage::AlphaVantage;
pub use twelve_data::TwelveData;

////////////////////////////////////////////////////////////////////////////////////////////////////////////

/// Errors that can occur within a [`QuoteSource`].
#[derive(Debug, Error)]
pub enum SourceError {
    /// Network failure, timeout or a non-2xx status.
    #[error("request failed: {0}")]
    Request(reqwest::Error),

    /// The provider answered with an error body (bad key, rate limit, unknown symbol).
    #[error("provider error: {0}")]
    Provider(String),

    /// The body was not JSON.
    #[error("undecodable response: {0}")]
    Decode(#[from] serde_json::Error),

    /// The asset is configured for a different provider.
    #[error("asset {0} is not supported by {1}")]
    Unsupported(String, &'static str),
}

impl From<reqwest::Error> for SourceError {
    // reqwest puts the full url, api key included, into its error message
    fn from(e: reqwest::Error) -> Self {
        Self::Request(e.without_url())
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////////////

/// Which provider the deployment polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    AlphaVantage,
    TwelveData,
}

impl FromStr for Provider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "alpha-vantage" | "alphavantage" => Ok(Self::AlphaVantage),
            "twelve-data" | "twelvedata" => Ok(Self::TwelveData),
            _ => Err(()),
        }
    }
}

/// What to do when a provider has no percent change for a quote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeFallback {
    /// Store no change.
    Omit,
    /// Store a small random placeholder, flagged as synthesized.
    Synthesize,
}

impl FromStr for ChangeFallback {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "omit" | "none" => Ok(Self::Omit),
            "synthesize" | "synthesise" => Ok(Self::Synthesize),
            _ => Err(()),
        }
    }
}

impl ChangeFallback {
    /// Resolve the stored change figure and whether it is synthesized.
    pub fn resolve(self, reported: Option<f64>) -> (Option<f64>, bool) {
        match (reported, self) {
            (Some(change), _) => (Some(change), false),
            (None, Self::Omit) => (None, false),
            (None, Self::Synthesize) => {
                let raw: f64 = rand::thread_rng().gen_range(-0.5..=0.5);
                (Some((raw * 100.0).round() / 100.0), true)
            }
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////////////

/// A provider quote, before it is stamped and stored.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quote {
    pub price: f64,
    pub change_pct: Option<f64>,
}

impl Quote {
    pub fn into_observation(
        self,
        asset: &AssetSpec,
        captured_at: DateTime<Utc>,
        fallback: ChangeFallback,
    ) -> Observation {
        let (change_pct, change_synthesized) = fallback.resolve(self.change_pct);
        Observation {
            asset_id: asset.id.clone(),
            display_name: asset.name.clone(),
            category: asset.category.clone(),
            price: self.price,
            change_pct,
            change_synthesized,
            captured_at,
        }
    }
}

/// A market data provider.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    /// Short provider name used in logs.
    fn name(&self) -> &'static str;

    /// Perform one provider call for `asset`.
    ///
    /// * `Ok(Some(quote))` - a usable price
    /// * `Ok(None)` - the provider had no (positive) price for the asset
    /// * `Err(_)` - the call or the provider failed
    async fn quote(&self, asset: &AssetSpec) -> Result<Option<Quote>, SourceError>;
}

/// Build the configured provider; a missing API key is reported and disables polling.
pub fn from_settings(settings: &Settings) -> Result<Arc<dyn QuoteSource>, ConfigError> {
    let key = settings.require_api_key()?.to_string();
    let client =
        build_client(settings.http_timeout).map_err(|e| ConfigError::HttpClient(e.to_string()))?;

    Ok(match settings.provider {
        Provider::AlphaVantage => Arc::new(AlphaVantage::new(client, key)),
        Provider::TwelveData => Arc::new(TwelveData::new(client, key)),
    })
}

////////////////////////////////////////////////////////////////////////////////////////////////////////////
//
// Numeric parsing shared by the providers; they send numbers as JSON strings or numbers.
//
////////////////////////////////////////////////////////////////////////////////////////////////////////////

fn number(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|n| n.is_finite())
}

/// A price is only usable if it is a finite number above zero.
pub fn parse_price(value: &Value) -> Option<f64> {
    number(value).filter(|price| *price > 0.0)
}

/// A signed percentage, with any `%` suffix stripped.
pub fn parse_percent(value: &Value) -> Option<f64> {
    match value {
        Value::String(s) => number(&Value::String(s.trim().trim_end_matches('%').to_string())),
        other => number(other),
    }
}
