use crate::config::{ConfigError, Settings};
use crate::schema::Category;
use crate::source::Provider;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

/// How an asset is requested from its provider.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum SourceParams {
    /// Alpha Vantage `GLOBAL_QUOTE`.
    GlobalQuote { symbol: String },
    /// Alpha Vantage `CURRENCY_EXCHANGE_RATE`; also used for crypto against fiat.
    ExchangeRate { from: String, to: String },
    /// Alpha Vantage commodity series, e.g. `BRENT` or `WTI`.
    Commodity { function: String },
    /// Twelve Data `/quote`.
    TwelveData { symbol: String },
}

/// A configured asset: who it is, how it is grouped, and where its quote comes from.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AssetSpec {
    pub id: String,
    pub name: String,
    pub category: Category,
    pub source: SourceParams,
}

impl AssetSpec {
    pub fn new(id: &str, name: &str, category: Category, source: SourceParams) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            category,
            source,
        }
    }
}

#[derive(Deserialize)]
struct AssetsFile {
    #[serde(rename = "asset", default)]
    assets: Vec<AssetSpec>,
}

/// Assets polled when no `ASSETS_FILE` is given.
pub fn default_assets(provider: Provider) -> Vec<AssetSpec> {
    use SourceParams::*;

    match provider {
        Provider::AlphaVantage => vec![
            AssetSpec::new(
                "IBM",
                "IBM Corp",
                Category::Stock,
                GlobalQuote {
                    symbol: "IBM".to_string(),
                },
            ),
            AssetSpec::new(
                "BTC",
                "Bitcoin",
                Category::Crypto,
                ExchangeRate {
                    from: "BTC".to_string(),
                    to: "USD".to_string(),
                },
            ),
            AssetSpec::new(
                "EUR",
                "EUR / USD",
                Category::Currency,
                ExchangeRate {
                    from: "EUR".to_string(),
                    to: "USD".to_string(),
                },
            ),
            AssetSpec::new(
                "BRENT",
                "Brent Crude Oil",
                Category::Commodity,
                Commodity {
                    function: "BRENT".to_string(),
                },
            ),
        ],
        Provider::TwelveData => [
            ("IBM", "IBM Corp", Category::Stock),
            ("BTC/USD", "Bitcoin", Category::Crypto),
            ("EUR/USD", "EUR / USD", Category::Currency),
            ("XAU/USD", "Gold", Category::Commodity),
        ]
        .into_iter()
        .map(|(symbol, name, category)| {
            AssetSpec::new(
                symbol,
                name,
                category,
                TwelveData {
                    symbol: symbol.to_string(),
                },
            )
        })
        .collect(),
    }
}

/// Assets charted when no history selector is configured: the first built-in stock and crypto.
pub fn default_history_symbols(provider: Provider) -> Vec<String> {
    let assets = default_assets(provider);
    [Category::Stock, Category::Crypto]
        .iter()
        .filter_map(|category| assets.iter().find(|asset| &asset.category == category))
        .map(|asset| asset.id.clone())
        .collect()
}

/// Parse an asset list from TOML (`[[asset]]` tables).
pub fn parse_assets(raw: &str) -> Result<Vec<AssetSpec>, String> {
    let file: AssetsFile = toml::from_str(raw).map_err(|e| e.to_string())?;

    let mut seen = HashSet::new();
    for asset in &file.assets {
        if asset.id.trim().is_empty() {
            return Err("asset with an empty id".to_string());
        }
        if !seen.insert(asset.id.as_str()) {
            return Err(format!("duplicate asset id {:?}", asset.id));
        }
    }

    Ok(file.assets)
}

/// Assets to poll: the configured file if any, otherwise the provider's built-in list.
pub fn load_assets(settings: &Settings) -> Result<Vec<AssetSpec>, ConfigError> {
    match &settings.assets_file {
        Some(path) => read_assets_file(path),
        None => Ok(default_assets(settings.provider)),
    }
}

fn read_assets_file(path: &Path) -> Result<Vec<AssetSpec>, ConfigError> {
    let fail = |reason: String| ConfigError::AssetsFile {
        path: path.to_path_buf(),
        reason,
    };
    let raw = std::fs::read_to_string(path).map_err(|e| fail(e.to_string()))?;
    parse_assets(&raw).map_err(fail)
}
