use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

////////////////////////////////////////////////////////////////////////////////////////////////////////////

/// Asset class of an instrument.
///
/// Anything read back from the store that is not one of the known classes is kept verbatim in
/// [`Category::Other`] so it can still be reported.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Category {
    Stock,
    Crypto,
    Currency,
    Commodity,
    Other(String),
}

impl Category {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "stock" => Self::Stock,
            "crypto" => Self::Crypto,
            "currency" => Self::Currency,
            "commodity" => Self::Commodity,
            _ => Self::Other(raw.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Stock => "stock",
            Self::Crypto => "crypto",
            Self::Currency => "currency",
            Self::Commodity => "commodity",
            Self::Other(raw) => raw,
        }
    }

    /// Report grouping key; every unknown category shares the `other` bucket.
    pub fn bucket(&self) -> &'static str {
        match self {
            Self::Stock => "stock",
            Self::Crypto => "crypto",
            Self::Currency => "currency",
            Self::Commodity => "commodity",
            Self::Other(_) => "other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Category {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Category {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse(&raw))
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////////////

/// One polled price point for one asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub asset_id: String,
    pub display_name: String,
    pub category: Category,
    pub price: f64,
    /// `None` when the provider had no change figure and none was synthesized.
    pub change_pct: Option<f64>,
    /// Set when `change_pct` is a placeholder rather than provider data.
    pub change_synthesized: bool,
    pub captured_at: DateTime<Utc>,
}

impl Observation {
    /// Day key used by the daily upsert mode (UTC calendar date).
    pub fn day(&self) -> NaiveDate {
        self.captured_at.date_naive()
    }

    /// The change figure only if it came from the provider.
    pub fn reported_change(&self) -> Option<f64> {
        if self.change_synthesized {
            None
        } else {
            self.change_pct
        }
    }
}

/// A single history point, as charted by the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub captured_at: DateTime<Utc>,
    pub price: f64,
}

impl From<&Observation> for PricePoint {
    fn from(obs: &Observation) -> Self {
        Self {
            captured_at: obs.captured_at,
            price: obs.price,
        }
    }
}
