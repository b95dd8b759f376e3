use crate::api::ClientQuoteExt;
use crate::schema::{AssetSpec, SourceParams};
use crate::source::{parse_percent, parse_price, Quote, QuoteSource, SourceError};
use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::Deserialize;
use serde_json::Value;
use tracing::trace;

const QUOTE_URL: &str = "https://api.twelvedata.com/quote";

pub struct TwelveData {
    client: HttpClient,
    api_key: String,
}

impl TwelveData {
    pub fn new(client: HttpClient, api_key: String) -> Self {
        Self { client, api_key }
    }
}

#[async_trait]
impl QuoteSource for TwelveData {
    fn name(&self) -> &'static str {
        "twelve-data"
    }

    async fn quote(&self, asset: &AssetSpec) -> Result<Option<Quote>, SourceError> {
        let SourceParams::TwelveData { symbol } = &asset.source else {
            return Err(SourceError::Unsupported(asset.id.clone(), self.name()));
        };

        trace!("Twelve Data quote for {symbol}");
        let body = self
            .client
            .get_json(
                QUOTE_URL,
                &[("symbol", symbol.as_str()), ("apikey", self.api_key.as_str())],
            )
            .await?;
        quote(body)
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////////////

// {
//   "symbol": "XAU/USD",
//   "name": "Gold Spot / US Dollar",
//   "close": "2345.10000",
//   "percent_change": "0.52134",
//   ...
// }
//
// errors come back as { "code": 401, "message": "...", "status": "error" }
#[derive(Deserialize, Debug)]
struct QuoteBody {
    status: Option<String>,
    message: Option<String>,
    close: Option<Value>,
    percent_change: Option<Value>,
}

fn quote(body: Value) -> Result<Option<Quote>, SourceError> {
    let body: QuoteBody = serde_json::from_value(body)?;

    if body.status.as_deref() == Some("error") {
        return Err(SourceError::Provider(
            body.message.unwrap_or_else(|| "unknown error".to_string()),
        ));
    }

    Ok(body.close.as_ref().and_then(parse_price).map(|price| Quote {
        price,
        change_pct: body.percent_change.as_ref().and_then(parse_percent),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reads_quote() {
        let body = json!({
            "symbol": "XAU/USD",
            "close": "2345.10000",
            "percent_change": "0.52"
        });
        let quote = quote(body).unwrap().unwrap();
        assert_eq!(quote.price, 2345.1);
        assert_eq!(quote.change_pct, Some(0.52));
    }

    #[test]
    fn error_status_is_a_provider_error() {
        let body = json!({ "code": 401, "message": "apikey is invalid", "status": "error" });
        assert!(matches!(quote(body), Err(SourceError::Provider(msg)) if msg == "apikey is invalid"));
    }

    #[test]
    fn missing_close_is_no_data() {
        assert_eq!(quote(json!({ "symbol": "IBM" })).unwrap(), None);
    }
}
