use crate::api::ClientQuoteExt;
use crate::schema::{AssetSpec, SourceParams};
use crate::source::{parse_percent, parse_price, Quote, QuoteSource, SourceError};
use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::Deserialize;
use serde_json::Value;
use tracing::trace;

const BASE_URL: &str = "https://www.alphavantage.co/query";

/// Alpha Vantage keys that carry an error instead of data; a rate limit arrives as a `Note`
/// or `Information` with a 200 status.
const ERROR_KEYS: [&str; 3] = ["Error Message", "Note", "Information"];

////////////////////////////////////////////////////////////////////////////////////////////////////////////

pub struct AlphaVantage {
    client: HttpClient,
    api_key: String,
}

impl AlphaVantage {
    pub fn new(client: HttpClient, api_key: String) -> Self {
        Self { client, api_key }
    }

    async fn query(&self, params: &[(&str, &str)]) -> Result<Value, SourceError> {
        let mut query = params.to_vec();
        query.push(("apikey", self.api_key.as_str()));
        self.client.get_json(BASE_URL, &query).await
    }
}

#[async_trait]
impl QuoteSource for AlphaVantage {
    fn name(&self) -> &'static str {
        "alpha-vantage"
    }

    async fn quote(&self, asset: &AssetSpec) -> Result<Option<Quote>, SourceError> {
        trace!("Alpha Vantage quote for {}", asset.id);
        match &asset.source {
            SourceParams::GlobalQuote { symbol } => {
                let body = self
                    .query(&[("function", "GLOBAL_QUOTE"), ("symbol", symbol.as_str())])
                    .await?;
                global_quote(body)
            }
            SourceParams::ExchangeRate { from, to } => {
                let body = self
                    .query(&[
                        ("function", "CURRENCY_EXCHANGE_RATE"),
                        ("from_currency", from.as_str()),
                        ("to_currency", to.as_str()),
                    ])
                    .await?;
                exchange_rate(body)
            }
            SourceParams::Commodity { function } => {
                let body = self
                    .query(&[("function", function.as_str()), ("interval", "daily")])
                    .await?;
                commodity(body)
            }
            SourceParams::TwelveData { .. } => {
                Err(SourceError::Unsupported(asset.id.clone(), self.name()))
            }
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////////////
//
// Deserialization
//
////////////////////////////////////////////////////////////////////////////////////////////////////////////

// {
//   "Global Quote": {
//     "01. symbol": "IBM",
//     "05. price": "182.5200",
//     "10. change percent": "1.2000%",
//     ...
//   }
// }
#[derive(Deserialize, Debug)]
struct GlobalQuoteBody {
    #[serde(rename = "Global Quote")]
    quote: Option<GlobalQuote>,
}

#[derive(Deserialize, Debug)]
struct GlobalQuote {
    #[serde(rename = "05. price")]
    price: Option<Value>,
    #[serde(rename = "10. change percent")]
    change_percent: Option<Value>,
}

// {
//   "Realtime Currency Exchange Rate": {
//     "1. From_Currency Code": "BTC",
//     "5. Exchange Rate": "64012.55000000",
//     ...
//   }
// }
#[derive(Deserialize, Debug)]
struct ExchangeRateBody {
    #[serde(rename = "Realtime Currency Exchange Rate")]
    rate: Option<ExchangeRate>,
}

#[derive(Deserialize, Debug)]
struct ExchangeRate {
    #[serde(rename = "5. Exchange Rate")]
    rate: Option<Value>,
}

// {
//   "name": "Crude Oil Prices Brent",
//   "interval": "daily",
//   "data": [
//     { "date": "2024-05-02", "value": "82.40" },   <-- newest first
//     { "date": "2024-05-01", "value": "." },       <-- missing value
//     ...
//   ]
// }
#[derive(Deserialize, Debug)]
struct CommodityBody {
    #[serde(default)]
    data: Vec<CommodityPoint>,
}

#[derive(Deserialize, Debug)]
struct CommodityPoint {
    value: Option<Value>,
}

fn check_error(body: &Value) -> Result<(), SourceError> {
    for key in ERROR_KEYS {
        if let Some(message) = body.get(key) {
            let message = message.as_str().map_or_else(|| message.to_string(), str::to_string);
            return Err(SourceError::Provider(message));
        }
    }
    Ok(())
}

fn global_quote(body: Value) -> Result<Option<Quote>, SourceError> {
    check_error(&body)?;
    let body: GlobalQuoteBody = serde_json::from_value(body)?;

    Ok(body.quote.and_then(|quote| {
        let price = quote.price.as_ref().and_then(parse_price)?;
        Some(Quote {
            price,
            change_pct: quote.change_percent.as_ref().and_then(parse_percent),
        })
    }))
}

fn exchange_rate(body: Value) -> Result<Option<Quote>, SourceError> {
    check_error(&body)?;
    let body: ExchangeRateBody = serde_json::from_value(body)?;

    // the exchange rate endpoint has no change figure
    Ok(body
        .rate
        .and_then(|rate| rate.rate.as_ref().and_then(parse_price))
        .map(|price| Quote {
            price,
            change_pct: None,
        }))
}

fn commodity(body: Value) -> Result<Option<Quote>, SourceError> {
    check_error(&body)?;
    let body: CommodityBody = serde_json::from_value(body)?;

    let mut values = body
        .data
        .iter()
        .filter_map(|point| point.value.as_ref().and_then(parse_price));
    let Some(latest) = values.next() else {
        return Ok(None);
    };
    let change_pct = values
        .next()
        .map(|previous| ((latest - previous) / previous * 10_000.0).round() / 100.0);

    Ok(Some(Quote {
        price: latest,
        change_pct,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Category;
    use serde_json::json;

    #[test]
    fn reads_global_quote() {
        let body = json!({
            "Global Quote": {
                "01. symbol": "IBM",
                "05. price": "182.5200",
                "10. change percent": "1.2000%"
            }
        });
        let quote = global_quote(body).unwrap().unwrap();
        assert_eq!(quote.price, 182.52);
        assert_eq!(quote.change_pct, Some(1.2));
    }

    #[test]
    fn empty_global_quote_is_no_data() {
        assert_eq!(global_quote(json!({ "Global Quote": {} })).unwrap(), None);
        assert_eq!(global_quote(json!({})).unwrap(), None);
        let zero = json!({ "Global Quote": { "05. price": "0.0000" } });
        assert_eq!(global_quote(zero).unwrap(), None);
    }

    #[test]
    fn missing_change_is_not_invented() {
        let body = json!({ "Global Quote": { "05. price": "10" } });
        let quote = global_quote(body).unwrap().unwrap();
        assert_eq!(quote.change_pct, None);
    }

    #[test]
    fn reads_exchange_rate_without_change() {
        let body = json!({
            "Realtime Currency Exchange Rate": {
                "1. From_Currency Code": "BTC",
                "5. Exchange Rate": "64012.55000000"
            }
        });
        let quote = exchange_rate(body).unwrap().unwrap();
        assert_eq!(quote.price, 64012.55);
        assert_eq!(quote.change_pct, None);
    }

    #[test]
    fn commodity_change_uses_previous_known_value() {
        let body = json!({
            "name": "Crude Oil Prices Brent",
            "data": [
                { "date": "2024-05-03", "value": "82.40" },
                { "date": "2024-05-02", "value": "." },
                { "date": "2024-05-01", "value": "80.00" }
            ]
        });
        let quote = commodity(body).unwrap().unwrap();
        assert_eq!(quote.price, 82.4);
        assert_eq!(quote.change_pct, Some(3.0));
    }

    #[test]
    fn commodity_without_values_is_no_data() {
        let body = json!({ "data": [{ "date": "2024-05-03", "value": "." }] });
        assert_eq!(commodity(body).unwrap(), None);
    }

    #[test]
    fn rate_limit_notice_is_an_error() {
        let body = json!({ "Note": "Thank you for using Alpha Vantage! Our standard API call frequency is 5 calls per minute" });
        let err = global_quote(body).unwrap_err();
        assert!(matches!(err, SourceError::Provider(msg) if msg.contains("call frequency")));

        let body = json!({ "Error Message": "Invalid API call." });
        assert!(matches!(
            exchange_rate(body),
            Err(SourceError::Provider(_))
        ));
    }

    #[test]
    fn malformed_shape_is_a_decode_error() {
        let body = json!({ "Global Quote": "nope" });
        assert!(matches!(global_quote(body), Err(SourceError::Decode(_))));
    }

    #[tokio::test]
    async fn twelve_data_assets_are_rejected() {
        let client = HttpClient::new();
        let source = AlphaVantage::new(client, "demo".to_string());
        let asset = AssetSpec::new(
            "XAU/USD",
            "Gold",
            Category::Commodity,
            SourceParams::TwelveData {
                symbol: "XAU/USD".to_string(),
            },
        );
        let err = source.quote(&asset).await.unwrap_err();
        assert!(matches!(err, SourceError::Unsupported(id, "alpha-vantage") if id == "XAU/USD"));
    }
}
