use crate::source::SourceError;
use reqwest::Client as HttpClient;
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, trace};

/// Build the one HTTP client shared by a quote source; every request is bounded by `timeout`.
pub fn build_client(timeout: Duration) -> Result<HttpClient, SourceError> {
    Ok(reqwest::ClientBuilder::new()
        .user_agent(concat!("globalpulse/", env!("CARGO_PKG_VERSION")))
        .timeout(timeout)
        .build()?)
}

/// JSON fetching for quote providers.
///
/// Providers answer errors in the body as often as in the status line, so the raw
/// [`serde_json::Value`] is returned and each source decides what a valid payload looks like.
pub trait ClientQuoteExt {
    fn get_json(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> impl Future<Output = Result<Value, SourceError>> + Send;
}

impl ClientQuoteExt for HttpClient {
    async fn get_json(&self, url: &str, query: &[(&str, &str)]) -> Result<Value, SourceError> {
        // the query carries the api key, so only the base url is ever logged
        trace!("GET {url}");
        let response = self
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| {
                debug!("request to {url} failed: {e}");
                e
            })?
            .error_for_status()?;

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| {
            debug!("undecodable body from {url}: {e}");
            SourceError::Decode(e)
        })
    }
}
