use crate::api::store_failure;
use actix_web::{get, web, HttpResponse, Responder};
use chrono::{DateTime, Utc};
use pulse_warehouse::{Observation, Reports, Snapshot};
use serde::{Deserialize, Serialize};

////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////

/// Dashboard report built from the latest observation of every asset.
///
/// ```json
/// {
///     "timestamp": "2024-05-03T09:41:00Z",
///     "summary": { "volume": "4 assets", "sentiment": "Bullish" },
///     "commodities": [ { "name": "Brent Crude Oil", "value": 82.4, "change": 1.2 } ],
///     "currencies": [ { "name": "EUR / USD", "value": 1.0712, "change": null } ],
///     "stocks": [ ... ],
///     "other": [ ... ]
/// }
/// ```
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct ReportBody {
    pub timestamp: DateTime<Utc>,
    pub summary: Summary,
    pub commodities: Vec<ReportEntry>,
    /// Fiat and crypto.
    pub currencies: Vec<ReportEntry>,
    pub stocks: Vec<ReportEntry>,
    /// Categories the dashboard has no card for.
    pub other: Vec<ReportEntry>,
}

#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct Summary {
    pub volume: String,
    pub sentiment: String,
}

#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct ReportEntry {
    pub name: String,
    pub value: f64,
    /// Provider-reported change only; `null` when unknown or synthesized.
    pub change: Option<f64>,
}

impl From<&Observation> for ReportEntry {
    fn from(obs: &Observation) -> Self {
        Self {
            name: obs.display_name.clone(),
            value: obs.price,
            change: obs.reported_change(),
        }
    }
}

impl From<Snapshot> for ReportBody {
    fn from(snapshot: Snapshot) -> Self {
        let entries = |buckets: &[&str]| -> Vec<ReportEntry> {
            buckets
                .iter()
                .flat_map(|bucket| snapshot.bucket(bucket))
                .map(ReportEntry::from)
                .collect()
        };

        Self {
            timestamp: snapshot.timestamp,
            summary: Summary {
                volume: format!("{} assets", snapshot.asset_count()),
                sentiment: snapshot.sentiment().to_string(),
            },
            commodities: entries(&["commodity"]),
            currencies: entries(&["currency", "crypto"]),
            stocks: entries(&["stock"]),
            other: entries(&["other"]),
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/report",
    responses(
        (
            status = 200, description = "Latest snapshot grouped for the dashboard cards",
            body = ReportBody, content_type = "application/json"
        ),
        (status = 500, description = "Store unavailable", body = crate::api::ErrorBody)
    )
)]
#[get("/api/report")]
pub async fn report(reports: web::Data<Reports>) -> impl Responder {
    match reports.get_latest().await {
        Ok(snapshot) => HttpResponse::Ok().json(ReportBody::from(snapshot)),
        Err(e) => store_failure(e),
    }
}
