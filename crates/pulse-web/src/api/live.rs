use crate::api::store_failure;
use actix_web::{get, web, HttpResponse, Responder};
use chrono::{DateTime, Utc};
use pulse_warehouse::{Observation, Reports};
use serde::{Deserialize, Serialize};

/// Latest row per asset.
///
/// ```json
/// [
///     {
///         "symbol": "BTC",
///         "name": "Bitcoin",
///         "category": "crypto",
///         "price": 64012.55,
///         "change_percent": null,
///         "change_synthesized": false,
///         "captured_at": "2024-05-03T09:40:15Z"
///     },
///     ...
/// ]
/// ```
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct LiveRow {
    pub symbol: String,
    pub name: String,
    pub category: String,
    pub price: f64,
    pub change_percent: Option<f64>,
    pub change_synthesized: bool,
    pub captured_at: DateTime<Utc>,
}

impl From<Observation> for LiveRow {
    fn from(obs: Observation) -> Self {
        Self {
            symbol: obs.asset_id,
            name: obs.display_name,
            category: obs.category.to_string(),
            price: obs.price,
            change_percent: obs.change_pct,
            change_synthesized: obs.change_synthesized,
            captured_at: obs.captured_at,
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/live",
    responses(
        (
            status = 200, description = "Most recent observation of every polled asset",
            body = [LiveRow], content_type = "application/json"
        ),
        (status = 500, description = "Store unavailable", body = crate::api::ErrorBody)
    )
)]
#[get("/api/live")]
pub async fn live(reports: web::Data<Reports>) -> impl Responder {
    match reports.latest().await {
        Ok(rows) => {
            let data: Vec<LiveRow> = rows.into_iter().map(LiveRow::from).collect();
            HttpResponse::Ok().json(data)
        }
        Err(e) => store_failure(e),
    }
}
