use crate::api::store_failure;
use actix_web::{get, web, HttpResponse, Responder};
use chrono::{DateTime, Utc};
use pulse_warehouse::config::split_symbols;
use pulse_warehouse::{PricePoint, Reports};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct HistoryQuery {
    /// Comma separated asset ids; defaults to the configured reference assets.
    symbols: Option<String>,
    /// Number of points, 1 to 500; defaults to the configured history limit.
    limit: Option<usize>,
}

#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct HistoryPoint {
    pub captured_at: DateTime<Utc>,
    pub price: f64,
}

impl From<PricePoint> for HistoryPoint {
    fn from(point: PricePoint) -> Self {
        Self {
            captured_at: point.captured_at,
            price: point.price,
        }
    }
}

/// Recent prices for the chart, oldest first.
///
/// ```json
/// [
///     { "captured_at": "2024-05-03T09:30:00Z", "price": 182.1 },
///     { "captured_at": "2024-05-03T09:40:00Z", "price": 182.52 }
/// ]
/// ```
#[utoipa::path(
    get,
    path = "/api/history",
    params(HistoryQuery),
    responses(
        (
            status = 200, description = "Price history of the selected assets",
            body = [HistoryPoint], content_type = "application/json"
        ),
        (status = 500, description = "Store unavailable", body = crate::api::ErrorBody)
    )
)]
#[get("/api/history")]
pub async fn history(
    query: web::Query<HistoryQuery>,
    reports: web::Data<Reports>,
) -> impl Responder {
    let query = query.into_inner();
    let symbols = query
        .symbols
        .as_deref()
        .map(split_symbols)
        .filter(|symbols| !symbols.is_empty());

    match reports.get_history(symbols.as_deref(), query.limit).await {
        Ok(points) => {
            let data: Vec<HistoryPoint> = points.into_iter().map(HistoryPoint::from).collect();
            HttpResponse::Ok().json(data)
        }
        Err(e) => store_failure(e),
    }
}
