use actix_web::{get, HttpResponse, Responder};
use pulse_warehouse::StoreError;
use serde::{Deserialize, Serialize};
use tracing::error;
use utoipa::OpenApi;

pub mod history;
pub mod live;
pub mod report;

////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(OpenApi)]
#[openapi(
    info(title = "GlobalPulse", description = "Latest market snapshot and short price history"),
    paths(report::report, live::live, history::history, health)
)]
pub struct ApiDoc;

/// Body of every failed request.
///
/// ```json
/// { "error": "no database connection available: ..." }
/// ```
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct ErrorBody {
    pub error: String,
}

/// A store failure becomes a 500 with a JSON message; nothing partial is ever written.
pub(crate) fn store_failure(e: StoreError) -> HttpResponse {
    error!("query execution failed: {e}");
    HttpResponse::InternalServerError().json(ErrorBody {
        error: e.to_string(),
    })
}

////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Deserialize, Serialize, utoipa::ToSchema)]
pub struct Health {
    pub status: String,
}

/// Liveness; does not touch the store.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Process is up", body = Health))
)]
#[get("/health")]
pub async fn health() -> impl Responder {
    HttpResponse::Ok().json(Health {
        status: "ok".to_string(),
    })
}

#[get("/openapi.json")]
pub async fn openapi_json() -> impl Responder {
    HttpResponse::Ok().json(ApiDoc::openapi())
}
