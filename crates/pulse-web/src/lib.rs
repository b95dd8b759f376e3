//! HTTP layer of GlobalPulse: JSON report endpoints over the warehouse [`Reports`].
use actix_web::{dev::Server, middleware::Logger, web, App, HttpServer};
use pulse_warehouse::{ObservationStore, Reports, Settings};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use utoipa::OpenApi;
use utoipa_redoc::{Redoc, Servable};

pub mod api;

use api::*;

/// Register the API routes and their documentation.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(report::report)
        .service(live::live)
        .service(history::history)
        .service(health)
        .service(openapi_json)
        .service(Redoc::with_url("/redoc", ApiDoc::openapi()));
}

/// Bind the server; the returned [`Server`] runs when awaited.
pub fn server(reports: Reports, settings: &Settings) -> std::io::Result<Server> {
    let static_dir: Option<PathBuf> = settings.static_dir.clone();
    let addr = (settings.bind_addr.clone(), settings.port);

    let server = HttpServer::new(move || {
        let mut app = App::new()
            .wrap(Logger::default())
            .app_data(web::Data::new(reports.clone()))
            .configure(configure);

        // the dashboard, if any, is mounted last so the api routes win
        if let Some(dir) = &static_dir {
            app = app.service(actix_files::Files::new("/", dir.clone()).index_file("index.html"));
        }
        app
    })
    .bind(&addr)?
    .run();

    info!("System online: http://{}:{}", addr.0, addr.1);
    Ok(server)
}

/// Migrate the store and bind the server over it.
///
/// A store that is down is logged and the server binds anyway; its endpoints answer 500 until
/// the store is back.
pub async fn start(
    store: Arc<dyn ObservationStore>,
    settings: &Settings,
) -> std::io::Result<Server> {
    if let Err(e) = store.migrate().await {
        error!("Store unavailable at start-up: {e}");
    }
    server(Reports::from_settings(store, settings), settings)
}
