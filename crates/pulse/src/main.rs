use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands::*, TraceLevel};
use pulse_warehouse::config::StoreKind;
use pulse_warehouse::schema::asset::load_assets;
use pulse_warehouse::{source, store, ConfigError, ObservationStore, Settings, Worker};
use std::sync::Arc;
use tracing::{debug, info, subscriber, trace, warn, Level};
use tracing_subscriber::FmtSubscriber;

mod cli;

fn preprocess(trace_level: Level) -> Result<()> {
    let my_subscriber = FmtSubscriber::builder()
        .with_max_level(trace_level)
        .finish();
    subscriber::set_global_default(my_subscriber)?;
    Ok(())
}

/// The polling worker as configured, or `None` when there is no API key.
fn worker(settings: &Settings, store: &Arc<dyn ObservationStore>) -> Result<Option<Worker>> {
    let source = match source::from_settings(settings) {
        Ok(source) => source,
        Err(ConfigError::MissingApiKey) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let assets = load_assets(settings)?;
    debug!("{} assets configured: {assets:?}", assets.len());

    let worker = Worker::new(source, store.clone(), assets)
        .delay(settings.poll_delay)
        .write_mode(settings.write_mode)
        .change_fallback(settings.change_fallback);
    Ok(Some(worker))
}

#[actix_web::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.trace {
        TraceLevel::DEBUG => Level::DEBUG,
        TraceLevel::INFO => Level::INFO,
        TraceLevel::WARN => Level::WARN,
        TraceLevel::ERROR => Level::ERROR,
    };

    preprocess(log_level)?;
    trace!("Command line input recorded: {cli:#?}");

    let settings = Settings::from_env()?;
    debug!("Settings loaded: store {:?}, provider {:?}", settings.store, settings.provider);
    let store = store::open(&settings)?;

    ////////////////////////////////////////////////////////////////////////////////////////////////////

    // cli framework:
    // "> globalpulse <COMMAND>"
    match &cli.command {
        // "> globalpulse migrate"
        Migrate => {
            if settings.store != StoreKind::Postgres {
                warn!("STORE is not postgres; nothing to migrate");
            }
            store.migrate().await?;
            info!("Schema market.observations is ready");
        }

        // "> globalpulse poll"
        // one pass over the configured assets
        // the worker migrates before its first write
        Poll => {
            match worker(&settings, &store)? {
                Some(mut worker) => {
                    let summary = worker.run_batch().await;
                    info!(
                        "Market data synced: {} stored, {} without data, {} failed",
                        summary.stored, summary.no_data, summary.failed
                    );
                }
                None => warn!("FINANCIAL_API_KEY is not set; nothing to poll"),
            }
        }

        // "> globalpulse serve"
        // scheduled polling plus the HTTP API
        Serve => {
            let polling = match worker(&settings, &store)? {
                Some(worker) => {
                    info!(
                        "Polling every {} s, {} s between provider calls",
                        settings.poll_interval.as_secs(),
                        settings.poll_delay.as_secs()
                    );
                    Some(tokio::spawn(worker.run(settings.poll_interval)))
                }
                None => {
                    warn!("FINANCIAL_API_KEY is not set; polling disabled, serving stored data only");
                    None
                }
            };

            // a store that is down is not fatal: the endpoints answer 500 until it is back
            let served = pulse_web::start(store.clone(), &settings).await?.await;

            if let Some(handle) = polling {
                handle.abort();
            }
            served?;
        }
    }

    store.close();
    info!("Shut down");
    Ok(())
}
