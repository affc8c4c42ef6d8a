mod backup;
mod config;
mod fetcher;
mod filter;
mod model;
mod normalizer;
mod notifier;
mod pipeline;
mod storage;

use config::AppConfig;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    init_logging();

    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            error!("configuration error: {e}");
            std::process::exit(1);
        }
    };

    info!(
        iterations = config.iterations,
        recipients = config.recipient_emails.len(),
        "starting offer pipeline"
    );

    match pipeline::run(&config).await {
        Ok(report) => {
            info!(
                pages_fetched = report.pages_fetched,
                pages_failed = report.pages_failed,
                fetched = report.fetched,
                filtered = report.filtered,
                new_offers = report.new_offers,
                notified = report.notified,
                "pipeline finished"
            );
        }
        Err(e) => {
            error!("pipeline failed: {e}");
            std::process::exit(1);
        }
    }
}

fn init_logging() {
    let level = std::env::var("LOGGING_LEVEL").unwrap_or_else(|_| "info".to_string());
    let filter = EnvFilter::try_new(&level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
