mod cache;
mod config;
mod error;
mod extractor;
mod formats;
mod humanize;
mod links;
mod notify;
mod routes;
mod service;
#[cfg(test)]
mod testing;

use std::{io, sync::Arc};

use tokio::{net::TcpListener, time::Duration};
use tracing::{error, info, warn};

use crate::{
    cache::DownloadCache,
    config::Config,
    extractor::YtDlp,
    notify::{LogNotifier, NotificationSink, WebhookNotifier},
    routes::AppState,
    service::SpaceService,
};

const WEBHOOK_TIMEOUT_SECONDS: u64 = 10;

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    let default_filter = if config.debug {
        "space_fetch=debug,tower_http=debug"
    } else {
        "space_fetch=info,tower_http=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.to_string()),
        )
        .init();

    for warning in &config.warnings {
        warn!("{warning}");
    }

    if let Err(error) = run(config).await {
        error!("Server error: {error}");
        std::process::exit(1);
    }
}

async fn run(config: Config) -> io::Result<()> {
    let cache = DownloadCache::new(&config.download_dir);
    cache.prepare().await.map_err(|error| {
        io::Error::other(format!(
            "could not create download directory {}: {error}",
            config.download_dir.display()
        ))
    })?;

    let extractor = Arc::new(YtDlp::new(&config.yt_dlp_bin, config.yt_dlp_timeout));
    let notifier: Arc<dyn NotificationSink> = match &config.notify_webhook {
        Some(endpoint) => {
            let client = reqwest::Client::builder()
                .timeout(Duration::from_secs(WEBHOOK_TIMEOUT_SECONDS))
                .build()
                .map_err(|error| io::Error::other(format!("could not build HTTP client: {error}")))?;
            info!("Notifications delivered to webhook {endpoint}");
            Arc::new(WebhookNotifier::new(client, endpoint.clone()))
        }
        None => {
            info!("NOTIFY_WEBHOOK_URL not set; notifications are only logged.");
            Arc::new(LogNotifier)
        }
    };

    let state = AppState {
        service: Arc::new(SpaceService::new(extractor, cache, notifier)),
        deployment: config.deployment,
    };
    let app = routes::router(state);

    let listener = TcpListener::bind(&config.bind_addr).await.map_err(|error| {
        io::Error::other(format!("could not bind {}: {error}", config.bind_addr))
    })?;

    info!(
        "Space downloader ({:?}) listening on http://{}",
        config.deployment, config.bind_addr
    );
    info!("Download directory: {}", config.download_dir.display());

    axum::serve(listener, app).await
}
