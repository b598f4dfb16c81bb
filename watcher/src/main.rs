use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use watcher::services::{AlertSink, LogSink, TelegramSink};
use watcher::{
    AlertThrottler, AppConfig, AtomicStore, Fingerprinter, Governor, HistoryManager, Metrics,
    PatrolScheduler, RequestManager,
};

#[tokio::main]
async fn main() -> Result<()> {
    init_logging()?;

    info!("Starting page change watcher");

    let config = AppConfig::load("config").await?;

    let metrics = Arc::new(Metrics::new());
    let store = Arc::new(AtomicStore::new(&config.store_path, metrics.clone()));
    let governor = Arc::new(Governor::new());
    let requests = Arc::new(RequestManager::new(metrics.clone()));
    let fingerprinter = Arc::new(Fingerprinter::new());
    let history = Arc::new(HistoryManager::new(&config.exports_dir));
    info!("core services initialized");

    let sink: Arc<dyn AlertSink> = match &config.telegram_token {
        Some(token) => {
            info!("alert transport: telegram");
            Arc::new(TelegramSink::new(token))
        }
        None => {
            warn!("no TELEGRAM_TOKEN configured, alerts go to the log");
            Arc::new(LogSink)
        }
    };
    let throttler = Arc::new(AlertThrottler::new(governor.clone(), sink));
    info!("alert throttler started");

    let state = store.load().await?;
    info!(
        "store loaded from {}: {} users",
        config.store_path.display(),
        state.len()
    );

    let patrol = Arc::new(PatrolScheduler::new(
        store.clone(),
        requests,
        fingerprinter,
        history.clone(),
        throttler.clone(),
        governor,
        metrics.clone(),
    ));
    let patrol_task = patrol.clone().spawn();
    let cleanup_task = PatrolScheduler::spawn_cleanup(history);
    info!("patrol started");

    let port = config.port;
    let web_metrics = metrics.clone();
    let web_task = tokio::spawn(async move {
        if let Err(e) = watcher::web::start_web_server(port, web_metrics).await {
            tracing::error!("web server failed: {:#}", e);
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");

    patrol_task.abort();
    cleanup_task.abort();
    web_task.abort();
    throttler.shutdown().await;
    store.shutdown().await;

    info!("Bye");
    Ok(())
}

fn init_logging() -> Result<()> {
    let env_filter = EnvFilter::from_default_env()
        .add_directive("watcher=info".parse()?)
        .add_directive("tower_http=warn".parse()?)
        .add_directive("hyper=warn".parse()?)
        .add_directive("reqwest=warn".parse()?);

    match std::env::var("LOG_FILE").ok().filter(|p| !p.is_empty()) {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)?;
            fmt()
                .with_env_filter(env_filter)
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file))
                .init();
        }
        None => fmt().with_env_filter(env_filter).init(),
    }
    Ok(())
}
