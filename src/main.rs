use background_service::{AlertPoller, DesktopNotifier, PollerConfig, StatusLog};
use database::Database;
use deskalert_core::{AppConfig, CoreError, ErrorReporter, LogLevel, StatusEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;
use web_client::HttpFetcher;

#[tokio::main]
async fn main() -> Result<(), CoreError> {
    let config = AppConfig::load()?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!("Starting Deskalert alert poller");

    let reporter = ErrorReporter::new();
    if let Err(e) = run(config).await {
        reporter.report_error(&e);
        return Err(e);
    }
    Ok(())
}

async fn run(config: AppConfig) -> Result<(), CoreError> {
    let mut database = Database::new(config.database_url.clone());
    database.connect().await?;
    database.run_migrations().await?;
    let database = Arc::new(database);

    let fetcher = Arc::new(HttpFetcher::from_settings(&config.fetcher)?);
    let poller = AlertPoller::new(
        database.clone(),
        fetcher,
        PollerConfig::from(&config.poller),
    );

    let status_log = Arc::new(StatusLog::new(config.notifications.status_log_capacity));
    poller.subscribe(status_log.clone());
    if config.notifications.desktop {
        poller.subscribe(Arc::new(DesktopNotifier::default()));
    }
    let log_writer = tokio::spawn(persist_status_events(
        database.clone(),
        poller.status_channel(),
    ));

    poller.start()?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested");

    // An in-flight fetch is allowed to finish, but don't wait forever
    if tokio::time::timeout(
        config.poller.fetch_timeout() + config.poller.interval(),
        poller.shutdown(),
    )
    .await
    .is_err()
    {
        tracing::warn!("Alert poller did not stop in time");
    }
    drop(poller);

    if tokio::time::timeout(Duration::from_secs(5), log_writer)
        .await
        .is_err()
    {
        tracing::warn!("Log writer did not drain in time");
    }

    tracing::info!("{} status events this session", status_log.len());
    database.close().await;
    Ok(())
}

/// Writes every status event to the persisted log until the poller goes away.
async fn persist_status_events(
    database: Arc<Database>,
    mut events: mpsc::UnboundedReceiver<StatusEvent>,
) {
    while let Some(event) = events.recv().await {
        if let Err(e) = database
            .append_log(LogLevel::from(event.kind), &event.message)
            .await
        {
            tracing::error!("Failed to persist status event: {}", e);
        }
    }
}
