//! Server entry point: config validation, pools, schema bootstrap, stale
//! job recovery, queue workers, periodic tickers, graceful shutdown.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use creator_analytics_backend::services::audits::AuditJobHandler;
use creator_analytics_backend::services::job_queue::{
    JobHandler, AUDIT_QUEUE, MEDIA_QUEUE, TRANSCRIPT_QUEUE,
};
use creator_analytics_backend::services::media::MediaJobHandler;
use creator_analytics_backend::services::transcripts::TranscriptJobHandler;
use creator_analytics_backend::{config::AppConfig, create_router, database, recovery, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn,hyper=warn")),
        )
        .init();

    let config = Arc::new(AppConfig::from_env()?);
    // Fail loudly before binding the port when secrets are defaults.
    config.validate_security()?;

    let db_pool = database::create_pool(&config.database).await?;
    let redis_pool = database::create_redis_pool(&config.redis)?;

    if config.auto_create_db_schema {
        if let Err(err) = database::bootstrap_schema(&db_pool).await {
            tracing::warn!(error = %err, "database bootstrap skipped");
        }
    }

    // Stale in-flight jobs from a previous process get failed out.
    recovery::recover_stalled_jobs(&db_pool).await;

    let state = AppState::build(db_pool.clone(), redis_pool, config.clone());

    // Shutdown fan-out: workers and tickers exit when this flips.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut background_tasks = Vec::new();

    // Queue workers.
    let audit_handler: Arc<dyn JobHandler> = Arc::new(AuditJobHandler {
        service: state.audits.clone(),
    });
    background_tasks.push(tokio::spawn(state.queue.clone().run_worker(
        AUDIT_QUEUE,
        audit_handler,
        shutdown_rx.clone(),
    )));

    let media_handler: Arc<dyn JobHandler> = Arc::new(MediaJobHandler {
        service: state.media.clone(),
    });
    background_tasks.push(tokio::spawn(state.queue.clone().run_worker(
        MEDIA_QUEUE,
        media_handler,
        shutdown_rx.clone(),
    )));

    let transcript_handler: Arc<dyn JobHandler> = Arc::new(TranscriptJobHandler {
        service: state.transcripts.clone(),
    });
    background_tasks.push(tokio::spawn(state.queue.clone().run_worker(
        TRANSCRIPT_QUEUE,
        transcript_handler,
        shutdown_rx.clone(),
    )));

    // Periodic outcome recalibration.
    let recalibrate_minutes = config.scheduler.outcome_recalibrate_interval_minutes;
    if config.features.outcome_learning_enabled && recalibrate_minutes > 0 {
        let outcomes = state.outcomes.clone();
        let mut shutdown = shutdown_rx.clone();
        background_tasks.push(tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(Duration::from_secs(recalibrate_minutes as u64 * 60));
            ticker.tick().await; // skip the immediate tick
            loop {
                tokio::select! {
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() { break; }
                    }
                    _ = ticker.tick() => {
                        match outcomes.recalibrate_all_users().await {
                            Ok(report) => tracing::info!(
                                refreshed = report.refreshed,
                                skipped = report.skipped,
                                "outcome recalibration tick"
                            ),
                            Err(err) => tracing::warn!(error = %err, "outcome recalibration tick failed"),
                        }
                    }
                }
            }
        }));
        tracing::info!(
            interval_minutes = recalibrate_minutes,
            "outcome recalibration loop enabled"
        );
    }

    // Periodic feed auto-ingest.
    let ingest_minutes = config.scheduler.feed_auto_ingest_interval_minutes;
    if config.features.research_enabled
        && config.features.feed_auto_ingest_enabled
        && ingest_minutes > 0
    {
        let feed = state.feed.clone();
        let mut shutdown = shutdown_rx.clone();
        background_tasks.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(ingest_minutes as u64 * 60));
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() { break; }
                    }
                    _ = ticker.tick() => {
                        match feed.run_due_auto_ingest(25).await {
                            Ok(report) if report.scheduled_count > 0 => tracing::info!(
                                scheduled = report.scheduled_count,
                                completed = report.completed_count,
                                failed = report.failed_count,
                                "feed auto-ingest tick"
                            ),
                            Ok(_) => {}
                            Err(err) => tracing::warn!(error = %err, "feed auto-ingest tick failed"),
                        }
                    }
                }
            }
        }));
        tracing::info!(interval_minutes = ingest_minutes, "feed auto-ingest loop enabled");
    }

    let bind_address = config.server.bind_address();
    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    tracing::info!(address = %bind_address, "creator analytics backend listening");

    let router = create_router(state);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Stop workers + tickers cooperatively.
    let _ = shutdown_tx.send(true);
    for task in background_tasks {
        let _ = task.await;
    }
    tracing::info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("install ctrl-c handler");
    };
    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("install sigterm handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
