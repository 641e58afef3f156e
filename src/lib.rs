//! Creator Analytics Backend
//!
//! A modular backend for social-video creator analytics: research corpus
//! ingestion, feed-loop orchestration, multimodal audits, optimizer
//! scoring, outcome calibration, and consolidated reports.

use axum::{
    extract::State,
    response::Json,
    routing::{delete, get, post},
    Router,
};
use sqlx::PgPool;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

pub mod config;
pub mod database;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod recovery;
pub mod services;

pub use config::{AppConfig, ConfigError};
pub use error::{AppError, ErrorResponse, Result};

use services::{
    AuditService, BlueprintService, CreditService, FeedService, JobQueueService, LlmClient,
    MediaService, OptimizerService, OutcomeService, RateLimitService, ReportService,
    ReportShareService, ResearchService, SessionTokenService, TelemetryService, TranscriptService,
};

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub redis_pool: deadpool_redis::Pool,
    pub config: Arc<AppConfig>,
    pub sessions: Arc<SessionTokenService>,
    pub rate_limiter: Arc<RateLimitService>,
    pub queue: Arc<JobQueueService>,
    pub llm: LlmClient,
    pub credits: CreditService,
    pub research: ResearchService,
    pub feed: FeedService,
    pub optimizer: OptimizerService,
    pub outcomes: OutcomeService,
    pub audits: AuditService,
    pub media: MediaService,
    pub transcripts: TranscriptService,
    pub report: ReportService,
    pub report_share: ReportShareService,
}

impl AppState {
    /// Wire every service off the shared pools + config.
    pub fn build(
        db_pool: PgPool,
        redis_pool: deadpool_redis::Pool,
        config: Arc<AppConfig>,
    ) -> Self {
        let sessions = Arc::new(SessionTokenService::new(&config.auth));
        let rate_limiter = Arc::new(RateLimitService::new(redis_pool.clone()));
        let queue = Arc::new(JobQueueService::new(redis_pool.clone()));
        let llm = LlmClient::from_config(&config.providers);

        let credits = CreditService::new(db_pool.clone(), config.credits.clone());
        let research = ResearchService::new(db_pool.clone(), config.clone());
        let optimizer = OptimizerService::new(db_pool.clone(), config.clone(), llm.clone());
        let outcomes = OutcomeService::new(db_pool.clone(), config.clone());
        let audits = AuditService::new(
            db_pool.clone(),
            config.clone(),
            llm.clone(),
            optimizer.clone(),
            queue.clone(),
        );
        let media = MediaService::new(db_pool.clone(), config.clone(), queue.clone());
        let transcripts = TranscriptService::new(
            db_pool.clone(),
            config.clone(),
            queue.clone(),
            llm.clone(),
        );
        let telemetry = TelemetryService::new(db_pool.clone());
        let feed = FeedService::new(
            db_pool.clone(),
            config.clone(),
            telemetry,
            media.clone(),
            transcripts.clone(),
            credits.clone(),
            optimizer.clone(),
            audits.clone(),
        );
        let blueprint = BlueprintService::new(db_pool.clone(), config.clone(), llm.clone());
        let report = ReportService::new(
            db_pool.clone(),
            audits.clone(),
            blueprint,
            outcomes.clone(),
        );
        let report_share = ReportShareService::new(db_pool.clone(), report.clone());

        Self {
            db_pool,
            redis_pool,
            config,
            sessions,
            rate_limiter,
            queue,
            llm,
            credits,
            research,
            feed,
            optimizer,
            outcomes,
            audits,
            media,
            transcripts,
            report,
            report_share,
        }
    }
}

/// Create the main application router.
pub fn create_router(state: AppState) -> Router {
    let protected_routes = Router::new()
        // Auth (protected)
        .route("/auth/me", get(handlers::auth::get_current_user))
        .route("/auth/logout", post(handlers::auth::logout))
        // Credits / billing
        .route("/billing/credits", get(handlers::billing::credits_summary))
        .route(
            "/billing/checkout",
            post(handlers::billing::create_checkout_session),
        )
        .route("/billing/topup", post(handlers::billing::manual_topup))
        // Research corpus
        .route("/research/import_url", post(handlers::research::import_url))
        .route("/research/capture", post(handlers::research::capture))
        .route("/research/import_csv", post(handlers::research::import_csv))
        .route("/research/search", post(handlers::research::search))
        .route(
            "/research/collections",
            get(handlers::research::list_collections),
        )
        .route("/research/items/:item_id", get(handlers::research::get_item))
        .route(
            "/research/export",
            post(handlers::research::export_collection),
        )
        // Feed loop
        .route("/feed/discover", post(handlers::feed::discover))
        .route("/feed/search", post(handlers::feed::search))
        .route(
            "/feed/favorites/toggle",
            post(handlers::feed::toggle_favorite),
        )
        .route(
            "/feed/collections/assign",
            post(handlers::feed::assign_collection),
        )
        .route("/feed/export", post(handlers::feed::export))
        .route("/feed/download/bulk", post(handlers::feed::bulk_download))
        .route(
            "/feed/download/status",
            post(handlers::feed::bulk_download_status),
        )
        .route(
            "/feed/transcripts/bulk",
            post(handlers::feed::bulk_transcripts),
        )
        .route(
            "/feed/transcripts/status",
            post(handlers::feed::bulk_transcript_status),
        )
        .route("/feed/follows/upsert", post(handlers::feed::upsert_follow))
        .route("/feed/follows", get(handlers::feed::list_follows))
        .route(
            "/feed/follows/:follow_id",
            delete(handlers::feed::delete_follow),
        )
        .route(
            "/feed/follows/ingest",
            post(handlers::feed::run_follow_ingest),
        )
        .route("/feed/follows/runs", get(handlers::feed::list_ingest_runs))
        .route(
            "/feed/repost/package",
            post(handlers::feed::create_repost_package),
        )
        .route(
            "/feed/repost/packages",
            get(handlers::feed::list_repost_packages),
        )
        .route(
            "/feed/repost/packages/:package_id",
            get(handlers::feed::get_repost_package),
        )
        .route(
            "/feed/repost/packages/:package_id/status",
            post(handlers::feed::update_repost_package_status),
        )
        .route(
            "/feed/loop/variant_generate",
            post(handlers::feed::loop_variant_generate),
        )
        .route("/feed/loop/audit", post(handlers::feed::loop_audit))
        .route("/feed/loop/summary", get(handlers::feed::loop_summary))
        .route(
            "/feed/telemetry/summary",
            get(handlers::feed::telemetry_summary),
        )
        .route(
            "/feed/telemetry/events",
            get(handlers::feed::telemetry_events),
        )
        // Optimizer
        .route(
            "/optimizer/variant_generate",
            post(handlers::optimizer::variant_generate),
        )
        .route("/optimizer/rescore", post(handlers::optimizer::rescore))
        .route(
            "/optimizer/draft_snapshot",
            post(handlers::optimizer::create_draft_snapshot)
                .get(handlers::optimizer::list_draft_snapshots),
        )
        .route(
            "/optimizer/draft_snapshot/:snapshot_id",
            get(handlers::optimizer::get_draft_snapshot),
        )
        // Outcomes
        .route("/outcomes/ingest", post(handlers::outcomes::ingest))
        .route("/outcomes/summary", get(handlers::outcomes::summary))
        .route(
            "/outcomes/recalibrate",
            post(handlers::outcomes::recalibrate),
        )
        // Audit + media
        .route("/audit/upload", post(handlers::audit::upload_video))
        .route(
            "/audit/run_multimodal",
            post(handlers::audit::run_multimodal),
        )
        .route("/audit", get(handlers::audit::list_audits))
        .route("/audit/:audit_id", get(handlers::audit::get_audit))
        .route("/media/download", post(handlers::media::create_download))
        .route(
            "/media/download/:job_id",
            get(handlers::media::get_download),
        )
        // Report
        .route("/report/latest", get(handlers::report::latest_report))
        .route("/report/share", post(handlers::report::create_share_link))
        .route("/report/:audit_id", get(handlers::report::report_by_audit))
        .layer(axum::middleware::from_fn_with_state(
            state.sessions.clone(),
            crate::middleware::auth_middleware,
        ));

    Router::new()
        // Health endpoints
        .route("/health", get(health_check))
        .route("/health/ready", get(readiness_check))
        .route("/health/live", get(liveness_check))
        // Session bootstrap (the OAuth sync mints the session token)
        .route(
            "/auth/sync/youtube",
            post(handlers::auth::sync_youtube_session),
        )
        // Signed-URL downloads (the token is the credential)
        .route(
            "/research/export/:export_id/download",
            get(handlers::research::download_export),
        )
        .route(
            "/feed/export/:export_id/download",
            get(handlers::feed::download_export),
        )
        // Public shared reports
        .route(
            "/report/shared/:share_token",
            get(handlers::report::resolve_shared_report),
        )
        .merge(protected_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(middleware::create_cors_layer(
                    &state.config.server.cors_origins,
                )),
        )
        .with_state(state)
}

/// Health check: database + redis reachability.
async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    let db_ok = database::db_health_check(&state.db_pool).await.is_ok();
    let redis_ok = database::redis_health_check(&state.redis_pool).await.is_ok();
    let status = if db_ok && redis_ok {
        "healthy"
    } else {
        "degraded"
    };
    Json(serde_json::json!({
        "status": status,
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "services": {
            "database": if db_ok { "up" } else { "down" },
            "redis": if redis_ok { "up" } else { "down" },
        },
    }))
}

async fn readiness_check(State(state): State<AppState>) -> Result<Json<serde_json::Value>> {
    database::db_health_check(&state.db_pool).await?;
    database::redis_health_check(&state.redis_pool).await?;
    Ok(Json(serde_json::json!({
        "status": "ready",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    })))
}

async fn liveness_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "alive",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}
