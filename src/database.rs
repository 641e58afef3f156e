//! Database and Redis pool construction plus schema bootstrap.

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::config::{DatabaseSettings, RedisSettings};
use crate::error::{AppError, Result};

pub async fn create_pool(settings: &DatabaseSettings) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .acquire_timeout(settings.connection_timeout)
        .connect(&settings.url)
        .await?;
    Ok(pool)
}

pub fn create_redis_pool(settings: &RedisSettings) -> Result<deadpool_redis::Pool> {
    let mut config = deadpool_redis::Config::from_url(&settings.url);
    config.pool = Some(deadpool_redis::PoolConfig::new(settings.max_size));
    config
        .create_pool(Some(deadpool_redis::Runtime::Tokio1))
        .map_err(|err| AppError::Redis(err.to_string()))
}

pub async fn db_health_check(pool: &PgPool) -> Result<()> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

pub async fn redis_health_check(pool: &deadpool_redis::Pool) -> Result<()> {
    let mut conn = pool.get().await?;
    redis::cmd("PING")
        .query_async::<_, String>(&mut conn)
        .await?;
    Ok(())
}

/// Create every table the service needs when AUTO_CREATE_DB_SCHEMA is set.
/// Production deployments run managed migrations instead; this keeps local
/// and test environments one-command bootable.
pub async fn bootstrap_schema(pool: &PgPool) -> Result<()> {
    for statement in SCHEMA_STATEMENTS {
        sqlx::query(statement).execute(pool).await?;
    }
    tracing::info!("database schema verified");
    Ok(())
}

const SCHEMA_STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id TEXT PRIMARY KEY,
        email TEXT NOT NULL,
        name TEXT,
        picture TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS connections (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        platform TEXT NOT NULL,
        platform_user_id TEXT,
        platform_handle TEXT,
        access_token_sealed TEXT,
        refresh_token_sealed TEXT,
        token_expires_at TIMESTAMPTZ,
        scope TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS profiles (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        platform TEXT NOT NULL,
        external_id TEXT,
        handle TEXT,
        display_name TEXT,
        subscriber_count TEXT,
        profile_picture_url TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS competitors (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        platform TEXT NOT NULL,
        external_id TEXT NOT NULL,
        display_name TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS research_collections (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        name TEXT NOT NULL,
        platform TEXT NOT NULL,
        description TEXT,
        is_system BOOLEAN NOT NULL DEFAULT FALSE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS research_items (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        collection_id TEXT,
        platform TEXT NOT NULL,
        source_type TEXT NOT NULL,
        url TEXT,
        external_id TEXT,
        creator_handle TEXT,
        creator_display_name TEXT,
        title TEXT,
        caption TEXT,
        metrics_json JSONB NOT NULL DEFAULT '{}'::jsonb,
        media_meta_json JSONB NOT NULL DEFAULT '{}'::jsonb,
        published_at TIMESTAMPTZ,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_research_items_user ON research_items (user_id, platform)",
    r#"
    CREATE TABLE IF NOT EXISTS feed_source_follows (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        platform TEXT NOT NULL,
        mode TEXT NOT NULL,
        query TEXT NOT NULL,
        timeframe TEXT NOT NULL,
        sort_by TEXT NOT NULL,
        sort_direction TEXT NOT NULL,
        item_limit INTEGER NOT NULL DEFAULT 20,
        cadence_minutes INTEGER NOT NULL DEFAULT 360,
        is_active BOOLEAN NOT NULL DEFAULT TRUE,
        last_run_at TIMESTAMPTZ,
        next_run_at TIMESTAMPTZ,
        last_error TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_feed_follows_identity ON feed_source_follows (user_id, platform, mode, query)",
    r#"
    CREATE TABLE IF NOT EXISTS feed_auto_ingest_runs (
        id TEXT PRIMARY KEY,
        follow_id TEXT NOT NULL,
        user_id TEXT NOT NULL,
        status TEXT NOT NULL,
        item_count INTEGER NOT NULL DEFAULT 0,
        item_ids_json JSONB NOT NULL DEFAULT '[]'::jsonb,
        error_message TEXT,
        started_at TIMESTAMPTZ NOT NULL,
        completed_at TIMESTAMPTZ,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS feed_repost_packages (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        source_item_id TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'draft',
        target_platforms_json JSONB NOT NULL DEFAULT '[]'::jsonb,
        package_json JSONB NOT NULL DEFAULT '{}'::jsonb,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS feed_telemetry_events (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        event_name TEXT NOT NULL,
        status TEXT NOT NULL,
        platform TEXT,
        source_item_id TEXT,
        details_json JSONB,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_feed_telemetry_user ON feed_telemetry_events (user_id, created_at)",
    r#"
    CREATE TABLE IF NOT EXISTS media_download_jobs (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        platform TEXT NOT NULL,
        source_url TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'queued',
        progress INTEGER NOT NULL DEFAULT 0,
        queue_job_id TEXT,
        attempts INTEGER NOT NULL DEFAULT 0,
        max_attempts INTEGER NOT NULL DEFAULT 3,
        error_code TEXT,
        error_message TEXT,
        media_asset_id TEXT,
        upload_id TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        completed_at TIMESTAMPTZ
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS media_assets (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        platform TEXT NOT NULL,
        source_url TEXT NOT NULL,
        file_path TEXT NOT NULL,
        file_name TEXT NOT NULL,
        file_size_bytes BIGINT NOT NULL DEFAULT 0,
        mime_type TEXT NOT NULL,
        duration_seconds INTEGER NOT NULL DEFAULT 0,
        transcript_status TEXT NOT NULL DEFAULT 'pending',
        upload_id TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS uploads (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        file_url TEXT NOT NULL,
        file_type TEXT NOT NULL,
        original_filename TEXT NOT NULL,
        file_size_bytes BIGINT NOT NULL DEFAULT 0,
        mime_type TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS feed_transcript_jobs (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        research_item_id TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'queued',
        progress INTEGER NOT NULL DEFAULT 0,
        queue_job_id TEXT,
        attempts INTEGER NOT NULL DEFAULT 0,
        max_attempts INTEGER NOT NULL DEFAULT 3,
        transcript_source TEXT,
        transcript_text TEXT,
        error_code TEXT,
        error_message TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        completed_at TIMESTAMPTZ
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS audits (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'pending',
        progress TEXT NOT NULL DEFAULT '0',
        input_json JSONB NOT NULL DEFAULT '{}'::jsonb,
        output_json JSONB,
        error_message TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        completed_at TIMESTAMPTZ
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_audits_user ON audits (user_id, created_at)",
    r#"
    CREATE TABLE IF NOT EXISTS script_variants (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        source_item_id TEXT,
        platform TEXT NOT NULL,
        topic TEXT NOT NULL,
        request_json JSONB NOT NULL DEFAULT '{}'::jsonb,
        variants_json JSONB NOT NULL DEFAULT '[]'::jsonb,
        selected_variant_id TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS draft_snapshots (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        platform TEXT NOT NULL,
        source_item_id TEXT,
        variant_id TEXT,
        script_text TEXT NOT NULL,
        baseline_score DOUBLE PRECISION,
        rescored_score DOUBLE PRECISION NOT NULL,
        delta_score DOUBLE PRECISION,
        detector_rankings_json JSONB NOT NULL DEFAULT '[]'::jsonb,
        next_actions_json JSONB NOT NULL DEFAULT '[]'::jsonb,
        line_level_edits_json JSONB NOT NULL DEFAULT '[]'::jsonb,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS outcome_metrics (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        content_item_id TEXT,
        draft_snapshot_id TEXT,
        report_id TEXT,
        platform TEXT NOT NULL,
        video_external_id TEXT NOT NULL,
        posted_at TIMESTAMPTZ NOT NULL,
        actual_metrics_json JSONB NOT NULL DEFAULT '{}'::jsonb,
        retention_points_json JSONB,
        predicted_score DOUBLE PRECISION,
        actual_score DOUBLE PRECISION NOT NULL,
        calibration_delta DOUBLE PRECISION,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_outcomes_user ON outcome_metrics (user_id, platform, created_at)",
    r#"
    CREATE TABLE IF NOT EXISTS calibration_snapshots (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        platform TEXT NOT NULL,
        sample_size INTEGER NOT NULL DEFAULT 0,
        mean_abs_error DOUBLE PRECISION NOT NULL DEFAULT 0,
        hit_rate DOUBLE PRECISION NOT NULL DEFAULT 0,
        trend TEXT NOT NULL DEFAULT 'flat',
        recommendations_json JSONB NOT NULL DEFAULT '[]'::jsonb,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_calibration_identity ON calibration_snapshots (user_id, platform)",
    r#"
    CREATE TABLE IF NOT EXISTS credit_ledger (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        entry_type TEXT NOT NULL,
        delta_credits BIGINT NOT NULL,
        balance_after BIGINT NOT NULL,
        reason TEXT,
        reference_type TEXT,
        reference_id TEXT,
        billing_provider TEXT,
        billing_reference TEXT,
        period_key TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_credit_ledger_user ON credit_ledger (user_id, created_at)",
    r#"
    CREATE TABLE IF NOT EXISTS blueprint_snapshots (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL UNIQUE,
        payload_json JSONB NOT NULL DEFAULT '{}'::jsonb,
        competitor_signature TEXT NOT NULL,
        generated_at TIMESTAMPTZ NOT NULL,
        last_error TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS report_share_links (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        audit_id TEXT NOT NULL,
        share_token TEXT NOT NULL UNIQUE,
        expires_at TIMESTAMPTZ NOT NULL,
        last_accessed_at TIMESTAMPTZ,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
];
