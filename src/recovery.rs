//! Startup recovery for jobs interrupted by crashes or restarts.

use sqlx::PgPool;

use crate::error::Result;
use crate::services::audits::recover_stalled_audits;
use crate::services::media::recover_stalled_media_jobs;
use crate::services::transcripts::recover_stalled_transcript_jobs;

/// Jobs older than this in an in-flight state are assumed abandoned.
pub const STALE_JOB_MAX_AGE_MINUTES: i64 = 120;

#[derive(Debug, Default, Clone, Copy)]
pub struct RecoveryReport {
    pub audits: u64,
    pub media_jobs: u64,
    pub transcript_jobs: u64,
}

/// Sweep all three job families. Failures in one sweep never block the
/// others; the server still boots.
pub async fn recover_stalled_jobs(pool: &PgPool) -> RecoveryReport {
    let mut report = RecoveryReport::default();

    match recover_stalled_audits(pool, STALE_JOB_MAX_AGE_MINUTES).await {
        Ok(count) => report.audits = count,
        Err(err) => tracing::warn!(error = %err, "stalled audit recovery skipped"),
    }
    match recover_stalled_media_jobs(pool, STALE_JOB_MAX_AGE_MINUTES).await {
        Ok(count) => report.media_jobs = count,
        Err(err) => tracing::warn!(error = %err, "stalled media recovery skipped"),
    }
    match recover_stalled_transcript_jobs(pool, STALE_JOB_MAX_AGE_MINUTES).await {
        Ok(count) => report.transcript_jobs = count,
        Err(err) => tracing::warn!(error = %err, "stalled transcript recovery skipped"),
    }

    if report.audits + report.media_jobs + report.transcript_jobs > 0 {
        tracing::info!(
            audits = report.audits,
            media_jobs = report.media_jobs,
            transcript_jobs = report.transcript_jobs,
            "recovered stalled jobs after startup"
        );
    }
    report
}

/// Typed variant for callers that need the error.
pub async fn recover_stalled_jobs_strict(pool: &PgPool) -> Result<RecoveryReport> {
    Ok(RecoveryReport {
        audits: recover_stalled_audits(pool, STALE_JOB_MAX_AGE_MINUTES).await?,
        media_jobs: recover_stalled_media_jobs(pool, STALE_JOB_MAX_AGE_MINUTES).await?,
        transcript_jobs: recover_stalled_transcript_jobs(pool, STALE_JOB_MAX_AGE_MINUTES).await?,
    })
}
