//! Feed-loop orchestrator: discovery, follows, repost packaging, the
//! variant/audit loop, and funnel telemetry.

pub mod discovery;
pub mod follows;
pub mod loop_;
pub mod repost;
pub mod telemetry;

use sqlx::PgPool;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::error::{AppError, Result};
use crate::models::ResearchItem;
use crate::services::audits::AuditService;
use crate::services::credits::CreditService;
use crate::services::media::MediaService;
use crate::services::optimizer::OptimizerService;
use crate::services::signed_url::SignedUrlService;
use crate::services::transcripts::TranscriptService;

pub use self::telemetry::{TelemetryDetails, TelemetryService};

#[derive(Clone)]
pub struct FeedService {
    pool: PgPool,
    config: Arc<AppConfig>,
    telemetry: TelemetryService,
    media: MediaService,
    transcripts: TranscriptService,
    credits: CreditService,
    optimizer: OptimizerService,
    audits: AuditService,
    signed_urls: SignedUrlService,
}

impl FeedService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pool: PgPool,
        config: Arc<AppConfig>,
        telemetry: TelemetryService,
        media: MediaService,
        transcripts: TranscriptService,
        credits: CreditService,
        optimizer: OptimizerService,
        audits: AuditService,
    ) -> Self {
        let signed_urls = SignedUrlService::new(&config.auth.jwt_secret);
        Self {
            pool,
            config,
            telemetry,
            media,
            transcripts,
            credits,
            optimizer,
            audits,
            signed_urls,
        }
    }

    pub(crate) fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub(crate) fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn telemetry(&self) -> &TelemetryService {
        &self.telemetry
    }

    pub(crate) fn media(&self) -> &MediaService {
        &self.media
    }

    pub(crate) fn transcripts(&self) -> &TranscriptService {
        &self.transcripts
    }

    pub(crate) fn credits(&self) -> &CreditService {
        &self.credits
    }

    pub(crate) fn optimizer(&self) -> &OptimizerService {
        &self.optimizer
    }

    pub(crate) fn audits(&self) -> &AuditService {
        &self.audits
    }

    pub(crate) fn signed_urls(&self) -> &SignedUrlService {
        &self.signed_urls
    }

    pub(crate) fn assert_research_enabled(&self) -> Result<()> {
        if !self.config.features.research_enabled {
            return Err(AppError::FeatureDisabled(
                "Feed discovery unavailable because RESEARCH_ENABLED=false.".to_string(),
            ));
        }
        Ok(())
    }

    pub(crate) async fn resolve_source_item(
        &self,
        user_id: &str,
        source_item_id: &str,
    ) -> Result<ResearchItem> {
        let item = sqlx::query_as::<_, ResearchItem>(
            "SELECT * FROM research_items WHERE id = $1 AND user_id = $2",
        )
        .bind(source_item_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::not_found("Feed source item"))?;
        Ok(item)
    }
}

/// Dedup while preserving order; empty entries dropped.
pub(crate) fn clean_ids(ids: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    ids.iter()
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty() && seen.insert(id.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_ids_dedupes_preserving_order() {
        let input = vec![
            " a ".to_string(),
            "b".to_string(),
            "a".to_string(),
            "".to_string(),
            "c".to_string(),
        ];
        assert_eq!(clean_ids(&input), vec!["a", "b", "c"]);
    }
}
