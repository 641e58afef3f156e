//! Public share links for consolidated reports.

use base64::Engine as _;
use chrono::{Duration, Utc};
use rand::RngCore;
use serde_json::{json, Value};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::ReportShareLink;
use crate::services::report::ReportService;

const DEFAULT_SHARE_TTL_HOURS: i64 = 168;
const MAX_SHARE_TTL_HOURS: i64 = 24 * 30;

fn generate_share_token() -> String {
    let mut bytes = [0u8; 24];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

#[derive(Clone)]
pub struct ReportShareService {
    pool: PgPool,
    report: ReportService,
}

impl ReportShareService {
    pub fn new(pool: PgPool, report: ReportService) -> Self {
        Self { pool, report }
    }

    pub async fn create_share_link(
        &self,
        user_id: &str,
        audit_id: &str,
        expires_hours: Option<i64>,
    ) -> Result<Value> {
        let owned: Option<String> =
            sqlx::query_scalar("SELECT id FROM audits WHERE id = $1 AND user_id = $2")
                .bind(audit_id)
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
        if owned.is_none() {
            return Err(AppError::not_found("Audit"));
        }

        let ttl_hours = expires_hours
            .unwrap_or(DEFAULT_SHARE_TTL_HOURS)
            .clamp(1, MAX_SHARE_TTL_HOURS);
        let expires_at = Utc::now() + Duration::hours(ttl_hours);
        let token = generate_share_token();

        let row = sqlx::query_as::<_, ReportShareLink>(
            r#"
            INSERT INTO report_share_links (id, user_id, audit_id, share_token, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(user_id)
        .bind(audit_id)
        .bind(&token)
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(json!({
            "share_id": row.id,
            "audit_id": audit_id,
            "share_token": row.share_token,
            "expires_at": row.expires_at.to_rfc3339(),
        }))
    }

    /// Resolve a shared report by token. Expired links return 410-shaped
    /// errors via NotFound at the edge; access stamps last_accessed_at.
    pub async fn resolve_shared_report(&self, share_token: &str) -> Result<Value> {
        let token = share_token.trim();
        if token.is_empty() {
            return Err(AppError::bad_request("share_token is required"));
        }

        let link = sqlx::query_as::<_, ReportShareLink>(
            "SELECT * FROM report_share_links WHERE share_token = $1",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::not_found("Share link"))?;

        if link.expires_at <= Utc::now() {
            return Err(AppError::Gone("Share link expired".to_string()));
        }

        sqlx::query("UPDATE report_share_links SET last_accessed_at = now() WHERE id = $1")
            .bind(&link.id)
            .execute(&self.pool)
            .await?;

        let mut payload = self
            .report
            .consolidated_report(&link.user_id, Some(&link.audit_id))
            .await?;
        payload["shared_report"] = json!({
            "share_token": token,
            "expires_at": link.expires_at.to_rfc3339(),
        });
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn share_tokens_are_url_safe_and_unique() {
        let a = generate_share_token();
        let b = generate_share_token();
        assert_ne!(a, b);
        assert!(a.len() >= 32);
        assert!(a
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_'));
    }
}
