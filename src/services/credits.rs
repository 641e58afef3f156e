//! Credit ledger and usage accounting.
//!
//! The ledger is append-only. Every entry carries `balance_after`, the
//! running sum at append time. Concurrent debits for one user serialize on
//! a transaction-scoped advisory lock so the balance can never go negative.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{PgPool, Postgres, Transaction};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use uuid::Uuid;

use crate::config::CreditConfig;
use crate::error::{AppError, Result};
use crate::models::{CreditEntryType, CreditLedgerEntry};

pub const SYSTEM_REFUND_PROVIDER: &str = "system_refund";

#[derive(Debug, Clone, Serialize)]
pub struct ChargeOutcome {
    pub charged: i64,
    pub balance_after: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreditSummary {
    pub balance: i64,
    pub period_key: String,
    pub free_monthly_credits: i64,
    pub costs: CreditCosts,
    pub recent_entries: Vec<CreditEntrySummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreditCosts {
    pub research_search: i64,
    pub optimizer_variants: i64,
    pub audit_run: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreditEntrySummary {
    pub id: String,
    pub entry_type: String,
    pub delta_credits: i64,
    pub balance_after: i64,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Grant period key: YYYY-MM of the given UTC instant.
pub fn period_key_for(now: DateTime<Utc>) -> String {
    now.format("%Y-%m").to_string()
}

fn advisory_lock_key(user_id: &str) -> i64 {
    let mut hasher = DefaultHasher::new();
    user_id.hash(&mut hasher);
    hasher.finish() as i64
}

#[derive(Clone)]
pub struct CreditService {
    pool: PgPool,
    config: CreditConfig,
}

impl CreditService {
    pub fn new(pool: PgPool, config: CreditConfig) -> Self {
        Self { pool, config }
    }

    pub fn costs(&self) -> &CreditConfig {
        &self.config
    }

    pub async fn balance(&self, user_id: &str) -> Result<i64> {
        let balance: Option<i64> = sqlx::query_scalar(
            "SELECT COALESCE(SUM(delta_credits), 0) FROM credit_ledger WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(balance.unwrap_or(0))
    }

    /// Write this month's grant entry iff no grant exists for the current
    /// period, then return the resulting balance.
    pub async fn ensure_monthly_grant(&self, user_id: &str) -> Result<i64> {
        let mut tx = self.pool.begin().await?;
        lock_user(&mut tx, user_id).await?;
        ensure_monthly_grant_locked(&mut tx, user_id, self.config.free_monthly_credits).await?;
        let balance = balance_locked(&mut tx, user_id).await?;
        tx.commit().await?;
        Ok(balance)
    }

    /// Atomically: grant if due, re-read balance, compare to cost, append
    /// debit. Serialized per user via an advisory xact lock.
    pub async fn consume(
        &self,
        user_id: &str,
        cost: i64,
        reason: &str,
        reference_type: Option<&str>,
        reference_id: Option<&str>,
    ) -> Result<ChargeOutcome> {
        let debit_cost = cost.max(0);
        if debit_cost == 0 {
            let balance = self.balance(user_id).await?;
            return Ok(ChargeOutcome {
                charged: 0,
                balance_after: balance,
            });
        }

        let mut tx = self.pool.begin().await?;
        lock_user(&mut tx, user_id).await?;
        ensure_monthly_grant_locked(&mut tx, user_id, self.config.free_monthly_credits).await?;

        let balance = balance_locked(&mut tx, user_id).await?;
        if balance < debit_cost {
            return Err(AppError::InsufficientCredits {
                required: debit_cost,
                available: balance,
            });
        }

        let entry = insert_entry_locked(
            &mut tx,
            user_id,
            NewEntry {
                entry_type: CreditEntryType::Debit,
                delta_credits: -debit_cost,
                reason: Some(reason),
                reference_type,
                reference_id,
                billing_provider: None,
                billing_reference: None,
                period_key: None,
            },
        )
        .await?;
        tx.commit().await?;

        Ok(ChargeOutcome {
            charged: debit_cost,
            balance_after: entry.balance_after,
        })
    }

    /// Record a purchase entry (top-up or system refund). Ledger stays
    /// append-only; refunds are positive purchases.
    pub async fn add_purchase(
        &self,
        user_id: &str,
        credits: i64,
        provider: &str,
        billing_reference: &str,
        reason: &str,
    ) -> Result<i64> {
        if credits <= 0 {
            return Err(AppError::bad_request("credits must be greater than 0"));
        }

        let mut tx = self.pool.begin().await?;
        lock_user(&mut tx, user_id).await?;
        let entry = insert_entry_locked(
            &mut tx,
            user_id,
            NewEntry {
                entry_type: CreditEntryType::Purchase,
                delta_credits: credits,
                reason: Some(reason),
                reference_type: None,
                reference_id: None,
                billing_provider: Some(provider),
                billing_reference: Some(billing_reference),
                period_key: None,
            },
        )
        .await?;
        tx.commit().await?;
        Ok(entry.balance_after)
    }

    /// Refund a charge after a failed enqueue. Gated on the unique
    /// billing reference so retried failures cannot double-refund.
    pub async fn refund_failed_operation(
        &self,
        user_id: &str,
        credits: i64,
        billing_reference: &str,
        reason: &str,
    ) -> Result<Option<i64>> {
        if credits <= 0 {
            return Ok(None);
        }

        let mut tx = self.pool.begin().await?;
        lock_user(&mut tx, user_id).await?;

        let existing: Option<String> = sqlx::query_scalar(
            "SELECT id FROM credit_ledger WHERE user_id = $1 AND billing_reference = $2 LIMIT 1",
        )
        .bind(user_id)
        .bind(billing_reference)
        .fetch_optional(&mut *tx)
        .await?;
        if existing.is_some() {
            tracing::info!(
                user_id = %user_id,
                billing_reference = %billing_reference,
                "refund already recorded, skipping"
            );
            return Ok(None);
        }

        let entry = insert_entry_locked(
            &mut tx,
            user_id,
            NewEntry {
                entry_type: CreditEntryType::Purchase,
                delta_credits: credits,
                reason: Some(reason),
                reference_type: None,
                reference_id: None,
                billing_provider: Some(SYSTEM_REFUND_PROVIDER),
                billing_reference: Some(billing_reference),
                period_key: None,
            },
        )
        .await?;
        tx.commit().await?;
        Ok(Some(entry.balance_after))
    }

    pub async fn summary(&self, user_id: &str) -> Result<CreditSummary> {
        let balance = self.ensure_monthly_grant(user_id).await?;
        let entries = sqlx::query_as::<_, CreditLedgerEntry>(
            "SELECT * FROM credit_ledger WHERE user_id = $1 ORDER BY created_at DESC LIMIT 30",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(CreditSummary {
            balance,
            period_key: period_key_for(Utc::now()),
            free_monthly_credits: self.config.free_monthly_credits,
            costs: CreditCosts {
                research_search: self.config.cost_research_search,
                optimizer_variants: self.config.cost_optimizer_variants,
                audit_run: self.config.cost_audit_run,
            },
            recent_entries: entries
                .into_iter()
                .map(|entry| CreditEntrySummary {
                    id: entry.id,
                    entry_type: entry.entry_type,
                    delta_credits: entry.delta_credits,
                    balance_after: entry.balance_after,
                    reason: entry.reason,
                    created_at: entry.created_at,
                })
                .collect(),
        })
    }
}

struct NewEntry<'a> {
    entry_type: CreditEntryType,
    delta_credits: i64,
    reason: Option<&'a str>,
    reference_type: Option<&'a str>,
    reference_id: Option<&'a str>,
    billing_provider: Option<&'a str>,
    billing_reference: Option<&'a str>,
    period_key: Option<&'a str>,
}

async fn lock_user(tx: &mut Transaction<'_, Postgres>, user_id: &str) -> Result<()> {
    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(advisory_lock_key(user_id))
        .execute(&mut **tx)
        .await?;
    Ok(())
}

async fn balance_locked(tx: &mut Transaction<'_, Postgres>, user_id: &str) -> Result<i64> {
    let balance: Option<i64> = sqlx::query_scalar(
        "SELECT COALESCE(SUM(delta_credits), 0) FROM credit_ledger WHERE user_id = $1",
    )
    .bind(user_id)
    .fetch_one(&mut **tx)
    .await?;
    Ok(balance.unwrap_or(0))
}

async fn ensure_monthly_grant_locked(
    tx: &mut Transaction<'_, Postgres>,
    user_id: &str,
    monthly_credits: i64,
) -> Result<()> {
    let period_key = period_key_for(Utc::now());
    let existing: Option<String> = sqlx::query_scalar(
        "SELECT id FROM credit_ledger WHERE user_id = $1 AND entry_type = 'monthly_grant' AND period_key = $2 LIMIT 1",
    )
    .bind(user_id)
    .bind(&period_key)
    .fetch_optional(&mut **tx)
    .await?;
    if existing.is_some() {
        return Ok(());
    }

    insert_entry_locked(
        tx,
        user_id,
        NewEntry {
            entry_type: CreditEntryType::MonthlyGrant,
            delta_credits: monthly_credits.max(0),
            reason: Some("Monthly free credits grant"),
            reference_type: None,
            reference_id: None,
            billing_provider: None,
            billing_reference: None,
            period_key: Some(&period_key),
        },
    )
    .await?;
    Ok(())
}

async fn insert_entry_locked(
    tx: &mut Transaction<'_, Postgres>,
    user_id: &str,
    entry: NewEntry<'_>,
) -> Result<CreditLedgerEntry> {
    let current = balance_locked(tx, user_id).await?;
    let balance_after = current + entry.delta_credits;

    let row = sqlx::query_as::<_, CreditLedgerEntry>(
        r#"
        INSERT INTO credit_ledger (
            id, user_id, entry_type, delta_credits, balance_after, reason,
            reference_type, reference_id, billing_provider, billing_reference, period_key
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(user_id)
    .bind(entry.entry_type.as_str())
    .bind(entry.delta_credits)
    .bind(balance_after)
    .bind(entry.reason)
    .bind(entry.reference_type)
    .bind(entry.reference_id)
    .bind(entry.billing_provider)
    .bind(entry.billing_reference)
    .bind(entry.period_key)
    .fetch_one(&mut **tx)
    .await?;
    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn period_key_is_year_month() {
        let instant = Utc.with_ymd_and_hms(2026, 8, 1, 12, 0, 0).unwrap();
        assert_eq!(period_key_for(instant), "2026-08");
    }

    #[test]
    fn advisory_lock_key_is_stable_per_user() {
        assert_eq!(advisory_lock_key("user-a"), advisory_lock_key("user-a"));
        assert_ne!(advisory_lock_key("user-a"), advisory_lock_key("user-b"));
    }
}
