//! Billing and credits handlers. Checkout is a stub that only produces a
//! redirect URL; real payment processing is out of scope.

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    Json,
};
use serde::Deserialize;
use std::time::Duration;
use validator::Validate;

use crate::error::{AppError, Result};
use crate::models::AuthContext;
use crate::services::rate_limit::client_identifier;
use crate::services::session::ensure_user_scope;
use crate::services::users;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreditsQuery {
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CheckoutRequest {
    pub user_id: Option<String>,
    #[validate(range(min = 1, max = 10_000))]
    #[serde(default = "default_checkout_credits")]
    pub credits: i64,
}

fn default_checkout_credits() -> i64 {
    25
}

#[derive(Debug, Deserialize, Validate)]
pub struct TopUpRequest {
    pub user_id: Option<String>,
    #[validate(range(min = 1, max = 10_000))]
    pub credits: i64,
    pub billing_reference: Option<String>,
}

pub async fn credits_summary(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(query): Query<CreditsQuery>,
) -> Result<Json<serde_json::Value>> {
    let user_id = ensure_user_scope(&auth.user_id, query.user_id.as_deref())?;
    users::ensure_user(&state.db_pool, &user_id).await?;
    let summary = state.credits.summary(&user_id).await?;
    Ok(Json(serde_json::to_value(summary)?))
}

pub async fn create_checkout_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    auth: AuthContext,
    Json(request): Json<CheckoutRequest>,
) -> Result<Json<serde_json::Value>> {
    request
        .validate()
        .map_err(|err| AppError::bad_request(err.to_string()))?;
    state
        .rate_limiter
        .check(
            "billing_checkout",
            &client_identifier(&headers, None),
            20,
            Duration::from_secs(3600),
        )
        .await?;
    let user_id = ensure_user_scope(&auth.user_id, request.user_id.as_deref())?;

    if !state.config.billing.enabled {
        return Err(AppError::FeatureDisabled(
            "Billing is disabled. Enable BILLING_ENABLED to use checkout.".to_string(),
        ));
    }
    if state.config.billing.stripe_secret_key.is_empty()
        || state.config.billing.stripe_price_id.is_empty()
    {
        return Err(AppError::ServiceUnavailable(
            "Stripe is not configured.".to_string(),
        ));
    }

    Ok(Json(serde_json::json!({
        "checkout_url": state.config.billing.stripe_success_url.clone(),
        "user_id": user_id,
        "credits": request.credits,
        "status": "stub",
        "detail": "Checkout stub configured. Replace with a live checkout session when billing ships.",
    })))
}

pub async fn manual_topup(
    State(state): State<AppState>,
    headers: HeaderMap,
    auth: AuthContext,
    Json(request): Json<TopUpRequest>,
) -> Result<Json<serde_json::Value>> {
    request
        .validate()
        .map_err(|err| AppError::bad_request(err.to_string()))?;
    state
        .rate_limiter
        .check(
            "billing_topup",
            &client_identifier(&headers, None),
            30,
            Duration::from_secs(3600),
        )
        .await?;
    let user_id = ensure_user_scope(&auth.user_id, request.user_id.as_deref())?;
    users::ensure_user(&state.db_pool, &user_id).await?;

    if state.config.billing.enabled && state.config.billing.stripe_secret_key.is_empty() {
        return Err(AppError::ServiceUnavailable(
            "Billing enabled but Stripe is not configured.".to_string(),
        ));
    }

    let billing_reference = request
        .billing_reference
        .clone()
        .filter(|reference| !reference.trim().is_empty())
        .unwrap_or_else(|| format!("manual:{}", request.credits));
    let balance_after = state
        .credits
        .add_purchase(
            &user_id,
            request.credits,
            "manual",
            &billing_reference,
            "Credit purchase",
        )
        .await?;

    Ok(Json(serde_json::json!({
        "ok": true,
        "credits_added": request.credits,
        "balance_after": balance_after,
    })))
}
