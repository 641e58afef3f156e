//! Bearer session-token authentication middleware.

use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use crate::error::AppError;
use crate::models::AuthContext;
use crate::services::SessionTokenService;

/// Decode the bearer token and stash the resolved scope in request
/// extensions for handler extractors.
pub async fn auth_middleware(
    State(sessions): State<Arc<SessionTokenService>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .and_then(|header| header.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::Unauthenticated("Missing Bearer session token.".to_string()))?;

    let claims = sessions.decode_session_token(token)?;
    request.extensions_mut().insert(AuthContext {
        user_id: claims.sub.clone(),
        email: claims.email.clone(),
    });
    request.extensions_mut().insert(claims);

    Ok(next.run(request).await)
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .ok_or_else(|| AppError::Unauthenticated("Authentication required.".to_string()))
    }
}
