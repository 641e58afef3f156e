use serde::{Deserialize, Serialize};

/// Claim set carried by the `spc_session` bearer token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: String,
    #[serde(rename = "type")]
    pub token_type: String,
    pub iat: i64,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Authenticated request scope resolved by the auth middleware.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: String,
    pub email: Option<String>,
}

/// Claim set carried by short-lived export download tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportClaims {
    pub sub: String,
    pub export_id: String,
    pub iat: i64,
    pub exp: i64,
    pub purpose: String,
}
