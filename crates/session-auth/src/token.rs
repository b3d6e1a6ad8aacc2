//! Token issuance responses and the refresh call
//!
//! The backend issues tokens from three places (login, email verification,
//! OAuth exchange), all returning an access/refresh pair. Refresh returns a
//! new access token and, when the backend rotates refresh tokens, a new
//! refresh token as well.

use common::Secret;
use serde::Deserialize;
use serde_json::json;

use crate::constants::TOKEN_REFRESH_PATH;
use crate::credentials::User;
use crate::error::{Error, Result};

/// Access/refresh pair as issued by the backend.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenPair {
    pub access: Secret<String>,
    pub refresh: Secret<String>,
}

/// Body of a successful login or email verification.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    #[serde(default)]
    pub message: Option<String>,
    pub user: User,
    pub tokens: TokenPair,
}

/// Body of a successful `POST /token/refresh/`.
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshResponse {
    pub access: Secret<String>,
    /// Present only when the backend rotates refresh tokens
    #[serde(default)]
    pub refresh: Option<Secret<String>>,
}

/// Exchange a refresh token for a new access token.
///
/// Must only be called by the session gateway's refresh coordinator, which
/// guarantees at most one of these is in flight at a time.
pub async fn refresh_access_token(
    client: &reqwest::Client,
    base_url: &str,
    refresh: &str,
) -> Result<RefreshResponse> {
    let response = client
        .post(format!("{base_url}{TOKEN_REFRESH_PATH}"))
        .json(&json!({ "refresh": refresh }))
        .send()
        .await
        .map_err(|e| Error::Network(format!("token refresh request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.json().await.unwrap_or(serde_json::Value::Null);
        return Err(Error::Http {
            status: status.as_u16(),
            body,
        });
    }

    response
        .json::<RefreshResponse>()
        .await
        .map_err(|e| Error::Decode(format!("invalid refresh response: {e}")))
}
