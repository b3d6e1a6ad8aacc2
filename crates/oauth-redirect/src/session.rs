//! Cookie-session variant of the callback
//!
//! When the backend performs the exchange itself, it redirects back with
//! `session=true` and keeps the issued tokens in its session. They are
//! collected with a cookie-carrying request.

use serde_json::Value;
use session_auth::constants::OAUTH_SESSION_TOKENS_PATH;
use session_auth::{Error, Result};
use tracing::info;

use crate::exchange::{ExchangeResponse, failure_message};

/// Retrieves tokens the backend parked in its cookie session.
pub struct SessionTokenClient {
    client: reqwest::Client,
    base_url: String,
}

impl SessionTokenClient {
    /// Build a client with its own cookie store.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .build()
            .map_err(|e| Error::Network(format!("failed to build session client: {e}")))?;
        Ok(Self::with_client(client, base_url))
    }

    /// Use an existing client. It must carry the backend's session cookie.
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    pub async fn fetch(&self) -> Result<ExchangeResponse> {
        let response = self
            .client
            .get(format!("{}{OAUTH_SESSION_TOKENS_PATH}", self.base_url))
            .send()
            .await
            .map_err(|e| Error::Network(format!("session token request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.json().await.unwrap_or(Value::Null);
            return Err(Error::Exchange(failure_message(
                &body,
                "Failed to retrieve tokens from session",
            )));
        }

        let tokens = response
            .json::<ExchangeResponse>()
            .await
            .map_err(|e| Error::Decode(format!("invalid session token response: {e}")))?;
        info!("retrieved tokens from backend session");
        Ok(tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::Json;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::get;
    use serde_json::json;

    /// Hands out tokens only to requests carrying the session cookie.
    async fn start_session_server() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());

        let app = axum::Router::new().route(
            OAUTH_SESSION_TOKENS_PATH,
            get(|headers: HeaderMap| async move {
                let cookie = headers
                    .get("cookie")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("");
                if cookie.contains("sessionid=abc") {
                    (
                        StatusCode::OK,
                        Json(json!({"access": "S1", "refresh": "SR1", "user": {"id": 3}})),
                    )
                } else {
                    (
                        StatusCode::NOT_FOUND,
                        Json(json!({"detail": "No tokens in session"})),
                    )
                }
            }),
        );
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        url
    }

    #[tokio::test]
    async fn tokens_are_returned_with_session_cookie() {
        let url = start_session_server().await;
        let client = reqwest::Client::builder()
            .default_headers(
                [(reqwest::header::COOKIE, "sessionid=abc".parse().unwrap())]
                    .into_iter()
                    .collect(),
            )
            .build()
            .unwrap();

        let tokens = SessionTokenClient::with_client(client, url)
            .fetch()
            .await
            .unwrap();
        assert_eq!(tokens.access.expose(), "S1");
        assert_eq!(tokens.refresh.expose(), "SR1");
        assert_eq!(tokens.user.unwrap().id, 3);
    }

    #[tokio::test]
    async fn missing_session_surfaces_backend_detail() {
        let url = start_session_server().await;
        let err = SessionTokenClient::new(url)
            .unwrap()
            .fetch()
            .await
            .unwrap_err();
        assert!(matches!(&err, Error::Exchange(m) if m == "No tokens in session"));
    }
}
