//! Authorization code exchange
//!
//! The state echoed by the provider is verified before anything leaves the
//! process: a code whose state does not check out is never sent to the
//! backend.

use std::sync::Arc;

use common::Secret;
use provider::Provider;
use serde::Deserialize;
use serde_json::{Value, json};
use session_auth::constants::OAUTH_EXCHANGE_PATH;
use session_auth::{Error, Result, User};
use tracing::{info, warn};

use crate::settings::OAuthSettings;
use crate::state::OAuthStateManager;

/// Tokens (and usually the user) issued for an authorization code.
#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeResponse {
    pub access: Secret<String>,
    pub refresh: Secret<String>,
    #[serde(default)]
    pub user: Option<User>,
}

/// Exchanges verified authorization codes for session tokens.
pub struct ExchangeClient {
    client: reqwest::Client,
    settings: Arc<OAuthSettings>,
    states: Arc<OAuthStateManager>,
}

impl ExchangeClient {
    pub fn new(
        client: reqwest::Client,
        settings: Arc<OAuthSettings>,
        states: Arc<OAuthStateManager>,
    ) -> Self {
        Self {
            client,
            settings,
            states,
        }
    }

    /// Verify `state`, then trade `code` for tokens.
    ///
    /// The caller stores the returned tokens.
    pub async fn exchange(
        &self,
        provider: Provider,
        code: &str,
        state: &str,
    ) -> Result<ExchangeResponse> {
        self.states.verify(provider, state).await?;

        let redirect_uri = self.settings.redirect_uri(provider);
        let response = self
            .client
            .post(format!("{}{OAUTH_EXCHANGE_PATH}", self.settings.api_base_url))
            .json(&json!({
                "provider": provider,
                "code": code,
                "redirect_uri": redirect_uri,
            }))
            .send()
            .await
            .map_err(|e| Error::Network(format!("OAuth exchange request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.json().await.unwrap_or(Value::Null);
            let message = failure_message(&body, "Failed to exchange OAuth code");
            warn!(provider = %provider, status = status.as_u16(), "OAuth exchange rejected");
            return Err(Error::Exchange(message));
        }

        let tokens = response
            .json::<ExchangeResponse>()
            .await
            .map_err(|e| Error::Decode(format!("invalid OAuth exchange response: {e}")))?;
        info!(provider = %provider, "OAuth code exchanged");
        Ok(tokens)
    }
}

/// `message`, then `detail`, then `fallback`.
pub(crate) fn failure_message(body: &Value, fallback: &str) -> String {
    ["message", "detail"]
        .iter()
        .find_map(|key| body.get(key).and_then(Value::as_str))
        .unwrap_or(fallback)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use axum::Json;
    use axum::http::StatusCode;
    use axum::routing::post;
    use session_auth::{CsrfFailure, MemoryStore};

    use crate::state::OAuthStateStore;

    struct MockExchange {
        url: String,
        hits: Arc<AtomicUsize>,
        last_request: Arc<Mutex<Option<Value>>>,
    }

    async fn start_exchange_server(status: StatusCode, body: Value) -> MockExchange {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let hits = Arc::new(AtomicUsize::new(0));
        let last_request = Arc::new(Mutex::new(None));

        let counter = hits.clone();
        let recorded = last_request.clone();
        let app = axum::Router::new().route(
            OAUTH_EXCHANGE_PATH,
            post(move |Json(request): Json<Value>| {
                let body = body.clone();
                let counter = counter.clone();
                let recorded = recorded.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    *recorded.lock().unwrap() = Some(request);
                    (status, Json(body))
                }
            }),
        );
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        MockExchange {
            url,
            hits,
            last_request,
        }
    }

    fn exchange_client(url: &str) -> (ExchangeClient, Arc<OAuthStateManager>) {
        let settings = Arc::new(OAuthSettings {
            api_base_url: url.to_string(),
            frontend_url: "http://localhost:8081/".into(),
            ..Default::default()
        });
        let states = Arc::new(OAuthStateManager::new(OAuthStateStore::dual(
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryStore::new()),
        )));
        let client = ExchangeClient::new(reqwest::Client::new(), settings, states.clone());
        (client, states)
    }

    #[tokio::test]
    async fn unverified_state_never_reaches_backend() {
        let mock = start_exchange_server(StatusCode::OK, json!({"access": "A1", "refresh": "R1"})).await;
        let (client, states) = exchange_client(&mock.url);

        let missing = client.exchange(Provider::Google, "code", "unknown").await;
        assert!(matches!(missing, Err(Error::Csrf(CsrfFailure::Missing))));

        states.issue(Provider::Google).await.unwrap();
        let forged = client.exchange(Provider::Google, "code", "forged").await;
        assert!(matches!(forged, Err(Error::Csrf(CsrfFailure::Mismatch))));

        assert_eq!(mock.hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn verified_code_is_exchanged_with_redirect_uri() {
        let mock = start_exchange_server(
            StatusCode::OK,
            json!({"access": "A1", "refresh": "R1", "user": {"id": 7, "email": "oauth@test.com"}}),
        )
        .await;
        let (client, states) = exchange_client(&mock.url);
        let state = states.issue(Provider::Github).await.unwrap();

        let tokens = client
            .exchange(Provider::Github, "auth-code", &state)
            .await
            .unwrap();
        assert_eq!(tokens.access.expose(), "A1");
        assert_eq!(tokens.refresh.expose(), "R1");
        assert_eq!(tokens.user.unwrap().email, "oauth@test.com");

        let request = mock.last_request.lock().unwrap().clone().unwrap();
        assert_eq!(request["provider"], "github");
        assert_eq!(request["code"], "auth-code");
        assert_eq!(
            request["redirect_uri"],
            "http://localhost:8081/auth/callback/github"
        );
    }

    #[tokio::test]
    async fn state_is_consumed_by_exchange() {
        let mock = start_exchange_server(StatusCode::OK, json!({"access": "A1", "refresh": "R1"})).await;
        let (client, states) = exchange_client(&mock.url);
        let state = states.issue(Provider::Google).await.unwrap();

        client.exchange(Provider::Google, "code", &state).await.unwrap();
        let replay = client.exchange(Provider::Google, "code", &state).await;
        assert!(matches!(replay, Err(Error::Csrf(CsrfFailure::Missing))));
        assert_eq!(mock.hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn backend_failure_surfaces_detail() {
        let mock = start_exchange_server(
            StatusCode::BAD_REQUEST,
            json!({"detail": "redirect_uri mismatch"}),
        )
        .await;
        let (client, states) = exchange_client(&mock.url);
        let state = states.issue(Provider::Google).await.unwrap();

        let err = client
            .exchange(Provider::Google, "code", &state)
            .await
            .unwrap_err();
        assert!(matches!(&err, Error::Exchange(m) if m == "redirect_uri mismatch"));
    }

    #[tokio::test]
    async fn backend_failure_without_message_uses_generic_text() {
        let mock = start_exchange_server(StatusCode::INTERNAL_SERVER_ERROR, json!([])).await;
        let (client, states) = exchange_client(&mock.url);
        let state = states.issue(Provider::Google).await.unwrap();

        let err = client
            .exchange(Provider::Google, "code", &state)
            .await
            .unwrap_err();
        assert!(matches!(&err, Error::Exchange(m) if m == "Failed to exchange OAuth code"));
    }

    #[test]
    fn failure_message_prefers_message_over_detail() {
        let body = json!({"detail": "second", "message": "first"});
        assert_eq!(failure_message(&body, "fallback"), "first");
        assert_eq!(failure_message(&Value::Null, "fallback"), "fallback");
    }
}
