//! Bearer-authenticated requests with one refresh-and-retry cycle
//!
//! The gateway owns no token state of its own: it reads the access token
//! from the `CredentialStore` on every call and delegates refresh to the
//! shared [`RefreshCoordinator`]. A request is retried at most once; a `401`
//! on the retry is returned to the caller as an `Http` error.

use std::sync::Arc;

use reqwest::{Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use session_auth::{CredentialStore, Error, Result};
use tracing::{debug, warn};

use crate::refresh::RefreshCoordinator;

/// Method and optional JSON body of a gateway request.
///
/// `authenticated` is true for every constructor. Endpoints that establish a
/// session (login, register, email verification) clear it: no bearer token
/// is attached and a `401` is the backend's answer, not an expired session.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub method: Method,
    pub body: Option<Value>,
    pub authenticated: bool,
}

impl RequestOptions {
    pub fn get() -> Self {
        Self {
            method: Method::GET,
            body: None,
            authenticated: true,
        }
    }

    pub fn post(body: Value) -> Self {
        Self {
            method: Method::POST,
            body: Some(body),
            authenticated: true,
        }
    }

    pub fn patch(body: Value) -> Self {
        Self {
            method: Method::PATCH,
            body: Some(body),
            authenticated: true,
        }
    }

    pub fn delete() -> Self {
        Self {
            method: Method::DELETE,
            body: None,
            authenticated: true,
        }
    }

    /// Send without credentials and skip the refresh cycle.
    pub fn unauthenticated(mut self) -> Self {
        self.authenticated = false;
        self
    }
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self::get()
    }
}

/// Entry point for every call to the identity backend.
pub struct RequestGateway {
    client: reqwest::Client,
    base_url: String,
    credentials: Arc<CredentialStore>,
    coordinator: RefreshCoordinator,
}

impl RequestGateway {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        credentials: Arc<CredentialStore>,
        coordinator: RefreshCoordinator,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            credentials,
            coordinator,
        }
    }

    pub fn credentials(&self) -> &Arc<CredentialStore> {
        &self.credentials
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Issue a request to `endpoint` (relative to the base URL) and parse the
    /// JSON response body as `T`.
    ///
    /// - `401` with a stored refresh token: refresh once, retry once
    /// - `401` without a refresh token, or refresh failure: `SessionExpired`
    /// - any other non-2xx: `Http { status, body }`
    /// - no response at all: `Network`
    ///
    /// Unauthenticated requests never refresh; every non-2xx, `401`
    /// included, is returned as `Http`.
    pub async fn request<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        options: &RequestOptions,
    ) -> Result<T> {
        if !options.authenticated {
            let response = self.send(endpoint, options, None).await?;
            return finish(response).await;
        }

        let sent_token = self.credentials.access_token().await?;
        let response = self.send(endpoint, options, sent_token.as_deref()).await?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return finish(response).await;
        }

        if !self.credentials.has_refresh_token().await? {
            warn!(endpoint, "unauthorized and no refresh token, session expired");
            self.credentials.clear_tokens().await?;
            return Err(Error::SessionExpired);
        }

        // Another request may have refreshed while this one was in flight;
        // reuse its token instead of starting a second refresh.
        let fresh = match self.credentials.access_token().await? {
            Some(current) if sent_token.as_ref() != Some(&current) => {
                debug!(endpoint, "access token already refreshed, retrying");
                current
            }
            _ => {
                debug!(endpoint, "access token rejected, refreshing");
                self.coordinator.acquire_refreshed_token().await?
            }
        };

        let retry = self.send(endpoint, options, Some(&fresh)).await?;
        finish(retry).await
    }

    async fn send(
        &self,
        endpoint: &str,
        options: &RequestOptions,
        token: Option<&str>,
    ) -> Result<Response> {
        let url = format!("{}{endpoint}", self.base_url);
        let mut builder = self.client.request(options.method.clone(), url.as_str());
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &options.body {
            builder = builder.json(body);
        }

        builder.send().await.map_err(|e| {
            warn!(endpoint, error = %e, "request failed without a response");
            Error::Network(e.to_string())
        })
    }
}

/// Turn a final response into the parsed body or a typed error.
async fn finish<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    let bytes = response
        .bytes()
        .await
        .map_err(|e| Error::Network(format!("reading response body: {e}")))?;

    if !status.is_success() {
        return Err(Error::Http {
            status: status.as_u16(),
            body: parse_body(&bytes),
        });
    }

    // Empty 2xx bodies (204) decode as JSON null
    let bytes: &[u8] = if bytes.is_empty() { b"null" } else { &bytes[..] };
    serde_json::from_slice(bytes).map_err(|e| Error::Decode(e.to_string()))
}

/// Parse a failure body, keeping non-JSON text as a string value.
fn parse_body(bytes: &[u8]) -> Value {
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}
