//! Single-flight access token refresh
//!
//! The coordinator is a two-state machine, `Idle → Refreshing → Idle`. The
//! first caller to find it idle moves it to `Refreshing` and spawns the one
//! refresh call; every caller arriving while a refresh is in flight
//! subscribes to that call's broadcast channel instead of issuing its own.
//! When the call settles, credentials are updated (or cleared) first, then
//! the state returns to `Idle` and the shared outcome is broadcast.
//!
//! The refresh runs on a spawned task, so a caller that stops polling (its
//! request was abandoned) cannot strand the waiters queued behind it.

use std::sync::Arc;

use common::Secret;
use session_auth::{CredentialStore, Error, Result, refresh_access_token};
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, info, warn};

/// Outcome shared with every caller of one refresh attempt.
#[derive(Debug, Clone)]
pub enum RefreshOutcome {
    Refreshed(Secret<String>),
    Expired,
}

enum RefreshSession {
    Idle,
    Refreshing {
        outcome: broadcast::Sender<RefreshOutcome>,
    },
}

struct Inner {
    client: reqwest::Client,
    base_url: String,
    credentials: Arc<CredentialStore>,
    session: Mutex<RefreshSession>,
}

/// Ensures at most one refresh network call is in flight.
///
/// Cheap to clone; clones share the same state machine. Construct one per
/// signed-in session and hand it to every [`crate::RequestGateway`] that
/// serves that session.
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<Inner>,
}

impl RefreshCoordinator {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        credentials: Arc<CredentialStore>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                client,
                base_url: base_url.into(),
                credentials,
                session: Mutex::new(RefreshSession::Idle),
            }),
        }
    }

    /// Obtain a freshly refreshed access token.
    ///
    /// Starts a refresh if none is running, otherwise waits for the running
    /// one. Fails with `SessionExpired` (credentials already cleared) if the
    /// refresh token is missing or the backend rejects it.
    pub async fn acquire_refreshed_token(&self) -> Result<String> {
        let mut receiver = {
            let mut session = self.inner.session.lock().await;
            match &*session {
                RefreshSession::Refreshing { outcome } => {
                    debug!("refresh already in flight, waiting for its outcome");
                    metrics::counter!("auth_refresh_waiters_total").increment(1);
                    outcome.subscribe()
                }
                RefreshSession::Idle => {
                    let (outcome, receiver) = broadcast::channel(1);
                    *session = RefreshSession::Refreshing { outcome };
                    let inner = self.inner.clone();
                    tokio::spawn(async move { inner.run().await });
                    receiver
                }
            }
        };

        match receiver.recv().await {
            Ok(RefreshOutcome::Refreshed(token)) => Ok(token.expose().clone()),
            Ok(RefreshOutcome::Expired) | Err(_) => Err(Error::SessionExpired),
        }
    }

    /// Whether a refresh call is currently in flight.
    pub async fn is_refreshing(&self) -> bool {
        matches!(
            *self.inner.session.lock().await,
            RefreshSession::Refreshing { .. }
        )
    }
}

impl Inner {
    /// Perform the refresh, then settle the session.
    async fn run(&self) {
        let outcome = match self.refresh().await {
            Ok(token) => {
                info!("access token refreshed");
                metrics::counter!("auth_token_refresh_total", "outcome" => "success").increment(1);
                RefreshOutcome::Refreshed(token)
            }
            Err(e) => {
                warn!(error = %e, "token refresh failed, clearing credentials");
                metrics::counter!("auth_token_refresh_total", "outcome" => "failure").increment(1);
                if let Err(e) = self.credentials.clear_tokens().await {
                    warn!(error = %e, "failed to clear credentials after refresh failure");
                }
                RefreshOutcome::Expired
            }
        };

        let mut session = self.session.lock().await;
        if let RefreshSession::Refreshing { outcome: sender } =
            std::mem::replace(&mut *session, RefreshSession::Idle)
        {
            // No receivers left means every caller went away; nothing to deliver.
            let _ = sender.send(outcome);
        }
    }

    async fn refresh(&self) -> Result<Secret<String>> {
        let refresh = self
            .credentials
            .refresh_token()
            .await?
            .filter(|token| !token.is_empty())
            .ok_or(Error::SessionExpired)?;

        let response = refresh_access_token(&self.client, &self.base_url, &refresh).await?;

        match &response.refresh {
            Some(rotated) if !rotated.is_empty() => {
                self.credentials
                    .set_tokens(response.access.expose(), rotated.expose())
                    .await?;
            }
            _ => {
                self.credentials
                    .set_access_token(response.access.expose())
                    .await?;
            }
        }

        Ok(response.access)
    }
}
