//! Completing a login from a callback navigation

use std::sync::Arc;

use provider::Provider;
use session_auth::{Error, Result, User};
use session_gateway::AuthApi;
use tracing::{info, warn};
use url::Url;

use crate::callback::CallbackParams;
use crate::exchange::{ExchangeClient, ExchangeResponse};
use crate::session::SessionTokenClient;

/// Turns a callback URL into a signed-in session.
pub struct OAuthFlow {
    exchange: ExchangeClient,
    sessions: SessionTokenClient,
    api: Arc<AuthApi>,
}

impl OAuthFlow {
    pub fn new(exchange: ExchangeClient, sessions: SessionTokenClient, api: Arc<AuthApi>) -> Self {
        Self {
            exchange,
            sessions,
            api,
        }
    }

    /// Handle the provider's redirect back to the app.
    ///
    /// Obtains tokens (code exchange or cookie session), stores them with the
    /// returned user, then confirms them by fetching the profile. A profile
    /// failure drops the freshly stored session.
    pub async fn complete(&self, callback_url: &str) -> Result<(Provider, User)> {
        let url = Url::parse(callback_url)
            .map_err(|e| Error::Callback(format!("invalid callback URL: {e}")))?;

        let (provider, tokens) = match CallbackParams::parse(&url)? {
            CallbackParams::ProviderError { error, description } => {
                warn!(error = %error, "provider reported an authorization error");
                return Err(Error::Callback(CallbackParams::provider_error_message(
                    &error,
                    description.as_deref(),
                )));
            }
            CallbackParams::SessionTokens { provider } => (provider, self.sessions.fetch().await?),
            CallbackParams::Code {
                provider,
                code,
                state,
            } => (provider, self.exchange.exchange(provider, &code, &state).await?),
        };

        self.store(&tokens).await?;
        let user = self.api.refresh_user().await?;
        info!(provider = %provider, user_id = user.id, "OAuth login complete");
        Ok((provider, user))
    }

    async fn store(&self, tokens: &ExchangeResponse) -> Result<()> {
        let credentials = self.api.gateway().credentials();
        credentials
            .set_tokens(tokens.access.expose(), tokens.refresh.expose())
            .await?;
        if let Some(user) = &tokens.user {
            credentials.set_user(user).await?;
        }
        Ok(())
    }
}
