//! Starting an authorization attempt
//!
//! Issues a fresh state, resolves the provider's client id, builds the
//! authorization URL and hands it to a [`Navigator`]. Nothing is awaited
//! from the provider here; the answer arrives later as a callback
//! navigation handled by [`crate::OAuthFlow`].

use std::sync::Arc;

use provider::{Provider, build_authorization_url};
use serde::Deserialize;
use session_auth::constants::oauth_config_path;
use session_auth::{Error, Result};
use tracing::{debug, info, warn};
use url::Url;

use crate::settings::OAuthSettings;
use crate::state::OAuthStateManager;

/// Performs the full-page redirect to the provider's consent page.
pub trait Navigator: Send + Sync {
    fn redirect(&self, url: &Url) -> Result<()>;
}

#[derive(Debug, Deserialize)]
struct ProviderConfig {
    #[serde(default)]
    client_id: Option<String>,
}

/// Sends the user to a provider's consent page.
pub struct AuthorizationInitiator {
    client: reqwest::Client,
    settings: Arc<OAuthSettings>,
    states: Arc<OAuthStateManager>,
    navigator: Arc<dyn Navigator>,
}

impl AuthorizationInitiator {
    pub fn new(
        client: reqwest::Client,
        settings: Arc<OAuthSettings>,
        states: Arc<OAuthStateManager>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        Self {
            client,
            settings,
            states,
            navigator,
        }
    }

    /// Whether a local client id is configured for `provider`.
    ///
    /// The backend may still supply one when this returns `false`.
    pub fn is_configured(&self, provider: Provider) -> bool {
        self.settings.local_client_id(provider).is_some()
    }

    /// Build the authorization URL for a new attempt, storing its state.
    pub async fn authorization_url(&self, provider: Provider) -> Result<Url> {
        let state = self.states.issue(provider).await?;
        let client_id = self.resolve_client_id(provider).await?;
        let redirect_uri = self.settings.redirect_uri(provider);
        Ok(build_authorization_url(
            provider,
            &client_id,
            &redirect_uri,
            &state,
        ))
    }

    /// Start an attempt and redirect to the provider.
    pub async fn initiate(&self, provider: Provider) -> Result<Url> {
        let url = self.authorization_url(provider).await?;
        info!(provider = %provider, "redirecting to provider");
        self.navigator.redirect(&url)?;
        Ok(url)
    }

    /// Client id from the backend's per-provider config, falling back to the
    /// locally configured one.
    async fn resolve_client_id(&self, provider: Provider) -> Result<String> {
        match self.fetch_client_id(provider).await {
            Some(id) => return Ok(id),
            None => debug!(provider = %provider, "backend has no client id, using local configuration"),
        }

        self.settings
            .local_client_id(provider)
            .map(str::to_string)
            .ok_or_else(|| {
                Error::Configuration(format!(
                    "no client id for {provider}; set {}_CLIENT_ID or configure it in the backend",
                    provider.as_str().to_uppercase()
                ))
            })
    }

    async fn fetch_client_id(&self, provider: Provider) -> Option<String> {
        let url = format!(
            "{}{}",
            self.settings.api_base_url,
            oauth_config_path(provider.as_str())
        );
        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(provider = %provider, error = %e, "provider config request failed");
                return None;
            }
        };
        if !response.status().is_success() {
            debug!(provider = %provider, status = response.status().as_u16(), "provider config unavailable");
            return None;
        }

        match response.json::<ProviderConfig>().await {
            Ok(config) => config.client_id.filter(|id| !id.trim().is_empty()),
            Err(e) => {
                warn!(provider = %provider, error = %e, "invalid provider config response");
                None
            }
        }
    }
}
