//! Classifying the provider's redirect back to `/auth/callback/{provider}`

use provider::Provider;
use session_auth::{CsrfFailure, Error, Result};
use url::Url;

const CALLBACK_PREFIX: &str = "/auth/callback/";

/// What the provider sent back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackParams {
    /// The provider reported a failure (including the user cancelling)
    ProviderError {
        error: String,
        description: Option<String>,
    },
    /// The backend completed the exchange and parked the tokens in its
    /// cookie session
    SessionTokens { provider: Provider },
    /// Authorization code to exchange, with the echoed state
    Code {
        provider: Provider,
        code: String,
        state: String,
    },
}

impl CallbackParams {
    /// Parse a callback URL.
    ///
    /// Provider errors are reported before the path is looked at, since the
    /// provider may fail before a callback route is involved at all.
    pub fn parse(url: &Url) -> Result<Self> {
        let param = |name: &str| {
            url.query_pairs()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.into_owned())
                .filter(|value| !value.is_empty())
        };

        if let Some(error) = param("error") {
            return Ok(CallbackParams::ProviderError {
                error,
                description: param("error_description"),
            });
        }

        let provider = callback_provider(url)?;

        if param("session").as_deref() == Some("true") {
            return Ok(CallbackParams::SessionTokens { provider });
        }

        let code = param("code")
            .ok_or_else(|| Error::Callback("missing authorization code".into()))?;
        let state = param("state").ok_or(Error::Csrf(CsrfFailure::Missing))?;
        Ok(CallbackParams::Code {
            provider,
            code,
            state,
        })
    }

    /// Message to show for a provider-reported failure.
    pub fn provider_error_message(error: &str, description: Option<&str>) -> String {
        match (error, description) {
            ("access_denied" | "denied", _) => "OAuth authentication was cancelled.".to_string(),
            (_, Some(description)) => description.to_string(),
            _ => "OAuth authentication failed. Please try again.".to_string(),
        }
    }
}

fn callback_provider(url: &Url) -> Result<Provider> {
    let segment = url
        .path()
        .strip_prefix(CALLBACK_PREFIX)
        .map(|rest| rest.trim_end_matches('/'))
        .ok_or_else(|| Error::Callback(format!("not a callback path: {}", url.path())))?;
    segment
        .parse()
        .map_err(|e: provider::UnknownProvider| Error::Callback(e.to_string()))
}
