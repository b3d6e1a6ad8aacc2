//! Third-party identity providers supported by the redirect flow
//!
//! Each provider contributes an authorization endpoint, the scope requested
//! from it, and any provider-specific query parameters. Everything else in
//! the authorization URL (`client_id`, `redirect_uri`, `response_type`,
//! `state`) is common to all providers and assembled by
//! [`build_authorization_url`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::Url;

/// Identity provider for the authorization-code flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Google,
    Github,
}

impl Provider {
    pub const ALL: [Provider; 2] = [Provider::Google, Provider::Github];

    /// Lowercase identifier used in storage keys, URLs and request bodies.
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Google => "google",
            Provider::Github => "github",
        }
    }

    /// Provider-hosted consent page the user is redirected to.
    pub fn authorize_endpoint(&self) -> &'static str {
        match self {
            Provider::Google => "https://accounts.google.com/o/oauth2/v2/auth",
            Provider::Github => "https://github.com/login/oauth/authorize",
        }
    }

    /// Space-separated scope requested from the provider.
    pub fn scope(&self) -> &'static str {
        match self {
            Provider::Google => "openid email profile",
            Provider::Github => "user:email",
        }
    }

    /// Extra query parameters. Google needs `access_type=offline` and a
    /// forced consent prompt to hand out a refresh token to the backend.
    pub fn extra_params(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            Provider::Google => &[("access_type", "offline"), ("prompt", "consent")],
            Provider::Github => &[],
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string names no supported provider.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported OAuth provider: {0}")]
pub struct UnknownProvider(pub String);

impl FromStr for Provider {
    type Err = UnknownProvider;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "google" => Ok(Provider::Google),
            "github" => Ok(Provider::Github),
            other => Err(UnknownProvider(other.to_string())),
        }
    }
}

/// Build the full authorization URL with all required OAuth parameters.
///
/// The `state` parameter is the CSRF token generated for this attempt; the
/// provider echoes it back unchanged on the callback. Parameter values are
/// form-urlencoded by `url`.
pub fn build_authorization_url(
    provider: Provider,
    client_id: &str,
    redirect_uri: &str,
    state: &str,
) -> Url {
    let mut url =
        Url::parse(provider.authorize_endpoint()).expect("authorize endpoints are valid URLs");
    {
        let mut query = url.query_pairs_mut();
        query
            .append_pair("client_id", client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", provider.scope())
            .append_pair("state", state);
        for (name, value) in provider.extra_params() {
            query.append_pair(name, value);
        }
    }
    url
}
