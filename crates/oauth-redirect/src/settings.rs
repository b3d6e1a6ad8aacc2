//! Endpoints and client identifiers used by the redirect flow

use provider::Provider;

/// Where the backend lives, where the provider sends the user back to, and
/// the locally configured client ids used when the backend has none.
#[derive(Debug, Clone, Default)]
pub struct OAuthSettings {
    /// Identity backend base, e.g. `http://localhost:8001/api/auth`
    pub api_base_url: String,
    /// Base of the callback route, e.g. `http://localhost:8081`
    pub frontend_url: String,
    pub google_client_id: Option<String>,
    pub github_client_id: Option<String>,
}

impl OAuthSettings {
    /// Callback URI registered with `provider`.
    ///
    /// Used verbatim for both the authorization URL and the code exchange;
    /// providers reject an exchange whose redirect URI differs in any byte,
    /// trailing slash included.
    pub fn redirect_uri(&self, provider: Provider) -> String {
        let uri = format!(
            "{}/auth/callback/{}",
            self.frontend_url.trim_end_matches('/'),
            provider
        );
        uri.trim_end_matches('/').to_string()
    }

    /// Locally configured client id, ignoring blank values.
    pub fn local_client_id(&self, provider: Provider) -> Option<&str> {
        let id = match provider {
            Provider::Google => self.google_client_id.as_deref(),
            Provider::Github => self.github_client_id.as_deref(),
        };
        id.map(str::trim).filter(|id| !id.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(frontend_url: &str) -> OAuthSettings {
        OAuthSettings {
            api_base_url: "http://localhost:8001/api/auth".into(),
            frontend_url: frontend_url.into(),
            google_client_id: Some("google-id".into()),
            github_client_id: Some("   ".into()),
        }
    }

    #[test]
    fn redirect_uri_has_no_trailing_slash() {
        assert_eq!(
            settings("http://localhost:8081/").redirect_uri(Provider::Google),
            "http://localhost:8081/auth/callback/google"
        );
        assert_eq!(
            settings("https://app.example.com").redirect_uri(Provider::Github),
            "https://app.example.com/auth/callback/github"
        );
    }

    #[test]
    fn blank_client_id_counts_as_unset() {
        let settings = settings("http://localhost:8081");
        assert_eq!(settings.local_client_id(Provider::Google), Some("google-id"));
        assert_eq!(settings.local_client_id(Provider::Github), None);
    }
}
