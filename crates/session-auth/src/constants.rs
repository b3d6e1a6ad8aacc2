//! Backend endpoint paths and persisted storage keys
//!
//! Paths are relative to the configured API base URL (which already ends in
//! `/api/auth`). Storage keys are shared by every backend so a credential
//! file written by one version of the client stays readable by the next.

/// Credential login, returns tokens and user
pub const LOGIN_PATH: &str = "/login/";

/// Account creation (tokens are issued only after email verification)
pub const REGISTER_PATH: &str = "/register/";

/// Email verification, returns tokens and user
pub const VERIFY_EMAIL_PATH: &str = "/verify-email/";

pub const RESEND_VERIFICATION_PATH: &str = "/resend-verification/";

pub const PROFILE_PATH: &str = "/profile/";

pub const PROFILE_UPDATE_PATH: &str = "/profile/update/";

/// Exchanges `{refresh}` for `{access}` (and optionally a rotated `refresh`)
pub const TOKEN_REFRESH_PATH: &str = "/token/refresh/";

/// Backend-side authorization code exchange
pub const OAUTH_EXCHANGE_PATH: &str = "/oauth/exchange/";

/// Cookie-session variant of the callback: tokens parked server-side
pub const OAUTH_SESSION_TOKENS_PATH: &str = "/oauth/session-tokens/";

/// Per-provider client id lookup, e.g. `/oauth/config/google/`
pub fn oauth_config_path(provider: &str) -> String {
    format!("/oauth/config/{provider}/")
}

pub const ACCESS_TOKEN_KEY: &str = "access_token";
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";
pub const USER_KEY: &str = "user";

/// Storage key for the CSRF state value of `provider`
pub fn oauth_state_key(provider: &str) -> String {
    format!("oauth_state_{provider}")
}

/// Storage key for the CSRF state creation time (unix millis) of `provider`
pub fn oauth_state_time_key(provider: &str) -> String {
    format!("oauth_state_time_{provider}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_keys_match_persisted_layout() {
        assert_eq!(oauth_state_key("google"), "oauth_state_google");
        assert_eq!(oauth_state_time_key("github"), "oauth_state_time_github");
        assert_eq!(oauth_config_path("github"), "/oauth/config/github/");
    }
}
