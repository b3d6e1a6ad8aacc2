//! Account endpoints of the identity backend
//!
//! Thin typed wrappers over [`RequestGateway`]. Calls that issue tokens
//! (login, email verification) store them together with the returned user;
//! profile calls keep the cached user snapshot current.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use session_auth::constants::{
    LOGIN_PATH, PROFILE_PATH, PROFILE_UPDATE_PATH, REGISTER_PATH, RESEND_VERIFICATION_PATH,
    VERIFY_EMAIL_PATH,
};
use session_auth::{AuthResponse, CredentialStore, Result, User};
use tracing::{info, warn};

use crate::gateway::{RequestGateway, RequestOptions};

/// Body of `POST /register/`.
#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password: String,
    pub password2: String,
}

/// Fields accepted by `PATCH /profile/update/`. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterResponse {
    #[serde(default)]
    pub message: Option<String>,
    pub user: User,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageResponse {
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ProfileUpdateResponse {
    user: User,
}

/// Account operations for the signed-in (or signing-in) user.
pub struct AuthApi {
    gateway: Arc<RequestGateway>,
}

impl AuthApi {
    pub fn new(gateway: Arc<RequestGateway>) -> Self {
        Self { gateway }
    }

    pub fn gateway(&self) -> &Arc<RequestGateway> {
        &self.gateway
    }

    fn credentials(&self) -> &Arc<CredentialStore> {
        self.gateway.credentials()
    }

    /// Log in with email and password, storing the issued tokens and user.
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthResponse> {
        let response: AuthResponse = self
            .gateway
            .request(
                LOGIN_PATH,
                &RequestOptions::post(json!({ "email": email, "password": password }))
                    .unauthenticated(),
            )
            .await?;
        self.store_session(&response).await?;
        info!(user_id = response.user.id, "logged in");
        Ok(response)
    }

    /// Create an account. No tokens are issued until the email is verified.
    pub async fn register(&self, request: &RegisterRequest) -> Result<RegisterResponse> {
        let body = serde_json::to_value(request)
            .map_err(|e| session_auth::Error::Decode(format!("encoding registration: {e}")))?;
        self.gateway
            .request(REGISTER_PATH, &RequestOptions::post(body).unauthenticated())
            .await
    }

    /// Confirm an email address, storing the issued tokens and user.
    pub async fn verify_email(&self, token: &str) -> Result<AuthResponse> {
        let response: AuthResponse = self
            .gateway
            .request(
                VERIFY_EMAIL_PATH,
                &RequestOptions::post(json!({ "token": token })).unauthenticated(),
            )
            .await?;
        self.store_session(&response).await?;
        info!(user_id = response.user.id, "email verified");
        Ok(response)
    }

    pub async fn resend_verification(&self, email: &str) -> Result<MessageResponse> {
        self.gateway
            .request(
                RESEND_VERIFICATION_PATH,
                &RequestOptions::post(json!({ "email": email })).unauthenticated(),
            )
            .await
    }

    /// Fetch the current user and refresh the cached snapshot.
    pub async fn profile(&self) -> Result<User> {
        let user: User = self
            .gateway
            .request(PROFILE_PATH, &RequestOptions::get())
            .await?;
        self.credentials().set_user(&user).await?;
        Ok(user)
    }

    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<User> {
        let body = serde_json::to_value(update)
            .map_err(|e| session_auth::Error::Decode(format!("encoding profile update: {e}")))?;
        let response: ProfileUpdateResponse = self
            .gateway
            .request(PROFILE_UPDATE_PATH, &RequestOptions::patch(body))
            .await?;
        self.credentials().set_user(&response.user).await?;
        Ok(response.user)
    }

    /// Re-fetch the profile; on any failure the session is dropped.
    pub async fn refresh_user(&self) -> Result<User> {
        match self.profile().await {
            Ok(user) => Ok(user),
            Err(e) => {
                warn!(error = %e, "profile fetch failed, clearing session");
                self.credentials().clear_tokens().await?;
                Err(e)
            }
        }
    }

    /// Validate a session persisted by an earlier run.
    ///
    /// Only attempted when both a cached user and an access token exist.
    /// Returns the fresh user, or `None` if there was nothing to restore or
    /// the stored credentials no longer work (they are cleared).
    pub async fn restore(&self) -> Result<Option<User>> {
        let credentials = self.credentials();
        if credentials.user().await?.is_none() || credentials.access_token().await?.is_none() {
            return Ok(None);
        }

        match self.profile().await {
            Ok(user) => Ok(Some(user)),
            Err(e) => {
                warn!(error = %e, "stored session is no longer valid");
                credentials.clear_tokens().await?;
                Ok(None)
            }
        }
    }

    /// Whether a user snapshot is cached (the session is considered signed in).
    pub async fn is_authenticated(&self) -> Result<bool> {
        Ok(self.credentials().user().await?.is_some())
    }

    pub async fn logout(&self) -> Result<()> {
        self.credentials().clear_tokens().await?;
        info!("logged out");
        Ok(())
    }

    async fn store_session(&self, response: &AuthResponse) -> Result<()> {
        let credentials = self.credentials();
        credentials
            .set_tokens(
                response.tokens.access.expose(),
                response.tokens.refresh.expose(),
            )
            .await?;
        credentials.set_user(&response.user).await
    }
}
