//! Credential storage for the signed-in session
//!
//! Wraps a [`KeyValueStore`] with the three persisted values of a session:
//! the access token, the refresh token and a JSON snapshot of the user
//! profile. Absence is never an error; a missing or unreadable value is
//! reported as `None`.
//!
//! Writes that touch more than one key go through a single `set_many` /
//! `remove_many` call while holding the write side of `pair_lock`, and
//! [`CredentialStore::tokens`] reads both tokens under the read side, so a
//! caller never pairs an old access token with a new refresh token.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::constants::{ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, USER_KEY};
use crate::error::{Error, Result};
use crate::storage::KeyValueStore;

/// Cached profile snapshot. The shape is owned by the backend's profile
/// endpoint; unknown fields are preserved in `extra`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct User {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub is_email_verified: bool,
    #[serde(default)]
    pub auth_provider: String,
    #[serde(default)]
    pub date_joined: Option<String>,
    #[serde(default)]
    pub last_login: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Persisted access/refresh pair plus cached user.
pub struct CredentialStore {
    backend: Arc<dyn KeyValueStore>,
    pair_lock: RwLock<()>,
}

impl CredentialStore {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self {
            backend,
            pair_lock: RwLock::new(()),
        }
    }

    pub async fn access_token(&self) -> Result<Option<String>> {
        let _guard = self.pair_lock.read().await;
        self.backend.get(ACCESS_TOKEN_KEY).await
    }

    pub async fn refresh_token(&self) -> Result<Option<String>> {
        let _guard = self.pair_lock.read().await;
        self.backend.get(REFRESH_TOKEN_KEY).await
    }

    /// Whether a refresh token is stored. No refresh may be attempted without one.
    pub async fn has_refresh_token(&self) -> Result<bool> {
        Ok(self
            .refresh_token()
            .await?
            .is_some_and(|token| !token.is_empty()))
    }

    /// Both tokens read as one consistent snapshot.
    pub async fn tokens(&self) -> Result<(Option<String>, Option<String>)> {
        let _guard = self.pair_lock.read().await;
        let access = self.backend.get(ACCESS_TOKEN_KEY).await?;
        let refresh = self.backend.get(REFRESH_TOKEN_KEY).await?;
        Ok((access, refresh))
    }

    /// Overwrite both tokens as one logical unit.
    pub async fn set_tokens(&self, access: &str, refresh: &str) -> Result<()> {
        let _guard = self.pair_lock.write().await;
        self.backend
            .set_many(&[(ACCESS_TOKEN_KEY, access), (REFRESH_TOKEN_KEY, refresh)])
            .await?;
        debug!(backend = self.backend.name(), "stored token pair");
        Ok(())
    }

    /// Replace only the access token, keeping the stored refresh token.
    pub async fn set_access_token(&self, access: &str) -> Result<()> {
        let _guard = self.pair_lock.write().await;
        self.backend.set_many(&[(ACCESS_TOKEN_KEY, access)]).await?;
        debug!(backend = self.backend.name(), "stored access token");
        Ok(())
    }

    /// Cached user, or `None` if absent or unparseable.
    pub async fn user(&self) -> Result<Option<User>> {
        let Some(raw) = self.backend.get(USER_KEY).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(user) => Ok(Some(user)),
            Err(e) => {
                warn!(error = %e, "cached user is corrupt, treating as absent");
                Ok(None)
            }
        }
    }

    pub async fn set_user(&self, user: &User) -> Result<()> {
        let json = serde_json::to_string(user)
            .map_err(|e| Error::Storage(format!("serializing user: {e}")))?;
        self.backend.set_many(&[(USER_KEY, json.as_str())]).await
    }

    /// Remove access token, refresh token and cached user together.
    pub async fn clear_tokens(&self) -> Result<()> {
        let _guard = self.pair_lock.write().await;
        self.backend
            .remove_many(&[ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, USER_KEY])
            .await?;
        debug!(backend = self.backend.name(), "cleared credentials");
        Ok(())
    }
}
