//! Client-side credential persistence for the identity backend
//!
//! Holds the access/refresh token pair and the cached user profile, the
//! wire types the backend returns when it issues tokens, and the error
//! taxonomy used across the workspace. Nothing here talks to the network
//! except [`token::refresh_access_token`], which is the single refresh call
//! the session gateway's coordinator is allowed to issue.
//!
//! Credential flow:
//! 1. Login, email verification or OAuth exchange returns an [`AuthResponse`]
//! 2. Tokens and user stored via [`CredentialStore::set_tokens`] / [`CredentialStore::set_user`]
//! 3. Access token expires, coordinator calls [`token::refresh_access_token`]
//! 4. New access token stored via [`CredentialStore::set_access_token`]
//! 5. Logout or failed refresh calls [`CredentialStore::clear_tokens`]

pub mod constants;
pub mod credentials;
pub mod error;
pub mod storage;
pub mod token;

pub use credentials::{CredentialStore, User};
pub use error::{CsrfFailure, Error, Result, backend_message};
pub use storage::{FileStore, KeyValueStore, MemoryStore, StoreFuture};
pub use token::{AuthResponse, RefreshResponse, TokenPair, refresh_access_token};
