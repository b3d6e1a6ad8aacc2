//! Authenticated request pipeline for the identity backend
//!
//! Every authenticated call goes through [`RequestGateway`], which attaches
//! the bearer token, recovers from one expired-token `401` by asking the
//! [`RefreshCoordinator`] for a fresh access token, and retries exactly once.
//! The coordinator collapses concurrent refresh triggers into a single
//! network call and hands the same outcome to every caller.
//!
//! Request lifecycle:
//! 1. Gateway reads the access token from `CredentialStore` and sends the request
//! 2. Backend returns 401 → gateway asks the coordinator for a new token
//! 3. Coordinator is idle → spawns one refresh call; otherwise joins the one in flight
//! 4. Refresh succeeds → new token stored, every waiter retries with it
//! 5. Refresh fails → credentials cleared, every waiter gets `SessionExpired`
//!
//! [`AuthApi`] layers the backend's account endpoints (login, registration,
//! email verification, profile) on top of the gateway.

pub mod api;
pub mod gateway;
pub mod refresh;

pub use api::{AuthApi, MessageResponse, ProfileUpdate, RegisterRequest, RegisterResponse};
pub use gateway::{RequestGateway, RequestOptions};
pub use refresh::{RefreshCoordinator, RefreshOutcome};
pub use session_auth::{Error, Result};
