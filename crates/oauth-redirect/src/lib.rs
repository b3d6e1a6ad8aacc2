//! OAuth authorization-code redirect flow with CSRF state protection
//!
//! Flow:
//! 1. `AuthorizationInitiator::initiate()` issues a state via `OAuthStateManager`
//!    and redirects to the provider's consent page
//! 2. The provider redirects back to `/auth/callback/{provider}`
//! 3. `OAuthFlow::complete()` parses the callback with `CallbackParams::parse()`
//! 4. `ExchangeClient::exchange()` verifies (and consumes) the state, then
//!    trades the code for tokens; no state, no network call
//! 5. Tokens and user land in the `CredentialStore`; the profile is re-fetched
//!    to confirm them

pub mod callback;
pub mod exchange;
pub mod flow;
pub mod initiator;
pub mod session;
pub mod settings;
pub mod state;

pub use callback::CallbackParams;
pub use exchange::{ExchangeClient, ExchangeResponse};
pub use flow::OAuthFlow;
pub use initiator::{AuthorizationInitiator, Navigator};
pub use session::SessionTokenClient;
pub use settings::OAuthSettings;
pub use state::{
    KvStateRepository, OAuthStateManager, OAuthStateStore, STATE_TTL, StateRepository,
    StoredState, generate_state,
};
