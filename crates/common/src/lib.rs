//! Pieces shared by the session client crates and `authctl`
//!
//! - [`Secret`] holds bearer tokens, refresh tokens and OAuth codes so they
//!   never reach logs through `Debug` and are zeroed when dropped.
//! - [`Error`] reports why `authctl` configuration could not be loaded.

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
