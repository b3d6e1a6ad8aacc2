//! Errors from loading `authctl` configuration
//!
//! Each variant names where the bad input came from: the config file on
//! disk, or one setting after the environment overlay.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// The config file exists (or was named explicitly) but can't be read.
    #[error("cannot read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// A setting has a value the client can't work with, e.g. a backend URL
    /// without a scheme or a zero request timeout. `setting` is the TOML key
    /// or the environment variable it came from.
    #[error("invalid {setting}: {reason}")]
    Invalid {
        setting: &'static str,
        reason: String,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
