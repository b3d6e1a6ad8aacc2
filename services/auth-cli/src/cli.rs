//! Command-line interface

use clap::{Parser, Subcommand};
use provider::Provider;

#[derive(Debug, Parser)]
#[command(name = "authctl", about = "Sign in to the identity backend and manage the local session")]
pub struct Cli {
    /// Config file (defaults to CONFIG_PATH, then ./authctl.toml).
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Log in with email and password.
    Login { email: String, password: String },
    /// Create an account; tokens arrive after email verification.
    Register {
        email: String,
        password: String,
        #[arg(long)]
        first_name: Option<String>,
        #[arg(long)]
        last_name: Option<String>,
    },
    /// Confirm an email address with the emailed token.
    VerifyEmail { token: String },
    /// Send the verification email again.
    ResendVerification { email: String },
    /// Show the signed-in user.
    Profile,
    /// Change name fields of the signed-in user.
    UpdateProfile {
        #[arg(long, required_unless_present = "last_name")]
        first_name: Option<String>,
        #[arg(long)]
        last_name: Option<String>,
    },
    /// Drop the stored session.
    Logout,
    /// Google and GitHub sign-in.
    #[command(name = "oauth")]
    OAuth {
        #[command(subcommand)]
        action: OAuthCommand,
    },
    /// Validate the stored session against the backend.
    Status,
}

#[derive(Debug, PartialEq, Eq, Subcommand)]
pub enum OAuthCommand {
    /// Print the provider's authorization URL.
    Start { provider: Provider },
    /// Finish sign-in from the URL the browser was redirected to.
    Callback { url: String },
}
