//! Wiring and command execution

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use oauth_redirect::{
    AuthorizationInitiator, ExchangeClient, Navigator, OAuthFlow, OAuthStateManager,
    OAuthStateStore, SessionTokenClient,
};
use session_auth::{CredentialStore, FileStore, KeyValueStore, MemoryStore, User};
use session_gateway::{AuthApi, ProfileUpdate, RefreshCoordinator, RegisterRequest, RequestGateway};
use tracing::info;
use url::Url;

use crate::cli::{Command, OAuthCommand};
use crate::config::Config;

const CREDENTIALS_FILE: &str = "credentials.json";
const OAUTH_STATE_FILE: &str = "oauth-state.json";

/// A terminal has no browser to navigate; the URL is printed for the user.
struct PrintNavigator;

impl Navigator for PrintNavigator {
    fn redirect(&self, url: &Url) -> session_auth::Result<()> {
        println!("{url}");
        Ok(())
    }
}

/// Every component of one session, sharing one credential store.
pub struct App {
    api: Arc<AuthApi>,
    initiator: AuthorizationInitiator,
    flow: OAuthFlow,
}

impl App {
    pub async fn build(config: &Config) -> Result<Self> {
        let dir = &config.storage.dir;
        let credential_file = FileStore::load(dir.join(CREDENTIALS_FILE))
            .await
            .with_context(|| format!("failed to open credentials in {}", dir.display()))?;
        let state_file = FileStore::load(dir.join(OAUTH_STATE_FILE))
            .await
            .with_context(|| format!("failed to open OAuth state in {}", dir.display()))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.api.timeout_secs))
            .build()
            .context("failed to build HTTP client")?;

        let base_url = config.api.base_url.clone();
        let credentials = Arc::new(CredentialStore::new(Arc::new(credential_file)));
        let coordinator = RefreshCoordinator::new(client.clone(), base_url.clone(), credentials.clone());
        let gateway = RequestGateway::new(client.clone(), base_url.clone(), credentials, coordinator);
        let api = Arc::new(AuthApi::new(Arc::new(gateway)));

        let settings = Arc::new(config.oauth_settings());
        let primary: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let secondary: Arc<dyn KeyValueStore> = Arc::new(state_file);
        let states = Arc::new(OAuthStateManager::new(OAuthStateStore::dual(primary, secondary)));

        let initiator = AuthorizationInitiator::new(
            client.clone(),
            settings.clone(),
            states.clone(),
            Arc::new(PrintNavigator),
        );
        let exchange = ExchangeClient::new(client, settings, states);
        let sessions = SessionTokenClient::new(base_url)?;
        let flow = OAuthFlow::new(exchange, sessions, api.clone());

        Ok(Self {
            api,
            initiator,
            flow,
        })
    }

    pub async fn run(&self, command: Command) -> Result<()> {
        match command {
            Command::Login { email, password } => {
                let response = self.api.login(&email, &password).await.map_err(describe)?;
                print_message(response.message.as_deref());
                print_user(&response.user)?;
            }
            Command::Register {
                email,
                password,
                first_name,
                last_name,
            } => {
                let request = RegisterRequest {
                    email,
                    first_name: first_name.unwrap_or_default(),
                    last_name: last_name.unwrap_or_default(),
                    password2: password.clone(),
                    password,
                };
                let response = self.api.register(&request).await.map_err(describe)?;
                print_message(response.message.as_deref());
                print_user(&response.user)?;
            }
            Command::VerifyEmail { token } => {
                let response = self.api.verify_email(&token).await.map_err(describe)?;
                print_message(response.message.as_deref());
                print_user(&response.user)?;
            }
            Command::ResendVerification { email } => {
                let response = self
                    .api
                    .resend_verification(&email)
                    .await
                    .map_err(describe)?;
                print_message(response.message.as_deref());
            }
            Command::Profile => {
                let user = self.api.profile().await.map_err(describe)?;
                print_user(&user)?;
            }
            Command::UpdateProfile {
                first_name,
                last_name,
            } => {
                let update = ProfileUpdate {
                    first_name,
                    last_name,
                };
                let user = self.api.update_profile(&update).await.map_err(describe)?;
                print_user(&user)?;
            }
            Command::Logout => {
                self.api.logout().await.map_err(describe)?;
                println!("logged out");
            }
            Command::OAuth {
                action: OAuthCommand::Start { provider },
            } => {
                if !self.initiator.is_configured(provider) {
                    info!(provider = %provider, "no local client id, relying on backend config");
                }
                self.initiator.initiate(provider).await.map_err(describe)?;
            }
            Command::OAuth {
                action: OAuthCommand::Callback { url },
            } => {
                let (provider, user) = self.flow.complete(&url).await.map_err(describe)?;
                println!("logged in with {provider}");
                print_user(&user)?;
            }
            Command::Status => match self.api.restore().await.map_err(describe)? {
                Some(user) => {
                    println!("signed in as {}", user.email);
                }
                None => println!("not signed in"),
            },
        }
        Ok(())
    }
}

/// Attach the backend's own message to HTTP failures.
fn describe(err: session_auth::Error) -> anyhow::Error {
    match err.status() {
        Some(_) => {
            let message = err.message();
            anyhow::Error::new(err).context(message)
        }
        None => err.into(),
    }
}

fn print_message(message: Option<&str>) {
    if let Some(message) = message {
        println!("{message}");
    }
}

fn print_user(user: &User) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(user)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::Json;
    use axum::routing::{get, post};
    use serde_json::json;
    use session_auth::constants::{LOGIN_PATH, PROFILE_PATH};

    use crate::config::{ApiConfig, OAuthConfig, StorageConfig};

    async fn start_backend() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());

        let app = axum::Router::new()
            .route(
                LOGIN_PATH,
                post(|| async {
                    Json(json!({
                        "message": "Login successful",
                        "user": {"id": 1, "email": "user@test.com"},
                        "tokens": {"access": "A1", "refresh": "R1"}
                    }))
                }),
            )
            .route(
                PROFILE_PATH,
                get(|| async { Json(json!({"id": 1, "email": "user@test.com"})) }),
            );
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        url
    }

    fn config(base_url: &str, dir: &std::path::Path) -> Config {
        Config {
            api: ApiConfig {
                base_url: base_url.to_string(),
                timeout_secs: 5,
            },
            oauth: OAuthConfig {
                frontend_url: "http://localhost:8081".into(),
                google_client_id: Some("local-google-id".into()),
                github_client_id: None,
            },
            storage: StorageConfig {
                dir: dir.to_path_buf(),
            },
        }
    }

    #[tokio::test]
    async fn session_persists_between_invocations() {
        let url = start_backend().await;
        let dir = tempfile::tempdir().unwrap();
        let config = config(&url, dir.path());

        let first = App::build(&config).await.unwrap();
        first
            .run(Command::Login {
                email: "user@test.com".into(),
                password: "secret".into(),
            })
            .await
            .unwrap();

        let second = App::build(&config).await.unwrap();
        let restored = second.api.restore().await.unwrap();
        assert_eq!(restored.unwrap().email, "user@test.com");

        second.run(Command::Logout).await.unwrap();
        let third = App::build(&config).await.unwrap();
        assert!(third.api.restore().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn oauth_state_survives_between_invocations() {
        let url = start_backend().await;
        let dir = tempfile::tempdir().unwrap();
        let config = config(&url, dir.path());

        let start = App::build(&config).await.unwrap();
        let authorize = start
            .initiator
            .authorization_url(provider::Provider::Google)
            .await
            .unwrap();
        let state = authorize
            .query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v.into_owned())
            .unwrap();

        // A later process starts with an empty in-memory primary
        let secondary: Arc<dyn KeyValueStore> = Arc::new(
            FileStore::load(dir.path().join(OAUTH_STATE_FILE))
                .await
                .unwrap(),
        );
        let states = OAuthStateManager::new(OAuthStateStore::dual(
            Arc::new(MemoryStore::new()),
            secondary,
        ));
        states
            .verify(provider::Provider::Google, &state)
            .await
            .unwrap();
    }

    #[test]
    fn http_errors_carry_backend_message() {
        let err = describe(session_auth::Error::Http {
            status: 400,
            body: json!({"email": ["Enter a valid email address."]}),
        });
        assert_eq!(err.to_string(), "Enter a valid email address.");

        let err = describe(session_auth::Error::SessionExpired);
        assert_eq!(err.to_string(), "session expired, please login again");
    }
}
