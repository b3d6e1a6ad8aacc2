//! CSRF state for the authorization-code redirect
//!
//! A state value is generated when an authorization attempt starts, stored
//! per provider together with its creation time, and consumed by exactly one
//! successful [`OAuthStateManager::verify`] when the provider redirects back.
//!
//! Records are replicated across an ordered list of [`StateRepository`]
//! backends. Reads take the first repository that holds a record; writes and
//! purges go to all of them, so losing one backend between the outbound
//! redirect and the callback does not lose the state.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use provider::Provider;
use rand::RngExt;
use session_auth::constants::{oauth_state_key, oauth_state_time_key};
use session_auth::{CsrfFailure, Error, KeyValueStore, Result, StoreFuture};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// How long a stored state remains acceptable.
pub const STATE_TTL: Duration = Duration::from_secs(10 * 60);

const STATE_BYTES: usize = 32;

/// A stored state value and when it was issued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredState {
    pub value: String,
    /// Unix time in milliseconds
    pub created_at_millis: u64,
}

impl StoredState {
    /// A record created now.
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            created_at_millis: now_millis(),
        }
    }

    /// Older than `ttl`, or stamped in the future (clock stepped back or a
    /// hand-edited file). A record with no trustworthy age never verifies.
    fn is_expired(&self, now_millis: u64, ttl: Duration) -> bool {
        match now_millis.checked_sub(self.created_at_millis) {
            Some(age) => Duration::from_millis(age) > ttl,
            None => true,
        }
    }
}

/// Generate an unpredictable state value.
///
/// 32 bytes from the thread-local CSPRNG, URL-safe base64 without padding
/// (43 characters).
pub fn generate_state() -> String {
    let mut bytes = [0u8; STATE_BYTES];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// One backend holding at most one state record per provider.
pub trait StateRepository: Send + Sync {
    /// Backend label for logging
    fn name(&self) -> &str;

    fn get<'a>(&'a self, provider: Provider) -> StoreFuture<'a, Option<StoredState>>;

    /// Replace the record for `provider`.
    fn put<'a>(&'a self, provider: Provider, state: &'a StoredState) -> StoreFuture<'a, ()>;

    fn delete<'a>(&'a self, provider: Provider) -> StoreFuture<'a, ()>;
}

/// [`StateRepository`] over a [`KeyValueStore`], using the keys
/// `oauth_state_{provider}` and `oauth_state_time_{provider}`.
pub struct KvStateRepository {
    backend: Arc<dyn KeyValueStore>,
}

impl KvStateRepository {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self { backend }
    }
}

impl StateRepository for KvStateRepository {
    fn name(&self) -> &str {
        self.backend.name()
    }

    fn get<'a>(&'a self, provider: Provider) -> StoreFuture<'a, Option<StoredState>> {
        Box::pin(async move {
            let value = self.backend.get(&oauth_state_key(provider.as_str())).await?;
            let time = self
                .backend
                .get(&oauth_state_time_key(provider.as_str()))
                .await?;

            // Half-written or hand-edited records count as absent
            let (Some(value), Some(time)) = (value, time) else {
                return Ok(None);
            };
            match time.parse::<u64>() {
                Ok(created_at_millis) => Ok(Some(StoredState {
                    value,
                    created_at_millis,
                })),
                Err(_) => {
                    warn!(provider = %provider, backend = self.name(), "unparseable state timestamp");
                    Ok(None)
                }
            }
        })
    }

    fn put<'a>(&'a self, provider: Provider, state: &'a StoredState) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let key = oauth_state_key(provider.as_str());
            let time_key = oauth_state_time_key(provider.as_str());
            let time = state.created_at_millis.to_string();
            self.backend
                .set_many(&[(key.as_str(), state.value.as_str()), (time_key.as_str(), time.as_str())])
                .await
        })
    }

    fn delete<'a>(&'a self, provider: Provider) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let key = oauth_state_key(provider.as_str());
            let time_key = oauth_state_time_key(provider.as_str());
            self.backend
                .remove_many(&[key.as_str(), time_key.as_str()])
                .await
        })
    }
}

/// Provider-keyed state records replicated over ordered repositories.
///
/// The first repository is the primary; later ones are fallbacks consulted
/// only when earlier ones hold nothing.
#[derive(Clone)]
pub struct OAuthStateStore {
    repositories: Vec<Arc<dyn StateRepository>>,
}

impl OAuthStateStore {
    pub fn new(repositories: Vec<Arc<dyn StateRepository>>) -> Self {
        Self { repositories }
    }

    /// Primary and secondary key/value backends, in that order.
    pub fn dual(primary: Arc<dyn KeyValueStore>, secondary: Arc<dyn KeyValueStore>) -> Self {
        let repositories: Vec<Arc<dyn StateRepository>> = vec![
            Arc::new(KvStateRepository::new(primary)),
            Arc::new(KvStateRepository::new(secondary)),
        ];
        Self::new(repositories)
    }

    /// First record found, in repository order.
    ///
    /// A repository that fails to read is skipped so a broken primary does
    /// not hide the secondary.
    pub async fn load(&self, provider: Provider) -> Result<Option<StoredState>> {
        for repository in &self.repositories {
            match repository.get(provider).await {
                Ok(Some(state)) => return Ok(Some(state)),
                Ok(None) => {
                    debug!(provider = %provider, backend = repository.name(), "no stored state");
                }
                Err(e) => {
                    warn!(provider = %provider, backend = repository.name(), error = %e, "state read failed");
                }
            }
        }
        Ok(None)
    }

    /// Write the record to every repository. Fails only if none accepted it.
    pub async fn store(&self, provider: Provider, state: &StoredState) -> Result<()> {
        let mut stored = 0;
        let mut last_error = None;
        for repository in &self.repositories {
            match repository.put(provider, state).await {
                Ok(()) => stored += 1,
                Err(e) => {
                    warn!(provider = %provider, backend = repository.name(), error = %e, "state write failed");
                    last_error = Some(e);
                }
            }
        }

        match (stored, last_error) {
            (0, Some(e)) => Err(e),
            (0, None) => Err(Error::Storage("no state repositories configured".into())),
            _ => Ok(()),
        }
    }

    /// Delete the record from every repository.
    ///
    /// Every repository is attempted; the first failure is returned so a
    /// consumed value that could not be removed is never reported as gone.
    pub async fn purge(&self, provider: Provider) -> Result<()> {
        let mut first_error = None;
        for repository in &self.repositories {
            if let Err(e) = repository.delete(provider).await {
                warn!(provider = %provider, backend = repository.name(), error = %e, "state purge failed");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

/// Issues and checks single-use CSRF state values.
pub struct OAuthStateManager {
    store: OAuthStateStore,
    ttl: Duration,
    // Serializes store/verify so two callbacks cannot both consume one value
    guard: Mutex<()>,
}

impl OAuthStateManager {
    pub fn new(store: OAuthStateStore) -> Self {
        Self {
            store,
            ttl: STATE_TTL,
            guard: Mutex::new(()),
        }
    }

    pub fn records(&self) -> &OAuthStateStore {
        &self.store
    }

    pub fn generate_state(&self) -> String {
        generate_state()
    }

    /// Persist `value` as the current state for `provider`, superseding any
    /// earlier one.
    pub async fn store(&self, provider: Provider, value: &str) -> Result<()> {
        let _guard = self.guard.lock().await;
        self.store.store(provider, &StoredState::new(value)).await
    }

    /// Generate a fresh state for `provider` and store it.
    pub async fn issue(&self, provider: Provider) -> Result<String> {
        let value = self.generate_state();
        self.store(provider, &value).await?;
        debug!(provider = %provider, "issued OAuth state");
        Ok(value)
    }

    /// Check `received` against the stored state for `provider`.
    ///
    /// Missing or expired records and mismatched values fail with
    /// [`Error::Csrf`]. Expired records are purged; a mismatch leaves the
    /// record in place. A match consumes the record.
    pub async fn verify(&self, provider: Provider, received: &str) -> Result<()> {
        let _guard = self.guard.lock().await;

        let Some(stored) = self.store.load(provider).await? else {
            return Err(reject(provider, CsrfFailure::Missing));
        };

        if stored.is_expired(now_millis(), self.ttl) {
            self.store.purge(provider).await?;
            return Err(reject(provider, CsrfFailure::Expired));
        }

        if stored.value != received {
            return Err(reject(provider, CsrfFailure::Mismatch));
        }

        self.store.purge(provider).await?;
        metrics::counter!("oauth_state_verify_total", "result" => "ok").increment(1);
        info!(provider = %provider, "OAuth state verified");
        Ok(())
    }
}

fn reject(provider: Provider, failure: CsrfFailure) -> Error {
    warn!(provider = %provider, reason = failure.as_str(), "OAuth state rejected");
    metrics::counter!("oauth_state_verify_total", "result" => failure.as_str()).increment(1);
    Error::Csrf(failure)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    use session_auth::{FileStore, MemoryStore};

    fn memory() -> Arc<dyn KeyValueStore> {
        Arc::new(MemoryStore::new())
    }

    fn manager() -> OAuthStateManager {
        OAuthStateManager::new(OAuthStateStore::dual(memory(), memory()))
    }

    struct FailingRepository;

    impl StateRepository for FailingRepository {
        fn name(&self) -> &str {
            "failing"
        }

        fn get<'a>(&'a self, _: Provider) -> StoreFuture<'a, Option<StoredState>> {
            Box::pin(async { Err(Error::Storage("unavailable".into())) })
        }

        fn put<'a>(&'a self, _: Provider, _: &'a StoredState) -> StoreFuture<'a, ()> {
            Box::pin(async { Err(Error::Storage("unavailable".into())) })
        }

        fn delete<'a>(&'a self, _: Provider) -> StoreFuture<'a, ()> {
            Box::pin(async { Err(Error::Storage("unavailable".into())) })
        }
    }

    #[test]
    fn generated_states_do_not_collide() {
        let states: HashSet<String> = (0..10_000).map(|_| generate_state()).collect();
        assert_eq!(states.len(), 10_000);
    }

    #[test]
    fn generated_state_is_url_safe() {
        let state = generate_state();
        assert_eq!(state.len(), 43);
        assert!(
            state
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'),
            "state must be URL-safe base64: {state}"
        );
    }

    #[tokio::test]
    async fn state_verifies_exactly_once() {
        let manager = manager();
        let state = manager.issue(Provider::Google).await.unwrap();

        manager.verify(Provider::Google, &state).await.unwrap();
        let second = manager.verify(Provider::Google, &state).await;
        assert!(matches!(second, Err(Error::Csrf(CsrfFailure::Missing))));
    }

    #[tokio::test]
    async fn missing_state_fails_closed() {
        let manager = manager();
        let result = manager
            .verify(Provider::Github, "a-long-enough-looking-state-value")
            .await;
        assert!(matches!(result, Err(Error::Csrf(CsrfFailure::Missing))));
    }

    #[tokio::test]
    async fn expired_state_is_rejected_and_purged() {
        let manager = manager();
        let eleven_minutes_ago = now_millis() - 11 * 60 * 1000;
        let stale = StoredState {
            value: "stale-state".into(),
            created_at_millis: eleven_minutes_ago,
        };
        manager
            .records()
            .store(Provider::Google, &stale)
            .await
            .unwrap();

        let result = manager.verify(Provider::Google, "stale-state").await;
        assert!(matches!(result, Err(Error::Csrf(CsrfFailure::Expired))));
        assert!(
            manager
                .records()
                .load(Provider::Google)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn future_dated_state_is_rejected_and_purged() {
        let manager = manager();
        let future = StoredState {
            value: "from-the-future".into(),
            created_at_millis: now_millis() + 60_000,
        };
        manager
            .records()
            .store(Provider::Github, &future)
            .await
            .unwrap();

        let result = manager.verify(Provider::Github, "from-the-future").await;
        assert!(matches!(result, Err(Error::Csrf(CsrfFailure::Expired))));
        assert!(
            manager
                .records()
                .load(Provider::Github)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn expiry_boundaries() {
        let stored = StoredState {
            value: "v".into(),
            created_at_millis: 1_000_000,
        };
        let ttl_millis = STATE_TTL.as_millis() as u64;
        assert!(!stored.is_expired(1_000_000, STATE_TTL));
        assert!(!stored.is_expired(1_000_000 + ttl_millis, STATE_TTL));
        assert!(stored.is_expired(1_000_000 + ttl_millis + 1, STATE_TTL));
        assert!(stored.is_expired(999_999, STATE_TTL));
    }

    #[tokio::test]
    async fn state_just_inside_window_verifies() {
        let manager = manager();
        let nine_minutes_ago = now_millis() - 9 * 60 * 1000;
        let state = StoredState {
            value: "recent".into(),
            created_at_millis: nine_minutes_ago,
        };
        manager
            .records()
            .store(Provider::Github, &state)
            .await
            .unwrap();

        manager.verify(Provider::Github, "recent").await.unwrap();
    }

    #[tokio::test]
    async fn mismatch_keeps_stored_state() {
        let manager = manager();
        let state = manager.issue(Provider::Github).await.unwrap();

        let result = manager.verify(Provider::Github, "forged").await;
        assert!(matches!(result, Err(Error::Csrf(CsrfFailure::Mismatch))));

        manager.verify(Provider::Github, &state).await.unwrap();
    }

    #[tokio::test]
    async fn providers_are_independent() {
        let manager = manager();
        let google = manager.issue(Provider::Google).await.unwrap();
        let github = manager.issue(Provider::Github).await.unwrap();

        let crossed = manager.verify(Provider::Google, &github).await;
        assert!(matches!(crossed, Err(Error::Csrf(CsrfFailure::Mismatch))));
        manager.verify(Provider::Google, &google).await.unwrap();
        manager.verify(Provider::Github, &github).await.unwrap();
    }

    #[tokio::test]
    async fn newer_state_supersedes_older() {
        let manager = manager();
        let first = manager.issue(Provider::Google).await.unwrap();
        let second = manager.issue(Provider::Google).await.unwrap();

        let result = manager.verify(Provider::Google, &first).await;
        assert!(matches!(result, Err(Error::Csrf(CsrfFailure::Mismatch))));
        manager.verify(Provider::Google, &second).await.unwrap();
    }

    #[tokio::test]
    async fn secondary_backend_survives_lost_primary() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("oauth-state.json");

        let secondary: Arc<dyn KeyValueStore> = Arc::new(FileStore::load(path.clone()).await.unwrap());
        let before = OAuthStateManager::new(OAuthStateStore::dual(memory(), secondary));
        let state = before.issue(Provider::Google).await.unwrap();

        // A new process: fresh primary, secondary reloaded from disk
        let secondary: Arc<dyn KeyValueStore> = Arc::new(FileStore::load(path.clone()).await.unwrap());
        let after = OAuthStateManager::new(OAuthStateStore::dual(memory(), secondary));
        after.verify(Provider::Google, &state).await.unwrap();

        let reloaded: Arc<dyn KeyValueStore> = Arc::new(FileStore::load(path).await.unwrap());
        let repository = KvStateRepository::new(reloaded);
        assert!(repository.get(Provider::Google).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn incomplete_record_is_absent() {
        let backend = memory();
        backend
            .set_many(&[(oauth_state_key("google").as_str(), "orphan")])
            .await
            .unwrap();
        let repository = KvStateRepository::new(backend.clone());
        assert!(repository.get(Provider::Google).await.unwrap().is_none());

        backend
            .set_many(&[(oauth_state_time_key("google").as_str(), "not-a-number")])
            .await
            .unwrap();
        assert!(repository.get(Provider::Google).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn store_succeeds_while_any_repository_accepts() {
        let repositories: Vec<Arc<dyn StateRepository>> = vec![
            Arc::new(FailingRepository),
            Arc::new(KvStateRepository::new(memory())),
        ];
        let store = OAuthStateStore::new(repositories);

        store
            .store(Provider::Google, &StoredState::new("value"))
            .await
            .unwrap();
        let loaded = store.load(Provider::Google).await.unwrap().unwrap();
        assert_eq!(loaded.value, "value");
    }

    #[tokio::test]
    async fn store_fails_when_every_repository_fails() {
        let repositories: Vec<Arc<dyn StateRepository>> = vec![Arc::new(FailingRepository)];
        let store = OAuthStateStore::new(repositories);
        let result = store.store(Provider::Google, &StoredState::new("value")).await;
        assert!(matches!(result, Err(Error::Storage(_))));
    }

    #[tokio::test]
    async fn concurrent_verifies_consume_once() {
        let manager = Arc::new(manager());
        let state = manager.issue(Provider::Github).await.unwrap();

        let (a, b) = tokio::join!(
            manager.verify(Provider::Github, &state),
            manager.verify(Provider::Github, &state),
        );
        assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);
    }
}
