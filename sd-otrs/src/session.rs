use crate::client::OtrsClient;
use crate::error::Result;
use crate::token::{DEFAULT_TOKEN_MAX_AGE, SessionToken, TokenStore};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::Mutex;

#[derive(Clone)]
pub struct Credentials {
    pub login: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("login", &self.login)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Owns the ticketing session: reuses a fresh persisted token, otherwise logs in again.
pub struct SessionManager {
    client: OtrsClient,
    credentials: Credentials,
    store: Arc<dyn TokenStore>,
    max_age: Duration,
    current: Mutex<Option<SessionToken>>,
}

impl SessionManager {
    pub fn new(client: OtrsClient, credentials: Credentials, store: Arc<dyn TokenStore>) -> Self {
        Self {
            client,
            credentials,
            store,
            max_age: DEFAULT_TOKEN_MAX_AGE,
            current: Mutex::new(None),
        }
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    pub fn client(&self) -> &OtrsClient {
        &self.client
    }

    /// Return a fresh token, creating a new backend session when needed.
    ///
    /// Failing to persist a new token is logged and otherwise ignored.
    #[tracing::instrument(level = "info", skip_all)]
    pub async fn acquire_token(&self) -> Result<SessionToken> {
        let mut current = self.current.lock().await;
        let now = SystemTime::now();

        if let Some(token) = current.as_ref() {
            if token.is_fresh_at(now, self.max_age) {
                return Ok(token.clone());
            }
        }

        if let Some(token) = self.store.load().await {
            if token.is_fresh_at(now, self.max_age) {
                tracing::debug!("reusing persisted otrs session");
                *current = Some(token.clone());
                return Ok(token);
            }
            tracing::debug!("persisted otrs session is stale");
        }

        let token = self
            .client
            .create_session(&self.credentials.login, &self.credentials.password)
            .await?;
        tracing::info!(login = %self.credentials.login, "otrs session created");
        if let Err(e) = self.store.save(&token).await {
            tracing::warn!(%e, "could not persist otrs session token; continuing with in-memory token");
        }
        *current = Some(token.clone());
        Ok(token)
    }

    /// Drop the cached token so the next `acquire_token` logs in again.
    pub async fn invalidate(&self) {
        *self.current.lock().await = None;
        if let Err(e) = self.store.clear().await {
            tracing::warn!(%e, "could not remove persisted otrs session token");
        }
    }
}
