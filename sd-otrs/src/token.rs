use crate::error::Result;
use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::sync::Mutex;

/// Default freshness window: 55 minutes.
pub const DEFAULT_TOKEN_MAX_AGE: Duration = Duration::from_secs(3300);

/// Session id for the ticketing backend plus the moment it was obtained.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken {
    value: String,
    acquired_at: SystemTime,
}

impl SessionToken {
    pub fn new(value: impl Into<String>, acquired_at: SystemTime) -> Self {
        Self {
            value: value.into(),
            acquired_at,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn acquired_at(&self) -> SystemTime {
        self.acquired_at
    }

    /// Fresh while `now - acquired_at <= max_age`. A timestamp in the future counts as fresh.
    pub fn is_fresh_at(&self, now: SystemTime, max_age: Duration) -> bool {
        match now.duration_since(self.acquired_at) {
            Ok(age) => age <= max_age,
            Err(_) => true,
        }
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionToken")
            .field("value", &"<redacted>")
            .field("acquired_at", &self.acquired_at)
            .finish()
    }
}

/// Durable home for the current session token. Freshness is decided by the caller.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn load(&self) -> Option<SessionToken>;
    async fn save(&self, token: &SessionToken) -> Result<()>;
    async fn clear(&self) -> Result<()>;
}

/// Token persisted as a plain file; its modification time is the acquisition time.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn load(&self) -> Option<SessionToken> {
        let metadata = match tokio::fs::metadata(&self.path).await {
            Ok(v) => v,
            Err(e) => {
                tracing::debug!(path = %self.path.display(), %e, "no persisted token");
                return None;
            }
        };
        if metadata.len() == 0 {
            return None;
        }
        let modified = metadata.modified().ok()?;
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(v) => v,
            Err(e) => {
                tracing::debug!(path = %self.path.display(), %e, "persisted token unreadable");
                return None;
            }
        };
        let value = contents.trim_end();
        if value.is_empty() {
            return None;
        }
        Some(SessionToken::new(value, modified))
    }

    async fn save(&self, token: &SessionToken) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(&self.path, token.as_str()).await?;
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Process-local store; nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    slot: Mutex<Option<SessionToken>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: SessionToken) -> Self {
        Self {
            slot: Mutex::new(Some(token)),
        }
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn load(&self) -> Option<SessionToken> {
        self.slot.lock().await.clone()
    }

    async fn save(&self, token: &SessionToken) -> Result<()> {
        *self.slot.lock().await = Some(token.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        *self.slot.lock().await = None;
        Ok(())
    }
}
