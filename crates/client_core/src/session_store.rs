//! Session persistence seam.
//!
//! The client never talks to SQLite directly; it goes through
//! [`SessionStore`] so tests can substitute an in-memory store. A restored
//! record is trusted as-is — there is no staleness check, a bad session
//! simply fails on the first authenticated call.

use anyhow::Result;
use async_trait::async_trait;
use shared::protocol::Session;
use storage::Storage;

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Reads the persisted session, if any. No network I/O.
    async fn restore(&self) -> Result<Option<Session>>;
    async fn save(&self, session: &Session) -> Result<()>;
    async fn clear(&self) -> Result<()>;
}

/// SQLite-backed store used by the real client.
pub struct DurableSessionStore {
    storage: Storage,
}

impl DurableSessionStore {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl SessionStore for DurableSessionStore {
    async fn restore(&self) -> Result<Option<Session>> {
        self.storage.load_session().await
    }

    async fn save(&self, session: &Session) -> Result<()> {
        self.storage.save_session(session).await
    }

    async fn clear(&self) -> Result<()> {
        self.storage.clear_session().await
    }
}
