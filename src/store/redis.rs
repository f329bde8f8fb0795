//! Redis-backed session and login-state stores.
//!
//! Keys are namespaced (`session:<id>`, `auth_state:<state>`) and every
//! entry carries a TTL, so an abandoned login or a dead session disappears
//! on its own.

use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::{AsyncCommands, aio::ConnectionManager};
use std::time::Duration;

use super::{SessionStore, StateStore, TokenBundle};

const SESSION_KEY_PREFIX: &str = "session";
const STATE_KEY_PREFIX: &str = "auth_state";
const STATE_TTL: Duration = Duration::from_secs(5 * 60);

pub struct RedisSessionStore {
    connection: ConnectionManager,
    default_ttl: Duration,
}

impl RedisSessionStore {
    /// `default_ttl` is the configured SSO max lifespan; it bounds both the
    /// store TTL and the stamped absolute expiry of new sessions.
    #[must_use]
    pub fn new(connection: ConnectionManager, default_ttl: Duration) -> Self {
        Self {
            connection,
            default_ttl,
        }
    }

    fn key(&self, session_id: &str) -> String {
        format!("{SESSION_KEY_PREFIX}:{session_id}")
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn save(
        &self,
        session_id: &str,
        bundle: &TokenBundle,
        ttl: Option<Duration>,
    ) -> Result<()> {
        let (bundle, ttl) = super::stamped_for_save(bundle, ttl, self.default_ttl);
        let payload =
            serde_json::to_string(&bundle).context("failed to serialize session data")?;

        let mut connection = self.connection.clone();
        connection
            .set_ex::<_, _, ()>(self.key(session_id), payload, ttl.as_secs())
            .await
            .context("failed to save session to redis")?;

        Ok(())
    }

    async fn load(&self, session_id: &str) -> Result<Option<TokenBundle>> {
        let mut connection = self.connection.clone();
        let payload: Option<String> = connection
            .get(self.key(session_id))
            .await
            .context("failed to get session from redis")?;

        payload
            .map(|payload| {
                serde_json::from_str(&payload).context("failed to deserialize session data")
            })
            .transpose()
    }

    async fn delete(&self, session_id: &str) -> Result<()> {
        let mut connection = self.connection.clone();
        connection
            .del::<_, ()>(self.key(session_id))
            .await
            .context("failed to delete session from redis")?;

        Ok(())
    }

    async fn exists(&self, session_id: &str) -> Result<bool> {
        let mut connection = self.connection.clone();
        connection
            .exists(self.key(session_id))
            .await
            .context("failed to check session in redis")
    }
}

pub struct RedisStateStore {
    connection: ConnectionManager,
}

impl RedisStateStore {
    #[must_use]
    pub fn new(connection: ConnectionManager) -> Self {
        Self { connection }
    }

    fn key(&self, state: &str) -> String {
        format!("{STATE_KEY_PREFIX}:{state}")
    }
}

#[async_trait]
impl StateStore for RedisStateStore {
    async fn issue(&self, state: &str) -> Result<()> {
        let mut connection = self.connection.clone();
        connection
            .set_ex::<_, _, ()>(self.key(state), state, STATE_TTL.as_secs())
            .await
            .context("failed to set login state in redis")?;

        Ok(())
    }

    async fn consume(&self, state: &str) -> Result<bool> {
        // GETDEL keeps check-and-invalidate atomic; two callbacks racing on
        // the same state can not both win.
        let mut connection = self.connection.clone();
        let stored: Option<String> = redis::cmd("GETDEL")
            .arg(self.key(state))
            .query_async(&mut connection)
            .await
            .context("failed to consume login state from redis")?;

        Ok(stored.as_deref() == Some(state))
    }
}
