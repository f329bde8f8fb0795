//! Session and login-state storage.
//!
//! Both stores are externally synchronized key/value stores with atomic
//! single-key operations; no locking happens at this layer. Missing keys
//! are `Ok(None)` / `Ok(false)`, never errors: "not found" always means
//! "re-authenticate" upstream.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

mod redis;

pub use self::redis::{RedisSessionStore, RedisStateStore};

/// One authenticated browser session's tokens.
///
/// `absolute_expiry` is stamped once when the session is created and is the
/// hard ceiling on the session's lifetime; a refresh replaces the three
/// token fields but never moves it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBundle {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub id_token: String,
    pub absolute_expiry: i64,
}

/// Seconds since the Unix epoch.
#[must_use]
pub fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| {
            i64::try_from(elapsed.as_secs()).unwrap_or(i64::MAX)
        })
}

/// Resolve what a save writes: without an explicit TTL the bundle gets its
/// absolute expiry stamped (`now + default_ttl`) and the default TTL; with
/// one, the bundle is written untouched under the given TTL.
pub(crate) fn stamped_for_save(
    bundle: &TokenBundle,
    ttl: Option<Duration>,
    default_ttl: Duration,
) -> (TokenBundle, Duration) {
    match ttl {
        Some(ttl) => (bundle.clone(), ttl),
        None => {
            let mut stamped = bundle.clone();
            stamped.absolute_expiry =
                now_unix() + i64::try_from(default_ttl.as_secs()).unwrap_or(i64::MAX);
            (stamped, default_ttl)
        }
    }
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Persist a bundle under `session_id`.
    ///
    /// Without an explicit `ttl` (session creation) the store stamps
    /// `absolute_expiry = now + default ttl` and writes with the default
    /// TTL. With an explicit `ttl` (refresh path) the bundle is written
    /// as-is and only the store TTL changes.
    async fn save(
        &self,
        session_id: &str,
        bundle: &TokenBundle,
        ttl: Option<Duration>,
    ) -> Result<()>;

    async fn load(&self, session_id: &str) -> Result<Option<TokenBundle>>;

    async fn delete(&self, session_id: &str) -> Result<()>;

    async fn exists(&self, session_id: &str) -> Result<bool>;
}

#[async_trait]
pub trait StateStore: Send + Sync {
    /// Record a login state for the login round trip.
    async fn issue(&self, state: &str) -> Result<()>;

    /// Check and remove a login state in one step. Returns whether the
    /// state was present. States are single use: a replayed value finds
    /// nothing.
    async fn consume(&self, state: &str) -> Result<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_bundle_round_trips_wire_format() {
        let bundle = TokenBundle {
            access_token: "a1".to_string(),
            refresh_token: Some("r1".to_string()),
            id_token: "idtok1".to_string(),
            absolute_expiry: 1_700_000_000,
        };

        let json = serde_json::to_string(&bundle).expect("serialize bundle");
        assert!(json.contains(r#""access_token":"a1""#));
        assert!(json.contains(r#""absolute_expiry":1700000000"#));

        let parsed: TokenBundle = serde_json::from_str(&json).expect("deserialize bundle");
        assert_eq!(parsed, bundle);
    }

    #[test]
    fn token_bundle_accepts_missing_refresh_token() {
        let json = r#"{"access_token":"a1","refresh_token":null,"id_token":"idtok1","absolute_expiry":10}"#;
        let parsed: TokenBundle = serde_json::from_str(json).expect("deserialize bundle");
        assert_eq!(parsed.refresh_token, None);
    }

    #[test]
    fn save_without_ttl_stamps_absolute_expiry() {
        let bundle = TokenBundle {
            access_token: "a1".to_string(),
            refresh_token: Some("r1".to_string()),
            id_token: "idtok1".to_string(),
            absolute_expiry: 0,
        };

        let default_ttl = Duration::from_secs(600);
        let (stamped, ttl) = stamped_for_save(&bundle, None, default_ttl);

        assert_eq!(ttl, default_ttl);
        let expected = now_unix() + 600;
        assert!((stamped.absolute_expiry - expected).abs() <= 1);
        // Token fields pass through untouched.
        assert_eq!(stamped.access_token, bundle.access_token);
        assert_eq!(stamped.id_token, bundle.id_token);
    }

    #[test]
    fn save_with_ttl_preserves_absolute_expiry() {
        let bundle = TokenBundle {
            access_token: "a2".to_string(),
            refresh_token: Some("r2".to_string()),
            id_token: "idtok2".to_string(),
            absolute_expiry: 1_700_000_123,
        };

        let (written, ttl) = stamped_for_save(&bundle, Some(Duration::from_secs(10)), Duration::from_secs(600));

        assert_eq!(ttl, Duration::from_secs(10));
        assert_eq!(written, bundle);
    }

    #[test]
    fn now_unix_is_recent() {
        // Sanity: after 2023-01-01 and not absurdly far in the future.
        let now = now_unix();
        assert!(now > 1_672_531_200);
        assert!(now < 4_102_444_800);
    }
}
