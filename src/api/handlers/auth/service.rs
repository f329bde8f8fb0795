//! Session orchestration over one login attempt: state issuance, the
//! authorization-code callback, token refresh, and logout preparation.

use std::sync::Arc;
use tracing::warn;
use url::Url;
use uuid::Uuid;

use super::AuthConfig;
use crate::oidc::{IdentityProvider, ProviderError, TokenSet};
use crate::store::{SessionStore, StateStore, TokenBundle};
use crate::users::{User, UserStore, ValidationError};

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The callback presented a state that was never issued or already
    /// expired. No session is created.
    #[error("login state not found or expired")]
    StateNotFound,
    /// The provider's token response carried no `id_token` extension.
    #[error("token response did not include an id_token")]
    MissingIdToken,
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("identity claims rejected: {0}")]
    InvalidClaims(#[from] ValidationError),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

pub struct AuthService {
    provider: Arc<dyn IdentityProvider>,
    sessions: Arc<dyn SessionStore>,
    states: Arc<dyn StateStore>,
    users: Arc<dyn UserStore>,
    config: AuthConfig,
}

impl AuthService {
    #[must_use]
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        sessions: Arc<dyn SessionStore>,
        states: Arc<dyn StateStore>,
        users: Arc<dyn UserStore>,
        config: AuthConfig,
    ) -> Self {
        Self {
            provider,
            sessions,
            states,
            users,
            config,
        }
    }

    /// Issue a fresh CSRF state and return the provider's authorization URL
    /// bound to it.
    ///
    /// # Errors
    ///
    /// Only fails when the state can not be written to the store.
    pub async fn prepare_login(&self) -> Result<Url, AuthError> {
        let state = Uuid::new_v4().to_string();
        self.states.issue(&state).await?;

        Ok(self.provider.authorize_url(&state))
    }

    /// Complete the authorization-code round trip and mint a session.
    ///
    /// The state must have been issued by [`AuthService::prepare_login`];
    /// the token response must carry an ID token, which is verified before
    /// anything is persisted. Returns the new opaque session identifier.
    ///
    /// # Errors
    ///
    /// Any failure leaves the session store untouched.
    pub async fn handle_callback(&self, code: &str, state: &str) -> Result<String, AuthError> {
        if !self.states.consume(state).await? {
            return Err(AuthError::StateNotFound);
        }

        let tokens = self.provider.exchange(code).await?;
        let raw_id_token = tokens.id_token.ok_or(AuthError::MissingIdToken)?;

        // Verify before persisting anything: a provider handing out an
        // unverifiable token must not result in a session.
        let identity = self.provider.verify(&raw_id_token)?;

        let user = User::from_identity(&identity)?;
        self.users.save(&user).await?;

        let session_id = Uuid::new_v4().to_string();
        let bundle = TokenBundle {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            id_token: raw_id_token,
            // Stamped by the store on the default-TTL path.
            absolute_expiry: 0,
        };
        self.sessions.save(&session_id, &bundle, None).await?;

        Ok(session_id)
    }

    /// Exchange a refresh token for a fresh token set.
    ///
    /// Providers may rotate the refresh token or not; when the response has
    /// none, the caller keeps using the old one. Session storage is not
    /// touched here; persisting the result is the caller's decision.
    ///
    /// # Errors
    ///
    /// Propagates the provider's rejection; the attempt is not retried.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenSet, AuthError> {
        let mut tokens = self.provider.refresh(refresh_token).await?;

        if tokens.refresh_token.is_none() {
            tokens.refresh_token = Some(refresh_token.to_string());
        }

        Ok(tokens)
    }

    /// Drop the local session and build the provider's end-session URL.
    ///
    /// A session missing from the store is logged, not an error: logout
    /// must always succeed from the browser's point of view. When the
    /// session was still around, its ID token is attached as
    /// `id_token_hint` so the provider can end its own session too.
    ///
    /// # Errors
    ///
    /// Only store I/O failures surface.
    pub async fn prepare_logout(&self, session_id: &str) -> Result<Url, AuthError> {
        let session = self.sessions.load(session_id).await?;
        if session.is_none() {
            warn!(session_id, "session not found in store, proceeding with provider logout");
        }

        self.sessions.delete(session_id).await?;

        let mut logout_url = self.provider.end_session_url();
        let post_logout = format!("{}/", self.config.public_url().trim_end_matches('/'));
        logout_url
            .query_pairs_mut()
            .append_pair("post_logout_redirect_uri", &post_logout);

        if let Some(session) = session {
            logout_url
                .query_pairs_mut()
                .append_pair("id_token_hint", &session.id_token);
        }

        Ok(logout_url)
    }
}
