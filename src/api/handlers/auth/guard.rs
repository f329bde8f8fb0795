//! Request-time guard: every protected request passes through here before
//! its handler runs.
//!
//! The per-request state machine:
//!
//! 1. no/empty session cookie -> redirect to login
//! 2. cookie but no stored session -> redirect to login
//! 3. stored session -> verify the cached ID token
//!    - valid -> inject [`Identity`] and continue
//!    - expired -> refresh sub-flow (below)
//!    - anything else (malformed, bad signature, wrong issuer) -> redirect
//!
//! Refresh sub-flow: one refresh attempt against the provider; on success
//! the bundle is rewritten with a TTL equal to the remaining absolute
//! lifetime, unless that lifetime is already spent, in which case the
//! session is deleted regardless of the refresh outcome. The refreshed
//! ID token is verified again before the request proceeds.
//!
//! Concurrent requests on one session may race through the refresh
//! sub-flow; this is deliberately not serialized. With a provider that
//! rotates refresh tokens the loser's next request lands back at login.

use axum::{
    extract::{Extension, Request},
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{LOCATION, SET_COOKIE},
    },
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

use super::{AuthState, cookies};
use crate::oidc::{Identity, ProviderError};
use crate::store::{TokenBundle, now_unix};
use crate::users;

const LOGIN_PATH: &str = "/auth/login";
const ADMIN_ROLE: &str = "admin";

pub async fn authenticate(
    Extension(state): Extension<Arc<AuthState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let secure = state.config.cookie_secure();
    let requested_path = request.uri().path().to_string();

    let Some(session_id) = cookies::cookie_value(request.headers(), cookies::SESSION_COOKIE_NAME)
    else {
        return redirect_to_login(&requested_path, secure);
    };

    let bundle = match state.sessions.load(&session_id).await {
        Ok(Some(bundle)) => bundle,
        Ok(None) => return redirect_to_login(&requested_path, secure),
        Err(err) => {
            error!("failed to load session: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let identity = match state.provider.verify(&bundle.id_token) {
        Ok(identity) => identity,
        Err(ProviderError::TokenExpired) => {
            match refresh_session(&state, &session_id, bundle).await {
                Ok(identity) => {
                    // Keep the user projection in line with the refreshed
                    // claims, detached from this request.
                    let users = state.users.clone();
                    let refreshed = identity.clone();
                    tokio::spawn(async move {
                        users::sync_identity(users, refreshed).await;
                    });
                    identity
                }
                Err(err) => {
                    debug!(session_id, "session refresh failed: {err:#}");
                    return redirect_to_login(&requested_path, secure);
                }
            }
        }
        Err(err) => {
            warn!(session_id, "session id token rejected: {err}");
            return redirect_to_login(&requested_path, secure);
        }
    };

    request.extensions_mut().insert(identity);
    next.run(request).await
}

/// Binary role check for admin-only routes; expects [`authenticate`] to
/// have injected the identity already.
pub async fn require_admin(request: Request, next: Next) -> Response {
    match request.extensions().get::<Identity>() {
        Some(identity) if identity.has_role(ADMIN_ROLE) => next.run(request).await,
        _ => StatusCode::FORBIDDEN.into_response(),
    }
}

async fn refresh_session(
    state: &AuthState,
    session_id: &str,
    mut bundle: TokenBundle,
) -> anyhow::Result<Identity> {
    let Some(refresh_token) = bundle.refresh_token.clone() else {
        anyhow::bail!("session has no refresh token");
    };

    let tokens = state.service.refresh(&refresh_token).await?;
    let Some(raw_id_token) = tokens.id_token else {
        anyhow::bail!("id_token missing from refreshed token response");
    };

    bundle.access_token = tokens.access_token;
    bundle.refresh_token = tokens.refresh_token;
    bundle.id_token = raw_id_token;

    // Hard ceiling: the absolute expiry wins even over a successful
    // refresh, and the refreshed bundle must not be stored.
    let remaining = bundle.absolute_expiry - now_unix();
    if remaining <= 0 {
        if let Err(err) = state.sessions.delete(session_id).await {
            error!(session_id, "failed to delete expired session: {err}");
        }
        anyhow::bail!("session reached its absolute expiry");
    }
    let ttl = Duration::from_secs(u64::try_from(remaining).unwrap_or(u64::MAX));

    state.sessions.save(session_id, &bundle, Some(ttl)).await?;

    let identity = state.provider.verify(&bundle.id_token)?;

    Ok(identity)
}

/// Shared failure exit: clear the session cookie, stash the requested path
/// for post-login navigation, and bounce to the login endpoint.
fn redirect_to_login(requested_path: &str, secure: bool) -> Response {
    let mut headers = HeaderMap::new();

    if let Ok(cookie) = cookies::stash_redirect_cookie(requested_path) {
        headers.append(SET_COOKIE, cookie);
    }
    if let Ok(cookie) = cookies::clear_session_cookie(secure) {
        headers.append(SET_COOKIE, cookie);
    }
    headers.insert(LOCATION, HeaderValue::from_static(LOGIN_PATH));

    (StatusCode::FOUND, headers).into_response()
}
