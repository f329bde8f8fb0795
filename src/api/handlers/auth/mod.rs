//! Login, callback, and logout endpoints plus the request-time guard.

use axum::{
    Json,
    extract::{Extension, Query},
    http::{
        HeaderMap, StatusCode,
        header::{LOCATION, SET_COOKIE},
    },
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};
use utoipa::{IntoParams, ToSchema};

pub mod guard;
pub mod service;

mod cookies;
#[cfg(test)]
mod tests;

pub use service::{AuthError, AuthService};

use crate::oidc::{Identity, IdentityProvider};
use crate::store::SessionStore;
use crate::users::UserStore;

/// Broker-level settings shared by the handlers and the guard.
#[derive(Clone, Debug)]
pub struct AuthConfig {
    public_url: String,
    session_ttl: Duration,
}

impl AuthConfig {
    #[must_use]
    pub fn new(public_url: String, session_ttl: Duration) -> Self {
        Self {
            public_url,
            session_ttl,
        }
    }

    #[must_use]
    pub fn public_url(&self) -> &str {
        &self.public_url
    }

    #[must_use]
    pub fn session_ttl(&self) -> Duration {
        self.session_ttl
    }

    /// Only mark cookies secure when the app is served over HTTPS.
    pub(crate) fn cookie_secure(&self) -> bool {
        self.public_url.starts_with("https://")
    }
}

/// Everything the auth endpoints and the guard share, injected once as a
/// request extension.
pub struct AuthState {
    pub(crate) service: AuthService,
    pub(crate) sessions: Arc<dyn SessionStore>,
    pub(crate) provider: Arc<dyn IdentityProvider>,
    pub(crate) users: Arc<dyn UserStore>,
    pub(crate) config: AuthConfig,
}

impl AuthState {
    #[must_use]
    pub fn new(
        service: AuthService,
        sessions: Arc<dyn SessionStore>,
        provider: Arc<dyn IdentityProvider>,
        users: Arc<dyn UserStore>,
        config: AuthConfig,
    ) -> Self {
        Self {
            service,
            sessions,
            provider,
            users,
            config,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LoginResponse {
    pub login_url: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LogoutResponse {
    pub logout_url: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MeResponse {
    pub subject: String,
    pub email: Option<String>,
    pub given_name: String,
    pub family_name: String,
    pub roles: Vec<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

#[utoipa::path(
    get,
    path = "/auth/login",
    responses(
        (status = 200, description = "Authorization URL for the provider's login page", body = LoginResponse),
        (status = 500, description = "Login state could not be issued")
    ),
    tag = "auth"
)]
pub async fn login(auth_state: Extension<Arc<AuthState>>) -> impl IntoResponse {
    match auth_state.service.prepare_login().await {
        Ok(login_url) => (
            StatusCode::OK,
            Json(LoginResponse {
                login_url: login_url.to_string(),
            }),
        )
            .into_response(),
        Err(err) => {
            error!("failed to prepare login: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    get,
    path = "/auth/callback",
    params(CallbackQuery),
    responses(
        (status = 302, description = "Session established; redirect to the stashed destination"),
        (status = 401, description = "State mismatch, provider error, or failed code exchange")
    ),
    tag = "auth"
)]
pub async fn callback(
    auth_state: Extension<Arc<AuthState>>,
    headers: HeaderMap,
    Query(params): Query<CallbackQuery>,
) -> Response {
    if let Some(error) = params.error {
        let description = params.error_description.as_deref().unwrap_or("unknown");
        warn!(%error, description, "provider returned an error on callback");
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let (Some(code), Some(state)) = (params.code, params.state) else {
        warn!("callback missing code or state");
        return StatusCode::UNAUTHORIZED.into_response();
    };

    let session_id = match auth_state.service.handle_callback(&code, &state).await {
        Ok(session_id) => session_id,
        Err(err) => {
            warn!("authentication callback failed: {err}");
            return StatusCode::UNAUTHORIZED.into_response();
        }
    };

    let mut response_headers = HeaderMap::new();
    let cookie = cookies::session_cookie(
        &session_id,
        auth_state.config.session_ttl(),
        auth_state.config.cookie_secure(),
    );
    match cookie {
        Ok(cookie) => {
            response_headers.append(SET_COOKIE, cookie);
        }
        Err(err) => {
            error!("failed to build session cookie: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    }
    if let Ok(cookie) = cookies::clear_redirect_cookie() {
        response_headers.append(SET_COOKIE, cookie);
    }

    let destination = cookies::cookie_value(&headers, cookies::REDIRECT_COOKIE_NAME)
        .filter(|path| is_safe_redirect(path))
        .unwrap_or_else(|| "/".to_string());
    match destination.parse() {
        Ok(location) => {
            response_headers.insert(LOCATION, location);
        }
        Err(err) => {
            error!("failed to build redirect location: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    }

    (StatusCode::FOUND, response_headers).into_response()
}

#[utoipa::path(
    get,
    path = "/auth/logout",
    responses(
        (status = 200, description = "Provider end-session URL; local session deleted and cookie cleared", body = LogoutResponse),
        (status = 500, description = "Session store unavailable")
    ),
    tag = "auth"
)]
pub async fn logout(auth_state: Extension<Arc<AuthState>>, headers: HeaderMap) -> Response {
    // Without a cookie there is nothing to tear down.
    let Some(session_id) = cookies::cookie_value(&headers, cookies::SESSION_COOKIE_NAME) else {
        return StatusCode::OK.into_response();
    };

    let logout_url = match auth_state.service.prepare_logout(&session_id).await {
        Ok(logout_url) => logout_url,
        Err(err) => {
            error!("failed to prepare logout: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let mut response_headers = HeaderMap::new();
    if let Ok(cookie) = cookies::clear_session_cookie(auth_state.config.cookie_secure()) {
        response_headers.append(SET_COOKIE, cookie);
    }

    (
        StatusCode::OK,
        response_headers,
        Json(LogoutResponse {
            logout_url: logout_url.to_string(),
        }),
    )
        .into_response()
}

#[utoipa::path(
    get,
    path = "/me",
    responses(
        (status = 200, description = "Verified identity claims for the current session", body = MeResponse),
        (status = 302, description = "No valid session; redirected to login")
    ),
    tag = "auth"
)]
pub async fn me(Extension(identity): Extension<Identity>) -> impl IntoResponse {
    Json(MeResponse {
        subject: identity.subject,
        email: identity.email,
        given_name: identity.given_name,
        family_name: identity.family_name,
        roles: identity.roles,
    })
}

/// Stashed redirect targets must be local paths; anything else could send
/// a fresh session to a foreign origin.
fn is_safe_redirect(path: &str) -> bool {
    path.starts_with('/') && !path.starts_with("//")
}

#[cfg(test)]
mod redirect_tests {
    use super::is_safe_redirect;

    #[test]
    fn safe_redirects_are_local_paths() {
        assert!(is_safe_redirect("/"));
        assert!(is_safe_redirect("/folders/42"));
        assert!(!is_safe_redirect("//evil.example.com/path"));
        assert!(!is_safe_redirect("https://evil.example.com"));
        assert!(!is_safe_redirect(""));
    }
}
