//! Auth module tests: in-memory fakes for the provider and both stores,
//! the orchestrator state machine, and the request-time guard.

use super::{AuthConfig, AuthService, AuthState, guard};
use crate::oidc::{Identity, IdentityProvider, ProviderError, TokenSet};
use crate::store::{SessionStore, StateStore, TokenBundle, now_unix, stamped_for_save};
use crate::users::{User, UserStore};
use anyhow::Result;
use async_trait::async_trait;
use axum::{
    Extension, Router,
    body::Body,
    http::{
        Request, StatusCode,
        header::{COOKIE, LOCATION, SET_COOKIE},
    },
    middleware,
    routing::get,
};
use std::collections::HashMap;
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};
use std::time::Duration;
use tower::ServiceExt;
use url::Url;

const MAX_LIFESPAN: Duration = Duration::from_secs(600);

#[derive(Clone)]
enum VerifyOutcome {
    Valid(Identity),
    Expired,
}

#[derive(Default)]
struct FakeProvider {
    exchanges: Mutex<HashMap<String, TokenSet>>,
    refreshes: Mutex<HashMap<String, TokenSet>>,
    verifications: Mutex<HashMap<String, VerifyOutcome>>,
    refresh_calls: AtomicUsize,
}

impl FakeProvider {
    fn on_exchange(&self, code: &str, tokens: TokenSet) {
        self.exchanges
            .lock()
            .expect("lock")
            .insert(code.to_string(), tokens);
    }

    fn on_refresh(&self, refresh_token: &str, tokens: TokenSet) {
        self.refreshes
            .lock()
            .expect("lock")
            .insert(refresh_token.to_string(), tokens);
    }

    fn on_verify(&self, id_token: &str, outcome: VerifyOutcome) {
        self.verifications
            .lock()
            .expect("lock")
            .insert(id_token.to_string(), outcome);
    }

    fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityProvider for FakeProvider {
    fn authorize_url(&self, state: &str) -> Url {
        let mut url =
            Url::parse("https://sso.example.com/realms/main/protocol/openid-connect/auth")
                .expect("static url");
        url.query_pairs_mut().append_pair("state", state);
        url
    }

    async fn exchange(&self, code: &str) -> std::result::Result<TokenSet, ProviderError> {
        self.exchanges
            .lock()
            .expect("lock")
            .get(code)
            .cloned()
            .ok_or_else(|| ProviderError::Exchange("invalid code".to_string()))
    }

    async fn refresh(&self, refresh_token: &str) -> std::result::Result<TokenSet, ProviderError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        self.refreshes
            .lock()
            .expect("lock")
            .get(refresh_token)
            .cloned()
            .ok_or_else(|| ProviderError::Exchange("refresh rejected".to_string()))
    }

    fn verify(&self, id_token: &str) -> std::result::Result<Identity, ProviderError> {
        match self.verifications.lock().expect("lock").get(id_token) {
            Some(VerifyOutcome::Valid(identity)) => Ok(identity.clone()),
            Some(VerifyOutcome::Expired) => Err(ProviderError::TokenExpired),
            None => Err(ProviderError::Verification("unknown token".to_string())),
        }
    }

    fn end_session_url(&self) -> Url {
        Url::parse("https://sso.example.com/realms/main/protocol/openid-connect/logout")
            .expect("static url")
    }
}

struct MemorySessionStore {
    default_ttl: Duration,
    entries: Mutex<HashMap<String, (TokenBundle, Duration)>>,
    save_calls: AtomicUsize,
}

impl MemorySessionStore {
    fn new(default_ttl: Duration) -> Self {
        Self {
            default_ttl,
            entries: Mutex::new(HashMap::new()),
            save_calls: AtomicUsize::new(0),
        }
    }

    fn bundle(&self, session_id: &str) -> Option<TokenBundle> {
        self.entries
            .lock()
            .expect("lock")
            .get(session_id)
            .map(|(bundle, _)| bundle.clone())
    }

    fn last_ttl(&self, session_id: &str) -> Option<Duration> {
        self.entries
            .lock()
            .expect("lock")
            .get(session_id)
            .map(|(_, ttl)| *ttl)
    }

    fn save_calls(&self) -> usize {
        self.save_calls.load(Ordering::SeqCst)
    }

    fn len(&self) -> usize {
        self.entries.lock().expect("lock").len()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn save(
        &self,
        session_id: &str,
        bundle: &TokenBundle,
        ttl: Option<Duration>,
    ) -> Result<()> {
        self.save_calls.fetch_add(1, Ordering::SeqCst);
        let (bundle, ttl) = stamped_for_save(bundle, ttl, self.default_ttl);
        self.entries
            .lock()
            .expect("lock")
            .insert(session_id.to_string(), (bundle, ttl));
        Ok(())
    }

    async fn load(&self, session_id: &str) -> Result<Option<TokenBundle>> {
        Ok(self.bundle(session_id))
    }

    async fn delete(&self, session_id: &str) -> Result<()> {
        self.entries.lock().expect("lock").remove(session_id);
        Ok(())
    }

    async fn exists(&self, session_id: &str) -> Result<bool> {
        Ok(self.entries.lock().expect("lock").contains_key(session_id))
    }
}

#[derive(Default)]
struct MemoryStateStore {
    states: Mutex<HashMap<String, String>>,
}

impl MemoryStateStore {
    /// Simulate the store TTL lapsing for an unconsumed state.
    fn expire(&self, state: &str) {
        self.states.lock().expect("lock").remove(state);
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn issue(&self, state: &str) -> Result<()> {
        self.states
            .lock()
            .expect("lock")
            .insert(state.to_string(), state.to_string());
        Ok(())
    }

    async fn consume(&self, state: &str) -> Result<bool> {
        Ok(self
            .states
            .lock()
            .expect("lock")
            .remove(state)
            .as_deref()
            == Some(state))
    }
}

#[derive(Default)]
struct MemoryUserStore {
    users: Mutex<HashMap<String, User>>,
}

impl MemoryUserStore {
    fn user(&self, user_id: &str) -> Option<User> {
        self.users.lock().expect("lock").get(user_id).cloned()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_id(&self, user_id: &str) -> Result<Option<User>> {
        Ok(self.user(user_id))
    }

    async fn save(&self, user: &User) -> Result<()> {
        self.users
            .lock()
            .expect("lock")
            .insert(user.id.clone(), user.clone());
        Ok(())
    }
}

struct Fixture {
    provider: Arc<FakeProvider>,
    sessions: Arc<MemorySessionStore>,
    states: Arc<MemoryStateStore>,
    users: Arc<MemoryUserStore>,
    state: Arc<AuthState>,
}

fn fixture() -> Fixture {
    let provider = Arc::new(FakeProvider::default());
    let sessions = Arc::new(MemorySessionStore::new(MAX_LIFESPAN));
    let states = Arc::new(MemoryStateStore::default());
    let users = Arc::new(MemoryUserStore::default());
    let config = AuthConfig::new("https://tracker.example.com".to_string(), MAX_LIFESPAN);

    let service = AuthService::new(
        provider.clone(),
        sessions.clone(),
        states.clone(),
        users.clone(),
        config.clone(),
    );
    let state = Arc::new(AuthState::new(
        service,
        sessions.clone(),
        provider.clone(),
        users.clone(),
        config,
    ));

    Fixture {
        provider,
        sessions,
        states,
        users,
        state,
    }
}

fn ada(given_name: &str) -> Identity {
    Identity {
        subject: "sub-1".to_string(),
        email: Some("ada@example.com".to_string()),
        given_name: given_name.to_string(),
        family_name: "Lovelace".to_string(),
        roles: vec!["user".to_string()],
    }
}

fn tokens(access: &str, refresh: Option<&str>, id_token: Option<&str>) -> TokenSet {
    TokenSet {
        access_token: access.to_string(),
        refresh_token: refresh.map(ToString::to_string),
        id_token: id_token.map(ToString::to_string),
    }
}

fn seed_bundle(id_token: &str, absolute_expiry: i64) -> TokenBundle {
    TokenBundle {
        access_token: "a1".to_string(),
        refresh_token: Some("r1".to_string()),
        id_token: id_token.to_string(),
        absolute_expiry,
    }
}

fn protected_app(state: Arc<AuthState>) -> Router {
    Router::new()
        .route("/me", get(super::me))
        .route_layer(middleware::from_fn(guard::authenticate))
        .layer(Extension(state))
}

async fn send(app: Router, uri: &str, cookie: Option<&str>) -> axum::response::Response {
    let mut builder = Request::builder().uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(COOKIE, cookie);
    }
    app.oneshot(builder.body(Body::empty()).expect("request"))
        .await
        .expect("response")
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("json body")
}

fn set_cookies(response: &axum::response::Response) -> Vec<String> {
    response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .map(|value| value.to_str().expect("ascii cookie").to_string())
        .collect()
}

// --- orchestrator ---

#[tokio::test]
async fn callback_establishes_session() {
    let f = fixture();
    f.states.issue("s1").await.expect("issue state");
    f.provider
        .on_exchange("code1", tokens("a1", Some("r1"), Some("idtok1")));
    f.provider.on_verify("idtok1", VerifyOutcome::Valid(ada("Ada")));

    let session_id = f
        .state
        .service
        .handle_callback("code1", "s1")
        .await
        .expect("session established");

    let bundle = f.sessions.bundle(&session_id).expect("stored bundle");
    assert_eq!(bundle.id_token, "idtok1");
    assert_eq!(bundle.access_token, "a1");
    assert_eq!(bundle.refresh_token.as_deref(), Some("r1"));
    let expected_expiry = now_unix() + 600;
    assert!((bundle.absolute_expiry - expected_expiry).abs() <= 1);

    // User projection is written synchronously on callback.
    let user = f.users.user("sub-1").expect("projected user");
    assert_eq!(user.email, "ada@example.com");
    assert_eq!(user.first_name, "Ada");
}

#[tokio::test]
async fn callback_with_unknown_state_creates_nothing() {
    let f = fixture();
    f.provider
        .on_exchange("code1", tokens("a1", Some("r1"), Some("idtok1")));

    let result = f.state.service.handle_callback("code1", "never-issued").await;

    assert!(matches!(result, Err(super::AuthError::StateNotFound)));
    assert_eq!(f.sessions.save_calls(), 0);
    assert!(f.users.user("sub-1").is_none());
}

#[tokio::test]
async fn callback_with_expired_state_fails() {
    let f = fixture();
    f.states.issue("s1").await.expect("issue state");
    f.states.expire("s1");

    let result = f.state.service.handle_callback("code1", "s1").await;

    assert!(matches!(result, Err(super::AuthError::StateNotFound)));
    assert_eq!(f.sessions.save_calls(), 0);
}

#[tokio::test]
async fn state_is_single_use() {
    let f = fixture();
    f.states.issue("s1").await.expect("issue state");
    f.provider
        .on_exchange("code1", tokens("a1", Some("r1"), Some("idtok1")));
    f.provider.on_verify("idtok1", VerifyOutcome::Valid(ada("Ada")));

    f.state
        .service
        .handle_callback("code1", "s1")
        .await
        .expect("first callback");

    // Replaying the consumed state must fail.
    let result = f.state.service.handle_callback("code1", "s1").await;
    assert!(matches!(result, Err(super::AuthError::StateNotFound)));
}

#[tokio::test]
async fn callback_without_id_token_fails() {
    let f = fixture();
    f.states.issue("s1").await.expect("issue state");
    f.provider
        .on_exchange("code1", tokens("a1", Some("r1"), None));

    let result = f.state.service.handle_callback("code1", "s1").await;

    assert!(matches!(result, Err(super::AuthError::MissingIdToken)));
    assert_eq!(f.sessions.save_calls(), 0);
}

#[tokio::test]
async fn callback_with_unverifiable_token_fails() {
    let f = fixture();
    f.states.issue("s1").await.expect("issue state");
    // No verification outcome registered: the token is unknown/unverifiable.
    f.provider
        .on_exchange("code1", tokens("a1", Some("r1"), Some("idtok1")));

    let result = f.state.service.handle_callback("code1", "s1").await;

    assert!(matches!(
        result,
        Err(super::AuthError::Provider(ProviderError::Verification(_)))
    ));
    assert_eq!(f.sessions.save_calls(), 0);
    assert!(f.users.user("sub-1").is_none());
}

#[tokio::test]
async fn refresh_retains_refresh_token_when_not_rotated() {
    let f = fixture();
    f.provider
        .on_refresh("r1", tokens("a2", None, Some("idtok2")));

    let refreshed = f.state.service.refresh("r1").await.expect("refresh");

    assert_eq!(refreshed.access_token, "a2");
    assert_eq!(refreshed.refresh_token.as_deref(), Some("r1"));
}

#[tokio::test]
async fn prepare_login_issues_consumable_state() {
    let f = fixture();

    let url = f.state.service.prepare_login().await.expect("login url");
    let state = url
        .query_pairs()
        .find(|(key, _)| key == "state")
        .map(|(_, value)| value.to_string())
        .expect("state parameter");

    assert!(f.states.consume(&state).await.expect("consume state"));
}

#[tokio::test]
async fn prepare_logout_survives_missing_session() {
    let f = fixture();

    let url = f
        .state
        .service
        .prepare_logout("ghost")
        .await
        .expect("logout url");

    assert!(url.as_str().starts_with(
        "https://sso.example.com/realms/main/protocol/openid-connect/logout"
    ));
    let pairs: HashMap<String, String> = url
        .query_pairs()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect();
    assert_eq!(
        pairs.get("post_logout_redirect_uri").map(String::as_str),
        Some("https://tracker.example.com/")
    );
    assert!(!pairs.contains_key("id_token_hint"));
}

#[tokio::test]
async fn prepare_logout_deletes_session_and_adds_hint() {
    let f = fixture();
    let bundle = seed_bundle("idtok1", now_unix() + 600);
    f.sessions
        .save("sess1", &bundle, Some(Duration::from_secs(600)))
        .await
        .expect("seed session");

    let url = f
        .state
        .service
        .prepare_logout("sess1")
        .await
        .expect("logout url");

    assert!(f.sessions.bundle("sess1").is_none());
    let pairs: HashMap<String, String> = url
        .query_pairs()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect();
    assert_eq!(pairs.get("id_token_hint").map(String::as_str), Some("idtok1"));
}

// --- guard ---

#[tokio::test]
async fn guard_passes_valid_session_through() {
    let f = fixture();
    let bundle = seed_bundle("idtok1", now_unix() + 600);
    f.sessions
        .save("sess1", &bundle, Some(Duration::from_secs(600)))
        .await
        .expect("seed session");
    f.provider.on_verify("idtok1", VerifyOutcome::Valid(ada("Ada")));

    let response = send(
        protected_app(f.state.clone()),
        "/me",
        Some("session_id=sess1"),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["subject"], "sub-1");
    assert_eq!(body["given_name"], "Ada");
    assert_eq!(f.provider.refresh_calls(), 0);
    // Only the seed write; a plain read never writes.
    assert_eq!(f.sessions.save_calls(), 1);
}

#[tokio::test]
async fn guard_without_cookie_redirects_to_login() {
    let f = fixture();

    let response = send(protected_app(f.state.clone()), "/me", None).await;

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        response.headers().get(LOCATION).and_then(|l| l.to_str().ok()),
        Some("/auth/login")
    );
    let cookies = set_cookies(&response);
    assert!(
        cookies
            .iter()
            .any(|cookie| cookie.starts_with("redirect_after_login=/me;"))
    );
    assert!(cookies.iter().any(|cookie| cookie.starts_with("session_id=;")));
}

#[tokio::test]
async fn guard_with_unknown_session_redirects_to_login() {
    let f = fixture();

    let response = send(
        protected_app(f.state.clone()),
        "/me",
        Some("session_id=ghost"),
    )
    .await;

    assert_eq!(response.status(), StatusCode::FOUND);
}

#[tokio::test]
async fn guard_rejects_invalid_token_without_deleting_session() {
    let f = fixture();
    let bundle = seed_bundle("forged", now_unix() + 600);
    f.sessions
        .save("sess1", &bundle, Some(Duration::from_secs(600)))
        .await
        .expect("seed session");
    // No verification outcome for "forged": generic verification failure.

    let response = send(
        protected_app(f.state.clone()),
        "/me",
        Some("session_id=sess1"),
    )
    .await;

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(f.provider.refresh_calls(), 0);
    // An invalid token forces re-authentication but does not delete the
    // session outright.
    assert!(f.sessions.bundle("sess1").is_some());
}

#[tokio::test]
async fn guard_refreshes_expired_session_in_place() {
    let f = fixture();
    let absolute_expiry = now_unix() + 10;
    f.sessions
        .save(
            "sess1",
            &seed_bundle("idtok1", absolute_expiry),
            Some(Duration::from_secs(10)),
        )
        .await
        .expect("seed session");
    f.provider.on_verify("idtok1", VerifyOutcome::Expired);
    f.provider
        .on_refresh("r1", tokens("a2", Some("r2"), Some("idtok2")));
    f.provider
        .on_verify("idtok2", VerifyOutcome::Valid(ada("Augusta")));

    let response = send(
        protected_app(f.state.clone()),
        "/me",
        Some("session_id=sess1"),
    )
    .await;

    // The handler sees claims from the fresh token, not the stale one.
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["given_name"], "Augusta");

    assert_eq!(f.provider.refresh_calls(), 1);
    // Exactly one write beyond the seed.
    assert_eq!(f.sessions.save_calls(), 2);
    assert_eq!(f.sessions.len(), 1);

    let stored = f.sessions.bundle("sess1").expect("session kept its id");
    assert_eq!(stored.access_token, "a2");
    assert_eq!(stored.refresh_token.as_deref(), Some("r2"));
    assert_eq!(stored.id_token, "idtok2");
    // Refresh replaces tokens but never moves the absolute expiry.
    assert_eq!(stored.absolute_expiry, absolute_expiry);

    let ttl = f.sessions.last_ttl("sess1").expect("ttl recorded");
    assert!(ttl <= Duration::from_secs(10));
    assert!(ttl >= Duration::from_secs(8));
}

#[tokio::test]
async fn guard_deletes_session_past_absolute_expiry() {
    let f = fixture();
    // Store entry outlived the absolute expiry; refresh itself would work.
    f.sessions
        .save(
            "sess1",
            &seed_bundle("idtok1", now_unix() - 5),
            Some(Duration::from_secs(60)),
        )
        .await
        .expect("seed session");
    f.provider.on_verify("idtok1", VerifyOutcome::Expired);
    f.provider
        .on_refresh("r1", tokens("a2", Some("r2"), Some("idtok2")));
    f.provider
        .on_verify("idtok2", VerifyOutcome::Valid(ada("Augusta")));

    let response = send(
        protected_app(f.state.clone()),
        "/me",
        Some("session_id=sess1"),
    )
    .await;

    assert_eq!(response.status(), StatusCode::FOUND);
    // The refreshed bundle must not be retained.
    assert!(f.sessions.bundle("sess1").is_none());
    assert_eq!(f.sessions.save_calls(), 1);
}

#[tokio::test]
async fn guard_redirects_when_refresh_is_rejected() {
    let f = fixture();
    f.sessions
        .save(
            "sess1",
            &seed_bundle("idtok1", now_unix() + 600),
            Some(Duration::from_secs(600)),
        )
        .await
        .expect("seed session");
    f.provider.on_verify("idtok1", VerifyOutcome::Expired);
    // No refresh outcome registered: the provider rejects the attempt.

    let response = send(
        protected_app(f.state.clone()),
        "/me",
        Some("session_id=sess1"),
    )
    .await;

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(f.provider.refresh_calls(), 1);
    // Refresh failure alone does not delete the session.
    assert!(f.sessions.bundle("sess1").is_some());
    assert_eq!(f.sessions.save_calls(), 1);
}

// --- role guard ---

async fn admin_ok() -> &'static str {
    "ok"
}

fn admin_app() -> Router {
    Router::new()
        .route("/admin", get(admin_ok))
        .route_layer(middleware::from_fn(guard::require_admin))
}

#[tokio::test]
async fn require_admin_accepts_admin_role() {
    let mut identity = ada("Ada");
    identity.roles = vec!["Admin".to_string()];

    let request = Request::builder()
        .uri("/admin")
        .extension(identity)
        .body(Body::empty())
        .expect("request");
    let response = admin_app().oneshot(request).await.expect("response");

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn require_admin_rejects_other_roles() {
    let request = Request::builder()
        .uri("/admin")
        .extension(ada("Ada"))
        .body(Body::empty())
        .expect("request");
    let response = admin_app().oneshot(request).await.expect("response");

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn require_admin_rejects_missing_identity() {
    let request = Request::builder()
        .uri("/admin")
        .body(Body::empty())
        .expect("request");
    let response = admin_app().oneshot(request).await.expect("response");

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

// --- endpoints ---

fn auth_app(state: Arc<AuthState>) -> Router {
    Router::new()
        .route("/auth/login", get(super::login))
        .route("/auth/callback", get(super::callback))
        .route("/auth/logout", get(super::logout))
        .layer(Extension(state))
}

#[tokio::test]
async fn login_endpoint_returns_authorization_url() {
    let f = fixture();

    let response = send(auth_app(f.state.clone()), "/auth/login", None).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let login_url = body["login_url"].as_str().expect("login_url");
    assert!(login_url.contains("state="));
}

#[tokio::test]
async fn callback_endpoint_sets_cookie_and_restores_navigation() {
    let f = fixture();
    f.states.issue("s1").await.expect("issue state");
    f.provider
        .on_exchange("code1", tokens("a1", Some("r1"), Some("idtok1")));
    f.provider.on_verify("idtok1", VerifyOutcome::Valid(ada("Ada")));

    let response = send(
        auth_app(f.state.clone()),
        "/auth/callback?code=code1&state=s1",
        Some("redirect_after_login=/folders/7"),
    )
    .await;

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        response.headers().get(LOCATION).and_then(|l| l.to_str().ok()),
        Some("/folders/7")
    );

    let cookies = set_cookies(&response);
    let session_cookie = cookies
        .iter()
        .find(|cookie| cookie.starts_with("session_id="))
        .expect("session cookie");
    assert!(session_cookie.contains("HttpOnly"));
    assert!(session_cookie.contains("SameSite=Lax"));
    assert!(session_cookie.contains("Max-Age=600"));
    // Public URL is https, so the cookie is marked secure.
    assert!(session_cookie.contains("Secure"));
    assert!(
        cookies
            .iter()
            .any(|cookie| cookie.starts_with("redirect_after_login=;"))
    );
}

#[tokio::test]
async fn callback_endpoint_ignores_foreign_redirect_targets() {
    let f = fixture();
    f.states.issue("s1").await.expect("issue state");
    f.provider
        .on_exchange("code1", tokens("a1", Some("r1"), Some("idtok1")));
    f.provider.on_verify("idtok1", VerifyOutcome::Valid(ada("Ada")));

    let response = send(
        auth_app(f.state.clone()),
        "/auth/callback?code=code1&state=s1",
        Some("redirect_after_login=//evil.example.com/phish"),
    )
    .await;

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        response.headers().get(LOCATION).and_then(|l| l.to_str().ok()),
        Some("/")
    );
}

#[tokio::test]
async fn callback_endpoint_maps_failures_to_unauthorized() {
    let f = fixture();

    // Provider-reported error.
    let response = send(
        auth_app(f.state.clone()),
        "/auth/callback?error=access_denied&error_description=denied",
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Missing parameters.
    let response = send(auth_app(f.state.clone()), "/auth/callback", None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Unknown state.
    let response = send(
        auth_app(f.state.clone()),
        "/auth/callback?code=code1&state=bogus",
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn logout_endpoint_clears_cookie_and_session() {
    let f = fixture();
    f.sessions
        .save(
            "sess1",
            &seed_bundle("idtok1", now_unix() + 600),
            Some(Duration::from_secs(600)),
        )
        .await
        .expect("seed session");

    let response = send(
        auth_app(f.state.clone()),
        "/auth/logout",
        Some("session_id=sess1"),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let cookies = set_cookies(&response);
    assert!(cookies.iter().any(|cookie| cookie.starts_with("session_id=;")));
    assert!(f.sessions.bundle("sess1").is_none());

    let body = body_json(response).await;
    let logout_url = body["logout_url"].as_str().expect("logout_url");
    assert!(logout_url.contains("id_token_hint=idtok1"));
    assert!(logout_url.contains("post_logout_redirect_uri="));
}

#[tokio::test]
async fn logout_endpoint_without_cookie_is_a_noop() {
    let f = fixture();

    let response = send(auth_app(f.state.clone()), "/auth/logout", None).await;

    assert_eq!(response.status(), StatusCode::OK);
}
