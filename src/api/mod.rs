use anyhow::{Context, Result, anyhow};
use axum::{
    Extension, Router,
    body::Body,
    extract::MatchedPath,
    http::{
        HeaderName, HeaderValue, Method, Request,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    middleware,
    routing::get,
};
use redis::aio::ConnectionManager;
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{Span, info, info_span};
use ulid::Ulid;
use url::Url;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::oidc::{self, IdentityProvider, ProviderConfig};
use crate::store::{RedisSessionStore, RedisStateStore, SessionStore, StateStore};
use crate::users::{PgUserStore, UserStore};

pub mod handlers;
mod openapi;

pub use handlers::auth::AuthConfig;
pub use openapi::ApiDoc;

use handlers::{auth, health};

/// Start the server.
///
/// Provider discovery, session-store connectivity, and database
/// connectivity are all checked here; any failure aborts startup.
///
/// # Errors
///
/// Returns an error if a dependency is unreachable or the listener can not
/// be bound.
pub async fn new(
    port: u16,
    dsn: String,
    redis_url: String,
    provider_config: ProviderConfig,
    auth_config: AuthConfig,
) -> Result<()> {
    // A broker that can not verify tokens must not serve traffic.
    let provider = oidc::Provider::discover(&provider_config)
        .await
        .context("Failed to configure identity provider")?;

    let redis_client = redis::Client::open(redis_url.as_str()).context("Invalid redis URL")?;
    let connection = ConnectionManager::new(redis_client)
        .await
        .context("Failed to connect to session store")?;

    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(&dsn)
        .await
        .context("Failed to connect to database")?;

    let user_store = PgUserStore::new(pool.clone());
    user_store
        .migrate()
        .await
        .context("Failed to prepare users table")?;

    let sessions: Arc<dyn SessionStore> = Arc::new(RedisSessionStore::new(
        connection.clone(),
        auth_config.session_ttl(),
    ));
    let states: Arc<dyn StateStore> = Arc::new(RedisStateStore::new(connection.clone()));
    let users: Arc<dyn UserStore> = Arc::new(user_store);
    let provider: Arc<dyn IdentityProvider> = Arc::new(provider);

    let service = auth::AuthService::new(
        provider.clone(),
        sessions.clone(),
        states,
        users.clone(),
        auth_config.clone(),
    );
    let auth_state = Arc::new(auth::AuthState::new(
        service,
        sessions,
        provider,
        users,
        auth_config.clone(),
    ));

    let frontend_origin = frontend_origin(auth_config.public_url())?;
    let cors = CorsLayer::new()
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_methods([Method::GET, Method::POST])
        .allow_origin(AllowOrigin::exact(frontend_origin))
        .allow_credentials(true);

    // Protected routes pass through the guard; everything below it is
    // reachable without a session.
    let protected = Router::new()
        .route("/me", get(auth::me))
        .route_layer(middleware::from_fn(auth::guard::authenticate));

    let app = Router::new()
        .merge(protected)
        .route("/auth/login", get(auth::login))
        .route("/auth/callback", get(auth::callback))
        .route("/auth/logout", get(auth::logout))
        .route("/health", get(health::health).options(health::health))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_request: &Request<Body>| {
                        HeaderValue::from_str(Ulid::new().to_string().as_str()).ok()
                    },
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(cors)
                .layer(Extension(auth_state))
                .layer(Extension(pool))
                .layer(Extension(connection)),
        );

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

fn frontend_origin(public_url: &str) -> Result<HeaderValue> {
    let parsed = Url::parse(public_url)
        .with_context(|| format!("Invalid public base URL: {public_url}"))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| anyhow!("Public base URL must include a valid host: {public_url}"))?;
    let origin = match parsed.port() {
        Some(port) => format!("{}://{host}:{port}", parsed.scheme()),
        None => format!("{}://{host}", parsed.scheme()),
    };
    HeaderValue::from_str(&origin).with_context(|| format!("Invalid origin header value: {origin}"))
}
