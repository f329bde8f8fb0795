use axum::{
    body::Body,
    extract::Extension,
    http::{HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json},
};
use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};
use sqlx::{Connection, PgPool};
use tracing::{Instrument, error, info_span};
use utoipa::ToSchema;

use crate::GIT_COMMIT_HASH;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct Health {
    commit: String,
    name: String,
    version: String,
    database: String,
    session_store: String,
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Database and session store are healthy", body = Health),
        (status = 503, description = "Database or session store is unhealthy", body = Health)
    ),
    tag = "health"
)]
// axum handler for health
pub async fn health(
    method: Method,
    pool: Extension<PgPool>,
    redis: Extension<ConnectionManager>,
) -> impl IntoResponse {
    let database = ping_database(&pool.0).await;
    let session_store = ping_session_store(redis.0.clone()).await;
    let is_healthy = database && session_store;

    let health = Health {
        commit: GIT_COMMIT_HASH.to_string(),
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database: status_label(database).to_string(),
        session_store: status_label(session_store).to_string(),
    };

    // OPTIONS probes get the status and headers without a payload.
    let body = if method == Method::GET {
        Json(&health).into_response()
    } else {
        Body::empty().into_response()
    };

    let mut headers = HeaderMap::new();
    if let Some(x_app) = x_app_header(&health) {
        headers.insert("X-App", x_app);
    }

    if is_healthy {
        (StatusCode::OK, headers, body)
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, headers, body)
    }
}

async fn ping_database(pool: &PgPool) -> bool {
    let acquire_span = info_span!(
        "db.acquire",
        db.system = "postgresql",
        db.operation = "ACQUIRE"
    );
    let conn = pool.acquire().instrument(acquire_span).await;
    match conn {
        Ok(mut conn) => {
            let ping_span = info_span!("db.ping", db.system = "postgresql", db.operation = "PING");
            match conn.ping().instrument(ping_span).await {
                Ok(()) => true,
                Err(error) => {
                    error!("Failed to ping database: {error}");
                    false
                }
            }
        }
        Err(error) => {
            error!("Failed to acquire database connection: {error}");
            false
        }
    }
}

async fn ping_session_store(mut connection: ConnectionManager) -> bool {
    let ping_span = info_span!("redis.ping", db.system = "redis", db.operation = "PING");
    match redis::cmd("PING")
        .query_async::<String>(&mut connection)
        .instrument(ping_span)
        .await
    {
        Ok(_) => true,
        Err(error) => {
            error!("Failed to ping session store: {error}");
            false
        }
    }
}

const fn status_label(ok: bool) -> &'static str {
    if ok { "ok" } else { "error" }
}

/// `name:version:short-commit`, attached to every health response.
fn x_app_header(health: &Health) -> Option<HeaderValue> {
    let short_hash = if health.commit.len() > 7 {
        &health.commit[0..7]
    } else {
        ""
    };
    format!("{}:{}:{}", health.name, health.version, short_hash)
        .parse::<HeaderValue>()
        .map_err(|err| error!("Failed to build X-App header: {err}"))
        .ok()
}
