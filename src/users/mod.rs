//! Local projection of provider-asserted users.
//!
//! The broker keeps a small user record (subject, email, names) in sync
//! with the claims the provider asserts: written synchronously when a
//! session is created, and refreshed opportunistically after a token
//! refresh. Domain services join against this table instead of parsing
//! tokens themselves.

use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use sqlx::{PgPool, Row};
use std::sync::Arc;
use tracing::{Instrument, error, info, info_span};

use crate::oidc::Identity;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct User {
    pub id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("user field {0} must not be empty")]
    Empty(&'static str),
    #[error("invalid email address")]
    Email,
}

pub fn valid_email(email: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|re| re.is_match(email))
}

impl User {
    /// Build a user record from provider claims. All fields are asserted by
    /// the provider; an account without them can not be projected.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] when a field is empty or the email is
    /// not email-shaped.
    pub fn new(
        id: impl Into<String>,
        email: impl Into<String>,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let user = Self {
            id: id.into(),
            email: email.into(),
            first_name: first_name.into(),
            last_name: last_name.into(),
        };

        if user.id.is_empty() {
            return Err(ValidationError::Empty("id"));
        }
        if user.first_name.is_empty() {
            return Err(ValidationError::Empty("first_name"));
        }
        if user.last_name.is_empty() {
            return Err(ValidationError::Empty("last_name"));
        }
        if !valid_email(&user.email) {
            return Err(ValidationError::Email);
        }

        Ok(user)
    }

    /// # Errors
    ///
    /// Same rules as [`User::new`]; the email claim must be present.
    pub fn from_identity(identity: &Identity) -> Result<Self, ValidationError> {
        Self::new(
            identity.subject.clone(),
            identity.email.clone().unwrap_or_default(),
            identity.given_name.clone(),
            identity.family_name.clone(),
        )
    }
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, user_id: &str) -> Result<Option<User>>;

    /// Insert or overwrite the projection for `user.id`.
    async fn save(&self, user: &User) -> Result<()>;
}

pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the projection table when it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns an error when the DDL statement fails; fatal at startup.
    pub async fn migrate(&self) -> Result<()> {
        let query = r"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL,
                first_name TEXT NOT NULL,
                last_name TEXT NOT NULL
            )
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "CREATE TABLE"
        );
        sqlx::query(query)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to create users table")?;

        Ok(())
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_id(&self, user_id: &str) -> Result<Option<User>> {
        let query = "SELECT id, email, first_name, last_name FROM users WHERE id = $1";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup user")?;

        Ok(row.map(|row| User {
            id: row.get("id"),
            email: row.get("email"),
            first_name: row.get("first_name"),
            last_name: row.get("last_name"),
        }))
    }

    async fn save(&self, user: &User) -> Result<()> {
        let query = r"
            INSERT INTO users (id, email, first_name, last_name)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE
                SET email = EXCLUDED.email,
                    first_name = EXCLUDED.first_name,
                    last_name = EXCLUDED.last_name
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(&user.id)
            .bind(&user.email)
            .bind(&user.first_name)
            .bind(&user.last_name)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to save user")?;

        Ok(())
    }
}

/// Bring the stored projection in line with freshly verified claims.
///
/// Runs detached after a token refresh; every failure is logged and
/// swallowed so it can never affect the request that triggered it.
pub async fn sync_identity(store: Arc<dyn UserStore>, identity: Identity) {
    let user = match User::from_identity(&identity) {
        Ok(user) => user,
        Err(err) => {
            error!(subject = %identity.subject, "user sync rejected claims: {err}");
            return;
        }
    };

    let stored = match store.find_by_id(&user.id).await {
        Ok(stored) => stored,
        Err(err) => {
            error!(subject = %user.id, "user sync lookup failed: {err}");
            return;
        }
    };

    match stored {
        Some(stored) if stored == user => {}
        outdated => {
            if outdated.is_some() {
                info!(subject = %user.id, "user projection outdated, updating");
            }
            if let Err(err) = store.save(&user).await {
                error!(subject = %user.id, "user sync save failed: {err}");
            }
        }
    }
}
