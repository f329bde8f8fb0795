//! # Enirejo (OpenID Connect Session Broker)
//!
//! `enirejo` sits between a browser frontend and one OpenID Connect identity
//! provider. It turns a one-time authorization-code login into a durable,
//! server-side session keyed by an opaque cookie, and keeps that session
//! alive across access-token expiry through transparent refresh.
//!
//! ## Login Flow
//!
//! `GET /auth/login` issues a CSRF state (stored in Redis with a 5 minute
//! TTL) and returns the provider's authorization URL. The provider calls
//! back with `code` and `state`; the state is consumed (single use), the
//! code is exchanged, the returned ID token is verified immediately, and a
//! new session is persisted under a fresh opaque identifier delivered as an
//! `HttpOnly` cookie.
//!
//! ## Sessions & Refresh
//!
//! A session's token bundle carries an **absolute expiry** stamped once at
//! creation (`now + SSO max lifespan`) and never extended. Every protected
//! request verifies the cached ID token; an expired-but-valid token
//! triggers a refresh against the provider, after which the bundle is
//! rewritten with a TTL equal to the remaining absolute lifetime. Once the
//! absolute expiry has passed the session is deleted regardless of refresh
//! outcome.
//!
//! ## Identity Propagation
//!
//! Handlers never touch the token stores directly: the request-time guard
//! injects verified [`oidc::Identity`] claims (subject, names, roles) into
//! the request extensions, and a binary role check builds on top of that.

pub mod api;
pub mod cli;
pub mod oidc;
pub mod store;
pub mod users;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
