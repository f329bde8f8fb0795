//! Cookie plumbing for the session and post-login redirect cookies.

use axum::http::{HeaderMap, HeaderValue, header::InvalidHeaderValue};
use std::time::Duration;

pub(crate) const SESSION_COOKIE_NAME: &str = "session_id";
pub(crate) const REDIRECT_COOKIE_NAME: &str = "redirect_after_login";

const REDIRECT_COOKIE_TTL_SECONDS: u64 = 5 * 60;

/// Session cookie: the opaque identifier is the sole credential, so it is
/// `HttpOnly` and `SameSite=Lax`, with a lifetime matching the SSO max
/// lifespan.
pub(crate) fn session_cookie(
    session_id: &str,
    max_age: Duration,
    secure: bool,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let max_age = max_age.as_secs();
    let mut cookie = format!(
        "{SESSION_COOKIE_NAME}={session_id}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age}"
    );
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

pub(crate) fn clear_session_cookie(secure: bool) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie =
        format!("{SESSION_COOKIE_NAME}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

/// Stash the originally requested path so the callback can restore
/// navigation after login. Short-lived on purpose.
pub(crate) fn stash_redirect_cookie(path: &str) -> Result<HeaderValue, InvalidHeaderValue> {
    HeaderValue::from_str(&format!(
        "{REDIRECT_COOKIE_NAME}={path}; Path=/; HttpOnly; Max-Age={REDIRECT_COOKIE_TTL_SECONDS}"
    ))
}

pub(crate) fn clear_redirect_cookie() -> Result<HeaderValue, InvalidHeaderValue> {
    HeaderValue::from_str(&format!("{REDIRECT_COOKIE_NAME}=; Path=/; HttpOnly; Max-Age=0"))
}

/// Pull one cookie's value out of the `Cookie` request header.
pub(crate) fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    let header = headers.get(axum::http::header::COOKIE)?;
    let value = header.to_str().ok()?;
    for pair in value.split(';') {
        let trimmed = pair.trim();
        let mut parts = trimmed.splitn(2, '=');
        let key = parts.next()?.trim();
        let val = parts.next()?.trim();
        if key == name && !val.is_empty() {
            return Some(val.to_string());
        }
    }
    None
}
