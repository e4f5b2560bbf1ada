//! Session cookie encoding and parsing.

use axum::http::{HeaderMap, header::COOKIE};

use crate::config::CookieSettings;

/// Value of cookie `name` from the `Cookie` request headers.
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// `Cookie` header value with cookie `name` removed, or `None` if nothing remains.
pub fn without_cookie(value: &str, name: &str) -> Option<String> {
    let rest = value
        .split(';')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .filter(|pair| pair.split_once('=').map(|(k, _)| k) != Some(name))
        .collect::<Vec<_>>();
    if rest.is_empty() {
        None
    } else {
        Some(rest.join("; "))
    }
}

/// `Set-Cookie` value establishing a session.
///
/// Only persistent sessions carry `Max-Age`; the rest end with the browser.
pub fn session_cookie(settings: &CookieSettings, id: &str, persistent: bool) -> String {
    let mut cookie = format!("{}={}; Path=/; HttpOnly; SameSite=Lax", settings.name, id);
    if persistent {
        cookie.push_str(&format!("; Max-Age={}", settings.max_age_secs));
    }
    if settings.secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// `Set-Cookie` value that removes the session cookie.
pub fn expired_cookie(settings: &CookieSettings) -> String {
    let mut cookie = format!("{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0", settings.name);
    if settings.secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// Interpret a "remember me" form value.
///
/// Booleans are taken as is; strings count when they read `true`, `on`,
/// `1` or `yes` in any case.
pub fn parse_remember(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::String(s) => {
            matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "on" | "1" | "yes")
        }
        _ => false,
    }
}
