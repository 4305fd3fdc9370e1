use super::http_errors::map_account_error;
use super::state::AppState;
use crate::domain::User;
use axum::http::{header, header::HeaderMap, StatusCode};
use axum::Json;
use tracing::{debug, error};

/// Cookie names the auth provider uses, secure variant first.
const SESSION_COOKIES: [&str; 2] = ["__Secure-next-auth.session-token", "next-auth.session-token"];

pub(super) fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .filter(|t| !t.is_empty())
}

pub(super) fn extract_session_cookie(headers: &HeaderMap) -> Option<&str> {
    let pairs: Vec<(&str, &str)> = headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .collect();

    SESSION_COOKIES.iter().find_map(|name| {
        pairs
            .iter()
            .find(|(k, v)| k == name && !v.is_empty())
            .map(|(_, v)| *v)
    })
}

pub(super) fn extract_session_token(headers: &HeaderMap) -> Option<&str> {
    extract_bearer_token(headers).or_else(|| extract_session_cookie(headers))
}

/// Resolves the caller, provisioning them on first sight.
pub(super) async fn authenticate(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<User, (StatusCode, Json<serde_json::Value>)> {
    let unauthorized = || {
        (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({ "error": "Unauthorized" })),
        )
    };

    let token = extract_session_token(headers).ok_or_else(unauthorized)?;
    let identity = state.sessions.verify(token).map_err(|e| {
        debug!(error = %e, "Rejected session token");
        unauthorized()
    })?;

    state.accounts.resolve_session(&identity).await.map_err(|e| {
        error!(error = %e, "Failed to resolve session user");
        let (status, body) = map_account_error(&e);
        (status, Json(body))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn extract_bearer_token_happy_path() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc123"));
        assert_eq!(extract_bearer_token(&headers), Some("abc123"));
    }

    #[test]
    fn extract_bearer_token_rejects_missing_empty_or_wrong_scheme() {
        assert_eq!(extract_bearer_token(&HeaderMap::new()), None);

        let mut empty = HeaderMap::new();
        empty.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(extract_bearer_token(&empty), None);

        let mut basic = HeaderMap::new();
        basic.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc123"));
        assert_eq!(extract_bearer_token(&basic), None);
    }

    #[test]
    fn session_cookie_prefers_secure_variant() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static(
                "theme=dark; next-auth.session-token=plain; __Secure-next-auth.session-token=secure",
            ),
        );
        assert_eq!(extract_session_cookie(&headers), Some("secure"));
    }

    #[test]
    fn bearer_wins_over_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer from-header"));
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("next-auth.session-token=from-cookie"),
        );
        assert_eq!(extract_session_token(&headers), Some("from-header"));

        headers.remove(header::AUTHORIZATION);
        assert_eq!(extract_session_token(&headers), Some("from-cookie"));
    }
}
