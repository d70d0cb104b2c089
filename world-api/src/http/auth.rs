use std::time::Duration;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use axum_extra::extract::cookie::{Cookie, SameSite};
use axum_extra::extract::SignedCookieJar;
use tracing::{debug, warn};

use super::error::ApiError;
use super::state::AppState;

pub const SESSION_COOKIE: &str = "sessions";

/// Username resolved by [`require_session`] for the current request.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub username: String,
    pub token: String,
}

/// Rejects requests without a live session with 403; otherwise stores the
/// [`CurrentUser`] in the request extensions before calling the handler.
pub async fn require_session(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(token) = jar.get(SESSION_COOKIE).map(|cookie| cookie.value().to_string()) else {
        debug!(path = %request.uri().path(), "request without session cookie");
        return Err(ApiError::Forbidden);
    };

    let Some(username) = state.sessions.get(&token).await? else {
        warn!(path = %request.uri().path(), "unknown or expired session");
        return Err(ApiError::Forbidden);
    };

    debug!(user = %username, "authorized request using session");
    request
        .extensions_mut()
        .insert(CurrentUser { username, token });
    Ok(next.run(request).await)
}

pub fn session_cookie(token: String, ttl: Duration) -> Cookie<'static> {
    let max_age = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(cookie::time::Duration::seconds(max_age))
        .build()
}

pub fn expired_session_cookie() -> Cookie<'static> {
    Cookie::build(SESSION_COOKIE).path("/").build()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum_extra::extract::cookie::SameSite;

    use super::{session_cookie, SESSION_COOKIE};

    #[test]
    fn session_cookie_is_http_only_and_scoped_to_root() {
        let cookie = session_cookie(String::from("token"), Duration::from_secs(14 * 24 * 3600));
        assert_eq!(cookie.name(), SESSION_COOKIE);
        assert_eq!(cookie.value(), "token");
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(
            cookie.max_age().map(|age| age.whole_days()),
            Some(14)
        );
    }
}
