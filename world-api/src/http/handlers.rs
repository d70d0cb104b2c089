use std::sync::Arc;

use anyhow::Context;
use axum::extract::{Path, State};
use axum::http::header::HeaderName;
use axum::http::StatusCode;
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use axum_extra::extract::SignedCookieJar;
use tower_governor::governor::GovernorConfigBuilder;
use tower_governor::key_extractor::{GlobalKeyExtractor, PeerIpKeyExtractor};
use tower_governor::GovernorLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::config::RateLimitConfig;
use crate::password::{hash_password, verify_password, PasswordError};
use crate::store::{City, Country, NewCity};

use super::auth::{expired_session_cookie, require_session, session_cookie, CurrentUser};
use super::error::ApiError;
use super::extract::Payload;
use super::responses::{CredentialsRequest, WhoAmIResponse};
use super::state::AppState;

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Builds the full application. The peer-keyed limiter needs the server to be
/// started with `into_make_service_with_connect_info::<SocketAddr>()`.
pub fn router(state: AppState, limits: &RateLimitConfig) -> anyhow::Result<Router> {
    let protected = Router::new()
        .route("/whoami", get(whoami))
        .route("/logout", post(logout))
        .route("/cities", post(add_city))
        .route("/post", post(add_city))
        .route("/cities/{name}", get(city_by_name))
        .route("/countries", get(all_countries))
        .route_layer(from_fn_with_state(state.clone(), require_session));

    let app = Router::new()
        .route("/ping", get(ping))
        .route("/signup", post(signup))
        .route("/login", post(login))
        .merge(protected);

    let app = if limits.per_client {
        let governor_conf = GovernorConfigBuilder::default()
            .period(limits.period)
            .burst_size(limits.burst)
            .key_extractor(PeerIpKeyExtractor)
            .finish()
            .context("invalid rate limit configuration")?;
        app.layer(GovernorLayer::new(Arc::new(governor_conf)))
    } else {
        let governor_conf = GovernorConfigBuilder::default()
            .period(limits.period)
            .burst_size(limits.burst)
            .key_extractor(GlobalKeyExtractor)
            .finish()
            .context("invalid rate limit configuration")?;
        app.layer(GovernorLayer::new(Arc::new(governor_conf)))
    };

    // Layers wrap outward: the id is set before propagation copies it onto
    // the response, and the trace span sees it on the way in.
    Ok(app
        .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
            REQUEST_ID_HEADER,
        )))
        .layer(SetRequestIdLayer::new(
            HeaderName::from_static(REQUEST_ID_HEADER),
            MakeRequestUuid::default(),
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}

async fn ping() -> &'static str {
    "pong"
}

async fn signup(
    State(state): State<AppState>,
    Payload(body): Payload<CredentialsRequest>,
) -> Result<StatusCode, ApiError> {
    if body.is_incomplete() {
        return Err(ApiError::BadRequest("username and password are required"));
    }
    let CredentialsRequest { username, password } = body;

    // Cheap early exit; the unique key on users.Username is what actually
    // decides a concurrent race.
    if state.store.count_users(&username).await? > 0 {
        debug!(user = %username, "signup for existing user");
        return Err(ApiError::Conflict);
    }

    let hashed = run_hasher(move || hash_password(&password)).await?;
    state.store.insert_user(&username, &hashed).await?;

    info!(user = %username, "user signed up");
    Ok(StatusCode::CREATED)
}

async fn login(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    Payload(body): Payload<CredentialsRequest>,
) -> Result<(SignedCookieJar, StatusCode), ApiError> {
    let Some(user) = state.store.find_user_by_username(&body.username).await? else {
        warn!(user = %body.username, "login for unknown user");
        return Err(ApiError::Forbidden);
    };

    let stored = user.hashed_password;
    let password = body.password;
    let matched = run_hasher(move || verify_password(&password, &stored)).await?;
    if !matched {
        warn!(user = %user.username, "login with wrong password");
        return Err(ApiError::Forbidden);
    }

    let token = state.sessions.create(user.username.clone()).await?;
    info!(user = %user.username, "user logged in");
    let jar = jar.add(session_cookie(token, state.sessions.ttl()));
    Ok((jar, StatusCode::OK))
}

async fn logout(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    jar: SignedCookieJar,
) -> Result<(SignedCookieJar, StatusCode), ApiError> {
    state.sessions.remove(&current.token).await?;
    info!(user = %current.username, "user logged out");
    Ok((jar.remove(expired_session_cookie()), StatusCode::NO_CONTENT))
}

async fn whoami(Extension(current): Extension<CurrentUser>) -> Json<WhoAmIResponse> {
    Json(WhoAmIResponse {
        username: current.username,
    })
}

async fn city_by_name(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<City>, ApiError> {
    let city = state
        .store
        .find_city_by_name(&name)
        .await?
        .ok_or(ApiError::NotFound)?;
    debug!(city = %city.name, id = city.id, "city requested");
    Ok(Json(city))
}

async fn all_countries(State(state): State<AppState>) -> Result<Json<Vec<Country>>, ApiError> {
    let countries = state.store.list_countries().await?;
    debug!(countries = countries.len(), "countries requested");
    Ok(Json(countries))
}

async fn add_city(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Payload(city): Payload<NewCity>,
) -> Result<Json<City>, ApiError> {
    let stored = state.store.insert_city(&city).await?;
    info!(
        user = %current.username,
        city = %stored.name,
        id = stored.id,
        "city added"
    );
    Ok(Json(stored))
}

/// Argon2 is CPU-bound; keep it off the async workers.
async fn run_hasher<T, F>(work: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, PasswordError> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(work).await {
        Ok(result) => result.map_err(ApiError::from),
        Err(join_err) => {
            error!(error = %join_err, "password hashing task failed");
            Err(ApiError::Internal)
        }
    }
}
