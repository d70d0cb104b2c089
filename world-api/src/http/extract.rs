use axum::extract::{FromRequest, Request};
use axum::http::header::CONTENT_TYPE;
use axum::Json;
use axum_extra::extract::Form;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::error::ApiError;

/// Request body accepted either as JSON or as an urlencoded form.
///
/// Binding failures become a plain 400; the partially bound value is never
/// echoed back.
#[derive(Debug, Clone)]
pub struct Payload<T>(pub T);

impl<S, T> FromRequest<S> for Payload<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        if is_form(&req) {
            let Form(value) = Form::<T>::from_request(req, state)
                .await
                .map_err(|rejection| {
                    debug!(error = %rejection, "rejected form body");
                    ApiError::BadRequest("malformed request body")
                })?;
            Ok(Self(value))
        } else {
            let Json(value) = Json::<T>::from_request(req, state)
                .await
                .map_err(|rejection| {
                    debug!(error = %rejection, "rejected json body");
                    ApiError::BadRequest("malformed request body")
                })?;
            Ok(Self(value))
        }
    }
}

fn is_form(req: &Request) -> bool {
    req.headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("application/x-www-form-urlencoded"))
}
