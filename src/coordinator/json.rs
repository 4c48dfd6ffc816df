//! A `Json` extractor that maps a malformed body to
//! [`CoordinatorError::Malformed`] instead of axum's default `JsonRejection`,
//! so a bad request body actually produces the 400 §6/§7 specify rather than
//! axum's own 415/422 rejections.

use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request};
use serde::de::DeserializeOwned;

use super::error::CoordinatorError;

pub struct Json<T>(pub T);

impl<S, T> FromRequest<S> for Json<T>
where
    axum::Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = CoordinatorError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match axum::Json::<T>::from_request(req, state).await {
            Ok(axum::Json(value)) => Ok(Json(value)),
            Err(rejection) => Err(CoordinatorError::Malformed(rejection.to_string())),
        }
    }
}
