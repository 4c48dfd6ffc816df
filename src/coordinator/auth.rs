//! Bearer-token auth middleware (§4.4 step 1): every mutating endpoint checks
//! `Authorization` against the configured secret; an empty secret disables
//! the check (local-use-only escape hatch the spec calls out explicitly).

use axum::extract::State;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;

use super::error::CoordinatorError;
use super::state::CoordinatorState;

pub async fn require_bearer_auth(
    State(state): State<CoordinatorState>,
    request: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, CoordinatorError> {
    if state.config.secret_key.is_empty() {
        return Ok(next.run(request).await);
    }

    let header = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    let expected = format!("Bearer {}", state.config.secret_key);
    match header {
        Some(value) if value == expected => Ok(next.run(request).await),
        _ => Err(CoordinatorError::AuthFailure),
    }
}
