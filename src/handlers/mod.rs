pub mod checkout;

use crate::{errors::ServiceError, AppState};
use axum::{
    extract::FromRequestParts,
    http::request::Parts,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

/// Identity of the calling user.
///
/// Authentication happens at the edge; by the time a request reaches this
/// service the proxy has validated the session and injected the user id as
/// an `X-User-Id` header.
#[derive(Debug, Clone, Copy)]
pub struct CurrentUser(pub Uuid);

#[axum::async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get("x-user-id")
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| {
                ServiceError::Unauthorized("missing X-User-Id header".to_string())
            })?;
        let user_id = Uuid::parse_str(raw).map_err(|_| {
            ServiceError::Unauthorized("malformed X-User-Id header".to_string())
        })?;
        Ok(CurrentUser(user_id))
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthStatus {
    pub status: &'static str,
    pub version: &'static str,
}

/// Liveness probe.
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses((status = 200, description = "Service is up", body = HealthStatus))
)]
pub async fn health() -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Builds the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/api/v1/checkout",
            post(checkout::start_checkout).get(checkout::current_session),
        )
        .route(
            "/api/v1/checkout/discount",
            post(checkout::apply_discount).delete(checkout::remove_discount),
        )
        .route("/api/v1/checkout/submit", post(checkout::submit))
        .route("/api/v1/checkout/acknowledge", post(checkout::acknowledge))
        .route("/api/v1/payment-callback", get(checkout::payment_callback))
        .with_state(state)
}
