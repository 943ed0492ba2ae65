use crate::{
    errors::{ErrorResponse, ServiceError},
    handlers::CurrentUser,
    models::{Order, PurchasableItem},
    services::checkout::{flow::CallbackOutcome, flow::SubmitOutcome},
    AppState,
};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct StartCheckoutRequest {
    /// The plan, program, or bundle being purchased
    pub item: PurchasableItem,
    /// Required for program and bundle purchases
    #[validate(length(min = 7, max = 20))]
    pub contact_phone: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ApplyDiscountRequest {
    #[validate(length(min = 1, max = 64))]
    pub code: String,
}

/// Query parameters the gateway appends when redirecting the browser back.
#[derive(Debug, Deserialize, IntoParams)]
pub struct CallbackParams {
    #[serde(rename = "Authority")]
    pub authority: String,
    /// "OK" for a completed payment, anything else means cancellation
    #[serde(rename = "Status")]
    pub status: String,
}

/// Starts a new checkout, replacing any order already in progress.
#[utoipa::path(
    post,
    path = "/api/v1/checkout",
    tag = "checkout",
    request_body = StartCheckoutRequest,
    responses(
        (status = 201, description = "Draft order created", body = Order),
        (status = 400, description = "Invalid selection or missing contact phone", body = ErrorResponse),
        (status = 404, description = "Item not found or inactive", body = ErrorResponse)
    )
)]
pub async fn start_checkout(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(payload): Json<StartCheckoutRequest>,
) -> Result<(StatusCode, Json<Order>), ServiceError> {
    payload.validate()?;
    let order = state
        .checkout
        .start_checkout(user.0, payload.item, payload.contact_phone)
        .await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// The order currently in progress, as persisted. This is what the UI
/// re-renders after the browser comes back from the gateway.
#[utoipa::path(
    get,
    path = "/api/v1/checkout",
    tag = "checkout",
    responses(
        (status = 200, description = "In-flight order", body = Order),
        (status = 404, description = "No checkout in progress", body = ErrorResponse)
    )
)]
pub async fn current_session(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<Order>, ServiceError> {
    let order = state
        .checkout
        .current_session(user.0)
        .await?
        .ok_or(ServiceError::NoActiveSession)?;
    Ok(Json(order))
}

#[utoipa::path(
    post,
    path = "/api/v1/checkout/discount",
    tag = "checkout",
    request_body = ApplyDiscountRequest,
    responses(
        (status = 200, description = "Discount applied", body = Order),
        (status = 400, description = "Invalid code or scope mismatch", body = ErrorResponse),
        (status = 409, description = "A code is already applied", body = ErrorResponse)
    )
)]
pub async fn apply_discount(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(payload): Json<ApplyDiscountRequest>,
) -> Result<Json<Order>, ServiceError> {
    payload.validate()?;
    let order = state.checkout.apply_discount(user.0, &payload.code).await?;
    Ok(Json(order))
}

#[utoipa::path(
    delete,
    path = "/api/v1/checkout/discount",
    tag = "checkout",
    responses(
        (status = 200, description = "Discount removed", body = Order),
        (status = 404, description = "No checkout in progress", body = ErrorResponse)
    )
)]
pub async fn remove_discount(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<Order>, ServiceError> {
    let order = state.checkout.remove_discount(user.0).await?;
    Ok(Json(order))
}

/// Submits the draft order: either returns the gateway redirect URL or,
/// for a zero-price order, grants the entitlement immediately.
#[utoipa::path(
    post,
    path = "/api/v1/checkout/submit",
    tag = "checkout",
    responses(
        (status = 200, description = "Redirect URL or immediate grant", body = SubmitOutcome),
        (status = 404, description = "No checkout in progress", body = ErrorResponse),
        (status = 502, description = "Gateway unavailable; the order is kept and submit can be retried", body = ErrorResponse)
    )
)]
pub async fn submit(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<SubmitOutcome>, ServiceError> {
    let outcome = state.checkout.submit(user.0).await?;
    Ok(Json(outcome))
}

/// Landing route for the browser returning from the gateway.
#[utoipa::path(
    get,
    path = "/api/v1/payment-callback",
    tag = "checkout",
    params(CallbackParams),
    responses(
        (status = 200, description = "Verification outcome", body = CallbackOutcome),
        (status = 400, description = "Authority does not match the order in progress", body = ErrorResponse),
        (status = 404, description = "No checkout in progress", body = ErrorResponse)
    )
)]
pub async fn payment_callback(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(params): Query<CallbackParams>,
) -> Result<Json<CallbackOutcome>, ServiceError> {
    let outcome = state
        .checkout
        .handle_callback(user.0, &params.authority, &params.status)
        .await?;
    Ok(Json(outcome))
}

/// Acknowledges a finished checkout and frees the session slot.
#[utoipa::path(
    post,
    path = "/api/v1/checkout/acknowledge",
    tag = "checkout",
    responses(
        (status = 204, description = "Session cleared"),
        (status = 400, description = "Checkout is still in progress", body = ErrorResponse),
        (status = 404, description = "No checkout in progress", body = ErrorResponse)
    )
)]
pub async fn acknowledge(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<StatusCode, ServiceError> {
    state.checkout.acknowledge(user.0).await?;
    Ok(StatusCode::NO_CONTENT)
}
