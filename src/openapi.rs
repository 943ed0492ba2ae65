use utoipa::OpenApi;

use crate::errors::ErrorResponse;
use crate::handlers::checkout::{ApplyDiscountRequest, StartCheckoutRequest};
use crate::handlers::HealthStatus;
use crate::models::{BillingCycle, Entitlement, Order, OrderState, PurchasableItem};
use crate::services::checkout::{CallbackOutcome, SubmitOutcome};

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::health,
        crate::handlers::checkout::start_checkout,
        crate::handlers::checkout::current_session,
        crate::handlers::checkout::apply_discount,
        crate::handlers::checkout::remove_discount,
        crate::handlers::checkout::submit,
        crate::handlers::checkout::payment_callback,
        crate::handlers::checkout::acknowledge,
    ),
    components(schemas(
        HealthStatus,
        StartCheckoutRequest,
        ApplyDiscountRequest,
        Order,
        OrderState,
        PurchasableItem,
        BillingCycle,
        Entitlement,
        SubmitOutcome,
        CallbackOutcome,
        ErrorResponse,
    )),
    tags(
        (name = "checkout", description = "Checkout and entitlement activation"),
        (name = "health", description = "Service health")
    ),
    info(
        title = "PulseFit Checkout API",
        description = "Checkout, payment verification, and entitlement activation for the PulseFit storefront"
    )
)]
pub struct ApiDoc;
