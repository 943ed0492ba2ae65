use crate::{
    errors::ServiceError,
    events::{Event, EventSender},
    models::{Entitlement, Order, OrderState, PurchasableItem, VerificationResult},
    services::checkout::{
        discount::DiscountValidator,
        entitlement::EntitlementService,
        gateway::{PaymentGateway, PaymentMetadata, PaymentRequest},
        order_builder::OrderBuilder,
        session_store::CheckoutSessionStore,
    },
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

/// Callback `Status` value the gateway sends on a completed payment;
/// anything else is user cancellation.
const CALLBACK_STATUS_OK: &str = "OK";

/// Result of submitting a checkout: either the browser must be redirected
/// to the gateway, or the zero-price fast path granted immediately.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SubmitOutcome {
    Redirect { url: String },
    Granted { entitlement: Entitlement },
}

/// Outcome presented to the user returning from the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CallbackOutcome {
    Granted {
        entitlement: Entitlement,
        reference_id: String,
    },
    Cancelled,
    Failed {
        message: String,
    },
    /// Payment went through but activation failed; the reference id is the
    /// handle support needs to reconcile manually.
    GrantFailed {
        reference_id: String,
        message: String,
    },
}

/// Orchestrates one checkout from selection to granted entitlement.
///
/// The flow is resumable: every step re-reads the persisted order, so a
/// full page navigation to the gateway and back (or a process restart in
/// between) loses nothing. The persisted order is also the source of truth
/// for the verification amount; callback query data never re-prices it.
pub struct CheckoutFlow {
    builder: OrderBuilder,
    discounts: DiscountValidator,
    sessions: Arc<dyn CheckoutSessionStore>,
    gateway: Arc<dyn PaymentGateway>,
    entitlements: EntitlementService,
    events: EventSender,
    callback_url: String,
}

impl CheckoutFlow {
    pub fn new(
        builder: OrderBuilder,
        discounts: DiscountValidator,
        sessions: Arc<dyn CheckoutSessionStore>,
        gateway: Arc<dyn PaymentGateway>,
        entitlements: EntitlementService,
        events: EventSender,
        callback_url: String,
    ) -> Self {
        Self {
            builder,
            discounts,
            sessions,
            gateway,
            entitlements,
            events,
            callback_url,
        }
    }

    /// Starts a new draft order, overwriting any in-flight session. The
    /// superseded order becomes inert; nothing reaps it.
    #[instrument(skip(self, selection, contact_phone))]
    pub async fn start_checkout(
        &self,
        user_id: Uuid,
        selection: PurchasableItem,
        contact_phone: Option<String>,
    ) -> Result<Order, ServiceError> {
        let contact_phone = contact_phone.filter(|p| !p.trim().is_empty());
        if selection.requires_contact_phone() && contact_phone.is_none() {
            return Err(ServiceError::ValidationError(
                "a contact phone is required for program and bundle purchases".to_string(),
            ));
        }

        let order = self.builder.build(user_id, selection, contact_phone).await?;
        self.sessions.save(&order).await?;
        self.events
            .send(Event::CheckoutStarted {
                user_id,
                description: order.description.clone(),
                final_price: order.final_price,
            })
            .await;
        Ok(order)
    }

    /// The persisted in-flight order, if any.
    pub async fn current_session(&self, user_id: Uuid) -> Result<Option<Order>, ServiceError> {
        self.sessions.load(user_id).await
    }

    #[instrument(skip(self))]
    pub async fn apply_discount(&self, user_id: Uuid, code: &str) -> Result<Order, ServiceError> {
        let mut order = self.load_required(user_id).await?;
        self.discounts.apply(&mut order, code).await?;
        self.sessions.save(&order).await?;
        self.events
            .send(Event::DiscountApplied {
                user_id,
                code: code.to_string(),
                discount_amount: order.discount_amount,
            })
            .await;
        Ok(order)
    }

    #[instrument(skip(self))]
    pub async fn remove_discount(&self, user_id: Uuid) -> Result<Order, ServiceError> {
        let mut order = self.load_required(user_id).await?;
        self.discounts.reset(&mut order)?;
        self.sessions.save(&order).await?;
        self.events.send(Event::DiscountRemoved { user_id }).await;
        Ok(order)
    }

    /// Submits the draft: grants immediately for a zero-price order, or
    /// requests a gateway redirect otherwise.
    ///
    /// A submit that failed at the gateway leaves the order persisted in
    /// `AwaitingGatewayRedirect`, so re-submitting retries the gateway call
    /// without re-entering phone number or discount.
    #[instrument(skip(self))]
    pub async fn submit(&self, user_id: Uuid) -> Result<SubmitOutcome, ServiceError> {
        let mut order = self.load_required(user_id).await?;
        match order.state {
            OrderState::Draft | OrderState::AwaitingGatewayRedirect => {}
            state => {
                return Err(ServiceError::InvalidOperation(format!(
                    "order in state {} cannot be submitted",
                    state
                )))
            }
        }

        // Fast path: fully discounted or free items never touch the
        // gateway. The grant is keyed on the order id, so a submit retried
        // after a lost save cannot grant twice.
        if order.final_price == 0 {
            let entitlement = self.entitlements.grant(&order, None).await?;
            order.advance(OrderState::EntitlementGranted)?;
            self.sessions.save(&order).await?;
            self.events
                .send(Event::EntitlementGranted {
                    user_id,
                    reference_id: None,
                })
                .await;
            return Ok(SubmitOutcome::Granted { entitlement });
        }

        // The order must be durable before any redirect can exist: the
        // browser may navigate away the moment it has the URL.
        if order.state == OrderState::Draft {
            order.advance(OrderState::AwaitingGatewayRedirect)?;
            self.sessions.save(&order).await?;
        }

        let request = PaymentRequest {
            amount: order.final_price,
            description: order.description.clone(),
            callback_url: self.callback_url.clone(),
            metadata: PaymentMetadata { user_id },
        };
        let authority = self.gateway.request_payment(&request).await?;

        order.gateway_authority = Some(authority.clone());
        order.advance(OrderState::AwaitingVerification)?;
        self.sessions.save(&order).await?;
        self.events
            .send(Event::GatewayRedirectIssued {
                user_id,
                authority: authority.clone(),
                amount: order.final_price,
            })
            .await;

        Ok(SubmitOutcome::Redirect {
            url: self.gateway.redirect_url(&authority),
        })
    }

    /// Handles the browser's return from the gateway.
    ///
    /// Safe to hit repeatedly: a reload after success re-verifies (the
    /// gateway reports already-verified) and the grant is idempotent; a
    /// reload after a recorded outcome re-presents that outcome.
    #[instrument(skip(self, status))]
    pub async fn handle_callback(
        &self,
        user_id: Uuid,
        authority: &str,
        status: &str,
    ) -> Result<CallbackOutcome, ServiceError> {
        let mut order = self.load_required(user_id).await?;

        if order.is_terminal() {
            return self.replay_outcome(&order).await;
        }

        // Only states past the redirect carry an authority; anything
        // earlier is an out-of-place callback, not a mismatch.
        match order.state {
            OrderState::AwaitingVerification => {
                ensure_authority_matches(&order, authority)?;
                if status != CALLBACK_STATUS_OK {
                    order.advance(OrderState::VerificationFailed)?;
                    self.sessions.save(&order).await?;
                    self.events
                        .send(Event::PaymentCancelled {
                            user_id,
                            authority: authority.to_string(),
                        })
                        .await;
                    return Ok(CallbackOutcome::Cancelled);
                }

                // Amount pinning: verify against the persisted final price.
                let verification = self
                    .gateway
                    .verify(authority, order.final_price)
                    .await?;

                match verification {
                    VerificationResult::Verified {
                        reference_id,
                        already_verified,
                    } => {
                        order.advance(OrderState::Verified)?;
                        order.gateway_reference = Some(reference_id.clone());
                        // Persist before granting so a crash mid-grant can
                        // resume from Verified with the reference intact.
                        self.sessions.save(&order).await?;
                        self.events
                            .send(Event::PaymentVerified {
                                user_id,
                                reference_id,
                                already_verified,
                            })
                            .await;
                        self.finish_grant(order).await
                    }
                    VerificationResult::Failed { message, .. } => {
                        order.advance(OrderState::VerificationFailed)?;
                        self.sessions.save(&order).await?;
                        self.events
                            .send(Event::VerificationFailed {
                                user_id,
                                authority: authority.to_string(),
                                message: message.clone(),
                            })
                            .await;
                        Ok(CallbackOutcome::Failed { message })
                    }
                    VerificationResult::Cancelled => {
                        order.advance(OrderState::VerificationFailed)?;
                        self.sessions.save(&order).await?;
                        self.events
                            .send(Event::PaymentCancelled {
                                user_id,
                                authority: authority.to_string(),
                            })
                            .await;
                        Ok(CallbackOutcome::Cancelled)
                    }
                }
            }
            // A previous callback verified but crashed before granting;
            // retry only the grant step, keyed by the stored reference.
            OrderState::Verified => {
                ensure_authority_matches(&order, authority)?;
                self.finish_grant(order).await
            }
            state => Err(ServiceError::InvalidOperation(format!(
                "unexpected callback for order in state {}",
                state
            ))),
        }
    }

    /// Acknowledges a terminal outcome and frees the session slot.
    #[instrument(skip(self))]
    pub async fn acknowledge(&self, user_id: Uuid) -> Result<(), ServiceError> {
        let order = self.load_required(user_id).await?;
        if !order.is_terminal() {
            return Err(ServiceError::InvalidOperation(
                "checkout is still in progress".to_string(),
            ));
        }
        self.sessions.clear(user_id).await?;
        self.events
            .send(Event::CheckoutAcknowledged { user_id })
            .await;
        Ok(())
    }

    async fn load_required(&self, user_id: Uuid) -> Result<Order, ServiceError> {
        self.sessions
            .load(user_id)
            .await?
            .ok_or(ServiceError::NoActiveSession)
    }

    /// Grant step for an order in `Verified` state.
    async fn finish_grant(&self, mut order: Order) -> Result<CallbackOutcome, ServiceError> {
        let user_id = order.user_id;
        let reference_id = order.gateway_reference.clone().ok_or_else(|| {
            ServiceError::InternalError("verified order has no gateway reference".to_string())
        })?;

        match self.entitlements.grant(&order, Some(&reference_id)).await {
            Ok(entitlement) => {
                order.advance(OrderState::EntitlementGranted)?;
                self.sessions.save(&order).await?;
                self.events
                    .send(Event::EntitlementGranted {
                        user_id,
                        reference_id: Some(reference_id.clone()),
                    })
                    .await;
                Ok(CallbackOutcome::Granted {
                    entitlement,
                    reference_id,
                })
            }
            Err(e) => {
                // The payment reference must never be discarded here: it is
                // the user's proof of payment.
                order.advance(OrderState::EntitlementFailed)?;
                self.sessions.save(&order).await?;
                self.events
                    .send(Event::EntitlementGrantFailed {
                        user_id,
                        reference_id: reference_id.clone(),
                    })
                    .await;
                Ok(CallbackOutcome::GrantFailed {
                    reference_id,
                    message: e.to_string(),
                })
            }
        }
    }

    /// Re-presents the stored outcome when the callback page is reloaded
    /// after the order already reached a terminal state.
    async fn replay_outcome(&self, order: &Order) -> Result<CallbackOutcome, ServiceError> {
        match order.state {
            OrderState::EntitlementGranted => {
                let reference_id = order.gateway_reference.clone().ok_or_else(|| {
                    ServiceError::InvalidOperation(
                        "granted order has no gateway reference".to_string(),
                    )
                })?;
                let entitlement = self
                    .entitlements
                    .grant(order, Some(&reference_id))
                    .await?;
                Ok(CallbackOutcome::Granted {
                    entitlement,
                    reference_id,
                })
            }
            OrderState::EntitlementFailed => {
                let reference_id = order.gateway_reference.clone().unwrap_or_default();
                Ok(CallbackOutcome::GrantFailed {
                    message: ServiceError::EntitlementGrantFailed {
                        reference: reference_id.clone(),
                    }
                    .to_string(),
                    reference_id,
                })
            }
            OrderState::VerificationFailed => Ok(CallbackOutcome::Failed {
                message: "the payment was cancelled or declined".to_string(),
            }),
            _ => unreachable!("replay_outcome called for non-terminal state"),
        }
    }
}

fn ensure_authority_matches(order: &Order, authority: &str) -> Result<(), ServiceError> {
    if order.gateway_authority.as_deref() != Some(authority) {
        warn!(user_id = %order.user_id, "callback authority does not match in-flight order");
        return Err(ServiceError::ValidationError(
            "callback authority does not match the order in progress".to_string(),
        ));
    }
    Ok(())
}
