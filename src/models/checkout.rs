use crate::errors::ServiceError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Billing cycle for subscription plans.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BillingCycle {
    Monthly,
    Yearly,
}

/// What the user is buying. Exactly one variant per order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PurchasableItem {
    Subscription {
        plan_id: String,
        cycle: BillingCycle,
    },
    Program {
        program_id: Uuid,
    },
    Bundle {
        bundle_id: Uuid,
    },
}

impl PurchasableItem {
    /// Programs and bundles need a contact phone for fulfillment;
    /// subscriptions do not.
    pub fn requires_contact_phone(&self) -> bool {
        !matches!(self, PurchasableItem::Subscription { .. })
    }
}

/// Lifecycle state of an order. Transitions are monotonic; an abandoned
/// order simply never reaches a terminal state and is superseded when a new
/// checkout overwrites the session slot.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OrderState {
    Draft,
    AwaitingGatewayRedirect,
    AwaitingVerification,
    Verified,
    VerificationFailed,
    EntitlementGranted,
    EntitlementFailed,
}

impl OrderState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderState::VerificationFailed
                | OrderState::EntitlementGranted
                | OrderState::EntitlementFailed
        )
    }

    fn allows(self, next: OrderState) -> bool {
        use OrderState::*;
        matches!(
            (self, next),
            (Draft, AwaitingGatewayRedirect)
                // zero-price fast path bypasses the gateway states entirely
                | (Draft, EntitlementGranted)
                | (AwaitingGatewayRedirect, AwaitingVerification)
                | (AwaitingVerification, Verified)
                | (AwaitingVerification, VerificationFailed)
                | (Verified, EntitlementGranted)
                | (Verified, EntitlementFailed)
        )
    }
}

/// The central checkout entity: one priced, discount-adjusted purchase
/// attempt. Persisted across the gateway redirect by the session store and
/// reconstructed on return, so every field needed to finish the flow
/// (expected amount, item identity, applied discount) lives here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Order {
    /// Stable identity of this checkout attempt; doubles as the purchase
    /// record id so a retried grant cannot write a second record
    pub id: Uuid,
    pub item: PurchasableItem,
    /// Memo sent to the gateway with the payment request
    pub description: String,
    /// Catalog price in the smallest currency unit
    pub base_price: i64,
    pub discount_code: Option<String>,
    pub discount_amount: i64,
    /// `base_price - discount_amount`, never negative
    pub final_price: i64,
    pub user_id: Uuid,
    pub contact_phone: Option<String>,
    /// Gateway token for the redirect; set once a redirect was requested
    pub gateway_authority: Option<String>,
    /// Gateway proof-of-payment id; set only after verification succeeded
    pub gateway_reference: Option<String>,
    pub created_at: DateTime<Utc>,
    pub state: OrderState,
}

impl Order {
    pub fn new(
        user_id: Uuid,
        item: PurchasableItem,
        description: String,
        base_price: i64,
        contact_phone: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            item,
            description,
            base_price,
            discount_code: None,
            discount_amount: 0,
            final_price: base_price,
            user_id,
            contact_phone,
            gateway_authority: None,
            gateway_reference: None,
            created_at: Utc::now(),
            state: OrderState::Draft,
        }
    }

    /// Moves the order to `next`, rejecting any transition the state
    /// machine does not allow. State never regresses.
    pub fn advance(&mut self, next: OrderState) -> Result<(), ServiceError> {
        if !self.state.allows(next) {
            return Err(ServiceError::InvalidOperation(format!(
                "invalid order state transition {} -> {}",
                self.state, next
            )));
        }
        tracing::debug!(user_id = %self.user_id, from = %self.state, to = %next, "order state transition");
        self.state = next;
        Ok(())
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

/// Outcome of the gateway verification step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum VerificationResult {
    Verified {
        reference_id: String,
        /// True when the gateway reported the transaction as previously
        /// verified (its duplicate-verify signal)
        already_verified: bool,
    },
    /// The user backed out at the gateway; a normal outcome, not an error
    Cancelled,
    Failed {
        code: Option<i64>,
        message: String,
    },
}

/// The benefit granted by a verified purchase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Entitlement {
    SubscriptionExtension {
        plan_id: String,
        start_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
    },
    ProgramUnlock {
        program_id: Uuid,
        purchase_record_id: Uuid,
    },
    BundleUnlock {
        bundle_id: Uuid,
        purchase_record_id: Uuid,
    },
}
