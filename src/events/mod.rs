use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Events emitted by the checkout flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    CheckoutStarted {
        user_id: Uuid,
        description: String,
        final_price: i64,
    },
    DiscountApplied {
        user_id: Uuid,
        code: String,
        discount_amount: i64,
    },
    DiscountRemoved {
        user_id: Uuid,
    },
    GatewayRedirectIssued {
        user_id: Uuid,
        authority: String,
        amount: i64,
    },
    PaymentVerified {
        user_id: Uuid,
        reference_id: String,
        /// Gateway reported code 101 (duplicate verify call)
        already_verified: bool,
    },
    PaymentCancelled {
        user_id: Uuid,
        authority: String,
    },
    VerificationFailed {
        user_id: Uuid,
        authority: String,
        message: String,
    },
    EntitlementGranted {
        user_id: Uuid,
        reference_id: Option<String>,
    },
    EntitlementGrantFailed {
        user_id: Uuid,
        reference_id: String,
    },
    CheckoutAcknowledged {
        user_id: Uuid,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event; delivery is best-effort and never fails the flow.
    pub async fn send(&self, event: Event) {
        if let Err(e) = self.sender.send(event).await {
            warn!(error = %e, "event channel closed, dropping event");
        }
    }
}

/// Drains the event channel, logging each event. Runs as a spawned task for
/// the lifetime of the process.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    while let Some(event) = receiver.recv().await {
        match &event {
            Event::PaymentVerified {
                user_id,
                reference_id,
                already_verified,
            } => {
                // The already-verified case is the natural duplicate-verify
                // signal; keep it visible for audit.
                info!(
                    %user_id,
                    %reference_id,
                    already_verified,
                    "payment verified"
                );
            }
            Event::EntitlementGrantFailed {
                user_id,
                reference_id,
            } => {
                warn!(%user_id, %reference_id, "entitlement grant failed after payment");
            }
            other => info!(event = ?other, "checkout event"),
        }
    }
}
