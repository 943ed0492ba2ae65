use crate::{
    errors::ServiceError,
    models::{BillingCycle, Order, PurchasableItem},
    services::catalog::CatalogService,
};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

/// Resolves a purchase selection into a typed, priced draft order.
///
/// Pure resolution against the catalog: no side effects, and the result's
/// `final_price` equals its `base_price` until a discount is applied.
#[derive(Clone)]
pub struct OrderBuilder {
    catalog: Arc<CatalogService>,
}

impl OrderBuilder {
    pub fn new(catalog: Arc<CatalogService>) -> Self {
        Self { catalog }
    }

    #[instrument(skip(self))]
    pub async fn build(
        &self,
        user_id: Uuid,
        selection: PurchasableItem,
        contact_phone: Option<String>,
    ) -> Result<Order, ServiceError> {
        let (base_price, description) = match &selection {
            PurchasableItem::Subscription { plan_id, cycle } => {
                let plan = self
                    .catalog
                    .get_plan(plan_id)
                    .await?
                    .filter(|p| p.is_active)
                    .ok_or_else(|| {
                        ServiceError::NotFound(format!("Plan {} not found", plan_id))
                    })?;
                let price = match cycle {
                    BillingCycle::Monthly => plan.monthly_price,
                    BillingCycle::Yearly => plan.yearly_price,
                }
                .ok_or_else(|| {
                    ServiceError::NotFound(format!(
                        "Plan {} is not offered on a {} cycle",
                        plan_id, cycle
                    ))
                })?;
                (price, format!("{} subscription ({})", plan.name, cycle))
            }
            PurchasableItem::Program { program_id } => {
                let program = self
                    .catalog
                    .get_program(*program_id)
                    .await?
                    .filter(|p| p.is_active)
                    .ok_or_else(|| {
                        ServiceError::NotFound(format!("Program {} not found", program_id))
                    })?;
                (program.price, program.title)
            }
            PurchasableItem::Bundle { bundle_id } => {
                // Inactive bundles are rejected even when the id exists.
                let bundle = self
                    .catalog
                    .get_bundle(*bundle_id)
                    .await?
                    .filter(|b| b.is_active)
                    .ok_or_else(|| {
                        ServiceError::NotFound(format!("Bundle {} not found", bundle_id))
                    })?;
                (bundle.price, format!("Bundle: {}", bundle.title))
            }
        };

        if base_price < 0 {
            return Err(ServiceError::InternalError(format!(
                "catalog returned a negative price for {:?}",
                selection
            )));
        }

        Ok(Order::new(
            user_id,
            selection,
            description,
            base_price,
            contact_phone,
        ))
    }
}
