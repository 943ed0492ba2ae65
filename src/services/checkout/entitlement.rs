use crate::{
    entities::{
        purchase_record::{self, PaymentStatus},
        subscription_log, user_profile,
    },
    errors::ServiceError,
    models::{BillingCycle, Entitlement, Order, PurchasableItem},
};
use chrono::{DateTime, Months, Utc};
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, Set,
};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Grants the purchased benefit and records the transaction.
///
/// Grants are idempotent per `(user_id, payment_reference)`: the purchase
/// record insert is the anchor, backed by a unique index, and a duplicate
/// is success, not failure. Called with a reference after gateway
/// verification, or with `None` for zero-price purchases. Zero-price
/// grants have no reference to collide on, so they are keyed on the
/// purchase record id, which is the order's own id.
#[derive(Clone)]
pub struct EntitlementService {
    db: Arc<DatabaseConnection>,
}

impl EntitlementService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self, order), fields(user_id = %order.user_id))]
    pub async fn grant(
        &self,
        order: &Order,
        payment_reference: Option<&str>,
    ) -> Result<Entitlement, ServiceError> {
        // A reload after a successful grant lands here again with the same
        // reference; hand back the already-granted benefit. Without a
        // reference the order id is the dedup key.
        match payment_reference {
            Some(reference) => {
                if let Some(existing) = self.find_record(order.user_id, reference).await? {
                    info!(%reference, "duplicate grant call, returning existing entitlement");
                    return self.rebuild_entitlement(order, &existing).await;
                }
            }
            None => {
                if let Some(existing) = purchase_record::Entity::find_by_id(order.id)
                    .one(&*self.db)
                    .await?
                {
                    info!(order_id = %order.id, "duplicate grant call, returning existing entitlement");
                    return self.rebuild_entitlement(order, &existing).await;
                }
            }
        }

        let record = purchase_record::ActiveModel {
            id: Set(order.id),
            user_id: Set(order.user_id),
            program_id: Set(match &order.item {
                PurchasableItem::Program { program_id } => Some(*program_id),
                _ => None,
            }),
            bundle_id: Set(match &order.item {
                PurchasableItem::Bundle { bundle_id } => Some(*bundle_id),
                _ => None,
            }),
            amount: Set(order.final_price),
            payment_reference: Set(payment_reference.map(str::to_string)),
            payment_status: Set(PaymentStatus::Completed),
            contact_phone: Set(order.contact_phone.clone()),
            created_at: Set(Utc::now()),
        };

        let insert = purchase_record::Entity::insert(record)
            .on_conflict(
                OnConflict::columns([
                    purchase_record::Column::UserId,
                    purchase_record::Column::PaymentReference,
                ])
                .do_nothing()
                .to_owned(),
            )
            .exec(&*self.db)
            .await;

        let record_id = match insert {
            Ok(_) => order.id,
            // Unique-constraint conflict: a concurrent or repeated grant
            // already wrote the record. Treat as success.
            Err(DbErr::RecordNotInserted) => {
                let reference = payment_reference.unwrap_or_default();
                let existing = self
                    .find_record(order.user_id, reference)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::InternalError(
                            "purchase record conflict but no existing row".to_string(),
                        )
                    })?;
                info!(%reference, "concurrent grant detected, returning existing entitlement");
                return self.rebuild_entitlement(order, &existing).await;
            }
            Err(e) => return Err(self.grant_failure(payment_reference, e)),
        };

        match &order.item {
            PurchasableItem::Subscription { plan_id, cycle } => {
                let start = Utc::now();
                let end = add_cycle(start, *cycle)?;

                self.update_subscription_fields(order.user_id, plan_id, end)
                    .await
                    .map_err(|e| self.grant_failure(payment_reference, e))?;

                // The audit log is best-effort: the benefit is already
                // granted, so a failed log write must not tell the user
                // their paid purchase failed.
                let log = subscription_log::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    user_id: Set(order.user_id),
                    plan_id: Set(plan_id.clone()),
                    billing_cycle: Set(cycle.to_string()),
                    amount: Set(order.final_price),
                    payment_reference: Set(payment_reference.map(str::to_string)),
                    start_date: Set(start),
                    end_date: Set(end),
                    created_at: Set(Utc::now()),
                };
                if let Err(e) = log.insert(&*self.db).await {
                    warn!(error = %e, user_id = %order.user_id, "failed to write subscription log");
                }

                info!(plan_id = %plan_id, %end, "subscription extended");
                Ok(Entitlement::SubscriptionExtension {
                    plan_id: plan_id.clone(),
                    start_date: start,
                    end_date: end,
                })
            }
            PurchasableItem::Program { program_id } => {
                info!(%program_id, "program unlocked");
                Ok(Entitlement::ProgramUnlock {
                    program_id: *program_id,
                    purchase_record_id: record_id,
                })
            }
            PurchasableItem::Bundle { bundle_id } => {
                info!(%bundle_id, "bundle unlocked");
                Ok(Entitlement::BundleUnlock {
                    bundle_id: *bundle_id,
                    purchase_record_id: record_id,
                })
            }
        }
    }

    async fn find_record(
        &self,
        user_id: Uuid,
        reference: &str,
    ) -> Result<Option<purchase_record::Model>, ServiceError> {
        Ok(purchase_record::Entity::find()
            .filter(purchase_record::Column::UserId.eq(user_id))
            .filter(purchase_record::Column::PaymentReference.eq(reference))
            .one(&*self.db)
            .await?)
    }

    async fn update_subscription_fields(
        &self,
        user_id: Uuid,
        plan_id: &str,
        end: DateTime<Utc>,
    ) -> Result<(), DbErr> {
        let now = Utc::now();
        match user_profile::Entity::find_by_id(user_id).one(&*self.db).await? {
            Some(profile) => {
                let mut active: user_profile::ActiveModel = profile.into();
                active.subscription_plan = Set(Some(plan_id.to_string()));
                active.subscription_end_date = Set(Some(end));
                active.updated_at = Set(now);
                active.update(&*self.db).await?;
            }
            None => {
                user_profile::ActiveModel {
                    user_id: Set(user_id),
                    subscription_plan: Set(Some(plan_id.to_string())),
                    subscription_end_date: Set(Some(end)),
                    contact_phone: Set(None),
                    updated_at: Set(now),
                }
                .insert(&*self.db)
                .await?;
            }
        }
        Ok(())
    }

    /// Rebuilds the entitlement for a grant that already happened.
    async fn rebuild_entitlement(
        &self,
        order: &Order,
        record: &purchase_record::Model,
    ) -> Result<Entitlement, ServiceError> {
        match &order.item {
            PurchasableItem::Subscription { plan_id, cycle } => {
                let profile = user_profile::Entity::find_by_id(order.user_id)
                    .one(&*self.db)
                    .await?;
                let end = profile
                    .and_then(|p| p.subscription_end_date)
                    .map(Ok)
                    .unwrap_or_else(|| add_cycle(record.created_at, *cycle))?;
                Ok(Entitlement::SubscriptionExtension {
                    plan_id: plan_id.clone(),
                    start_date: record.created_at,
                    end_date: end,
                })
            }
            PurchasableItem::Program { program_id } => Ok(Entitlement::ProgramUnlock {
                program_id: *program_id,
                purchase_record_id: record.id,
            }),
            PurchasableItem::Bundle { bundle_id } => Ok(Entitlement::BundleUnlock {
                bundle_id: *bundle_id,
                purchase_record_id: record.id,
            }),
        }
    }

    /// The user may already have paid; surface the reference so support can
    /// reconcile instead of losing it.
    fn grant_failure(&self, payment_reference: Option<&str>, e: DbErr) -> ServiceError {
        match payment_reference {
            Some(reference) => {
                warn!(error = %e, %reference, "grant step failed after payment");
                ServiceError::EntitlementGrantFailed {
                    reference: reference.to_string(),
                }
            }
            None => ServiceError::DatabaseError(e),
        }
    }
}

fn add_cycle(start: DateTime<Utc>, cycle: BillingCycle) -> Result<DateTime<Utc>, ServiceError> {
    let months = match cycle {
        BillingCycle::Monthly => 1,
        BillingCycle::Yearly => 12,
    };
    start
        .checked_add_months(Months::new(months))
        .ok_or_else(|| ServiceError::InternalError("subscription end date overflow".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema;
    use chrono::Duration;
    use sea_orm::{Database, PaginatorTrait};

    async fn service() -> (EntitlementService, Arc<DatabaseConnection>) {
        let db = Arc::new(Database::connect("sqlite::memory:").await.unwrap());
        schema::ensure_schema(&db).await.unwrap();
        (EntitlementService::new(db.clone()), db)
    }

    fn program_order(user_id: Uuid, program_id: Uuid, price: i64) -> Order {
        Order::new(
            user_id,
            PurchasableItem::Program { program_id },
            "Strength block".to_string(),
            price,
            Some("+15550100".to_string()),
        )
    }

    #[tokio::test]
    async fn program_grant_writes_completed_record() {
        let (service, db) = service().await;
        let user_id = Uuid::new_v4();
        let program_id = Uuid::new_v4();
        let order = program_order(user_id, program_id, 450_000);

        let entitlement = service.grant(&order, Some("REF900")).await.unwrap();
        let record_id = match entitlement {
            Entitlement::ProgramUnlock {
                program_id: granted,
                purchase_record_id,
            } => {
                assert_eq!(granted, program_id);
                purchase_record_id
            }
            other => panic!("unexpected entitlement: {:?}", other),
        };

        let record = purchase_record::Entity::find_by_id(record_id)
            .one(&*db)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.user_id, user_id);
        assert_eq!(record.program_id, Some(program_id));
        assert_eq!(record.bundle_id, None);
        assert_eq!(record.amount, 450_000);
        assert_eq!(record.payment_reference.as_deref(), Some("REF900"));
        assert_eq!(record.payment_status, PaymentStatus::Completed);
    }

    #[tokio::test]
    async fn duplicate_grant_returns_same_entitlement_and_one_record() {
        let (service, db) = service().await;
        let order = program_order(Uuid::new_v4(), Uuid::new_v4(), 99_000);

        let first = service.grant(&order, Some("REF123")).await.unwrap();
        let second = service.grant(&order, Some("REF123")).await.unwrap();
        assert_eq!(first, second);

        let count = purchase_record::Entity::find().count(&*db).await.unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn subscription_grant_updates_profile_log_and_record() {
        let (service, db) = service().await;
        let user_id = Uuid::new_v4();
        let order = Order::new(
            user_id,
            PurchasableItem::Subscription {
                plan_id: "pro".to_string(),
                cycle: BillingCycle::Monthly,
            },
            "PRO subscription (monthly)".to_string(),
            99_000,
            None,
        );

        let entitlement = service.grant(&order, Some("REF321")).await.unwrap();
        let (start, end) = match entitlement {
            Entitlement::SubscriptionExtension {
                plan_id,
                start_date,
                end_date,
            } => {
                assert_eq!(plan_id, "pro");
                (start_date, end_date)
            }
            other => panic!("unexpected entitlement: {:?}", other),
        };
        let expected_end = start.checked_add_months(Months::new(1)).unwrap();
        assert_eq!(end, expected_end);
        assert!(Utc::now() - start < Duration::seconds(5));

        let profile = user_profile::Entity::find_by_id(user_id)
            .one(&*db)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(profile.subscription_plan.as_deref(), Some("pro"));
        assert_eq!(profile.subscription_end_date, Some(end));

        let record = purchase_record::Entity::find()
            .filter(purchase_record::Column::UserId.eq(user_id))
            .one(&*db)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.program_id, None);
        assert_eq!(record.amount, 99_000);

        let log = subscription_log::Entity::find()
            .filter(subscription_log::Column::UserId.eq(user_id))
            .one(&*db)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(log.plan_id, "pro");
        assert_eq!(log.billing_cycle, "monthly");
        assert_eq!(log.end_date, end);
    }

    #[tokio::test]
    async fn yearly_cycle_extends_twelve_months() {
        let start = Utc::now();
        let end = add_cycle(start, BillingCycle::Yearly).unwrap();
        assert_eq!(end, start.checked_add_months(Months::new(12)).unwrap());
    }

    #[tokio::test]
    async fn bundle_grant_keeps_contact_phone_for_fulfillment() {
        let (service, db) = service().await;
        let user_id = Uuid::new_v4();
        let bundle_id = Uuid::new_v4();
        let order = Order::new(
            user_id,
            PurchasableItem::Bundle { bundle_id },
            "Bundle: Full transformation".to_string(),
            800_000,
            Some("+15550177".to_string()),
        );

        let entitlement = service.grant(&order, Some("REF777")).await.unwrap();
        let record_id = match entitlement {
            Entitlement::BundleUnlock {
                bundle_id: granted,
                purchase_record_id,
            } => {
                assert_eq!(granted, bundle_id);
                purchase_record_id
            }
            other => panic!("unexpected entitlement: {:?}", other),
        };

        let record = purchase_record::Entity::find_by_id(record_id)
            .one(&*db)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.bundle_id, Some(bundle_id));
        assert_eq!(record.program_id, None);
        assert_eq!(record.contact_phone.as_deref(), Some("+15550177"));
    }

    #[tokio::test]
    async fn free_grant_writes_record_without_reference() {
        let (service, db) = service().await;
        let order = program_order(Uuid::new_v4(), Uuid::new_v4(), 0);

        service.grant(&order, None).await.unwrap();

        let record = purchase_record::Entity::find().one(&*db).await.unwrap().unwrap();
        assert_eq!(record.amount, 0);
        assert_eq!(record.payment_reference, None);
        assert_eq!(record.payment_status, PaymentStatus::Completed);
    }

    #[tokio::test]
    async fn free_grant_is_idempotent_per_order() {
        let (service, db) = service().await;
        let order = program_order(Uuid::new_v4(), Uuid::new_v4(), 0);

        // NULL references never collide on the unique index, so the
        // order-id key is what stops a retried free grant from writing twice
        let first = service.grant(&order, None).await.unwrap();
        let second = service.grant(&order, None).await.unwrap();
        assert_eq!(first, second);

        let count = purchase_record::Entity::find().count(&*db).await.unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn separate_free_orders_each_write_a_record() {
        let (service, db) = service().await;
        let user_id = Uuid::new_v4();
        let program_id = Uuid::new_v4();

        service
            .grant(&program_order(user_id, program_id, 0), None)
            .await
            .unwrap();
        service
            .grant(&program_order(user_id, program_id, 0), None)
            .await
            .unwrap();

        let count = purchase_record::Entity::find().count(&*db).await.unwrap();
        assert_eq!(count, 2);
    }
}
