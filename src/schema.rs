//! Schema bootstrap for development and test databases.
//!
//! Creates all tables from the SeaORM entity definitions plus the unique
//! index on `(user_id, payment_reference)` that entitlement grants rely on
//! for idempotency. Production deployments manage the schema out of band;
//! this runs when `auto_migrate` is enabled.

use crate::entities;
use crate::errors::ServiceError;
use sea_orm::sea_query::Index;
use sea_orm::{ConnectionTrait, DatabaseConnection, EntityTrait, Schema};
use tracing::info;

pub async fn ensure_schema(db: &DatabaseConnection) -> Result<(), ServiceError> {
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);

    async fn create<E: EntityTrait>(
        db: &DatabaseConnection,
        schema: &Schema,
        entity: E,
    ) -> Result<(), ServiceError> {
        let backend = db.get_database_backend();
        let mut stmt = schema.create_table_from_entity(entity);
        db.execute(backend.build(stmt.if_not_exists())).await?;
        Ok(())
    }

    create(db, &schema, entities::Plan).await?;
    create(db, &schema, entities::Program).await?;
    create(db, &schema, entities::Bundle).await?;
    create(db, &schema, entities::DiscountCode).await?;
    create(db, &schema, entities::UserProfile).await?;
    create(db, &schema, entities::PurchaseRecord).await?;
    create(db, &schema, entities::SubscriptionLog).await?;
    create(db, &schema, entities::CheckoutSession).await?;

    // Idempotency anchor for grants: at most one purchase record per
    // (user, gateway reference). NULL references do not collide, which is
    // what zero-price purchases need.
    let idx = Index::create()
        .name("ux_purchase_records_user_reference")
        .table(entities::PurchaseRecord)
        .col(entities::purchase_record::Column::UserId)
        .col(entities::purchase_record::Column::PaymentReference)
        .unique()
        .if_not_exists()
        .to_owned();
    db.execute(backend.build(&idx)).await?;

    info!("database schema ensured");
    Ok(())
}
