use crate::{
    entities::discount_code::{self, DiscountType},
    errors::ServiceError,
    models::{Order, OrderState, PurchasableItem},
    services::catalog::CatalogService,
};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Validates a discount code against a draft order and applies it.
///
/// Validation only mutates the order; no shared counter is consumed, so a
/// rejected or abandoned code has nothing to roll back.
#[derive(Clone)]
pub struct DiscountValidator {
    catalog: Arc<CatalogService>,
}

/// Discount amount for a code applied to `base_price`, clamped to
/// `0..=base_price`. Percentage discounts round half-up.
pub fn compute_discount_amount(
    discount_type: DiscountType,
    discount_value: i64,
    base_price: i64,
) -> i64 {
    let value = discount_value.max(0);
    let raw = match discount_type {
        DiscountType::Percentage => {
            ((base_price as i128 * value as i128 + 50) / 100) as i64
        }
        DiscountType::Fixed => value,
    };
    raw.clamp(0, base_price)
}

fn scope_matches(code: &discount_code::Model, item: &PurchasableItem) -> bool {
    match (code.scope_program_id, code.scope_bundle_id) {
        (None, None) => true,
        (Some(scope), _) => {
            matches!(item, PurchasableItem::Program { program_id } if *program_id == scope)
        }
        (_, Some(scope)) => {
            matches!(item, PurchasableItem::Bundle { bundle_id } if *bundle_id == scope)
        }
    }
}

impl DiscountValidator {
    pub fn new(catalog: Arc<CatalogService>) -> Self {
        Self { catalog }
    }

    /// Applies `code` to the order. At most one code per order; callers
    /// must [`reset`](Self::reset) first to swap codes.
    #[instrument(skip(self, order), fields(user_id = %order.user_id))]
    pub async fn apply(&self, order: &mut Order, code: &str) -> Result<(), ServiceError> {
        if order.state != OrderState::Draft {
            return Err(ServiceError::InvalidOperation(
                "discounts can only be applied to a draft order".to_string(),
            ));
        }
        if order.discount_code.is_some() {
            return Err(ServiceError::DiscountAlreadyApplied);
        }

        let record = self
            .catalog
            .get_discount_code(code)
            .await?
            .filter(|c| c.is_active)
            .ok_or_else(|| ServiceError::InvalidDiscountCode(code.to_string()))?;

        if !scope_matches(&record, &order.item) {
            return Err(ServiceError::DiscountScopeMismatch {
                code: code.to_string(),
            });
        }

        let amount =
            compute_discount_amount(record.discount_type, record.discount_value, order.base_price);
        order.discount_code = Some(record.code);
        order.discount_amount = amount;
        order.final_price = order.base_price - amount;

        debug!(
            discount_amount = amount,
            final_price = order.final_price,
            "discount applied"
        );
        Ok(())
    }

    /// Removes an applied code, restoring the catalog price.
    pub fn reset(&self, order: &mut Order) -> Result<(), ServiceError> {
        if order.state != OrderState::Draft {
            return Err(ServiceError::InvalidOperation(
                "discounts can only be reset on a draft order".to_string(),
            ));
        }
        order.discount_code = None;
        order.discount_amount = 0;
        order.final_price = order.base_price;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::discount_code;
    use crate::models::{Order, PurchasableItem};
    use crate::schema;
    use chrono::Utc;
    use rstest::rstest;
    use sea_orm::{ActiveModelTrait, Database, DatabaseConnection, Set};
    use uuid::Uuid;

    #[rstest]
    #[case(DiscountType::Percentage, 10, 500_000, 50_000)]
    #[case(DiscountType::Percentage, 0, 500_000, 0)]
    #[case(DiscountType::Percentage, 100, 500_000, 500_000)]
    // 33% of 99: 32.67 rounds to 33
    #[case(DiscountType::Percentage, 33, 99, 33)]
    #[case(DiscountType::Fixed, 20_000, 500_000, 20_000)]
    // fixed discounts clamp to the base price
    #[case(DiscountType::Fixed, 750_000, 500_000, 500_000)]
    #[case(DiscountType::Fixed, 100, 0, 0)]
    fn discount_amount_cases(
        #[case] discount_type: DiscountType,
        #[case] value: i64,
        #[case] base: i64,
        #[case] expected: i64,
    ) {
        assert_eq!(compute_discount_amount(discount_type, value, base), expected);
    }

    #[test]
    fn negative_discount_value_is_treated_as_zero() {
        assert_eq!(
            compute_discount_amount(DiscountType::Fixed, -500, 10_000),
            0
        );
    }

    async fn test_db() -> Arc<DatabaseConnection> {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        schema::ensure_schema(&db).await.unwrap();
        Arc::new(db)
    }

    async fn seed_code(
        db: &DatabaseConnection,
        code: &str,
        active: bool,
        discount_type: DiscountType,
        value: i64,
        scope_program_id: Option<Uuid>,
    ) {
        discount_code::ActiveModel {
            code: Set(code.to_string()),
            is_active: Set(active),
            discount_type: Set(discount_type),
            discount_value: Set(value),
            scope_program_id: Set(scope_program_id),
            scope_bundle_id: Set(None),
            created_at: Set(Utc::now()),
        }
        .insert(db)
        .await
        .unwrap();
    }

    fn program_order(program_id: Uuid, base: i64) -> Order {
        Order::new(
            Uuid::new_v4(),
            PurchasableItem::Program { program_id },
            "Strength block".to_string(),
            base,
            Some("+15550100".to_string()),
        )
    }

    #[tokio::test]
    async fn unscoped_percentage_code_applies() {
        let db = test_db().await;
        seed_code(&db, "SAVE10", true, DiscountType::Percentage, 10, None).await;
        let validator = DiscountValidator::new(Arc::new(CatalogService::new(db)));

        let mut order = program_order(Uuid::new_v4(), 500_000);
        validator.apply(&mut order, "SAVE10").await.unwrap();

        assert_eq!(order.discount_amount, 50_000);
        assert_eq!(order.final_price, 450_000);
        assert_eq!(order.discount_code.as_deref(), Some("SAVE10"));
    }

    #[tokio::test]
    async fn inactive_code_is_invalid() {
        let db = test_db().await;
        seed_code(&db, "EXPIRED", false, DiscountType::Fixed, 1_000, None).await;
        let validator = DiscountValidator::new(Arc::new(CatalogService::new(db)));

        let mut order = program_order(Uuid::new_v4(), 10_000);
        let err = validator.apply(&mut order, "EXPIRED").await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidDiscountCode(_)));
        assert_eq!(order.final_price, 10_000);
    }

    #[tokio::test]
    async fn unknown_code_is_invalid() {
        let db = test_db().await;
        let validator = DiscountValidator::new(Arc::new(CatalogService::new(db)));

        let mut order = program_order(Uuid::new_v4(), 10_000);
        let err = validator.apply(&mut order, "NOPE").await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidDiscountCode(_)));
    }

    #[tokio::test]
    async fn scoped_code_rejects_other_program() {
        let db = test_db().await;
        let program_a = Uuid::new_v4();
        let program_b = Uuid::new_v4();
        seed_code(
            &db,
            "ONLYA",
            true,
            DiscountType::Percentage,
            20,
            Some(program_a),
        )
        .await;
        let validator = DiscountValidator::new(Arc::new(CatalogService::new(db)));

        let mut order_b = program_order(program_b, 100_000);
        let err = validator.apply(&mut order_b, "ONLYA").await.unwrap_err();
        assert!(matches!(err, ServiceError::DiscountScopeMismatch { .. }));

        // the same code applied to the scoped program succeeds
        let mut order_a = program_order(program_a, 100_000);
        validator.apply(&mut order_a, "ONLYA").await.unwrap();
        assert_eq!(order_a.final_price, 80_000);
    }

    #[tokio::test]
    async fn second_code_requires_reset_first() {
        let db = test_db().await;
        seed_code(&db, "FIRST", true, DiscountType::Fixed, 1_000, None).await;
        seed_code(&db, "SECOND", true, DiscountType::Fixed, 2_000, None).await;
        let validator = DiscountValidator::new(Arc::new(CatalogService::new(db)));

        let mut order = program_order(Uuid::new_v4(), 10_000);
        validator.apply(&mut order, "FIRST").await.unwrap();

        let err = validator.apply(&mut order, "SECOND").await.unwrap_err();
        assert!(matches!(err, ServiceError::DiscountAlreadyApplied));

        validator.reset(&mut order).unwrap();
        assert_eq!(order.final_price, 10_000);
        assert!(order.discount_code.is_none());

        validator.apply(&mut order, "SECOND").await.unwrap();
        assert_eq!(order.final_price, 8_000);
    }
}
