use crate::{
    entities::{bundle, discount_code, plan, program},
    errors::ServiceError,
};
use sea_orm::{DatabaseConnection, EntityTrait};
use std::sync::Arc;
use uuid::Uuid;

/// Read-only access to the product catalog: plans, programs, bundles and
/// discount codes. The checkout flow never writes through this service.
#[derive(Clone)]
pub struct CatalogService {
    db: Arc<DatabaseConnection>,
}

impl CatalogService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn get_plan(&self, plan_id: &str) -> Result<Option<plan::Model>, ServiceError> {
        Ok(plan::Entity::find_by_id(plan_id.to_string())
            .one(&*self.db)
            .await?)
    }

    pub async fn get_program(
        &self,
        program_id: Uuid,
    ) -> Result<Option<program::Model>, ServiceError> {
        Ok(program::Entity::find_by_id(program_id).one(&*self.db).await?)
    }

    pub async fn get_bundle(&self, bundle_id: Uuid) -> Result<Option<bundle::Model>, ServiceError> {
        Ok(bundle::Entity::find_by_id(bundle_id).one(&*self.db).await?)
    }

    pub async fn get_discount_code(
        &self,
        code: &str,
    ) -> Result<Option<discount_code::Model>, ServiceError> {
        Ok(discount_code::Entity::find_by_id(code.to_string())
            .one(&*self.db)
            .await?)
    }
}
