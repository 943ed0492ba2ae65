use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Subscription plan with per-cycle pricing.
///
/// Prices are in the smallest currency unit. A `None` price means the plan
/// is not offered on that billing cycle.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "plans")]
pub struct Model {
    /// Plan slug, e.g. "pro"
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    pub name: String,
    pub monthly_price: Option<i64>,
    pub yearly_price: Option<i64>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
