use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
pub enum DiscountType {
    #[sea_orm(string_value = "percentage")]
    Percentage,
    #[sea_orm(string_value = "fixed")]
    Fixed,
}

/// A discount code, optionally scoped to one program or one bundle.
///
/// An unscoped code applies to any item; a scoped code only to the item it
/// names. At most one scope column is set per row.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "discount_codes")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub code: String,

    pub is_active: bool,
    pub discount_type: DiscountType,
    /// Percent (0-100) for percentage codes, amount in the smallest
    /// currency unit for fixed codes
    pub discount_value: i64,
    #[sea_orm(column_type = "Uuid", nullable)]
    pub scope_program_id: Option<Uuid>,
    #[sea_orm(column_type = "Uuid", nullable)]
    pub scope_bundle_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
