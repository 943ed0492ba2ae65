use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
pub enum PaymentStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "completed")]
    Completed,
    #[sea_orm(string_value = "failed")]
    Failed,
}

/// Durable record of one completed purchase.
///
/// `(user_id, payment_reference)` carries a unique index (see
/// `crate::schema`); that constraint is the idempotency primitive for
/// entitlement grants. The record id is the originating order's id, which
/// keys zero-price grants whose NULL reference never collides on the
/// index. Subscription purchases have neither a program nor a bundle id;
/// bundle purchases keep the contact phone for fulfillment.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "purchase_records")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false, column_type = "Uuid")]
    pub id: Uuid,

    #[sea_orm(column_type = "Uuid")]
    pub user_id: Uuid,

    #[sea_orm(column_type = "Uuid", nullable)]
    pub program_id: Option<Uuid>,

    #[sea_orm(column_type = "Uuid", nullable)]
    pub bundle_id: Option<Uuid>,

    /// Amount actually paid, in the smallest currency unit
    pub amount: i64,

    /// Gateway reference id; absent for zero-price purchases
    pub payment_reference: Option<String>,

    pub payment_status: PaymentStatus,
    pub contact_phone: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
