use crate::{
    entities::checkout_session,
    errors::ServiceError,
    models::Order,
};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use sea_orm::sea_query::OnConflict;
use sea_orm::{DatabaseConnection, EntityTrait, Set};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Durable single-slot persistence for the in-flight order.
///
/// The gateway redirect leaves and re-enters the application as a fresh
/// page load, so the order must be re-presented from storage on return;
/// the gateway's authority token is the only correlation the server sees
/// otherwise. One slot per user: saving while an order is in flight
/// overwrites it, and the superseded order is simply inert.
#[async_trait]
pub trait CheckoutSessionStore: Send + Sync {
    async fn save(&self, order: &Order) -> Result<(), ServiceError>;
    async fn load(&self, user_id: Uuid) -> Result<Option<Order>, ServiceError>;
    async fn clear(&self, user_id: Uuid) -> Result<(), ServiceError>;
}

/// Session store backed by the `checkout_sessions` table.
#[derive(Clone)]
pub struct SqlSessionStore {
    db: Arc<DatabaseConnection>,
}

impl SqlSessionStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CheckoutSessionStore for SqlSessionStore {
    async fn save(&self, order: &Order) -> Result<(), ServiceError> {
        let payload = serde_json::to_value(order)
            .map_err(|e| ServiceError::InternalError(format!("serialize order: {}", e)))?;

        let model = checkout_session::ActiveModel {
            user_id: Set(order.user_id),
            payload: Set(payload),
            updated_at: Set(Utc::now()),
        };

        checkout_session::Entity::insert(model)
            .on_conflict(
                OnConflict::column(checkout_session::Column::UserId)
                    .update_columns([
                        checkout_session::Column::Payload,
                        checkout_session::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec(&*self.db)
            .await?;

        debug!(user_id = %order.user_id, state = %order.state, "checkout session saved");
        Ok(())
    }

    async fn load(&self, user_id: Uuid) -> Result<Option<Order>, ServiceError> {
        let row = checkout_session::Entity::find_by_id(user_id)
            .one(&*self.db)
            .await?;
        match row {
            Some(row) => {
                let order: Order = serde_json::from_value(row.payload)
                    .map_err(|e| ServiceError::InternalError(format!("decode order: {}", e)))?;
                Ok(Some(order))
            }
            None => Ok(None),
        }
    }

    async fn clear(&self, user_id: Uuid) -> Result<(), ServiceError> {
        checkout_session::Entity::delete_by_id(user_id)
            .exec(&*self.db)
            .await?;
        debug!(%user_id, "checkout session cleared");
        Ok(())
    }
}

/// In-memory store for tests and single-process development runs.
#[derive(Default)]
pub struct InMemorySessionStore {
    slots: DashMap<Uuid, Order>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckoutSessionStore for InMemorySessionStore {
    async fn save(&self, order: &Order) -> Result<(), ServiceError> {
        self.slots.insert(order.user_id, order.clone());
        Ok(())
    }

    async fn load(&self, user_id: Uuid) -> Result<Option<Order>, ServiceError> {
        Ok(self.slots.get(&user_id).map(|entry| entry.clone()))
    }

    async fn clear(&self, user_id: Uuid) -> Result<(), ServiceError> {
        self.slots.remove(&user_id);
        Ok(())
    }
}
