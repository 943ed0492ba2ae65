//! PulseFit checkout and entitlement activation backend.
//!
//! The crate is organised the way a request flows: [`handlers`] expose the
//! HTTP surface, [`services`] hold the checkout state machine and its
//! collaborators, [`entities`] map the database tables, and [`models`]
//! carry the domain types shared between all of them.

pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod models;
pub mod openapi;
pub mod schema;
pub mod services;

use crate::config::AppConfig;
use crate::events::EventSender;
use crate::services::catalog::CatalogService;
use crate::services::checkout::CheckoutFlow;
use sea_orm::DatabaseConnection;
use std::sync::Arc;

/// Shared application state injected into every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<AppConfig>,
    pub event_sender: EventSender,
    pub checkout: Arc<CheckoutFlow>,
    pub catalog: Arc<CatalogService>,
}
