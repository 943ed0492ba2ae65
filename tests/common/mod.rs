//! Shared test harness: an in-process app over sqlite with a stub gateway.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use chrono::Utc;
use pulsefit_api::{
    config::{AppConfig, GatewayConfig},
    entities::{bundle, discount_code, plan, program},
    errors::ServiceError,
    events::{self, EventSender},
    handlers,
    models::VerificationResult,
    schema,
    services::{
        catalog::CatalogService,
        checkout::{
            CheckoutFlow, DiscountValidator, EntitlementService, OrderBuilder, PaymentGateway,
            PaymentRequest, SqlSessionStore,
        },
    },
    AppState,
};
use sea_orm::{
    ActiveModelTrait, ConnectOptions, Database, DatabaseConnection, Set,
};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

pub const CALLBACK_URL: &str = "http://testserver/api/v1/payment-callback";

/// Records every gateway interaction so tests can assert on exact amounts.
pub struct StubGateway {
    pub authority: String,
    pub reference: String,
    /// When set, verify reports this failure code instead of success
    pub fail_verify_code: Option<i64>,
    pub payment_requests: Mutex<Vec<PaymentRequest>>,
    /// (authority, amount) pairs in call order
    pub verify_calls: Mutex<Vec<(String, i64)>>,
}

impl StubGateway {
    pub fn new() -> Self {
        Self {
            authority: "A-TEST-0001".to_string(),
            reference: "REF123".to_string(),
            fail_verify_code: None,
            payment_requests: Mutex::new(Vec::new()),
            verify_calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_verify(code: i64) -> Self {
        Self {
            fail_verify_code: Some(code),
            ..Self::new()
        }
    }
}

#[async_trait]
impl PaymentGateway for StubGateway {
    async fn request_payment(&self, request: &PaymentRequest) -> Result<String, ServiceError> {
        self.payment_requests.lock().unwrap().push(request.clone());
        Ok(self.authority.clone())
    }

    async fn verify(
        &self,
        authority: &str,
        amount: i64,
    ) -> Result<VerificationResult, ServiceError> {
        let mut calls = self.verify_calls.lock().unwrap();
        let repeat = calls.iter().any(|(a, _)| a == authority);
        calls.push((authority.to_string(), amount));

        if let Some(code) = self.fail_verify_code {
            return Ok(VerificationResult::Failed {
                code: Some(code),
                message: format!("gateway returned code {}", code),
            });
        }
        Ok(VerificationResult::Verified {
            reference_id: self.reference.clone(),
            // a second verify of the same transaction is the gateway's
            // already-verified signal
            already_verified: repeat,
        })
    }

    fn redirect_url(&self, authority: &str) -> String {
        format!("https://gateway.test/pg/StartPay/{}", authority)
    }
}

pub struct TestApp {
    pub db: Arc<DatabaseConnection>,
    pub gateway: Arc<StubGateway>,
    pub router: Router,
}

fn test_config() -> AppConfig {
    AppConfig {
        database_url: "sqlite::memory:".to_string(),
        host: "127.0.0.1".to_string(),
        port: 0,
        environment: "test".to_string(),
        log_level: "debug".to_string(),
        log_json: false,
        auto_migrate: true,
        db_max_connections: 1,
        db_min_connections: 1,
        gateway: GatewayConfig {
            merchant_id: "merchant-test".to_string(),
            api_base_url: "https://gateway.test/api/gateway".to_string(),
            start_pay_base_url: "https://gateway.test/pg/StartPay".to_string(),
            callback_url: CALLBACK_URL.to_string(),
            timeout_secs: 5,
        },
    }
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with_gateway(StubGateway::new()).await
}

pub async fn spawn_app_with_gateway(gateway: StubGateway) -> TestApp {
    // one connection keeps the whole suite on a single in-memory database
    let mut opts = ConnectOptions::new("sqlite::memory:".to_string());
    opts.max_connections(1).min_connections(1);
    let db = Arc::new(Database::connect(opts).await.unwrap());
    schema::ensure_schema(&db).await.unwrap();

    let (event_tx, event_rx) = mpsc::channel(64);
    tokio::spawn(events::process_events(event_rx));
    let event_sender = EventSender::new(event_tx);

    let catalog = Arc::new(CatalogService::new(db.clone()));
    let gateway = Arc::new(gateway);
    let checkout = Arc::new(CheckoutFlow::new(
        OrderBuilder::new(catalog.clone()),
        DiscountValidator::new(catalog.clone()),
        Arc::new(SqlSessionStore::new(db.clone())),
        gateway.clone(),
        EntitlementService::new(db.clone()),
        event_sender.clone(),
        CALLBACK_URL.to_string(),
    ));

    let state = AppState {
        db: db.clone(),
        config: Arc::new(test_config()),
        event_sender,
        checkout,
        catalog,
    };

    TestApp {
        db,
        gateway,
        router: handlers::router(state),
    }
}

impl TestApp {
    async fn send(
        &self,
        method: &str,
        uri: &str,
        user_id: Option<Uuid>,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user_id) = user_id {
            builder = builder.header("x-user-id", user_id.to_string());
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&json).unwrap()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    pub async fn get(&self, uri: &str, user_id: Uuid) -> (StatusCode, serde_json::Value) {
        self.send("GET", uri, Some(user_id), None).await
    }

    pub async fn post(
        &self,
        uri: &str,
        user_id: Uuid,
        body: serde_json::Value,
    ) -> (StatusCode, serde_json::Value) {
        self.send("POST", uri, Some(user_id), Some(body)).await
    }

    pub async fn post_empty(&self, uri: &str, user_id: Uuid) -> (StatusCode, serde_json::Value) {
        self.send("POST", uri, Some(user_id), None).await
    }

    pub async fn delete(&self, uri: &str, user_id: Uuid) -> (StatusCode, serde_json::Value) {
        self.send("DELETE", uri, Some(user_id), None).await
    }

    pub async fn send_anonymous(&self, method: &str, uri: &str) -> StatusCode {
        self.send(method, uri, None, None).await.0
    }

    pub async fn callback(
        &self,
        user_id: Uuid,
        authority: &str,
        status: &str,
    ) -> (StatusCode, serde_json::Value) {
        self.get(
            &format!(
                "/api/v1/payment-callback?Authority={}&Status={}",
                authority, status
            ),
            user_id,
        )
        .await
    }

    pub async fn seed_plan(&self, id: &str, monthly: Option<i64>, yearly: Option<i64>) {
        plan::ActiveModel {
            id: Set(id.to_string()),
            name: Set(id.to_uppercase()),
            monthly_price: Set(monthly),
            yearly_price: Set(yearly),
            is_active: Set(true),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await
        .unwrap();
    }

    pub async fn seed_program(&self, title: &str, price: i64) -> Uuid {
        let id = Uuid::new_v4();
        program::ActiveModel {
            id: Set(id),
            title: Set(title.to_string()),
            price: Set(price),
            is_active: Set(true),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await
        .unwrap();
        id
    }

    pub async fn seed_bundle(&self, title: &str, price: i64) -> Uuid {
        let id = Uuid::new_v4();
        bundle::ActiveModel {
            id: Set(id),
            title: Set(title.to_string()),
            description: Set(Some(format!("{} bundle", title))),
            price: Set(price),
            is_active: Set(true),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await
        .unwrap();
        id
    }

    pub async fn seed_percentage_code(&self, code: &str, percent: i64) {
        self.seed_code(code, discount_code::DiscountType::Percentage, percent, None)
            .await;
    }

    pub async fn seed_code(
        &self,
        code: &str,
        discount_type: discount_code::DiscountType,
        value: i64,
        scope_program_id: Option<Uuid>,
    ) {
        discount_code::ActiveModel {
            code: Set(code.to_string()),
            is_active: Set(true),
            discount_type: Set(discount_type),
            discount_value: Set(value),
            scope_program_id: Set(scope_program_id),
            scope_bundle_id: Set(None),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await
        .unwrap();
    }
}
