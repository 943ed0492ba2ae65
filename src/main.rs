use anyhow::Context;
use pulsefit_api::{
    config, db,
    events::{self, EventSender},
    handlers, openapi, schema,
    services::{
        catalog::CatalogService,
        checkout::{
            CheckoutFlow, DiscountValidator, EntitlementService, HttpPaymentGateway,
            OrderBuilder, SqlSessionStore,
        },
    },
    AppState,
};
use std::{sync::Arc, time::Duration};
use tokio::sync::mpsc;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};
use tracing::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

const EVENT_CHANNEL_CAPACITY: usize = 256;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = config::load_config().context("loading configuration")?;
    config::init_tracing(cfg.log_level(), cfg.log_json);

    let db = Arc::new(
        db::establish_connection_from_app_config(&cfg)
            .await
            .context("connecting to database")?,
    );
    if cfg.auto_migrate {
        schema::ensure_schema(&db)
            .await
            .context("creating missing tables")?;
    }

    let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    tokio::spawn(events::process_events(event_rx));
    let event_sender = EventSender::new(event_tx);

    let catalog = Arc::new(CatalogService::new(db.clone()));
    let gateway = Arc::new(HttpPaymentGateway::new(cfg.gateway.clone())?);
    let sessions = Arc::new(SqlSessionStore::new(db.clone()));
    let checkout = Arc::new(CheckoutFlow::new(
        OrderBuilder::new(catalog.clone()),
        DiscountValidator::new(catalog.clone()),
        sessions,
        gateway,
        EntitlementService::new(db.clone()),
        event_sender.clone(),
        cfg.gateway.callback_url.clone(),
    ));

    let addr = cfg.server_addr();
    let state = AppState {
        db,
        config: Arc::new(cfg),
        event_sender,
        checkout,
        catalog,
    };

    let app = handlers::router(state)
        .merge(
            SwaggerUi::new("/swagger-ui")
                .url("/api-docs/openapi.json", openapi::ApiDoc::openapi()),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!(%addr, "pulsefit-api listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("install sigterm handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received ctrl-c, shutting down"),
        _ = terminate => info!("received sigterm, shutting down"),
    }
}
