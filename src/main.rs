//! Wholesale Storefront - cart and order service

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wholesale_storefront::api::{self, AppState};
use wholesale_storefront::config::Config;
use wholesale_storefront::domain::value_objects::OrderNumberGenerator;
use wholesale_storefront::services::{CartStore, CheckoutPolicy, EventPublisher, OrderService};
use wholesale_storefront::store::postgres::PgStore;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "wholesale_storefront=info,tower_http=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let db = PgPoolOptions::new().max_connections(config.db_max_connections).connect(&config.database_url).await?;
    sqlx::migrate!("./migrations").run(&db).await?;

    let nats = match &config.nats_url {
        Some(url) => match async_nats::connect(url.as_str()).await {
            Ok(client) => Some(client),
            Err(e) => {
                tracing::warn!(error = %e, "NATS unavailable, domain events will only be logged");
                None
            }
        },
        None => None,
    };
    let publisher = EventPublisher::new(nats);

    let store = Arc::new(PgStore::new(db));
    let policy = CheckoutPolicy { flat_shipping_cost: config.flat_shipping_cost, store_timeout: config.store_timeout };
    let state = AppState {
        cart_store: CartStore::new(store.clone(), store.clone(), publisher.clone()),
        orders: OrderService::new(
            store.clone(),
            store.clone(),
            Arc::new(OrderNumberGenerator::new(config.order_number_prefix.clone())),
            publisher,
            policy,
        ),
        catalog: store.clone(),
        identities: store,
        access_mode: config.access_mode,
    };

    let app = api::router(state).layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(CorsLayer::permissive()));

    tracing::info!(port = config.port, access_mode = %config.access_mode, "wholesale storefront listening");
    axum::serve(tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?, app).await?;
    Ok(())
}
