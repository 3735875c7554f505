//! Application startup and lifecycle management.

use crate::config::{SettlementConfig, StorageBackend};
use crate::handlers;
use crate::services::lock::InProcessTableLocks;
use crate::services::{MemoryStore, SettlementBackends, SettlementDb, SettlementEngine};
use axum::{
    http::{HeaderValue, Method},
    middleware,
    routing::{get, post},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::{metrics_middleware, request_id_middleware};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: SettlementConfig,
    pub engine: Arc<SettlementEngine>,
}

pub fn router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.cors_origins);

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics))
        .route(
            "/api/restaurants/:restaurant_id/tables/:table/settle",
            post(handlers::settle_table),
        )
        .route(
            "/api/restaurants/:restaurant_id/tables/:table/bill",
            get(handlers::preview_bill),
        )
        .route(
            "/api/restaurants/:restaurant_id/tables/:table/orders",
            get(handlers::table_orders),
        )
        .route(
            "/api/restaurants/:restaurant_id/order-history",
            get(handlers::order_history),
        )
        .route(
            "/api/restaurants/:restaurant_id/reconciliation",
            get(handlers::list_reconciliation_tasks),
        )
        .route(
            "/api/restaurants/:restaurant_id/reconciliation/:task_id/resolve",
            post(handlers::resolve_reconciliation_task),
        )
        .route("/api/clearTable/:table", post(handlers::clear_table))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(cors)
        .with_state(state)
}

/// No configured origins means any origin, matching the ordering frontends'
/// development setup.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.is_empty() {
        AllowOrigin::from(Any)
    } else {
        let parsed: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|o| match o.parse::<HeaderValue>() {
                Ok(value) => Some(value),
                Err(e) => {
                    tracing::error!("Invalid CORS origin '{}': {}. Skipping.", o, e);
                    None
                }
            })
            .collect();
        AllowOrigin::list(parsed)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
}

/// Application container for managing server lifecycle.
pub struct Application {
    http_port: u16,
    http_listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application with the storage backend named in the config.
    pub async fn build(config: SettlementConfig) -> Result<Self, AppError> {
        let backends = match config.storage {
            StorageBackend::Mongo => {
                let db = SettlementDb::connect(&config.mongodb.uri, &config.mongodb.database)
                    .await
                    .map_err(|e| {
                        tracing::error!("Failed to connect to MongoDB: {}", e);
                        e
                    })?;

                db.initialize_indexes().await.map_err(|e| {
                    tracing::error!("Failed to initialize database indexes: {}", e);
                    e
                })?;

                let db = Arc::new(db);
                SettlementBackends {
                    orders: db.clone(),
                    catalog: db.clone(),
                    archive: db.clone(),
                    reconciliation: db,
                    locks: Arc::new(InProcessTableLocks::new()),
                }
            }
            StorageBackend::Memory => {
                tracing::warn!("Using in-memory storage; data is lost on restart");
                memory_backends(MemoryStore::new())
            }
        };

        Self::build_with_backends(config, backends).await
    }

    /// Build the application on top of explicit backends.
    pub async fn build_with_backends(
        config: SettlementConfig,
        backends: SettlementBackends,
    ) -> Result<Self, AppError> {
        let engine = Arc::new(SettlementEngine::new(
            backends,
            config.settlement.clone(),
        ));

        let state = AppState {
            config: config.clone(),
            engine,
        };

        // Port 0 = random port for testing
        let http_addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let http_listener = TcpListener::bind(http_addr).await.map_err(|e| {
            tracing::error!("Failed to bind HTTP listener to {}: {}", http_addr, e);
            AppError::from(e)
        })?;
        let http_port = http_listener.local_addr()?.port();

        tracing::info!("Settlement service: HTTP on port {}", http_port);

        Ok(Self {
            http_port,
            http_listener,
            state,
        })
    }

    /// Get the HTTP port the server is listening on.
    pub fn http_port(&self) -> u16 {
        self.http_port
    }

    pub fn engine(&self) -> Arc<SettlementEngine> {
        Arc::clone(&self.state.engine)
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let app = router(self.state);
        axum::serve(self.http_listener, app).await.map_err(|e| {
            tracing::error!("HTTP server error: {}", e);
            std::io::Error::other(format!("HTTP server error: {}", e))
        })
    }
}

/// Every store seam served by one in-memory store.
pub fn memory_backends(store: MemoryStore) -> SettlementBackends {
    let store = Arc::new(store);
    SettlementBackends {
        orders: store.clone(),
        catalog: store.clone(),
        archive: store.clone(),
        reconciliation: store,
        locks: Arc::new(InProcessTableLocks::new()),
    }
}
