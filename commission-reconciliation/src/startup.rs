//! Application startup and lifecycle management.

use crate::config::{ReconciliationConfig, StoreConfig};
use crate::engine::{BalanceCalculator, BalanceConfig, Matcher, MatcherConfig, VoidService};
use crate::handlers;
use crate::services::{get_metrics, init_metrics, InMemoryStore, PgTransactionStore, TransactionStore};
use axum::{
    extract::State,
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use service_core::error::AppError;
use service_core::middleware::metrics::metrics_middleware;
use service_core::middleware::tracing::request_id_middleware;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ReconciliationConfig,
    pub store: Arc<dyn TransactionStore>,
}

impl AppState {
    pub fn new(config: ReconciliationConfig, store: Arc<dyn TransactionStore>) -> Self {
        Self { config, store }
    }

    pub fn balances(&self) -> BalanceCalculator {
        BalanceCalculator::new(BalanceConfig {
            known_total: self.config.reconciliation.known_portfolio_total,
            settled_tolerance: self.config.reconciliation.settled_tolerance,
        })
    }

    pub fn matcher(&self) -> Matcher {
        Matcher::new(
            MatcherConfig {
                fuzzy_tolerance_pct: self.config.reconciliation.fuzzy_tolerance_pct,
                settled_tolerance: self.config.reconciliation.settled_tolerance,
            },
            self.balances(),
        )
    }

    pub fn void_service(&self) -> VoidService {
        VoidService::new(self.store.clone())
    }
}

/// Health check endpoint for Docker/K8s liveness probes.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.health_check().await {
        Ok(_) => {
            tracing::debug!("Health check passed");
            (
                StatusCode::OK,
                Json(json!({
                    "status": "ok",
                    "service": state.config.service_name,
                    "version": state.config.service_version
                })),
            )
        }
        Err(e) => {
            tracing::warn!(error = %e, "Health check failed - store unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unhealthy",
                    "service": state.config.service_name,
                    "error": e.to_string()
                })),
            )
        }
    }
}

/// Readiness check endpoint for K8s readiness probes.
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.health_check().await {
        Ok(_) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

/// Metrics endpoint for Prometheus scraping.
async fn metrics_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        get_metrics(),
    )
}

/// Full HTTP surface over the given state.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics_handler))
        .route(
            "/reconciliations",
            get(handlers::list_reconciliations).post(handlers::reconcile_statement),
        )
        .route(
            "/reconciliations/:reconciliation_id/void",
            post(handlers::void_reconciliation),
        )
        .route("/transactions/outstanding", get(handlers::list_outstanding))
        .route(
            "/transactions/:transaction_id/void",
            post(handlers::void_transaction),
        )
        .route(
            "/transactions/:transaction_id/balance",
            get(handlers::get_balance),
        )
        .route(
            "/transactions/:transaction_id/ledger",
            get(handlers::get_ledger),
        )
        .route("/portfolio/summary", get(handlers::portfolio_summary))
        .route("/audit", get(handlers::audit))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(request_id_middleware))
        .with_state(state)
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application with the given configuration, running
    /// migrations when backed by Postgres.
    pub async fn build(config: ReconciliationConfig) -> Result<Self, AppError> {
        init_metrics();

        let store: Arc<dyn TransactionStore> = match &config.store {
            StoreConfig::Postgres(db) => {
                let store =
                    PgTransactionStore::new(&db.url, db.max_connections, db.min_connections)
                        .await
                        .map_err(|e| {
                            tracing::error!(error = %e, "Failed to connect to PostgreSQL");
                            e
                        })?;
                store.run_migrations().await.map_err(|e| {
                    tracing::error!(error = %e, "Failed to run migrations");
                    e
                })?;
                Arc::new(store)
            }
            StoreConfig::Memory => {
                tracing::warn!("Using in-memory transaction store; data is not persisted");
                Arc::new(InMemoryStore::new())
            }
        };

        Self::with_store(config, store).await
    }

    /// Build around an existing store.
    pub async fn with_store(
        config: ReconciliationConfig,
        store: Arc<dyn TransactionStore>,
    ) -> Result<Self, AppError> {
        init_metrics();

        let addr: SocketAddr = format!("{}:{}", config.common.host, config.common.port)
            .parse()
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!("Invalid bind address: {}", e)))?;
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!(error = %e, addr = %addr, "Failed to bind HTTP listener");
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(port = port, "Commission reconciliation listener bound");

        Ok(Self {
            port,
            listener,
            state: AppState::new(config, store),
        })
    }

    /// Get the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let router = build_router(self.state);

        tracing::info!(
            service = "commission-reconciliation",
            version = env!("CARGO_PKG_VERSION"),
            port = self.port,
            "Service ready to accept connections"
        );

        axum::serve(self.listener, router).await.map_err(|e| {
            tracing::error!(error = %e, "HTTP server error");
            std::io::Error::other(format!("HTTP server error: {}", e))
        })
    }
}
