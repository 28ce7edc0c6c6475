use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    Router, middleware,
    routing::{get, post, put},
};
use mimic_query::{
    DatasetRef, ExecutorSettings, JobResultRedeemer, QueryExecutor, TemplateRegistry,
};
use mimic_warehouse::DynWarehouse;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

use crate::{config::AppConfig, create_warehouse, handlers, middleware as app_middleware};

/// Shared, immutable request state.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<TemplateRegistry>,
    pub executor: QueryExecutor,
    pub redeemer: JobResultRedeemer,
    pub redeem_timeout: Duration,
}

impl AppState {
    /// Wires the query layer around an existing warehouse client.
    pub fn new(cfg: &AppConfig, warehouse: DynWarehouse) -> anyhow::Result<Self> {
        let registry = TemplateRegistry::new(DatasetRef::new(
            &cfg.warehouse.project_id,
            &cfg.warehouse.dataset_id,
        ))?;
        let executor = QueryExecutor::new(
            warehouse.clone(),
            ExecutorSettings {
                location: cfg.warehouse.location.clone(),
                write_poll_interval: cfg.write_poll_interval(),
            },
        );
        Ok(Self {
            registry: Arc::new(registry),
            executor,
            redeemer: JobResultRedeemer::new(warehouse),
            redeem_timeout: cfg.redeem_timeout(),
        })
    }
}

pub struct MimicServer {
    addr: SocketAddr,
    app: Router,
}

/// Builds the application with the warehouse selected by `cfg`.
pub async fn build_app(cfg: &AppConfig) -> anyhow::Result<Router> {
    let warehouse = create_warehouse(&cfg.warehouse)?;
    build_app_with_warehouse(cfg, warehouse)
}

pub fn build_app_with_warehouse(cfg: &AppConfig, warehouse: DynWarehouse) -> anyhow::Result<Router> {
    let state = AppState::new(cfg, warehouse)?;
    Ok(build_router(state, cfg.server.body_limit_bytes))
}

pub fn build_router(state: AppState, body_limit: usize) -> Router {
    Router::new()
        // Health
        .route("/healthz", get(handlers::healthz))
        // Asynchronous reads
        .route("/", get(handlers::root))
        .route("/results", get(handlers::results))
        .route("/questions", get(handlers::questions))
        // Record writes
        .route("/rest/user", post(handlers::create_patient))
        .route(
            "/rest/user/{subject_id}",
            put(handlers::update_patient).delete(handlers::delete_patient),
        )
        .route("/rest/admissions", post(handlers::create_admission))
        .route("/rest/admissions/{hadm_id}", put(handlers::update_admission))
        .route("/rest/questions", post(handlers::create_question))
        .route("/rest/answers", post(handlers::create_answer))
        .with_state(state)
        // Middleware stack (inner to outer: cors -> compression -> trace -> request id -> body limit)
        .layer(CorsLayer::permissive())
        .layer(CompressionLayer::new())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    use tracing::field::Empty;
                    let req_id = req
                        .extensions()
                        .get::<axum::http::HeaderValue>()
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("")
                        .to_string();
                    tracing::info_span!(
                        "http.request",
                        http.method = %req.method(),
                        http.target = %req.uri(),
                        http.status_code = Empty,
                        request_id = %req_id
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>, latency: Duration, span: &tracing::Span| {
                        span.record(
                            "http.status_code",
                            tracing::field::display(res.status().as_u16()),
                        );
                        tracing::info!(
                            http.status = %res.status().as_u16(),
                            elapsed_ms = %latency.as_millis(),
                            "request handled"
                        );
                    },
                ),
        )
        .layer(middleware::from_fn(app_middleware::request_id))
        .layer(axum::extract::DefaultBodyLimit::max(body_limit))
}

pub struct ServerBuilder {
    addr: SocketAddr,
    config: AppConfig,
    warehouse: Option<DynWarehouse>,
}

impl ServerBuilder {
    pub fn new() -> Self {
        let cfg = AppConfig::default();
        Self {
            addr: cfg.addr(),
            config: cfg,
            warehouse: None,
        }
    }

    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.addr = cfg.addr();
        self.config = cfg;
        self
    }

    /// Uses `warehouse` instead of the backend named in the configuration.
    pub fn with_warehouse(mut self, warehouse: DynWarehouse) -> Self {
        self.warehouse = Some(warehouse);
        self
    }

    pub async fn build(self) -> anyhow::Result<MimicServer> {
        let app = match self.warehouse {
            Some(warehouse) => build_app_with_warehouse(&self.config, warehouse)?,
            None => build_app(&self.config).await?,
        };

        Ok(MimicServer {
            addr: self.addr,
            app,
        })
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MimicServer {
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);
        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        Ok(())
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
