pub mod config;
pub mod dispatch;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod observability;
pub mod server;

use std::time::Duration;

use mimic_db_bigquery::BigQueryOptions;
use mimic_db_memory::MemoryOptions;
use mimic_warehouse::{DynWarehouse, WarehouseError};

pub use config::{AppConfig, WarehouseBackend, WarehouseConfig};
pub use error::ApiError;
pub use observability::init_tracing;
pub use server::{AppState, MimicServer, ServerBuilder, build_app, build_app_with_warehouse};

/// Create the warehouse client selected by configuration.
///
/// ## Backends
///
/// - **memory**: in-process engine, empty at startup; jobs run on detached tasks
/// - **bigquery**: BigQuery REST API at `warehouse.bigquery.endpoint`
pub fn create_warehouse(config: &WarehouseConfig) -> Result<DynWarehouse, WarehouseError> {
    match config.backend {
        WarehouseBackend::Memory => {
            tracing::info!(
                project_id = %config.project_id,
                execution_delay_ms = config.memory.execution_delay_ms,
                "Using in-memory warehouse"
            );
            Ok(mimic_db_memory::create_warehouse(MemoryOptions {
                project_id: config.project_id.clone(),
                location: config.location.clone(),
                execution_delay: Duration::from_millis(config.memory.execution_delay_ms),
                job_retention: Duration::from_secs(config.memory.job_retention_secs),
            }))
        }
        WarehouseBackend::Bigquery => {
            if config.bigquery.access_token.is_none() {
                tracing::warn!("BigQuery access token not configured; requests are unauthenticated");
            }
            tracing::info!(
                project_id = %config.project_id,
                endpoint = %config.bigquery.endpoint,
                "Using BigQuery warehouse"
            );
            mimic_db_bigquery::create_warehouse(BigQueryOptions {
                endpoint: config.bigquery.endpoint.clone(),
                project_id: config.project_id.clone(),
                access_token: config.bigquery.access_token.clone(),
                request_timeout: Duration::from_millis(config.bigquery.request_timeout_ms),
            })
        }
    }
}
