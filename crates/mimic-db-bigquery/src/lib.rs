//! BigQuery backend for the MIMIC record service.
//!
//! Implements `WarehouseClient` on top of the BigQuery REST v2 API:
//! `jobs.insert` for submission, `jobs.get` for job inspection and
//! `jobs.getQueryResults` for bounded waits and result paging.

mod client;
mod wire;

pub use client::{BigQueryClient, BigQueryOptions, DEFAULT_ENDPOINT};

/// Creates a shareable BigQuery-backed warehouse.
///
/// # Errors
///
/// Returns an error if the underlying HTTP client cannot be built.
pub fn create_warehouse(
    options: BigQueryOptions,
) -> Result<mimic_warehouse::DynWarehouse, mimic_warehouse::WarehouseError> {
    Ok(std::sync::Arc::new(BigQueryClient::new(options)?))
}
