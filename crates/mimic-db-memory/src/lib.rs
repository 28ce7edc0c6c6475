//! In-memory warehouse engine for the MIMIC record service.
//!
//! This crate provides an in-memory implementation of the `WarehouseClient`
//! trait from `mimic-warehouse`. Jobs run on detached tokio tasks, so the
//! submit / wait / redeem protocol behaves like a real analytical warehouse,
//! including jobs that are still running when a caller stops waiting.
//!
//! # Example
//!
//! ```ignore
//! use mimic_db_memory::InMemoryWarehouse;
//! use mimic_warehouse::WarehouseClient;
//!
//! let warehouse = InMemoryWarehouse::new();
//! let handle = warehouse.query(&request).await?;
//! let info = warehouse.get_job(&handle).await?;
//! ```

mod eval;
pub mod storage;

pub use mimic_warehouse::{WarehouseClient, WarehouseError};
pub use storage::{InMemoryWarehouse, MemoryOptions};

/// Creates a new shareable in-memory warehouse.
pub fn create_warehouse(options: MemoryOptions) -> mimic_warehouse::DynWarehouse {
    std::sync::Arc::new(InMemoryWarehouse::with_options(options))
}
