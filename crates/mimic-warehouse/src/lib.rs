//! # mimic-warehouse
//!
//! Warehouse abstraction layer for the MIMIC record service.
//!
//! This crate defines the contract every warehouse engine backend implements
//! and the types that cross it. It does not contain any engine - those live in
//! `mimic-db-memory` and `mimic-db-bigquery`.
//!
//! ## Overview
//!
//! The main trait is [`WarehouseClient`], which mirrors the job model of an
//! analytical warehouse:
//! - `query` submits a statement and returns a [`JobHandle`]
//! - `get_job` re-attaches to a job from its handle
//! - `job_result` waits a bounded time for the rows of a finished job
//!
//! ## Example
//!
//! ```ignore
//! use std::time::Duration;
//! use mimic_warehouse::{JobResult, QueryRequest, WarehouseClient, WarehouseError};
//!
//! async fn run(client: &dyn WarehouseClient, request: &QueryRequest) -> Result<(), WarehouseError> {
//!     let handle = client.query(request).await?;
//!     match client.job_result(&handle, Duration::from_secs(30)).await? {
//!         JobResult::Rows(rows) => println!("{} rows", rows.len()),
//!         JobResult::Pending => println!("still running: {}", handle.job_id),
//!     }
//!     Ok(())
//! }
//! ```

mod error;
pub mod statement;
mod traits;
mod types;
pub mod value;

pub use error::{ErrorCategory, WarehouseError};
pub use statement::{Assignment, Expr, Filter, Statement, StatementShape, TableRef};
pub use traits::WarehouseClient;
pub use types::{
    BoundParameter, JobHandle, JobInfo, JobResult, JobState, QueryRequest, ResultSet, Row,
};
pub use value::{ScalarType, ScalarValue, format_timestamp, parse_timestamp};

/// Type alias for a warehouse result.
pub type WarehouseResult<T> = Result<T, WarehouseError>;

/// Type alias for a shared warehouse client trait object.
pub type DynWarehouse = std::sync::Arc<dyn WarehouseClient>;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::error::{ErrorCategory, WarehouseError};
    pub use crate::statement::{Expr, Statement, StatementShape, TableRef};
    pub use crate::traits::WarehouseClient;
    pub use crate::types::{
        BoundParameter, JobHandle, JobInfo, JobResult, JobState, QueryRequest, ResultSet, Row,
    };
    pub use crate::value::{ScalarType, ScalarValue};
    pub use crate::{DynWarehouse, WarehouseResult};
}
