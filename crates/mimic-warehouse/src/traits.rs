//! The warehouse client contract.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::WarehouseError;
use crate::types::{JobHandle, JobInfo, JobResult, QueryRequest};

/// Client capability every warehouse engine backend implements.
///
/// Execution is asynchronous on the engine side: `query` only submits the
/// statement. Jobs keep running whether or not anybody waits on them, and
/// there is no cancellation. Implementations must be thread-safe
/// (`Send + Sync`) since one client is shared by every request.
#[async_trait]
pub trait WarehouseClient: Send + Sync {
    /// Submits a statement and returns the handle of the created job.
    ///
    /// # Errors
    ///
    /// Returns `WarehouseError::InvalidQuery` if the engine rejects the
    /// statement at submission, or a transport error.
    async fn query(&self, request: &QueryRequest) -> Result<JobHandle, WarehouseError>;

    /// Re-attaches to a job from its handle and reports its metadata.
    ///
    /// # Errors
    ///
    /// Returns `WarehouseError::JobNotFound` if the engine does not know the job.
    async fn get_job(&self, handle: &JobHandle) -> Result<JobInfo, WarehouseError>;

    /// Waits up to `timeout` for the job to finish and returns its rows.
    ///
    /// Returns `JobResult::Pending` when the wait expires first; the job is
    /// unaffected and the call can be repeated with the same handle.
    ///
    /// # Errors
    ///
    /// Returns `WarehouseError::JobFailed` if the job finished with an error.
    async fn job_result(
        &self,
        handle: &JobHandle,
        timeout: Duration,
    ) -> Result<JobResult, WarehouseError>;

    /// Returns the name of this backend for logging/debugging.
    fn backend_name(&self) -> &'static str;
}
