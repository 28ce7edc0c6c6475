//! Redemption of job handles into result rows.

use std::time::Duration;

use mimic_warehouse::{
    DynWarehouse, JobHandle, JobResult, JobState, ResultSet, StatementShape, WarehouseError,
};
use tokio::time::Instant;

use crate::error::QueryError;

/// Outcome of one redemption attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Redemption {
    /// The job finished and all its rows are here.
    Complete(ResultSet),
    /// The job did not finish within the timeout. The handle stays valid.
    TimedOut,
}

/// Turns a [`JobHandle`] back into rows.
///
/// Redemption is read-only: it never cancels or resubmits a job, so the same
/// handle can be redeemed any number of times.
#[derive(Clone)]
pub struct JobResultRedeemer {
    client: DynWarehouse,
}

impl JobResultRedeemer {
    pub fn new(client: DynWarehouse) -> Self {
        Self { client }
    }

    /// Waits at most `timeout` for the rows of a select job.
    ///
    /// The timeout bounds the whole attempt, including the job lookup.
    ///
    /// # Errors
    ///
    /// - `InvalidHandleUse` if the handle refers to a mutating job
    /// - `Warehouse` if the job is unknown or failed
    pub async fn redeem(
        &self,
        handle: &JobHandle,
        timeout: Duration,
    ) -> Result<Redemption, QueryError> {
        let deadline = Instant::now() + timeout;
        let outcome = tokio::time::timeout_at(deadline, self.attempt(handle, deadline)).await;
        match outcome {
            Ok(Ok(JobResult::Rows(rows))) => {
                tracing::debug!(job_id = %handle.job_id, rows = rows.len(), "Job redeemed");
                Ok(Redemption::Complete(rows))
            }
            Ok(Ok(JobResult::Pending)) | Err(_) => {
                tracing::info!(
                    job_id = %handle.job_id,
                    timeout_ms = timeout.as_millis() as u64,
                    "Job not finished within redemption timeout"
                );
                Ok(Redemption::TimedOut)
            }
            Ok(Err(e)) => Err(e),
        }
    }

    async fn attempt(&self, handle: &JobHandle, deadline: Instant) -> Result<JobResult, QueryError> {
        let info = self.client.get_job(handle).await?;

        if info.shape != StatementShape::Select {
            return Err(QueryError::InvalidHandleUse {
                job_id: handle.job_id.clone(),
                shape: info.shape,
            });
        }
        if let JobState::Failed { message } = info.state {
            return Err(WarehouseError::job_failed(&handle.job_id, message).into());
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        Ok(self.client.job_result(handle, remaining).await?)
    }
}
