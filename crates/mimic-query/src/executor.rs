//! Job submission.

use std::time::Duration;

use mimic_warehouse::{
    BoundParameter, DynWarehouse, JobHandle, JobResult, QueryRequest, StatementShape,
};

use crate::error::QueryError;
use crate::template::QueryTemplate;

/// How `submit` treats the job it creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Wait for the job to finish before returning its handle.
    Synchronous,
    /// Return the handle as soon as the job is accepted.
    Asynchronous,
}

impl ExecutionMode {
    pub fn for_shape(shape: StatementShape) -> Self {
        if shape.is_mutating() {
            ExecutionMode::Synchronous
        } else {
            ExecutionMode::Asynchronous
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionMode::Synchronous => "synchronous",
            ExecutionMode::Asynchronous => "asynchronous",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    /// Location jobs are submitted to.
    pub location: String,
    /// Length of each wait while a synchronous job runs.
    pub write_poll_interval: Duration,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            location: "US".to_string(),
            write_poll_interval: Duration::from_secs(1),
        }
    }
}

/// Submits bound templates to the warehouse.
#[derive(Clone)]
pub struct QueryExecutor {
    client: DynWarehouse,
    settings: ExecutorSettings,
}

impl QueryExecutor {
    pub fn new(client: DynWarehouse, settings: ExecutorSettings) -> Self {
        Self { client, settings }
    }

    pub fn settings(&self) -> &ExecutorSettings {
        &self.settings
    }

    /// Submits a template with its bound parameters.
    ///
    /// Mutating templates block until the job has finished; selects return as
    /// soon as the engine has accepted the job.
    ///
    /// # Errors
    ///
    /// Returns `QueryError::Warehouse` if the engine rejects the statement or,
    /// for synchronous jobs, if the job fails.
    pub async fn submit(
        &self,
        template: &QueryTemplate,
        params: Vec<BoundParameter>,
    ) -> Result<JobHandle, QueryError> {
        let mode = ExecutionMode::for_shape(template.shape());
        let request = QueryRequest::new(
            template.statement.clone(),
            params,
            self.settings.location.clone(),
        );

        let handle = self.client.query(&request).await.inspect_err(|e| {
            tracing::warn!(operation = %template.operation, error = %e, "Query rejected");
        })?;

        tracing::info!(
            operation = %template.operation,
            job_id = %handle.job_id,
            mode = mode.as_str(),
            backend = self.client.backend_name(),
            "Query submitted"
        );

        if mode == ExecutionMode::Synchronous {
            self.wait_for_completion(&handle).await?;
            tracing::debug!(operation = %template.operation, job_id = %handle.job_id, "Query completed");
        }
        Ok(handle)
    }

    async fn wait_for_completion(&self, handle: &JobHandle) -> Result<(), QueryError> {
        loop {
            match self
                .client
                .job_result(handle, self.settings.write_poll_interval)
                .await?
            {
                JobResult::Rows(_) => return Ok(()),
                JobResult::Pending => {
                    tracing::debug!(job_id = %handle.job_id, "Waiting for write job");
                }
            }
        }
    }
}
