use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mimic_warehouse::{
    JobHandle, JobInfo, JobResult, JobState, QueryRequest, ResultSet, StatementShape,
    WarehouseClient, WarehouseError,
};
use papaya::HashMap as PapayaHashMap;
use tokio::sync::{RwLock, watch};
use tokio::time::Instant;
use uuid::Uuid;

use crate::eval::{self, Table};

/// Options for the in-memory engine.
#[derive(Debug, Clone)]
pub struct MemoryOptions {
    /// Project reported in every issued handle.
    pub project_id: String,
    /// Location reported in every issued handle.
    pub location: String,
    /// Time each job spends running before its statement is applied.
    pub execution_delay: Duration,
    /// How long a finished job stays redeemable before it is dropped.
    pub job_retention: Duration,
}

impl Default for MemoryOptions {
    fn default() -> Self {
        Self {
            project_id: "memory".to_string(),
            location: "US".to_string(),
            execution_delay: Duration::ZERO,
            job_retention: Duration::from_secs(3600),
        }
    }
}

#[derive(Debug, Clone)]
struct SlotState {
    state: JobState,
    result: Option<ResultSet>,
    finished_at: Option<Instant>,
}

impl SlotState {
    fn is_expired(&self, now: Instant, retention: Duration) -> bool {
        self.finished_at
            .is_some_and(|at| now.saturating_duration_since(at) >= retention)
    }
}

#[derive(Debug)]
struct JobSlot {
    shape: StatementShape,
    location: String,
    status: watch::Sender<SlotState>,
}

/// In-memory warehouse engine.
///
/// This engine provides:
/// - Lock-free job registry via papaya::HashMap
/// - Asynchronous job execution on detached tasks, with a configurable delay
/// - Table storage keyed by fully-qualified table name
/// - Job state published over `tokio::sync::watch` so waiters wake on completion
#[derive(Debug)]
pub struct InMemoryWarehouse {
    jobs: Arc<PapayaHashMap<String, Arc<JobSlot>>>,
    tables: Arc<RwLock<HashMap<String, Table>>>,
    options: MemoryOptions,
}

impl InMemoryWarehouse {
    /// Creates a new in-memory warehouse with default options.
    pub fn new() -> Self {
        Self::with_options(MemoryOptions::default())
    }

    /// Creates a new in-memory warehouse with the given options.
    pub fn with_options(options: MemoryOptions) -> Self {
        Self {
            jobs: Arc::new(PapayaHashMap::new()),
            tables: Arc::new(RwLock::new(HashMap::new())),
            options,
        }
    }

    pub fn options(&self) -> &MemoryOptions {
        &self.options
    }

    /// Number of rows currently stored in a table (`project.dataset.TABLE`).
    pub async fn row_count(&self, table: &str) -> usize {
        let tables = self.tables.read().await;
        tables.get(table).map(|t| t.rows.len()).unwrap_or(0)
    }

    /// Number of jobs currently tracked, finished or not.
    pub fn job_count(&self) -> usize {
        self.jobs.pin().len()
    }

    /// Drops finished jobs older than the retention window.
    ///
    /// Returns the number of jobs removed. Runs on every submission.
    pub fn cleanup_expired_jobs(&self) -> usize {
        let now = Instant::now();
        let retention = self.options.job_retention;
        let guard = self.jobs.pin();
        let expired: Vec<String> = guard
            .iter()
            .filter(|(_, slot)| slot.status.borrow().is_expired(now, retention))
            .map(|(job_id, _)| job_id.clone())
            .collect();
        for job_id in &expired {
            guard.remove(job_id);
        }
        if !expired.is_empty() {
            tracing::debug!(deleted = expired.len(), "Expired job cleanup completed");
        }
        expired.len()
    }

    fn slot(&self, handle: &JobHandle) -> Result<Arc<JobSlot>, WarehouseError> {
        let not_found = || {
            WarehouseError::job_not_found(&handle.project_id, &handle.job_id, &handle.location)
        };
        if handle.project_id != self.options.project_id {
            return Err(not_found());
        }
        let guard = self.jobs.pin();
        match guard.get(&handle.job_id) {
            Some(slot)
                if slot.location == handle.location
                    && !slot
                        .status
                        .borrow()
                        .is_expired(Instant::now(), self.options.job_retention) =>
            {
                Ok(slot.clone())
            }
            _ => Err(not_found()),
        }
    }
}

impl Default for InMemoryWarehouse {
    fn default() -> Self {
        Self::new()
    }
}

async fn run_job(
    job_id: String,
    request: QueryRequest,
    slot: Arc<JobSlot>,
    tables: Arc<RwLock<HashMap<String, Table>>>,
    delay: Duration,
) {
    slot.status.send_modify(|s| s.state = JobState::Running);
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    let outcome = {
        let mut tables = tables.write().await;
        let table = tables
            .entry(request.statement.table.to_string())
            .or_default();
        // Work on a copy so a failing statement leaves the table untouched.
        let mut scratch = table.clone();
        let outcome = eval::execute(&request.statement, &request.parameters, &mut scratch);
        if outcome.is_ok() {
            *table = scratch;
        }
        outcome
    };

    match outcome {
        Ok(result) => {
            tracing::debug!(job_id = %job_id, rows = result.len(), "Job completed");
            slot.status.send_replace(SlotState {
                state: JobState::Done,
                result: Some(result),
                finished_at: Some(Instant::now()),
            });
        }
        Err(message) => {
            tracing::warn!(job_id = %job_id, error = %message, "Job failed");
            slot.status.send_replace(SlotState {
                state: JobState::Failed { message },
                result: None,
                finished_at: Some(Instant::now()),
            });
        }
    }
}

#[async_trait]
impl WarehouseClient for InMemoryWarehouse {
    async fn query(&self, request: &QueryRequest) -> Result<JobHandle, WarehouseError> {
        eval::validate(request).map_err(WarehouseError::invalid_query)?;
        self.cleanup_expired_jobs();

        let job_id = format!("job_{}", Uuid::new_v4().simple());
        let (status, _) = watch::channel(SlotState {
            state: JobState::Pending,
            result: None,
            finished_at: None,
        });
        let slot = Arc::new(JobSlot {
            shape: request.statement.shape,
            location: request.location.clone(),
            status,
        });
        self.jobs.pin().insert(job_id.clone(), slot.clone());

        tracing::debug!(
            job_id = %job_id,
            shape = %request.statement.shape,
            table = %request.statement.table,
            "Job submitted"
        );

        tokio::spawn(run_job(
            job_id.clone(),
            request.clone(),
            slot,
            self.tables.clone(),
            self.options.execution_delay,
        ));

        Ok(JobHandle::new(
            self.options.project_id.clone(),
            job_id,
            request.location.clone(),
        ))
    }

    async fn get_job(&self, handle: &JobHandle) -> Result<JobInfo, WarehouseError> {
        let slot = self.slot(handle)?;
        let state = slot.status.borrow().state.clone();
        Ok(JobInfo {
            handle: handle.clone(),
            shape: slot.shape,
            state,
        })
    }

    async fn job_result(
        &self,
        handle: &JobHandle,
        timeout: Duration,
    ) -> Result<JobResult, WarehouseError> {
        let slot = self.slot(handle)?;
        let mut rx = slot.status.subscribe();

        let finished = match tokio::time::timeout(timeout, rx.wait_for(|s| s.state.is_terminal()))
            .await
        {
            Ok(Ok(state)) => state.clone(),
            Ok(Err(_)) => {
                return Err(WarehouseError::internal(format!(
                    "job {} status channel closed",
                    handle.job_id
                )));
            }
            Err(_) => return Ok(JobResult::Pending),
        };

        match finished.state {
            JobState::Failed { message } => Err(WarehouseError::job_failed(&handle.job_id, message)),
            _ => Ok(JobResult::Rows(finished.result.unwrap_or_default())),
        }
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
