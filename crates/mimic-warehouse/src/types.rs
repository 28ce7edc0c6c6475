//! Job handles, requests and result sets.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::statement::{Statement, StatementShape};
use crate::value::{ScalarType, ScalarValue};

/// Reference to a warehouse job.
///
/// Handles are self-describing: any process holding the three fields can
/// re-attach to the job, so a handle can travel through a redirect URL and be
/// redeemed later by a different instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobHandle {
    pub project_id: String,
    pub job_id: String,
    pub location: String,
}

impl JobHandle {
    pub fn new(
        project_id: impl Into<String>,
        job_id: impl Into<String>,
        location: impl Into<String>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            job_id: job_id.into(),
            location: location.into(),
        }
    }
}

impl std::fmt::Display for JobHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}.{}", self.project_id, self.location, self.job_id)
    }
}

/// Lifecycle state of a warehouse job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Running,
    Done,
    Failed { message: String },
}

impl JobState {
    /// Returns `true` once the job can no longer change state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Done | JobState::Failed { .. })
    }
}

/// Job metadata returned when re-attaching to a handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobInfo {
    pub handle: JobHandle,
    pub shape: StatementShape,
    pub state: JobState,
}

/// A validated, type-tagged value bound to a named statement parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoundParameter {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: ScalarType,
    pub value: ScalarValue,
}

impl BoundParameter {
    pub fn new(name: impl Into<String>, ty: ScalarType, value: ScalarValue) -> Self {
        Self {
            name: name.into(),
            ty,
            value,
        }
    }
}

/// A statement plus its bound parameters, ready for submission.
#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub statement: Statement,
    pub parameters: Vec<BoundParameter>,
    /// Warehouse location the job should run in.
    pub location: String,
}

impl QueryRequest {
    pub fn new(statement: Statement, parameters: Vec<BoundParameter>, location: impl Into<String>) -> Self {
        Self {
            statement,
            parameters,
            location: location.into(),
        }
    }

    pub fn sql(&self) -> String {
        self.statement.to_sql()
    }

    pub fn parameter(&self, name: &str) -> Option<&BoundParameter> {
        self.parameters.iter().find(|p| p.name == name)
    }
}

/// One result row: column name to value, in column order.
pub type Row = IndexMap<String, ScalarValue>;

/// Fully materialized rows of a finished job.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ResultSet {
    pub rows: Vec<Row>,
    pub total_rows: u64,
}

impl ResultSet {
    pub fn new(rows: Vec<Row>) -> Self {
        let total_rows = rows.len() as u64;
        Self { rows, total_rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Outcome of one bounded wait on a job.
#[derive(Debug, Clone, PartialEq)]
pub enum JobResult {
    /// The job finished; rows are complete (empty for mutating statements).
    Rows(ResultSet),
    /// The job had not finished when the wait expired.
    Pending,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_handle_display() {
        let handle = JobHandle::new("barbara2-451412", "job_abc", "US");
        assert_eq!(handle.to_string(), "barbara2-451412:US.job_abc");
    }

    #[test]
    fn test_job_state_terminal() {
        assert!(!JobState::Pending.is_terminal());
        assert!(!JobState::Running.is_terminal());
        assert!(JobState::Done.is_terminal());
        assert!(
            JobState::Failed {
                message: "boom".into()
            }
            .is_terminal()
        );
    }

    #[test]
    fn test_result_set_serialization() {
        let mut row = Row::new();
        row.insert("SUBJECT_ID".into(), ScalarValue::Int64(42));
        row.insert("GENDER".into(), ScalarValue::String("F".into()));
        let set = ResultSet::new(vec![row]);
        assert_eq!(set.total_rows, 1);
        assert_eq!(
            serde_json::to_value(&set).unwrap(),
            serde_json::json!({
                "rows": [{"SUBJECT_ID": 42, "GENDER": "F"}],
                "total_rows": 1
            })
        );
    }
}
