//! BigQuery REST v2 request/response bodies and row decoding.

use mimic_warehouse::{
    BoundParameter, JobState, ResultSet, Row, ScalarValue, WarehouseError,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct JobReference {
    #[serde(default)]
    pub project_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub job_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertJobRequest<'a> {
    pub job_reference: JobReference,
    pub configuration: InsertConfiguration<'a>,
}

#[derive(Debug, Serialize)]
pub struct InsertConfiguration<'a> {
    pub query: QueryConfiguration<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryConfiguration<'a> {
    pub query: String,
    pub use_legacy_sql: bool,
    pub parameter_mode: &'static str,
    pub query_parameters: Vec<QueryParameter<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryParameter<'a> {
    pub name: &'a str,
    pub parameter_type: ParameterType,
    pub parameter_value: ParameterValue,
}

#[derive(Debug, Serialize)]
pub struct ParameterType {
    #[serde(rename = "type")]
    pub ty: &'static str,
}

/// `value` is omitted for SQL NULL.
#[derive(Debug, Serialize)]
pub struct ParameterValue {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl<'a> From<&'a BoundParameter> for QueryParameter<'a> {
    fn from(param: &'a BoundParameter) -> Self {
        Self {
            name: &param.name,
            parameter_type: ParameterType {
                ty: param.ty.as_str(),
            },
            parameter_value: ParameterValue {
                value: param.value.to_literal(),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub job_reference: JobReference,
    #[serde(default)]
    pub status: Option<JobStatus>,
    #[serde(default)]
    pub statistics: Option<JobStatistics>,
    #[serde(default)]
    pub configuration: Option<JobConfiguration>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub error_result: Option<ErrorProto>,
}

impl JobStatus {
    pub fn to_state(&self) -> JobState {
        if let Some(error) = &self.error_result {
            return JobState::Failed {
                message: error.message.clone(),
            };
        }
        match self.state.as_str() {
            "DONE" => JobState::Done,
            "RUNNING" => JobState::Running,
            _ => JobState::Pending,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ErrorProto {
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct JobStatistics {
    #[serde(default)]
    pub query: Option<QueryStatistics>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryStatistics {
    #[serde(default)]
    pub statement_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct JobConfiguration {
    #[serde(default)]
    pub query: Option<QueryText>,
}

#[derive(Debug, Deserialize)]
pub struct QueryText {
    #[serde(default)]
    pub query: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResultsResponse {
    #[serde(default)]
    pub job_complete: bool,
    #[serde(default)]
    pub schema: Option<TableSchema>,
    #[serde(default)]
    pub rows: Vec<TableRow>,
    #[serde(default)]
    pub total_rows: Option<String>,
    #[serde(default)]
    pub page_token: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TableSchema {
    #[serde(default)]
    pub fields: Vec<FieldSchema>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FieldSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
}

#[derive(Debug, Deserialize)]
pub struct TableRow {
    #[serde(default)]
    pub f: Vec<TableCell>,
}

#[derive(Debug, Deserialize)]
pub struct TableCell {
    #[serde(default)]
    pub v: Value,
}

/// Error envelope of a failed REST call.
#[derive(Debug, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub message: String,
}

/// Decodes one cell according to its schema type.
///
/// Timestamps arrive as int64 microseconds (`formatOptions.useInt64Timestamp`)
/// or as floating-point epoch seconds.
pub fn decode_cell(field: &FieldSchema, raw: &Value) -> Result<ScalarValue, WarehouseError> {
    let text = match raw {
        Value::Null => return Ok(ScalarValue::Null),
        Value::String(s) => s.as_str(),
        other => {
            return Err(WarehouseError::decode(format!(
                "column {}: unexpected cell {other}",
                field.name
            )));
        }
    };

    match field.ty.as_str() {
        "INTEGER" | "INT64" => text.parse::<i64>().map(ScalarValue::Int64).map_err(|e| {
            WarehouseError::decode(format!("column {}: invalid integer {text:?}: {e}", field.name))
        }),
        "TIMESTAMP" => decode_timestamp(text)
            .map(ScalarValue::Timestamp)
            .ok_or_else(|| {
                WarehouseError::decode(format!("column {}: invalid timestamp {text:?}", field.name))
            }),
        _ => Ok(ScalarValue::String(text.to_string())),
    }
}

fn decode_timestamp(text: &str) -> Option<OffsetDateTime> {
    let micros: i128 = match text.parse::<i64>() {
        Ok(micros) => micros.into(),
        Err(_) => {
            let seconds = text.parse::<f64>().ok()?;
            (seconds * 1_000_000.0).round() as i128
        }
    };
    OffsetDateTime::from_unix_timestamp_nanos(micros * 1_000).ok()
}

/// Decodes rows of one results page using the page schema.
pub fn decode_rows(schema: &TableSchema, rows: &[TableRow]) -> Result<Vec<Row>, WarehouseError> {
    rows.iter()
        .map(|row| {
            let mut decoded = Row::with_capacity(schema.fields.len());
            for (field, cell) in schema.fields.iter().zip(&row.f) {
                decoded.insert(field.name.clone(), decode_cell(field, &cell.v)?);
            }
            Ok(decoded)
        })
        .collect()
}

/// Assembles pages into one result set.
pub fn into_result_set(rows: Vec<Row>, total_rows: Option<&str>) -> ResultSet {
    let mut set = ResultSet::new(rows);
    if let Some(total) = total_rows.and_then(|t| t.parse::<u64>().ok()) {
        set.total_rows = total;
    }
    set
}
