//! BigQuery REST v2 implementation of [`WarehouseClient`].

use std::time::{Duration, Instant};

use async_trait::async_trait;
use mimic_warehouse::{
    JobHandle, JobInfo, JobResult, JobState, QueryRequest, StatementShape, WarehouseClient,
    WarehouseError,
};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;

use crate::wire::{
    ErrorResponse, InsertConfiguration, InsertJobRequest, Job, JobReference, QueryConfiguration,
    QueryParameter, QueryResultsResponse, TableSchema, decode_rows, into_result_set,
};

/// First pause between result polls that come back incomplete.
const INITIAL_POLL_BACKOFF: Duration = Duration::from_millis(50);
const MAX_POLL_BACKOFF: Duration = Duration::from_millis(500);

/// Default REST endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://bigquery.googleapis.com/bigquery/v2";

/// Configuration for the BigQuery client.
#[derive(Debug, Clone)]
pub struct BigQueryOptions {
    /// REST base URL, without trailing slash.
    pub endpoint: String,
    /// Project jobs are billed to and created in.
    pub project_id: String,
    /// OAuth2 bearer token sent with every call, if any.
    pub access_token: Option<String>,
    /// Upper bound for a single HTTP call.
    pub request_timeout: Duration,
}

impl Default for BigQueryOptions {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            project_id: String::new(),
            access_token: None,
            request_timeout: Duration::from_secs(60),
        }
    }
}

pub struct BigQueryClient {
    http: reqwest::Client,
    options: BigQueryOptions,
}

impl BigQueryClient {
    /// Creates a client.
    ///
    /// # Errors
    ///
    /// Returns `WarehouseError::Internal` if the HTTP client cannot be built.
    pub fn new(options: BigQueryOptions) -> Result<Self, WarehouseError> {
        let http = reqwest::Client::builder()
            .timeout(options.request_timeout)
            .build()
            .map_err(|e| WarehouseError::internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http, options })
    }

    fn url(&self, project_id: &str, tail: &str) -> String {
        format!(
            "{}/projects/{}/{tail}",
            self.options.endpoint.trim_end_matches('/'),
            urlencoding::encode(project_id)
        )
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.options.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        handle: Option<&JobHandle>,
    ) -> Result<T, WarehouseError> {
        let response = self.authorize(request).send().await.map_err(|e| {
            tracing::warn!(error = %e, "BigQuery request failed");
            WarehouseError::connection(e.to_string())
        })?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|e| WarehouseError::decode(e.to_string()));
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorResponse>(&body)
            .map(|e| e.error.message)
            .unwrap_or(body);

        match (status, handle) {
            (StatusCode::NOT_FOUND, Some(handle)) => Err(WarehouseError::job_not_found(
                &handle.project_id,
                &handle.job_id,
                &handle.location,
            )),
            (StatusCode::BAD_REQUEST, Some(handle)) => {
                Err(WarehouseError::job_failed(&handle.job_id, message))
            }
            (StatusCode::BAD_REQUEST, None) => Err(WarehouseError::invalid_query(message)),
            _ => Err(WarehouseError::http(status.as_u16(), message)),
        }
    }
}

#[async_trait]
impl WarehouseClient for BigQueryClient {
    async fn query(&self, request: &QueryRequest) -> Result<JobHandle, WarehouseError> {
        let body = InsertJobRequest {
            job_reference: JobReference {
                project_id: self.options.project_id.clone(),
                job_id: String::new(),
                location: Some(request.location.clone()),
            },
            configuration: InsertConfiguration {
                query: QueryConfiguration {
                    query: request.sql(),
                    use_legacy_sql: false,
                    parameter_mode: "NAMED",
                    query_parameters: request.parameters.iter().map(QueryParameter::from).collect(),
                },
            },
        };

        let job: Job = self
            .send(
                self.http
                    .post(self.url(&self.options.project_id, "jobs"))
                    .json(&body),
                None,
            )
            .await?;

        if let Some(error) = job.status.as_ref().and_then(|s| s.error_result.as_ref()) {
            return Err(WarehouseError::invalid_query(format!(
                "{}: {}",
                error.reason, error.message
            )));
        }

        let reference = job.job_reference;
        let handle = JobHandle::new(
            reference.project_id,
            reference.job_id,
            reference
                .location
                .unwrap_or_else(|| request.location.clone()),
        );
        tracing::debug!(job_id = %handle.job_id, "BigQuery job inserted");
        Ok(handle)
    }

    async fn get_job(&self, handle: &JobHandle) -> Result<JobInfo, WarehouseError> {
        let tail = format!("jobs/{}", urlencoding::encode(&handle.job_id));
        let job: Job = self
            .send(
                self.http
                    .get(self.url(&handle.project_id, &tail))
                    .query(&[("location", handle.location.as_str())]),
                Some(handle),
            )
            .await?;

        let shape = job
            .statistics
            .as_ref()
            .and_then(|s| s.query.as_ref())
            .and_then(|q| q.statement_type.as_deref())
            .and_then(StatementShape::from_statement_type)
            .or_else(|| {
                job.configuration
                    .as_ref()
                    .and_then(|c| c.query.as_ref())
                    .and_then(|q| StatementShape::from_sql(&q.query))
            })
            .ok_or_else(|| {
                WarehouseError::decode(format!("job {} is not a recognized query job", handle.job_id))
            })?;

        let state = job
            .status
            .as_ref()
            .map(|s| s.to_state())
            .unwrap_or(JobState::Pending);

        Ok(JobInfo {
            handle: handle.clone(),
            shape,
            state,
        })
    }

    async fn job_result(
        &self,
        handle: &JobHandle,
        timeout: Duration,
    ) -> Result<JobResult, WarehouseError> {
        let deadline = Instant::now() + timeout;
        let tail = format!("queries/{}", urlencoding::encode(&handle.job_id));
        let url = self.url(&handle.project_id, &tail);

        // The service may answer before `timeoutMs` with jobComplete=false, so
        // keep asking until our own deadline.
        let mut backoff = INITIAL_POLL_BACKOFF;
        let first = loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let page: QueryResultsResponse = self
                .send(
                    self.http.get(&url).query(&[
                        ("location", handle.location.clone()),
                        ("timeoutMs", remaining.as_millis().to_string()),
                        ("formatOptions.useInt64Timestamp", "true".to_string()),
                    ]),
                    Some(handle),
                )
                .await?;
            if page.job_complete {
                break page;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(JobResult::Pending);
            }
            tokio::time::sleep(backoff.min(remaining)).await;
            backoff = (backoff * 2).min(MAX_POLL_BACKOFF);
        };

        // A failed job answers with an error status, mapped in `send`. Entries
        // in `errors` on a completed page are warnings.

        let schema = first
            .schema
            .clone()
            .unwrap_or_else(|| TableSchema { fields: Vec::new() });
        let mut rows = decode_rows(&schema, &first.rows)?;
        let mut page_token = first.page_token.clone();
        while let Some(token) = page_token.take() {
            let page: QueryResultsResponse = self
                .send(
                    self.http.get(&url).query(&[
                        ("location", handle.location.as_str()),
                        ("pageToken", token.as_str()),
                        ("formatOptions.useInt64Timestamp", "true"),
                    ]),
                    Some(handle),
                )
                .await?;
            rows.extend(decode_rows(&schema, &page.rows)?);
            page_token = page.page_token;
        }

        Ok(JobResult::Rows(into_result_set(rows, first.total_rows.as_deref())))
    }

    fn backend_name(&self) -> &'static str {
        "bigquery"
    }
}
