use axum::{
    Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::{HeaderValue, StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Redirect, Response},
};
use mimic_query::Redemption;
use mimic_warehouse::{JobHandle, ResultSet};
use serde::Serialize;
use serde_json::{Value, json};

use crate::dispatch::{Resource, Verb, dispatch};
use crate::error::ApiError;
use crate::server::AppState;

/// Seconds a client should wait before retrying a timed-out redemption.
pub const RETRY_AFTER_SECONDS: u64 = 2;

#[derive(Serialize)]
pub struct HealthResponse<'a> {
    status: &'a str,
}

pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthResponse { status: "ok" }))
}

// ---- Writes ----

async fn write(
    state: &AppState,
    resource: Resource,
    verb: Verb,
    path_id: Option<&str>,
    payload: &Value,
) -> Result<JobHandle, ApiError> {
    let (operation, params) = dispatch(&state.registry, resource, verb, path_id, payload)?;
    let handle = state
        .executor
        .submit(state.registry.lookup(operation), params)
        .await?;
    Ok(handle)
}

fn message(status: StatusCode, text: String) -> Response {
    (status, Json(json!({ "message": text }))).into_response()
}

pub async fn create_patient(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(payload) = body?;
    write(&state, Resource::Patient, Verb::Post, None, &payload).await?;
    Ok(message(StatusCode::CREATED, "Paciente criado com sucesso!".into()))
}

pub async fn update_patient(
    State(state): State<AppState>,
    Path(subject_id): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(payload) = body?;
    write(&state, Resource::Patient, Verb::Put, Some(&subject_id), &payload).await?;
    Ok(message(
        StatusCode::OK,
        format!("Paciente {subject_id} atualizado com sucesso!"),
    ))
}

pub async fn delete_patient(
    State(state): State<AppState>,
    Path(subject_id): Path<String>,
) -> Result<Response, ApiError> {
    write(&state, Resource::Patient, Verb::Delete, Some(&subject_id), &json!({})).await?;
    Ok(message(
        StatusCode::OK,
        format!("Paciente {subject_id} removido com sucesso!"),
    ))
}

pub async fn create_admission(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(payload) = body?;
    write(&state, Resource::Admission, Verb::Post, None, &payload).await?;
    Ok(message(StatusCode::CREATED, "Internação criada com sucesso!".into()))
}

pub async fn update_admission(
    State(state): State<AppState>,
    Path(hadm_id): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(payload) = body?;
    write(&state, Resource::Admission, Verb::Put, Some(&hadm_id), &payload).await?;
    Ok(message(
        StatusCode::OK,
        format!("Internação {hadm_id} atualizada com sucesso!"),
    ))
}

pub async fn create_question(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(payload) = body?;
    write(&state, Resource::Question, Verb::Post, None, &payload).await?;
    Ok(message(StatusCode::CREATED, "Pergunta criada com sucesso!".into()))
}

pub async fn create_answer(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(payload) = body?;
    write(&state, Resource::Answer, Verb::Post, None, &payload).await?;
    Ok(message(StatusCode::CREATED, "Resposta criada com sucesso!".into()))
}

// ---- Reads ----

async fn submit_list(state: &AppState, resource: Resource) -> Result<JobHandle, ApiError> {
    let (operation, params) = dispatch(&state.registry, resource, Verb::Get, None, &json!({}))?;
    let handle = state
        .executor
        .submit(state.registry.lookup(operation), params)
        .await?;
    Ok(handle)
}

/// Query string carrying a job handle through a redirect.
pub fn handle_query(handle: &JobHandle) -> String {
    format!(
        "project_id={}&job_id={}&location={}",
        urlencoding::encode(&handle.project_id),
        urlencoding::encode(&handle.job_id),
        urlencoding::encode(&handle.location)
    )
}

/// Submits the patient listing and redirects to its result page.
pub async fn root(State(state): State<AppState>) -> Result<Redirect, ApiError> {
    let handle = submit_list(&state, Resource::Patient).await?;
    Ok(Redirect::to(&format!("/results?{}", handle_query(&handle))))
}

pub async fn results(
    State(state): State<AppState>,
    query: Result<Query<JobHandle>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(handle) = query?;
    redeem_view(&state, handle).await
}

/// Lists questions in a single request.
pub async fn questions(State(state): State<AppState>) -> Result<Response, ApiError> {
    let handle = submit_list(&state, Resource::Question).await?;
    redeem_view(&state, handle).await
}

async fn redeem_view(state: &AppState, handle: JobHandle) -> Result<Response, ApiError> {
    match state.redeemer.redeem(&handle, state.redeem_timeout).await? {
        Redemption::Complete(rows) => Ok(complete_view(&handle, rows)),
        Redemption::TimedOut => Ok(timeout_view(&handle, state)),
    }
}

fn complete_view(handle: &JobHandle, rows: ResultSet) -> Response {
    let body = json!({
        "status": "complete",
        "job": handle,
        "total_rows": rows.total_rows,
        "rows": rows.rows,
    });
    (StatusCode::OK, Json(body)).into_response()
}

fn timeout_view(handle: &JobHandle, state: &AppState) -> Response {
    let body = json!({
        "status": "timeout",
        "job": handle,
        "message": format!(
            "Job {} did not finish within {} ms; retry this URL",
            handle.job_id,
            state.redeem_timeout.as_millis()
        ),
        "retry_url": format!("/results?{}", handle_query(handle)),
    });
    let mut response = (StatusCode::ACCEPTED, Json(body)).into_response();
    response
        .headers_mut()
        .insert(RETRY_AFTER, HeaderValue::from(RETRY_AFTER_SECONDS));
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_query_is_encoded() {
        let handle = JobHandle::new("barbara2-451412", "job_a b&c", "US");
        assert_eq!(
            handle_query(&handle),
            "project_id=barbara2-451412&job_id=job_a%20b%26c&location=US"
        );
    }
}
