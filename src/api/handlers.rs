//! Request handlers for the evaluation and metrics API
//!
//! Successful responses wrap their payload as `{"data": ...}`; failures are
//! `{"error": "<message>"}` with a status derived from the error kind.

use super::server::AppState;
use crate::error::SprintlensError;
use crate::evaluation::{EvaluationUpdate, NewEvaluation, NewRubric, TaskEvaluationRequest};
use crate::types::{EvaluationId, RubricId};
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, error};

/// Error response for the HTTP layer
#[derive(Debug)]
pub struct ApiError(SprintlensError);

impl From<SprintlensError> for ApiError {
    fn from(err: SprintlensError) -> Self {
        Self(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(SprintlensError::Validation(rejection.body_text()))
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            SprintlensError::NotFound { .. } => StatusCode::NOT_FOUND,
            SprintlensError::Validation(_) => StatusCode::BAD_REQUEST,
            SprintlensError::ConstraintViolation(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        } else {
            debug!("Request rejected ({}): {}", status, self.0);
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

/// `{"data": ...}` envelope
#[derive(Debug, Serialize)]
pub struct Data<T> {
    pub data: T,
}

fn data<T: Serialize>(value: T) -> Json<Data<T>> {
    Json(Data { data: value })
}

#[derive(Debug, Serialize)]
struct ResourceId {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RubricQuery {
    pub project_id: Option<String>,
}

// Health

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub instance_id: String,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        instance_id: state.instance_id.clone(),
    })
}

// Rubrics

pub async fn list_rubrics(
    State(state): State<AppState>,
    Query(query): Query<RubricQuery>,
) -> ApiResult<impl IntoResponse> {
    let rubrics = state.rubrics.list(query.project_id.as_deref()).await?;
    Ok(data(rubrics))
}

pub async fn create_rubric(
    State(state): State<AppState>,
    body: Result<Json<NewRubric>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(request) = body?;
    let rubric = state.rubrics.create(request).await?;
    Ok((StatusCode::CREATED, data(rubric)))
}

pub async fn get_rubric(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(data(state.rubrics.get(&RubricId::from(id)).await?))
}

pub async fn delete_rubric(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state.rubrics.delete(&RubricId::from(id.clone())).await?;
    Ok(data(ResourceId { id }))
}

// Evaluations

pub async fn create_evaluation(
    State(state): State<AppState>,
    body: Result<Json<NewEvaluation>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(request) = body?;
    let id = state.writer.create(request).await?;
    Ok((StatusCode::CREATED, data(ResourceId { id: id.0 })))
}

pub async fn get_evaluation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(data(state.reader.get(&EvaluationId::from(id)).await?))
}

pub async fn update_evaluation(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<EvaluationUpdate>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(update) = body?;
    let id = EvaluationId::from(id);
    state.writer.update(&id, update).await?;
    Ok(data(state.reader.get(&id).await?))
}

pub async fn task_evaluations(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(data(state.reader.by_task(&task_id).await?))
}

pub async fn sprint_evaluations(
    State(state): State<AppState>,
    Path(sprint_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(data(state.reader.by_sprint(&sprint_id).await?))
}

pub async fn project_general_evaluations(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(data(state.reader.by_project_general(&project_id).await?))
}

pub async fn student_evaluations(
    State(state): State<AppState>,
    Path(student_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(data(state.reader.for_student(&student_id).await?))
}

pub async fn evaluate_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
    body: Result<Json<TaskEvaluationRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(request) = body?;
    let id = state.writer.evaluate_task(&task_id, request).await?;
    Ok((StatusCode::CREATED, data(ResourceId { id: id.0 })))
}

// Metrics

pub async fn sprint_burndown(
    State(state): State<AppState>,
    Path(sprint_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(data(state.metrics.burndown(&sprint_id).await?))
}

pub async fn project_velocity(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(data(state.metrics.velocity(&project_id).await?))
}

pub async fn project_contribution(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(data(state.metrics.contribution(&project_id).await?))
}

/// Raw CSV body with download headers, no envelope
pub async fn export_project_csv(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let export = state.exporter.export_project(&project_id).await?;
    Ok((
        [
            (header::CONTENT_TYPE, export.content_type.to_string()),
            (header::CONTENT_DISPOSITION, export.content_disposition()),
        ],
        export.body,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        let cases = [
            (SprintlensError::not_found("Sprint", "s1"), StatusCode::NOT_FOUND),
            (SprintlensError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (SprintlensError::ConstraintViolation("x".into()), StatusCode::CONFLICT),
            (SprintlensError::Database("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).status(), expected);
        }
    }
}
