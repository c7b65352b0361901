//! HTTP API server

use super::handlers;
use crate::evaluation::{EvaluationReader, EvaluationWriter, RubricService};
use crate::export::CsvExporter;
use crate::metrics::MetricsEngine;
use crate::notifications::NotificationSink;
use crate::storage::StorageBackend;
use axum::{
    routing::{get, post},
    Router,
};
use std::{net::SocketAddr, sync::Arc};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    /// Server address
    pub addr: SocketAddr,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            addr: ([127, 0, 0, 1], 8080).into(),
        }
    }
}

/// Services shared by every request
#[derive(Clone)]
pub struct AppState {
    pub rubrics: Arc<RubricService>,
    pub writer: Arc<EvaluationWriter>,
    pub reader: Arc<EvaluationReader>,
    pub metrics: Arc<MetricsEngine>,
    pub exporter: Arc<CsvExporter>,
    /// Instance ID
    pub instance_id: String,
}

impl AppState {
    pub fn new(storage: Arc<dyn StorageBackend>, notifier: Arc<dyn NotificationSink>) -> Self {
        Self {
            rubrics: Arc::new(RubricService::new(storage.clone())),
            writer: Arc::new(EvaluationWriter::new(storage.clone(), notifier)),
            reader: Arc::new(EvaluationReader::new(storage.clone())),
            metrics: Arc::new(MetricsEngine::new(storage.clone())),
            exporter: Arc::new(CsvExporter::new(storage)),
            instance_id: uuid::Uuid::new_v4().to_string()[..8].to_string(),
        }
    }
}

/// Build router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health))
        // Rubrics
        .route(
            "/api/rubrics",
            get(handlers::list_rubrics).post(handlers::create_rubric),
        )
        .route(
            "/api/rubrics/:id",
            get(handlers::get_rubric).delete(handlers::delete_rubric),
        )
        // Evaluations
        .route("/api/evaluations", post(handlers::create_evaluation))
        .route(
            "/api/evaluations/:id",
            get(handlers::get_evaluation).put(handlers::update_evaluation),
        )
        .route("/api/evaluations/task/:task_id", get(handlers::task_evaluations))
        .route(
            "/api/evaluations/sprint/:sprint_id",
            get(handlers::sprint_evaluations),
        )
        .route(
            "/api/evaluations/project/:project_id/general",
            get(handlers::project_general_evaluations),
        )
        .route(
            "/api/evaluations/student/:student_id",
            get(handlers::student_evaluations),
        )
        .route("/api/tasks/:id/evaluate", post(handlers::evaluate_task))
        // Metrics
        .route(
            "/api/metrics/sprints/:sprint_id/burndown",
            get(handlers::sprint_burndown),
        )
        .route(
            "/api/metrics/projects/:project_id/velocity",
            get(handlers::project_velocity),
        )
        .route(
            "/api/metrics/projects/:project_id/contribution",
            get(handlers::project_contribution),
        )
        .route(
            "/api/metrics/export/projects/:project_id",
            get(handlers::export_project_csv),
        )
        // State
        .with_state(state)
        // Middleware
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// API server
pub struct ApiServer {
    config: ApiServerConfig,
    state: AppState,
}

impl ApiServer {
    pub fn new(config: ApiServerConfig, state: AppState) -> Self {
        Self { config, state }
    }

    /// Get instance ID
    pub fn instance_id(&self) -> &str {
        &self.state.instance_id
    }

    /// Serve until Ctrl-C
    pub async fn serve(self) -> anyhow::Result<()> {
        let router = build_router(self.state.clone());
        let listener = tokio::net::TcpListener::bind(self.config.addr).await?;
        info!(
            "API server [{}] listening on http://{}",
            self.state.instance_id,
            listener.local_addr()?
        );

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("API server [{}] stopped", self.state.instance_id);
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
        // Without a signal handler, keep serving
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::LogNotificationSink;
    use crate::storage::in_memory::InMemoryStorage;
    use crate::types::{Project, Sprint, Task, User};
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use serde_json::Value;
    use tower::ServiceExt;

    async fn router() -> Router {
        let storage = Arc::new(InMemoryStorage::new());
        storage.insert_user(&User::new("u1", "Ana", "ana@example.com")).await.unwrap();
        storage.insert_project(&Project::new("p1", "Website", "u1")).await.unwrap();
        storage.insert_sprint(&Sprint::new("s1", "p1", "Sprint 1")).await.unwrap();
        storage
            .insert_task(&Task::new("t1", "p1", "Fix bug").in_sprint("s1").with_priority("LOW"))
            .await
            .unwrap();
        build_router(AppState::new(storage, Arc::new(LogNotificationSink)))
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let response = router()
            .await
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_create_and_fetch_evaluation() {
        let app = router().await;

        let response = app
            .clone()
            .oneshot(post_json(
                "/api/evaluations",
                serde_json::json!({"projectId": "p1", "evaluatorId": "u1", "score": 70}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let id = body_json(response).await["data"]["id"]
            .as_str()
            .unwrap()
            .to_string();

        let response = app
            .oneshot(
                Request::get(format!("/api/evaluations/{}", id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["data"]["score"], 70);
        assert_eq!(body["data"]["evaluator"]["name"], "Ana");
        assert_eq!(body["data"]["status"], "COMPLETED");
    }

    #[tokio::test]
    async fn test_error_statuses() {
        let app = router().await;

        let response = app
            .clone()
            .oneshot(
                Request::get("/api/metrics/sprints/ghost/burndown")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(body_json(response).await["error"].is_string());

        let response = app
            .clone()
            .oneshot(post_json(
                "/api/evaluations",
                serde_json::json!({"projectId": "", "evaluatorId": "u1"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .oneshot(post_json(
                "/api/evaluations",
                serde_json::json!({
                    "projectId": "p1",
                    "evaluatorId": "u1",
                    "criteriaScores": [{"criteriaId": "missing", "score": 3}]
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_unknown_evaluation_scope_is_not_found() {
        let app = router().await;

        let response = app
            .clone()
            .oneshot(
                Request::get("/api/evaluations/sprint/ghost")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(body_json(response).await["error"].is_string());

        let response = app
            .oneshot(
                Request::get("/api/evaluations/sprint/s1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_json(response).await["data"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_rubric_echoes_id() {
        let app = router().await;

        let response = app
            .clone()
            .oneshot(post_json(
                "/api/rubrics",
                serde_json::json!({"name": "Demo", "criteria": [{"name": "Clarity"}]}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let id = body_json(response).await["data"]["id"]
            .as_str()
            .unwrap()
            .to_string();

        let response = app
            .clone()
            .oneshot(
                Request::delete(format!("/api/rubrics/{}", id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["data"]["id"], id.as_str());

        let response = app
            .oneshot(
                Request::get(format!("/api/rubrics/{}", id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_malformed_body_is_bad_request() {
        let response = router()
            .await
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/rubrics")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from("{not json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_csv_export_headers() {
        let response = router()
            .await
            .oneshot(
                Request::get("/api/metrics/export/projects/p1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/csv");
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"project-p1.csv\""
        );
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(
            &bytes[..],
            b"Sprint,Task,Assignee,Status,Priority\nSprint 1,Fix bug,Unassigned,TODO,LOW\n"
        );
    }
}
