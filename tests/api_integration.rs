//! HTTP API end to end over a libSQL database

mod common;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use common::{create_test_storage, seed_project, PROJECT, SPRINT, STUDENT, TASK, TEACHER};
use serde_json::{json, Value};
use sprintlens_core::api::{build_router, AppState};
use sprintlens_core::{StorageBackend, StoredNotificationSink};
use std::sync::Arc;
use tower::ServiceExt;

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_rubric_evaluation_flow() {
    let storage = create_test_storage().await;
    seed_project(&storage).await;
    let app = build_router(AppState::new(
        storage.clone(),
        Arc::new(StoredNotificationSink::new(storage.clone())),
    ));

    // Rubric with defaults applied
    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/api/rubrics",
            json!({
                "projectId": PROJECT,
                "name": "Code Review",
                "criteria": [
                    {"name": "Quality", "maxScore": 10, "weight": 2},
                    {"name": "Tests"}
                ]
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let rubric_id = body["data"]["id"].as_str().unwrap().to_string();
    let criteria = body["data"]["criteria"].as_array().unwrap().clone();
    assert_eq!(criteria.len(), 2);
    let tests = criteria.iter().find(|c| c["name"] == "Tests").unwrap();
    assert_eq!(tests["maxScore"], 100);
    assert_eq!(tests["weight"], 1);
    let quality_id = criteria.iter().find(|c| c["name"] == "Quality").unwrap()["id"].clone();
    let tests_id = tests["id"].clone();

    let (status, body) = send(&app, get(&format!("/api/rubrics?projectId={}", PROJECT))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    // Task evaluation notifies the assignee
    let (status, body) = send(
        &app,
        json_request(
            "POST",
            &format!("/api/tasks/{}/evaluate", TASK),
            json!({
                "evaluatorId": TEACHER,
                "score": 85,
                "feedback": "Good",
                "criteriaScores": [
                    {"criterionId": quality_id, "score": 8},
                    {"criterionId": tests_id, "score": 60}
                ]
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let evaluation_id = body["data"]["id"].as_str().unwrap().to_string();
    assert_eq!(storage.list_notifications(STUDENT).await.unwrap().len(), 1);

    // Full replace of the criterion scores
    let (status, body) = send(
        &app,
        json_request(
            "PUT",
            &format!("/api/evaluations/{}", evaluation_id),
            json!({
                "feedback": "Better",
                "score": 90,
                "criteriaScores": [{"criteriaId": quality_id, "score": 9}]
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["score"], 90);
    assert_eq!(body["data"]["criteria"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"]["criteria"][0]["score"], 9);

    let (status, body) = send(&app, get(&format!("/api/evaluations/task/{}", TASK))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["id"], evaluation_id.as_str());
    assert_eq!(body["data"][0]["evaluator"]["id"], TEACHER);

    // Task evaluations stay out of the sprint-level view
    let (status, body) = send(&app, get(&format!("/api/evaluations/sprint/{}", SPRINT))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"].as_array().unwrap().is_empty());

    let (status, _) = send(&app, get("/api/evaluations/student/ghost")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, body) = send(&app, get(&format!("/api/evaluations/student/{}", STUDENT))).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (_, body) = send(
        &app,
        get(&format!("/api/evaluations/project/{}/general", PROJECT)),
    )
    .await;
    assert!(body["data"].as_array().unwrap().is_empty());

    // Scored rubrics cannot be deleted
    let delete = Request::builder()
        .method("DELETE")
        .uri(format!("/api/rubrics/{}", rubric_id))
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, delete).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_metrics_endpoints() {
    let storage = create_test_storage().await;
    seed_project(&storage).await;
    let app = build_router(AppState::new(
        storage.clone(),
        Arc::new(StoredNotificationSink::new(storage)),
    ));

    let (status, body) = send(&app, get(&format!("/api/metrics/sprints/{}/burndown", SPRINT))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["totalPoints"], 0);
    assert_eq!(body["data"]["series"].as_array().unwrap().len(), 15);

    let (status, body) = send(
        &app,
        get(&format!("/api/metrics/projects/{}/velocity", PROJECT)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["name"], "Sprint 1");
    assert_eq!(body["data"][0]["committed"], 0);

    let (status, body) = send(
        &app,
        get(&format!("/api/metrics/projects/{}/contribution", PROJECT)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"].as_array().unwrap().is_empty());

    let (status, _) = send(&app, get("/api/metrics/projects/ghost/velocity")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let response = app
        .clone()
        .oneshot(get(&format!("/api/metrics/export/projects/{}", PROJECT)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/csv");
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(
        std::str::from_utf8(&bytes).unwrap(),
        "Sprint,Task,Assignee,Status,Priority\nSprint 1,Fix bug,Student,TODO,MEDIUM\n"
    );
}
