//! Evaluation writer and reader against a libSQL database

mod common;

use chrono::{TimeZone, Utc};
use common::{create_test_storage, seed_project, seed_rubric, PROJECT, SPRINT, STUDENT, TASK, TEACHER};
use sprintlens_core::storage::libsql::ScoringTable;
use sprintlens_core::{
    CriterionId, CriterionScoreInput, Evaluation, EvaluationId, EvaluationReader,
    EvaluationStatus, EvaluationUpdate, EvaluationWriter, LogNotificationSink, NewEvaluation,
    StorageBackend, StoredNotificationSink, TaskEvaluationRequest, WriteScope,
};
use std::sync::Arc;

fn writer(storage: Arc<sprintlens_core::LibsqlStorage>) -> EvaluationWriter {
    EvaluationWriter::new(storage, Arc::new(LogNotificationSink))
}

fn sprint_evaluation(scores: Vec<CriterionScoreInput>) -> NewEvaluation {
    NewEvaluation {
        project_id: PROJECT.to_string(),
        evaluator_id: TEACHER.to_string(),
        sprint_id: Some(SPRINT.to_string()),
        feedback: Some("Solid sprint".to_string()),
        score: Some(88),
        criteria_scores: scores,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_failing_score_insert_rolls_back_everything() {
    let storage = create_test_storage().await;
    seed_project(&storage).await;
    let criteria = seed_rubric(storage.clone(), &["Quality", "Tests", "Docs", "Design"]).await;
    let writer = writer(storage.clone());

    // Make the k-th insert reference a criterion that does not exist
    for k in 0..criteria.len() {
        let scores: Vec<CriterionScoreInput> = criteria
            .iter()
            .enumerate()
            .map(|(i, id)| {
                if i == k {
                    CriterionScoreInput::new("missing-criterion", 1)
                } else {
                    CriterionScoreInput::new(id.clone(), 5)
                }
            })
            .collect();

        let err = writer.create(sprint_evaluation(scores)).await.unwrap_err();
        assert!(err.is_constraint_violation(), "attempt {}: {}", k, err);
        assert_eq!(storage.count_rows(ScoringTable::Evaluations).await.unwrap(), 0);
        assert_eq!(storage.count_rows(ScoringTable::CriterionScores).await.unwrap(), 0);
    }

    // And the same with a duplicated pair as the last insert
    let mut scores: Vec<CriterionScoreInput> = criteria
        .iter()
        .map(|id| CriterionScoreInput::new(id.clone(), 5))
        .collect();
    scores.push(CriterionScoreInput::new(criteria[0].clone(), 9));

    let err = writer.create(sprint_evaluation(scores)).await.unwrap_err();
    assert!(err.is_constraint_violation());
    assert_eq!(storage.count_rows(ScoringTable::Evaluations).await.unwrap(), 0);
    assert_eq!(storage.count_rows(ScoringTable::CriterionScores).await.unwrap(), 0);
}

#[tokio::test]
async fn test_create_then_read_back() {
    let storage = create_test_storage().await;
    seed_project(&storage).await;
    let criteria = seed_rubric(storage.clone(), &["Quality", "Tests"]).await;

    let id = writer(storage.clone())
        .create(sprint_evaluation(vec![
            CriterionScoreInput::new(criteria[0].clone(), 5),
            CriterionScoreInput::new(criteria[1].clone(), 7),
        ]))
        .await
        .unwrap();

    let detail = EvaluationReader::new(storage.clone()).get(&id).await.unwrap();
    assert_eq!(detail.evaluation.status, EvaluationStatus::Completed);
    assert_eq!(detail.evaluation.score, Some(88));
    assert_eq!(detail.evaluation.sprint_id.as_deref(), Some(SPRINT));
    assert_eq!(detail.evaluator.id, TEACHER);
    assert_eq!(detail.criteria.len(), 2);

    let sprint_view = EvaluationReader::new(storage).by_sprint(SPRINT).await.unwrap();
    assert_eq!(sprint_view.len(), 1);
    assert_eq!(sprint_view[0].evaluation.id, id);
}

#[tokio::test]
async fn test_update_replaces_criterion_scores() {
    let storage = create_test_storage().await;
    seed_project(&storage).await;
    let criteria = seed_rubric(storage.clone(), &["A", "B"]).await;
    let (a, b) = (criteria[0].clone(), criteria[1].clone());
    let writer = writer(storage.clone());

    let id = writer
        .create(sprint_evaluation(vec![
            CriterionScoreInput::new(a.clone(), 5),
            CriterionScoreInput::new(b.clone(), 7),
        ]))
        .await
        .unwrap();

    writer
        .update(
            &id,
            EvaluationUpdate {
                feedback: Some("Revised".to_string()),
                score: Some(91),
                criteria_scores: vec![CriterionScoreInput::new(a.clone(), 9)],
            },
        )
        .await
        .unwrap();

    let scores = storage.list_criterion_scores(&id).await.unwrap();
    assert_eq!(scores.len(), 1);
    assert_eq!(scores[0].criterion_id, a);
    assert_eq!(scores[0].score, 9);
    assert!(scores.iter().all(|s| s.criterion_id != b));

    let evaluation = storage.get_evaluation(&id).await.unwrap();
    assert_eq!(evaluation.feedback.as_deref(), Some("Revised"));
    assert_eq!(evaluation.score, Some(91));
}

#[tokio::test]
async fn test_failed_update_leaves_evaluation_untouched() {
    let storage = create_test_storage().await;
    seed_project(&storage).await;
    let criteria = seed_rubric(storage.clone(), &["A", "B"]).await;
    let writer = writer(storage.clone());

    let id = writer
        .create(sprint_evaluation(vec![CriterionScoreInput::new(criteria[1].clone(), 7)]))
        .await
        .unwrap();

    let err = writer
        .update(
            &id,
            EvaluationUpdate {
                feedback: Some("Should not stick".to_string()),
                score: Some(1),
                criteria_scores: vec![
                    CriterionScoreInput::new(criteria[0].clone(), 3),
                    CriterionScoreInput::new(CriterionId::from("missing"), 3),
                ],
            },
        )
        .await
        .unwrap_err();
    assert!(err.is_constraint_violation());

    let evaluation = storage.get_evaluation(&id).await.unwrap();
    assert_eq!(evaluation.feedback.as_deref(), Some("Solid sprint"));
    assert_eq!(evaluation.score, Some(88));
    let scores = storage.list_criterion_scores(&id).await.unwrap();
    assert_eq!(scores.len(), 1);
    assert_eq!(scores[0].criterion_id, criteria[1]);
}

#[tokio::test]
async fn test_update_of_unknown_evaluation_is_not_found() {
    let storage = create_test_storage().await;
    seed_project(&storage).await;

    let err = writer(storage)
        .update(&EvaluationId::from("ghost"), EvaluationUpdate::default())
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_student_view_merges_task_and_team_evaluations() {
    let storage = create_test_storage().await;
    seed_project(&storage).await;

    let task_level = Evaluation {
        id: EvaluationId::from("task-level"),
        project_id: PROJECT.to_string(),
        task_id: Some(TASK.to_string()),
        sprint_id: None,
        evaluator_id: TEACHER.to_string(),
        status: EvaluationStatus::Completed,
        feedback: None,
        score: Some(70),
        created_at: Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap(),
        updated_at: Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap(),
    };
    let team_level = Evaluation {
        id: EvaluationId::from("team-level"),
        task_id: None,
        score: Some(80),
        created_at: Utc.with_ymd_and_hms(2021, 6, 1, 0, 0, 0).unwrap(),
        updated_at: Utc.with_ymd_and_hms(2021, 6, 1, 0, 0, 0).unwrap(),
        ..task_level.clone()
    };

    let mut scope = storage.begin_write().await.unwrap();
    scope.insert_evaluation(&task_level).await.unwrap();
    scope.insert_evaluation(&team_level).await.unwrap();
    scope.commit().await.unwrap();

    let details = EvaluationReader::new(storage).for_student(STUDENT).await.unwrap();
    let ids: Vec<&str> = details.iter().map(|d| d.evaluation.id.as_str()).collect();
    assert_eq!(ids, vec!["team-level", "task-level"]);
}

#[tokio::test]
async fn test_task_evaluation_stores_notification_for_assignee() {
    let storage = create_test_storage().await;
    seed_project(&storage).await;

    let writer = EvaluationWriter::new(
        storage.clone(),
        Arc::new(StoredNotificationSink::new(storage.clone())),
    );
    let id = writer
        .evaluate_task(
            TASK,
            TaskEvaluationRequest {
                evaluator_id: TEACHER.to_string(),
                feedback: Some("Clean fix".to_string()),
                score: Some(95),
                criteria_scores: vec![],
            },
        )
        .await
        .unwrap();

    let evaluation = storage.get_evaluation(&id).await.unwrap();
    assert_eq!(evaluation.task_id.as_deref(), Some(TASK));
    assert_eq!(evaluation.sprint_id, None);
    assert_eq!(evaluation.project_id, PROJECT);

    let reader = EvaluationReader::new(storage.clone());
    assert!(reader.by_sprint(SPRINT).await.unwrap().is_empty());
    assert_eq!(reader.by_task(TASK).await.unwrap().len(), 1);

    let notifications = storage.list_notifications(STUDENT).await.unwrap();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].title, "Task evaluated");
    assert_eq!(notifications[0].message, "Your task \"Fix bug\" has been evaluated");
    assert_eq!(notifications[0].kind, "EVALUATION_COMPLETED");
    assert!(!notifications[0].read);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_creates_all_commit() {
    let storage = create_test_storage().await;
    seed_project(&storage).await;
    let criteria = seed_rubric(storage.clone(), &["Quality", "Tests"]).await;
    let writer = Arc::new(writer(storage.clone()));

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let writer = writer.clone();
            let scores = vec![
                CriterionScoreInput::new(criteria[0].clone(), i),
                CriterionScoreInput::new(criteria[1].clone(), i + 1),
            ];
            tokio::spawn(async move { writer.create(sprint_evaluation(scores)).await })
        })
        .collect();

    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(storage.count_rows(ScoringTable::Evaluations).await.unwrap(), 16);
    assert_eq!(storage.count_rows(ScoringTable::CriterionScores).await.unwrap(), 32);
    assert_eq!(
        EvaluationReader::new(storage).by_sprint(SPRINT).await.unwrap().len(),
        16
    );
}
