//! Evaluation writer.
//!
//! Creates and updates evaluations together with their criterion scores
//! inside a single write scope.

use crate::error::Result;
use crate::evaluation::require_non_empty;
use crate::notifications::NotificationSink;
use crate::storage::{finish_write, StorageBackend, WriteScope};
use crate::types::{
    new_row_id, CriterionScoreInput, Evaluation, EvaluationCriterionScore, EvaluationId,
    EvaluationStatus, EVALUATION_COMPLETED,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

const TASK_EVALUATED_TITLE: &str = "Task evaluated";

/// Request to create an evaluation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEvaluation {
    pub project_id: String,
    pub evaluator_id: String,
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub sprint_id: Option<String>,
    #[serde(default)]
    pub feedback: Option<String>,
    #[serde(default)]
    pub score: Option<i64>,
    #[serde(default)]
    pub criteria_scores: Vec<CriterionScoreInput>,
}

/// Replacement feedback, holistic score and full criterion score set
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationUpdate {
    #[serde(default)]
    pub feedback: Option<String>,
    #[serde(default)]
    pub score: Option<i64>,
    #[serde(default)]
    pub criteria_scores: Vec<CriterionScoreInput>,
}

/// Evaluation of a single task; project and sprint come from the task
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskEvaluationRequest {
    pub evaluator_id: String,
    #[serde(default)]
    pub feedback: Option<String>,
    #[serde(default)]
    pub score: Option<i64>,
    #[serde(default)]
    pub criteria_scores: Vec<CriterionScoreInput>,
}

/// The only mutator of evaluations
pub struct EvaluationWriter {
    storage: Arc<dyn StorageBackend>,
    notifier: Arc<dyn NotificationSink>,
}

impl EvaluationWriter {
    pub fn new(storage: Arc<dyn StorageBackend>, notifier: Arc<dyn NotificationSink>) -> Self {
        Self { storage, notifier }
    }

    /// Insert an evaluation and one score row per supplied pair
    ///
    /// Either everything is persisted or nothing is. The evaluation is
    /// stored as `COMPLETED`.
    pub async fn create(&self, request: NewEvaluation) -> Result<EvaluationId> {
        require_non_empty("projectId", &request.project_id)?;
        require_non_empty("evaluatorId", &request.evaluator_id)?;
        validate_scores(&request.criteria_scores)?;

        // Checked before the scope opens so a missing root is NotFound
        // rather than a foreign-key failure
        self.storage.get_project(&request.project_id).await?;

        let now = Utc::now();
        let evaluation = Evaluation {
            id: EvaluationId::new(),
            project_id: request.project_id,
            task_id: request.task_id,
            sprint_id: request.sprint_id,
            evaluator_id: request.evaluator_id,
            status: EvaluationStatus::Completed,
            feedback: request.feedback,
            score: request.score,
            created_at: now,
            updated_at: now,
        };

        let mut scope = self.storage.begin_write().await?;
        let outcome = insert_evaluation(scope.as_mut(), &evaluation, &request.criteria_scores).await;
        finish_write(scope, outcome).await?;

        info!(
            "Created {:?}-level evaluation {} for project {} with {} criterion scores",
            evaluation.level(),
            evaluation.id,
            evaluation.project_id,
            request.criteria_scores.len()
        );
        Ok(evaluation.id)
    }

    /// Overwrite feedback and score, and replace the criterion score set
    ///
    /// Criteria scored before but absent from `update` lose their score.
    pub async fn update(&self, id: &EvaluationId, update: EvaluationUpdate) -> Result<()> {
        validate_scores(&update.criteria_scores)?;

        let mut scope = self.storage.begin_write().await?;
        let outcome = replace_evaluation(scope.as_mut(), id, &update, Utc::now()).await;
        finish_write(scope, outcome).await?;

        info!(
            "Updated evaluation {} with {} criterion scores",
            id,
            update.criteria_scores.len()
        );
        Ok(())
    }

    /// Evaluate a task and notify its assignee
    ///
    /// The notification is sent only after the evaluation is committed, and
    /// a failing sink does not fail the evaluation.
    pub async fn evaluate_task(
        &self,
        task_id: &str,
        request: TaskEvaluationRequest,
    ) -> Result<EvaluationId> {
        let task = self.storage.get_task(task_id).await?;

        let id = self
            .create(NewEvaluation {
                project_id: task.project_id.clone(),
                evaluator_id: request.evaluator_id,
                task_id: Some(task.id.clone()),
                sprint_id: None,
                feedback: request.feedback,
                score: request.score,
                criteria_scores: request.criteria_scores,
            })
            .await?;

        if let Some(assignee_id) = &task.assignee_id {
            let message = format!("Your task \"{}\" has been evaluated", task.title);
            match self
                .notifier
                .emit(assignee_id, TASK_EVALUATED_TITLE, &message, EVALUATION_COMPLETED)
                .await
            {
                Ok(()) => debug!("Notified {} about evaluation {}", assignee_id, id),
                Err(e) => warn!(
                    "Failed to notify {} about evaluation {}: {}",
                    assignee_id, id, e
                ),
            }
        }

        Ok(id)
    }
}

fn validate_scores(scores: &[CriterionScoreInput]) -> Result<()> {
    for input in scores {
        require_non_empty("criterionId", input.criterion_id.as_str())?;
    }
    Ok(())
}

async fn insert_scores(
    scope: &mut dyn WriteScope,
    evaluation_id: &EvaluationId,
    scores: &[CriterionScoreInput],
) -> Result<()> {
    for input in scores {
        scope
            .insert_criterion_score(&EvaluationCriterionScore {
                id: new_row_id(),
                evaluation_id: evaluation_id.clone(),
                criterion_id: input.criterion_id.clone(),
                score: input.score,
            })
            .await?;
    }
    Ok(())
}

async fn insert_evaluation(
    scope: &mut dyn WriteScope,
    evaluation: &Evaluation,
    scores: &[CriterionScoreInput],
) -> Result<()> {
    scope.insert_evaluation(evaluation).await?;
    insert_scores(scope, &evaluation.id, scores).await
}

async fn replace_evaluation(
    scope: &mut dyn WriteScope,
    id: &EvaluationId,
    update: &EvaluationUpdate,
    updated_at: DateTime<Utc>,
) -> Result<()> {
    scope
        .update_evaluation(id, update.feedback.as_deref(), update.score, updated_at)
        .await?;
    scope.delete_criterion_scores(id).await?;
    insert_scores(scope, id, &update.criteria_scores).await
}
