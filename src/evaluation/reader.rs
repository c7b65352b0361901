//! Scoped evaluation retrieval.

use crate::error::{Result, SprintlensError};
use crate::storage::{EvaluationScope, StorageBackend};
use crate::types::{Evaluation, EvaluationDetail, EvaluationId, User};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

/// Read-only access to evaluations with evaluator and scores attached
pub struct EvaluationReader {
    storage: Arc<dyn StorageBackend>,
}

impl EvaluationReader {
    pub fn new(storage: Arc<dyn StorageBackend>) -> Self {
        Self { storage }
    }

    pub async fn get(&self, id: &EvaluationId) -> Result<EvaluationDetail> {
        let evaluation = self.storage.get_evaluation(id).await?;
        self.attach_details(vec![evaluation])
            .await?
            .pop()
            .ok_or_else(|| SprintlensError::not_found("Evaluation", id.as_str()))
    }

    /// Evaluations of a task, newest first; NotFound for an unknown task
    pub async fn by_task(&self, task_id: &str) -> Result<Vec<EvaluationDetail>> {
        self.storage.get_task(task_id).await?;
        self.by_scope(EvaluationScope::Task(task_id.to_string())).await
    }

    /// Sprint-level evaluations, newest first; NotFound for an unknown sprint
    pub async fn by_sprint(&self, sprint_id: &str) -> Result<Vec<EvaluationDetail>> {
        self.storage.get_sprint(sprint_id).await?;
        self.by_scope(EvaluationScope::Sprint(sprint_id.to_string())).await
    }

    /// Project evaluations attached to neither a task nor a sprint
    pub async fn by_project_general(&self, project_id: &str) -> Result<Vec<EvaluationDetail>> {
        self.storage.get_project(project_id).await?;
        self.by_scope(EvaluationScope::ProjectGeneral(project_id.to_string()))
            .await
    }

    /// Everything a student has been evaluated on
    ///
    /// Merges task-level evaluations of tasks assigned to the student with
    /// team-level evaluations (no task) of every project the student belongs
    /// to. The second set excludes task rows, so the two never overlap.
    pub async fn for_student(&self, student_id: &str) -> Result<Vec<EvaluationDetail>> {
        self.storage.get_user(student_id).await?;

        let mut evaluations = self
            .storage
            .list_evaluations(&EvaluationScope::AssignedTo(student_id.to_string()))
            .await?;
        let task_level = evaluations.len();

        let project_ids = self.storage.list_member_project_ids(student_id).await?;
        if !project_ids.is_empty() {
            let team = self
                .storage
                .list_evaluations(&EvaluationScope::TeamLevel(project_ids))
                .await?;
            evaluations.extend(team);
        }

        debug!(
            "Student {}: {} task-level and {} team-level evaluations",
            student_id,
            task_level,
            evaluations.len() - task_level
        );

        evaluations.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        self.attach_details(evaluations).await
    }

    async fn by_scope(&self, scope: EvaluationScope) -> Result<Vec<EvaluationDetail>> {
        let evaluations = self.storage.list_evaluations(&scope).await?;
        self.attach_details(evaluations).await
    }

    /// Attach evaluator and criterion scores, preserving input order
    async fn attach_details(&self, evaluations: Vec<Evaluation>) -> Result<Vec<EvaluationDetail>> {
        let evaluator_ids: HashSet<&str> = evaluations
            .iter()
            .map(|e| e.evaluator_id.as_str())
            .collect();

        let mut evaluators: HashMap<String, User> = HashMap::with_capacity(evaluator_ids.len());
        for evaluator_id in evaluator_ids {
            let user = self.storage.get_user(evaluator_id).await?;
            evaluators.insert(evaluator_id.to_string(), user);
        }

        let mut details = Vec::with_capacity(evaluations.len());
        for evaluation in evaluations {
            let criteria = self.storage.list_criterion_scores(&evaluation.id).await?;
            let evaluator = evaluators
                .get(&evaluation.evaluator_id)
                .cloned()
                .ok_or_else(|| SprintlensError::not_found("User", evaluation.evaluator_id.clone()))?;
            details.push(EvaluationDetail {
                evaluation,
                evaluator,
                criteria,
            });
        }
        Ok(details)
    }
}
