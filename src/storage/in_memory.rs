//! In-memory storage backend
//!
//! Keeps every table in a single `RwLock`-guarded struct and enforces the
//! same referential and uniqueness rules as the SQL schema. A write scope
//! holds the write lock for its lifetime and restores the snapshot taken at
//! `begin_write` unless it is committed.

use crate::error::{Result, SprintlensError};
use crate::storage::{evaluation_not_found, EvaluationScope, StorageBackend, WriteScope};
use crate::types::{
    Criterion, Evaluation, EvaluationCriterionScore, EvaluationId, Notification, Project,
    ProjectMember, Rubric, RubricId, Sprint, Task, User, UserStory,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{OwnedRwLockWriteGuard, RwLock};
use tracing::debug;

#[derive(Debug, Clone, Default)]
struct Tables {
    users: HashMap<String, User>,
    projects: HashMap<String, Project>,
    members: Vec<ProjectMember>,
    sprints: Vec<Sprint>,
    stories: Vec<UserStory>,
    tasks: Vec<Task>,
    rubrics: Vec<Rubric>,
    criteria: Vec<Criterion>,
    evaluations: Vec<Evaluation>,
    scores: Vec<EvaluationCriterionScore>,
    notifications: Vec<Notification>,
}

fn constraint(message: impl Into<String>) -> SprintlensError {
    SprintlensError::ConstraintViolation(message.into())
}

fn newest_first(a: &Evaluation, b: &Evaluation) -> Ordering {
    b.created_at
        .cmp(&a.created_at)
        .then_with(|| b.id.cmp(&a.id))
}

impl Tables {
    fn require_user(&self, id: &str) -> Result<()> {
        if self.users.contains_key(id) {
            Ok(())
        } else {
            Err(constraint(format!("FOREIGN KEY constraint failed: user {}", id)))
        }
    }

    fn require_project(&self, id: &str) -> Result<()> {
        if self.projects.contains_key(id) {
            Ok(())
        } else {
            Err(constraint(format!("FOREIGN KEY constraint failed: project {}", id)))
        }
    }

    fn require_sprint(&self, id: &str) -> Result<()> {
        if self.sprints.iter().any(|s| s.id == id) {
            Ok(())
        } else {
            Err(constraint(format!("FOREIGN KEY constraint failed: sprint {}", id)))
        }
    }

    fn require_task(&self, id: &str) -> Result<()> {
        if self.tasks.iter().any(|t| t.id == id) {
            Ok(())
        } else {
            Err(constraint(format!("FOREIGN KEY constraint failed: task {}", id)))
        }
    }

    fn rubric_with_criteria(&self, rubric: &Rubric) -> Rubric {
        let mut rubric = rubric.clone();
        rubric.criteria = self
            .criteria
            .iter()
            .filter(|c| c.rubric_id == rubric.id)
            .cloned()
            .collect();
        rubric
    }
}

/// In-memory storage backend
#[derive(Clone, Default)]
pub struct InMemoryStorage {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_user(&self, user: &User) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables.users.contains_key(&user.id) {
            return Err(constraint(format!("UNIQUE constraint failed: users.id {}", user.id)));
        }
        tables.users.insert(user.id.clone(), user.clone());
        Ok(())
    }

    pub async fn insert_project(&self, project: &Project) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.require_user(&project.owner_id)?;
        if tables.projects.contains_key(&project.id) {
            return Err(constraint(format!(
                "UNIQUE constraint failed: projects.id {}",
                project.id
            )));
        }
        tables.projects.insert(project.id.clone(), project.clone());
        Ok(())
    }

    pub async fn add_project_member(&self, member: &ProjectMember) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.require_project(&member.project_id)?;
        tables.require_user(&member.user_id)?;
        if tables
            .members
            .iter()
            .any(|m| m.project_id == member.project_id && m.user_id == member.user_id)
        {
            return Err(constraint("UNIQUE constraint failed: project_members"));
        }
        tables.members.push(member.clone());
        Ok(())
    }

    pub async fn insert_sprint(&self, sprint: &Sprint) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.require_project(&sprint.project_id)?;
        tables.sprints.push(sprint.clone());
        Ok(())
    }

    pub async fn insert_story(&self, story: &UserStory) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.require_project(&story.project_id)?;
        if let Some(sprint_id) = &story.sprint_id {
            tables.require_sprint(sprint_id)?;
        }
        if let Some(assignee_id) = &story.assignee_id {
            tables.require_user(assignee_id)?;
        }
        tables.stories.push(story.clone());
        Ok(())
    }

    pub async fn insert_task(&self, task: &Task) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.require_project(&task.project_id)?;
        if let Some(sprint_id) = &task.sprint_id {
            tables.require_sprint(sprint_id)?;
        }
        if let Some(assignee_id) = &task.assignee_id {
            tables.require_user(assignee_id)?;
        }
        tables.tasks.push(task.clone());
        Ok(())
    }

    /// Number of stored evaluations and criterion scores
    pub async fn scoring_row_counts(&self) -> (usize, usize) {
        let tables = self.tables.read().await;
        (tables.evaluations.len(), tables.scores.len())
    }
}

#[async_trait]
impl StorageBackend for InMemoryStorage {
    async fn begin_write(&self) -> Result<Box<dyn WriteScope>> {
        let guard = self.tables.clone().write_owned().await;
        let snapshot = guard.clone();
        Ok(Box::new(InMemoryWriteScope {
            guard,
            snapshot: Some(snapshot),
        }))
    }

    async fn get_user(&self, id: &str) -> Result<User> {
        let tables = self.tables.read().await;
        tables
            .users
            .get(id)
            .cloned()
            .ok_or_else(|| SprintlensError::not_found("User", id))
    }

    async fn get_project(&self, id: &str) -> Result<Project> {
        let tables = self.tables.read().await;
        tables
            .projects
            .get(id)
            .cloned()
            .ok_or_else(|| SprintlensError::not_found("Project", id))
    }

    async fn list_member_project_ids(&self, user_id: &str) -> Result<Vec<String>> {
        let tables = self.tables.read().await;
        Ok(tables
            .members
            .iter()
            .filter(|m| m.user_id == user_id)
            .map(|m| m.project_id.clone())
            .collect())
    }

    async fn get_sprint(&self, id: &str) -> Result<Sprint> {
        let tables = self.tables.read().await;
        tables
            .sprints
            .iter()
            .find(|s| s.id == id)
            .cloned()
            .ok_or_else(|| SprintlensError::not_found("Sprint", id))
    }

    async fn list_sprints(&self, project_id: &str) -> Result<Vec<Sprint>> {
        let tables = self.tables.read().await;
        let mut sprints: Vec<Sprint> = tables
            .sprints
            .iter()
            .filter(|s| s.project_id == project_id)
            .cloned()
            .collect();
        // None sorts before Some, matching SQLite's NULLS FIRST
        sprints.sort_by(|a, b| {
            a.start_date
                .cmp(&b.start_date)
                .then_with(|| a.created_at.cmp(&b.created_at))
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(sprints)
    }

    async fn list_stories_by_sprint(&self, sprint_id: &str) -> Result<Vec<UserStory>> {
        let tables = self.tables.read().await;
        Ok(tables
            .stories
            .iter()
            .filter(|s| s.sprint_id.as_deref() == Some(sprint_id))
            .cloned()
            .collect())
    }

    async fn get_task(&self, id: &str) -> Result<Task> {
        let tables = self.tables.read().await;
        tables
            .tasks
            .iter()
            .find(|t| t.id == id)
            .cloned()
            .ok_or_else(|| SprintlensError::not_found("Task", id))
    }

    async fn list_tasks_by_project(&self, project_id: &str) -> Result<Vec<Task>> {
        let tables = self.tables.read().await;
        let mut tasks: Vec<Task> = tables
            .tasks
            .iter()
            .filter(|t| t.project_id == project_id)
            .cloned()
            .collect();
        tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(tasks)
    }

    async fn list_tasks_by_sprint(&self, sprint_id: &str) -> Result<Vec<Task>> {
        let tables = self.tables.read().await;
        let mut tasks: Vec<Task> = tables
            .tasks
            .iter()
            .filter(|t| t.sprint_id.as_deref() == Some(sprint_id))
            .cloned()
            .collect();
        tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(tasks)
    }

    async fn get_rubric(&self, id: &RubricId) -> Result<Rubric> {
        let tables = self.tables.read().await;
        tables
            .rubrics
            .iter()
            .find(|r| &r.id == id)
            .map(|r| tables.rubric_with_criteria(r))
            .ok_or_else(|| SprintlensError::not_found("Rubric", id.as_str()))
    }

    async fn list_rubrics(&self, project_id: Option<&str>) -> Result<Vec<Rubric>> {
        let tables = self.tables.read().await;
        let mut rubrics: Vec<Rubric> = tables
            .rubrics
            .iter()
            .filter(|r| project_id.is_none() || r.project_id.as_deref() == project_id)
            .map(|r| tables.rubric_with_criteria(r))
            .collect();
        rubrics.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(rubrics)
    }

    async fn delete_rubric(&self, id: &RubricId) -> Result<()> {
        let mut tables = self.tables.write().await;
        if !tables.rubrics.iter().any(|r| &r.id == id) {
            return Err(SprintlensError::not_found("Rubric", id.as_str()));
        }

        let referenced = tables.scores.iter().any(|score| {
            tables
                .criteria
                .iter()
                .any(|c| &c.rubric_id == id && c.id == score.criterion_id)
        });
        if referenced {
            return Err(constraint(format!(
                "FOREIGN KEY constraint failed: criteria of rubric {} are scored",
                id
            )));
        }

        tables.criteria.retain(|c| &c.rubric_id != id);
        tables.rubrics.retain(|r| &r.id != id);
        Ok(())
    }

    async fn get_evaluation(&self, id: &EvaluationId) -> Result<Evaluation> {
        let tables = self.tables.read().await;
        tables
            .evaluations
            .iter()
            .find(|e| &e.id == id)
            .cloned()
            .ok_or_else(|| evaluation_not_found(id))
    }

    async fn list_evaluations(&self, scope: &EvaluationScope) -> Result<Vec<Evaluation>> {
        debug!("Listing evaluations: {:?}", scope);

        let tables = self.tables.read().await;
        let matches = |e: &Evaluation| -> bool {
            match scope {
                EvaluationScope::Task(task_id) => e.task_id.as_deref() == Some(task_id.as_str()),
                EvaluationScope::Sprint(sprint_id) => {
                    e.sprint_id.as_deref() == Some(sprint_id.as_str())
                }
                EvaluationScope::ProjectGeneral(project_id) => {
                    &e.project_id == project_id && e.task_id.is_none() && e.sprint_id.is_none()
                }
                EvaluationScope::AssignedTo(user_id) => e.task_id.as_ref().is_some_and(|task_id| {
                    tables
                        .tasks
                        .iter()
                        .any(|t| &t.id == task_id && t.assignee_id.as_ref() == Some(user_id))
                }),
                EvaluationScope::TeamLevel(project_ids) => {
                    e.task_id.is_none() && project_ids.contains(&e.project_id)
                }
            }
        };

        let mut evaluations: Vec<Evaluation> =
            tables.evaluations.iter().filter(|e| matches(e)).cloned().collect();
        evaluations.sort_by(newest_first);
        Ok(evaluations)
    }

    async fn list_criterion_scores(
        &self,
        evaluation_id: &EvaluationId,
    ) -> Result<Vec<EvaluationCriterionScore>> {
        let tables = self.tables.read().await;
        Ok(tables
            .scores
            .iter()
            .filter(|s| &s.evaluation_id == evaluation_id)
            .cloned()
            .collect())
    }

    async fn insert_notification(&self, notification: &Notification) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.require_user(&notification.user_id)?;
        tables.notifications.push(notification.clone());
        Ok(())
    }

    async fn list_notifications(&self, user_id: &str) -> Result<Vec<Notification>> {
        let tables = self.tables.read().await;
        let mut notifications: Vec<Notification> = tables
            .notifications
            .iter()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect();
        notifications.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        Ok(notifications)
    }
}

/// Write scope holding the table write lock
pub struct InMemoryWriteScope {
    guard: OwnedRwLockWriteGuard<Tables>,
    /// Present until the scope commits or rolls back
    snapshot: Option<Tables>,
}

impl Drop for InMemoryWriteScope {
    fn drop(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            *self.guard = snapshot;
        }
    }
}

#[async_trait]
impl WriteScope for InMemoryWriteScope {
    async fn insert_rubric(&mut self, rubric: &Rubric) -> Result<()> {
        let tables = &mut *self.guard;
        if let Some(project_id) = &rubric.project_id {
            tables.require_project(project_id)?;
        }
        if tables.rubrics.iter().any(|r| r.id == rubric.id) {
            return Err(constraint(format!("UNIQUE constraint failed: rubrics.id {}", rubric.id)));
        }
        let mut stored = rubric.clone();
        stored.criteria.clear();
        tables.rubrics.push(stored);
        Ok(())
    }

    async fn insert_criterion(&mut self, criterion: &Criterion) -> Result<()> {
        let tables = &mut *self.guard;
        if !tables.rubrics.iter().any(|r| r.id == criterion.rubric_id) {
            return Err(constraint(format!(
                "FOREIGN KEY constraint failed: rubric {}",
                criterion.rubric_id
            )));
        }
        if criterion.max_score <= 0 {
            return Err(constraint("CHECK constraint failed: max_score > 0"));
        }
        if tables.criteria.iter().any(|c| c.id == criterion.id) {
            return Err(constraint(format!(
                "UNIQUE constraint failed: criteria.id {}",
                criterion.id
            )));
        }
        tables.criteria.push(criterion.clone());
        Ok(())
    }

    async fn insert_evaluation(&mut self, evaluation: &Evaluation) -> Result<()> {
        let tables = &mut *self.guard;
        tables.require_project(&evaluation.project_id)?;
        tables.require_user(&evaluation.evaluator_id)?;
        if let Some(task_id) = &evaluation.task_id {
            tables.require_task(task_id)?;
        }
        if let Some(sprint_id) = &evaluation.sprint_id {
            tables.require_sprint(sprint_id)?;
        }
        if tables.evaluations.iter().any(|e| e.id == evaluation.id) {
            return Err(constraint(format!(
                "UNIQUE constraint failed: evaluations.id {}",
                evaluation.id
            )));
        }
        tables.evaluations.push(evaluation.clone());
        Ok(())
    }

    async fn update_evaluation(
        &mut self,
        id: &EvaluationId,
        feedback: Option<&str>,
        score: Option<i64>,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        let evaluation = self
            .guard
            .evaluations
            .iter_mut()
            .find(|e| &e.id == id)
            .ok_or_else(|| evaluation_not_found(id))?;

        evaluation.feedback = feedback.map(str::to_string);
        evaluation.score = score;
        evaluation.updated_at = updated_at;
        Ok(())
    }

    async fn delete_criterion_scores(&mut self, evaluation_id: &EvaluationId) -> Result<()> {
        self.guard
            .scores
            .retain(|s| &s.evaluation_id != evaluation_id);
        Ok(())
    }

    async fn insert_criterion_score(&mut self, score: &EvaluationCriterionScore) -> Result<()> {
        let tables = &mut *self.guard;
        if !tables.evaluations.iter().any(|e| e.id == score.evaluation_id) {
            return Err(constraint(format!(
                "FOREIGN KEY constraint failed: evaluation {}",
                score.evaluation_id
            )));
        }
        if !tables.criteria.iter().any(|c| c.id == score.criterion_id) {
            return Err(constraint(format!(
                "FOREIGN KEY constraint failed: criterion {}",
                score.criterion_id
            )));
        }
        if tables
            .scores
            .iter()
            .any(|s| s.evaluation_id == score.evaluation_id && s.criterion_id == score.criterion_id)
        {
            return Err(constraint(format!(
                "UNIQUE constraint failed: evaluation_criteria ({}, {})",
                score.evaluation_id, score.criterion_id
            )));
        }
        tables.scores.push(score.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let mut scope = self;
        scope.snapshot = None;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        // Drop restores the snapshot
        Ok(())
    }
}
