//! Storage layer for the Sprintlens engine
//!
//! `StorageBackend` covers reads over the planning records and the scoring
//! store, plus single-statement writes. Every multi-row write goes through a
//! [`WriteScope`]: begin, perform writes, then `commit` or `rollback`. A scope
//! that is dropped without committing rolls back.

pub mod in_memory;
pub mod libsql;
#[cfg(test)]
pub(crate) mod test_utils;

use crate::error::{Result, SprintlensError};
use crate::types::{
    Criterion, Evaluation, EvaluationCriterionScore, EvaluationId, Notification, Project, Rubric,
    RubricId, Sprint, Task, User, UserStory,
};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use tracing::warn;

/// Which evaluations to list
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvaluationScope {
    /// Evaluations attached to a task
    Task(String),
    /// Evaluations attached to a sprint
    Sprint(String),
    /// Project evaluations with neither task nor sprint
    ProjectGeneral(String),
    /// Task-level evaluations whose task is assigned to the user
    AssignedTo(String),
    /// Evaluations without a task in any of the given projects
    TeamLevel(Vec<String>),
}

/// Storage backend trait defining all required operations
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Open a transactional write scope
    async fn begin_write(&self) -> Result<Box<dyn WriteScope>>;

    // Planning records

    async fn get_user(&self, id: &str) -> Result<User>;

    async fn get_project(&self, id: &str) -> Result<Project>;

    /// Project ids the user is a member of
    async fn list_member_project_ids(&self, user_id: &str) -> Result<Vec<String>>;

    async fn get_sprint(&self, id: &str) -> Result<Sprint>;

    /// Sprints of a project, ordered by start date ascending (undated first)
    async fn list_sprints(&self, project_id: &str) -> Result<Vec<Sprint>>;

    async fn list_stories_by_sprint(&self, sprint_id: &str) -> Result<Vec<UserStory>>;

    async fn get_task(&self, id: &str) -> Result<Task>;

    /// Tasks of a project in creation order
    async fn list_tasks_by_project(&self, project_id: &str) -> Result<Vec<Task>>;

    /// Tasks of a sprint in creation order
    async fn list_tasks_by_sprint(&self, sprint_id: &str) -> Result<Vec<Task>>;

    // Scoring store

    async fn get_rubric(&self, id: &RubricId) -> Result<Rubric>;

    async fn list_rubrics(&self, project_id: Option<&str>) -> Result<Vec<Rubric>>;

    /// Delete a rubric and its criteria
    async fn delete_rubric(&self, id: &RubricId) -> Result<()>;

    async fn get_evaluation(&self, id: &EvaluationId) -> Result<Evaluation>;

    /// Evaluations in scope, newest first (ties by id descending)
    async fn list_evaluations(&self, scope: &EvaluationScope) -> Result<Vec<Evaluation>>;

    async fn list_criterion_scores(
        &self,
        evaluation_id: &EvaluationId,
    ) -> Result<Vec<EvaluationCriterionScore>>;

    // Notifications

    async fn insert_notification(&self, notification: &Notification) -> Result<()>;

    async fn list_notifications(&self, user_id: &str) -> Result<Vec<Notification>>;
}

/// Transactional write scope over the scoring store
///
/// Writes become visible only after `commit`. Any error from a write leaves
/// the scope usable only for `rollback`.
#[async_trait]
pub trait WriteScope: Send {
    async fn insert_rubric(&mut self, rubric: &Rubric) -> Result<()>;

    async fn insert_criterion(&mut self, criterion: &Criterion) -> Result<()>;

    async fn insert_evaluation(&mut self, evaluation: &Evaluation) -> Result<()>;

    /// Overwrite feedback and holistic score; NotFound if the row is absent
    async fn update_evaluation(
        &mut self,
        id: &EvaluationId,
        feedback: Option<&str>,
        score: Option<i64>,
        updated_at: DateTime<Utc>,
    ) -> Result<()>;

    async fn delete_criterion_scores(&mut self, evaluation_id: &EvaluationId) -> Result<()>;

    async fn insert_criterion_score(&mut self, score: &EvaluationCriterionScore) -> Result<()>;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// Commit the scope if `outcome` is Ok, otherwise roll it back and return
/// the original error
pub async fn finish_write(scope: Box<dyn WriteScope>, outcome: Result<()>) -> Result<()> {
    match outcome {
        Ok(()) => scope.commit().await,
        Err(err) => {
            if let Err(rollback_err) = scope.rollback().await {
                warn!("Rollback after failed write also failed: {}", rollback_err);
            }
            Err(err)
        }
    }
}

/// Fixed-width RFC3339 so that lexical order matches chronological order
pub(crate) fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc))
}

pub(crate) fn parse_optional_timestamp(s: Option<String>) -> Result<Option<DateTime<Utc>>> {
    s.as_deref().map(parse_timestamp).transpose()
}

pub(crate) fn evaluation_not_found(id: &EvaluationId) -> SprintlensError {
    SprintlensError::not_found("Evaluation", id.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_timestamp_format_is_sortable() {
        let whole = Utc.with_ymd_and_hms(2021, 1, 1, 12, 0, 0).unwrap();
        let later = whole + chrono::Duration::milliseconds(500);

        let a = format_timestamp(&whole);
        let b = format_timestamp(&later);
        assert_eq!(a, "2021-01-01T12:00:00.000000Z");
        assert!(a < b);
        assert_eq!(parse_timestamp(&b).unwrap(), later);
    }

    #[test]
    fn test_optional_timestamp() {
        assert_eq!(parse_optional_timestamp(None).unwrap(), None);
        assert!(parse_optional_timestamp(Some("garbage".to_string())).is_err());
    }
}
