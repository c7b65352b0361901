//! Sprint and project metrics derived from story and task completion.
//!
//! Nothing here is cached: every call recomputes from the current state of
//! the store. A missing sprint or project is NotFound; a root without
//! children (no stories, no tasks) yields zero-valued results.

pub mod burndown;

pub use burndown::{compute_burndown, Burndown, BurndownPoint};

use crate::error::Result;
use crate::storage::StorageBackend;
use crate::types::{Sprint, Task, User, UserStory};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Committed vs completed points of one sprint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VelocityEntry {
    /// Sprint name
    pub name: String,
    pub committed: i64,
    pub completed: i64,
}

impl VelocityEntry {
    pub fn from_stories(sprint: &Sprint, stories: &[UserStory]) -> Self {
        let committed = stories.iter().map(UserStory::points).sum();
        let completed = stories
            .iter()
            .filter(|s| s.completed_at.is_some())
            .map(UserStory::points)
            .sum();

        Self {
            name: sprint.name.clone(),
            committed,
            completed,
        }
    }
}

/// Completed-task count of one assignee
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContributionEntry {
    pub user: User,
    pub count: usize,
}

/// Count finished tasks per assignee, highest count first
///
/// Unassigned tasks are skipped. Ties keep the order in which assignees
/// first appear in `tasks`.
pub fn count_completed_by_assignee(tasks: &[Task]) -> Vec<(String, usize)> {
    let mut counts: Vec<(String, usize)> = Vec::new();
    for task in tasks.iter().filter(|t| t.is_done()) {
        let Some(assignee_id) = &task.assignee_id else {
            continue;
        };
        match counts.iter_mut().find(|(id, _)| id == assignee_id) {
            Some((_, count)) => *count += 1,
            None => counts.push((assignee_id.clone(), 1)),
        }
    }
    // sort_by is stable
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts
}

/// Read-only metrics over the planning records
pub struct MetricsEngine {
    storage: Arc<dyn StorageBackend>,
}

impl MetricsEngine {
    pub fn new(storage: Arc<dyn StorageBackend>) -> Self {
        Self { storage }
    }

    pub async fn burndown(&self, sprint_id: &str) -> Result<Burndown> {
        self.burndown_at(sprint_id, Utc::now()).await
    }

    /// Burndown as seen at `now`
    pub async fn burndown_at(&self, sprint_id: &str, now: DateTime<Utc>) -> Result<Burndown> {
        let sprint = self.storage.get_sprint(sprint_id).await?;
        let stories = self.storage.list_stories_by_sprint(sprint_id).await?;
        debug!("Burndown for sprint {} over {} stories", sprint_id, stories.len());

        Ok(compute_burndown(&sprint, &stories, now))
    }

    /// One entry per sprint of the project, by start date ascending
    pub async fn velocity(&self, project_id: &str) -> Result<Vec<VelocityEntry>> {
        self.storage.get_project(project_id).await?;
        let sprints = self.storage.list_sprints(project_id).await?;

        let mut entries = Vec::with_capacity(sprints.len());
        for sprint in &sprints {
            let stories = self.storage.list_stories_by_sprint(&sprint.id).await?;
            entries.push(VelocityEntry::from_stories(sprint, &stories));
        }
        Ok(entries)
    }

    pub async fn contribution(&self, project_id: &str) -> Result<Vec<ContributionEntry>> {
        self.storage.get_project(project_id).await?;
        let tasks = self.storage.list_tasks_by_project(project_id).await?;

        let mut entries = Vec::new();
        for (assignee_id, count) in count_completed_by_assignee(&tasks) {
            let user = self.storage.get_user(&assignee_id).await?;
            entries.push(ContributionEntry { user, count });
        }
        Ok(entries)
    }
}
