//! Core data types for the Sprintlens engine
//!
//! Two groups of records live here. The scoring records (rubrics, criteria,
//! evaluations and their per-criterion scores) are owned by this crate. The
//! planning records (users, projects, sprints, stories, tasks) are owned by
//! the surrounding project-management system and only read by the engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Create a new random identifier
            pub fn new() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

string_id!(
    /// Unique identifier for evaluations
    EvaluationId
);
string_id!(
    /// Unique identifier for rubrics
    RubricId
);
string_id!(
    /// Unique identifier for rubric criteria
    CriterionId
);

/// Generate an identifier for rows that have no dedicated newtype
pub fn new_row_id() -> String {
    Uuid::new_v4().to_string()
}

/// Notification kind emitted once a task evaluation is stored
pub const EVALUATION_COMPLETED: &str = "EVALUATION_COMPLETED";

/// Task statuses that count as finished work
pub const DONE_TASK_STATUSES: [&str; 2] = ["COMPLETED", "DONE"];

// ---------------------------------------------------------------------------
// Planning records (read-only to the engine)
// ---------------------------------------------------------------------------

/// User account as exposed to evaluation and contribution results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: String,
    pub avatar: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(id: impl Into<String>, name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
            name: name.into(),
            role: "TEAM_DEVELOPER".to_string(),
            avatar: None,
            active: true,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub status: String,
    pub owner_id: String,
    pub created_at: DateTime<Utc>,
}

impl Project {
    pub fn new(id: impl Into<String>, name: impl Into<String>, owner_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            status: "ACTIVE".to_string(),
            owner_id: owner_id.into(),
            created_at: Utc::now(),
        }
    }
}

/// Membership of a user in a project team
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectMember {
    pub project_id: String,
    pub user_id: String,
    pub role: String,
}

/// Sprint with optional planned dates
///
/// Burndown needs both dates; a sprint missing either one simply has no
/// series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sprint {
    pub id: String,
    pub project_id: String,
    pub name: String,
    pub status: String,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Sprint {
    pub fn new(id: impl Into<String>, project_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            project_id: project_id.into(),
            name: name.into(),
            status: "PLANNING".to_string(),
            start_date: None,
            end_date: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_dates(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.start_date = Some(start);
        self.end_date = Some(end);
        self
    }
}

/// User story; `completed_at` is the only completion signal the metrics use
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStory {
    pub id: String,
    pub project_id: String,
    pub sprint_id: Option<String>,
    pub title: String,
    pub story_points: Option<i64>,
    pub status: String,
    pub assignee_id: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl UserStory {
    pub fn new(id: impl Into<String>, project_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            project_id: project_id.into(),
            sprint_id: None,
            title: title.into(),
            story_points: None,
            status: "BACKLOG".to_string(),
            assignee_id: None,
            completed_at: None,
            created_at: Utc::now(),
        }
    }

    pub fn in_sprint(mut self, sprint_id: impl Into<String>) -> Self {
        self.sprint_id = Some(sprint_id.into());
        self
    }

    pub fn with_points(mut self, points: i64) -> Self {
        self.story_points = Some(points);
        self
    }

    pub fn completed(mut self, at: DateTime<Utc>) -> Self {
        self.status = "DONE".to_string();
        self.completed_at = Some(at);
        self
    }

    /// Points counted toward sums; unestimated stories weigh nothing
    pub fn points(&self) -> i64 {
        self.story_points.unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub project_id: String,
    pub sprint_id: Option<String>,
    pub user_story_id: Option<String>,
    pub title: String,
    pub status: String,
    pub priority: String,
    pub assignee_id: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn new(id: impl Into<String>, project_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            project_id: project_id.into(),
            sprint_id: None,
            user_story_id: None,
            title: title.into(),
            status: "TODO".to_string(),
            priority: "MEDIUM".to_string(),
            assignee_id: None,
            completed_at: None,
            created_at: Utc::now(),
        }
    }

    pub fn in_sprint(mut self, sprint_id: impl Into<String>) -> Self {
        self.sprint_id = Some(sprint_id.into());
        self
    }

    pub fn assigned_to(mut self, user_id: impl Into<String>) -> Self {
        self.assignee_id = Some(user_id.into());
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = status.into();
        self
    }

    pub fn with_priority(mut self, priority: impl Into<String>) -> Self {
        self.priority = priority.into();
        self
    }

    pub fn is_done(&self) -> bool {
        DONE_TASK_STATUSES.contains(&self.status.as_str())
    }
}

// ---------------------------------------------------------------------------
// Scoring records (owned by the engine)
// ---------------------------------------------------------------------------

/// Named, reusable set of scoring criteria, optionally scoped to a project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rubric {
    pub id: RubricId,
    pub project_id: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub criteria: Vec<Criterion>,
}

/// One scoring dimension within a rubric
///
/// `weight` is descriptive only; no aggregation in this crate applies it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Criterion {
    pub id: CriterionId,
    pub rubric_id: RubricId,
    pub name: String,
    pub description: Option<String>,
    pub max_score: i64,
    pub weight: i64,
}

impl Criterion {
    pub const DEFAULT_MAX_SCORE: i64 = 100;
    pub const DEFAULT_WEIGHT: i64 = 1;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EvaluationStatus {
    Pending,
    Completed,
}

impl EvaluationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvaluationStatus::Pending => "PENDING",
            EvaluationStatus::Completed => "COMPLETED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(EvaluationStatus::Pending),
            "COMPLETED" => Some(EvaluationStatus::Completed),
            _ => None,
        }
    }
}

/// Granularity of an evaluation, derived from which scope ids are set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluationLevel {
    Task,
    Sprint,
    Project,
}

/// One scored assessment event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Evaluation {
    pub id: EvaluationId,
    pub project_id: String,
    pub task_id: Option<String>,
    pub sprint_id: Option<String>,
    pub evaluator_id: String,
    pub status: EvaluationStatus,
    pub feedback: Option<String>,
    /// Holistic score entered by the evaluator, independent of criteria
    pub score: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Evaluation {
    pub fn level(&self) -> EvaluationLevel {
        if self.task_id.is_some() {
            EvaluationLevel::Task
        } else if self.sprint_id.is_some() {
            EvaluationLevel::Sprint
        } else {
            EvaluationLevel::Project
        }
    }
}

/// Score given to one criterion within one evaluation
///
/// Not bounded by the criterion's `max_score`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationCriterionScore {
    pub id: String,
    pub evaluation_id: EvaluationId,
    pub criterion_id: CriterionId,
    pub score: i64,
}

/// (criterion, score) pair supplied by an evaluator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CriterionScoreInput {
    #[serde(alias = "criteriaId")]
    pub criterion_id: CriterionId,
    pub score: i64,
}

impl CriterionScoreInput {
    pub fn new(criterion_id: impl Into<CriterionId>, score: i64) -> Self {
        Self {
            criterion_id: criterion_id.into(),
            score,
        }
    }
}

/// Evaluation with its evaluator and criterion scores attached
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationDetail {
    #[serde(flatten)]
    pub evaluation: Evaluation,
    pub evaluator: User,
    pub criteria: Vec<EvaluationCriterionScore>,
}

/// Persisted notification request for a user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub message: String,
    pub kind: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}
