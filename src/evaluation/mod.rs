//! Rubric-based evaluation of tasks, sprints and projects.
//!
//! This module owns the only write path of the engine. Every other component
//! reads persisted state and derives from it.
//!
//! # Architecture
//!
//! - **RubricService**: Creates rubrics together with their criteria, lists and deletes them
//! - **EvaluationWriter**: Creates and updates an evaluation plus its criterion
//!   scores as one all-or-nothing write, and runs the task evaluation flow
//! - **EvaluationReader**: Retrieves evaluations by task, sprint, project or
//!   student, with evaluator and criterion scores attached
//!
//! # Consistency
//!
//! Writers open a [`WriteScope`](crate::storage::WriteScope), perform every
//! insert through it and commit once. Any failed insert rolls the whole scope
//! back, so a failed create leaves neither the evaluation nor any of its
//! scores behind.
//!
//! Criterion scores are not bounded by the criterion's `max_score`, and the
//! criterion `weight` is carried as data only. The holistic `score` on an
//! evaluation is whatever the evaluator entered.
//!
//! # Usage
//!
//! ```rust,no_run
//! use sprintlens_core::evaluation::{EvaluationWriter, NewEvaluation};
//! use sprintlens_core::notifications::LogNotificationSink;
//! use sprintlens_core::storage::in_memory::InMemoryStorage;
//! use sprintlens_core::types::CriterionScoreInput;
//! use std::sync::Arc;
//!
//! # async fn example() -> sprintlens_core::Result<()> {
//! let writer = EvaluationWriter::new(
//!     Arc::new(InMemoryStorage::new()),
//!     Arc::new(LogNotificationSink),
//! );
//!
//! let id = writer
//!     .create(NewEvaluation {
//!         project_id: "project-1".to_string(),
//!         evaluator_id: "teacher-1".to_string(),
//!         sprint_id: Some("sprint-1".to_string()),
//!         score: Some(85),
//!         criteria_scores: vec![CriterionScoreInput::new("code-quality", 8)],
//!         ..Default::default()
//!     })
//!     .await?;
//! # let _ = id;
//! # Ok(())
//! # }
//! ```

pub mod reader;
pub mod rubric;
pub mod writer;

pub use reader::EvaluationReader;
pub use rubric::{NewCriterion, NewRubric, RubricService};
pub use writer::{EvaluationUpdate, EvaluationWriter, NewEvaluation, TaskEvaluationRequest};

use crate::error::{Result, SprintlensError};

/// Reject a required identifier or name that is empty or blank
pub(crate) fn require_non_empty(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(SprintlensError::Validation(format!("{} is required", field)));
    }
    Ok(())
}
