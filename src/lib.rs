//! Sprintlens - Evaluation and Metrics Engine
//!
//! The scoring and analytics core of a sprint-based project-management
//! system:
//! - Rubric-based evaluations of tasks, sprints and projects, written
//!   all-or-nothing together with their per-criterion scores
//! - Scoped evaluation lookups, including the merged view of a student
//! - Burndown, velocity and contribution metrics recomputed from story and
//!   task completion
//! - Flat CSV export of a project's sprint and task breakdown
//!
//! # Architecture
//!
//! The system is organized into several layers:
//! - **Types**: Planning records (read-only) and scoring records
//! - **Storage**: `StorageBackend` and `WriteScope` traits with libSQL and in-memory backends
//! - **Services**: Evaluation writer/reader, rubric service, metrics engine, CSV exporter
//! - **API**: axum HTTP surface over the services
//!
//! # Example
//!
//! ```ignore
//! use sprintlens_core::{LibsqlStorage, MetricsEngine};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> sprintlens_core::Result<()> {
//!     let storage = Arc::new(LibsqlStorage::from_path("sprintlens.db", true).await?);
//!     let metrics = MetricsEngine::new(storage);
//!
//!     let burndown = metrics.burndown("sprint-1").await?;
//!     println!("{} points in sprint", burndown.total_points);
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod evaluation;
pub mod export;
pub mod metrics;
pub mod notifications;
pub mod storage;
pub mod types;

// Re-export commonly used types
pub use config::AppConfig;
pub use error::{Result, SprintlensError};
pub use evaluation::{
    EvaluationReader, EvaluationUpdate, EvaluationWriter, NewEvaluation, NewRubric, RubricService,
    TaskEvaluationRequest,
};
pub use export::{CsvExport, CsvExporter};
pub use metrics::{Burndown, BurndownPoint, ContributionEntry, MetricsEngine, VelocityEntry};
pub use notifications::{LogNotificationSink, NotificationSink, StoredNotificationSink};
pub use storage::{
    in_memory::InMemoryStorage,
    libsql::{ConnectionMode, LibsqlStorage},
    EvaluationScope, StorageBackend, WriteScope,
};
pub use types::{
    Criterion, CriterionId, CriterionScoreInput, Evaluation, EvaluationCriterionScore,
    EvaluationDetail, EvaluationId, EvaluationLevel, EvaluationStatus, Project, ProjectMember,
    Rubric, RubricId, Sprint, Task, User, UserStory,
};
