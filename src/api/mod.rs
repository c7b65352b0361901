//! HTTP API for evaluations, rubrics and project metrics
//!
//! Provides:
//! - Rubric management
//! - Evaluation create, update and scoped lookups
//! - Burndown, velocity and contribution metrics
//! - CSV export of a project's sprint and task breakdown

pub mod handlers;
pub mod server;

pub use handlers::ApiError;
pub use server::{build_router, ApiServer, ApiServerConfig, AppState};
