//! Common test utilities and helpers

#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use sprintlens_core::{
    ConnectionMode, CriterionId, LibsqlStorage, NewRubric, Project, ProjectMember, RubricService,
    Sprint, Task, User,
};
use sprintlens_core::evaluation::NewCriterion;
use std::sync::Arc;

pub const TEACHER: &str = "teacher";
pub const STUDENT: &str = "student";
pub const PROJECT: &str = "p1";
pub const SPRINT: &str = "s1";
pub const TASK: &str = "t1";

/// Create a migrated LibSQL storage for testing
pub async fn create_test_storage() -> Arc<LibsqlStorage> {
    // libSQL's :memory: mode creates isolated databases per connection, so
    // migrations wouldn't persist
    let path = tempfile::Builder::new()
        .prefix("sprintlens_test_")
        .suffix(".db")
        .tempfile()
        .expect("Failed to create temp database file")
        .into_temp_path()
        .keep()
        .expect("Failed to keep temp database file");
    let storage = LibsqlStorage::new_with_validation(
        ConnectionMode::Local(path.to_string_lossy().to_string()),
        true, // create_if_missing - required for test databases
    )
    .await
    .expect("Failed to create test storage");

    Arc::new(storage)
}

/// Fixed sprint start used by time-dependent tests
pub fn sprint_start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap()
}

/// Teacher, student, one project with the student as member, one two-week
/// sprint and one task assigned to the student
pub async fn seed_project(storage: &LibsqlStorage) {
    storage
        .insert_user(&User::new(TEACHER, "Teacher", "teacher@example.com"))
        .await
        .expect("insert teacher");
    storage
        .insert_user(&User::new(STUDENT, "Student", "student@example.com"))
        .await
        .expect("insert student");
    storage
        .insert_project(&Project::new(PROJECT, "Website", TEACHER))
        .await
        .expect("insert project");
    storage
        .add_project_member(&ProjectMember {
            project_id: PROJECT.to_string(),
            user_id: STUDENT.to_string(),
            role: "TEAM_DEVELOPER".to_string(),
        })
        .await
        .expect("add member");
    storage
        .insert_sprint(
            &Sprint::new(SPRINT, PROJECT, "Sprint 1")
                .with_dates(sprint_start(), sprint_start() + Duration::days(14)),
        )
        .await
        .expect("insert sprint");
    storage
        .insert_task(&Task::new(TASK, PROJECT, "Fix bug").in_sprint(SPRINT).assigned_to(STUDENT))
        .await
        .expect("insert task");
}

/// Create a project rubric with one criterion per name, returning the
/// criterion ids in the given order
pub async fn seed_rubric(storage: Arc<LibsqlStorage>, names: &[&str]) -> Vec<CriterionId> {
    let rubric = RubricService::new(storage)
        .create(NewRubric {
            project_id: Some(PROJECT.to_string()),
            name: "Code Review".to_string(),
            description: None,
            criteria: names
                .iter()
                .map(|name| NewCriterion {
                    name: name.to_string(),
                    ..Default::default()
                })
                .collect(),
        })
        .await
        .expect("create rubric");

    names
        .iter()
        .map(|name| {
            rubric
                .criteria
                .iter()
                .find(|c| c.name == *name)
                .map(|c| c.id.clone())
                .expect("criterion created")
        })
        .collect()
}
