//! Rubric management.
//!
//! A rubric is written together with its full criteria set; criteria are
//! never added or changed on their own.

use crate::error::Result;
use crate::evaluation::require_non_empty;
use crate::storage::{finish_write, StorageBackend, WriteScope};
use crate::types::{Criterion, CriterionId, Rubric, RubricId};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Criterion as submitted; missing or non-positive numbers take defaults
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCriterion {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub max_score: Option<i64>,
    #[serde(default)]
    pub weight: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRubric {
    #[serde(default)]
    pub project_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub criteria: Vec<NewCriterion>,
}

pub struct RubricService {
    storage: Arc<dyn StorageBackend>,
}

impl RubricService {
    pub fn new(storage: Arc<dyn StorageBackend>) -> Self {
        Self { storage }
    }

    /// Create a rubric and all of its criteria in one write
    pub async fn create(&self, request: NewRubric) -> Result<Rubric> {
        require_non_empty("name", &request.name)?;
        for criterion in &request.criteria {
            require_non_empty("criterion name", &criterion.name)?;
        }

        let project_id = request.project_id.filter(|id| !id.trim().is_empty());
        if let Some(project_id) = &project_id {
            self.storage.get_project(project_id).await?;
        }

        let id = RubricId::new();
        let criteria: Vec<Criterion> = request
            .criteria
            .into_iter()
            .map(|c| Criterion {
                id: CriterionId::new(),
                rubric_id: id.clone(),
                name: c.name,
                description: c.description,
                max_score: positive_or(c.max_score, Criterion::DEFAULT_MAX_SCORE),
                weight: positive_or(c.weight, Criterion::DEFAULT_WEIGHT),
            })
            .collect();

        let rubric = Rubric {
            id,
            project_id,
            name: request.name,
            description: request.description,
            created_at: Utc::now(),
            criteria,
        };

        let mut scope = self.storage.begin_write().await?;
        let outcome = insert_rubric(scope.as_mut(), &rubric).await;
        finish_write(scope, outcome).await?;

        info!(
            "Created rubric {} '{}' with {} criteria",
            rubric.id,
            rubric.name,
            rubric.criteria.len()
        );
        Ok(rubric)
    }

    pub async fn get(&self, id: &RubricId) -> Result<Rubric> {
        self.storage.get_rubric(id).await
    }

    /// All rubrics, or only those scoped to `project_id`
    pub async fn list(&self, project_id: Option<&str>) -> Result<Vec<Rubric>> {
        self.storage
            .list_rubrics(project_id.filter(|id| !id.is_empty()))
            .await
    }

    /// Delete a rubric and its criteria
    ///
    /// Fails with a constraint violation while any of its criteria is scored.
    pub async fn delete(&self, id: &RubricId) -> Result<()> {
        self.storage.delete_rubric(id).await?;
        info!("Deleted rubric {}", id);
        Ok(())
    }
}

fn positive_or(value: Option<i64>, default: i64) -> i64 {
    value.filter(|v| *v > 0).unwrap_or(default)
}

async fn insert_rubric(scope: &mut dyn WriteScope, rubric: &Rubric) -> Result<()> {
    scope.insert_rubric(rubric).await?;
    for criterion in &rubric.criteria {
        scope.insert_criterion(criterion).await?;
    }
    Ok(())
}
