//! Flat CSV export of a project's sprint and task breakdown
//!
//! Fields are joined with commas as-is. Names containing commas or line
//! breaks are not quoted, so such rows do not parse back into five columns.

use crate::error::Result;
use crate::storage::StorageBackend;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

pub const CSV_HEADER: &str = "Sprint,Task,Assignee,Status,Priority\n";
pub const CSV_CONTENT_TYPE: &str = "text/csv";
const UNASSIGNED: &str = "Unassigned";

/// Rendered export with its download metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvExport {
    /// `project-<id>.csv`
    pub filename: String,
    pub content_type: &'static str,
    pub body: String,
}

impl CsvExport {
    pub fn content_disposition(&self) -> String {
        format!("attachment; filename=\"{}\"", self.filename)
    }
}

/// Fields joined unquoted, newline terminated
fn csv_line(fields: [&str; 5]) -> String {
    let mut line = fields.join(",");
    line.push('\n');
    line
}

pub struct CsvExporter {
    storage: Arc<dyn StorageBackend>,
}

impl CsvExporter {
    pub fn new(storage: Arc<dyn StorageBackend>) -> Self {
        Self { storage }
    }

    /// One line per task of every sprint, sprints by start date
    ///
    /// Tasks outside any sprint are not exported.
    pub async fn export_project(&self, project_id: &str) -> Result<CsvExport> {
        let project = self.storage.get_project(project_id).await?;
        let sprints = self.storage.list_sprints(&project.id).await?;

        let mut body = String::from(CSV_HEADER);
        let mut names: HashMap<String, String> = HashMap::new();
        let mut rows = 0usize;

        for sprint in &sprints {
            for task in self.storage.list_tasks_by_sprint(&sprint.id).await? {
                let assignee = match &task.assignee_id {
                    Some(user_id) => {
                        if !names.contains_key(user_id) {
                            let user = self.storage.get_user(user_id).await?;
                            names.insert(user_id.clone(), user.name);
                        }
                        names.get(user_id).map(String::as_str).unwrap_or(UNASSIGNED)
                    }
                    None => UNASSIGNED,
                };

                body.push_str(&csv_line([
                    sprint.name.as_str(),
                    task.title.as_str(),
                    assignee,
                    task.status.as_str(),
                    task.priority.as_str(),
                ]));
                rows += 1;
            }
        }

        debug!("Exported {} task rows for project {}", rows, project.id);
        Ok(CsvExport {
            filename: format!("project-{}.csv", project.id),
            content_type: CSV_CONTENT_TYPE,
            body,
        })
    }
}
