//! LibSQL storage backend implementation
//!
//! Provides persistent storage using local SQLite files or Turso/libSQL
//! remotes. Every operation opens its own connection with foreign keys
//! enabled; write scopes wrap a libSQL transaction.

use crate::error::{Result, SprintlensError};
use crate::storage::{
    evaluation_not_found, format_timestamp, parse_optional_timestamp, parse_timestamp,
    EvaluationScope, StorageBackend, WriteScope,
};
use crate::types::{
    Criterion, CriterionId, Evaluation, EvaluationCriterionScore, EvaluationId, EvaluationStatus,
    Notification, Project, ProjectMember, Rubric, RubricId, Sprint, Task, User, UserStory,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{
    params, params_from_iter, Builder, Connection, Database, Row, Transaction, TransactionBehavior,
};
use tracing::{debug, info};

const INITIAL_SCHEMA: &str = include_str!("../../migrations/001_initial_schema.sql");

const MIGRATIONS: [(&str, &str); 1] = [("001_initial_schema.sql", INITIAL_SCHEMA)];

/// How long a local connection waits on a locked database before failing
const BUSY_TIMEOUT_MS: u64 = 5_000;

const EVALUATION_COLUMNS: &str = "e.id, e.project_id, e.task_id, e.sprint_id, e.evaluator_id, \
     e.status, e.feedback, e.score, e.created_at, e.updated_at";

const SPRINT_COLUMNS: &str = "id, project_id, name, status, start_date, end_date, created_at";

const STORY_COLUMNS: &str = "id, project_id, sprint_id, title, story_points, status, \
     assignee_id, completed_at, created_at";

const TASK_COLUMNS: &str = "id, project_id, sprint_id, user_story_id, title, status, priority, \
     assignee_id, completed_at, created_at";

/// Parse SQL file into individual statements, handling multi-line constructs like triggers
fn parse_sql_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut depth: i32 = 0; // Track BEGIN/END nesting depth

    for line in sql.lines() {
        let trimmed = line.trim();

        // Skip comment-only and empty lines when not building a statement
        if current.is_empty() && (trimmed.is_empty() || trimmed.starts_with("--")) {
            continue;
        }

        if !current.is_empty() {
            current.push('\n');
        }
        current.push_str(line);

        let upper = trimmed.to_uppercase();
        if upper.starts_with("BEGIN") || upper.contains(" BEGIN") {
            depth += 1;
        }
        if upper.starts_with("END") {
            depth = depth.saturating_sub(1);
        }

        // Statement is complete when we hit ; and depth is 0
        if trimmed.ends_with(';') && depth == 0 {
            statements.push(current.clone());
            current.clear();
        }
    }

    if !current.trim().is_empty() {
        statements.push(current);
    }

    statements
}

/// First 300 characters of a statement for error messages
fn statement_preview(statement: &str) -> String {
    statement.chars().take(300).collect()
}

/// Database connection mode
#[derive(Debug, Clone)]
pub enum ConnectionMode {
    /// Local file-based database
    Local(String),
    /// Remote database (Turso Cloud)
    Remote { url: String, token: String },
}

/// LibSQL storage backend
pub struct LibsqlStorage {
    db: Database,
    /// Local files get WAL and a busy timeout; remotes handle locking themselves
    local: bool,
}

impl LibsqlStorage {
    /// Validate database file before opening
    ///
    /// # Returns
    /// * `Ok(true)` if database exists and is valid
    /// * `Ok(false)` if database doesn't exist and must_exist=false
    /// * `Err(SprintlensError)` with actionable message if validation fails
    fn validate_database_file(db_path: &str, must_exist: bool) -> Result<bool> {
        use std::fs;
        use std::path::Path;

        let path = Path::new(db_path);

        if !path.exists() {
            if must_exist {
                return Err(SprintlensError::Database(format!(
                    "Database file not found at '{}'. Run 'sprintlens init' first or check the database.path setting.",
                    db_path
                )));
            }
            return Ok(false);
        }

        // SQLite files start with "SQLite format 3\0" (16 bytes); a freshly
        // created file may still be empty
        let bytes = fs::read(path).map_err(|e| {
            SprintlensError::Database(format!("Cannot read database file at '{}': {}", db_path, e))
        })?;

        if !bytes.is_empty() && (bytes.len() < 16 || &bytes[0..16] != b"SQLite format 3\0") {
            return Err(SprintlensError::Database(format!(
                "Database file at '{}' is corrupted or not a valid SQLite database.",
                db_path
            )));
        }

        debug!("Database file validation passed: {}", db_path);
        Ok(true)
    }

    /// Create a new LibSQL storage backend with validation
    ///
    /// When `create_if_missing` is set the database file (and its parent
    /// directory) is created and migrations are applied.
    ///
    /// # Example
    /// ```ignore
    /// let storage = LibsqlStorage::new_with_validation(ConnectionMode::Local("sprintlens.db".into()), true).await?;
    /// ```
    pub async fn new_with_validation(mode: ConnectionMode, create_if_missing: bool) -> Result<Self> {
        info!(
            "Connecting to LibSQL database: {} (create_if_missing: {})",
            match &mode {
                ConnectionMode::Local(path) => path.as_str(),
                ConnectionMode::Remote { url, .. } => url.as_str(),
            },
            create_if_missing
        );

        let local = matches!(mode, ConnectionMode::Local(_));
        let db = match mode {
            ConnectionMode::Local(ref path) => {
                Self::validate_database_file(path, !create_if_missing)?;

                if create_if_missing {
                    if let Some(parent) = std::path::Path::new(path).parent() {
                        if !parent.as_os_str().is_empty() {
                            std::fs::create_dir_all(parent).map_err(|e| {
                                SprintlensError::Database(format!(
                                    "Failed to create database directory {}: {}",
                                    parent.display(),
                                    e
                                ))
                            })?;
                        }
                    }
                }

                Builder::new_local(path).build().await.map_err(|e| {
                    SprintlensError::Database(format!("Failed to create local database: {}", e))
                })?
            }
            ConnectionMode::Remote { ref url, ref token } => {
                Builder::new_remote(url.clone(), token.clone())
                    .build()
                    .await
                    .map_err(|e| {
                        SprintlensError::Database(format!("Failed to create remote database: {}", e))
                    })?
            }
        };

        let storage = Self { db, local };
        storage.check_database_health().await?;

        if local {
            // Readers no longer block a committing writer
            let conn = storage.get_conn().await?;
            let mut rows = conn.query("PRAGMA journal_mode=WAL", params![]).await?;
            if let Some(row) = rows.next().await? {
                debug!("Journal mode: {}", row.get::<String>(0)?);
            }
        }

        if create_if_missing {
            storage.run_migrations().await?;
        }

        Ok(storage)
    }

    /// Open an existing database (secure by default: the file must exist)
    pub async fn new(mode: ConnectionMode) -> Result<Self> {
        Self::new_with_validation(mode, false).await
    }

    /// Create from string path
    ///
    /// - "libsql://..." → Remote (requires TURSO_AUTH_TOKEN in environment)
    /// - Other → Local file path
    pub async fn from_path(database_url: &str, create_if_missing: bool) -> Result<Self> {
        let mode = if database_url.starts_with("libsql://") {
            let token = std::env::var("TURSO_AUTH_TOKEN")
                .map_err(|_| SprintlensError::Other("TURSO_AUTH_TOKEN not found".into()))?;
            ConnectionMode::Remote {
                url: database_url.to_string(),
                token,
            }
        } else {
            ConnectionMode::Local(database_url.to_string())
        };

        Self::new_with_validation(mode, create_if_missing).await
    }

    /// Run embedded database migrations
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations...");

        let conn = self.get_conn().await?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS _migrations_applied (
                migration_name TEXT PRIMARY KEY,
                applied_at INTEGER NOT NULL
            )",
            params![],
        )
        .await
        .map_err(|e| {
            SprintlensError::Migration(format!("Failed to create migrations table: {}", e))
        })?;

        for (migration_name, sql) in MIGRATIONS {
            let mut rows = conn
                .query(
                    "SELECT COUNT(*) FROM _migrations_applied WHERE migration_name = ?",
                    params![migration_name],
                )
                .await?;

            let already_applied = match rows.next().await? {
                Some(row) => row.get::<i64>(0)?,
                None => 0,
            };

            if already_applied > 0 {
                debug!("Skipping already applied migration: {}", migration_name);
                continue;
            }

            let statements = parse_sql_statements(sql);
            debug!("Parsed {} statements from {}", statements.len(), migration_name);
            for (i, statement) in statements.iter().enumerate() {
                let statement = statement.trim();
                if statement.is_empty() {
                    continue;
                }
                conn.execute(statement, params![]).await.map_err(|e| {
                    SprintlensError::Migration(format!(
                        "Failed to execute statement #{} in {}: {}\nStatement: {}",
                        i + 1,
                        migration_name,
                        e,
                        statement_preview(statement)
                    ))
                })?;
            }

            conn.execute(
                "INSERT INTO _migrations_applied (migration_name, applied_at) VALUES (?, ?)",
                params![migration_name, Utc::now().timestamp()],
            )
            .await
            .map_err(|e| SprintlensError::Migration(format!("Failed to record migration: {}", e)))?;

            info!("Executed migration: {}", migration_name);
        }

        info!("Database migrations completed");
        Ok(())
    }

    /// Get a connection with foreign key enforcement switched on
    async fn get_conn(&self) -> Result<Connection> {
        let conn = self
            .db
            .connect()
            .map_err(|e| SprintlensError::Database(format!("Failed to get connection: {}", e)))?;
        conn.execute("PRAGMA foreign_keys = ON", params![]).await?;
        if self.local {
            // The pragma echoes the new value back as a row
            conn.query(&format!("PRAGMA busy_timeout = {}", BUSY_TIMEOUT_MS), params![])
                .await?;
        }
        Ok(conn)
    }

    /// Check that a connection can be established and queried
    pub async fn check_database_health(&self) -> Result<()> {
        debug!("Checking database health...");

        let conn = self.get_conn().await?;
        conn.query("SELECT 1", params![]).await.map_err(|e| {
            SprintlensError::Database(format!("Database health check failed: {}", e))
        })?;

        debug!("Database health check passed");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Planning-record writes. The surrounding project-management system owns
    // these rows; the engine writes them only when seeding a database.
    // -----------------------------------------------------------------------

    pub async fn insert_user(&self, user: &User) -> Result<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            "INSERT INTO users (id, email, name, role, avatar, active, created_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                user.id.clone(),
                user.email.clone(),
                user.name.clone(),
                user.role.clone(),
                user.avatar.clone(),
                if user.active { 1i64 } else { 0i64 },
                format_timestamp(&user.created_at),
            ],
        )
        .await?;
        Ok(())
    }

    pub async fn insert_project(&self, project: &Project) -> Result<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            "INSERT INTO projects (id, name, description, status, owner_id, created_at) VALUES (?, ?, ?, ?, ?, ?)",
            params![
                project.id.clone(),
                project.name.clone(),
                project.description.clone(),
                project.status.clone(),
                project.owner_id.clone(),
                format_timestamp(&project.created_at),
            ],
        )
        .await?;
        Ok(())
    }

    pub async fn add_project_member(&self, member: &ProjectMember) -> Result<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            "INSERT INTO project_members (project_id, user_id, role) VALUES (?, ?, ?)",
            params![
                member.project_id.clone(),
                member.user_id.clone(),
                member.role.clone()
            ],
        )
        .await?;
        Ok(())
    }

    pub async fn insert_sprint(&self, sprint: &Sprint) -> Result<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            "INSERT INTO sprints (id, project_id, name, status, start_date, end_date, created_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                sprint.id.clone(),
                sprint.project_id.clone(),
                sprint.name.clone(),
                sprint.status.clone(),
                sprint.start_date.as_ref().map(format_timestamp),
                sprint.end_date.as_ref().map(format_timestamp),
                format_timestamp(&sprint.created_at),
            ],
        )
        .await?;
        Ok(())
    }

    pub async fn insert_story(&self, story: &UserStory) -> Result<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            r#"
            INSERT INTO user_stories (
                id, project_id, sprint_id, title, story_points, status,
                assignee_id, completed_at, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                story.id.clone(),
                story.project_id.clone(),
                story.sprint_id.clone(),
                story.title.clone(),
                story.story_points,
                story.status.clone(),
                story.assignee_id.clone(),
                story.completed_at.as_ref().map(format_timestamp),
                format_timestamp(&story.created_at),
            ],
        )
        .await?;
        Ok(())
    }

    pub async fn insert_task(&self, task: &Task) -> Result<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            r#"
            INSERT INTO tasks (
                id, project_id, sprint_id, user_story_id, title, status, priority,
                assignee_id, completed_at, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                task.id.clone(),
                task.project_id.clone(),
                task.sprint_id.clone(),
                task.user_story_id.clone(),
                task.title.clone(),
                task.status.clone(),
                task.priority.clone(),
                task.assignee_id.clone(),
                task.completed_at.as_ref().map(format_timestamp),
                format_timestamp(&task.created_at),
            ],
        )
        .await?;
        Ok(())
    }

    /// Count rows of a scoring table; used by consistency checks
    pub async fn count_rows(&self, table: ScoringTable) -> Result<usize> {
        let conn = self.get_conn().await?;
        let sql = format!("SELECT COUNT(*) FROM {}", table.name());
        let mut rows = conn.query(&sql, params![]).await?;
        let count = match rows.next().await? {
            Some(row) => row.get::<i64>(0)?,
            None => 0,
        };
        Ok(count as usize)
    }

    async fn load_criteria(&self, conn: &Connection, rubric_id: &RubricId) -> Result<Vec<Criterion>> {
        let mut rows = conn
            .query(
                "SELECT id, rubric_id, name, description, max_score, weight FROM criteria WHERE rubric_id = ? ORDER BY rowid",
                params![rubric_id.0.clone()],
            )
            .await?;

        let mut criteria = Vec::new();
        while let Some(row) = rows.next().await? {
            criteria.push(Criterion {
                id: CriterionId(row.get(0)?),
                rubric_id: RubricId(row.get(1)?),
                name: row.get(2)?,
                description: row.get(3)?,
                max_score: row.get(4)?,
                weight: row.get(5)?,
            });
        }
        Ok(criteria)
    }

    async fn collect_evaluations(mut rows: libsql::Rows) -> Result<Vec<Evaluation>> {
        let mut evaluations = Vec::new();
        while let Some(row) = rows.next().await? {
            evaluations.push(row_to_evaluation(&row)?);
        }
        Ok(evaluations)
    }
}

/// Scoring tables that can be counted
#[derive(Debug, Clone, Copy)]
pub enum ScoringTable {
    Evaluations,
    CriterionScores,
    Rubrics,
    Criteria,
}

impl ScoringTable {
    fn name(&self) -> &'static str {
        match self {
            ScoringTable::Evaluations => "evaluations",
            ScoringTable::CriterionScores => "evaluation_criteria",
            ScoringTable::Rubrics => "rubrics",
            ScoringTable::Criteria => "criteria",
        }
    }
}

fn row_to_user(row: &Row) -> Result<User> {
    let created_at: String = row.get(6)?;
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        name: row.get(2)?,
        role: row.get(3)?,
        avatar: row.get(4)?,
        active: row.get::<i64>(5)? != 0,
        created_at: parse_timestamp(&created_at)?,
    })
}

fn row_to_sprint(row: &Row) -> Result<Sprint> {
    let created_at: String = row.get(6)?;
    Ok(Sprint {
        id: row.get(0)?,
        project_id: row.get(1)?,
        name: row.get(2)?,
        status: row.get(3)?,
        start_date: parse_optional_timestamp(row.get(4)?)?,
        end_date: parse_optional_timestamp(row.get(5)?)?,
        created_at: parse_timestamp(&created_at)?,
    })
}

fn row_to_story(row: &Row) -> Result<UserStory> {
    let created_at: String = row.get(8)?;
    Ok(UserStory {
        id: row.get(0)?,
        project_id: row.get(1)?,
        sprint_id: row.get(2)?,
        title: row.get(3)?,
        story_points: row.get(4)?,
        status: row.get(5)?,
        assignee_id: row.get(6)?,
        completed_at: parse_optional_timestamp(row.get(7)?)?,
        created_at: parse_timestamp(&created_at)?,
    })
}

fn row_to_task(row: &Row) -> Result<Task> {
    let created_at: String = row.get(9)?;
    Ok(Task {
        id: row.get(0)?,
        project_id: row.get(1)?,
        sprint_id: row.get(2)?,
        user_story_id: row.get(3)?,
        title: row.get(4)?,
        status: row.get(5)?,
        priority: row.get(6)?,
        assignee_id: row.get(7)?,
        completed_at: parse_optional_timestamp(row.get(8)?)?,
        created_at: parse_timestamp(&created_at)?,
    })
}

fn row_to_evaluation(row: &Row) -> Result<Evaluation> {
    let status: String = row.get(5)?;
    let created_at: String = row.get(8)?;
    let updated_at: String = row.get(9)?;
    Ok(Evaluation {
        id: EvaluationId(row.get(0)?),
        project_id: row.get(1)?,
        task_id: row.get(2)?,
        sprint_id: row.get(3)?,
        evaluator_id: row.get(4)?,
        status: EvaluationStatus::parse(&status).ok_or_else(|| {
            SprintlensError::Database(format!("Unknown evaluation status: {}", status))
        })?,
        feedback: row.get(6)?,
        score: row.get(7)?,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

fn row_to_rubric(row: &Row) -> Result<Rubric> {
    let created_at: String = row.get(4)?;
    Ok(Rubric {
        id: RubricId(row.get(0)?),
        project_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        created_at: parse_timestamp(&created_at)?,
        criteria: Vec::new(),
    })
}

#[async_trait]
impl StorageBackend for LibsqlStorage {
    async fn begin_write(&self) -> Result<Box<dyn WriteScope>> {
        let conn = self.get_conn().await?;
        // Take the write lock up front so concurrent scopes queue on the
        // busy timeout instead of failing mid-transaction
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .await?;
        Ok(Box::new(LibsqlWriteScope { tx }))
    }

    async fn get_user(&self, id: &str) -> Result<User> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                "SELECT id, email, name, role, avatar, active, created_at FROM users WHERE id = ?",
                params![id],
            )
            .await?;
        let row = rows
            .next()
            .await?
            .ok_or_else(|| SprintlensError::not_found("User", id))?;
        row_to_user(&row)
    }

    async fn get_project(&self, id: &str) -> Result<Project> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                "SELECT id, name, description, status, owner_id, created_at FROM projects WHERE id = ?",
                params![id],
            )
            .await?;
        let row = rows
            .next()
            .await?
            .ok_or_else(|| SprintlensError::not_found("Project", id))?;

        let created_at: String = row.get(5)?;
        Ok(Project {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            status: row.get(3)?,
            owner_id: row.get(4)?,
            created_at: parse_timestamp(&created_at)?,
        })
    }

    async fn list_member_project_ids(&self, user_id: &str) -> Result<Vec<String>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                "SELECT project_id FROM project_members WHERE user_id = ? ORDER BY rowid",
                params![user_id],
            )
            .await?;

        let mut ids = Vec::new();
        while let Some(row) = rows.next().await? {
            ids.push(row.get::<String>(0)?);
        }
        Ok(ids)
    }

    async fn get_sprint(&self, id: &str) -> Result<Sprint> {
        let conn = self.get_conn().await?;
        let sql = format!("SELECT {} FROM sprints WHERE id = ?", SPRINT_COLUMNS);
        let mut rows = conn.query(&sql, params![id]).await?;
        let row = rows
            .next()
            .await?
            .ok_or_else(|| SprintlensError::not_found("Sprint", id))?;
        row_to_sprint(&row)
    }

    async fn list_sprints(&self, project_id: &str) -> Result<Vec<Sprint>> {
        let conn = self.get_conn().await?;
        let sql = format!(
            "SELECT {} FROM sprints WHERE project_id = ? ORDER BY start_date ASC, created_at ASC, id ASC",
            SPRINT_COLUMNS
        );
        let mut rows = conn.query(&sql, params![project_id]).await?;

        let mut sprints = Vec::new();
        while let Some(row) = rows.next().await? {
            sprints.push(row_to_sprint(&row)?);
        }
        Ok(sprints)
    }

    async fn list_stories_by_sprint(&self, sprint_id: &str) -> Result<Vec<UserStory>> {
        let conn = self.get_conn().await?;
        let sql = format!(
            "SELECT {} FROM user_stories WHERE sprint_id = ? ORDER BY created_at ASC, id ASC",
            STORY_COLUMNS
        );
        let mut rows = conn.query(&sql, params![sprint_id]).await?;

        let mut stories = Vec::new();
        while let Some(row) = rows.next().await? {
            stories.push(row_to_story(&row)?);
        }
        Ok(stories)
    }

    async fn get_task(&self, id: &str) -> Result<Task> {
        let conn = self.get_conn().await?;
        let sql = format!("SELECT {} FROM tasks WHERE id = ?", TASK_COLUMNS);
        let mut rows = conn.query(&sql, params![id]).await?;
        let row = rows
            .next()
            .await?
            .ok_or_else(|| SprintlensError::not_found("Task", id))?;
        row_to_task(&row)
    }

    async fn list_tasks_by_project(&self, project_id: &str) -> Result<Vec<Task>> {
        let conn = self.get_conn().await?;
        let sql = format!(
            "SELECT {} FROM tasks WHERE project_id = ? ORDER BY created_at ASC, id ASC",
            TASK_COLUMNS
        );
        let mut rows = conn.query(&sql, params![project_id]).await?;

        let mut tasks = Vec::new();
        while let Some(row) = rows.next().await? {
            tasks.push(row_to_task(&row)?);
        }
        Ok(tasks)
    }

    async fn list_tasks_by_sprint(&self, sprint_id: &str) -> Result<Vec<Task>> {
        let conn = self.get_conn().await?;
        let sql = format!(
            "SELECT {} FROM tasks WHERE sprint_id = ? ORDER BY created_at ASC, id ASC",
            TASK_COLUMNS
        );
        let mut rows = conn.query(&sql, params![sprint_id]).await?;

        let mut tasks = Vec::new();
        while let Some(row) = rows.next().await? {
            tasks.push(row_to_task(&row)?);
        }
        Ok(tasks)
    }

    async fn get_rubric(&self, id: &RubricId) -> Result<Rubric> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                "SELECT id, project_id, name, description, created_at FROM rubrics WHERE id = ?",
                params![id.0.clone()],
            )
            .await?;
        let row = rows
            .next()
            .await?
            .ok_or_else(|| SprintlensError::not_found("Rubric", id.as_str()))?;

        let mut rubric = row_to_rubric(&row)?;
        rubric.criteria = self.load_criteria(&conn, &rubric.id).await?;
        Ok(rubric)
    }

    async fn list_rubrics(&self, project_id: Option<&str>) -> Result<Vec<Rubric>> {
        let conn = self.get_conn().await?;
        let mut rows = match project_id {
            Some(project_id) => {
                conn.query(
                    "SELECT id, project_id, name, description, created_at FROM rubrics WHERE project_id = ? ORDER BY created_at ASC, id ASC",
                    params![project_id],
                )
                .await?
            }
            None => {
                conn.query(
                    "SELECT id, project_id, name, description, created_at FROM rubrics ORDER BY created_at ASC, id ASC",
                    params![],
                )
                .await?
            }
        };

        let mut rubrics = Vec::new();
        while let Some(row) = rows.next().await? {
            rubrics.push(row_to_rubric(&row)?);
        }
        for rubric in &mut rubrics {
            rubric.criteria = self.load_criteria(&conn, &rubric.id).await?;
        }
        Ok(rubrics)
    }

    async fn delete_rubric(&self, id: &RubricId) -> Result<()> {
        debug!("Deleting rubric: {}", id);

        let conn = self.get_conn().await?;
        let deleted = conn
            .execute("DELETE FROM rubrics WHERE id = ?", params![id.0.clone()])
            .await?;

        if deleted == 0 {
            return Err(SprintlensError::not_found("Rubric", id.as_str()));
        }
        Ok(())
    }

    async fn get_evaluation(&self, id: &EvaluationId) -> Result<Evaluation> {
        let conn = self.get_conn().await?;
        let sql = format!("SELECT {} FROM evaluations e WHERE e.id = ?", EVALUATION_COLUMNS);
        let mut rows = conn.query(&sql, params![id.0.clone()]).await?;
        let row = rows.next().await?.ok_or_else(|| evaluation_not_found(id))?;
        row_to_evaluation(&row)
    }

    async fn list_evaluations(&self, scope: &EvaluationScope) -> Result<Vec<Evaluation>> {
        debug!("Listing evaluations: {:?}", scope);

        let conn = self.get_conn().await?;
        let order = "ORDER BY e.created_at DESC, e.id DESC";

        let rows = match scope {
            EvaluationScope::Task(task_id) => {
                let sql = format!(
                    "SELECT {} FROM evaluations e WHERE e.task_id = ? {}",
                    EVALUATION_COLUMNS, order
                );
                conn.query(&sql, params![task_id.clone()]).await?
            }
            EvaluationScope::Sprint(sprint_id) => {
                let sql = format!(
                    "SELECT {} FROM evaluations e WHERE e.sprint_id = ? {}",
                    EVALUATION_COLUMNS, order
                );
                conn.query(&sql, params![sprint_id.clone()]).await?
            }
            EvaluationScope::ProjectGeneral(project_id) => {
                let sql = format!(
                    "SELECT {} FROM evaluations e WHERE e.project_id = ? AND e.task_id IS NULL AND e.sprint_id IS NULL {}",
                    EVALUATION_COLUMNS, order
                );
                conn.query(&sql, params![project_id.clone()]).await?
            }
            EvaluationScope::AssignedTo(user_id) => {
                let sql = format!(
                    "SELECT {} FROM evaluations e JOIN tasks t ON t.id = e.task_id WHERE t.assignee_id = ? {}",
                    EVALUATION_COLUMNS, order
                );
                conn.query(&sql, params![user_id.clone()]).await?
            }
            EvaluationScope::TeamLevel(project_ids) => {
                if project_ids.is_empty() {
                    return Ok(Vec::new());
                }
                let placeholders = vec!["?"; project_ids.len()].join(", ");
                let sql = format!(
                    "SELECT {} FROM evaluations e WHERE e.project_id IN ({}) AND e.task_id IS NULL {}",
                    EVALUATION_COLUMNS, placeholders, order
                );
                conn.query(&sql, params_from_iter(project_ids.iter().cloned()))
                    .await?
            }
        };

        Self::collect_evaluations(rows).await
    }

    async fn list_criterion_scores(
        &self,
        evaluation_id: &EvaluationId,
    ) -> Result<Vec<EvaluationCriterionScore>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                "SELECT id, evaluation_id, criteria_id, score FROM evaluation_criteria WHERE evaluation_id = ? ORDER BY rowid",
                params![evaluation_id.0.clone()],
            )
            .await?;

        let mut scores = Vec::new();
        while let Some(row) = rows.next().await? {
            scores.push(EvaluationCriterionScore {
                id: row.get(0)?,
                evaluation_id: EvaluationId(row.get(1)?),
                criterion_id: CriterionId(row.get(2)?),
                score: row.get(3)?,
            });
        }
        Ok(scores)
    }

    async fn insert_notification(&self, notification: &Notification) -> Result<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            "INSERT INTO notifications (id, user_id, title, message, kind, is_read, created_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                notification.id.clone(),
                notification.user_id.clone(),
                notification.title.clone(),
                notification.message.clone(),
                notification.kind.clone(),
                if notification.read { 1i64 } else { 0i64 },
                format_timestamp(&notification.created_at),
            ],
        )
        .await?;
        Ok(())
    }

    async fn list_notifications(&self, user_id: &str) -> Result<Vec<Notification>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                "SELECT id, user_id, title, message, kind, is_read, created_at FROM notifications WHERE user_id = ? ORDER BY created_at DESC, id DESC",
                params![user_id],
            )
            .await?;

        let mut notifications = Vec::new();
        while let Some(row) = rows.next().await? {
            let created_at: String = row.get(6)?;
            notifications.push(Notification {
                id: row.get(0)?,
                user_id: row.get(1)?,
                title: row.get(2)?,
                message: row.get(3)?,
                kind: row.get(4)?,
                read: row.get::<i64>(5)? != 0,
                created_at: parse_timestamp(&created_at)?,
            });
        }
        Ok(notifications)
    }
}

/// Write scope backed by a libSQL transaction
///
/// libSQL rolls the transaction back when it is dropped uncommitted.
pub struct LibsqlWriteScope {
    tx: Transaction,
}

#[async_trait]
impl WriteScope for LibsqlWriteScope {
    async fn insert_rubric(&mut self, rubric: &Rubric) -> Result<()> {
        self.tx
            .execute(
                "INSERT INTO rubrics (id, project_id, name, description, created_at) VALUES (?, ?, ?, ?, ?)",
                params![
                    rubric.id.0.clone(),
                    rubric.project_id.clone(),
                    rubric.name.clone(),
                    rubric.description.clone(),
                    format_timestamp(&rubric.created_at),
                ],
            )
            .await?;
        Ok(())
    }

    async fn insert_criterion(&mut self, criterion: &Criterion) -> Result<()> {
        self.tx
            .execute(
                "INSERT INTO criteria (id, rubric_id, name, description, max_score, weight) VALUES (?, ?, ?, ?, ?, ?)",
                params![
                    criterion.id.0.clone(),
                    criterion.rubric_id.0.clone(),
                    criterion.name.clone(),
                    criterion.description.clone(),
                    criterion.max_score,
                    criterion.weight,
                ],
            )
            .await?;
        Ok(())
    }

    async fn insert_evaluation(&mut self, evaluation: &Evaluation) -> Result<()> {
        self.tx
            .execute(
                r#"
                INSERT INTO evaluations (
                    id, project_id, task_id, sprint_id, evaluator_id,
                    status, feedback, score, created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
                params![
                    evaluation.id.0.clone(),
                    evaluation.project_id.clone(),
                    evaluation.task_id.clone(),
                    evaluation.sprint_id.clone(),
                    evaluation.evaluator_id.clone(),
                    evaluation.status.as_str(),
                    evaluation.feedback.clone(),
                    evaluation.score,
                    format_timestamp(&evaluation.created_at),
                    format_timestamp(&evaluation.updated_at),
                ],
            )
            .await?;
        Ok(())
    }

    async fn update_evaluation(
        &mut self,
        id: &EvaluationId,
        feedback: Option<&str>,
        score: Option<i64>,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        let updated = self
            .tx
            .execute(
                "UPDATE evaluations SET feedback = ?, score = ?, updated_at = ? WHERE id = ?",
                params![
                    feedback.map(str::to_string),
                    score,
                    format_timestamp(&updated_at),
                    id.0.clone(),
                ],
            )
            .await?;

        if updated == 0 {
            return Err(evaluation_not_found(id));
        }
        Ok(())
    }

    async fn delete_criterion_scores(&mut self, evaluation_id: &EvaluationId) -> Result<()> {
        self.tx
            .execute(
                "DELETE FROM evaluation_criteria WHERE evaluation_id = ?",
                params![evaluation_id.0.clone()],
            )
            .await?;
        Ok(())
    }

    async fn insert_criterion_score(&mut self, score: &EvaluationCriterionScore) -> Result<()> {
        self.tx
            .execute(
                "INSERT INTO evaluation_criteria (id, evaluation_id, criteria_id, score) VALUES (?, ?, ?, ?)",
                params![
                    score.id.clone(),
                    score.evaluation_id.0.clone(),
                    score.criterion_id.0.clone(),
                    score.score,
                ],
            )
            .await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await.map_err(|e| {
            let error_msg = e.to_string();
            if error_msg.contains("locked") || error_msg.contains("busy") {
                SprintlensError::Database(
                    "Transaction failed: database is locked. Another process may be writing."
                        .to_string(),
                )
            } else if error_msg.contains("constraint failed") {
                SprintlensError::ConstraintViolation(error_msg)
            } else {
                SprintlensError::Database(format!("Transaction commit failed: {}", error_msg))
            }
        })
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
