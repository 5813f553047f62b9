mod schema;
mod store;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::functions::FunctionFlags;
use rusqlite::{Connection, OptionalExtension};
use uuid::Uuid;

use crate::models::*;

const PROJECT_COLUMNS: &str =
    "id, title, description, status, progress, deadline, manager_id, created_at, updated_at";

const TASK_COLUMNS: &str = "id, project_id, title, description, status, priority, due_date, \
     assigned_to, created_by, created_at, updated_at";

pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn open(path: PathBuf) -> Result<Self> {
        let parent = path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Database path has no parent directory"))?;
        std::fs::create_dir_all(parent)?;
        let conn = Connection::open(&path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        configure(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Location of the database when `TEAMSYNC_DB_PATH` is not set.
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "teamsync")
            .map(|dirs| dirs.data_dir().join("teamsync.db"))
    }

    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        configure(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().expect("database lock poisoned");
        schema::run_migrations(&conn)
    }

    // ============================================================
    // Project operations
    // ============================================================

    /// All projects, most recently updated first.
    pub fn get_all_projects(&self) -> Result<Vec<Project>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(&format!(
            "SELECT {PROJECT_COLUMNS} FROM projects ORDER BY updated_at DESC, title"
        ))?;

        let projects = stmt
            .query_map([], project_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(projects)
    }

    pub fn get_project(&self, id: Uuid) -> Result<Option<Project>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let project = conn
            .query_row(
                &format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ?"),
                [id.to_string()],
                project_from_row,
            )
            .optional()?;
        Ok(project)
    }

    pub fn create_project(&self, input: CreateProjectInput) -> Result<Project> {
        let title = input.title.trim().to_string();
        if title.is_empty() {
            anyhow::bail!("Project title must not be empty");
        }

        let conn = self.conn.lock().expect("database lock poisoned");
        let id = Uuid::new_v4();
        let now = Utc::now();
        let status = input.status.unwrap_or(ProjectStatus::Planning);
        let progress = input.progress.unwrap_or(0).min(100);

        conn.execute(
            "INSERT INTO projects (id, title, description, status, progress, deadline, manager_id, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            (
                id.to_string(),
                &title,
                &input.description,
                status.as_str(),
                progress,
                input.deadline.map(format_datetime),
                input.manager_id.map(|m| m.to_string()),
                format_datetime(now),
                format_datetime(now),
            ),
        )?;

        tracing::debug!(project_id = %id, "Created project {:?}", title);

        Ok(Project {
            id,
            title,
            description: input.description,
            status,
            progress,
            deadline: input.deadline,
            manager_id: input.manager_id,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn update_project(&self, id: Uuid, input: UpdateProjectInput) -> Result<Option<Project>> {
        let Some(existing) = self.get_project(id)? else {
            return Ok(None);
        };

        let conn = self.conn.lock().expect("database lock poisoned");
        let now = Utc::now();
        let title = input.title.unwrap_or(existing.title);
        let description = input.description.or(existing.description);
        let status = input.status.unwrap_or(existing.status);
        let progress = input.progress.map(|p| p.min(100)).unwrap_or(existing.progress);
        let deadline = input.deadline.or(existing.deadline);

        conn.execute(
            "UPDATE projects SET title = ?, description = ?, status = ?, progress = ?, deadline = ?, updated_at = ?
             WHERE id = ?",
            (
                &title,
                &description,
                status.as_str(),
                progress,
                deadline.map(format_datetime),
                format_datetime(now),
                id.to_string(),
            ),
        )?;

        Ok(Some(Project {
            id,
            title,
            description,
            status,
            progress,
            deadline,
            manager_id: existing.manager_id,
            created_at: existing.created_at,
            updated_at: now,
        }))
    }

    // ============================================================
    // Task operations
    // ============================================================

    /// All tasks, earliest due date first. Tasks without a due date come last.
    pub fn get_all_tasks(&self) -> Result<Vec<Task>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks ORDER BY due_date IS NULL, due_date, title"
        ))?;

        let tasks = stmt
            .query_map([], task_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(tasks)
    }

    pub fn get_tasks_by_project(&self, project_id: Uuid) -> Result<Vec<Task>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE project_id = ?
             ORDER BY due_date IS NULL, due_date, title"
        ))?;

        let tasks = stmt
            .query_map([project_id.to_string()], task_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(tasks)
    }

    pub fn get_task(&self, id: Uuid) -> Result<Option<Task>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let task = conn
            .query_row(
                &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?"),
                [id.to_string()],
                task_from_row,
            )
            .optional()?;
        Ok(task)
    }

    pub fn create_task(&self, project_id: Uuid, input: CreateTaskInput) -> Result<Task> {
        self.get_project(project_id)?
            .ok_or_else(|| anyhow::anyhow!("Project not found"))?;

        let conn = self.conn.lock().expect("database lock poisoned");
        let id = Uuid::new_v4();
        let now = Utc::now();
        let status = input.status.unwrap_or(TaskStatus::Todo);
        let priority = input.priority.unwrap_or(TaskPriority::Medium);

        conn.execute(
            "INSERT INTO tasks (id, project_id, title, description, status, priority, due_date, assigned_to, created_by, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            (
                id.to_string(),
                project_id.to_string(),
                &input.title,
                &input.description,
                status.as_str(),
                priority.as_str(),
                input.due_date.map(format_datetime),
                input.assigned_to.map(|a| a.to_string()),
                input.created_by.to_string(),
                format_datetime(now),
                format_datetime(now),
            ),
        )?;

        Ok(Task {
            id,
            project_id,
            title: input.title,
            description: input.description,
            status,
            priority,
            due_date: input.due_date,
            assigned_to: input.assigned_to,
            created_by: input.created_by,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn update_task(&self, id: Uuid, input: UpdateTaskInput) -> Result<Option<Task>> {
        let Some(existing) = self.get_task(id)? else {
            return Ok(None);
        };

        let conn = self.conn.lock().expect("database lock poisoned");
        let now = Utc::now();
        let updated = Task {
            title: input.title.unwrap_or(existing.title),
            description: input.description.or(existing.description),
            status: input.status.unwrap_or(existing.status),
            priority: input.priority.unwrap_or(existing.priority),
            due_date: input.due_date.or(existing.due_date),
            assigned_to: input.assigned_to.or(existing.assigned_to),
            updated_at: now,
            ..existing
        };

        conn.execute(
            "UPDATE tasks SET title = ?, description = ?, status = ?, priority = ?, due_date = ?, assigned_to = ?, updated_at = ?
             WHERE id = ?",
            (
                &updated.title,
                &updated.description,
                updated.status.as_str(),
                updated.priority.as_str(),
                updated.due_date.map(format_datetime),
                updated.assigned_to.map(|a| a.to_string()),
                format_datetime(now),
                id.to_string(),
            ),
        )?;

        Ok(Some(updated))
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
        }
    }
}

/// Per-connection setup shared by file and in-memory databases.
///
/// `fold(text)` lower-cases with Unicode rules; SQLite's own `LIKE` only
/// ignores case for ASCII letters.
fn configure(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.create_scalar_function(
        "fold",
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let text: Option<String> = ctx.get(0)?;
            Ok(text.map(|t| t.to_lowercase()))
        },
    )?;
    Ok(())
}

fn project_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        id: parse_uuid(row.get::<_, String>(0)?),
        title: row.get(1)?,
        description: row.get(2)?,
        status: ProjectStatus::from_str(&row.get::<_, String>(3)?)
            .unwrap_or(ProjectStatus::Planning),
        progress: row.get::<_, i64>(4)?.clamp(0, 100) as u8,
        deadline: row.get::<_, Option<String>>(5)?.map(parse_datetime),
        manager_id: row.get::<_, Option<String>>(6)?.map(parse_uuid),
        created_at: parse_datetime(row.get::<_, String>(7)?),
        updated_at: parse_datetime(row.get::<_, String>(8)?),
    })
}

fn task_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Task> {
    Ok(Task {
        id: parse_uuid(row.get::<_, String>(0)?),
        project_id: parse_uuid(row.get::<_, String>(1)?),
        title: row.get(2)?,
        description: row.get(3)?,
        status: TaskStatus::from_str(&row.get::<_, String>(4)?).unwrap_or(TaskStatus::Todo),
        priority: TaskPriority::from_str(&row.get::<_, String>(5)?)
            .unwrap_or(TaskPriority::Medium),
        due_date: row.get::<_, Option<String>>(6)?.map(parse_datetime),
        assigned_to: row.get::<_, Option<String>>(7)?.map(parse_uuid),
        created_by: parse_uuid(row.get::<_, String>(8)?),
        created_at: parse_datetime(row.get::<_, String>(9)?),
        updated_at: parse_datetime(row.get::<_, String>(10)?),
    })
}

/// Timestamps are stored as fixed-width RFC 3339 UTC strings so that text
/// comparison in SQL matches chronological order.
pub(crate) fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_uuid(s: String) -> Uuid {
    Uuid::parse_str(&s).unwrap_or_else(|_| Uuid::nil())
}

fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
