//! Storage layer for taskmind data.
//!
//! Tasks live in a single SQLite database (`tasks.db`) inside the data
//! directory. The data directory is resolved as:
//!
//! 1. An explicit path (the `--data-dir` flag)
//! 2. The `TM_DATA_DIR` environment variable
//! 3. `~/.local/share/taskmind/` (platform data dir)
//!
//! Timestamps are stored as RFC 3339 text; status and priority as their
//! snake_case names.

use crate::models::{Task, TaskPriority, TaskStatus};
use crate::{Error, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "TM_DATA_DIR";

/// Database file name inside the data directory.
pub const DB_FILE: &str = "tasks.db";

const TASK_COLUMNS: &str =
    "id, title, description, status, priority, due_date, created_at, updated_at";

/// Filters for listing tasks. `None` fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    /// Case-insensitive substring matched against title and description
    pub search: Option<String>,
}

impl TaskFilter {
    /// Whether no filter is set.
    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.priority.is_none() && self.search_term().is_none()
    }

    fn search_term(&self) -> Option<&str> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// Storage manager for the task database.
pub struct Storage {
    /// Data directory holding the database
    pub root: PathBuf,
    conn: Connection,
}

impl Storage {
    /// Open storage in the resolved data directory, creating it if needed.
    pub fn open(explicit_dir: Option<&Path>) -> Result<Self> {
        let root = get_data_dir(explicit_dir)?;
        Self::open_in(&root)
    }

    /// Open storage rooted at `root`, creating the directory and schema if needed.
    pub fn open_in(root: &Path) -> Result<Self> {
        fs::create_dir_all(root)?;

        let conn = Connection::open(root.join(DB_FILE))?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Self::init_schema(&conn)?;

        Ok(Self {
            root: root.to_path_buf(),
            conn,
        })
    }

    /// Initialize the SQLite schema.
    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS tasks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                description TEXT,
                status TEXT NOT NULL DEFAULT 'todo',
                priority TEXT NOT NULL DEFAULT 'medium',
                due_date TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status);
            CREATE INDEX IF NOT EXISTS idx_tasks_priority ON tasks(priority);
            CREATE INDEX IF NOT EXISTS idx_tasks_created_at ON tasks(created_at);
            "#,
        )?;
        Ok(())
    }

    /// Get the data directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    // === Task Operations ===

    /// Insert a new task and return it with its assigned ID.
    pub fn create_task(&mut self, task: &Task) -> Result<Task> {
        self.conn.execute(
            r#"
            INSERT INTO tasks
            (title, description, status, priority, due_date, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                task.title,
                task.description,
                task.status.as_str(),
                task.priority.as_str(),
                task.due_date.map(format_timestamp),
                format_timestamp(task.created_at),
                format_timestamp(task.updated_at),
            ],
        )?;

        let mut created = task.clone();
        created.id = self.conn.last_insert_rowid();
        Ok(created)
    }

    /// Get a task by ID.
    pub fn get_task(&self, id: i64) -> Result<Task> {
        let sql = format!("SELECT {} FROM tasks WHERE id = ?1", TASK_COLUMNS);
        self.conn
            .query_row(&sql, [id], row_to_task)
            .optional()?
            .ok_or_else(|| Error::NotFound(format!("Task not found: {}", id)))
    }

    /// List tasks matching `filter`, newest first.
    pub fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        let mut sql = format!("SELECT {} FROM tasks WHERE 1=1", TASK_COLUMNS);
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(status) = filter.status {
            sql.push_str(" AND status = ?");
            params_vec.push(Box::new(status.as_str()));
        }
        if let Some(priority) = filter.priority {
            sql.push_str(" AND priority = ?");
            params_vec.push(Box::new(priority.as_str()));
        }
        if let Some(term) = filter.search_term() {
            sql.push_str(
                " AND (title LIKE ? ESCAPE '\\' OR IFNULL(description, '') LIKE ? ESCAPE '\\')",
            );
            let pattern = format!("%{}%", escape_like(term));
            params_vec.push(Box::new(pattern.clone()));
            params_vec.push(Box::new(pattern));
        }

        sql.push_str(" ORDER BY created_at DESC, id DESC");

        let params_refs: Vec<&dyn rusqlite::ToSql> =
            params_vec.iter().map(|p| p.as_ref()).collect();

        let mut stmt = self.conn.prepare(&sql)?;
        let tasks = stmt
            .query_map(params_refs.as_slice(), row_to_task)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tasks)
    }

    /// List every task, newest first.
    pub fn all_tasks(&self) -> Result<Vec<Task>> {
        self.list_tasks(&TaskFilter::default())
    }

    /// Persist every mutable field of `task`. The creation timestamp is never rewritten.
    pub fn update_task(&mut self, task: &Task) -> Result<()> {
        let changed = self.conn.execute(
            r#"
            UPDATE tasks
            SET title = ?1, description = ?2, status = ?3, priority = ?4,
                due_date = ?5, updated_at = ?6
            WHERE id = ?7
            "#,
            params![
                task.title,
                task.description,
                task.status.as_str(),
                task.priority.as_str(),
                task.due_date.map(format_timestamp),
                format_timestamp(task.updated_at),
                task.id,
            ],
        )?;

        if changed == 0 {
            return Err(Error::NotFound(format!("Task not found: {}", task.id)));
        }
        Ok(())
    }

    /// Delete a task by ID.
    pub fn delete_task(&mut self, id: i64) -> Result<()> {
        let changed = self.conn.execute("DELETE FROM tasks WHERE id = ?1", [id])?;
        if changed == 0 {
            return Err(Error::NotFound(format!("Task not found: {}", id)));
        }
        Ok(())
    }

    /// Advance a task's status through todo → doing → done → todo.
    ///
    /// Works from the raw stored value so an unrecognized status resets to todo.
    pub fn toggle_status(&mut self, id: i64) -> Result<Task> {
        let tx = self.conn.transaction()?;

        let raw: String = tx
            .query_row("SELECT status FROM tasks WHERE id = ?1", [id], |row| {
                row.get(0)
            })
            .optional()?
            .ok_or_else(|| Error::NotFound(format!("Task not found: {}", id)))?;

        let next = TaskStatus::cycle_from(&raw);
        tx.execute(
            "UPDATE tasks SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![next.as_str(), format_timestamp(Utc::now()), id],
        )?;
        tx.commit()?;

        self.get_task(id)
    }
}

fn row_to_task(row: &Row<'_>) -> rusqlite::Result<Task> {
    let id: i64 = row.get(0)?;
    let status: String = row.get(3)?;
    let priority: String = row.get(4)?;
    let due_date: Option<String> = row.get(5)?;

    Ok(Task {
        id,
        title: row.get(1)?,
        description: row.get(2)?,
        status: status.parse().unwrap_or_else(|_| {
            tracing::warn!(task_id = id, status = %status, "unknown stored status, reading as todo");
            TaskStatus::default()
        }),
        priority: priority.parse().unwrap_or_else(|_| {
            tracing::warn!(task_id = id, priority = %priority, "unknown stored priority, reading as medium");
            TaskPriority::default()
        }),
        due_date: due_date.map(|s| parse_timestamp(5, &s)).transpose()?,
        created_at: parse_timestamp(6, &row.get::<_, String>(6)?)?,
        updated_at: parse_timestamp(7, &row.get::<_, String>(7)?)?,
    })
}

/// Fixed-width UTC form so text ordering matches time ordering.
fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(idx: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Get the data directory.
///
/// Priority: explicit path > `TM_DATA_DIR` > platform data dir + `taskmind`.
pub fn get_data_dir(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        if !dir.is_empty() {
            return Ok(PathBuf::from(dir));
        }
    }
    let data_dir = dirs::data_dir()
        .ok_or_else(|| Error::Other("Could not determine data directory".to_string()))?;
    Ok(data_dir.join("taskmind"))
}

/// Parse a status string, accepting a few common spellings.
pub fn parse_status(s: &str) -> Result<TaskStatus> {
    match s.trim().to_lowercase().as_str() {
        "todo" | "to_do" | "to-do" => Ok(TaskStatus::Todo),
        "doing" | "in_progress" | "in-progress" => Ok(TaskStatus::Doing),
        "done" => Ok(TaskStatus::Done),
        _ => Err(Error::InvalidInput(format!(
            "Invalid status: {} (expected todo, doing or done)",
            s
        ))),
    }
}

/// Parse a priority string.
pub fn parse_priority(s: &str) -> Result<TaskPriority> {
    s.trim().to_lowercase().parse().map_err(|_| {
        Error::InvalidInput(format!(
            "Invalid priority: {} (expected low, medium, high or urgent)",
            s
        ))
    })
}
