//! Data models for taskmind entities.
//!
//! This module defines the core data structures:
//! - `Task` - Work items with status, priority and an optional due date
//! - `TaskDraft` / `TaskPatch` - Validated input for creating and editing tasks
//! - `TaskStats` - Per-status counts over a set of tasks
//! - `TaskView` - A task decorated with display labels and the derived overdue flag

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Error, Result};

/// Minimum number of characters in a trimmed title.
pub const TITLE_MIN_CHARS: usize = 3;

/// Maximum number of characters in a title.
pub const TITLE_MAX_CHARS: usize = 200;

/// Task status in the workflow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Todo,
    Doing,
    Done,
}

impl TaskStatus {
    /// Get all statuses in cycle order.
    pub fn all() -> &'static [TaskStatus] {
        &[TaskStatus::Todo, TaskStatus::Doing, TaskStatus::Done]
    }

    /// Stored representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Todo => "todo",
            TaskStatus::Doing => "doing",
            TaskStatus::Done => "done",
        }
    }

    /// Display label shown to users.
    pub fn label(&self) -> &'static str {
        match self {
            TaskStatus::Todo => "À faire",
            TaskStatus::Doing => "En cours",
            TaskStatus::Done => "Terminé",
        }
    }

    /// Next status in the todo → doing → done → todo cycle.
    pub fn next(self) -> TaskStatus {
        match self {
            TaskStatus::Todo => TaskStatus::Doing,
            TaskStatus::Doing => TaskStatus::Done,
            TaskStatus::Done => TaskStatus::Todo,
        }
    }

    /// Advance a raw stored status value through the cycle.
    ///
    /// Values that are not a known status reset to `Todo`.
    pub fn cycle_from(raw: &str) -> TaskStatus {
        raw.parse::<TaskStatus>()
            .map(TaskStatus::next)
            .unwrap_or_default()
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "todo" => Ok(TaskStatus::Todo),
            "doing" => Ok(TaskStatus::Doing),
            "done" => Ok(TaskStatus::Done),
            _ => Err(format!("Unknown status: {}", s)),
        }
    }
}

/// Task priority.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl TaskPriority {
    /// Get all priorities from lowest to highest.
    pub fn all() -> &'static [TaskPriority] {
        &[
            TaskPriority::Low,
            TaskPriority::Medium,
            TaskPriority::High,
            TaskPriority::Urgent,
        ]
    }

    /// Stored representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskPriority::Low => "low",
            TaskPriority::Medium => "medium",
            TaskPriority::High => "high",
            TaskPriority::Urgent => "urgent",
        }
    }

    /// Display label shown to users.
    pub fn label(&self) -> &'static str {
        match self {
            TaskPriority::Low => "Basse",
            TaskPriority::Medium => "Moyenne",
            TaskPriority::High => "Haute",
            TaskPriority::Urgent => "Urgente",
        }
    }
}

impl fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for TaskPriority {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "low" => Ok(TaskPriority::Low),
            "medium" => Ok(TaskPriority::Medium),
            "high" => Ok(TaskPriority::High),
            "urgent" => Ok(TaskPriority::Urgent),
            _ => Err(format!("Unknown priority: {}", s)),
        }
    }
}

/// A work item tracked by taskmind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Row identifier assigned by the store (0 until inserted)
    pub id: i64,

    /// Task title, trimmed
    pub title: String,

    /// Detailed description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Current status
    #[serde(default)]
    pub status: TaskStatus,

    /// Priority level
    #[serde(default)]
    pub priority: TaskPriority,

    /// Deadline
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,

    /// Creation timestamp, never changes after insert
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Create a new task with the given ID and title.
    pub fn new(id: i64, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            title: title.into(),
            description: None,
            status: TaskStatus::default(),
            priority: TaskPriority::default(),
            due_date: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the task is past its due date at `now` and not done.
    pub fn is_overdue_at(&self, now: DateTime<Utc>) -> bool {
        match self.due_date {
            Some(due) if self.status != TaskStatus::Done => due < now,
            _ => false,
        }
    }

    /// Whether the task is overdue right now.
    pub fn is_overdue(&self) -> bool {
        self.is_overdue_at(Utc::now())
    }

    /// Decorate the task with display labels and the overdue flag at `now`.
    pub fn view(&self, now: DateTime<Utc>) -> TaskView<'_> {
        TaskView {
            task: self,
            status_display: self.status.label(),
            priority_display: self.priority.label(),
            overdue: self.is_overdue_at(now),
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.title, self.status.label())
    }
}

/// A task as presented to API clients.
#[derive(Debug, Serialize)]
pub struct TaskView<'a> {
    #[serde(flatten)]
    pub task: &'a Task,
    pub status_display: &'static str,
    pub priority_display: &'static str,
    pub overdue: bool,
}

/// Input for creating a task.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskDraft {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub priority: TaskPriority,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
}

impl TaskDraft {
    /// Create a draft with only a title; everything else takes defaults.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    /// Validate the draft at `now` and build an unsaved task from it.
    pub fn into_task(self, now: DateTime<Utc>) -> Result<Task> {
        let title = validate_title(&self.title)?;
        if let Some(due) = self.due_date {
            validate_due_date(due, now)?;
        }

        Ok(Task {
            id: 0,
            title,
            description: normalize_description(self.description),
            status: self.status,
            priority: self.priority,
            due_date: self.due_date,
            created_at: now,
            updated_at: now,
        })
    }
}

/// Partial edit of an existing task. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskPatch {
    #[serde(default)]
    pub title: Option<String>,
    /// An empty string clears the description
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(default)]
    pub priority: Option<TaskPriority>,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub clear_due_date: bool,
}

impl TaskPatch {
    /// Whether the patch changes nothing.
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.status.is_none()
            && self.priority.is_none()
            && self.due_date.is_none()
            && !self.clear_due_date
    }

    /// Validate the patch at `now` and apply it to `task`.
    ///
    /// `task` is left untouched when validation fails.
    pub fn apply(&self, task: &mut Task, now: DateTime<Utc>) -> Result<()> {
        let title = match &self.title {
            Some(title) => Some(validate_title(title)?),
            None => None,
        };
        if self.clear_due_date && self.due_date.is_some() {
            return Err(Error::InvalidInput(
                "Cannot set and clear the due date at the same time".to_string(),
            ));
        }
        if let Some(due) = self.due_date {
            validate_due_date(due, now)?;
        }

        if let Some(title) = title {
            task.title = title;
        }
        if let Some(description) = &self.description {
            task.description = normalize_description(Some(description.clone()));
        }
        if let Some(status) = self.status {
            task.status = status;
        }
        if let Some(priority) = self.priority {
            task.priority = priority;
        }
        if self.clear_due_date {
            task.due_date = None;
        } else if self.due_date.is_some() {
            task.due_date = self.due_date;
        }
        task.updated_at = now;

        Ok(())
    }
}

/// Per-status counts over a set of tasks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStats {
    pub total: usize,
    pub todo: usize,
    pub doing: usize,
    pub done: usize,
    pub overdue: usize,
}

impl TaskStats {
    /// Count tasks by status, and those overdue at `now`.
    pub fn from_tasks(tasks: &[Task], now: DateTime<Utc>) -> Self {
        let mut stats = Self {
            total: tasks.len(),
            ..Self::default()
        };
        for task in tasks {
            match task.status {
                TaskStatus::Todo => stats.todo += 1,
                TaskStatus::Doing => stats.doing += 1,
                TaskStatus::Done => stats.done += 1,
            }
            if task.is_overdue_at(now) {
                stats.overdue += 1;
            }
        }
        stats
    }
}

/// Trim and check a title.
pub fn validate_title(title: &str) -> Result<String> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidInput("Le titre est obligatoire.".to_string()));
    }
    let len = trimmed.chars().count();
    if len < TITLE_MIN_CHARS {
        return Err(Error::InvalidInput(format!(
            "Le titre doit contenir au moins {} caractères.",
            TITLE_MIN_CHARS
        )));
    }
    if len > TITLE_MAX_CHARS {
        return Err(Error::InvalidInput(format!(
            "Le titre ne peut pas dépasser {} caractères.",
            TITLE_MAX_CHARS
        )));
    }
    Ok(trimmed.to_string())
}

/// Reject due dates earlier than `now`.
pub fn validate_due_date(due: DateTime<Utc>, now: DateTime<Utc>) -> Result<()> {
    if due < now {
        return Err(Error::InvalidInput(
            "La date d'échéance ne peut pas être dans le passé.".to_string(),
        ));
    }
    Ok(())
}

fn normalize_description(description: Option<String>) -> Option<String> {
    description
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty())
}

/// Parse a user-supplied date or date-time.
///
/// Accepts RFC 3339, `YYYY-MM-DD HH:MM`, `YYYY-MM-DDTHH:MM`,
/// `DD/MM/YYYY HH:MM` and `YYYY-MM-DD`. Values without an offset are read
/// as local time; a bare date means local midnight.
pub fn parse_datetime(input: &str) -> Result<DateTime<Utc>> {
    let input = input.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(dt.with_timezone(&Utc));
    }

    const NAIVE_FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%d/%m/%Y %H:%M",
    ];
    let naive = NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(input, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(input, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .ok_or_else(|| Error::InvalidInput(format!("Invalid date: {}", input)))?;

    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| Error::InvalidInput(format!("Date does not exist locally: {}", input)))
}
