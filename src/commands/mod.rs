//! Command implementations for the taskmind CLI.
//!
//! This module contains the business logic for each CLI command. Every
//! command returns a result struct implementing [`Output`], rendered as JSON
//! by default or as text with `-H`.

use crate::config::ResolvedConfig;
use crate::inference::{ChatOptions, ChatRequest, InferenceBackend};
use crate::insights::{InsightGenerator, InsightReport, ModelSelection, select_model};
use crate::models::{Task, TaskDraft, TaskPatch, TaskStats, TaskView, parse_datetime};
use crate::storage::{Storage, TaskFilter, parse_priority, parse_status};
use crate::{Error, Result};
use chrono::{DateTime, Local, Utc};
use serde::{Serialize, Serializer};
use std::path::Path;

/// Tasks per page in listings.
pub const PAGE_SIZE: usize = 10;

/// Command results that can be serialized to JSON or formatted for humans.
pub trait Output {
    /// Serialize to JSON string.
    fn to_json(&self) -> String;

    /// Format for human-readable output.
    fn to_human(&self) -> String;
}

fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| format!(r#"{{"error": "{}"}}"#, e))
}

fn format_due(task: &Task) -> Option<String> {
    task.due_date
        .map(|d| d.with_timezone(&Local).format("%d/%m/%Y %H:%M").to_string())
}

// === Pagination ===

/// Position of a page within a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageInfo {
    /// 1-based page number
    pub number: usize,
    pub total_pages: usize,
    pub total_count: usize,
}

impl PageInfo {
    pub fn has_previous(&self) -> bool {
        self.number > 1
    }

    pub fn has_next(&self) -> bool {
        self.number < self.total_pages
    }
}

/// Cut `items` into pages of [`PAGE_SIZE`] and return the requested one.
///
/// Out-of-range page numbers are clamped to the first or last page.
pub fn paginate<T>(items: Vec<T>, page: usize) -> (Vec<T>, PageInfo) {
    let total_count = items.len();
    let total_pages = total_count.div_ceil(PAGE_SIZE).max(1);
    let number = page.clamp(1, total_pages);
    let slice = items
        .into_iter()
        .skip((number - 1) * PAGE_SIZE)
        .take(PAGE_SIZE)
        .collect();
    (
        slice,
        PageInfo {
            number,
            total_pages,
            total_count,
        },
    )
}

// === Task Commands ===

/// A task as returned by `show` and `list`.
///
/// Serializes as the task's [`TaskView`], the same shape the web API returns.
#[derive(Debug, Clone)]
pub struct TaskDetail {
    pub task: Task,
    /// Instant the overdue flag is evaluated at
    pub as_of: DateTime<Utc>,
}

impl From<Task> for TaskDetail {
    fn from(task: Task) -> Self {
        Self {
            task,
            as_of: Utc::now(),
        }
    }
}

impl Serialize for TaskDetail {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.view().serialize(serializer)
    }
}

impl TaskDetail {
    pub fn view(&self) -> TaskView<'_> {
        self.task.view(self.as_of)
    }

    fn summary_line(&self) -> String {
        let view = self.view();
        let mut line = format!(
            "#{} {} [{}] [{}]",
            self.task.id, self.task.title, view.status_display, view.priority_display
        );
        if let Some(due) = format_due(&self.task) {
            line.push_str(&format!(" échéance {}", due));
        }
        if view.overdue {
            line.push_str(" (en retard)");
        }
        line
    }
}

impl Output for TaskDetail {
    fn to_json(&self) -> String {
        to_json(self)
    }

    fn to_human(&self) -> String {
        let view = self.view();
        let mut lines = vec![format!("#{} {}", self.task.id, self.task.title)];
        lines.push(format!("  Statut: {}", view.status_display));
        lines.push(format!("  Priorité: {}", view.priority_display));
        if let Some(ref desc) = self.task.description {
            lines.push(format!("  Description: {}", desc));
        }
        if let Some(due) = format_due(&self.task) {
            let marker = if view.overdue { " (en retard)" } else { "" };
            lines.push(format!("  Échéance: {}{}", due, marker));
        }
        lines.push(format!(
            "  Créée le: {}",
            self.task.created_at.with_timezone(&Local).format("%d/%m/%Y %H:%M")
        ));
        lines.push(format!(
            "  Modifiée le: {}",
            self.task.updated_at.with_timezone(&Local).format("%d/%m/%Y %H:%M")
        ));
        lines.join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct TaskCreated {
    pub id: i64,
    pub title: String,
}

impl Output for TaskCreated {
    fn to_json(&self) -> String {
        to_json(self)
    }

    fn to_human(&self) -> String {
        format!("Tâche créée avec succès ! #{} {}", self.id, self.title)
    }
}

/// Parse an optional status argument.
fn status_arg(value: Option<&str>) -> Result<Option<crate::models::TaskStatus>> {
    value.map(parse_status).transpose()
}

/// Parse an optional priority argument.
fn priority_arg(value: Option<&str>) -> Result<Option<crate::models::TaskPriority>> {
    value.map(parse_priority).transpose()
}

/// Create a new task.
pub fn task_create(
    data_dir: &Path,
    title: String,
    description: Option<String>,
    status: Option<&str>,
    priority: Option<&str>,
    due: Option<&str>,
) -> Result<TaskCreated> {
    let mut storage = Storage::open_in(data_dir)?;

    let draft = TaskDraft {
        title,
        description,
        status: status_arg(status)?.unwrap_or_default(),
        priority: priority_arg(priority)?.unwrap_or_default(),
        due_date: due.map(parse_datetime).transpose()?,
    };
    let task = storage.create_task(&draft.into_task(Utc::now())?)?;

    Ok(TaskCreated {
        id: task.id,
        title: task.title,
    })
}

#[derive(Serialize)]
pub struct TaskList {
    pub tasks: Vec<TaskDetail>,
    pub page: PageInfo,
}

impl Output for TaskList {
    fn to_json(&self) -> String {
        to_json(self)
    }

    fn to_human(&self) -> String {
        if self.tasks.is_empty() {
            return "Aucune tâche.".to_string();
        }
        let mut lines: Vec<String> = self.tasks.iter().map(TaskDetail::summary_line).collect();
        lines.push(format!(
            "Page {}/{} ({} tâche(s))",
            self.page.number, self.page.total_pages, self.page.total_count
        ));
        lines.join("\n")
    }
}

/// List tasks with optional filters, newest first.
pub fn task_list(
    data_dir: &Path,
    status: Option<&str>,
    priority: Option<&str>,
    search: Option<&str>,
    page: usize,
) -> Result<TaskList> {
    let storage = Storage::open_in(data_dir)?;
    let filter = TaskFilter {
        status: status_arg(status)?,
        priority: priority_arg(priority)?,
        search: search.map(|s| s.to_string()),
    };
    let (tasks, page) = paginate(storage.list_tasks(&filter)?, page);

    Ok(TaskList {
        tasks: tasks.into_iter().map(TaskDetail::from).collect(),
        page,
    })
}

/// Show a single task.
pub fn task_show(data_dir: &Path, id: i64) -> Result<TaskDetail> {
    let storage = Storage::open_in(data_dir)?;
    Ok(storage.get_task(id)?.into())
}

#[derive(Serialize)]
pub struct TaskUpdated {
    pub id: i64,
    pub updated_fields: Vec<&'static str>,
}

impl Output for TaskUpdated {
    fn to_json(&self) -> String {
        to_json(self)
    }

    fn to_human(&self) -> String {
        format!(
            "Tâche modifiée avec succès ! #{} ({})",
            self.id,
            self.updated_fields.join(", ")
        )
    }
}

/// Update fields of an existing task.
#[allow(clippy::too_many_arguments)]
pub fn task_update(
    data_dir: &Path,
    id: i64,
    title: Option<String>,
    description: Option<String>,
    status: Option<&str>,
    priority: Option<&str>,
    due: Option<&str>,
    clear_due: bool,
) -> Result<TaskUpdated> {
    let mut storage = Storage::open_in(data_dir)?;

    let patch = TaskPatch {
        title,
        description,
        status: status_arg(status)?,
        priority: priority_arg(priority)?,
        due_date: due.map(parse_datetime).transpose()?,
        clear_due_date: clear_due,
    };
    if patch.is_empty() {
        return Err(Error::InvalidInput("No fields to update".to_string()));
    }

    let mut updated_fields = Vec::new();
    if patch.title.is_some() {
        updated_fields.push("title");
    }
    if patch.description.is_some() {
        updated_fields.push("description");
    }
    if patch.status.is_some() {
        updated_fields.push("status");
    }
    if patch.priority.is_some() {
        updated_fields.push("priority");
    }
    if patch.due_date.is_some() || patch.clear_due_date {
        updated_fields.push("due_date");
    }

    let mut task = storage.get_task(id)?;
    patch.apply(&mut task, Utc::now())?;
    storage.update_task(&task)?;

    Ok(TaskUpdated { id, updated_fields })
}

#[derive(Serialize)]
pub struct TaskDeleted {
    pub id: i64,
}

impl Output for TaskDeleted {
    fn to_json(&self) -> String {
        to_json(self)
    }

    fn to_human(&self) -> String {
        format!("Tâche supprimée avec succès ! #{}", self.id)
    }
}

/// Delete a task.
pub fn task_delete(data_dir: &Path, id: i64) -> Result<TaskDeleted> {
    let mut storage = Storage::open_in(data_dir)?;
    storage.delete_task(id)?;
    Ok(TaskDeleted { id })
}

#[derive(Serialize)]
pub struct TaskToggled {
    pub id: i64,
    pub new_status: String,
    pub status_display: &'static str,
}

impl Output for TaskToggled {
    fn to_json(&self) -> String {
        to_json(self)
    }

    fn to_human(&self) -> String {
        format!("#{} -> {}", self.id, self.status_display)
    }
}

/// Advance a task to its next status.
pub fn task_toggle(data_dir: &Path, id: i64) -> Result<TaskToggled> {
    let mut storage = Storage::open_in(data_dir)?;
    let task = storage.toggle_status(id)?;
    Ok(TaskToggled {
        id: task.id,
        new_status: task.status.as_str().to_string(),
        status_display: task.status.label(),
    })
}

// === Stats ===

#[derive(Serialize)]
#[serde(transparent)]
pub struct StatsResult(pub TaskStats);

impl Output for StatsResult {
    fn to_json(&self) -> String {
        to_json(self)
    }

    fn to_human(&self) -> String {
        let s = &self.0;
        format!(
            "Total: {}\nÀ faire: {}\nEn cours: {}\nTerminées: {}\nEn retard: {}",
            s.total, s.todo, s.doing, s.done, s.overdue
        )
    }
}

/// Count tasks by status.
pub fn stats(data_dir: &Path) -> Result<StatsResult> {
    let storage = Storage::open_in(data_dir)?;
    Ok(StatsResult(TaskStats::from_tasks(&storage.all_tasks()?, Utc::now())))
}

// === Insights ===

#[derive(Debug, Serialize)]
#[serde(transparent)]
pub struct InsightsResult(pub InsightReport);

impl Output for InsightsResult {
    fn to_json(&self) -> String {
        to_json(self)
    }

    fn to_human(&self) -> String {
        let report = &self.0;
        let mut lines = Vec::new();
        if let Some(notice) = report.notice() {
            lines.push(format!("Note: {}", notice));
        }
        lines.push(report.analysis().to_string());
        lines.push(String::new());
        if let Some(s) = report.stats() {
            lines.push(format!(
                "{} tâches: {} à faire, {} en cours, {} terminées, {} en retard",
                s.total, s.todo, s.doing, s.done, s.overdue
            ));
        }
        lines.push(format!(
            "Modèle: {} - généré le {}",
            report.model_used(),
            report.generated_at_display()
        ));
        lines.join("\n")
    }
}

/// Generate insights over every stored task.
///
/// Fails without calling the model when Ollama is unreachable or there are
/// no tasks; every later failure is reported inside the result.
pub fn insights(data_dir: &Path, generator: &InsightGenerator) -> Result<InsightsResult> {
    let tasks = Storage::open_in(data_dir)?.all_tasks()?;
    generator
        .preflight(&tasks)
        .map_err(|blocker| Error::Other(blocker.to_string()))?;
    Ok(InsightsResult(generator.generate(&tasks)))
}

// === Ollama ===

#[derive(Serialize)]
pub struct OllamaStatus {
    pub url: String,
    pub reachable: bool,
    pub models: Vec<String>,
    pub preferred_model: String,
    pub preferred_installed: bool,
    /// What insight generation would use right now
    pub selection: Option<ModelSelection>,
}

impl Output for OllamaStatus {
    fn to_json(&self) -> String {
        to_json(self)
    }

    fn to_human(&self) -> String {
        let mut lines = Vec::new();
        if !self.reachable {
            lines.push(format!("Ollama n'est pas accessible sur {}", self.url));
            return lines.join("\n");
        }
        lines.push(format!("Ollama accessible sur {}", self.url));
        if self.models.is_empty() {
            lines.push("Aucun modèle installé".to_string());
        } else {
            lines.push(format!("Modèles disponibles ({}):", self.models.len()));
            for model in &self.models {
                lines.push(format!("  - {}", model));
            }
        }
        let mark = if self.preferred_installed { "installé" } else { "non installé" };
        lines.push(format!("Modèle préféré: {} ({})", self.preferred_model, mark));
        if let Some(ref selection) = self.selection {
            lines.push(format!("Modèle utilisé pour les insights: {}", selection.model));
        }
        lines.join("\n")
    }
}

/// Report reachability and installed models.
pub fn ollama_status(backend: &dyn InferenceBackend, url: &str, preferred: &str) -> OllamaStatus {
    let reachable = backend.is_reachable();
    let models = if reachable { backend.list_models() } else { Vec::new() };
    let selection = select_model(preferred, &models).ok();

    OllamaStatus {
        url: url.to_string(),
        reachable,
        preferred_installed: models.iter().any(|m| m == preferred),
        preferred_model: preferred.to_string(),
        models,
        selection,
    }
}

#[derive(Serialize)]
pub struct OllamaTest {
    pub model: String,
    pub response: String,
}

impl Output for OllamaTest {
    fn to_json(&self) -> String {
        to_json(self)
    }

    fn to_human(&self) -> String {
        format!("Modèle {} : {}", self.model, self.response.trim())
    }
}

/// Prompt used to check that a model answers.
pub const TEST_PROMPT: &str = "Dis juste \"OK\" en français";

/// Send a one-line prompt to the first available model.
pub fn ollama_test(backend: &dyn InferenceBackend) -> Result<OllamaTest> {
    let models = backend.list_models();
    let model = models
        .first()
        .ok_or_else(|| Error::Other(crate::insights::InsightError::NoModelAvailable.to_string()))?;

    let options = ChatOptions {
        num_predict: 10,
        ..ChatOptions::default()
    };
    let request = ChatRequest::single(model, TEST_PROMPT, options);
    let response = backend
        .chat(&request)
        .map_err(|e| Error::Other(e.to_string()))?;

    Ok(OllamaTest {
        model: model.clone(),
        response,
    })
}

// === Config ===

#[derive(Serialize)]
#[serde(transparent)]
pub struct ConfigShow(pub ResolvedConfig);

impl Output for ConfigShow {
    fn to_json(&self) -> String {
        to_json(self)
    }

    fn to_human(&self) -> String {
        let c = &self.0;
        let mut lines = vec![
            format!("ollama-url: {} ({})", c.ollama_url.value, c.ollama_url.source),
            format!("ollama-model: {} ({})", c.ollama_model.value, c.ollama_model.source),
            format!("temperature: {} ({})", c.temperature.value, c.temperature.source),
            format!("top-p: {} ({})", c.top_p.value, c.top_p.source),
            format!("num-predict: {} ({})", c.num_predict.value, c.num_predict.source),
            format!(
                "probe-timeout-secs: {} ({})",
                c.probe_timeout_secs.value, c.probe_timeout_secs.source
            ),
            format!("host: {} ({})", c.host.value, c.host.source),
            format!("port: {} ({})", c.port.value, c.port.source),
        ];
        if let Some(ref path) = c.config_path {
            lines.push(format!("config file: {}", path.display()));
        }
        lines.join("\n")
    }
}

/// Show the resolved configuration.
pub fn config_show(config: &ResolvedConfig) -> ConfigShow {
    ConfigShow(config.clone())
}
