//! Insight generation: choose a model, build the prompt, run the completion.
//!
//! [`InsightGenerator::generate`] never fails. Selection and inference
//! failures are folded into [`InsightReport::Degraded`] so callers can render
//! the result the same way in every case.

use crate::inference::{ChatOptions, ChatRequest, InferenceBackend};
use crate::models::{Task, TaskStats};
use chrono::{DateTime, Local, Utc};
use serde::{Serialize, Serializer};
use std::sync::Arc;
use thiserror::Error;

/// Model requested when nothing else is configured.
pub const DEFAULT_MODEL: &str = "llama3.1";

/// Known-good alternatives tried, in order, after the configured model.
pub const FALLBACK_MODELS: &[&str] = &[
    "llama3.1:latest",
    "llama3.1",
    "llama3:latest",
    "llama3",
    "mistral:latest",
    "mistral",
];

const DEGRADED_PREFIX: &str = "Erreur lors de la génération des insights : ";

const PULL_HINT: &str = "\n\nPour résoudre ce problème :\n1. Ouvrez un terminal\n2. Exécutez : ollama pull llama3.1\n3. Attendez le téléchargement\n4. Réessayez";

/// Shown in place of a model name when no model answered.
const NO_MODEL: &str = "N/A";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InsightError {
    #[error(
        "Aucun modèle Ollama n'est disponible. Veuillez installer un modèle avec 'ollama pull llama3.1'"
    )]
    NoModelAvailable,
}

/// A reason not to attempt generation at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InsightBlocker {
    #[error("Ollama n'est pas accessible. Assurez-vous qu'il est démarré sur le port 11434.")]
    Unreachable,
    #[error("Aucune tâche trouvée. Ajoutez des tâches pour obtenir des insights.")]
    NoTasks,
}

impl InsightBlocker {
    /// Stable identifier, used in redirect query strings.
    pub fn code(&self) -> &'static str {
        match self {
            InsightBlocker::Unreachable => "ollama_unreachable",
            InsightBlocker::NoTasks => "no_tasks",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "ollama_unreachable" => Some(InsightBlocker::Unreachable),
            "no_tasks" => Some(InsightBlocker::NoTasks),
            _ => None,
        }
    }

    /// One-line form for API responses.
    pub fn short_message(&self) -> &'static str {
        match self {
            InsightBlocker::Unreachable => "Ollama n'est pas accessible",
            InsightBlocker::NoTasks => "Aucune tâche trouvée",
        }
    }
}

/// Why a model other than the configured one was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Fallback {
    /// One of [`FALLBACK_MODELS`]
    KnownAlternative,
    /// Nothing known was installed; the first listed model was taken
    FirstAvailable,
}

/// Outcome of model selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelSelection {
    /// The model that will be used
    pub model: String,
    /// The model that was asked for
    pub requested: String,
    pub fallback: Option<Fallback>,
}

impl ModelSelection {
    /// User-facing note when the requested model was not used.
    pub fn notice(&self) -> Option<String> {
        self.fallback.map(|_| {
            format!(
                "Le modèle « {} » n'est pas installé, « {} » a été utilisé à la place.",
                self.requested, self.model
            )
        })
    }
}

/// Pick the model to use from those `available`.
///
/// The configured model wins, then the first of [`FALLBACK_MODELS`] that is
/// installed, then whatever is listed first.
pub fn select_model(configured: &str, available: &[String]) -> Result<ModelSelection, InsightError> {
    let is_available = |name: &str| available.iter().any(|m| m == name);

    let candidates = std::iter::once(configured).chain(FALLBACK_MODELS.iter().copied());
    for candidate in candidates {
        if is_available(candidate) {
            let fallback = (candidate != configured).then_some(Fallback::KnownAlternative);
            if fallback.is_some() {
                tracing::warn!(
                    "Model {} not available, using alternative {}",
                    configured,
                    candidate
                );
            }
            return Ok(ModelSelection {
                model: candidate.to_string(),
                requested: configured.to_string(),
                fallback,
            });
        }
    }

    match available.first() {
        Some(first) => {
            tracing::warn!(
                "Model {} not available, using first available model {}",
                configured,
                first
            );
            Ok(ModelSelection {
                model: first.clone(),
                requested: configured.to_string(),
                fallback: Some(Fallback::FirstAvailable),
            })
        }
        None => Err(InsightError::NoModelAvailable),
    }
}

/// Task as embedded in the prompt.
#[derive(Serialize)]
struct PromptTask<'a> {
    titre: &'a str,
    description: &'a str,
    statut: &'static str,
    #[serde(rename = "priorité")]
    priorite: &'static str,
    #[serde(rename = "créée_le")]
    creee_le: String,
    #[serde(rename = "échéance")]
    echeance: Option<String>,
    en_retard: bool,
}

/// Build the French analysis prompt for `tasks`.
pub fn build_prompt(tasks: &[Task], stats: &TaskStats, now: DateTime<Utc>) -> String {
    let listing: Vec<PromptTask<'_>> = tasks
        .iter()
        .map(|task| PromptTask {
            titre: &task.title,
            description: task.description.as_deref().unwrap_or("Pas de description"),
            statut: task.status.label(),
            priorite: task.priority.label(),
            creee_le: task.created_at.with_timezone(&Local).format("%d/%m/%Y").to_string(),
            echeance: task
                .due_date
                .map(|d| d.with_timezone(&Local).format("%d/%m/%Y %H:%M").to_string()),
            en_retard: task.is_overdue_at(now),
        })
        .collect();
    // Plain structs of strings and bools always serialize.
    let listing = serde_json::to_string_pretty(&listing).unwrap_or_default();

    format!(
        "Analyse ces {total} tâches et fournis des insights utiles en français :

Statistiques :
- Total : {total} tâches
- À faire : {todo}
- En cours : {doing}
- Terminées : {done}
- En retard : {overdue}

Détail des tâches :
{listing}

Fournis une analyse structurée avec :
1. Un résumé général de la situation
2. Les priorités recommandées
3. Des conseils d'organisation
4. Des points d'attention particuliers

Réponds en français, de manière concise et actionnable.
",
        total = stats.total,
        todo = stats.todo,
        doing = stats.doing,
        done = stats.done,
        overdue = stats.overdue,
        listing = listing,
    )
}

/// Result of one insight request.
#[derive(Debug, Clone, PartialEq)]
pub enum InsightReport {
    Ready {
        analysis: String,
        stats: TaskStats,
        model_used: String,
        notice: Option<String>,
        generated_at: DateTime<Utc>,
    },
    Degraded {
        message: String,
        generated_at: DateTime<Utc>,
    },
}

impl InsightReport {
    /// Build a degraded report from a failure's text.
    pub fn degraded(error: &str, generated_at: DateTime<Utc>) -> Self {
        let mut detail = error.to_string();
        let lower = detail.to_lowercase();
        if lower.contains("model") && lower.contains("not found") {
            detail.push_str(PULL_HINT);
        }
        InsightReport::Degraded {
            message: format!("{}{}", DEGRADED_PREFIX, detail),
            generated_at,
        }
    }

    /// The analysis text, or the error message when degraded.
    pub fn analysis(&self) -> &str {
        match self {
            InsightReport::Ready { analysis, .. } => analysis,
            InsightReport::Degraded { message, .. } => message,
        }
    }

    pub fn stats(&self) -> Option<&TaskStats> {
        match self {
            InsightReport::Ready { stats, .. } => Some(stats),
            InsightReport::Degraded { .. } => None,
        }
    }

    pub fn model_used(&self) -> &str {
        match self {
            InsightReport::Ready { model_used, .. } => model_used,
            InsightReport::Degraded { .. } => NO_MODEL,
        }
    }

    pub fn notice(&self) -> Option<&str> {
        match self {
            InsightReport::Ready { notice, .. } => notice.as_deref(),
            InsightReport::Degraded { .. } => None,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, InsightReport::Degraded { .. })
    }

    /// Generation time as `dd/mm/YYYY à HH:MM`, local time.
    pub fn generated_at_display(&self) -> String {
        let at = match self {
            InsightReport::Ready { generated_at, .. } => generated_at,
            InsightReport::Degraded { generated_at, .. } => generated_at,
        };
        at.with_timezone(&Local).format("%d/%m/%Y à %H:%M").to_string()
    }
}

#[derive(Serialize)]
struct EmptyStats {}

#[derive(Serialize)]
#[serde(untagged)]
enum StatsShape<'a> {
    Counts(&'a TaskStats),
    Empty(EmptyStats),
}

#[derive(Serialize)]
struct ReportShape<'a> {
    analysis: &'a str,
    stats: StatsShape<'a>,
    model_used: &'a str,
    generated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    notice: Option<&'a str>,
}

impl Serialize for InsightReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        ReportShape {
            analysis: self.analysis(),
            stats: match self.stats() {
                Some(stats) => StatsShape::Counts(stats),
                None => StatsShape::Empty(EmptyStats {}),
            },
            model_used: self.model_used(),
            generated_at: self.generated_at_display(),
            notice: self.notice(),
        }
        .serialize(serializer)
    }
}

/// Settings that shape every insight request.
#[derive(Debug, Clone, PartialEq)]
pub struct InsightSettings {
    /// Preferred model
    pub model: String,
    pub options: ChatOptions,
}

impl Default for InsightSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            options: ChatOptions::default(),
        }
    }
}

/// Produces insight reports through an inference backend.
#[derive(Clone)]
pub struct InsightGenerator {
    backend: Arc<dyn InferenceBackend>,
    settings: InsightSettings,
}

impl InsightGenerator {
    pub fn new(backend: Arc<dyn InferenceBackend>, settings: InsightSettings) -> Self {
        Self { backend, settings }
    }

    pub fn settings(&self) -> &InsightSettings {
        &self.settings
    }

    /// Check that generation is worth attempting for `tasks`.
    ///
    /// Reachability is checked first, so an empty list on a dead server
    /// reports the server.
    pub fn preflight(&self, tasks: &[Task]) -> Result<(), InsightBlocker> {
        if !self.backend.is_reachable() {
            return Err(InsightBlocker::Unreachable);
        }
        if tasks.is_empty() {
            return Err(InsightBlocker::NoTasks);
        }
        Ok(())
    }

    /// Generate a report for `tasks`.
    ///
    /// Callers check that the service is reachable and `tasks` is non-empty.
    pub fn generate(&self, tasks: &[Task]) -> InsightReport {
        self.generate_at(tasks, Utc::now())
    }

    /// Generate a report for `tasks`, evaluating overdue state at `now`.
    pub fn generate_at(&self, tasks: &[Task], now: DateTime<Utc>) -> InsightReport {
        let available = self.backend.list_models();
        let selection = match select_model(&self.settings.model, &available) {
            Ok(selection) => selection,
            Err(e) => {
                tracing::error!("Insight generation failed: {}", e);
                return InsightReport::degraded(&e.to_string(), now);
            }
        };
        tracing::info!("Generating insights with model {}", selection.model);

        let stats = TaskStats::from_tasks(tasks, now);
        let prompt = build_prompt(tasks, &stats, now);
        let request = ChatRequest::single(&selection.model, prompt, self.settings.options);

        match self.backend.chat(&request) {
            Ok(analysis) => InsightReport::Ready {
                analysis,
                stats,
                notice: selection.notice(),
                model_used: selection.model,
                generated_at: now,
            },
            Err(e) => {
                tracing::error!("Insight generation failed: {}", e);
                InsightReport::degraded(&e.to_string(), now)
            }
        }
    }
}
