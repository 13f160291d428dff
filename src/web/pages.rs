//! Server-rendered HTML pages.

use crate::commands::PageInfo;
use crate::insights::InsightReport;
use crate::models::{Task, TaskPriority, TaskStats, TaskStatus};
use chrono::{DateTime, Local, Utc};

const STYLE: &str = "
body { font-family: system-ui, sans-serif; max-width: 960px; margin: 2rem auto; padding: 0 1rem; color: #222; }
nav a { margin-right: 1rem; }
.stats { display: flex; gap: 1rem; margin: 1rem 0; }
.stats div { background: #f3f4f6; border-radius: 6px; padding: .5rem 1rem; }
.notice { padding: .75rem 1rem; border-radius: 6px; margin: 1rem 0; background: #e0f2fe; }
.notice.error { background: #fee2e2; }
table { width: 100%; border-collapse: collapse; }
td, th { text-align: left; padding: .4rem; border-bottom: 1px solid #e5e7eb; }
.badge { border-radius: 4px; padding: .1rem .4rem; font-size: .85rem; background: #e5e7eb; }
.status-doing { background: #fef3c7; }
.status-done { background: #dcfce7; }
.overdue { color: #b91c1c; font-weight: 600; }
.analysis { white-space: pre-wrap; background: #f9fafb; padding: 1rem; border-radius: 6px; }
";

/// Escape text for inclusion in HTML content or attribute values.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn layout(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="fr">
<head>
<meta charset="utf-8">
<title>{title} - taskmind</title>
<style>{STYLE}</style>
<script src="/static/app.js" defer></script>
</head>
<body>
<nav><a href="/">Tâches</a><a href="/insights">Insights IA</a></nav>
{body}
</body>
</html>"#,
        title = escape(title),
        body = body,
    )
}

fn stats_block(stats: &TaskStats) -> String {
    format!(
        r#"<section class="stats">
<div>Total : {}</div><div>À faire : {}</div><div>En cours : {}</div><div>Terminées : {}</div><div class="overdue">En retard : {}</div>
</section>"#,
        stats.total, stats.todo, stats.doing, stats.done, stats.overdue
    )
}

/// Current filter values, echoed back into the page.
#[derive(Debug, Default)]
pub struct FilterValues {
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub search: Option<String>,
}

fn select_options<T: Copy + PartialEq>(
    all: &[T],
    selected: Option<T>,
    value: impl Fn(T) -> &'static str,
    label: impl Fn(T) -> &'static str,
) -> String {
    let mut out = String::from(r#"<option value="">Tous</option>"#);
    for item in all.iter().copied() {
        let mark = if selected == Some(item) { " selected" } else { "" };
        out.push_str(&format!(
            r#"<option value="{}"{}>{}</option>"#,
            value(item),
            mark,
            label(item)
        ));
    }
    out
}

fn hidden_filters(filters: &FilterValues) -> String {
    let mut out = String::new();
    if let Some(status) = filters.status {
        out.push_str(&format!(r#"<input type="hidden" name="status" value="{}">"#, status.as_str()));
    }
    if let Some(priority) = filters.priority {
        out.push_str(&format!(
            r#"<input type="hidden" name="priority" value="{}">"#,
            priority.as_str()
        ));
    }
    if let Some(ref search) = filters.search {
        out.push_str(&format!(r#"<input type="hidden" name="search" value="{}">"#, escape(search)));
    }
    out
}

fn task_row(task: &Task, now: DateTime<Utc>) -> String {
    let due = match task.due_date {
        Some(d) => {
            let text = d.with_timezone(&Local).format("%d/%m/%Y %H:%M").to_string();
            if task.is_overdue_at(now) {
                format!(r#"<span class="overdue">{} (en retard)</span>"#, text)
            } else {
                text
            }
        }
        None => "-".to_string(),
    };
    let description = task
        .description
        .as_deref()
        .map(|d| format!("<br><small>{}</small>", escape(d)))
        .unwrap_or_default();

    format!(
        r#"<tr>
<td>{title}{description}</td>
<td><span class="badge status-{status}" data-status-for="{id}">{status_label}</span></td>
<td>{priority}</td>
<td>{due}</td>
<td><button data-toggle-id="{id}">Changer le statut</button> <button data-delete-id="{id}">Supprimer</button></td>
</tr>"#,
        id = task.id,
        title = escape(&task.title),
        description = description,
        status = task.status.as_str(),
        status_label = task.status.label(),
        priority = task.priority.label(),
        due = due,
    )
}

/// Everything shown on the task list page.
pub struct TaskListPage<'a> {
    pub tasks: &'a [Task],
    pub stats: TaskStats,
    pub page: PageInfo,
    pub filters: FilterValues,
    /// Message shown above the list
    pub notice: Option<&'a str>,
    pub now: DateTime<Utc>,
}

pub fn render_task_list(view: &TaskListPage<'_>) -> String {
    let mut body = String::from("<h1>Mes tâches</h1>\n");
    body.push_str(r#"<div id="messages"></div>"#);
    if let Some(notice) = view.notice {
        body.push_str(&format!(r#"<div class="notice">{}</div>"#, escape(notice)));
    }
    body.push_str(&stats_block(&view.stats));

    body.push_str(&format!(
        r#"<form method="get" action="/">
<select name="status">{}</select>
<select name="priority">{}</select>
<input type="search" name="search" placeholder="Rechercher..." value="{}">
<button type="submit">Filtrer</button>
</form>"#,
        select_options(TaskStatus::all(), view.filters.status, |s| s.as_str(), |s| s.label()),
        select_options(TaskPriority::all(), view.filters.priority, |p| p.as_str(), |p| p.label()),
        escape(view.filters.search.as_deref().unwrap_or("")),
    ));

    if view.tasks.is_empty() {
        body.push_str("<p>Aucune tâche trouvée.</p>");
    } else {
        body.push_str(
            "<table>\n<tr><th>Titre</th><th>Statut</th><th>Priorité</th><th>Échéance</th><th></th></tr>\n",
        );
        for task in view.tasks {
            body.push_str(&task_row(task, view.now));
        }
        body.push_str("</table>\n");
    }

    if view.page.total_pages > 1 {
        let hidden = hidden_filters(&view.filters);
        body.push_str(r#"<form method="get" action="/" class="pager">"#);
        body.push_str(&hidden);
        if view.page.has_previous() {
            body.push_str(&format!(
                r#"<button name="page" value="{}">Précédente</button>"#,
                view.page.number - 1
            ));
        }
        body.push_str(&format!(" Page {} sur {} ", view.page.number, view.page.total_pages));
        if view.page.has_next() {
            body.push_str(&format!(
                r#"<button name="page" value="{}">Suivante</button>"#,
                view.page.number + 1
            ));
        }
        body.push_str("</form>");
    }

    body.push_str(&format!(
        r#"<h2>Nouvelle tâche</h2>
<form id="create-task">
<input name="title" placeholder="Titre" required minlength="3" maxlength="200">
<textarea name="description" placeholder="Description"></textarea>
<select name="priority">{}</select>
<input type="datetime-local" name="due_date">
<button type="submit">Créer</button>
</form>"#,
        TaskPriority::all()
            .iter()
            .map(|p| {
                let mark = if *p == TaskPriority::default() { " selected" } else { "" };
                format!(r#"<option value="{}"{}>{}</option>"#, p.as_str(), mark, p.label())
            })
            .collect::<String>()
    ));

    layout("Mes tâches", &body)
}

pub fn render_insights(report: &InsightReport) -> String {
    let mut body = String::from("<h1>Insights IA</h1>\n");
    if let Some(notice) = report.notice() {
        body.push_str(&format!(r#"<div class="notice">{}</div>"#, escape(notice)));
    }
    let class = if report.is_degraded() { "analysis notice error" } else { "analysis" };
    body.push_str(&format!(
        r#"<div class="{}">{}</div>"#,
        class,
        escape(report.analysis())
    ));
    if let Some(stats) = report.stats() {
        body.push_str(&stats_block(stats));
    }
    body.push_str(&format!(
        "<p><small>Modèle : {} - généré le {}</small></p>",
        escape(report.model_used()),
        escape(&report.generated_at_display())
    ));
    layout("Insights IA", &body)
}
