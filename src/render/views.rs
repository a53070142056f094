//! Screen builders. Pure functions of (view context, snapshot).
use od_base::{LogEntry, Snapshot, Task, TaskState, ViewContext, ViewId};
use ratatui::prelude::*;

use super::container::{Panel, RenderedView};
use super::markup::{sanitize, to_safe_markup};
use super::preserve::RegionId;
use super::search::SearchBox;
use crate::ui::helpers::{format_cost, format_number, truncate_string};
use crate::ui::theme;

pub trait ViewBuilder {
    fn build_view(&self, ctx: &ViewContext, snapshot: &Snapshot) -> RenderedView;

    /// Tail rows `from..` of an append-capable view. Must produce exactly the
    /// lines `build_view` would put at those positions.
    fn build_rows(&self, ctx: &ViewContext, snapshot: &Snapshot, from: usize) -> Vec<Line<'static>>;
}

/// The dashboard's built-in screens.
pub struct DeckViews;

/// Task states in queue order. Archived tasks are not listed.
const QUEUE_GROUPS: [TaskState; 8] = [
    TaskState::Running,
    TaskState::Generating,
    TaskState::Planned,
    TaskState::Pending,
    TaskState::Failed,
    TaskState::Stopped,
    TaskState::Done,
    TaskState::Unknown,
];

/// Tasks in the order the queue view lists them.
pub fn queue_order(snapshot: &Snapshot) -> Vec<&Task> {
    QUEUE_GROUPS.iter().flat_map(|state| snapshot.tasks.iter().filter(move |t| t.state == *state)).collect()
}

impl ViewBuilder for DeckViews {
    fn build_view(&self, ctx: &ViewContext, snapshot: &Snapshot) -> RenderedView {
        let mut view = RenderedView::new(ctx.view);
        match ctx.view {
            ViewId::Dashboard => view.panels.push(Panel::new(RegionId::Main, "Overview").with_lines(dashboard(snapshot))),
            ViewId::Tasks => view.panels.push(Panel::new(RegionId::Main, "Task queue").with_lines(task_queue(ctx, snapshot))),
            ViewId::Logs => {
                let filter = &ctx.log_filter;
                let title = format!(
                    "Logs · {}+ · {}",
                    filter.min_level.as_str(),
                    filter.source.as_deref().unwrap_or("all sources")
                );
                view.panels.push(Panel::new(RegionId::LogTail, title).with_lines(self.build_rows(ctx, snapshot, 0)));
                view.search = Some(SearchBox::new(&filter.query));
            }
            ViewId::Projects => view.panels.push(Panel::new(RegionId::Main, "Projects").with_lines(projects(snapshot))),
            // The transcript is drawn from chat state, not from the snapshot.
            ViewId::Chat => {}
            ViewId::Terminal => match ctx.selected_task.as_deref().and_then(|id| snapshot.task(id)) {
                Some(task) => {
                    let running = if task.is_running { " · running" } else { "" };
                    let title = format!("{} · {}{}", truncate_string(&task.title, 48), task.state.as_str(), running);
                    view.panels.push(Panel::new(RegionId::LogTail, title).with_lines(self.build_rows(ctx, snapshot, 0)));
                    let plan = match task.plan.as_deref() {
                        Some(plan) if !plan.trim().is_empty() => to_safe_markup(plan),
                        _ => vec![muted("No plan yet.")],
                    };
                    view.panels.push(Panel::new(RegionId::PlanPanel, "Plan").with_lines(plan));
                }
                None => {
                    let hint = muted("No task selected. Pick one on the Tasks view and press Enter.");
                    view.panels.push(Panel::new(RegionId::Main, "Terminal").with_lines(vec![hint]));
                }
            },
        }
        view
    }

    fn build_rows(&self, ctx: &ViewContext, snapshot: &Snapshot, from: usize) -> Vec<Line<'static>> {
        match ctx.view {
            ViewId::Logs => ctx.log_filter.matching(snapshot).skip(from).map(log_row).collect(),
            ViewId::Terminal => ctx
                .selected_task
                .as_deref()
                .and_then(|id| snapshot.task(id))
                .map(|task| task.output.iter().skip(from).map(|l| Line::from(sanitize(l))).collect())
                .unwrap_or_default(),
            _ => Vec::new(),
        }
    }
}

fn muted(text: &str) -> Line<'static> {
    Line::from(Span::styled(text.to_string(), Style::default().fg(theme::TEXT_MUTED)))
}

fn heading(text: &str) -> Line<'static> {
    Line::from(Span::styled(text.to_string(), Style::default().fg(theme::ACCENT).bold()))
}

fn metric(label: &str, value: String) -> Line<'static> {
    Line::from(vec![
        Span::styled(format!("  {:<14}", label), Style::default().fg(theme::TEXT_SECONDARY)),
        Span::styled(value, Style::default().fg(theme::TEXT)),
    ])
}

fn dashboard(snapshot: &Snapshot) -> Vec<Line<'static>> {
    let mut lines = vec![heading("Tasks")];
    for state in TaskState::BOARD {
        let count = snapshot.count_tasks(state);
        lines.push(Line::from(vec![
            Span::styled(format!("  {:<14}", state.as_str()), Style::default().fg(theme::task_color(state))),
            Span::styled(count.to_string(), Style::default().fg(theme::TEXT)),
        ]));
    }

    lines.push(Line::from(""));
    lines.push(heading("Active jobs"));
    let active: Vec<_> = snapshot.jobs.iter().filter(|j| j.is_active()).collect();
    if active.is_empty() {
        lines.push(muted("  none"));
    }
    for job in active {
        let name = if job.name.is_empty() { &job.id } else { &job.name };
        lines.push(Line::from(vec![
            Span::styled("  ● ", Style::default().fg(theme::ACCENT)),
            Span::styled(sanitize(name), Style::default().fg(theme::TEXT)),
        ]));
    }

    lines.push(Line::from(""));
    lines.push(heading("Usage"));
    lines.push(metric("tokens in", format_number(snapshot.usage.tokens_in)));
    lines.push(metric("tokens out", format_number(snapshot.usage.tokens_out)));
    lines.push(metric("cost", format_cost(snapshot.usage.cost_usd)));
    lines.push(metric("sessions", snapshot.session.sessions.to_string()));
    lines.push(metric("turns", snapshot.session.turns.to_string()));
    lines
}

fn task_queue(ctx: &ViewContext, snapshot: &Snapshot) -> Vec<Line<'static>> {
    let queue = queue_order(snapshot);
    if queue.is_empty() {
        return vec![muted("No tasks.")];
    }
    let mut lines = Vec::new();
    let mut group = None;
    for task in queue {
        if group != Some(task.state) {
            if group.is_some() {
                lines.push(Line::from(""));
            }
            group = Some(task.state);
            lines.push(Line::from(Span::styled(
                task.state.as_str().to_uppercase(),
                Style::default().fg(theme::task_color(task.state)).bold(),
            )));
        }
        let selected = ctx.selected_task.as_deref() == Some(task.id.as_str());
        let marker = if selected { "▸ " } else { "  " };
        let title = if task.title.is_empty() { task.id.clone() } else { sanitize(&task.title) };
        let mut spans = vec![
            Span::styled(marker, Style::default().fg(theme::ACCENT)),
            Span::styled(truncate_string(&title, 60), if selected { Style::default().fg(theme::TEXT).bold() } else { Style::default().fg(theme::TEXT) }),
        ];
        if task.is_running {
            spans.push(Span::styled("  running", Style::default().fg(theme::ACCENT_DIM)));
        }
        if task.has_plan {
            spans.push(Span::styled("  plan", Style::default().fg(theme::TEXT_MUTED)));
        }
        lines.push(Line::from(spans));
    }
    lines
}

fn log_row(entry: &LogEntry) -> Line<'static> {
    let ts = entry.ts.map(|t| t.format("%H:%M:%S").to_string()).unwrap_or_else(|| "--:--:--".to_string());
    Line::from(vec![
        Span::styled(format!("{} ", ts), Style::default().fg(theme::TEXT_MUTED)),
        Span::styled(format!("{:<5} ", entry.level.as_str()), Style::default().fg(theme::level_color(entry.level))),
        Span::styled(format!("{}: ", sanitize(&entry.source)), Style::default().fg(theme::TEXT_SECONDARY)),
        Span::styled(sanitize(&entry.message).replace('\n', " "), Style::default().fg(theme::TEXT)),
    ])
}

fn projects(snapshot: &Snapshot) -> Vec<Line<'static>> {
    if snapshot.projects.is_empty() {
        return vec![muted("No projects.")];
    }
    let mut lines = Vec::new();
    for project in &snapshot.projects {
        let name = if project.name.is_empty() { &project.id } else { &project.name };
        lines.push(Line::from(vec![
            Span::styled(sanitize(name), Style::default().fg(theme::TEXT).bold()),
            Span::styled(format!("  {}", sanitize(&project.path)), Style::default().fg(theme::TEXT_MUTED)),
        ]));
        if !project.description.is_empty() {
            lines.push(Line::from(Span::styled(
                format!("  {}", sanitize(&project.description).replace('\n', " ")),
                Style::default().fg(theme::TEXT_SECONDARY),
            )));
        }
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use od_base::LogLevel;

    fn text(line: &Line) -> String {
        line.spans.iter().map(|s| s.content.as_ref()).collect()
    }

    #[test]
    fn tail_rows_match_the_full_build() {
        let logs = (1..=4)
            .map(|id| LogEntry { id, level: LogLevel::Warn, source: "db".into(), message: format!("slow {}", id), ts: None })
            .collect();
        let snap = Snapshot { logs, ..Default::default() };
        let ctx = ViewContext { view: ViewId::Logs, ..Default::default() };

        let view = DeckViews.build_view(&ctx, &snap);
        let full: Vec<String> = view.panel(RegionId::LogTail).unwrap().lines.iter().map(|l| text(l)).collect();
        let tail: Vec<String> = DeckViews.build_rows(&ctx, &snap, 2).iter().map(text).collect();
        assert_eq!(full[2..], tail[..]);
        assert_eq!(full[0], "--:--:-- warn  db: slow 1");
    }

    #[test]
    fn queue_lists_active_work_first_and_hides_archived() {
        let task = |id: &str, state| Task { id: id.into(), state, ..Default::default() };
        let snap = Snapshot {
            tasks: vec![task("a", TaskState::Done), task("b", TaskState::Archived), task("c", TaskState::Running)],
            ..Default::default()
        };
        let ids: Vec<&str> = queue_order(&snap).iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a"]);
    }

    #[test]
    fn terminal_without_selection_shows_a_hint() {
        let ctx = ViewContext { view: ViewId::Terminal, selected_task: Some("gone".into()), ..Default::default() };
        let view = DeckViews.build_view(&ctx, &Snapshot::default());
        assert!(view.panel(RegionId::LogTail).is_none());
        assert!(text(&view.panel(RegionId::Main).unwrap().lines[0]).starts_with("No task selected"));
    }
}
