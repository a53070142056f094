//! Cached transcript lines, one entry per turn, split so a token only
//! re-renders the text of the open turn.
use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use ratatui::prelude::*;
use serde_json::Value;

use super::turn::{Turn, TurnCard, TurnStatus};
use crate::render::markup::{sanitize, to_safe_markup};
use crate::ui::helpers::{format_cost, format_duration_ms};
use crate::ui::theme;

struct Section {
    hash: u64,
    lines: Rc<Vec<Line<'static>>>,
}

impl Section {
    /// Reuse `old` when its hash matches, otherwise render anew.
    fn refresh(old: Option<Section>, hash: u64, render: impl FnOnce() -> Vec<Line<'static>>) -> Section {
        match old {
            Some(section) if section.hash == hash => section,
            _ => Section { hash, lines: Rc::new(render()) },
        }
    }
}

struct TurnRender {
    head: Section,
    body: Section,
    foot: Section,
}

#[derive(Default)]
pub struct TranscriptCache {
    entries: HashMap<u64, TurnRender>,
}

fn hash_of<T: Hash>(value: T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

impl TranscriptCache {
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// All transcript lines, oldest turn first.
    pub fn lines(&mut self, turns: &[Turn]) -> Vec<Line<'static>> {
        self.entries.retain(|id, _| turns.iter().any(|t| t.id == *id));
        let mut out = Vec::new();
        for turn in turns {
            let old = self.entries.remove(&turn.id);
            let (head, body, foot) = match old {
                Some(r) => (Some(r.head), Some(r.body), Some(r.foot)),
                None => (None, None, None),
            };
            let steps: Vec<(&str, &str)> = turn.steps.iter().map(|s| (s.name.as_str(), s.status.as_str())).collect();
            let tools: Vec<(&str, bool)> = turn.tools.iter().map(|t| (t.name.as_str(), t.done)).collect();
            let render = TurnRender {
                head: Section::refresh(head, hash_of((&turn.message, &turn.attachments, &tools, &steps)), || {
                    render_head(turn)
                }),
                body: Section::refresh(body, hash_of((&turn.content, turn.status == TurnStatus::Streaming)), || {
                    render_body(turn)
                }),
                foot: Section::refresh(foot, hash_of((turn.status as u8, turn.cards.len(), turn.meta.is_some())), || {
                    render_foot(turn)
                }),
            };
            out.extend(render.head.lines.iter().cloned());
            out.extend(render.body.lines.iter().cloned());
            out.extend(render.foot.lines.iter().cloned());
            self.entries.insert(turn.id, render);
        }
        out
    }

    #[cfg(test)]
    fn sections(&self, id: u64) -> Option<[Rc<Vec<Line<'static>>>; 3]> {
        self.entries.get(&id).map(|r| [r.head.lines.clone(), r.body.lines.clone(), r.foot.lines.clone()])
    }
}

fn render_head(turn: &Turn) -> Vec<Line<'static>> {
    let mut lines = vec![Line::from(vec![
        Span::styled("› ", Style::default().fg(theme::USER).bold()),
        Span::styled(sanitize(&turn.message), Style::default().fg(theme::TEXT)),
    ])];
    if !turn.attachments.is_empty() {
        lines.push(Line::from(Span::styled(
            format!("  📎 {}", turn.attachments.join(", ")),
            Style::default().fg(theme::TEXT_MUTED),
        )));
    }
    for tool in &turn.tools {
        let (mark, color) = if tool.done { ("✓", theme::SUCCESS) } else { ("…", theme::ACCENT) };
        lines.push(Line::from(vec![
            Span::styled("  ⚙ ", Style::default().fg(theme::TEXT_MUTED)),
            Span::styled(sanitize(&tool.name), Style::default().fg(theme::TEXT_SECONDARY)),
            Span::styled(format!(" {}", mark), Style::default().fg(color)),
        ]));
    }
    for step in &turn.steps {
        let color = match step.status.as_str() {
            "done" | "ok" => theme::SUCCESS,
            "error" => theme::ERROR,
            _ => theme::ACCENT,
        };
        lines.push(Line::from(vec![
            Span::styled(format!("  • {:<20}", sanitize(&step.name)), Style::default().fg(theme::TEXT_SECONDARY)),
            Span::styled(sanitize(&step.status), Style::default().fg(color)),
        ]));
    }
    lines
}

fn render_body(turn: &Turn) -> Vec<Line<'static>> {
    if turn.content.is_empty() && turn.is_open() {
        return vec![Line::from(Span::styled("  …", Style::default().fg(theme::ASSISTANT)))];
    }
    to_safe_markup(&turn.content)
        .into_iter()
        .map(|line| {
            let mut spans = vec![Span::raw("  ")];
            spans.extend(line.spans);
            Line::from(spans)
        })
        .collect()
}

fn field<'a>(data: &'a serde_json::Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|k| data.get(*k).and_then(Value::as_str))
}

fn render_foot(turn: &Turn) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    if turn.is_open() {
        return lines;
    }
    let card = Style::default().fg(theme::INFO);
    for item in &turn.cards {
        match item {
            TurnCard::ProjectInit(data) => {
                let project = data.get("project").and_then(Value::as_object).unwrap_or(data);
                let name = field(project, &["name", "id"]).unwrap_or("project");
                lines.push(Line::from(Span::styled(format!("  ┃ Project ready: {}", sanitize(name)), card)));
                if let Some(path) = field(project, &["path"]) {
                    lines.push(Line::from(Span::styled(format!("  ┃ {}", sanitize(path)), Style::default().fg(theme::TEXT_MUTED))));
                }
            }
            TurnCard::TasksCreated(data) => {
                let tasks = data.get("tasks").and_then(Value::as_array).map(Vec::as_slice).unwrap_or_default();
                lines.push(Line::from(Span::styled(format!("  ┃ {} task(s) created", tasks.len()), card)));
                for task in tasks {
                    let title = task.as_object().and_then(|t| field(t, &["title", "id"])).unwrap_or("untitled");
                    lines.push(Line::from(Span::styled(format!("  ┃  - {}", sanitize(title)), Style::default().fg(theme::TEXT_SECONDARY))));
                }
            }
        }
    }
    if let Some(meta) = &turn.meta {
        let mut parts = Vec::new();
        if let Some(turns) = meta.turns {
            parts.push(format!("{} turns", turns));
        }
        if let Some(cost) = meta.cost_usd {
            parts.push(format_cost(cost));
        }
        parts.push(format_duration_ms(meta.duration_ms));
        lines.push(Line::from(Span::styled(format!("  {}", parts.join(" · ")), Style::default().fg(theme::TEXT_MUTED))));
    }
    lines.push(Line::from(""));
    lines
}
