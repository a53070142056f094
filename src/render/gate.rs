//! Reconciliation gate: skip, patch the tail, or rebuild the view.
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use od_base::{Snapshot, ViewContext, ViewId};

use super::container::{AppendSource, PaintedState, ViewContainer};
use super::preserve::ContextCapture;
use super::views::ViewBuilder;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderDecision {
    Noop,
    /// Rows `from..` are new; everything before is already on screen.
    Append { from: usize },
    Rebuild,
}

fn hash_row(row: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    row.hash(&mut hasher);
    hasher.finish()
}

/// Row keys and context of the views that grow append-only.
pub fn appendable_source(ctx: &ViewContext, snapshot: &Snapshot) -> Option<AppendSource> {
    match ctx.view {
        ViewId::Logs => Some(AppendSource {
            context_key: ctx.log_filter.key(),
            focus_state: None,
            keys: ctx.log_filter.matching(snapshot).map(|e| e.id).collect(),
        }),
        ViewId::Terminal => {
            let task = snapshot.task(ctx.selected_task.as_deref()?)?;
            // Everything drawn outside the tail goes into the key, so any change there forces a rebuild.
            let plan = task.plan.as_deref().map(hash_row).unwrap_or(0);
            Some(AppendSource {
                context_key: format!("{}|{}|{}|{:016x}", task.id, task.title, task.is_running, plan),
                focus_state: Some(task.state),
                keys: task.output.iter().map(|line| hash_row(line)).collect(),
            })
        }
        _ => None,
    }
}

/// Pick the cheapest correct update. Any doubt means `Rebuild`.
pub fn decide(
    view_dirty: bool,
    view_changed: bool,
    source: Option<&AppendSource>,
    painted: Option<&PaintedState>,
) -> RenderDecision {
    if view_changed {
        return RenderDecision::Rebuild;
    }
    if !view_dirty {
        return RenderDecision::Noop;
    }
    let (Some(new), Some(old)) = (source, painted.and_then(|p| p.source.as_ref())) else {
        return RenderDecision::Rebuild;
    };
    let prefix = old.keys.len() < new.keys.len() && new.keys.starts_with(&old.keys);
    if old.context_key == new.context_key && old.focus_state == new.focus_state && prefix {
        RenderDecision::Append { from: old.keys.len() }
    } else {
        RenderDecision::Rebuild
    }
}

pub trait RenderStrategy {
    fn render(&self, container: &mut ViewContainer, builder: &dyn ViewBuilder, ctx: &ViewContext, snapshot: &Snapshot);
}

pub struct FullRebuild {
    /// Carry scroll and search context over. Off when the screen changed.
    pub preserve_context: bool,
    pub pin_threshold: f32,
}

impl RenderStrategy for FullRebuild {
    fn render(&self, container: &mut ViewContainer, builder: &dyn ViewBuilder, ctx: &ViewContext, snapshot: &Snapshot) {
        let capture = match &container.current {
            Some(old) if self.preserve_context && old.view == ctx.view => {
                Some(ContextCapture::take(old, self.pin_threshold))
            }
            _ => None,
        };
        let mut view = builder.build_view(ctx, snapshot);
        if let Some(capture) = capture {
            capture.restore(&mut view);
        }
        container.current = Some(view);
    }
}

pub struct AppendOnlyPatch {
    pub from: usize,
}

impl RenderStrategy for AppendOnlyPatch {
    fn render(&self, container: &mut ViewContainer, builder: &dyn ViewBuilder, ctx: &ViewContext, snapshot: &Snapshot) {
        let rows = builder.build_rows(ctx, snapshot, self.from);
        if let Some(view) = container.current.as_mut() {
            view.append_rows(rows);
        }
    }
}

/// Decide, apply, and advance the painted watermark.
pub fn run_render_cycle(
    container: &mut ViewContainer,
    builder: &dyn ViewBuilder,
    ctx: &ViewContext,
    snapshot: &Snapshot,
    view_dirty: bool,
    view_changed: bool,
    pin_threshold: f32,
) -> RenderDecision {
    let view_changed = view_changed || container.view_id() != Some(ctx.view);
    let source = appendable_source(ctx, snapshot);
    let decision = decide(view_dirty, view_changed, source.as_ref(), container.painted.as_ref());

    let strategy: Box<dyn RenderStrategy> = match decision {
        RenderDecision::Noop => return decision,
        RenderDecision::Append { from } => Box::new(AppendOnlyPatch { from }),
        RenderDecision::Rebuild => Box::new(FullRebuild { preserve_context: !view_changed, pin_threshold }),
    };
    strategy.render(container, builder, ctx, snapshot);
    container.painted = Some(PaintedState { view: ctx.view, source });
    decision
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::preserve::RegionId;
    use crate::render::views::DeckViews;
    use od_base::{LogEntry, LogLevel, Task, TaskState};
    use std::rc::Rc;

    fn logs(ids: &[u64]) -> Snapshot {
        let logs = ids
            .iter()
            .map(|&id| LogEntry { id, level: LogLevel::Info, source: "api".into(), message: format!("m{}", id), ts: None })
            .collect();
        Snapshot { logs, ..Default::default() }
    }

    fn cycle(container: &mut ViewContainer, ctx: &ViewContext, snap: &Snapshot) -> RenderDecision {
        run_render_cycle(container, &DeckViews, ctx, snap, true, false, 1.0)
    }

    fn tail(container: &ViewContainer) -> Vec<Rc<ratatui::text::Line<'static>>> {
        container.current.as_ref().unwrap().panel(RegionId::LogTail).unwrap().lines.clone()
    }

    #[test]
    fn append_leaves_existing_rows_untouched() {
        let ctx = ViewContext { view: ViewId::Logs, ..Default::default() };
        let mut container = ViewContainer::default();
        assert_eq!(cycle(&mut container, &ctx, &logs(&[1, 2, 3])), RenderDecision::Rebuild);
        let before = tail(&container);

        assert_eq!(cycle(&mut container, &ctx, &logs(&[1, 2, 3, 4, 5])), RenderDecision::Append { from: 3 });
        let after = tail(&container);
        assert_eq!(after.len(), 5);
        for (old, new) in before.iter().zip(&after) {
            assert!(Rc::ptr_eq(old, new));
        }
    }

    #[test]
    fn reorder_or_removal_falls_back_to_rebuild() {
        let ctx = ViewContext { view: ViewId::Logs, ..Default::default() };
        let mut container = ViewContainer::default();
        cycle(&mut container, &ctx, &logs(&[1, 2, 3]));
        let before = tail(&container);

        assert_eq!(cycle(&mut container, &ctx, &logs(&[2, 1, 3, 4])), RenderDecision::Rebuild);
        assert!(!Rc::ptr_eq(&before[0], &tail(&container)[0]));

        assert_eq!(cycle(&mut container, &ctx, &logs(&[2, 3, 4, 5, 6])), RenderDecision::Rebuild);
    }

    #[test]
    fn filter_change_is_a_rebuild() {
        let mut ctx = ViewContext { view: ViewId::Logs, ..Default::default() };
        let mut container = ViewContainer::default();
        cycle(&mut container, &ctx, &logs(&[1, 2]));
        ctx.log_filter.query = "m".into();
        assert_eq!(cycle(&mut container, &ctx, &logs(&[1, 2, 3])), RenderDecision::Rebuild);
    }

    #[test]
    fn terminal_state_change_blocks_append() {
        let task = Task {
            id: "t1".into(),
            state: TaskState::Running,
            is_running: true,
            output: vec!["a".into()],
            ..Default::default()
        };
        let ctx = ViewContext { view: ViewId::Terminal, selected_task: Some("t1".into()), ..Default::default() };
        let mut snap = Snapshot { tasks: vec![task], ..Default::default() };
        let mut container = ViewContainer::default();
        cycle(&mut container, &ctx, &snap);

        snap.tasks[0].output.push("b".into());
        assert_eq!(cycle(&mut container, &ctx, &snap), RenderDecision::Append { from: 1 });

        snap.tasks[0].output.push("c".into());
        snap.tasks[0].state = TaskState::Done;
        assert_eq!(cycle(&mut container, &ctx, &snap), RenderDecision::Rebuild);
    }

    #[test]
    fn clean_view_is_a_noop_and_view_switch_always_renders() {
        let ctx = ViewContext { view: ViewId::Logs, ..Default::default() };
        let mut container = ViewContainer::default();
        cycle(&mut container, &ctx, &logs(&[1]));
        assert_eq!(run_render_cycle(&mut container, &DeckViews, &ctx, &logs(&[1]), false, false, 1.0), RenderDecision::Noop);

        let dash = ViewContext { view: ViewId::Dashboard, ..Default::default() };
        assert_eq!(run_render_cycle(&mut container, &DeckViews, &dash, &logs(&[1]), false, true, 1.0), RenderDecision::Rebuild);
        assert_eq!(container.view_id(), Some(ViewId::Dashboard));
    }
}
