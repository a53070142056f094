//! Per-view digests of the snapshot subset a view actually draws.
//!
//! Equal fingerprints mean the view would render identically, so the render
//! gate can skip it. Anything a view builder reads must be hashed here.
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use od_base::{Snapshot, TaskState, ViewContext, ViewId};

pub fn fingerprint(ctx: &ViewContext, snapshot: &Snapshot) -> String {
    let mut hasher = DefaultHasher::new();
    ctx.view.hash(&mut hasher);
    match ctx.view {
        ViewId::Dashboard => {
            for state in TaskState::BOARD {
                snapshot.count_tasks(state).hash(&mut hasher);
            }
            for job in snapshot.jobs.iter().filter(|j| j.is_active()) {
                job.id.hash(&mut hasher);
                job.name.hash(&mut hasher);
            }
            snapshot.session.sessions.hash(&mut hasher);
            snapshot.session.turns.hash(&mut hasher);
            snapshot.usage.tokens_in.hash(&mut hasher);
            snapshot.usage.tokens_out.hash(&mut hasher);
            snapshot.usage.cost_usd.to_bits().hash(&mut hasher);
        }
        ViewId::Tasks => {
            ctx.selected_task.hash(&mut hasher);
            for task in &snapshot.tasks {
                (&task.id, &task.title, task.state, task.is_running, task.has_plan).hash(&mut hasher);
            }
        }
        ViewId::Logs => {
            ctx.log_filter.key().hash(&mut hasher);
            let mut count = 0usize;
            let mut last = None;
            for entry in ctx.log_filter.matching(snapshot) {
                count += 1;
                last = Some(entry.id);
            }
            count.hash(&mut hasher);
            last.hash(&mut hasher);
        }
        ViewId::Projects => {
            for project in &snapshot.projects {
                (&project.id, &project.name, &project.path, &project.description).hash(&mut hasher);
            }
        }
        // Transcript is driven by the turn consumer, not by snapshots.
        ViewId::Chat => {}
        ViewId::Terminal => {
            ctx.selected_task.hash(&mut hasher);
            if let Some(task) = ctx.selected_task.as_deref().and_then(|id| snapshot.task(id)) {
                (&task.title, task.state, task.is_running).hash(&mut hasher);
                task.output.len().hash(&mut hasher);
                task.output.last().hash(&mut hasher);
                task.plan.hash(&mut hasher);
            }
        }
    }
    format!("{:016x}", hasher.finish())
}
