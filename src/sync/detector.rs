//! Stale/fresh decision and per-view dirtiness.
use std::collections::HashMap;

use od_base::{Snapshot, ViewContext, ViewId};
use tracing::debug;

use super::fingerprint::fingerprint;
use super::normalize::Normalizer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acceptance {
    /// Normalized content matches what is already held. Nothing to do.
    Stale,
    /// New content stored as latest. `view_dirty` is false when the active
    /// view's fingerprint matches what was last painted for it.
    Fresh { view_dirty: bool },
}

pub struct ChangeDetector {
    normalizer: Normalizer,
    last_digest: Option<String>,
    latest: Option<Snapshot>,
    painted: HashMap<ViewId, String>,
}

impl ChangeDetector {
    pub fn new(normalizer: Normalizer) -> Self {
        Self { normalizer, last_digest: None, latest: None, painted: HashMap::new() }
    }

    /// Compare-then-accept. Idempotent: feeding the same content twice, from
    /// any channel, accepts it once.
    pub fn accept(&mut self, snapshot: Snapshot, ctx: &ViewContext) -> Acceptance {
        let normalized = self.normalizer.normalize(&snapshot);
        if self.last_digest.as_deref() == Some(normalized.digest.as_str()) {
            debug!(digest = %&normalized.digest[..12], "stale snapshot ignored");
            return Acceptance::Stale;
        }
        self.last_digest = Some(normalized.digest);
        self.latest = Some(snapshot);
        Acceptance::Fresh { view_dirty: self.view_dirty(ctx) }
    }

    pub fn latest(&self) -> Option<&Snapshot> {
        self.latest.as_ref()
    }

    /// Digest of the last accepted snapshot
    pub fn last_digest(&self) -> Option<&str> {
        self.last_digest.as_deref()
    }

    /// Whether `ctx` would render differently from what was last painted.
    /// Also used after local changes (filter edits, selection) with no new snapshot.
    pub fn view_dirty(&self, ctx: &ViewContext) -> bool {
        let Some(snapshot) = &self.latest else {
            return !self.painted.contains_key(&ctx.view);
        };
        self.painted.get(&ctx.view) != Some(&fingerprint(ctx, snapshot))
    }

    /// Fingerprint of `ctx` against the latest snapshot, if any.
    #[cfg(test)]
    pub fn current_fingerprint(&self, ctx: &ViewContext) -> Option<String> {
        self.latest.as_ref().map(|s| fingerprint(ctx, s))
    }

    pub fn record_painted(&mut self, view: ViewId, fingerprint: String) {
        self.painted.insert(view, fingerprint);
    }

    /// Drop everything held. Used when the session ends.
    pub fn reset(&mut self) {
        self.last_digest = None;
        self.latest = None;
        self.painted.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use od_base::{Task, TaskState};

    fn detector() -> ChangeDetector {
        ChangeDetector::new(Normalizer::new(vec!["now".into()]))
    }

    fn snap(json: &str) -> Snapshot {
        serde_json::from_str(json).unwrap()
    }

    fn paint(det: &mut ChangeDetector, ctx: &ViewContext) {
        let fp = det.current_fingerprint(ctx).unwrap();
        det.record_painted(ctx.view, fp);
    }

    #[test]
    fn same_content_is_accepted_once() {
        let mut det = detector();
        let ctx = ViewContext::default();
        let s = snap(r#"{"tasks":[{"id":"a","state":"running"}],"now":1}"#);
        assert_eq!(det.accept(s.clone(), &ctx), Acceptance::Fresh { view_dirty: true });
        paint(&mut det, &ctx);
        assert_eq!(det.accept(s, &ctx), Acceptance::Stale);
        // Only the volatile field moved.
        assert_eq!(det.accept(snap(r#"{"tasks":[{"id":"a","state":"running"}],"now":9}"#), &ctx), Acceptance::Stale);
    }

    #[test]
    fn push_and_poll_converge_on_one_acceptance() {
        // Push delivers A then B; a poll that started earlier delivers B again.
        let mut det = detector();
        let ctx = ViewContext { view: ViewId::Tasks, ..Default::default() };
        let a = snap(r#"{"tasks":[{"id":"a","state":"planned"}]}"#);
        let b = snap(r#"{"tasks":[{"id":"a","state":"running"}]}"#);

        let accepted: Vec<Acceptance> = [a, b.clone(), b].into_iter().map(|s| det.accept(s, &ctx)).collect();
        let fresh = accepted.iter().filter(|a| matches!(a, Acceptance::Fresh { .. })).count();
        assert_eq!(fresh, 2);
        assert_eq!(det.latest().unwrap().tasks[0].state, TaskState::Running);
    }

    #[test]
    fn change_outside_the_active_view_is_fresh_but_clean() {
        let mut det = detector();
        let ctx = ViewContext { view: ViewId::Projects, ..Default::default() };
        det.accept(snap(r#"{"projects":[{"id":"p","name":"core"}]}"#), &ctx);
        paint(&mut det, &ctx);

        let mut next = det.latest().unwrap().clone();
        next.tasks.push(Task { id: "t".into(), ..Default::default() });
        assert_eq!(det.accept(next, &ctx), Acceptance::Fresh { view_dirty: false });

        // The tasks view was never painted, so it is dirty.
        let tasks = ViewContext { view: ViewId::Tasks, ..Default::default() };
        assert!(det.view_dirty(&tasks));
    }
}
