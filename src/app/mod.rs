pub mod actions;
pub mod events;

use std::io;
use std::sync::Arc;
use std::sync::mpsc::{Receiver, Sender};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crossterm::event;
use od_base::{Snapshot, ViewId};
use ratatui::prelude::*;
use tracing::{debug, info};

use crate::chat::{TurnEvent, TurnUpdate, start_turn};
use crate::infra::api::{ApiClient, TurnRequest};
use crate::infra::constants::{EVENT_POLL_MS, RENDER_THROTTLE_MS};
use crate::render::{DeckViews, RenderDecision, run_render_cycle};
use crate::state::AppState;
use crate::sync::fingerprint::fingerprint;
use crate::sync::{Acceptance, Scheduler, SyncEvent};
use crate::ui;
use actions::{ActionResult, apply_action};
use events::handle_event;

pub fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}

pub struct App {
    pub state: AppState,
    api: Arc<ApiClient>,
    scheduler: Scheduler,
    views: DeckViews,
    last_render_ms: u64,
}

impl App {
    pub fn new(state: AppState, api: Arc<ApiClient>, scheduler: Scheduler) -> Self {
        Self { state, api, scheduler, views: DeckViews, last_render_ms: 0 }
    }

    pub fn run(
        &mut self,
        terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
        sync_rx: Receiver<SyncEvent>,
        turn_tx: Sender<TurnEvent>,
        turn_rx: Receiver<TurnEvent>,
    ) -> io::Result<()> {
        info!(server = %self.api.base_url(), "starting sync");
        self.scheduler.start();

        loop {
            let current_ms = now_ms();

            // === INPUT FIRST ===
            if event::poll(Duration::ZERO)? {
                let evt = event::read()?;
                let Some(action) = handle_event(&evt, &self.state) else {
                    break;
                };
                match apply_action(&mut self.state, action, current_ms) {
                    ActionResult::Nothing => {}
                    ActionResult::Submit { message, attachments } => self.submit(message, attachments, &turn_tx, current_ms),
                    ActionResult::Resync => self.scheduler.resync(),
                }
                self.reconcile();
                if self.state.dirty {
                    terminal.draw(|frame| ui::render(frame, &mut self.state))?;
                    self.state.dirty = false;
                    self.last_render_ms = current_ms;
                }
            }

            // === BACKGROUND ===
            self.process_sync_events(&sync_rx, current_ms);
            self.process_turn_events(&turn_rx, current_ms);
            let active = self.state.snapshot().is_some_and(Snapshot::has_active_entities);
            self.scheduler.tick(current_ms, active);
            self.refresh_status();
            self.state.expire_notice(current_ms);
            self.reconcile();

            if self.state.dirty && current_ms.saturating_sub(self.last_render_ms) >= RENDER_THROTTLE_MS {
                terminal.draw(|frame| ui::render(frame, &mut self.state))?;
                self.state.dirty = false;
                self.last_render_ms = current_ms;
            }

            let poll_ms = if self.state.chat.is_open() || self.state.dirty { EVENT_POLL_MS } else { 50 };
            let _ = event::poll(Duration::from_millis(poll_ms))?;
        }

        self.scheduler.stop();
        Ok(())
    }

    fn submit(&mut self, message: String, attachments: Vec<String>, turn_tx: &Sender<TurnEvent>, now_ms: u64) {
        match self.state.chat.begin(message.clone(), attachments.clone()) {
            Ok(turn_id) => {
                debug!(turn_id, attachments = attachments.len(), "submitting chat turn");
                start_turn(self.api.clone(), turn_id, TurnRequest { message, attachments }, turn_tx.clone());
            }
            Err(_) => self.state.notify("A reply is still streaming", now_ms),
        }
    }

    fn process_sync_events(&mut self, rx: &Receiver<SyncEvent>, now_ms: u64) {
        while let Ok(event) = rx.try_recv() {
            if !self.scheduler.observe(&event) {
                continue;
            }
            if let Some(text) = self.scheduler.take_notice() {
                self.state.notify(text, now_ms);
            }
            match event {
                SyncEvent::Snapshot { channel, snapshot } => {
                    if self.state.logged_out {
                        continue;
                    }
                    match self.state.detector.accept(*snapshot, &self.state.ctx) {
                        Acceptance::Stale => {}
                        Acceptance::Fresh { view_dirty } => {
                            debug!(?channel, view_dirty, digest = self.state.detector.last_digest().unwrap_or(""), "snapshot accepted");
                            self.state.pending_render |= view_dirty;
                            // Status bar counts come from the snapshot too.
                            self.state.dirty = true;
                        }
                    }
                }
                SyncEvent::PushConnected { .. } | SyncEvent::PushLost { .. } => self.state.dirty = true,
                SyncEvent::Unauthorized => self.log_out(),
            }
        }
    }

    fn process_turn_events(&mut self, rx: &Receiver<TurnEvent>, now_ms: u64) {
        while let Ok(event) = rx.try_recv() {
            match self.state.chat.handle(event) {
                TurnUpdate::Ignored => {}
                TurnUpdate::Text | TurnUpdate::Structure | TurnUpdate::Sealed => {
                    if self.state.ctx.view == ViewId::Chat {
                        self.state.dirty = true;
                    }
                }
                TurnUpdate::Failed { notice } => self.state.notify(notice, now_ms),
                TurnUpdate::Unauthorized => {
                    self.scheduler.observe(&SyncEvent::Unauthorized);
                    self.log_out();
                }
            }
        }
    }

    fn log_out(&mut self) {
        if self.state.logged_out {
            return;
        }
        info!("session expired, logging out");
        self.scheduler.stop();
        self.state.log_out();
    }

    fn refresh_status(&mut self) {
        let (link, polling) = (self.scheduler.link(), self.scheduler.polling());
        if self.state.link != link || self.state.polling != polling {
            self.state.link = link;
            self.state.polling = polling;
            self.state.dirty = true;
        }
    }

    /// Run the render gate when something may have changed.
    fn reconcile(&mut self) {
        let state = &mut self.state;
        if state.logged_out || !(state.pending_render || state.view_changed) {
            return;
        }
        state.pending_render = false;
        let view_changed = std::mem::take(&mut state.view_changed);

        let empty = Snapshot::default();
        let snapshot = state.detector.latest().unwrap_or(&empty);
        let view_dirty = state.detector.view_dirty(&state.ctx);
        let decision = run_render_cycle(
            &mut state.container,
            &self.views,
            &state.ctx,
            snapshot,
            view_dirty,
            view_changed,
            state.pin_threshold,
        );
        if decision == RenderDecision::Noop {
            return;
        }
        debug!(view = state.ctx.view.title(), ?decision, "view rendered");
        let painted = fingerprint(&state.ctx, snapshot);
        state.detector.record_painted(state.ctx.view, painted);
        state.dirty = true;
    }
}
