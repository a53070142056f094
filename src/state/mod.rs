//! The one application state object. Owned by the main loop, passed by
//! reference to everything that needs it.
use od_base::{Snapshot, ViewContext, ViewId};

use crate::chat::{TranscriptCache, TurnConsumer};
use crate::infra::config::Config;
use crate::infra::constants::NOTICE_TTL_MS;
use crate::render::{RegionId, ScrollRegion, ViewContainer};
use crate::sync::{ChangeDetector, LinkStatus, Normalizer};

/// One-shot message in the status bar.
#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub text: String,
    pub until_ms: u64,
}

pub struct AppState {
    pub ctx: ViewContext,
    pub detector: ChangeDetector,
    pub container: ViewContainer,
    pub chat: TurnConsumer,
    pub transcript: TranscriptCache,
    pub transcript_scroll: ScrollRegion,
    /// Chat input buffer
    pub input: String,
    /// Cursor position in input (byte index)
    pub input_cursor: usize,
    /// Region that takes scroll keys on the terminal view
    pub terminal_focus: RegionId,
    pub notice: Option<Notice>,
    pub link: LinkStatus,
    /// Poll interval while the fallback poll is armed
    pub polling: Option<u64>,
    pub logged_out: bool,
    /// Something may need reconciling against the latest snapshot
    pub pending_render: bool,
    /// The active view changed since the last render cycle
    pub view_changed: bool,
    /// Screen needs a redraw
    pub dirty: bool,
    pub pin_threshold: f32,
    pub server_url: String,
}

impl AppState {
    pub fn new(config: &Config) -> Self {
        Self {
            ctx: ViewContext::default(),
            detector: ChangeDetector::new(Normalizer::new(config.volatile_fields.clone())),
            container: ViewContainer::default(),
            chat: TurnConsumer::new(),
            transcript: TranscriptCache::default(),
            transcript_scroll: ScrollRegion::default(),
            input: String::new(),
            input_cursor: 0,
            terminal_focus: RegionId::LogTail,
            notice: None,
            link: LinkStatus::Connecting,
            polling: None,
            logged_out: false,
            pending_render: true,
            view_changed: true,
            dirty: true,
            pin_threshold: config.pin_threshold_rows,
            server_url: config.server_url.clone(),
        }
    }

    pub fn snapshot(&self) -> Option<&Snapshot> {
        self.detector.latest()
    }

    pub fn switch_view(&mut self, view: ViewId) {
        if self.ctx.view == view {
            return;
        }
        self.ctx.view = view;
        self.view_changed = true;
        self.pending_render = true;
        self.dirty = true;
    }

    /// Scroll state for the region that currently takes scroll keys.
    pub fn scroll_target(&mut self) -> Option<&mut ScrollRegion> {
        let region = match self.ctx.view {
            ViewId::Chat => return Some(&mut self.transcript_scroll),
            ViewId::Logs => RegionId::LogTail,
            ViewId::Terminal => self.terminal_focus,
            _ => RegionId::Main,
        };
        let view = self.container.current.as_mut()?;
        // Terminal falls back to its hint panel when no task is selected.
        let index = view.panels.iter().position(|p| p.region == region).unwrap_or(0);
        view.panels.get_mut(index).map(|p| &mut p.scroll)
    }

    pub fn search_focused(&self) -> bool {
        self.ctx.view == ViewId::Logs
            && self.container.current.as_ref().and_then(|v| v.search.as_ref()).is_some_and(|s| s.focused)
    }

    pub fn notify(&mut self, text: impl Into<String>, now_ms: u64) {
        self.notice = Some(Notice { text: text.into(), until_ms: now_ms + NOTICE_TTL_MS });
        self.dirty = true;
    }

    pub fn expire_notice(&mut self, now_ms: u64) {
        if self.notice.as_ref().is_some_and(|n| now_ms >= n.until_ms) {
            self.notice = None;
            self.dirty = true;
        }
    }

    /// Session is gone: drop server data and stop drawing it.
    pub fn log_out(&mut self) {
        self.logged_out = true;
        self.link = LinkStatus::LoggedOut;
        self.polling = None;
        self.detector.reset();
        self.container.clear();
        self.dirty = true;
    }
}
