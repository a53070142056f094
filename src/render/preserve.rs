//! Scroll and search-box context carried across full rebuilds.
use od_base::ViewId;

use super::container::RenderedView;
use super::search::SearchBox;

/// Scrollable areas of the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegionId {
    Main,
    LogTail,
    PlanPanel,
    Transcript,
}

impl RegionId {
    /// Regions that follow new content while the user is at the bottom.
    pub fn sticks_to_bottom(self) -> bool {
        matches!(self, RegionId::LogTail | RegionId::Transcript)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScrollRegion {
    pub offset: f32,
    pub max_scroll: f32,
    /// Rows visible at the last draw
    pub viewport: u16,
    /// Set once the user scrolls up; cleared when they come back to the bottom.
    pub user_scrolled: bool,
}

impl ScrollRegion {
    pub fn scroll_up(&mut self, amount: f32) {
        self.offset = (self.offset - amount).max(0.0);
        self.user_scrolled = true;
    }

    pub fn scroll_down(&mut self, amount: f32) {
        self.offset = (self.offset + amount).min(self.max_scroll);
    }

    /// Apply real geometry at draw time.
    pub fn fit(&mut self, region: RegionId, content_height: usize, viewport: u16) {
        self.viewport = viewport;
        self.max_scroll = content_height.saturating_sub(viewport as usize) as f32;
        if region.sticks_to_bottom() {
            if self.user_scrolled && self.offset >= self.max_scroll - 0.5 {
                self.user_scrolled = false;
            }
            if !self.user_scrolled {
                self.offset = self.max_scroll;
            }
        }
        self.offset = self.offset.clamp(0.0, self.max_scroll);
    }

    fn max_for(&self, content_height: usize) -> f32 {
        content_height.saturating_sub(self.viewport as usize) as f32
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RegionCapture {
    Pinned,
    Offset(f32),
}

/// Snapshot of user context taken just before a rebuild.
#[derive(Debug, Clone)]
pub struct ContextCapture {
    view: ViewId,
    regions: Vec<(RegionId, u16, RegionCapture)>,
    search: Option<SearchBox>,
}

impl ContextCapture {
    pub fn take(view: &RenderedView, pin_threshold: f32) -> Self {
        let regions = view
            .panels
            .iter()
            .map(|panel| {
                let scroll = &panel.scroll;
                let pinned =
                    panel.region.sticks_to_bottom() && scroll.max_scroll - scroll.offset <= pin_threshold;
                let capture = if pinned { RegionCapture::Pinned } else { RegionCapture::Offset(scroll.offset) };
                (panel.region, scroll.viewport, capture)
            })
            .collect();
        Self { view: view.view, regions, search: view.search.clone() }
    }

    /// Put the captured context back onto a freshly built view of the same
    /// screen. A capture for another screen is discarded.
    pub fn restore(self, view: &mut RenderedView) {
        if self.view != view.view {
            return;
        }
        for (region, viewport, capture) in self.regions {
            let Some(panel) = view.panels.iter_mut().find(|p| p.region == region) else {
                continue;
            };
            let height = panel.lines.len();
            let scroll = &mut panel.scroll;
            scroll.viewport = viewport;
            scroll.max_scroll = scroll.max_for(height);
            match capture {
                RegionCapture::Pinned => {
                    scroll.offset = scroll.max_scroll;
                    scroll.user_scrolled = false;
                }
                RegionCapture::Offset(offset) => {
                    scroll.offset = offset.min(scroll.max_scroll);
                    scroll.user_scrolled = true;
                }
            }
        }
        if let (Some(old), Some(new)) = (self.search, view.search.as_mut()) {
            new.focused = old.focused;
            new.cursor = old.cursor;
            new.anchor = old.anchor;
            new.clamp();
        }
    }
}
