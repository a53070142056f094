use std::rc::Rc;

use od_base::{TaskState, ViewId};
use ratatui::text::Line;

use super::preserve::{RegionId, ScrollRegion};
use super::search::SearchBox;

/// One titled, scrollable block of rendered lines.
///
/// Lines sit behind `Rc` so an append can leave existing nodes untouched.
#[derive(Debug, Clone)]
pub struct Panel {
    pub region: RegionId,
    pub title: String,
    pub lines: Vec<Rc<Line<'static>>>,
    pub scroll: ScrollRegion,
}

impl Panel {
    pub fn new(region: RegionId, title: impl Into<String>) -> Self {
        Self { region, title: title.into(), lines: Vec::new(), scroll: ScrollRegion::default() }
    }

    pub fn with_lines(mut self, lines: Vec<Line<'static>>) -> Self {
        self.lines = lines.into_iter().map(Rc::new).collect();
        self
    }
}

/// Output of a view builder for one screen.
#[derive(Debug, Clone)]
pub struct RenderedView {
    pub view: ViewId,
    pub panels: Vec<Panel>,
    pub search: Option<SearchBox>,
}

impl RenderedView {
    pub fn new(view: ViewId) -> Self {
        Self { view, panels: Vec::new(), search: None }
    }

    #[cfg(test)]
    pub fn panel(&self, region: RegionId) -> Option<&Panel> {
        self.panels.iter().find(|p| p.region == region)
    }

    pub fn panel_mut(&mut self, region: RegionId) -> Option<&mut Panel> {
        self.panels.iter_mut().find(|p| p.region == region)
    }

    /// Append rows to the bottom-tracking tail. Existing lines are not touched.
    pub fn append_rows(&mut self, rows: Vec<Line<'static>>) {
        if let Some(panel) = self.panel_mut(RegionId::LogTail) {
            panel.lines.extend(rows.into_iter().map(Rc::new));
        }
    }
}

/// What an append-capable view showed at its last paint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendSource {
    /// Filter or selected task the rows were produced under
    pub context_key: String,
    /// Lifecycle state of the focused entity, when there is one
    pub focus_state: Option<TaskState>,
    /// One key per painted row, oldest first
    pub keys: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaintedState {
    pub view: ViewId,
    pub source: Option<AppendSource>,
}

/// Holds the view currently on screen. Rebuilds swap it in one assignment.
#[derive(Debug, Default)]
pub struct ViewContainer {
    pub current: Option<RenderedView>,
    pub painted: Option<PaintedState>,
}

impl ViewContainer {
    pub fn view_id(&self) -> Option<ViewId> {
        self.current.as_ref().map(|v| v.view)
    }

    pub fn search_mut(&mut self) -> Option<&mut SearchBox> {
        self.current.as_mut().and_then(|v| v.search.as_mut())
    }

    pub fn clear(&mut self) {
        self.current = None;
        self.painted = None;
    }
}
