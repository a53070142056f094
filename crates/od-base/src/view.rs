use crate::snapshot::{LogEntry, LogLevel, Snapshot};

/// Screens of the dashboard, in tab order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ViewId {
    #[default]
    Dashboard,
    Tasks,
    Logs,
    Projects,
    Chat,
    Terminal,
}

impl ViewId {
    pub const ALL: [ViewId; 6] =
        [ViewId::Dashboard, ViewId::Tasks, ViewId::Logs, ViewId::Projects, ViewId::Chat, ViewId::Terminal];

    pub fn title(&self) -> &'static str {
        match self {
            ViewId::Dashboard => "Dashboard",
            ViewId::Tasks => "Tasks",
            ViewId::Logs => "Logs",
            ViewId::Projects => "Projects",
            ViewId::Chat => "Chat",
            ViewId::Terminal => "Terminal",
        }
    }

    fn index(&self) -> usize {
        ViewId::ALL.iter().position(|v| v == self).unwrap_or(0)
    }

    pub fn next(&self) -> ViewId {
        ViewId::ALL[(self.index() + 1) % ViewId::ALL.len()]
    }

    pub fn prev(&self) -> ViewId {
        ViewId::ALL[(self.index() + ViewId::ALL.len() - 1) % ViewId::ALL.len()]
    }

    /// 1-based hotkey lookup
    pub fn from_digit(d: u32) -> Option<ViewId> {
        ViewId::ALL.get((d as usize).checked_sub(1)?).copied()
    }
}

/// Log view filter settings. The live-search box edits `query`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct LogFilter {
    pub min_level: LogLevel,
    pub source: Option<String>,
    pub query: String,
}

impl LogFilter {
    pub fn matches(&self, entry: &LogEntry) -> bool {
        if entry.level < self.min_level {
            return false;
        }
        if let Some(source) = &self.source
            && entry.source != *source
        {
            return false;
        }
        if self.query.is_empty() {
            return true;
        }
        entry.message.to_lowercase().contains(&self.query.to_lowercase())
    }

    pub fn matching<'a>(&'a self, snapshot: &'a Snapshot) -> impl Iterator<Item = &'a LogEntry> + 'a {
        snapshot.logs.iter().filter(move |e| self.matches(e))
    }

    /// Stable textual form, used in fingerprints and append context keys.
    pub fn key(&self) -> String {
        format!("{}|{}|{}", self.min_level.as_str(), self.source.as_deref().unwrap_or("*"), self.query)
    }
}

/// Everything about "what is on screen" that is not part of the snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewContext {
    pub view: ViewId,
    pub log_filter: LogFilter,
    pub selected_task: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: u64, level: LogLevel, msg: &str) -> LogEntry {
        LogEntry { id, level, source: "api".into(), message: msg.into(), ts: None }
    }

    #[test]
    fn filter_by_level_source_and_query() {
        let mut filter = LogFilter { min_level: LogLevel::Warn, ..Default::default() };
        assert!(!filter.matches(&entry(1, LogLevel::Info, "boot")));
        assert!(filter.matches(&entry(2, LogLevel::Error, "Disk FULL")));

        filter.query = "disk".into();
        assert!(filter.matches(&entry(2, LogLevel::Error, "Disk FULL")));
        assert!(!filter.matches(&entry(3, LogLevel::Error, "net down")));

        filter.source = Some("worker".into());
        assert!(!filter.matches(&entry(2, LogLevel::Error, "Disk FULL")));
    }

    #[test]
    fn view_cycle_wraps() {
        assert_eq!(ViewId::Terminal.next(), ViewId::Dashboard);
        assert_eq!(ViewId::Dashboard.prev(), ViewId::Terminal);
        assert_eq!(ViewId::from_digit(3), Some(ViewId::Logs));
        assert_eq!(ViewId::from_digit(0), None);
        assert_eq!(ViewId::from_digit(7), None);
    }
}
