use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Full state document received from the server.
///
/// Only the collections the client inspects are typed; every other top-level
/// field is kept verbatim in `extra` so the document round-trips unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub logs: Vec<LogEntry>,
    #[serde(default)]
    pub projects: Vec<Project>,
    #[serde(default)]
    pub jobs: Vec<Job>,
    #[serde(default)]
    pub session: SessionMetrics,
    #[serde(default)]
    pub usage: UsageMetrics,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Snapshot {
    /// True while any task or job is doing work the server will report on soon.
    pub fn has_active_entities(&self) -> bool {
        self.tasks.iter().any(Task::is_active) || self.jobs.iter().any(Job::is_active)
    }

    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn count_tasks(&self, state: TaskState) -> usize {
        self.tasks.iter().filter(|t| t.state == state).count()
    }
}

/// Task lifecycle as reported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    #[default]
    Pending,
    Generating,
    Planned,
    Running,
    Done,
    Archived,
    Stopped,
    Failed,
    #[serde(other)]
    Unknown,
}

impl TaskState {
    pub const BOARD: [TaskState; 7] = [
        TaskState::Pending,
        TaskState::Generating,
        TaskState::Planned,
        TaskState::Running,
        TaskState::Done,
        TaskState::Stopped,
        TaskState::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Pending => "pending",
            TaskState::Generating => "generating",
            TaskState::Planned => "planned",
            TaskState::Running => "running",
            TaskState::Done => "done",
            TaskState::Archived => "archived",
            TaskState::Stopped => "stopped",
            TaskState::Failed => "failed",
            TaskState::Unknown => "unknown",
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, TaskState::Generating | TaskState::Running)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub state: TaskState,
    #[serde(default)]
    pub is_running: bool,
    #[serde(default)]
    pub has_plan: bool,
    #[serde(default)]
    pub project_id: Option<String>,
    /// Markdown plan, shown in the terminal view's plan panel
    #[serde(default)]
    pub plan: Option<String>,
    /// Task terminal output, oldest first. Grows append-only while running.
    #[serde(default)]
    pub output: Vec<String>,
}

impl Task {
    pub fn is_active(&self) -> bool {
        self.is_running || self.state.is_active()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }

    /// Next level in the filter cycle (wraps back to Debug).
    pub fn next(&self) -> LogLevel {
        match self {
            LogLevel::Debug => LogLevel::Info,
            LogLevel::Info => LogLevel::Warn,
            LogLevel::Warn => LogLevel::Error,
            LogLevel::Error => LogLevel::Debug,
        }
    }

    fn parse_lenient(s: &str) -> LogLevel {
        match s.to_ascii_lowercase().as_str() {
            "trace" | "debug" => LogLevel::Debug,
            "warn" | "warning" => LogLevel::Warn,
            "error" | "fatal" | "critical" => LogLevel::Error,
            _ => LogLevel::Info,
        }
    }
}

fn lenient_level<'de, D: Deserializer<'de>>(deserializer: D) -> Result<LogLevel, D::Error> {
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.as_deref().map(LogLevel::parse_lenient).unwrap_or_default())
}

/// One immutable log line. Entries are ordered by arrival and never change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: u64,
    #[serde(default, deserialize_with = "lenient_level")]
    pub level: LogLevel,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub ts: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[default]
    Queued,
    Running,
    Done,
    Failed,
    #[serde(other)]
    Unknown,
}

/// Long-lived background process tracked by the server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: JobStatus,
    #[serde(default)]
    pub active: bool,
}

impl Job {
    pub fn is_active(&self) -> bool {
        self.active || self.status == JobStatus::Running
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionMetrics {
    #[serde(default)]
    pub sessions: u32,
    #[serde(default)]
    pub turns: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageMetrics {
    #[serde(default)]
    pub tokens_in: u64,
    #[serde(default)]
    pub tokens_out: u64,
    #[serde(default)]
    pub cost_usd: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_document_and_keeps_unknown_fields() {
        let snap: Snapshot = serde_json::from_str(
            r#"{"tasks":[{"id":"t1","state":"running"}],"now":"2024-01-01T00:00:00Z","banner":"hi"}"#,
        )
        .unwrap();
        assert_eq!(snap.tasks[0].state, TaskState::Running);
        assert!(snap.logs.is_empty());
        assert_eq!(snap.extra.get("banner").and_then(Value::as_str), Some("hi"));
        assert!(snap.extra.contains_key("now"));
    }

    #[test]
    fn unknown_task_state_does_not_reject_snapshot() {
        let task: Task = serde_json::from_str(r#"{"id":"x","state":"blocked"}"#).unwrap();
        assert_eq!(task.state, TaskState::Unknown);
    }

    #[test]
    fn log_level_is_lenient() {
        let entry: LogEntry = serde_json::from_str(r#"{"id":1,"level":"WARNING","message":"m"}"#).unwrap();
        assert_eq!(entry.level, LogLevel::Warn);
        let entry: LogEntry = serde_json::from_str(r#"{"id":2,"message":"m"}"#).unwrap();
        assert_eq!(entry.level, LogLevel::Info);
    }

    #[test]
    fn active_entities() {
        let mut snap = Snapshot::default();
        snap.tasks.push(Task { id: "a".into(), state: TaskState::Done, ..Default::default() });
        assert!(!snap.has_active_entities());

        snap.tasks[0].state = TaskState::Generating;
        assert!(snap.has_active_entities());

        snap.tasks[0].state = TaskState::Planned;
        snap.jobs.push(Job { id: "j".into(), active: true, ..Default::default() });
        assert!(snap.has_active_entities());
    }
}
