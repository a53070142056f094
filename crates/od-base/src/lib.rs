//! Shared data model for opsdeck: the server snapshot document and the
//! identity of the views that render it.

pub mod snapshot;
pub mod view;

pub use snapshot::{Job, JobStatus, LogEntry, LogLevel, Project, SessionMetrics, Snapshot, Task, TaskState, UsageMetrics};
pub use view::{LogFilter, ViewContext, ViewId};
