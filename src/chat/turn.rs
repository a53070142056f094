//! One chat exchange and its tool-call state machine.
use std::sync::LazyLock;
use std::time::Instant;

use regex::Regex;
use serde_json::{Map, Value};

static DIRECTIVE_OPEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([A-Z][A-Z_]*)\]").expect("invalid directive regex"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCall {
    pub name: String,
    pub done: bool,
}

/// At most one tool call runs at a time. `Open` holds its index in `Turn::tools`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ToolState {
    #[default]
    Closed,
    Open(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitStep {
    pub name: String,
    /// `running`, `done`, `ok` or `error`
    pub status: String,
}

/// Structured side results shown as cards once the turn is sealed.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnCard {
    ProjectInit(Map<String, Value>),
    TasksCreated(Map<String, Value>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TurnMeta {
    pub turns: Option<u64>,
    pub cost_usd: Option<f64>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnStatus {
    Streaming,
    Done,
    /// Sealed without a completion frame
    Failed,
}

#[derive(Debug, Clone)]
pub struct Turn {
    pub id: u64,
    pub message: String,
    pub attachments: Vec<String>,
    pub tools: Vec<ToolCall>,
    tool_state: ToolState,
    pub content: String,
    pub steps: Vec<InitStep>,
    pub cards: Vec<TurnCard>,
    pub meta: Option<TurnMeta>,
    pub status: TurnStatus,
    started: Instant,
}

impl Turn {
    pub fn new(id: u64, message: String, attachments: Vec<String>) -> Self {
        Self {
            id,
            message,
            attachments,
            tools: Vec::new(),
            tool_state: ToolState::Closed,
            content: String::new(),
            steps: Vec::new(),
            cards: Vec::new(),
            meta: None,
            status: TurnStatus::Streaming,
            started: Instant::now(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == TurnStatus::Streaming
    }

    #[cfg(test)]
    pub fn tool_state(&self) -> ToolState {
        self.tool_state
    }

    #[cfg(test)]
    pub fn running_tools(&self) -> usize {
        self.tools.iter().filter(|t| !t.done).count()
    }

    /// Start a tool call. A call still open is closed first.
    pub fn open_tool(&mut self, name: String) {
        self.close_tool();
        self.tools.push(ToolCall { name, done: false });
        self.tool_state = ToolState::Open(self.tools.len() - 1);
    }

    pub fn close_tool(&mut self) {
        if let ToolState::Open(idx) = self.tool_state
            && let Some(tool) = self.tools.get_mut(idx)
        {
            tool.done = true;
        }
        self.tool_state = ToolState::Closed;
    }

    pub fn push_text(&mut self, text: &str) {
        self.content.push_str(text);
    }

    /// Insert a step, or update it in place when the name was seen before.
    pub fn upsert_step(&mut self, name: String, status: String) {
        match self.steps.iter_mut().find(|s| s.name == name) {
            Some(step) => step.status = status,
            None => self.steps.push(InitStep { name, status }),
        }
    }

    pub fn attach(&mut self, card: TurnCard) {
        self.cards.push(card);
    }

    /// Completion frame: close every call, take the authoritative text, strip
    /// directives and stamp metadata.
    pub fn complete(&mut self, result: Option<String>, turns: Option<u64>, cost_usd: Option<f64>) {
        self.close_tool();
        self.tools.iter_mut().for_each(|t| t.done = true);
        if let Some(result) = result {
            self.content = result;
        }
        self.content = strip_directives(&self.content);
        let duration_ms = self.started.elapsed().as_millis() as u64;
        self.meta = Some(TurnMeta { turns, cost_usd, duration_ms });
        self.status = TurnStatus::Done;
    }

    /// Seal without a completion frame. Keeps whatever text arrived, else the placeholder.
    pub fn abandon(&mut self, placeholder: &str) {
        self.close_tool();
        self.tools.iter_mut().for_each(|t| t.done = true);
        if self.content.trim().is_empty() {
            self.content = placeholder.to_string();
        } else {
            self.content = strip_directives(&self.content);
        }
        self.status = TurnStatus::Failed;
    }
}

/// Remove `[NAME]...[/NAME]` blocks. Unpaired tags are left alone.
pub fn strip_directives(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    loop {
        let Some(caps) = DIRECTIVE_OPEN.captures(rest) else {
            out.push_str(rest);
            return out;
        };
        let (Some(open), Some(name)) = (caps.get(0), caps.get(1)) else {
            out.push_str(rest);
            return out;
        };
        let close = format!("[/{}]", name.as_str());
        match rest[open.end()..].find(&close) {
            Some(pos) => {
                out.push_str(&rest[..open.start()]);
                rest = &rest[open.end() + pos + close.len()..];
            }
            None => {
                out.push_str(&rest[..open.end()]);
                rest = &rest[open.end()..];
            }
        }
    }
}
