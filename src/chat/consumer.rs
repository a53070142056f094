//! Streaming turn consumer.
//!
//! A background thread posts the message and forwards decoded frames; the
//! main loop applies them to the open turn strictly in arrival order.
use std::sync::Arc;
use std::sync::mpsc::Sender;
use std::thread;

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use super::turn::{Turn, TurnCard};
use crate::infra::api::{ApiClient, ApiError, TurnRequest};
use crate::infra::constants::{ERROR_PLACEHOLDER, NO_RESPONSE_PLACEHOLDER};
use crate::infra::frames::FrameReader;

/// One `data:` frame of a chat turn response.
///
/// Servers use either spelling of most fields, so each spelling is its own
/// field and `apply` takes the first one present. Metadata stays as raw JSON
/// so an odd type never fails the frame.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnFrame {
    ToolUse {
        #[serde(default)]
        tool: Option<String>,
        #[serde(default)]
        name: Option<String>,
    },
    ToolDone,
    Token {
        #[serde(default)]
        text: Option<String>,
        #[serde(default)]
        content: Option<String>,
    },
    InitStep {
        #[serde(default)]
        step: Option<String>,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        status: Option<Value>,
    },
    ProjectInit {
        #[serde(flatten)]
        data: Map<String, Value>,
    },
    TasksCreated {
        #[serde(flatten)]
        data: Map<String, Value>,
    },
    Error {
        #[serde(default)]
        message: Option<Value>,
        #[serde(default)]
        error: Option<Value>,
    },
    Done {
        #[serde(default)]
        result: Option<Value>,
        #[serde(default)]
        num_turns: Option<Value>,
        #[serde(default)]
        turns: Option<Value>,
        #[serde(default)]
        cost_usd: Option<Value>,
        #[serde(default)]
        total_cost_usd: Option<Value>,
    },
    #[serde(other)]
    Unknown,
}

/// Text of a loosely typed field. Strings are taken as is, other values are
/// rendered as JSON, null counts as absent.
fn loose_text(value: Option<Value>) -> Option<String> {
    match value? {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

fn loose_u64(value: Option<&Value>) -> Option<u64> {
    match value? {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn loose_f64(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[derive(Debug)]
pub enum TurnEvent {
    Frame { turn_id: u64, frame: TurnFrame },
    /// Body fully read (or the read loop stopped after `done`)
    Ended { turn_id: u64 },
    Unauthorized { turn_id: u64 },
    Failed { turn_id: u64, error: String },
}

/// Post one message and stream its frames back over `tx`.
pub fn start_turn(api: Arc<ApiClient>, turn_id: u64, request: TurnRequest, tx: Sender<TurnEvent>) {
    thread::spawn(move || {
        let response = match api.submit_turn(&request) {
            Ok(response) => response,
            Err(ApiError::Unauthorized) => {
                let _ = tx.send(TurnEvent::Unauthorized { turn_id });
                return;
            }
            Err(e) => {
                warn!(turn_id, error = %e, "chat submit failed");
                let _ = tx.send(TurnEvent::Failed { turn_id, error: e.to_string() });
                return;
            }
        };
        for frame in FrameReader::<_, TurnFrame>::new(response) {
            match frame {
                Ok(frame) => {
                    let last = matches!(frame, TurnFrame::Done { .. });
                    if tx.send(TurnEvent::Frame { turn_id, frame }).is_err() {
                        return;
                    }
                    if last {
                        break;
                    }
                }
                Err(e) => {
                    let error = ApiError::StreamRead(e.to_string()).to_string();
                    warn!(turn_id, %error, "chat stream interrupted");
                    let _ = tx.send(TurnEvent::Failed { turn_id, error });
                    return;
                }
            }
        }
        let _ = tx.send(TurnEvent::Ended { turn_id });
    });
}

/// What an applied event changed, so the caller redraws only that.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnUpdate {
    /// Nothing: stale turn id or a frame with no effect
    Ignored,
    /// Only the open turn's text grew
    Text,
    /// Tool calls, steps or cards changed
    Structure,
    /// Sealed by its completion frame
    Sealed,
    /// Something went wrong; show `notice`. The turn may have been sealed.
    Failed { notice: String },
    /// Session rejected while submitting
    Unauthorized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnBusy;

/// Owns the transcript and the single open turn.
#[derive(Debug, Default)]
pub struct TurnConsumer {
    pub turns: Vec<Turn>,
    open: Option<u64>,
    next_id: u64,
}

impl TurnConsumer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }

    /// Create the turn for a submitted message. Rejected while another is open.
    pub fn begin(&mut self, message: String, attachments: Vec<String>) -> Result<u64, TurnBusy> {
        if self.open.is_some() {
            return Err(TurnBusy);
        }
        self.next_id += 1;
        let id = self.next_id;
        self.turns.push(Turn::new(id, message, attachments));
        self.open = Some(id);
        Ok(id)
    }

    /// Drop the transcript, including an open turn. Its remaining frames are ignored.
    pub fn clear(&mut self) {
        if let Some(id) = self.open.take() {
            info!(turn_id = id, "open turn discarded");
        }
        self.turns.clear();
    }

    fn open_turn(&mut self, turn_id: u64) -> Option<&mut Turn> {
        if self.open != Some(turn_id) {
            return None;
        }
        self.turns.iter_mut().rev().find(|t| t.id == turn_id)
    }

    pub fn handle(&mut self, event: TurnEvent) -> TurnUpdate {
        match event {
            TurnEvent::Frame { turn_id, frame } => self.apply(turn_id, frame),
            TurnEvent::Ended { turn_id } => match self.open_turn(turn_id) {
                Some(turn) => {
                    turn.abandon(NO_RESPONSE_PLACEHOLDER);
                    self.open = None;
                    TurnUpdate::Failed { notice: NO_RESPONSE_PLACEHOLDER.to_string() }
                }
                None => TurnUpdate::Ignored,
            },
            TurnEvent::Failed { turn_id, error } => match self.open_turn(turn_id) {
                Some(turn) => {
                    turn.abandon(NO_RESPONSE_PLACEHOLDER);
                    self.open = None;
                    TurnUpdate::Failed { notice: error }
                }
                None => TurnUpdate::Ignored,
            },
            TurnEvent::Unauthorized { turn_id } => {
                if let Some(turn) = self.open_turn(turn_id) {
                    turn.abandon(NO_RESPONSE_PLACEHOLDER);
                    self.open = None;
                }
                TurnUpdate::Unauthorized
            }
        }
    }

    /// Apply one frame to the open turn.
    pub fn apply(&mut self, turn_id: u64, frame: TurnFrame) -> TurnUpdate {
        let Some(turn) = self.open_turn(turn_id) else {
            debug!(turn_id, "frame for a turn that is no longer open");
            return TurnUpdate::Ignored;
        };
        match frame {
            TurnFrame::ToolUse { tool, name } => {
                turn.open_tool(tool.or(name).unwrap_or_default());
                TurnUpdate::Structure
            }
            TurnFrame::ToolDone => {
                turn.close_tool();
                TurnUpdate::Structure
            }
            TurnFrame::Token { text, content } => {
                turn.push_text(text.or(content).as_deref().unwrap_or_default());
                TurnUpdate::Text
            }
            TurnFrame::InitStep { step, name, status } => {
                turn.upsert_step(step.or(name).unwrap_or_default(), loose_text(status).unwrap_or_default());
                TurnUpdate::Structure
            }
            TurnFrame::ProjectInit { data } => {
                turn.attach(TurnCard::ProjectInit(data));
                TurnUpdate::Structure
            }
            TurnFrame::TasksCreated { data } => {
                turn.attach(TurnCard::TasksCreated(data));
                TurnUpdate::Structure
            }
            TurnFrame::Error { message, error } => {
                if turn.content.is_empty() {
                    turn.content = ERROR_PLACEHOLDER.to_string();
                }
                let notice = loose_text(message)
                    .or_else(|| loose_text(error))
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| ERROR_PLACEHOLDER.to_string());
                TurnUpdate::Failed { notice }
            }
            TurnFrame::Done { result, num_turns, turns, cost_usd, total_cost_usd } => {
                let turns = loose_u64(num_turns.as_ref()).or_else(|| loose_u64(turns.as_ref()));
                let cost = loose_f64(cost_usd.as_ref()).or_else(|| loose_f64(total_cost_usd.as_ref()));
                turn.complete(loose_text(result), turns, cost);
                self.open = None;
                TurnUpdate::Sealed
            }
            TurnFrame::Unknown => TurnUpdate::Ignored,
        }
    }
}

/// Split `@ref` words out of typed chat input.
pub fn split_attachments(input: &str) -> (String, Vec<String>) {
    let mut words = Vec::new();
    let mut attachments = Vec::new();
    for word in input.split(' ') {
        match word.strip_prefix('@') {
            Some(reference) if !reference.is_empty() && !reference.contains('\n') => {
                attachments.push(reference.to_string())
            }
            _ => words.push(word),
        }
    }
    (words.join(" ").trim().to_string(), attachments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::turn::TurnStatus;
    use crate::infra::frames::tests::ChunkedReader;

    fn frames(body: &str) -> Vec<TurnFrame> {
        FrameReader::new(ChunkedReader::new(body, 5)).map(|f| f.unwrap()).collect()
    }

    fn run(consumer: &mut TurnConsumer, id: u64, body: &str) -> Vec<TurnUpdate> {
        frames(body).into_iter().map(|f| consumer.apply(id, f)).collect()
    }

    #[test]
    fn frames_decode_with_aliases() {
        let parsed = frames(concat!(
            "data: {\"type\":\"tool_use\",\"name\":\"grep\"}\n",
            "data: {\"type\":\"token\",\"text\":\"hi\"}\n",
            "data: {\"type\":\"heartbeat\"}\n",
            "data: {\"type\":\"done\",\"result\":\"final\",\"num_turns\":2,\"total_cost_usd\":0.01}\n",
        ));
        assert_eq!(parsed.len(), 4);
        assert_eq!(parsed[0], TurnFrame::ToolUse { tool: None, name: Some("grep".into()) });
        assert_eq!(parsed[2], TurnFrame::Unknown);
        assert!(matches!(&parsed[3], TurnFrame::Done { total_cost_usd: Some(_), cost_usd: None, .. }));
    }

    #[test]
    fn done_with_both_spellings_and_odd_types_still_seals() {
        let mut consumer = TurnConsumer::new();
        let id = consumer.begin("status?".into(), Vec::new()).unwrap();
        let updates = run(
            &mut consumer,
            id,
            concat!(
                "data: {\"type\":\"token\",\"text\":\"partial\",\"content\":\"partial\"}\n",
                "data: {\"type\":\"done\",\"result\":\"final\",\"num_turns\":\"3\",\"turns\":2,",
                "\"cost_usd\":0.1,\"total_cost_usd\":{\"usd\":0.1}}\n",
            ),
        );
        assert_eq!(updates, vec![TurnUpdate::Text, TurnUpdate::Sealed]);
        assert!(!consumer.is_open());

        let turn = &consumer.turns[0];
        assert_eq!(turn.content, "final");
        assert_eq!(turn.status, TurnStatus::Done);
        let meta = turn.meta.as_ref().unwrap();
        assert_eq!(meta.turns, Some(3));
        assert_eq!(meta.cost_usd, Some(0.1));
    }

    #[test]
    fn error_frame_with_both_spellings_is_applied() {
        let parsed = frames("data: {\"type\":\"error\",\"message\":\"rate limited\",\"error\":\"429\"}\n");
        let mut consumer = TurnConsumer::new();
        let id = consumer.begin("hello".into(), Vec::new()).unwrap();
        let update = consumer.apply(id, parsed.into_iter().next().unwrap());
        assert_eq!(update, TurnUpdate::Failed { notice: "rate limited".into() });
    }

    #[test]
    fn tool_lifecycle_and_completion() {
        let mut consumer = TurnConsumer::new();
        let id = consumer.begin("check disk".into(), Vec::new()).unwrap();
        let updates = run(
            &mut consumer,
            id,
            concat!(
                "data: {\"type\":\"tool_use\",\"tool\":\"A\"}\n",
                "data: {\"type\":\"tool_use\",\"tool\":\"B\"}\n",
                "data: {\"type\":\"token\",\"text\":\"Hello [TASK_CREATE]{}\"}\n",
                "data: {\"type\":\"token\",\"text\":\"[/TASK_CREATE] world\"}\n",
                "data: {\"type\":\"done\",\"num_turns\":3,\"cost_usd\":0.02}\n",
            ),
        );
        assert_eq!(updates.last(), Some(&TurnUpdate::Sealed));
        assert!(!consumer.is_open());

        let turn = &consumer.turns[0];
        assert!(turn.tools.iter().all(|t| t.done));
        assert_eq!(turn.content, "Hello  world");
        assert_eq!(turn.meta.as_ref().and_then(|m| m.turns), Some(3));
        assert_eq!(turn.status, TurnStatus::Done);
    }

    #[test]
    fn missing_done_seals_with_placeholder() {
        let mut consumer = TurnConsumer::new();
        let id = consumer.begin("hello".into(), Vec::new()).unwrap();
        run(&mut consumer, id, "data: {\"type\":\"tool_use\",\"tool\":\"A\"}\n");
        let update = consumer.handle(TurnEvent::Ended { turn_id: id });
        assert_eq!(update, TurnUpdate::Failed { notice: NO_RESPONSE_PLACEHOLDER.into() });
        assert_eq!(consumer.turns[0].content, NO_RESPONSE_PLACEHOLDER);
        assert!(!consumer.is_open());
        // Ended after done is a no-op.
        assert_eq!(consumer.handle(TurnEvent::Ended { turn_id: id }), TurnUpdate::Ignored);
    }

    #[test]
    fn error_frame_notifies_and_fills_empty_content() {
        let mut consumer = TurnConsumer::new();
        let id = consumer.begin("hello".into(), Vec::new()).unwrap();
        let update = consumer.apply(id, TurnFrame::Error { message: Some(Value::from("quota exceeded")), error: None });
        assert_eq!(update, TurnUpdate::Failed { notice: "quota exceeded".into() });
        assert_eq!(consumer.turns[0].content, ERROR_PLACEHOLDER);
        assert!(consumer.is_open());
    }

    #[test]
    fn one_open_turn_and_clear_drops_late_frames() {
        let mut consumer = TurnConsumer::new();
        let id = consumer.begin("first".into(), Vec::new()).unwrap();
        assert_eq!(consumer.begin("second".into(), Vec::new()), Err(TurnBusy));

        consumer.clear();
        assert_eq!(consumer.apply(id, TurnFrame::Token { text: Some("late".into()), content: None }), TurnUpdate::Ignored);
        assert!(consumer.turns.is_empty());
        assert!(consumer.begin("again".into(), Vec::new()).is_ok());
    }

    #[test]
    fn attachments_are_split_from_the_message() {
        let (message, refs) = split_attachments("summarize @report.pdf please @logs/api.txt");
        assert_eq!(message, "summarize please");
        assert_eq!(refs, vec!["report.pdf".to_string(), "logs/api.txt".to_string()]);

        let (message, refs) = split_attachments("email me @ noon");
        assert_eq!(message, "email me @ noon");
        assert!(refs.is_empty());
    }
}
