pub mod consumer;
pub mod transcript;
pub mod turn;

pub use consumer::{TurnConsumer, TurnEvent, TurnUpdate, split_attachments, start_turn};
pub use transcript::TranscriptCache;
