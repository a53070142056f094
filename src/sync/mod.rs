pub mod detector;
pub mod fingerprint;
pub mod normalize;
pub mod poll;
pub mod scheduler;

pub use detector::{Acceptance, ChangeDetector};
pub use normalize::Normalizer;
pub use scheduler::{LinkStatus, Scheduler, SyncEvent};
