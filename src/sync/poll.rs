/// Timer for the fallback pull channel.
///
/// Armed only while something on the server is active; disarmed the moment
/// nothing is. The caller supplies the clock.
#[derive(Debug, Clone)]
pub struct AdaptivePoll {
    interval_ms: u64,
    next_due_ms: Option<u64>,
}

impl AdaptivePoll {
    pub fn new(interval_ms: u64) -> Self {
        Self { interval_ms, next_due_ms: None }
    }

    /// Returns true when a poll should be issued now.
    pub fn tick(&mut self, active: bool, now_ms: u64) -> bool {
        if !active {
            self.next_due_ms = None;
            return false;
        }
        match self.next_due_ms {
            None => {
                self.next_due_ms = Some(now_ms + self.interval_ms);
                false
            }
            Some(due) if now_ms >= due => {
                self.next_due_ms = Some(now_ms + self.interval_ms);
                true
            }
            Some(_) => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.next_due_ms.is_some()
    }

    pub fn interval_ms(&self) -> u64 {
        self.interval_ms
    }
}
