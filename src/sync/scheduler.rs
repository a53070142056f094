//! Dual-channel update scheduler: one push subscription plus an adaptive
//! pull, merged onto a single `SyncEvent` channel.
//!
//! Threads only do blocking I/O. Every decision about the data happens on
//! the main loop, which drains the receiver with `try_recv`.
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::Duration;

use od_base::Snapshot;
use tracing::{debug, info, warn};

use super::poll::AdaptivePoll;
use crate::infra::api::{ApiClient, ApiError};
use crate::infra::constants::CONNECTION_LOST_AFTER;
use crate::infra::frames::FrameReader;

/// Where a snapshot came from. Acceptance does not depend on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Push,
    Poll,
    /// Full fetch forced by focus regain or the resync key
    Resync,
}

#[derive(Debug)]
pub enum SyncEvent {
    Snapshot { channel: Channel, snapshot: Box<Snapshot> },
    PushConnected { generation: u64 },
    PushLost { generation: u64, error: String },
    /// Session invalidated on any channel. Terminal.
    Unauthorized,
}

/// Push connection health as shown in the status bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    Connecting,
    Live,
    Reconnecting(u32),
    /// Still retrying, but enough consecutive failures to say so loudly
    Lost(u32),
    LoggedOut,
}

pub struct Scheduler {
    api: Arc<ApiClient>,
    tx: Sender<SyncEvent>,
    generation: Arc<AtomicU64>,
    poll: AdaptivePoll,
    poll_in_flight: Arc<AtomicBool>,
    reconnect_delay: Duration,
    /// Wakes the push thread out of its reconnect wait. Dropping it ends the thread.
    wake: Option<Sender<()>>,
    push_failures: u32,
    link: LinkStatus,
    /// Set when the link escalates to `Lost`, taken by the caller
    notice: Option<String>,
    stopped: bool,
}

impl Scheduler {
    pub fn new(api: Arc<ApiClient>, tx: Sender<SyncEvent>, poll_interval_ms: u64, reconnect_delay_ms: u64) -> Self {
        Self {
            api,
            tx,
            generation: Arc::new(AtomicU64::new(0)),
            poll: AdaptivePoll::new(poll_interval_ms),
            poll_in_flight: Arc::new(AtomicBool::new(false)),
            reconnect_delay: Duration::from_millis(reconnect_delay_ms),
            wake: None,
            push_failures: 0,
            link: LinkStatus::Connecting,
            notice: None,
            stopped: false,
        }
    }

    /// Initial full fetch plus the push subscription.
    pub fn start(&mut self) {
        if self.stopped {
            return;
        }
        spawn_fetch(self.api.clone(), self.tx.clone(), Channel::Resync, None);
        self.spawn_push();
    }

    /// Force a full fetch. A live push subscription is kept; one that is
    /// down reconnects now instead of after its delay.
    pub fn resync(&mut self) {
        if self.stopped {
            return;
        }
        spawn_fetch(self.api.clone(), self.tx.clone(), Channel::Resync, None);
        if self.link == LinkStatus::Live {
            return;
        }
        let woken = self.wake.as_ref().is_some_and(|wake| wake.send(()).is_ok());
        if !woken {
            self.spawn_push();
        }
    }

    /// Start the only push thread. Any earlier one is retired by the
    /// generation bump and by losing its wake channel.
    fn spawn_push(&mut self) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.push_failures = 0;
        self.link = LinkStatus::Connecting;
        let (wake_tx, wake_rx) = mpsc::channel();
        self.wake = Some(wake_tx);
        let api = self.api.clone();
        let tx = self.tx.clone();
        let current = self.generation.clone();
        let delay = self.reconnect_delay;
        thread::spawn(move || push_loop(api, tx, current, generation, delay, wake_rx));
    }

    /// Drive the adaptive poll. `active` is whether the latest accepted
    /// snapshot has an active entity.
    pub fn tick(&mut self, now_ms: u64, active: bool) {
        if self.stopped {
            return;
        }
        if !self.poll.tick(active, now_ms) {
            return;
        }
        if self.poll_in_flight.swap(true, Ordering::SeqCst) {
            debug!("poll still in flight, skipping");
            return;
        }
        spawn_fetch(self.api.clone(), self.tx.clone(), Channel::Poll, Some(self.poll_in_flight.clone()));
    }

    /// Stop both channels for good. A push thread waiting to reconnect exits
    /// at once; one reading a stream exits at its next frame.
    pub fn stop(&mut self) {
        self.stopped = true;
        self.wake = None;
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.poll.tick(false, 0);
    }

    /// Update connection bookkeeping. Returns false for events from a push
    /// generation that has since been replaced.
    pub fn observe(&mut self, event: &SyncEvent) -> bool {
        let current = self.generation.load(Ordering::SeqCst);
        match event {
            SyncEvent::PushConnected { generation } => {
                if *generation != current {
                    return false;
                }
                self.push_failures = 0;
                self.link = LinkStatus::Live;
            }
            SyncEvent::PushLost { generation, error } => {
                if *generation != current {
                    return false;
                }
                self.push_failures += 1;
                if self.push_failures == CONNECTION_LOST_AFTER {
                    self.notice = Some(format!("Connection lost: {error}"));
                }
                self.link = if self.push_failures >= CONNECTION_LOST_AFTER {
                    LinkStatus::Lost(self.push_failures)
                } else {
                    LinkStatus::Reconnecting(self.push_failures)
                };
            }
            SyncEvent::Unauthorized => {
                self.stop();
                self.link = LinkStatus::LoggedOut;
            }
            SyncEvent::Snapshot { .. } => {}
        }
        true
    }

    pub fn link(&self) -> LinkStatus {
        self.link
    }

    /// Poll interval while the fallback poll is armed
    pub fn polling(&self) -> Option<u64> {
        self.poll.is_running().then(|| self.poll.interval_ms())
    }

    /// One-shot message for the status line, set when the link is declared lost.
    pub fn take_notice(&mut self) -> Option<String> {
        self.notice.take()
    }

    #[cfg(test)]
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }
}

fn spawn_fetch(api: Arc<ApiClient>, tx: Sender<SyncEvent>, channel: Channel, in_flight: Option<Arc<AtomicBool>>) {
    thread::spawn(move || {
        let event = match api.fetch_snapshot() {
            Ok(snapshot) => Some(SyncEvent::Snapshot { channel, snapshot: Box::new(snapshot) }),
            Err(e) if e.is_unauthorized() => Some(SyncEvent::Unauthorized),
            Err(e) => {
                warn!(?channel, error = %e, "snapshot fetch failed");
                None
            }
        };
        if let Some(flag) = in_flight {
            flag.store(false, Ordering::SeqCst);
        }
        if let Some(event) = event {
            let _ = tx.send(event);
        }
    });
}

/// The push subscription. Reconnects after `delay`, or as soon as `wake`
/// fires, until its generation is replaced or the session is rejected.
fn push_loop(
    api: Arc<ApiClient>,
    tx: Sender<SyncEvent>,
    current: Arc<AtomicU64>,
    generation: u64,
    delay: Duration,
    wake: Receiver<()>,
) {
    let live = || current.load(Ordering::SeqCst) == generation;

    while live() {
        let error = match api.open_events() {
            Ok(response) => {
                info!(generation, "push stream connected");
                if tx.send(SyncEvent::PushConnected { generation }).is_err() {
                    return;
                }
                let mut end = String::from("stream closed by server");
                for frame in FrameReader::<_, Snapshot>::new(response) {
                    if !live() {
                        return;
                    }
                    match frame {
                        Ok(snapshot) => {
                            let event = SyncEvent::Snapshot { channel: Channel::Push, snapshot: Box::new(snapshot) };
                            if tx.send(event).is_err() {
                                return;
                            }
                        }
                        Err(e) => end = ApiError::StreamRead(e.to_string()).to_string(),
                    }
                }
                end
            }
            Err(ApiError::Unauthorized) => {
                let _ = tx.send(SyncEvent::Unauthorized);
                return;
            }
            Err(e) => e.to_string(),
        };

        if !live() {
            return;
        }
        warn!(generation, error = %error, "push channel lost");
        if tx.send(SyncEvent::PushLost { generation, error }).is_err() {
            return;
        }

        // Tell an expired session apart from a network problem before retrying.
        match api.check_session() {
            Err(ApiError::Unauthorized) => {
                let _ = tx.send(SyncEvent::Unauthorized);
                return;
            }
            Err(e) => debug!(error = %e, "session check failed, retrying anyway"),
            Ok(()) => {}
        }
        match wake.recv_timeout(delay) {
            Ok(()) => debug!(generation, "push reconnect requested"),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => return,
        }
        while wake.try_recv().is_ok() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    const WAIT: Duration = Duration::from_secs(5);

    /// Loopback HTTP server with scripted answers. `/api/events` replies with
    /// `events` in order, repeating the last; a 200 there is held open.
    /// `/api/auth/status` replies with `session`.
    struct StubServer {
        url: String,
        events_opened: Arc<AtomicUsize>,
        session_checks: Arc<AtomicUsize>,
    }

    impl StubServer {
        fn start(events: Vec<u16>, session: u16) -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            let url = format!("http://{}", listener.local_addr().unwrap());
            let events_opened = Arc::new(AtomicUsize::new(0));
            let session_checks = Arc::new(AtomicUsize::new(0));
            let (opened, checks) = (events_opened.clone(), session_checks.clone());
            thread::spawn(move || {
                let mut held = Vec::new();
                for stream in listener.incoming() {
                    let Ok(mut stream) = stream else { return };
                    let path = request_path(&mut stream);
                    if path.starts_with("/api/events") {
                        let n = opened.fetch_add(1, Ordering::SeqCst);
                        let status = events.get(n).or(events.last()).copied().unwrap_or(200);
                        if status == 200 {
                            let _ = stream.write_all(
                                b"HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\ncache-control: no-cache\r\n\r\n",
                            );
                            let _ = stream.flush();
                            held.push(stream);
                            continue;
                        }
                        reply(&mut stream, status, "");
                    } else if path.starts_with("/api/auth/status") {
                        checks.fetch_add(1, Ordering::SeqCst);
                        reply(&mut stream, session, "{}");
                    } else {
                        reply(&mut stream, 200, "{}");
                    }
                }
            });
            Self { url, events_opened, session_checks }
        }

        fn opened(&self) -> usize {
            self.events_opened.load(Ordering::SeqCst)
        }

        fn checks(&self) -> usize {
            self.session_checks.load(Ordering::SeqCst)
        }
    }

    fn request_path(stream: &mut TcpStream) -> String {
        let mut head = Vec::new();
        let mut byte = [0u8; 1];
        while !head.ends_with(b"\r\n\r\n") {
            match stream.read(&mut byte) {
                Ok(1) => head.push(byte[0]),
                _ => break,
            }
        }
        let head = String::from_utf8_lossy(&head);
        head.split_whitespace().nth(1).unwrap_or("").to_string()
    }

    fn reply(stream: &mut TcpStream, status: u16, body: &str) {
        let response = format!(
            "HTTP/1.1 {status} Stub\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        );
        let _ = stream.write_all(response.as_bytes());
    }

    fn live_scheduler(server: &StubServer, reconnect_ms: u64) -> (Scheduler, Receiver<SyncEvent>) {
        let api = Arc::new(ApiClient::new(server.url.as_str(), None).unwrap());
        let (tx, rx) = mpsc::channel();
        (Scheduler::new(api, tx, 2_000, reconnect_ms), rx)
    }

    /// Next connection event, skipping snapshots.
    fn next_link_event(rx: &Receiver<SyncEvent>) -> SyncEvent {
        let deadline = Instant::now() + WAIT;
        loop {
            let left = deadline.saturating_duration_since(Instant::now());
            match rx.recv_timeout(left) {
                Ok(SyncEvent::Snapshot { .. }) => continue,
                Ok(event) => return event,
                Err(e) => panic!("no connection event: {e}"),
            }
        }
    }

    fn wait_until(what: &str, cond: impl Fn() -> bool) {
        let deadline = Instant::now() + WAIT;
        while !cond() {
            assert!(Instant::now() < deadline, "timed out waiting for {what}");
            thread::sleep(Duration::from_millis(5));
        }
    }

    fn scheduler() -> Scheduler {
        let api = Arc::new(ApiClient::new("http://127.0.0.1:9", None).unwrap());
        let (tx, _rx) = mpsc::channel();
        Scheduler::new(api, tx, 2_000, 3_000)
    }

    fn lost(generation: u64) -> SyncEvent {
        SyncEvent::PushLost { generation, error: "reset".into() }
    }

    #[test]
    fn repeated_push_failures_escalate_then_recover() {
        let mut sched = scheduler();
        let generation = sched.generation.load(Ordering::SeqCst);

        for n in 1..CONNECTION_LOST_AFTER {
            assert!(sched.observe(&lost(generation)));
            assert_eq!(sched.link(), LinkStatus::Reconnecting(n));
        }
        sched.observe(&lost(generation));
        assert_eq!(sched.link(), LinkStatus::Lost(CONNECTION_LOST_AFTER));

        sched.observe(&SyncEvent::PushConnected { generation });
        assert_eq!(sched.link(), LinkStatus::Live);
    }

    #[test]
    fn events_from_replaced_generations_are_ignored() {
        let mut sched = scheduler();
        let old = sched.generation.load(Ordering::SeqCst);
        sched.generation.fetch_add(1, Ordering::SeqCst);

        assert!(!sched.observe(&lost(old)));
        assert_eq!(sched.link(), LinkStatus::Connecting);
    }

    #[test]
    fn unauthorized_stops_everything() {
        let mut sched = scheduler();
        sched.poll.tick(true, 0);
        assert!(sched.polling().is_some());

        sched.observe(&SyncEvent::Unauthorized);
        assert!(sched.is_stopped());
        assert_eq!(sched.link(), LinkStatus::LoggedOut);
        assert_eq!(sched.polling(), None);

        // Stopped schedulers never re-arm.
        sched.tick(10_000, true);
        sched.tick(20_000, true);
        assert_eq!(sched.polling(), None);
    }

    #[test]
    fn resync_keeps_a_live_subscription() {
        let server = StubServer::start(vec![200], 200);
        let (mut sched, rx) = live_scheduler(&server, 10);
        sched.start();
        let event = next_link_event(&rx);
        assert!(matches!(event, SyncEvent::PushConnected { .. }));
        assert!(sched.observe(&event));
        assert_eq!(sched.link(), LinkStatus::Live);

        sched.resync();
        sched.resync();
        thread::sleep(Duration::from_millis(100));
        assert_eq!(server.opened(), 1);
        assert_eq!(sched.link(), LinkStatus::Live);
    }

    #[test]
    fn resync_reconnects_a_down_link_without_waiting() {
        let server = StubServer::start(vec![503, 200], 200);
        let (mut sched, rx) = live_scheduler(&server, 60_000);
        sched.start();
        let event = next_link_event(&rx);
        assert!(matches!(event, SyncEvent::PushLost { .. }));
        sched.observe(&event);
        assert_eq!(sched.link(), LinkStatus::Reconnecting(1));
        wait_until("session check", || server.checks() == 1);

        sched.resync();
        let event = next_link_event(&rx);
        assert!(matches!(event, SyncEvent::PushConnected { .. }));
        assert!(sched.observe(&event));
        assert_eq!(server.opened(), 2);
    }

    #[test]
    fn transient_failure_checks_session_then_reconnects() {
        let server = StubServer::start(vec![503, 200], 200);
        let (mut sched, rx) = live_scheduler(&server, 10);
        sched.start();

        let lost = next_link_event(&rx);
        match &lost {
            SyncEvent::PushLost { error, .. } => assert!(error.contains("503")),
            other => panic!("expected PushLost, got {other:?}"),
        }
        sched.observe(&lost);
        let connected = next_link_event(&rx);
        assert!(matches!(connected, SyncEvent::PushConnected { .. }));
        sched.observe(&connected);
        assert_eq!(sched.link(), LinkStatus::Live);
        assert_eq!(server.checks(), 1);
        assert_eq!(server.opened(), 2);
    }

    #[test]
    fn rejected_session_check_stops_retrying() {
        let server = StubServer::start(vec![503], 401);
        let (mut sched, rx) = live_scheduler(&server, 10);
        sched.start();

        assert!(matches!(next_link_event(&rx), SyncEvent::PushLost { .. }));
        let event = next_link_event(&rx);
        assert!(matches!(event, SyncEvent::Unauthorized));
        sched.observe(&event);
        assert_eq!(sched.link(), LinkStatus::LoggedOut);

        thread::sleep(Duration::from_millis(100));
        assert_eq!(server.opened(), 1);
    }

    #[test]
    fn unauthorized_push_open_stops_retrying() {
        let server = StubServer::start(vec![401], 200);
        let (mut sched, rx) = live_scheduler(&server, 10);
        sched.start();

        assert!(matches!(next_link_event(&rx), SyncEvent::Unauthorized));
        thread::sleep(Duration::from_millis(100));
        assert_eq!(server.opened(), 1);
        assert_eq!(server.checks(), 0);
    }

    #[test]
    fn stopped_scheduler_ends_its_push_thread() {
        let server = StubServer::start(vec![503], 200);
        let (mut sched, rx) = live_scheduler(&server, 10);
        sched.start();
        assert!(matches!(next_link_event(&rx), SyncEvent::PushLost { .. }));

        sched.stop();
        thread::sleep(Duration::from_millis(50));
        let settled = server.opened();
        thread::sleep(Duration::from_millis(100));
        assert_eq!(server.opened(), settled);
    }

    #[test]
    fn replaced_generation_exits_without_connecting() {
        let server = StubServer::start(vec![200], 200);
        let api = Arc::new(ApiClient::new(server.url.as_str(), None).unwrap());
        let (tx, rx) = mpsc::channel();
        let (_wake_tx, wake_rx) = mpsc::channel();
        let current = Arc::new(AtomicU64::new(2));

        let handle = thread::spawn(move || push_loop(api, tx, current, 1, Duration::from_millis(10), wake_rx));
        handle.join().unwrap();
        assert!(rx.try_recv().is_err());
        assert_eq!(server.opened(), 0);
    }

    #[test]
    fn lost_link_raises_one_notice() {
        let mut sched = scheduler();
        let generation = sched.generation.load(Ordering::SeqCst);
        for _ in 1..CONNECTION_LOST_AFTER {
            sched.observe(&lost(generation));
            assert_eq!(sched.take_notice(), None);
        }
        sched.observe(&lost(generation));
        assert_eq!(sched.take_notice().as_deref(), Some("Connection lost: reset"));
        sched.observe(&lost(generation));
        assert_eq!(sched.take_notice(), None);
    }
}
