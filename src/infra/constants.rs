// =============================================================================
// SERVER ENDPOINTS
// =============================================================================

/// Default server base URL
pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:8080";

/// Pull endpoint returning the full snapshot
pub const STATE_PATH: &str = "/api/state";

/// Server-push endpoint (`text/event-stream`, one snapshot per `data:` frame)
pub const EVENTS_PATH: &str = "/api/events";

/// Authenticated check used to tell session expiry from network trouble
pub const AUTH_STATUS_PATH: &str = "/api/auth/status";

/// Chat turn submission (chunked `data:` frame response)
pub const CHAT_PATH: &str = "/api/chat";

// =============================================================================
// SYNC
// =============================================================================

/// Adaptive poll interval while something is active (milliseconds)
pub const POLL_INTERVAL_MS: u64 = 2_000;

/// Delay before reopening a dropped push connection (milliseconds)
pub const RECONNECT_DELAY_MS: u64 = 3_000;

/// Consecutive push failures after which the status bar reports the connection as lost
pub const CONNECTION_LOST_AFTER: u32 = 5;

/// Snapshot keys that change every tick without semantic effect
pub const DEFAULT_VOLATILE_FIELDS: &[&str] = &["now", "server_time", "generated_at"];

// =============================================================================
// SCROLLING
// =============================================================================

/// Distance from the bottom (rows) still counted as "pinned"
pub const PIN_THRESHOLD_ROWS: f32 = 1.0;

/// Scroll amount for arrow keys
pub const SCROLL_ARROW_AMOUNT: f32 = 3.0;

/// Scroll amount for PageUp/PageDown
pub const SCROLL_PAGE_AMOUNT: f32 = 10.0;

// =============================================================================
// CHAT
// =============================================================================

/// Content shown when a turn's stream ends without a completion frame
pub const NO_RESPONSE_PLACEHOLDER: &str = "No response received.";

/// Content shown when the server reports an error before any text arrived
pub const ERROR_PLACEHOLDER: &str = "The assistant hit an error before responding.";

/// How long a notification stays in the status bar (milliseconds)
pub const NOTICE_TTL_MS: u64 = 6_000;

// =============================================================================
// EVENT LOOP
// =============================================================================

/// Poll interval for terminal events in milliseconds
pub const EVENT_POLL_MS: u64 = 8;

/// Minimum time between renders (ms) - caps at ~28fps
pub const RENDER_THROTTLE_MS: u64 = 36;

// =============================================================================
// PERSISTENCE
// =============================================================================

/// Directory for config, logs and crash reports
pub const STORE_DIR: &str = "./.opsdeck";

/// Config file name inside STORE_DIR
pub const CONFIG_FILE: &str = "config.yaml";

/// Log file name inside STORE_DIR
pub const LOG_FILE: &str = "opsdeck.log";
