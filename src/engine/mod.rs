pub mod broadcast;
pub mod dispatcher;
pub mod housekeeper;
pub mod names;
pub mod password;
pub mod queue;
pub mod registry;
pub mod room;
pub mod session;
pub mod transport;

use std::time::Duration;

/// Per-frame write deadline for the socket writer task.
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(30);
/// Tighter deadline for the final error frame written to a socket that is
/// being force-evicted.
pub const FORCED_WRITE_TIMEOUT: Duration = Duration::from_secs(2);
/// Idle read deadline; sockets silent for this long are dropped.
pub const READ_TIMEOUT: Duration = Duration::from_secs(60 * 60);
/// Maximum inbound WebSocket message size in bytes.
pub const READ_LIMIT: usize = 50_000;

pub const ROOM_CAPACITY: usize = 100;
pub const MAX_MESSAGE_LEN: usize = 10_000;
pub const MAX_DESCRIPTION_LEN: usize = 400;
/// Hard cap on retained messages per room; reaching it halves the backlog.
pub const MESSAGES_HARD_LIMIT: usize = 500;
/// Backlog sizes at which clients get an approaching-limit notice.
pub const MESSAGES_APPROACH_BREAKPOINTS: [usize; 3] = [460, 480, 495];

pub const HOUSEKEEPER_INTERVAL: Duration = Duration::from_secs(60);
/// A room with no live sockets is dropped after this much inactivity.
pub const EMPTY_ROOM_TTL: Duration = Duration::from_secs(5 * 60);
/// A room is dropped after this much inactivity even with sockets attached.
pub const INACTIVE_ROOM_TTL: Duration = Duration::from_secs(12 * 60 * 60);

/// Reserved session backing the HTTP direct-send path; every room gets this
/// user pre-registered so external messages have an author.
pub const EXTERNAL_TECH_SESSION_ID: &str = "external-technical-session";
pub const EXTERNAL_TECH_USER_NAME: &str = "external sender";

pub fn now_secs() -> i64 {
    chrono::Utc::now().timestamp()
}
