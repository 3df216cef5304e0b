use crate::engine::queue::DeliveryQueue;
use crate::engine::room::Room;
use crate::engine::transport::FrameTransport;
use crate::engine::WRITE_TIMEOUT;
use rand::Rng;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

/// One live WebSocket connection.
///
/// The session owns the outbound side: a delivery queue feeding a dedicated
/// writer task. The inbound read loop lives in the dispatcher and shares the
/// session through an `Arc`.
pub struct SocketSession {
    /// Unique per connection.
    pub socket_id: String,
    /// Browser session id from the session cookie; stable across reconnects.
    pub session_id: String,
    /// Unix seconds of the last keep-alive beacon or inbound command.
    pub last_keep_alive: AtomicI64,
    pub queue: Arc<DeliveryQueue>,
    pub transport: Arc<dyn FrameTransport>,
    dead: Mutex<bool>,
    related_room: Mutex<Weak<Room>>,
}

impl SocketSession {
    pub fn new(session_id: String, transport: Arc<dyn FrameTransport>) -> Arc<Self> {
        Arc::new(SocketSession {
            socket_id: uuid::Uuid::new_v4().to_string(),
            session_id,
            last_keep_alive: AtomicI64::new(crate::engine::now_secs()),
            queue: Arc::new(DeliveryQueue::new()),
            transport,
            dead: Mutex::new(false),
            related_room: Mutex::new(Weak::new()),
        })
    }

    pub fn is_dead(&self) -> bool {
        *self.dead.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn touch_keep_alive(&self) {
        self.last_keep_alive
            .store(crate::engine::now_secs(), Ordering::Relaxed);
    }

    pub fn set_related_room(&self, room: &Arc<Room>) {
        *self.related_room.lock().unwrap_or_else(|e| e.into_inner()) = Arc::downgrade(room);
    }

    pub fn related_room(&self) -> Option<Arc<Room>> {
        self.related_room
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .upgrade()
    }

    /// Queue a frame for delivery. Dead sockets silently drop frames.
    pub fn put_frame(&self, frame: Arc<String>) {
        if self.is_dead() {
            return;
        }
        self.queue.push(frame);
    }

    /// Mark the socket dead, stop its queue and close the transport. Safe to
    /// call more than once; only the first call does the work.
    pub async fn terminate(&self) {
        {
            let mut dead = self.dead.lock().unwrap_or_else(|e| e.into_inner());
            if *dead {
                return;
            }
            *dead = true;
        }
        self.queue.close();
        self.transport.close().await;
        debug!(socket_id = %self.socket_id, "socket terminated");
    }

    /// Spawn the writer task draining the delivery queue into the transport.
    /// A failed or timed-out write kills the socket and detaches it from its
    /// room.
    pub fn spawn_writer(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let session = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(frame) = session.queue.pop().await {
                // Small random delay smooths out write bursts when a room
                // broadcast fans out to many sockets at once.
                let jitter = rand::rng().random_range(0..20);
                if jitter > 0 {
                    tokio::time::sleep(Duration::from_millis(jitter)).await;
                }
                let sent = timeout(WRITE_TIMEOUT, session.transport.send_text(&frame)).await;
                let ok = matches!(sent, Ok(Ok(())));
                if !ok {
                    warn!(socket_id = %session.socket_id, "write failed, dropping socket");
                    session.terminate().await;
                    if let Some(room) = session.related_room() {
                        room.remove_socket(&session.socket_id).await;
                    }
                    return;
                }
            }
        })
    }
}
