use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// Unbounded frame queue between the room side and a socket's writer task.
///
/// Pushing never blocks, so broadcast loops holding a room lock cannot stall
/// on a slow reader. Closing is idempotent and wakes the consumer.
pub struct DeliveryQueue {
    inner: Mutex<Inner>,
    notify: Notify,
}

struct Inner {
    buf: VecDeque<Arc<String>>,
    closed: bool,
}

impl DeliveryQueue {
    pub fn new() -> Self {
        DeliveryQueue {
            inner: Mutex::new(Inner {
                buf: VecDeque::new(),
                closed: false,
            }),
            notify: Notify::new(),
        }
    }

    /// Enqueue a frame. Frames pushed after close are dropped.
    pub fn push(&self, frame: Arc<String>) {
        {
            let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            if inner.closed {
                return;
            }
            inner.buf.push_back(frame);
        }
        self.notify.notify_one();
    }

    /// Await the next frame. Returns `None` once the queue is closed and
    /// drained.
    pub async fn pop(&self) -> Option<Arc<String>> {
        loop {
            // Register for notification before checking state so that a push
            // between the check and the await is not lost.
            let notified = self.notify.notified();
            {
                let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
                if let Some(frame) = inner.buf.pop_front() {
                    return Some(frame);
                }
                if inner.closed {
                    return None;
                }
            }
            notified.await;
        }
    }

    pub fn close(&self) {
        {
            let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            if inner.closed {
                return;
            }
            inner.closed = true;
        }
        self.notify.notify_waiters();
        self.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).closed
    }
}

impl Default for DeliveryQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn pops_in_push_order() {
        let q = DeliveryQueue::new();
        q.push(Arc::new("a".to_string()));
        q.push(Arc::new("b".to_string()));
        assert_eq!(q.pop().await.unwrap().as_str(), "a");
        assert_eq!(q.pop().await.unwrap().as_str(), "b");
    }

    #[tokio::test]
    async fn pop_waits_for_push() {
        let q = Arc::new(DeliveryQueue::new());
        let q2 = Arc::clone(&q);
        let waiter = tokio::spawn(async move { q2.pop().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        q.push(Arc::new("late".to_string()));
        let got = waiter.await.unwrap();
        assert_eq!(got.unwrap().as_str(), "late");
    }

    #[tokio::test]
    async fn close_drains_then_ends() {
        let q = DeliveryQueue::new();
        q.push(Arc::new("last".to_string()));
        q.close();
        q.close();
        q.push(Arc::new("dropped".to_string()));
        assert_eq!(q.pop().await.unwrap().as_str(), "last");
        assert!(q.pop().await.is_none());
        assert!(q.is_closed());
    }

    #[tokio::test]
    async fn close_wakes_waiting_consumer() {
        let q = Arc::new(DeliveryQueue::new());
        let q2 = Arc::clone(&q);
        let waiter = tokio::spawn(async move { q2.pop().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        q.close();
        assert!(waiter.await.unwrap().is_none());
    }
}
