// ABOUTME: Bounded close-once event queue feeding delivery reports and resend requests to the application
// ABOUTME: Full buffers either apply backpressure or evict the oldest item, per configured policy

use crate::session::config::OverflowPolicy;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Notify;

/// Returned by [`Stream::push`] after the stream was closed. Carries the
/// rejected item back to the caller.
#[derive(Debug, Error, PartialEq)]
#[error("stream is closed")]
pub struct StreamClosed<T>(pub T);

struct State<T> {
    items: VecDeque<T>,
    closed: bool,
}

struct Shared<T> {
    state: Mutex<State<T>>,
    capacity: usize,
    policy: OverflowPolicy,
    readable: Notify,
    writable: Notify,
}

/// Bounded FIFO with at-most-once close.
///
/// Safe for many producers; consumers read through [`Consumer`]. Once
/// closed, pushes fail and readers drain what is left before seeing the end.
pub struct Stream<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Stream<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Send> Stream<T> {
    /// `capacity` is clamped to at least one slot.
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        let capacity = capacity.max(1);
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    items: VecDeque::with_capacity(capacity),
                    closed: false,
                }),
                capacity,
                policy,
                readable: Notify::new(),
                writable: Notify::new(),
            }),
        }
    }

    /// Append an item.
    ///
    /// Below capacity this never waits. At capacity it waits for a reader
    /// (`Block`) or evicts the oldest item (`DropOldest`). A close while
    /// waiting hands the item back.
    pub async fn push(&self, item: T) -> Result<(), StreamClosed<T>> {
        loop {
            let notified = self.shared.writable.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.shared.state.lock();
                if state.closed {
                    return Err(StreamClosed(item));
                }
                let full = state.items.len() >= self.shared.capacity;
                if !full || self.shared.policy == OverflowPolicy::DropOldest {
                    if full {
                        state.items.pop_front();
                    }
                    state.items.push_back(item);
                    drop(state);
                    self.shared.readable.notify_one();
                    return Ok(());
                }
            }

            notified.await;
        }
    }

    /// Close the stream. Returns `true` for the call that closed it; later
    /// calls change nothing.
    pub fn close(&self) -> bool {
        let first = {
            let mut state = self.shared.state.lock();
            !std::mem::replace(&mut state.closed, true)
        };
        if first {
            self.shared.readable.notify_waiters();
            self.shared.writable.notify_waiters();
        }
        first
    }

    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }

    /// Items buffered and not yet read.
    pub fn len(&self) -> usize {
        self.shared.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read-only handle over this stream.
    pub fn consumer(&self) -> Consumer<T> {
        Consumer {
            shared: Arc::clone(&self.shared),
        }
    }
}

/// Read side of a [`Stream`].
pub struct Consumer<T> {
    shared: Arc<Shared<T>>,
}

impl<T: Send> Consumer<T> {
    /// Next item, waiting if the buffer is empty. `None` once the stream
    /// is closed and drained.
    pub async fn recv(&mut self) -> Option<T> {
        loop {
            let notified = self.shared.readable.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.shared.state.lock();
                if let Some(item) = state.items.pop_front() {
                    drop(state);
                    self.shared.writable.notify_one();
                    return Some(item);
                }
                if state.closed {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Next item if one is buffered right now.
    pub fn try_recv(&mut self) -> Option<T> {
        let item = self.shared.state.lock().items.pop_front();
        if item.is_some() {
            self.shared.writable.notify_one();
        }
        item
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_push_and_recv_in_order() {
        let stream = Stream::new(4, OverflowPolicy::Block);
        let mut consumer = stream.consumer();
        for i in 0..3 {
            stream.push(i).await.unwrap();
        }
        assert_eq!(consumer.recv().await, Some(0));
        assert_eq!(consumer.recv().await, Some(1));
        assert_eq!(consumer.recv().await, Some(2));
        assert_eq!(consumer.try_recv(), None);
    }

    #[tokio::test]
    async fn test_close_drains_then_ends() {
        let stream = Stream::new(4, OverflowPolicy::Block);
        let mut consumer = stream.consumer();
        stream.push("a").await.unwrap();
        stream.push("b").await.unwrap();
        assert!(stream.close());

        assert_eq!(consumer.recv().await, Some("a"));
        assert_eq!(consumer.recv().await, Some("b"));
        assert_eq!(consumer.recv().await, None);
        assert_eq!(consumer.recv().await, None);
    }

    #[tokio::test]
    async fn test_close_twice_is_noop() {
        let stream: Stream<u8> = Stream::new(1, OverflowPolicy::Block);
        assert!(stream.close());
        assert!(!stream.close());
        assert!(stream.is_closed());
        assert_eq!(stream.push(1).await, Err(StreamClosed(1)));
        assert_eq!(stream.consumer().recv().await, None);
    }

    #[tokio::test]
    async fn test_block_policy_waits_for_reader() {
        let stream = Stream::new(1, OverflowPolicy::Block);
        let mut consumer = stream.consumer();
        stream.push(1).await.unwrap();

        let producer = stream.clone();
        let pending = tokio::spawn(async move { producer.push(2).await });
        tokio::task::yield_now().await;
        assert!(!pending.is_finished());

        assert_eq!(consumer.recv().await, Some(1));
        pending.await.unwrap().unwrap();
        assert_eq!(consumer.recv().await, Some(2));
    }

    #[tokio::test]
    async fn test_close_releases_blocked_pusher() {
        let stream = Stream::new(1, OverflowPolicy::Block);
        stream.push(1).await.unwrap();

        let producer = stream.clone();
        let pending = tokio::spawn(async move { producer.push(2).await });
        tokio::task::yield_now().await;
        stream.close();

        let result = timeout(Duration::from_secs(1), pending).await.unwrap().unwrap();
        assert_eq!(result, Err(StreamClosed(2)));
        assert_eq!(stream.len(), 1);
    }

    #[tokio::test]
    async fn test_drop_oldest_evicts() {
        let stream = Stream::new(2, OverflowPolicy::DropOldest);
        let mut consumer = stream.consumer();
        for i in 0..5 {
            stream.push(i).await.unwrap();
        }
        assert_eq!(stream.len(), 2);
        assert_eq!(consumer.recv().await, Some(3));
        assert_eq!(consumer.recv().await, Some(4));
    }

    #[tokio::test]
    async fn test_waiting_reader_wakes_on_push_and_close() {
        let stream = Stream::new(2, OverflowPolicy::Block);
        let mut consumer = stream.consumer();
        let reader = tokio::spawn(async move {
            let mut seen = Vec::new();
            while let Some(item) = consumer.recv().await {
                seen.push(item);
            }
            seen
        });

        stream.push(7).await.unwrap();
        stream.push(8).await.unwrap();
        stream.close();

        let seen = timeout(Duration::from_secs(1), reader).await.unwrap().unwrap();
        assert_eq!(seen, vec![7, 8]);
    }
}
