//! Frame broadcast hub
//!
//! Holds the single latest camera frame and a generation counter. The
//! producer overwrites the frame; every viewer waits for a generation newer
//! than the last one it sent. Frames published while a viewer is busy are
//! skipped for that viewer, so memory and backlog stay bounded no matter how
//! slow a viewer is.

use bytes::Bytes;
use thiserror::Error;
use tokio::sync::watch;

/// One captured JPEG and its position in the capture sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub payload: Bytes,
    /// Starts at 1, strictly increasing, never reused
    pub generation: u64,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HubError {
    #[error("Frame hub closed")]
    Closed,
}

#[derive(Debug, Clone)]
enum Slot {
    Empty,
    Ready(Frame),
    Closed,
}

/// Latest-frame-wins broadcast point between capture and viewers.
///
/// The watch channel's lock guards exactly the `{frame, generation}` pair and
/// its change notification wakes every waiting receiver, each of which then
/// re-checks its own generation.
pub struct FrameBroadcastHub {
    slot: watch::Sender<Slot>,
}

impl FrameBroadcastHub {
    pub fn new() -> Self {
        let (slot, _) = watch::channel(Slot::Empty);
        Self { slot }
    }

    /// Replace the stored frame and wake all waiting viewers.
    ///
    /// Never waits on viewers. Returns the new generation, or `None` once the
    /// hub is closed.
    pub fn publish(&self, payload: Bytes) -> Option<u64> {
        let mut published = None;
        self.slot.send_if_modified(|slot| {
            let generation = match slot {
                Slot::Empty => 1,
                Slot::Ready(frame) => frame.generation + 1,
                Slot::Closed => return false,
            };
            *slot = Slot::Ready(Frame {
                payload,
                generation,
            });
            published = Some(generation);
            true
        });
        published
    }

    /// Wait for a frame newer than `last_seen`.
    ///
    /// Returns at once if one is already stored.
    pub async fn await_next(&self, last_seen: u64) -> Result<Frame, HubError> {
        let mut subscriber = self.subscribe();
        subscriber.last_seen = last_seen;
        subscriber.next_frame().await
    }

    /// Register a viewer that has not seen any frame yet
    pub fn subscribe(&self) -> Subscriber {
        Subscriber {
            rx: self.slot.subscribe(),
            last_seen: 0,
        }
    }

    /// Stop the hub; every waiting and future viewer gets `HubError::Closed`
    pub fn close(&self) {
        self.slot.send_replace(Slot::Closed);
    }

    /// Generation of the stored frame, 0 before the first publish
    pub fn generation(&self) -> u64 {
        match &*self.slot.borrow() {
            Slot::Ready(frame) => frame.generation,
            _ => 0,
        }
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.slot.receiver_count()
    }
}

impl Default for FrameBroadcastHub {
    fn default() -> Self {
        Self::new()
    }
}

/// A viewer's position in the frame sequence. Dropping it releases the slot.
pub struct Subscriber {
    rx: watch::Receiver<Slot>,
    last_seen: u64,
}

impl Subscriber {
    /// Wait until a frame newer than the last one returned is available
    pub async fn next_frame(&mut self) -> Result<Frame, HubError> {
        loop {
            {
                let slot = self.rx.borrow_and_update();
                match &*slot {
                    Slot::Ready(frame) if frame.generation > self.last_seen => {
                        self.last_seen = frame.generation;
                        return Ok(frame.clone());
                    }
                    Slot::Closed => return Err(HubError::Closed),
                    _ => {}
                }
            }

            self.rx.changed().await.map_err(|_| HubError::Closed)?;
        }
    }

    /// Generation of the last frame returned, 0 if none yet
    pub fn last_seen(&self) -> u64 {
        self.last_seen
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_millis(200);

    #[tokio::test]
    async fn test_generations_start_at_one_and_increase() {
        let hub = FrameBroadcastHub::new();
        assert_eq!(hub.generation(), 0);
        assert_eq!(hub.publish(Bytes::from_static(b"a")), Some(1));
        assert_eq!(hub.publish(Bytes::from_static(b"b")), Some(2));
        assert_eq!(hub.generation(), 2);
    }

    #[tokio::test]
    async fn test_late_subscriber_does_not_block() {
        let hub = FrameBroadcastHub::new();
        for i in 0..5u8 {
            hub.publish(Bytes::from(vec![i]));
        }

        let frame = timeout(WAIT, hub.await_next(0))
            .await
            .expect("must not block once a frame exists")
            .unwrap();
        assert_eq!(frame.generation, 5);
        assert_eq!(&frame.payload[..], &[4]);
    }

    #[tokio::test]
    async fn test_waits_until_newer_generation() {
        let hub = FrameBroadcastHub::new();
        hub.publish(Bytes::from_static(b"old"));

        assert!(timeout(Duration::from_millis(50), hub.await_next(1))
            .await
            .is_err());

        hub.publish(Bytes::from_static(b"new"));
        let frame = timeout(WAIT, hub.await_next(1)).await.unwrap().unwrap();
        assert_eq!(frame.generation, 2);
    }

    #[tokio::test]
    async fn test_one_publish_wakes_every_waiter() {
        let hub = Arc::new(FrameBroadcastHub::new());

        let waiters: Vec<_> = (0..2)
            .map(|_| {
                let mut subscriber = hub.subscribe();
                tokio::spawn(async move { subscriber.next_frame().await })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(20)).await;
        hub.publish(Bytes::from_static(b"shared"));

        for waiter in waiters {
            let frame = timeout(WAIT, waiter).await.unwrap().unwrap().unwrap();
            assert_eq!(frame.generation, 1);
            assert_eq!(&frame.payload[..], b"shared");
        }
    }

    #[tokio::test]
    async fn test_slow_subscriber_sees_only_latest() {
        let hub = FrameBroadcastHub::new();
        let mut subscriber = hub.subscribe();

        hub.publish(Bytes::from_static(b"1"));
        assert_eq!(subscriber.next_frame().await.unwrap().generation, 1);

        hub.publish(Bytes::from_static(b"2"));
        hub.publish(Bytes::from_static(b"3"));
        hub.publish(Bytes::from_static(b"4"));

        let frame = subscriber.next_frame().await.unwrap();
        assert_eq!(frame.generation, 4);
        assert_eq!(subscriber.last_seen(), 4);
    }

    #[tokio::test]
    async fn test_observed_generations_strictly_increase() {
        let hub = Arc::new(FrameBroadcastHub::new());
        let mut subscriber = hub.subscribe();

        let producer = {
            let hub = hub.clone();
            tokio::spawn(async move {
                for i in 0..200u32 {
                    hub.publish(Bytes::from(i.to_be_bytes().to_vec()));
                    if i % 7 == 0 {
                        tokio::task::yield_now().await;
                    }
                }
                hub.close();
            })
        };

        let mut seen = Vec::new();
        while let Ok(frame) = subscriber.next_frame().await {
            seen.push(frame.generation);
        }
        producer.await.unwrap();

        assert!(!seen.is_empty());
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn test_close_wakes_waiters() {
        let hub = Arc::new(FrameBroadcastHub::new());
        let waiter = {
            let hub = hub.clone();
            tokio::spawn(async move { hub.await_next(0).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        hub.close();

        let result = timeout(WAIT, waiter).await.unwrap().unwrap();
        assert_eq!(result, Err(HubError::Closed));
        assert_eq!(hub.publish(Bytes::from_static(b"late")), None);
    }

    #[tokio::test]
    async fn test_dropping_subscriber_releases_slot() {
        let hub = FrameBroadcastHub::new();
        let first = hub.subscribe();
        let second = hub.subscribe();
        assert_eq!(hub.subscriber_count(), 2);

        drop(first);
        assert_eq!(hub.subscriber_count(), 1);
        drop(second);
        assert_eq!(hub.subscriber_count(), 0);
    }
}
