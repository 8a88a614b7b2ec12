use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

use crate::frame::Frame;

/// Fans one producer out to many subscribers. Each subscriber holds a
/// single-slot `watch` receiver: a new frame always replaces whatever was
/// buffered, so a slow subscriber observes the latest frame rather than a
/// lagged one. Built on `tokio::sync::watch` rather than `broadcast` —
/// `broadcast`'s ring buffer reports a `Lagged` error on overflow, which is
/// a strictly weaker guarantee than "always exactly the most recent frame".
pub struct FrameRelay {
    tx: watch::Sender<Option<Frame>>,
    frames_published: AtomicU64,
    subscriber_count: Arc<AtomicU64>,
}

pub struct FrameSubscription {
    rx: watch::Receiver<Option<Frame>>,
    frames_received: u64,
    subscriber_count: Arc<AtomicU64>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RelayStats {
    pub frames_published: u64,
    pub subscribers: u64,
}

impl FrameRelay {
    pub fn new() -> Arc<Self> {
        let (tx, _rx) = watch::channel(None);
        Arc::new(FrameRelay {
            tx,
            frames_published: AtomicU64::new(0),
            subscriber_count: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Non-blocking; never waits on a consumer.
    pub fn publish(&self, frame: Frame) {
        // send_replace never blocks and drops the previous value, which is
        // exactly the relay's drop-oldest contract.
        self.tx.send_replace(Some(frame));
        self.frames_published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn subscribe(self: &Arc<Self>) -> FrameSubscription {
        self.subscriber_count.fetch_add(1, Ordering::Relaxed);
        FrameSubscription {
            rx: self.tx.subscribe(),
            frames_received: 0,
            subscriber_count: self.subscriber_count.clone(),
        }
    }

    pub fn stats(&self) -> RelayStats {
        RelayStats {
            frames_published: self.frames_published.load(Ordering::Relaxed),
            subscribers: self.subscriber_count.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RelayRecvError {
    #[error("frame relay closed")]
    Closed,
}

impl FrameSubscription {
    /// Waits until a frame newer than the last one returned from `recv` is
    /// published, then returns it. Cancel-safe: intended for use inside
    /// `tokio::select!` against a shutdown signal.
    pub async fn recv(&mut self) -> Result<Frame, RelayRecvError> {
        self.rx.changed().await.map_err(|_| RelayRecvError::Closed)?;
        self.frames_received += 1;
        self.rx
            .borrow_and_update()
            .clone()
            .ok_or(RelayRecvError::Closed)
    }

    /// Returns the most recently published frame without waiting, or `None`
    /// if the producer has not published yet.
    pub fn borrow_latest(&self) -> Option<Frame> {
        self.rx.borrow().clone()
    }

    pub async fn changed(&mut self) -> Result<(), RelayRecvError> {
        self.rx.changed().await.map_err(|_| RelayRecvError::Closed)
    }

    pub fn frames_received(&self) -> u64 {
        self.frames_received
    }
}

impl Drop for FrameSubscription {
    fn drop(&mut self) {
        self.subscriber_count.fetch_sub(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use crate::config::PixelFormat;

    fn test_frame(n: u8) -> Frame {
        Frame::new(2, 2, PixelFormat::Rgb24, Bytes::from(vec![n; 12]))
    }

    #[tokio::test]
    async fn subscriber_sees_monotonic_frames() {
        let relay = FrameRelay::new();
        let mut sub = relay.subscribe();
        relay.publish(test_frame(1));
        sub.changed().await.unwrap();
        let f1 = sub.borrow_latest().unwrap();
        assert_eq!(f1.bytes[0], 1);

        relay.publish(test_frame(2));
        sub.changed().await.unwrap();
        let f2 = sub.borrow_latest().unwrap();
        assert_eq!(f2.bytes[0], 2);
    }

    #[tokio::test]
    async fn drop_latest_replaces_buffered_frame() {
        let relay = FrameRelay::new();
        let sub = relay.subscribe();
        relay.publish(test_frame(1));
        relay.publish(test_frame(2));
        relay.publish(test_frame(3));
        let latest = sub.borrow_latest().unwrap();
        assert_eq!(latest.bytes[0], 3);
    }

    #[test]
    fn stats_count_subscribers_and_publishes() {
        let relay = FrameRelay::new();
        let _a = relay.subscribe();
        let _b = relay.subscribe();
        relay.publish(test_frame(1));
        let stats = relay.stats();
        assert_eq!(stats.subscribers, 2);
        assert_eq!(stats.frames_published, 1);
    }

    #[test]
    fn dropping_a_subscription_decrements_the_count() {
        let relay = FrameRelay::new();
        let a = relay.subscribe();
        let _b = relay.subscribe();
        assert_eq!(relay.stats().subscribers, 2);
        drop(a);
        assert_eq!(relay.stats().subscribers, 1);
    }
}
