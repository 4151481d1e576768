use std::time::Duration;

use bytes::Bytes;
use tokio::{
    sync::{Mutex, watch},
    time::Instant,
};

pub const DEFAULT_FRESHNESS: Duration = Duration::from_secs(5);

struct StoredFrame {
    bytes: Bytes,
    received_at: Instant,
}

/// Single-slot holder for the most recently decoded frame.
///
/// A frame older than the freshness window is reported as missing, which is
/// how callers notice a stalled decoder.
pub struct FrameRing {
    slot: Mutex<Option<StoredFrame>>,
    freshness: Duration,
    published: watch::Sender<u64>,
}

impl FrameRing {
    pub fn new(freshness: Duration) -> Self {
        let (published, _) = watch::channel(0);
        Self {
            slot: Mutex::new(None),
            freshness,
            published,
        }
    }

    pub async fn set(&self, frame: Bytes) {
        {
            let mut slot = self.slot.lock().await;
            *slot = Some(StoredFrame {
                bytes: frame,
                received_at: Instant::now(),
            });
        }
        self.published.send_modify(|count| *count += 1);
    }

    pub async fn get(&self) -> Option<Bytes> {
        let slot = self.slot.lock().await;
        let frame = slot.as_ref()?;
        if frame.received_at.elapsed() > self.freshness {
            return None;
        }
        Some(frame.bytes.clone())
    }

    /// Number of frames stored since construction.
    pub fn published(&self) -> u64 {
        *self.published.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.published.subscribe()
    }
}

impl Default for FrameRing {
    fn default() -> Self {
        Self::new(DEFAULT_FRESHNESS)
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use bytes::Bytes;

    use super::FrameRing;

    #[tokio::test]
    async fn empty_ring_has_no_frame() {
        let ring = FrameRing::default();
        assert!(ring.get().await.is_none());
        assert_eq!(ring.published(), 0);
    }

    #[tokio::test]
    async fn set_replaces_previous_frame() {
        let ring = FrameRing::default();
        ring.set(Bytes::from_static(b"one")).await;
        ring.set(Bytes::from_static(b"two")).await;

        assert_eq!(ring.get().await, Some(Bytes::from_static(b"two")));
        assert_eq!(ring.published(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn frame_goes_stale_after_freshness_window() {
        let ring = FrameRing::default();
        ring.set(Bytes::from_static(b"frame")).await;

        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(ring.get().await.is_some(), "exactly 5s old is still fresh");

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(ring.get().await.is_none());

        ring.set(Bytes::from_static(b"newer")).await;
        assert_eq!(ring.get().await, Some(Bytes::from_static(b"newer")));
    }

    #[tokio::test]
    async fn subscribers_are_woken_by_set() {
        let ring = Arc::new(FrameRing::default());
        let mut published = ring.subscribe();
        let writer = ring.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            writer.set(Bytes::from_static(b"frame")).await;
        });

        tokio::time::timeout(Duration::from_secs(5), published.changed())
            .await
            .expect("set should wake subscribers")
            .expect("ring should still be alive");
        assert_eq!(*published.borrow(), 1);
    }
}
