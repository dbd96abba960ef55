//! Bounded frame buffer decoupling capture cadence from network cadence.
//!
//! The capture thread pushes frames synchronously; the streaming controller
//! pops batches asynchronously. The buffer is the only point of contact
//! between the two, so the microphone never waits on network I/O beyond the
//! buffer's bounded capacity.

use crate::config::OverflowPolicyConfig;
use crate::defaults;
use crate::streaming::frame::AudioFrame;
use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;

/// Configuration for the frame buffer.
#[derive(Debug, Clone)]
pub struct FrameBufferConfig {
    /// Maximum number of buffered frames.
    pub capacity: usize,
    /// What `push` does when the buffer is full.
    pub policy: OverflowPolicyConfig,
}

impl Default for FrameBufferConfig {
    fn default() -> Self {
        // Capacity in frames for BUFFER_SECS of audio at the default frame size.
        let frames_per_sec = 1000 / defaults::FRAME_DURATION_MS as usize;
        Self {
            capacity: defaults::BUFFER_SECS as usize * frames_per_sec,
            policy: OverflowPolicyConfig::Block,
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    queue: VecDeque<AudioFrame>,
    closed: bool,
    dropped: u64,
}

/// Bounded FIFO queue of audio frames.
///
/// Single consumer: `pop_batch` is intended to be called from one task.
/// Frames come out in exactly the order they went in; the only loss is the
/// explicit `DropOldest` eviction, which is counted.
pub struct FrameBuffer {
    inner: Mutex<Inner>,
    /// Wakes pushers blocked on a full buffer (Block policy).
    space: Condvar,
    /// Wakes the async consumer when frames arrive or the buffer closes.
    available: Notify,
    config: FrameBufferConfig,
}

impl FrameBuffer {
    /// Creates a new frame buffer with default configuration.
    pub fn new() -> Self {
        Self::with_config(FrameBufferConfig::default())
    }

    /// Creates a new frame buffer with custom configuration.
    pub fn with_config(config: FrameBufferConfig) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            space: Condvar::new(),
            available: Notify::new(),
            config,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Pushes a frame from the capture thread.
    ///
    /// Under `DropOldest` this never blocks: a full buffer evicts its oldest
    /// frame. Under `Block` the calling thread waits until space frees up.
    ///
    /// Returns `false` once the buffer has been closed; the frame is
    /// discarded and the capture loop should stop.
    pub fn push(&self, frame: AudioFrame) -> bool {
        let mut inner = self.lock();
        loop {
            if inner.closed {
                return false;
            }
            if inner.queue.len() < self.config.capacity {
                break;
            }
            match self.config.policy {
                OverflowPolicyConfig::DropOldest => {
                    inner.queue.pop_front();
                    inner.dropped += 1;
                    break;
                }
                OverflowPolicyConfig::Block => {
                    inner = self
                        .space
                        .wait(inner)
                        .unwrap_or_else(|e| e.into_inner());
                }
            }
        }
        inner.queue.push_back(frame);
        drop(inner);
        self.available.notify_one();
        true
    }

    /// Pops up to `max_frames` frames in FIFO order.
    ///
    /// Waits up to `timeout` for at least one frame. Returns:
    /// - `Some(frames)`: one or more frames, oldest first
    /// - `Some(vec![])`: timed out with nothing buffered
    /// - `None`: the buffer is closed and fully drained (end of stream)
    pub async fn pop_batch(&self, max_frames: usize, timeout: Duration) -> Option<Vec<AudioFrame>> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            {
                let mut inner = self.lock();
                if !inner.queue.is_empty() {
                    let n = inner.queue.len().min(max_frames);
                    let frames: Vec<AudioFrame> = inner.queue.drain(..n).collect();
                    drop(inner);
                    self.space.notify_all();
                    return Some(frames);
                }
                if inner.closed {
                    return None;
                }
            }
            // A push between the check above and this await leaves a stored
            // permit, so the wakeup cannot be missed.
            if tokio::time::timeout_at(deadline, self.available.notified())
                .await
                .is_err()
            {
                return Some(Vec::new());
            }
        }
    }

    /// Closes the buffer: capture has stopped.
    ///
    /// Blocked pushers return immediately; the consumer drains what remains
    /// and then sees end-of-stream.
    pub fn close(&self) {
        let mut inner = self.lock();
        inner.closed = true;
        drop(inner);
        self.space.notify_all();
        self.available.notify_one();
        self.available.notify_waiters();
    }

    /// Returns true once `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Number of frames currently buffered.
    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    /// Returns true if no frames are buffered.
    pub fn is_empty(&self) -> bool {
        self.lock().queue.is_empty()
    }

    /// Number of frames evicted by the `DropOldest` policy.
    pub fn dropped(&self) -> u64 {
        self.lock().dropped
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn make_frame(sequence: u64) -> AudioFrame {
        AudioFrame::new(sequence, vec![0i16; 160])
    }

    fn small_buffer(capacity: usize, policy: OverflowPolicyConfig) -> FrameBuffer {
        FrameBuffer::with_config(FrameBufferConfig { capacity, policy })
    }

    #[tokio::test]
    async fn test_fifo_order_no_loss_no_duplication() {
        let buffer = small_buffer(100, OverflowPolicyConfig::Block);

        for i in 0..50 {
            assert!(buffer.push(make_frame(i)));
        }
        buffer.close();

        let mut sequences = Vec::new();
        while let Some(frames) = buffer.pop_batch(7, Duration::from_millis(10)).await {
            sequences.extend(frames.iter().map(|f| f.sequence));
        }

        assert_eq!(sequences, (0..50).collect::<Vec<u64>>());
        assert_eq!(buffer.dropped(), 0);
    }

    #[tokio::test]
    async fn test_pop_batch_respects_max_frames() {
        let buffer = small_buffer(100, OverflowPolicyConfig::Block);
        for i in 0..10 {
            buffer.push(make_frame(i));
        }

        let frames = buffer
            .pop_batch(4, Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(frames.len(), 4);
        assert_eq!(frames[0].sequence, 0);
        assert_eq!(buffer.len(), 6);
    }

    #[tokio::test]
    async fn test_pop_batch_times_out_empty() {
        let buffer = small_buffer(10, OverflowPolicyConfig::Block);

        let frames = buffer.pop_batch(4, Duration::from_millis(20)).await;
        assert!(matches!(frames, Some(ref v) if v.is_empty()));
    }

    #[tokio::test]
    async fn test_drop_oldest_evicts_front() {
        let buffer = small_buffer(3, OverflowPolicyConfig::DropOldest);

        for i in 0..5 {
            assert!(buffer.push(make_frame(i)));
        }

        assert_eq!(buffer.dropped(), 2);
        let frames = buffer
            .pop_batch(10, Duration::from_millis(10))
            .await
            .unwrap();
        let sequences: Vec<u64> = frames.iter().map(|f| f.sequence).collect();
        assert_eq!(sequences, vec![2, 3, 4]);
    }

    #[tokio::test]
    async fn test_closed_empty_signals_end_of_stream() {
        let buffer = small_buffer(10, OverflowPolicyConfig::Block);
        buffer.push(make_frame(0));
        buffer.close();

        // Remaining frame still drains
        let frames = buffer
            .pop_batch(10, Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(frames.len(), 1);

        // Then end of stream
        assert!(buffer.pop_batch(10, Duration::from_millis(10)).await.is_none());
    }

    #[tokio::test]
    async fn test_push_after_close_rejected() {
        let buffer = small_buffer(10, OverflowPolicyConfig::Block);
        buffer.close();
        assert!(!buffer.push(make_frame(0)));
        assert!(buffer.is_empty());
    }

    #[tokio::test]
    async fn test_block_policy_waits_for_consumer() {
        let buffer = Arc::new(small_buffer(2, OverflowPolicyConfig::Block));

        // Fill the buffer
        buffer.push(make_frame(0));
        buffer.push(make_frame(1));

        // A blocked pusher on its own thread
        let pusher_buffer = buffer.clone();
        let pusher = std::thread::spawn(move || pusher_buffer.push(make_frame(2)));

        // Give the pusher time to block, then free a slot
        std::thread::sleep(Duration::from_millis(20));
        let frames = buffer
            .pop_batch(1, Duration::from_millis(100))
            .await
            .unwrap();
        assert_eq!(frames[0].sequence, 0);

        assert!(pusher.join().unwrap());
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.dropped(), 0);
    }

    #[tokio::test]
    async fn test_close_unblocks_pusher() {
        let buffer = Arc::new(small_buffer(1, OverflowPolicyConfig::Block));
        buffer.push(make_frame(0));

        let pusher_buffer = buffer.clone();
        let pusher = std::thread::spawn(move || pusher_buffer.push(make_frame(1)));

        std::thread::sleep(Duration::from_millis(20));
        buffer.close();

        // The blocked pusher returns false instead of hanging
        assert!(!pusher.join().unwrap());
    }

    #[tokio::test]
    async fn test_concurrent_producer_consumer_preserves_order() {
        let buffer = Arc::new(small_buffer(8, OverflowPolicyConfig::Block));
        let total = 200u64;

        let producer_buffer = buffer.clone();
        let producer = std::thread::spawn(move || {
            for i in 0..total {
                producer_buffer.push(make_frame(i));
            }
            producer_buffer.close();
        });

        let mut sequences = Vec::new();
        while let Some(frames) = buffer.pop_batch(5, Duration::from_millis(50)).await {
            sequences.extend(frames.iter().map(|f| f.sequence));
        }
        producer.join().unwrap();

        assert_eq!(sequences, (0..total).collect::<Vec<u64>>());
    }
}
