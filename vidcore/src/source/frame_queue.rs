use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use media_types::FrameBuffer;

struct QueueInner {
    frames: VecDeque<FrameBuffer>,
    capacity: usize,
    closed: bool,
    dropped: u64,
}

/**
    Bounded frame queue between a producer that must never block and a
    consumer that waits with a timeout.

    When full, pushing discards the oldest frame.
*/
pub(crate) struct FrameQueue {
    inner: Mutex<QueueInner>,
    not_empty: Condvar,
}

impl FrameQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(QueueInner {
                frames: VecDeque::with_capacity(capacity),
                capacity,
                closed: false,
                dropped: 0,
            }),
            not_empty: Condvar::new(),
        }
    }

    /**
        Returns false if the queue is closed.
    */
    pub fn push(&self, frame: FrameBuffer) -> bool {
        let mut inner = self.inner.lock();
        if inner.closed {
            return false;
        }

        if inner.frames.len() >= inner.capacity {
            inner.frames.pop_front();
            inner.dropped += 1;
        }
        inner.frames.push_back(frame);
        self.not_empty.notify_one();
        true
    }

    /**
        Wait up to `timeout` for a frame. Returns `None` on timeout or once
        the queue is closed and drained.
    */
    pub fn pop_timeout(&self, timeout: Duration) -> Option<FrameBuffer> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();
        loop {
            if let Some(frame) = inner.frames.pop_front() {
                return Some(frame);
            }
            if inner.closed || self.not_empty.wait_until(&mut inner, deadline).timed_out() {
                return inner.frames.pop_front();
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().frames.len()
    }

    /// Frames discarded because the consumer fell behind.
    pub fn dropped(&self) -> u64 {
        self.inner.lock().dropped
    }

    pub fn close(&self) {
        let mut inner = self.inner.lock();
        inner.closed = true;
        self.not_empty.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use media_types::PixelFormat;

    use super::*;

    fn frame(value: u8) -> FrameBuffer {
        FrameBuffer::from_vec(1, 1, PixelFormat::Gray8, 1, vec![value]).unwrap()
    }

    #[test]
    fn full_queue_drops_oldest() {
        let queue = FrameQueue::new(2);
        for value in 1..=3 {
            assert!(queue.push(frame(value)));
        }

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.dropped(), 1);
        assert_eq!(queue.pop_timeout(Duration::ZERO).unwrap().data(), &[2]);
        assert_eq!(queue.pop_timeout(Duration::ZERO).unwrap().data(), &[3]);
        assert!(queue.pop_timeout(Duration::from_millis(5)).is_none());
    }

    #[test]
    fn pop_wakes_on_push() {
        let queue = Arc::new(FrameQueue::new(4));
        let consumer = {
            let queue = queue.clone();
            thread::spawn(move || queue.pop_timeout(Duration::from_secs(10)))
        };
        thread::sleep(Duration::from_millis(20));
        queue.push(frame(9));
        assert_eq!(consumer.join().unwrap().unwrap().data(), &[9]);
    }

    #[test]
    fn closed_queue_rejects_pushes_but_drains() {
        let queue = FrameQueue::new(4);
        queue.push(frame(1));
        queue.close();

        assert!(!queue.push(frame(2)));
        assert!(queue.is_closed());
        assert!(queue.pop_timeout(Duration::from_secs(10)).is_some());
        assert!(queue.pop_timeout(Duration::from_secs(10)).is_none());
    }
}
