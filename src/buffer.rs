//! Replay buffer
//!
//! A fixed-capacity rolling store of the most recently captured frames.
//! The buffer continuously ingests from the frame source; starting a
//! recording snapshots its contents as the seed of the output video.

use parking_lot::Mutex;

/// A single captured frame held by the replay buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Encoded image payload as delivered by the frame source
    pub payload: Vec<u8>,

    /// Capture timestamp (unix milliseconds, wall-clock derived)
    pub timestamp_ms: u64,

    /// Ingestion order within the current buffer epoch
    pub sequence: u64,
}

/// Ring state guarded by the buffer mutex
struct Ring {
    slots: Vec<Option<Frame>>,
    cursor: usize,
    full: bool,
    next_sequence: u64,
}

/// Fixed-capacity rolling frame store.
///
/// `push`, `snapshot`, and `clear` are mutually exclusive; concurrently
/// dispatched insertions apply one at a time, and a snapshot never
/// observes a partially applied push.
pub struct ReplayBuffer {
    capacity: usize,
    ring: Mutex<Ring>,
}

impl ReplayBuffer {
    /// Create a buffer holding at most `capacity` frames
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "replay buffer capacity must be non-zero");
        Self {
            capacity,
            ring: Mutex::new(Ring {
                slots: (0..capacity).map(|_| None).collect(),
                cursor: 0,
                full: false,
                next_sequence: 0,
            }),
        }
    }

    /// Maximum number of frames the buffer retains
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of frames currently held
    pub fn len(&self) -> usize {
        let ring = self.ring.lock();
        if ring.full {
            self.capacity
        } else {
            ring.cursor
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert a frame, evicting the oldest one once the buffer is full.
    ///
    /// Always succeeds; assigns the next sequence number of the current
    /// epoch.
    pub fn push(&self, payload: Vec<u8>, timestamp_ms: u64) {
        let mut ring = self.ring.lock();

        let sequence = ring.next_sequence;
        ring.next_sequence += 1;

        let cursor = ring.cursor;
        ring.slots[cursor] = Some(Frame {
            payload,
            timestamp_ms,
            sequence,
        });

        ring.cursor = (cursor + 1) % self.capacity;
        if ring.cursor == 0 {
            ring.full = true;
        }
    }

    /// Point-in-time copy of the buffered frames, oldest to newest.
    ///
    /// When the ring has wrapped this unwraps it: the slice from the
    /// cursor to the end precedes the slice from the start to the cursor.
    pub fn snapshot(&self) -> Vec<Frame> {
        let ring = self.ring.lock();

        let ordered: Vec<&Option<Frame>> = if ring.full {
            ring.slots[ring.cursor..]
                .iter()
                .chain(ring.slots[..ring.cursor].iter())
                .collect()
        } else {
            ring.slots[..ring.cursor].iter().collect()
        };

        ordered.into_iter().flatten().cloned().collect()
    }

    /// Drop all held frames and start a new epoch.
    ///
    /// Resets the cursor, the fullness flag, and the sequence counter.
    pub fn clear(&self) {
        let mut ring = self.ring.lock();
        for slot in ring.slots.iter_mut() {
            *slot = None;
        }
        ring.cursor = 0;
        ring.full = false;
        ring.next_sequence = 0;
        tracing::debug!("Replay buffer cleared");
    }
}
