use super::frame::Frame;
use log::debug;
use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

pub const DEFAULT_FRAME_TIMEOUT: Duration = Duration::from_secs(2);
pub const MIN_FRAME_TIMEOUT: Duration = Duration::from_millis(100);

/// Chunks received so far for one topic
#[derive(Debug)]
struct Bucket {
    expected_total: u8,
    chunks: BTreeMap<u8, Vec<u8>>,
    last_touched: Instant,
}

impl Bucket {
    fn new(expected_total: u8, now: Instant) -> Self {
        Self {
            expected_total,
            chunks: BTreeMap::new(),
            last_touched: now,
        }
    }

    fn is_complete(&self) -> bool {
        self.chunks.len() == self.expected_total as usize
            && self.chunks.keys().copied().eq(1..=self.expected_total)
    }

    fn concat(self) -> Vec<u8> {
        let size = self.chunks.values().map(Vec::len).sum();
        let mut out = Vec::with_capacity(size);
        for chunk in self.chunks.into_values() {
            out.extend_from_slice(&chunk);
        }
        out
    }
}

/// Rebuilds messages from frames arriving in any order.
///
/// One bucket per topic. A frame announcing a different total than the
/// bucket expects starts a new message and discards the old one. Buckets
/// that go quiet for longer than the timeout are dropped by [`sweep`].
///
/// [`sweep`]: Reassembler::sweep
#[derive(Debug)]
pub struct Reassembler {
    pending: HashMap<String, Bucket>,
    timeout: Duration,
}

impl Reassembler {
    pub fn new(timeout: Duration) -> Self {
        Self {
            pending: HashMap::new(),
            timeout: timeout.max(MIN_FRAME_TIMEOUT),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Number of messages still waiting for frames
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Feed one frame; returns the whole message once its last frame lands
    pub fn push(&mut self, frame: Frame, now: Instant) -> Option<Vec<u8>> {
        let total = frame.total.max(1);
        let index = frame.index;
        if index < 1 || index > total {
            debug!(target: "lora", "Dropping frame {}/{} for '{}'", index, total, frame.topic);
            return None;
        }

        let bucket = self
            .pending
            .entry(frame.topic.clone())
            .or_insert_with(|| Bucket::new(total, now));
        if bucket.expected_total != total {
            debug!(
                target: "lora",
                "Topic '{}' restarted with {} frames (was {}), discarding partial message",
                frame.topic, total, bucket.expected_total
            );
            *bucket = Bucket::new(total, now);
        }

        // Last writer wins on a repeated index
        if bucket.chunks.insert(index, frame.chunk).is_some() {
            debug!(target: "lora", "Duplicate frame {}/{} for '{}'", index, total, frame.topic);
        }
        bucket.last_touched = now;

        if !bucket.is_complete() {
            return None;
        }
        self.pending.remove(&frame.topic).map(Bucket::concat)
    }

    /// Drop buckets that have not seen a frame within the timeout
    pub fn sweep(&mut self, now: Instant) -> usize {
        let before = self.pending.len();
        let timeout = self.timeout;
        self.pending.retain(|topic, bucket| {
            let keep = now.saturating_duration_since(bucket.last_touched) <= timeout;
            if !keep {
                debug!(
                    target: "lora",
                    "Evicting stale message for '{}' ({}/{} frames)",
                    topic,
                    bucket.chunks.len(),
                    bucket.expected_total
                );
            }
            keep
        });
        before - self.pending.len()
    }
}

impl Default for Reassembler {
    fn default() -> Self {
        Self::new(DEFAULT_FRAME_TIMEOUT)
    }
}
