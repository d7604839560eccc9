//! Wire frame for the narrowband link.
//!
//! ```text
//! +-----+-----------+------------------+-------+-------+-------------+
//! | 'J' | topic_len | topic (<=15 B)   | index | total | chunk ...   |
//! +-----+-----------+------------------+-------+-------+-------------+
//! ```
//!
//! `index` is 1-based. A message is split into `total` frames that each fit
//! in the radio's maximum transport unit.

use crate::error::FrameError;

pub const MAGIC: u8 = b'J';
pub const MAX_FRAME_BYTES: usize = 200;
pub const MAX_TOPIC_BYTES: usize = 15;
pub const MAX_CHUNKS: usize = u8::MAX as usize;
pub const DEFAULT_TOPIC: &str = "sensors";

/// Shortest buffer that can hold a header with an empty topic
const MIN_FRAME_BYTES: usize = 5;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub topic: String,
    pub index: u8,
    pub total: u8,
    pub chunk: Vec<u8>,
}

impl Frame {
    pub fn header_len(topic: &str) -> usize {
        4 + topic.len()
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::header_len(&self.topic) + self.chunk.len());
        out.push(MAGIC);
        out.push(self.topic.len() as u8);
        out.extend_from_slice(self.topic.as_bytes());
        out.push(self.index);
        out.push(self.total);
        out.extend_from_slice(&self.chunk);
        out
    }

    /// Parse one received buffer. Returns `None` for anything that is not a
    /// well-formed frame; the caller decides whether to log it.
    pub fn decode(buf: &[u8]) -> Option<Frame> {
        if buf.len() < MIN_FRAME_BYTES || buf[0] != MAGIC {
            return None;
        }
        let topic_len = buf[1] as usize;
        let head = 2 + topic_len + 2;
        if head > buf.len() {
            return None;
        }
        let topic_bytes = &buf[2..2 + topic_len];
        let mut topic = ascii_only(topic_bytes);
        if topic.is_empty() {
            topic = DEFAULT_TOPIC.to_string();
        }
        Some(Frame {
            topic,
            index: buf[2 + topic_len].max(1),
            total: buf[3 + topic_len].max(1),
            chunk: buf[head..].to_vec(),
        })
    }
}

/// Reduce a topic to its ASCII characters, truncated to the wire limit
pub fn normalize_topic(topic: &str) -> String {
    let mut out: String = topic.chars().filter(|c| c.is_ascii()).collect();
    out.truncate(MAX_TOPIC_BYTES);
    out
}

fn ascii_only(bytes: &[u8]) -> String {
    bytes.iter().filter(|b| b.is_ascii()).map(|&b| b as char).collect()
}

/// Split `payload` into frames no longer than `max_frame` bytes.
///
/// An empty payload still produces one frame so the receiver sees the
/// message. Payloads that would need more than 255 frames are rejected.
pub fn split_payload(topic: &str, payload: &[u8], max_frame: usize) -> Result<Vec<Frame>, FrameError> {
    let topic = normalize_topic(topic);
    let room = max_frame.saturating_sub(Frame::header_len(&topic)).max(1);
    let chunks: Vec<&[u8]> = if payload.is_empty() {
        vec![&[][..]]
    } else {
        payload.chunks(room).collect()
    };
    if chunks.len() > MAX_CHUNKS {
        return Err(FrameError::PayloadTooLarge {
            chunks: chunks.len(),
            max: MAX_CHUNKS,
        });
    }
    let total = chunks.len() as u8;
    Ok(chunks
        .into_iter()
        .enumerate()
        .map(|(i, chunk)| Frame {
            topic: topic.clone(),
            index: (i + 1) as u8,
            total,
            chunk: chunk.to_vec(),
        })
        .collect())
}

/// Encode `payload` straight to wire buffers
pub fn encode_frames(topic: &str, payload: &[u8], max_frame: usize) -> Result<Vec<Vec<u8>>, FrameError> {
    Ok(split_payload(topic, payload, max_frame)?
        .iter()
        .map(Frame::encode)
        .collect())
}
