pub mod frame;
pub mod reassembly;

pub use frame::{encode_frames, split_payload, Frame, DEFAULT_TOPIC, MAX_FRAME_BYTES, MAX_TOPIC_BYTES};
pub use reassembly::Reassembler;
