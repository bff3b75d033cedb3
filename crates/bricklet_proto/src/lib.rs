//! Bricklet wire protocol: framed messages over a point-to-point serial link.
//!
//! Both the device firmware and the host tooling speak this protocol, so the
//! frame layout lives in its own crate with no I/O of its own.

mod message;
mod reader;
mod value;

pub use message::{ChunkType, FrameError, Message};
pub use reader::{FrameReader, ReadEvent};
pub use value::WireValue;

/// Lead byte of a three-byte short frame.
pub const SHORT_FRAME: u8 = 250;
/// Lead byte of a length-prefixed long frame.
pub const LONG_FRAME: u8 = 251;
/// Final byte of every long frame; counted by the length field.
pub const FRAME_END: u8 = 254;
