use crate::message::{FrameError, Message};
use crate::{FRAME_END, LONG_FRAME, SHORT_FRAME};

/// Incremental frame parser over a rolling byte buffer.
///
/// Bytes arrive from the serial link in arbitrary slices; `push` accumulates
/// them and `next` pops complete frames. A non-sentinel byte at the read
/// cursor means the stream lost sync: everything up to the next sentinel is
/// discarded (or the whole buffer when none is present), so a valid frame
/// trailing the junk is still dispatched.
#[derive(Debug, Default)]
pub struct FrameReader {
    buf: Vec<u8>,
}

/// Outcome of one `next` step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadEvent {
    Frame(Message),
    /// Bytes discarded while resynchronizing.
    Junk { dropped: usize },
    /// A structurally complete frame that failed to decode, or a corrupt
    /// long frame. The offending bytes have been drained.
    Malformed(FrameError),
}

impl FrameReader {
    pub fn new() -> FrameReader {
        FrameReader { buf: Vec::new() }
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Pop the next event, or None when the buffer holds no complete frame.
    pub fn next(&mut self) -> Option<ReadEvent> {
        let &lead = self.buf.first()?;
        match lead {
            SHORT_FRAME => self.next_short(),
            LONG_FRAME => self.next_long(),
            _ => Some(self.resync()),
        }
    }

    fn next_short(&mut self) -> Option<ReadEvent> {
        if self.buf.len() < 3 {
            return None;
        }
        let opcode = self.buf[1];
        let id = self.buf[2];
        self.buf.drain(..3);
        Some(match Message::decode(opcode, id, &[]) {
            Ok(msg) => ReadEvent::Frame(msg),
            Err(err) => ReadEvent::Malformed(err),
        })
    }

    fn next_long(&mut self) -> Option<ReadEvent> {
        if self.buf.len() < 5 {
            return None;
        }
        let opcode = self.buf[1];
        let id = self.buf[2];
        // Length covers the body plus the trailing terminator, so zero can
        // only come from a corrupted stream.
        let body_bytes = self.buf[3] as usize | ((self.buf[4] as usize) << 8);
        if body_bytes == 0 {
            self.buf.clear();
            return Some(ReadEvent::Malformed(FrameError::BadLength));
        }
        let total = 5 + body_bytes;
        if self.buf.len() < total {
            return None;
        }
        let terminator = self.buf[total - 1];
        if terminator != FRAME_END {
            self.buf.clear();
            return Some(ReadEvent::Malformed(FrameError::BadTerminator(terminator)));
        }
        let result = Message::decode(opcode, id, &self.buf[5..total - 1]);
        self.buf.drain(..total);
        Some(match result {
            Ok(msg) => ReadEvent::Frame(msg),
            Err(err) => ReadEvent::Malformed(err),
        })
    }

    fn resync(&mut self) -> ReadEvent {
        let next_sentinel = self
            .buf
            .iter()
            .position(|&b| b == SHORT_FRAME || b == LONG_FRAME);
        let dropped = next_sentinel.unwrap_or(self.buf.len());
        self.buf.drain(..dropped);
        ReadEvent::Junk { dropped }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Message, WireValue};

    fn frames(reader: &mut FrameReader) -> Vec<ReadEvent> {
        let mut events = Vec::new();
        while let Some(event) = reader.next() {
            events.push(event);
        }
        events
    }

    #[test]
    fn parses_a_short_frame() {
        let mut reader = FrameReader::new();
        reader.push(&[250, 26, 0]);
        assert_eq!(frames(&mut reader), vec![ReadEvent::Frame(Message::Ping)]);
    }

    #[test]
    fn waits_for_a_complete_frame() {
        let mut reader = FrameReader::new();
        reader.push(&[251, 18, 7, 6, 0, 1]);
        assert_eq!(reader.next(), None);
        reader.push(&[42, 0, 0, 0, 254]);
        assert_eq!(
            frames(&mut reader),
            vec![ReadEvent::Frame(Message::TaskReturnedValue {
                chunk_id: 7,
                value: WireValue::Int(42),
            })]
        );
    }

    #[test]
    fn split_byte_by_byte_delivery() {
        let mut reader = FrameReader::new();
        let bytes = Message::Broadcast { name: "go".into() }.encode();
        let mut seen = Vec::new();
        for byte in bytes {
            reader.push(&[byte]);
            seen.extend(frames(&mut reader));
        }
        assert_eq!(
            seen,
            vec![ReadEvent::Frame(Message::Broadcast { name: "go".into() })]
        );
    }

    #[test]
    fn junk_is_discarded_then_valid_frame_dispatched() {
        // Scenario: arbitrary garbage followed by a valid short message.
        let mut reader = FrameReader::new();
        reader.push(&[0x00, 0xFF, 0x42, 250, 26, 0]);
        assert_eq!(
            frames(&mut reader),
            vec![
                ReadEvent::Junk { dropped: 3 },
                ReadEvent::Frame(Message::Ping),
            ]
        );
    }

    #[test]
    fn junk_without_sentinel_clears_buffer() {
        let mut reader = FrameReader::new();
        reader.push(&[1, 2, 3, 4]);
        assert_eq!(frames(&mut reader), vec![ReadEvent::Junk { dropped: 4 }]);
        assert_eq!(reader.buffered(), 0);
    }

    #[test]
    fn bad_terminator_forces_resync() {
        let mut reader = FrameReader::new();
        let mut bytes = Message::TaskError { chunk_id: 1, error: 10 }.encode();
        *bytes.last_mut().unwrap() = 0x17;
        bytes.extend_from_slice(&[250, 26, 0]); // lost along with the bad frame
        reader.push(&bytes);
        assert_eq!(
            frames(&mut reader),
            vec![ReadEvent::Malformed(FrameError::BadTerminator(0x17))]
        );
        assert_eq!(reader.buffered(), 0);
    }

    #[test]
    fn zero_length_long_frame_is_malformed() {
        let mut reader = FrameReader::new();
        reader.push(&[251, 1, 0, 0, 0]);
        assert_eq!(
            frames(&mut reader),
            vec![ReadEvent::Malformed(FrameError::BadLength)]
        );
    }

    #[test]
    fn unknown_opcode_drains_only_its_frame() {
        let mut reader = FrameReader::new();
        reader.push(&[250, 99, 0, 250, 26, 0]);
        assert_eq!(
            frames(&mut reader),
            vec![
                ReadEvent::Malformed(FrameError::UnknownOpcode(99)),
                ReadEvent::Frame(Message::Ping),
            ]
        );
    }

    #[test]
    fn back_to_back_frames() {
        let mut reader = FrameReader::new();
        let mut bytes = Message::TaskStarted { chunk_id: 0 }.encode();
        bytes.extend(Message::TaskDone { chunk_id: 0 }.encode());
        reader.push(&bytes);
        assert_eq!(
            frames(&mut reader),
            vec![
                ReadEvent::Frame(Message::TaskStarted { chunk_id: 0 }),
                ReadEvent::Frame(Message::TaskDone { chunk_id: 0 }),
            ]
        );
    }
}
