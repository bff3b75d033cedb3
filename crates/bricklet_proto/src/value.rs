use serde::Serialize;

use crate::message::FrameError;

/// A typed value carried in the body of `setVar`, `getVar` replies,
/// `outputValue`, `taskReturnedValue`, and `version` frames.
///
/// The body encoding is a one-byte type tag followed by the payload:
/// integers are 4 bytes little-endian, booleans a single 0/1 byte, strings
/// and byte arrays run to the end of the frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum WireValue {
    Int(i32),
    Str(String),
    Bool(bool),
    Bytes(Vec<u8>),
}

const TAG_INT: u8 = 1;
const TAG_STRING: u8 = 2;
const TAG_BOOL: u8 = 3;
const TAG_BYTES: u8 = 4;

impl WireValue {
    pub fn encode_into(&self, body: &mut Vec<u8>) {
        match self {
            WireValue::Int(n) => {
                body.push(TAG_INT);
                body.extend_from_slice(&n.to_le_bytes());
            }
            WireValue::Str(s) => {
                body.push(TAG_STRING);
                body.extend_from_slice(s.as_bytes());
            }
            WireValue::Bool(b) => {
                body.push(TAG_BOOL);
                body.push(u8::from(*b));
            }
            WireValue::Bytes(bytes) => {
                body.push(TAG_BYTES);
                body.extend_from_slice(bytes);
            }
        }
    }

    pub fn decode(body: &[u8]) -> Result<WireValue, FrameError> {
        let (&tag, payload) = body.split_first().ok_or(FrameError::TruncatedBody)?;
        match tag {
            TAG_INT => {
                let bytes: [u8; 4] = payload
                    .get(..4)
                    .and_then(|b| b.try_into().ok())
                    .ok_or(FrameError::TruncatedBody)?;
                Ok(WireValue::Int(i32::from_le_bytes(bytes)))
            }
            TAG_STRING => {
                let text = std::str::from_utf8(payload).map_err(|_| FrameError::BadString)?;
                Ok(WireValue::Str(text.to_string()))
            }
            TAG_BOOL => {
                let &byte = payload.first().ok_or(FrameError::TruncatedBody)?;
                Ok(WireValue::Bool(byte != 0))
            }
            TAG_BYTES => Ok(WireValue::Bytes(payload.to_vec())),
            other => Err(FrameError::BadValueTag(other)),
        }
    }
}
