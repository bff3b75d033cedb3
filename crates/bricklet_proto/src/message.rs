use serde::Serialize;

use crate::value::WireValue;
use crate::{FRAME_END, LONG_FRAME, SHORT_FRAME};

pub const OP_CHUNK_CODE: u8 = 1;
pub const OP_DELETE_CHUNK: u8 = 2;
pub const OP_START_CHUNK: u8 = 3;
pub const OP_STOP_CHUNK: u8 = 4;
pub const OP_START_ALL: u8 = 5;
pub const OP_STOP_ALL: u8 = 6;
pub const OP_GET_VAR: u8 = 7;
pub const OP_SET_VAR: u8 = 8;
pub const OP_GET_VERSION: u8 = 12;
pub const OP_GET_ALL_CODE: u8 = 13;
pub const OP_DELETE_ALL_CODE: u8 = 14;
pub const OP_SYSTEM_RESET: u8 = 15;
pub const OP_TASK_STARTED: u8 = 16;
pub const OP_TASK_DONE: u8 = 17;
pub const OP_TASK_RETURNED_VALUE: u8 = 18;
pub const OP_TASK_ERROR: u8 = 19;
pub const OP_OUTPUT_VALUE: u8 = 20;
pub const OP_VAR_VALUE: u8 = 21;
pub const OP_VERSION: u8 = 22;
pub const OP_PING: u8 = 26;
pub const OP_BROADCAST: u8 = 27;
pub const OP_CHUNK_ATTRIBUTE: u8 = 28;

/// Kind of compiled chunk, carried in the first body byte of `chunkCode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ChunkType {
    Command = 1,
    Reporter = 2,
    FunctionHat = 3,
    WhenStarted = 4,
    WhenCondition = 5,
    WhenBroadcastReceived = 6,
}

impl ChunkType {
    pub fn from_u8(byte: u8) -> Option<ChunkType> {
        match byte {
            1 => Some(ChunkType::Command),
            2 => Some(ChunkType::Reporter),
            3 => Some(ChunkType::FunctionHat),
            4 => Some(ChunkType::WhenStarted),
            5 => Some(ChunkType::WhenCondition),
            6 => Some(ChunkType::WhenBroadcastReceived),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FrameError {
    UnknownOpcode(u8),
    BadChunkType(u8),
    BadValueTag(u8),
    BadString,
    TruncatedBody,
    BadLength,
    BadTerminator(u8),
}

/// One protocol message, independent of its frame encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Message {
    ChunkCode {
        chunk_id: u8,
        chunk_type: ChunkType,
        code: Vec<u8>,
    },
    DeleteChunk { chunk_id: u8 },
    StartChunk { chunk_id: u8 },
    StopChunk { chunk_id: u8 },
    StartAll,
    StopAll,
    GetVar { var_id: u8 },
    SetVar { var_id: u8, value: WireValue },
    GetVersion,
    GetAllCode,
    DeleteAllCode,
    SystemReset,
    TaskStarted { chunk_id: u8 },
    TaskDone { chunk_id: u8 },
    TaskReturnedValue { chunk_id: u8, value: WireValue },
    TaskError { chunk_id: u8, error: u8 },
    OutputValue { chunk_id: u8, value: WireValue },
    VarValue { var_id: u8, value: WireValue },
    Version { version: String },
    Ping,
    Broadcast { name: String },
    ChunkAttribute {
        chunk_id: u8,
        attribute: u8,
        data: Vec<u8>,
    },
}

impl Message {
    /// Serialize to the on-wire byte form. Bodyless messages use the
    /// three-byte short frame; everything else the length-prefixed long one.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Message::ChunkCode { chunk_id, chunk_type, code } => {
                let mut body = Vec::with_capacity(code.len() + 1);
                body.push(*chunk_type as u8);
                body.extend_from_slice(code);
                long_frame(OP_CHUNK_CODE, *chunk_id, &body)
            }
            Message::DeleteChunk { chunk_id } => short_frame(OP_DELETE_CHUNK, *chunk_id),
            Message::StartChunk { chunk_id } => short_frame(OP_START_CHUNK, *chunk_id),
            Message::StopChunk { chunk_id } => short_frame(OP_STOP_CHUNK, *chunk_id),
            Message::StartAll => short_frame(OP_START_ALL, 0),
            Message::StopAll => short_frame(OP_STOP_ALL, 0),
            Message::GetVar { var_id } => short_frame(OP_GET_VAR, *var_id),
            Message::SetVar { var_id, value } => {
                let mut body = Vec::new();
                value.encode_into(&mut body);
                long_frame(OP_SET_VAR, *var_id, &body)
            }
            Message::GetVersion => short_frame(OP_GET_VERSION, 0),
            Message::GetAllCode => short_frame(OP_GET_ALL_CODE, 0),
            Message::DeleteAllCode => short_frame(OP_DELETE_ALL_CODE, 0),
            Message::SystemReset => short_frame(OP_SYSTEM_RESET, 0),
            Message::TaskStarted { chunk_id } => short_frame(OP_TASK_STARTED, *chunk_id),
            Message::TaskDone { chunk_id } => short_frame(OP_TASK_DONE, *chunk_id),
            Message::TaskReturnedValue { chunk_id, value } => {
                let mut body = Vec::new();
                value.encode_into(&mut body);
                long_frame(OP_TASK_RETURNED_VALUE, *chunk_id, &body)
            }
            Message::TaskError { chunk_id, error } => {
                long_frame(OP_TASK_ERROR, *chunk_id, &[*error])
            }
            Message::OutputValue { chunk_id, value } => {
                let mut body = Vec::new();
                value.encode_into(&mut body);
                long_frame(OP_OUTPUT_VALUE, *chunk_id, &body)
            }
            Message::VarValue { var_id, value } => {
                let mut body = Vec::new();
                value.encode_into(&mut body);
                long_frame(OP_VAR_VALUE, *var_id, &body)
            }
            Message::Version { version } => {
                let mut body = Vec::new();
                WireValue::Str(version.clone()).encode_into(&mut body);
                long_frame(OP_VERSION, 0, &body)
            }
            Message::Ping => short_frame(OP_PING, 0),
            Message::Broadcast { name } => long_frame(OP_BROADCAST, 0, name.as_bytes()),
            Message::ChunkAttribute { chunk_id, attribute, data } => {
                let mut body = Vec::with_capacity(data.len() + 1);
                body.push(*attribute);
                body.extend_from_slice(data);
                long_frame(OP_CHUNK_ATTRIBUTE, *chunk_id, &body)
            }
        }
    }

    /// Rebuild a message from a frame's opcode, id byte, and body. Short
    /// frames pass an empty body. Either frame shape is accepted for any
    /// opcode; the opcode alone decides the interpretation.
    pub fn decode(opcode: u8, id: u8, body: &[u8]) -> Result<Message, FrameError> {
        match opcode {
            OP_CHUNK_CODE => {
                let (&type_byte, code) = body.split_first().ok_or(FrameError::TruncatedBody)?;
                let chunk_type =
                    ChunkType::from_u8(type_byte).ok_or(FrameError::BadChunkType(type_byte))?;
                Ok(Message::ChunkCode {
                    chunk_id: id,
                    chunk_type,
                    code: code.to_vec(),
                })
            }
            OP_DELETE_CHUNK => Ok(Message::DeleteChunk { chunk_id: id }),
            OP_START_CHUNK => Ok(Message::StartChunk { chunk_id: id }),
            OP_STOP_CHUNK => Ok(Message::StopChunk { chunk_id: id }),
            OP_START_ALL => Ok(Message::StartAll),
            OP_STOP_ALL => Ok(Message::StopAll),
            OP_GET_VAR => Ok(Message::GetVar { var_id: id }),
            OP_SET_VAR => Ok(Message::SetVar {
                var_id: id,
                value: WireValue::decode(body)?,
            }),
            OP_GET_VERSION => Ok(Message::GetVersion),
            OP_GET_ALL_CODE => Ok(Message::GetAllCode),
            OP_DELETE_ALL_CODE => Ok(Message::DeleteAllCode),
            OP_SYSTEM_RESET => Ok(Message::SystemReset),
            OP_TASK_STARTED => Ok(Message::TaskStarted { chunk_id: id }),
            OP_TASK_DONE => Ok(Message::TaskDone { chunk_id: id }),
            OP_TASK_RETURNED_VALUE => Ok(Message::TaskReturnedValue {
                chunk_id: id,
                value: WireValue::decode(body)?,
            }),
            OP_TASK_ERROR => {
                let &error = body.first().ok_or(FrameError::TruncatedBody)?;
                Ok(Message::TaskError { chunk_id: id, error })
            }
            OP_OUTPUT_VALUE => Ok(Message::OutputValue {
                chunk_id: id,
                value: WireValue::decode(body)?,
            }),
            OP_VAR_VALUE => Ok(Message::VarValue {
                var_id: id,
                value: WireValue::decode(body)?,
            }),
            OP_VERSION => match WireValue::decode(body)? {
                WireValue::Str(version) => Ok(Message::Version { version }),
                _ => Err(FrameError::BadString),
            },
            OP_PING => Ok(Message::Ping),
            OP_BROADCAST => {
                let name = std::str::from_utf8(body).map_err(|_| FrameError::BadString)?;
                Ok(Message::Broadcast { name: name.to_string() })
            }
            OP_CHUNK_ATTRIBUTE => {
                let (&attribute, data) = body.split_first().ok_or(FrameError::TruncatedBody)?;
                Ok(Message::ChunkAttribute {
                    chunk_id: id,
                    attribute,
                    data: data.to_vec(),
                })
            }
            other => Err(FrameError::UnknownOpcode(other)),
        }
    }
}

fn short_frame(opcode: u8, id: u8) -> Vec<u8> {
    vec![SHORT_FRAME, opcode, id]
}

fn long_frame(opcode: u8, id: u8, body: &[u8]) -> Vec<u8> {
    // The length field counts the body plus the trailing terminator byte.
    let len = body.len() + 1;
    let mut frame = Vec::with_capacity(5 + len);
    frame.push(LONG_FRAME);
    frame.push(opcode);
    frame.push(id);
    frame.push((len & 0xFF) as u8);
    frame.push((len >> 8) as u8);
    frame.extend_from_slice(body);
    frame.push(FRAME_END);
    frame
}
