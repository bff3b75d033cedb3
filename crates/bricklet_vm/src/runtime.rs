//! Device half of the wire protocol: chunk storage, task lifecycle
//! notifications, and the receive loop over the serial byte stream.
//!
//! The bytecode interpreter is pluggable through [`Executor`]; tasks run
//! synchronously at a primitive-call granularity, so every `startChunk`
//! produces its `taskStarted` and terminal frame back-to-back.

use std::collections::BTreeMap;

use bricklet_proto::{ChunkType, FrameReader, Message, ReadEvent};

use crate::error::ErrorCode;
use crate::value::Obj;
use crate::vm::{obj_to_wire, wire_to_obj, Vm};

pub const VERSION_STRING: &str = "bricklet-vm 0.1.0";
/// `outputValue` frames with this chunk id are plain console output.
pub const STDOUT_CHUNK: u8 = 255;

/// One stored unit of compiled code, as uploaded by `chunkCode`.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub chunk_type: ChunkType,
    pub code: Vec<u8>,
    pub attributes: Vec<(u8, Vec<u8>)>,
}

pub enum TaskResult {
    Done,
    Value(Obj),
}

/// The interpreter seam. Implementations receive the chunk's bytecode and
/// the VM (memory, primitives' shared state) and either complete, produce a
/// value, or fail with an error code.
pub trait Executor {
    fn run(&mut self, chunk_id: u8, chunk: &Chunk, vm: &mut Vm) -> Result<TaskResult, ErrorCode>;
}

/// Executor that treats every chunk as an empty script.
pub struct NoopExecutor;

impl Executor for NoopExecutor {
    fn run(&mut self, _chunk_id: u8, _chunk: &Chunk, _vm: &mut Vm) -> Result<TaskResult, ErrorCode> {
        Ok(TaskResult::Done)
    }
}

impl<F> Executor for F
where
    F: FnMut(u8, &Chunk, &mut Vm) -> Result<TaskResult, ErrorCode>,
{
    fn run(&mut self, chunk_id: u8, chunk: &Chunk, vm: &mut Vm) -> Result<TaskResult, ErrorCode> {
        self(chunk_id, chunk, vm)
    }
}

pub struct DeviceRuntime<E> {
    vm: Vm,
    executor: E,
    chunks: BTreeMap<u8, Chunk>,
    reader: FrameReader,
    outgoing: Vec<u8>,
    framing_errors: usize,
}

impl<E: Executor> DeviceRuntime<E> {
    pub fn new(vm: Vm, executor: E) -> DeviceRuntime<E> {
        DeviceRuntime {
            vm,
            executor,
            chunks: BTreeMap::new(),
            reader: FrameReader::new(),
            outgoing: Vec::new(),
            framing_errors: 0,
        }
    }

    pub fn vm(&self) -> &Vm {
        &self.vm
    }

    pub fn vm_mut(&mut self) -> &mut Vm {
        &mut self.vm
    }

    pub fn chunk(&self, chunk_id: u8) -> Option<&Chunk> {
        self.chunks.get(&chunk_id)
    }

    /// Count of resynchronizations and malformed frames seen so far.
    pub fn framing_errors(&self) -> usize {
        self.framing_errors
    }

    /// Accumulate raw serial bytes and dispatch every complete frame.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.reader.push(bytes);
        while let Some(event) = self.reader.next() {
            match event {
                ReadEvent::Frame(msg) => self.handle_message(&msg),
                ReadEvent::Junk { .. } | ReadEvent::Malformed(_) => {
                    self.framing_errors += 1;
                }
            }
        }
    }

    /// Frames queued for the host since the last call.
    pub fn take_outgoing(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.outgoing)
    }

    /// Emit a broadcast originated on the device (e.g. by a primitive).
    pub fn send_broadcast(&mut self, name: &str) {
        self.send(&Message::Broadcast { name: name.to_string() });
    }

    /// Flush output produced outside any task as plain console output.
    pub fn flush_stdout(&mut self) {
        self.drain_output(STDOUT_CHUNK);
    }

    pub fn handle_message(&mut self, msg: &Message) {
        match msg {
            Message::ChunkCode { chunk_id, chunk_type, code } => {
                self.chunks.insert(
                    *chunk_id,
                    Chunk {
                        chunk_type: *chunk_type,
                        code: code.clone(),
                        attributes: Vec::new(),
                    },
                );
            }
            Message::DeleteChunk { chunk_id } => {
                self.chunks.remove(chunk_id);
            }
            Message::StartChunk { chunk_id } => self.run_chunk(*chunk_id),
            Message::StopChunk { .. } | Message::StopAll => {
                // Tasks run to completion inside run_chunk, so there is
                // nothing in flight to halt at a dispatch boundary.
            }
            Message::StartAll => {
                let ids: Vec<u8> = self
                    .chunks
                    .iter()
                    .filter(|(_, c)| c.chunk_type == ChunkType::WhenStarted)
                    .map(|(&id, _)| id)
                    .collect();
                for id in ids {
                    self.run_chunk(id);
                }
            }
            Message::GetVar { var_id } => {
                if let Some(value) = self.vm.mem.var(*var_id as usize) {
                    let wire = obj_to_wire(&self.vm.mem, value);
                    self.send(&Message::VarValue { var_id: *var_id, value: wire });
                }
            }
            Message::SetVar { var_id, value } => match wire_to_obj(&mut self.vm.mem, value) {
                Some(obj) => {
                    self.vm.mem.set_var(*var_id as usize, obj);
                }
                None => self.send(&Message::TaskError {
                    chunk_id: *var_id,
                    error: ErrorCode::InsufficientMemoryError.as_u8(),
                }),
            },
            Message::GetVersion => {
                self.send(&Message::Version { version: VERSION_STRING.to_string() });
            }
            Message::GetAllCode => {
                let replay: Vec<Message> = self
                    .chunks
                    .iter()
                    .map(|(&chunk_id, chunk)| Message::ChunkCode {
                        chunk_id,
                        chunk_type: chunk.chunk_type,
                        code: chunk.code.clone(),
                    })
                    .collect();
                for msg in &replay {
                    self.send(msg);
                }
            }
            Message::DeleteAllCode => {
                self.chunks.clear();
                self.vm.mem.clear();
                self.vm.mem.reset_vars();
            }
            Message::SystemReset => {
                self.chunks.clear();
                self.vm.mem.clear();
                self.vm.mem.reset_vars();
                self.vm.radio.shut_down();
            }
            Message::Ping => self.send(&Message::Ping),
            Message::Broadcast { .. } => {
                // Which hat matches the broadcast name is decided by the
                // bytecode; every broadcast hat gets a chance to run.
                let ids: Vec<u8> = self
                    .chunks
                    .iter()
                    .filter(|(_, c)| c.chunk_type == ChunkType::WhenBroadcastReceived)
                    .map(|(&id, _)| id)
                    .collect();
                for id in ids {
                    self.run_chunk(id);
                }
            }
            Message::ChunkAttribute { chunk_id, attribute, data } => {
                if let Some(chunk) = self.chunks.get_mut(chunk_id) {
                    chunk.attributes.push((*attribute, data.clone()));
                }
            }
            // Device-to-host notifications arriving here mean an echo or a
            // confused peer; drop them.
            Message::TaskStarted { .. }
            | Message::TaskDone { .. }
            | Message::TaskReturnedValue { .. }
            | Message::TaskError { .. }
            | Message::OutputValue { .. }
            | Message::VarValue { .. }
            | Message::Version { .. } => {}
        }
    }

    fn run_chunk(&mut self, chunk_id: u8) {
        let Some(chunk) = self.chunks.get(&chunk_id).cloned() else {
            self.send(&Message::TaskError {
                chunk_id,
                error: ErrorCode::BadChunkIndexError.as_u8(),
            });
            return;
        };
        self.send(&Message::TaskStarted { chunk_id });
        let result = self.executor.run(chunk_id, &chunk, &mut self.vm);
        self.drain_output(chunk_id);
        match result {
            Ok(TaskResult::Done) => self.send(&Message::TaskDone { chunk_id }),
            Ok(TaskResult::Value(obj)) => {
                let value = obj_to_wire(&self.vm.mem, obj);
                self.send(&Message::TaskReturnedValue { chunk_id, value });
            }
            Err(code) => self.send(&Message::TaskError { chunk_id, error: code.as_u8() }),
        }
    }

    fn drain_output(&mut self, chunk_id: u8) {
        for value in self.vm.take_output() {
            self.send(&Message::OutputValue { chunk_id, value });
        }
    }

    fn send(&mut self, msg: &Message) {
        self.outgoing.extend(msg.encode());
    }
}
