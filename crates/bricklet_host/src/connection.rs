use std::io::{self, Read, Write};
use std::time::{Duration, Instant};

use bricklet_proto::{ChunkType, FrameReader, Message, ReadEvent};
use log::{info, warn};

use crate::error::HostError;
use crate::events::HostEvents;

/// How often the host pings the device.
pub const PING_INTERVAL: Duration = Duration::from_millis(2000);
/// Silence longer than this (ping interval plus grace) means the board has
/// stopped responding.
pub const LIVENESS_WINDOW: Duration = Duration::from_millis(2200);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connected,
    NotConnected,
    BoardNotResponding,
}

/// A live link to one device over an ordered byte-stream transport.
///
/// The caller drives the connection by calling [`Connection::tick`] from its
/// event loop; time is passed in explicitly so liveness is testable.
pub struct Connection<T> {
    port: Option<T>,
    reader: FrameReader,
    last_ping: Option<Instant>,
    last_heard: Instant,
}

impl<T: Read + Write> Connection<T> {
    pub fn open(port: T, now: Instant) -> Connection<T> {
        Connection {
            port: Some(port),
            reader: FrameReader::new(),
            last_ping: None,
            last_heard: now,
        }
    }

    /// Liveness as of `now`: any frame heard within the window counts as
    /// proof of life; a lost or failed transport is `NotConnected`.
    pub fn status(&self, now: Instant) -> ConnectionStatus {
        if self.port.is_none() {
            return ConnectionStatus::NotConnected;
        }
        if now.duration_since(self.last_heard) <= LIVENESS_WINDOW {
            ConnectionStatus::Connected
        } else {
            ConnectionStatus::BoardNotResponding
        }
    }

    /// Send the periodic ping when due, drain incoming frames into the
    /// event hooks, and report the resulting status.
    pub fn tick(&mut self, now: Instant, events: &mut dyn HostEvents) -> ConnectionStatus {
        let ping_due = self
            .last_ping
            .map_or(true, |t| now.duration_since(t) >= PING_INTERVAL);
        if ping_due {
            if self.send(&Message::Ping).is_ok() {
                self.last_ping = Some(now);
            }
        }
        self.pump(now, events);
        self.status(now)
    }

    /// Read whatever the transport has buffered and dispatch it.
    pub fn pump(&mut self, now: Instant, events: &mut dyn HostEvents) {
        let mut chunk = [0u8; 256];
        loop {
            let Some(port) = self.port.as_mut() else {
                return;
            };
            match port.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => self.reader.push(&chunk[..n]),
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    warn!("serial read failed, closing port: {err}");
                    self.port = None;
                    break;
                }
            }
        }
        while let Some(event) = self.reader.next() {
            match event {
                ReadEvent::Frame(msg) => {
                    self.last_heard = now;
                    dispatch(&msg, events);
                }
                ReadEvent::Junk { dropped } => {
                    warn!("lost sync on serial stream, discarded {dropped} bytes");
                }
                ReadEvent::Malformed(err) => {
                    warn!("discarded malformed frame: {err:?}");
                }
            }
        }
    }

    pub fn send(&mut self, msg: &Message) -> Result<(), HostError> {
        let Some(port) = self.port.as_mut() else {
            return Err(HostError::PortClosed);
        };
        let bytes = msg.encode();
        match port.write_all(&bytes).and_then(|()| port.flush()) {
            Ok(()) => Ok(()),
            Err(err) => {
                warn!("serial write failed, closing port: {err}");
                self.port = None;
                Err(HostError::Io(err))
            }
        }
    }

    // Conveniences for the common host actions.

    pub fn send_chunk(&mut self, chunk_id: u8, chunk_type: ChunkType, code: Vec<u8>) -> Result<(), HostError> {
        self.send(&Message::ChunkCode { chunk_id, chunk_type, code })
    }

    pub fn start_chunk(&mut self, chunk_id: u8) -> Result<(), HostError> {
        self.send(&Message::StartChunk { chunk_id })
    }

    pub fn stop_all(&mut self) -> Result<(), HostError> {
        self.send(&Message::StopAll)
    }

    pub fn delete_all_code(&mut self) -> Result<(), HostError> {
        self.send(&Message::DeleteAllCode)
    }

    pub fn get_version(&mut self) -> Result<(), HostError> {
        self.send(&Message::GetVersion)
    }

    pub fn broadcast(&mut self, name: &str) -> Result<(), HostError> {
        self.send(&Message::Broadcast { name: name.to_string() })
    }
}

fn dispatch(msg: &Message, events: &mut dyn HostEvents) {
    match msg {
        Message::TaskStarted { chunk_id } => events.task_started(*chunk_id),
        Message::TaskDone { chunk_id } => events.task_done(*chunk_id),
        Message::TaskReturnedValue { chunk_id, value } => {
            events.task_returned_value(*chunk_id, value)
        }
        Message::TaskError { chunk_id, error } => events.task_error(*chunk_id, *error),
        Message::OutputValue { chunk_id, value } => events.output_value(*chunk_id, value),
        Message::VarValue { var_id, value } => events.var_value(*var_id, value),
        Message::Version { version } => {
            info!("device version: {version}");
            events.version(version);
        }
        Message::Broadcast { name } => events.broadcast_received(name),
        // The ping echo itself only feeds liveness.
        Message::Ping => {}
        // Host-to-device opcodes coming back are a confused peer; drop them.
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bricklet_proto::WireValue;
    use std::collections::VecDeque;

    /// In-memory transport: `inbox` plays the device's outgoing bytes,
    /// `sent` captures what the host wrote.
    #[derive(Default)]
    struct FakePort {
        inbox: VecDeque<u8>,
        sent: Vec<u8>,
        fail_writes: bool,
    }

    impl<'a> Read for &'a mut FakePort {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.inbox.is_empty() {
                return Err(io::Error::from(io::ErrorKind::WouldBlock));
            }
            let mut n = 0;
            while n < buf.len() {
                match self.inbox.pop_front() {
                    Some(byte) => {
                        buf[n] = byte;
                        n += 1;
                    }
                    None => break,
                }
            }
            Ok(n)
        }
    }

    impl<'a> Write for &'a mut FakePort {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.fail_writes {
                return Err(io::Error::from(io::ErrorKind::BrokenPipe));
            }
            self.sent.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct Recorder {
        started: Vec<u8>,
        done: Vec<u8>,
        returned: Vec<(u8, WireValue)>,
        errors: Vec<(u8, u8)>,
        outputs: Vec<(u8, WireValue)>,
        versions: Vec<String>,
        broadcasts: Vec<String>,
    }

    impl HostEvents for Recorder {
        fn task_started(&mut self, chunk_id: u8) {
            self.started.push(chunk_id);
        }
        fn task_done(&mut self, chunk_id: u8) {
            self.done.push(chunk_id);
        }
        fn task_returned_value(&mut self, chunk_id: u8, value: &WireValue) {
            self.returned.push((chunk_id, value.clone()));
        }
        fn task_error(&mut self, chunk_id: u8, error: u8) {
            self.errors.push((chunk_id, error));
        }
        fn output_value(&mut self, chunk_id: u8, value: &WireValue) {
            self.outputs.push((chunk_id, value.clone()));
        }
        fn version(&mut self, version: &str) {
            self.versions.push(version.to_string());
        }
        fn broadcast_received(&mut self, name: &str) {
            self.broadcasts.push(name.to_string());
        }
    }

    #[test]
    fn first_tick_sends_a_ping() {
        let mut port = FakePort::default();
        let now = Instant::now();
        let mut conn = Connection::open(&mut port, now);
        let mut events = Recorder::default();
        conn.tick(now, &mut events);
        drop(conn);
        assert_eq!(port.sent, vec![250, 26, 0]);
    }

    #[test]
    fn pings_repeat_on_the_interval() {
        let mut port = FakePort::default();
        let t0 = Instant::now();
        let mut conn = Connection::open(&mut port, t0);
        let mut events = Recorder::default();
        conn.tick(t0, &mut events);
        conn.tick(t0 + Duration::from_millis(500), &mut events);
        conn.tick(t0 + Duration::from_millis(1999), &mut events);
        conn.tick(t0 + Duration::from_millis(2050), &mut events);
        drop(conn);
        let ping = Message::Ping.encode();
        assert_eq!(port.sent, [ping.clone(), ping].concat());
    }

    #[test]
    fn echoed_pings_keep_the_board_alive() {
        let mut port = FakePort::default();
        let t0 = Instant::now();
        let mut conn = Connection::open(&mut port, t0);
        let mut events = Recorder::default();
        assert_eq!(conn.tick(t0, &mut events), ConnectionStatus::Connected);

        // The device echoes; at t0+2.1s we are still within the window.
        conn.port.as_mut().unwrap().inbox.extend(Message::Ping.encode());
        let t1 = t0 + Duration::from_millis(2100);
        assert_eq!(conn.tick(t1, &mut events), ConnectionStatus::Connected);

        // Silence from then on: 2.2s after the last echo the board is
        // reported as not responding.
        let t2 = t1 + Duration::from_millis(2300);
        assert_eq!(conn.tick(t2, &mut events), ConnectionStatus::BoardNotResponding);
    }

    #[test]
    fn write_failure_degrades_to_not_connected() {
        let mut port = FakePort { fail_writes: true, ..FakePort::default() };
        let now = Instant::now();
        let mut conn = Connection::open(&mut port, now);
        let mut events = Recorder::default();
        assert_eq!(conn.tick(now, &mut events), ConnectionStatus::NotConnected);
        assert!(conn.send(&Message::Ping).is_err());
    }

    #[test]
    fn frames_dispatch_to_event_hooks() {
        let mut port = FakePort::default();
        for msg in [
            Message::TaskStarted { chunk_id: 3 },
            Message::OutputValue { chunk_id: 255, value: WireValue::Str("hi".into()) },
            Message::TaskReturnedValue { chunk_id: 3, value: WireValue::Int(42) },
            Message::TaskError { chunk_id: 4, error: 18 },
            Message::TaskDone { chunk_id: 3 },
            Message::Version { version: "bricklet-vm 0.1.0".into() },
            Message::Broadcast { name: "go".into() },
        ] {
            port.inbox.extend(msg.encode());
        }
        let now = Instant::now();
        let mut conn = Connection::open(&mut port, now);
        let mut events = Recorder::default();
        conn.pump(now, &mut events);
        assert_eq!(events.started, vec![3]);
        assert_eq!(events.done, vec![3]);
        assert_eq!(events.returned, vec![(3, WireValue::Int(42))]);
        assert_eq!(events.errors, vec![(4, 18)]);
        assert_eq!(events.outputs, vec![(255, WireValue::Str("hi".into()))]);
        assert_eq!(events.versions, vec!["bricklet-vm 0.1.0".to_string()]);
        assert_eq!(events.broadcasts, vec!["go".to_string()]);
    }

    #[test]
    fn junk_before_a_frame_is_survivable() {
        let mut port = FakePort::default();
        port.inbox.extend([0x00, 0xFF, 0x42]);
        port.inbox.extend(Message::TaskDone { chunk_id: 1 }.encode());
        let now = Instant::now();
        let mut conn = Connection::open(&mut port, now);
        let mut events = Recorder::default();
        conn.pump(now, &mut events);
        assert_eq!(events.done, vec![1]);
    }

    #[test]
    fn convenience_senders_frame_correctly() {
        let mut port = FakePort::default();
        let now = Instant::now();
        let mut conn = Connection::open(&mut port, now);
        conn.send_chunk(2, ChunkType::Command, vec![1, 2]).unwrap();
        conn.start_chunk(2).unwrap();
        conn.stop_all().unwrap();
        drop(conn);

        let mut reader = FrameReader::new();
        reader.push(&port.sent);
        let mut frames = Vec::new();
        while let Some(ReadEvent::Frame(msg)) = reader.next() {
            frames.push(msg);
        }
        assert_eq!(
            frames,
            vec![
                Message::ChunkCode { chunk_id: 2, chunk_type: ChunkType::Command, code: vec![1, 2] },
                Message::StartChunk { chunk_id: 2 },
                Message::StopAll,
            ]
        );
    }
}
