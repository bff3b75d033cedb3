//! Peer-to-peer 2.4 GHz radio driver and primitives (nRF51-class parts).
//!
//! The driver owns a small ring of packet slots shared with the receive
//! interrupt: the ISR fills the producer slot and advances the indices, the
//! VM drains from the consumer side. On overflow the received count
//! saturates at the ring size; the DMA slot keeps advancing, so packets
//! beyond the window are the ones sacrificed until the consumer drains.
//!
//! Hardware access goes through the [`RadioHw`] trait so the driver logic
//! (state machine, framing, ring discipline) is testable off-device.

use crate::error::PrimResult;
use crate::mem::{ClassId, ObjectMemory};
use crate::prims::{PrimEntry, PrimitiveRegistry};
use crate::value::{bool2obj, int2obj, obj2int, Obj, FALSE_OBJ, NIL, TRUE_OBJ};
use crate::vm::Vm;

pub const PACKET_SIZE: usize = 32;
/// Receive ring slots; must be a power of two.
pub const MAX_PACKETS: usize = 4;

// MakeCode typed-message ids (offset 4 of a MakeCode frame).
pub const MAKECODE_PACKET_INTEGER: u8 = 0;
pub const MAKECODE_PACKET_PAIR: u8 = 1;
pub const MAKECODE_PACKET_STRING: u8 = 2;
pub const MAKECODE_PACKET_DOUBLE: u8 = 4;
pub const MAKECODE_PACKET_DOUBLE_PAIR: u8 = 5;

/// Radio configuration interoperable with the micro:bit DAL/MakeCode
/// addressing scheme: every device shares the 'uBit' base address and an
/// 8-bit group prefix.
#[derive(Debug, Clone)]
pub struct RadioConfig {
    pub base_address: u32,
    pub group: u8,
    pub channel: u8,
    pub crc_poly: u32,
    pub crc_init: u32,
    pub whitening_iv: u8,
    pub max_payload: u8,
}

impl Default for RadioConfig {
    fn default() -> RadioConfig {
        RadioConfig {
            base_address: 0x7562_6974, // 'uBit'
            group: 0,
            channel: 7,
            crc_poly: 0x0001_1021,
            crc_init: 0xFFFF,
            whitening_iv: 0x18,
            max_payload: PACKET_SIZE as u8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioState {
    Uninitialized,
    Receiving,
    Transmitting,
    Disabled,
}

/// Raw transceiver operations. Enable calls block until the hardware
/// reports READY; `disable` blocks until DISABLED; `wait_tx_end` blocks on
/// the END event of an outgoing packet.
pub trait RadioHw {
    fn power_up(&mut self) {}
    fn configure(&mut self, _cfg: &RadioConfig) {}
    fn set_channel(&mut self, _channel: u8) {}
    fn set_group(&mut self, _group: u8) {}
    fn set_tx_power(&mut self, _dbm: i8) {}
    fn rx_enable(&mut self) {}
    fn tx_enable(&mut self) {}
    fn start(&mut self) {}
    fn load_tx_packet(&mut self, _packet: &[u8; PACKET_SIZE]) {}
    fn wait_tx_end(&mut self) {}
    /// Point DMA at the given receive ring slot.
    fn set_rx_slot(&mut self, _slot: usize) {}
    fn disable(&mut self) {}
    fn device_id(&self) -> u32 {
        0
    }
    /// Milliseconds since start, for outbound MakeCode timestamps.
    fn millis(&self) -> u32 {
        0
    }
}

/// Hardware stub for boards without a transceiver: all primitives become
/// no-ops that report nothing received.
pub struct NullRadioHw;

impl NullRadioHw {
    pub fn new() -> NullRadioHw {
        NullRadioHw
    }
}

impl Default for NullRadioHw {
    fn default() -> Self {
        NullRadioHw::new()
    }
}

impl RadioHw for NullRadioHw {}

struct RingBuffer {
    slots: [[u8; PACKET_SIZE]; MAX_PACKETS],
    packet_index: usize,
    received_count: usize,
}

impl RingBuffer {
    fn new() -> RingBuffer {
        RingBuffer {
            slots: [[0; PACKET_SIZE]; MAX_PACKETS],
            packet_index: 0,
            received_count: 0,
        }
    }

    fn commit(&mut self) {
        if self.received_count < MAX_PACKETS {
            self.received_count += 1;
        }
        self.packet_index = (self.packet_index + 1) & (MAX_PACKETS - 1);
    }

    fn pop(&mut self) -> Option<[u8; PACKET_SIZE]> {
        if self.received_count == 0 {
            return None;
        }
        let read = (self.packet_index + MAX_PACKETS - self.received_count) & (MAX_PACKETS - 1);
        self.received_count -= 1;
        Some(self.slots[read])
    }
}

pub struct Radio {
    hw: Box<dyn RadioHw>,
    state: RadioState,
    ring: RingBuffer,
    signal_strength: i32,
    received_message_type: i32,
    received_integer: i32,
    // Static string objects holding the latest extracted string and the
    // message type name. Kept out of the normal heap so high-frequency
    // receive paths put no pressure on the bump allocator.
    received_string: Option<Obj>,
    message_type_string: Option<Obj>,
    group: u8,
    channel: u8,
}

// Static string capacities, in data words.
const RECEIVED_STRING_WORDS: usize = 8; // up to 19 content bytes + NUL
const TYPE_STRING_WORDS: usize = 5;

// micro:bit DAL power level scheme, index 0-7 to dBm.
const POWER_LEVELS: [i8; 8] = [-30, -20, -16, -12, -8, -4, 0, 4];

impl Radio {
    pub fn new(hw: Box<dyn RadioHw>) -> Radio {
        let cfg = RadioConfig::default();
        Radio {
            hw,
            state: RadioState::Uninitialized,
            ring: RingBuffer::new(),
            signal_strength: -999,
            received_message_type: -1,
            received_integer: 0,
            received_string: None,
            message_type_string: None,
            group: cfg.group,
            channel: cfg.channel,
        }
    }

    pub fn state(&self) -> RadioState {
        self.state
    }

    pub fn signal_strength(&self) -> i32 {
        self.signal_strength
    }

    pub fn received_integer(&self) -> i32 {
        self.received_integer
    }

    pub fn device_id(&self) -> u32 {
        self.hw.device_id()
    }

    /// Lazy initialization on first use: power the radio, apply the default
    /// configuration, allocate the static strings, and start receiving.
    fn ensure_initialized(&mut self, mem: &mut ObjectMemory) -> bool {
        if self.state != RadioState::Uninitialized {
            return true;
        }
        if self.received_string.is_none() {
            self.received_string = mem.alloc_static(ClassId::String, RECEIVED_STRING_WORDS);
            self.message_type_string = mem.alloc_static(ClassId::String, TYPE_STRING_WORDS);
        }
        if self.received_string.is_none() || self.message_type_string.is_none() {
            return false;
        }
        self.hw.power_up();
        let cfg = RadioConfig {
            group: self.group,
            channel: self.channel,
            ..RadioConfig::default()
        };
        self.hw.configure(&cfg);
        self.hw.set_rx_slot(self.ring.packet_index);
        self.hw.rx_enable();
        self.hw.start();
        self.state = RadioState::Receiving;
        true
    }

    /// Turn the radio off entirely; the next use re-initializes it.
    pub fn shut_down(&mut self) {
        if self.state != RadioState::Uninitialized {
            self.hw.disable();
        }
        self.state = RadioState::Uninitialized;
    }

    pub fn set_group(&mut self, mem: &mut ObjectMemory, group: i32) {
        if !(0..=255).contains(&group) || !self.ensure_initialized(mem) {
            return;
        }
        self.group = group as u8;
        self.hw.set_group(self.group);
    }

    pub fn set_power(&mut self, mem: &mut ObjectMemory, level: i32) {
        if !(0..=7).contains(&level) || !self.ensure_initialized(mem) {
            return;
        }
        self.hw.set_tx_power(POWER_LEVELS[level as usize]);
    }

    /// Channel 0-83 maps to 2400-2483 MHz. The receiver must pass through
    /// DISABLED to change frequency.
    pub fn set_channel(&mut self, mem: &mut ObjectMemory, channel: i32) {
        if !(0..=83).contains(&channel) || !self.ensure_initialized(mem) {
            return;
        }
        self.hw.disable();
        self.state = RadioState::Disabled;
        self.channel = channel as u8;
        self.hw.set_channel(self.channel);
        self.hw.rx_enable();
        self.hw.start();
        self.state = RadioState::Receiving;
    }

    /// Transmit one packet, blocking until it is on the air, then return to
    /// receive mode with DMA pointed back at the ring.
    pub fn send_packet(&mut self, mem: &mut ObjectMemory, packet: &[u8; PACKET_SIZE]) -> bool {
        if !self.ensure_initialized(mem) {
            return false;
        }
        self.hw.disable();
        self.state = RadioState::Disabled;
        self.hw.load_tx_packet(packet);
        self.hw.tx_enable();
        self.state = RadioState::Transmitting;
        self.hw.start();
        self.hw.wait_tx_end();
        self.hw.set_rx_slot(self.ring.packet_index);
        self.hw.disable();
        self.state = RadioState::Disabled;
        self.hw.rx_enable();
        self.hw.start();
        self.state = RadioState::Receiving;
        true
    }

    pub fn receive_packet(&mut self, mem: &mut ObjectMemory) -> Option<[u8; PACKET_SIZE]> {
        if !self.ensure_initialized(mem) {
            return None;
        }
        self.ring.pop()
    }

    /// END-event interrupt path. On a good CRC the packet lands in the
    /// current DMA slot, the signal strength is sampled (stored negated),
    /// and the ring advances; a bad CRC only zeroes the strength. The
    /// receiver is restarted either way.
    pub fn isr_packet_received(&mut self, packet: &[u8], crc_ok: bool, rssi_sample: u8) {
        if crc_ok {
            let slot = &mut self.ring.slots[self.ring.packet_index];
            let n = packet.len().min(PACKET_SIZE);
            slot[..n].copy_from_slice(&packet[..n]);
            slot[n..].fill(0);
            self.signal_strength = -(rssi_sample as i32);
            self.ring.commit();
            self.hw.set_rx_slot(self.ring.packet_index);
        } else {
            self.signal_strength = 0;
        }
        self.hw.start();
    }

    /// Read the next packet and, if it is a MakeCode frame, extract its
    /// payload into the received-value state. Returns false when no packet
    /// is pending or the packet is not a MakeCode frame.
    pub fn receive_makecode_message(&mut self, mem: &mut ObjectMemory) -> bool {
        let Some(packet) = self.receive_packet(mem) else {
            return false;
        };
        let len = packet[0] as usize;
        if len < 12 || packet[1] != 1 || packet[3] != 1 {
            return false;
        }

        self.received_integer = 0;
        let mut string_len = 0usize;
        let mut src_offset = 0usize;

        let message_type = packet[4];
        match message_type {
            MAKECODE_PACKET_INTEGER => {
                self.received_integer = i32::from_le_bytes([
                    packet[13], packet[14], packet[15], packet[16],
                ]);
            }
            MAKECODE_PACKET_PAIR => {
                self.received_integer = i32::from_le_bytes([
                    packet[13], packet[14], packet[15], packet[16],
                ]);
                string_len = packet[17] as usize;
                src_offset = 18;
            }
            MAKECODE_PACKET_STRING => {
                string_len = packet[13] as usize;
                src_offset = 14;
            }
            MAKECODE_PACKET_DOUBLE => {
                self.received_integer = read_f64_le(&packet, 13).round() as i32;
            }
            MAKECODE_PACKET_DOUBLE_PAIR => {
                self.received_integer = read_f64_le(&packet, 13).round() as i32;
                string_len = packet[21] as usize;
                src_offset = 22;
            }
            _ => {}
        }

        string_len = string_len.min(19);
        if src_offset > 0 {
            string_len = string_len.min(PACKET_SIZE - src_offset);
        }
        if let Some(target) = self.received_string {
            for i in 0..string_len {
                mem.set_data_byte(target, i, packet[src_offset + i]);
            }
            mem.set_data_byte(target, string_len, 0);
            mem.rewrite_header(target, ClassId::String, (string_len + 4) / 4);
        }
        self.received_message_type = message_type as i32;
        true
    }

    /// Static string object holding the most recent extracted string.
    pub fn received_string_obj(&mut self, mem: &mut ObjectMemory) -> Obj {
        if !self.ensure_initialized(mem) {
            return NIL;
        }
        self.received_string.unwrap_or(NIL)
    }

    pub fn message_type_name(&self) -> &'static str {
        match self.received_message_type {
            -1 => "none",
            t if t == MAKECODE_PACKET_INTEGER as i32 => "number",
            t if t == MAKECODE_PACKET_DOUBLE as i32 => "number",
            t if t == MAKECODE_PACKET_PAIR as i32 => "pair",
            t if t == MAKECODE_PACKET_DOUBLE_PAIR as i32 => "pair",
            t if t == MAKECODE_PACKET_STRING as i32 => "string",
            _ => "other",
        }
    }

    /// Static string object naming the most recent message type.
    pub fn message_type_obj(&mut self, mem: &mut ObjectMemory) -> Obj {
        if !self.ensure_initialized(mem) {
            return NIL;
        }
        let name = self.message_type_name();
        let Some(target) = self.message_type_string else {
            return NIL;
        };
        for (i, &byte) in name.as_bytes().iter().enumerate() {
            mem.set_data_byte(target, i, byte);
        }
        mem.set_data_byte(target, name.len(), 0);
        mem.rewrite_header(target, ClassId::String, (name.len() + 4) / 4);
        target
    }

    /// Write the common MakeCode header: length, protocol, group slot,
    /// version, type, a millisecond timestamp, and the device id, all
    /// little-endian.
    fn init_makecode_packet(&self, packet: &mut [u8; PACKET_SIZE], packet_type: u8, length: u8) {
        let timestamp = self.hw.millis();
        let id = self.hw.device_id();
        packet[0] = length;
        packet[1] = 1; // protocol
        packet[2] = 0; // group (always 0 in the payload)
        packet[3] = 1; // version
        packet[4] = packet_type;
        packet[5..9].copy_from_slice(&timestamp.to_le_bytes());
        packet[9..13].copy_from_slice(&id.to_le_bytes());
    }

    pub fn send_integer(&mut self, mem: &mut ObjectMemory, n: i32) {
        let mut packet = [0u8; PACKET_SIZE];
        self.init_makecode_packet(&mut packet, MAKECODE_PACKET_INTEGER, 16);
        packet[13..17].copy_from_slice(&n.to_le_bytes());
        self.send_packet(mem, &packet);
    }

    pub fn send_pair(&mut self, mem: &mut ObjectMemory, text: &[u8], n: i32) {
        let len = text.len().min(14);
        let mut packet = [0u8; PACKET_SIZE];
        self.init_makecode_packet(&mut packet, MAKECODE_PACKET_PAIR, (17 + len) as u8);
        packet[13..17].copy_from_slice(&n.to_le_bytes());
        packet[17] = len as u8;
        packet[18..18 + len].copy_from_slice(&text[..len]);
        self.send_packet(mem, &packet);
    }

    pub fn send_string(&mut self, mem: &mut ObjectMemory, text: &[u8]) {
        let len = text.len().min(18);
        let mut packet = [0u8; PACKET_SIZE];
        self.init_makecode_packet(&mut packet, MAKECODE_PACKET_STRING, (13 + len) as u8);
        packet[13] = len as u8;
        packet[14..14 + len].copy_from_slice(&text[..len]);
        self.send_packet(mem, &packet);
    }
}

fn read_f64_le(packet: &[u8; PACKET_SIZE], offset: usize) -> f64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&packet[offset..offset + 8]);
    f64::from_le_bytes(raw)
}

// Primitives. Calls with missing or mistyped arguments are silent no-ops,
// never task errors.

pub fn add_radio_prims(registry: &mut PrimitiveRegistry) {
    registry.add_set(
        "radio",
        &[
            PrimEntry { name: "disableRadio", handler: prim_disable_radio },
            PrimEntry { name: "messageReceived", handler: prim_message_received },
            PrimEntry { name: "packetReceive", handler: prim_packet_receive },
            PrimEntry { name: "packetSend", handler: prim_packet_send },
            PrimEntry { name: "receivedInteger", handler: prim_received_integer },
            PrimEntry { name: "receivedMessageType", handler: prim_received_message_type },
            PrimEntry { name: "receivedString", handler: prim_received_string },
            PrimEntry { name: "sendInteger", handler: prim_send_integer },
            PrimEntry { name: "sendPair", handler: prim_send_pair },
            PrimEntry { name: "sendString", handler: prim_send_string },
            PrimEntry { name: "setChannel", handler: prim_set_channel },
            PrimEntry { name: "setGroup", handler: prim_set_group },
            PrimEntry { name: "setPower", handler: prim_set_power },
            PrimEntry { name: "signalStrength", handler: prim_signal_strength },
        ],
    );
}

fn prim_disable_radio(vm: &mut Vm, _args: &[Obj]) -> PrimResult {
    vm.radio.shut_down();
    Ok(FALSE_OBJ)
}

fn prim_message_received(vm: &mut Vm, _args: &[Obj]) -> PrimResult {
    Ok(bool2obj(vm.radio.receive_makecode_message(&mut vm.mem)))
}

fn prim_packet_receive(vm: &mut Vm, args: &[Obj]) -> PrimResult {
    // Copy the next raw packet into a caller-supplied list of at least 32
    // slots, zero-padded past the packet's length byte.
    let Some(&list) = args.first() else {
        return Ok(FALSE_OBJ);
    };
    if !vm.mem.is_class(list, ClassId::List) || vm.mem.obj_words(list) < PACKET_SIZE + 1 {
        return Ok(FALSE_OBJ);
    }
    let Some(packet) = vm.radio.receive_packet(&mut vm.mem) else {
        return Ok(FALSE_OBJ);
    };
    let packet_len = packet[0] as usize;
    vm.mem.set_field(list, 0, int2obj(PACKET_SIZE as i32));
    for i in 0..PACKET_SIZE {
        let value = if i <= packet_len { packet[i] as i32 } else { 0 };
        vm.mem.set_field(list, i + 1, int2obj(value));
    }
    Ok(TRUE_OBJ)
}

fn prim_packet_send(vm: &mut Vm, args: &[Obj]) -> PrimResult {
    let Some(&list) = args.first() else {
        return Ok(FALSE_OBJ);
    };
    if !vm.mem.is_class(list, ClassId::List) || vm.mem.obj_words(list) < PACKET_SIZE + 1 {
        return Ok(FALSE_OBJ);
    }
    let mut packet = [0u8; PACKET_SIZE];
    for (i, byte) in packet.iter_mut().enumerate() {
        let item = vm.mem.field(list, i + 1);
        *byte = if item.is_int() { obj2int(item) as u8 } else { 0 };
    }
    vm.radio.send_packet(&mut vm.mem, &packet);
    Ok(FALSE_OBJ)
}

fn prim_received_integer(vm: &mut Vm, _args: &[Obj]) -> PrimResult {
    Ok(int2obj(vm.radio.received_integer()))
}

fn prim_received_message_type(vm: &mut Vm, _args: &[Obj]) -> PrimResult {
    Ok(vm.radio.message_type_obj(&mut vm.mem))
}

fn prim_received_string(vm: &mut Vm, _args: &[Obj]) -> PrimResult {
    Ok(vm.radio.received_string_obj(&mut vm.mem))
}

fn prim_send_integer(vm: &mut Vm, args: &[Obj]) -> PrimResult {
    if let Some(&arg) = args.first() {
        if arg.is_int() {
            vm.radio.send_integer(&mut vm.mem, obj2int(arg));
        }
    }
    Ok(FALSE_OBJ)
}

fn prim_send_pair(vm: &mut Vm, args: &[Obj]) -> PrimResult {
    if args.len() >= 2 && vm.mem.is_class(args[0], ClassId::String) && args[1].is_int() {
        let text = vm.mem.string_bytes(args[0]);
        vm.radio.send_pair(&mut vm.mem, &text, obj2int(args[1]));
    }
    Ok(FALSE_OBJ)
}

fn prim_send_string(vm: &mut Vm, args: &[Obj]) -> PrimResult {
    if let Some(&arg) = args.first() {
        if vm.mem.is_class(arg, ClassId::String) {
            let text = vm.mem.string_bytes(arg);
            vm.radio.send_string(&mut vm.mem, &text);
        }
    }
    Ok(FALSE_OBJ)
}

fn prim_set_channel(vm: &mut Vm, args: &[Obj]) -> PrimResult {
    if let Some(&arg) = args.first() {
        if arg.is_int() {
            vm.radio.set_channel(&mut vm.mem, obj2int(arg));
        }
    }
    Ok(FALSE_OBJ)
}

fn prim_set_group(vm: &mut Vm, args: &[Obj]) -> PrimResult {
    if let Some(&arg) = args.first() {
        if arg.is_int() {
            vm.radio.set_group(&mut vm.mem, obj2int(arg));
        }
    }
    Ok(FALSE_OBJ)
}

fn prim_set_power(vm: &mut Vm, args: &[Obj]) -> PrimResult {
    if let Some(&arg) = args.first() {
        if arg.is_int() {
            vm.radio.set_power(&mut vm.mem, obj2int(arg));
        }
    }
    Ok(FALSE_OBJ)
}

fn prim_signal_strength(vm: &mut Vm, _args: &[Obj]) -> PrimResult {
    Ok(int2obj(vm.radio.signal_strength()))
}
