use bricklet_proto::WireValue;

use crate::mem::{ClassId, ObjectMemory};
use crate::radio::{NullRadioHw, Radio, RadioHw};
use crate::value::{bool2obj, int2obj, obj2int, Class, Obj, TRUE_OBJ};

/// The device VM: object memory, the radio driver, and the small amount of
/// shared state primitives need (random state, pending output values).
pub struct Vm {
    pub mem: ObjectMemory,
    pub radio: Radio,
    rand_state: u32,
    output: Vec<WireValue>,
}

impl Vm {
    /// VM with the given arena size and no radio hardware attached (radio
    /// primitives act as no-ops, as on boards without a transceiver).
    pub fn new(arena_words: usize) -> Vm {
        Vm::with_radio_hw(arena_words, Box::new(NullRadioHw::new()))
    }

    pub fn with_radio_hw(arena_words: usize, hw: Box<dyn RadioHw>) -> Vm {
        let seed = hw.device_id() ^ 0x6b2c_5e19;
        Vm {
            mem: ObjectMemory::init(arena_words),
            radio: Radio::new(hw),
            rand_state: if seed == 0 { 1 } else { seed },
            output: Vec::new(),
        }
    }

    /// xorshift32; state is never zero.
    pub(crate) fn next_random(&mut self) -> u32 {
        let mut x = self.rand_state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.rand_state = x;
        x
    }

    pub fn push_output(&mut self, value: WireValue) {
        self.output.push(value);
    }

    pub fn take_output(&mut self) -> Vec<WireValue> {
        std::mem::take(&mut self.output)
    }
}

/// Convert a VM value to its wire form for `outputValue`, `varValue`, and
/// `taskReturnedValue` bodies. Lists have no wire tag and are sent as their
/// printed text; nil becomes integer zero.
pub fn obj_to_wire(mem: &ObjectMemory, obj: Obj) -> WireValue {
    match mem.class_of(obj) {
        Class::Integer => WireValue::Int(obj2int(obj)),
        Class::Boolean => WireValue::Bool(obj == TRUE_OBJ),
        Class::Nil => WireValue::Int(0),
        Class::Heap(ClassId::String) => WireValue::Str(mem.string_text(obj)),
        Class::Heap(ClassId::ByteArray) => WireValue::Bytes(mem.byte_array_bytes(obj)),
        Class::Heap(ClassId::List) => WireValue::Str(printed_text(mem, obj)),
    }
}

/// Materialize a wire value in object memory (used by `setVar`). Returns
/// None when the arena is exhausted.
pub fn wire_to_obj(mem: &mut ObjectMemory, value: &WireValue) -> Option<Obj> {
    match value {
        WireValue::Int(n) => Some(int2obj(*n)),
        WireValue::Bool(b) => Some(bool2obj(*b)),
        WireValue::Str(s) => mem.new_string(s),
        WireValue::Bytes(bytes) => mem.new_byte_array(bytes),
    }
}

/// Human-readable text for any value, matching what `join` produces for
/// immediates. Lists print their items space-separated.
pub fn printed_text(mem: &ObjectMemory, obj: Obj) -> String {
    match mem.class_of(obj) {
        Class::Integer => obj2int(obj).to_string(),
        Class::Boolean => if obj == TRUE_OBJ { "true" } else { "false" }.to_string(),
        Class::Nil => String::new(),
        Class::Heap(ClassId::String) => mem.string_text(obj),
        Class::Heap(ClassId::ByteArray) => format!("<{} bytes>", mem.byte_array_len(obj)),
        Class::Heap(ClassId::List) => {
            let count = crate::data::list_count(mem, obj);
            let items: Vec<String> = (1..=count)
                .map(|i| printed_text(mem, mem.field(obj, i)))
                .collect();
            items.join(" ")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{FALSE_OBJ, NIL};

    #[test]
    fn random_is_deterministic_per_seed_and_nonzero() {
        let mut vm = Vm::new(64);
        let first: Vec<u32> = (0..8).map(|_| vm.next_random()).collect();
        assert!(first.iter().all(|&x| x != 0));
        assert!(first.windows(2).any(|w| w[0] != w[1]));
    }

    #[test]
    fn wire_round_trip_through_memory() {
        let mut vm = Vm::new(256);
        for value in [
            WireValue::Int(-7),
            WireValue::Bool(true),
            WireValue::Str("hi".into()),
            WireValue::Bytes(vec![1, 2, 3, 4]),
        ] {
            let obj = wire_to_obj(&mut vm.mem, &value).unwrap();
            assert_eq!(obj_to_wire(&vm.mem, obj), value);
        }
    }

    #[test]
    fn nil_is_sent_as_integer_zero() {
        let vm = Vm::new(64);
        assert_eq!(obj_to_wire(&vm.mem, NIL), WireValue::Int(0));
        assert_eq!(obj_to_wire(&vm.mem, FALSE_OBJ), WireValue::Bool(false));
    }
}
