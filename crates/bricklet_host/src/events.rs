use bricklet_proto::WireValue;

/// Notifications surfaced to the editor: task state changes highlight the
/// running block, returned values show as a hint on the block with the
/// matching chunk id, output and broadcasts go to the console.
pub trait HostEvents {
    fn task_started(&mut self, _chunk_id: u8) {}
    fn task_done(&mut self, _chunk_id: u8) {}
    fn task_returned_value(&mut self, _chunk_id: u8, _value: &WireValue) {}
    fn task_error(&mut self, _chunk_id: u8, _error: u8) {}
    fn output_value(&mut self, _chunk_id: u8, _value: &WireValue) {}
    fn var_value(&mut self, _var_id: u8, _value: &WireValue) {}
    fn version(&mut self, _version: &str) {}
    fn broadcast_received(&mut self, _name: &str) {}
}

/// Sink that ignores everything.
pub struct NullEvents;

impl HostEvents for NullEvents {}
