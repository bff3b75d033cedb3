use std::collections::HashMap;

use crate::error::HostError;

/// Chunk id 255 is reserved for stdout-style `outputValue` frames.
const MAX_CHUNK_ID: u8 = 254;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkEntry {
    pub chunk_id: u8,
    /// Whether the block was last saved as a bare expression (the editor
    /// shows its result as a hint bubble rather than a highlight).
    pub last_expression: bool,
}

/// Host-private assignment of chunk ids to blocks. A block gets a fresh
/// sequential id the first time it is saved; ids are only reclaimed by
/// `delete_all`, mirroring `deleteAllCode` on the device.
#[derive(Debug, Default)]
pub struct ChunkRegistry {
    by_block: HashMap<String, ChunkEntry>,
    next_id: u8,
}

impl ChunkRegistry {
    pub fn new() -> ChunkRegistry {
        ChunkRegistry::default()
    }

    /// The id for a block, assigning the next free one on first sight.
    pub fn id_for(&mut self, block_key: &str) -> Result<u8, HostError> {
        if let Some(entry) = self.by_block.get(block_key) {
            return Ok(entry.chunk_id);
        }
        if self.next_id > MAX_CHUNK_ID {
            return Err(HostError::ChunkIdsExhausted);
        }
        let chunk_id = self.next_id;
        self.next_id += 1;
        self.by_block.insert(
            block_key.to_string(),
            ChunkEntry { chunk_id, last_expression: false },
        );
        Ok(chunk_id)
    }

    pub fn entry(&self, block_key: &str) -> Option<ChunkEntry> {
        self.by_block.get(block_key).copied()
    }

    pub fn set_last_expression(&mut self, block_key: &str, last_expression: bool) {
        if let Some(entry) = self.by_block.get_mut(block_key) {
            entry.last_expression = last_expression;
        }
    }

    /// Reverse lookup, for routing task-state frames back to a block.
    pub fn block_for(&self, chunk_id: u8) -> Option<&str> {
        self.by_block
            .iter()
            .find(|(_, entry)| entry.chunk_id == chunk_id)
            .map(|(key, _)| key.as_str())
    }

    /// Forget every assignment. Valid only after the device has acknowledged
    /// `deleteAllCode`; ids are reused from zero afterwards.
    pub fn delete_all(&mut self) {
        self.by_block.clear();
        self.next_id = 0;
    }

    pub fn len(&self) -> usize {
        self.by_block.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_block.is_empty()
    }
}
