use thiserror::Error;

#[derive(Debug, Error)]
pub enum HostError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("no serial ports found")]
    NoPortsFound,
    #[error("serial port is closed")]
    PortClosed,
    #[error("all 255 chunk ids are in use")]
    ChunkIdsExhausted,
}
