use thiserror::Error;

/// Largest payload carried by a frame (CAN FD).
pub const MAX_PAYLOAD_LEN: usize = 64;

/// One frame as read from the bus: identifier with flag bits, plus payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawFrame {
    pub can_id: u32,
    len: u8,
    data: [u8; MAX_PAYLOAD_LEN],
}

impl RawFrame {
    /// Payload bytes past [`MAX_PAYLOAD_LEN`] are discarded.
    pub fn new(can_id: u32, payload: &[u8]) -> Self {
        let len = payload.len().min(MAX_PAYLOAD_LEN);
        let mut data = [0u8; MAX_PAYLOAD_LEN];
        data[..len].copy_from_slice(&payload[..len]);
        Self {
            can_id,
            len: len as u8,
            data,
        }
    }

    pub fn payload(&self) -> &[u8] {
        &self.data[..usize::from(self.len)]
    }
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("frame source unavailable: {0}")]
    Unavailable(String),
    #[error("frame source I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("frame source is not open")]
    NotOpen,
    /// A finite source has delivered its last frame.
    #[error("frame source exhausted")]
    Exhausted,
}

/// Blocking supplier of frames for the ingestion loop.
///
/// `recv` may block, but should return `Ok(None)` within a bounded time
/// when nothing arrives so that shutdown is observed.
pub trait FrameSource: Send {
    fn describe(&self) -> String;
    fn open(&mut self) -> Result<(), SourceError>;
    fn is_open(&self) -> bool;
    fn recv(&mut self) -> Result<Option<RawFrame>, SourceError>;
    fn close(&mut self);

    /// Input records the source skipped because they could not be parsed.
    fn malformed_records(&self) -> u64 {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_is_truncated_to_capacity() {
        let long = [0xAAu8; 80];
        let frame = RawFrame::new(0x210, &long);
        assert_eq!(frame.payload().len(), MAX_PAYLOAD_LEN);
    }

    #[test]
    fn short_payload_is_preserved() {
        let frame = RawFrame::new(0x211, &[1, 2, 3]);
        assert_eq!(frame.payload(), &[1, 2, 3]);
        assert_eq!(frame.can_id, 0x211);
    }
}
