//! Live SocketCAN frame source (Linux only, `can-linux` feature).

use fuelcell_core::decoder::{CAN_EFF_FLAG, CAN_ERR_FLAG, CAN_RTR_FLAG};
use fuelcell_core::{FrameSource, RawFrame, SourceError};
use socketcan::{CanFrame, CanSocket, EmbeddedFrame, Frame, Socket};
use std::io::ErrorKind;
use std::time::Duration;
use tracing::debug;

/// Bound on a single blocking read, so a stop request is seen promptly.
pub const READ_TIMEOUT: Duration = Duration::from_millis(100);

pub struct SocketCanSource {
    interface: String,
    socket: Option<CanSocket>,
}

impl SocketCanSource {
    pub fn new(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            socket: None,
        }
    }
}

/// Rebuild the kernel's flagged identifier word for the decoder.
fn to_raw_frame(frame: &CanFrame) -> RawFrame {
    let mut can_id = frame.raw_id();
    if frame.is_extended() {
        can_id |= CAN_EFF_FLAG;
    }
    match frame {
        CanFrame::Error(_) => can_id |= CAN_ERR_FLAG,
        CanFrame::Remote(_) => can_id |= CAN_RTR_FLAG,
        CanFrame::Data(_) => {}
    }
    RawFrame::new(can_id, frame.data())
}

impl FrameSource for SocketCanSource {
    fn describe(&self) -> String {
        format!("SocketCAN interface {}", self.interface)
    }

    fn open(&mut self) -> Result<(), SourceError> {
        let socket = CanSocket::open(&self.interface)
            .map_err(|e| SourceError::Unavailable(format!("{}: {}", self.interface, e)))?;
        socket.set_read_timeout(READ_TIMEOUT)?;
        debug!(
            interface = %self.interface,
            timeout_ms = READ_TIMEOUT.as_millis() as u64,
            "CAN socket bound"
        );
        self.socket = Some(socket);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.socket.is_some()
    }

    fn recv(&mut self) -> Result<Option<RawFrame>, SourceError> {
        let socket = self.socket.as_ref().ok_or(SourceError::NotOpen)?;
        match socket.read_frame() {
            Ok(frame) => Ok(Some(to_raw_frame(&frame))),
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => Ok(None),
            Err(e) if e.kind() == ErrorKind::Interrupted => Ok(None),
            Err(e) => Err(SourceError::Io(e)),
        }
    }

    fn close(&mut self) {
        if self.socket.take().is_some() {
            debug!(interface = %self.interface, "CAN socket closed");
        }
    }
}
