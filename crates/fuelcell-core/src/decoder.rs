//! Fixed-layout decoder for the three fuel-cell CAN messages.
//!
//! Pure: no locking, no I/O. Runt frames, error frames and unknown
//! identifiers decode to no updates.

use crate::channel::ChannelId;
use serde::{Deserialize, Serialize};

/// Extended (29-bit) frame format flag.
pub const CAN_EFF_FLAG: u32 = 0x8000_0000;
/// Remote transmission request flag.
pub const CAN_RTR_FLAG: u32 = 0x4000_0000;
/// Error frame flag.
pub const CAN_ERR_FLAG: u32 = 0x2000_0000;
pub const CAN_SFF_MASK: u32 = 0x0000_07FF;
pub const CAN_EFF_MASK: u32 = 0x1FFF_FFFF;

/// Shortest payload the decoder accepts.
pub const MIN_PAYLOAD_LEN: usize = 8;

/// Pressure, temperature, voltage and current travel in tenths.
const TENTHS: f64 = 10.0;

/// Identifiers of the three decoded messages. Deployment-specific.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageIds {
    /// Identity, accumulated totals, refuel port, fuel level.
    pub identity: u32,
    /// Input/output voltage and current.
    pub electrical: u32,
    /// Hydrogen tank pressure/temperature and error code.
    pub tank: u32,
}

impl Default for MessageIds {
    fn default() -> Self {
        Self {
            identity: 0x210,
            electrical: 0x211,
            tank: 0x212,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelUpdate {
    pub channel: ChannelId,
    pub value: f64,
}

impl ChannelUpdate {
    fn new(channel: ChannelId, value: f64) -> Self {
        Self { channel, value }
    }
}

/// What the decoder made of one frame.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameDisposition {
    Decoded(Vec<ChannelUpdate>),
    Runt { len: usize },
    ErrorFrame,
    Unknown { id: u32 },
}

impl FrameDisposition {
    pub fn into_updates(self) -> Vec<ChannelUpdate> {
        match self {
            FrameDisposition::Decoded(updates) => updates,
            _ => Vec::new(),
        }
    }
}

/// Strip flag bits, keeping 29 bits for extended frames and 11 otherwise.
pub fn normalize_id(can_id: u32) -> u32 {
    if can_id & CAN_EFF_FLAG != 0 {
        can_id & CAN_EFF_MASK
    } else {
        can_id & CAN_SFF_MASK
    }
}

/// Little-endian unsigned field built from successive bytes.
fn le_field(bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .rev()
        .fold(0u32, |acc, &b| (acc << 8) | u32::from(b))
}

fn tenths(bytes: &[u8]) -> f64 {
    f64::from(le_field(bytes)) / TENTHS
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameDecoder {
    ids: MessageIds,
}

impl FrameDecoder {
    pub fn new(ids: MessageIds) -> Self {
        Self { ids }
    }

    pub fn classify(&self, can_id: u32, payload: &[u8]) -> FrameDisposition {
        if payload.len() < MIN_PAYLOAD_LEN {
            return FrameDisposition::Runt { len: payload.len() };
        }
        if can_id & CAN_ERR_FLAG != 0 {
            return FrameDisposition::ErrorFrame;
        }

        let id = normalize_id(can_id);
        let b = payload;
        let updates = if id == self.ids.identity {
            let mut updates = vec![
                ChannelUpdate::new(ChannelId::PowerPackId, f64::from(le_field(&b[0..2]))),
                ChannelUpdate::new(ChannelId::AccumulatedPower, f64::from(le_field(&b[2..4]))),
                ChannelUpdate::new(ChannelId::AccumulatedHours, f64::from(le_field(&b[4..7]))),
                ChannelUpdate::new(ChannelId::RefuelPort, f64::from(b[7])),
            ];
            // Fuel level rides in a ninth byte on senders that transmit it.
            if let Some(&level) = b.get(8) {
                updates.push(ChannelUpdate::new(ChannelId::FuelLevel, f64::from(level)));
            }
            updates
        } else if id == self.ids.electrical {
            vec![
                ChannelUpdate::new(ChannelId::OutputCurrent, tenths(&b[0..2])),
                ChannelUpdate::new(ChannelId::InputCurrent, tenths(&b[2..4])),
                ChannelUpdate::new(ChannelId::OutputVoltage, tenths(&b[4..6])),
                ChannelUpdate::new(ChannelId::InputVoltage, tenths(&b[6..8])),
            ]
        } else if id == self.ids.tank {
            vec![
                ChannelUpdate::new(ChannelId::TankPressure, tenths(&b[0..2])),
                ChannelUpdate::new(ChannelId::TankTemperature, tenths(&b[2..4])),
                ChannelUpdate::new(ChannelId::ErrorCode, f64::from(le_field(&b[4..8]))),
            ]
        } else {
            return FrameDisposition::Unknown { id };
        };
        FrameDisposition::Decoded(updates)
    }

    pub fn decode(&self, can_id: u32, payload: &[u8]) -> Vec<ChannelUpdate> {
        self.classify(can_id, payload).into_updates()
    }
}

/// Decode with the default message identifiers.
pub fn decode(can_id: u32, payload: &[u8]) -> Vec<ChannelUpdate> {
    FrameDecoder::default().decode(can_id, payload)
}
