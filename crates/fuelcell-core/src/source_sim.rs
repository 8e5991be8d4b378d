use crate::decoder::MessageIds;
use crate::source::{FrameSource, RawFrame, SourceError};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    pub ids: MessageIds,
    /// Pause before each identity frame, i.e. once per three-frame cycle.
    pub cycle_pause: Duration,
    pub seed: Option<u64>,
    /// Stop after this many frames; `None` runs forever.
    pub frame_limit: Option<u64>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            ids: MessageIds::default(),
            cycle_pause: Duration::from_millis(100),
            seed: None,
            frame_limit: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Identity,
    Electrical,
    Tank,
}

/// Simulated fuel-cell controller cycling identity, electrical and tank frames.
#[derive(Debug)]
pub struct SimulatedBus {
    config: SimulatorConfig,
    rng: SmallRng,
    phase: Phase,
    open: bool,
    frames_sent: u64,
}

impl SimulatedBus {
    pub fn new(config: SimulatorConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_entropy(),
        };
        Self {
            config,
            rng,
            phase: Phase::Identity,
            open: false,
            frames_sent: 0,
        }
    }

    fn next_frame(&mut self) -> RawFrame {
        let mut body = [0u8; 8];
        let (id, next) = match self.phase {
            Phase::Identity => {
                body[0] = 0x34;
                body[1] = 0x12;
                self.rng.fill(&mut body[2..7]);
                body[7] = self.rng.gen::<u8>() & 1;
                (self.config.ids.identity, Phase::Electrical)
            }
            Phase::Electrical => {
                self.rng.fill(&mut body[0..4]);
                body[4] = self.rng.gen();
                body[5] = (480u16 >> 8) as u8;
                body[6] = self.rng.gen();
                body[7] = (520u16 >> 8) as u8;
                (self.config.ids.electrical, Phase::Tank)
            }
            Phase::Tank => {
                self.rng.fill(&mut body[0..4]);
                body[4..8].copy_from_slice(&0x1234_5678u32.to_le_bytes());
                (self.config.ids.tank, Phase::Identity)
            }
        };
        self.phase = next;
        RawFrame::new(id, &body)
    }
}

impl Default for SimulatedBus {
    fn default() -> Self {
        Self::new(SimulatorConfig::default())
    }
}

impl FrameSource for SimulatedBus {
    fn describe(&self) -> String {
        "simulated bus".to_string()
    }

    fn open(&mut self) -> Result<(), SourceError> {
        self.open = true;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn recv(&mut self) -> Result<Option<RawFrame>, SourceError> {
        if !self.open {
            return Err(SourceError::NotOpen);
        }
        if let Some(limit) = self.config.frame_limit {
            if self.frames_sent >= limit {
                return Err(SourceError::Exhausted);
            }
        }
        if self.phase == Phase::Identity && !self.config.cycle_pause.is_zero() {
            std::thread::sleep(self.config.cycle_pause);
        }
        let frame = self.next_frame();
        self.frames_sent += 1;
        Ok(Some(frame))
    }

    fn close(&mut self) {
        self.open = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelId;
    use crate::decoder::{FrameDecoder, FrameDisposition};

    fn fast(seed: u64) -> SimulatedBus {
        SimulatedBus::new(SimulatorConfig {
            cycle_pause: Duration::ZERO,
            seed: Some(seed),
            ..Default::default()
        })
    }

    #[test]
    fn cycles_through_all_three_messages() {
        let mut bus = fast(1);
        bus.open().unwrap();
        let ids: Vec<u32> = (0..6).map(|_| bus.recv().unwrap().unwrap().can_id).collect();
        assert_eq!(ids, [0x210, 0x211, 0x212, 0x210, 0x211, 0x212]);
    }

    #[test]
    fn every_frame_decodes() {
        let mut bus = fast(7);
        bus.open().unwrap();
        let decoder = FrameDecoder::default();
        for _ in 0..30 {
            let frame = bus.recv().unwrap().unwrap();
            let disposition = decoder.classify(frame.can_id, frame.payload());
            assert!(matches!(disposition, FrameDisposition::Decoded(_)));
        }
    }

    #[test]
    fn identity_and_error_code_are_fixed() {
        let mut bus = fast(3);
        bus.open().unwrap();
        let decoder = FrameDecoder::default();
        let mut updates = Vec::new();
        for _ in 0..3 {
            let frame = bus.recv().unwrap().unwrap();
            updates.extend(decoder.decode(frame.can_id, frame.payload()));
        }
        let find = |id| updates.iter().find(|u| u.channel == id).unwrap().value;
        assert_eq!(find(ChannelId::PowerPackId), 4660.0);
        assert_eq!(find(ChannelId::ErrorCode), f64::from(0x1234_5678u32));
        assert!(find(ChannelId::RefuelPort) <= 1.0);
    }

    #[test]
    fn frame_limit_exhausts() {
        let mut bus = SimulatedBus::new(SimulatorConfig {
            cycle_pause: Duration::ZERO,
            frame_limit: Some(2),
            seed: Some(0),
            ..Default::default()
        });
        bus.open().unwrap();
        assert!(bus.recv().unwrap().is_some());
        assert!(bus.recv().unwrap().is_some());
        assert!(matches!(bus.recv(), Err(SourceError::Exhausted)));
    }

    #[test]
    fn recv_requires_open() {
        let mut bus = fast(0);
        assert!(matches!(bus.recv(), Err(SourceError::NotOpen)));
    }
}
