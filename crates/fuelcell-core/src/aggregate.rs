//! Aggregation engine over the fixed channel set.
//!
//! Dirty tracking uses one engine-wide sequence number: an update stamps the
//! channel with the current sequence, a harvest emits the channels whose
//! stamp equals it and then advances the sequence, which marks every channel
//! clean at once. The sequence only advances in [`ChannelStore::harvest`].

use crate::channel::{
    BoundedStats, Channel, ChannelId, ChannelKind, ChannelSample, Generation, Statistic,
};
use crate::decoder::ChannelUpdate;

impl BoundedStats {
    fn accumulate(&mut self, sample: f64) {
        self.sum += sample;
        self.count += 1;
        self.average = self.sum / f64::from(self.count);

        // Bounds only move when the value steps; repeated samples leave them alone.
        if sample != self.value {
            self.value = sample;
            if sample < self.lowest {
                self.lowest = sample;
            }
            if sample > self.highest {
                self.highest = sample;
            }
        }
    }

    /// Collapse the window to one sample at the previous average and
    /// re-seed the bounds from the latest value.
    fn collapse(&mut self) {
        if self.count > 0 {
            self.sum = self.average;
            self.count = 1;
        }
        self.lowest = self.value;
        self.highest = self.value;
    }
}

/// Every channel plus the sequence counter. Callers serialise access
/// through [`crate::sync::SharedStore`].
#[derive(Debug, Clone)]
pub struct ChannelStore {
    channels: [Channel; ChannelId::COUNT],
    sequence: Generation,
}

impl ChannelStore {
    pub fn new() -> Self {
        let mut store = Self {
            channels: ChannelId::ALL.map(Channel::new),
            sequence: 0,
        };
        for id in ChannelId::ALL {
            if id.kind() == ChannelKind::BoundedGauge {
                store.reset_bounded(id);
            }
        }
        store
    }

    pub fn sequence(&self) -> Generation {
        self.sequence
    }

    pub fn channel(&self, id: ChannelId) -> &Channel {
        &self.channels[id.index()]
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn is_dirty(&self, id: ChannelId) -> bool {
        self.channel(id).is_dirty(self.sequence)
    }

    /// Apply one decoded update, dispatching on the channel's kind.
    pub fn apply(&mut self, update: ChannelUpdate, now_us: u64) {
        match update.channel.kind() {
            ChannelKind::InstantGauge | ChannelKind::MonotonicCounter => {
                self.update_instant(update.channel, update.value, now_us)
            }
            ChannelKind::BoundedGauge => self.update_bounded(update.channel, update.value, now_us),
        }
    }

    /// Overwrite a gauge or counter value.
    ///
    /// # Panics
    ///
    /// If `id` names a bounded gauge.
    pub fn update_instant(&mut self, id: ChannelId, value: f64, now_us: u64) {
        let sequence = self.sequence;
        let channel = &mut self.channels[id.index()];
        match &mut channel.state {
            Statistic::InstantGauge { value: slot } | Statistic::MonotonicCounter { value: slot } => {
                *slot = value;
            }
            Statistic::BoundedGauge(_) => {
                panic!("update_instant called on bounded channel {id}")
            }
        }
        channel.generation = Some(sequence);
        channel.last_change_us = Some(now_us);
    }

    /// Fold a sample into a bounded gauge's window.
    ///
    /// # Panics
    ///
    /// If `id` does not name a bounded gauge.
    pub fn update_bounded(&mut self, id: ChannelId, value: f64, now_us: u64) {
        let sequence = self.sequence;
        let channel = &mut self.channels[id.index()];
        match &mut channel.state {
            Statistic::BoundedGauge(stats) => stats.accumulate(value),
            _ => panic!("update_bounded called on {} channel {id}", id.kind().label()),
        }
        channel.generation = Some(sequence);
        channel.last_change_us = Some(now_us);
    }

    /// Start a new window for a bounded gauge. Does not mark it dirty.
    ///
    /// # Panics
    ///
    /// If `id` does not name a bounded gauge.
    pub fn reset_bounded(&mut self, id: ChannelId) {
        match &mut self.channels[id.index()].state {
            Statistic::BoundedGauge(stats) => stats.collapse(),
            _ => panic!("reset_bounded called on {} channel {id}", id.kind().label()),
        }
    }

    /// Emit every dirty channel in identifier order, reset the dirty
    /// bounded gauges, then advance the sequence.
    pub fn harvest(&mut self) -> Vec<ChannelSample> {
        let sequence = self.sequence;
        let mut samples = Vec::new();
        for id in ChannelId::ALL {
            if !self.channels[id.index()].is_dirty(sequence) {
                continue;
            }
            samples.push(self.channels[id.index()].sample());
            if id.kind() == ChannelKind::BoundedGauge {
                self.reset_bounded(id);
            }
        }
        self.sequence = self.sequence.wrapping_add(1);
        samples
    }
}

impl Default for ChannelStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelKind {
    fn label(self) -> &'static str {
        match self {
            ChannelKind::InstantGauge => "instant gauge",
            ChannelKind::MonotonicCounter => "counter",
            ChannelKind::BoundedGauge => "bounded gauge",
        }
    }
}
