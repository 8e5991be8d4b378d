//! JSON shape of a harvest, shared by the recorder and anything reading it back.

use fuelcell_core::{ChannelId, ChannelKind, ChannelSample, IngestStats, TimeBase};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct ProtocolVersion {
    pub major: u8,
    pub minor: u8,
}

impl ProtocolVersion {
    pub const fn v1() -> Self {
        Self { major: 1, minor: 0 }
    }

    pub fn is_supported(&self) -> bool {
        self.major == 1
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleMsg {
    pub channel: ChannelId,
    pub kind: ChannelKind,
    /// Field name to value; `value` always present, bounded gauges add the window stats.
    pub fields: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_change_unix_us: Option<u64>,
}

impl SampleMsg {
    pub fn from_sample(sample: &ChannelSample, timebase: &TimeBase) -> Self {
        Self {
            channel: sample.channel,
            kind: sample.kind,
            fields: sample
                .fields()
                .into_iter()
                .map(|(name, value)| (name.to_string(), value))
                .collect(),
            last_change_unix_us: sample.last_change_us.map(|us| timebase.to_unix_us(us)),
        }
    }

    pub fn field(&self, name: &str) -> Option<f64> {
        self.fields.get(name).copied()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarvestMsg {
    #[serde(rename = "type")]
    pub msg_type: String,
    #[serde(default)]
    pub protocol_version: ProtocolVersion,
    /// Count of harvests taken by this process, starting at 1.
    pub sequence: u64,
    pub timestamp_us: u64,
    pub unix_us: u64,
    pub samples: Vec<SampleMsg>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingest: Option<IngestSummary>,
}

/// Mirror of `IngestStats` that can be read back from JSON.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestSummary {
    pub frames_received: u64,
    pub frames_applied: u64,
    pub updates_applied: u64,
    pub runt_frames: u64,
    pub error_frames: u64,
    pub unknown_frames: u64,
    pub source_failures: u64,
    #[serde(default)]
    pub malformed_records: u64,
}

impl From<IngestStats> for IngestSummary {
    fn from(stats: IngestStats) -> Self {
        Self {
            frames_received: stats.frames_received,
            frames_applied: stats.frames_applied,
            updates_applied: stats.updates_applied,
            runt_frames: stats.runt_frames,
            error_frames: stats.error_frames,
            unknown_frames: stats.unknown_frames,
            source_failures: stats.source_failures,
            malformed_records: stats.malformed_records,
        }
    }
}

impl HarvestMsg {
    pub const TYPE: &'static str = "harvest";

    pub fn new(
        sequence: u64,
        timebase: &TimeBase,
        samples: &[ChannelSample],
        ingest: Option<IngestStats>,
    ) -> Self {
        Self {
            msg_type: Self::TYPE.to_string(),
            protocol_version: ProtocolVersion::v1(),
            sequence,
            timestamp_us: timebase.now_us(),
            unix_us: timebase.unix_us(),
            samples: samples
                .iter()
                .map(|s| SampleMsg::from_sample(s, timebase))
                .collect(),
            ingest: ingest.map(IngestSummary::from),
        }
    }

    /// Parse one JSONL line; anything that is not a supported harvest yields `None`.
    pub fn parse(line: &str) -> Option<Self> {
        let msg: Self = serde_json::from_str(line).ok()?;
        (msg.msg_type == Self::TYPE && msg.protocol_version.is_supported()).then_some(msg)
    }

    pub fn sample(&self, channel: ChannelId) -> Option<&SampleMsg> {
        self.samples.iter().find(|s| s.channel == channel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fuelcell_core::ChannelStore;

    #[test]
    fn harvest_serializes_channel_names() {
        let mut store = ChannelStore::new();
        store.update_instant(ChannelId::PowerPackId, 4660.0, 10);
        store.update_bounded(ChannelId::TankPressure, 48.0, 20);
        let samples = store.harvest();

        let msg = HarvestMsg::new(1, &TimeBase::new(), &samples, None);
        let line = serde_json::to_string(&msg).unwrap();
        assert!(line.contains(r#""type":"harvest""#));
        assert!(line.contains(r#""channel":"powerPackID""#));
        assert!(line.contains(r#""kind":"bounded_gauge""#));
        assert!(!line.contains("ingest"));

        let back = HarvestMsg::parse(&line).unwrap();
        let pressure = back.sample(ChannelId::TankPressure).unwrap();
        assert_eq!(pressure.field("highest"), Some(48.0));
        assert_eq!(pressure.fields.len(), 4);
    }

    #[test]
    fn rejects_other_message_types() {
        let raw = r#"{"type":"state","sequence":1,"timestamp_us":0,"unix_us":0,"samples":[]}"#;
        assert!(HarvestMsg::parse(raw).is_none());
        assert!(HarvestMsg::parse("not json").is_none());
    }
}
