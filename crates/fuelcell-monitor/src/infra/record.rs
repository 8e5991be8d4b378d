//! JSONL recording of harvests and monitor lifecycle events.
//!
//! Each line carries a `type` key: `harvest` lines are [`HarvestMsg`]s,
//! `monitor_start` / `monitor_stop` lines are [`LifecycleEntry`]s.

use fuelcell_io::protocol::HarvestMsg;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleEvent {
    MonitorStart,
    MonitorStop,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleEntry {
    #[serde(rename = "type")]
    pub event_type: LifecycleEvent,
    /// Monotonic timestamp in microseconds
    pub timestamp_us: u64,
    /// Wall-clock Unix timestamp in microseconds
    pub unix_us: u64,
    pub details: serde_json::Value,
}

/// Thread-safe recorder appending to a JSONL file
pub struct HarvestRecorder {
    writer: Mutex<BufWriter<File>>,
}

impl HarvestRecorder {
    /// Open `path` in append mode, creating parent directories as needed.
    pub fn new(path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            writer: Mutex::new(BufWriter::with_capacity(8192, file)),
        })
    }

    fn write_line<T: Serialize>(&self, entry: &T) -> std::io::Result<()> {
        let mut writer = self.writer.lock();
        serde_json::to_writer(&mut *writer, entry)?;
        writer.write_all(b"\n")?;
        writer.flush()
    }

    pub fn record_harvest(&self, harvest: &HarvestMsg) -> std::io::Result<()> {
        self.write_line(harvest)
    }

    pub fn log_event(
        &self,
        timestamp_us: u64,
        unix_us: u64,
        event_type: LifecycleEvent,
        details: serde_json::Value,
    ) -> std::io::Result<()> {
        self.write_line(&LifecycleEntry {
            event_type,
            timestamp_us,
            unix_us,
            details,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fuelcell_core::{ChannelId, ChannelStore, TimeBase};
    use std::io::Read;
    use tempfile::tempdir;

    #[test]
    fn recorder_writes_jsonl() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("harvests.jsonl");
        let recorder = HarvestRecorder::new(&path).unwrap();
        let timebase = TimeBase::new();

        recorder
            .log_event(
                1000,
                1704067200000000,
                LifecycleEvent::MonitorStart,
                serde_json::json!({"source": "simulator"}),
            )
            .unwrap();

        let mut store = ChannelStore::new();
        store.update_instant(ChannelId::ErrorCode, 305419896.0, 5);
        let harvest = HarvestMsg::new(1, &timebase, &store.harvest(), None);
        recorder.record_harvest(&harvest).unwrap();

        let mut content = String::new();
        File::open(&path)
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let start: LifecycleEntry = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(start.event_type, LifecycleEvent::MonitorStart);
        assert!(lines[0].contains(r#""type":"monitor_start""#));

        let back = HarvestMsg::parse(lines[1]).unwrap();
        assert_eq!(
            back.sample(ChannelId::ErrorCode).unwrap().field("value"),
            Some(305419896.0)
        );
    }

    #[test]
    fn recorder_appends_to_existing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("harvests.jsonl");
        for _ in 0..2 {
            let recorder = HarvestRecorder::new(&path).unwrap();
            recorder
                .log_event(0, 0, LifecycleEvent::MonitorStop, serde_json::json!({}))
                .unwrap();
        }
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
    }
}
