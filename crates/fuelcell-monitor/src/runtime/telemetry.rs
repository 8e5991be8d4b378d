use fuelcell_core::{ChannelSample, IngestStats};
use fuelcell_io::metrics::{init_metrics, publish_harvest, publish_ingest, serve_metrics};
use std::thread;
use tracing::info;

pub fn init() {
    init_metrics();
}

pub fn start_metrics_server(addr: &Option<String>) -> Option<thread::JoinHandle<()>> {
    addr.as_ref().map(|addr| {
        info!(addr = %addr, "Starting metrics server");
        serve_metrics(addr.clone())
    })
}

/// Turns successive ingestion snapshots into counter increments.
#[derive(Debug, Default)]
pub struct IngestPublisher {
    last: IngestStats,
}

impl IngestPublisher {
    pub fn update(&mut self, current: IngestStats, running: bool) {
        publish_ingest(&self.last, &current, running);
        self.last = current;
    }
}

pub fn record_harvest(samples: &[ChannelSample], unix_us: u64) {
    publish_harvest(samples, unix_us);
}
