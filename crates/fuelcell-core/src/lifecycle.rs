//! Entry points the host drives: `start`, `harvest`, `stop`.

use crate::channel::ChannelSample;
use crate::ingest::{IngestConfig, IngestCounters, IngestStats, IngestThread};
use crate::source::FrameSource;
use crate::sync::SharedStore;
use crate::timebase::TimeBase;
use log::{debug, info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use thiserror::Error;

const INGEST_THREAD_NAME: &str = "fuelcell-ingest";

#[derive(Debug, Error)]
pub enum StartError {
    #[error("failed to spawn ingestion thread: {0}")]
    Spawn(#[source] std::io::Error),
}

#[derive(Debug, Error)]
pub enum StopError {
    #[error("ingestion thread panicked")]
    IngestPanicked,
}

/// A running decode-and-aggregate engine.
pub struct Monitor {
    store: Arc<SharedStore>,
    counters: Arc<IngestCounters>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    timebase: TimeBase,
}

impl Monitor {
    /// Create the channel set and start ingesting from `source`.
    pub fn start<S>(source: S, config: IngestConfig) -> Result<Self, StartError>
    where
        S: FrameSource + 'static,
    {
        let store = Arc::new(SharedStore::new());
        let counters = Arc::new(IngestCounters::default());
        let stop = Arc::new(AtomicBool::new(false));
        let timebase = TimeBase::new();

        let mut ingest = IngestThread::new(
            source,
            config,
            Arc::clone(&store),
            Arc::clone(&counters),
            timebase,
        );
        let stop_ingest = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name(INGEST_THREAD_NAME.to_string())
            .spawn(move || ingest.run(&stop_ingest))
            .map_err(StartError::Spawn)?;

        info!("monitor started");
        Ok(Self {
            store,
            counters,
            stop,
            handle: Some(handle),
            timebase,
        })
    }

    /// Emit the channels touched since the previous harvest and open a new window.
    pub fn harvest(&self) -> Vec<ChannelSample> {
        self.store.harvest()
    }

    pub fn ingest_stats(&self) -> IngestStats {
        self.counters.snapshot()
    }

    /// False once the ingestion thread has exited, e.g. a replay reached its end.
    pub fn is_ingesting(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub fn timebase(&self) -> TimeBase {
        self.timebase
    }

    /// Signal the ingestion thread, join it and return the final counters.
    pub fn stop(mut self) -> Result<IngestStats, StopError> {
        self.shutdown()?;
        Ok(self.counters.snapshot())
    }

    fn shutdown(&mut self) -> Result<(), StopError> {
        self.stop.store(true, Ordering::Relaxed);
        match self.handle.take() {
            Some(handle) => {
                let joined = handle.join().map_err(|_| StopError::IngestPanicked);
                debug!("ingestion thread joined");
                joined
            }
            None => Ok(()),
        }
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

#[cfg(all(test, feature = "simulation"))]
mod tests {
    use super::*;
    use crate::channel::ChannelId;
    use crate::source_sim::{SimulatedBus, SimulatorConfig};
    use std::time::{Duration, Instant};

    fn wait_until(deadline: Duration, mut done: impl FnMut() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < deadline {
            if done() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        done()
    }

    #[test]
    fn simulated_run_harvests_every_channel_but_fuel_level() {
        let bus = SimulatedBus::new(SimulatorConfig {
            cycle_pause: Duration::from_millis(1),
            seed: Some(11),
            ..Default::default()
        });
        let monitor = Monitor::start(bus, IngestConfig::default()).unwrap();
        assert!(wait_until(Duration::from_secs(5), || {
            monitor.ingest_stats().frames_applied >= 3
        }));

        let samples = monitor.harvest();
        let ids: Vec<ChannelId> = samples.iter().map(|s| s.channel).collect();
        let expected: Vec<ChannelId> = ChannelId::ALL
            .into_iter()
            .filter(|id| *id != ChannelId::FuelLevel)
            .collect();
        assert_eq!(ids, expected);

        let stats = monitor.stop().unwrap();
        assert!(stats.frames_received >= 3);
        assert_eq!(stats.unknown_frames, 0);
    }

    #[test]
    fn finite_source_stops_ingesting() {
        let bus = SimulatedBus::new(SimulatorConfig {
            cycle_pause: Duration::ZERO,
            frame_limit: Some(9),
            seed: Some(5),
            ..Default::default()
        });
        let monitor = Monitor::start(bus, IngestConfig::default()).unwrap();
        assert!(wait_until(Duration::from_secs(5), || !monitor.is_ingesting()));
        assert_eq!(monitor.ingest_stats().frames_applied, 9);
        assert_eq!(monitor.stop().unwrap().frames_received, 9);
    }

    #[test]
    fn drop_joins_ingestion_thread() {
        let monitor = Monitor::start(SimulatedBus::default(), IngestConfig::default()).unwrap();
        drop(monitor);
    }
}
