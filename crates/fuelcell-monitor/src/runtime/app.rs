use crate::infra::record::{HarvestRecorder, LifecycleEvent};
use crate::runtime::config::{RuntimeConfig, SourceChoice};
use crate::runtime::logging::init_tracing;
use crate::runtime::telemetry::{self, IngestPublisher};
use anyhow::Context;
use fuelcell_core::{
    ChannelSample, FrameSource, IngestConfig, Monitor, RawFrame, SimulatedBus, SimulatorConfig,
    SourceError,
};
#[cfg(all(feature = "can-linux", target_os = "linux"))]
use fuelcell_io::SocketCanSource;
use fuelcell_io::{HarvestMsg, ReplaySource};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Upper bound on one sleep of the harvest loop.
const LOOP_POLL: Duration = Duration::from_millis(50);

enum MonitorSource {
    Simulated(SimulatedBus),
    Replay(ReplaySource),
    #[cfg(all(feature = "can-linux", target_os = "linux"))]
    Can(SocketCanSource),
}

impl FrameSource for MonitorSource {
    fn describe(&self) -> String {
        match self {
            Self::Simulated(s) => s.describe(),
            Self::Replay(s) => s.describe(),
            #[cfg(all(feature = "can-linux", target_os = "linux"))]
            Self::Can(s) => s.describe(),
        }
    }

    fn open(&mut self) -> Result<(), SourceError> {
        match self {
            Self::Simulated(s) => s.open(),
            Self::Replay(s) => s.open(),
            #[cfg(all(feature = "can-linux", target_os = "linux"))]
            Self::Can(s) => s.open(),
        }
    }

    fn is_open(&self) -> bool {
        match self {
            Self::Simulated(s) => s.is_open(),
            Self::Replay(s) => s.is_open(),
            #[cfg(all(feature = "can-linux", target_os = "linux"))]
            Self::Can(s) => s.is_open(),
        }
    }

    fn recv(&mut self) -> Result<Option<RawFrame>, SourceError> {
        match self {
            Self::Simulated(s) => s.recv(),
            Self::Replay(s) => s.recv(),
            #[cfg(all(feature = "can-linux", target_os = "linux"))]
            Self::Can(s) => s.recv(),
        }
    }

    fn close(&mut self) {
        match self {
            Self::Simulated(s) => s.close(),
            Self::Replay(s) => s.close(),
            #[cfg(all(feature = "can-linux", target_os = "linux"))]
            Self::Can(s) => s.close(),
        }
    }

    fn malformed_records(&self) -> u64 {
        match self {
            Self::Simulated(s) => s.malformed_records(),
            Self::Replay(s) => s.malformed_records(),
            #[cfg(all(feature = "can-linux", target_os = "linux"))]
            Self::Can(s) => s.malformed_records(),
        }
    }
}

fn build_source(config: &RuntimeConfig) -> anyhow::Result<MonitorSource> {
    match &config.source {
        SourceChoice::Simulated => Ok(MonitorSource::Simulated(SimulatedBus::new(
            SimulatorConfig {
                ids: config.message_ids,
                ..Default::default()
            },
        ))),
        SourceChoice::Replay { path, realtime } => {
            Ok(MonitorSource::Replay(ReplaySource::new(path, *realtime)))
        }
        #[cfg(all(feature = "can-linux", target_os = "linux"))]
        SourceChoice::Can { interface } => {
            Ok(MonitorSource::Can(SocketCanSource::new(interface.clone())))
        }
        #[cfg(not(all(feature = "can-linux", target_os = "linux")))]
        SourceChoice::Can { interface } => anyhow::bail!(
            "cannot listen on {}: built without SocketCAN support (enable the `can-linux` feature, or use --simulate / --replay)",
            interface
        ),
    }
}

fn source_label(choice: &SourceChoice) -> serde_json::Value {
    match choice {
        SourceChoice::Can { interface } => serde_json::json!({ "can": interface }),
        SourceChoice::Simulated => serde_json::json!("simulator"),
        SourceChoice::Replay { path, realtime } => {
            serde_json::json!({ "replay": path.display().to_string(), "realtime": realtime })
        }
    }
}

pub fn run_from_args() -> anyhow::Result<()> {
    let config = RuntimeConfig::from_env()?;
    run(config)
}

pub fn run(config: RuntimeConfig) -> anyhow::Result<()> {
    // Initialize tracing
    init_tracing(config.json_logs);

    // Initialize metrics
    telemetry::init();
    let _metrics_handle = telemetry::start_metrics_server(&config.metrics_addr);

    let recorder = init_recorder(config.record_path.as_ref())?;
    let source = build_source(&config)?;

    let ingest_config = IngestConfig {
        message_ids: config.message_ids,
        retry_backoff: config.retry_backoff,
        ..Default::default()
    };
    info!(
        source = %source.describe(),
        interval_ms = config.interval.as_millis() as u64,
        identity = %format!("0x{:X}", config.message_ids.identity),
        electrical = %format!("0x{:X}", config.message_ids.electrical),
        tank = %format!("0x{:X}", config.message_ids.tank),
        "Starting fuel-cell monitor"
    );
    let monitor = Monitor::start(source, ingest_config).context("failed to start monitor")?;
    let timebase = monitor.timebase();

    if let Some(ref recorder) = recorder {
        recorder
            .log_event(
                timebase.now_us(),
                timebase.unix_us(),
                LifecycleEvent::MonitorStart,
                serde_json::json!({
                    "version": env!("CARGO_PKG_VERSION"),
                    "source": source_label(&config.source),
                    "interval_ms": config.interval.as_millis() as u64,
                    "message_ids": config.message_ids,
                }),
            )
            .context("failed to record start event")?;
    }

    let mut harvester = Harvester {
        recorder: recorder.clone(),
        quiet: config.quiet_samples,
        count: 0,
    };
    let mut publisher = IngestPublisher::default();

    let deadline = config
        .run_seconds
        .map(|secs| Instant::now() + Duration::from_secs(secs));
    if let Some(seconds) = config.run_seconds {
        info!(seconds, "Running for limited duration");
    }
    let mut next_harvest = Instant::now() + config.interval;

    loop {
        let now = Instant::now();
        if deadline.is_some_and(|d| now >= d) {
            debug!("Run duration elapsed");
            break;
        }
        if !monitor.is_ingesting() {
            info!("Frame source finished");
            break;
        }
        if now >= next_harvest {
            harvester.harvest(&monitor);
            next_harvest += config.interval;
            if next_harvest <= now {
                warn!("Harvest loop fell behind; skipping missed intervals");
                next_harvest = now + config.interval;
            }
        }
        publisher.update(monitor.ingest_stats(), true);

        let mut wake = next_harvest;
        if let Some(d) = deadline {
            wake = wake.min(d);
        }
        thread::sleep(wake.saturating_duration_since(now).min(LOOP_POLL));
    }

    // Flush whatever accumulated since the last interval.
    harvester.harvest(&monitor);

    let stats = monitor.stop().context("ingestion thread failed")?;
    publisher.update(stats, false);
    info!(
        harvests = harvester.count,
        frames_received = stats.frames_received,
        frames_applied = stats.frames_applied,
        runt_frames = stats.runt_frames,
        error_frames = stats.error_frames,
        unknown_frames = stats.unknown_frames,
        source_failures = stats.source_failures,
        malformed_records = stats.malformed_records,
        "Run complete"
    );

    if let Some(ref recorder) = recorder {
        recorder
            .log_event(
                timebase.now_us(),
                timebase.unix_us(),
                LifecycleEvent::MonitorStop,
                serde_json::json!({
                    "harvests": harvester.count,
                    "ingest": stats,
                }),
            )
            .context("failed to record stop event")?;
    }
    Ok(())
}

struct Harvester {
    recorder: Option<Arc<HarvestRecorder>>,
    quiet: bool,
    count: u64,
}

impl Harvester {
    fn harvest(&mut self, monitor: &Monitor) {
        let samples = monitor.harvest();
        self.count += 1;
        let timebase = monitor.timebase();
        let stats = monitor.ingest_stats();

        debug!(
            harvest = self.count,
            channels = samples.len(),
            frames_received = stats.frames_received,
            "Harvest"
        );
        if !self.quiet {
            for sample in &samples {
                log_sample(sample);
            }
        }

        telemetry::record_harvest(&samples, timebase.unix_us());

        if let Some(ref recorder) = self.recorder {
            let msg = HarvestMsg::new(self.count, &timebase, &samples, Some(stats));
            if let Err(e) = recorder.record_harvest(&msg) {
                warn!(error = %e, "Failed to record harvest");
            }
        }
    }
}

fn log_sample(sample: &ChannelSample) {
    let fields = sample
        .fields()
        .into_iter()
        .map(|(name, value)| format!("{}={}", name, value))
        .collect::<Vec<_>>()
        .join(" ");
    info!(channel = sample.name(), kind = ?sample.kind, %fields, "Sample");
}

fn init_recorder(path: Option<&PathBuf>) -> anyhow::Result<Option<Arc<HarvestRecorder>>> {
    let Some(path) = path else {
        return Ok(None);
    };
    let recorder = HarvestRecorder::new(path)
        .with_context(|| format!("failed to open harvest record {}", path.display()))?;
    info!(path = %path.display(), "Harvest recording enabled");
    Ok(Some(Arc::new(recorder)))
}
