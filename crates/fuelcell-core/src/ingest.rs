use crate::decoder::{FrameDecoder, FrameDisposition, MessageIds};
use crate::source::{FrameSource, RawFrame, SourceError};
use crate::sync::SharedStore;
use crate::timebase::TimeBase;
use log::{debug, info, trace, warn};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Clone, Debug)]
pub struct IngestConfig {
    pub message_ids: MessageIds,
    /// Wait between attempts to (re)open an unavailable source.
    pub retry_backoff: Duration,
    /// Granularity at which a backoff sleep checks for shutdown.
    pub stop_poll: Duration,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            message_ids: MessageIds::default(),
            retry_backoff: Duration::from_secs(1),
            stop_poll: Duration::from_millis(50),
        }
    }
}

#[derive(Clone, Copy, Default, Debug, PartialEq, Eq, Serialize)]
pub struct IngestStats {
    pub frames_received: u64,
    pub frames_applied: u64,
    pub updates_applied: u64,
    pub runt_frames: u64,
    pub error_frames: u64,
    pub unknown_frames: u64,
    pub source_failures: u64,
    pub malformed_records: u64,
}

/// Live counters, readable from any thread while ingestion runs.
#[derive(Debug, Default)]
pub struct IngestCounters {
    frames_received: AtomicU64,
    frames_applied: AtomicU64,
    updates_applied: AtomicU64,
    runt_frames: AtomicU64,
    error_frames: AtomicU64,
    unknown_frames: AtomicU64,
    source_failures: AtomicU64,
    malformed_records: AtomicU64,
}

impl IngestCounters {
    pub fn snapshot(&self) -> IngestStats {
        IngestStats {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_applied: self.frames_applied.load(Ordering::Relaxed),
            updates_applied: self.updates_applied.load(Ordering::Relaxed),
            runt_frames: self.runt_frames.load(Ordering::Relaxed),
            error_frames: self.error_frames.load(Ordering::Relaxed),
            unknown_frames: self.unknown_frames.load(Ordering::Relaxed),
            source_failures: self.source_failures.load(Ordering::Relaxed),
            malformed_records: self.malformed_records.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }
}

/// Producer side: reads frames, decodes them and applies the updates.
pub struct IngestThread<S: FrameSource> {
    source: S,
    config: IngestConfig,
    decoder: FrameDecoder,
    store: Arc<SharedStore>,
    counters: Arc<IngestCounters>,
    timebase: TimeBase,
}

impl<S: FrameSource> IngestThread<S> {
    pub fn new(
        source: S,
        config: IngestConfig,
        store: Arc<SharedStore>,
        counters: Arc<IngestCounters>,
        timebase: TimeBase,
    ) -> Self {
        Self {
            source,
            decoder: FrameDecoder::new(config.message_ids),
            config,
            store,
            counters,
            timebase,
        }
    }

    /// Runs until `stop` is set or the source is exhausted. The store lock
    /// is never held while waiting on the source.
    pub fn run(&mut self, stop: &AtomicBool) {
        info!("ingesting frames from {}", self.source.describe());
        let mut open_failure_logged = false;

        while !stop.load(Ordering::Relaxed) {
            if !self.source.is_open() {
                match self.source.open() {
                    Ok(()) => {
                        info!("opened {}", self.source.describe());
                        open_failure_logged = false;
                    }
                    Err(err) => {
                        IngestCounters::bump(&self.counters.source_failures, 1);
                        if open_failure_logged {
                            debug!("{} still unavailable: {}", self.source.describe(), err);
                        } else {
                            warn!("{} unavailable, retrying: {}", self.source.describe(), err);
                            open_failure_logged = true;
                        }
                        self.backoff(stop);
                        continue;
                    }
                }
            }

            let received = self.source.recv();
            self.counters
                .malformed_records
                .store(self.source.malformed_records(), Ordering::Relaxed);
            match received {
                Ok(Some(frame)) => self.handle_frame(&frame),
                Ok(None) => {}
                Err(SourceError::Exhausted) => {
                    info!("{} exhausted", self.source.describe());
                    break;
                }
                Err(err) => {
                    IngestCounters::bump(&self.counters.source_failures, 1);
                    warn!("read from {} failed: {}", self.source.describe(), err);
                    self.source.close();
                    self.backoff(stop);
                }
            }
        }

        self.source.close();
        debug!("ingestion stopped: {:?}", self.stats());
    }

    fn handle_frame(&self, frame: &RawFrame) {
        IngestCounters::bump(&self.counters.frames_received, 1);
        match self.decoder.classify(frame.can_id, frame.payload()) {
            FrameDisposition::Decoded(updates) => {
                self.store.apply_frame(&updates, self.timebase.now_us());
                IngestCounters::bump(&self.counters.frames_applied, 1);
                IngestCounters::bump(&self.counters.updates_applied, updates.len() as u64);
            }
            FrameDisposition::Runt { len } => {
                trace!("runt frame 0x{:X} ({} bytes)", frame.can_id, len);
                IngestCounters::bump(&self.counters.runt_frames, 1);
            }
            FrameDisposition::ErrorFrame => {
                trace!("error frame 0x{:X}", frame.can_id);
                IngestCounters::bump(&self.counters.error_frames, 1);
            }
            FrameDisposition::Unknown { id } => {
                trace!("ignoring frame 0x{:X}", id);
                IngestCounters::bump(&self.counters.unknown_frames, 1);
            }
        }
    }

    fn backoff(&self, stop: &AtomicBool) {
        let deadline = Instant::now() + self.config.retry_backoff;
        while !stop.load(Ordering::Relaxed) {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            std::thread::sleep(self.config.stop_poll.min(deadline - now));
        }
    }

    pub fn stats(&self) -> IngestStats {
        self.counters.snapshot()
    }

    pub fn into_source(self) -> S {
        self.source
    }
}
