//! Prometheus metrics for harvested channels and frame ingestion.

use fuelcell_core::tags::Tag;
use fuelcell_core::{ChannelId, ChannelSample, IngestStats};
use prometheus::{
    Encoder, GaugeVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use std::sync::LazyLock;
use std::thread;
use tiny_http::{Response, Server};

/// Global metrics registry
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// ============================================================================
// Channel Metrics
// ============================================================================

/// Every harvested field, labelled by channel name and field name
pub static CHANNEL_FIELDS: LazyLock<GaugeVec> = LazyLock::new(|| {
    let gauge = GaugeVec::new(
        Opts::new("fuelcell_channel", "Last harvested value of a channel field"),
        &["channel", "field"],
    )
    .expect("channel gauge options are valid");
    REGISTRY
        .register(Box::new(gauge.clone()))
        .expect("channel gauge registers once");
    gauge
});

fn channel_help(tag: Tag) -> String {
    if tag.unit.is_empty() {
        tag.help.to_string()
    } else {
        format!("{} ({})", tag.help, tag.unit)
    }
}

/// One gauge family per channel, named after its tag, labelled by field
pub static CHANNEL_GAUGES: LazyLock<Vec<GaugeVec>> = LazyLock::new(|| {
    ChannelId::ALL
        .iter()
        .map(|id| {
            let tag = id.tag();
            let gauge = GaugeVec::new(Opts::new(tag.metric, channel_help(tag)), &["field"])
                .expect("per-channel gauge options are valid");
            REGISTRY
                .register(Box::new(gauge.clone()))
                .expect("per-channel gauge registers once");
            gauge
        })
        .collect()
});

/// Unix time of the last harvest that carried a given channel
pub static CHANNEL_LAST_HARVEST: LazyLock<GaugeVec> = LazyLock::new(|| {
    let gauge = GaugeVec::new(
        Opts::new(
            "fuelcell_channel_last_harvest_unix_seconds",
            "Wall-clock time of the last harvest that reported the channel",
        ),
        &["channel"],
    )
    .expect("last-harvest gauge options are valid");
    REGISTRY
        .register(Box::new(gauge.clone()))
        .expect("last-harvest gauge registers once");
    gauge
});

// ============================================================================
// Harvest Metrics
// ============================================================================

/// Total harvests performed
pub static HARVESTS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new("fuelcell_harvests_total", "Total harvests performed")
        .expect("harvest counter options are valid");
    REGISTRY
        .register(Box::new(counter.clone()))
        .expect("harvest counter registers once");
    counter
});

/// Samples emitted across all harvests
pub static SAMPLES_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new(
        "fuelcell_harvested_samples_total",
        "Channel samples emitted across all harvests",
    )
    .expect("sample counter options are valid");
    REGISTRY
        .register(Box::new(counter.clone()))
        .expect("sample counter registers once");
    counter
});

/// Channels reported by the most recent harvest
pub static LAST_HARVEST_SIZE: LazyLock<IntGauge> = LazyLock::new(|| {
    let gauge = IntGauge::new(
        "fuelcell_last_harvest_channels",
        "Number of channels reported by the most recent harvest",
    )
    .expect("harvest size gauge options are valid");
    REGISTRY
        .register(Box::new(gauge.clone()))
        .expect("harvest size gauge registers once");
    gauge
});

// ============================================================================
// Ingestion Metrics
// ============================================================================

/// Frames read from the source, by what the decoder made of them
pub static FRAMES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    let counter = IntCounterVec::new(
        Opts::new("fuelcell_frames_total", "Frames read from the CAN source"),
        &["disposition"],
    )
    .expect("frame counter options are valid");
    REGISTRY
        .register(Box::new(counter.clone()))
        .expect("frame counter registers once");
    counter
});

/// Failed attempts to open or read the source
pub static SOURCE_FAILURES: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new(
        "fuelcell_source_failures_total",
        "Failed attempts to open or read the CAN source",
    )
    .expect("source failure counter options are valid");
    REGISTRY
        .register(Box::new(counter.clone()))
        .expect("source failure counter registers once");
    counter
});

/// Input records the source skipped as unparseable
pub static MALFORMED_RECORDS: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new(
        "fuelcell_malformed_records_total",
        "Input records skipped because they could not be parsed",
    )
    .expect("malformed record counter options are valid");
    REGISTRY
        .register(Box::new(counter.clone()))
        .expect("malformed record counter registers once");
    counter
});

/// Ingestion thread status (1 = running, 0 = stopped)
pub static INGEST_RUNNING: LazyLock<IntGauge> = LazyLock::new(|| {
    let gauge = IntGauge::new(
        "fuelcell_ingest_running",
        "Ingestion thread status (1=running, 0=stopped)",
    )
    .expect("ingest status gauge options are valid");
    REGISTRY
        .register(Box::new(gauge.clone()))
        .expect("ingest status gauge registers once");
    gauge
});

pub const DISPOSITIONS: [&str; 4] = ["applied", "runt", "error", "unknown"];

/// Push one harvest into the gauges.
pub fn publish_harvest(samples: &[ChannelSample], unix_us: u64) {
    HARVESTS_TOTAL.inc();
    SAMPLES_TOTAL.inc_by(samples.len() as u64);
    LAST_HARVEST_SIZE.set(samples.len() as i64);

    let unix_seconds = unix_us as f64 / 1_000_000.0;
    for sample in samples {
        let name = sample.name();
        let per_channel = &CHANNEL_GAUGES[sample.channel.index()];
        for (field, value) in sample.fields() {
            CHANNEL_FIELDS.with_label_values(&[name, field]).set(value);
            per_channel.with_label_values(&[field]).set(value);
        }
        CHANNEL_LAST_HARVEST
            .with_label_values(&[name])
            .set(unix_seconds);
    }
}

/// Advance the ingestion counters by the difference between two snapshots.
pub fn publish_ingest(previous: &IngestStats, current: &IngestStats, running: bool) {
    let deltas = [
        (current.frames_applied, previous.frames_applied),
        (current.runt_frames, previous.runt_frames),
        (current.error_frames, previous.error_frames),
        (current.unknown_frames, previous.unknown_frames),
    ];
    for (label, (now, before)) in DISPOSITIONS.iter().zip(deltas) {
        if now > before {
            FRAMES_TOTAL
                .with_label_values(&[*label])
                .inc_by(now - before);
        }
    }
    if current.source_failures > previous.source_failures {
        SOURCE_FAILURES.inc_by(current.source_failures - previous.source_failures);
    }
    if current.malformed_records > previous.malformed_records {
        MALFORMED_RECORDS.inc_by(current.malformed_records - previous.malformed_records);
    }
    INGEST_RUNNING.set(i64::from(running));
}

// ============================================================================
// Metrics HTTP Server
// ============================================================================

/// Start the metrics HTTP server on the given address.
/// Returns a join handle for the server thread.
pub fn serve_metrics(bind_addr: String) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let server = match Server::http(&bind_addr) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!("Failed to start metrics server on {}: {}", bind_addr, e);
                return;
            }
        };

        tracing::info!("Metrics server listening on http://{}/metrics", bind_addr);

        for request in server.incoming_requests() {
            let response = match request.url() {
                "/metrics" => match render() {
                    Ok(body) => {
                        let response = Response::from_data(body);
                        match tiny_http::Header::from_bytes(
                            &b"Content-Type"[..],
                            &b"text/plain; version=0.0.4"[..],
                        ) {
                            Ok(header) => response.with_header(header),
                            Err(()) => response,
                        }
                    }
                    Err(e) => {
                        tracing::warn!("Failed to encode metrics: {}", e);
                        Response::from_string("Internal Server Error")
                            .with_status_code(500)
                    }
                },
                "/health" => Response::from_string("OK"),
                // Ready once the first harvest has been published
                "/ready" if HARVESTS_TOTAL.get() > 0 => Response::from_string("Ready"),
                "/ready" => Response::from_string("Not Ready").with_status_code(503),
                _ => Response::from_string("Not Found").with_status_code(404),
            };
            let _ = request.respond(response);
        }
    })
}

/// Text exposition of everything in [`REGISTRY`].
pub fn render() -> Result<Vec<u8>, prometheus::Error> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&REGISTRY.gather(), &mut buffer)?;
    Ok(buffer)
}

/// Initialize all metrics (forces lazy initialization)
pub fn init_metrics() {
    LazyLock::force(&CHANNEL_FIELDS);
    LazyLock::force(&CHANNEL_GAUGES);
    LazyLock::force(&CHANNEL_LAST_HARVEST);
    let _ = HARVESTS_TOTAL.get();
    let _ = SAMPLES_TOTAL.get();
    let _ = LAST_HARVEST_SIZE.get();
    for label in DISPOSITIONS {
        let _ = FRAMES_TOTAL.with_label_values(&[label]).get();
    }
    let _ = SOURCE_FAILURES.get();
    let _ = MALFORMED_RECORDS.get();
    let _ = INGEST_RUNNING.get();
}

#[cfg(test)]
mod tests {
    use super::*;
    use fuelcell_core::ChannelStore;

    #[test]
    fn harvest_lands_in_both_gauge_families() {
        init_metrics();
        let mut store = ChannelStore::new();
        store.update_bounded(ChannelId::TankTemperature, 21.5, 0);
        store.update_bounded(ChannelId::TankTemperature, 23.5, 1);
        let before = HARVESTS_TOTAL.get();
        publish_harvest(&store.harvest(), 1_700_000_000_000_000);

        assert!(HARVESTS_TOTAL.get() > before);
        let avg = CHANNEL_FIELDS
            .with_label_values(&["tankTemperature", "average"])
            .get();
        assert_eq!(avg, 22.5);
        let high = CHANNEL_GAUGES[ChannelId::TankTemperature.index()]
            .with_label_values(&["highest"])
            .get();
        assert_eq!(high, 23.5);

        let text = String::from_utf8(render().unwrap()).unwrap();
        assert!(text.contains("fuelcell_tank_temperature_celsius"));
        assert!(text.contains("fuelcell_harvests_total"));
    }

    #[test]
    fn channel_help_carries_the_unit() {
        init_metrics();
        for id in [ChannelId::TankTemperature, ChannelId::ErrorCode] {
            CHANNEL_GAUGES[id.index()]
                .with_label_values(&["value"])
                .set(0.0);
        }
        let text = String::from_utf8(render().unwrap()).unwrap();
        assert!(text.contains(
            "# HELP fuelcell_tank_temperature_celsius Hydrogen tank temperature (°C)"
        ));
        assert!(text.contains(
            "# HELP fuelcell_error_code Last error code reported by the fuel-cell controller\n"
        ));
    }

    #[test]
    fn ingest_deltas_only_move_forward() {
        let runt = FRAMES_TOTAL.with_label_values(&["runt"]);
        let start = runt.get();
        let malformed_start = MALFORMED_RECORDS.get();
        let first = IngestStats {
            runt_frames: 3,
            malformed_records: 2,
            ..Default::default()
        };
        publish_ingest(&IngestStats::default(), &first, true);
        publish_ingest(&first, &first, true);
        assert_eq!(runt.get() - start, 3);
        assert_eq!(MALFORMED_RECORDS.get() - malformed_start, 2);
        assert_eq!(INGEST_RUNNING.get(), 1);
    }
}
