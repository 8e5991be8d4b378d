use clap::Parser;
use fuelcell_core::MessageIds;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_INTERFACE: &str = "can0";
pub const DEFAULT_INTERVAL_MS: u64 = 10_000;
pub const DEFAULT_RETRY_MS: u64 = 1_000;

/// Fuel-cell CAN telemetry monitor: decodes power-pack frames and reports
/// per-channel statistics at a fixed harvest interval.
#[derive(Debug, Clone, Default, Parser)]
#[command(name = "fuelcell-monitor", version, about)]
pub struct Cli {
    /// SocketCAN interface to listen on [default: can0]
    #[arg(long, value_name = "IFACE")]
    pub interface: Option<String>,

    /// Generate frames from the built-in power-pack simulator
    #[arg(long, conflicts_with = "replay")]
    pub simulate: bool,

    /// Replay a candump log file instead of a live interface
    #[arg(long, value_name = "FILE")]
    pub replay: Option<PathBuf>,

    /// Pace replayed frames by their capture timestamps
    #[arg(long, requires = "replay")]
    pub replay_realtime: bool,

    /// Milliseconds between harvests [default: 10000]
    #[arg(long, value_name = "MS")]
    pub interval_ms: Option<u64>,

    /// Run for a fixed duration then exit
    #[arg(long, value_name = "SECS")]
    pub run_seconds: Option<u64>,

    /// Output logs in JSON format (for log aggregation)
    #[arg(long)]
    pub json_logs: bool,

    /// Enable Prometheus metrics server on address (e.g. 0.0.0.0:9090)
    #[arg(long, value_name = "ADDR")]
    pub metrics_addr: Option<String>,

    /// Append every harvest to a JSONL file
    #[arg(long, value_name = "PATH")]
    pub record: Option<PathBuf>,

    /// TOML file with message identifiers and source settings
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Milliseconds to wait before reopening an unavailable source [default: 1000]
    #[arg(long, value_name = "MS")]
    pub retry_ms: Option<u64>,

    /// Do not log each harvested sample
    #[arg(long)]
    pub quiet_samples: bool,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
    #[error("message identifiers must be distinct (identity 0x{identity:X}, electrical 0x{electrical:X}, tank 0x{tank:X})")]
    DuplicateIds {
        identity: u32,
        electrical: u32,
        tank: u32,
    },
}

/// On-disk configuration; every key is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub messages: MessageIds,
    pub source: SourceSection,
    pub harvest: HarvestSection,
    pub metrics: MetricsSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SourceSection {
    pub interface: Option<String>,
    pub retry_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HarvestSection {
    pub interval_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MetricsSection {
    pub addr: Option<String>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SourceChoice {
    Can { interface: String },
    Simulated,
    Replay { path: PathBuf, realtime: bool },
}

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub source: SourceChoice,
    pub message_ids: MessageIds,
    pub interval: Duration,
    pub retry_backoff: Duration,
    pub run_seconds: Option<u64>,
    pub json_logs: bool,
    pub metrics_addr: Option<String>,
    pub record_path: Option<PathBuf>,
    pub quiet_samples: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            source: SourceChoice::Can {
                interface: DEFAULT_INTERFACE.to_string(),
            },
            message_ids: MessageIds::default(),
            interval: Duration::from_millis(DEFAULT_INTERVAL_MS),
            retry_backoff: Duration::from_millis(DEFAULT_RETRY_MS),
            run_seconds: None,
            json_logs: false,
            metrics_addr: None,
            record_path: None,
            quiet_samples: false,
        }
    }
}

impl RuntimeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_cli(Cli::parse())
    }

    /// Merge the optional config file under the command line; flags win.
    pub fn from_cli(cli: Cli) -> Result<Self, ConfigError> {
        let file = match &cli.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        Self::merge(cli, file)
    }

    pub fn merge(cli: Cli, file: FileConfig) -> Result<Self, ConfigError> {
        let source = if cli.simulate {
            SourceChoice::Simulated
        } else if let Some(path) = cli.replay {
            SourceChoice::Replay {
                path,
                realtime: cli.replay_realtime,
            }
        } else {
            SourceChoice::Can {
                interface: cli
                    .interface
                    .or(file.source.interface)
                    .unwrap_or_else(|| DEFAULT_INTERFACE.to_string()),
            }
        };

        let interval_ms = cli
            .interval_ms
            .or(file.harvest.interval_ms)
            .unwrap_or(DEFAULT_INTERVAL_MS);
        if interval_ms == 0 {
            return Err(ConfigError::Zero("harvest interval"));
        }
        let retry_ms = cli
            .retry_ms
            .or(file.source.retry_ms)
            .unwrap_or(DEFAULT_RETRY_MS);
        if retry_ms == 0 {
            return Err(ConfigError::Zero("retry interval"));
        }

        let ids = file.messages;
        if ids.identity == ids.electrical || ids.identity == ids.tank || ids.electrical == ids.tank
        {
            return Err(ConfigError::DuplicateIds {
                identity: ids.identity,
                electrical: ids.electrical,
                tank: ids.tank,
            });
        }

        Ok(Self {
            source,
            message_ids: ids,
            interval: Duration::from_millis(interval_ms),
            retry_backoff: Duration::from_millis(retry_ms),
            run_seconds: cli.run_seconds,
            json_logs: cli.json_logs,
            metrics_addr: cli.metrics_addr.or(file.metrics.addr),
            record_path: cli.record,
            quiet_samples: cli.quiet_samples,
        })
    }
}
