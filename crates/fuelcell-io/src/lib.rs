pub mod metrics;
pub mod protocol;
pub mod replay;
#[cfg(all(feature = "can-linux", target_os = "linux"))]
pub mod can;

pub use metrics::{init_metrics, publish_harvest, publish_ingest, serve_metrics};
pub use protocol::{HarvestMsg, ProtocolVersion, SampleMsg};
pub use replay::{parse_candump_line, CandumpRecord, ReplayError, ReplaySource};
#[cfg(all(feature = "can-linux", target_os = "linux"))]
pub use can::SocketCanSource;
