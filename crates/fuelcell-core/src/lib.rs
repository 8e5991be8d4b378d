pub mod aggregate;
pub mod channel;
pub mod decoder;
pub mod ingest;
pub mod lifecycle;
pub mod source;
#[cfg(feature = "simulation")]
pub mod source_sim;
pub mod sync;
pub mod tags;
pub mod timebase;

pub use aggregate::ChannelStore;
pub use channel::{
    BoundedStats, Channel, ChannelId, ChannelKind, ChannelSample, Generation, SampleValues,
    Statistic,
};
pub use decoder::{decode, ChannelUpdate, FrameDecoder, FrameDisposition, MessageIds};
pub use ingest::{IngestConfig, IngestCounters, IngestStats, IngestThread};
pub use lifecycle::{Monitor, StartError, StopError};
pub use source::{FrameSource, RawFrame, SourceError};
#[cfg(feature = "simulation")]
pub use source_sim::{SimulatedBus, SimulatorConfig};
pub use sync::SharedStore;
pub use timebase::TimeBase;
