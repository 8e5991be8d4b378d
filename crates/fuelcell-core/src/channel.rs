use crate::tags::{self, Tag};
use serde::{Deserialize, Serialize};

/// Sequence value stamped on a channel when it is updated.
pub type Generation = u32;

/// Closed set of measurement channels, in harvest order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ChannelId {
    #[serde(rename = "powerPackID")]
    PowerPackId,
    #[serde(rename = "accumulatedPower")]
    AccumulatedPower,
    #[serde(rename = "accumulatedHours")]
    AccumulatedHours,
    #[serde(rename = "refuelPort")]
    RefuelPort,
    #[serde(rename = "fuelLevel")]
    FuelLevel,
    #[serde(rename = "inputVoltage")]
    InputVoltage,
    #[serde(rename = "inputCurrent")]
    InputCurrent,
    #[serde(rename = "outputVoltage")]
    OutputVoltage,
    #[serde(rename = "outputCurrent")]
    OutputCurrent,
    #[serde(rename = "tankPressure")]
    TankPressure,
    #[serde(rename = "tankTemperature")]
    TankTemperature,
    #[serde(rename = "errorCode")]
    ErrorCode,
}

impl ChannelId {
    pub const COUNT: usize = 12;

    pub const ALL: [ChannelId; Self::COUNT] = [
        ChannelId::PowerPackId,
        ChannelId::AccumulatedPower,
        ChannelId::AccumulatedHours,
        ChannelId::RefuelPort,
        ChannelId::FuelLevel,
        ChannelId::InputVoltage,
        ChannelId::InputCurrent,
        ChannelId::OutputVoltage,
        ChannelId::OutputCurrent,
        ChannelId::TankPressure,
        ChannelId::TankTemperature,
        ChannelId::ErrorCode,
    ];

    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn kind(self) -> ChannelKind {
        match self {
            ChannelId::PowerPackId
            | ChannelId::RefuelPort
            | ChannelId::FuelLevel
            | ChannelId::ErrorCode => ChannelKind::InstantGauge,
            ChannelId::AccumulatedPower | ChannelId::AccumulatedHours => {
                ChannelKind::MonotonicCounter
            }
            ChannelId::InputVoltage
            | ChannelId::InputCurrent
            | ChannelId::OutputVoltage
            | ChannelId::OutputCurrent
            | ChannelId::TankPressure
            | ChannelId::TankTemperature => ChannelKind::BoundedGauge,
        }
    }

    pub const fn tag(self) -> Tag {
        match self {
            ChannelId::PowerPackId => tags::POWER_PACK_ID,
            ChannelId::AccumulatedPower => tags::ACCUMULATED_POWER,
            ChannelId::AccumulatedHours => tags::ACCUMULATED_HOURS,
            ChannelId::RefuelPort => tags::REFUEL_PORT,
            ChannelId::FuelLevel => tags::FUEL_LEVEL,
            ChannelId::InputVoltage => tags::INPUT_VOLTAGE,
            ChannelId::InputCurrent => tags::INPUT_CURRENT,
            ChannelId::OutputVoltage => tags::OUTPUT_VOLTAGE,
            ChannelId::OutputCurrent => tags::OUTPUT_CURRENT,
            ChannelId::TankPressure => tags::TANK_PRESSURE,
            ChannelId::TankTemperature => tags::TANK_TEMPERATURE,
            ChannelId::ErrorCode => tags::ERROR_CODE,
        }
    }

    /// Stable name handed to the host.
    pub const fn name(self) -> &'static str {
        self.tag().key
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|id| id.name() == name)
    }
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    InstantGauge,
    MonotonicCounter,
    BoundedGauge,
}

impl ChannelKind {
    /// Field layout of a harvested sample of this kind.
    pub const fn field_names(self) -> &'static [&'static str] {
        match self {
            ChannelKind::InstantGauge | ChannelKind::MonotonicCounter => &["value"],
            ChannelKind::BoundedGauge => &["value", "average", "lowest", "highest"],
        }
    }
}

/// Latest value plus min/avg/max over the current window.
///
/// `sum` and `count` are the window accumulators; they never leave the engine.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BoundedStats {
    pub value: f64,
    pub average: f64,
    pub lowest: f64,
    pub highest: f64,
    pub(crate) sum: f64,
    pub(crate) count: u32,
}

impl BoundedStats {
    pub fn sum(&self) -> f64 {
        self.sum
    }

    pub fn count(&self) -> u32 {
        self.count
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Statistic {
    InstantGauge { value: f64 },
    MonotonicCounter { value: f64 },
    BoundedGauge(BoundedStats),
}

impl Statistic {
    fn initial(kind: ChannelKind) -> Self {
        match kind {
            ChannelKind::InstantGauge => Statistic::InstantGauge { value: 0.0 },
            ChannelKind::MonotonicCounter => Statistic::MonotonicCounter { value: 0.0 },
            ChannelKind::BoundedGauge => Statistic::BoundedGauge(BoundedStats::default()),
        }
    }

    pub fn kind(&self) -> ChannelKind {
        match self {
            Statistic::InstantGauge { .. } => ChannelKind::InstantGauge,
            Statistic::MonotonicCounter { .. } => ChannelKind::MonotonicCounter,
            Statistic::BoundedGauge(_) => ChannelKind::BoundedGauge,
        }
    }

    /// Most recent decoded value, whatever the kind.
    pub fn value(&self) -> f64 {
        match self {
            Statistic::InstantGauge { value } | Statistic::MonotonicCounter { value } => *value,
            Statistic::BoundedGauge(stats) => stats.value,
        }
    }

    pub fn bounded(&self) -> Option<&BoundedStats> {
        match self {
            Statistic::BoundedGauge(stats) => Some(stats),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Channel {
    id: ChannelId,
    pub(crate) state: Statistic,
    pub(crate) generation: Option<Generation>,
    pub(crate) last_change_us: Option<u64>,
}

impl Channel {
    pub(crate) fn new(id: ChannelId) -> Self {
        Self {
            id,
            state: Statistic::initial(id.kind()),
            generation: None,
            last_change_us: None,
        }
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    pub fn state(&self) -> &Statistic {
        &self.state
    }

    /// Sequence value recorded at the last update; `None` until first touched.
    pub fn generation(&self) -> Option<Generation> {
        self.generation
    }

    /// Monotonic timestamp of the last update, informational only.
    pub fn last_change_us(&self) -> Option<u64> {
        self.last_change_us
    }

    pub fn is_dirty(&self, sequence: Generation) -> bool {
        self.generation == Some(sequence)
    }

    pub fn sample(&self) -> ChannelSample {
        let values = match self.state {
            Statistic::InstantGauge { value } | Statistic::MonotonicCounter { value } => {
                SampleValues::Single(value)
            }
            Statistic::BoundedGauge(stats) => SampleValues::Bounded {
                value: stats.value,
                average: stats.average,
                lowest: stats.lowest,
                highest: stats.highest,
            },
        };
        ChannelSample {
            channel: self.id,
            kind: self.state.kind(),
            values,
            last_change_us: self.last_change_us,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SampleValues {
    Single(f64),
    Bounded {
        value: f64,
        average: f64,
        lowest: f64,
        highest: f64,
    },
}

/// Observable fields of one dirty channel, copied out by a harvest.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelSample {
    pub channel: ChannelId,
    pub kind: ChannelKind,
    pub values: SampleValues,
    pub last_change_us: Option<u64>,
}

impl ChannelSample {
    pub fn name(&self) -> &'static str {
        self.channel.name()
    }

    pub fn value(&self) -> f64 {
        match self.values {
            SampleValues::Single(value) => value,
            SampleValues::Bounded { value, .. } => value,
        }
    }

    /// `(field name, value)` pairs matching `kind.field_names()`.
    pub fn fields(&self) -> Vec<(&'static str, f64)> {
        let names = self.kind.field_names();
        let values: Vec<f64> = match self.values {
            SampleValues::Single(value) => vec![value],
            SampleValues::Bounded {
                value,
                average,
                lowest,
                highest,
            } => vec![value, average, lowest, highest],
        };
        names.iter().copied().zip(values).collect()
    }
}
