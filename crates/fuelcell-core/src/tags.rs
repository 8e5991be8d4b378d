/// Stable external identity of one measurement channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tag {
    pub key: &'static str,
    pub metric: &'static str,
    pub help: &'static str,
    pub unit: &'static str,
}

pub const POWER_PACK_ID: Tag = Tag {
    key: "powerPackID",
    metric: "fuelcell_power_pack_id",
    help: "Power pack identity reported by the fuel-cell controller",
    unit: "",
};

pub const ACCUMULATED_POWER: Tag = Tag {
    key: "accumulatedPower",
    metric: "fuelcell_accumulated_power",
    help: "Accumulated energy delivered by the power pack",
    unit: "kWh",
};

pub const ACCUMULATED_HOURS: Tag = Tag {
    key: "accumulatedHours",
    metric: "fuelcell_accumulated_hours",
    help: "Accumulated operating hours of the power pack",
    unit: "h",
};

pub const REFUEL_PORT: Tag = Tag {
    key: "refuelPort",
    metric: "fuelcell_refuel_port_connected",
    help: "Refuelling port connector switch (1 = connected)",
    unit: "",
};

pub const FUEL_LEVEL: Tag = Tag {
    key: "fuelLevel",
    metric: "fuelcell_fuel_level",
    help: "Hydrogen fuel level",
    unit: "%",
};

pub const INPUT_VOLTAGE: Tag = Tag {
    key: "inputVoltage",
    metric: "fuelcell_input_voltage_volts",
    help: "Power pack input voltage",
    unit: "V",
};

pub const INPUT_CURRENT: Tag = Tag {
    key: "inputCurrent",
    metric: "fuelcell_input_current_amperes",
    help: "Power pack input current",
    unit: "A",
};

pub const OUTPUT_VOLTAGE: Tag = Tag {
    key: "outputVoltage",
    metric: "fuelcell_output_voltage_volts",
    help: "Power pack output voltage",
    unit: "V",
};

pub const OUTPUT_CURRENT: Tag = Tag {
    key: "outputCurrent",
    metric: "fuelcell_output_current_amperes",
    help: "Power pack output current",
    unit: "A",
};

pub const TANK_PRESSURE: Tag = Tag {
    key: "tankPressure",
    metric: "fuelcell_tank_pressure_bar",
    help: "Hydrogen tank pressure",
    unit: "bar",
};

pub const TANK_TEMPERATURE: Tag = Tag {
    key: "tankTemperature",
    metric: "fuelcell_tank_temperature_celsius",
    help: "Hydrogen tank temperature",
    unit: "°C",
};

pub const ERROR_CODE: Tag = Tag {
    key: "errorCode",
    metric: "fuelcell_error_code",
    help: "Last error code reported by the fuel-cell controller",
    unit: "",
};
