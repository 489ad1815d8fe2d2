//! Channel catalogue
//!
//! One variant per numeric CSV column, in column order. Units and comments
//! end up in the MDF4 TX blocks; clip bounds drive both the generator and
//! the verifier.

use std::fmt;
use std::str::FromStr;

use crate::Error;

/// Name of the lap index column appended after the channels
pub const LAP_COLUMN: &str = "lap";

/// Name of the setup label column appended after the lap index
pub const SETUP_COLUMN: &str = "setup";

/// Numeric telemetry channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[allow(missing_docs)]
pub enum Channel {
    Time,
    EngineRpm,
    EngineTorque,
    Throttle,
    Gear,
    Speed,
    AccelLon,
    AccelLat,
    WheelSlip,
    BrakePressure,
    BrakeTemperature,
    BrakeBalance,
    SuspensionFl,
    SuspensionFr,
    SuspensionRl,
    SuspensionRr,
    TireTempFl,
    TireTempFr,
    TireTempRl,
    TireTempRr,
    TirePressureFl,
    TirePressureFr,
    TirePressureRl,
    TirePressureRr,
    AccelVert,
    GyroRoll,
    GyroPitch,
    GyroYaw,
    AeroDownforce,
    AeroDrag,
    Volatility,
    GearRatioEfficiency,
    EngineEfficiency,
    BatteryVoltage,
    BatteryCurrent,
}

/// Static metadata of a channel.
struct Meta {
    name: &'static str,
    unit: &'static str,
    comment: &'static str,
    bounds: Option<(f64, f64)>,
}

const fn meta(
    name: &'static str,
    unit: &'static str,
    comment: &'static str,
    bounds: Option<(f64, f64)>,
) -> Meta {
    Meta {
        name,
        unit,
        comment,
        bounds,
    }
}

const TIRE_PRESSURE_BOUNDS: Option<(f64, f64)> = Some((1.5, 3.0));

impl Channel {
    /// Number of numeric channels
    pub const COUNT: usize = 35;

    /// Every channel in CSV column order
    pub const ALL: [Self; Self::COUNT] = [
        Self::Time,
        Self::EngineRpm,
        Self::EngineTorque,
        Self::Throttle,
        Self::Gear,
        Self::Speed,
        Self::AccelLon,
        Self::AccelLat,
        Self::WheelSlip,
        Self::BrakePressure,
        Self::BrakeTemperature,
        Self::BrakeBalance,
        Self::SuspensionFl,
        Self::SuspensionFr,
        Self::SuspensionRl,
        Self::SuspensionRr,
        Self::TireTempFl,
        Self::TireTempFr,
        Self::TireTempRl,
        Self::TireTempRr,
        Self::TirePressureFl,
        Self::TirePressureFr,
        Self::TirePressureRl,
        Self::TirePressureRr,
        Self::AccelVert,
        Self::GyroRoll,
        Self::GyroPitch,
        Self::GyroYaw,
        Self::AeroDownforce,
        Self::AeroDrag,
        Self::Volatility,
        Self::GearRatioEfficiency,
        Self::EngineEfficiency,
        Self::BatteryVoltage,
        Self::BatteryCurrent,
    ];

    /// Column position
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    const fn meta(self) -> Meta {
        match self {
            Self::Time => meta("time", "s", "Time since start of session", None),
            Self::EngineRpm => meta(
                "engine_rpm",
                "rpm",
                "Crankshaft speed",
                Some((3000.0, 18500.0)),
            ),
            Self::EngineTorque => meta("engine_torque_nm", "Nm", "Engine torque at crank", None),
            Self::Throttle => meta(
                "throttle_position",
                "-",
                "Throttle opening (0 closed, 1 wide open)",
                Some((0.0, 1.0)),
            ),
            Self::Gear => meta("gear_position", "-", "Engaged gear", Some((2.0, 6.0))),
            Self::Speed => meta("speed_kmh", "km/h", "Vehicle speed", None),
            Self::AccelLon => meta("accel_lon_g", "g", "Longitudinal acceleration", None),
            Self::AccelLat => meta("accel_lat_g", "g", "Lateral acceleration", None),
            Self::WheelSlip => meta(
                "wheel_slip_percent",
                "%",
                "Rear wheel slip ratio",
                Some((0.0, 30.0)),
            ),
            Self::BrakePressure => meta(
                "brake_pressure_bar",
                "bar",
                "Front brake line pressure",
                None,
            ),
            Self::BrakeTemperature => meta(
                "brake_temperature_c",
                "degC",
                "Front disc temperature",
                None,
            ),
            Self::BrakeBalance => meta("brake_balance_percent", "%", "Front brake bias", None),
            Self::SuspensionFl => meta(
                "suspension_fl_travel_mm",
                "mm",
                "Suspension travel front left",
                None,
            ),
            Self::SuspensionFr => meta(
                "suspension_fr_travel_mm",
                "mm",
                "Suspension travel front right",
                None,
            ),
            Self::SuspensionRl => meta(
                "suspension_rl_travel_mm",
                "mm",
                "Suspension travel rear left",
                None,
            ),
            Self::SuspensionRr => meta(
                "suspension_rr_travel_mm",
                "mm",
                "Suspension travel rear right",
                None,
            ),
            Self::TireTempFl => meta(
                "tire_temp_fl_c",
                "degC",
                "Tire carcass temperature front left",
                None,
            ),
            Self::TireTempFr => meta(
                "tire_temp_fr_c",
                "degC",
                "Tire carcass temperature front right",
                None,
            ),
            Self::TireTempRl => meta(
                "tire_temp_rl_c",
                "degC",
                "Tire carcass temperature rear left",
                None,
            ),
            Self::TireTempRr => meta(
                "tire_temp_rr_c",
                "degC",
                "Tire carcass temperature rear right",
                None,
            ),
            Self::TirePressureFl => meta(
                "tire_pressure_fl_bar",
                "bar",
                "Tire pressure front left",
                TIRE_PRESSURE_BOUNDS,
            ),
            Self::TirePressureFr => meta(
                "tire_pressure_fr_bar",
                "bar",
                "Tire pressure front right",
                TIRE_PRESSURE_BOUNDS,
            ),
            Self::TirePressureRl => meta(
                "tire_pressure_rl_bar",
                "bar",
                "Tire pressure rear left",
                TIRE_PRESSURE_BOUNDS,
            ),
            Self::TirePressureRr => meta(
                "tire_pressure_rr_bar",
                "bar",
                "Tire pressure rear right",
                TIRE_PRESSURE_BOUNDS,
            ),
            Self::AccelVert => meta("accel_vert_g", "g", "Vertical acceleration", None),
            Self::GyroRoll => meta("gyro_roll_dps", "deg/s", "Roll rate", None),
            Self::GyroPitch => meta("gyro_pitch_dps", "deg/s", "Pitch rate", None),
            Self::GyroYaw => meta("gyro_yaw_dps", "deg/s", "Yaw rate", None),
            Self::AeroDownforce => meta("aero_downforce_n", "N", "Aerodynamic downforce", None),
            Self::AeroDrag => meta("aero_drag_n", "N", "Aerodynamic drag", None),
            Self::Volatility => meta(
                "glicko_volatility_sigma",
                "-",
                "Volatility proxy sigma (instability of the setup)",
                Some((0.01, 0.6)),
            ),
            Self::GearRatioEfficiency => meta(
                "gear_ratio_efficiency_percent",
                "%",
                "Gearbox transmission efficiency",
                None,
            ),
            Self::EngineEfficiency => meta(
                "engine_efficiency_percent",
                "%",
                "Engine thermal efficiency",
                Some((70.0, 98.0)),
            ),
            Self::BatteryVoltage => meta(
                "battery_voltage_v",
                "V",
                "Auxiliary battery voltage",
                None,
            ),
            Self::BatteryCurrent => meta(
                "battery_current_a",
                "A",
                "Auxiliary battery current",
                None,
            ),
        }
    }

    /// CSV column name
    #[must_use]
    pub const fn name(self) -> &'static str {
        self.meta().name
    }

    /// Physical unit
    #[must_use]
    pub const fn unit(self) -> &'static str {
        self.meta().unit
    }

    /// Human-readable description
    #[must_use]
    pub const fn comment(self) -> &'static str {
        self.meta().comment
    }

    /// Documented clip bounds, if the channel is clipped
    #[must_use]
    pub const fn bounds(self) -> Option<(f64, f64)> {
        self.meta().bounds
    }

    /// Whether values are whole numbers (written without a fraction)
    #[must_use]
    pub const fn is_integral(self) -> bool {
        matches!(self, Self::Gear)
    }

    /// Clip a value to the channel bounds; unbounded channels pass through.
    #[must_use]
    pub fn clip(self, value: f64) -> f64 {
        match self.bounds() {
            Some((lo, hi)) => value.clamp(lo, hi),
            None => value,
        }
    }

    /// Look up a channel by its CSV column name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.name() == name)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Channel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| Error::InvalidInput(format!("unknown channel '{s}'")))
    }
}

/// Full CSV header: every channel followed by `lap` and `setup`.
#[must_use]
pub fn csv_header() -> Vec<&'static str> {
    Channel::ALL
        .iter()
        .map(|c| c.name())
        .chain([LAP_COLUMN, SETUP_COLUMN])
        .collect()
}
