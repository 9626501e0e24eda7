use std::fmt;

use chrono::{DateTime, Utc};

/// Temperature stored as Celsius internally.
/// The device accepts whole-degree Celsius setpoints.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Temperature(f64);

impl Temperature {
    pub fn from_celsius(c: f64) -> Self {
        Self(c)
    }

    pub fn from_fahrenheit(f: f64) -> Self {
        Self((f - 32.0) * (5.0 / 9.0))
    }

    pub fn celsius(&self) -> f64 {
        self.0
    }

    pub fn fahrenheit(&self) -> f64 {
        self.0 * (9.0 / 5.0) + 32.0
    }

    /// Value expressed in the given display units.
    pub fn in_units(&self, units: DisplayUnits) -> f64 {
        match units {
            DisplayUnits::Celsius => self.celsius(),
            DisplayUnits::Fahrenheit => self.fahrenheit(),
        }
    }

    /// Round to device precision (whole degrees C).
    pub fn to_device_celsius(&self) -> f64 {
        self.0.round()
    }

    pub fn display(&self, units: DisplayUnits) -> String {
        match units {
            DisplayUnits::Celsius => format!("{:.1}\u{00b0}C", self.celsius()),
            DisplayUnits::Fahrenheit => format!("{:.1}\u{00b0}F", self.fahrenheit()),
        }
    }
}

impl fmt::Display for Temperature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}\u{00b0}C", self.0)
    }
}

/// Platform heating/cooling state, used for both the current and the target
/// characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HeatingCoolingState {
    #[default]
    Off,
    Heat,
    Cool,
    Auto,
}

impl HeatingCoolingState {
    pub fn as_u8(&self) -> u8 {
        match self {
            HeatingCoolingState::Off => 0,
            HeatingCoolingState::Heat => 1,
            HeatingCoolingState::Cool => 2,
            HeatingCoolingState::Auto => 3,
        }
    }

    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(HeatingCoolingState::Off),
            1 => Some(HeatingCoolingState::Heat),
            2 => Some(HeatingCoolingState::Cool),
            3 => Some(HeatingCoolingState::Auto),
            _ => None,
        }
    }

    /// Maps a device-reported mode. Anything the accessory does not model
    /// (dry, fan, unknown ids, no mode at all) reads as off.
    pub fn from_device_mode(mode: Option<DeviceMode>) -> Self {
        match mode {
            Some(DeviceMode::Cool) => HeatingCoolingState::Cool,
            Some(DeviceMode::Heat) => HeatingCoolingState::Heat,
            Some(DeviceMode::Auto) => HeatingCoolingState::Auto,
            _ => HeatingCoolingState::Off,
        }
    }

    /// Vendor mode for a `set_mode` call. `None` for off, which is a separate
    /// device call.
    pub fn device_mode(&self) -> Option<DeviceMode> {
        match self {
            HeatingCoolingState::Off => None,
            HeatingCoolingState::Heat => Some(DeviceMode::Heat),
            HeatingCoolingState::Cool => Some(DeviceMode::Cool),
            HeatingCoolingState::Auto => Some(DeviceMode::Auto),
        }
    }
}

impl fmt::Display for HeatingCoolingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HeatingCoolingState::Off => "off",
            HeatingCoolingState::Heat => "heat",
            HeatingCoolingState::Cool => "cool",
            HeatingCoolingState::Auto => "auto",
        };
        f.write_str(s)
    }
}

/// Mode ids understood by the BGH Smart cloud.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceMode {
    Off,
    Cool,
    Heat,
    Dry,
    Fan,
    Auto,
}

impl DeviceMode {
    pub fn id(&self) -> u8 {
        match self {
            DeviceMode::Off => 0,
            DeviceMode::Cool => 1,
            DeviceMode::Heat => 2,
            DeviceMode::Dry => 3,
            DeviceMode::Fan => 4,
            DeviceMode::Auto => 254,
        }
    }

    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(DeviceMode::Off),
            1 => Some(DeviceMode::Cool),
            2 => Some(DeviceMode::Heat),
            3 => Some(DeviceMode::Dry),
            4 => Some(DeviceMode::Fan),
            254 => Some(DeviceMode::Auto),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisplayUnits {
    #[default]
    Celsius,
    Fahrenheit,
}

impl DisplayUnits {
    pub fn as_u8(&self) -> u8 {
        match self {
            DisplayUnits::Celsius => 0,
            DisplayUnits::Fahrenheit => 1,
        }
    }

    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(DisplayUnits::Celsius),
            1 => Some(DisplayUnits::Fahrenheit),
            _ => None,
        }
    }
}

/// Status exactly as reported by the device.
#[derive(Debug, Clone, PartialEq)]
pub struct RawStatus {
    pub mode_id: Option<u8>,
    pub temperature: f64,
    pub target_temperature: f64,
}

/// One device poll, mapped into accessory terms.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceStatus {
    pub temperature: Temperature,
    pub target_temperature: Temperature,
    pub mode: HeatingCoolingState,
    pub fetched_at: DateTime<Utc>,
}

impl DeviceStatus {
    pub fn from_raw(raw: &RawStatus, fetched_at: DateTime<Utc>) -> Self {
        let mode = HeatingCoolingState::from_device_mode(raw.mode_id.and_then(DeviceMode::from_id));
        Self {
            temperature: Temperature::from_celsius(raw.temperature),
            target_temperature: Temperature::from_celsius(raw.target_temperature),
            mode,
            fetched_at,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceInfo {
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub serial_number: Option<String>,
}

/// Emitted when a refresh observes a change from the previous status.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    ModeChanged { mode: HeatingCoolingState },
    TemperatureChanged { temp: Temperature },
    TargetTemperatureChanged { temp: Temperature },
}
