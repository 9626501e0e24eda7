mod accessory;
mod cache;
mod client;
mod config;
mod debounce;
mod diff;
mod error;
mod logger;
mod platform;
mod protocol;
mod task;
mod types;

pub use accessory::{AccessoryInformation, Thermostat, ThermostatBuilder};
pub use cache::{CacheOptions, CacheState, StatusCache};
pub use client::{BghClient, BghClientBuilder, DeviceApi};
pub use config::AccessoryConfig;
pub use debounce::{CommandDebouncer, DebounceOptions, DeviceCommand, PendingCommand};
pub use error::{Error, Result};
pub use logger::MessageLogMode;
pub use platform::{
    Callback, Characteristic, CharacteristicProps, CharacteristicSink, CharacteristicValue,
    NullSink,
};
pub use types::*;
