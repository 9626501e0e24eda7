use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, trace, warn};

use crate::cache::{CacheOptions, StatusCache};
use crate::client::DeviceApi;
use crate::config::AccessoryConfig;
use crate::debounce::{CommandDebouncer, DebounceOptions, PendingCommand};
use crate::diff::status_events;
use crate::platform::{
    Callback, Characteristic, CharacteristicProps, CharacteristicSink, CharacteristicValue,
    NullSink,
};
use crate::task::ScheduledTask;
use crate::types::*;
use crate::{Error, Result};

type EventCallback = Box<dyn Fn(&Event) + Send + Sync>;

const TARGET_STATES: &[u8] = &[0, 1, 2, 3];
const DISPLAY_UNITS: &[u8] = &[0];

/// Accessory information service contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessoryInformation {
    pub name: String,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub serial_number: Option<String>,
}

pub struct ThermostatBuilder {
    device: Arc<dyn DeviceApi>,
    config: AccessoryConfig,
    sink: Arc<dyn CharacteristicSink>,
    event_callbacks: Vec<EventCallback>,
}

impl ThermostatBuilder {
    pub fn new(device: Arc<dyn DeviceApi>, config: AccessoryConfig) -> Self {
        Self {
            device,
            config,
            sink: Arc::new(NullSink),
            event_callbacks: Vec::new(),
        }
    }

    pub fn sink(mut self, sink: Arc<dyn CharacteristicSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn on_event(mut self, f: impl Fn(&Event) + Send + Sync + 'static) -> Self {
        self.event_callbacks.push(Box::new(f));
        self
    }

    /// Spawns the startup login, the cache sweeper and (if enabled) the
    /// auto-refresh loop, so it must run inside a Tokio runtime.
    pub fn build(self) -> Thermostat {
        let config = self.config;
        let cache = StatusCache::new(
            self.device.clone(),
            CacheOptions {
                ttl: config.cache_ttl(),
                device_timeout: config.device_timeout(),
                wait_timeout: config.fetch_wait_timeout(),
            },
        );
        let debouncer = CommandDebouncer::new(
            self.device.clone(),
            self.sink.clone(),
            Some(cache.clone()),
            DebounceOptions {
                quiet_period: config.debounce(),
                device_timeout: config.device_timeout(),
            },
        );

        let inner = Arc::new(ThermostatInner {
            temperature_props: CharacteristicProps::range(
                config.min_temperature,
                config.max_temperature,
                1.0,
            ),
            config,
            device: self.device,
            cache,
            debouncer,
            sink: self.sink,
            units: Mutex::new(DisplayUnits::Celsius),
            info: RwLock::new(DeviceInfo::default()),
            last_status: Mutex::new(None),
            event_callbacks: self.event_callbacks,
            init: Mutex::new(ScheduledTask::new()),
            sweeper: Mutex::new(ScheduledTask::new()),
            refresher: Mutex::new(ScheduledTask::new()),
        });
        info!(name = %inner.config.name, "thermostat accessory created");

        let check_period = inner.config.cache_check_period();
        if !check_period.is_zero() {
            inner
                .sweeper
                .lock()
                .replace(inner.cache.spawn_sweeper(check_period));
        }

        inner
            .init
            .lock()
            .replace(tokio::spawn(initialize(Arc::downgrade(&inner))));

        if inner.config.auto_refresh_enabled {
            let interval = inner.config.refresh_interval();
            inner
                .refresher
                .lock()
                .replace(tokio::spawn(auto_refresh(Arc::downgrade(&inner), interval)));
        }

        Thermostat { inner }
    }
}

struct ThermostatInner {
    config: AccessoryConfig,
    device: Arc<dyn DeviceApi>,
    cache: StatusCache,
    debouncer: CommandDebouncer,
    sink: Arc<dyn CharacteristicSink>,
    units: Mutex<DisplayUnits>,
    temperature_props: CharacteristicProps,
    info: RwLock<DeviceInfo>,
    last_status: Mutex<Option<DeviceStatus>>,
    event_callbacks: Vec<EventCallback>,
    init: Mutex<ScheduledTask>,
    sweeper: Mutex<ScheduledTask>,
    refresher: Mutex<ScheduledTask>,
}

#[derive(Clone)]
pub struct Thermostat {
    inner: Arc<ThermostatInner>,
}

impl Thermostat {
    pub fn builder(device: Arc<dyn DeviceApi>, config: AccessoryConfig) -> ThermostatBuilder {
        ThermostatBuilder::new(device, config)
    }

    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    pub fn identify(&self) -> Result<()> {
        info!(name = %self.inner.config.name, "identify requested");
        Ok(())
    }

    pub fn information(&self) -> AccessoryInformation {
        let info = self.inner.info.read();
        AccessoryInformation {
            name: self.inner.config.name.clone(),
            manufacturer: info.manufacturer.clone(),
            model: info.model.clone(),
            serial_number: info.serial_number.clone(),
        }
    }

    pub fn pending_command(&self) -> Option<PendingCommand> {
        self.inner.debouncer.pending()
    }

    pub fn props(&self, characteristic: Characteristic) -> Option<CharacteristicProps> {
        match characteristic {
            Characteristic::TargetHeatingCoolingState => {
                Some(CharacteristicProps::valid_values(TARGET_STATES))
            }
            Characteristic::TargetTemperature => Some(self.inner.temperature_props.clone()),
            Characteristic::TemperatureDisplayUnits => {
                Some(CharacteristicProps::valid_values(DISPLAY_UNITS))
            }
            _ => None,
        }
    }

    pub async fn get_current_heating_cooling_state(&self) -> Result<HeatingCoolingState> {
        Ok(self.inner.read_status().await?.mode)
    }

    pub async fn get_target_heating_cooling_state(&self) -> Result<HeatingCoolingState> {
        Ok(self.inner.read_status().await?.mode)
    }

    pub async fn get_current_temperature(&self) -> Result<f64> {
        let status = self.inner.read_status().await?;
        debug!(
            temperature = %status.temperature.display(self.get_temperature_display_units()),
            "current temperature"
        );
        Ok(status.temperature.celsius())
    }

    pub async fn get_target_temperature(&self) -> Result<f64> {
        Ok(self.inner.read_status().await?.target_temperature.celsius())
    }

    pub fn get_temperature_display_units(&self) -> DisplayUnits {
        *self.inner.units.lock()
    }

    /// Unknown state codes are logged and dropped, not rejected.
    pub fn set_target_heating_cooling_state(&self, value: u8) -> Result<()> {
        match HeatingCoolingState::from_u8(value) {
            Some(state) => {
                debug!(mode = %state, "target state written");
                self.inner.debouncer.request_change(Some(state), None);
            }
            None => warn!(value, "not handled target state, ignoring"),
        }
        Ok(())
    }

    pub fn set_target_temperature(&self, value: f64) -> Result<()> {
        let temperature = self.inner.temperature_props.validate(value).map_err(|reason| {
            Error::InvalidValue {
                characteristic: Characteristic::TargetTemperature,
                reason,
            }
        })?;
        debug!(temperature, "target temperature written");
        self.inner.debouncer.request_change(None, Some(temperature));
        Ok(())
    }

    pub fn set_temperature_display_units(&self, value: u8) -> Result<()> {
        let invalid = |reason: String| Error::InvalidValue {
            characteristic: Characteristic::TemperatureDisplayUnits,
            reason,
        };
        CharacteristicProps::valid_values(DISPLAY_UNITS)
            .validate(f64::from(value))
            .map_err(invalid)?;
        let units = DisplayUnits::from_u8(value)
            .ok_or_else(|| invalid(format!("unknown units {value}")))?;
        debug!(?units, "display units written");
        *self.inner.units.lock() = units;
        Ok(())
    }

    pub async fn get(&self, characteristic: Characteristic) -> Result<CharacteristicValue> {
        Ok(match characteristic {
            Characteristic::CurrentHeatingCoolingState => {
                CharacteristicValue::state(self.get_current_heating_cooling_state().await?)
            }
            Characteristic::TargetHeatingCoolingState => {
                CharacteristicValue::state(self.get_target_heating_cooling_state().await?)
            }
            Characteristic::CurrentTemperature => {
                CharacteristicValue::Temperature(self.get_current_temperature().await?)
            }
            Characteristic::TargetTemperature => {
                CharacteristicValue::Temperature(self.get_target_temperature().await?)
            }
            Characteristic::TemperatureDisplayUnits => {
                CharacteristicValue::units(self.get_temperature_display_units())
            }
        })
    }

    pub fn set(&self, characteristic: Characteristic, value: CharacteristicValue) -> Result<()> {
        match (characteristic, value) {
            (Characteristic::TargetHeatingCoolingState, CharacteristicValue::State(v)) => {
                self.set_target_heating_cooling_state(v)
            }
            (Characteristic::TargetTemperature, CharacteristicValue::Temperature(t)) => {
                self.set_target_temperature(t)
            }
            (Characteristic::TemperatureDisplayUnits, CharacteristicValue::Units(v)) => {
                self.set_temperature_display_units(v)
            }
            (c, v) if c.is_writable() => Err(Error::InvalidValue {
                characteristic: c,
                reason: format!("wrong value type {v:?}"),
            }),
            (c, _) => Err(Error::ReadOnly(c)),
        }
    }

    /// Runs a read and hands the result to `callback` exactly once.
    pub fn get_with_callback(
        &self,
        characteristic: Characteristic,
        callback: Callback<CharacteristicValue>,
    ) {
        let this = self.clone();
        tokio::spawn(async move {
            callback(this.get(characteristic).await);
        });
    }

    /// Applies a write and hands the result to `callback` exactly once.
    /// Writes never wait for the device, so the callback fires immediately.
    pub fn set_with_callback(
        &self,
        characteristic: Characteristic,
        value: CharacteristicValue,
        callback: Callback<()>,
    ) {
        callback(self.set(characteristic, value));
    }

    /// Forces one refresh cycle now, as the auto-refresh loop would. Nothing
    /// is pushed to the sink while a write is still settling.
    pub async fn refresh(&self) -> Result<DeviceStatus> {
        let status = self.inner.read_status().await?;
        if !self.inner.debouncer.is_settling() {
            self.inner.publish(&status);
        }
        Ok(status)
    }
}

impl ThermostatInner {
    async fn read_status(&self) -> Result<DeviceStatus> {
        read_through(&self.cache, &self.debouncer).await
    }

    fn load_information(&self) {
        let mut info = self.info.write();
        info.manufacturer = self.device.manufacturer();
        info.model = self.device.model();
        info.serial_number = self.device.serial_number();
    }

    fn publish(&self, status: &DeviceStatus) {
        let state = CharacteristicValue::state(status.mode);
        self.sink
            .update(Characteristic::CurrentHeatingCoolingState, state);
        self.sink
            .update(Characteristic::TargetHeatingCoolingState, state);
        self.sink.update(
            Characteristic::CurrentTemperature,
            CharacteristicValue::Temperature(status.temperature.celsius()),
        );
        self.sink.update(
            Characteristic::TargetTemperature,
            CharacteristicValue::Temperature(status.target_temperature.celsius()),
        );

        let events = {
            let mut last = self.last_status.lock();
            let events = status_events(last.as_ref(), status);
            *last = Some(status.clone());
            events
        };
        for event in &events {
            for cb in &self.event_callbacks {
                cb(event);
            }
        }
    }
}

async fn read_through(cache: &StatusCache, debouncer: &CommandDebouncer) -> Result<DeviceStatus> {
    let status = cache.read().await?;
    debouncer.observe(status.mode, status.target_temperature.celsius());
    Ok(status)
}

// Background tasks hold only these clones across awaits, never the
// accessory itself.
fn handles(weak: &Weak<ThermostatInner>) -> Option<(StatusCache, CommandDebouncer)> {
    weak.upgrade()
        .map(|inner| (inner.cache.clone(), inner.debouncer.clone()))
}

// Login and first poll are best effort: on failure the accessory keeps
// running without manufacturer, model or serial number.
async fn initialize(weak: Weak<ThermostatInner>) {
    let Some((device, config)) = weak
        .upgrade()
        .map(|inner| (inner.device.clone(), inner.config.clone()))
    else {
        return;
    };

    if !config.email.is_empty() {
        let login = device.login(&config.email, &config.password);
        match tokio::time::timeout(config.device_timeout(), login).await {
            Ok(Ok(())) => info!("logged in"),
            Ok(Err(e)) => {
                warn!(error = %e, "login failed");
                return;
            }
            Err(_) => {
                warn!("login timed out");
                return;
            }
        }
    }

    let Some((cache, debouncer)) = handles(&weak) else {
        return;
    };
    let result = read_through(&cache, &debouncer).await;
    let Some(inner) = weak.upgrade() else {
        return;
    };
    match result {
        Ok(_) => {
            inner.load_information();
            debug!(info = ?*inner.info.read(), "accessory information loaded");
        }
        Err(e) => warn!(error = %e, "initial status fetch failed"),
    }
}

async fn auto_refresh(weak: Weak<ThermostatInner>, interval: Duration) {
    loop {
        tokio::time::sleep(interval).await;
        let Some((cache, debouncer)) = handles(&weak) else {
            break;
        };
        trace!("auto refresh triggered");
        let result = read_through(&cache, &debouncer).await;
        let Some(inner) = weak.upgrade() else {
            break;
        };
        match result {
            // The device may not have applied the last write yet; the sink
            // already holds the flushed values.
            Ok(_) if debouncer.is_settling() => trace!("write settling, refresh not published"),
            Ok(status) => inner.publish(&status),
            Err(e) => debug!(error = %e, "auto refresh failed"),
        }
    }
}
