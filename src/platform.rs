use std::fmt;

use crate::types::{DisplayUnits, HeatingCoolingState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Characteristic {
    CurrentHeatingCoolingState,
    TargetHeatingCoolingState,
    CurrentTemperature,
    TargetTemperature,
    TemperatureDisplayUnits,
}

impl Characteristic {
    pub fn is_writable(&self) -> bool {
        matches!(
            self,
            Characteristic::TargetHeatingCoolingState
                | Characteristic::TargetTemperature
                | Characteristic::TemperatureDisplayUnits
        )
    }
}

impl fmt::Display for Characteristic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Characteristic::CurrentHeatingCoolingState => "CurrentHeatingCoolingState",
            Characteristic::TargetHeatingCoolingState => "TargetHeatingCoolingState",
            Characteristic::CurrentTemperature => "CurrentTemperature",
            Characteristic::TargetTemperature => "TargetTemperature",
            Characteristic::TemperatureDisplayUnits => "TemperatureDisplayUnits",
        };
        f.write_str(s)
    }
}

/// Wire-level characteristic value. States and units travel as their
/// numeric platform codes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CharacteristicValue {
    State(u8),
    Temperature(f64),
    Units(u8),
}

impl CharacteristicValue {
    pub fn state(state: HeatingCoolingState) -> Self {
        CharacteristicValue::State(state.as_u8())
    }

    pub fn units(units: DisplayUnits) -> Self {
        CharacteristicValue::Units(units.as_u8())
    }

    pub fn as_f64(&self) -> f64 {
        match self {
            CharacteristicValue::State(v) | CharacteristicValue::Units(v) => f64::from(*v),
            CharacteristicValue::Temperature(t) => *t,
        }
    }
}

/// Range and step constraints advertised for a characteristic.
#[derive(Debug, Clone, PartialEq)]
pub struct CharacteristicProps {
    pub min_value: f64,
    pub max_value: f64,
    pub min_step: f64,
    pub valid_values: Option<Vec<u8>>,
}

impl CharacteristicProps {
    pub fn range(min_value: f64, max_value: f64, min_step: f64) -> Self {
        Self {
            min_value,
            max_value,
            min_step,
            valid_values: None,
        }
    }

    pub fn valid_values(values: &[u8]) -> Self {
        let min = values.iter().copied().min().unwrap_or(0);
        let max = values.iter().copied().max().unwrap_or(0);
        Self {
            min_value: f64::from(min),
            max_value: f64::from(max),
            min_step: 1.0,
            valid_values: Some(values.to_vec()),
        }
    }

    /// Checks a written value and snaps it to `min_step`.
    pub fn validate(&self, value: f64) -> std::result::Result<f64, String> {
        if !value.is_finite() {
            return Err(format!("not a number: {value}"));
        }
        if value < self.min_value || value > self.max_value {
            return Err(format!(
                "out of range: {value} not in {}..{}",
                self.min_value, self.max_value
            ));
        }
        if let Some(valid) = &self.valid_values
            && !valid.iter().any(|v| f64::from(*v) == value)
        {
            return Err(format!("{value} not one of {valid:?}"));
        }
        if self.min_step > 0.0 {
            let steps = ((value - self.min_value) / self.min_step).round();
            return Ok(self.min_value + steps * self.min_step);
        }
        Ok(value)
    }
}

/// Push channel into the platform's characteristic values (its `updateValue`).
pub trait CharacteristicSink: Send + Sync {
    fn update(&self, characteristic: Characteristic, value: CharacteristicValue);
}

/// Sink for accessories that are only queried, never pushed to.
pub struct NullSink;

impl CharacteristicSink for NullSink {
    fn update(&self, _characteristic: Characteristic, _value: CharacteristicValue) {}
}

/// Platform-side callback, invoked exactly once.
pub type Callback<T> = Box<dyn FnOnce(crate::Result<T>) + Send + 'static>;
