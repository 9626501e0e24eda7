use serde_json::Value;

use crate::types::*;

const TEMPERATURE_EPSILON: f64 = 0.05;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct JsonChange {
    pub path: String,
    pub old: Value,
    pub new: Value,
}

pub(crate) fn diff_json(previous: &Value, current: &Value) -> Vec<JsonChange> {
    let mut changes = Vec::new();
    walk(previous, current, String::new(), &mut changes);
    changes
}

fn walk(previous: &Value, current: &Value, path: String, changes: &mut Vec<JsonChange>) {
    let child = |key: &str| {
        if path.is_empty() {
            key.to_string()
        } else {
            format!("{path}.{key}")
        }
    };

    match (previous, current) {
        (Value::Object(old), Value::Object(new)) => {
            for (key, value) in new {
                walk(old.get(key).unwrap_or(&Value::Null), value, child(key), changes);
            }
            for (key, value) in old.iter().filter(|(k, _)| !new.contains_key(*k)) {
                walk(value, &Value::Null, child(key), changes);
            }
        }
        (Value::Array(old), Value::Array(new)) if old.len() == new.len() => {
            for (i, (a, b)) in old.iter().zip(new).enumerate() {
                walk(a, b, child(&i.to_string()), changes);
            }
        }
        (Value::Null, Value::Object(new)) => {
            for (key, value) in new {
                walk(&Value::Null, value, child(key), changes);
            }
        }
        (old, new) if old != new => changes.push(JsonChange {
            path: path.clone(),
            old: old.clone(),
            new: new.clone(),
        }),
        _ => {}
    }
}

pub(crate) fn status_events(previous: Option<&DeviceStatus>, current: &DeviceStatus) -> Vec<Event> {
    let mut events = Vec::new();

    if previous.is_none_or(|p| p.mode != current.mode) {
        events.push(Event::ModeChanged { mode: current.mode });
    }
    if previous.is_none_or(|p| moved(p.temperature, current.temperature)) {
        events.push(Event::TemperatureChanged {
            temp: current.temperature,
        });
    }
    if previous.is_none_or(|p| moved(p.target_temperature, current.target_temperature)) {
        events.push(Event::TargetTemperatureChanged {
            temp: current.target_temperature,
        });
    }

    events
}

fn moved(old: Temperature, new: Temperature) -> bool {
    (old.celsius() - new.celsius()).abs() >= TEMPERATURE_EPSILON
}
