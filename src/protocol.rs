use serde_json::{Value, json};

use crate::types::{DeviceMode, RawStatus};
use crate::{Error, Result};

pub const DEFAULT_BASE_URL: &str = "https://bgh-services.solidmation.com";

pub const LOGIN_PATH: &str = "/control/LoginPage.aspx/DoStandardLogin";
pub const DATA_PACKET_PATH: &str = "/1.0/HomeCloudService.svc/GetDataPacket";
pub const SET_MODES_PATH: &str = "/1.0/HomeCloudCommandService.svc/HVACSetModes";

pub const MANUFACTURER: &str = "BGH";
pub const DEFAULT_MODEL: &str = "Smart Control Kit";

const VALUE_TYPE_TEMPERATURE: u64 = 13;
const VALUE_TYPE_TARGET_TEMPERATURE: u64 = 14;
const VALUE_TYPE_MODE: u64 = 15;

const FAN_MODE_AUTO: u8 = 254;
const FLAGS_ALL: u8 = 255;

/// What one data packet says about the configured endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct DevicePacket {
    pub status: RawStatus,
    pub model: Option<String>,
    pub serial_number: Option<String>,
}

pub fn login_body(email: &str, password: &str) -> Value {
    json!({
        "user": email,
        "password": password
    })
}

pub fn parse_login_response(body: &Value) -> Result<String> {
    match body.get("d").and_then(|v| v.as_str()) {
        Some(token) if !token.is_empty() => Ok(token.to_string()),
        Some(_) => Err(Error::LoginFailed("credentials rejected".to_string())),
        None => Err(Error::Protocol("login response missing token".to_string())),
    }
}

pub fn data_packet_body(token: &str, home_id: &str) -> Value {
    json!({
        "token": { "Token": token },
        "serviceId": id_value(home_id),
        "sequence": 1
    })
}

pub fn set_modes_body(token: &str, endpoint_id: &str, temperature: f64, mode: DeviceMode) -> Value {
    json!({
        "token": { "Token": token },
        "endpointID": id_value(endpoint_id),
        "desiredTempC": format!("{temperature}"),
        "mode": mode.id(),
        "fanMode": FAN_MODE_AUTO,
        "flags": FLAGS_ALL
    })
}

pub fn parse_data_packet(body: &Value, device_id: &str) -> Result<DevicePacket> {
    let packet = body
        .get("GetDataPacketResult")
        .ok_or_else(|| Error::Protocol("missing GetDataPacketResult".to_string()))?;

    let values = packet
        .get("EndpointValues")
        .and_then(|v| v.as_array())
        .and_then(|all| {
            all.iter()
                .find(|e| id_matches(e.get("EndpointID"), device_id))
        })
        .and_then(|e| e.get("Values"))
        .and_then(|v| v.as_array())
        .ok_or_else(|| Error::Protocol(format!("endpoint {device_id} not in data packet")))?;

    let value_of = |value_type: u64| {
        values
            .iter()
            .find(|v| v.get("ValueType").and_then(|t| t.as_u64()) == Some(value_type))
            .and_then(|v| v.get("Value"))
            .and_then(number)
    };

    let temperature = value_of(VALUE_TYPE_TEMPERATURE)
        .ok_or_else(|| Error::Protocol("no room temperature reported".to_string()))?;
    let target_temperature = value_of(VALUE_TYPE_TARGET_TEMPERATURE)
        .ok_or_else(|| Error::Protocol("no target temperature reported".to_string()))?;
    let mode_id = value_of(VALUE_TYPE_MODE)
        .filter(|m| (0.0..=255.0).contains(m))
        .map(|m| m as u8);

    let hardware = packet
        .get("Endpoints")
        .and_then(|v| v.as_array())
        .and_then(|all| all.iter().find(|e| id_matches(e.get("EndpointID"), device_id)))
        .and_then(|e| e.get("DeviceID"))
        .and_then(|device_ref| {
            packet
                .get("Devices")
                .and_then(|v| v.as_array())?
                .iter()
                .find(|d| d.get("DeviceID") == Some(device_ref))
        });

    let model = hardware
        .and_then(|d| d.get("DeviceModel"))
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    let serial_number = hardware
        .and_then(|d| d.get("Address"))
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    Ok(DevicePacket {
        status: RawStatus {
            mode_id,
            temperature,
            target_temperature,
        },
        model,
        serial_number,
    })
}

// The cloud sends ids as numbers; the config holds them as strings.
fn id_value(id: &str) -> Value {
    match id.parse::<u64>() {
        Ok(n) => json!(n),
        Err(_) => json!(id),
    }
}

fn id_matches(value: Option<&Value>, id: &str) -> bool {
    match value {
        Some(Value::Number(n)) => n.to_string() == id,
        Some(Value::String(s)) => s == id,
        _ => false,
    }
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
