use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::{Value, json};
use tracing::{debug, trace};

use crate::logger::{MessageLogMode, MessageLogger};
use crate::protocol::{
    DATA_PACKET_PATH, DEFAULT_BASE_URL, DEFAULT_MODEL, LOGIN_PATH, MANUFACTURER, SET_MODES_PATH,
    data_packet_body, login_body, parse_data_packet, parse_login_response, set_modes_body,
};
use crate::types::*;
use crate::{Error, Result};

/// Setpoint sent with "off" when the device never reported one.
const FALLBACK_TARGET_C: f64 = 24.0;

/// The remote device as the accessory sees it.
#[async_trait]
pub trait DeviceApi: Send + Sync {
    async fn login(&self, email: &str, password: &str) -> Result<()>;
    async fn get_status(&self) -> Result<RawStatus>;
    async fn set_mode(&self, temperature: f64, mode: DeviceMode) -> Result<()>;
    async fn turn_off(&self) -> Result<()>;

    fn manufacturer(&self) -> Option<String>;
    fn model(&self) -> Option<String>;
    fn serial_number(&self) -> Option<String>;
}

pub struct BghClientBuilder {
    base_url: String,
    home_id: String,
    device_id: String,
    log_mode: Option<MessageLogMode>,
    log_path: Option<String>,
}

impl BghClientBuilder {
    pub fn new(home_id: impl Into<String>, device_id: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            home_id: home_id.into(),
            device_id: device_id.into(),
            log_mode: None,
            log_path: None,
        }
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn message_log(mut self, mode: MessageLogMode, path: impl Into<String>) -> Self {
        self.log_mode = Some(mode);
        self.log_path = Some(path.into());
        self
    }

    pub fn build(self) -> Result<BghClient> {
        let http = reqwest::Client::builder().build()?;

        let logger = match (self.log_mode, self.log_path) {
            (Some(mode), Some(path)) => Some(Mutex::new(MessageLogger::new(mode, &path)?)),
            _ => None,
        };

        Ok(BghClient {
            http,
            base_url: self.base_url,
            home_id: self.home_id,
            device_id: self.device_id,
            token: RwLock::new(None),
            info: RwLock::new(DeviceInfo::default()),
            last_target: Mutex::new(None),
            logger,
        })
    }
}

/// HTTP client for the BGH Smart cloud, bound to one home and one device.
pub struct BghClient {
    http: reqwest::Client,
    base_url: String,
    home_id: String,
    device_id: String,
    token: RwLock<Option<String>>,
    info: RwLock<DeviceInfo>,
    last_target: Mutex<Option<f64>>,
    logger: Option<Mutex<MessageLogger>>,
}

impl BghClient {
    pub fn builder(home_id: impl Into<String>, device_id: impl Into<String>) -> BghClientBuilder {
        BghClientBuilder::new(home_id, device_id)
    }

    pub fn is_logged_in(&self) -> bool {
        self.token.read().is_some()
    }

    pub fn device_info(&self) -> DeviceInfo {
        self.info.read().clone()
    }

    fn token(&self) -> Result<String> {
        self.token.read().clone().ok_or(Error::NotConnected)
    }

    fn log_request(&self, path: &str, body: Option<&Value>) {
        if let Some(logger) = &self.logger {
            logger.lock().log_request("POST", path, body);
        }
    }

    async fn send_mode(&self, action: &str, temperature: f64, mode: DeviceMode) -> Result<()> {
        let token = self.token()?;
        let temperature = Temperature::from_celsius(temperature).to_device_celsius();

        if let Some(logger) = &self.logger {
            logger.lock().log_command(
                action,
                &json!({ "mode": mode.id(), "desiredTempC": temperature }),
            );
        }

        let url = format!("{}{}", self.base_url, SET_MODES_PATH);
        debug!(action, mode = mode.id(), temperature, "sending mode to device");
        self.http
            .post(&url)
            .json(&set_modes_body(&token, &self.device_id, temperature, mode))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[async_trait]
impl DeviceApi for BghClient {
    async fn login(&self, email: &str, password: &str) -> Result<()> {
        let url = format!("{}{}", self.base_url, LOGIN_PATH);
        debug!(url = %url, "logging in to BGH cloud");
        self.log_request(LOGIN_PATH, None);

        let body: Value = self
            .http
            .post(&url)
            .json(&login_body(email, password))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let token = parse_login_response(&body)?;
        *self.token.write() = Some(token);
        Ok(())
    }

    async fn get_status(&self) -> Result<RawStatus> {
        let token = self.token()?;
        let url = format!("{}{}", self.base_url, DATA_PACKET_PATH);
        self.log_request(DATA_PACKET_PATH, Some(&json!({ "serviceId": self.home_id })));

        let resp = self
            .http
            .post(&url)
            .json(&data_packet_body(&token, &self.home_id))
            .send()
            .await?
            .error_for_status()?;
        let status = resp.status().as_u16();
        let body: Value = serde_json::from_str(&resp.text().await?)?;

        if let Some(logger) = &self.logger {
            logger.lock().log_status(status, &body);
        }

        let packet = parse_data_packet(&body, &self.device_id)?;
        trace!(?packet, "data packet parsed");

        {
            let mut info = self.info.write();
            info.manufacturer = Some(MANUFACTURER.to_string());
            info.model = Some(packet.model.unwrap_or_else(|| DEFAULT_MODEL.to_string()));
            if packet.serial_number.is_some() {
                info.serial_number = packet.serial_number;
            }
        }
        *self.last_target.lock() = Some(packet.status.target_temperature);

        Ok(packet.status)
    }

    async fn set_mode(&self, temperature: f64, mode: DeviceMode) -> Result<()> {
        self.send_mode("set_mode", temperature, mode).await
    }

    async fn turn_off(&self) -> Result<()> {
        let temperature = self.last_target.lock().unwrap_or(FALLBACK_TARGET_C);
        self.send_mode("turn_off", temperature, DeviceMode::Off).await
    }

    fn manufacturer(&self) -> Option<String> {
        self.info.read().manufacturer.clone()
    }

    fn model(&self) -> Option<String> {
        self.info.read().model.clone()
    }

    fn serial_number(&self) -> Option<String> {
        self.info.read().serial_number.clone()
    }
}
