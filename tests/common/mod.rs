#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bgh_smart::{
    Characteristic, CharacteristicSink, CharacteristicValue, DeviceApi, DeviceMode, Error,
    RawStatus, Result,
};
use parking_lot::Mutex;

#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCall {
    SetMode { temperature: f64, mode: DeviceMode },
    TurnOff,
}

/// In-memory device with scriptable latency and failures.
pub struct FakeDevice {
    status: Mutex<RawStatus>,
    status_delay: Mutex<Duration>,
    command_delay: Mutex<Duration>,
    status_failures: Mutex<VecDeque<()>>,
    status_calls: AtomicUsize,
    commands: Mutex<Vec<DeviceCall>>,
    fail_commands: AtomicBool,
    reject_login: AtomicBool,
    require_login: AtomicBool,
    logged_in: AtomicBool,
    polled: AtomicBool,
}

impl FakeDevice {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            status: Mutex::new(RawStatus {
                mode_id: Some(DeviceMode::Heat.id()),
                temperature: 21.5,
                target_temperature: 24.0,
            }),
            status_delay: Mutex::new(Duration::ZERO),
            command_delay: Mutex::new(Duration::ZERO),
            status_failures: Mutex::new(VecDeque::new()),
            status_calls: AtomicUsize::new(0),
            commands: Mutex::new(Vec::new()),
            fail_commands: AtomicBool::new(false),
            reject_login: AtomicBool::new(false),
            require_login: AtomicBool::new(false),
            logged_in: AtomicBool::new(false),
            polled: AtomicBool::new(false),
        })
    }

    pub fn set_status(&self, mode_id: Option<u8>, temperature: f64, target_temperature: f64) {
        *self.status.lock() = RawStatus {
            mode_id,
            temperature,
            target_temperature,
        };
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.status_delay.lock() = delay;
    }

    /// How long each command takes before the device applies it.
    pub fn set_command_delay(&self, delay: Duration) {
        *self.command_delay.lock() = delay;
    }

    pub fn fail_next_status(&self, times: usize) {
        let mut failures = self.status_failures.lock();
        for _ in 0..times {
            failures.push_back(());
        }
    }

    pub fn fail_commands(&self) {
        self.fail_commands.store(true, Ordering::SeqCst);
    }

    pub fn reject_login(&self) {
        self.reject_login.store(true, Ordering::SeqCst);
        self.require_login.store(true, Ordering::SeqCst);
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn commands(&self) -> Vec<DeviceCall> {
        self.commands.lock().clone()
    }

    // Records the call, waits out the command delay, then applies it to the
    // reported status unless commands are set to fail.
    async fn command(&self, call: DeviceCall) -> Result<()> {
        self.commands.lock().push(call.clone());
        let delay = *self.command_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.fail_commands.load(Ordering::SeqCst) {
            return Err(Error::Protocol("command rejected".to_string()));
        }
        let mut status = self.status.lock();
        match call {
            DeviceCall::SetMode { temperature, mode } => {
                status.mode_id = Some(mode.id());
                status.target_temperature = temperature;
            }
            DeviceCall::TurnOff => status.mode_id = Some(DeviceMode::Off.id()),
        }
        Ok(())
    }
}

#[async_trait]
impl DeviceApi for FakeDevice {
    async fn login(&self, _email: &str, _password: &str) -> Result<()> {
        if self.reject_login.load(Ordering::SeqCst) {
            return Err(Error::LoginFailed("bad credentials".to_string()));
        }
        self.logged_in.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn get_status(&self) -> Result<RawStatus> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.status_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.require_login.load(Ordering::SeqCst) && !self.logged_in.load(Ordering::SeqCst) {
            return Err(Error::NotConnected);
        }
        if self.status_failures.lock().pop_front().is_some() {
            return Err(Error::Protocol("device unreachable".to_string()));
        }
        self.polled.store(true, Ordering::SeqCst);
        Ok(self.status.lock().clone())
    }

    async fn set_mode(&self, temperature: f64, mode: DeviceMode) -> Result<()> {
        self.command(DeviceCall::SetMode { temperature, mode }).await
    }

    async fn turn_off(&self) -> Result<()> {
        self.command(DeviceCall::TurnOff).await
    }

    fn manufacturer(&self) -> Option<String> {
        self.polled
            .load(Ordering::SeqCst)
            .then(|| "BGH".to_string())
    }

    fn model(&self) -> Option<String> {
        self.polled
            .load(Ordering::SeqCst)
            .then(|| "Smart Control Kit".to_string())
    }

    fn serial_number(&self) -> Option<String> {
        self.polled
            .load(Ordering::SeqCst)
            .then(|| "00:1A:2B:3C:4D:5E".to_string())
    }
}

/// Records every characteristic push.
#[derive(Default)]
pub struct RecordingSink {
    updates: Mutex<Vec<(Characteristic, CharacteristicValue)>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn updates(&self) -> Vec<(Characteristic, CharacteristicValue)> {
        self.updates.lock().clone()
    }

    pub fn last(&self, characteristic: Characteristic) -> Option<CharacteristicValue> {
        self.updates
            .lock()
            .iter()
            .rev()
            .find(|(c, _)| *c == characteristic)
            .map(|(_, v)| *v)
    }
}

impl CharacteristicSink for RecordingSink {
    fn update(&self, characteristic: Characteristic, value: CharacteristicValue) {
        self.updates.lock().push((characteristic, value));
    }
}
