use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::{Instant, timeout};
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::cache::StatusCache;
use crate::client::DeviceApi;
use crate::platform::{Characteristic, CharacteristicSink, CharacteristicValue};
use crate::task::ScheduledTask;
use crate::types::{DeviceMode, HeatingCoolingState};

pub const DEFAULT_QUIET_PERIOD: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy)]
pub struct DebounceOptions {
    pub quiet_period: Duration,
    pub device_timeout: Duration,
}

impl Default for DebounceOptions {
    fn default() -> Self {
        Self {
            quiet_period: DEFAULT_QUIET_PERIOD,
            device_timeout: crate::cache::DEFAULT_DEVICE_TIMEOUT,
        }
    }
}

/// Desired state that has not been sent yet.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingCommand {
    pub mode: Option<HeatingCoolingState>,
    pub target_temperature: Option<f64>,
    pub scheduled_flush_at: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DeviceCommand {
    TurnOff,
    SetMode { mode: DeviceMode, temperature: f64 },
}

impl DeviceCommand {
    /// `None` when the pair does not describe something the device can do.
    pub fn for_target(mode: Option<HeatingCoolingState>, temperature: Option<f64>) -> Option<Self> {
        let state = mode?;
        match state.device_mode() {
            None => Some(DeviceCommand::TurnOff),
            Some(mode) => Some(DeviceCommand::SetMode {
                mode,
                temperature: temperature?,
            }),
        }
    }
}

struct QueuedCommand {
    id: Uuid,
    command: DeviceCommand,
}

#[derive(Default)]
struct State {
    mode: Option<HeatingCoolingState>,
    target_temperature: Option<f64>,
    scheduled_flush_at: Option<Instant>,
    generation: u64,
    // Newest flushed command the worker has not picked up. A newer flush
    // replaces it unsent.
    next: Option<QueuedCommand>,
    in_flight: bool,
    closed: bool,
}

impl State {
    fn settling(&self) -> bool {
        self.scheduled_flush_at.is_some() || self.next.is_some() || self.in_flight
    }
}

// Shared with the command worker; holds nothing that points back at the
// debouncer so the worker cannot keep it alive.
struct Shared {
    state: Mutex<State>,
    wake: Notify,
    cache: Option<StatusCache>,
}

impl Shared {
    fn sync_cache(&self, state: &State) {
        if let Some(cache) = &self.cache {
            cache.set_write_pending(state.settling());
        }
    }
}

struct DebouncerInner {
    shared: Arc<Shared>,
    timer: Mutex<ScheduledTask>,
    quiet_period: Duration,
    sink: Arc<dyn CharacteristicSink>,
}

impl Drop for DebouncerInner {
    fn drop(&mut self) {
        self.shared.state.lock().closed = true;
        self.shared.wake.notify_one();
    }
}

#[derive(Clone)]
pub struct CommandDebouncer {
    inner: Arc<DebouncerInner>,
}

impl CommandDebouncer {
    /// Must be called inside a Tokio runtime: spawns the command worker.
    ///
    /// When a cache is given it is invalidated on every write and again once
    /// each command has reached the device, and it does not keep statuses
    /// fetched while a write is still settling.
    pub fn new(
        device: Arc<dyn DeviceApi>,
        sink: Arc<dyn CharacteristicSink>,
        cache: Option<StatusCache>,
        options: DebounceOptions,
    ) -> Self {
        let shared = Arc::new(Shared {
            state: Mutex::new(State::default()),
            wake: Notify::new(),
            cache,
        });
        tokio::spawn(run_commands(shared.clone(), device, options.device_timeout));

        Self {
            inner: Arc::new(DebouncerInner {
                shared,
                timer: Mutex::new(ScheduledTask::new()),
                quiet_period: options.quiet_period,
                sink,
            }),
        }
    }

    pub fn request_change(&self, mode: Option<HeatingCoolingState>, temperature: Option<f64>) {
        let shared = &self.inner.shared;
        let mut timer = self.inner.timer.lock();
        let flush_at = Instant::now() + self.inner.quiet_period;
        let generation = {
            let mut state = shared.state.lock();
            if let Some(mode) = mode {
                state.mode = Some(mode);
            }
            if let Some(temperature) = temperature {
                state.target_temperature = Some(temperature);
            }
            state.scheduled_flush_at = Some(flush_at);
            state.generation += 1;
            shared.sync_cache(&state);
            debug!(
                mode = ?state.mode,
                temperature = ?state.target_temperature,
                "received new target, flush rescheduled"
            );
            state.generation
        };
        if let Some(cache) = &shared.cache {
            cache.invalidate();
        }

        let inner = self.inner.clone();
        timer.replace(tokio::spawn(async move {
            tokio::time::sleep_until(flush_at).await;
            inner.flush(generation);
        }));
    }

    /// Seeds last-known values from a device read. Ignored from the first
    /// write until the device has answered the last command, so a poll never
    /// overrides what the user asked for.
    pub fn observe(&self, mode: HeatingCoolingState, temperature: f64) {
        let mut state = self.inner.shared.state.lock();
        if state.settling() {
            trace!(?mode, temperature, "write settling, observed status ignored");
            return;
        }
        state.mode = Some(mode);
        state.target_temperature = Some(temperature);
    }

    /// True while a write is armed, queued or on its way to the device.
    pub fn is_settling(&self) -> bool {
        self.inner.shared.state.lock().settling()
    }

    pub fn pending(&self) -> Option<PendingCommand> {
        let state = self.inner.shared.state.lock();
        state.scheduled_flush_at.map(|at| PendingCommand {
            mode: state.mode,
            target_temperature: state.target_temperature,
            scheduled_flush_at: at,
        })
    }

    /// Last known target, pending or applied.
    pub fn target(&self) -> (Option<HeatingCoolingState>, Option<f64>) {
        let state = self.inner.shared.state.lock();
        (state.mode, state.target_temperature)
    }
}

impl DebouncerInner {
    fn flush(&self, generation: u64) {
        let shared = &self.shared;
        let (mode, temperature) = {
            let mut state = shared.state.lock();
            if state.generation != generation || state.scheduled_flush_at.is_none() {
                return;
            }
            state.scheduled_flush_at = None;

            let (mode, temperature) = (state.mode, state.target_temperature);
            let Some(command) = DeviceCommand::for_target(mode, temperature) else {
                shared.sync_cache(&state);
                warn!(?mode, ?temperature, "not handled target state, command dropped");
                return;
            };

            let id = Uuid::new_v4();
            info!(command_id = %id, ?command, "setting status to device");
            if let Some(superseded) = state.next.replace(QueuedCommand { id, command }) {
                debug!(command_id = %superseded.id, "superseded before it was sent");
            }
            shared.sync_cache(&state);
            (mode, temperature)
        };
        shared.wake.notify_one();

        if let Some(cache) = &shared.cache {
            cache.invalidate();
        }
        if let Some(state) = mode {
            self.sink.update(
                Characteristic::CurrentHeatingCoolingState,
                CharacteristicValue::state(state),
            );
            self.sink.update(
                Characteristic::TargetHeatingCoolingState,
                CharacteristicValue::state(state),
            );
        }
        if let Some(temperature) = temperature {
            self.sink.update(
                Characteristic::TargetTemperature,
                CharacteristicValue::Temperature(temperature),
            );
        }
    }
}

// Sends one command at a time. Whatever was flushed while a call was in
// flight waits in the single slot, so only the newest target follows it.
async fn run_commands(shared: Arc<Shared>, device: Arc<dyn DeviceApi>, device_timeout: Duration) {
    loop {
        let next = {
            let mut state = shared.state.lock();
            match state.next.take() {
                Some(queued) => {
                    state.in_flight = true;
                    Some(queued)
                }
                None if state.closed => break,
                None => None,
            }
        };
        let Some(QueuedCommand { id, command }) = next else {
            shared.wake.notified().await;
            continue;
        };

        let call = async {
            match command {
                DeviceCommand::TurnOff => device.turn_off().await,
                DeviceCommand::SetMode { mode, temperature } => {
                    device.set_mode(temperature, mode).await
                }
            }
        };
        match timeout(device_timeout, call).await {
            Ok(Ok(())) => debug!(command_id = %id, "device accepted command"),
            Ok(Err(e)) => warn!(command_id = %id, error = %e, "device command failed"),
            Err(_) => warn!(command_id = %id, "device command timed out"),
        }

        {
            let mut state = shared.state.lock();
            state.in_flight = false;
            shared.sync_cache(&state);
        }
        if let Some(cache) = &shared.cache {
            cache.invalidate();
        }
    }
}
