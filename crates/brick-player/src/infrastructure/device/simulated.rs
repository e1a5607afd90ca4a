//! In-process device that stands in for a motor hub.
//!
//! The real Bluetooth and Infrared transports live outside this workspace.
//! `SimulatedDevice` implements the same [`Device`] capability with in-memory
//! state so the binary can run without a radio and integration tests can
//! observe exactly what a session did:
//!
//! - `connect` takes `connect_delay` and honours the cancellation token.
//! - `set_fail_connect(true)` makes the next connects fail.
//! - `simulate_link_loss` drops a connected device with `is_error = true`,
//!   which is what a real hub does when it goes out of range.
//! - Channel outputs and the output level are recorded for inspection.

use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use brick_core::{ConnectionResult, DeviceId, DeviceKind, DeviceState, DeviceStateChange};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::application::ports::{Device, DEFAULT_OUTPUT_LEVEL};
use crate::infrastructure::storage::config::DeviceEntry;

const STATE_CHANNEL_CAPACITY: usize = 32;

pub struct SimulatedDevice {
    id: DeviceId,
    name: String,
    kind: DeviceKind,
    output_level_group: Option<String>,
    connect_delay: Duration,
    fail_connect: AtomicBool,
    state: Mutex<DeviceState>,
    outputs: Mutex<Vec<f32>>,
    output_level: AtomicU8,
    connect_calls: AtomicUsize,
    state_tx: broadcast::Sender<DeviceStateChange>,
}

impl SimulatedDevice {
    pub fn new(id: impl Into<DeviceId>, name: impl Into<String>, channels: u8) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: DeviceKind::default(),
            output_level_group: None,
            connect_delay: Duration::ZERO,
            fail_connect: AtomicBool::new(false),
            state: Mutex::new(DeviceState::Disconnected),
            outputs: Mutex::new(vec![0.0; usize::from(channels)]),
            output_level: AtomicU8::new(DEFAULT_OUTPUT_LEVEL),
            connect_calls: AtomicUsize::new(0),
            state_tx: broadcast::channel(STATE_CHANNEL_CAPACITY).0,
        }
    }

    /// Builds a device from its config file entry.
    pub fn from_entry(entry: &DeviceEntry) -> Self {
        let mut device = Self::new(entry.id.as_str(), entry.name.as_str(), entry.channels)
            .with_kind(entry.kind)
            .with_connect_delay(Duration::from_millis(entry.connect_delay_ms));
        device.output_level_group = entry.output_level_group.clone();
        device
    }

    pub fn with_kind(mut self, kind: DeviceKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_output_level_group(mut self, group: impl Into<String>) -> Self {
        self.output_level_group = Some(group.into());
        self
    }

    pub fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = delay;
        self
    }

    pub fn failing(self) -> Self {
        self.set_fail_connect(true);
        self
    }

    pub fn set_fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    /// Last value written to `channel`, or `None` for an unknown channel.
    pub fn output(&self, channel: u8) -> Option<f32> {
        self.lock_outputs().get(usize::from(channel)).copied()
    }

    pub fn outputs(&self) -> Vec<f32> {
        self.lock_outputs().clone()
    }

    pub fn output_level(&self) -> u8 {
        self.output_level.load(Ordering::SeqCst)
    }

    /// How many times `connect` has been called.
    pub fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    /// Drops the link as if the hub went out of range.  Has no effect unless
    /// the device is connected.
    pub fn simulate_link_loss(&self) {
        if self.state() == DeviceState::Connected {
            warn!(device = %self.id, "link lost");
            self.transition(DeviceState::Disconnected, true);
        }
    }

    fn transition(&self, new_state: DeviceState, is_error: bool) {
        let old_state = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *state, new_state)
        };
        if old_state == new_state {
            return;
        }
        trace!(device = %self.id, %old_state, %new_state, is_error, "state change");
        // No receivers is fine.
        let _ = self.state_tx.send(DeviceStateChange {
            device_id: self.id.clone(),
            old_state,
            new_state,
            is_error,
        });
    }

    fn lock_outputs(&self) -> std::sync::MutexGuard<'_, Vec<f32>> {
        self.outputs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn zero_outputs(&self) {
        self.lock_outputs().iter_mut().for_each(|v| *v = 0.0);
    }
}

#[async_trait]
impl Device for SimulatedDevice {
    fn id(&self) -> &DeviceId {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> DeviceKind {
        self.kind
    }

    fn channel_count(&self) -> u8 {
        u8::try_from(self.lock_outputs().len()).unwrap_or(u8::MAX)
    }

    fn output_level_group(&self) -> Option<&str> {
        self.output_level_group.as_deref()
    }

    fn state(&self) -> DeviceState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_output(&self, channel: u8, value: f32) {
        if self.state() != DeviceState::Connected {
            trace!(device = %self.id, channel, "output ignored while not connected");
            return;
        }
        match self.lock_outputs().get_mut(usize::from(channel)) {
            Some(slot) => *slot = value.clamp(-1.0, 1.0),
            None => debug!(device = %self.id, channel, "no such channel"),
        }
    }

    fn set_output_level(&self, level: u8) {
        debug!(device = %self.id, level, "output level");
        self.output_level.store(level, Ordering::SeqCst);
    }

    async fn connect(&self, reconnect: bool, token: CancellationToken) -> ConnectionResult {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        if self.state() == DeviceState::Connected {
            return ConnectionResult::Ok;
        }
        debug!(device = %self.id, reconnect, "connecting");
        self.transition(DeviceState::Connecting, false);

        tokio::select! {
            _ = token.cancelled() => {
                debug!(device = %self.id, "connect cancelled");
                self.transition(DeviceState::Disconnected, false);
                return ConnectionResult::Error;
            }
            _ = tokio::time::sleep(self.connect_delay) => {}
        }

        if self.fail_connect.load(Ordering::SeqCst) {
            warn!(device = %self.id, "connect failed");
            self.transition(DeviceState::Disconnected, false);
            return ConnectionResult::Error;
        }

        info!(device = %self.id, name = %self.name, "connected");
        self.transition(DeviceState::Connected, false);
        ConnectionResult::Ok
    }

    async fn disconnect(&self) {
        if self.state() == DeviceState::Disconnected {
            return;
        }
        self.zero_outputs();
        self.transition(DeviceState::Disconnected, false);
        info!(device = %self.id, "disconnected");
    }

    fn subscribe_state(&self) -> broadcast::Receiver<DeviceStateChange> {
        self.state_tx.subscribe()
    }
}

/// Builds every configured device as a trait object.
pub fn devices_from_entries(entries: &[DeviceEntry]) -> Vec<Arc<dyn Device>> {
    entries
        .iter()
        .map(|entry| Arc::new(SimulatedDevice::from_entry(entry)) as Arc<dyn Device>)
        .collect()
}
