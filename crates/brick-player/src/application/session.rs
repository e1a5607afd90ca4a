//! PlayerSession: the control surface of one play session.
//!
//! A session ties together a validated profile, the devices it drives, the
//! event multiplexer, and a [`ConnectionOrchestrator`]:
//!
//! ```text
//! EventMultiplexer ──► mapping task (MappingEngine) ──► DeviceOutputs ──► devices
//!                              ▲ gated on "ready"
//! ConnectionOrchestrator ──────┘
//! ```
//!
//! The mapping task is the only owner of the [`MappingEngine`] and therefore
//! of the button histories and axis contributions.  Batches that arrive while
//! the devices are not all connected are dropped.

use std::collections::HashMap;
use std::sync::Arc;

use brick_core::{
    ControllerEventBatch, ControllerProfile, DeviceId, MappingEngine, OutputSink, ProfileError,
};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::multiplexer::{EventMultiplexer, MultiplexerError};
use super::orchestrator::{ConnectOutcome, ConnectionOrchestrator};
use super::ports::{Device, SessionObserver};

/// Error type for session control operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid profile: {0}")]
    InvalidProfile(#[from] ProfileError),

    /// Bluetooth devices are part of the session but the host radio is off.
    #[error("turn on Bluetooth to connect Bluetooth devices")]
    BluetoothUnavailable,

    #[error("cannot attach to event multiplexer: {0}")]
    Multiplexer(#[from] MultiplexerError),
}

/// Session start options.
#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    /// When set, [`PlayerSession::suspend`] keeps devices connected.
    pub keep_running_in_background: bool,
    /// Whether the host Bluetooth radio is switched on.
    pub bluetooth_enabled: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            keep_running_in_background: false,
            bluetooth_enabled: true,
        }
    }
}

/// Routes engine outputs to live device handles.
pub struct DeviceOutputs {
    by_id: HashMap<DeviceId, Arc<dyn Device>>,
}

impl DeviceOutputs {
    pub fn new(devices: &[Arc<dyn Device>]) -> Self {
        Self {
            by_id: devices
                .iter()
                .map(|d| (d.id().clone(), Arc::clone(d)))
                .collect(),
        }
    }
}

impl OutputSink for DeviceOutputs {
    fn has_device(&self, device_id: &DeviceId) -> bool {
        self.by_id.contains_key(device_id)
    }

    fn set_output(&self, device_id: &DeviceId, channel: u8, value: f32) {
        if let Some(device) = self.by_id.get(device_id) {
            device.set_output(channel, value);
        }
    }
}

/// One running play session.
pub struct PlayerSession {
    orchestrator: Arc<ConnectionOrchestrator>,
    multiplexer: EventMultiplexer,
    options: SessionOptions,
    shutdown: CancellationToken,
    mapping_task: Option<JoinHandle<()>>,
    watcher_task: Option<JoinHandle<()>>,
    connect_task: Option<JoinHandle<ConnectOutcome>>,
    ended: bool,
}

impl PlayerSession {
    /// Starts a session: validates `profile`, attaches to `multiplexer`,
    /// starts the mapping task and the device-state watcher, and kicks off
    /// connecting every device in the background.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// - [`SessionError::InvalidProfile`] when the profile fails validation.
    /// - [`SessionError::BluetoothUnavailable`] when a Bluetooth device is
    ///   present and `options.bluetooth_enabled` is `false`.
    /// - [`SessionError::Multiplexer`] when another session is still attached.
    pub fn start(
        profile: ControllerProfile,
        devices: Vec<Arc<dyn Device>>,
        multiplexer: EventMultiplexer,
        observer: Arc<dyn SessionObserver>,
        options: SessionOptions,
    ) -> Result<Self, SessionError> {
        profile.validate()?;

        if !options.bluetooth_enabled && devices.iter().any(|d| d.kind().requires_bluetooth()) {
            return Err(SessionError::BluetoothUnavailable);
        }

        for id in profile.device_ids() {
            if !devices.iter().any(|d| d.id() == &id) {
                warn!(device = %id, "profile references a device that is not available");
            }
        }

        let events = multiplexer.subscribe()?;

        info!(
            profile = %profile.name,
            devices = devices.len(),
            "starting play session"
        );

        let sink = DeviceOutputs::new(&devices);
        let orchestrator = ConnectionOrchestrator::new(devices, observer);
        let shutdown = CancellationToken::new();

        let mapping_task = tokio::spawn(run_mapping(
            MappingEngine::new(profile),
            events,
            sink,
            orchestrator.ready_watch(),
            shutdown.clone(),
        ));
        let watcher_task = orchestrator.spawn_state_watcher(shutdown.clone());
        let connect_task = {
            let orchestrator = Arc::clone(&orchestrator);
            tokio::spawn(async move { orchestrator.connect_all().await })
        };

        Ok(Self {
            orchestrator,
            multiplexer,
            options,
            shutdown,
            mapping_task: Some(mapping_task),
            watcher_task: Some(watcher_task),
            connect_task: Some(connect_task),
            ended: false,
        })
    }

    pub fn orchestrator(&self) -> &Arc<ConnectionOrchestrator> {
        &self.orchestrator
    }

    /// `true` while every device is connected.
    pub fn is_ready(&self) -> bool {
        self.orchestrator.is_ready()
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }

    /// Changes the output level of every device in `group`; deferred until
    /// the devices are connected.
    pub async fn set_output_level(&self, group: &str, level: u8) {
        self.orchestrator.set_output_level(group, level).await;
    }

    /// Ends the session: detaches from the multiplexer, stops the mapping task
    /// and the watcher, and disconnects every device.  Calling `end` twice is
    /// a no-op.
    pub async fn end(&mut self) {
        if self.ended {
            return;
        }
        self.ended = true;
        info!("ending play session");

        self.orchestrator.begin_teardown().await;
        self.multiplexer.unsubscribe();
        self.shutdown.cancel();

        for task in [self.mapping_task.take(), self.watcher_task.take()]
            .into_iter()
            .flatten()
        {
            if let Err(e) = task.await {
                warn!("session task ended abnormally: {e}");
            }
        }

        self.orchestrator.disconnect_all().await;

        if let Some(task) = self.connect_task.take() {
            match task.await {
                Ok(outcome) => debug!(?outcome, "initial connect finished"),
                Err(e) => warn!("connect task ended abnormally: {e}"),
            }
        }
        info!("play session ended");
    }

    /// The host page is going away.  Ends the session unless it was started
    /// with `keep_running_in_background`.
    pub async fn suspend(&mut self) {
        if self.options.keep_running_in_background {
            debug!("keeping session running in background");
            return;
        }
        self.end().await;
    }
}

impl Drop for PlayerSession {
    fn drop(&mut self) {
        if !self.ended {
            // Stop the background tasks; devices are left as they are.
            self.shutdown.cancel();
            self.multiplexer.unsubscribe();
        }
    }
}

async fn run_mapping(
    mut engine: MappingEngine,
    mut events: mpsc::Receiver<ControllerEventBatch>,
    sink: DeviceOutputs,
    ready: watch::Receiver<bool>,
    shutdown: CancellationToken,
) {
    debug!("mapping task started");
    loop {
        let batch = tokio::select! {
            _ = shutdown.cancelled() => break,
            batch = events.recv() => batch,
        };
        let Some(batch) = batch else {
            break;
        };

        if *ready.borrow() {
            engine.process_batch(&batch, &sink);
        } else {
            trace!(events = batch.len(), "devices not ready; dropping batch");
        }
    }
    debug!("mapping task stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use brick_core::{
        ConnectionResult, ControllerAction, ControllerEventBinding, ControllerEventType,
        DeviceKind, DeviceState, DeviceStateChange, EventKey,
    };
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;
    use tokio::sync::broadcast;

    use crate::application::ports::ProgressKind;

    /// A device that connects instantly and records outputs.
    struct InstantDevice {
        id: DeviceId,
        kind: DeviceKind,
        state: StdMutex<DeviceState>,
        outputs: StdMutex<Vec<(u8, f32)>>,
        tx: broadcast::Sender<DeviceStateChange>,
    }

    impl InstantDevice {
        fn new(id: &str, kind: DeviceKind) -> Arc<Self> {
            Arc::new(Self {
                id: DeviceId::new(id),
                kind,
                state: StdMutex::new(DeviceState::Disconnected),
                outputs: StdMutex::new(Vec::new()),
                tx: broadcast::channel(8).0,
            })
        }
    }

    #[async_trait]
    impl Device for InstantDevice {
        fn id(&self) -> &DeviceId {
            &self.id
        }
        fn name(&self) -> &str {
            "instant"
        }
        fn kind(&self) -> DeviceKind {
            self.kind
        }
        fn channel_count(&self) -> u8 {
            2
        }
        fn output_level_group(&self) -> Option<&str> {
            None
        }
        fn state(&self) -> DeviceState {
            *self.state.lock().unwrap()
        }
        fn set_output(&self, channel: u8, value: f32) {
            self.outputs.lock().unwrap().push((channel, value));
        }
        fn set_output_level(&self, _level: u8) {}
        async fn connect(&self, _reconnect: bool, _token: CancellationToken) -> ConnectionResult {
            *self.state.lock().unwrap() = DeviceState::Connected;
            ConnectionResult::Ok
        }
        async fn disconnect(&self) {
            *self.state.lock().unwrap() = DeviceState::Disconnected;
        }
        fn subscribe_state(&self) -> broadcast::Receiver<DeviceStateChange> {
            self.tx.subscribe()
        }
    }

    struct SilentObserver;

    impl SessionObserver for SilentObserver {
        fn progress_started(&self, _kind: ProgressKind, _cancel: Option<CancellationToken>) {}
        fn progress_finished(&self, _kind: ProgressKind) {}
        fn navigate_back(&self) {}
    }

    fn axis_profile(device: &str) -> ControllerProfile {
        ControllerProfile::new("test").with_binding(
            ControllerEventBinding::new(ControllerEventType::Axis, "X")
                .with_action(ControllerAction::new(device, 1)),
        )
    }

    async fn wait_ready(session: &PlayerSession) {
        let mut ready = session.orchestrator().ready_watch();
        tokio::time::timeout(Duration::from_secs(2), ready.wait_for(|r| *r))
            .await
            .expect("session should become ready")
            .expect("orchestrator alive");
    }

    #[tokio::test]
    async fn test_start_rejects_invalid_profile() {
        let mux = EventMultiplexer::start(4);
        let profile = ControllerProfile::new("bad").with_binding(
            ControllerEventBinding::new(ControllerEventType::Axis, "X")
                .with_action(ControllerAction::new("hub", 0).with_dead_zone(100)),
        );

        let result = PlayerSession::start(
            profile,
            Vec::new(),
            mux,
            Arc::new(SilentObserver),
            SessionOptions::default(),
        );

        assert!(matches!(result, Err(SessionError::InvalidProfile(_))));
    }

    #[tokio::test]
    async fn test_start_rejects_bluetooth_devices_when_radio_is_off() {
        // Arrange
        let mux = EventMultiplexer::start(4);
        let device: Arc<dyn Device> = InstantDevice::new("hub", DeviceKind::Bluetooth);
        let options = SessionOptions {
            bluetooth_enabled: false,
            ..SessionOptions::default()
        };

        // Act
        let result = PlayerSession::start(
            axis_profile("hub"),
            vec![device],
            mux.clone(),
            Arc::new(SilentObserver),
            options,
        );

        // Assert
        assert!(matches!(result, Err(SessionError::BluetoothUnavailable)));
        assert!(!mux.has_subscriber(), "a rejected session must not attach");
    }

    #[tokio::test]
    async fn test_infrared_devices_do_not_need_bluetooth() {
        let mux = EventMultiplexer::start(4);
        let device: Arc<dyn Device> = InstantDevice::new("ir", DeviceKind::Infrared);
        let options = SessionOptions {
            bluetooth_enabled: false,
            ..SessionOptions::default()
        };

        let mut session = PlayerSession::start(
            axis_profile("ir"),
            vec![device],
            mux,
            Arc::new(SilentObserver),
            options,
        )
        .expect("infrared-only session starts");

        wait_ready(&session).await;
        session.end().await;
    }

    #[tokio::test]
    async fn test_batches_are_mapped_once_ready() {
        // Arrange
        let mux = EventMultiplexer::start(4);
        let hub = InstantDevice::new("hub", DeviceKind::Bluetooth);
        let mut session = PlayerSession::start(
            axis_profile("hub"),
            vec![hub.clone() as Arc<dyn Device>],
            mux.clone(),
            Arc::new(SilentObserver),
            SessionOptions::default(),
        )
        .expect("start");
        wait_ready(&session).await;

        // Act
        mux.source("test")
            .publish(ControllerEventBatch::single(EventKey::axis("X"), 0.5))
            .await
            .expect("publish");

        // Assert
        tokio::time::timeout(Duration::from_secs(1), async {
            while hub.outputs.lock().unwrap().is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("output should be set");
        assert_eq!(hub.outputs.lock().unwrap()[0], (1, 0.5));

        session.end().await;
    }

    #[tokio::test]
    async fn test_end_detaches_and_disconnects() {
        let mux = EventMultiplexer::start(4);
        let hub = InstantDevice::new("hub", DeviceKind::Bluetooth);
        let mut session = PlayerSession::start(
            axis_profile("hub"),
            vec![hub.clone() as Arc<dyn Device>],
            mux.clone(),
            Arc::new(SilentObserver),
            SessionOptions::default(),
        )
        .expect("start");
        wait_ready(&session).await;

        session.end().await;
        session.end().await;

        assert!(session.is_ended());
        assert!(!session.is_ready());
        assert!(!mux.has_subscriber());
        assert_eq!(hub.state(), DeviceState::Disconnected);
    }

    #[tokio::test]
    async fn test_suspend_keeps_running_in_background_when_asked() {
        let mux = EventMultiplexer::start(4);
        let hub = InstantDevice::new("hub", DeviceKind::Bluetooth);
        let options = SessionOptions {
            keep_running_in_background: true,
            ..SessionOptions::default()
        };
        let mut session = PlayerSession::start(
            axis_profile("hub"),
            vec![hub.clone() as Arc<dyn Device>],
            mux,
            Arc::new(SilentObserver),
            options,
        )
        .expect("start");
        wait_ready(&session).await;

        session.suspend().await;

        assert!(!session.is_ended());
        assert_eq!(hub.state(), DeviceState::Connected);
        session.end().await;
    }
}
