//! ConnectionOrchestrator: brings a session's devices up and down together.
//!
//! # Phases
//!
//! ```text
//!            connect_all()              all connected
//!   Idle ───────────────► Connecting ───────────────► Ready
//!    ▲                        │                         │
//!    │      any failure       │       error-disconnect  │
//!    │◄──── Disconnecting ◄───┘      ──► Connecting ◄───┘
//!    │            ▲
//!    └────────────┴──── disconnect_all()
//! ```
//!
//! # Connection attempts
//!
//! A connection *attempt* starts when `connect_all` is called with no attempt
//! in flight.  That first caller is the attempt's leader: it creates one
//! [`CancellationToken`] shared by every device connect task, reports a
//! cancelable progress indicator, and waits until every outstanding connect
//! task has finished.  Calls made while the attempt is in flight only add
//! connect tasks for devices that are still disconnected and return
//! [`ConnectOutcome::Joined`] immediately.
//!
//! At most one connect task exists per device at any time, and an attempt
//! only ends once every connect task it spawned, including those added by
//! joiners, has finished.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use brick_core::{DeviceId, DeviceState};
use tokio::sync::{watch, Mutex};
use tokio::task::{JoinHandle, JoinSet};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::ports::{Device, ProgressKind, SessionObserver, DEFAULT_OUTPUT_LEVEL};

/// Lifecycle phase of the session's device set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Connecting,
    Ready,
    Disconnecting,
}

/// What a call to [`ConnectionOrchestrator::connect_all`] achieved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// Every device is connected and the session is ready.
    Connected,
    /// An attempt was already in flight; this call only added connect tasks.
    Joined,
    /// At least one device failed (or the attempt was cancelled); all devices
    /// were disconnected again.
    Failed,
    /// The session is being torn down; nothing was started.
    TearingDown,
}

/// State shared by one connection attempt's leader and its observers.
struct Attempt {
    token: CancellationToken,
    /// Flips to `true` once the leader has finished waiting.
    done: watch::Receiver<bool>,
}

struct State {
    phase: Phase,
    in_flight: HashSet<DeviceId>,
    attempt: Option<Attempt>,
    /// Set after the first fully successful attempt.
    reconnect: bool,
    tearing_down: bool,
    /// Desired output level per group, applied whenever the session is ready.
    levels: HashMap<String, u8>,
}

/// Coordinates connect and disconnect of every device in a session.
pub struct ConnectionOrchestrator {
    devices: Vec<Arc<dyn Device>>,
    observer: Arc<dyn SessionObserver>,
    state: Mutex<State>,
    /// Number of connect tasks still running.
    in_flight_count: watch::Sender<usize>,
    ready: watch::Sender<bool>,
}

impl ConnectionOrchestrator {
    /// Creates an orchestrator over `devices`.  Every output level group found
    /// among the devices starts at [`DEFAULT_OUTPUT_LEVEL`].
    pub fn new(devices: Vec<Arc<dyn Device>>, observer: Arc<dyn SessionObserver>) -> Arc<Self> {
        let levels = devices
            .iter()
            .filter_map(|d| d.output_level_group().map(str::to_string))
            .map(|group| (group, DEFAULT_OUTPUT_LEVEL))
            .collect();

        Arc::new(Self {
            devices,
            observer,
            state: Mutex::new(State {
                phase: Phase::Idle,
                in_flight: HashSet::new(),
                attempt: None,
                reconnect: false,
                tearing_down: false,
                levels,
            }),
            in_flight_count: watch::channel(0).0,
            ready: watch::channel(false).0,
        })
    }

    pub fn devices(&self) -> &[Arc<dyn Device>] {
        &self.devices
    }

    pub async fn phase(&self) -> Phase {
        self.state.lock().await.phase
    }

    /// `true` while every device is connected and outputs may be driven.
    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    /// Watches the ready flag.
    pub fn ready_watch(&self) -> watch::Receiver<bool> {
        self.ready.subscribe()
    }

    /// The output level currently desired for `group`.
    pub async fn output_level(&self, group: &str) -> Option<u8> {
        self.state.lock().await.levels.get(group).copied()
    }

    /// Marks the session as ending.  Later `connect_all` calls do nothing and
    /// a failing attempt no longer asks the front end to navigate back.
    pub async fn begin_teardown(&self) {
        self.state.lock().await.tearing_down = true;
    }

    /// Connects every disconnected device.  See the module docs for how
    /// concurrent callers share one attempt.
    pub async fn connect_all(self: &Arc<Self>) -> ConnectOutcome {
        let (token, done_tx) = {
            let mut state = self.state.lock().await;
            if state.tearing_down {
                debug!("session tearing down; not connecting");
                return ConnectOutcome::TearingDown;
            }

            let mut done_tx = None;
            if state.attempt.is_none() {
                let (tx, rx) = watch::channel(false);
                state.attempt = Some(Attempt {
                    token: CancellationToken::new(),
                    done: rx,
                });
                state.phase = Phase::Connecting;
                self.ready.send_replace(false);
                done_tx = Some(tx);
            }
            let token = match &state.attempt {
                Some(attempt) => attempt.token.clone(),
                None => CancellationToken::new(),
            };

            let reconnect = state.reconnect;
            for device in &self.devices {
                if device.state() == DeviceState::Disconnected
                    && state.in_flight.insert(device.id().clone())
                {
                    self.spawn_connect(Arc::clone(device), reconnect, token.clone());
                }
            }

            (token, done_tx)
        };

        // Only the leader holds the completion sender.
        let Some(done_tx) = done_tx else {
            return ConnectOutcome::Joined;
        };

        info!(devices = self.devices.len(), "connecting devices");
        self.observer
            .progress_started(ProgressKind::Connecting, Some(token.clone()));

        let mut in_flight = self.in_flight_count.subscribe();
        // The sender lives in `self`, so this only returns once the count is 0.
        let _ = in_flight.wait_for(|count| *count == 0).await;

        self.observer.progress_finished(ProgressKind::Connecting);

        let all_connected = loop {
            let mut state = self.state.lock().await;
            // Joiners may have added connect tasks since the count reached 0.
            // The attempt only ends once none of them is left running.
            if !state.in_flight.is_empty() {
                drop(state);
                let _ = in_flight.wait_for(|count| *count == 0).await;
                continue;
            }

            state.attempt = None;
            let all_connected = !token.is_cancelled()
                && self
                    .devices
                    .iter()
                    .all(|d| d.state() == DeviceState::Connected);
            if all_connected {
                state.reconnect = true;
                state.phase = Phase::Ready;
                for device in &self.devices {
                    if let Some(level) = device
                        .output_level_group()
                        .and_then(|group| state.levels.get(group))
                    {
                        device.set_output_level(*level);
                    }
                }
                self.ready.send_replace(true);
            }
            break all_connected;
        };
        done_tx.send_replace(true);

        if all_connected {
            info!("all devices connected");
            return ConnectOutcome::Connected;
        }

        warn!(
            cancelled = token.is_cancelled(),
            "connection attempt failed; disconnecting all devices"
        );
        token.cancel();
        self.disconnect_all().await;

        if !self.state.lock().await.tearing_down {
            self.observer.navigate_back();
        }
        ConnectOutcome::Failed
    }

    /// Disconnects every device.
    ///
    /// An in-flight connection attempt is cancelled first, and this call waits
    /// until that attempt's leader has finished before disconnecting.
    pub async fn disconnect_all(&self) {
        let pending = {
            let state = self.state.lock().await;
            state
                .attempt
                .as_ref()
                .map(|a| (a.token.clone(), a.done.clone()))
        };
        if let Some((token, mut done)) = pending {
            debug!("cancelling in-flight connection attempt");
            token.cancel();
            // An error means the leader is gone, which also ends the attempt.
            let _ = done.wait_for(|finished| *finished).await;
        }

        {
            let mut state = self.state.lock().await;
            state.phase = Phase::Disconnecting;
            self.ready.send_replace(false);
        }

        info!(devices = self.devices.len(), "disconnecting devices");
        self.observer
            .progress_started(ProgressKind::Disconnecting, None);

        let mut tasks = JoinSet::new();
        for device in &self.devices {
            let device = Arc::clone(device);
            tasks.spawn(async move { device.disconnect().await });
        }
        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                warn!("device disconnect task failed: {e}");
            }
        }

        self.observer.progress_finished(ProgressKind::Disconnecting);

        let mut state = self.state.lock().await;
        if state.phase == Phase::Disconnecting {
            state.phase = Phase::Idle;
        }
    }

    /// Records the desired level for `group` and applies it right away when
    /// the session is ready.  Otherwise it is applied by the next successful
    /// `connect_all`.
    pub async fn set_output_level(&self, group: &str, level: u8) {
        let mut state = self.state.lock().await;
        state.levels.insert(group.to_string(), level);

        if state.phase != Phase::Ready {
            debug!(group, level, "session not ready; output level deferred");
            return;
        }
        for device in self
            .devices
            .iter()
            .filter(|d| d.output_level_group() == Some(group))
        {
            device.set_output_level(level);
        }
        info!(group, level, "output level changed");
    }

    /// Starts a task that reconnects whenever a device drops with an error.
    ///
    /// Device subscriptions are taken before this returns, so no state change
    /// after the call is missed.  The task ends when `shutdown` is cancelled.
    pub fn spawn_state_watcher(self: &Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        let receivers: Vec<_> = self
            .devices
            .iter()
            .map(|d| (d.id().clone(), d.subscribe_state()))
            .collect();
        let this = Arc::clone(self);

        tokio::spawn(async move {
            let mut watchers = JoinSet::new();
            for (id, mut rx) in receivers {
                let this = Arc::clone(&this);
                let shutdown = shutdown.clone();
                watchers.spawn(async move {
                    loop {
                        let change = tokio::select! {
                            _ = shutdown.cancelled() => break,
                            change = rx.recv() => change,
                        };
                        match change {
                            Ok(change) if change.is_error_disconnect() => {
                                warn!(device = %change.device_id, "device lost; reconnecting");
                                let this = Arc::clone(&this);
                                tokio::spawn(async move {
                                    let outcome = this.connect_all().await;
                                    debug!(?outcome, "reconnect finished");
                                });
                            }
                            Ok(_) => {}
                            Err(RecvError::Lagged(skipped)) => {
                                warn!(device = %id, skipped, "state watcher lagged");
                            }
                            Err(RecvError::Closed) => break,
                        }
                    }
                });
            }
            while watchers.join_next().await.is_some() {}
        })
    }

    fn spawn_connect(
        self: &Arc<Self>,
        device: Arc<dyn Device>,
        reconnect: bool,
        token: CancellationToken,
    ) {
        self.in_flight_count.send_modify(|count| *count += 1);
        let this = Arc::clone(self);

        tokio::spawn(async move {
            debug!(device = %device.id(), reconnect, "connect started");
            let result = device.connect(reconnect, token).await;
            debug!(device = %device.id(), ?result, "connect finished");

            this.state.lock().await.in_flight.remove(device.id());
            this.in_flight_count.send_modify(|count| *count -= 1);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use brick_core::{ConnectionResult, DeviceKind, DeviceStateChange};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;
    use tokio::sync::broadcast;

    // ── Test doubles ──────────────────────────────────────────────────────────

    /// Minimal in-memory device with a scripted connect outcome.
    struct FakeDevice {
        id: DeviceId,
        group: Option<String>,
        /// Connects left to fail before the device starts connecting.
        failures_left: AtomicUsize,
        delay: Duration,
        state: StdMutex<DeviceState>,
        levels: StdMutex<Vec<u8>>,
        connects: AtomicUsize,
        disconnects: AtomicUsize,
        tx: broadcast::Sender<DeviceStateChange>,
    }

    impl FakeDevice {
        fn new(id: &str, succeed: bool) -> Arc<Self> {
            Arc::new(Self {
                id: DeviceId::new(id),
                group: None,
                failures_left: AtomicUsize::new(if succeed { 0 } else { usize::MAX }),
                delay: Duration::from_millis(10),
                state: StdMutex::new(DeviceState::Disconnected),
                levels: StdMutex::new(Vec::new()),
                connects: AtomicUsize::new(0),
                disconnects: AtomicUsize::new(0),
                tx: broadcast::channel(16).0,
            })
        }

        fn grouped(id: &str, group: &str) -> Arc<Self> {
            let mut device = Arc::into_inner(Self::new(id, true)).expect("sole owner");
            device.group = Some(group.to_string());
            Arc::new(device)
        }

        fn slow(id: &str, delay: Duration) -> Arc<Self> {
            let mut device = Arc::into_inner(Self::new(id, true)).expect("sole owner");
            device.delay = delay;
            Arc::new(device)
        }

        fn flaky(id: &str, failures: usize) -> Arc<Self> {
            let device = Self::new(id, true);
            device.failures_left.store(failures, Ordering::SeqCst);
            device
        }

        fn set_state(&self, new_state: DeviceState, is_error: bool) {
            let old_state = std::mem::replace(&mut *self.state.lock().unwrap(), new_state);
            let _ = self.tx.send(DeviceStateChange {
                device_id: self.id.clone(),
                old_state,
                new_state,
                is_error,
            });
        }
    }

    #[async_trait]
    impl Device for FakeDevice {
        fn id(&self) -> &DeviceId {
            &self.id
        }
        fn name(&self) -> &str {
            self.id.as_str()
        }
        fn kind(&self) -> DeviceKind {
            DeviceKind::Bluetooth
        }
        fn channel_count(&self) -> u8 {
            4
        }
        fn output_level_group(&self) -> Option<&str> {
            self.group.as_deref()
        }
        fn state(&self) -> DeviceState {
            *self.state.lock().unwrap()
        }
        fn set_output(&self, _channel: u8, _value: f32) {}
        fn set_output_level(&self, level: u8) {
            self.levels.lock().unwrap().push(level);
        }
        async fn connect(&self, _reconnect: bool, token: CancellationToken) -> ConnectionResult {
            self.connects.fetch_add(1, Ordering::SeqCst);
            self.set_state(DeviceState::Connecting, false);
            tokio::select! {
                _ = token.cancelled() => {
                    self.set_state(DeviceState::Disconnected, false);
                    return ConnectionResult::Error;
                }
                _ = tokio::time::sleep(self.delay) => {}
            }
            let failed = self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failed {
                self.set_state(DeviceState::Disconnected, false);
                ConnectionResult::Error
            } else {
                self.set_state(DeviceState::Connected, false);
                ConnectionResult::Ok
            }
        }
        async fn disconnect(&self) {
            self.disconnects.fetch_add(1, Ordering::SeqCst);
            if self.state() != DeviceState::Disconnected {
                self.set_state(DeviceState::Disconnected, false);
            }
        }
        fn subscribe_state(&self) -> broadcast::Receiver<DeviceStateChange> {
            self.tx.subscribe()
        }
    }

    /// Records every observer callback in order.
    #[derive(Default)]
    struct RecordingObserver {
        events: StdMutex<Vec<String>>,
        tokens: StdMutex<Vec<CancellationToken>>,
    }

    impl RecordingObserver {
        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }
        fn count(&self, name: &str) -> usize {
            self.events().iter().filter(|e| e.as_str() == name).count()
        }
    }

    impl SessionObserver for RecordingObserver {
        fn progress_started(&self, kind: ProgressKind, cancel: Option<CancellationToken>) {
            self.events
                .lock()
                .unwrap()
                .push(format!("start:{kind:?}:{}", cancel.is_some()));
            if let Some(token) = cancel {
                self.tokens.lock().unwrap().push(token);
            }
        }
        fn progress_finished(&self, kind: ProgressKind) {
            self.events.lock().unwrap().push(format!("finish:{kind:?}"));
        }
        fn navigate_back(&self) {
            self.events.lock().unwrap().push("navigate_back".to_string());
        }
    }

    /// Joins the running attempt from inside the leader's `progress_finished`
    /// and blocks until the joining call has returned.
    #[derive(Default)]
    struct JoiningObserver {
        orchestrator: StdMutex<Option<std::sync::Weak<ConnectionOrchestrator>>>,
        joined: StdMutex<Option<ConnectOutcome>>,
        navigate_back: AtomicUsize,
    }

    impl SessionObserver for JoiningObserver {
        fn progress_started(&self, _kind: ProgressKind, _cancel: Option<CancellationToken>) {}
        fn progress_finished(&self, kind: ProgressKind) {
            if kind != ProgressKind::Connecting {
                return;
            }
            let Some(orch) = self.orchestrator.lock().unwrap().take().and_then(|w| w.upgrade())
            else {
                return;
            };
            let (tx, rx) = std::sync::mpsc::channel();
            tokio::spawn(async move {
                let _ = tx.send(orch.connect_all().await);
            });
            *self.joined.lock().unwrap() = rx.recv_timeout(Duration::from_secs(2)).ok();
        }
        fn navigate_back(&self) {
            self.navigate_back.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn orchestrator(
        devices: &[Arc<FakeDevice>],
    ) -> (Arc<ConnectionOrchestrator>, Arc<RecordingObserver>) {
        let observer = Arc::new(RecordingObserver::default());
        let dyn_devices: Vec<Arc<dyn Device>> = devices
            .iter()
            .map(|d| Arc::clone(d) as Arc<dyn Device>)
            .collect();
        let orch = ConnectionOrchestrator::new(dyn_devices, observer.clone());
        (orch, observer)
    }

    // ── connect_all ───────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_connect_all_succeeds_when_every_device_connects() {
        // Arrange
        let devices = [FakeDevice::new("a", true), FakeDevice::new("b", true)];
        let (orch, observer) = orchestrator(&devices);

        // Act
        let outcome = orch.connect_all().await;

        // Assert
        assert_eq!(outcome, ConnectOutcome::Connected);
        assert_eq!(orch.phase().await, Phase::Ready);
        assert!(orch.is_ready());
        assert_eq!(
            observer.events(),
            vec!["start:Connecting:true", "finish:Connecting"]
        );
    }

    #[tokio::test]
    async fn test_one_failure_disconnects_all_and_navigates_back_once() {
        // Arrange
        let devices = [
            FakeDevice::new("a", true),
            FakeDevice::new("b", false),
            FakeDevice::new("c", true),
        ];
        let (orch, observer) = orchestrator(&devices);

        // Act
        let outcome = orch.connect_all().await;

        // Assert
        assert_eq!(outcome, ConnectOutcome::Failed);
        assert!(devices.iter().all(|d| d.state() == DeviceState::Disconnected));
        assert!(devices.iter().all(|d| d.disconnects.load(Ordering::SeqCst) == 1));
        assert_eq!(observer.count("navigate_back"), 1);
        assert_eq!(orch.phase().await, Phase::Idle);
        assert!(!orch.is_ready());
    }

    #[tokio::test]
    async fn test_concurrent_connect_calls_share_one_attempt() {
        // Arrange
        let devices = [FakeDevice::slow("a", Duration::from_millis(100))];
        let (orch, observer) = orchestrator(&devices);

        // Act
        let leader = {
            let orch = Arc::clone(&orch);
            tokio::spawn(async move { orch.connect_all().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        let joined = orch.connect_all().await;
        let led = leader.await.expect("leader task");

        // Assert
        assert_eq!(joined, ConnectOutcome::Joined);
        assert_eq!(led, ConnectOutcome::Connected);
        assert_eq!(devices[0].connects.load(Ordering::SeqCst), 1);
        assert_eq!(observer.count("start:Connecting:true"), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_attempt_waits_for_connects_added_during_wind_down() {
        // Arrange: "b" fails once, so a joiner reconnects it while the leader
        // is finishing up.
        let devices = [FakeDevice::new("a", true), FakeDevice::flaky("b", 1)];
        let observer = Arc::new(JoiningObserver::default());
        let dyn_devices: Vec<Arc<dyn Device>> = devices
            .iter()
            .map(|d| Arc::clone(d) as Arc<dyn Device>)
            .collect();
        let orch = ConnectionOrchestrator::new(dyn_devices, observer.clone());
        *observer.orchestrator.lock().unwrap() = Some(Arc::downgrade(&orch));

        // Act
        let outcome = orch.connect_all().await;

        // Assert
        assert_eq!(*observer.joined.lock().unwrap(), Some(ConnectOutcome::Joined));
        assert_eq!(devices[1].connects.load(Ordering::SeqCst), 2);
        assert_eq!(outcome, ConnectOutcome::Connected);
        assert!(devices.iter().all(|d| d.state() == DeviceState::Connected));
        assert!(orch.is_ready());
        assert_eq!(observer.navigate_back.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_failed_attempt_leaves_no_device_connecting() {
        // Arrange: "b" never connects, including the joiner's retry.
        let devices = [FakeDevice::new("a", true), FakeDevice::new("b", false)];
        let observer = Arc::new(JoiningObserver::default());
        let dyn_devices: Vec<Arc<dyn Device>> = devices
            .iter()
            .map(|d| Arc::clone(d) as Arc<dyn Device>)
            .collect();
        let orch = ConnectionOrchestrator::new(dyn_devices, observer.clone());
        *observer.orchestrator.lock().unwrap() = Some(Arc::downgrade(&orch));

        // Act
        let outcome = orch.connect_all().await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Assert
        assert_eq!(*observer.joined.lock().unwrap(), Some(ConnectOutcome::Joined));
        assert_eq!(outcome, ConnectOutcome::Failed);
        assert!(devices.iter().all(|d| d.state() == DeviceState::Disconnected));
        assert_eq!(observer.navigate_back.load(Ordering::SeqCst), 1);
        assert_eq!(orch.phase().await, Phase::Idle);
    }

    #[tokio::test]
    async fn test_cancelling_the_progress_token_fails_the_attempt() {
        // Arrange
        let devices = [FakeDevice::slow("a", Duration::from_secs(30))];
        let (orch, observer) = orchestrator(&devices);

        // Act
        let attempt = {
            let orch = Arc::clone(&orch);
            tokio::spawn(async move { orch.connect_all().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        let token = observer.tokens.lock().unwrap()[0].clone();
        token.cancel();
        let outcome = tokio::time::timeout(Duration::from_secs(2), attempt)
            .await
            .expect("attempt must end promptly")
            .expect("task");

        // Assert
        assert_eq!(outcome, ConnectOutcome::Failed);
        assert_eq!(observer.count("navigate_back"), 1);
    }

    #[tokio::test]
    async fn test_disconnect_all_cancels_an_in_flight_attempt_first() {
        // Arrange
        let devices = [FakeDevice::slow("a", Duration::from_secs(30))];
        let (orch, observer) = orchestrator(&devices);
        let attempt = {
            let orch = Arc::clone(&orch);
            tokio::spawn(async move { orch.connect_all().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        orch.begin_teardown().await;

        // Act
        tokio::time::timeout(Duration::from_secs(2), orch.disconnect_all())
            .await
            .expect("disconnect must not wait for the 30 s connect");

        // Assert
        let outcome = attempt.await.expect("task");
        assert_eq!(outcome, ConnectOutcome::Failed);
        assert_eq!(observer.count("navigate_back"), 0, "teardown suppresses navigation");
        assert!(observer.count("start:Disconnecting:false") >= 1);
    }

    #[tokio::test]
    async fn test_connect_after_teardown_does_nothing() {
        let devices = [FakeDevice::new("a", true)];
        let (orch, observer) = orchestrator(&devices);
        orch.begin_teardown().await;

        assert_eq!(orch.connect_all().await, ConnectOutcome::TearingDown);
        assert_eq!(devices[0].connects.load(Ordering::SeqCst), 0);
        assert!(observer.events().is_empty());
    }

    // ── Output levels ─────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_output_level_is_deferred_until_ready() {
        // Arrange
        let devices = [FakeDevice::grouped("a", "buwizz"), FakeDevice::new("b", true)];
        let (orch, _observer) = orchestrator(&devices);

        // Act
        orch.set_output_level("buwizz", 3).await;

        // Assert: nothing applied yet, then applied on connect
        assert!(devices[0].levels.lock().unwrap().is_empty());
        assert_eq!(orch.connect_all().await, ConnectOutcome::Connected);
        assert_eq!(*devices[0].levels.lock().unwrap(), vec![3]);
    }

    #[tokio::test]
    async fn test_output_level_is_applied_immediately_when_ready() {
        let devices = [FakeDevice::grouped("a", "buwizz")];
        let (orch, _observer) = orchestrator(&devices);
        orch.connect_all().await;

        orch.set_output_level("buwizz", 2).await;

        assert_eq!(
            *devices[0].levels.lock().unwrap(),
            vec![DEFAULT_OUTPUT_LEVEL, 2]
        );
        assert_eq!(orch.output_level("buwizz").await, Some(2));
    }

    // ── State watcher ─────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_error_disconnect_triggers_reconnect() {
        // Arrange
        let devices = [FakeDevice::new("a", true)];
        let (orch, _observer) = orchestrator(&devices);
        let shutdown = CancellationToken::new();
        let watcher = orch.spawn_state_watcher(shutdown.clone());
        assert_eq!(orch.connect_all().await, ConnectOutcome::Connected);

        // Act
        devices[0].set_state(DeviceState::Disconnected, true);

        // Assert
        let mut ready = orch.ready_watch();
        tokio::time::timeout(Duration::from_secs(2), async {
            while devices[0].connects.load(Ordering::SeqCst) < 2 || !*ready.borrow_and_update() {
                let _ = ready.changed().await;
            }
        })
        .await
        .expect("device should reconnect");
        shutdown.cancel();
        watcher.await.expect("watcher");
    }

    #[tokio::test]
    async fn test_requested_disconnect_does_not_trigger_reconnect() {
        let devices = [FakeDevice::new("a", true)];
        let (orch, _observer) = orchestrator(&devices);
        let shutdown = CancellationToken::new();
        let _watcher = orch.spawn_state_watcher(shutdown.clone());
        orch.connect_all().await;

        orch.disconnect_all().await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(devices[0].connects.load(Ordering::SeqCst), 1);
        shutdown.cancel();
    }
}
