//! Sensor stream facade.
//!
//! One [`SensorStream`] is shared by every consumer of a riding session. It
//! owns the single active [`DeviceSession`], the current power/cadence/heart
//! rate values, the append-only history of each metric and the cadence
//! arbitration state. Clones share the same state.

use crate::sensors::cadence::{CadenceArbiter, CadenceSource};
use crate::sensors::control_point::ControlPointResponse;
use crate::sensors::gatt::KnownService;
use crate::sensors::session::{DeviceOperations, DeviceSession, ReadingSink};
use crate::sensors::transport::BleBackend;
use crate::sensors::types::{
    ConnectionState, DeviceInfo, Measurement, SensorConfig, SensorError, SensorEvent,
    SensorReading,
};
use async_trait::async_trait;
use crossbeam::channel::{Receiver, Sender};
use serde::Serialize;
use std::sync::{Arc, Weak};
use tokio::sync::Mutex;

/// Identity of a device, without its handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceSummary {
    pub id: String,
    pub name: String,
}

impl From<&DeviceInfo> for DeviceSummary {
    fn from(device: &DeviceInfo) -> Self {
        Self {
            id: device.id.clone(),
            name: device.name.clone(),
        }
    }
}

/// Point-in-time copy of everything consumers read.
#[derive(Debug, Clone, Serialize)]
pub struct SensorSnapshot {
    pub is_supported: bool,
    pub is_scanning: bool,
    pub devices: Vec<DeviceSummary>,
    pub connected_device: Option<DeviceSummary>,
    pub connection_state: ConnectionState,
    pub error: Option<String>,
    pub device_info: Option<String>,
    pub power: i16,
    pub cadence: u16,
    pub heart_rate: u16,
    pub cadence_source: Option<CadenceSource>,
    pub historical_power_data: Vec<i16>,
    pub historical_cadence_data: Vec<u16>,
    pub historical_heart_rate_data: Vec<u16>,
}

#[derive(Default)]
struct StreamState {
    is_supported: bool,
    is_scanning: bool,
    devices: Vec<DeviceInfo>,
    connected_device: Option<DeviceInfo>,
    connection_state: ConnectionState,
    error: Option<String>,
    device_info: Option<String>,
    session: Option<DeviceSession>,
    operations: Option<DeviceOperations>,
    power: i16,
    cadence: u16,
    heart_rate: u16,
    arbiter: CadenceArbiter,
    historical_power: Vec<i16>,
    historical_cadence: Vec<u16>,
    historical_heart_rate: Vec<u16>,
    /// Bumped whenever a connection starts or ends; stale sinks compare against it.
    generation: u64,
}

impl StreamState {
    /// Apply one reading. Returns false when arbitration rejects it.
    fn apply_reading(&mut self, reading: &SensorReading) -> bool {
        match reading.measurement {
            Measurement::Power(watts) => {
                self.power = watts;
                self.historical_power.push(watts);
            }
            Measurement::Cadence(rpm) => {
                let Some(source) = reading.cadence_source() else {
                    return false;
                };
                if !self.arbiter.offer(source) {
                    return false;
                }
                self.cadence = rpm;
                self.historical_cadence.push(rpm);
            }
            Measurement::HeartRate(bpm) => {
                self.heart_rate = bpm;
                self.historical_heart_rate.push(bpm);
            }
        }
        true
    }

    /// Drop everything scoped to the current connection. History is kept.
    fn clear_connection(&mut self) -> Option<(DeviceSession, DeviceInfo)> {
        self.generation = self.generation.wrapping_add(1);
        self.arbiter.reset();
        self.operations = None;
        self.device_info = None;
        let session = self.session.take();
        let device = self.connected_device.take();
        session.zip(device)
    }

    fn snapshot(&self) -> SensorSnapshot {
        SensorSnapshot {
            is_supported: self.is_supported,
            is_scanning: self.is_scanning,
            devices: self.devices.iter().map(DeviceSummary::from).collect(),
            connected_device: self.connected_device.as_ref().map(DeviceSummary::from),
            connection_state: self.connection_state,
            error: self.error.clone(),
            device_info: self.device_info.clone(),
            power: self.power,
            cadence: self.cadence,
            heart_rate: self.heart_rate,
            cadence_source: self.arbiter.source(),
            historical_power_data: self.historical_power.clone(),
            historical_cadence_data: self.historical_cadence.clone(),
            historical_heart_rate_data: self.historical_heart_rate.clone(),
        }
    }
}

struct Inner {
    backend: Arc<dyn BleBackend>,
    config: SensorConfig,
    state: Mutex<StreamState>,
    event_tx: std::sync::Mutex<Option<Sender<SensorEvent>>>,
}

impl Inner {
    fn send_event(&self, event: SensorEvent) {
        if let Ok(guard) = self.event_tx.lock() {
            if let Some(tx) = guard.as_ref() {
                let _ = tx.send(event);
            }
        }
    }
}

/// Shared sensor state and the operations that drive it.
#[derive(Clone)]
pub struct SensorStream {
    inner: Arc<Inner>,
}

impl SensorStream {
    pub fn new(backend: Arc<dyn BleBackend>, config: SensorConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                backend,
                config,
                state: Mutex::new(StreamState::default()),
                event_tx: std::sync::Mutex::new(None),
            }),
        }
    }

    /// Get an event receiver for sensor events.
    ///
    /// Replaces any receiver handed out earlier.
    pub fn event_receiver(&self) -> Receiver<SensorEvent> {
        let (tx, rx) = crossbeam::channel::unbounded();
        if let Ok(mut guard) = self.inner.event_tx.lock() {
            *guard = Some(tx);
        }
        rx
    }

    /// Probe the Bluetooth stack and record the result.
    pub async fn check_support(&self) -> bool {
        let supported = self.inner.backend.is_available().await;
        let mut state = self.inner.state.lock().await;
        state.is_supported = supported;
        if supported {
            state.error = None;
        } else {
            tracing::warn!("Bluetooth is not available");
            state.error = Some(SensorError::Unsupported.user_message());
        }
        supported
    }

    /// Ask the user to pick a device advertising one of the known services.
    ///
    /// Failures are recorded as the user-visible error, never returned.
    pub async fn scan_for_devices(&self) -> Option<DeviceInfo> {
        let supported = self.inner.state.lock().await.is_supported;
        if !supported && !self.check_support().await {
            return None;
        }

        {
            let mut state = self.inner.state.lock().await;
            state.is_scanning = true;
            state.error = None;
            state.devices.clear();
        }
        self.inner.send_event(SensorEvent::ScanStarted);
        tracing::info!("Requesting device");

        let result = self
            .inner
            .backend
            .request_device(&KnownService::uuids())
            .await;

        let mut state = self.inner.state.lock().await;
        state.is_scanning = false;
        self.inner.send_event(SensorEvent::ScanStopped);

        match result {
            Ok(handle) => {
                let device = DeviceInfo::from_handle(handle);
                tracing::info!("Found {} ({})", device.name, device.id);
                state.devices = vec![device.clone()];
                self.inner.send_event(SensorEvent::Discovered {
                    device_id: device.id.clone(),
                    name: device.name.clone(),
                });
                Some(device)
            }
            Err(e) => {
                tracing::warn!("Scan failed: {}", e);
                let message = e.user_message();
                state.error = Some(message.clone());
                self.inner.send_event(SensorEvent::Error(message));
                None
            }
        }
    }

    /// Connect to `device` and wire every service it exposes.
    ///
    /// Any active session is torn down first. Only a failed GATT connect is
    /// an error; it is also recorded as the user-visible error.
    pub async fn connect_to_device(
        &self,
        device: &DeviceInfo,
    ) -> Result<DeviceOperations, SensorError> {
        let (generation, previous) = {
            let mut state = self.inner.state.lock().await;
            let previous = state.clear_connection();
            state.connection_state = ConnectionState::Connecting;
            state.error = None;
            (state.generation, previous)
        };

        if let Some((mut session, old_device)) = previous {
            tracing::info!("Closing session with {} before connecting", old_device.name);
            session.close();
            if let Err(e) = old_device.handle.disconnect().await {
                tracing::warn!("Failed to disconnect {}: {}", old_device.name, e);
            }
        }

        self.inner.send_event(SensorEvent::ConnectionChanged {
            device_id: device.id.clone(),
            state: ConnectionState::Connecting,
        });

        let sink = Arc::new(StreamSink {
            inner: Arc::downgrade(&self.inner),
            generation,
        });

        let mut session = match DeviceSession::open(device.clone(), &self.inner.config, sink).await
        {
            Ok(session) => session,
            Err(e) => {
                tracing::error!("Failed to connect to {}: {}", device.name, e);
                let mut state = self.inner.state.lock().await;
                if state.generation == generation {
                    state.connection_state = ConnectionState::Disconnected;
                    state.error = Some(e.user_message());
                }
                self.inner.send_event(SensorEvent::Error(e.user_message()));
                return Err(e);
            }
        };

        let watcher = {
            let inner = Arc::downgrade(&self.inner);
            let handle = device.handle.clone();
            tokio::spawn(async move {
                handle.disconnected().await;
                if let Some(inner) = inner.upgrade() {
                    SensorStream { inner }.on_device_lost(generation, true).await;
                }
            })
        };
        session.set_watcher(watcher);

        let operations = session.operations();
        let mut state = self.inner.state.lock().await;
        if state.generation != generation {
            let reused = state
                .connected_device
                .as_ref()
                .is_some_and(|current| current.id == device.id);
            drop(state);
            tracing::debug!("Connection to {} superseded", device.name);
            session.close();
            if !reused {
                if let Err(e) = device.handle.disconnect().await {
                    tracing::warn!("Failed to disconnect {}: {}", device.name, e);
                }
            }
            return Ok(DeviceOperations::noop());
        }

        state.device_info = session.device_info().map(str::to_string);
        state.session = Some(session);
        state.operations = Some(operations.clone());
        state.connected_device = Some(device.clone());
        state.connection_state = ConnectionState::Connected;
        drop(state);

        self.inner.send_event(SensorEvent::ConnectionChanged {
            device_id: device.id.clone(),
            state: ConnectionState::Connected,
        });

        // A drop during setup may have fired before the watcher subscribed.
        if !device.handle.is_connected().await {
            self.on_device_lost(generation, false).await;
            return Err(SensorError::Disconnected);
        }

        Ok(operations)
    }

    /// Close the active session at the user's request.
    pub async fn disconnect_device(&self) {
        let previous = {
            let mut state = self.inner.state.lock().await;
            let previous = state.clear_connection();
            state.error = None;
            let connecting = state.connection_state == ConnectionState::Connecting;
            if previous.is_some() || connecting {
                state.connection_state = ConnectionState::Disconnected;
            }
            if previous.is_none() && connecting {
                // The in-flight connect sees the new generation and releases its link.
                tracing::info!("Cancelling pending connection");
            }
            previous
        };

        let Some((mut session, device)) = previous else {
            tracing::debug!("Disconnect requested with no active session");
            return;
        };

        tracing::info!("Disconnecting from {}", device.name);
        session.close();
        if device.handle.is_connected().await {
            if let Err(e) = device.handle.disconnect().await {
                tracing::warn!("Failed to disconnect {}: {}", device.name, e);
            }
        }

        self.inner.send_event(SensorEvent::ConnectionChanged {
            device_id: device.id,
            state: ConnectionState::Disconnected,
        });
    }

    /// Link dropped without a user request. `from_watcher` is set when called
    /// by the watcher task itself, which must not abort its own handle.
    async fn on_device_lost(&self, generation: u64, from_watcher: bool) {
        let mut state = self.inner.state.lock().await;
        if state.generation != generation {
            return;
        }
        let Some((mut session, device)) = state.clear_connection() else {
            return;
        };
        let message = SensorError::Disconnected.user_message();
        state.connection_state = ConnectionState::Disconnected;
        state.error = Some(message.clone());
        drop(state);

        tracing::warn!("{} disconnected", device.name);
        if from_watcher {
            session.detach_watcher();
        }
        session.close();

        self.inner.send_event(SensorEvent::ConnectionChanged {
            device_id: device.id,
            state: ConnectionState::Disconnected,
        });
        self.inner.send_event(SensorEvent::Error(message));
    }

    /// Command the trainer's target power (ERG mode).
    pub async fn set_trainer_target_power(&self, watts: i16) -> Result<(), SensorError> {
        let operations = self
            .inner
            .state
            .lock()
            .await
            .operations
            .clone()
            .ok_or(SensorError::NotConnected)?;
        operations.set_target_power(watts).await
    }

    /// Combined operations of the active session.
    pub async fn operations(&self) -> Option<DeviceOperations> {
        self.inner.state.lock().await.operations.clone()
    }

    pub async fn snapshot(&self) -> SensorSnapshot {
        self.inner.state.lock().await.snapshot()
    }

    pub async fn connection_state(&self) -> ConnectionState {
        self.inner.state.lock().await.connection_state
    }

    pub async fn is_connected(&self) -> bool {
        self.connection_state().await == ConnectionState::Connected
    }

    pub async fn power(&self) -> i16 {
        self.inner.state.lock().await.power
    }

    pub async fn cadence(&self) -> u16 {
        self.inner.state.lock().await.cadence
    }

    pub async fn heart_rate(&self) -> u16 {
        self.inner.state.lock().await.heart_rate
    }

    pub async fn cadence_source(&self) -> Option<CadenceSource> {
        self.inner.state.lock().await.arbiter.source()
    }

    pub async fn error(&self) -> Option<String> {
        self.inner.state.lock().await.error.clone()
    }
}

/// Routes one session's readings into the shared state.
struct StreamSink {
    inner: Weak<Inner>,
    generation: u64,
}

#[async_trait]
impl ReadingSink for StreamSink {
    async fn apply(&self, readings: Vec<SensorReading>) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        let mut state = inner.state.lock().await;
        if state.generation != self.generation {
            return;
        }
        for reading in readings {
            if state.apply_reading(&reading) {
                inner.send_event(SensorEvent::Reading(reading));
            }
        }
    }

    async fn control_response(&self, response: ControlPointResponse) {
        if let Some(inner) = self.inner.upgrade() {
            inner.send_event(SensorEvent::ControlPoint(response));
        }
    }
}
