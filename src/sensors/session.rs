//! Per-connection service discovery and notification wiring.
//!
//! Every known service is probed independently; a missing or failing service
//! is logged and skipped. Each discovered data characteristic gets its own
//! session task that decodes notifications strictly in arrival order. The
//! collected handles are merged into one [`DeviceOperations`].

use crate::sensors::control_point::{
    log_response, parse_control_point_response, ControlPointClient, ControlPointResponse,
};
use crate::sensors::gatt::{
    hex_dump, KnownService, FTMS_CONTROL_POINT_UUID, MANUFACTURER_NAME_UUID, MODEL_NUMBER_UUID,
};
use crate::sensors::profiles::{decoder_for, CharacteristicDecoder};
use crate::sensors::transport::{GattCharacteristic, GattService};
use crate::sensors::types::{DeviceInfo, SensorConfig, SensorError, SensorReading};
use async_trait::async_trait;
use futures::stream::StreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;

/// Receiver of decoded data for one session.
#[async_trait]
pub trait ReadingSink: Send + Sync {
    /// Apply readings decoded from one notification.
    async fn apply(&self, readings: Vec<SensorReading>);

    /// A control point response arrived.
    async fn control_response(&self, response: ControlPointResponse);
}

/// Handles collected from one discovered service.
#[derive(Clone)]
pub struct ServiceHandles {
    pub service: KnownService,
    /// Data characteristic started and stopped with the session
    pub notify: Option<Arc<dyn GattCharacteristic>>,
    /// Control point, FTMS only
    pub control: Option<ControlPointClient>,
}

impl ServiceHandles {
    pub fn new(service: KnownService) -> Self {
        Self {
            service,
            notify: None,
            control: None,
        }
    }
}

/// Device-level start/stop/write, merged from every discovered service.
///
/// Calls after the session is closed are no-ops.
#[derive(Clone)]
pub struct DeviceOperations {
    notify: Vec<(KnownService, Arc<dyn GattCharacteristic>)>,
    control: Option<ControlPointClient>,
    active: Arc<AtomicBool>,
}

impl DeviceOperations {
    /// Merge per-service handles.
    pub fn combine(handles: Vec<ServiceHandles>, active: Arc<AtomicBool>) -> Self {
        let mut notify = Vec::new();
        let mut control = None;

        for handle in handles {
            if let Some(characteristic) = handle.notify {
                notify.push((handle.service, characteristic));
            }
            if let Some(client) = handle.control {
                if control.is_some() {
                    tracing::warn!("Ignoring extra control point on {}", handle.service);
                    continue;
                }
                control = Some(client);
            }
        }

        Self {
            notify,
            control,
            active,
        }
    }

    /// Operations that do nothing.
    pub fn noop() -> Self {
        Self {
            notify: Vec::new(),
            control: None,
            active: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Services with a live data characteristic.
    pub fn services(&self) -> Vec<KnownService> {
        self.notify.iter().map(|(service, _)| *service).collect()
    }

    pub fn has_control(&self) -> bool {
        self.control.is_some()
    }

    /// Start every data characteristic; one failure does not block the rest.
    pub async fn start_notifications(&self) {
        if !self.is_active() {
            return;
        }
        for (service, characteristic) in &self.notify {
            match characteristic.start_notifications().await {
                Ok(()) => tracing::debug!("Started {} notifications", service),
                Err(e) => tracing::warn!("Error starting {} notifications: {}", service, e),
            }
        }
    }

    /// Stop every data characteristic; one failure does not block the rest.
    pub async fn stop_notifications(&self) {
        if !self.is_active() {
            return;
        }
        for (service, characteristic) in &self.notify {
            match characteristic.stop_notifications().await {
                Ok(()) => tracing::debug!("Stopped {} notifications", service),
                Err(e) => tracing::warn!("Error stopping {} notifications: {}", service, e),
            }
        }
    }

    /// Write raw bytes to the control point, if there is one.
    pub async fn write_value(&self, data: &[u8]) -> Result<(), SensorError> {
        let Some(control) = self.control.as_ref().filter(|_| self.is_active()) else {
            tracing::debug!("No active control point, dropping write");
            return Ok(());
        };
        let result = control.characteristic().write_value(data).await;
        self.discard_if_closed(result)
    }

    /// Send a Set Target Power command and wait out the settle delay.
    pub async fn set_target_power(&self, watts: i16) -> Result<(), SensorError> {
        if !self.is_active() {
            return Err(SensorError::NotConnected);
        }
        let control = self.control.as_ref().ok_or(SensorError::ControlUnavailable)?;
        let result = control.set_target_power(watts).await;
        self.discard_if_closed(result)
    }

    fn discard_if_closed(&self, result: Result<(), SensorError>) -> Result<(), SensorError> {
        match result {
            Err(e) if !self.is_active() => {
                tracing::debug!("Discarding write result after disconnect: {}", e);
                Ok(())
            }
            other => other,
        }
    }
}

/// Live state of one connection.
pub struct DeviceSession {
    device: DeviceInfo,
    operations: DeviceOperations,
    active: Arc<AtomicBool>,
    tasks: Vec<JoinHandle<()>>,
    watcher: Option<JoinHandle<()>>,
    device_info: Option<String>,
}

impl DeviceSession {
    /// Connect the GATT server and wire up every service the device exposes.
    ///
    /// Only the GATT connect itself can fail; service problems are logged.
    pub async fn open(
        device: DeviceInfo,
        config: &SensorConfig,
        sink: Arc<dyn ReadingSink>,
    ) -> Result<Self, SensorError> {
        tracing::info!("Connecting to {} ({})", device.name, device.id);

        device.handle.connect().await.map_err(|e| match e {
            SensorError::ConnectionFailed(_) => e,
            other => SensorError::ConnectionFailed(other.to_string()),
        })?;

        let active = Arc::new(AtomicBool::new(true));
        let mut tasks = Vec::new();
        let mut handles = Vec::new();
        let mut device_info = None;

        for service in KnownService::ALL {
            let gatt_service = match device.handle.primary_service(service.uuid()).await {
                Ok(s) => s,
                Err(e) => {
                    tracing::info!("{} service unavailable: {}", service, e);
                    continue;
                }
            };

            if service == KnownService::DeviceInformation {
                device_info = read_device_information(gatt_service.as_ref()).await;
                continue;
            }

            match setup_service(service, gatt_service.as_ref(), config, &sink, &active).await {
                Ok((handle, mut spawned)) => {
                    tracing::info!("{} service ready", service);
                    tasks.append(&mut spawned);
                    handles.push(handle);
                }
                Err(e) => tracing::warn!("Skipping {} service: {}", service, e),
            }
        }

        if handles.is_empty() && device_info.is_none() {
            device_info = Some("Device information not available".to_string());
        }

        let operations = DeviceOperations::combine(handles, active.clone());
        tracing::info!(
            "Connected to {} with {:?}, control: {}",
            device.name,
            operations.services(),
            operations.has_control()
        );

        Ok(Self {
            device,
            operations,
            active,
            tasks,
            watcher: None,
            device_info,
        })
    }

    pub fn device(&self) -> &DeviceInfo {
        &self.device
    }

    pub fn operations(&self) -> DeviceOperations {
        self.operations.clone()
    }

    /// "<manufacturer>, <model>" from the Device Information service.
    pub fn device_info(&self) -> Option<&str> {
        self.device_info.as_deref()
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Attach the task that watches for a spontaneous disconnect.
    pub fn set_watcher(&mut self, watcher: JoinHandle<()>) {
        self.watcher = Some(watcher);
    }

    /// Release the watcher without aborting it (called from the watcher itself).
    pub fn detach_watcher(&mut self) {
        self.watcher = None;
    }

    /// Invalidate the session: no further notifications are decoded and
    /// pending writes resolve as no-ops.
    pub fn close(&mut self) {
        self.active.store(false, Ordering::SeqCst);
        for task in self.tasks.drain(..) {
            task.abort();
        }
        if let Some(watcher) = self.watcher.take() {
            watcher.abort();
        }
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        self.close();
    }
}

async fn setup_service(
    service: KnownService,
    gatt_service: &dyn GattService,
    config: &SensorConfig,
    sink: &Arc<dyn ReadingSink>,
    active: &Arc<AtomicBool>,
) -> Result<(ServiceHandles, Vec<JoinHandle<()>>), SensorError> {
    let mut handle = ServiceHandles::new(service);
    let mut tasks = Vec::new();

    if let (Some(uuid), Some(decoder)) = (service.data_characteristic(), decoder_for(service, config))
    {
        let result = async {
            let characteristic = gatt_service.characteristic(uuid).await?;
            let task = spawn_data_session(&characteristic, decoder, sink.clone(), active.clone())
                .await?;
            Ok::<_, SensorError>((characteristic, task))
        }
        .await;

        match result {
            Ok((characteristic, task)) => {
                handle.notify = Some(characteristic);
                tasks.push(task);
            }
            // Without a control point there is nothing left to offer.
            Err(e) if service != KnownService::FitnessMachine => return Err(e),
            Err(e) => tracing::warn!("Indoor Bike Data unavailable: {}", e),
        }
    }

    if service == KnownService::FitnessMachine {
        match setup_control_point(gatt_service, config, sink, active).await {
            Ok((client, task)) => {
                handle.control = Some(client);
                tasks.push(task);
            }
            Err(e) if handle.notify.is_none() => return Err(e),
            Err(e) => tracing::warn!("Control point unavailable: {}", e),
        }
    }

    Ok((handle, tasks))
}

/// Spawn the in-order decode loop for one data characteristic.
async fn spawn_data_session(
    characteristic: &Arc<dyn GattCharacteristic>,
    mut decoder: Box<dyn CharacteristicDecoder>,
    sink: Arc<dyn ReadingSink>,
    active: Arc<AtomicBool>,
) -> Result<JoinHandle<()>, SensorError> {
    let mut stream = characteristic.notifications().await?;
    let uuid = characteristic.uuid();

    Ok(tokio::spawn(async move {
        while let Some(value) = stream.next().await {
            if !active.load(Ordering::SeqCst) {
                break;
            }
            tracing::trace!("{} <- {}", uuid, hex_dump(&value));

            let readings = decoder.decode(&value, Instant::now());
            if !readings.is_empty() {
                sink.apply(readings).await;
            }
        }
        tracing::debug!("Notification stream for {} ended", decoder.characteristic());
    }))
}

/// Subscribe to control point responses, then request control.
async fn setup_control_point(
    gatt_service: &dyn GattService,
    config: &SensorConfig,
    sink: &Arc<dyn ReadingSink>,
    active: &Arc<AtomicBool>,
) -> Result<(ControlPointClient, JoinHandle<()>), SensorError> {
    let characteristic = gatt_service.characteristic(FTMS_CONTROL_POINT_UUID).await?;
    let mut stream = characteristic.notifications().await?;

    if let Err(e) = characteristic.start_notifications().await {
        tracing::warn!("Control point indications unavailable: {}", e);
    }

    let sink = sink.clone();
    let active = active.clone();
    let task = tokio::spawn(async move {
        while let Some(value) = stream.next().await {
            if !active.load(Ordering::SeqCst) {
                break;
            }
            if let Some(response) = parse_control_point_response(&value) {
                log_response(&response);
                sink.control_response(response).await;
            }
        }
    });

    let client = ControlPointClient::new(characteristic, config.control_write_settle);
    client.request_control().await;

    Ok((client, task))
}

async fn read_device_information(service: &dyn GattService) -> Option<String> {
    let mut parts = Vec::new();

    for uuid in [MANUFACTURER_NAME_UUID, MODEL_NUMBER_UUID] {
        let value = match service.characteristic(uuid).await {
            Ok(characteristic) => characteristic.read_value().await,
            Err(e) => Err(e),
        };
        match value {
            Ok(bytes) => {
                let text = String::from_utf8_lossy(&bytes)
                    .trim_end_matches('\0')
                    .trim()
                    .to_string();
                if !text.is_empty() {
                    parts.push(text);
                }
            }
            Err(e) => tracing::debug!("Device information {} unavailable: {}", uuid, e),
        }
    }

    if parts.is_empty() {
        None
    } else {
        Some(parts.join(", "))
    }
}
