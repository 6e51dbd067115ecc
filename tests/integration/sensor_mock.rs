//! Simulated GATT device for driving the sensor stream without hardware.

use async_trait::async_trait;
use futures::channel::mpsc;
use ridelink::sensors::gatt::{
    CSC_MEASUREMENT_UUID, CYCLING_POWER_MEASUREMENT_UUID, FTMS_CONTROL_POINT_UUID,
    HEART_RATE_MEASUREMENT_UUID, INDOOR_BIKE_DATA_UUID, MANUFACTURER_NAME_UUID, MODEL_NUMBER_UUID,
};
use ridelink::sensors::{
    BleBackend, DeviceInfo, GattCharacteristic, GattPeripheral, GattService, KnownService,
    NotificationStream, SensorError,
};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use uuid::Uuid;

/// A characteristic that records writes and fans out pushed values.
pub struct MockCharacteristic {
    uuid: Uuid,
    value: Vec<u8>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<Vec<u8>>>>,
    writes: Mutex<Vec<Vec<u8>>>,
    notifying: AtomicBool,
}

impl MockCharacteristic {
    fn new(uuid: Uuid, value: Vec<u8>) -> Arc<Self> {
        Arc::new(Self {
            uuid,
            value,
            subscribers: Mutex::new(Vec::new()),
            writes: Mutex::new(Vec::new()),
            notifying: AtomicBool::new(false),
        })
    }

    /// Deliver a value to every subscriber.
    pub fn push(&self, data: &[u8]) {
        let mut subscribers = self.subscribers.lock().unwrap();
        subscribers.retain(|tx| tx.unbounded_send(data.to_vec()).is_ok());
    }

    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.writes.lock().unwrap().clone()
    }

    pub fn is_notifying(&self) -> bool {
        self.notifying.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GattCharacteristic for MockCharacteristic {
    fn uuid(&self) -> Uuid {
        self.uuid
    }

    async fn start_notifications(&self) -> Result<(), SensorError> {
        self.notifying.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop_notifications(&self) -> Result<(), SensorError> {
        self.notifying.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn read_value(&self) -> Result<Vec<u8>, SensorError> {
        Ok(self.value.clone())
    }

    async fn write_value(&self, data: &[u8]) -> Result<(), SensorError> {
        self.writes.lock().unwrap().push(data.to_vec());
        Ok(())
    }

    async fn notifications(&self) -> Result<NotificationStream, SensorError> {
        let (tx, rx) = mpsc::unbounded();
        self.subscribers.lock().unwrap().push(tx);
        Ok(Box::pin(rx))
    }
}

pub struct MockService {
    uuid: Uuid,
    characteristics: HashMap<Uuid, Arc<MockCharacteristic>>,
}

#[async_trait]
impl GattService for MockService {
    fn uuid(&self) -> Uuid {
        self.uuid
    }

    async fn characteristic(
        &self,
        uuid: Uuid,
    ) -> Result<Arc<dyn GattCharacteristic>, SensorError> {
        self.characteristics
            .get(&uuid)
            .cloned()
            .map(|c| c as Arc<dyn GattCharacteristic>)
            .ok_or(SensorError::CharacteristicNotFound(uuid))
    }
}

/// A peripheral exposing a chosen subset of the known services.
pub struct MockPeripheral {
    id: String,
    name: Option<String>,
    services: HashMap<Uuid, Arc<MockService>>,
    connected: AtomicBool,
    refuse_connect: bool,
    connect_delay: Duration,
    drop_during_setup: bool,
    link_lost: Notify,
}

impl MockPeripheral {
    pub fn builder(id: &str) -> MockPeripheralBuilder {
        MockPeripheralBuilder {
            id: id.to_string(),
            name: None,
            services: HashMap::new(),
            refuse_connect: false,
            connect_delay: Duration::ZERO,
            drop_during_setup: false,
        }
    }

    /// Trainer with FTMS (data and control point), power, CSC, heart rate
    /// and device information.
    pub fn smart_trainer() -> Arc<Self> {
        Self::builder("trainer-1")
            .name("KICKR CORE")
            .service(
                KnownService::FitnessMachine,
                &[INDOOR_BIKE_DATA_UUID, FTMS_CONTROL_POINT_UUID],
            )
            .service(KnownService::CyclingPower, &[CYCLING_POWER_MEASUREMENT_UUID])
            .service(KnownService::CyclingSpeedCadence, &[CSC_MEASUREMENT_UUID])
            .service(KnownService::HeartRate, &[HEART_RATE_MEASUREMENT_UUID])
            .device_information("Acme\0", "KICKR CORE")
            .build()
    }

    pub fn heart_rate_strap() -> Arc<Self> {
        Self::builder("strap-1")
            .name("HRM-Pro")
            .service(KnownService::HeartRate, &[HEART_RATE_MEASUREMENT_UUID])
            .build()
    }

    /// Look up a characteristic for pushing values or inspecting writes.
    pub fn characteristic(&self, service: KnownService, uuid: Uuid) -> Arc<MockCharacteristic> {
        self.services[&service.uuid()].characteristics[&uuid].clone()
    }

    pub fn info(self: &Arc<Self>) -> DeviceInfo {
        DeviceInfo::from_handle(self.clone())
    }

    /// Simulate the link dropping.
    pub fn drop_link(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.link_lost.notify_one();
    }
}

#[async_trait]
impl GattPeripheral for MockPeripheral {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn name(&self) -> Option<String> {
        self.name.clone()
    }

    async fn connect(&self) -> Result<(), SensorError> {
        if !self.connect_delay.is_zero() {
            tokio::time::sleep(self.connect_delay).await;
        }
        if self.refuse_connect {
            return Err(SensorError::ConnectionFailed("GATT server refused".to_string()));
        }
        if self.drop_during_setup {
            // Nobody is waiting yet, so the event is lost.
            self.link_lost.notify_waiters();
            return Ok(());
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), SensorError> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn primary_service(&self, uuid: Uuid) -> Result<Arc<dyn GattService>, SensorError> {
        self.services
            .get(&uuid)
            .cloned()
            .map(|s| s as Arc<dyn GattService>)
            .ok_or(SensorError::ServiceNotFound(uuid))
    }

    async fn disconnected(&self) {
        self.link_lost.notified().await;
    }
}

pub struct MockPeripheralBuilder {
    id: String,
    name: Option<String>,
    services: HashMap<Uuid, Arc<MockService>>,
    refuse_connect: bool,
    connect_delay: Duration,
    drop_during_setup: bool,
}

impl MockPeripheralBuilder {
    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn service(mut self, service: KnownService, characteristics: &[Uuid]) -> Self {
        let characteristics = characteristics
            .iter()
            .map(|uuid| (*uuid, MockCharacteristic::new(*uuid, Vec::new())))
            .collect();
        self.services.insert(
            service.uuid(),
            Arc::new(MockService {
                uuid: service.uuid(),
                characteristics,
            }),
        );
        self
    }

    pub fn device_information(mut self, manufacturer: &str, model: &str) -> Self {
        let uuid = KnownService::DeviceInformation.uuid();
        let characteristics = HashMap::from([
            (
                MANUFACTURER_NAME_UUID,
                MockCharacteristic::new(MANUFACTURER_NAME_UUID, manufacturer.as_bytes().to_vec()),
            ),
            (
                MODEL_NUMBER_UUID,
                MockCharacteristic::new(MODEL_NUMBER_UUID, model.as_bytes().to_vec()),
            ),
        ]);
        self.services
            .insert(uuid, Arc::new(MockService { uuid, characteristics }));
        self
    }

    pub fn refuse_connect(mut self) -> Self {
        self.refuse_connect = true;
        self
    }

    pub fn connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = delay;
        self
    }

    /// The link is gone by the time service discovery runs.
    pub fn drop_during_setup(mut self) -> Self {
        self.drop_during_setup = true;
        self
    }

    pub fn build(self) -> Arc<MockPeripheral> {
        Arc::new(MockPeripheral {
            id: self.id,
            name: self.name,
            services: self.services,
            connected: AtomicBool::new(false),
            refuse_connect: self.refuse_connect,
            connect_delay: self.connect_delay,
            drop_during_setup: self.drop_during_setup,
            link_lost: Notify::new(),
        })
    }
}

/// Backend whose picker always returns the configured device.
pub struct MockBackend {
    available: bool,
    device: Option<Arc<MockPeripheral>>,
}

impl MockBackend {
    pub fn with_device(device: Arc<MockPeripheral>) -> Arc<Self> {
        Arc::new(Self {
            available: true,
            device: Some(device),
        })
    }

    pub fn empty() -> Arc<Self> {
        Arc::new(Self {
            available: true,
            device: None,
        })
    }

    pub fn unavailable() -> Arc<Self> {
        Arc::new(Self {
            available: false,
            device: None,
        })
    }
}

#[async_trait]
impl BleBackend for MockBackend {
    async fn is_available(&self) -> bool {
        self.available
    }

    async fn request_device(
        &self,
        _services: &[Uuid],
    ) -> Result<Arc<dyn GattPeripheral>, SensorError> {
        self.device
            .clone()
            .map(|d| d as Arc<dyn GattPeripheral>)
            .ok_or(SensorError::NoDeviceSelected)
    }
}

/// Poll `check` until it holds, failing the test after about two seconds.
pub async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..400 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}
