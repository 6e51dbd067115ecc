//! btleplug-backed GATT transport.

use crate::sensors::transport::{
    BleBackend, GattCharacteristic, GattPeripheral, GattService, NotificationStream,
};
use crate::sensors::types::SensorError;
use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter, Service,
    WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::stream::{Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

const SCAN_POLL_INTERVAL: Duration = Duration::from_millis(250);

type CentralEvents = Pin<Box<dyn Stream<Item = CentralEvent> + Send>>;

/// Device picker over the first system adapter.
///
/// Picks the first peripheral that matches the name filter, or, without a
/// filter, the first one advertising a requested service.
pub struct BtleBackend {
    manager: Manager,
    scan_timeout: Duration,
    name_filter: Option<String>,
}

impl BtleBackend {
    pub async fn new(
        scan_timeout: Duration,
        name_filter: Option<String>,
    ) -> Result<Self, SensorError> {
        let manager = Manager::new().await.map_err(|e| {
            tracing::error!("Failed to create BLE manager: {}", e);
            SensorError::Unsupported
        })?;

        Ok(Self {
            manager,
            scan_timeout,
            name_filter,
        })
    }

    async fn adapter(&self) -> Result<Adapter, SensorError> {
        self.manager
            .adapters()
            .await?
            .into_iter()
            .next()
            .ok_or(SensorError::Unsupported)
    }

    async fn find_match(
        &self,
        adapter: &Adapter,
        services: &[Uuid],
    ) -> Result<Option<(Peripheral, Option<String>)>, SensorError> {
        for peripheral in adapter.peripherals().await? {
            let Some(properties) = peripheral.properties().await? else {
                continue;
            };

            let matches = match (&self.name_filter, &properties.local_name) {
                (Some(prefix), Some(name)) => name.starts_with(prefix.as_str()),
                (Some(_), None) => false,
                (None, _) => properties.services.iter().any(|s| services.contains(s)),
            };

            if matches {
                return Ok(Some((peripheral, properties.local_name)));
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl BleBackend for BtleBackend {
    async fn is_available(&self) -> bool {
        match self.manager.adapters().await {
            Ok(adapters) => !adapters.is_empty(),
            Err(e) => {
                tracing::warn!("Failed to list BLE adapters: {}", e);
                false
            }
        }
    }

    async fn request_device(
        &self,
        services: &[Uuid],
    ) -> Result<Arc<dyn GattPeripheral>, SensorError> {
        let adapter = self.adapter().await?;

        tracing::info!("Scanning for {:?}", self.scan_timeout);
        adapter
            .start_scan(ScanFilter {
                services: services.to_vec(),
            })
            .await
            .map_err(|e| match SensorError::from(e) {
                SensorError::PermissionDenied => SensorError::PermissionDenied,
                other => SensorError::ScanFailed(other.to_string()),
            })?;

        let deadline = Instant::now() + self.scan_timeout;
        let found = loop {
            if let Some(found) = self.find_match(&adapter, services).await? {
                break Some(found);
            }
            if Instant::now() >= deadline {
                break None;
            }
            tokio::time::sleep(SCAN_POLL_INTERVAL).await;
        };

        if let Err(e) = adapter.stop_scan().await {
            tracing::warn!("Failed to stop scan: {}", e);
        }

        let (peripheral, name) = found.ok_or(SensorError::NoDeviceSelected)?;
        tracing::info!("Selected device {:?} ({})", name, peripheral.id());

        Ok(Arc::new(BtlePeripheral {
            adapter,
            peripheral,
            name,
            events: tokio::sync::Mutex::new(None),
        }))
    }
}

/// A btleplug peripheral behind the GATT traits.
pub struct BtlePeripheral {
    adapter: Adapter,
    peripheral: Peripheral,
    name: Option<String>,
    /// Adapter events subscribed before connecting, consumed by `disconnected`.
    events: tokio::sync::Mutex<Option<CentralEvents>>,
}

#[async_trait]
impl GattPeripheral for BtlePeripheral {
    fn id(&self) -> String {
        self.peripheral.id().to_string()
    }

    fn name(&self) -> Option<String> {
        self.name.clone()
    }

    async fn connect(&self) -> Result<(), SensorError> {
        match self.adapter.events().await {
            Ok(events) => *self.events.lock().await = Some(events),
            Err(e) => tracing::warn!("Failed to subscribe to adapter events: {}", e),
        }

        self.peripheral
            .connect()
            .await
            .map_err(|e| SensorError::ConnectionFailed(e.to_string()))?;

        self.peripheral
            .discover_services()
            .await
            .map_err(|e| SensorError::ConnectionFailed(e.to_string()))?;

        Ok(())
    }

    async fn disconnect(&self) -> Result<(), SensorError> {
        self.peripheral.disconnect().await?;
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.peripheral.is_connected().await.unwrap_or(false)
    }

    async fn primary_service(&self, uuid: Uuid) -> Result<Arc<dyn GattService>, SensorError> {
        let service = self
            .peripheral
            .services()
            .into_iter()
            .find(|s| s.uuid == uuid && s.primary)
            .ok_or(SensorError::ServiceNotFound(uuid))?;

        Ok(Arc::new(BtleService {
            peripheral: self.peripheral.clone(),
            service,
        }))
    }

    async fn disconnected(&self) {
        let subscribed = self.events.lock().await.take();
        let mut events = match subscribed {
            Some(events) => events,
            None => match self.adapter.events().await {
                Ok(events) => events,
                Err(e) => {
                    tracing::error!("Failed to get adapter events: {}", e);
                    return futures::future::pending::<()>().await;
                }
            },
        };

        let id = self.peripheral.id();
        while let Some(event) = events.next().await {
            if let CentralEvent::DeviceDisconnected(gone) = event {
                if gone == id {
                    return;
                }
            }
        }
    }
}

struct BtleService {
    peripheral: Peripheral,
    service: Service,
}

#[async_trait]
impl GattService for BtleService {
    fn uuid(&self) -> Uuid {
        self.service.uuid
    }

    async fn characteristic(
        &self,
        uuid: Uuid,
    ) -> Result<Arc<dyn GattCharacteristic>, SensorError> {
        let characteristic = self
            .service
            .characteristics
            .iter()
            .find(|c| c.uuid == uuid)
            .cloned()
            .ok_or(SensorError::CharacteristicNotFound(uuid))?;

        Ok(Arc::new(BtleCharacteristic {
            peripheral: self.peripheral.clone(),
            characteristic,
        }))
    }
}

struct BtleCharacteristic {
    peripheral: Peripheral,
    characteristic: Characteristic,
}

#[async_trait]
impl GattCharacteristic for BtleCharacteristic {
    fn uuid(&self) -> Uuid {
        self.characteristic.uuid
    }

    async fn start_notifications(&self) -> Result<(), SensorError> {
        self.peripheral
            .subscribe(&self.characteristic)
            .await
            .map_err(|e| SensorError::SubscriptionFailed(e.to_string()))
    }

    async fn stop_notifications(&self) -> Result<(), SensorError> {
        self.peripheral
            .unsubscribe(&self.characteristic)
            .await
            .map_err(|e| SensorError::SubscriptionFailed(e.to_string()))
    }

    async fn read_value(&self) -> Result<Vec<u8>, SensorError> {
        self.peripheral
            .read(&self.characteristic)
            .await
            .map_err(|e| SensorError::ReadFailed(e.to_string()))
    }

    async fn write_value(&self, data: &[u8]) -> Result<(), SensorError> {
        self.peripheral
            .write(&self.characteristic, data, WriteType::WithResponse)
            .await
            .map_err(|e| SensorError::WriteFailed(e.to_string()))
    }

    async fn notifications(&self) -> Result<NotificationStream, SensorError> {
        let uuid = self.characteristic.uuid;
        let stream = self
            .peripheral
            .notifications()
            .await
            .map_err(|e| SensorError::SubscriptionFailed(e.to_string()))?;

        Ok(Box::pin(stream.filter_map(move |notification| async move {
            (notification.uuid == uuid).then_some(notification.value)
        })))
    }
}
