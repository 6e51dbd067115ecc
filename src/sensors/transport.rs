//! GATT transport abstraction.
//!
//! The session manager only talks to these traits. `btle` provides the
//! btleplug implementation; tests provide a simulated device.

use crate::sensors::types::SensorError;
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;
use uuid::Uuid;

/// Notification values of one characteristic, in arrival order.
pub type NotificationStream = Pin<Box<dyn Stream<Item = Vec<u8>> + Send>>;

/// Platform Bluetooth entry point: availability and the device picker.
#[async_trait]
pub trait BleBackend: Send + Sync {
    /// Whether a usable Bluetooth stack is present.
    async fn is_available(&self) -> bool;

    /// Let the user pick one device advertising any of `services`.
    async fn request_device(
        &self,
        services: &[Uuid],
    ) -> Result<Arc<dyn GattPeripheral>, SensorError>;
}

/// A remote device and its GATT server.
#[async_trait]
pub trait GattPeripheral: Send + Sync {
    fn id(&self) -> String;

    fn name(&self) -> Option<String>;

    /// Connect the GATT server.
    async fn connect(&self) -> Result<(), SensorError>;

    async fn disconnect(&self) -> Result<(), SensorError>;

    async fn is_connected(&self) -> bool;

    /// Look up a primary service on the connected server.
    async fn primary_service(&self, uuid: Uuid) -> Result<Arc<dyn GattService>, SensorError>;

    /// Resolves once the link drops.
    async fn disconnected(&self);
}

#[async_trait]
pub trait GattService: Send + Sync {
    fn uuid(&self) -> Uuid;

    async fn characteristic(&self, uuid: Uuid)
        -> Result<Arc<dyn GattCharacteristic>, SensorError>;
}

#[async_trait]
pub trait GattCharacteristic: Send + Sync {
    fn uuid(&self) -> Uuid;

    async fn start_notifications(&self) -> Result<(), SensorError>;

    async fn stop_notifications(&self) -> Result<(), SensorError>;

    async fn read_value(&self) -> Result<Vec<u8>, SensorError>;

    async fn write_value(&self, data: &[u8]) -> Result<(), SensorError>;

    /// Subscribe to this characteristic's value changes.
    async fn notifications(&self) -> Result<NotificationStream, SensorError>;
}
