//! Sensor types and enums for the BLE acquisition layer.

use crate::sensors::cadence::CadenceSource;
use crate::sensors::control_point::ControlPointResponse;
use crate::sensors::transport::GattPeripheral;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Service that produced a reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadingSource {
    /// Cycling Power Service (0x1818)
    CyclingPower,
    /// Cycling Speed and Cadence (0x1816)
    Csc,
    /// Heart Rate Service (0x180D)
    HeartRate,
    /// Fitness Machine Service, Indoor Bike Data (0x1826)
    Ftms,
}

impl std::fmt::Display for ReadingSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReadingSource::CyclingPower => write!(f, "Cycling Power"),
            ReadingSource::Csc => write!(f, "Cycling Speed/Cadence"),
            ReadingSource::HeartRate => write!(f, "Heart Rate"),
            ReadingSource::Ftms => write!(f, "FTMS"),
        }
    }
}

/// Connection state of the device session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No connection attempted yet
    #[default]
    Idle,
    /// GATT connect in progress
    Connecting,
    /// Active connection
    Connected,
    /// Link dropped or closed by the user
    Disconnected,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Idle => write!(f, "Idle"),
            ConnectionState::Connecting => write!(f, "Connecting..."),
            ConnectionState::Connected => write!(f, "Connected"),
            ConnectionState::Disconnected => write!(f, "Disconnected"),
        }
    }
}

/// A device returned by a scan, carrying its native handle.
#[derive(Clone)]
pub struct DeviceInfo {
    /// Platform identifier
    pub id: String,
    /// Advertised name, or "Unknown Device"
    pub name: String,
    /// Native connection handle
    pub handle: Arc<dyn GattPeripheral>,
}

impl DeviceInfo {
    /// Wrap a peripheral handle, taking its identity from the handle.
    pub fn from_handle(handle: Arc<dyn GattPeripheral>) -> Self {
        Self {
            id: handle.id(),
            name: handle.name().unwrap_or_else(|| "Unknown Device".to_string()),
            handle,
        }
    }
}

impl std::fmt::Debug for DeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceInfo")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// A decoded value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Measurement {
    /// Instantaneous power in watts
    Power(i16),
    /// Cadence in RPM
    Cadence(u16),
    /// Heart rate in BPM
    HeartRate(u16),
}

/// A normalized reading, ready to be applied to the stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorReading {
    /// Decoded value
    pub measurement: Measurement,
    /// Service that produced it
    pub source: ReadingSource,
    /// Arrival time of the notification that carried it
    pub received_at: Instant,
}

impl SensorReading {
    pub fn new(measurement: Measurement, source: ReadingSource, received_at: Instant) -> Self {
        Self {
            measurement,
            source,
            received_at,
        }
    }

    /// Cadence source tag for this reading, if it is a cadence value.
    pub fn cadence_source(&self) -> Option<CadenceSource> {
        match (self.measurement, self.source) {
            (Measurement::Cadence(_), ReadingSource::Csc) => Some(CadenceSource::Csc),
            (Measurement::Cadence(_), ReadingSource::CyclingPower) => Some(CadenceSource::Power),
            (Measurement::Cadence(_), ReadingSource::Ftms) => Some(CadenceSource::Ftm),
            _ => None,
        }
    }
}

/// Events from the sensor stream.
#[derive(Debug, Clone)]
pub enum SensorEvent {
    /// Device picker started
    ScanStarted,
    /// Device picker closed
    ScanStopped,
    /// A device was selected
    Discovered { device_id: String, name: String },
    /// Session state changed
    ConnectionChanged {
        device_id: String,
        state: ConnectionState,
    },
    /// A reading was accepted into the stream
    Reading(SensorReading),
    /// The trainer answered a control point request
    ControlPoint(ControlPointResponse),
    /// User-visible error
    Error(String),
}

/// Timing knobs for the stream.
#[derive(Debug, Clone)]
pub struct SensorConfig {
    /// Idle time after the last valid crank cadence before reporting 0 RPM
    pub cadence_idle_timeout: Duration,
    /// Pause after each control point write
    pub control_write_settle: Duration,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            cadence_idle_timeout: Duration::from_millis(2000),
            control_write_settle: Duration::from_millis(200),
        }
    }
}

/// Errors that can occur in the sensor system.
#[derive(Debug, Error)]
pub enum SensorError {
    /// No Bluetooth stack or adapter on this system
    #[error("Bluetooth is not supported on this system")]
    Unsupported,

    /// Picker closed or no matching device found
    #[error("No device selected")]
    NoDeviceSelected,

    /// Permission denied for Bluetooth access
    #[error("Bluetooth permission denied")]
    PermissionDenied,

    /// Failed to scan
    #[error("Failed to scan: {0}")]
    ScanFailed(String),

    /// GATT server connect failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Service absent on the device
    #[error("Service not found: {0}")]
    ServiceNotFound(uuid::Uuid),

    /// Characteristic absent on the service
    #[error("Characteristic not found: {0}")]
    CharacteristicNotFound(uuid::Uuid),

    /// Failed to subscribe to notifications
    #[error("Failed to subscribe to notifications: {0}")]
    SubscriptionFailed(String),

    /// Failed to read a characteristic
    #[error("Read failed: {0}")]
    ReadFailed(String),

    /// Failed to write a characteristic
    #[error("Write failed: {0}")]
    WriteFailed(String),

    /// No connected device
    #[error("Not connected")]
    NotConnected,

    /// Connected device has no control point
    #[error("Trainer control not available")]
    ControlUnavailable,

    /// Link dropped
    #[error("Device disconnected")]
    Disconnected,

    /// Generic BLE error
    #[error("BLE error: {0}")]
    BleError(String),
}

impl SensorError {
    /// Message shown to the rider for this error.
    pub fn user_message(&self) -> String {
        match self {
            SensorError::Unsupported => {
                "Bluetooth is not supported on this system. Please check that a Bluetooth adapter is available and enabled."
                    .to_string()
            }
            SensorError::NoDeviceSelected => "No device selected.".to_string(),
            SensorError::PermissionDenied => {
                "Bluetooth access denied. Please allow Bluetooth access in your system settings."
                    .to_string()
            }
            SensorError::ConnectionFailed(reason) => format!("Connection failed: {}", reason),
            SensorError::Disconnected => "Device disconnected".to_string(),
            other => format!("Error: {}", other),
        }
    }
}

impl From<btleplug::Error> for SensorError {
    fn from(err: btleplug::Error) -> Self {
        match err {
            btleplug::Error::PermissionDenied => SensorError::PermissionDenied,
            btleplug::Error::NotConnected => SensorError::NotConnected,
            btleplug::Error::DeviceNotFound => SensorError::NoDeviceSelected,
            other => SensorError::BleError(other.to_string()),
        }
    }
}
