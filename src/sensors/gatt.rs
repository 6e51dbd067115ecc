//! GATT service and characteristic UUIDs used by the acquisition layer.

use uuid::Uuid;

/// FTMS Service UUID (0x1826)
pub const FTMS_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000_1826_0000_1000_8000_0080_5f9b_34fb);

/// Indoor Bike Data Characteristic UUID (0x2AD2)
pub const INDOOR_BIKE_DATA_UUID: Uuid = Uuid::from_u128(0x0000_2ad2_0000_1000_8000_0080_5f9b_34fb);

/// Fitness Machine Control Point UUID (0x2AD9)
pub const FTMS_CONTROL_POINT_UUID: Uuid =
    Uuid::from_u128(0x0000_2ad9_0000_1000_8000_0080_5f9b_34fb);

/// Fitness Machine Feature UUID (0x2ACC)
pub const FTMS_FEATURE_UUID: Uuid = Uuid::from_u128(0x0000_2acc_0000_1000_8000_0080_5f9b_34fb);

/// Fitness Machine Status UUID (0x2ADA)
pub const FTMS_STATUS_UUID: Uuid = Uuid::from_u128(0x0000_2ada_0000_1000_8000_0080_5f9b_34fb);

/// Cycling Power Service UUID (0x1818)
pub const CYCLING_POWER_SERVICE_UUID: Uuid =
    Uuid::from_u128(0x0000_1818_0000_1000_8000_0080_5f9b_34fb);

/// Cycling Power Measurement UUID (0x2A63)
pub const CYCLING_POWER_MEASUREMENT_UUID: Uuid =
    Uuid::from_u128(0x0000_2a63_0000_1000_8000_0080_5f9b_34fb);

/// Cycling Speed and Cadence Service UUID (0x1816)
pub const CSC_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000_1816_0000_1000_8000_0080_5f9b_34fb);

/// CSC Measurement UUID (0x2A5B)
pub const CSC_MEASUREMENT_UUID: Uuid = Uuid::from_u128(0x0000_2a5b_0000_1000_8000_0080_5f9b_34fb);

/// Heart Rate Service UUID (0x180D)
pub const HEART_RATE_SERVICE_UUID: Uuid =
    Uuid::from_u128(0x0000_180d_0000_1000_8000_0080_5f9b_34fb);

/// Heart Rate Measurement UUID (0x2A37)
pub const HEART_RATE_MEASUREMENT_UUID: Uuid =
    Uuid::from_u128(0x0000_2a37_0000_1000_8000_0080_5f9b_34fb);

/// Device Information Service UUID (0x180A)
pub const DEVICE_INFO_SERVICE_UUID: Uuid =
    Uuid::from_u128(0x0000_180a_0000_1000_8000_0080_5f9b_34fb);

/// Model Number String UUID (0x2A24)
pub const MODEL_NUMBER_UUID: Uuid = Uuid::from_u128(0x0000_2a24_0000_1000_8000_0080_5f9b_34fb);

/// Manufacturer Name String UUID (0x2A29)
pub const MANUFACTURER_NAME_UUID: Uuid =
    Uuid::from_u128(0x0000_2a29_0000_1000_8000_0080_5f9b_34fb);

/// The five optional services probed on every connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KnownService {
    FitnessMachine,
    CyclingPower,
    CyclingSpeedCadence,
    HeartRate,
    DeviceInformation,
}

impl KnownService {
    /// All services in discovery order.
    pub const ALL: [KnownService; 5] = [
        KnownService::FitnessMachine,
        KnownService::CyclingPower,
        KnownService::CyclingSpeedCadence,
        KnownService::HeartRate,
        KnownService::DeviceInformation,
    ];

    pub fn uuid(&self) -> Uuid {
        match self {
            KnownService::FitnessMachine => FTMS_SERVICE_UUID,
            KnownService::CyclingPower => CYCLING_POWER_SERVICE_UUID,
            KnownService::CyclingSpeedCadence => CSC_SERVICE_UUID,
            KnownService::HeartRate => HEART_RATE_SERVICE_UUID,
            KnownService::DeviceInformation => DEVICE_INFO_SERVICE_UUID,
        }
    }

    /// Primary data characteristic, if the service streams one.
    pub fn data_characteristic(&self) -> Option<Uuid> {
        match self {
            KnownService::FitnessMachine => Some(INDOOR_BIKE_DATA_UUID),
            KnownService::CyclingPower => Some(CYCLING_POWER_MEASUREMENT_UUID),
            KnownService::CyclingSpeedCadence => Some(CSC_MEASUREMENT_UUID),
            KnownService::HeartRate => Some(HEART_RATE_MEASUREMENT_UUID),
            KnownService::DeviceInformation => None,
        }
    }

    /// Service UUIDs requested from the device picker.
    pub fn uuids() -> Vec<Uuid> {
        Self::ALL.iter().map(|s| s.uuid()).collect()
    }
}

impl std::fmt::Display for KnownService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KnownService::FitnessMachine => write!(f, "Fitness Machine"),
            KnownService::CyclingPower => write!(f, "Cycling Power"),
            KnownService::CyclingSpeedCadence => write!(f, "Cycling Speed/Cadence"),
            KnownService::HeartRate => write!(f, "Heart Rate"),
            KnownService::DeviceInformation => write!(f, "Device Information"),
        }
    }
}

/// Hex dump for trace logging of raw payloads.
pub fn hex_dump(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
