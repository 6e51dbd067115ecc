//! BLE characteristic decoders.
//!
//! Each profile exposes a pure `parse_*` function for its wire layout and a
//! stateful decoder that turns notifications into normalized readings.

pub mod csc;
pub mod cycling_power;
pub mod heart_rate;
pub mod indoor_bike;

use crate::sensors::gatt::KnownService;
use crate::sensors::types::{SensorConfig, SensorReading};
use std::time::Instant;
use uuid::Uuid;

pub use csc::{parse_csc_measurement, CscData, CscDecoder};
pub use cycling_power::{parse_cycling_power_measurement, CyclingPowerData, CyclingPowerDecoder};
pub use heart_rate::{parse_heart_rate_measurement, HeartRateData, HeartRateDecoder};
pub use indoor_bike::{parse_indoor_bike_data, IndoorBikeData, IndoorBikeDecoder};

/// Decoder attached to one characteristic session.
///
/// Malformed or empty payloads yield no readings and leave state untouched.
pub trait CharacteristicDecoder: Send {
    /// Characteristic this decoder consumes.
    fn characteristic(&self) -> Uuid;

    /// Decode one notification received at `now`.
    fn decode(&mut self, data: &[u8], now: Instant) -> Vec<SensorReading>;
}

/// Build the decoder for a service's data characteristic.
pub fn decoder_for(
    service: KnownService,
    config: &SensorConfig,
) -> Option<Box<dyn CharacteristicDecoder>> {
    match service {
        KnownService::FitnessMachine => Some(Box::new(IndoorBikeDecoder::new())),
        KnownService::CyclingPower => {
            Some(Box::new(CyclingPowerDecoder::new(config.cadence_idle_timeout)))
        }
        KnownService::CyclingSpeedCadence => {
            Some(Box::new(CscDecoder::new(config.cadence_idle_timeout)))
        }
        KnownService::HeartRate => Some(Box::new(HeartRateDecoder::new())),
        KnownService::DeviceInformation => None,
    }
}

/// Little-endian field reader that tracks the running offset.
pub(crate) struct Cursor<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(data: &'a [u8], offset: usize) -> Self {
        Self { data, offset }
    }

    pub(crate) fn skip(&mut self, len: usize) -> Option<()> {
        if self.offset + len > self.data.len() {
            return None;
        }
        self.offset += len;
        Some(())
    }

    pub(crate) fn u8(&mut self) -> Option<u8> {
        let value = *self.data.get(self.offset)?;
        self.offset += 1;
        Some(value)
    }

    pub(crate) fn u16(&mut self) -> Option<u16> {
        let bytes = self.data.get(self.offset..self.offset + 2)?;
        self.offset += 2;
        Some(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    pub(crate) fn i16(&mut self) -> Option<i16> {
        self.u16().map(|v| v as i16)
    }

    pub(crate) fn u24(&mut self) -> Option<u32> {
        let bytes = self.data.get(self.offset..self.offset + 3)?;
        self.offset += 3;
        Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], 0]))
    }

    pub(crate) fn u32(&mut self) -> Option<u32> {
        let bytes = self.data.get(self.offset..self.offset + 4)?;
        self.offset += 4;
        Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub(crate) fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.offset)
    }
}
