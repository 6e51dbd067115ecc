//! Heart Rate Measurement (0x2A37).

use super::{CharacteristicDecoder, Cursor};
use crate::sensors::gatt::HEART_RATE_MEASUREMENT_UUID;
use crate::sensors::types::{Measurement, ReadingSource, SensorReading};
use std::time::Instant;
use uuid::Uuid;

/// Parsed Heart Rate Measurement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeartRateData {
    /// Heart rate in BPM
    pub heart_rate_bpm: u16,
    /// RR intervals in 1/1024 s (if present)
    pub rr_intervals: Vec<u16>,
    /// Energy expended in kJ (if present)
    pub energy_expended: Option<u16>,
    /// Sensor contact detected
    pub sensor_contact: bool,
}

/// Parse a Heart Rate Measurement notification.
///
/// Bit 0 of the flags selects a u16 heart rate instead of u8.
pub fn parse_heart_rate_measurement(data: &[u8]) -> Option<HeartRateData> {
    let mut cursor = Cursor::new(data, 0);
    let flags = cursor.u8()?;
    let hr_format_u16 = (flags & 0x01) != 0;
    let sensor_contact_supported = (flags & 0x04) != 0;
    let energy_expended_present = (flags & 0x08) != 0;
    let rr_interval_present = (flags & 0x10) != 0;

    let heart_rate_bpm = if hr_format_u16 {
        cursor.u16()?
    } else {
        cursor.u8()? as u16
    };

    let mut result = HeartRateData {
        heart_rate_bpm,
        sensor_contact: sensor_contact_supported && (flags & 0x02) != 0,
        ..Default::default()
    };

    if energy_expended_present {
        result.energy_expended = cursor.u16();
    }

    if rr_interval_present {
        while cursor.remaining() >= 2 {
            if let Some(rr) = cursor.u16() {
                result.rr_intervals.push(rr);
            }
        }
    }

    Some(result)
}

pub struct HeartRateDecoder;

impl HeartRateDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl Default for HeartRateDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl CharacteristicDecoder for HeartRateDecoder {
    fn characteristic(&self) -> Uuid {
        HEART_RATE_MEASUREMENT_UUID
    }

    fn decode(&mut self, data: &[u8], now: Instant) -> Vec<SensorReading> {
        parse_heart_rate_measurement(data)
            .map(|parsed| {
                vec![SensorReading::new(
                    Measurement::HeartRate(parsed.heart_rate_bpm),
                    ReadingSource::HeartRate,
                    now,
                )]
            })
            .unwrap_or_default()
    }
}
