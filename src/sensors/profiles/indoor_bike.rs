//! FTMS Indoor Bike Data (0x2AD2).

use super::{CharacteristicDecoder, Cursor};
use crate::sensors::gatt::INDOOR_BIKE_DATA_UUID;
use crate::sensors::types::{Measurement, ReadingSource, SensorReading};
use std::time::Instant;
use uuid::Uuid;

/// Parsed data from Indoor Bike Data characteristic.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndoorBikeData {
    /// Instantaneous speed in km/h (if present)
    pub speed_kmh: Option<f32>,
    /// Average speed in km/h (if present)
    pub avg_speed_kmh: Option<f32>,
    /// Instantaneous cadence in RPM (if present)
    pub cadence_rpm: Option<u16>,
    /// Total distance in meters (if present)
    pub total_distance_m: Option<u32>,
    /// Instantaneous power in watts (if present)
    pub power_watts: Option<i16>,
    /// Heart rate in BPM (if present)
    pub heart_rate_bpm: Option<u8>,
}

/// Indoor Bike Data flags (first 2 bytes).
#[derive(Debug, Clone, Copy)]
struct IndoorBikeDataFlags(u16);

impl IndoorBikeDataFlags {
    /// Bit 0 set means instantaneous speed is absent.
    fn speed_present(self) -> bool {
        self.0 & 0x0001 == 0
    }

    fn has(self, bit: u8) -> bool {
        self.0 & (1 << bit) != 0
    }
}

/// Parse Indoor Bike Data notification.
///
/// Fields follow the flags strictly left to right:
/// speed (2, unless bit 0), avg speed (2, bit 1), cadence (2, bit 2),
/// avg cadence (2, bit 3), distance (3, bit 4), resistance (2, bit 5),
/// power (2, bit 6), avg power (2, bit 7), total energy (2, bit 8),
/// energy per hour (2, bit 9), energy per minute (1, bit 10), heart rate (1, bit 11).
pub fn parse_indoor_bike_data(data: &[u8]) -> Option<IndoorBikeData> {
    let mut cursor = Cursor::new(data, 0);
    let flags = IndoorBikeDataFlags(cursor.u16()?);
    let mut result = IndoorBikeData::default();

    if flags.speed_present() {
        // 0.01 km/h units
        result.speed_kmh = Some(cursor.u16()? as f32 / 100.0);
    }

    if flags.has(1) {
        result.avg_speed_kmh = Some(cursor.u16()? as f32 / 100.0);
    }

    if flags.has(2) {
        // 0.5 RPM units
        result.cadence_rpm = Some(cursor.u16()? / 2);
    }

    if flags.has(3) {
        cursor.skip(2)?;
    }

    if flags.has(4) {
        result.total_distance_m = Some(cursor.u24()?);
    }

    if flags.has(5) {
        cursor.skip(2)?;
    }

    if flags.has(6) {
        result.power_watts = Some(cursor.i16()?);
    }

    if flags.has(7) {
        cursor.skip(2)?;
    }

    for (bit, len) in [(8, 2), (9, 2), (10, 1)] {
        if flags.has(bit) {
            cursor.skip(len)?;
        }
    }

    if flags.has(11) {
        result.heart_rate_bpm = Some(cursor.u8()?);
    }

    Some(result)
}

/// Trainer telemetry. Power is forwarded unconditionally.
pub struct IndoorBikeDecoder;

impl IndoorBikeDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl Default for IndoorBikeDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl CharacteristicDecoder for IndoorBikeDecoder {
    fn characteristic(&self) -> Uuid {
        INDOOR_BIKE_DATA_UUID
    }

    fn decode(&mut self, data: &[u8], now: Instant) -> Vec<SensorReading> {
        let Some(parsed) = parse_indoor_bike_data(data) else {
            return Vec::new();
        };

        let measurements = [
            parsed.cadence_rpm.map(Measurement::Cadence),
            parsed.power_watts.map(Measurement::Power),
            parsed
                .heart_rate_bpm
                .map(|bpm| Measurement::HeartRate(bpm as u16)),
        ];

        measurements
            .into_iter()
            .flatten()
            .map(|m| SensorReading::new(m, ReadingSource::Ftms, now))
            .collect()
    }
}
