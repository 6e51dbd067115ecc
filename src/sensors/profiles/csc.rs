//! CSC Measurement (0x2A5B).

use super::{CharacteristicDecoder, Cursor};
use crate::sensors::crank::{CrankCadence, CrankRevolutionData};
use crate::sensors::gatt::CSC_MEASUREMENT_UUID;
use crate::sensors::types::{Measurement, ReadingSource, SensorReading};
use std::time::{Duration, Instant};
use uuid::Uuid;

const FLAG_WHEEL_REVOLUTION: u8 = 0x01;
const FLAG_CRANK_REVOLUTION: u8 = 0x02;

/// Parsed CSC Measurement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CscData {
    /// Cumulative wheel revolutions (if present)
    pub wheel_revolutions: Option<u32>,
    /// Crank revolution data (if present)
    pub crank: Option<CrankRevolutionData>,
}

/// Parse a CSC Measurement notification.
pub fn parse_csc_measurement(data: &[u8]) -> Option<CscData> {
    let mut cursor = Cursor::new(data, 0);
    let flags = cursor.u8()?;
    let mut result = CscData::default();

    if flags & FLAG_WHEEL_REVOLUTION != 0 {
        result.wheel_revolutions = Some(cursor.u32()?);
        cursor.skip(2)?;
    }

    if flags & FLAG_CRANK_REVOLUTION != 0 {
        result.crank = Some(CrankRevolutionData {
            cumulative_revolutions: cursor.u16()?,
            last_event_time: cursor.u16()?,
        });
    }

    Some(result)
}

/// Crank cadence from a speed/cadence sensor.
pub struct CscDecoder {
    crank: CrankCadence,
}

impl CscDecoder {
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            crank: CrankCadence::new(idle_timeout),
        }
    }
}

impl CharacteristicDecoder for CscDecoder {
    fn characteristic(&self) -> Uuid {
        CSC_MEASUREMENT_UUID
    }

    fn decode(&mut self, data: &[u8], now: Instant) -> Vec<SensorReading> {
        let Some(crank) = parse_csc_measurement(data).and_then(|parsed| parsed.crank) else {
            return Vec::new();
        };

        self.crank
            .update(crank, now)
            .map(|rpm| {
                vec![SensorReading::new(
                    Measurement::Cadence(rpm),
                    ReadingSource::Csc,
                    now,
                )]
            })
            .unwrap_or_default()
    }
}
