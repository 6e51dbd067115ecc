//! Cycling Power Measurement (0x2A63).

use super::{CharacteristicDecoder, Cursor};
use crate::sensors::crank::{CrankCadence, CrankRevolutionData};
use crate::sensors::gatt::CYCLING_POWER_MEASUREMENT_UUID;
use crate::sensors::types::{Measurement, ReadingSource, SensorReading};
use std::time::{Duration, Instant};
use uuid::Uuid;

const FLAG_PEDAL_POWER_BALANCE: u16 = 0x0001;
const FLAG_ACCUMULATED_TORQUE: u16 = 0x0004;
const FLAG_WHEEL_REVOLUTION: u16 = 0x0010;
const FLAG_CRANK_REVOLUTION: u16 = 0x0020;

/// Parsed Cycling Power Measurement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CyclingPowerData {
    /// Instantaneous power in watts
    pub power_watts: i16,
    /// Pedal power balance (if present)
    pub power_balance: Option<u8>,
    /// Accumulated torque in 1/32 Nm (if present)
    pub accumulated_torque: Option<u16>,
    /// Cumulative wheel revolutions (if present)
    pub wheel_revolutions: Option<u32>,
    /// Crank revolution data (if present)
    pub crank: Option<CrankRevolutionData>,
}

/// Parse a Cycling Power Measurement notification.
///
/// Layout: flags (u16), power (i16), then optional fields in flag order:
/// balance (1), torque (2), wheel data (6), crank data (4).
pub fn parse_cycling_power_measurement(data: &[u8]) -> Option<CyclingPowerData> {
    let mut cursor = Cursor::new(data, 0);
    let flags = cursor.u16()?;
    let power_watts = cursor.i16()?;

    let mut result = CyclingPowerData {
        power_watts,
        ..Default::default()
    };

    if flags & FLAG_PEDAL_POWER_BALANCE != 0 {
        result.power_balance = Some(cursor.u8()?);
    }

    if flags & FLAG_ACCUMULATED_TORQUE != 0 {
        result.accumulated_torque = Some(cursor.u16()?);
    }

    if flags & FLAG_WHEEL_REVOLUTION != 0 {
        result.wheel_revolutions = Some(cursor.u32()?);
        // Last wheel event time
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

/// Power and crank cadence from a power meter.
pub struct CyclingPowerDecoder {
    crank: CrankCadence,
}

impl CyclingPowerDecoder {
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            crank: CrankCadence::new(idle_timeout),
        }
    }
}

impl CharacteristicDecoder for CyclingPowerDecoder {
    fn characteristic(&self) -> Uuid {
        CYCLING_POWER_MEASUREMENT_UUID
    }

    fn decode(&mut self, data: &[u8], now: Instant) -> Vec<SensorReading> {
        let Some(parsed) = parse_cycling_power_measurement(data) else {
            return Vec::new();
        };

        let mut readings = Vec::with_capacity(2);

        // Zero or negative power is dropped; the trainer's FTMS value wins then.
        if parsed.power_watts > 0 {
            readings.push(SensorReading::new(
                Measurement::Power(parsed.power_watts),
                ReadingSource::CyclingPower,
                now,
            ));
        }

        if let Some(crank) = parsed.crank {
            if let Some(rpm) = self.crank.update(crank, now) {
                readings.push(SensorReading::new(
                    Measurement::Cadence(rpm),
                    ReadingSource::CyclingPower,
                    now,
                ));
            }
        }

        readings
    }
}
