//! FTMS Control Point (0x2AD9) protocol.
//!
//! Request Control is sent once when the Fitness Machine service is set up;
//! its acknowledgement is logged but never awaited. Target power writes are
//! followed by a fixed settle delay so the trainer is not flooded.

use crate::sensors::transport::GattCharacteristic;
use crate::sensors::types::SensorError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Response header byte.
pub const RESPONSE_CODE: u8 = 0x80;

/// FTMS Control Point opcodes sent by this client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum FtmsControlOpcode {
    /// Request control of the fitness machine
    RequestControl = 0x00,
    /// Set target power
    SetTargetPower = 0x05,
}

impl TryFrom<u8> for FtmsControlOpcode {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(FtmsControlOpcode::RequestControl),
            0x05 => Ok(FtmsControlOpcode::SetTargetPower),
            other => Err(other),
        }
    }
}

/// Result code carried in a control point response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResultCode {
    None,
    Success,
    NotSupported,
    InvalidParameter,
    Failed,
    ControlNotPermitted,
    Unknown(u8),
}

impl From<u8> for ResultCode {
    fn from(value: u8) -> Self {
        match value {
            0 => ResultCode::None,
            1 => ResultCode::Success,
            2 => ResultCode::NotSupported,
            3 => ResultCode::InvalidParameter,
            4 => ResultCode::Failed,
            5 => ResultCode::ControlNotPermitted,
            other => ResultCode::Unknown(other),
        }
    }
}

impl std::fmt::Display for ResultCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResultCode::None => write!(f, "None"),
            ResultCode::Success => write!(f, "Success"),
            ResultCode::NotSupported => write!(f, "Not Supported"),
            ResultCode::InvalidParameter => write!(f, "Invalid Parameter"),
            ResultCode::Failed => write!(f, "Failed"),
            ResultCode::ControlNotPermitted => write!(f, "Control Not Permitted"),
            ResultCode::Unknown(code) => write!(f, "Unknown (0x{:02x})", code),
        }
    }
}

/// A decoded control point response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlPointResponse {
    /// Opcode of the request being answered
    pub request_opcode: u8,
    pub result: ResultCode,
}

impl ControlPointResponse {
    pub fn is_success(&self) -> bool {
        self.result == ResultCode::Success
    }

    /// Known opcode, if any.
    pub fn opcode(&self) -> Option<FtmsControlOpcode> {
        FtmsControlOpcode::try_from(self.request_opcode).ok()
    }
}

/// Parse a control point indication (`0x80, opcode, result`).
pub fn parse_control_point_response(data: &[u8]) -> Option<ControlPointResponse> {
    match data {
        [RESPONSE_CODE, request_opcode, result, ..] => Some(ControlPointResponse {
            request_opcode: *request_opcode,
            result: ResultCode::from(*result),
        }),
        _ => None,
    }
}

/// Build a control point command to request control.
pub fn build_request_control() -> Vec<u8> {
    vec![FtmsControlOpcode::RequestControl as u8]
}

/// Build a control point command to set target power (ERG mode).
pub fn build_set_target_power(target_watts: i16) -> Vec<u8> {
    let mut cmd = vec![FtmsControlOpcode::SetTargetPower as u8];
    cmd.extend_from_slice(&target_watts.to_le_bytes());
    cmd
}

/// Client for the trainer's control point.
#[derive(Clone)]
pub struct ControlPointClient {
    characteristic: Arc<dyn GattCharacteristic>,
    settle: Duration,
}

impl ControlPointClient {
    pub fn new(characteristic: Arc<dyn GattCharacteristic>, settle: Duration) -> Self {
        Self {
            characteristic,
            settle,
        }
    }

    pub fn characteristic(&self) -> &Arc<dyn GattCharacteristic> {
        &self.characteristic
    }

    /// Send Request Control without waiting for the acknowledgement.
    pub async fn request_control(&self) {
        match self.characteristic.write_value(&build_request_control()).await {
            Ok(()) => tracing::debug!("Requested trainer control"),
            Err(e) => tracing::warn!("Request control failed: {}", e),
        }
    }

    /// Write a Set Target Power command, then wait out the settle delay.
    pub async fn set_target_power(&self, watts: i16) -> Result<(), SensorError> {
        self.characteristic
            .write_value(&build_set_target_power(watts))
            .await?;
        tracing::debug!("Set target power to {}W", watts);
        tokio::time::sleep(self.settle).await;
        Ok(())
    }
}

/// Log a control point response.
pub fn log_response(response: &ControlPointResponse) {
    let opcode = response
        .opcode()
        .map(|op| format!("{:?}", op))
        .unwrap_or_else(|| format!("0x{:02x}", response.request_opcode));
    if response.is_success() {
        tracing::debug!("Control point {}: {}", opcode, response.result);
    } else {
        tracing::warn!("Control point {}: {}", opcode, response.result);
    }
}
