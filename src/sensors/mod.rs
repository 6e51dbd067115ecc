//! BLE sensor acquisition: GATT transport, characteristic decoders, cadence
//! arbitration, trainer control and the shared sensor stream.

pub mod btle;
pub mod cadence;
pub mod control_point;
pub mod crank;
pub mod gatt;
pub mod profiles;
pub mod session;
pub mod stream;
pub mod transport;
pub mod types;

pub use btle::BtleBackend;
pub use cadence::{should_accept, CadenceArbiter, CadenceSource};
pub use control_point::{
    build_request_control, build_set_target_power, parse_control_point_response,
    ControlPointClient, ControlPointResponse, FtmsControlOpcode, ResultCode,
};
pub use crank::{CrankCadence, CrankRevolutionData};
pub use gatt::KnownService;
pub use session::{DeviceOperations, DeviceSession, ReadingSink, ServiceHandles};
pub use stream::{DeviceSummary, SensorSnapshot, SensorStream};
pub use transport::{BleBackend, GattCharacteristic, GattPeripheral, GattService, NotificationStream};
pub use types::{
    ConnectionState, DeviceInfo, Measurement, ReadingSource, SensorConfig, SensorError,
    SensorEvent, SensorReading,
};
