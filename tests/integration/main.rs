//! Integration test modules.

mod erg_test;
mod sensor_mock;
mod stream_test;
