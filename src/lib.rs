//! RideLink - BLE sensor acquisition for indoor cycling
//!
//! Connects to power meters, smart trainers, cadence and heart rate sensors,
//! decodes their GATT notifications into one coherent sensor stream, and
//! drives trainer ERG mode from structured workouts.

pub mod catalog;
pub mod config;
pub mod sensors;
pub mod workouts;

// Re-export commonly used types
pub use catalog::{ContentStore, InMemoryContentStore, Page, PageRequest};
pub use config::AppConfig;
pub use sensors::{SensorError, SensorStream};
pub use workouts::{target_power_for_time, Workout, WorkoutRunner};
