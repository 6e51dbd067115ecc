//! Sensor stream against a simulated device.

use crate::sensor_mock::{eventually, MockBackend, MockPeripheral};
use ridelink::sensors::gatt::{
    CSC_MEASUREMENT_UUID, CYCLING_POWER_MEASUREMENT_UUID, FTMS_CONTROL_POINT_UUID,
    HEART_RATE_MEASUREMENT_UUID, INDOOR_BIKE_DATA_UUID,
};
use ridelink::sensors::{
    CadenceSource, ConnectionState, GattPeripheral, KnownService, ResultCode, SensorConfig,
    SensorError, SensorEvent, SensorStream,
};
use std::time::{Duration, Instant};

fn fast_config() -> SensorConfig {
    SensorConfig {
        control_write_settle: Duration::from_millis(20),
        ..SensorConfig::default()
    }
}

fn csc_crank(revs: u16, time: u16) -> Vec<u8> {
    let mut data = vec![0x02];
    data.extend_from_slice(&revs.to_le_bytes());
    data.extend_from_slice(&time.to_le_bytes());
    data
}

fn power_with_crank(watts: i16, revs: u16, time: u16) -> Vec<u8> {
    let mut data = vec![0x20, 0x00];
    data.extend_from_slice(&watts.to_le_bytes());
    data.extend_from_slice(&revs.to_le_bytes());
    data.extend_from_slice(&time.to_le_bytes());
    data
}

#[tokio::test]
async fn test_heart_rate_only_device() {
    let strap = MockPeripheral::heart_rate_strap();
    let stream = SensorStream::new(MockBackend::with_device(strap.clone()), fast_config());

    let device = stream.scan_for_devices().await.unwrap();
    assert_eq!(device.name, "HRM-Pro");

    let operations = stream.connect_to_device(&device).await.unwrap();
    assert_eq!(operations.services(), vec![KnownService::HeartRate]);
    assert!(!operations.has_control());

    operations.start_notifications().await;
    let hr = strap.characteristic(KnownService::HeartRate, HEART_RATE_MEASUREMENT_UUID);
    assert!(hr.is_notifying());
    hr.push(&[0x00, 72]);

    eventually(|| {
        let stream = stream.clone();
        async move { stream.heart_rate().await == 72 }
    })
    .await;

    let snapshot = stream.snapshot().await;
    assert_eq!(snapshot.connection_state, ConnectionState::Connected);
    assert_eq!(snapshot.connected_device.unwrap().id, "strap-1");
    assert_eq!(snapshot.historical_heart_rate_data, vec![72]);
    assert_eq!(snapshot.device_info, None);

    assert!(matches!(
        stream.set_trainer_target_power(200).await,
        Err(SensorError::ControlUnavailable)
    ));
}

#[tokio::test]
async fn test_smart_trainer_setup() {
    let trainer = MockPeripheral::smart_trainer();
    let stream = SensorStream::new(MockBackend::with_device(trainer.clone()), fast_config());

    let operations = stream.connect_to_device(&trainer.info()).await.unwrap();
    assert!(operations.has_control());
    assert_eq!(operations.services().len(), 4);

    let control = trainer.characteristic(KnownService::FitnessMachine, FTMS_CONTROL_POINT_UUID);
    assert_eq!(control.writes(), vec![vec![0x00]]);
    assert!(control.is_notifying());

    assert_eq!(
        stream.snapshot().await.device_info.as_deref(),
        Some("Acme, KICKR CORE")
    );
}

#[tokio::test]
async fn test_set_target_power_writes_and_settles() {
    let trainer = MockPeripheral::smart_trainer();
    let stream = SensorStream::new(MockBackend::with_device(trainer.clone()), fast_config());
    let events = stream.event_receiver();
    stream.connect_to_device(&trainer.info()).await.unwrap();

    let started = Instant::now();
    stream.set_trainer_target_power(250).await.unwrap();
    assert!(started.elapsed() >= Duration::from_millis(20));

    let control = trainer.characteristic(KnownService::FitnessMachine, FTMS_CONTROL_POINT_UUID);
    assert_eq!(control.writes().last(), Some(&vec![0x05, 0xFA, 0x00]));

    control.push(&[0x80, 0x05, 0x01]);
    let mut response = None;
    for _ in 0..400 {
        if let Ok(SensorEvent::ControlPoint(r)) = events.try_recv() {
            response = Some(r);
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let response = response.expect("no control point response");
    assert_eq!(response.request_opcode, 0x05);
    assert_eq!(response.result, ResultCode::Success);
}

#[tokio::test]
async fn test_csc_cadence_locks_out_other_sources() {
    let trainer = MockPeripheral::smart_trainer();
    let stream = SensorStream::new(MockBackend::with_device(trainer.clone()), fast_config());
    stream.connect_to_device(&trainer.info()).await.unwrap();

    let csc = trainer.characteristic(KnownService::CyclingSpeedCadence, CSC_MEASUREMENT_UUID);
    csc.push(&csc_crank(10, 0));
    csc.push(&csc_crank(11, 683));
    eventually(|| {
        let stream = stream.clone();
        async move { stream.cadence_source().await == Some(CadenceSource::Csc) }
    })
    .await;
    assert_eq!(stream.cadence().await, 90);

    let power = trainer.characteristic(KnownService::CyclingPower, CYCLING_POWER_MEASUREMENT_UUID);
    power.push(&power_with_crank(200, 100, 0));
    power.push(&power_with_crank(210, 103, 512));

    let ftm = trainer.characteristic(KnownService::FitnessMachine, INDOOR_BIKE_DATA_UUID);
    // Cadence 60 rpm, power 220 W
    ftm.push(&[0x44, 0x00, 0x00, 0x00, 0x78, 0x00, 0xDC, 0x00]);

    eventually(|| {
        let stream = stream.clone();
        async move {
            let history = stream.snapshot().await.historical_power_data;
            history.contains(&210) && history.contains(&220)
        }
    })
    .await;

    let snapshot = stream.snapshot().await;
    assert_eq!(snapshot.cadence, 90);
    assert_eq!(snapshot.historical_cadence_data, vec![90]);
    assert_eq!(snapshot.cadence_source, Some(CadenceSource::Csc));
}

#[tokio::test]
async fn test_spontaneous_disconnect() {
    let trainer = MockPeripheral::smart_trainer();
    let stream = SensorStream::new(MockBackend::with_device(trainer.clone()), fast_config());
    let operations = stream.connect_to_device(&trainer.info()).await.unwrap();

    let hr = trainer.characteristic(KnownService::HeartRate, HEART_RATE_MEASUREMENT_UUID);
    let ftm = trainer.characteristic(KnownService::FitnessMachine, INDOOR_BIKE_DATA_UUID);
    hr.push(&[0x00, 130]);
    ftm.push(&[0x44, 0x00, 0x00, 0x00, 0xB4, 0x00, 0xC8, 0x00]);
    eventually(|| {
        let stream = stream.clone();
        async move { stream.heart_rate().await == 130 && stream.cadence().await == 90 }
    })
    .await;

    trainer.drop_link();
    eventually(|| {
        let stream = stream.clone();
        async move { stream.connection_state().await == ConnectionState::Disconnected }
    })
    .await;

    let snapshot = stream.snapshot().await;
    assert_eq!(snapshot.error.as_deref(), Some("Device disconnected"));
    assert!(snapshot.connected_device.is_none());
    assert_eq!(snapshot.cadence_source, None);
    assert_eq!(snapshot.device_info, None);
    assert_eq!(snapshot.historical_heart_rate_data, vec![130]);
    assert_eq!(snapshot.historical_power_data, vec![200]);
    assert!(stream.operations().await.is_none());
    assert!(!operations.is_active());

    // Late notifications from the dead session change nothing.
    hr.push(&[0x00, 150]);
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(stream.snapshot().await.historical_heart_rate_data, vec![130]);
}

#[tokio::test]
async fn test_operations_after_disconnect_are_noops() {
    let trainer = MockPeripheral::smart_trainer();
    let stream = SensorStream::new(MockBackend::with_device(trainer.clone()), fast_config());
    let operations = stream.connect_to_device(&trainer.info()).await.unwrap();
    let control = trainer.characteristic(KnownService::FitnessMachine, FTMS_CONTROL_POINT_UUID);

    stream.disconnect_device().await;
    assert_eq!(stream.connection_state().await, ConnectionState::Disconnected);
    assert_eq!(stream.error().await, None);

    let writes_before = control.writes().len();
    operations.write_value(&[0x07]).await.unwrap();
    operations.start_notifications().await;
    assert_eq!(control.writes().len(), writes_before);
    assert!(matches!(
        operations.set_target_power(150).await,
        Err(SensorError::NotConnected)
    ));
    assert!(matches!(
        stream.set_trainer_target_power(150).await,
        Err(SensorError::NotConnected)
    ));

    // A second disconnect is harmless.
    stream.disconnect_device().await;
}

#[tokio::test]
async fn test_second_connect_replaces_session() {
    let trainer = MockPeripheral::smart_trainer();
    let strap = MockPeripheral::heart_rate_strap();
    let stream = SensorStream::new(MockBackend::with_device(trainer.clone()), fast_config());

    let first = stream.connect_to_device(&trainer.info()).await.unwrap();
    let second = stream.connect_to_device(&strap.info()).await.unwrap();

    assert!(!first.is_active());
    assert!(second.is_active());
    let snapshot = stream.snapshot().await;
    assert_eq!(snapshot.connected_device.unwrap().id, "strap-1");
    assert_eq!(snapshot.connection_state, ConnectionState::Connected);
}

#[tokio::test]
async fn test_connect_failure_is_reported() {
    let device = MockPeripheral::builder("broken").refuse_connect().build();
    let stream = SensorStream::new(MockBackend::with_device(device.clone()), fast_config());

    let result = stream.connect_to_device(&device.info()).await;
    assert!(matches!(result, Err(SensorError::ConnectionFailed(_))));

    let snapshot = stream.snapshot().await;
    assert_eq!(snapshot.connection_state, ConnectionState::Disconnected);
    assert!(snapshot.error.unwrap().starts_with("Connection failed"));
    assert_eq!(device.info().name, "Unknown Device");
}

#[tokio::test]
async fn test_scan_errors_are_recorded() {
    let stream = SensorStream::new(MockBackend::empty(), fast_config());
    assert!(stream.scan_for_devices().await.is_none());
    assert_eq!(stream.error().await.as_deref(), Some("No device selected."));
    assert!(!stream.snapshot().await.is_scanning);

    let stream = SensorStream::new(MockBackend::unavailable(), fast_config());
    assert!(!stream.check_support().await);
    assert!(stream.scan_for_devices().await.is_none());
    assert!(!stream.snapshot().await.is_supported);
}

fn slow_strap(id: &str) -> std::sync::Arc<MockPeripheral> {
    MockPeripheral::builder(id)
        .name("Slow HRM")
        .service(KnownService::HeartRate, &[HEART_RATE_MEASUREMENT_UUID])
        .connect_delay(Duration::from_millis(100))
        .build()
}

#[tokio::test]
async fn test_disconnect_while_connecting() {
    let strap = slow_strap("slow-1");
    let stream = SensorStream::new(MockBackend::with_device(strap.clone()), fast_config());

    let pending = tokio::spawn({
        let stream = stream.clone();
        let device = strap.info();
        async move { stream.connect_to_device(&device).await }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(stream.connection_state().await, ConnectionState::Connecting);

    stream.disconnect_device().await;
    assert_eq!(stream.connection_state().await, ConnectionState::Disconnected);

    let operations = pending.await.unwrap().unwrap();
    assert!(!operations.is_active());
    assert_eq!(stream.connection_state().await, ConnectionState::Disconnected);
    assert!(stream.snapshot().await.connected_device.is_none());
    assert!(!strap.is_connected().await);
}

#[tokio::test]
async fn test_connect_while_connecting_keeps_one_link() {
    let slow = slow_strap("slow-1");
    let strap = MockPeripheral::heart_rate_strap();
    let stream = SensorStream::new(MockBackend::with_device(strap.clone()), fast_config());

    let pending = tokio::spawn({
        let stream = stream.clone();
        let device = slow.info();
        async move { stream.connect_to_device(&device).await }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;

    let current = stream.connect_to_device(&strap.info()).await.unwrap();
    let superseded = pending.await.unwrap().unwrap();

    assert!(current.is_active());
    assert!(!superseded.is_active());
    assert!(!slow.is_connected().await);
    assert!(strap.is_connected().await);

    let snapshot = stream.snapshot().await;
    assert_eq!(snapshot.connection_state, ConnectionState::Connected);
    assert_eq!(snapshot.connected_device.unwrap().id, "strap-1");
}

#[tokio::test]
async fn test_link_lost_during_setup_is_reported() {
    let strap = MockPeripheral::builder("flaky-1")
        .name("Flaky HRM")
        .service(KnownService::HeartRate, &[HEART_RATE_MEASUREMENT_UUID])
        .drop_during_setup()
        .build();
    let stream = SensorStream::new(MockBackend::with_device(strap.clone()), fast_config());

    let result = stream.connect_to_device(&strap.info()).await;
    assert!(matches!(result, Err(SensorError::Disconnected)));

    let snapshot = stream.snapshot().await;
    assert_eq!(snapshot.connection_state, ConnectionState::Disconnected);
    assert_eq!(snapshot.error.as_deref(), Some("Device disconnected"));
    assert!(snapshot.connected_device.is_none());
    assert!(stream.operations().await.is_none());
}
