//! Workout runner driving a simulated trainer.

use crate::sensor_mock::{MockBackend, MockPeripheral};
use ridelink::sensors::gatt::FTMS_CONTROL_POINT_UUID;
use ridelink::sensors::{KnownService, SensorConfig, SensorError, SensorStream};
use ridelink::workouts::{
    PowerTarget, SegmentDuration, SegmentType, Workout, WorkoutRunner, WorkoutSegment,
};
use std::time::{Duration, Instant};

fn interval_workout() -> Workout {
    Workout::new(
        "Over-Unders",
        vec![
            WorkoutSegment::new(SegmentType::Steady, SegmentDuration::minutes(2.0))
                .with_power(PowerTarget::steady(95.0)),
            WorkoutSegment::new(SegmentType::Free, SegmentDuration::minutes(1.0)),
            WorkoutSegment::new(SegmentType::Steady, SegmentDuration::minutes(2.0))
                .with_power(PowerTarget::steady(105.0)),
        ],
    )
}

#[tokio::test]
async fn test_runner_commands_trainer_on_change() {
    let trainer = MockPeripheral::smart_trainer();
    let config = SensorConfig {
        control_write_settle: Duration::from_millis(1),
        ..SensorConfig::default()
    };
    let stream = SensorStream::new(MockBackend::with_device(trainer.clone()), config);
    stream.connect_to_device(&trainer.info()).await.unwrap();

    let mut runner = WorkoutRunner::new(interval_workout(), 200).unwrap();
    let t0 = Instant::now();
    runner.clock_mut().start(t0).unwrap();

    assert_eq!(runner.tick(&stream, t0).await.unwrap(), Some(190));
    assert_eq!(
        runner.tick(&stream, t0 + Duration::from_secs(30)).await.unwrap(),
        None
    );
    // Free ride keeps the last command in place
    assert_eq!(
        runner.tick(&stream, t0 + Duration::from_secs(150)).await.unwrap(),
        None
    );
    assert_eq!(
        runner.tick(&stream, t0 + Duration::from_secs(200)).await.unwrap(),
        Some(210)
    );
    assert!(runner.is_complete(t0 + Duration::from_secs(300)));

    let control = trainer.characteristic(KnownService::FitnessMachine, FTMS_CONTROL_POINT_UUID);
    assert_eq!(
        control.writes(),
        vec![vec![0x00], vec![0x05, 0xBE, 0x00], vec![0x05, 0xD2, 0x00]]
    );
}

#[tokio::test]
async fn test_runner_without_connection_reports_error() {
    let stream = SensorStream::new(MockBackend::empty(), SensorConfig::default());
    let mut runner = WorkoutRunner::new(interval_workout(), 250).unwrap();
    let t0 = Instant::now();
    runner.clock_mut().start(t0).unwrap();

    assert!(matches!(
        runner.tick(&stream, t0).await,
        Err(SensorError::NotConnected)
    ));
}
