//! Workout execution: a pausable clock and the ERG runner that feeds target
//! power to the trainer.

use crate::sensors::{SensorError, SensorStream};
use crate::workouts::target::{current_segment, target_power_for_time, total_duration_minutes};
use crate::workouts::types::{Workout, WorkoutError, WorkoutSegment};
use async_trait::async_trait;
use std::time::{Duration, Instant};

/// Current status of the workout clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClockStatus {
    #[default]
    NotStarted,
    Running,
    Paused,
    Stopped,
}

/// Wall-clock elapsed time that excludes paused periods.
#[derive(Debug, Clone, Default)]
pub struct WorkoutClock {
    status: ClockStatus,
    /// Start of the current running stretch
    resumed_at: Option<Instant>,
    /// Time banked before the current running stretch
    banked: Duration,
}

impl WorkoutClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> ClockStatus {
        self.status
    }

    pub fn is_running(&self) -> bool {
        self.status == ClockStatus::Running
    }

    pub fn start(&mut self, now: Instant) -> Result<(), WorkoutError> {
        if self.status != ClockStatus::NotStarted {
            return Err(WorkoutError::ClockError("Workout already started".to_string()));
        }
        self.status = ClockStatus::Running;
        self.resumed_at = Some(now);
        tracing::info!("Workout started");
        Ok(())
    }

    pub fn pause(&mut self, now: Instant) -> Result<(), WorkoutError> {
        if self.status != ClockStatus::Running {
            return Err(WorkoutError::ClockError("Workout not in progress".to_string()));
        }
        self.bank(now);
        self.status = ClockStatus::Paused;
        tracing::info!("Workout paused");
        Ok(())
    }

    pub fn resume(&mut self, now: Instant) -> Result<(), WorkoutError> {
        if self.status != ClockStatus::Paused {
            return Err(WorkoutError::ClockError("Workout not paused".to_string()));
        }
        self.status = ClockStatus::Running;
        self.resumed_at = Some(now);
        tracing::info!("Workout resumed");
        Ok(())
    }

    /// Freeze the clock for good.
    pub fn stop(&mut self, now: Instant) {
        if self.status == ClockStatus::Running {
            self.bank(now);
        }
        self.status = ClockStatus::Stopped;
        tracing::info!("Workout stopped");
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        match (self.status, self.resumed_at) {
            (ClockStatus::Running, Some(resumed)) => {
                self.banked + now.saturating_duration_since(resumed)
            }
            _ => self.banked,
        }
    }

    pub fn elapsed_minutes(&self, now: Instant) -> f64 {
        self.elapsed(now).as_secs_f64() / 60.0
    }

    fn bank(&mut self, now: Instant) {
        if let Some(resumed) = self.resumed_at.take() {
            self.banked += now.saturating_duration_since(resumed);
        }
    }
}

/// Anything that accepts a target power command.
#[async_trait]
pub trait TrainerControl: Send + Sync {
    async fn set_target_power(&self, watts: i16) -> Result<(), SensorError>;
}

#[async_trait]
impl TrainerControl for SensorStream {
    async fn set_target_power(&self, watts: i16) -> Result<(), SensorError> {
        self.set_trainer_target_power(watts).await
    }
}

/// Drives ERG mode from a workout's schedule.
///
/// A command is sent only when the rounded target changes.
pub struct WorkoutRunner {
    workout: Workout,
    ftp: f64,
    clock: WorkoutClock,
    last_sent: Option<i16>,
}

impl WorkoutRunner {
    pub fn new(workout: Workout, ftp: u16) -> Result<Self, WorkoutError> {
        workout.validate()?;
        tracing::info!(
            "Loaded {} ({:.1} min) at FTP {}W",
            workout.title,
            total_duration_minutes(&workout.segments),
            ftp
        );
        Ok(Self {
            workout,
            ftp: ftp as f64,
            clock: WorkoutClock::new(),
            last_sent: None,
        })
    }

    pub fn workout(&self) -> &Workout {
        &self.workout
    }

    pub fn clock(&self) -> &WorkoutClock {
        &self.clock
    }

    pub fn clock_mut(&mut self) -> &mut WorkoutClock {
        &mut self.clock
    }

    /// Rounded target at `now`, if the current segment has one.
    pub fn target_at(&self, now: Instant) -> Option<i16> {
        let watts = target_power_for_time(
            &self.workout.segments,
            self.clock.elapsed_minutes(now),
            self.ftp,
        )?;
        Some(watts.round().clamp(i16::MIN as f64, i16::MAX as f64) as i16)
    }

    pub fn current_segment(&self, now: Instant) -> Option<(usize, &WorkoutSegment)> {
        current_segment(&self.workout.segments, self.clock.elapsed_minutes(now))
            .map(|p| (p.index, p.segment))
    }

    pub fn is_complete(&self, now: Instant) -> bool {
        self.clock.elapsed_minutes(now) >= total_duration_minutes(&self.workout.segments)
    }

    /// Send the current target if it changed. Returns the value sent.
    pub async fn tick<T>(&mut self, trainer: &T, now: Instant) -> Result<Option<i16>, SensorError>
    where
        T: TrainerControl + ?Sized,
    {
        if !self.clock.is_running() {
            return Ok(None);
        }
        let Some(target) = self.target_at(now) else {
            return Ok(None);
        };
        if self.last_sent == Some(target) {
            return Ok(None);
        }

        trainer.set_target_power(target).await?;
        tracing::debug!("ERG target {}W", target);
        self.last_sent = Some(target);
        Ok(Some(target))
    }
}
