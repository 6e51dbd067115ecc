//! Workout records, schedule math and ERG execution.

pub mod engine;
pub mod target;
pub mod types;

pub use engine::{ClockStatus, TrainerControl, WorkoutClock, WorkoutRunner};
pub use target::{
    convert_to_minutes, current_segment, target_power_for_time, total_duration_minutes,
    SegmentPosition,
};
pub use types::{
    CadenceRange, CadenceTarget, Difficulty, DurationUnit, HeartRateTarget, PlanDuration,
    PlanDurationUnit, PlanType, PlanWorkout, PowerTarget, PublishStatus, SegmentDuration,
    SegmentType, Slug, Workout, WorkoutError, WorkoutPlan, WorkoutSegment, WorkoutType,
};
