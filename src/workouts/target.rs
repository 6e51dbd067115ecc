//! Segment scheduling and target power.
//!
//! A segment occupies `convert_to_minutes(duration) × repetitions` minutes of
//! the schedule. Intervals are half-open: a time exactly on a boundary belongs
//! to the following segment.

use crate::workouts::types::{DurationUnit, SegmentDuration, SegmentType, WorkoutSegment};

/// Duration in minutes.
///
/// Distance units have no pace to convert with, so their value is used as is.
pub fn convert_to_minutes(duration: &SegmentDuration) -> f64 {
    match duration.unit {
        DurationUnit::Minutes => duration.value,
        DurationUnit::Seconds => duration.value / 60.0,
        DurationUnit::Km | DurationUnit::Miles => duration.value,
    }
}

impl WorkoutSegment {
    /// Length of one repetition in minutes.
    pub fn duration_minutes(&self) -> f64 {
        convert_to_minutes(&self.duration)
    }

    /// Scheduled length including repetitions.
    pub fn effective_minutes(&self) -> f64 {
        self.duration_minutes() * self.repetitions() as f64
    }
}

/// Sum of every segment's effective length.
pub fn total_duration_minutes(segments: &[WorkoutSegment]) -> f64 {
    segments.iter().map(WorkoutSegment::effective_minutes).sum()
}

/// Where an elapsed time falls in the schedule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentPosition<'a> {
    pub index: usize,
    pub segment: &'a WorkoutSegment,
    /// Minutes since the segment (all repetitions) started
    pub elapsed_minutes: f64,
    /// Progress through the current repetition, 0.0..1.0
    pub progress: f64,
}

/// Find the segment active at `elapsed_minutes`.
pub fn current_segment(
    segments: &[WorkoutSegment],
    elapsed_minutes: f64,
) -> Option<SegmentPosition<'_>> {
    if !elapsed_minutes.is_finite() || elapsed_minutes < 0.0 {
        return None;
    }

    let mut start = 0.0;
    for (index, segment) in segments.iter().enumerate() {
        let length = segment.effective_minutes();
        if elapsed_minutes >= start && elapsed_minutes < start + length {
            let local = elapsed_minutes - start;
            let per_rep = segment.duration_minutes();
            return Some(SegmentPosition {
                index,
                segment,
                elapsed_minutes: local,
                progress: (local % per_rep) / per_rep,
            });
        }
        start += length;
    }
    None
}

/// Target power in watts at `elapsed_minutes`.
///
/// Steady targets are `percent_ftp / 100 × ftp`. Ramps interpolate linearly
/// across each repetition; a ramp-down runs from the final toward the initial
/// percentage. Segments without a usable target and times past the end yield
/// `None`.
pub fn target_power_for_time(
    segments: &[WorkoutSegment],
    elapsed_minutes: f64,
    ftp: f64,
) -> Option<f64> {
    let position = current_segment(segments, elapsed_minutes)?;
    let target = position.segment.power_target.as_ref()?;

    if let Some(percent) = target.percent_ftp.filter(|p| *p != 0.0) {
        return Some(percent / 100.0 * ftp);
    }

    let initial = target.initial_percent_ftp.filter(|p| *p != 0.0)? / 100.0 * ftp;
    let last = target.final_percent_ftp.filter(|p| *p != 0.0)? / 100.0 * ftp;

    let (from, to) = match position.segment.segment_type {
        SegmentType::RampUp => (initial, last),
        _ => (last, initial),
    };

    Some(from + (to - from) * position.progress)
}
