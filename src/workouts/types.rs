//! Workout and workout plan records.
//!
//! Field names follow the content store's JSON (camelCase, `_id`,
//! `_createdAt`). Everything except a segment's type and duration is optional
//! because list queries return partial projections.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Type of workout segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SegmentType {
    /// Linear power increase
    RampUp,
    /// Constant power
    Steady,
    /// No ERG target
    Free,
    /// Linear power decrease
    RampDown,
}

impl SegmentType {
    pub fn is_ramp(self) -> bool {
        matches!(self, SegmentType::RampUp | SegmentType::RampDown)
    }
}

impl std::fmt::Display for SegmentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SegmentType::RampUp => write!(f, "Ramp up"),
            SegmentType::Steady => write!(f, "Steady"),
            SegmentType::Free => write!(f, "Free"),
            SegmentType::RampDown => write!(f, "Ramp down"),
        }
    }
}

/// Unit of a segment duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DurationUnit {
    #[default]
    Minutes,
    Seconds,
    Km,
    Miles,
}

/// Length of a segment or rest period.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SegmentDuration {
    pub value: f64,
    #[serde(default)]
    pub unit: DurationUnit,
}

impl SegmentDuration {
    pub fn minutes(value: f64) -> Self {
        Self {
            value,
            unit: DurationUnit::Minutes,
        }
    }

    pub fn seconds(value: f64) -> Self {
        Self {
            value,
            unit: DurationUnit::Seconds,
        }
    }
}

/// Power target as a percentage of FTP.
///
/// Steady segments use `percent_ftp`; ramps use the initial/final pair.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PowerTarget {
    #[serde(rename = "percentFTP", default, skip_serializing_if = "Option::is_none")]
    pub percent_ftp: Option<f64>,
    #[serde(
        rename = "initialPercentFTP",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub initial_percent_ftp: Option<f64>,
    #[serde(
        rename = "finalPercentFTP",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub final_percent_ftp: Option<f64>,
}

impl PowerTarget {
    pub fn steady(percent: f64) -> Self {
        Self {
            percent_ftp: Some(percent),
            ..Self::default()
        }
    }

    pub fn ramp(initial: f64, final_percent: f64) -> Self {
        Self {
            percent_ftp: None,
            initial_percent_ftp: Some(initial),
            final_percent_ftp: Some(final_percent),
        }
    }
}

/// Heart rate target.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HeartRateTarget {
    /// "zone1" .. "zone5"
    #[serde(default)]
    pub zone: Option<String>,
    #[serde(default)]
    pub bpm: Option<u16>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CadenceRange {
    #[serde(default)]
    pub min: Option<u16>,
    #[serde(default)]
    pub max: Option<u16>,
}

/// Cadence target.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CadenceTarget {
    #[serde(default)]
    pub rpm: Option<u16>,
    #[serde(default)]
    pub range: Option<CadenceRange>,
}

/// A single segment within a workout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkoutSegment {
    pub segment_type: SegmentType,
    pub duration: SegmentDuration,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub power_target: Option<PowerTarget>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heart_rate_target: Option<HeartRateTarget>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cadence_target: Option<CadenceTarget>,
    /// Times the segment is repeated, at least 1
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repetitions: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rest_duration: Option<SegmentDuration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl WorkoutSegment {
    pub fn new(segment_type: SegmentType, duration: SegmentDuration) -> Self {
        Self {
            segment_type,
            duration,
            power_target: None,
            heart_rate_target: None,
            cadence_target: None,
            repetitions: None,
            rest_duration: None,
            notes: None,
        }
    }

    pub fn with_power(mut self, target: PowerTarget) -> Self {
        self.power_target = Some(target);
        self
    }

    pub fn with_repetitions(mut self, repetitions: u32) -> Self {
        self.repetitions = Some(repetitions);
        self
    }

    /// Repetition count, treating a missing or zero value as 1.
    pub fn repetitions(&self) -> u32 {
        self.repetitions.filter(|r| *r > 0).unwrap_or(1)
    }
}

/// Publication state of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublishStatus {
    #[default]
    Draft,
    Published,
    Archived,
}

/// Training focus of a workout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkoutType {
    Endurance,
    Tempo,
    Threshold,
    Vo2max,
    Sprint,
    Recovery,
    Sweetspot,
    Overunder,
}

/// Rider level a workout or plan is aimed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Beginner,
    Intermediate,
    Advanced,
    Professional,
}

/// URL slug. Accepts both `"name"` and `{"current": "name"}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Slug(pub String);

impl Slug {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Slug {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Slug {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Plain(String),
            Object { current: String },
        }

        Ok(match Repr::deserialize(deserializer)? {
            Repr::Plain(s) | Repr::Object { current: s } => Slug(s),
        })
    }
}

impl Serialize for Slug {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

/// A structured training workout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workout {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub slug: Slug,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub workout_type: Option<WorkoutType>,
    #[serde(default)]
    pub difficulty: Option<Difficulty>,
    #[serde(default)]
    pub segments: Vec<WorkoutSegment>,
    #[serde(default)]
    pub target_power_zones: Vec<String>,
    #[serde(default)]
    pub target_heart_rate_zones: Vec<String>,
    #[serde(default)]
    pub equipment: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub status: PublishStatus,
    #[serde(rename = "_createdAt", default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Workout {
    /// Create a draft workout with the given title and segments.
    pub fn new(title: impl Into<String>, segments: Vec<WorkoutSegment>) -> Self {
        let title = title.into();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            slug: Slug(slugify(&title)),
            title,
            description: None,
            workout_type: None,
            difficulty: None,
            segments,
            target_power_zones: Vec::new(),
            target_heart_rate_zones: Vec::new(),
            equipment: Vec::new(),
            tags: Vec::new(),
            status: PublishStatus::Draft,
            created_at: Some(Utc::now()),
        }
    }

    /// Parse a workout from its JSON form.
    pub fn from_json(json: &str) -> Result<Self, WorkoutError> {
        let workout: Workout = serde_json::from_str(json)?;
        workout.validate()?;
        Ok(workout)
    }

    /// Load a workout from a JSON file.
    pub fn from_file(path: &std::path::Path) -> Result<Self, WorkoutError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| WorkoutError::FileReadError(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&content)
    }

    /// Check the segment list can be scheduled.
    pub fn validate(&self) -> Result<(), WorkoutError> {
        if self.segments.is_empty() {
            return Err(WorkoutError::InvalidWorkout(format!(
                "{} has no segments",
                self.title
            )));
        }
        for (i, segment) in self.segments.iter().enumerate() {
            if !segment.duration.value.is_finite() || segment.duration.value < 0.0 {
                return Err(WorkoutError::InvalidWorkout(format!(
                    "segment {} has an invalid duration",
                    i + 1
                )));
            }
        }
        Ok(())
    }

    pub fn is_published(&self) -> bool {
        self.status == PublishStatus::Published
    }
}

/// Kind of training block a plan covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanType {
    Base,
    Build,
    Peak,
    Recovery,
    Maintenance,
    Event,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanDurationUnit {
    #[default]
    Weeks,
    Months,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlanDuration {
    pub value: f64,
    #[serde(default)]
    pub unit: PlanDurationUnit,
}

/// A workout inside a plan: either a reference or the expanded record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PlanWorkout {
    Reference {
        #[serde(rename = "_ref")]
        id: String,
    },
    Expanded(Box<Workout>),
}

impl PlanWorkout {
    /// Id of the referenced workout.
    pub fn id(&self) -> &str {
        match self {
            PlanWorkout::Reference { id } => id,
            PlanWorkout::Expanded(workout) => &workout.id,
        }
    }
}

/// An ordered collection of workouts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkoutPlan {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub slug: Slug,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub plan_type: Option<PlanType>,
    #[serde(default)]
    pub duration: Option<PlanDuration>,
    #[serde(default)]
    pub target_level: Option<Difficulty>,
    #[serde(default)]
    pub workouts: Vec<PlanWorkout>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub status: PublishStatus,
    #[serde(rename = "_createdAt", default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl WorkoutPlan {
    pub fn is_published(&self) -> bool {
        self.status == PublishStatus::Published
    }
}

fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.trim_end_matches('-').to_string()
}

/// Errors related to workout operations.
#[derive(Debug, Error)]
pub enum WorkoutError {
    /// Workout file could not be read
    #[error("Failed to read workout file: {0}")]
    FileReadError(String),

    /// JSON did not match the workout shape
    #[error("Failed to parse workout: {0}")]
    ParseError(#[from] serde_json::Error),

    /// Invalid workout structure
    #[error("Invalid workout: {0}")]
    InvalidWorkout(String),

    /// Clock operation not valid in the current state
    #[error("Workout clock error: {0}")]
    ClockError(String),
}
